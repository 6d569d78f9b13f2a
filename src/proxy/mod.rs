//! Proxy layer: request forwarding to view workloads

pub mod http_proxy;

pub use http_proxy::HttpProxy;
