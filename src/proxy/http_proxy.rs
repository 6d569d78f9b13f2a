//! HTTP reverse proxy: forwards requests to a view's workload endpoint

use crate::config::ProxyConfig;
use crate::error::{GatewayError, Result};
use crate::view::Endpoint;
use bytes::Bytes;
use std::time::Duration;

/// HTTP reverse proxy
pub struct HttpProxy {
    client: reqwest::Client,
    timeout: Option<Duration>,
    connect_retries: u32,
    host_rewrite: Option<http::HeaderValue>,
}

impl HttpProxy {
    /// Create a new HTTP proxy with default settings
    pub fn new() -> Self {
        Self::from_config(&ProxyConfig::default())
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().unwrap_or_default();

        let host_rewrite = match config.host_rewrite.as_str() {
            "" => None,
            host => http::HeaderValue::from_str(host).ok(),
        };

        Self {
            client,
            timeout: config.timeout(),
            connect_retries: config.connect_retries,
            host_rewrite,
        }
    }

    /// Forward an HTTP request to the endpoint, retrying connect failures
    pub async fn forward(
        &self,
        endpoint: &Endpoint,
        method: &http::Method,
        uri: &http::Uri,
        headers: &http::HeaderMap,
        body: Bytes,
    ) -> Result<ProxyResponse> {
        let mut attempt = 0;
        loop {
            match self.do_forward(endpoint, method, uri, headers, body.clone()).await {
                Err(GatewayError::Http(e)) if e.is_connect() && attempt < self.connect_retries => {
                    attempt += 1;
                    tracing::debug!(
                        endpoint = %endpoint,
                        attempt,
                        error = %e,
                        "Upstream connect failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(GatewayError::Http(e)) if e.is_connect() => {
                    return Err(GatewayError::Upstream(format!(
                        "cannot connect to {}: {}",
                        endpoint, e
                    )));
                }
                Err(GatewayError::Http(e)) if e.is_timeout() => {
                    return Err(GatewayError::Upstream(format!(
                        "{} timed out after {}ms",
                        endpoint,
                        self.timeout.map(|t| t.as_millis()).unwrap_or_default()
                    )));
                }
                other => return other,
            }
        }
    }

    async fn do_forward(
        &self,
        endpoint: &Endpoint,
        method: &http::Method,
        uri: &http::Uri,
        headers: &http::HeaderMap,
        body: Bytes,
    ) -> Result<ProxyResponse> {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let upstream_url = format!("{}{}", endpoint.url(), path_and_query);

        let mut req_builder = self.client.request(method.clone(), &upstream_url);

        for (key, value) in headers.iter() {
            if is_hop_by_hop(key.as_str()) {
                continue;
            }
            if key == http::header::HOST && self.host_rewrite.is_some() {
                continue;
            }
            req_builder = req_builder.header(key.clone(), value.clone());
        }
        if let Some(host) = &self.host_rewrite {
            req_builder = req_builder.header(http::header::HOST, host.clone());
        }

        let response = req_builder.body(body).send().await?;

        let status = response.status();
        let mut resp_headers = response.headers().clone();
        let hop: Vec<_> = resp_headers
            .keys()
            .filter(|k| is_hop_by_hop(k.as_str()))
            .cloned()
            .collect();
        for key in hop {
            resp_headers.remove(key);
        }
        let resp_body = response.bytes().await?;

        Ok(ProxyResponse {
            status,
            headers: resp_headers,
            body: resp_body,
        })
    }
}

impl Default for HttpProxy {
    fn default() -> Self {
        Self::new()
    }
}

/// Response from a view workload
#[derive(Debug)]
pub struct ProxyResponse {
    /// HTTP status code
    pub status: reqwest::StatusCode,
    /// Response headers, hop-by-hop headers removed
    pub headers: reqwest::header::HeaderMap,
    /// Response body
    pub body: Bytes,
}

/// Check if a header is a hop-by-hop header that should not be forwarded
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot upstream that echoes the received request head in its body
    async fn echo_upstream() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            let resp = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Upstream: yes\r\nConnection: close\r\n\r\n{}",
                head.len(),
                head
            );
            stream.write_all(resp.as_bytes()).await.unwrap();
        });
        Endpoint::new("127.0.0.1", port)
    }

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("connection"));
        assert!(is_hop_by_hop("Keep-Alive"));
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("Upgrade"));
        assert!(is_hop_by_hop("Proxy-Authorization"));

        assert!(!is_hop_by_hop("Content-Type"));
        assert!(!is_hop_by_hop("Authorization"));
        assert!(!is_hop_by_hop("Host"));
    }

    #[test]
    fn test_http_proxy_defaults() {
        let proxy = HttpProxy::default();
        assert_eq!(proxy.timeout, None);
        assert_eq!(proxy.connect_retries, 3);
        assert_eq!(proxy.host_rewrite.as_ref().unwrap(), "localhost");
    }

    #[test]
    fn test_http_proxy_from_config() {
        let proxy = HttpProxy::from_config(&ProxyConfig {
            timeout_secs: 30,
            connect_retries: 0,
            host_rewrite: String::new(),
        });
        assert_eq!(proxy.timeout, Some(Duration::from_secs(30)));
        assert!(proxy.host_rewrite.is_none());
    }

    #[tokio::test]
    async fn test_forward_rewrites_host() {
        let endpoint = echo_upstream().await;
        let proxy = HttpProxy::default();
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::HOST, "test01.example.com".parse().unwrap());
        headers.insert("x-custom", "kept".parse().unwrap());
        headers.insert("proxy-authorization", "secret".parse().unwrap());

        let uri: http::Uri = "/table?id=1".parse().unwrap();
        let resp = proxy
            .forward(&endpoint, &http::Method::GET, &uri, &headers, Bytes::new())
            .await
            .unwrap();

        assert_eq!(resp.status, reqwest::StatusCode::OK);
        assert!(resp.headers.get("connection").is_none());
        assert_eq!(resp.headers.get("x-upstream").unwrap(), "yes");
        let head = String::from_utf8_lossy(&resp.body).to_lowercase();
        assert!(head.starts_with("get /table?id=1 http/1.1"));
        assert!(head.contains("host: localhost"));
        assert!(head.contains("x-custom: kept"));
        assert!(!head.contains("test01.example.com"));
        assert!(!head.contains("proxy-authorization"));
    }

    #[tokio::test]
    async fn test_forward_connect_failure() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let proxy = HttpProxy::from_config(&ProxyConfig {
            connect_retries: 1,
            ..ProxyConfig::default()
        });
        let err = proxy
            .forward(
                &Endpoint::new("127.0.0.1", port),
                &http::Method::GET,
                &"/".parse().unwrap(),
                &http::HeaderMap::new(),
                Bytes::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
        assert_eq!(err.status_code(), 502);
    }
}
