//! Entrypoint: the HTTP listener
//!
//! Accepts connections and dispatches each request through admission, then
//! either to the management API or to the view's workload.

use crate::admission::{Admission, AdmissionController};
use crate::api::{ApiResponse, ManagementApi};
use crate::error::{GatewayError, Result};
use crate::observability::{AccessLog, GatewayMetrics};
use crate::proxy::HttpProxy;
use crate::router::Router;
use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use http_body_util::Full;
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

type HttpResponse = hyper::Response<Full<Bytes>>;

/// Shared state for request handling
pub struct ServerState {
    pub admission: Arc<AdmissionController>,
    pub router: Arc<Router>,
    pub api: Arc<ManagementApi>,
    pub http_proxy: Arc<HttpProxy>,
    pub metrics: Arc<GatewayMetrics>,
    pub access_log: Arc<AccessLog>,
}

/// Bind the listener
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Other(format!("Failed to bind {}: {}", addr, e)))
}

/// Serve HTTP on an already bound listener until the task is aborted
pub fn start_http_entrypoint(
    listener: TcpListener,
    state: Arc<ServerState>,
) -> tokio::task::JoinHandle<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "HTTP entrypoint listening");
    }

    tokio::spawn(async move {
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let state = state.clone();
            tokio::spawn(async move {
                state.metrics.inc_connections();
                let io = TokioIo::new(stream);
                let result = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(|req| handle_http_request(req, remote_addr, state.clone())),
                    )
                    .await;
                if let Err(e) = result {
                    tracing::debug!(error = %e, remote = %remote_addr, "Connection ended with error");
                }
                state.metrics.dec_connections();
            });
        }
    })
}

/// Handle an individual HTTP request
async fn handle_http_request(
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    state: Arc<ServerState>,
) -> std::result::Result<HttpResponse, hyper::Error> {
    let access_tracker = state.access_log.start_request();
    let (parts, body) = req.into_parts();

    let body_bytes = match http_body_util::BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };

    let host = parts
        .headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| parts.uri.authority().map(|a| a.to_string()));
    let path = parts.uri.path().to_string();
    let user_agent = parts
        .headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let mut view = None;
    let mut endpoint = None;

    let response = match state.admission.admit(host.as_deref(), &path).await {
        Ok(Admission::Local) => {
            let resp = state.api.handle(&parts.method, &path, &body_bytes).await;
            api_response(resp)
        }
        Ok(Admission::Admitted { view: name, .. }) => {
            state.metrics.record_view_request(&name);
            view = Some(name);
            match state.router.resolve(host.as_deref().unwrap_or_default()) {
                Ok(target) => {
                    endpoint = Some(target.to_string());
                    match state
                        .http_proxy
                        .forward(&target, &parts.method, &parts.uri, &parts.headers, body_bytes)
                        .await
                    {
                        Ok(proxy_resp) => {
                            let mut resp = respond(proxy_resp.status.as_u16(), None, proxy_resp.body);
                            for (key, value) in proxy_resp.headers.iter() {
                                resp.headers_mut().append(key.clone(), value.clone());
                            }
                            resp
                        }
                        Err(e) => {
                            tracing::error!(error = %e, endpoint = %target, "Proxy error");
                            error_response(&e)
                        }
                    }
                }
                Err(e) => error_response(&e),
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, host = ?host, path = %path, "Request rejected");
            error_response(&e)
        }
    };

    let status = response.status().as_u16();
    let response_bytes = response.body().size_hint().exact().unwrap_or_default();
    state.metrics.record_request(status, response_bytes);
    state.access_log.record(&access_tracker.build_entry(
        remote_addr.ip().to_string(),
        parts.method.to_string(),
        path,
        host,
        status,
        response_bytes,
        view,
        endpoint,
        user_agent,
    ));

    Ok(response)
}

fn respond(status: u16, content_type: Option<&str>, body: Bytes) -> HttpResponse {
    let mut resp = hyper::Response::new(Full::new(body));
    *resp.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
        resp.headers_mut().insert(http::header::CONTENT_TYPE, value);
    }
    resp
}

fn api_response(resp: ApiResponse) -> HttpResponse {
    respond(resp.status, Some(&resp.content_type), Bytes::from(resp.body))
}

fn error_response(err: &GatewayError) -> HttpResponse {
    api_response(ApiResponse::error(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_error_response_shape() {
        let resp = error_response(&GatewayError::NoRoute("ghost".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("ghost"));
    }

    #[test]
    fn test_respond_invalid_status() {
        let resp = respond(42, None, Bytes::new());
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get(http::header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_timeout_maps_to_503() {
        let resp = error_response(&GatewayError::ProvisioningTimeout {
            view: "test01".into(),
            waited_ms: 60_000,
        });
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_bind_ephemeral() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
