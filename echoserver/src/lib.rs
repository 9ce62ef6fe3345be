//! Echo/diagnostic HTTP server
//!
//! Answers any request with a JSON description of that request and prints
//! the same JSON as one line on stdout, which makes it handy for exercising
//! ganda end to end: pipe urls at this server and diff what it saw.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::net::TcpListener;

/// What the server saw in one request
#[derive(Debug, Serialize)]
pub struct RequestEcho {
    /// RFC 3339 receive time
    pub time: String,
    /// HTTP method
    pub method: String,
    /// Request URI including query
    pub uri: String,
    /// Requesting host header, if present
    pub host: String,
    /// User agent header, if present
    pub user_agent: String,
    /// All request headers, comma-joined on repeats
    pub headers: BTreeMap<String, String>,
    /// Request body as text
    pub request_body: String,
}

#[derive(Debug, Clone)]
struct EchoConfig {
    delay: Duration,
}

/// The echo router, responding to every method and path
pub fn app(delay: Duration) -> Router {
    Router::new()
        .fallback(echo_request)
        .with_state(EchoConfig { delay })
}

/// Serve on the given port until ctrl-c
pub async fn serve(port: u16, delay_millis: u64) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::debug!(%addr, "echoserver listening");

    axum::serve(listener, app(Duration::from_millis(delay_millis)))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}

async fn echo_request(
    State(config): State<EchoConfig>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<RequestEcho> {
    if !config.delay.is_zero() {
        tokio::time::sleep(config.delay).await;
    }

    let echo = RequestEcho {
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        method: method.to_string(),
        uri: uri.to_string(),
        host: header_value(&headers, "host"),
        user_agent: header_value(&headers, "user-agent"),
        headers: format_headers(&headers),
        request_body: String::from_utf8_lossy(&body).into_owned(),
    };

    if let Ok(line) = serde_json::to_string(&echo) {
        println!("{line}");
    }

    Json(echo)
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn format_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut formatted: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        formatted
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn test_echoes_method_uri_and_body() {
        let app = app(Duration::ZERO);
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/foo/bar?q=1")
            .header("X-Probe", "yes")
            .body(axum::body::Body::from("payload"))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let echo = body_json(response).await;
        assert_eq!(echo["method"], "POST");
        assert_eq!(echo["uri"], "/foo/bar?q=1");
        assert_eq!(echo["request_body"], "payload");
        assert_eq!(echo["headers"]["x-probe"], "yes");
    }

    #[tokio::test]
    async fn test_echoes_any_path() {
        let app = app(Duration::ZERO);
        let request = axum::http::Request::builder()
            .method("DELETE")
            .uri("/deeply/nested/path")
            .body(axum::body::Body::empty())
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let echo = body_json(response).await;
        assert_eq!(echo["method"], "DELETE");
        assert_eq!(echo["uri"], "/deeply/nested/path");
    }
}
