//! Per-request log events with credentials kept out of the output

use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, info, warn};

use super::auth::USER_ID_HEADER;

const PROBE_PATHS: [&str; 3] = ["/health", "/live", "/ready"];

/// Headers worth logging; credentials among them are masked
const LOGGED_HEADERS: [&str; 7] = [
    "content-type",
    "content-length",
    "user-agent",
    "x-forwarded-for",
    USER_ID_HEADER,
    "authorization",
    "x-engine-signature",
];

const REDACTED_HEADERS: [&str; 2] = ["authorization", "x-engine-signature"];

/// Emit one event per completed request
///
/// `TraceLayer` owns the request span. Probes log at debug so they do not
/// drown out traffic; server errors log at warn.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let request_id = header_value(request.headers(), "x-request-id").unwrap_or("-").to_string();
    let caller = header_value(request.headers(), USER_ID_HEADER).map(str::to_string);

    debug!(headers = %loggable_headers(request.headers()), "Request headers");

    let response = next.run(request).await;
    let status = response.status();
    let duration_ms = started.elapsed().as_millis() as u64;
    let caller = caller.as_deref().unwrap_or("-");

    if PROBE_PATHS.contains(&route.as_str()) {
        debug!(route = %route, status = status.as_u16(), duration_ms, "Probe served");
    } else if status.is_server_error() {
        warn!(
            method = %method, route = %route, status = status.as_u16(),
            duration_ms, request_id = %request_id, caller = %caller,
            "Request failed"
        );
    } else {
        info!(
            method = %method, route = %route, status = status.as_u16(),
            duration_ms, request_id = %request_id, caller = %caller,
            "Request completed"
        );
    }

    response
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn loggable_headers(headers: &HeaderMap) -> String {
    LOGGED_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?;
            let shown = if REDACTED_HEADERS.contains(name) {
                "[REDACTED]"
            } else {
                value.to_str().unwrap_or("[invalid]")
            };
            Some(format!("{}={}", name, shown))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_and_signature_are_masked() {
        let request = Request::builder()
            .header("Authorization", "Bearer eyJ.secret.sig")
            .header("X-Engine-Signature", "sha256=abcdef")
            .header("X-User-Id", "alice")
            .header("Cache-Control", "no-cache")
            .body(Body::empty())
            .unwrap();

        let logged = loggable_headers(request.headers());

        assert!(logged.contains("authorization=[REDACTED]"));
        assert!(logged.contains("x-engine-signature=[REDACTED]"));
        assert!(logged.contains("x-user-id=alice"));
        assert!(!logged.contains("secret"));
        assert!(!logged.contains("abcdef"));
        assert!(!logged.contains("cache-control"));
    }

    #[test]
    fn test_no_headers_logs_nothing() {
        assert_eq!(loggable_headers(&HeaderMap::new()), "");
    }

    #[test]
    fn test_header_value_rejects_non_ascii() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", axum::http::HeaderValue::from_bytes(b"\xff").unwrap());

        assert_eq!(header_value(&headers, "x-user-id"), None);
    }
}
