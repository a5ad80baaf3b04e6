//! Request metrics labelled by route template

use std::time::Instant;

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};

use crate::infrastructure::observability::record_http_request;

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let route = route_label(&request);

    let response = next.run(request).await;

    record_http_request(
        surface(&route),
        method.as_str(),
        &route,
        response.status().as_u16(),
        started.elapsed(),
    );

    response
}

/// Matched template such as `/api/knowledge-bases/{kb_id}`
///
/// Unmatched requests share one label so probing for ids cannot blow up
/// label cardinality.
fn route_label(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

/// Which API a route belongs to
fn surface(route: &str) -> &'static str {
    if route.starts_with("/api/") {
        "management"
    } else if route.starts_with("/v1/") {
        "engine"
    } else if route == "unmatched" {
        "unmatched"
    } else {
        "probe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_requests_share_one_label() {
        let request = Request::builder()
            .uri("/api/knowledge-bases/secret-kb-name")
            .body(Body::empty())
            .unwrap();

        assert_eq!(route_label(&request), "unmatched");
    }

    #[test]
    fn test_surface_by_prefix() {
        assert_eq!(surface("/api/knowledge-bases/{kb_id}"), "management");
        assert_eq!(surface("/v1/query/{kind}"), "engine");
        assert_eq!(surface("/ready"), "probe");
        assert_eq!(surface("unmatched"), "unmatched");
    }
}
