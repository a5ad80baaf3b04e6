//! Caller identity and delegated token extraction
//!
//! End users are authenticated upstream; the gateway in front of this
//! service forwards the identity in `X-User-Id`. Query calls carry a
//! delegated token as `Authorization: Bearer <token>` instead.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use tracing::debug;

use crate::api::types::ApiError;
use crate::domain::identity::UserId;

/// Header carrying the pre-authenticated caller
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor for the pre-authenticated caller
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub UserId);

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(ApiError::unauthorized)?;

        let user = UserId::new(value).map_err(|_| {
            debug!("Rejected malformed caller identity");
            ApiError::unauthorized()
        })?;

        Ok(CallerIdentity(user))
    }
}

/// Extractor for a delegated token presented as a bearer credential
#[derive(Clone)]
pub struct DelegatedBearer(pub String);

impl std::fmt::Debug for DelegatedBearer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DelegatedBearer([REDACTED])")
    }
}

impl<S> FromRequestParts<S> for DelegatedBearer
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_bearer_token(&parts.headers)
            .map(DelegatedBearer)
            .ok_or_else(ApiError::unauthorized)
    }
}

/// Token from `Authorization: Bearer <token>`, if present
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();

    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request, StatusCode};

    fn parts_with(name: &'static str, value: &str) -> Parts {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        parts
            .headers
            .insert(name, HeaderValue::from_str(value).unwrap());
        parts
    }

    #[tokio::test]
    async fn test_caller_identity_from_header() {
        let mut parts = parts_with(USER_ID_HEADER, "alice@example.com");
        let CallerIdentity(user) = CallerIdentity::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.as_str(), "alice@example.com");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let err = CallerIdentity::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_identity_is_unauthorized() {
        let mut parts = parts_with(USER_ID_HEADER, "../etc");
        assert!(CallerIdentity::from_request_parts(&mut parts, &()).await.is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  eyJ.abc.def "));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("eyJ.abc.def"));
    }

    #[test]
    fn test_bearer_debug_is_redacted() {
        let bearer = DelegatedBearer("eyJ.secret".into());
        assert!(!format!("{:?}", bearer).contains("secret"));
    }
}
