//! JSON body extractor whose rejections use the API error envelope

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
    Json as AxumJson,
};
use serde::{de::DeserializeOwned, Serialize};

use super::error::{ApiError, ApiErrorType};

/// Drop-in for `axum::Json` in handlers and responses
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        AxumJson::<T>::from_request(req, state)
            .await
            .map(|AxumJson(value)| Json(value))
            .map_err(rejection_to_error)
    }
}

impl<T> IntoResponse for Json<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        AxumJson(self.0).into_response()
    }
}

fn rejection_to_error(rejection: JsonRejection) -> ApiError {
    let (code, message) = match &rejection {
        JsonRejection::JsonDataError(err) => ("invalid_body", err.body_text()),
        JsonRejection::JsonSyntaxError(err) => ("malformed_json", err.body_text()),
        JsonRejection::MissingJsonContentType(_) => (
            "unsupported_media_type",
            "Expected 'Content-Type: application/json'".to_string(),
        ),
        JsonRejection::BytesRejection(err) => ("invalid_body", err.body_text()),
        _ => ("invalid_body", "Invalid JSON request".to_string()),
    };

    ApiError::new(rejection.status(), ApiErrorType::InvalidRequestError, message).with_code(code)
}
