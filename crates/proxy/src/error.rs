//! API error type that maps [`GateError`] variants to OpenAI error
//! envelopes with matching HTTP status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use qwengate_types::GateError;
use serde_json::json;

/// Wrapper around [`GateError`] that implements [`IntoResponse`].
///
/// Every error leaves as `{"error": {"message", "type", "code"}}`; the
/// status comes from [`GateError::http_status`].
pub struct ApiError(pub GateError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(json!({
                "error": {
                    "message": self.0.to_string(),
                    "type": self.0.error_type(),
                    "code": self.0.error_code()
                }
            })),
        )
            .into_response()
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        Self(e)
    }
}
