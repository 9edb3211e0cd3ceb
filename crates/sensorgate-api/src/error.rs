//! Error-to-HTTP mapping
//!
//! The mapping layer raises [`GatewayError`] close to the point of
//! detection; this module translates each variant into the status code the
//! SensorThings binding answers with, plus a small JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use sensorgate_common::GatewayError;

/// Response-side wrapper around [`GatewayError`].
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::BadRequest(_) | GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::Config(_)
            | GatewayError::Serialization(_)
            | GatewayError::History(_)
            | GatewayError::Internal(_)
            | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "request failed with server error");
        }
        let body = Json(json!({
            "code": status.as_u16(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Handler result shorthand.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
