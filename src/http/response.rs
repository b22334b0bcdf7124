// Maps bridge results onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::core::bridge::{FailureKind, OperationResult};

/// An `OperationResult` on its way out as JSON.
pub struct BridgeResponse(pub OperationResult);

impl BridgeResponse {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            OperationResult::Success(_) => StatusCode::OK,
            OperationResult::AuthRequired { .. } => StatusCode::UNAUTHORIZED,
            OperationResult::Failure(failure) => match failure.kind {
                FailureKind::Validation | FailureKind::AuthExchange => StatusCode::BAD_REQUEST,
                // Google's own 4xx (404 for a missing doc, 403 for no access)
                // is more useful to the caller than a blanket 502.
                FailureKind::Upstream => failure
                    .upstream_status
                    .and_then(|status| StatusCode::from_u16(status).ok())
                    .filter(|status| status.is_client_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<OperationResult> for BridgeResponse {
    fn from(result: OperationResult) -> Self {
        Self(result)
    }
}

impl IntoResponse for BridgeResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.0.to_envelope())).into_response()
    }
}
