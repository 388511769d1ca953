use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, Some(msg)),
            AppError::NotFound => (StatusCode::NOT_FOUND, None),
            AppError::InvalidState(msg) | AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, Some(msg))
            }
            AppError::PaymentDeclined(msg) | AppError::PaymentFailed(msg) => {
                (StatusCode::PAYMENT_REQUIRED, Some(msg))
            }
            AppError::PaymentGateway(_) => (StatusCode::BAD_GATEWAY, None),
            AppError::NotImplemented(msg) => (StatusCode::NOT_IMPLEMENTED, Some(msg)),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, None),
            ref e @ (AppError::Consistency(_) | AppError::Database(_) | AppError::Internal(_)) => {
                // Log the error before it gets converted into a status response.
                tracing::error!(error = ?e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        if !status.is_server_error() {
            tracing::info!(status = %status, code = code.as_str(), "Request rejected");
        }
        error_resp(status, code, message)
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
