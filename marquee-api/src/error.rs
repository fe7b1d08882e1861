use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use marquee_core::{PreconditionReason, ReservationError};

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    ConflictError(String),
    PreconditionError(String),
    PaymentMismatch(String),
    TimeoutError(String),
    UnavailableError(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION",
            AppError::ConflictError(_) => "CONFLICT",
            AppError::PreconditionError(_) => "PRECONDITION",
            AppError::PaymentMismatch(_) => "PAYMENT_MISMATCH",
            AppError::TimeoutError(_) => "TIMEOUT",
            AppError::UnavailableError(_) => "UNAVAILABLE",
            AppError::Anyhow(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::PreconditionError(msg) | AppError::PaymentMismatch(msg) => {
                (StatusCode::PRECONDITION_FAILED, msg)
            }
            AppError::TimeoutError(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            AppError::UnavailableError(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        let msg = err.to_string();
        match err {
            ReservationError::ValidationError(_) => AppError::ValidationError(msg),
            ReservationError::ConflictError { .. } => AppError::ConflictError(msg),
            ReservationError::PreconditionError {
                reason: PreconditionReason::PaymentMismatch,
                ..
            } => AppError::PaymentMismatch(msg),
            ReservationError::PreconditionError { .. } => AppError::PreconditionError(msg),
            ReservationError::TimeoutError(_) => AppError::TimeoutError(msg),
            ReservationError::TransientError(_) => AppError::UnavailableError(msg),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Anyhow(err)
    }
}
