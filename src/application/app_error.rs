use thiserror::Error;

use crate::domain::entities::subscription::InvalidTransition;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An operation was called from a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Scheduling or bookkeeping defect. Halts processing of the entity.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Optimistic lock mismatch or a concurrent attempt holding the row.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The gateway refused the card.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// The gateway failed, timed out, or returned something unusable.
    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    /// A charge attempt failed and has been recorded on the invoice.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::InvalidState(_) => ErrorCode::InvalidState,
            AppError::Consistency(_) => ErrorCode::ConsistencyError,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::PaymentDeclined(_) => ErrorCode::PaymentDeclined,
            AppError::PaymentGateway(_) => ErrorCode::PaymentGatewayError,
            AppError::PaymentFailed(_) => ErrorCode::PaymentFailed,
            AppError::NotImplemented(_) => ErrorCode::NotImplemented,
            AppError::Unauthorized => ErrorCode::Unauthorized,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Transient failures a job runner may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Conflict(_))
    }
}

impl From<InvalidTransition> for AppError {
    fn from(err: InvalidTransition) -> Self {
        AppError::InvalidState(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    DatabaseError,
    InvalidInput,
    InvalidState,
    ConsistencyError,
    Conflict,
    PaymentDeclined,
    PaymentGatewayError,
    PaymentFailed,
    NotImplemented,
    Unauthorized,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::ConsistencyError => "CONSISTENCY_ERROR",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::PaymentDeclined => "PAYMENT_DECLINED",
            ErrorCode::PaymentGatewayError => "PAYMENT_GATEWAY_ERROR",
            ErrorCode::PaymentFailed => "PAYMENT_FAILED",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
