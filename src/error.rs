// src/error.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::enrollment::{PaymentQuote, PendingPayment};
use crate::models::Enrollment;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("row not found: {0}")]
    Missing(&'static str),
}

impl StoreError {
    /// Turns Postgres unique-constraint failures into `UniqueViolation` so
    /// callers can tell a lost insert race from a broken connection.
    pub fn from_insert(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::UniqueViolation(constraint);
            }
        }
        StoreError::Database(err)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotEnrolled(String),

    #[error("You are already enrolled in this course")]
    AlreadyEnrolled(Box<Enrollment>),

    #[error("This is a paid course. Payment required.")]
    PaymentRequired(PaymentQuote),

    #[error("You have a pending payment for this course. Please wait for confirmation.")]
    PaymentPending(PendingPayment),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type AppResult<T> = Result<T, AppError>;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotEnrolled(_) => StatusCode::FORBIDDEN,
            AppError::AlreadyEnrolled(_) => StatusCode::BAD_REQUEST,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::PaymentPending(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) | AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::AlreadyEnrolled(existing) => json!({
                "error": self.to_string(),
                "data": existing,
            }),
            AppError::PaymentRequired(quote) => json!({
                "error": self.to_string(),
                "requiresPayment": true,
                "data": quote,
            }),
            AppError::PaymentPending(pending) => json!({
                "error": self.to_string(),
                "isPending": true,
                "data": pending,
            }),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                json!({"error": "Internal server error"})
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {}", e);
                json!({"error": "Internal server error"})
            }
            _ => json!({"error": self.to_string()}),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
