//! Error handling for the SupplyMate backend
//!
//! Provides consistent error responses in English and Indonesian

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{IntegrityError, OrderAction, OrderStatus, StockError, TransitionError};
use thiserror::Error;
use uuid::Uuid;

/// Partial unique index keeping scan codes unique among active products
pub const UNIQUE_CODE_INDEX: &str = "products_unique_code_active_idx";

/// Partial unique index keeping emails unique among active accounts
pub const USER_EMAIL_INDEX: &str = "users_email_active_idx";

/// Foreign keys tying ledger entries and inputs to the acting account
const ACTOR_FOREIGN_KEYS: [&str; 2] = ["stock_ledger_entries_actor_fk", "stock_inputs_user_fk"];

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        message_id: String,
    },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_id: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate scan code: {0}")]
    DuplicateCode(String),

    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid transition: cannot {action} an order that is {from}")]
    InvalidTransition {
        from: OrderStatus,
        action: OrderAction,
    },

    #[error("Ledger entry {entry_id} is an order reservation; cancel the order to release it")]
    ReservationHeldByOrder {
        entry_id: Uuid,
        order_id: Option<Uuid>,
    },

    #[error("Insufficient stock for product {product_id}: available {available}, change {delta}")]
    InsufficientStock {
        product_id: Uuid,
        available: Decimal,
        delta: Decimal,
    },

    // Contention errors
    #[error("Busy: {0}")]
    Busy(String),

    // Corrupted state; never retried
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Field-level validation failure with both message languages
    pub fn validation(field: &str, message: &str, message_id: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_id: message_id.to_string(),
        }
    }

    /// Only contention is worth retrying; everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Busy(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => {
                AppError::Busy("timed out waiting for a database connection".to_string())
            }
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // lock_not_available: lock_timeout elapsed
                Some("55P03") => AppError::Busy("timed out waiting for a row lock".to_string()),
                Some("40P01") => AppError::Busy("deadlock detected".to_string()),
                Some("40001") => AppError::Busy("serialization failure".to_string()),
                // The catalog swaps in the offending code; see `ProductService`
                Some("23505") if db.constraint() == Some(UNIQUE_CODE_INDEX) => {
                    AppError::DuplicateCode(UNIQUE_CODE_INDEX.to_string())
                }
                Some("23505") if db.constraint() == Some(USER_EMAIL_INDEX) => {
                    AppError::DuplicateEmail(USER_EMAIL_INDEX.to_string())
                }
                Some("23503")
                    if db
                        .constraint()
                        .is_some_and(|c| ACTOR_FOREIGN_KEYS.contains(&c)) =>
                {
                    AppError::NotFound("User".to_string())
                }
                _ => AppError::DatabaseError(err),
            },
            _ => AppError::DatabaseError(err),
        }
    }
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::Insufficient {
                product_id,
                available,
                delta,
            } => AppError::InsufficientStock {
                product_id,
                available,
                delta,
            },
            StockError::AlreadyReversed(id) => {
                AppError::NotFound(format!("Unreversed ledger entry {}", id))
            }
            StockError::ReversalOfReversal(_) => AppError::validation(
                "entry_id",
                "A reversal entry cannot itself be reversed",
                "Entri pembalikan tidak dapat dibalik lagi",
            ),
            StockError::ZeroDelta => AppError::validation(
                "delta",
                "Stock change must not be zero",
                "Perubahan stok tidak boleh nol",
            ),
            StockError::UnknownProduct(id) => {
                AppError::InvariantViolation(format!("product {} changed without holding its lock", id))
            }
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::InvalidTransition {
            from: err.from,
            action: err.action,
        }
    }
}

impl From<IntegrityError> for AppError {
    fn from(err: IntegrityError) -> Self {
        AppError::InvariantViolation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ErrorDetail {
    fn new(code: &str, message_en: String, message_id: String) -> Self {
        Self {
            code: code.to_string(),
            message_en,
            message_id,
            field: None,
            retryable: false,
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

impl AppError {
    fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new(
                    "TOKEN_EXPIRED",
                    "Token has expired".to_string(),
                    "Token sudah kedaluwarsa".to_string(),
                ),
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new(
                    "INVALID_TOKEN",
                    "Invalid token".to_string(),
                    "Token tidak valid".to_string(),
                ),
            ),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action".to_string(),
                    "Anda tidak memiliki izin untuk melakukan tindakan ini".to_string(),
                ),
            ),
            AppError::Unauthorized { message, message_id } => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone(), message_id.clone()),
            ),
            AppError::Validation {
                field,
                message,
                message_id,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_id.clone())
                    .with_field(field),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(
                    "VALIDATION_ERROR",
                    msg.clone(),
                    format!("Data tidak valid: {}", msg),
                ),
            ),
            AppError::DuplicateCode(code) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "DUPLICATE_CODE",
                    format!("Another active product already uses code {}", code),
                    format!("Kode {} sudah dipakai produk lain", code),
                )
                .with_field("unique_code"),
            ),
            AppError::DuplicateEmail(email) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "DUPLICATE_EMAIL",
                    format!("An active account already uses {}", email),
                    format!("Email {} sudah terdaftar", email),
                )
                .with_field("email"),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "NOT_FOUND",
                    format!("{} not found", resource),
                    format!("{} tidak ditemukan", resource),
                ),
            ),
            AppError::InvalidTransition { from, action } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INVALID_TRANSITION",
                    format!("Cannot {} an order that is {}", action, from),
                    format!(
                        "Pesanan berstatus {} tidak dapat di-{}",
                        from.label_id(),
                        action
                    ),
                ),
            ),
            AppError::ReservationHeldByOrder { .. } => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "RESERVATION_HELD_BY_ORDER",
                    "Order reservations are released by cancelling the order".to_string(),
                    "Reservasi pesanan hanya dapat dilepas dengan membatalkan pesanan".to_string(),
                )
                .with_field("entry_id"),
            ),
            AppError::InsufficientStock {
                available, delta, ..
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INSUFFICIENT_STOCK",
                    format!("Insufficient stock: available {}, requested {}", available, -*delta),
                    format!("Stok tidak cukup: tersedia {}, diminta {}", available, -*delta),
                )
                .with_field("product_id"),
            ),
            AppError::Busy(_) => {
                let mut detail = ErrorDetail::new(
                    "BUSY",
                    "The resource is busy, please retry shortly".to_string(),
                    "Data sedang diproses, silakan coba lagi".to_string(),
                );
                detail.retryable = true;
                (StatusCode::SERVICE_UNAVAILABLE, detail)
            }
            AppError::InvariantViolation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INVARIANT_VIOLATION",
                    "Stored data is inconsistent; the incident has been logged".to_string(),
                    "Data tersimpan tidak konsisten; kejadian telah dicatat".to_string(),
                ),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    "Terjadi kesalahan pada basis data".to_string(),
                ),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    msg.clone(),
                    "Terjadi kesalahan internal server".to_string(),
                ),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    "Terjadi kesalahan internal server".to_string(),
                ),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        match &self {
            AppError::InvariantViolation(msg) => {
                tracing::error!(violation = %msg, "Invariant violation")
            }
            _ if status.is_server_error() => tracing::error!("Error: {:?}", self),
            _ => tracing::debug!("Request rejected: {}", self),
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
