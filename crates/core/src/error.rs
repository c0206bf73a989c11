//! Register error types.
//!
//! Every failure the register can report to a collaborator is one of these
//! variants. Each carries the structured detail a client needs to render an
//! actionable message (entity, id, requested/available, stored vs. request
//! version) and nothing about storage internals.

use chrono::NaiveDate;
use stockreg_shared::AppError;
use stockreg_shared::types::{ProductId, Quantity, QuantityError, WarehouseId};
use thiserror::Error;
use uuid::Uuid;

/// Result alias for register operations.
pub type RegisterResult<T> = Result<T, RegisterError>;

/// Errors that can occur during register operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// Malformed or missing field, detected before any write.
    #[error("Validation failed on {field}: {message}")]
    Validation {
        /// Offending field (e.g. `lines[2].quantity`).
        field: String,
        /// Human-readable reason.
        message: String,
    },

    /// Not enough stock on hand for an expense.
    #[error(
        "Insufficient stock for product {product_id} in warehouse {warehouse_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        /// Warehouse of the balance row.
        warehouse_id: WarehouseId,
        /// Product of the balance row.
        product_id: ProductId,
        /// Quantity the operation needed.
        requested: Quantity,
        /// Quantity on hand when the lock was taken.
        available: Quantity,
    },

    /// Optimistic version check failed.
    #[error("{entity} {id} was modified concurrently: expected version {expected}, found {actual}")]
    ConcurrentModification {
        /// Entity name (e.g. `document`, `counterparty`).
        entity: &'static str,
        /// Row id.
        id: Uuid,
        /// Version supplied by the caller.
        expected: i32,
        /// Version currently stored.
        actual: i32,
    },

    /// The posting policy forbids touching this date.
    #[error("Period closed: {date} is before {closed_before}")]
    PeriodClosed {
        /// Document date.
        date: NaiveDate,
        /// First open date.
        closed_before: NaiveDate,
    },

    /// Entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity name.
        entity: &'static str,
        /// Requested id.
        id: Uuid,
    },

    /// Operation not allowed in the entity's current state.
    #[error("Invalid state for {id}: {message}")]
    InvalidState {
        /// Entity id.
        id: Uuid,
        /// What was attempted and why it is not allowed.
        message: String,
    },

    /// Storage failure, lock or transaction timeout, or another unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegisterError {
    /// Shorthand for a [`RegisterError::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            Self::PeriodClosed { .. } => "PERIOD_CLOSED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::Validation { .. } => 400,

            // 404 Not Found
            Self::NotFound { .. } => 404,

            // 409 Conflict - concurrency and state errors
            Self::ConcurrentModification { .. } | Self::InvalidState { .. } => 409,

            // 422 Unprocessable - business rules
            Self::InsufficientStock { .. } | Self::PeriodClosed { .. } => 422,

            // 500 Internal Server Error
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// Only optimistic conflicts are: the caller reloads and tries again.
    /// Timeouts and storage errors are left to the collaborator's own policy.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

impl From<QuantityError> for RegisterError {
    fn from(err: QuantityError) -> Self {
        Self::validation("quantity", err.to_string())
    }
}

impl From<RegisterError> for AppError {
    fn from(err: RegisterError) -> Self {
        let message = err.to_string();
        match err {
            RegisterError::Validation { .. } => Self::Validation(message),
            RegisterError::InsufficientStock { .. } | RegisterError::PeriodClosed { .. } => {
                Self::BusinessRule(message)
            }
            RegisterError::ConcurrentModification { .. } | RegisterError::InvalidState { .. } => {
                Self::Conflict(message)
            }
            RegisterError::NotFound { .. } => Self::NotFound(message),
            RegisterError::Internal(_) => Self::Internal(message),
        }
    }
}
