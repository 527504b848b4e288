//! Domain-level error types.
//!
//! These errors are transport agnostic. The excluded HTTP layer maps them to
//! responses; the record store only guarantees a stable [`ErrorCode`] and a
//! human-readable message.

use serde::{Deserialize, Serialize};

use crate::domain::ports::KeyValueStoreError;
use crate::domain::{DecodeError, RecordIdError};

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No record exists for the requested identifier.
    NotFound,
    /// The identifier is empty or contains the key separator.
    InvalidIdentifier,
    /// The page number or size cannot be served.
    InvalidPageRequest,
    /// The query names a field that is not indexed or not a reference.
    InvalidQuery,
    /// The record failed validation before being written.
    InvalidRecord,
    /// Stored data could not be decoded as the target record.
    DecodeError,
    /// The store timed out or the connection failed; retry with backoff.
    StoreUnavailable,
    /// A setting would make the store layout ambiguous.
    InvalidConfiguration,
    /// An unexpected error occurred inside the store or the domain.
    InternalError,
}

impl ErrorCode {
    fn fallback_message(self) -> &'static str {
        match self {
            Self::NotFound => "record not found",
            Self::InvalidIdentifier => "invalid identifier",
            Self::InvalidPageRequest => "invalid page request",
            Self::InvalidQuery => "invalid query",
            Self::InvalidRecord => "invalid record",
            Self::DecodeError => "stored record could not be decoded",
            Self::StoreUnavailable => "store unavailable",
            Self::InvalidConfiguration => "invalid configuration",
            Self::InternalError => "internal error",
        }
    }
}

/// Domain error payload.
///
/// ## Invariants
/// - `message` is never blank; blank input falls back to a per-code default.
///
/// # Examples
/// ```
/// use bookstore::domain::{Error, ErrorCode};
///
/// let err = Error::not_found("Role:admin does not exist");
/// assert_eq!(err.code(), ErrorCode::NotFound);
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
}

impl Error {
    /// Create a new error for `code`.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            code.fallback_message().to_owned()
        } else {
            message
        };
        Self { code, message }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Whether the caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        self.code == ErrorCode::StoreUnavailable
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidIdentifier`].
    pub fn invalid_identifier(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidIdentifier, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidPageRequest`].
    pub fn invalid_page_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPageRequest, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidQuery`].
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidQuery, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidRecord`].
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRecord, message)
    }

    /// Convenience constructor for [`ErrorCode::DecodeError`].
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DecodeError, message)
    }

    /// Convenience constructor for [`ErrorCode::StoreUnavailable`].
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreUnavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::InvalidConfiguration`].
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Convenience constructor for [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl From<KeyValueStoreError> for Error {
    fn from(value: KeyValueStoreError) -> Self {
        match value {
            KeyValueStoreError::Unavailable { message } => Self::store_unavailable(message),
            KeyValueStoreError::Backend { message } => Self::internal(message),
        }
    }
}

impl From<RecordIdError> for Error {
    fn from(value: RecordIdError) -> Self {
        Self::invalid_identifier(value.to_string())
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::decode(value.to_string())
    }
}

impl From<pagination::PageRequestError> for Error {
    fn from(value: pagination::PageRequestError) -> Self {
        Self::invalid_page_request(value.to_string())
    }
}

#[cfg(test)]
mod tests;
