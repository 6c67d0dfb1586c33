//! Error types for the storage backends and the client facades.

use http::StatusCode;
use thiserror::Error;

/// Storage service error codes surfaced by table and queue stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // General errors
    InvalidInput,
    OutOfRangeInput,

    // Table-specific errors
    EntityAlreadyExists,
    EntityNotFound,
    InvalidDuplicateRow,
    PropertyNameInvalid,
    TableAlreadyExists,
    TableNotFound,
    TooManyProperties,
    UpdateConditionNotSatisfied,

    // Queue-specific errors
    MessageNotFound,
    MessageTooLarge,
    PopReceiptMismatch,
    QueueAlreadyExists,
    QueueNotFound,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "InvalidInput",
            ErrorCode::OutOfRangeInput => "OutOfRangeInput",
            ErrorCode::EntityAlreadyExists => "EntityAlreadyExists",
            ErrorCode::EntityNotFound => "EntityNotFound",
            ErrorCode::InvalidDuplicateRow => "InvalidDuplicateRow",
            ErrorCode::PropertyNameInvalid => "PropertyNameInvalid",
            ErrorCode::TableAlreadyExists => "TableAlreadyExists",
            ErrorCode::TableNotFound => "TableNotFound",
            ErrorCode::TooManyProperties => "TooManyProperties",
            ErrorCode::UpdateConditionNotSatisfied => "UpdateConditionNotSatisfied",
            ErrorCode::MessageNotFound => "MessageNotFound",
            ErrorCode::MessageTooLarge => "MessageTooLarge",
            ErrorCode::PopReceiptMismatch => "PopReceiptMismatch",
            ErrorCode::QueueAlreadyExists => "QueueAlreadyExists",
            ErrorCode::QueueNotFound => "QueueNotFound",
        }
    }

    /// Returns the HTTP status code the service reports for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ErrorCode::InvalidInput
            | ErrorCode::OutOfRangeInput
            | ErrorCode::InvalidDuplicateRow
            | ErrorCode::PropertyNameInvalid
            | ErrorCode::TooManyProperties
            | ErrorCode::MessageTooLarge
            | ErrorCode::PopReceiptMismatch => StatusCode::BAD_REQUEST,

            // 404 Not Found
            ErrorCode::EntityNotFound
            | ErrorCode::TableNotFound
            | ErrorCode::MessageNotFound
            | ErrorCode::QueueNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            ErrorCode::EntityAlreadyExists
            | ErrorCode::TableAlreadyExists
            | ErrorCode::QueueAlreadyExists => StatusCode::CONFLICT,

            // 412 Precondition Failed
            ErrorCode::UpdateConditionNotSatisfied => StatusCode::PRECONDITION_FAILED,
        }
    }

    /// Returns the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::EntityAlreadyExists => "The specified entity already exists.",
            ErrorCode::EntityNotFound => "The specified resource does not exist.",
            ErrorCode::InvalidDuplicateRow => {
                "The batch request contains multiple changes with same row key."
            }
            ErrorCode::InvalidInput => "One of the request inputs is not valid.",
            ErrorCode::MessageNotFound => "The specified message does not exist.",
            ErrorCode::MessageTooLarge => "The message exceeds the maximum allowed size.",
            ErrorCode::OutOfRangeInput => "One of the request inputs is out of range.",
            ErrorCode::PopReceiptMismatch => {
                "The specified pop receipt did not match the pop receipt for a dequeued message."
            }
            ErrorCode::QueueAlreadyExists => "The specified queue already exists.",
            ErrorCode::QueueNotFound => "The specified queue does not exist.",
            ErrorCode::TableAlreadyExists => "The table specified already exists.",
            ErrorCode::TableNotFound => "The table specified does not exist.",
            ErrorCode::TooManyProperties => "The entity contains more properties than allowed.",
            ErrorCode::UpdateConditionNotSatisfied => {
                "The update condition specified in the request was not satisfied."
            }
            ErrorCode::PropertyNameInvalid => "The property name is invalid.",
        }
    }
}

/// Error returned by a table or queue store.
#[derive(Debug, Clone, Error)]
#[error("{}: {}", .code.as_str(), .message)]
pub struct StorageError {
    pub code: ErrorCode,
    pub message: String,
}

impl StorageError {
    /// Creates a new storage error with the given code and default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.default_message().to_string(),
            code,
        }
    }

    /// Creates a new storage error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// HTTP status the service associates with this error.
    pub fn status(&self) -> StatusCode {
        self.code.status_code()
    }
}

/// Result type alias for store operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by the table and queue clients.
#[derive(Debug, Error)]
pub enum Error {
    /// The settings file or connection string is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied entity, key or name was rejected before reaching the store.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The store rejected the operation. Displays the store's message unchanged.
    #[error("{}", .0.message)]
    Store(#[from] StorageError),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Error::Argument(message.into())
    }

    /// Returns the store error code, if this error came from the store.
    pub fn store_code(&self) -> Option<ErrorCode> {
        match self {
            Error::Store(e) => Some(e.code),
            _ => None,
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
