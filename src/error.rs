//! Error types for the Flowgate control plane.
//!
//! Lower layers report `SubstrateError` or `StorageError`; everything is funnelled
//! through `ApiError` and re-coded into a `Status` at the server boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status codes surfaced by every boundary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Code {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    DeadlineExceeded,
    /// Also used to signal that a watch source closed
    ResourceExhausted,
    Internal,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::InvalidArgument => "InvalidArgument",
            Code::NotFound => "NotFound",
            Code::AlreadyExists => "AlreadyExists",
            Code::PermissionDenied => "PermissionDenied",
            Code::DeadlineExceeded => "DeadlineExceeded",
            Code::ResourceExhausted => "ResourceExhausted",
            Code::Internal => "Internal",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coded error: status code plus human readable message
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors reported by the orchestration substrate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubstrateError {
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("Operation cannot be fulfilled: {0}")]
    Conflict(String),

    #[error("The server was unable to return a response in the time allotted: {0}")]
    ServerTimeout(String),

    /// A watch delivered something other than the watched object
    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl SubstrateError {
    pub fn not_found(kind: &str, name: &str) -> Self {
        SubstrateError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SubstrateError::NotFound { .. })
    }

    pub fn is_server_timeout(&self) -> bool {
        matches!(self, SubstrateError::ServerTimeout(_))
    }
}

/// Archive and offload store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("offload node status is not supported")]
    OffloadDisabled,

    #[error("offloaded nodes not found for {uid} at version {version}")]
    OffloadedNodesNotFound { uid: String, version: String },

    #[error("workflow \"{name}\" is too large: node status is {size} bytes, limit is {limit} bytes and offloading is disabled")]
    TooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    #[error("Storage query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Already carries a status code that must survive re-coding
    #[error(transparent)]
    Status(#[from] Status),

    #[error(transparent)]
    Substrate(#[from] SubstrateError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("{0}")]
    Validation(String),

    #[error("unable to CleanFields in request: {0}")]
    Projection(String),

    /// Lifecycle precondition or reformulation failure
    #[error("{0}")]
    Lifecycle(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::StorageError(StorageError::Serialization(err))
    }
}

impl ApiError {
    /// The status code this error already carries, if any. Classified substrate errors
    /// count as coded.
    pub fn code(&self) -> Option<Code> {
        match self {
            ApiError::Status(status) => Some(status.code),
            ApiError::Substrate(SubstrateError::NotFound { .. }) => Some(Code::NotFound),
            ApiError::Substrate(SubstrateError::AlreadyExists { .. }) => Some(Code::AlreadyExists),
            _ => None,
        }
    }
}

/// Re-code an error for the boundary. An error that already carries a status keeps it;
/// anything else is wrapped with `code`.
pub fn to_status(err: impl Into<ApiError>, code: Code) -> Status {
    let err = err.into();
    match err {
        ApiError::Status(status) => status,
        other => Status::new(other.code().unwrap_or(code), other.to_string()),
    }
}

/// Result type alias for internal operations
pub type ApiResult<T> = Result<T, ApiError>;
