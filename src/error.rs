//! Error types for rust-netconf

use thiserror::Error;

use crate::backend::BackendError;

/// Main error type for NETCONF server operations
///
/// Variants map onto the NETCONF `rpc-error` application tags
/// (RFC 6241 appendix A); the dispatcher converts any of these into a
/// single `rpc-error` element in the reply.
#[derive(Debug, Error)]
pub enum NetconfError {
    /// Back-end or internal failure without a more specific tag
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// Unsupported option, URL scheme or capability
    #[error("operation not supported: {0}")]
    OperationNotSupported(String),

    /// Malformed filter, unknown datastore name or bad leaf value
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// `create` on an already existing path
    #[error("data exists at {0}")]
    DataExists(String),

    /// `delete` on an absent path
    #[error("data missing at {0}")]
    DataMissing(String),

    /// Lock conflict or the candidate-differs rule
    #[error("lock denied: {0}")]
    LockDenied(String),

    /// The back-end authorization hook refused the operation
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing/serialization error (schema context descriptions)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<BackendError> for NetconfError {
    fn from(e: BackendError) -> Self {
        use crate::backend::BackendCode;

        match e.code {
            BackendCode::DataExists => NetconfError::DataExists(e.msg),
            BackendCode::DataMissing => NetconfError::DataMissing(e.msg),
            BackendCode::NotFound | BackendCode::UnknownModel => NetconfError::DataMissing(e.msg),
            _ => NetconfError::OperationFailed(e.msg),
        }
    }
}

/// Result type alias for NETCONF server operations
pub type Result<T> = std::result::Result<T, NetconfError>;
