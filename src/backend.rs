//! Back-end datastore interface
//!
//! The configuration engine that actually persists running, startup
//! and candidate is an external collaborator; this module is the
//! interface the server consumes from it. A [`Backend`] value stands
//! for one engine connection (dropping it disconnects); each NETCONF
//! session starts one [`BackendSession`] and keeps it for its
//! lifetime (dropping it stops the engine session).
//!
//! All engine calls may block the calling worker; in-memory work in
//! the rest of the crate does not.

use crate::protocol::{Datastore, SessionOptions};
use crate::value::DsValue;

/// Engine error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCode {
    /// Path or iterator target does not exist
    NotFound,
    /// Path refers to a module the engine does not know
    UnknownModel,
    /// Strict create on an existing path
    DataExists,
    /// Strict delete on an absent path
    DataMissing,
    /// The engine's validation rejected the pending changes
    ValidationFailed,
    /// Anything else
    Other,
}

/// Error returned by engine calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub code: BackendCode,
    pub msg: String,
}

impl BackendError {
    pub fn new(code: BackendCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for BackendError {}

/// Result type alias for engine calls
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// One item of a datastore read: instance path, tagged value and the
/// engine's default flag
#[derive(Debug, Clone, PartialEq)]
pub struct BackendItem {
    pub path: String,
    pub value: DsValue,
    pub dflt: bool,
}

/// One engine session, owned by exactly one NETCONF session
pub trait BackendSession: Send {
    /// Point the session at another datastore
    fn switch_ds(&mut self, ds: Datastore) -> BackendResult<()>;

    /// Update session options (config-only reads)
    fn set_options(&mut self, opts: SessionOptions) -> BackendResult<()>;

    /// Re-read the session's view of its current datastore
    fn refresh(&mut self) -> BackendResult<()>;

    /// Every item under `xpath`, in the engine's tree order.
    /// `NotFound`/`UnknownModel` mean a model without data and are
    /// handled by the caller.
    fn get_items(&mut self, xpath: &str) -> BackendResult<Vec<BackendItem>>;

    /// Create or update the node at `xpath`; interior nodes pass no
    /// value. `strict` makes an existing node a `DataExists` error.
    fn set_item(&mut self, xpath: &str, value: Option<&DsValue>, strict: bool)
    -> BackendResult<()>;

    /// Delete the subtree at `xpath`. `strict` makes an absent node a
    /// `DataMissing` error.
    fn delete_item(&mut self, xpath: &str, strict: bool) -> BackendResult<()>;

    /// Validate the session's pending changes without applying them
    fn validate(&mut self) -> BackendResult<()>;

    /// Persist the session's pending changes into its current
    /// datastore. When that datastore is the candidate, the engine
    /// also folds the committed candidate into running.
    fn commit(&mut self) -> BackendResult<()>;

    /// Drop the session's pending changes (engine-level rollback)
    fn discard_changes(&mut self) -> BackendResult<()>;

    /// Authorization hook: may the session's user execute the
    /// operation identified by `xpath`?
    fn check_exec_permission(&mut self, xpath: &str) -> BackendResult<bool>;
}

/// One engine connection, shared by every NETCONF session
pub trait Backend: Send + Sync {
    /// Start an engine session on `ds` with the given options
    fn session_start(
        &self,
        ds: Datastore,
        opts: SessionOptions,
    ) -> BackendResult<Box<dyn BackendSession>>;

    /// Whether the engine persists a startup datastore (drives the
    /// `:startup` capability)
    fn has_startup(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetconfError;

    #[test]
    fn test_error_code_mapping() {
        let e: NetconfError = BackendError::new(BackendCode::DataExists, "exists").into();
        assert!(matches!(e, NetconfError::DataExists(_)));

        let e: NetconfError = BackendError::new(BackendCode::DataMissing, "missing").into();
        assert!(matches!(e, NetconfError::DataMissing(_)));

        let e: NetconfError = BackendError::new(BackendCode::ValidationFailed, "bad").into();
        assert!(matches!(e, NetconfError::OperationFailed(_)));

        let e: NetconfError = BackendError::new(BackendCode::Other, "boom").into();
        assert!(matches!(e, NetconfError::OperationFailed(_)));
    }
}
