//! NETCONF protocol types and constants
//!
//! This module defines transport-agnostic types for the NETCONF
//! operations layer. These abstractions allow the core to work with any
//! session/transport implementation (SSH, TLS, test harness).

use crate::tree::DataTree;

/// Namespace of the NETCONF base protocol
pub const NS_NETCONF_BASE: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Namespace of the with-defaults extension (RFC 6243)
pub const NS_WITH_DEFAULTS: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-with-defaults";

/// Configuration datastore selector (RFC 6241 §5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datastore {
    Running,
    Startup,
    Candidate,
}

impl Datastore {
    /// Resolve a `source`/`target` child element name to a datastore
    pub fn from_element_name(name: &str) -> Option<Self> {
        match name {
            "running" => Some(Self::Running),
            "startup" => Some(Self::Startup),
            "candidate" => Some(Self::Candidate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Startup => "startup",
            Self::Candidate => "candidate",
        }
    }
}

impl std::fmt::Display for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// with-defaults reply modes (RFC 6243 §3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WithDefaults {
    /// Report all data nodes, including defaults
    #[default]
    ReportAll,
    /// Report all, annotating default nodes with `wd:default="true"`
    ReportAllTagged,
    /// Omit any leaf whose value equals its schema default
    Trim,
    /// Report only explicitly set configuration
    Explicit,
}

impl WithDefaults {
    /// Parse the value of a `with-defaults` leaf
    pub fn from_leaf_value(s: &str) -> Option<Self> {
        match s {
            "report-all" => Some(Self::ReportAll),
            "report-all-tagged" => Some(Self::ReportAllTagged),
            "trim" => Some(Self::Trim),
            "explicit" => Some(Self::Explicit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReportAll => "report-all",
            Self::ReportAllTagged => "report-all-tagged",
            Self::Trim => "trim",
            Self::Explicit => "explicit",
        }
    }
}

/// Per-session back-end options
///
/// `config_only` restricts reads to configuration data; it is what
/// separates `get-config` from `get` on the same back-end session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOptions {
    pub config_only: bool,
}

impl SessionOptions {
    pub const CONFIG_ONLY: Self = Self { config_only: true };
}

/// NETCONF `rpc-error` application tags used by this server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    OperationFailed,
    OperationNotSupported,
    InvalidValue,
    DataExists,
    DataMissing,
    LockDenied,
    AccessDenied,
}

impl ErrorTag {
    /// The tag string as it appears in the `error-tag` element
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OperationFailed => "operation-failed",
            Self::OperationNotSupported => "operation-not-supported",
            Self::InvalidValue => "invalid-value",
            Self::DataExists => "data-exists",
            Self::DataMissing => "data-missing",
            Self::LockDenied => "lock-denied",
            Self::AccessDenied => "access-denied",
        }
    }
}

impl std::fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `rpc-error` element of a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub tag: ErrorTag,
    /// `error-type`; always "application" for errors raised here
    pub error_type: &'static str,
    pub message: String,
    /// `error-path` of the offending node, when known
    pub path: Option<String>,
}

impl RpcError {
    pub fn new(tag: ErrorTag, message: impl Into<String>) -> Self {
        Self {
            tag,
            error_type: "application",
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<&crate::error::NetconfError> for RpcError {
    fn from(e: &crate::error::NetconfError) -> Self {
        use crate::error::NetconfError as E;

        let tag = match e {
            E::OperationNotSupported(_) => ErrorTag::OperationNotSupported,
            E::InvalidValue(_) => ErrorTag::InvalidValue,
            E::DataExists(_) => ErrorTag::DataExists,
            E::DataMissing(_) => ErrorTag::DataMissing,
            E::LockDenied(_) => ErrorTag::LockDenied,
            E::AccessDenied(_) => ErrorTag::AccessDenied,
            _ => ErrorTag::OperationFailed,
        };
        RpcError::new(tag, e.to_string())
    }
}

/// The outcome of one RPC (RFC 6241 §4.2)
#[derive(Debug)]
pub enum RpcReply {
    /// `<ok/>`
    Ok,
    /// `<data>` carrying an assembled tree and the with-defaults mode
    /// it was built under (the transport needs it for serialization)
    Data(DataTree, WithDefaults),
    /// One or more `rpc-error` elements
    Errors(Vec<RpcError>),
}

impl RpcReply {
    /// Single-error reply
    pub fn error(e: RpcError) -> Self {
        Self::Errors(vec![e])
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Capability URNs supplied by the core to the transport layer
///
/// The transport advertises these during the hello exchange. `startup`
/// and `url` are conditional on back-end/server configuration.
pub fn capabilities(startup: bool, url: bool, wd_basic: WithDefaults) -> Vec<String> {
    let mut caps = vec![
        "urn:ietf:params:netconf:base:1.0".to_string(),
        "urn:ietf:params:netconf:base:1.1".to_string(),
        "urn:ietf:params:netconf:capability:candidate:1.0".to_string(),
        "urn:ietf:params:netconf:capability:validate:1.1".to_string(),
        "urn:ietf:params:netconf:capability:xpath:1.0".to_string(),
        format!(
            "urn:ietf:params:netconf:capability:with-defaults:1.0?basic-mode={}&also-supported=report-all,report-all-tagged,trim,explicit",
            wd_basic.as_str()
        ),
    ];
    if startup {
        caps.push("urn:ietf:params:netconf:capability:startup:1.0".to_string());
    }
    if url {
        caps.push("urn:ietf:params:netconf:capability:url:1.0?scheme=file".to_string());
    }
    caps
}
