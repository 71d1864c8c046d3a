//! Layered error definitions
//!
//! Categorized by source: lookup / network / document / pull / control

use thiserror::Error;

use crate::MeasurementKind;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Lookup Errors =====
    /// Named component or port is absent
    #[error("'{name}' not found: {message}")]
    NotFound { name: String, message: String },

    /// Component found but of another type
    #[error("type mismatch for '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// Component class is not known to the registry
    #[error("unknown component class '{class}'")]
    UnknownClass { class: String },

    // ===== Network Errors =====
    /// Send attempted without a live connection
    #[error("no connection to server")]
    NotConnected,

    /// Resolving or connecting to the remote peer failed
    #[error("cannot connect to server '{host}' at port '{port}': {message}")]
    ConnectionFailed {
        host: String,
        port: String,
        message: String,
    },

    // ===== Document Errors =====
    /// Malformed document, address or string-encoded measurement
    #[error("parse error: {message}")]
    Parse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Well-formed document that cannot be applied
    #[error("invalid document at '{subgraph}': {message}")]
    InvalidDocument { subgraph: String, message: String },

    // ===== Pull Errors =====
    /// Upstream cannot supply data for the requested timestamp
    #[error("no {kind} measurement available for timestamp {timestamp}: {message}")]
    NotAvailable {
        kind: MeasurementKind,
        timestamp: u64,
        message: String,
    },

    // ===== Control Errors =====
    /// Lifecycle call issued from the dispatch thread
    #[error("'{operation}' cannot be called from the dispatch thread")]
    Reentrant { operation: &'static str },

    /// The control loop is gone
    #[error("dataflow control loop is not running")]
    ControlLoopClosed,

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create not found error
    pub fn not_found(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create type mismatch error
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create parse error keeping the underlying cause
    pub fn parse_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Parse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create invalid document error
    pub fn invalid_document(subgraph: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            subgraph: subgraph.into(),
            message: message.into(),
        }
    }

    /// Create not available error
    pub fn not_available(kind: MeasurementKind, timestamp: u64, message: impl Into<String>) -> Self {
        Self::NotAvailable {
            kind,
            timestamp,
            message: message.into(),
        }
    }

    /// Create connection failed error
    pub fn connection_failed(
        host: impl Into<String>,
        port: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConnectionFailed {
            host: host.into(),
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}
