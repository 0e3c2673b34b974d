//! Error types for rust-netconf

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::session::SessionId;
use crate::store::Part;

/// Main error type for datastore engine operations
#[derive(Debug, Error)]
pub enum NetconfError {
    /// Malformed schema artifact or document
    #[error("Parse error: {0}")]
    Parse(String),

    /// Companion validator artifact absent (non-fatal, the stage is skipped)
    #[error("Missing artifact for model {model}: {}", .path.display())]
    MissingArtifact { model: String, path: PathBuf },

    /// Module not known to the model registry
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// Feature not defined by the module
    #[error("Unknown feature {feature} in module {module}")]
    UnknownFeature { module: String, feature: String },

    /// Import, include or grouping cycle detected during consolidation
    #[error("Cyclic reference: {0}")]
    CyclicReference(String),

    /// Referenced module, grouping or augment target cannot be located
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    /// Datastore definition is incomplete or inaccessible
    #[error("Invalid datastore configuration: {0}")]
    InvalidConfig(String),

    /// Datastore implementation type not supported in this context
    #[error("Unsupported datastore type: {0}")]
    UnsupportedType(String),

    /// Id space or other resource exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// No datastore registered under this id
    #[error("Invalid datastore handle: {0}")]
    InvalidHandle(u32),

    /// Capability not provided by the datastore variant
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Part already locked by another session (maps to lock-denied)
    #[error("The {part} datastore is locked by session {holder}")]
    AlreadyLocked { part: Part, holder: SessionId },

    /// Unlock of a part nobody holds
    #[error("The {0} datastore is not locked")]
    NotLocked(Part),

    /// Part held by a different session (maps to in-use)
    #[error("The {part} datastore is locked by another session ({holder})")]
    WrongOwner { part: Part, holder: SessionId },

    /// Write requires the session to hold the lock first
    #[error("The {0} datastore must be locked before it is modified")]
    LockRequired(Part),

    /// Grammar or semantic validation failure
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        path: Option<String>,
    },

    /// Rollback requested with no stored snapshot
    #[error("No prior change to roll back on datastore {0}")]
    NoPriorChange(u32),

    /// Effective schema missing or stale for routing
    #[error("Datastore {0} has not been consolidated since its last model change")]
    NotConsolidated(u32),

    /// Operation or option not supported for this session
    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    /// Request parameter value rejected
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// edit-config create on existing data
    #[error("Data already exists: {0}")]
    DataExists(String),

    /// edit-config delete on missing data
    #[error("Data missing: {0}")]
    DataMissing(String),

    /// Error reported by an externally supplied backend
    #[error("Backend error: {0}")]
    Backend(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Engine configuration parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl NetconfError {
    /// Shorthand for a validation failure at a location path
    pub fn validation(message: impl Into<String>, path: impl Into<String>) -> Self {
        NetconfError::Validation {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// RFC 6241 error-tag this error is reported with
    pub fn tag(&self) -> ErrorTag {
        match self {
            NetconfError::AlreadyLocked { .. } => ErrorTag::LockDenied,
            NetconfError::WrongOwner { .. } => ErrorTag::InUse,
            NetconfError::LockRequired(_) => ErrorTag::InUse,
            NetconfError::NotLocked(_) => ErrorTag::OperationFailed,
            NetconfError::Validation { .. } | NetconfError::InvalidValue(_) => {
                ErrorTag::InvalidValue
            }
            NetconfError::DataExists(_) => ErrorTag::DataExists,
            NetconfError::DataMissing(_) => ErrorTag::DataMissing,
            NetconfError::OperationNotSupported(_) | NetconfError::Unsupported(_) => {
                ErrorTag::OperationNotSupported
            }
            NetconfError::ResourceExhausted(_) => ErrorTag::ResourceDenied,
            _ => ErrorTag::OperationFailed,
        }
    }

    /// Whether the error belongs to initialization time and must abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NetconfError::Parse(_)
                | NetconfError::InvalidConfig(_)
                | NetconfError::UnsupportedType(_)
                | NetconfError::CyclicReference(_)
                | NetconfError::UnresolvedReference(_)
                | NetconfError::ResourceExhausted(_)
        )
    }
}

/// RFC 6241 error-tag values produced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    LockDenied,
    ResourceDenied,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
}

impl std::fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
        };
        f.write_str(tag)
    }
}

/// Serializable rpc-error handed back to the protocol layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub tag: ErrorTag,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<&NetconfError> for RpcError {
    fn from(err: &NetconfError) -> Self {
        let path = match err {
            NetconfError::Validation { path, .. } => path.clone(),
            _ => None,
        };
        RpcError {
            tag: err.tag(),
            message: err.to_string(),
            path,
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, NetconfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_errors_map_to_protocol_tags() {
        let holder = SessionId::from("7");
        let denied = NetconfError::AlreadyLocked {
            part: Part::Running,
            holder: holder.clone(),
        };
        assert_eq!(denied.tag(), ErrorTag::LockDenied);
        assert_eq!(
            NetconfError::WrongOwner {
                part: Part::Candidate,
                holder
            }
            .tag(),
            ErrorTag::InUse
        );
        assert!(!denied.is_fatal());
    }

    #[test]
    fn test_validation_error_keeps_path() {
        let err = NetconfError::validation("bad type", "/toaster:toaster/darkness");
        let rpc = RpcError::from(&err);
        assert_eq!(rpc.tag, ErrorTag::InvalidValue);
        assert_eq!(rpc.path.as_deref(), Some("/toaster:toaster/darkness"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(NetconfError::UnresolvedReference("x".into()).is_fatal());
        assert!(NetconfError::CyclicReference("x".into()).is_fatal());
        assert!(!NetconfError::NoPriorChange(1).is_fatal());
    }
}
