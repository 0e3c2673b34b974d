//! Decoded protocol operations and their results
//!
//! The engine never sees wire bytes: the protocol layer hands over an
//! [`Operation`] and receives an [`Outcome`] (or its [`RpcReply`] form).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::defaults::WithDefaults;
use crate::edit::EditOperation;
use crate::error::{NetconfError, RpcError};
use crate::store::Part;

/// NETCONF operations handled by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Get,
    GetConfig,
    EditConfig,
    CopyConfig,
    DeleteConfig,
    Lock,
    Unlock,
    Commit,
    DiscardChanges,
    Validate,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Get => "get",
            OperationKind::GetConfig => "get-config",
            OperationKind::EditConfig => "edit-config",
            OperationKind::CopyConfig => "copy-config",
            OperationKind::DeleteConfig => "delete-config",
            OperationKind::Lock => "lock",
            OperationKind::Unlock => "unlock",
            OperationKind::Commit => "commit",
            OperationKind::DiscardChanges => "discard-changes",
            OperationKind::Validate => "validate",
        };
        f.write_str(name)
    }
}

impl OperationKind {
    /// Whether the operation mutates datastore content
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::EditConfig
                | Self::CopyConfig
                | Self::DeleteConfig
                | Self::Commit
                | Self::DiscardChanges
        )
    }

    pub fn is_read(self) -> bool {
        matches!(self, Self::Get | Self::GetConfig)
    }
}

/// `default-operation` of edit-config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultOperation {
    #[default]
    Merge,
    Replace,
    None,
}

impl DefaultOperation {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "merge" => Some(Self::Merge),
            "replace" => Some(Self::Replace),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl From<DefaultOperation> for EditOperation {
    fn from(op: DefaultOperation) -> Self {
        match op {
            DefaultOperation::Merge => EditOperation::Merge,
            DefaultOperation::Replace => EditOperation::Replace,
            DefaultOperation::None => EditOperation::None,
        }
    }
}

/// `test-option` of edit-config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestOption {
    /// Validate before the change is kept
    #[default]
    TestThenSet,
    /// Apply without validation
    Set,
    /// Validate and throw the change away
    TestOnly,
}

impl TestOption {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "test-then-set" => Some(Self::TestThenSet),
            "set" => Some(Self::Set),
            "test-only" => Some(Self::TestOnly),
            _ => None,
        }
    }
}

/// `error-option` of edit-config, applied across datastores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorOption {
    #[default]
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

impl ErrorOption {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stop-on-error" => Some(Self::StopOnError),
            "continue-on-error" => Some(Self::ContinueOnError),
            "rollback-on-error" => Some(Self::RollbackOnError),
            _ => None,
        }
    }
}

/// Source of copy-config and validate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Part(Part),
    Config(Value),
}

/// A decoded protocol operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub target: Option<Part>,
    pub source: Option<Source>,
    /// edit-config payload
    pub config: Option<Value>,
    /// Subtree filter of get and get-config
    pub filter: Option<Value>,
    #[serde(default)]
    pub default_operation: DefaultOperation,
    #[serde(default)]
    pub test_option: TestOption,
    #[serde(default)]
    pub error_option: ErrorOption,
    #[serde(default)]
    pub with_defaults: WithDefaults,
}

impl Operation {
    /// Create an operation with no parameters
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            target: None,
            source: None,
            config: None,
            filter: None,
            default_operation: DefaultOperation::default(),
            test_option: TestOption::default(),
            error_option: ErrorOption::default(),
            with_defaults: WithDefaults::default(),
        }
    }

    pub fn get() -> Self {
        Self::new(OperationKind::Get)
    }

    pub fn get_config(source: Part) -> Self {
        Self::new(OperationKind::GetConfig).with_source(Source::Part(source))
    }

    pub fn edit_config(target: Part, config: Value) -> Self {
        let mut op = Self::new(OperationKind::EditConfig).with_target(target);
        op.config = Some(config);
        op
    }

    pub fn copy_config(target: Part, source: Source) -> Self {
        Self::new(OperationKind::CopyConfig)
            .with_target(target)
            .with_source(source)
    }

    pub fn delete_config(target: Part) -> Self {
        Self::new(OperationKind::DeleteConfig).with_target(target)
    }

    pub fn lock(target: Part) -> Self {
        Self::new(OperationKind::Lock).with_target(target)
    }

    pub fn unlock(target: Part) -> Self {
        Self::new(OperationKind::Unlock).with_target(target)
    }

    pub fn commit() -> Self {
        Self::new(OperationKind::Commit)
    }

    pub fn discard_changes() -> Self {
        Self::new(OperationKind::DiscardChanges)
    }

    pub fn validate(source: Source) -> Self {
        Self::new(OperationKind::Validate).with_source(source)
    }

    pub fn with_target(mut self, target: Part) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_default_operation(mut self, op: DefaultOperation) -> Self {
        self.default_operation = op;
        self
    }

    pub fn with_test_option(mut self, option: TestOption) -> Self {
        self.test_option = option;
        self
    }

    pub fn with_error_option(mut self, option: ErrorOption) -> Self {
        self.error_option = option;
        self
    }

    pub fn with_defaults(mut self, mode: WithDefaults) -> Self {
        self.with_defaults = mode;
        self
    }

    /// Part the operation reads from, when it names one
    pub fn source_part(&self) -> Option<Part> {
        match &self.source {
            Some(Source::Part(part)) => Some(*part),
            _ => None,
        }
    }

    /// Inline document carried by the operation, if any
    pub fn payload(&self) -> Option<&Value> {
        match (&self.config, &self.source) {
            (Some(config), _) => Some(config),
            (None, Some(Source::Config(config))) => Some(config),
            _ => None,
        }
    }
}

/// Successful result of one operation
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Data(Value),
}

/// Result of applying an operation to one datastore
#[derive(Debug)]
pub enum Outcome {
    Applied(Reply),
    /// The datastore's schema does not cover the operation
    NotApplicable,
    Errored(NetconfError),
}

impl Outcome {
    pub fn is_applicable(&self) -> bool {
        !matches!(self, Outcome::NotApplicable)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Errored(_))
    }
}

impl From<crate::error::Result<Reply>> for Outcome {
    fn from(result: crate::error::Result<Reply>) -> Self {
        match result {
            Ok(reply) => Outcome::Applied(reply),
            Err(err) => Outcome::Errored(err),
        }
    }
}

/// Protocol-facing reply: ok, data or error
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "content")]
pub enum RpcReply {
    Ok,
    Data(Value),
    Error(RpcError),
}

impl From<&Outcome> for RpcReply {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Applied(Reply::Ok) => RpcReply::Ok,
            Outcome::Applied(Reply::Data(data)) => RpcReply::Data(data.clone()),
            Outcome::NotApplicable => RpcReply::Error(RpcError::from(
                &NetconfError::OperationNotSupported("no datastore handles this operation".into()),
            )),
            Outcome::Errored(err) => RpcReply::Error(RpcError::from(err)),
        }
    }
}
