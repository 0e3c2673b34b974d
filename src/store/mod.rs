//! Datastore variants
//!
//! Every datastore holds three parts (running, startup, candidate). The
//! [`Store`] trait is the capability set the dispatcher drives; Empty, File
//! and Custom are its concrete implementations.

pub mod custom;
pub mod empty;
pub mod file;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{NetconfError, Result};
use crate::session::SessionId;

pub use custom::{BackendError, BackendResult, CustomBackend, CustomStore};
pub use empty::EmptyStore;
pub use file::FileStore;

/// One of the three configuration datastores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Part {
    Running,
    Startup,
    Candidate,
}

impl Part {
    pub const ALL: [Part; 3] = [Part::Running, Part::Startup, Part::Candidate];

    pub fn as_str(self) -> &'static str {
        match self {
            Part::Running => "running",
            Part::Startup => "startup",
            Part::Candidate => "candidate",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Part {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Part::Running),
            "startup" => Ok(Part::Startup),
            "candidate" => Ok(Part::Candidate),
            other => Err(NetconfError::InvalidValue(format!(
                "unknown datastore part: {other}"
            ))),
        }
    }
}

/// Datastore implementation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Read-only device facade
    Empty,
    /// All three parts serialized into one file
    File,
    /// Delegates to an externally supplied backend
    Custom,
}

impl FromStr for StoreKind {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "empty" => Ok(StoreKind::Empty),
            "file" => Ok(StoreKind::File),
            "custom" => Ok(StoreKind::Custom),
            other => Err(NetconfError::UnsupportedType(other.to_string())),
        }
    }
}

/// Saved content of a part, taken right before a write
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Parsed content of the part
    Document(Value),
    /// Raw bytes of the whole backing file
    Bytes(Vec<u8>),
}

/// Snapshot of a datastore part taken immediately before a write
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub part: Part,
    pub snapshot: Snapshot,
}

/// Capability set shared by all datastore variants
pub trait Store: Send {
    fn kind(&self) -> StoreKind;

    /// Prepare backing resources; called once by `Registry::init`
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&self, part: Part) -> Result<Value>;

    fn write(&mut self, part: Part, content: Value) -> Result<()>;

    /// Variant hook run after the lock manager granted the lock
    fn lock(&mut self, _part: Part, _session: &SessionId) -> Result<()> {
        Ok(())
    }

    /// Variant hook run after the lock manager released the lock
    fn unlock(&mut self, _part: Part, _session: &SessionId) -> Result<()> {
        Ok(())
    }

    fn snapshot(&self, part: Part) -> Result<PendingChange> {
        Ok(PendingChange {
            part,
            snapshot: Snapshot::Document(self.read(part)?),
        })
    }

    /// Restore the state captured by `snapshot`
    fn rollback(&mut self, change: PendingChange) -> Result<()> {
        match change.snapshot {
            Snapshot::Document(content) => self.write(change.part, content),
            Snapshot::Bytes(_) => Err(NetconfError::Unsupported(format!(
                "{:?} datastore cannot restore a raw snapshot",
                self.kind()
            ))),
        }
    }

    /// Release backing resources; called once by `Registry::free`
    fn close(&mut self) {}
}

/// The content of an empty part
pub fn empty_document() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_parse_and_display() {
        for part in Part::ALL {
            assert_eq!(part.as_str().parse::<Part>().unwrap(), part);
            assert_eq!(part.to_string(), part.as_str());
        }
        assert!("url".parse::<Part>().is_err());
    }

    #[test]
    fn test_store_kind_rejects_unknown_type() {
        assert_eq!("file".parse::<StoreKind>().unwrap(), StoreKind::File);
        assert!(matches!(
            "sql".parse::<StoreKind>(),
            Err(NetconfError::UnsupportedType(_))
        ));
    }
}
