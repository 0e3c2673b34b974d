//! Empty datastore: a read-only device facade

use serde_json::Value;

use super::{Part, Store, StoreKind, empty_document};
use crate::error::{NetconfError, Result};

/// Datastore that always reads as an empty document and refuses writes
#[derive(Debug, Default, Clone)]
pub struct EmptyStore;

impl EmptyStore {
    pub fn new() -> Self {
        Self
    }
}

impl Store for EmptyStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Empty
    }

    fn read(&self, _part: Part) -> Result<Value> {
        Ok(empty_document())
    }

    fn write(&mut self, part: Part, _content: Value) -> Result<()> {
        Err(NetconfError::Unsupported(format!(
            "the {part} part of an empty datastore is read-only"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_reads_default_document() {
        let store = EmptyStore::new();
        for part in Part::ALL {
            assert_eq!(store.read(part).unwrap(), empty_document());
        }
    }

    #[test]
    fn test_empty_write_unsupported() {
        let mut store = EmptyStore::new();
        let err = store.write(Part::Running, empty_document()).unwrap_err();
        assert!(matches!(err, NetconfError::Unsupported(_)));
    }
}
