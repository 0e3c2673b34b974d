//! Datastore definitions
//!
//! A [`Datastore`] is the unconfigured half of the two-phase protocol: it
//! describes the variant, its models and options. `Registry::init` turns it
//! into a registered [`DatastoreEntry`] with an id.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

use crate::error::{NetconfError, Result};
use crate::model::ModelKey;
use crate::schema::EffectiveSchema;
use crate::store::{CustomBackend, PendingChange, Part, Store, StoreKind};
use crate::validation::{ValidatorPaths, Validators};

/// Registry-assigned datastore handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DatastoreId(pub u32);

impl DatastoreId {
    /// The implicit datastore created with every registry
    pub const INTERNAL: DatastoreId = DatastoreId(0);
}

impl fmt::Display for DatastoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of device state data merged into `get` replies
pub trait StateProvider: Send + Sync {
    fn state_data(&self) -> Result<Value>;
}

impl<F> StateProvider for F
where
    F: Fn() -> Result<Value> + Send + Sync,
{
    fn state_data(&self) -> Result<Value> {
        self()
    }
}

/// Where a model comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A YIN file on disk
    Path(PathBuf),
    /// YIN text held in memory
    Yin(String),
}

/// Unconfigured datastore definition
pub struct Datastore {
    pub(crate) kind: StoreKind,
    pub(crate) model: ModelSource,
    pub(crate) augments: Vec<ModelSource>,
    pub(crate) file: Option<PathBuf>,
    pub(crate) backend: Option<Box<dyn CustomBackend>>,
    pub(crate) state: Option<Box<dyn StateProvider>>,
    pub(crate) validators: ValidatorPaths,
    pub(crate) validation: bool,
    pub(crate) lock_required: BTreeSet<Part>,
}

impl fmt::Debug for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datastore")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("augments", &self.augments)
            .field("file", &self.file)
            .field("validation", &self.validation)
            .field("lock_required", &self.lock_required)
            .finish_non_exhaustive()
    }
}

impl Datastore {
    /// Define a datastore whose base model is a YIN file
    pub fn new(kind: StoreKind, model: impl Into<PathBuf>) -> Self {
        Self::with_model(kind, ModelSource::Path(model.into()))
    }

    /// Define a datastore whose base model is given as YIN text
    pub fn from_yin(kind: StoreKind, yin: impl Into<String>) -> Self {
        Self::with_model(kind, ModelSource::Yin(yin.into()))
    }

    fn with_model(kind: StoreKind, model: ModelSource) -> Self {
        Self {
            kind,
            model,
            augments: Vec::new(),
            file: None,
            backend: None,
            state: None,
            validators: ValidatorPaths::default(),
            validation: true,
            lock_required: BTreeSet::new(),
        }
    }

    /// Backing file of a File datastore
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Implementation of a Custom datastore
    pub fn with_backend(mut self, backend: Box<dyn CustomBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn add_augment(mut self, path: impl Into<PathBuf>) -> Self {
        self.augments.push(ModelSource::Path(path.into()));
        self
    }

    pub fn add_augment_yin(mut self, yin: impl Into<String>) -> Self {
        self.augments.push(ModelSource::Yin(yin.into()));
        self
    }

    pub fn with_state(mut self, provider: impl StateProvider + 'static) -> Self {
        self.state = Some(Box::new(provider));
        self
    }

    /// Explicit companion artifacts, overriding the conventional ones
    pub fn with_validators(mut self, paths: ValidatorPaths) -> Self {
        self.validators = paths;
        self
    }

    pub fn disable_validation(mut self) -> Self {
        self.validation = false;
        self
    }

    /// Writes to `part` require the session to hold its lock
    pub fn require_lock(mut self, part: Part) -> Self {
        self.lock_required.insert(part);
        self
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Configuration completeness check run by `init`
    pub(crate) fn check(&self) -> Result<()> {
        match self.kind {
            StoreKind::File if self.file.is_none() => Err(NetconfError::InvalidConfig(
                "file datastore without a backing file".into(),
            )),
            StoreKind::Custom if self.backend.is_none() => Err(NetconfError::InvalidConfig(
                "custom datastore without a backend".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Mutable part of a registered datastore
pub(crate) struct EntryState {
    pub(crate) store: Box<dyn Store>,
    /// Snapshot of the most recent write, kept for `rollback`
    pub(crate) last_change: Option<PendingChange>,
}

/// A registered datastore
pub struct DatastoreEntry {
    pub(crate) id: DatastoreId,
    pub(crate) kind: StoreKind,
    pub(crate) base: ModelKey,
    pub(crate) augments: Vec<ModelKey>,
    pub(crate) validators: Validators,
    pub(crate) validation: bool,
    pub(crate) lock_required: BTreeSet<Part>,
    pub(crate) state_provider: Option<Box<dyn StateProvider>>,
    pub(crate) schema: RwLock<Option<Arc<EffectiveSchema>>>,
    pub(crate) state: Mutex<EntryState>,
}

impl fmt::Debug for DatastoreEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatastoreEntry")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("base", &self.base)
            .field("augments", &self.augments)
            .field("validation", &self.validation)
            .finish_non_exhaustive()
    }
}

impl DatastoreEntry {
    pub fn id(&self) -> DatastoreId {
        self.id
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Base model name and revision
    pub fn base(&self) -> &ModelKey {
        &self.base
    }

    /// Whether the validation engine has anything to run
    pub fn validates(&self) -> bool {
        self.validation && !self.validators.is_empty()
    }

    /// Current effective schema, failing when consolidation is missing or
    /// older than `generation`
    pub(crate) fn current_schema(&self, generation: u64) -> Result<Arc<EffectiveSchema>> {
        match &*self.schema.read() {
            Some(schema) if schema.generation >= generation => Ok(Arc::clone(schema)),
            _ => Err(NetconfError::NotConsolidated(self.id.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_options() {
        let ds = Datastore::new(StoreKind::File, "/models/toaster.yin")
            .with_file("/var/lib/toaster.json")
            .add_augment("/models/toaster-ext.yin")
            .require_lock(Part::Running)
            .disable_validation();
        assert_eq!(ds.kind(), StoreKind::File);
        assert_eq!(ds.augments.len(), 1);
        assert!(ds.lock_required.contains(&Part::Running));
        assert!(!ds.validation);
        assert!(ds.check().is_ok());
    }

    #[test]
    fn test_incomplete_definitions() {
        assert!(matches!(
            Datastore::new(StoreKind::File, "m.yin").check(),
            Err(NetconfError::InvalidConfig(_))
        ));
        assert!(matches!(
            Datastore::new(StoreKind::Custom, "m.yin").check(),
            Err(NetconfError::InvalidConfig(_))
        ));
        assert!(Datastore::new(StoreKind::Empty, "m.yin").check().is_ok());
    }

    #[test]
    fn test_id_display() {
        assert_eq!(DatastoreId(7).to_string(), "7");
        assert_eq!(DatastoreId::INTERNAL, DatastoreId(0));
    }
}
