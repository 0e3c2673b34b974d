//! Datastore registry
//!
//! The [`Registry`] is the explicit home of everything the engine shares
//! between sessions: the model registry, the datastore table, the lock
//! table and the event fan-out. Independent registries never see each
//! other, so tests build as many as they like.
//!
//! Lock order: `scan` -> `datastores` -> `models` -> entry schema/state ->
//! lock table. No path acquires them in the opposite direction.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::datastore::{Datastore, DatastoreEntry, DatastoreId, EntryState, ModelSource};
use crate::dispatch::RpcDispatcher;
use crate::error::{NetconfError, Result};
use crate::lock::{LockManager, LockOutcome, ReleasedLock};
use crate::model::{DataModel, ModelKey};
use crate::models::ModelRegistry;
use crate::monitoring::{self, MONITORING_YIN};
use crate::notify::{EngineEvent, Notifier, Subscription};
use crate::schema::EffectiveSchema;
use crate::session::SessionId;
use crate::store::{CustomStore, EmptyStore, FileStore, Part, Store, StoreKind};
use crate::validation::{ValidatorPaths, Validators};

/// Engine state shared by every session
#[derive(Debug)]
pub struct Registry {
    models: RwLock<ModelRegistry>,
    datastores: RwLock<IndexMap<DatastoreId, Arc<DatastoreEntry>>>,
    next_id: Mutex<u32>,
    locks: LockManager,
    notifier: Notifier,
    /// Held for whole-registry scans and for `free`
    scan: Mutex<()>,
}

impl Registry {
    /// Create a registry holding only the internal datastore (id 0)
    pub fn new() -> Result<Self> {
        let registry = Self {
            models: RwLock::new(ModelRegistry::new()),
            datastores: RwLock::new(IndexMap::new()),
            next_id: Mutex::new(DatastoreId::INTERNAL.0),
            locks: LockManager::new(),
            notifier: Notifier::new(),
            scan: Mutex::new(()),
        };
        registry.init(Datastore::from_yin(StoreKind::Empty, MONITORING_YIN))?;
        registry.consolidate()?;
        Ok(registry)
    }

    // ---- models and features ----

    pub fn models(&self) -> RwLockReadGuard<'_, ModelRegistry> {
        self.models.read()
    }

    pub fn register_search_path(&self, dir: impl AsRef<Path>) -> Result<()> {
        self.models.write().register_search_path(dir)
    }

    pub fn add_model(&self, path: impl AsRef<Path>) -> Result<ModelKey> {
        self.models.write().add_model(path)
    }

    pub fn add_model_yin(&self, content: &str) -> Result<ModelKey> {
        self.models.write().add_model_yin(content)
    }

    pub fn remove_model(&self, name: &str, revision: Option<&str>) -> Result<DataModel> {
        self.models.write().remove_model(name, revision)
    }

    pub fn enable_feature(&self, module: &str, feature: &str) -> Result<()> {
        self.models.write().enable_feature(module, feature)
    }

    pub fn disable_feature(&self, module: &str, feature: &str) -> Result<()> {
        self.models.write().disable_feature(module, feature)
    }

    pub fn enable_all(&self, module: &str) -> Result<()> {
        self.models.write().enable_all(module)
    }

    pub fn disable_all(&self, module: &str) -> Result<()> {
        self.models.write().disable_all(module)
    }

    pub fn is_enabled(&self, module: &str, feature: &str) -> Result<bool> {
        self.models.read().is_enabled(module, feature)
    }

    // ---- datastore lifecycle ----

    fn load_model(&self, source: &ModelSource) -> Result<(ModelKey, ValidatorPaths)> {
        let mut models = self.models.write();
        let key = match source {
            ModelSource::Path(path) => models.add_model(path)?,
            ModelSource::Yin(content) => models.add_model_yin(content)?,
        };
        let model = models
            .get(&key.0, key.1.as_deref())
            .ok_or_else(|| NetconfError::UnknownModule(key.0.clone()))?;
        if model.is_submodule() {
            return Err(NetconfError::InvalidConfig(format!(
                "{} is a submodule and cannot be a datastore model",
                model.name
            )));
        }
        Ok((key, model.validators.clone()))
    }

    /// Register a configured datastore and return its id
    pub fn init(&self, datastore: Datastore) -> Result<DatastoreId> {
        datastore.check()?;
        let Datastore {
            kind,
            model,
            augments,
            file,
            backend,
            state,
            validators,
            validation,
            lock_required,
        } = datastore;

        let (base, conventional) = self.load_model(&model)?;
        let augments = augments
            .iter()
            .map(|source| self.load_model(source).map(|(key, _)| key))
            .collect::<Result<Vec<_>>>()?;

        let validators = if validation {
            Validators::load(&conventional.overridden_by(&validators))?
        } else {
            Validators::default()
        };

        let mut store: Box<dyn Store> = match (kind, file, backend) {
            (StoreKind::Empty, _, _) => Box::new(EmptyStore::new()),
            (StoreKind::File, Some(path), _) => Box::new(FileStore::new(path)),
            (StoreKind::Custom, _, Some(backend)) => Box::new(CustomStore::new(backend)),
            (kind, _, _) => {
                return Err(NetconfError::UnsupportedType(format!("{kind:?}")));
            }
        };
        store.init()?;

        let id = {
            let mut next = self.next_id.lock();
            let id = DatastoreId(*next);
            match next.checked_add(1) {
                Some(following) => *next = following,
                None => {
                    store.close();
                    return Err(NetconfError::ResourceExhausted(
                        "datastore id space is exhausted".into(),
                    ));
                }
            }
            id
        };

        let entry = DatastoreEntry {
            id,
            kind,
            base,
            augments,
            validators,
            validation,
            lock_required,
            state_provider: state,
            schema: RwLock::new(None),
            state: Mutex::new(EntryState {
                store,
                last_change: None,
            }),
        };
        info!(
            "Initialized {:?} datastore {id} for model {}",
            entry.kind, entry.base.0
        );
        self.datastores.write().insert(id, Arc::new(entry));
        Ok(id)
    }

    /// Deregister a datastore, releasing its locks and backing resources
    pub fn free(&self, id: DatastoreId) -> Result<()> {
        if id == DatastoreId::INTERNAL {
            return Err(NetconfError::InvalidHandle(id.0));
        }
        let _scan = self.scan.lock();
        let entry = self
            .datastores
            .write()
            .shift_remove(&id)
            .ok_or(NetconfError::InvalidHandle(id.0))?;

        for (part, session) in self.locks.release_all(id) {
            warn!("Released {part} lock of session {session} on freed datastore {id}");
            self.notifier
                .publish(EngineEvent::DatastoreUnlocked { id, part, session });
        }
        entry.state.lock().store.close();
        *entry.schema.write() = None;
        info!("Freed datastore {id}");
        Ok(())
    }

    /// Build the effective schema of every registered datastore
    pub fn consolidate(&self) -> Result<()> {
        let entries = self.entries();
        let mut models = self.models.write();

        let mut schemas = Vec::with_capacity(entries.len());
        for entry in &entries {
            match models.effective_schema(&entry.base, &entry.augments) {
                Ok(schema) => schemas.push(schema),
                Err(err) => {
                    error!("Consolidation of datastore {} failed: {err}", entry.id);
                    return Err(err);
                }
            }
        }

        // lazy loading during the pass may have moved the generation
        let generation = models.generation();
        for (entry, mut schema) in entries.iter().zip(schemas) {
            schema.generation = generation;
            *entry.schema.write() = Some(Arc::new(schema));
        }
        info!(
            "Consolidated {} datastores at model generation {generation}",
            entries.len()
        );
        Ok(())
    }

    /// Current effective schema of a datastore
    pub fn schema(&self, id: DatastoreId) -> Result<Arc<EffectiveSchema>> {
        let entry = self.datastore(id)?;
        let generation = self.models.read().generation();
        entry.current_schema(generation)
    }

    pub fn datastore(&self, id: DatastoreId) -> Result<Arc<DatastoreEntry>> {
        self.datastores
            .read()
            .get(&id)
            .cloned()
            .ok_or(NetconfError::InvalidHandle(id.0))
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> Vec<DatastoreId> {
        self.datastores.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.datastores.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.datastores.read().is_empty()
    }

    pub(crate) fn entries(&self) -> Vec<Arc<DatastoreEntry>> {
        self.datastores.read().values().cloned().collect()
    }

    pub(crate) fn scan_guard(&self) -> MutexGuard<'_, ()> {
        self.scan.lock()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.models.read().generation()
    }

    /// Content of one part
    pub fn read(&self, id: DatastoreId, part: Part) -> Result<Value> {
        let entry = self.datastore(id)?;
        let state = entry.state.lock();
        state.store.read(part)
    }

    // ---- locking ----

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    pub fn lock(&self, id: DatastoreId, part: Part, session: &SessionId) -> Result<LockOutcome> {
        let entry = self.datastore(id)?;
        // a write in progress on this datastore finishes before the lock is granted
        let mut state = entry.state.lock();
        let outcome = self.locks.lock(id, part, session)?;
        if outcome == LockOutcome::AlreadyHeld {
            return Ok(outcome);
        }

        if let Err(err) = state.store.lock(part, session) {
            // the variant refused, so the lock manager must not keep it
            let _ = self.locks.unlock(id, part, session);
            return Err(err);
        }
        drop(state);
        info!("Session {session} locked {part} of datastore {id}");
        self.notifier.publish(EngineEvent::DatastoreLocked {
            id,
            part,
            session: session.clone(),
        });
        Ok(outcome)
    }

    pub fn unlock(&self, id: DatastoreId, part: Part, session: &SessionId) -> Result<()> {
        let entry = self.datastore(id)?;
        let mut state = entry.state.lock();
        self.locks.unlock(id, part, session)?;
        let hook = state.store.unlock(part, session);
        drop(state);
        info!("Session {session} unlocked {part} of datastore {id}");
        self.notifier.publish(EngineEvent::DatastoreUnlocked {
            id,
            part,
            session: session.clone(),
        });
        hook
    }

    /// Release everything a session holds; call on every session teardown.
    ///
    /// Uncommitted candidate edits of the session are reset from running.
    pub fn break_locks(&self, session: &SessionId) -> Vec<ReleasedLock> {
        let (released, reset) = self.locks.break_locks(session);

        for lock in &released {
            if let Ok(entry) = self.datastore(lock.id) {
                if let Err(err) = entry.state.lock().store.unlock(lock.part, session) {
                    warn!("Unlock hook of datastore {} failed: {err}", lock.id);
                }
            }
            self.notifier.publish(EngineEvent::DatastoreUnlocked {
                id: lock.id,
                part: lock.part,
                session: session.clone(),
            });
        }

        for id in reset {
            let Ok(entry) = self.datastore(id) else {
                continue;
            };
            let mut state = entry.state.lock();
            // another session may have started editing since the locks were broken
            if self.locks.is_candidate_dirty(id) {
                continue;
            }
            let result = state
                .store
                .read(Part::Running)
                .and_then(|running| state.store.write(Part::Candidate, running));
            if let Err(err) = result {
                warn!("Cannot reset candidate of datastore {id}: {err}");
            }
            // undoing would bring the discarded edit back
            if state.last_change.as_ref().is_some_and(|c| c.part == Part::Candidate) {
                state.last_change = None;
            }
        }

        if !released.is_empty() {
            info!("Session {session} torn down, {} locks broken", released.len());
        }
        released
    }

    /// Undo the most recent write of a datastore
    pub fn rollback(&self, id: DatastoreId) -> Result<()> {
        let entry = self.datastore(id)?;
        let mut state = entry.state.lock();
        let change = state
            .last_change
            .take()
            .ok_or(NetconfError::NoPriorChange(id.0))?;
        let part = change.part;
        state.store.rollback(change)?;
        info!("Rolled back the last {part} change of datastore {id}");

        if part != Part::Candidate {
            let content = state.store.read(part)?;
            self.notifier.publish(EngineEvent::ConfigChange {
                id,
                part,
                session: SessionId::from("rollback"),
                content: Arc::new(content),
            });
        }
        Ok(())
    }

    // ---- events and routing ----

    /// Receive engine events on a dedicated worker thread
    pub fn subscribe<F>(&self, handler: F) -> Result<Subscription>
    where
        F: FnMut(EngineEvent) + Send + 'static,
    {
        self.notifier.subscribe(handler)
    }

    pub(crate) fn publish(&self, event: EngineEvent) {
        self.notifier.publish(event);
    }

    pub fn dispatcher(&self) -> RpcDispatcher<'_> {
        RpcDispatcher::new(self)
    }

    /// `netconf-state` as reported by the internal datastore.
    ///
    /// Lock holders come from the first File datastore, falling back to the
    /// first user datastore.
    pub(crate) fn netconf_state(&self) -> Value {
        let entries = self.entries();
        let reported = entries
            .iter()
            .find(|e| e.kind == StoreKind::File)
            .or_else(|| entries.iter().find(|e| e.id != DatastoreId::INTERNAL))
            .map(|e| e.id);

        let locks: Vec<_> = Part::ALL
            .into_iter()
            .map(|part| (part, reported.and_then(|id| self.locks.holder(id, part))))
            .collect();
        let models = self.models.read();
        monitoring::netconf_state(&locks, models.models())
    }
}
