//! RPC Dispatcher
//!
//! Routes a decoded [`Operation`] onto one datastore ([`RpcDispatcher::apply`])
//! or every registered datastore ([`RpcDispatcher::apply_to_all`]). Each
//! invocation ends in exactly one of `Applied`, `NotApplicable` or
//! `Errored`.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::datastore::{DatastoreEntry, DatastoreId, EntryState};
use crate::defaults::apply_defaults;
use crate::edit::{apply_edit, strip_annotations};
use crate::error::{NetconfError, Result};
use crate::filter::{apply_filter, selected_roots};
use crate::notify::EngineEvent;
use crate::registry::Registry;
use crate::rpc::{ErrorOption, Operation, OperationKind, Outcome, Reply, Source, TestOption};
use crate::schema::EffectiveSchema;
use crate::session::{Capability, Session};
use crate::store::{Part, PendingChange, StoreKind, empty_document};
use crate::tree::{deep_merge, is_annotation};

/// Which part of a document a datastore is responsible for
#[derive(Debug, Clone, PartialEq)]
enum Scope {
    /// The document names no top-level members
    Everywhere,
    /// Only these members belong to the datastore
    Members(Value),
    Nowhere,
}

/// Restrict a document to the top-level members of `schema`
fn scope(schema: &EffectiveSchema, doc: Option<&Value>) -> Scope {
    let Some(doc) = doc else {
        return Scope::Everywhere;
    };
    let Value::Object(map) = doc else {
        return Scope::Everywhere;
    };
    if selected_roots(doc).is_empty() {
        return Scope::Everywhere;
    }

    let kept: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| {
            let name = if is_annotation(key) { &key[1..] } else { key.as_str() };
            schema.is_model_root(name)
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if kept.keys().all(|k| is_annotation(k)) {
        Scope::Nowhere
    } else {
        Scope::Members(Value::Object(kept))
    }
}

fn require(session: &Session, capability: Capability, what: &str) -> Result<()> {
    if session.has(capability) {
        Ok(())
    } else {
        Err(NetconfError::OperationNotSupported(format!(
            "{what} requires the :{capability} capability"
        )))
    }
}

fn require_part(session: &Session, part: Part) -> Result<()> {
    match part {
        Part::Running => Ok(()),
        Part::Startup => require(session, Capability::Startup, "the startup datastore"),
        Part::Candidate => require(session, Capability::Candidate, "the candidate datastore"),
    }
}

/// Capability checks that only depend on the operation and the session
fn check_capabilities(session: &Session, op: &Operation) -> Result<()> {
    if let Some(target) = op.target {
        require_part(session, target)?;
    }
    if let Some(source) = op.source_part() {
        require_part(session, source)?;
    }

    match op.kind {
        OperationKind::Commit | OperationKind::DiscardChanges => {
            require(session, Capability::Candidate, &op.kind.to_string())?;
        }
        OperationKind::Validate => require(session, Capability::Validate, "validate")?,
        OperationKind::EditConfig | OperationKind::CopyConfig | OperationKind::DeleteConfig
            if op.target == Some(Part::Running) =>
        {
            require(session, Capability::WritableRunning, "writing running")?;
        }
        _ => {}
    }

    if op.kind.is_write() && op.error_option == ErrorOption::RollbackOnError {
        require(session, Capability::RollbackOnError, "rollback-on-error")?;
    }
    Ok(())
}

fn target_of(op: &Operation) -> Result<Part> {
    op.target
        .ok_or_else(|| NetconfError::InvalidValue(format!("{} requires a target", op.kind)))
}

/// Combine the replies of several datastores under one envelope
fn merge_replies(acc: Option<Reply>, next: Reply) -> Reply {
    match (acc, next) {
        (None, reply) => reply,
        (Some(Reply::Data(mut data)), Reply::Data(more)) => {
            deep_merge(&mut data, &more);
            Reply::Data(data)
        }
        (Some(Reply::Data(data)), Reply::Ok) | (Some(Reply::Ok), Reply::Data(data)) => {
            Reply::Data(data)
        }
        (Some(Reply::Ok), Reply::Ok) => Reply::Ok,
    }
}

/// Routes operations onto the datastores of a [`Registry`]
#[derive(Debug, Clone, Copy)]
pub struct RpcDispatcher<'r> {
    registry: &'r Registry,
}

/// Per-invocation context for one datastore
struct Call<'a> {
    registry: &'a Registry,
    entry: &'a DatastoreEntry,
    schema: Arc<EffectiveSchema>,
    session: &'a Session,
    op: &'a Operation,
}

impl<'r> RpcDispatcher<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Apply an operation to one datastore
    pub fn apply(&self, id: DatastoreId, session: &Session, op: &Operation) -> Outcome {
        match self.registry.datastore(id) {
            Ok(entry) => self.apply_entry(&entry, session, op),
            Err(err) => Outcome::Errored(err),
        }
    }

    /// Apply an operation to every datastore in registration order.
    ///
    /// Returns the merged outcome and the ids that did not answer
    /// `NotApplicable`. Scans are serialized against each other and
    /// against `free`.
    pub fn apply_to_all(&self, session: &Session, op: &Operation) -> (Outcome, Vec<DatastoreId>) {
        let _scan = self.registry.scan_guard();

        let mut matched = Vec::new();
        let mut written = Vec::new();
        let mut merged: Option<Reply> = None;
        let mut deferred: Option<NetconfError> = None;

        for entry in self.registry.entries() {
            match self.apply_entry(&entry, session, op) {
                Outcome::NotApplicable => continue,
                Outcome::Applied(reply) => {
                    matched.push(entry.id);
                    written.push(entry.id);
                    merged = Some(merge_replies(merged, reply));
                }
                Outcome::Errored(err) => {
                    matched.push(entry.id);
                    if !op.kind.is_write() {
                        return (Outcome::Errored(err), matched);
                    }
                    match op.error_option {
                        ErrorOption::StopOnError => return (Outcome::Errored(err), matched),
                        ErrorOption::ContinueOnError => {
                            warn!("Datastore {} failed {}: {err}, continuing", entry.id, op.kind);
                            deferred.get_or_insert(err);
                        }
                        ErrorOption::RollbackOnError => {
                            if op.test_option != TestOption::TestOnly {
                                self.undo(&written);
                            }
                            return (Outcome::Errored(err), matched);
                        }
                    }
                }
            }
        }

        let outcome = match (deferred, merged) {
            (Some(err), _) => Outcome::Errored(err),
            (None, Some(reply)) => Outcome::Applied(reply),
            (None, None) => Outcome::NotApplicable,
        };
        (outcome, matched)
    }

    fn undo(&self, ids: &[DatastoreId]) {
        for id in ids.iter().rev() {
            if let Err(err) = self.registry.rollback(*id) {
                error!("Rollback of datastore {id} failed: {err}");
            }
        }
    }

    fn apply_entry(&self, entry: &DatastoreEntry, session: &Session, op: &Operation) -> Outcome {
        debug!("Routing {} to datastore {}", op.kind, entry.id);
        let schema = match entry.current_schema(self.registry.generation()) {
            Ok(schema) => schema,
            Err(err) => return Outcome::Errored(err),
        };
        let call = Call {
            registry: self.registry,
            entry,
            schema,
            session,
            op,
        };
        call.run()
    }
}

impl Call<'_> {
    fn run(&self) -> Outcome {
        let op = self.op;

        let payload = match op.kind {
            OperationKind::EditConfig => match &op.config {
                Some(config) => scope(&self.schema, Some(config)),
                None => {
                    return Outcome::Errored(NetconfError::InvalidValue(
                        "edit-config requires a config".into(),
                    ));
                }
            },
            OperationKind::Get | OperationKind::GetConfig => scope(&self.schema, op.filter.as_ref()),
            _ => match &op.source {
                Some(Source::Config(config)) => scope(&self.schema, Some(config)),
                _ => Scope::Everywhere,
            },
        };
        if payload == Scope::Nowhere {
            return Outcome::NotApplicable;
        }
        if op.kind.is_write() && self.entry.kind == StoreKind::Empty {
            return Outcome::NotApplicable;
        }
        if op.kind == OperationKind::Validate && !self.entry.validates() {
            return Outcome::NotApplicable;
        }

        if let Err(err) = check_capabilities(self.session, op) {
            return Outcome::Errored(err);
        }
        let scoped = match payload {
            Scope::Members(doc) => Some(doc),
            _ => None,
        };

        let result = match op.kind {
            OperationKind::Get => self.get(scoped.as_ref()),
            OperationKind::GetConfig => self.get_config(scoped.as_ref()),
            OperationKind::EditConfig => self.edit_config(scoped.as_ref()),
            OperationKind::CopyConfig => self.copy_config(scoped.as_ref()),
            OperationKind::DeleteConfig => self.delete_config(),
            OperationKind::Lock => target_of(op)
                .and_then(|part| self.registry.lock(self.entry.id, part, self.session.id()))
                .map(|_| Reply::Ok),
            OperationKind::Unlock => target_of(op)
                .and_then(|part| self.registry.unlock(self.entry.id, part, self.session.id()))
                .map(|_| Reply::Ok),
            OperationKind::Commit => self.commit(),
            OperationKind::DiscardChanges => self.discard_changes(),
            OperationKind::Validate => self.validate(scoped.as_ref()),
        };
        if let Err(err) = &result {
            debug!("{} on datastore {} failed: {err}", op.kind, self.entry.id);
        }
        Outcome::from(result)
    }

    fn id(&self) -> DatastoreId {
        self.entry.id
    }

    /// Lock checks for writing `part`; run them while holding the entry state
    /// so no lock can be granted between the check and the write
    fn check_write(&self, part: Part) -> Result<()> {
        let locks = self.registry.lock_manager();
        let session = self.session.id();
        locks.check_writable(self.id(), part, session)?;
        if self.entry.lock_required.contains(&part) {
            locks.check_held(self.id(), part, session)?;
        }
        Ok(())
    }

    /// Defaults handling and filtering of read results
    fn finish_read(&self, mut doc: Value, filter: Option<&Value>) -> Reply {
        apply_defaults(
            &mut doc,
            &self.schema,
            self.entry.validators.defaults.as_ref(),
            self.op.with_defaults,
        );
        Reply::Data(apply_filter(&doc, filter.or(self.op.filter.as_ref())))
    }

    fn get(&self, filter: Option<&Value>) -> Result<Reply> {
        let monitoring = (self.id() == DatastoreId::INTERNAL).then(|| self.registry.netconf_state());
        let provided = match &self.entry.state_provider {
            Some(provider) => Some(provider.state_data()?),
            None => None,
        };

        let mut doc = self.entry.state.lock().store.read(Part::Running)?;
        for state in monitoring.iter().chain(provided.iter()) {
            deep_merge(&mut doc, state);
        }
        Ok(self.finish_read(doc, filter))
    }

    fn get_config(&self, filter: Option<&Value>) -> Result<Reply> {
        let source = self
            .op
            .source_part()
            .ok_or_else(|| NetconfError::InvalidValue("get-config requires a source".into()))?;
        let doc = self.entry.state.lock().store.read(source)?;
        Ok(self.finish_read(doc, filter))
    }

    fn edit_config(&self, edit: Option<&Value>) -> Result<Reply> {
        let target = target_of(self.op)?;
        let edit = match edit.or(self.op.config.as_ref()) {
            Some(edit) => edit,
            None => return Err(NetconfError::InvalidValue("edit-config requires a config".into())),
        };

        let mut state = self.entry.state.lock();
        self.check_write(target)?;
        let mut proposed = state.store.read(target)?;
        apply_edit(
            &mut proposed,
            edit,
            self.op.default_operation.into(),
            Some(&self.schema),
        )?;
        self.store_checked(&mut state, target, proposed)?;
        Ok(Reply::Ok)
    }

    fn copy_config(&self, inline: Option<&Value>) -> Result<Reply> {
        let target = target_of(self.op)?;
        let mut state = self.entry.state.lock();
        self.check_write(target)?;
        let content = match &self.op.source {
            Some(Source::Part(source)) if *source == target => {
                return Err(NetconfError::InvalidValue(format!(
                    "copy-config from {source} onto itself"
                )));
            }
            Some(Source::Part(source)) => state.store.read(*source)?,
            Some(Source::Config(config)) => strip_annotations(inline.unwrap_or(config)),
            None => return Err(NetconfError::InvalidValue("copy-config requires a source".into())),
        };
        self.store_checked(&mut state, target, content)?;
        Ok(Reply::Ok)
    }

    fn delete_config(&self) -> Result<Reply> {
        let target = target_of(self.op)?;
        if target == Part::Running {
            return Err(NetconfError::InvalidValue(
                "the running datastore cannot be deleted".into(),
            ));
        }
        let mut state = self.entry.state.lock();
        self.check_write(target)?;
        self.store(&mut state, target, empty_document(), false)?;
        Ok(Reply::Ok)
    }

    fn commit(&self) -> Result<Reply> {
        let mut state = self.entry.state.lock();
        self.check_write(Part::Running)?;
        self.check_write(Part::Candidate)?;
        let candidate = state.store.read(Part::Candidate)?;
        self.store_checked(&mut state, Part::Running, candidate)?;
        self.registry.lock_manager().clear_candidate(self.id());
        Ok(Reply::Ok)
    }

    fn discard_changes(&self) -> Result<Reply> {
        let mut state = self.entry.state.lock();
        self.check_write(Part::Candidate)?;
        let running = state.store.read(Part::Running)?;
        let before = state.store.snapshot(Part::Candidate)?;
        state.store.write(Part::Candidate, running)?;
        state.last_change = Some(before);
        self.registry.lock_manager().clear_candidate(self.id());
        Ok(Reply::Ok)
    }

    fn validate(&self, inline: Option<&Value>) -> Result<Reply> {
        let doc = match &self.op.source {
            Some(Source::Part(part)) => self.entry.state.lock().store.read(*part)?,
            Some(Source::Config(config)) => strip_annotations(inline.unwrap_or(config)),
            None => return Err(NetconfError::InvalidValue("validate requires a source".into())),
        };
        self.entry.validators.validate(&doc)?;
        Ok(Reply::Ok)
    }

    /// Write honouring the test option: validate, then keep or restore
    fn store_checked(&self, state: &mut EntryState, part: Part, content: Value) -> Result<()> {
        let validate = self.entry.validation && self.op.test_option != TestOption::Set;
        if self.op.test_option == TestOption::TestOnly {
            if validate {
                self.entry.validators.validate(&content)?;
            }
            return Ok(());
        }
        self.store(state, part, content, validate)
    }

    /// Snapshot, write and optionally validate one part.
    ///
    /// A candidate write first claims the process-wide candidate editor;
    /// the claim is given back when the write does not go through.
    fn store(&self, state: &mut EntryState, part: Part, content: Value, validate: bool) -> Result<()> {
        let claimed = match part {
            Part::Candidate => self
                .registry
                .lock_manager()
                .mark_candidate_dirty(self.id(), self.session.id())?,
            _ => false,
        };
        match self.write_part(state, part, &content, validate) {
            Ok(before) => {
                self.committed(state, before, content);
                Ok(())
            }
            Err(err) => {
                if claimed {
                    self.registry.lock_manager().clear_candidate(self.id());
                }
                Err(err)
            }
        }
    }

    fn write_part(
        &self,
        state: &mut EntryState,
        part: Part,
        content: &Value,
        validate: bool,
    ) -> Result<PendingChange> {
        let before = state.store.snapshot(part)?;
        state.store.write(part, content.clone())?;
        if validate {
            if let Err(err) = self.entry.validators.validate(content) {
                if let Err(restore) = state.store.rollback(before) {
                    error!(
                        "Cannot restore {part} of datastore {} after failed validation: {restore}",
                        self.id()
                    );
                }
                return Err(err);
            }
        }
        Ok(before)
    }

    /// Bookkeeping after a write took effect
    fn committed(&self, state: &mut EntryState, before: PendingChange, content: Value) {
        let part = before.part;
        state.last_change = Some(before);
        if part == Part::Candidate {
            return;
        }
        self.registry.publish(EngineEvent::ConfigChange {
            id: self.id(),
            part,
            session: self.session.id().clone(),
            content: Arc::new(content),
        });
    }
}
