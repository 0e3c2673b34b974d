//! Custom datastore delegating to a device-integration backend
//!
//! The engine never owns the content of a custom datastore. It supplies the
//! calling convention and translates backend errors into [`NetconfError`].

use serde_json::Value;

use super::{PendingChange, Part, Snapshot, Store, StoreKind};
use crate::error::{NetconfError, Result};
use crate::session::SessionId;

/// Error type returned by backend implementations
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for backend implementations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Externally supplied datastore implementation
pub trait CustomBackend: Send {
    fn init(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn read(&self, part: Part) -> BackendResult<Value>;

    fn write(&mut self, part: Part, content: &Value) -> BackendResult<()>;

    fn lock(&mut self, _part: Part, _session: &SessionId) -> BackendResult<()> {
        Ok(())
    }

    fn unlock(&mut self, _part: Part, _session: &SessionId) -> BackendResult<()> {
        Ok(())
    }

    /// Undo the last write with the device's own mechanism.
    ///
    /// Returning `Ok(false)` lets the engine write its snapshot back instead.
    fn rollback(&mut self, _part: Part) -> BackendResult<bool> {
        Ok(false)
    }

    fn close(&mut self) {}
}

/// [`Store`] adapter around a [`CustomBackend`]
pub struct CustomStore {
    backend: Box<dyn CustomBackend>,
}

impl std::fmt::Debug for CustomStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomStore").finish_non_exhaustive()
    }
}

impl CustomStore {
    pub fn new(backend: Box<dyn CustomBackend>) -> Self {
        Self { backend }
    }
}

/// Backends may return a [`NetconfError`] directly; anything else is wrapped.
fn translate(err: BackendError) -> NetconfError {
    match err.downcast::<NetconfError>() {
        Ok(err) => *err,
        Err(other) => NetconfError::Backend(other.to_string()),
    }
}

impl Store for CustomStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Custom
    }

    fn init(&mut self) -> Result<()> {
        self.backend.init().map_err(translate)
    }

    fn read(&self, part: Part) -> Result<Value> {
        self.backend.read(part).map_err(translate)
    }

    fn write(&mut self, part: Part, content: Value) -> Result<()> {
        self.backend.write(part, &content).map_err(translate)
    }

    fn lock(&mut self, part: Part, session: &SessionId) -> Result<()> {
        self.backend.lock(part, session).map_err(translate)
    }

    fn unlock(&mut self, part: Part, session: &SessionId) -> Result<()> {
        self.backend.unlock(part, session).map_err(translate)
    }

    fn rollback(&mut self, change: PendingChange) -> Result<()> {
        if self.backend.rollback(change.part).map_err(translate)? {
            return Ok(());
        }
        match change.snapshot {
            Snapshot::Document(content) => self.write(change.part, content),
            Snapshot::Bytes(_) => Err(NetconfError::Unsupported(
                "custom datastore cannot restore a raw snapshot".into(),
            )),
        }
    }

    fn close(&mut self) {
        self.backend.close();
    }
}
