//! Lock Manager
//!
//! Tracks `Unlocked -> Locked(session) -> Unlocked` per (datastore, part),
//! and the process-wide candidate editor: candidate content is shared
//! scratch space, so once one session changed a candidate no other session
//! may lock or edit candidates until commit or discard-changes.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::datastore::DatastoreId;
use crate::error::{NetconfError, Result};
use crate::session::SessionId;
use crate::store::Part;

/// A held lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockInfo {
    pub session: SessionId,
    pub acquired: DateTime<Utc>,
}

/// Result of a successful lock call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    /// The caller already held the lock
    AlreadyHeld,
}

/// A lock released by [`LockManager::break_locks`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedLock {
    pub id: DatastoreId,
    pub part: Part,
}

#[derive(Debug, Default)]
struct LockTable {
    held: HashMap<(DatastoreId, Part), LockInfo>,
    /// Session with uncommitted candidate changes
    candidate_editor: Option<SessionId>,
    /// Datastores whose candidate differs from running
    dirty: BTreeSet<DatastoreId>,
}

/// Per-part lock state for every datastore
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a part lock for `session`
    pub fn lock(&self, id: DatastoreId, part: Part, session: &SessionId) -> Result<LockOutcome> {
        let mut table = self.table.lock();

        if part == Part::Candidate {
            if let Some(editor) = &table.candidate_editor {
                if editor != session {
                    return Err(NetconfError::AlreadyLocked {
                        part,
                        holder: editor.clone(),
                    });
                }
            }
        }

        match table.held.get(&(id, part)) {
            Some(info) if info.session == *session => {
                warn!("Session {session} already holds the {part} lock on datastore {id}");
                Ok(LockOutcome::AlreadyHeld)
            }
            Some(info) => Err(NetconfError::AlreadyLocked {
                part,
                holder: info.session.clone(),
            }),
            None => {
                table.held.insert(
                    (id, part),
                    LockInfo {
                        session: session.clone(),
                        acquired: Utc::now(),
                    },
                );
                Ok(LockOutcome::Acquired)
            }
        }
    }

    /// Release a part lock held by `session`
    pub fn unlock(&self, id: DatastoreId, part: Part, session: &SessionId) -> Result<()> {
        let mut table = self.table.lock();
        match table.held.get(&(id, part)) {
            None => Err(NetconfError::NotLocked(part)),
            Some(info) if info.session != *session => Err(NetconfError::WrongOwner {
                part,
                holder: info.session.clone(),
            }),
            Some(_) => {
                table.held.remove(&(id, part));
                Ok(())
            }
        }
    }

    pub fn holder(&self, id: DatastoreId, part: Part) -> Option<LockInfo> {
        self.table.lock().held.get(&(id, part)).cloned()
    }

    /// Fail when another session holds the part
    pub fn check_writable(&self, id: DatastoreId, part: Part, session: &SessionId) -> Result<()> {
        let table = self.table.lock();
        if let Some(info) = table.held.get(&(id, part)) {
            if info.session != *session {
                return Err(NetconfError::WrongOwner {
                    part,
                    holder: info.session.clone(),
                });
            }
        }
        if part == Part::Candidate {
            if let Some(editor) = &table.candidate_editor {
                if editor != session {
                    return Err(NetconfError::AlreadyLocked {
                        part,
                        holder: editor.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Fail unless `session` holds the part
    pub fn check_held(&self, id: DatastoreId, part: Part, session: &SessionId) -> Result<()> {
        match self.table.lock().held.get(&(id, part)) {
            Some(info) if info.session == *session => Ok(()),
            _ => Err(NetconfError::LockRequired(part)),
        }
    }

    /// Claim the candidate editor slot for `session` and mark `id` dirty.
    ///
    /// Fails when another session is the editor. Returns whether `id`
    /// became dirty with this call.
    pub fn mark_candidate_dirty(&self, id: DatastoreId, session: &SessionId) -> Result<bool> {
        let mut table = self.table.lock();
        if let Some(editor) = &table.candidate_editor {
            if editor != session {
                return Err(NetconfError::AlreadyLocked {
                    part: Part::Candidate,
                    holder: editor.clone(),
                });
            }
        }
        table.candidate_editor = Some(session.clone());
        Ok(table.dirty.insert(id))
    }

    /// Forget the candidate change of one datastore
    pub fn clear_candidate(&self, id: DatastoreId) {
        let mut table = self.table.lock();
        table.dirty.remove(&id);
        if table.dirty.is_empty() {
            table.candidate_editor = None;
        }
    }

    pub fn candidate_editor(&self) -> Option<SessionId> {
        self.table.lock().candidate_editor.clone()
    }

    pub fn is_candidate_dirty(&self, id: DatastoreId) -> bool {
        self.table.lock().dirty.contains(&id)
    }

    /// Release every lock held by `session`.
    ///
    /// Returns the released locks and, when the session was the candidate
    /// editor, the datastores whose candidate must be reset.
    pub fn break_locks(&self, session: &SessionId) -> (Vec<ReleasedLock>, Vec<DatastoreId>) {
        let mut table = self.table.lock();

        let mut released: Vec<ReleasedLock> = table
            .held
            .iter()
            .filter(|(_, info)| info.session == *session)
            .map(|((id, part), _)| ReleasedLock { id: *id, part: *part })
            .collect();
        released.sort_by_key(|r| (r.id, r.part));
        for lock in &released {
            table.held.remove(&(lock.id, lock.part));
        }

        let reset = if table.candidate_editor.as_ref() == Some(session) {
            table.candidate_editor = None;
            std::mem::take(&mut table.dirty).into_iter().collect()
        } else {
            Vec::new()
        };

        if !released.is_empty() {
            info!("Broke {} locks held by session {session}", released.len());
        }
        (released, reset)
    }

    /// Drop every lock on a datastore; used when it is freed
    pub fn release_all(&self, id: DatastoreId) -> Vec<(Part, SessionId)> {
        let mut table = self.table.lock();
        let mut released = Vec::new();
        for part in Part::ALL {
            if let Some(info) = table.held.remove(&(id, part)) {
                released.push((part, info.session));
            }
        }
        table.dirty.remove(&id);
        if table.dirty.is_empty() {
            table.candidate_editor = None;
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (DatastoreId, SessionId, SessionId) {
        (DatastoreId(1), SessionId::from("a"), SessionId::from("b"))
    }

    #[test]
    fn test_lock_state_machine() {
        let (id, a, b) = ids();
        let locks = LockManager::new();

        assert_eq!(locks.lock(id, Part::Running, &a).unwrap(), LockOutcome::Acquired);
        assert_eq!(locks.lock(id, Part::Running, &a).unwrap(), LockOutcome::AlreadyHeld);
        assert!(matches!(
            locks.lock(id, Part::Running, &b),
            Err(NetconfError::AlreadyLocked { holder, .. }) if holder == a
        ));
        assert!(matches!(
            locks.unlock(id, Part::Running, &b),
            Err(NetconfError::WrongOwner { .. })
        ));
        locks.unlock(id, Part::Running, &a).unwrap();
        assert!(matches!(
            locks.unlock(id, Part::Running, &a),
            Err(NetconfError::NotLocked(Part::Running))
        ));
    }

    #[test]
    fn test_parts_and_datastores_are_independent() {
        let (id, a, b) = ids();
        let locks = LockManager::new();
        locks.lock(id, Part::Running, &a).unwrap();
        locks.lock(id, Part::Startup, &b).unwrap();
        locks.lock(DatastoreId(2), Part::Running, &b).unwrap();
        assert_eq!(locks.holder(id, Part::Startup).unwrap().session, b);
    }

    #[test]
    fn test_write_checks() {
        let (id, a, b) = ids();
        let locks = LockManager::new();
        assert!(locks.check_writable(id, Part::Running, &b).is_ok());
        assert!(matches!(
            locks.check_held(id, Part::Running, &a),
            Err(NetconfError::LockRequired(Part::Running))
        ));

        locks.lock(id, Part::Running, &a).unwrap();
        assert!(locks.check_held(id, Part::Running, &a).is_ok());
        assert!(matches!(
            locks.check_writable(id, Part::Running, &b),
            Err(NetconfError::WrongOwner { .. })
        ));
    }

    #[test]
    fn test_candidate_editor_blocks_other_sessions() {
        let (id, a, b) = ids();
        let locks = LockManager::new();
        assert!(locks.mark_candidate_dirty(id, &a).unwrap());
        assert!(!locks.mark_candidate_dirty(id, &a).unwrap());
        assert!(matches!(
            locks.mark_candidate_dirty(DatastoreId(2), &b),
            Err(NetconfError::AlreadyLocked { holder, .. }) if holder == a
        ));
        assert!(!locks.is_candidate_dirty(DatastoreId(2)));

        assert!(matches!(
            locks.lock(DatastoreId(2), Part::Candidate, &b),
            Err(NetconfError::AlreadyLocked { .. })
        ));
        assert!(locks.check_writable(id, Part::Candidate, &b).is_err());
        assert!(locks.check_writable(id, Part::Candidate, &a).is_ok());

        locks.clear_candidate(id);
        assert!(locks.candidate_editor().is_none());
        assert!(locks.lock(id, Part::Candidate, &b).is_ok());
    }

    #[test]
    fn test_break_locks() {
        let (id, a, b) = ids();
        let locks = LockManager::new();
        locks.lock(id, Part::Running, &a).unwrap();
        locks.lock(id, Part::Candidate, &a).unwrap();
        locks.lock(DatastoreId(2), Part::Running, &b).unwrap();
        locks.mark_candidate_dirty(id, &a).unwrap();

        let (released, reset) = locks.break_locks(&a);
        assert_eq!(released.len(), 2);
        assert_eq!(reset, vec![id]);
        assert!(locks.holder(id, Part::Running).is_none());
        assert!(locks.holder(DatastoreId(2), Part::Running).is_some());
        assert!(locks.candidate_editor().is_none());
    }

    #[test]
    fn test_release_all() {
        let (id, a, b) = ids();
        let locks = LockManager::new();
        locks.lock(id, Part::Running, &a).unwrap();
        locks.lock(id, Part::Startup, &b).unwrap();
        assert_eq!(locks.release_all(id).len(), 2);
        assert!(locks.lock(id, Part::Running, &b).is_ok());
    }
}
