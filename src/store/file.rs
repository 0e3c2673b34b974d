//! File-backed datastore
//!
//! One file holds the serialized content of all three parts:
//!
//! ```json
//! {"running": {...}, "startup": {...}, "candidate": {...}}
//! ```
//!
//! Reads and writes always operate on the whole file, and a write replaces
//! the file through a rename so readers never see a partial document.
//! Callers serialize access per datastore (the registry holds the datastore
//! mutex from snapshot through commit or rollback).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{PendingChange, Part, Snapshot, Store, StoreKind, empty_document};
use crate::error::{NetconfError, Result};

/// Access mode bits for newly created datastore files
const FILE_MODE: u32 = 0o600;

/// On-disk layout of a datastore file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FileLayout {
    #[serde(default = "empty_document")]
    running: Value,
    #[serde(default = "empty_document")]
    startup: Value,
    #[serde(default = "empty_document")]
    candidate: Value,
}

impl Default for FileLayout {
    fn default() -> Self {
        Self {
            running: empty_document(),
            startup: empty_document(),
            candidate: empty_document(),
        }
    }
}

impl FileLayout {
    fn part(&self, part: Part) -> &Value {
        match part {
            Part::Running => &self.running,
            Part::Startup => &self.startup,
            Part::Candidate => &self.candidate,
        }
    }

    fn part_mut(&mut self, part: Part) -> &mut Value {
        match part {
            Part::Running => &mut self.running,
            Part::Startup => &mut self.startup,
            Part::Candidate => &mut self.candidate,
        }
    }
}

/// Datastore whose parts live in a single file
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<FileLayout> {
        let layout = Self::parse(&fs::read(&self.path)?)?;
        for part in Part::ALL {
            if !layout.part(part).is_object() {
                return Err(NetconfError::InvalidConfig(format!(
                    "{}: the {part} part is not an object",
                    self.path.display()
                )));
            }
        }
        Ok(layout)
    }

    fn parse(bytes: &[u8]) -> Result<FileLayout> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(FileLayout::default());
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    fn store(&self, layout: &FileLayout) -> Result<()> {
        self.replace_with(&serde_json::to_vec_pretty(layout)?)
    }

    /// Swap in new file content through a temporary file in the same directory
    fn replace_with(&self, bytes: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn create(&self) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }
        let mut file = options.open(&self.path).map_err(|e| {
            NetconfError::InvalidConfig(format!(
                "datastore file {} cannot be created: {e}",
                self.path.display()
            ))
        })?;
        file.write_all(&serde_json::to_vec_pretty(&FileLayout::default())?)?;
        Ok(())
    }
}

impl Store for FileStore {
    fn kind(&self) -> StoreKind {
        StoreKind::File
    }

    fn init(&mut self) -> Result<()> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "datastore file does not exist, creating it");
            return self.create();
        }

        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| {
                NetconfError::InvalidConfig(format!(
                    "insufficient rights for datastore file {}: {e}",
                    self.path.display()
                ))
            })?;

        let layout = self.load()?;
        if fs::metadata(&self.path)?.len() == 0 {
            self.store(&layout)?;
        }
        debug!(path = %self.path.display(), "datastore file opened");
        Ok(())
    }

    fn read(&self, part: Part) -> Result<Value> {
        let layout = self.load()?;
        Ok(layout.part(part).clone())
    }

    fn write(&mut self, part: Part, content: Value) -> Result<()> {
        let mut layout = self.load()?;
        *layout.part_mut(part) = content;
        self.store(&layout)
    }

    fn snapshot(&self, part: Part) -> Result<PendingChange> {
        Ok(PendingChange {
            part,
            snapshot: Snapshot::Bytes(fs::read(&self.path)?),
        })
    }

    /// Restore the snapshotted part only. The saved bytes are put back
    /// verbatim when no other part changed since the snapshot.
    fn rollback(&mut self, change: PendingChange) -> Result<()> {
        let bytes = match change.snapshot {
            Snapshot::Bytes(bytes) => bytes,
            Snapshot::Document(content) => return self.write(change.part, content),
        };
        let saved = Self::parse(&bytes)?;
        let mut current = self.load()?;
        let others_unchanged = Part::ALL
            .into_iter()
            .filter(|p| *p != change.part)
            .all(|p| saved.part(p) == current.part(p));
        if others_unchanged {
            return self.replace_with(&bytes);
        }
        *current.part_mut(change.part) = saved.part(change.part).clone();
        self.store(&current)
    }
}
