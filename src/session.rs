//! Session handle consumed from the transport layer
//!
//! The engine only needs two things from a session: its identity (lock
//! ownership) and the optional capabilities it negotiated.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// NETCONF session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optional NETCONF capabilities relevant to datastore access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// :candidate
    Candidate,
    /// :startup
    Startup,
    /// :writable-running
    WritableRunning,
    /// :rollback-on-error
    RollbackOnError,
    /// :validate
    Validate,
}

impl Capability {
    /// Every capability the engine knows about
    pub const ALL: [Capability; 5] = [
        Capability::Candidate,
        Capability::Startup,
        Capability::WritableRunning,
        Capability::RollbackOnError,
        Capability::Validate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Candidate => "candidate",
            Capability::Startup => "startup",
            Capability::WritableRunning => "writable-running",
            Capability::RollbackOnError => "rollback-on-error",
            Capability::Validate => "validate",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque capability carrier for one client session
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    capabilities: BTreeSet<Capability>,
}

impl Session {
    /// Create a session with the default (full) capability set
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(id),
            capabilities: Capability::ALL.into_iter().collect(),
        }
    }

    /// Create a session with exactly the given capabilities
    pub fn with_capabilities(
        id: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            id: SessionId::new(id),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_has_all_capabilities() {
        let session = Session::new("1");
        for cap in Capability::ALL {
            assert!(session.has(cap));
        }
        assert_eq!(session.id().as_str(), "1");
    }

    #[test]
    fn test_restricted_session() {
        let session = Session::with_capabilities("2", [Capability::Startup]);
        assert!(session.has(Capability::Startup));
        assert!(!session.has(Capability::Candidate));
    }
}
