//! Contains the lock manager.
//!
//! Locks live in two independent trees that mirror the resource hierarchy.
//! The "write" tree holds the locks clients take with LOCK. The "read" tree
//! holds temporary locks that a handler keeps for the duration of a single
//! request, so that concurrent requests on overlapping paths fail fast
//! instead of interleaving.
//!
//! Lookups hand out [`LockedObject`] snapshots; the tree itself never leaves
//! the manager.
use std::time::SystemTime;

use crate::davheaders::Depth;

mod resource_locks;

pub use resource_locks::ResourceLocks;

/// Lifetime of a temporary lock, in seconds.
pub const TEMP_TIMEOUT: u64 = 10;

/// Which tree a lock lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Temporary request-scoped lock.
    Read,
    /// Lock taken by a client.
    Write,
}

/// Snapshot of a node in one of the lock trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedObject {
    pub path: String,
    /// Opaque token, unique within its tree.
    pub id: String,
    pub owners: Vec<String>,
    pub exclusive: bool,
    pub depth: Depth,
    /// `None` means the lock never expires.
    pub expires_at: Option<SystemTime>,
    pub kind: LockKind,
}

impl LockedObject {
    /// A node without owners only exists to hold the tree together.
    pub fn is_locked(&self) -> bool {
        !self.owners.is_empty()
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_shared(&self) -> bool {
        !self.exclusive
    }

    pub fn has_expired(&self) -> bool {
        match self.expires_at {
            Some(t) => t <= SystemTime::now(),
            None => false,
        }
    }

    /// Seconds until expiry, rounded down. `None` if it never expires.
    pub fn time_left(&self) -> Option<u64> {
        let t = self.expires_at?;
        Some(
            t.duration_since(SystemTime::now())
                .map(|d| d.as_secs())
                .unwrap_or(0),
        )
    }

    /// `opaquelocktoken:<id>`.
    pub fn token(&self) -> String {
        format!("opaquelocktoken:{}", self.id)
    }
}
