//! Locksystem interface: the storage boundary for active webdav locks.
//!
//! The handler owns all of the LOCK/UNLOCK protocol logic; a locksystem
//! only stores lock records. Included are two implementations:
//!
//! - [`MemLs`][memls::MemLs]: ephemeral in-memory locksystem.
//! - [`FakeLs`][fakels::FakeLs]: fake locksystem. just enough LOCK/UNLOCK
//!   support for macOS/Windows clients.

use std::fmt;
use std::time::SystemTime;

use xmltree::Element;

use crate::davpath::DavPath;

pub mod fakels;
pub mod memls;

/// Scope of a lock: sole writer, or cooperating writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    #[default]
    Exclusive,
    Shared,
}

/// Lock timeout. `Second-N` or `Infinite` on the wire.
///
/// Expiry is advisory: nothing in this library actively removes a lock
/// when its timeout passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DavTimeout {
    Seconds(u64),
    Infinite,
}

impl Default for DavTimeout {
    fn default() -> Self {
        DavTimeout::Seconds(0)
    }
}

impl fmt::Display for DavTimeout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DavTimeout::Seconds(n) => write!(f, "Second-{n}"),
            DavTimeout::Infinite => write!(f, "Infinite"),
        }
    }
}

/// One active lock.
///
/// `token`, `path` and `scope` are fixed at creation; a refresh may only
/// touch `timeout` and `created`.
#[derive(Debug, Clone)]
pub struct DavLock {
    /// Server generated token, raw (without the `opaquelocktoken:` scheme).
    pub token: String,
    /// The path the lock was created on.
    pub path: DavPath,
    /// The authenticated principal that created the lock, if any.
    pub principal: Option<String>,
    /// Client supplied `<D:owner>` fragment, echoed back verbatim.
    pub owner: Option<Element>,
    pub timeout: DavTimeout,
    pub created: SystemTime,
    pub scope: LockScope,
    /// Depth: `false` is depth 0, `true` is depth infinity.
    pub deep: bool,
}

impl DavLock {
    /// New lock on `path` with a fresh token and the RFC defaults
    /// (exclusive, depth 0, no timeout).
    pub fn new(path: DavPath) -> DavLock {
        DavLock {
            token: uuid::Uuid::new_v4().to_string(),
            path,
            principal: None,
            owner: None,
            timeout: DavTimeout::default(),
            created: SystemTime::now(),
            scope: LockScope::default(),
            deep: false,
        }
    }

    /// The token in its `opaquelocktoken:` uri form.
    pub fn uri_token(&self) -> String {
        format!("opaquelocktoken:{}", self.token)
    }
}

/// The locksystem trait: persistence of lock records, nothing more.
///
/// Implementations must make each operation atomic. In particular `lock`
/// must re-validate scope conflicts under its own serialization, so that
/// two concurrent check-then-create attempts cannot both install
/// conflicting exclusive locks.
pub trait DavLockSystem: Send + Sync + 'static {
    /// Every lock whose scope covers `path`: locks on the path itself,
    /// depth-infinity locks on ancestors, and, if `include_children` is
    /// set, locks on descendants of `path` as well.
    fn locks(&self, path: &DavPath, include_children: bool) -> Vec<DavLock>;

    /// Persist a new lock, or refresh the stored record with the same
    /// token. Returns `false` when a conflicting lock got there first.
    fn lock(&self, path: &DavPath, lock: &DavLock) -> bool;

    /// Remove exactly the lock with this record's token. Returns whether
    /// a record was removed.
    fn unlock(&self, path: &DavPath, lock: &DavLock) -> bool;
}
