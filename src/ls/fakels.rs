//! Fake locksystem.
//!
//! Stores nothing and never refuses anything. Windows and macOS clients
//! insist on locking before they write; this gives them a token to hold
//! on to without any of the mutual exclusion.

use std::sync::Arc;

use super::{DavLock, DavLockSystem};
use crate::davpath::DavPath;

/// Fake locksystem.
pub struct FakeLs;

impl FakeLs {
    /// Create a new "fakels" locksystem.
    pub fn new() -> Arc<FakeLs> {
        Arc::new(FakeLs)
    }
}

impl DavLockSystem for FakeLs {
    fn locks(&self, _path: &DavPath, _include_children: bool) -> Vec<DavLock> {
        Vec::new()
    }

    fn lock(&self, path: &DavPath, lock: &DavLock) -> bool {
        trace!("fakels: pretending to lock {path} with {}", lock.token);
        true
    }

    fn unlock(&self, _path: &DavPath, _lock: &DavLock) -> bool {
        true
    }
}
