//! Ephemeral in-memory locksystem.
//!
//! The reference locksystem. All records live in one map behind a mutex,
//! and `lock` re-validates scope conflicts while holding it, so a
//! check-then-create from two requests cannot race.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{DavLock, DavLockSystem, LockScope};
use crate::davpath::DavPath;

/// Ephemeral in-memory locksystem.
pub struct MemLs {
    locks: Mutex<BTreeMap<String, Vec<DavLock>>>,
}

impl MemLs {
    /// Create a new "memls" locksystem.
    pub fn new() -> Arc<MemLs> {
        Arc::new(MemLs {
            locks: Mutex::new(BTreeMap::new()),
        })
    }
}

// canonical map key: no trailing slash, except for the root.
fn key(path: &DavPath) -> String {
    let s = path.as_str();
    if s.len() > 1 {
        s.trim_end_matches('/').to_string()
    } else {
        s.to_string()
    }
}

// is `a` a strict ancestor of `b` (both in canonical key form).
fn is_ancestor(a: &str, b: &str) -> bool {
    b.len() > a.len() && b.starts_with(a) && (a == "/" || b.as_bytes()[a.len()] == b'/')
}

fn covering_locks<'a>(
    map: &'a BTreeMap<String, Vec<DavLock>>,
    path: &str,
    include_children: bool,
) -> Vec<&'a DavLock> {
    let mut found = Vec::new();
    for (entry_path, locks) in map.iter() {
        if entry_path == path {
            found.extend(locks.iter());
        } else if is_ancestor(entry_path, path) {
            found.extend(locks.iter().filter(|l| l.deep));
        } else if include_children && is_ancestor(path, entry_path) {
            found.extend(locks.iter());
        }
    }
    found
}

impl DavLockSystem for MemLs {
    fn locks(&self, path: &DavPath, include_children: bool) -> Vec<DavLock> {
        let map = self.locks.lock();
        covering_locks(&map, &key(path), include_children)
            .into_iter()
            .cloned()
            .collect()
    }

    fn lock(&self, path: &DavPath, lock: &DavLock) -> bool {
        let mut map = self.locks.lock();
        let k = key(path);

        // refresh in place when the token is already there.
        if let Some(stored) = map
            .get_mut(&k)
            .and_then(|v| v.iter_mut().find(|l| l.token == lock.token))
        {
            stored.timeout = lock.timeout;
            stored.created = lock.created;
            return true;
        }

        // re-validate under the mutex: the handler did this check too, but
        // only here is it serialized against other writers.
        for cover in covering_locks(&map, &k, false) {
            if cover.scope == LockScope::Exclusive || lock.scope == LockScope::Exclusive {
                debug!("memls: refusing lock on {k}: conflict with {}", cover.token);
                return false;
            }
        }

        map.entry(k).or_default().push(lock.clone());
        true
    }

    fn unlock(&self, path: &DavPath, lock: &DavLock) -> bool {
        let mut map = self.locks.lock();
        let k = key(path);
        let removed = match map.get_mut(&k) {
            Some(list) => {
                let len = list.len();
                list.retain(|l| l.token != lock.token);
                len != list.len()
            }
            None => false,
        };
        if removed && map.get(&k).map(|l| l.is_empty()).unwrap_or(false) {
            map.remove(&k);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ls::DavTimeout;

    fn path(s: &str) -> DavPath {
        DavPath::from_str_and_prefix(s, "").unwrap()
    }

    fn lock_on(s: &str) -> DavLock {
        DavLock::new(path(s))
    }

    #[test]
    fn exclusive_conflicts() {
        let ls = MemLs::new();
        let l1 = lock_on("/a.txt");
        assert!(ls.lock(&l1.path.clone(), &l1));

        // second exclusive on the same path is refused.
        let l2 = lock_on("/a.txt");
        assert!(!ls.lock(&l2.path.clone(), &l2));

        // shared against exclusive is refused too.
        let mut l3 = lock_on("/a.txt");
        l3.scope = LockScope::Shared;
        assert!(!ls.lock(&l3.path.clone(), &l3));
    }

    #[test]
    fn shared_coexist() {
        let ls = MemLs::new();
        let mut l1 = lock_on("/s.txt");
        l1.scope = LockScope::Shared;
        let mut l2 = lock_on("/s.txt");
        l2.scope = LockScope::Shared;
        assert!(ls.lock(&l1.path.clone(), &l1));
        assert!(ls.lock(&l2.path.clone(), &l2));
        assert_eq!(ls.locks(&path("/s.txt"), false).len(), 2);

        // but adding an exclusive one is refused.
        let l3 = lock_on("/s.txt");
        assert!(!ls.lock(&l3.path.clone(), &l3));
    }

    #[test]
    fn deep_ancestor_covers_children() {
        let ls = MemLs::new();
        let mut l1 = lock_on("/dir/");
        l1.deep = true;
        assert!(ls.lock(&l1.path.clone(), &l1));

        let found = ls.locks(&path("/dir/sub/child.txt"), false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].token, l1.token);

        // a shallow lock on an ancestor does not cover children.
        let ls = MemLs::new();
        let l2 = lock_on("/dir/");
        assert!(ls.lock(&l2.path.clone(), &l2));
        assert!(ls.locks(&path("/dir/child.txt"), false).is_empty());
    }

    #[test]
    fn include_children_lists_descendants() {
        let ls = MemLs::new();
        let l1 = lock_on("/dir/a.txt");
        let l2 = lock_on("/dir/sub/b.txt");
        let l3 = lock_on("/other.txt");
        for l in [&l1, &l2, &l3] {
            assert!(ls.lock(&l.path.clone(), l));
        }
        let found = ls.locks(&path("/dir/"), true);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|l| l.token != l3.token));
    }

    #[test]
    fn refresh_in_place() {
        let ls = MemLs::new();
        let mut l1 = lock_on("/r.txt");
        assert!(ls.lock(&l1.path.clone(), &l1));

        l1.timeout = DavTimeout::Seconds(3600);
        assert!(ls.lock(&l1.path.clone(), &l1));

        let found = ls.locks(&path("/r.txt"), false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].timeout, DavTimeout::Seconds(3600));
        assert_eq!(found[0].scope, LockScope::Exclusive);
    }

    #[test]
    fn unlock_removes_exactly_one() {
        let ls = MemLs::new();
        let mut l1 = lock_on("/u.txt");
        l1.scope = LockScope::Shared;
        let mut l2 = lock_on("/u.txt");
        l2.scope = LockScope::Shared;
        assert!(ls.lock(&l1.path.clone(), &l1));
        assert!(ls.lock(&l2.path.clone(), &l2));

        assert!(ls.unlock(&l1.path.clone(), &l1));
        let left = ls.locks(&path("/u.txt"), false);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].token, l2.token);

        // unknown token removes nothing.
        assert!(!ls.unlock(&l1.path.clone(), &l1));
    }
}
