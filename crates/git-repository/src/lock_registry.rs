//! Per-ref, process-wide locking.
//!
//! Every ref write is supposed to be totally ordered with respect to other
//! writers of the *same* ref, while writers of different refs never block
//! each other. A plain `Mutex<Index>`-per-repository would serialize
//! unrelated refs; a lock per ref name, created lazily and kept alive for
//! the registry's lifetime, gives the narrower guarantee the spec asks for.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Normalizes a ref path the same way for every caller so `"refs/heads/main"`
/// and `"refs//heads/main"` serialize against each other.
fn normalize(refname: &str) -> String {
    refname.trim_start_matches('/').to_string()
}

/// Holds one `Mutex<()>` per ref name, created on first use.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, refname: &str) -> Arc<Mutex<()>> {
        let key = normalize(refname);
        let mut locks = self.locks.lock().unwrap();
        locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Run `f` while holding the lock for `refname`. Re-entrant calls from
    /// the same thread for the same ref will deadlock, matching the spec's
    /// "re-entrancy not required" note.
    pub fn with_lock<T>(&self, refname: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.entry(refname);
        let _guard: MutexGuard<'_, ()> = lock.lock().unwrap();
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn serializes_writers_of_the_same_ref() {
        let registry = Arc::new(LockRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let registry = registry.clone();
            let counter = counter.clone();
            handles.push(std::thread::spawn(move || {
                registry.with_lock("refs/heads/main", || {
                    let before = counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(before + 1, counter.load(Ordering::SeqCst));
                });
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn different_refs_get_different_locks() {
        let registry = LockRegistry::new();
        let a = registry.entry("refs/heads/a");
        let b = registry.entry("refs/heads/b");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
