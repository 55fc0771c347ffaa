//! Process-wide map from coalescing key to the active race group.
//!
//! # Responsibilities
//! - Atomic join-or-create per key (at most one reachable group per key)
//! - Identity-checked removal, so a completed group never evicts its successor
//! - Retirement: close a group's gate and unregister it in one step
//!
//! # Design Decisions
//! - Backed by `DashMap`; the shard lock only covers the lookup or insert,
//!   never a wait on a group mutex held by `complete_all`
//! - A joiner that finds its group already completed retries against the
//!   group registered after it
//! - Lock order is always shard → group, never the reverse

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::hedging::group::{AttemptNumber, RaceGroup, Waiter};
use crate::hedging::key::RequestKey;
use crate::observability::metrics;

/// Shared registry of open race groups.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: DashMap<RequestKey, Arc<RaceGroup>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `waiter` to the group registered for `key`, creating it if absent.
    ///
    /// Concurrent first requests for a key always share one group. A group that
    /// completed between lookup and join is unregistered and the join retried
    /// against a fresh group.
    pub fn join_or_create(
        &self,
        key: RequestKey,
        mut waiter: Waiter,
    ) -> (Arc<RaceGroup>, AttemptNumber) {
        loop {
            let group = self.open_group(&key);
            match group.try_join(waiter) {
                Ok(attempt) => return (group, attempt),
                Err(returned) => {
                    tracing::debug!(key = %key, "Race group completed before join, retrying");
                    self.remove(&key, &group);
                    waiter = returned;
                }
            }
        }
    }

    fn open_group(&self, key: &RequestKey) -> Arc<RaceGroup> {
        let entry = self.groups.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(key = %key, "Creating race group");
            metrics::record_group_created();
            Arc::new(RaceGroup::new(key.clone()))
        });
        Arc::clone(entry.value())
    }

    /// Remove the mapping for `key` only if it still points at `group`.
    pub fn remove(&self, key: &RequestKey, group: &Arc<RaceGroup>) -> bool {
        self.groups
            .remove_if(key, |_, registered| Arc::ptr_eq(registered, group))
            .is_some()
    }

    /// Close the completion gate of `group` with `complete`, unregistering it.
    ///
    /// `complete` is [`RaceGroup::try_complete`] or
    /// [`RaceGroup::try_complete_if_all_failed`]. Gate and removal run under the
    /// entry lock, so a lookup never hands out a completed group that stays
    /// registered. Returns `true` to the single caller that completed the group.
    pub fn retire<F>(&self, key: &RequestKey, group: &Arc<RaceGroup>, complete: F) -> bool
    where
        F: FnOnce(&RaceGroup) -> bool,
    {
        match self.groups.entry(key.clone()) {
            Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), group) => {
                if complete(group) {
                    entry.remove();
                    true
                } else {
                    false
                }
            }
            // Not registered (anymore); the gate still arbitrates.
            _ => complete(group),
        }
    }

    pub fn get(&self, key: &RequestKey) -> Option<Arc<RaceGroup>> {
        self.groups.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hedging::key::KeyGenerator;
    use axum::http::{HeaderMap, Method};
    use std::thread;
    use std::time::Duration;

    fn key(body: &[u8]) -> RequestKey {
        KeyGenerator::default().compute_key(&Method::POST, "http://h/", &HeaderMap::new(), body)
    }

    #[test]
    fn test_same_key_joins_same_group() {
        let registry = GroupRegistry::new();
        let (w1, _r1) = Waiter::channel();
        let (w2, _r2) = Waiter::channel();

        let (g1, a1) = registry.join_or_create(key(b"x"), w1);
        let (g2, a2) = registry.join_or_create(key(b"x"), w2);

        assert!(Arc::ptr_eq(&g1, &g2));
        assert_eq!((a1, a2), (1, 2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_keys_never_share() {
        let registry = GroupRegistry::new();
        let (w1, _r1) = Waiter::channel();
        let (w2, _r2) = Waiter::channel();

        let (g1, _) = registry.join_or_create(key(b"x"), w1);
        let (g2, a2) = registry.join_or_create(key(b"y"), w2);

        assert!(!Arc::ptr_eq(&g1, &g2));
        assert_eq!(a2, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_checks_identity() {
        let registry = GroupRegistry::new();
        let (w, _r) = Waiter::channel();
        let (registered, _) = registry.join_or_create(key(b"x"), w);
        let stale = Arc::new(RaceGroup::new(key(b"x")));

        assert!(!registry.remove(&key(b"x"), &stale));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&key(b"x"), &registered));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_retire_completes_and_unregisters_once() {
        let registry = GroupRegistry::new();
        let (w, _r) = Waiter::channel();
        let (group, _) = registry.join_or_create(key(b"x"), w);

        assert!(registry.retire(&key(b"x"), &group, RaceGroup::try_complete));
        assert!(group.is_completed());
        assert!(registry.get(&key(b"x")).is_none());
        assert!(!registry.retire(&key(b"x"), &group, RaceGroup::try_complete));
    }

    #[test]
    fn test_retire_respects_readiness() {
        let registry = GroupRegistry::new();
        let (w, _r) = Waiter::channel();
        let (group, _) = registry.join_or_create(key(b"x"), w);

        assert!(!registry.retire(&key(b"x"), &group, RaceGroup::try_complete_if_all_failed));
        assert!(!group.is_completed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_new_group_after_retirement() {
        let registry = GroupRegistry::new();
        let (w1, _r1) = Waiter::channel();
        let (first, _) = registry.join_or_create(key(b"x"), w1);
        assert!(registry.retire(&key(b"x"), &first, RaceGroup::try_complete));

        let (w2, _r2) = Waiter::channel();
        let (second, attempt) = registry.join_or_create(key(b"x"), w2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(attempt, 1);
        assert!(!second.is_completed());

        // Retiring the old group again must not evict its successor.
        assert!(!registry.retire(&key(b"x"), &first, RaceGroup::try_complete));
        assert!(!registry.remove(&key(b"x"), &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_first_requests_share_one_group() {
        let registry = Arc::new(GroupRegistry::new());
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let (w, rx) = Waiter::channel();
                    let (group, attempt) = registry.join_or_create(key(b"hot"), w);
                    (group, attempt, rx)
                })
            })
            .collect();

        let joined: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let first = &joined[0].0;
        assert!(joined.iter().all(|(g, _, _)| Arc::ptr_eq(g, first)));

        let mut attempts: Vec<_> = joined.iter().map(|(_, a, _)| *a).collect();
        attempts.sort_unstable();
        assert_eq!(attempts, (1..=32).collect::<Vec<_>>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_join_skips_group_completed_after_lookup() {
        let registry = GroupRegistry::new();
        let (w1, _r1) = Waiter::channel();
        let (stale, _) = registry.join_or_create(key(b"x"), w1);

        // Completed but still registered: the gate closed outside `retire`.
        assert!(stale.try_complete());

        let (w2, mut r2) = Waiter::channel();
        let (fresh, attempt) = registry.join_or_create(key(b"x"), w2);
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert_eq!(attempt, 1);
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get(&key(b"x")).unwrap(), &fresh));
        assert!(r2.try_recv().is_err());
    }

    #[test]
    fn test_blocked_joiner_does_not_stall_other_keys() {
        let registry = Arc::new(GroupRegistry::new());
        let (w, _r) = Waiter::channel();
        let (busy, _) = registry.join_or_create(key(b"busy"), w);

        // Hold the busy group's lock the way `complete_all` does.
        let guard = busy.hold_lock();

        let joiner = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let (w, _r) = Waiter::channel();
                registry.join_or_create(key(b"busy"), w).1
            })
        };
        thread::sleep(Duration::from_millis(50));

        for i in 0..64 {
            let (w, _r) = Waiter::channel();
            let other = key(format!("other-{i}").as_bytes());
            let (_, attempt) = registry.join_or_create(other, w);
            assert_eq!(attempt, 1);
        }

        drop(guard);
        assert_eq!(joiner.join().unwrap(), 2);
        assert_eq!(registry.len(), 65);
    }
}
