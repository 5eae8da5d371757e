//! Per-instance exclusive locks
//!
//! Every engine operation that advances or mutates an instance holds that
//! instance's lock for its whole duration. Locks of different instances are
//! independent.

use crate::domain::process_instance::ProcessInstanceId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard for one instance; the lock is released on drop
pub struct InstanceGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Table of per-instance async mutexes
#[derive(Default)]
pub struct InstanceLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InstanceLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `instance_id`
    pub async fn acquire(&self, instance_id: &ProcessInstanceId) -> InstanceGuard {
        let lock = self
            .locks
            .entry(instance_id.0.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        InstanceGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Drop the table entry for `instance_id` if nobody holds or waits on it
    pub fn release_idle(&self, instance_id: &ProcessInstanceId) {
        self.locks
            .remove_if(&instance_id.0, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of instances with a lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(value: &str) -> ProcessInstanceId {
        ProcessInstanceId(value.to_string())
    }

    #[tokio::test]
    async fn test_same_instance_is_exclusive() {
        let locks = Arc::new(InstanceLocks::new());
        let guard = locks.acquire(&id("a")).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&id("a")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_instances_are_independent() {
        let locks = InstanceLocks::new();
        let _a = locks.acquire(&id("a")).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&id("b")))
            .await
            .expect("lock for another instance should be free");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_release_idle() {
        let locks = InstanceLocks::new();
        let guard = locks.acquire(&id("a")).await;

        // Held locks stay in the table
        locks.release_idle(&id("a"));
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.release_idle(&id("a"));
        assert!(locks.is_empty());
    }
}
