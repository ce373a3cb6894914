//! Named lock registry
//!
//! Some control-plane calls conflict with each other when issued in parallel
//! (e.g. two subnets created in the same VPC zone). Operations that need
//! mutual exclusion take a scoped lock keyed by a resource-family string from
//! a registry that is passed to them explicitly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Registry of async mutexes keyed by name
///
/// Cloning the registry shares the same set of locks. A key is dropped from
/// the registry once nobody holds or waits for it.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    locks: LockMap,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Wait for and acquire the lock named `key`
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn lock(&self, key: impl Into<String>) -> NamedLock {
        let key = key.into();
        let mutex = self.entry(&key);
        tracing::debug!(key = %key, "Waiting for lock");
        let guard = mutex.lock_owned().await;
        tracing::debug!(key = %key, "Acquired lock");
        NamedLock {
            key,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Acquire the lock named `key` only if nobody holds it
    pub fn try_lock(&self, key: impl Into<String>) -> Option<NamedLock> {
        let key = key.into();
        let guard = self.entry(&key).try_lock_owned().ok();
        match guard {
            Some(guard) => Some(NamedLock {
                key,
                guard: Some(guard),
                locks: self.locks.clone(),
            }),
            None => {
                release_unused(&self.locks, &key);
                None
            }
        }
    }

    /// Number of keys currently held or waited for
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// RAII guard for a named lock
#[derive(Debug)]
pub struct NamedLock {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
}

impl NamedLock {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for NamedLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        release_unused(&self.locks, &self.key);
        tracing::debug!(key = %self.key, "Released lock");
    }
}

/// Remove `key` when the registry holds the only reference to its mutex
fn release_unused(locks: &LockMap, key: &str) {
    let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
    if locks
        .get(key)
        .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
    {
        locks.remove(key);
    }
}
