//! Per-session turn serialization.
//!
//! Only one engine operation runs per session at a time. A second request
//! arriving while a turn is in flight waits (queue depth = 1); a third is
//! rejected so a stuck session cannot pile up waiters. Distinct sessions
//! proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct LockEntry {
    sem: Arc<Semaphore>,
    waiters: usize,
}

/// Manages per-session turn locks.
///
/// Each session id maps to a `Semaphore(1)`. Holding the permit grants
/// exclusive access for one operation (it auto-releases on drop, including
/// when a request is cancelled mid-turn).
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the turn lock for a session.
    ///
    /// Returns `Ok(permit)` once exclusive; the loser of a race waits for
    /// the winner and then observes its committed state. Returns
    /// `Err(SessionBusy)` when a waiter is already queued.
    pub async fn acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            let entry = locks.entry(session_id.to_owned()).or_insert_with(|| LockEntry {
                sem: Arc::new(Semaphore::new(1)),
                waiters: 0,
            });

            if let Ok(permit) = entry.sem.clone().try_acquire_owned() {
                return Ok(permit);
            }
            if entry.waiters >= 1 {
                return Err(SessionBusy);
            }
            entry.waiters += 1;
            entry.sem.clone()
        };

        // The guard unregisters the waiter even when the request is
        // cancelled while queued.
        let _waiting = WaiterGuard {
            map: self,
            session_id,
        };
        sem.acquire_owned().await.map_err(|_| SessionBusy)
    }

    fn unregister_waiter(&self, session_id: &str) {
        let mut locks = self.locks.lock();
        if let Some(entry) = locks.get_mut(session_id) {
            entry.waiters = entry.waiters.saturating_sub(1);
        }
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries for sessions with no holder and no waiter.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, entry| entry.sem.available_permits() == 0 || entry.waiters > 0);
    }
}

struct WaiterGuard<'a> {
    map: &'a SessionLockMap,
    session_id: &'a str,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.map.unregister_waiter(self.session_id);
    }
}

/// Error returned when a session already has a turn running and a waiter
/// queued.
#[derive(Debug)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session is busy — a turn is already in progress")
    }
}

impl std::error::Error for SessionBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_access() {
        let map = SessionLockMap::new();

        let permit1 = map.acquire("s1").await.unwrap();
        drop(permit1);

        let permit2 = map.acquire("s1").await.unwrap();
        drop(permit2);
    }

    #[tokio::test]
    async fn different_sessions_concurrent() {
        let map = Arc::new(SessionLockMap::new());

        let p1 = map.acquire("s1").await.unwrap();
        let p2 = map.acquire("s2").await.unwrap();

        // Both acquired simultaneously.
        assert_eq!(map.session_count(), 2);

        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn same_session_waits_for_the_winner() {
        let map = Arc::new(SessionLockMap::new());
        let map2 = map.clone();

        let p1 = map.acquire("s1").await.unwrap();

        let handle = tokio::spawn(async move {
            let _p2 = map2.acquire("s1").await.unwrap();
            42
        });

        // Give the waiter a moment to queue.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        drop(p1);

        let result = handle.await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn third_request_is_rejected_as_busy() {
        let map = Arc::new(SessionLockMap::new());
        let map2 = map.clone();

        let _p1 = map.acquire("s1").await.unwrap();
        let _waiter = tokio::spawn(async move { map2.acquire("s1").await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(map.acquire("s1").await.is_err());
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let map = SessionLockMap::new();

        let permit = map.acquire("held").await.unwrap();
        drop(map.acquire("idle").await.unwrap());

        map.prune_idle();
        assert_eq!(map.session_count(), 1);

        drop(permit);
        map.prune_idle();
        assert_eq!(map.session_count(), 0);
    }
}
