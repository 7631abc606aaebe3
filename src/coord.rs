//! Cross-worker coordination primitives
//!
//! The activity lock and the tombstone cache are the only coordination
//! surface between workers. Both are narrow traits so a shared external
//! store (e.g. Redis) can replace the in-process implementations without
//! touching any call site; handles are injected through the pipeline
//! constructor, never globals.

use async_trait::async_trait;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Build the lock key for an activity: verb-namespace plus stable id.
pub fn lock_key(namespace: &str, activity_id: &str) -> String {
    format!("{}:{}", namespace, activity_id)
}

// =============================================================================
// Activity lock
// =============================================================================

/// Held lock token. Releases on drop, including on panic inside the
/// critical section.
pub struct LockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Mutual exclusion keyed by an inbound activity's stable identifier.
///
/// `try_acquire` waits at most `wait`; `None` means another worker holds
/// the key and the caller should treat the activity as handled elsewhere.
#[async_trait]
pub trait ActivityLock: Send + Sync {
    async fn try_acquire(&self, key: &str, wait: Duration) -> Option<LockGuard>;
}

struct HeldEntry {
    token: String,
    acquired_at: Instant,
}

/// In-process keyed lock with auto-expiry of stale holders.
///
/// Entries left behind by a crashed-mid-section task become reclaimable
/// after `hold_ttl`; release only removes an entry if the token still
/// matches, so an expired-and-stolen key is never released by the old
/// guard.
pub struct KeyedLock {
    entries: Arc<Mutex<HashMap<String, HeldEntry>>>,
    hold_ttl: Duration,
}

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);

fn lock_entries(
    entries: &Mutex<HashMap<String, HeldEntry>>,
) -> MutexGuard<'_, HashMap<String, HeldEntry>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl KeyedLock {
    pub fn new(hold_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            hold_ttl,
        }
    }

    fn try_insert(&self, key: &str) -> Option<LockGuard> {
        let mut entries = lock_entries(&self.entries);

        let reclaimable = match entries.get(key) {
            Some(held) => held.acquired_at.elapsed() >= self.hold_ttl,
            None => true,
        };
        if !reclaimable {
            return None;
        }

        let token = ulid::Ulid::new().to_string();
        entries.insert(
            key.to_string(),
            HeldEntry {
                token: token.clone(),
                acquired_at: Instant::now(),
            },
        );

        let map = Arc::clone(&self.entries);
        let key = key.to_string();
        Some(LockGuard::new(move || {
            let mut entries = lock_entries(&map);
            if entries
                .get(&key)
                .is_some_and(|held| held.token == token)
            {
                entries.remove(&key);
            }
        }))
    }
}

#[async_trait]
impl ActivityLock for KeyedLock {
    async fn try_acquire(&self, key: &str, wait: Duration) -> Option<LockGuard> {
        let deadline = Instant::now() + wait;

        loop {
            if let Some(guard) = self.try_insert(key) {
                return Some(guard);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(LOCK_RETRY_INTERVAL.min(deadline - now)).await;
        }
    }
}

// =============================================================================
// Tombstone cache
// =============================================================================

/// Short-lived "already deleted at the source" markers.
///
/// A race-window suppressor for out-of-order delivery, not an
/// authoritative deletion ledger; entries expire after their TTL.
#[async_trait]
pub trait TombstoneCache: Send + Sync {
    async fn mark_deleted(&self, origin_account_id: &str, activity_id: &str, ttl: Duration);
    async fn is_tombstoned(&self, origin_account_id: &str, activity_id: &str) -> bool;
}

fn tombstone_cache_key(origin_account_id: &str, activity_id: &str) -> String {
    format!("{}:{}", origin_account_id, activity_id)
}

struct TombstoneExpiry;

impl moka::Expiry<String, Duration> for TombstoneExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        ttl: &Duration,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(*ttl)
    }
}

/// In-process tombstone store with per-entry TTL.
pub struct InMemoryTombstones {
    entries: Cache<String, Duration>,
}

impl InMemoryTombstones {
    pub fn new() -> Self {
        let entries = Cache::builder()
            .max_capacity(100_000)
            .expire_after(TombstoneExpiry)
            .build();

        Self { entries }
    }
}

impl Default for InMemoryTombstones {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TombstoneCache for InMemoryTombstones {
    async fn mark_deleted(&self, origin_account_id: &str, activity_id: &str, ttl: Duration) {
        self.entries
            .insert(tombstone_cache_key(origin_account_id, activity_id), ttl)
            .await;

        use crate::metrics::TOMBSTONE_WRITES_TOTAL;
        TOMBSTONE_WRITES_TOTAL
            .with_label_values(&["tombstone"])
            .inc();
    }

    async fn is_tombstoned(&self, origin_account_id: &str, activity_id: &str) -> bool {
        let hit = self
            .entries
            .get(&tombstone_cache_key(origin_account_id, activity_id))
            .await
            .is_some();

        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
        if hit {
            CACHE_HITS_TOTAL.with_label_values(&["tombstone"]).inc();
        } else {
            CACHE_MISSES_TOTAL.with_label_values(&["tombstone"]).inc();
        }

        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_excludes_second_acquirer_until_released() {
        let lock = KeyedLock::new(Duration::from_secs(60));

        let guard = lock
            .try_acquire("post:tag:example,2024:objectId=1", Duration::ZERO)
            .await
            .expect("uncontended acquisition succeeds");

        // Bounded wait on a held key comes back empty.
        assert!(
            lock.try_acquire("post:tag:example,2024:objectId=1", Duration::from_millis(50))
                .await
                .is_none()
        );

        drop(guard);

        assert!(
            lock.try_acquire("post:tag:example,2024:objectId=1", Duration::ZERO)
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn lock_keys_are_independent() {
        let lock = KeyedLock::new(Duration::from_secs(60));

        let _guard = lock.try_acquire("post:a", Duration::ZERO).await.unwrap();
        assert!(lock.try_acquire("post:b", Duration::ZERO).await.is_some());
    }

    #[tokio::test]
    async fn stale_holder_is_reclaimed_after_hold_ttl() {
        let lock = KeyedLock::new(Duration::from_millis(30));

        let stale = lock.try_acquire("post:a", Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // TTL passed without a release: the key can be taken over.
        let fresh = lock
            .try_acquire("post:a", Duration::ZERO)
            .await
            .expect("expired entry is reclaimable");

        // The stale guard must not release the new holder's entry.
        drop(stale);
        assert!(lock.try_acquire("post:a", Duration::ZERO).await.is_none());

        drop(fresh);
        assert!(lock.try_acquire("post:a", Duration::ZERO).await.is_some());
    }

    #[tokio::test]
    async fn tombstones_expire_after_ttl() {
        let tombstones = InMemoryTombstones::new();

        tombstones
            .mark_deleted("acct-1", "tag:example,2024:objectId=1", Duration::from_millis(40))
            .await;
        assert!(
            tombstones
                .is_tombstoned("acct-1", "tag:example,2024:objectId=1")
                .await
        );
        assert!(
            !tombstones
                .is_tombstoned("acct-2", "tag:example,2024:objectId=1")
                .await
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(
            !tombstones
                .is_tombstoned("acct-1", "tag:example,2024:objectId=1")
                .await
        );
    }
}
