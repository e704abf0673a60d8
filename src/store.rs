use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::time::{self, Duration, Instant};

/// Shared handle to the keyspace.
///
/// Cloning is shallow; every component of the server holds the same map.
/// Reads run in parallel, writes serialise behind the lock, and the critical
/// sections never span an await point.
#[derive(Clone)]
pub struct Store {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|instant| instant <= now)
    }
}

impl Store {
    pub fn new() -> Store {
        Store {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn set(&self, key: String, value: Bytes) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key,
            Entry {
                value,
                expires_at: None,
            },
        );
    }

    /// Installs the value and schedules its removal at `now + ttl`.
    ///
    /// Must be called from within a tokio runtime: a timer task performs the
    /// active side of expiration so the entry disappears even if it is never
    /// read again.
    pub fn set_with_ttl(&self, key: String, value: Bytes, ttl: Duration) {
        let expires_at = Instant::now() + ttl;

        {
            let mut entries = self.entries.write().unwrap();
            entries.insert(
                key.clone(),
                Entry {
                    value,
                    expires_at: Some(expires_at),
                },
            );
        }

        let store = self.clone();
        tokio::spawn(async move {
            time::sleep_until(expires_at).await;
            store.remove_expired(&key);
        });
    }

    /// A present-but-expired record reads as absent; its removal is arranged
    /// on the spot rather than left to the timer.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();

        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        self.remove_expired(key);
        None
    }

    pub fn remove(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();

        entries
            .remove(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of raw records, expired tombstones included.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A timer may fire for a key that has since been overwritten, possibly
    // with a later deadline or none at all. The record's current instant is
    // re-checked under the lock, which makes stale timers harmless.
    fn remove_expired(&self, key: &str) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();

        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
