//! In-memory TTL cache.
//!
//! # Design Decisions
//! - DashMap for lock-striped concurrent access; the singleton is shared
//!   by every handler and task
//! - Expired entries are invisible to `get` and removed by `purge_expired`,
//!   which a scheduled task calls

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// The `cache` singleton.
#[derive(Debug, Clone)]
pub struct Cache {
    inner: Arc<DashMap<String, Entry>>,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    /// Store with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        self.inner.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entry = self.inner.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.expires_at > now);
        let purged = before.saturating_sub(self.inner.len());
        if purged > 0 {
            tracing::debug!(purged, remaining = self.inner.len(), "Cache purged");
        }
        purged
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_remove() {
        let cache = Cache::new(Duration::from_secs(60));
        cache.set("user:1", json!({"name": "ada"}));
        assert_eq!(cache.get("user:1"), Some(json!({"name": "ada"})));
        assert_eq!(cache.remove("user:1"), Some(json!({"name": "ada"})));
        assert!(cache.get("user:1").is_none());
    }

    #[test]
    fn expired_entries_hidden_then_purged() {
        let cache = Cache::new(Duration::from_secs(60));
        cache.set_with_ttl("gone", json!(1), Duration::ZERO);
        cache.set("kept", json!(2));

        assert!(cache.get("gone").is_none());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
