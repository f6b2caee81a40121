//! Named cache partitions.
//!
//! Entries keep insertion order so size-based eviction removes the oldest
//! stored response first. Writes to the same URL replace the previous entry
//! and move it to the newest position; concurrent writers race with last
//! write wins.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::network::Response;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub url: String,
    pub response: Response,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct CacheStorage {
    partitions: Mutex<BTreeMap<String, Vec<CachedEntry>>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_partitions<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Vec<CachedEntry>>) -> R,
    ) -> R {
        let mut partitions = self.partitions.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut partitions)
    }

    pub fn lookup(&self, partition: &str, url: &str) -> Option<CachedEntry> {
        self.with_partitions(|p| {
            p.get(partition)
                .and_then(|entries| entries.iter().find(|e| e.url == url).cloned())
        })
    }

    pub fn put(&self, partition: &str, url: &str, response: Response, now: DateTime<Utc>) {
        self.with_partitions(|p| {
            let entries = p.entry(partition.to_string()).or_default();
            entries.retain(|e| e.url != url);
            entries.push(CachedEntry {
                url: url.to_string(),
                response,
                stored_at: now,
            });
        });
    }

    pub fn delete(&self, partition: &str, url: &str) -> bool {
        self.with_partitions(|p| match p.get_mut(partition) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|e| e.url != url);
                entries.len() != before
            }
            None => false,
        })
    }

    /// Open (create if missing) an empty partition.
    pub fn open(&self, partition: &str) {
        self.with_partitions(|p| {
            p.entry(partition.to_string()).or_default();
        });
    }

    pub fn delete_partition(&self, partition: &str) -> bool {
        self.with_partitions(|p| p.remove(partition).is_some())
    }

    pub fn partition_names(&self) -> Vec<String> {
        self.with_partitions(|p| p.keys().cloned().collect())
    }

    /// URLs in a partition, oldest first.
    pub fn urls(&self, partition: &str) -> Vec<String> {
        self.with_partitions(|p| {
            p.get(partition)
                .map(|entries| entries.iter().map(|e| e.url.clone()).collect())
                .unwrap_or_default()
        })
    }

    pub fn len(&self, partition: &str) -> usize {
        self.with_partitions(|p| p.get(partition).map(Vec::len).unwrap_or(0))
    }

    pub(crate) fn with_partition_mut<R>(
        &self,
        partition: &str,
        f: impl FnOnce(&mut Vec<CachedEntry>) -> R,
    ) -> Option<R> {
        self.with_partitions(|p| p.get_mut(partition).map(f))
    }
}
