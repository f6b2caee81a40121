//! Lazy expiration of cache partitions.
//!
//! Bounds are enforced opportunistically: an entry past `maxAgeSeconds` is
//! treated as a miss when read, and a sweep after every write (or on
//! demand) drops expired entries and then the oldest entries beyond
//! `maxEntries`. A bound of zero is no bound.

use chrono::{DateTime, Duration, Utc};
use swpolicy_rules::Expiration;

use crate::storage::CachedEntry;

/// Outcome of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    /// Entries examined
    pub scanned: usize,
    /// Entries removed for age
    pub expired: usize,
    /// Entries removed for count
    pub evicted: usize,
}

impl SweepResult {
    pub fn merge(&mut self, other: &SweepResult) {
        self.scanned += other.scanned;
        self.expired += other.expired;
        self.evicted += other.evicted;
    }

    pub fn removed(&self) -> usize {
        self.expired + self.evicted
    }
}

/// Largest second count chrono accepts.
pub(crate) const MAX_SECONDS: u64 = i64::MAX as u64 / 1000;

fn max_age(expiration: &Expiration) -> Option<Duration> {
    expiration
        .normalized()
        .max_age_seconds
        .map(|secs| Duration::seconds(secs.min(MAX_SECONDS) as i64))
}

/// Whether `entry` is still within the age bound.
pub fn is_fresh(entry: &CachedEntry, expiration: &Expiration, now: DateTime<Utc>) -> bool {
    match max_age(expiration) {
        Some(limit) => now.signed_duration_since(entry.stored_at) <= limit,
        None => true,
    }
}

/// Apply both bounds to a partition, oldest entries first.
pub fn sweep_partition(
    entries: &mut Vec<CachedEntry>,
    expiration: &Expiration,
    now: DateTime<Utc>,
) -> SweepResult {
    let mut result = SweepResult {
        scanned: entries.len(),
        ..SweepResult::default()
    };

    let before = entries.len();
    entries.retain(|entry| is_fresh(entry, expiration, now));
    result.expired = before - entries.len();

    if let Some(limit) = expiration.normalized().max_entries {
        let limit = limit as usize;
        if entries.len() > limit {
            let excess = entries.len() - limit;
            entries.drain(..excess);
            result.evicted = excess;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Response;
    use chrono::TimeZone;

    fn entry(url: &str, stored_at: DateTime<Utc>) -> CachedEntry {
        CachedEntry {
            url: url.to_string(),
            response: Response::ok("x"),
            stored_at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_count_bound_evicts_oldest() {
        let mut entries = vec![entry("a", t0()), entry("b", t0()), entry("c", t0())];
        let result = sweep_partition(&mut entries, &Expiration::new(Some(2), None), t0());

        assert_eq!(result.evicted, 1);
        let urls: Vec<&str> = entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["b", "c"]);
    }

    #[test]
    fn test_age_bound() {
        let mut entries = vec![
            entry("old", t0()),
            entry("new", t0() + Duration::seconds(250)),
        ];
        let now = t0() + Duration::seconds(301);
        let result = sweep_partition(&mut entries, &Expiration::new(None, Some(300)), now);

        assert_eq!(result.expired, 1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "new");
    }

    #[test]
    fn test_zero_bounds_are_unbounded() {
        let mut entries = vec![entry("a", t0()), entry("b", t0())];
        let later = t0() + Duration::days(30);
        let result = sweep_partition(&mut entries, &Expiration::new(Some(0), Some(0)), later);
        assert_eq!(result.removed(), 0);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut entries = vec![entry("a", t0()), entry("b", t0())];
        let later = t0() + Duration::days(3650);
        let result = sweep_partition(&mut entries, &Expiration::default(), later);
        assert_eq!(result.removed(), 0);
        assert_eq!(result.scanned, 2);
    }

    #[test]
    fn test_is_fresh_boundary() {
        let e = entry("a", t0());
        let policy = Expiration::new(None, Some(60));
        assert!(is_fresh(&e, &policy, t0() + Duration::seconds(60)));
        assert!(!is_fresh(&e, &policy, t0() + Duration::seconds(61)));
    }
}
