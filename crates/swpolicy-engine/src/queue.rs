//! Replay queue for failed mutating requests.
//!
//! Requests are replayed in arrival order. Replay stops at the first
//! network failure and keeps the remainder for the next attempt; entries
//! older than the retention window are dropped without being sent.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use swpolicy_rules::ReplayQueue;

use crate::expiration::MAX_SECONDS;
use crate::network::{Network, Request};

#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub request: Request,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayResult {
    pub delivered: usize,
    pub dropped: usize,
    pub remaining: usize,
}

impl ReplayResult {
    pub fn merge(&mut self, other: &ReplayResult) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
        self.remaining += other.remaining;
    }
}

#[derive(Debug, Clone)]
pub struct ReplayQueueState {
    config: ReplayQueue,
    entries: VecDeque<QueuedRequest>,
}

impl ReplayQueueState {
    pub fn new(config: ReplayQueue) -> Self {
        Self {
            config,
            entries: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn push(&mut self, request: Request, now: DateTime<Utc>) {
        self.entries.push_back(QueuedRequest {
            request,
            queued_at: now,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn retention(&self) -> Duration {
        Duration::seconds(self.config.retention_seconds().min(MAX_SECONDS) as i64)
    }

    pub fn replay(&mut self, network: &dyn Network, now: DateTime<Utc>) -> ReplayResult {
        let mut result = ReplayResult::default();
        let retention = self.retention();

        while let Some(entry) = self.entries.pop_front() {
            if now.signed_duration_since(entry.queued_at) > retention {
                result.dropped += 1;
                continue;
            }

            match network.fetch(&entry.request, None) {
                Ok(_) => result.delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        queue = %self.config.name,
                        url = entry.request.href(),
                        error = %e,
                        "replay failed, keeping request queued"
                    );
                    self.entries.push_front(entry);
                    break;
                }
            }
        }

        result.remaining = self.entries.len();
        result
    }
}
