//! Worker lifecycle and per-request strategy dispatch.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use swpolicy_rules::{CachingRule, CompiledRuleSet, Expiration, RuleError, RuleSet, Strategy};

use crate::clock::Clock;
use crate::expiration::{is_fresh, sweep_partition, SweepResult};
use crate::network::{FetchError, Network, Request, Response};
use crate::queue::{ReplayQueueState, ReplayResult};
use crate::storage::CacheStorage;

/// Partition holding precached assets.
pub const PRECACHE_PARTITION: &str = "precache";

/// Partition used by caching rules that do not name one.
const DEFAULT_RUNTIME_PARTITION: &str = "runtime";

/// `type` of the message that forces activation.
pub const SKIP_WAITING_MESSAGE: &str = "SKIP_WAITING";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("failed to precache {url}: {reason}")]
    PrecacheFailed { url: String, reason: String },

    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: WorkerState,
    },

    #[error("fetch failed: {0}")]
    Network(#[from] FetchError),

    #[error("no cached response for {url} in '{cache}'")]
    CacheMiss { cache: String, url: String },
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Precache,
    Cache,
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The engine answered the request.
    Response {
        response: Response,
        source: ResponseSource,
        /// Index of the matching rule; `None` for precache hits.
        rule: Option<usize>,
    },
    /// No rule matched; the browser fetches normally.
    Passthrough,
    /// The request failed and was stored for replay.
    Queued { queue: String },
    Failed(EngineError),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Response { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Response { source, .. } => Some(*source),
            _ => None,
        }
    }
}

/// Page-side cancellation of an in-flight request.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One worker instance for one origin.
pub struct Engine {
    rule_set: RuleSet,
    routes: CompiledRuleSet,
    storage: CacheStorage,
    queues: Mutex<BTreeMap<String, ReplayQueueState>>,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(
        rule_set: RuleSet,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let routes = rule_set.compile()?;

        let mut queues = BTreeMap::new();
        for queue in rule_set.replay_queues() {
            queues
                .entry(queue.name.clone())
                .or_insert_with(|| ReplayQueueState::new(queue.clone()));
        }

        Ok(Self {
            skip_waiting: AtomicBool::new(rule_set.lifecycle.skip_waiting),
            rule_set,
            routes,
            storage: CacheStorage::new(),
            queues: Mutex::new(queues),
            state: Mutex::new(WorkerState::Installing),
            clients_claimed: AtomicBool::new(false),
            network,
            clock,
        })
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn expect_state(&self, expected: WorkerState, action: &'static str) -> Result<(), EngineError> {
        let state = self.state();
        if state != expected {
            return Err(EngineError::InvalidState { action, state });
        }
        Ok(())
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    /// Precache every manifest entry, then wait or activate.
    ///
    /// A failed precache makes the worker redundant, like a rejected
    /// install in the browser.
    pub fn install(&self) -> Result<WorkerState, EngineError> {
        self.expect_state(WorkerState::Installing, "install")?;

        self.storage.open(PRECACHE_PARTITION);
        for entry in self.rule_set.precache.entries() {
            let request = Request::get(&entry.url)?;
            let outcome = self.network.fetch(&request, None);
            let response = match outcome {
                Ok(response) if response.is_cacheable() => response,
                Ok(response) => {
                    let reason = format!("status {}", response.status);
                    return Err(self.fail_install(&entry.url, reason));
                }
                Err(e) => return Err(self.fail_install(&entry.url, e.to_string())),
            };
            self.storage
                .put(PRECACHE_PARTITION, request.href(), response, self.clock.now());
        }

        self.set_state(WorkerState::Installed);
        tracing::debug!(entries = self.rule_set.precache.len(), "worker installed");

        if self.skip_waiting.load(Ordering::SeqCst) {
            self.activate()?;
        }
        Ok(self.state())
    }

    fn fail_install(&self, url: &str, reason: String) -> EngineError {
        self.set_state(WorkerState::Redundant);
        EngineError::PrecacheFailed {
            url: url.to_string(),
            reason,
        }
    }

    /// Handle a page message. Returns whether the message was understood.
    pub fn post_message(&self, message: &serde_json::Value) -> Result<bool, EngineError> {
        let is_skip = message.get("type").and_then(|t| t.as_str()) == Some(SKIP_WAITING_MESSAGE);
        if !is_skip {
            return Ok(false);
        }

        self.skip_waiting.store(true, Ordering::SeqCst);
        if self.state() == WorkerState::Installed {
            self.activate()?;
        }
        Ok(true)
    }

    /// Activate: drop undeclared partitions and claim clients.
    ///
    /// Returns the names of the partitions that were deleted.
    pub fn activate(&self) -> Result<Vec<String>, EngineError> {
        self.expect_state(WorkerState::Installed, "activate")?;
        self.set_state(WorkerState::Activating);

        let mut deleted = Vec::new();
        if self.rule_set.lifecycle.cleanup_outdated_caches {
            let declared = self.rule_set.declared_cache_names();
            for name in self.storage.partition_names() {
                if name != PRECACHE_PARTITION && !declared.contains(&name) {
                    self.storage.delete_partition(&name);
                    deleted.push(name);
                }
            }
        }

        if self.rule_set.lifecycle.clients_claim {
            self.clients_claimed.store(true, Ordering::SeqCst);
        }

        self.set_state(WorkerState::Activated);
        tracing::debug!(deleted = deleted.len(), "worker activated");
        Ok(deleted)
    }

    /// Decide how to answer one request.
    pub fn handle_fetch(&self, request: &Request, signal: &AbortSignal) -> FetchOutcome {
        if self.state() != WorkerState::Activated {
            return FetchOutcome::Passthrough;
        }
        if signal.is_aborted() {
            return FetchOutcome::Failed(EngineError::Network(FetchError::Aborted));
        }

        if request.method() == "GET" {
            if let Some(response) = self.precached(request) {
                return FetchOutcome::Response {
                    response,
                    source: ResponseSource::Precache,
                    rule: None,
                };
            }
        }

        match self.routes.first_match(&request.info) {
            Some((index, rule)) => self.dispatch(index, rule, request, signal),
            None => FetchOutcome::Passthrough,
        }
    }

    fn precached(&self, request: &Request) -> Option<Response> {
        let href = request.href();
        let candidates = if href.ends_with('/') {
            vec![href.to_string(), format!("{}index.html", href)]
        } else {
            vec![href.to_string()]
        };
        candidates
            .iter()
            .find_map(|url| self.storage.lookup(PRECACHE_PARTITION, url))
            .map(|entry| entry.response)
    }

    fn dispatch(
        &self,
        index: usize,
        rule: &CachingRule,
        request: &Request,
        signal: &AbortSignal,
    ) -> FetchOutcome {
        let partition = rule.cache_name.as_deref().unwrap_or(DEFAULT_RUNTIME_PARTITION);
        let expiration = rule.effective_expiration();
        let served = |response: Response, source: ResponseSource| FetchOutcome::Response {
            response,
            source,
            rule: Some(index),
        };

        match rule.strategy {
            Strategy::CacheFirst => {
                if let Some(response) = self.cached(partition, request, expiration.as_ref()) {
                    return served(response, ResponseSource::Cache);
                }
                match self.fetch(request, None, signal) {
                    Ok(response) => {
                        self.store(partition, request, &response, expiration.as_ref());
                        served(response, ResponseSource::Network)
                    }
                    Err(e) => FetchOutcome::Failed(e.into()),
                }
            }
            Strategy::NetworkFirst => {
                let timeout = rule.network_timeout_seconds.map(Duration::from_secs);
                match self.fetch(request, timeout, signal) {
                    Ok(response) => {
                        self.store(partition, request, &response, expiration.as_ref());
                        served(response, ResponseSource::Network)
                    }
                    Err(FetchError::Aborted) => FetchOutcome::Failed(FetchError::Aborted.into()),
                    Err(e) => match self.cached(partition, request, expiration.as_ref()) {
                        Some(response) => served(response, ResponseSource::Cache),
                        None => FetchOutcome::Failed(e.into()),
                    },
                }
            }
            Strategy::StaleWhileRevalidate => {
                let cached = self.cached(partition, request, expiration.as_ref());
                let fresh = self.fetch(request, None, signal);
                if let Ok(response) = &fresh {
                    self.store(partition, request, response, expiration.as_ref());
                }
                match (cached, fresh) {
                    (Some(response), _) => served(response, ResponseSource::Cache),
                    (None, Ok(response)) => served(response, ResponseSource::Network),
                    (None, Err(e)) => FetchOutcome::Failed(e.into()),
                }
            }
            Strategy::NetworkOnly => match self.fetch(request, None, signal) {
                Ok(response) => served(response, ResponseSource::Network),
                Err(FetchError::Aborted) => FetchOutcome::Failed(FetchError::Aborted.into()),
                Err(e) => match &rule.replay_queue {
                    Some(queue) => {
                        self.enqueue(&queue.name, request);
                        tracing::debug!(
                            queue = %queue.name,
                            url = request.href(),
                            error = %e,
                            "request queued for replay"
                        );
                        FetchOutcome::Queued {
                            queue: queue.name.clone(),
                        }
                    }
                    None => FetchOutcome::Failed(e.into()),
                },
            },
            Strategy::CacheOnly => match self.cached(partition, request, expiration.as_ref()) {
                Some(response) => served(response, ResponseSource::Cache),
                None => FetchOutcome::Failed(EngineError::CacheMiss {
                    cache: partition.to_string(),
                    url: request.href().to_string(),
                }),
            },
        }
    }

    /// Network fetch that reports an abort raised while in flight.
    fn fetch(
        &self,
        request: &Request,
        timeout: Option<Duration>,
        signal: &AbortSignal,
    ) -> Result<Response, FetchError> {
        let result = self.network.fetch(request, timeout);
        if signal.is_aborted() {
            return Err(FetchError::Aborted);
        }
        result
    }

    /// Cached response, treating entries past their age bound as misses.
    fn cached(
        &self,
        partition: &str,
        request: &Request,
        expiration: Option<&Expiration>,
    ) -> Option<Response> {
        let entry = self.storage.lookup(partition, request.href())?;
        if let Some(policy) = expiration {
            if !is_fresh(&entry, policy, self.clock.now()) {
                self.storage.delete(partition, request.href());
                return None;
            }
        }
        Some(entry.response)
    }

    fn store(
        &self,
        partition: &str,
        request: &Request,
        response: &Response,
        expiration: Option<&Expiration>,
    ) {
        if !response.is_cacheable() {
            return;
        }
        let now = self.clock.now();
        self.storage
            .put(partition, request.href(), response.clone(), now);
        if let Some(policy) = expiration {
            self.storage
                .with_partition_mut(partition, |entries| sweep_partition(entries, policy, now));
        }
    }

    fn enqueue(&self, queue: &str, request: &Request) {
        let now = self.clock.now();
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = queues.get_mut(queue) {
            state.push(request.clone(), now);
        }
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(queue)
            .map(ReplayQueueState::len)
            .unwrap_or(0)
    }

    /// Replay every queue, as a sync event would.
    pub fn replay(&self) -> ReplayResult {
        let now = self.clock.now();
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        let mut total = ReplayResult::default();
        for state in queues.values_mut() {
            let result = state.replay(self.network.as_ref(), now);
            tracing::debug!(
                queue = state.name(),
                delivered = result.delivered,
                dropped = result.dropped,
                "replayed queue"
            );
            total.merge(&result);
        }
        total
    }

    /// Periodic sweep of every declared partition.
    pub fn sweep(&self) -> SweepResult {
        let now = self.clock.now();
        let mut seen: Vec<&str> = Vec::new();
        let mut total = SweepResult::default();

        for rule in self.routes.rules() {
            let (Some(partition), Some(policy)) = (rule.partition(), rule.effective_expiration())
            else {
                continue;
            };
            if seen.contains(&partition) {
                continue;
            }
            seen.push(partition);
            if let Some(result) = self
                .storage
                .with_partition_mut(partition, |entries| sweep_partition(entries, &policy, now))
            {
                total.merge(&result);
            }
        }
        total
    }
}
