//! Reference request-interception engine.
//!
//! Interprets a compiled [`swpolicy_rules::RuleSet`] the way the emitted
//! service worker does in the browser: lifecycle transitions, first-match
//! dispatch to a cache strategy, lazy expiration and replay of failed
//! mutating requests. The network and the clock are pluggable so the
//! behavior can be exercised deterministically.

mod clock;
mod engine;
mod expiration;
mod network;
mod queue;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    AbortSignal, Engine, EngineError, FetchOutcome, ResponseSource, WorkerState, PRECACHE_PARTITION,
    SKIP_WAITING_MESSAGE,
};
pub use expiration::{is_fresh, sweep_partition, SweepResult};
pub use network::{FetchError, MockNetwork, Network, Request, Response};
pub use queue::{QueuedRequest, ReplayQueueState, ReplayResult};
pub use storage::{CacheStorage, CachedEntry};
