//! Requests, responses and the network seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use swpolicy_rules::{Destination, RequestInfo, RuleError};

use crate::engine::AbortSignal;

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub info: RequestInfo,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn get(url: &str) -> Result<Self, RuleError> {
        Ok(Self {
            info: RequestInfo::get(url)?,
            body: None,
        })
    }

    pub fn post(url: &str, body: impl Into<Vec<u8>>) -> Result<Self, RuleError> {
        Ok(Self {
            info: RequestInfo::new(url, "POST", Destination::Empty)?,
            body: Some(body.into()),
        })
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.info.destination = destination;
        self
    }

    pub fn href(&self) -> &str {
        self.info.href()
    }

    pub fn method(&self) -> &str {
        &self.info.method
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Only complete 200 responses are stored.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("network unreachable")]
    Offline,

    #[error("network timed out after {0:?}")]
    Timeout(Duration),

    #[error("request aborted")]
    Aborted,
}

/// Transport used by strategies to reach the origin.
pub trait Network: Send + Sync {
    /// Fetch `request`, failing with [`FetchError::Timeout`] when a bound is
    /// given and the response would take longer.
    fn fetch(&self, request: &Request, timeout: Option<Duration>) -> Result<Response, FetchError>;
}

#[derive(Debug, Clone)]
struct MockRoute {
    response: Response,
    latency: Duration,
}

/// In-memory origin with programmable responses, latency and outages.
#[derive(Debug, Default)]
pub struct MockNetwork {
    routes: Mutex<HashMap<String, MockRoute>>,
    offline: AtomicBool,
    log: Mutex<Vec<String>>,
    abort_during_fetch: Mutex<Option<AbortSignal>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(url: &str) -> String {
        RequestInfo::get(url)
            .map(|info| info.href().to_string())
            .unwrap_or_else(|_| url.to_string())
    }

    pub fn respond(&self, url: &str, body: &str) {
        self.respond_with(url, Response::ok(body.as_bytes().to_vec()));
    }

    pub fn respond_with(&self, url: &str, response: Response) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let latency = routes
            .get(&Self::key(url))
            .map(|r| r.latency)
            .unwrap_or_default();
        routes.insert(Self::key(url), MockRoute { response, latency });
    }

    pub fn set_latency(&self, url: &str, latency: Duration) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(route) = routes.get_mut(&Self::key(url)) {
            route.latency = latency;
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Abort `signal` while the next fetch is in flight.
    pub fn abort_next_fetch(&self, signal: AbortSignal) {
        *self.abort_during_fetch.lock().unwrap_or_else(|e| e.into_inner()) = Some(signal);
    }

    /// Every fetch seen, as `"METHOD href"`.
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        let key = Self::key(url);
        self.requests()
            .iter()
            .filter(|line| line.split_once(' ').map(|(_, href)| href) == Some(key.as_str()))
            .count()
    }
}

impl Network for MockNetwork {
    fn fetch(&self, request: &Request, timeout: Option<Duration>) -> Result<Response, FetchError> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("{} {}", request.method(), request.href()));

        if let Some(signal) = self
            .abort_during_fetch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            signal.abort();
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Offline);
        }

        let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        match routes.get(request.href()) {
            Some(route) => {
                if let Some(limit) = timeout {
                    if route.latency > limit {
                        return Err(FetchError::Timeout(limit));
                    }
                }
                Ok(route.response.clone())
            }
            None => Ok(Response::with_status(404, Vec::new())),
        }
    }
}
