//! Fixed-window rate limiter
//!
//! One counter per client identity (session id, else client address). The
//! check-and-update runs under a single lock.

use crate::core::config::RateLimitConfig;
use crate::facade::request::RequestContext;
use axum::http::{HeaderMap, HeaderValue};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const RATE_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_RESET_HEADER: &str = "x-ratelimit-reset";

/// Counter record for one client identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateState {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds at which the window resets
    pub reset_at: i64,
    pub window_seconds: u64,
}

/// Outcome of a single rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub valid: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: i64,
}

impl RateDecision {
    /// Write the three `x-ratelimit-*` headers unless already present
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let values = [
            (RATE_LIMIT_HEADER, self.limit.to_string()),
            (RATE_REMAINING_HEADER, self.remaining.to_string()),
            (RATE_RESET_HEADER, self.reset_at.to_string()),
        ];

        for (name, value) in values {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.entry(name).or_insert(value);
            }
        }
    }
}

/// Replaces the stored state before each check, e.g. to grant bonus quota
pub type RateOverrideFn = Arc<dyn Fn(&RequestContext, RateState) -> RateState + Send + Sync>;

/// Fixed window rate limiter
///
/// One [`RateState`] per client identity, created on first sight and kept for
/// the life of the process. When a request comes in:
/// 1. Apply the override function, if any
/// 2. If the window has expired, start a new one and admit
/// 3. Otherwise admit while quota remains, else reject
#[derive(Clone)]
pub struct RateLimiter {
    /// Shared state containing one record per client
    state: Arc<Mutex<HashMap<String, RateState>>>,
    limit: u64,
    window_seconds: u64,
    override_fn: Option<RateOverrideFn>,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `limit` - Maximum number of requests allowed per window
    /// * `window_seconds` - Window duration in seconds
    pub fn new(limit: u64, window_seconds: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            limit,
            window_seconds,
            override_fn: None,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, config.window)
    }

    pub fn with_override<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, RateState) -> RateState + Send + Sync + 'static,
    {
        self.override_fn = Some(Arc::new(f));
        self
    }

    pub fn set_override(&mut self, f: RateOverrideFn) {
        self.override_fn = Some(f);
    }

    /// Check the request's client against the current time
    pub async fn check(&self, request: &RequestContext) -> RateDecision {
        self.check_at(request, chrono::Utc::now().timestamp()).await
    }

    /// Check the request's client as of `now` (epoch seconds)
    pub async fn check_at(&self, request: &RequestContext, now: i64) -> RateDecision {
        let client_id = request.client_id();

        // Held across the whole read-modify-write
        let mut state = self.state.lock().await;

        let entry = state.entry(client_id).or_insert_with(|| RateState {
            limit: self.limit,
            remaining: self.limit,
            reset_at: now + self.window_seconds as i64,
            window_seconds: self.window_seconds,
        });

        if let Some(override_fn) = &self.override_fn {
            let mut replaced = override_fn(request, *entry);
            replaced.remaining = replaced.remaining.min(replaced.limit);
            *entry = replaced;
        }

        let valid = if now >= entry.reset_at {
            entry.reset_at = now + entry.window_seconds as i64;
            entry.remaining = entry.limit.saturating_sub(1);
            true
        } else if entry.remaining > 0 {
            entry.remaining -= 1;
            true
        } else {
            false
        };

        RateDecision {
            valid,
            limit: entry.limit,
            remaining: entry.remaining,
            reset_at: entry.reset_at,
        }
    }

    /// Current state for a client, if it has been seen
    pub async fn state_of(&self, client_id: &str) -> Option<RateState> {
        self.state.lock().await.get(client_id).copied()
    }

    /// Number of tracked clients
    pub async fn tracked_clients(&self) -> usize {
        self.state.lock().await.len()
    }
}
