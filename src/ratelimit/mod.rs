//! Per-client sliding-window rate limiting with exponential backoff.
//!
//! A rejected caller is held for `base_backoff × 2^attempts` before the
//! rejection is returned, where `attempts` counts consecutive rejections
//! for that client. The hold suspends the calling task; nothing is queued
//! or rescheduled on its behalf.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { backoff: Duration },
}

#[derive(Debug, Default)]
struct ClientWindow {
    requests: VecDeque<Instant>,
    attempts: u32,
}

/// Sliding-window limiter keyed by client identity.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    base_backoff: Duration,
    clients: DashMap<String, ClientWindow>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, base_backoff: Duration) -> Self {
        Self {
            max_requests,
            window,
            base_backoff,
            clients: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Admit or reject one request without waiting.
    ///
    /// Updates for one client are serialized by the map's shard lock, so
    /// concurrent requests from the same client cannot lose updates.
    pub fn check(&self, client: &str) -> Admission {
        let now = Instant::now();
        self.sweep_expired(now);

        let mut state = self.clients.entry(client.to_string()).or_default();

        while let Some(&oldest) = state.requests.front() {
            if now.duration_since(oldest) > self.window {
                state.requests.pop_front();
            } else {
                break;
            }
        }

        debug!(
            "Client {} has {} requests in the last {:?}",
            client,
            state.requests.len(),
            self.window
        );

        if state.requests.len() < self.max_requests {
            state.requests.push_back(now);
            state.attempts = 0;
            Admission::Admitted
        } else {
            state.attempts = state.attempts.saturating_add(1);
            let backoff = backoff_for(self.base_backoff, state.attempts);
            debug!(
                "Request denied for {}: attempt {}, backoff {:?}",
                client, state.attempts, backoff
            );
            Admission::Rejected { backoff }
        }
    }

    /// Admit or reject one request. A rejection is returned only after the
    /// caller has been held for the backoff.
    pub async fn is_allowed(&self, client: &str) -> bool {
        match self.check(client) {
            Admission::Admitted => true,
            Admission::Rejected { backoff } => {
                sleep(backoff).await;
                false
            }
        }
    }

    /// Consecutive rejections recorded for a client.
    pub fn attempts(&self, client: &str) -> u32 {
        self.clients.get(client).map(|s| s.attempts).unwrap_or(0)
    }

    /// Number of clients with recorded state.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Drop clients with no request inside the window, at most once per
    /// window. Such a client would be admitted with a fresh state anyway.
    fn sweep_expired(&self, now: Instant) {
        {
            let mut last = match self.last_sweep.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if now.duration_since(*last) < self.window {
                return;
            }
            *last = now;
        }

        let before = self.clients.len();
        self.clients.retain(|_, state| {
            state
                .requests
                .back()
                .is_some_and(|&latest| now.duration_since(latest) <= self.window)
        });
        let removed = before.saturating_sub(self.clients.len());
        if removed > 0 {
            debug!("Evicted {} idle rate limiter clients", removed);
        }
    }
}

fn backoff_for(base: Duration, attempts: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempts))
}
