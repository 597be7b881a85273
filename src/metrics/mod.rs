//! Prometheus metrics for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Sessions accepted
    pub sessions_total: AtomicU64,
    /// Sessions that ended without a response
    pub sessions_failed: AtomicU64,
    /// `STRING EXISTS` responses
    pub verdicts_exists: AtomicU64,
    /// `STRING NOT FOUND` responses
    pub verdicts_not_found: AtomicU64,
    /// Sessions rejected by the rate limiter
    pub rate_limited: AtomicU64,
    /// Corpus reads that failed
    pub corpus_load_failures: AtomicU64,
    /// Cached index builds
    pub index_builds: AtomicU64,
    /// Sessions in flight
    pub active_sessions: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A session was accepted and is now in flight.
    pub fn session_started(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// A session left flight, whatever its outcome.
    pub fn session_finished(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increment failed sessions.
    pub fn inc_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a verdict written to a client.
    pub fn record_verdict(&self, exists: bool) {
        if exists {
            self.verdicts_exists.fetch_add(1, Ordering::Relaxed);
        } else {
            self.verdicts_not_found.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Increment rate limited sessions.
    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment corpus load failures.
    pub fn inc_corpus_load_failures(&self) {
        self.corpus_load_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment index builds.
    pub fn inc_index_builds(&self) {
        self.index_builds.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            verdicts_exists: self.verdicts_exists.load(Ordering::Relaxed),
            verdicts_not_found: self.verdicts_not_found.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            corpus_load_failures: self.corpus_load_failures.load(Ordering::Relaxed),
            index_builds: self.index_builds.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP corpus_lookup_sessions_total Sessions accepted
# TYPE corpus_lookup_sessions_total counter
corpus_lookup_sessions_total {}

# HELP corpus_lookup_sessions_failed Sessions closed without a response
# TYPE corpus_lookup_sessions_failed counter
corpus_lookup_sessions_failed {}

# HELP corpus_lookup_verdicts_total Verdicts written, by outcome
# TYPE corpus_lookup_verdicts_total counter
corpus_lookup_verdicts_total{{verdict="exists"}} {}
corpus_lookup_verdicts_total{{verdict="not_found"}} {}

# HELP corpus_lookup_rate_limited Sessions rejected by the rate limiter
# TYPE corpus_lookup_rate_limited counter
corpus_lookup_rate_limited {}

# HELP corpus_lookup_corpus_load_failures Failed corpus reads
# TYPE corpus_lookup_corpus_load_failures counter
corpus_lookup_corpus_load_failures {}

# HELP corpus_lookup_index_builds Cached index builds
# TYPE corpus_lookup_index_builds counter
corpus_lookup_index_builds {}

# HELP corpus_lookup_active_sessions Sessions in flight
# TYPE corpus_lookup_active_sessions gauge
corpus_lookup_active_sessions {}
"#,
            s.sessions_total,
            s.sessions_failed,
            s.verdicts_exists,
            s.verdicts_not_found,
            s.rate_limited,
            s.corpus_load_failures,
            s.index_builds,
            s.active_sessions
        )
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub sessions_total: u64,
    pub sessions_failed: u64,
    pub verdicts_exists: u64,
    pub verdicts_not_found: u64,
    pub rate_limited: u64,
    pub corpus_load_failures: u64,
    pub index_builds: u64,
    pub active_sessions: u64,
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds, with sub-millisecond precision.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1e3
    }
}
