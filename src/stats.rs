//! Query counters reported by the server's periodic stats line.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::resolver::Outcome;

/// Atomic per-outcome counters, reset on every snapshot.
pub struct Stats {
    started: Instant,
    requests: AtomicU64,
    forwarded: AtomicU64,
    cached: AtomicU64,
    blocked: AtomicU64,
    overridden: AtomicU64,
    failed: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            overridden: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    /// Count one answered query.
    pub fn record(&self, outcome: Outcome, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Forwarded => Some(&self.forwarded),
            Outcome::Cached => Some(&self.cached),
            Outcome::Blocked => Some(&self.blocked),
            Outcome::Overridden => Some(&self.overridden),
            Outcome::Failed => Some(&self.failed),
            Outcome::Refused => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_response_time_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let avg_response_ms = if requests > 0 {
            (total_us as f64 / requests as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests,
            forwarded: self.forwarded.swap(0, Ordering::Relaxed),
            cached: self.cached.swap(0, Ordering::Relaxed),
            blocked: self.blocked.swap(0, Ordering::Relaxed),
            overridden: self.overridden.swap(0, Ordering::Relaxed),
            failed: self.failed.swap(0, Ordering::Relaxed),
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub forwarded: u64,
    pub cached: u64,
    pub blocked: u64,
    pub overridden: u64,
    pub failed: u64,
    pub avg_response_ms: f64,
}
