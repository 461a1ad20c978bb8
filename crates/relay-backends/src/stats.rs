use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Cumulative usage of one backend.
///
/// `count` is the number of attempts; `failures <= count` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCounts {
    pub count: u64,
    pub failures: u64,
}

/// Point-in-time view of the tracker, shaped for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Whole seconds since the tracker was created, formatted as `"<n>s"`.
    pub uptime: String,
    /// Every backend ever attempted.
    pub services: BTreeMap<String, ServiceCounts>,
}

/// Process-wide attempt and failure counters per backend.
///
/// Entries are created on first use and never reset. All access goes
/// through one mutex so increments from concurrent sessions are not lost.
pub struct StatsTracker {
    started_at: Instant,
    services: Mutex<BTreeMap<String, ServiceCounts>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            services: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record_attempt(&self, backend: &str) {
        let mut services = self.services.lock();
        services.entry(backend.to_string()).or_default().count += 1;
    }

    /// Record a failed attempt. Must follow the matching [`record_attempt`](Self::record_attempt).
    pub fn record_failure(&self, backend: &str) {
        let mut services = self.services.lock();
        let entry = services.entry(backend.to_string()).or_default();
        entry.failures += 1;
        debug_assert!(
            entry.failures <= entry.count,
            "failure recorded for {backend} without an attempt"
        );
    }

    pub fn counts(&self, backend: &str) -> Option<ServiceCounts> {
        self.services.lock().get(backend).copied()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: format!("{}s", self.uptime().as_secs()),
            services: self.services.lock().clone(),
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
