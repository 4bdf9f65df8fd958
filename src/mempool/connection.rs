//! Connection bookkeeping for redundant WebSocket feeds
//!
//! Created: 2026-10-18

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Exponential reconnect backoff: starts at `initial`, doubles, capped at `max`,
/// reset after a successful connect.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { initial: Duration::from_secs(1), max: Duration::from_secs(60) }
    }
}

impl ReconnectPolicy {
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let next_ms = current.as_millis().saturating_mul(2) as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(next_ms.min(max_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for ScannerHealth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ScannerHealth::Healthy => "healthy",
            ScannerHealth::Degraded => "degraded",
            ScannerHealth::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// One liveness flag per configured endpoint
pub struct ConnectionSet {
    endpoints: Vec<String>,
    active: Vec<AtomicBool>,
}

impl ConnectionSet {
    pub fn new(endpoints: Vec<String>) -> Self {
        let active = endpoints.iter().map(|_| AtomicBool::new(false)).collect();
        Self { endpoints, active }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn set_active(&self, index: usize, active: bool) {
        if let Some(flag) = self.active.get(index) {
            flag.store(active, Ordering::SeqCst);
        }
    }

    pub fn reset(&self) {
        for flag in &self.active {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|f| f.load(Ordering::SeqCst)).count()
    }

    pub fn total(&self) -> usize {
        self.endpoints.len()
    }

    /// healthy: more than half active; degraded: some active; unhealthy: none
    pub fn health(&self) -> ScannerHealth {
        classify(self.active_count(), self.total())
    }
}

pub fn classify(active: usize, total: usize) -> ScannerHealth {
    if active == 0 {
        ScannerHealth::Unhealthy
    } else if active * 2 > total {
        ScannerHealth::Healthy
    } else {
        ScannerHealth::Degraded
    }
}
