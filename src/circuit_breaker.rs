//! Circuit Breaker
//!
//! Purpose:
//!     Isolate failures of one outbound dependency (an RPC endpoint, the relay)
//!     so an unhealthy endpoint cannot starve the rest of the pipeline.
//!
//! State machine:
//!     Closed   --(failure_threshold failures within failure_window)--> Open
//!     Open     --(recovery_timeout elapsed, next call admitted)------> HalfOpen
//!     HalfOpen --(success_threshold consecutive successes)---------> Closed
//!     HalfOpen --(any failure or timeout)---------------------------> Open
//!
//! All state lives behind one async mutex per breaker. The wrapped operation runs
//! outside the lock. Breaker-open is reported, never retried here.
//!
//! A half-open trial slot is held by a guard for the lifetime of the call, so a
//! caller that drops the `call` future mid-flight still gives the slot back.
//!
//! Created: 2026-10-18

use crate::error::BreakerError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
    /// Applied to every wrapped call
    pub call_timeout: Duration,
    /// Trial calls allowed concurrently while half-open
    pub half_open_max_calls: u32,
    /// Failures older than this no longer count toward tripping
    pub failure_window: Duration,
    pub failure_window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            call_timeout: Duration::from_secs(10),
            half_open_max_calls: 1,
            failure_window: Duration::from_secs(60),
            failure_window_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Read-only view for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub recent_failures: usize,
    pub consecutive_successes: u32,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub timeouts: u64,
    pub rejected_calls: u64,
    pub times_opened: u64,
    pub last_transition: DateTime<Utc>,
}

impl BreakerSnapshot {
    /// Successful / completed calls; 1.0 when nothing has run yet
    pub fn success_rate(&self) -> f64 {
        let completed = self.successful_calls + self.failed_calls;
        if completed == 0 {
            1.0
        } else {
            self.successful_calls as f64 / completed as f64
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    last_transition: DateTime<Utc>,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    timeouts: u64,
    rejected_calls: u64,
    times_opened: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            consecutive_successes: 0,
            opened_at: None,
            last_transition: Utc::now(),
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            timeouts: 0,
            rejected_calls: 0,
            times_opened: 0,
        }
    }

    fn transition(&mut self, name: &str, to: CircuitState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        self.last_transition = Utc::now();
        match to {
            CircuitState::Open => {
                self.opened_at = Some(Instant::now());
                self.times_opened += 1;
                self.consecutive_successes = 0;
                warn!("CIRCUIT OPEN | breaker={} | from={} | failures={}", name, from, self.failures.len());
            }
            CircuitState::HalfOpen => {
                self.consecutive_successes = 0;
                info!("Circuit half-open | breaker={} | admitting trial calls", name);
            }
            CircuitState::Closed => {
                self.failures.clear();
                self.opened_at = None;
                self.consecutive_successes = 0;
                info!("Circuit closed | breaker={} | recovered", name);
            }
        }
    }

    fn prune_failures(&mut self, window: Duration, cap: usize) {
        let now = Instant::now();
        while let Some(front) = self.failures.front() {
            if now.duration_since(*front) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        while self.failures.len() > cap {
            self.failures.pop_front();
        }
    }
}

enum Outcome {
    Success,
    Failure,
    Timeout,
}

/// Occupies one half-open trial slot until dropped
struct HalfOpenSlot<'a> {
    in_flight: &'a AtomicU32,
}

impl Drop for HalfOpenSlot<'_> {
    fn drop(&mut self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

/// One breaker per logical dependency
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    /// Live half-open trial calls; only incremented under `inner`
    half_open_in_flight: AtomicU32,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
            half_open_in_flight: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `op` under the breaker with the configured call timeout.
    ///
    /// Returns `BreakerError::Open` without invoking `op` when the breaker refuses,
    /// `BreakerError::Timeout` when `op` overruns, `BreakerError::Operation` when it fails.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _slot = self.admit().await?;

        let outcome = tokio::time::timeout(self.config.call_timeout, op()).await;
        match outcome {
            Ok(Ok(value)) => {
                self.record(Outcome::Success).await;
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record(Outcome::Failure).await;
                Err(BreakerError::Operation(e))
            }
            Err(_) => {
                self.record(Outcome::Timeout).await;
                Err(BreakerError::Timeout {
                    name: self.name.clone(),
                    after: self.config.call_timeout,
                })
            }
        }
    }

    /// Run a synchronous operation under the breaker. No timeout can be enforced on
    /// blocking code, so only success and failure are recorded.
    pub async fn call_sync<F, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let _slot = self.admit().await?;
        match op() {
            Ok(value) => {
                self.record(Outcome::Success).await;
                Ok(value)
            }
            Err(e) => {
                self.record(Outcome::Failure).await;
                Err(BreakerError::Operation(e))
            }
        }
    }

    async fn admit<E>(&self) -> Result<Option<HalfOpenSlot<'_>>, BreakerError<E>> {
        let mut inner = self.inner.lock().await;

        if inner.state == CircuitState::Open {
            let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
            if elapsed >= self.config.recovery_timeout {
                inner.transition(&self.name, CircuitState::HalfOpen);
            } else {
                inner.rejected_calls += 1;
                return Err(BreakerError::Open { name: self.name.clone() });
            }
        }

        let mut slot = None;
        if inner.state == CircuitState::HalfOpen {
            if self.half_open_in_flight.load(Ordering::SeqCst) >= self.config.half_open_max_calls {
                inner.rejected_calls += 1;
                return Err(BreakerError::Open { name: self.name.clone() });
            }
            self.half_open_in_flight.fetch_add(1, Ordering::SeqCst);
            slot = Some(HalfOpenSlot {
                in_flight: &self.half_open_in_flight,
            });
        }

        inner.total_calls += 1;
        Ok(slot)
    }

    async fn record(&self, outcome: Outcome) {
        let mut inner = self.inner.lock().await;
        match outcome {
            Outcome::Success => {
                inner.successful_calls += 1;
                if inner.state == CircuitState::HalfOpen {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        inner.transition(&self.name, CircuitState::Closed);
                    }
                }
            }
            Outcome::Failure | Outcome::Timeout => {
                inner.failed_calls += 1;
                if matches!(outcome, Outcome::Timeout) {
                    inner.timeouts += 1;
                }
                match inner.state {
                    CircuitState::HalfOpen => {
                        inner.failures.push_back(Instant::now());
                        inner.transition(&self.name, CircuitState::Open);
                    }
                    CircuitState::Closed => {
                        inner.failures.push_back(Instant::now());
                        inner.prune_failures(self.config.failure_window, self.config.failure_window_size);
                        debug!(
                            "Breaker failure | breaker={} | recent={}/{}",
                            self.name,
                            inner.failures.len(),
                            self.config.failure_threshold
                        );
                        if inner.failures.len() >= self.config.failure_threshold as usize {
                            inner.transition(&self.name, CircuitState::Open);
                        }
                    }
                    // late result of a call admitted before the trip
                    CircuitState::Open => {}
                }
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.inner.lock().await;
        inner.prune_failures(self.config.failure_window, self.config.failure_window_size);
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            recent_failures: inner.failures.len(),
            consecutive_successes: inner.consecutive_successes,
            total_calls: inner.total_calls,
            successful_calls: inner.successful_calls,
            failed_calls: inner.failed_calls,
            timeouts: inner.timeouts,
            rejected_calls: inner.rejected_calls,
            times_opened: inner.times_opened,
            last_transition: inner.last_transition,
        }
    }

    /// Force back to closed (operator action)
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.transition(&self.name, CircuitState::Closed);
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker").field("name", &self.name).finish()
    }
}

// ── Manager ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BreakerHealth {
    pub total: usize,
    pub open: usize,
    pub half_open: usize,
    /// Successful / completed calls across every breaker
    pub success_rate: f64,
    pub breakers: Vec<BreakerSnapshot>,
}

/// Registry of named breakers. Constructed once at the composition root and shared.
#[derive(Debug)]
pub struct CircuitBreakerManager {
    default_config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerManager {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self { default_config, breakers: DashMap::new() }
    }

    /// Create-if-absent with the default config
    pub fn get_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_breaker_with_config(name, self.default_config.clone())
    }

    /// Create-if-absent; `config` only applies when the breaker is new
    pub fn get_breaker_with_config(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    /// State of a breaker without creating it
    pub async fn state_of(&self, name: &str) -> Option<CircuitState> {
        let breaker = self.breakers.get(name).map(|b| b.clone())?;
        Some(breaker.state().await)
    }

    pub async fn health(&self) -> BreakerHealth {
        // clone out of the map so no shard lock is held across awaits
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.iter().map(|e| e.value().clone()).collect();

        let mut snapshots = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));

        let successes: u64 = snapshots.iter().map(|s| s.successful_calls).sum();
        let completed: u64 = snapshots.iter().map(|s| s.successful_calls + s.failed_calls).sum();

        BreakerHealth {
            total: snapshots.len(),
            open: snapshots.iter().filter(|s| s.state == CircuitState::Open).count(),
            half_open: snapshots.iter().filter(|s| s.state == CircuitState::HalfOpen).count(),
            success_rate: if completed == 0 { 1.0 } else { successes as f64 / completed as f64 },
            breakers: snapshots,
        }
    }
}

/// Conventional breaker names
pub fn rpc_breaker_name(network: crate::types::Network) -> String {
    format!("rpc:{}", network)
}

pub fn relay_breaker_name(network: crate::types::Network) -> String {
    format!("relay:{}", network)
}

pub fn gas_breaker_name(network: crate::types::Network) -> String {
    format!("gas:{}", network)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(50),
            success_threshold: 2,
            call_timeout: Duration::from_millis(100),
            half_open_max_calls: 1,
            failure_window: Duration::from_secs(60),
            failure_window_size: 100,
        }
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        cb.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
        cb.call(|| async { Ok::<_, &'static str>(7) }).await
    }

    #[tokio::test]
    async fn test_trips_after_threshold() {
        let cb = CircuitBreaker::new("test", test_config());
        for _ in 0..2 {
            assert!(matches!(fail(&cb).await, Err(BreakerError::Operation("boom"))));
            assert_eq!(cb.state().await, CircuitState::Closed);
        }
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_rejects_without_invoking() {
        let cb = CircuitBreaker::new("test", test_config());
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        let invoked = AtomicU32::new(0);
        for _ in 0..5 {
            let result = cb
                .call(|| async {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, &'static str>(())
                })
                .await;
            assert!(result.unwrap_err().is_open());
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(cb.snapshot().await.rejected_calls, 5);
    }

    #[tokio::test]
    async fn test_half_open_recovers_after_successes() {
        let cb = CircuitBreaker::new("test", test_config());
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(70)).await;

        // first call after recovery timeout is admitted as a trial
        assert_eq!(succeed(&cb).await.unwrap(), 7);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.snapshot().await.recent_failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("test", test_config());
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(70)).await;

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        assert!(matches!(fail(&cb).await, Err(BreakerError::Operation(_))));
        assert_eq!(cb.state().await, CircuitState::Open);

        // open again: immediately rejected, success counter was reset
        assert!(succeed(&cb).await.unwrap_err().is_open());
        let snap = cb.snapshot().await;
        assert_eq!(snap.consecutive_successes, 0);
        assert_eq!(snap.times_opened, 2);
    }

    #[tokio::test]
    async fn test_cancelled_half_open_call_frees_slot() {
        let cb = CircuitBreaker::new("test", test_config());
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(70)).await;

        let slow = cb.call(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, &'static str>(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(10), slow).await.is_err());
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        // the abandoned trial must not hold the only half-open slot
        assert_eq!(succeed(&cb).await.unwrap(), 7);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let cb = CircuitBreaker::new("slow", test_config());
        for _ in 0..3 {
            let result = cb
                .call(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok::<_, &'static str>(())
                })
                .await;
            assert!(result.unwrap_err().is_timeout());
        }
        assert_eq!(cb.state().await, CircuitState::Open);
        assert_eq!(cb.snapshot().await.timeouts, 3);
    }

    #[tokio::test]
    async fn test_failures_outside_window_do_not_trip() {
        let mut config = test_config();
        config.failure_window = Duration::from_millis(30);
        let cb = CircuitBreaker::new("windowed", config);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[test]
    fn test_call_sync() {
        let cb = CircuitBreaker::new("sync", test_config());
        let value = tokio_test::block_on(cb.call_sync(|| Ok::<_, String>(42))).unwrap();
        assert_eq!(value, 42);
        assert!(tokio_test::block_on(cb.call_sync(|| Err::<u8, _>("bad".to_string()))).is_err());
        assert_eq!(tokio_test::block_on(cb.snapshot()).failed_calls, 1);
    }

    #[tokio::test]
    async fn test_manager_create_if_absent_and_health() {
        let manager = CircuitBreakerManager::new(test_config());
        let a = manager.get_breaker("rpc:ethereum");
        let again = manager.get_breaker("rpc:ethereum");
        assert!(Arc::ptr_eq(&a, &again));
        assert!(manager.state_of("rpc:bsc").await.is_none());

        let b = manager.get_breaker("relay:ethereum");
        succeed(&a).await.unwrap();
        for _ in 0..3 {
            let _ = fail(&b).await;
        }

        let health = manager.health().await;
        assert_eq!(health.total, 2);
        assert_eq!(health.open, 1);
        assert_eq!(health.half_open, 0);
        assert!((health.success_rate - 0.25).abs() < 1e-9);
        assert_eq!(manager.state_of("relay:ethereum").await, Some(CircuitState::Open));
    }
}
