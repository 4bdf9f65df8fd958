//! Mempool Manager
//!
//! Purpose:
//!     Own one scanner and one sniper per enabled network, decide which liquidity
//!     events get auto-sniped, and expose manual snipes, callbacks, stats and
//!     health to the outside.
//!
//! Data flow:
//!     scanner bus → discovery (stats, callbacks) → policy → snipe → monitor
//!     → stats + gas outcome → completion callbacks
//!
//! Created: 2026-10-18
//!
//! Architecture:
//!     policy.rs — AutoSnipePolicy (ordered gates, RejectReason)
//!     stats.rs  — Per-network counters and global roll-up

pub mod policy;
pub mod stats;

pub use policy::{AutoSnipePolicy, PolicyContext, PolicyDecision, RejectReason};
pub use stats::{GlobalStats, NetworkStats, StatsBook};

use crate::circuit_breaker::{rpc_breaker_name, BreakerHealth, CircuitBreakerManager};
use crate::config::SniperConfig;
use crate::error::{SniperError, SniperResult};
use crate::events::EventBus;
use crate::gas::{GasOutcome, GasStrategyEngine};
use crate::mempool::dedupe::Dedupe;
use crate::mempool::{EventRef, MempoolScanner, ScannerHealth, ScannerHealthReport};
use crate::sniper::{BlockZeroSniper, SniperHealth, SnipeResult, SnipeStatus, SnipeTarget};
use crate::types::{LiquidityAddEvent, Network, Urgency};
use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type ResultRef = Arc<SnipeResult>;

const ATTEMPTED_MAX_ENTRIES: usize = 10_000;

/// Scanner + sniper for one network
pub struct NetworkPipeline {
    pub scanner: Arc<MempoolScanner>,
    pub sniper: Arc<BlockZeroSniper>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerHealth {
    pub status: OverallHealth,
    pub running: bool,
    pub auto_snipe_enabled: bool,
    pub scanners: Vec<ScannerHealthReport>,
    pub snipers: Vec<SniperHealth>,
    pub breakers: BreakerHealth,
}

/// healthy: majority of scanners healthy; critical: none healthy; degraded otherwise
pub fn overall_health(statuses: &[ScannerHealth]) -> OverallHealth {
    let healthy = statuses.iter().filter(|s| **s == ScannerHealth::Healthy).count();
    if healthy == 0 {
        OverallHealth::Critical
    } else if healthy * 2 > statuses.len() {
        OverallHealth::Healthy
    } else {
        OverallHealth::Degraded
    }
}

pub struct MempoolManager {
    pipelines: BTreeMap<Network, NetworkPipeline>,
    policy: AutoSnipePolicy,
    gas: Arc<GasStrategyEngine>,
    breakers: Arc<CircuitBreakerManager>,
    stats: StatsBook,
    /// (network, token) pairs auto-sniped within the attempted TTL
    attempted: Dedupe<(Network, Address)>,
    discovery_bus: EventBus<EventRef>,
    completion_bus: EventBus<ResultRef>,
    monitor_timeout: Duration,
    event_capacity: usize,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MempoolManager {
    pub fn new(config: &SniperConfig, gas: Arc<GasStrategyEngine>, breakers: Arc<CircuitBreakerManager>) -> Self {
        let capacity = config.general.event_channel_capacity;
        let (shutdown, _) = watch::channel(false);
        Self {
            pipelines: BTreeMap::new(),
            policy: AutoSnipePolicy::new(config.auto_snipe.clone()),
            gas,
            breakers,
            stats: StatsBook::new(&config.enabled_networks()),
            attempted: Dedupe::new(config.auto_snipe.attempted_ttl(), ATTEMPTED_MAX_ENTRIES),
            discovery_bus: EventBus::new("token_discovery", capacity),
            completion_bus: EventBus::new("snipe_completion", capacity),
            monitor_timeout: config.monitor_timeout(),
            event_capacity: capacity,
            running: AtomicBool::new(false),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register a network's components. Call before wrapping the manager in an Arc.
    pub fn add_network(&mut self, scanner: Arc<MempoolScanner>, sniper: Arc<BlockZeroSniper>) {
        self.pipelines.insert(scanner.network(), NetworkPipeline { scanner, sniper });
    }

    pub fn networks(&self) -> Vec<Network> {
        self.pipelines.keys().copied().collect()
    }

    pub fn pipeline(&self, network: Network) -> Option<&NetworkPipeline> {
        self.pipelines.get(&network)
    }

    pub fn gas(&self) -> &Arc<GasStrategyEngine> {
        &self.gas
    }

    pub fn auto_snipe_enabled(&self) -> bool {
        self.policy.config().enabled
    }

    // ── Callbacks ───────────────────────────────────────────────────

    /// Called for every new-token liquidity event, in registration order.
    /// A failing callback is logged and does not affect the others.
    pub fn register_token_discovery_callback<F, Fut>(&self, name: &str, callback: F) -> JoinHandle<()>
    where
        F: Fn(EventRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.discovery_bus.register_handler(name, callback)
    }

    /// Called with every finished snipe (auto or manual)
    pub fn register_snipe_completion_callback<F, Fut>(&self, name: &str, callback: F) -> JoinHandle<()>
    where
        F: Fn(ResultRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.completion_bus.register_handler(name, callback)
    }

    pub fn subscribe_completions(&self, name: &str) -> mpsc::Receiver<ResultRef> {
        self.completion_bus.subscribe(name)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start the gas engine, the per-network event loops and the scanners. Idempotent.
    /// Scanners that cannot connect yet keep retrying in the background.
    pub async fn start(self: &Arc<Self>) -> SniperResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.send_replace(false);
        self.gas.start();

        for (network, pipeline) in &self.pipelines {
            // subscribe before the scanner starts so nothing is missed
            let mut events = pipeline.scanner.subscribe_liquidity("manager");
            let manager = Arc::clone(self);
            let mut shutdown = self.shutdown.subscribe();
            let network = *network;
            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Some(event) => {
                                manager.handle_liquidity_event(event).await;
                            }
                            None => break,
                        },
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("Manager event loop stopped | network={}", network);
            });
            self.tasks.lock().unwrap_or_else(|p| p.into_inner()).push(handle);
        }

        for (network, pipeline) in &self.pipelines {
            if let Err(e) = pipeline.scanner.start().await {
                warn!("Scanner not connected yet | network={} | {}", network, e);
            }
        }

        info!(
            "✅ Mempool manager started | networks={:?} | auto_snipe={} | event_capacity={}",
            self.networks(),
            self.auto_snipe_enabled(),
            self.event_capacity
        );
        Ok(())
    }

    /// Stop scanners, event loops and the gas engine. In-flight snipes finish on
    /// their own tasks. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);

        for pipeline in self.pipelines.values() {
            pipeline.scanner.stop().await;
        }
        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.gas.stop().await;
        info!("Mempool manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Auto-snipe ──────────────────────────────────────────────────

    /// Count the event, notify discovery callbacks, and run the policy. Accepted
    /// events are sniped on a separate task. Returns the policy decision.
    pub async fn handle_liquidity_event(self: &Arc<Self>, event: EventRef) -> PolicyDecision {
        let network = event.network;
        self.stats.record_discovery(network, event.is_new_token());
        if event.is_new_token() {
            self.discovery_bus.publish(Arc::clone(&event));
        }

        let ctx = PolicyContext {
            congestion: self.gas.congestion(network),
            rpc_breaker: self.breakers.state_of(&rpc_breaker_name(network)).await,
            already_attempted: self.attempted.contains(&(network, event.token)),
        };
        let mut decision = self.policy.evaluate(&event, &ctx);
        if decision.is_accept() && !self.attempted.check_and_insert((network, event.token)) {
            decision = PolicyDecision::Reject(RejectReason::Duplicate);
        }

        match &decision {
            PolicyDecision::Accept => {
                info!(
                    "🎯 AUTO-SNIPE | network={} | token={:?} | liquidity={} {} | trigger={:?}",
                    network,
                    event.token,
                    event.native_liquidity(),
                    network.native_symbol(),
                    event.pending_tx.hash
                );
                let manager = Arc::clone(self);
                tokio::spawn(async move {
                    manager.execute_auto_snipe(&event).await;
                });
            }
            PolicyDecision::Reject(reason) => {
                if *reason != RejectReason::Disabled && *reason != RejectReason::NotNewToken {
                    self.stats.record_rejection(network);
                }
                debug!("Auto-snipe skipped | network={} | token={:?} | {}", network, event.token, reason);
            }
        }
        decision
    }

    /// Snipe + monitor with the configured auto-snipe amount and priority
    pub async fn execute_auto_snipe(&self, event: &LiquidityAddEvent) -> Option<ResultRef> {
        let Some(pipeline) = self.pipelines.get(&event.network) else {
            error!("No sniper for network {}", event.network);
            return None;
        };
        let cfg = self.policy.config();
        let pending = pipeline.sniper.snipe(event, cfg.amount_native, cfg.priority).await;
        Some(self.finish(pipeline, pending).await)
    }

    /// Buy `token` now, bypassing the auto-snipe policy. Waits for the outcome.
    pub async fn manual_snipe(
        &self,
        token: Address,
        network: Network,
        amount_native: Decimal,
        priority: Urgency,
    ) -> SniperResult<ResultRef> {
        let pipeline = self
            .pipelines
            .get(&network)
            .ok_or_else(|| SniperError::Validation(format!("network '{}' is not enabled", network)))?;
        info!(
            "MANUAL SNIPE | network={} | token={:?} | amount={} | priority={}",
            network, token, amount_native, priority
        );
        let pending = pipeline
            .sniper
            .snipe_target(&SnipeTarget::manual(token), amount_native, priority)
            .await;
        Ok(self.finish(pipeline, pending).await)
    }

    async fn finish(&self, pipeline: &NetworkPipeline, pending: SnipeResult) -> ResultRef {
        let result = pipeline.sniper.monitor(pending, self.monitor_timeout).await;

        if let (Some(strategy), Some(quoted)) = (result.strategy, result.quoted_price_gwei) {
            self.gas.record_outcome(
                result.network,
                GasOutcome {
                    strategy,
                    quoted_price_gwei: quoted,
                    paid_price_gwei: result.effective_gas_price_gwei,
                    confirmed: result.status() == SnipeStatus::Confirmed,
                },
            );
        }
        self.stats.record_result(&result);

        let result = Arc::new(result);
        self.completion_bus.publish(Arc::clone(&result));
        result
    }

    // ── Reporting ───────────────────────────────────────────────────

    pub fn get_global_stats(&self) -> GlobalStats {
        let active = self
            .pipelines
            .iter()
            .filter(|(_, p)| p.scanner.is_running())
            .map(|(network, _)| *network)
            .collect();
        self.stats.snapshot(active)
    }

    pub fn network_stats(&self, network: Network) -> Option<NetworkStats> {
        self.stats.network(network)
    }

    pub async fn health_check(&self) -> ManagerHealth {
        let scanners: Vec<ScannerHealthReport> = self.pipelines.values().map(|p| p.scanner.health_check()).collect();
        let mut snipers = Vec::with_capacity(self.pipelines.len());
        for pipeline in self.pipelines.values() {
            snipers.push(pipeline.sniper.health().await);
        }
        let statuses: Vec<ScannerHealth> = scanners.iter().map(|s| s.status).collect();

        ManagerHealth {
            status: overall_health(&statuses),
            running: self.is_running(),
            auto_snipe_enabled: self.auto_snipe_enabled(),
            scanners,
            snipers,
            breakers: self.breakers.health().await,
        }
    }
}
