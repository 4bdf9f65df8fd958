//! Gas Strategy Engine
//!
//! Purpose:
//!     Keep a live fee-market view per network and turn "how fast do I need this"
//!     into a concrete fee bid.
//!
//! Architecture:
//!     - One refresh task per network (interval, breaker-protected fee read,
//!       hard-coded fallback on failure)
//!     - Latest quote + bounded history ring per network (DashMap)
//!     - Short-TTL result cache keyed by the optimize request
//!     - Outcome history per network feeding strategy confidence
//!
//! Created: 2026-10-18

pub mod analysis;
pub mod quote;
pub mod strategy;

pub use analysis::{CostEstimate, GasTrend, TradingWindow, TrendDirection};
pub use quote::{Congestion, GasQuote, SpeedTier, TierPrice};
pub use strategy::{GasOptimizationResult, GasStrategy, OptimizeRequest, StrategyOption, StrategyParams};

use crate::chain::ChainClient;
use crate::circuit_breaker::{gas_breaker_name, CircuitBreakerManager};
use crate::config::GasSettings;
use crate::error::{SniperError, SniperResult};
use crate::types::{Network, Urgency};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Confidence used before any outcome has been recorded
const DEFAULT_HISTORY_CONFIDENCE: Decimal = Decimal::from_parts(8, 0, 0, false, 1);

/// What happened to a transaction priced by the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasOutcome {
    pub strategy: GasStrategy,
    pub quoted_price_gwei: Decimal,
    /// Effective price actually paid (None when it never landed)
    pub paid_price_gwei: Option<Decimal>,
    pub confirmed: bool,
}

struct NetworkFeed {
    client: Arc<dyn ChainClient>,
    native_usd_price: Decimal,
}

pub struct GasStrategyEngine {
    settings: GasSettings,
    feeds: HashMap<Network, NetworkFeed>,
    breakers: Arc<CircuitBreakerManager>,
    latest: DashMap<Network, GasQuote>,
    history: DashMap<Network, VecDeque<GasQuote>>,
    cache: DashMap<OptimizeRequest, (Instant, GasOptimizationResult)>,
    outcomes: DashMap<Network, VecDeque<GasOutcome>>,
    shutdown: watch::Sender<bool>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl GasStrategyEngine {
    pub fn new(settings: GasSettings, breakers: Arc<CircuitBreakerManager>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            settings,
            feeds: HashMap::new(),
            breakers,
            latest: DashMap::new(),
            history: DashMap::new(),
            cache: DashMap::new(),
            outcomes: DashMap::new(),
            shutdown,
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Track a network. Call before wrapping the engine in an Arc.
    pub fn register_network(&mut self, network: Network, client: Arc<dyn ChainClient>, native_usd_price: Decimal) {
        self.feeds.insert(network, NetworkFeed { client, native_usd_price });
    }

    pub fn networks(&self) -> Vec<Network> {
        let mut list: Vec<Network> = self.feeds.keys().copied().collect();
        list.sort();
        list
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Spawn one refresh loop per network. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = match self.tasks.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !tasks.is_empty() {
            return;
        }
        self.shutdown.send_replace(false);
        let interval = Duration::from_secs(self.settings.refresh_interval_secs);

        for network in self.networks() {
            let engine = Arc::clone(self);
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            engine.refresh(network).await;
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("Gas refresh stopped | network={}", network);
            }));
        }
        info!(
            "Gas engine started | networks={} | interval={}s",
            self.feeds.len(),
            self.settings.refresh_interval_secs
        );
    }

    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let handles: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut t) => t.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    // ── Quotes ──────────────────────────────────────────────────────

    /// Fetch a fresh quote (fallback on failure), store it, and return it
    pub async fn refresh(&self, network: Network) -> GasQuote {
        let quote = match self.feeds.get(&network) {
            Some(feed) => {
                let breaker = self.breakers.get_breaker(&gas_breaker_name(network));
                let client = Arc::clone(&feed.client);
                match breaker.call(|| async move { client.get_fee_snapshot().await }).await {
                    Ok(snapshot) => GasQuote::from_snapshot(network, &snapshot),
                    Err(e) => {
                        warn!("Gas quote fetch failed, using fallback | network={} | {}", network, e);
                        GasQuote::fallback(network)
                    }
                }
            }
            None => GasQuote::fallback(network),
        };

        debug!(
            "Gas quote | network={} | base={} | std={} | fastest={} | congestion={}",
            network, quote.base_fee_gwei, quote.standard.price_gwei, quote.fastest.price_gwei, quote.congestion
        );

        self.latest.insert(network, quote.clone());
        {
            let mut ring = self.history.entry(network).or_default();
            ring.push_back(quote.clone());
            while ring.len() > self.settings.history_size {
                ring.pop_front();
            }
        }
        self.cache.retain(|key, _| key.network != network);
        quote
    }

    pub async fn refresh_all(&self) {
        for network in self.networks() {
            self.refresh(network).await;
        }
    }

    pub fn current_quote(&self, network: Network) -> Option<GasQuote> {
        self.latest.get(&network).map(|q| q.clone())
    }

    /// Latest quote, fetching one when none exists yet
    pub async fn quote(&self, network: Network) -> GasQuote {
        match self.current_quote(network) {
            Some(q) => q,
            None => self.refresh(network).await,
        }
    }

    pub fn congestion(&self, network: Network) -> Option<Congestion> {
        self.latest.get(&network).map(|q| q.congestion)
    }

    pub fn history(&self, network: Network) -> Vec<GasQuote> {
        self.history
            .get(&network)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn native_usd_price(&self, network: Network) -> SniperResult<Decimal> {
        self.feeds
            .get(&network)
            .map(|f| f.native_usd_price)
            .ok_or_else(|| SniperError::Validation(format!("gas engine does not track network '{}'", network)))
    }

    // ── Decisions ───────────────────────────────────────────────────

    pub async fn optimize(
        &self,
        urgency: Urgency,
        network: Network,
        trade_value_usd: Option<Decimal>,
        max_cost_fraction: Option<Decimal>,
    ) -> SniperResult<GasOptimizationResult> {
        let request = OptimizeRequest { network, urgency, trade_value_usd, max_cost_fraction };
        let ttl = Duration::from_secs(self.settings.cache_ttl_secs);

        if let Some(entry) = self.cache.get(&request) {
            if entry.0.elapsed() < ttl {
                return Ok(entry.1.clone());
            }
        }

        let native_usd_price = self.native_usd_price(network)?;
        let quote = self.quote(network).await;
        let params = StrategyParams {
            swap_gas_units: self.settings.swap_gas_units,
            native_usd_price,
            large_trade_usd: self.settings.large_trade_usd,
            small_trade_usd: self.settings.small_trade_usd,
            history_confidence: self.history_confidence(network),
        };
        let result = strategy::select_strategy(&quote, &request, &params);
        debug!(
            "Gas optimize | network={} | urgency={} | strategy={} | price={} gwei | confidence={}",
            network, urgency, result.strategy, result.recommended_price_gwei, result.confidence
        );
        self.cache.insert(request, (Instant::now(), result.clone()));
        Ok(result)
    }

    pub async fn estimate_cost(&self, network: Network, gas_units: u64) -> SniperResult<Vec<CostEstimate>> {
        let native_usd_price = self.native_usd_price(network)?;
        let quote = self.quote(network).await;
        Ok(analysis::estimate_cost(&quote, gas_units, native_usd_price))
    }

    pub async fn recommend_trading_window(&self, network: Network, horizon_hours: u32) -> SniperResult<TradingWindow> {
        self.native_usd_price(network)?;
        let quote = self.quote(network).await;
        let history = self.history(network);
        Ok(analysis::recommend_trading_window(&history, &quote, Utc::now(), horizon_hours))
    }

    pub fn analyze_trend(&self, network: Network) -> Option<GasTrend> {
        analysis::analyze_trend(&self.history(network))
    }

    // ── Outcome feedback ────────────────────────────────────────────

    pub fn record_outcome(&self, network: Network, outcome: GasOutcome) {
        let mut ring = self.outcomes.entry(network).or_default();
        ring.push_back(outcome);
        while ring.len() > self.settings.outcome_history {
            ring.pop_front();
        }
    }

    /// 0.5 + 0.3 × confirmation rate + 0.2 × mean savings ratio, clamped to [0.1, 0.95].
    /// Savings ratio = (quoted − paid) / quoted per confirmed outcome.
    pub fn history_confidence(&self, network: Network) -> Decimal {
        let Some(ring) = self.outcomes.get(&network) else {
            return DEFAULT_HISTORY_CONFIDENCE;
        };
        if ring.is_empty() {
            return DEFAULT_HISTORY_CONFIDENCE;
        }

        let total = Decimal::from(ring.len());
        let confirmed = ring.iter().filter(|o| o.confirmed).count();
        let confirmation_rate = Decimal::from(confirmed) / total;

        let savings: Vec<Decimal> = ring
            .iter()
            .filter(|o| o.confirmed && o.quoted_price_gwei > Decimal::ZERO)
            .filter_map(|o| {
                o.paid_price_gwei.map(|paid| {
                    ((o.quoted_price_gwei - paid) / o.quoted_price_gwei).clamp(Decimal::ZERO, Decimal::ONE)
                })
            })
            .collect();
        let mean_savings = if savings.is_empty() {
            Decimal::ZERO
        } else {
            savings.iter().copied().sum::<Decimal>() / Decimal::from(savings.len())
        };

        let confidence = Decimal::new(5, 1) + Decimal::new(3, 1) * confirmation_rate + Decimal::new(2, 1) * mean_savings;
        confidence.clamp(Decimal::new(1, 1), Decimal::new(95, 2)).round_dp(4)
    }
}
