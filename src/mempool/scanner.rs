//! Mempool Scanner (one per network)
//!
//! Purpose:
//!     Hold N redundant pending-transaction subscriptions, filter and decode what
//!     arrives, and publish `LiquidityAddEvent`s.
//!
//! Pipeline per message:
//!     parse → dedupe → fee bounds → known router/factory → liquidity selector
//!     → decode → event → new-token bus (if new) → liquidity bus
//!
//! Every rejection is counted and swallowed; a bad message never stops a feed.
//!
//! Created: 2026-10-18

use super::connection::{ConnectionSet, ReconnectPolicy, ScannerHealth};
use super::decoder::{decode_liquidity, liquidity_operation, pair_address, selector_hex, target_token};
use super::dedupe::TxDedupe;
use crate::chain::PendingTxTransport;
use crate::config::{DexConfig, NetworkConfig};
use crate::error::{SniperError, SniperResult};
use crate::events::EventBus;
use crate::types::{LiquidityAddEvent, Network, PendingTransaction};
use alloy::primitives::Address;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

const DEDUPE_TTL: Duration = Duration::from_secs(300);
const DEDUPE_MAX_ENTRIES: usize = 100_000;

pub type EventRef = Arc<LiquidityAddEvent>;

// ── Stats ───────────────────────────────────────────────────────────

#[derive(Default)]
struct ScannerCounters {
    received: AtomicU64,
    parse_failures: AtomicU64,
    duplicates: AtomicU64,
    fee_filtered: AtomicU64,
    recipient_filtered: AtomicU64,
    selector_filtered: AtomicU64,
    decode_failures: AtomicU64,
    events: AtomicU64,
    new_tokens: AtomicU64,
    reconnects: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScannerStats {
    pub received: u64,
    pub parse_failures: u64,
    pub duplicates: u64,
    pub fee_filtered: u64,
    pub recipient_filtered: u64,
    pub selector_filtered: u64,
    pub decode_failures: u64,
    pub events: u64,
    pub new_tokens: u64,
    pub reconnects: u64,
    pub dropped_events: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannerHealthReport {
    pub network: Network,
    pub status: ScannerHealth,
    pub running: bool,
    pub active_connections: usize,
    pub total_connections: usize,
    pub stats: ScannerStats,
}

// ── Scanner ─────────────────────────────────────────────────────────

pub struct MempoolScanner {
    network: Network,
    config: NetworkConfig,
    transport: Arc<dyn PendingTxTransport>,
    /// router and factory addresses → DEX
    recipients: HashMap<Address, DexConfig>,
    dedupe: TxDedupe,
    liquidity_bus: EventBus<EventRef>,
    new_token_bus: EventBus<EventRef>,
    counters: ScannerCounters,
    connections: ConnectionSet,
    reconnect: ReconnectPolicy,
    startup_timeout: Duration,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MempoolScanner {
    pub fn new(
        config: NetworkConfig,
        transport: Arc<dyn PendingTxTransport>,
        event_capacity: usize,
        startup_timeout: Duration,
    ) -> Self {
        let mut recipients = HashMap::new();
        for dex in &config.dexes {
            recipients.insert(dex.router, dex.clone());
            if let Some(factory) = dex.factory {
                recipients.insert(factory, dex.clone());
            }
        }
        let (shutdown, _) = watch::channel(false);
        Self {
            network: config.network,
            connections: ConnectionSet::new(config.ws_endpoints.clone()),
            config,
            transport,
            recipients,
            dedupe: TxDedupe::new(DEDUPE_TTL, DEDUPE_MAX_ENTRIES),
            liquidity_bus: EventBus::new("liquidity", event_capacity),
            new_token_bus: EventBus::new("new_token", event_capacity),
            counters: ScannerCounters::default(),
            reconnect: ReconnectPolicy::default(),
            startup_timeout,
            running: AtomicBool::new(false),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    // ── Subscribers ─────────────────────────────────────────────────

    /// Events reach handlers in registration order; each handler runs on its own
    /// task and a failing handler does not affect the others.
    pub fn register_liquidity_handler<F, Fut>(&self, name: &str, handler: F) -> JoinHandle<()>
    where
        F: Fn(EventRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.liquidity_bus.register_handler(name, handler)
    }

    pub fn register_new_token_handler<F, Fut>(&self, name: &str, handler: F) -> JoinHandle<()>
    where
        F: Fn(EventRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.new_token_bus.register_handler(name, handler)
    }

    pub fn subscribe_liquidity(&self, name: &str) -> mpsc::Receiver<EventRef> {
        self.liquidity_bus.subscribe(name)
    }

    pub fn subscribe_new_tokens(&self, name: &str) -> mpsc::Receiver<EventRef> {
        self.new_token_bus.subscribe(name)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Spawn one reconnecting task per endpoint and wait (bounded) for the first
    /// active connection. Idempotent. On timeout the loops keep retrying in the
    /// background and a connectivity error is returned.
    pub async fn start(self: &Arc<Self>) -> SniperResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.send_replace(false);

        {
            let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            for (index, endpoint) in self.connections.endpoints().iter().enumerate() {
                let scanner = Arc::clone(self);
                let endpoint = endpoint.clone();
                let shutdown = self.shutdown.subscribe();
                tasks.push(tokio::spawn(async move {
                    scanner.run_connection(index, endpoint, shutdown).await;
                }));
            }
        }

        info!(
            "Mempool scanner starting | network={} | endpoints={} | dexes={}",
            self.network,
            self.connections.total(),
            self.config.dexes.len()
        );

        let deadline = tokio::time::Instant::now() + self.startup_timeout;
        while self.connections.active_count() == 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    "Mempool scanner has no active connection yet | network={} | waited={:?}",
                    self.network, self.startup_timeout
                );
                return Err(SniperError::Connectivity(format!(
                    "{}: no pending-tx connection within {:?}",
                    self.network, self.startup_timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        info!(
            "✅ Mempool scanner started | network={} | active={}/{}",
            self.network,
            self.connections.active_count(),
            self.connections.total()
        );
        Ok(())
    }

    /// Close every connection and join the tasks. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.connections.reset();
        info!("Mempool scanner stopped | network={}", self.network);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run_connection(self: Arc<Self>, index: usize, endpoint: String, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = self.reconnect.initial;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let subscribed = tokio::select! {
                res = self.transport.subscribe(&endpoint) => res,
                _ = shutdown.changed() => break,
            };

            match subscribed {
                Ok(mut stream) => {
                    backoff = self.reconnect.initial;
                    self.connections.set_active(index, true);
                    info!("WS connected | network={} | conn={} | endpoint={}", self.network, index, endpoint);

                    loop {
                        tokio::select! {
                            msg = stream.next() => match msg {
                                Some(raw) => {
                                    self.process_message(&raw);
                                }
                                None => break,
                            },
                            _ = shutdown.changed() => {
                                self.connections.set_active(index, false);
                                return;
                            }
                        }
                    }

                    self.connections.set_active(index, false);
                    warn!("WS dropped | network={} | conn={} | retry in {:?}", self.network, index, backoff);
                }
                Err(e) => {
                    warn!(
                        "WS connect failed | network={} | conn={} | retry in {:?} | {:#}",
                        self.network, index, backoff, e
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.changed() => break,
            }
            backoff = self.reconnect.next_backoff(backoff);
            self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        }

        self.connections.set_active(index, false);
        debug!("Connection task exited | network={} | conn={}", self.network, index);
    }

    // ── Pipeline ────────────────────────────────────────────────────

    /// Run one raw notification through the pipeline. Returns the published event.
    pub fn process_message(&self, raw: &serde_json::Value) -> Option<EventRef> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let tx = match PendingTransaction::from_json(raw) {
            Ok(tx) => tx,
            Err(e) => {
                self.counters.parse_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Pending tx skipped | network={} | {}", self.network, e);
                return None;
            }
        };

        if !self.dedupe.check_and_insert(tx.hash) {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let fee = tx.fees.ceiling_gwei();
        if fee < self.config.min_gas_gwei || fee > self.config.max_gas_gwei {
            self.counters.fee_filtered.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let Some(dex) = tx.to.and_then(|to| self.recipients.get(&to)) else {
            self.counters.recipient_filtered.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let Some(operation) = tx.selector().and_then(liquidity_operation) else {
            self.counters.selector_filtered.fetch_add(1, Ordering::Relaxed);
            trace!("Not a liquidity call | selector={}", selector_hex(&tx.input));
            return None;
        };

        let decoded = match decode_liquidity(operation, &tx, self.config.wrapped_native) {
            Ok(Some(d)) => d,
            Ok(None) => return None,
            Err(e) => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Liquidity decode failed | network={} | tx={:?} | {}", self.network, tx.hash, e);
                return None;
            }
        };

        let token = target_token(&decoded, &self.config.base_assets);
        let pool = match (dex.factory, dex.init_code_hash) {
            (Some(factory), Some(init)) => Some(pair_address(
                factory,
                init,
                decoded.token_a,
                decoded.token_b,
                self.config.wrapped_native,
            )),
            _ => None,
        };

        let event = Arc::new(LiquidityAddEvent::new(
            self.network,
            token,
            pool,
            dex.id.clone(),
            dex.router,
            decoded.operation,
            (decoded.token_a, decoded.amount_a),
            (decoded.token_b, decoded.amount_b),
            decoded.native_liquidity,
            tx,
            &self.config.base_assets,
        ));

        self.counters.events.fetch_add(1, Ordering::Relaxed);
        info!(
            "LIQUIDITY ADD | network={} | dex={} | op={} | token={:?} | native={} | new={} | tx={:?}",
            self.network,
            event.dex,
            event.operation,
            event.token,
            event.native_liquidity(),
            event.is_new_token(),
            event.pending_tx.hash
        );

        if event.is_new_token() {
            self.counters.new_tokens.fetch_add(1, Ordering::Relaxed);
            self.new_token_bus.publish(Arc::clone(&event));
        }
        self.liquidity_bus.publish(Arc::clone(&event));
        Some(event)
    }

    // ── Reporting ───────────────────────────────────────────────────

    pub fn stats(&self) -> ScannerStats {
        let c = &self.counters;
        ScannerStats {
            received: c.received.load(Ordering::Relaxed),
            parse_failures: c.parse_failures.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            fee_filtered: c.fee_filtered.load(Ordering::Relaxed),
            recipient_filtered: c.recipient_filtered.load(Ordering::Relaxed),
            selector_filtered: c.selector_filtered.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            events: c.events.load(Ordering::Relaxed),
            new_tokens: c.new_tokens.load(Ordering::Relaxed),
            reconnects: c.reconnects.load(Ordering::Relaxed),
            dropped_events: self.liquidity_bus.dropped() + self.new_token_bus.dropped(),
        }
    }

    pub fn health_check(&self) -> ScannerHealthReport {
        ScannerHealthReport {
            network: self.network,
            status: self.connections.health(),
            running: self.is_running(),
            active_connections: self.connections.active_count(),
            total_connections: self.connections.total(),
            stats: self.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::ChannelTransport;
    use crate::config::{SniperConfig, SAMPLE_TOML};
    use crate::contracts::{IUniswapV2Factory, IUniswapV2Router02};
    use crate::mempool::decoder::tests::{add_liquidity_eth_input, NEW_TOKEN, USDC, WETH};
    use crate::units::wei_to_native;
    use alloy::hex;
    use alloy::primitives::{address, U256};
    use alloy::sol_types::SolCall;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};

    const ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
    const FACTORY: &str = "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f";

    fn eth_config() -> NetworkConfig {
        let config = SniperConfig::from_toml_str(SAMPLE_TOML).unwrap();
        config.networks[&Network::Ethereum].clone()
    }

    fn scanner_with(transport: Arc<ChannelTransport>) -> Arc<MempoolScanner> {
        Arc::new(
            MempoolScanner::new(eth_config(), transport, 64, Duration::from_secs(1)).with_reconnect_policy(
                ReconnectPolicy { initial: Duration::from_millis(10), max: Duration::from_millis(40) },
            ),
        )
    }

    fn tx_json(hash_byte: u8, to: &str, value_wei: u128, input: &[u8]) -> Value {
        json!({
            "hash": format!("0x{}", hex::encode([hash_byte; 32])),
            "from": "0x00000000000000000000000000000000000000aa",
            "to": to,
            "value": format!("0x{:x}", value_wei),
            "gas": "0x2dc6c0",
            "gasPrice": "0x6fc23ac00",
            "input": format!("0x{}", hex::encode(input)),
        })
    }

    #[test]
    fn test_add_liquidity_eth_yields_one_new_token_event() {
        let scanner = scanner_with(Arc::new(ChannelTransport::new()));
        let two_eth = 2_000_000_000_000_000_000u128;
        let raw = tx_json(1, ROUTER, two_eth, &add_liquidity_eth_input(NEW_TOKEN));

        let event = scanner.process_message(&raw).expect("event");
        assert!(event.is_new_token());
        assert_eq!(event.token, NEW_TOKEN);
        assert_eq!(wei_to_native(event.pending_tx.value), dec!(2));
        assert_eq!(event.native_liquidity(), dec!(2));
        assert!(event.pool.is_some());

        // same tx from a second connection
        assert!(scanner.process_message(&raw).is_none());
        let stats = scanner.stats();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.new_tokens, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_missing_required_fields_produce_no_event() {
        let scanner = scanner_with(Arc::new(ChannelTransport::new()));
        let full = tx_json(2, ROUTER, 1, &add_liquidity_eth_input(NEW_TOKEN));
        for field in ["hash", "from", "value", "gas", "input", "gasPrice"] {
            let mut raw = full.clone();
            raw.as_object_mut().unwrap().remove(field);
            assert!(scanner.process_message(&raw).is_none(), "field {}", field);
        }
        assert!(scanner.process_message(&json!("garbage")).is_none());
        assert!(scanner.process_message(&Value::Null).is_none());
        let stats = scanner.stats();
        assert_eq!(stats.events, 0);
        assert_eq!(stats.parse_failures, 8);
    }

    #[test]
    fn test_filters_are_counted() {
        let scanner = scanner_with(Arc::new(ChannelTransport::new()));
        let input = add_liquidity_eth_input(NEW_TOKEN);

        // unknown recipient
        let raw = tx_json(3, "0x0000000000000000000000000000000000000001", 0, &input);
        assert!(scanner.process_message(&raw).is_none());

        // fee above max_gas_gwei (500)
        let mut raw = tx_json(4, ROUTER, 0, &input);
        raw["gasPrice"] = json!("0x8bb2c97000"); // 600 gwei
        assert!(scanner.process_message(&raw).is_none());

        // swap, not liquidity
        let raw = tx_json(5, ROUTER, 0, &[0x7f, 0xf3, 0x6a, 0xb5, 0, 0]);
        assert!(scanner.process_message(&raw).is_none());

        // liquidity selector but truncated args
        let raw = tx_json(6, ROUTER, 0, &input[..36]);
        assert!(scanner.process_message(&raw).is_none());

        let stats = scanner.stats();
        assert_eq!(stats.recipient_filtered, 1);
        assert_eq!(stats.fee_filtered, 1);
        assert_eq!(stats.selector_filtered, 1);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.events, 0);
    }

    #[test]
    fn test_base_pair_is_not_new_token() {
        let scanner = scanner_with(Arc::new(ChannelTransport::new()));
        let input = IUniswapV2Router02::addLiquidityCall {
            tokenA: WETH,
            tokenB: USDC,
            amountADesired: U256::from(10u64),
            amountBDesired: U256::from(20u64),
            amountAMin: U256::ZERO,
            amountBMin: U256::ZERO,
            to: Address::ZERO,
            deadline: U256::ZERO,
        }
        .abi_encode();
        let event = scanner.process_message(&tx_json(7, ROUTER, 0, &input)).unwrap();
        assert!(!event.is_new_token());
        assert_eq!(scanner.stats().new_tokens, 0);
    }

    #[test]
    fn test_create_pair_on_factory() {
        let scanner = scanner_with(Arc::new(ChannelTransport::new()));
        let other = address!("9999999999999999999999999999999999999999");
        let input = IUniswapV2Factory::createPairCall { tokenA: NEW_TOKEN, tokenB: other }.abi_encode();
        let event = scanner.process_message(&tx_json(8, FACTORY, 0, &input)).unwrap();
        assert!(event.is_new_token());
        assert_eq!(event.native_liquidity, U256::ZERO);
    }

    #[tokio::test]
    async fn test_handlers_receive_events() {
        let scanner = scanner_with(Arc::new(ChannelTransport::new()));
        let mut liquidity = scanner.subscribe_liquidity("test-liq");
        let mut new_tokens = scanner.subscribe_new_tokens("test-new");
        scanner.register_liquidity_handler("failing", |_| async { Err::<(), _>(anyhow::anyhow!("handler down")) });

        let raw = tx_json(9, ROUTER, 1, &add_liquidity_eth_input(NEW_TOKEN));
        scanner.process_message(&raw).unwrap();

        let a = liquidity.recv().await.unwrap();
        let b = new_tokens.recv().await.unwrap();
        assert_eq!(a.token, NEW_TOKEN);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_start_stop_with_redundant_connections() {
        let transport = Arc::new(ChannelTransport::new());
        let config = eth_config();
        let senders: Vec<_> = config.ws_endpoints.iter().map(|e| transport.connect(e)).collect();
        let scanner = scanner_with(transport.clone());
        let mut events = scanner.subscribe_liquidity("test");

        scanner.start().await.unwrap();
        scanner.start().await.unwrap(); // idempotent
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(scanner.health_check().status, ScannerHealth::Healthy);
        assert_eq!(scanner.health_check().active_connections, 3);

        // same pending tx on every connection → one event
        let raw = tx_json(10, ROUTER, 2_000_000_000_000_000_000, &add_liquidity_eth_input(NEW_TOKEN));
        for sender in &senders {
            sender.send(raw.clone()).unwrap();
        }
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert!(event.is_new_token());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(scanner.stats().events, 1);

        // two feeds drop; they cannot reconnect (endpoint refuses)
        drop(senders);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scanner.health_check().status, ScannerHealth::Unhealthy);
        assert!(scanner.stats().reconnects >= 1);

        scanner.stop().await;
        scanner.stop().await;
        assert!(!scanner.is_running());
    }

    #[tokio::test]
    async fn test_start_times_out_without_connections() {
        let transport = Arc::new(ChannelTransport::new());
        let scanner = Arc::new(MempoolScanner::new(eth_config(), transport, 8, Duration::from_millis(50)));
        let err = scanner.start().await.unwrap_err();
        assert!(matches!(err, SniperError::Connectivity(_)));
        scanner.stop().await;
    }
}
