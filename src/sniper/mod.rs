//! Block-Zero Sniper (one per network)
//!
//! Purpose:
//!     Turn a liquidity event into a signed buy and get it into the same block as
//!     the liquidity add, through a private relay bundle when one is configured and
//!     the public mempool otherwise.
//!
//! Flow:
//!     validate → gas (engine, capped) → balance → nonce → build → sign → submit
//!     → `Pending` result → `monitor` → confirmed | failed | timeout
//!
//! Every outbound call runs under the network's `rpc:` or `relay:` circuit breaker.
//! There are no automatic retries.
//!
//! Created: 2026-10-18
//!
//! Architecture:
//!     types.rs   — SnipeTarget, SnipeTransaction, SnipeStatus, SnipeResult (settle-once)
//!     nonce.rs   — NonceGuard (serialized pending-nonce reservation)
//!     monitor.rs — Receipt polling, Transfer-log accounting

pub mod monitor;
pub mod nonce;
pub mod types;

pub use nonce::NonceGuard;
pub use types::{Settlement, SnipeResult, SnipeStatus, SnipeTarget, SnipeTransaction};

use crate::chain::{Bundle, BundleRelay, ChainClient, SignedTx, TxSigner, UnsignedTx};
use crate::circuit_breaker::{relay_breaker_name, rpc_breaker_name, CircuitBreakerManager, CircuitState};
use crate::config::{DexConfig, NetworkConfig, SniperSettings};
use crate::contracts::IUniswapV2Router02;
use crate::error::{BreakerError, SniperError, SniperResult};
use crate::gas::{GasOptimizationResult, GasStrategyEngine};
use crate::types::{FeeFields, LiquidityAddEvent, Network, Urgency};
use crate::units::{gas_cost_native, gwei_to_wei, native_to_wei, wei_to_native};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Built and signed, not yet handed to anyone
struct PreparedBuy {
    tx: SnipeTransaction,
    dex: DexConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SniperHealth {
    pub network: Network,
    pub address: Address,
    pub rpc_breaker: CircuitState,
    pub relay_breaker: Option<CircuitState>,
    pub in_flight: usize,
    pub last_error: Option<String>,
}

/// Decrements the in-flight counter on drop
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct BlockZeroSniper {
    network: Network,
    config: NetworkConfig,
    settings: SniperSettings,
    client: Arc<dyn ChainClient>,
    signer: Arc<dyn TxSigner>,
    relay: Option<Arc<dyn BundleRelay>>,
    gas: Arc<GasStrategyEngine>,
    breakers: Arc<CircuitBreakerManager>,
    nonces: NonceGuard,
    receipt_poll_interval: Duration,
    in_flight: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl BlockZeroSniper {
    pub fn new(
        config: NetworkConfig,
        settings: SniperSettings,
        client: Arc<dyn ChainClient>,
        signer: Arc<dyn TxSigner>,
        gas: Arc<GasStrategyEngine>,
        breakers: Arc<CircuitBreakerManager>,
    ) -> Self {
        Self {
            network: config.network,
            config,
            settings,
            client,
            signer,
            relay: None,
            gas,
            breakers,
            nonces: NonceGuard::new(),
            receipt_poll_interval: Duration::from_secs(1),
            in_flight: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Submit through this relay first; public broadcast stays the fallback
    pub fn with_relay(mut self, relay: Arc<dyn BundleRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn relay_enabled(&self) -> bool {
        self.relay.is_some()
    }

    // ── Snipe ───────────────────────────────────────────────────────

    /// Buy the event's token. Always returns a result: `Pending` once submitted,
    /// `Error`/`Failed` with a reason otherwise.
    pub async fn snipe(&self, event: &LiquidityAddEvent, amount_native: Decimal, priority: Urgency) -> SnipeResult {
        self.snipe_target(&SnipeTarget::from(event), amount_native, priority).await
    }

    pub async fn snipe_target(&self, target: &SnipeTarget, amount_native: Decimal, priority: Urgency) -> SnipeResult {
        let _guard = InFlight::enter(&self.in_flight);
        let mut result = SnipeResult::pending(self.network, target.token, amount_native);

        let prepared = match self.prepare(target, amount_native, priority).await {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    "SNIPE REJECTED | network={} | token={:?} | amount={} | {}",
                    self.network, target.token, amount_native, e
                );
                self.note_error(&e);
                result.settle(Settlement::from_error(&e));
                return result;
            }
        };

        match self.submit(&prepared, target).await {
            Ok(relay_protected) => {
                info!(
                    "SNIPE SUBMITTED | network={} | dex={} | token={:?} | amount={} | nonce={} | fee={} gwei | relay={} | hash={:?}",
                    self.network,
                    prepared.dex.id,
                    target.token,
                    amount_native,
                    prepared.tx.nonce,
                    prepared.tx.fees.ceiling_gwei(),
                    relay_protected,
                    prepared.tx.hash
                );
                result.submitted(prepared.tx, relay_protected);
            }
            Err(e) => {
                error!(
                    "SNIPE FAILED | network={} | token={:?} | nonce={} | {}",
                    self.network, target.token, prepared.tx.nonce, e
                );
                if send_may_have_landed(&e) {
                    warn!(
                        "Nonce kept reserved, broadcast outcome unknown | network={} | nonce={} | hash={:?}",
                        self.network, prepared.tx.nonce, prepared.tx.hash
                    );
                } else {
                    self.nonces.release(prepared.tx.nonce).await;
                }
                self.note_error(&e);
                result.settle(Settlement::from_error(&e));
            }
        }
        result
    }

    async fn prepare(&self, target: &SnipeTarget, amount_native: Decimal, priority: Urgency) -> SniperResult<PreparedBuy> {
        if amount_native < self.settings.min_amount_native || amount_native > self.settings.max_amount_native {
            return Err(SniperError::Validation(format!(
                "amount {} outside [{}, {}] {}",
                amount_native,
                self.settings.min_amount_native,
                self.settings.max_amount_native,
                self.network.native_symbol()
            )));
        }

        let dex = match &target.dex {
            Some(id) => self.config.dex(id),
            None => self.config.default_dex(),
        }
        .cloned()
        .ok_or_else(|| {
            let name = target.dex.as_ref().map(|d| d.to_string()).unwrap_or_else(|| "<default>".into());
            SniperError::Validation(format!("unsupported DEX '{}' on {}", name, self.network))
        })?;

        let advice = self.gas.optimize(priority, self.network, None, None).await?;
        let fees = self.cap_fees(&advice);

        let value = native_to_wei(amount_native);
        let max_gas_cost = gas_cost_native(self.settings.gas_limit, fees.ceiling_gwei());
        let required = amount_native + max_gas_cost + self.settings.fee_safety_margin_native;
        let balance = wei_to_native(self.rpc(|c, me| async move { c.get_balance(me).await }).await?);
        if balance < required {
            return Err(SniperError::Validation(format!(
                "insufficient balance: have {} need {} {} (amount {} + gas {} + margin {})",
                balance,
                required,
                self.network.native_symbol(),
                amount_native,
                max_gas_cost,
                self.settings.fee_safety_margin_native
            )));
        }

        let nonce = self
            .nonces
            .reserve(|| self.rpc(|c, me| async move { c.get_pending_nonce(me).await }))
            .await?;

        let path = vec![self.config.wrapped_native, target.token];
        let min_amount_out = U256::from(1u64);
        let deadline = unix_now() + self.settings.deadline_secs;
        let input = self.swap_calldata(&path, min_amount_out, deadline);

        let unsigned = UnsignedTx {
            chain_id: self.network.chain_id(),
            nonce,
            to: dex.router,
            value,
            input,
            gas_limit: self.settings.gas_limit,
            fees,
        };

        let signed: SignedTx = match self.signer.sign(&unsigned).await {
            Ok(s) => s,
            Err(e) => {
                self.nonces.release(nonce).await;
                return Err(SniperError::Signing(format!("{:#}", e)));
            }
        };
        debug!("Buy signed | network={} | nonce={} | hash={:?}", self.network, nonce, signed.hash);

        Ok(PreparedBuy {
            tx: SnipeTransaction {
                network: self.network,
                token: target.token,
                router: dex.router,
                path,
                value,
                amount_native,
                nonce,
                gas_limit: self.settings.gas_limit,
                fees,
                deadline,
                slippage_tolerance_pct: self.settings.slippage_tolerance_pct,
                min_amount_out,
                strategy: advice.strategy,
                raw: signed.raw,
                hash: signed.hash,
            },
            dex,
        })
    }

    /// Engine advice with max fee capped at the configured ceiling
    fn cap_fees(&self, advice: &GasOptimizationResult) -> FeeFields {
        let price = advice.recommended_price_gwei.min(self.settings.max_gas_gwei);
        if advice.legacy {
            FeeFields::Legacy { gas_price: gwei_to_wei(price) }
        } else {
            let tip = advice.max_priority_fee_gwei.min(price);
            FeeFields::Eip1559 {
                max_fee_per_gas: gwei_to_wei(price),
                max_priority_fee_per_gas: gwei_to_wei(tip),
            }
        }
    }

    fn swap_calldata(&self, path: &[Address], min_out: U256, deadline: u64) -> Bytes {
        let to = self.signer.address();
        let deadline = U256::from(deadline);
        let encoded = if self.settings.fee_on_transfer_swap {
            IUniswapV2Router02::swapExactETHForTokensSupportingFeeOnTransferTokensCall {
                amountOutMin: min_out,
                path: path.to_vec(),
                to,
                deadline,
            }
            .abi_encode()
        } else {
            IUniswapV2Router02::swapExactETHForTokensCall { amountOutMin: min_out, path: path.to_vec(), to, deadline }
                .abi_encode()
        };
        Bytes::from(encoded)
    }

    /// Ok(true) = accepted by the relay, Ok(false) = broadcast publicly
    async fn submit(&self, prepared: &PreparedBuy, target: &SnipeTarget) -> SniperResult<bool> {
        if let Some(relay) = &self.relay {
            match self.submit_bundle(relay, prepared, target).await {
                Ok(()) => return Ok(true),
                Err(e) => warn!(
                    "Relay submission failed, falling back to public | network={} | hash={:?} | {}",
                    self.network, prepared.tx.hash, e
                ),
            }
        }

        let raw = prepared.tx.raw.clone();
        let breaker = self.breakers.get_breaker(&rpc_breaker_name(self.network));
        let client = Arc::clone(&self.client);
        breaker
            .call(|| async move { client.send_raw_transaction(&raw).await })
            .await
            .map_err(|e| match e {
                BreakerError::Operation(e) => SniperError::Submission(format!("{:#}", e)),
                other => other.into(),
            })?;
        Ok(false)
    }

    async fn submit_bundle(&self, relay: &Arc<dyn BundleRelay>, prepared: &PreparedBuy, target: &SnipeTarget) -> SniperResult<()> {
        let block = self.rpc(|c, _| async move { c.get_block_number().await }).await?;

        let mut txs = Vec::with_capacity(2);
        if let Some(trigger) = target.trigger_tx {
            match self.rpc(move |c, _| async move { c.get_raw_transaction(trigger).await }).await {
                Ok(Some(raw)) => txs.push(raw),
                Ok(None) => debug!("Trigger tx raw bytes unavailable | tx={:?}", trigger),
                Err(e) => debug!("Trigger tx lookup failed | tx={:?} | {}", trigger, e),
            }
        }
        txs.push(prepared.tx.raw.clone());

        let bundle = Bundle { txs, target_block: block + 1 };
        let breaker = self.breakers.get_breaker(&relay_breaker_name(self.network));
        let relay = Arc::clone(relay);
        let receipt = breaker
            .call(|| async move { relay.send_bundle(&bundle).await })
            .await
            .map_err(|e| match e {
                BreakerError::Operation(e) => SniperError::Submission(format!("relay: {:#}", e)),
                other => other.into(),
            })?;
        debug!(
            "Bundle accepted | network={} | target_block={} | bundle={:?}",
            self.network,
            block + 1,
            receipt.bundle_hash
        );
        Ok(())
    }

    /// Run a read through the network's RPC breaker with the signer's address at hand
    async fn rpc<T, F, Fut>(&self, op: F) -> SniperResult<T>
    where
        F: FnOnce(Arc<dyn ChainClient>, Address) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        let breaker = self.breakers.get_breaker(&rpc_breaker_name(self.network));
        let client = Arc::clone(&self.client);
        let me = self.signer.address();
        Ok(breaker.call(|| op(client, me)).await?)
    }

    // ── Monitor ─────────────────────────────────────────────────────

    /// Poll for the receipt and settle the result. Results that already left
    /// `Pending` (or never got a hash) are returned unchanged.
    pub async fn monitor(&self, mut result: SnipeResult, timeout: Duration) -> SnipeResult {
        let Some(hash) = result.tx_hash.filter(|_| result.is_pending()) else {
            return result;
        };
        let _guard = InFlight::enter(&self.in_flight);
        let breaker = self.breakers.get_breaker(&rpc_breaker_name(self.network));

        match monitor::wait_for_receipt(&self.client, &breaker, hash, self.receipt_poll_interval, timeout).await {
            Some(receipt) if receipt.status => {
                let tokens = monitor::tokens_received(&receipt.logs, result.token, self.signer.address());
                result.settle(Settlement::Confirmed { receipt, tokens_received: tokens });
                info!(
                    "SNIPE CONFIRMED | network={} | token={:?} | block={:?} | gas_used={:?} | received={} | hash={:?}",
                    self.network, result.token, result.block_number, result.gas_used, tokens, hash
                );
            }
            Some(receipt) => {
                result.settle(Settlement::Failed { receipt: Some(receipt), reason: "transaction reverted".into() });
                warn!(
                    "SNIPE REVERTED | network={} | token={:?} | block={:?} | hash={:?}",
                    self.network, result.token, result.block_number, hash
                );
                self.set_last_error(format!("{:?} reverted", hash));
            }
            None => {
                result.settle(Settlement::Timeout);
                warn!(
                    "SNIPE TIMEOUT | network={} | token={:?} | after={:?} | hash={:?}",
                    self.network, result.token, timeout, hash
                );
            }
        }
        result
    }

    // ── Health ──────────────────────────────────────────────────────

    pub async fn health(&self) -> SniperHealth {
        let rpc_breaker = self.breakers.get_breaker(&rpc_breaker_name(self.network)).state().await;
        let relay_breaker = match &self.relay {
            Some(_) => Some(self.breakers.get_breaker(&relay_breaker_name(self.network)).state().await),
            None => None,
        };
        SniperHealth {
            network: self.network,
            address: self.signer.address(),
            rpc_breaker,
            relay_breaker,
            in_flight: self.in_flight.load(Ordering::SeqCst),
            last_error: self.last_error.lock().ok().and_then(|e| e.clone()),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn note_error(&self, err: &SniperError) {
        self.set_last_error(err.to_string());
    }

    fn set_last_error(&self, message: String) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(message);
        }
    }
}

/// A send that timed out may still have reached the node; its nonce must not be
/// handed out again. Rejections and open breakers never sent anything.
fn send_may_have_landed(err: &SniperError) -> bool {
    matches!(err, SniperError::Timeout(_) | SniperError::Connectivity(_))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
