//! Test doubles for the chain collaborators

use super::{
    Bundle, BundleReceipt, BundleRelay, ChainClient, FeeSnapshot, PendingTxTransport, SignedTx, TxReceipt,
    TxSigner, UnsignedTx,
};
use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

// ── Chain client ────────────────────────────────────────────────────

pub struct MockChainClient {
    pub balance: Mutex<U256>,
    /// Returned by get_pending_nonce regardless of what was sent
    pub pending_nonce: AtomicU64,
    pub nonce_delay: Mutex<Duration>,
    pub block_number: AtomicU64,
    pub fee_snapshot: Mutex<Option<FeeSnapshot>>,
    pub receipts: Mutex<HashMap<TxHash, TxReceipt>>,
    /// Receipt template applied to every broadcast tx when set
    pub auto_receipt: Mutex<Option<TxReceipt>>,
    pub raw_txs: Mutex<HashMap<TxHash, Bytes>>,
    pub sent: Mutex<Vec<Bytes>>,
    pub reject_sends: Mutex<Option<String>>,
    /// Applied before a send is accepted
    pub send_delay: Mutex<Duration>,
    pub receipt_delay: Mutex<Duration>,
    pub fail_rpc: AtomicBool,
    pub nonce_calls: AtomicU64,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            balance: Mutex::new(U256::from(10u64) * U256::from(10u64).pow(U256::from(18u64))),
            pending_nonce: AtomicU64::new(0),
            nonce_delay: Mutex::new(Duration::ZERO),
            block_number: AtomicU64::new(100),
            fee_snapshot: Mutex::new(None),
            receipts: Mutex::new(HashMap::new()),
            auto_receipt: Mutex::new(None),
            raw_txs: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            reject_sends: Mutex::new(None),
            send_delay: Mutex::new(Duration::ZERO),
            receipt_delay: Mutex::new(Duration::ZERO),
            fail_rpc: AtomicBool::new(false),
            nonce_calls: AtomicU64::new(0),
        }
    }

    pub fn with_balance_native(self, native: u64) -> Self {
        *self.balance.lock().unwrap() = U256::from(native) * U256::from(10u64).pow(U256::from(18u64));
        self
    }

    pub fn set_fee_snapshot(&self, snapshot: FeeSnapshot) {
        *self.fee_snapshot.lock().unwrap() = Some(snapshot);
    }

    pub fn confirm_all(&self, status: bool, block: u64) {
        *self.auto_receipt.lock().unwrap() = Some(TxReceipt {
            tx_hash: TxHash::ZERO,
            status,
            block_number: Some(block),
            gas_used: 150_000,
            effective_gas_price: 30_000_000_000,
            logs: Vec::new(),
        });
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn check_rpc(&self) -> Result<()> {
        if self.fail_rpc.load(Ordering::SeqCst) {
            bail!("mock rpc unavailable");
        }
        Ok(())
    }
}

/// Snapshot with tiers priced at base + tip in gwei
pub fn fee_snapshot_gwei(base: u64, tips: [u64; 4]) -> FeeSnapshot {
    let gwei = 1_000_000_000u128;
    FeeSnapshot {
        block_number: 100,
        base_fee: base as u128 * gwei,
        priority_fees: tips.map(|t| t as u128 * gwei),
        gas_price: (base as u128 + tips[1] as u128) * gwei,
        pending_tx_count: Some(5_000),
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>> {
        self.check_rpc()?;
        let delay = *self.receipt_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn get_block_number(&self) -> Result<u64> {
        self.check_rpc()?;
        Ok(self.block_number.load(Ordering::SeqCst))
    }

    async fn get_balance(&self, _address: Address) -> Result<U256> {
        self.check_rpc()?;
        Ok(*self.balance.lock().unwrap())
    }

    async fn get_pending_nonce(&self, _address: Address) -> Result<u64> {
        self.check_rpc()?;
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.nonce_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.pending_nonce.load(Ordering::SeqCst))
    }

    async fn get_fee_snapshot(&self) -> Result<FeeSnapshot> {
        self.check_rpc()?;
        self.fee_snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("no fee data"))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash> {
        self.check_rpc()?;
        let delay = *self.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.reject_sends.lock().unwrap().clone() {
            bail!("{}", reason);
        }
        let hash = keccak256(raw);
        self.sent.lock().unwrap().push(Bytes::copy_from_slice(raw));
        if let Some(template) = self.auto_receipt.lock().unwrap().clone() {
            let receipt = TxReceipt { tx_hash: hash, ..template };
            self.receipts.lock().unwrap().insert(hash, receipt);
        }
        Ok(hash)
    }

    async fn get_raw_transaction(&self, hash: TxHash) -> Result<Option<Bytes>> {
        self.check_rpc()?;
        Ok(self.raw_txs.lock().unwrap().get(&hash).cloned())
    }
}

// ── Relay ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockRelay {
    pub fail: AtomicBool,
    pub bundles: Mutex<Vec<Bundle>>,
}

impl MockRelay {
    pub fn failing() -> Self {
        Self { fail: AtomicBool::new(true), bundles: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl BundleRelay for MockRelay {
    async fn send_bundle(&self, bundle: &Bundle) -> Result<BundleReceipt> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("relay rejected bundle: simulation failed");
        }
        self.bundles.lock().unwrap().push(bundle.clone());
        Ok(BundleReceipt { bundle_hash: None })
    }
}

// ── Signer ──────────────────────────────────────────────────────────

pub struct MockSigner {
    pub address: Address,
    pub signed: Mutex<Vec<UnsignedTx>>,
}

impl MockSigner {
    pub fn new() -> Self {
        Self { address: Address::repeat_byte(0xaa), signed: Mutex::new(Vec::new()) }
    }

    pub fn nonces(&self) -> Vec<u64> {
        self.signed.lock().unwrap().iter().map(|t| t.nonce).collect()
    }
}

#[async_trait]
impl TxSigner for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, tx: &UnsignedTx) -> Result<SignedTx> {
        self.signed.lock().unwrap().push(tx.clone());
        let mut raw = vec![0x02];
        raw.extend_from_slice(&tx.chain_id.to_be_bytes());
        raw.extend_from_slice(&tx.nonce.to_be_bytes());
        raw.extend_from_slice(tx.to.as_slice());
        raw.extend_from_slice(&tx.value.to_be_bytes::<32>());
        raw.extend_from_slice(&tx.input);
        let raw = Bytes::from(raw);
        let hash = keccak256(&raw);
        Ok(SignedTx { raw, hash })
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// Pending-tx transport fed from test code. Each endpoint can be connected once per
/// `connect` call; unknown endpoints refuse.
#[derive(Default)]
pub struct ChannelTransport {
    receivers: Mutex<HashMap<String, mpsc::UnboundedReceiver<serde_json::Value>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `endpoint` accept one connection; returns the feed sender
    pub fn connect(&self, endpoint: &str) -> mpsc::UnboundedSender<serde_json::Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.receivers.lock().unwrap().insert(endpoint.to_string(), rx);
        tx
    }
}

#[async_trait]
impl PendingTxTransport for ChannelTransport {
    async fn subscribe(&self, endpoint: &str) -> Result<BoxStream<'static, serde_json::Value>> {
        let rx = self
            .receivers
            .lock()
            .unwrap()
            .remove(endpoint)
            .ok_or_else(|| anyhow!("connection refused: {}", endpoint))?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
