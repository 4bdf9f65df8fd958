//! Chain collaborators
//!
//! The pipeline talks to the outside world only through the traits below:
//! a JSON-RPC client, a pending-transaction push transport, a bundle relay, and a
//! transaction signer. Production implementations sit in the sibling files; the
//! `mock` module drives tests without a node.
//!
//! Created: 2026-10-18

pub mod provider;
pub mod relay;
pub mod signer;
pub mod subscription;

#[cfg(test)]
pub mod mock;

pub use provider::AlloyChainClient;
pub use relay::FlashbotsRelay;
pub use signer::LocalTxSigner;
pub use subscription::WsPendingTransport;

use crate::types::FeeFields;
use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Priority-fee percentiles requested from `eth_feeHistory`, one per speed tier
pub const REWARD_PERCENTILES: [f64; 4] = [10.0, 50.0, 75.0, 95.0];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    /// true = executed successfully
    pub status: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    /// wei
    pub effective_gas_price: u128,
    pub logs: Vec<ReceiptLog>,
}

/// Raw fee-market read for one network. All values in wei.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSnapshot {
    pub block_number: u64,
    /// Base fee of the next block; 0 on chains without EIP-1559
    pub base_fee: u128,
    /// Average priority fee at each of `REWARD_PERCENTILES`
    pub priority_fees: [u128; 4],
    /// Legacy `eth_gasPrice`, used when there is no base fee
    pub gas_price: u128,
    pub pending_tx_count: Option<u64>,
}

/// Everything needed to sign a buy, independent of signer implementation
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    pub fees: FeeFields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    /// EIP-2718 encoded bytes, ready for eth_sendRawTransaction
    pub raw: Bytes,
    pub hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Raw signed transactions in execution order
    pub txs: Vec<Bytes>,
    pub target_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReceipt {
    pub bundle_hash: Option<B256>,
}

/// JSON-RPC surface used by the sniper and gas engine
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>>;

    async fn get_block_number(&self) -> Result<u64>;

    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// Nonce including transactions still in the pool
    async fn get_pending_nonce(&self, address: Address) -> Result<u64>;

    async fn get_fee_snapshot(&self) -> Result<FeeSnapshot>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash>;

    /// Signed bytes of a (pending) transaction, if the node still has it
    async fn get_raw_transaction(&self, hash: TxHash) -> Result<Option<Bytes>>;
}

/// Private relay accepting transaction bundles
#[async_trait]
pub trait BundleRelay: Send + Sync {
    async fn send_bundle(&self, bundle: &Bundle) -> Result<BundleReceipt>;
}

/// Push feed of full pending-transaction objects from one endpoint.
/// The stream ends when the connection drops.
#[async_trait]
pub trait PendingTxTransport: Send + Sync {
    async fn subscribe(&self, endpoint: &str) -> Result<BoxStream<'static, serde_json::Value>>;
}

#[async_trait]
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn sign(&self, tx: &UnsignedTx) -> Result<SignedTx>;
}
