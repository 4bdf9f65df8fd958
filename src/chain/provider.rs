//! JSON-RPC client over an alloy HTTP provider
//!
//! Created: 2026-10-18

use super::{ChainClient, FeeSnapshot, ReceiptLog, TxReceipt, REWARD_PERCENTILES};
use crate::types::Network;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

/// Blocks sampled by eth_feeHistory
const FEE_HISTORY_BLOCKS: u64 = 10;

#[derive(Clone)]
pub struct AlloyChainClient {
    network: Network,
    provider: DynProvider,
}

impl AlloyChainClient {
    /// HTTP provider for request/response calls (receipts, nonce, broadcast)
    pub fn connect_http(network: Network, rpc_url: &str) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect_http(rpc_url.parse().context("Invalid RPC URL")?)
            .erased();
        info!("RPC client ready | network={}", network);
        Ok(Self { network, provider })
    }

    pub fn from_provider(network: Network, provider: DynProvider) -> Self {
        Self { network, provider }
    }

    pub fn network(&self) -> Network {
        self.network
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn get_transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .context("eth_getTransactionReceipt failed")?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash: r.transaction_hash,
            status: r.status(),
            block_number: r.block_number,
            gas_used: r.gas_used,
            effective_gas_price: r.effective_gas_price,
            logs: r
                .inner
                .logs()
                .iter()
                .map(|log| ReceiptLog {
                    address: log.inner.address,
                    topics: log.inner.data.topics().to_vec(),
                    data: log.inner.data.data.clone(),
                })
                .collect(),
        }))
    }

    async fn get_block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context("eth_blockNumber failed")
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .context("eth_getBalance failed")
    }

    async fn get_pending_nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .context("eth_getTransactionCount(pending) failed")
    }

    async fn get_fee_snapshot(&self) -> Result<FeeSnapshot> {
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .context("eth_gasPrice failed")?;

        // Chains without EIP-1559 reject or return empty fee history; fall back to gasPrice
        let history = self
            .provider
            .get_fee_history(FEE_HISTORY_BLOCKS, BlockNumberOrTag::Latest, &REWARD_PERCENTILES)
            .await;

        let (block_number, base_fee, priority_fees) = match history {
            Ok(history) => {
                // last entry is the projected base fee of the next block
                let base_fee = history.base_fee_per_gas.last().copied().unwrap_or(0);
                let rewards = history.reward.unwrap_or_default();
                let mut priority_fees = [0u128; 4];
                if !rewards.is_empty() {
                    for (i, slot) in priority_fees.iter_mut().enumerate() {
                        let sum: u128 = rewards.iter().filter_map(|r| r.get(i)).sum();
                        *slot = sum / rewards.len() as u128;
                    }
                }
                let block = history.oldest_block + rewards.len().saturating_sub(1) as u64;
                (block, base_fee, priority_fees)
            }
            Err(e) => {
                debug!("Fee history unavailable | network={} | {}", self.network, e);
                let block = self.get_block_number().await?;
                (block, 0, [0; 4])
            }
        };

        let pending_tx_count = self
            .provider
            .raw_request::<_, serde_json::Value>("txpool_status".into(), ())
            .await
            .ok()
            .and_then(|v| v.get("pending").and_then(|p| p.as_str()).map(str::to_owned))
            .and_then(|p| u64::from_str_radix(p.trim_start_matches("0x"), 16).ok());

        Ok(FeeSnapshot {
            block_number,
            base_fee,
            priority_fees,
            gas_price,
            pending_tx_count,
        })
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .context("eth_sendRawTransaction failed")?;
        Ok(*pending.tx_hash())
    }

    async fn get_raw_transaction(&self, hash: TxHash) -> Result<Option<Bytes>> {
        self.provider
            .raw_request::<_, Option<Bytes>>("eth_getRawTransactionByHash".into(), (hash,))
            .await
            .context("eth_getRawTransactionByHash failed")
    }
}
