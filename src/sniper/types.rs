//! Snipe data types
//!
//! `SnipeTransaction` is the immutable signed buy. `SnipeResult` tracks one attempt
//! and leaves `Pending` exactly once: the first `settle` wins and every later call
//! is refused.
//!
//! Created: 2026-10-18

use crate::chain::TxReceipt;
use crate::error::SniperError;
use crate::gas::GasStrategy;
use crate::types::{DexId, FeeFields, LiquidityAddEvent, Network};
use crate::units::wei_to_gwei;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// What to buy. Built from a liquidity event or from a manual request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnipeTarget {
    pub token: Address,
    /// None = the network's first configured DEX
    pub dex: Option<DexId>,
    /// Pending liquidity tx to bundle in front of the buy
    pub trigger_tx: Option<TxHash>,
}

impl SnipeTarget {
    pub fn manual(token: Address) -> Self {
        Self { token, dex: None, trigger_tx: None }
    }
}

impl From<&LiquidityAddEvent> for SnipeTarget {
    fn from(event: &LiquidityAddEvent) -> Self {
        Self {
            token: event.token,
            dex: Some(event.dex.clone()),
            trigger_tx: Some(event.pending_tx.hash),
        }
    }
}

/// A signed buy. Never modified after signing.
#[derive(Debug, Clone, PartialEq)]
pub struct SnipeTransaction {
    pub network: Network,
    pub token: Address,
    pub router: Address,
    pub path: Vec<Address>,
    /// wei sent with the swap
    pub value: U256,
    pub amount_native: Decimal,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fees: FeeFields,
    /// unix seconds
    pub deadline: u64,
    pub slippage_tolerance_pct: Decimal,
    pub min_amount_out: U256,
    pub strategy: GasStrategy,
    pub raw: Bytes,
    pub hash: TxHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnipeStatus {
    Pending,
    Confirmed,
    Failed,
    Timeout,
    Error,
}

impl SnipeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SnipeStatus::Pending)
    }
}

impl fmt::Display for SnipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            SnipeStatus::Pending => "pending",
            SnipeStatus::Confirmed => "confirmed",
            SnipeStatus::Failed => "failed",
            SnipeStatus::Timeout => "timeout",
            SnipeStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Terminal outcome handed to `SnipeResult::settle`
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Receipt with status 1
    Confirmed { receipt: TxReceipt, tokens_received: U256 },
    /// Receipt with status 0, or submission rejected
    Failed { receipt: Option<TxReceipt>, reason: String },
    Timeout,
    Error(String),
}

impl Settlement {
    /// Terminal status for an attempt that never reached a receipt. Build,
    /// validation and submission failures are `Failed` (no hash); only faults
    /// outside the attempt itself are `Error`.
    pub fn from_error(err: &SniperError) -> Self {
        match err {
            SniperError::Decode(_) | SniperError::Config(_) => Settlement::Error(err.to_string()),
            SniperError::Validation(_)
            | SniperError::Signing(_)
            | SniperError::Submission(_)
            | SniperError::Timeout(_)
            | SniperError::BreakerOpen(_)
            | SniperError::Connectivity(_) => Settlement::Failed { receipt: None, reason: err.to_string() },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SnipeResult {
    pub network: Network,
    pub token: Address,
    pub tx_hash: Option<TxHash>,
    status: SnipeStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub effective_gas_price_gwei: Option<Decimal>,
    /// raw units of the bought token credited to the signer
    pub tokens_received: Option<U256>,
    pub error: Option<String>,
    pub amount_native: Decimal,
    pub relay_protected: bool,
    pub strategy: Option<GasStrategy>,
    pub quoted_price_gwei: Option<Decimal>,
    pub started_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    /// started → settled, milliseconds
    pub execution_ms: Option<u64>,
    #[serde(skip)]
    pub transaction: Option<SnipeTransaction>,
}

impl SnipeResult {
    pub fn pending(network: Network, token: Address, amount_native: Decimal) -> Self {
        Self {
            network,
            token,
            tx_hash: None,
            status: SnipeStatus::Pending,
            block_number: None,
            gas_used: None,
            effective_gas_price_gwei: None,
            tokens_received: None,
            error: None,
            amount_native,
            relay_protected: false,
            strategy: None,
            quoted_price_gwei: None,
            started_at: Utc::now(),
            settled_at: None,
            execution_ms: None,
            transaction: None,
        }
    }

    pub fn status(&self) -> SnipeStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == SnipeStatus::Pending
    }

    /// Attach the signed transaction once it has been handed to the network
    pub fn submitted(&mut self, tx: SnipeTransaction, relay_protected: bool) {
        self.tx_hash = Some(tx.hash);
        self.strategy = Some(tx.strategy);
        self.quoted_price_gwei = Some(wei_to_gwei(tx.fees.ceiling_wei()));
        self.relay_protected = relay_protected;
        self.transaction = Some(tx);
    }

    /// Move to a terminal status. Returns false (and changes nothing) when the
    /// result has already left `Pending`.
    pub fn settle(&mut self, settlement: Settlement) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        match settlement {
            Settlement::Confirmed { receipt, tokens_received } => {
                self.status = SnipeStatus::Confirmed;
                self.apply_receipt(&receipt);
                self.tokens_received = Some(tokens_received);
            }
            Settlement::Failed { receipt, reason } => {
                self.status = SnipeStatus::Failed;
                if let Some(receipt) = receipt {
                    self.apply_receipt(&receipt);
                }
                self.error = Some(reason);
            }
            Settlement::Timeout => {
                self.status = SnipeStatus::Timeout;
                self.error = Some("no receipt before monitor timeout".to_string());
            }
            Settlement::Error(reason) => {
                self.status = SnipeStatus::Error;
                self.error = Some(reason);
            }
        }

        let now = Utc::now();
        self.settled_at = Some(now);
        self.execution_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        true
    }

    fn apply_receipt(&mut self, receipt: &TxReceipt) {
        self.block_number = receipt.block_number;
        self.gas_used = Some(receipt.gas_used);
        self.effective_gas_price_gwei = Some(wei_to_gwei(receipt.effective_gas_price));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn receipt(status: bool) -> TxReceipt {
        TxReceipt {
            tx_hash: TxHash::repeat_byte(1),
            status,
            block_number: Some(101),
            gas_used: 120_000,
            effective_gas_price: 25_000_000_000,
            logs: Vec::new(),
        }
    }

    fn fresh() -> SnipeResult {
        SnipeResult::pending(Network::Ethereum, Address::repeat_byte(9), dec!(0.05))
    }

    #[test]
    fn test_leaves_pending_exactly_once() {
        let terminal = [
            Settlement::Confirmed { receipt: receipt(true), tokens_received: U256::from(5u64) },
            Settlement::Failed { receipt: Some(receipt(false)), reason: "reverted".into() },
            Settlement::Timeout,
            Settlement::Error("boom".into()),
        ];

        for first in terminal.iter() {
            let mut result = fresh();
            assert!(result.is_pending());
            assert!(result.settle(first.clone()));
            let settled = result.status();
            assert!(settled.is_terminal());

            for later in terminal.iter() {
                assert!(!result.settle(later.clone()));
                assert_eq!(result.status(), settled);
            }
        }
    }

    #[test]
    fn test_confirmed_records_receipt() {
        let mut result = fresh();
        result.settle(Settlement::Confirmed { receipt: receipt(true), tokens_received: U256::from(42u64) });
        assert_eq!(result.status(), SnipeStatus::Confirmed);
        assert_eq!(result.block_number, Some(101));
        assert_eq!(result.gas_used, Some(120_000));
        assert_eq!(result.effective_gas_price_gwei, Some(dec!(25)));
        assert_eq!(result.tokens_received, Some(U256::from(42u64)));
        assert!(result.execution_ms.is_some());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_timeout_is_distinct_from_failed() {
        let mut result = fresh();
        result.settle(Settlement::Timeout);
        assert_eq!(result.status(), SnipeStatus::Timeout);
        assert_ne!(result.status(), SnipeStatus::Failed);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_error_mapping() {
        let failed = [
            SniperError::Submission("nonce too low".into()),
            SniperError::Validation("amount".into()),
            SniperError::Signing("bad key".into()),
            SniperError::BreakerOpen("rpc:ethereum".into()),
            SniperError::Timeout(std::time::Duration::from_secs(10)),
            SniperError::Connectivity("refused".into()),
        ];
        for err in failed {
            assert!(matches!(Settlement::from_error(&err), Settlement::Failed { receipt: None, .. }), "{}", err);
        }
        let internal = Settlement::from_error(&SniperError::Config("missing dex".into()));
        assert!(matches!(internal, Settlement::Error(_)));

        let mut result = fresh();
        result.settle(Settlement::from_error(&SniperError::Validation("amount".into())));
        assert_eq!(result.status(), SnipeStatus::Failed);
        assert!(result.tx_hash.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let mut result = fresh();
        result.settle(Settlement::Timeout);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "timeout");
    }
}
