// Core data structures shared by scanner, sniper and manager

use crate::error::SniperError;
use crate::units::{wei_to_gwei, wei_to_native};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// The native coin itself (not its wrapped ERC20) as a pooled-token placeholder.
/// Used for the native leg of `addLiquidityETH`.
pub const NATIVE_TOKEN: Address = Address::ZERO;

/// Networks we know how to watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Bsc,
    Polygon,
    Arbitrum,
    Base,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Network::Ethereum,
        Network::Bsc,
        Network::Polygon,
        Network::Arbitrum,
        Network::Base,
    ];

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Ethereum => 1,
            Network::Bsc => 56,
            Network::Polygon => 137,
            Network::Arbitrum => 42161,
            Network::Base => 8453,
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Network::Ethereum | Network::Arbitrum | Network::Base => "ETH",
            Network::Bsc => "BNB",
            Network::Polygon => "POL",
        }
    }

    /// Name used for circuit breakers and log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Bsc => "bsc",
            Network::Polygon => "polygon",
            Network::Arbitrum => "arbitrum",
            Network::Base => "base",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = SniperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(Network::Ethereum),
            "bsc" | "bnb" | "binance" => Ok(Network::Bsc),
            "polygon" | "matic" => Ok(Network::Polygon),
            "arbitrum" | "arb" => Ok(Network::Arbitrum),
            "base" => Ok(Network::Base),
            other => Err(SniperError::Config(format!("unknown network '{}'", other))),
        }
    }
}

/// DEX identifier as configured (e.g. "uniswap_v2", "pancakeswap_v2")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DexId(pub String);

impl DexId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DexId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How fast a caller needs inclusion. Doubles as snipe priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Critical,
}

impl Urgency {
    /// 0 = low … 3 = critical
    pub fn rank(&self) -> u8 {
        match self {
            Urgency::Low => 0,
            Urgency::Normal => 1,
            Urgency::High => 2,
            Urgency::Critical => 3,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl FromStr for Urgency {
    type Err = SniperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "normal" | "medium" => Ok(Urgency::Normal),
            "high" => Ok(Urgency::High),
            "critical" | "max" => Ok(Urgency::Critical),
            other => Err(SniperError::Config(format!("unknown urgency '{}'", other))),
        }
    }
}

// ── Pending transaction ─────────────────────────────────────────────

/// Fee fields as broadcast by the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeFields {
    Legacy { gas_price: u128 },
    Eip1559 { max_fee_per_gas: u128, max_priority_fee_per_gas: u128 },
}

impl FeeFields {
    /// Highest price per gas the sender could pay, in wei
    pub fn ceiling_wei(&self) -> u128 {
        match self {
            FeeFields::Legacy { gas_price } => *gas_price,
            FeeFields::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
        }
    }

    pub fn ceiling_gwei(&self) -> Decimal {
        wei_to_gwei(self.ceiling_wei())
    }
}

/// A transaction seen in the mempool. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub from: Address,
    /// None for contract creation
    pub to: Option<Address>,
    /// wei
    pub value: U256,
    pub gas_limit: u64,
    pub fees: FeeFields,
    pub input: Bytes,
    pub observed_at: DateTime<Utc>,
}

impl PendingTransaction {
    /// Parse a full transaction object from an `eth_subscribe("newPendingTransactions", true)`
    /// notification. Any missing or malformed required field is a decode error.
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, SniperError> {
        let hash: TxHash = parse_field(raw, "hash")?;
        let from: Address = parse_field(raw, "from")?;
        let to = match raw.get("to") {
            None | Some(serde_json::Value::Null) => None,
            Some(_) => Some(parse_field::<Address>(raw, "to")?),
        };
        let value: U256 = parse_field(raw, "value")?;
        let gas_limit = parse_quantity_u64(raw, "gas")?;
        let input: Bytes = match raw.get("input").or_else(|| raw.get("data")) {
            Some(serde_json::Value::String(s)) => Bytes::from_str(s)
                .map_err(|e| SniperError::Decode(format!("input: {}", e)))?,
            _ => return Err(SniperError::Decode("missing field 'input'".into())),
        };

        let fees = match (raw.get("maxFeePerGas"), raw.get("maxPriorityFeePerGas")) {
            (Some(max_fee), Some(tip)) if !max_fee.is_null() && !tip.is_null() => FeeFields::Eip1559 {
                max_fee_per_gas: quantity_u128(max_fee, "maxFeePerGas")?,
                max_priority_fee_per_gas: quantity_u128(tip, "maxPriorityFeePerGas")?,
            },
            _ => match raw.get("gasPrice") {
                Some(gp) if !gp.is_null() => FeeFields::Legacy {
                    gas_price: quantity_u128(gp, "gasPrice")?,
                },
                _ => return Err(SniperError::Decode("missing fee fields".into())),
            },
        };

        Ok(Self {
            hash,
            from,
            to,
            value,
            gas_limit,
            fees,
            input,
            observed_at: Utc::now(),
        })
    }

    /// Value in native units (e.g. 2.0 ETH)
    pub fn value_native(&self) -> Decimal {
        wei_to_native(self.value)
    }

    /// Leading 4-byte function selector, if present
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.input.get(..4).and_then(|s| s.try_into().ok())
    }
}

fn parse_field<T: FromStr>(raw: &serde_json::Value, field: &str) -> Result<T, SniperError>
where
    T::Err: fmt::Display,
{
    match raw.get(field) {
        Some(serde_json::Value::String(s)) => {
            T::from_str(s).map_err(|e| SniperError::Decode(format!("{}: {}", field, e)))
        }
        Some(other) => Err(SniperError::Decode(format!("{}: unexpected value {}", field, other))),
        None => Err(SniperError::Decode(format!("missing field '{}'", field))),
    }
}

fn parse_quantity_u64(raw: &serde_json::Value, field: &str) -> Result<u64, SniperError> {
    match raw.get(field) {
        Some(v) => quantity_u128(v, field)
            .and_then(|q| u64::try_from(q).map_err(|_| SniperError::Decode(format!("{} overflow", field)))),
        None => Err(SniperError::Decode(format!("missing field '{}'", field))),
    }
}

fn quantity_u128(value: &serde_json::Value, field: &str) -> Result<u128, SniperError> {
    let s = value
        .as_str()
        .ok_or_else(|| SniperError::Decode(format!("{}: not a hex quantity", field)))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Err(SniperError::Decode(format!("{}: empty quantity", field)));
    }
    u128::from_str_radix(digits, 16).map_err(|e| SniperError::Decode(format!("{}: {}", field, e)))
}

// ── Liquidity event ─────────────────────────────────────────────────

/// Which liquidity operation the pending transaction performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityOperation {
    AddLiquidity,
    AddLiquidityEth,
    Mint,
    CreatePair,
}

impl fmt::Display for LiquidityOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            LiquidityOperation::AddLiquidity => "addLiquidity",
            LiquidityOperation::AddLiquidityEth => "addLiquidityETH",
            LiquidityOperation::Mint => "mint",
            LiquidityOperation::CreatePair => "createPair",
        };
        f.write_str(s)
    }
}

/// A pool being funded (or created) in the mempool. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct LiquidityAddEvent {
    pub network: Network,
    /// The token a buyer would want (the non-base leg)
    pub token: Address,
    /// CREATE2-derived pair address when the DEX's init code hash is configured
    pub pool: Option<Address>,
    pub dex: DexId,
    pub router: Address,
    pub operation: LiquidityOperation,
    pub token_a: Address,
    pub token_b: Address,
    /// raw token units
    pub amount_a: U256,
    pub amount_b: U256,
    /// Native coin committed to the pool (exact for addLiquidityETH, zero when unknown)
    pub native_liquidity: U256,
    pub pending_tx: PendingTransaction,
    pub detected_at: DateTime<Utc>,
    is_new_token: bool,
}

impl LiquidityAddEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: Network,
        token: Address,
        pool: Option<Address>,
        dex: DexId,
        router: Address,
        operation: LiquidityOperation,
        (token_a, amount_a): (Address, U256),
        (token_b, amount_b): (Address, U256),
        native_liquidity: U256,
        pending_tx: PendingTransaction,
        base_assets: &HashSet<Address>,
    ) -> Self {
        let is_new_token = is_new_token(token_a, token_b, base_assets);
        Self {
            network,
            token,
            pool,
            dex,
            router,
            operation,
            token_a,
            token_b,
            amount_a,
            amount_b,
            native_liquidity,
            pending_tx,
            detected_at: Utc::now(),
            is_new_token,
        }
    }

    pub fn is_new_token(&self) -> bool {
        self.is_new_token
    }

    pub fn native_liquidity(&self) -> Decimal {
        wei_to_native(self.native_liquidity)
    }
}

/// True iff neither pooled token is a known base asset and the two differ.
pub fn is_new_token(token_a: Address, token_b: Address, base_assets: &HashSet<Address>) -> bool {
    token_a != token_b && !base_assets.contains(&token_a) && !base_assets.contains(&token_b)
}
