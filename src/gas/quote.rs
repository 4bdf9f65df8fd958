//! Gas quotes
//!
//! A `GasQuote` turns one raw fee-market read into four speed tiers with
//! confirmation estimates and a congestion class. Tiers are forced monotonic
//! (slow ≤ standard ≤ fast ≤ fastest) after construction.
//!
//! Created: 2026-10-18

use crate::chain::FeeSnapshot;
use crate::types::Network;
use crate::units::wei_to_gwei;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedTier {
    Slow,
    Standard,
    Fast,
    Fastest,
}

impl SpeedTier {
    pub const ALL: [SpeedTier; 4] = [SpeedTier::Slow, SpeedTier::Standard, SpeedTier::Fast, SpeedTier::Fastest];

    /// Blocks until inclusion we expect at this tier
    fn expected_blocks(&self) -> u64 {
        match self {
            SpeedTier::Slow => 10,
            SpeedTier::Standard => 3,
            SpeedTier::Fast => 2,
            SpeedTier::Fastest => 1,
        }
    }

    /// Base-fee headroom multiplier (x1000)
    fn base_fee_multiplier(&self) -> u64 {
        match self {
            SpeedTier::Slow => 1000,
            SpeedTier::Standard => 1125,
            SpeedTier::Fast => 1250,
            SpeedTier::Fastest => 1500,
        }
    }

    /// Multiplier on eth_gasPrice for legacy chains (x1000)
    fn legacy_multiplier(&self) -> u64 {
        match self {
            SpeedTier::Slow => 900,
            SpeedTier::Standard => 1000,
            SpeedTier::Fast => 1200,
            SpeedTier::Fastest => 1500,
        }
    }
}

impl fmt::Display for SpeedTier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            SpeedTier::Slow => "slow",
            SpeedTier::Standard => "standard",
            SpeedTier::Fast => "fast",
            SpeedTier::Fastest => "fastest",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Congestion {
    Low,
    Medium,
    High,
    Extreme,
}

impl Congestion {
    /// Classified from the standard-tier price in gwei
    pub fn classify(standard_gwei: Decimal) -> Self {
        if standard_gwei < Decimal::from(50) {
            Congestion::Low
        } else if standard_gwei < Decimal::from(100) {
            Congestion::Medium
        } else if standard_gwei < Decimal::from(200) {
            Congestion::High
        } else {
            Congestion::Extreme
        }
    }

    /// Multiplier applied to strategy confidence
    pub fn confidence_factor(&self) -> Decimal {
        match self {
            Congestion::Low => Decimal::ONE,
            Congestion::Medium => Decimal::new(95, 2),
            Congestion::High => Decimal::new(85, 2),
            Congestion::Extreme => Decimal::new(70, 2),
        }
    }
}

impl fmt::Display for Congestion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Congestion::Low => "low",
            Congestion::Medium => "medium",
            Congestion::High => "high",
            Congestion::Extreme => "extreme",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierPrice {
    /// max fee per gas (or legacy gas price), gwei
    pub price_gwei: Decimal,
    /// priority fee, gwei (equals price on legacy chains)
    pub priority_gwei: Decimal,
    pub est_confirmation_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GasQuote {
    pub network: Network,
    pub block_number: u64,
    pub base_fee_gwei: Decimal,
    /// Median priority fee
    pub priority_fee_gwei: Decimal,
    pub slow: TierPrice,
    pub standard: TierPrice,
    pub fast: TierPrice,
    pub fastest: TierPrice,
    pub congestion: Congestion,
    pub pending_tx_count: u64,
    /// true when built from the hard-coded fallback
    pub is_fallback: bool,
    pub timestamp: DateTime<Utc>,
}

pub fn block_time_secs(network: Network) -> u64 {
    match network {
        Network::Ethereum => 12,
        Network::Bsc => 3,
        Network::Polygon => 2,
        Network::Arbitrum => 1,
        Network::Base => 2,
    }
}

impl GasQuote {
    pub fn from_snapshot(network: Network, snapshot: &FeeSnapshot) -> Self {
        let base_fee_gwei = wei_to_gwei(snapshot.base_fee);
        let legacy = snapshot.base_fee == 0;
        let block_time = block_time_secs(network);

        let tier_price = |tier: SpeedTier, index: usize| -> TierPrice {
            let est_confirmation_secs = tier.expected_blocks() * block_time;
            if legacy {
                let price = wei_to_gwei(snapshot.gas_price) * Decimal::from(tier.legacy_multiplier())
                    / Decimal::from(1000);
                TierPrice { price_gwei: price, priority_gwei: price, est_confirmation_secs }
            } else {
                let tip = wei_to_gwei(snapshot.priority_fees[index]);
                let base = base_fee_gwei * Decimal::from(tier.base_fee_multiplier()) / Decimal::from(1000);
                TierPrice { price_gwei: base + tip, priority_gwei: tip, est_confirmation_secs }
            }
        };

        let mut quote = Self {
            network,
            block_number: snapshot.block_number,
            base_fee_gwei,
            priority_fee_gwei: wei_to_gwei(snapshot.priority_fees[1]),
            slow: tier_price(SpeedTier::Slow, 0),
            standard: tier_price(SpeedTier::Standard, 1),
            fast: tier_price(SpeedTier::Fast, 2),
            fastest: tier_price(SpeedTier::Fastest, 3),
            congestion: Congestion::Low,
            pending_tx_count: snapshot.pending_tx_count.unwrap_or(0),
            is_fallback: false,
            timestamp: Utc::now(),
        };
        quote.enforce_monotonic();
        quote.congestion = Congestion::classify(quote.standard.price_gwei);
        quote
    }

    /// Conservative hard-coded quote used when every fee endpoint is down
    pub fn fallback(network: Network) -> Self {
        let mut quote = Self::from_snapshot(network, &fallback_snapshot(network));
        quote.is_fallback = true;
        quote
    }

    pub fn tier(&self, tier: SpeedTier) -> &TierPrice {
        match tier {
            SpeedTier::Slow => &self.slow,
            SpeedTier::Standard => &self.standard,
            SpeedTier::Fast => &self.fast,
            SpeedTier::Fastest => &self.fastest,
        }
    }

    /// Chains without EIP-1559 are quoted with a single legacy price
    pub fn is_legacy(&self) -> bool {
        self.base_fee_gwei.is_zero()
    }

    pub fn is_monotonic(&self) -> bool {
        self.slow.price_gwei <= self.standard.price_gwei
            && self.standard.price_gwei <= self.fast.price_gwei
            && self.fast.price_gwei <= self.fastest.price_gwei
    }

    fn enforce_monotonic(&mut self) {
        let raise = |lower: &TierPrice, upper: &mut TierPrice| {
            upper.price_gwei = upper.price_gwei.max(lower.price_gwei);
            upper.priority_gwei = upper.priority_gwei.max(lower.priority_gwei);
            upper.est_confirmation_secs = upper.est_confirmation_secs.min(lower.est_confirmation_secs);
        };
        let slow = self.slow;
        raise(&slow, &mut self.standard);
        let standard = self.standard;
        raise(&standard, &mut self.fast);
        let fast = self.fast;
        raise(&fast, &mut self.fastest);
    }
}

/// Hard-coded fee data per network (values in gwei, converted to wei)
pub fn fallback_snapshot(network: Network) -> FeeSnapshot {
    // (base fee, [tips p10, p50, p75, p95], legacy gas price) in milli-gwei
    let (base, tips, gas_price): (u128, [u128; 4], u128) = match network {
        Network::Ethereum => (30_000, [1_000, 2_000, 3_000, 5_000], 32_000),
        Network::Bsc => (0, [0; 4], 3_000),
        Network::Polygon => (50_000, [30_000, 35_000, 40_000, 50_000], 85_000),
        Network::Arbitrum => (100, [0, 0, 10, 50], 100),
        Network::Base => (50, [1, 10, 50, 100], 60),
    };
    let milli = 1_000_000u128; // wei per milli-gwei
    FeeSnapshot {
        block_number: 0,
        base_fee: base * milli,
        priority_fees: tips.map(|t| t * milli),
        gas_price: gas_price * milli,
        pending_tx_count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::fee_snapshot_gwei;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tiers_from_eip1559_snapshot() {
        let quote = GasQuote::from_snapshot(Network::Ethereum, &fee_snapshot_gwei(40, [1, 2, 3, 5]));
        assert_eq!(quote.slow.price_gwei, dec!(41));
        assert_eq!(quote.standard.price_gwei, dec!(47)); // 40 * 1.125 + 2
        assert_eq!(quote.fast.price_gwei, dec!(53));
        assert_eq!(quote.fastest.price_gwei, dec!(65));
        assert_eq!(quote.fastest.priority_gwei, dec!(5));
        assert_eq!(quote.congestion, Congestion::Low);
        assert_eq!(quote.fastest.est_confirmation_secs, 12);
        assert!(quote.is_monotonic());
        assert!(!quote.is_legacy());
    }

    #[test]
    fn test_tiers_monotonic_even_with_inverted_tips() {
        // node returned tips out of order
        let quote = GasQuote::from_snapshot(Network::Ethereum, &fee_snapshot_gwei(10, [20, 1, 1, 0]));
        assert!(quote.is_monotonic());
        assert!(quote.slow.priority_gwei <= quote.fastest.priority_gwei);
        for pair in SpeedTier::ALL.windows(2) {
            assert!(quote.tier(pair[0]).price_gwei <= quote.tier(pair[1]).price_gwei);
        }
    }

    #[test]
    fn test_legacy_chain_quote() {
        let quote = GasQuote::fallback(Network::Bsc);
        assert!(quote.is_legacy());
        assert!(quote.is_fallback);
        assert_eq!(quote.standard.price_gwei, dec!(3));
        assert_eq!(quote.slow.price_gwei, dec!(2.7));
        assert!(quote.is_monotonic());
    }

    #[test]
    fn test_congestion_thresholds() {
        assert_eq!(Congestion::classify(dec!(49.99)), Congestion::Low);
        assert_eq!(Congestion::classify(dec!(50)), Congestion::Medium);
        assert_eq!(Congestion::classify(dec!(100)), Congestion::High);
        assert_eq!(Congestion::classify(dec!(199)), Congestion::High);
        assert_eq!(Congestion::classify(dec!(200)), Congestion::Extreme);
    }

    #[test]
    fn test_fallback_quotes_are_monotonic() {
        for network in Network::ALL {
            assert!(GasQuote::fallback(network).is_monotonic(), "{}", network);
        }
    }
}
