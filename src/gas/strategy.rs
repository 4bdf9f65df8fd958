//! Strategy selection
//!
//! Pure decision logic behind `GasStrategyEngine::optimize`: urgency picks a base
//! strategy, trade size narrows the allowed set, an optional cost ceiling filters
//! and scores candidates, and confidence is derived from outcome history and
//! congestion.
//!
//! Created: 2026-10-18

use super::quote::{Congestion, GasQuote, SpeedTier};
use crate::types::{Network, Urgency};
use crate::units::gas_cost_native;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GasStrategy {
    Economy,
    Standard,
    Fast,
    Fastest,
}

impl GasStrategy {
    pub const ALL: [GasStrategy; 4] =
        [GasStrategy::Economy, GasStrategy::Standard, GasStrategy::Fast, GasStrategy::Fastest];

    pub fn from_urgency(urgency: Urgency) -> Self {
        match urgency {
            Urgency::Low => GasStrategy::Economy,
            Urgency::Normal => GasStrategy::Standard,
            Urgency::High => GasStrategy::Fast,
            Urgency::Critical => GasStrategy::Fastest,
        }
    }

    pub fn tier(&self) -> SpeedTier {
        match self {
            GasStrategy::Economy => SpeedTier::Slow,
            GasStrategy::Standard => SpeedTier::Standard,
            GasStrategy::Fast => SpeedTier::Fast,
            GasStrategy::Fastest => SpeedTier::Fastest,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            GasStrategy::Economy => 0,
            GasStrategy::Standard => 1,
            GasStrategy::Fast => 2,
            GasStrategy::Fastest => 3,
        }
    }
}

impl fmt::Display for GasStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            GasStrategy::Economy => "economy",
            GasStrategy::Standard => "standard",
            GasStrategy::Fast => "fast",
            GasStrategy::Fastest => "fastest",
        };
        f.write_str(s)
    }
}

/// One strategy priced against the current quote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyOption {
    pub strategy: GasStrategy,
    pub price_gwei: Decimal,
    pub priority_gwei: Decimal,
    pub cost_native: Decimal,
    pub cost_usd: Decimal,
    pub est_confirmation_secs: u64,
    /// Set only when candidates were scored against a cost ceiling
    pub score: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GasOptimizationResult {
    pub network: Network,
    pub strategy: GasStrategy,
    pub recommended_price_gwei: Decimal,
    pub max_priority_fee_gwei: Decimal,
    /// Legacy chains take `recommended_price_gwei` as the gas price
    pub legacy: bool,
    pub estimated_cost_native: Decimal,
    pub estimated_cost_usd: Decimal,
    pub estimated_confirmation_minutes: Decimal,
    /// USD saved vs. always bidding the fastest tier
    pub savings_vs_baseline_usd: Decimal,
    pub confidence: Decimal,
    pub congestion: Congestion,
    pub reasoning: String,
    /// Remaining strategies, best first
    pub alternatives: Vec<StrategyOption>,
    pub generated_at: DateTime<Utc>,
}

/// Caller's request; also the result-cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptimizeRequest {
    pub network: Network,
    pub urgency: Urgency,
    pub trade_value_usd: Option<Decimal>,
    /// e.g. 0.05 = gas may cost at most 5% of trade value
    pub max_cost_fraction: Option<Decimal>,
}

/// Knobs and inputs not carried by the quote
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub swap_gas_units: u64,
    pub native_usd_price: Decimal,
    pub large_trade_usd: Decimal,
    pub small_trade_usd: Decimal,
    /// Confidence from outcome history before the congestion factor, in [0, 1]
    pub history_confidence: Decimal,
}

const COST_WEIGHT: Decimal = Decimal::from_parts(4, 0, 0, false, 1); // 0.4
const TIME_WEIGHT: Decimal = Decimal::from_parts(3, 0, 0, false, 1); // 0.3
const URGENCY_WEIGHT: Decimal = Decimal::from_parts(3, 0, 0, false, 1); // 0.3

pub fn price_option(quote: &GasQuote, strategy: GasStrategy, params: &StrategyParams) -> StrategyOption {
    let tier = quote.tier(strategy.tier());
    let cost_native = gas_cost_native(params.swap_gas_units, tier.price_gwei);
    StrategyOption {
        strategy,
        price_gwei: tier.price_gwei,
        priority_gwei: tier.priority_gwei,
        cost_native,
        cost_usd: (cost_native * params.native_usd_price).round_dp(6),
        est_confirmation_secs: tier.est_confirmation_secs,
        score: None,
    }
}

/// Strategies a trade of this size may use
fn allowed_for_trade(trade_value_usd: Option<Decimal>, params: &StrategyParams) -> Vec<GasStrategy> {
    match trade_value_usd {
        Some(v) if v >= params.large_trade_usd => vec![GasStrategy::Fast, GasStrategy::Fastest],
        Some(v) if v < params.small_trade_usd => vec![GasStrategy::Economy, GasStrategy::Standard],
        _ => GasStrategy::ALL.to_vec(),
    }
}

/// Urgency's strategy, pulled into the allowed set
fn base_strategy(urgency: Urgency, allowed: &[GasStrategy]) -> GasStrategy {
    let wanted = GasStrategy::from_urgency(urgency);
    if allowed.contains(&wanted) {
        return wanted;
    }
    allowed
        .iter()
        .copied()
        .min_by_key(|s| (s.rank() as i16 - wanted.rank() as i16).abs())
        .unwrap_or(wanted)
}

fn score(option: &StrategyOption, ceiling_usd: Decimal, fastest_secs: u64, target: GasStrategy) -> Decimal {
    let cost_eff = if ceiling_usd > Decimal::ZERO {
        (Decimal::ONE - option.cost_usd / ceiling_usd).max(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };
    let time_eff = if option.est_confirmation_secs == 0 {
        Decimal::ONE
    } else {
        Decimal::from(fastest_secs.max(1)) / Decimal::from(option.est_confirmation_secs)
    };
    let distance = (option.strategy.rank() as i64 - target.rank() as i64).abs();
    let urgency_match = Decimal::ONE - Decimal::from(distance) / Decimal::from(3);

    (COST_WEIGHT * cost_eff + TIME_WEIGHT * time_eff.min(Decimal::ONE) + URGENCY_WEIGHT * urgency_match).round_dp(4)
}

pub fn select_strategy(quote: &GasQuote, request: &OptimizeRequest, params: &StrategyParams) -> GasOptimizationResult {
    let allowed = allowed_for_trade(request.trade_value_usd, params);
    let base = base_strategy(request.urgency, &allowed);
    let mut options: Vec<StrategyOption> = GasStrategy::ALL.iter().map(|s| price_option(quote, *s, params)).collect();

    let ceiling_usd = match (request.trade_value_usd, request.max_cost_fraction) {
        (Some(value), Some(fraction)) if value > Decimal::ZERO && fraction > Decimal::ZERO => Some(value * fraction),
        _ => None,
    };

    let chosen = match ceiling_usd {
        None => base,
        Some(ceiling) => {
            let compliant = |o: &&StrategyOption| o.cost_usd <= ceiling;
            let mut candidates: Vec<GasStrategy> = options
                .iter()
                .filter(|o| allowed.contains(&o.strategy))
                .filter(compliant)
                .map(|o| o.strategy)
                .collect();
            if candidates.is_empty() {
                // cost ceiling outranks the trade-size rule
                candidates = options.iter().filter(compliant).map(|o| o.strategy).collect();
            }

            if candidates.is_empty() {
                options
                    .iter()
                    .min_by(|a, b| a.cost_usd.cmp(&b.cost_usd))
                    .map(|o| o.strategy)
                    .unwrap_or(GasStrategy::Economy)
            } else {
                let fastest_secs = options
                    .iter()
                    .map(|o| o.est_confirmation_secs)
                    .min()
                    .unwrap_or(1);
                for option in options.iter_mut() {
                    option.score = Some(score(option, ceiling, fastest_secs, base));
                }
                let mut best = candidates[0];
                let mut best_score = Decimal::MIN;
                for option in options.iter().filter(|o| candidates.contains(&o.strategy)) {
                    let s = option.score.unwrap_or(Decimal::ZERO);
                    if s > best_score {
                        best_score = s;
                        best = option.strategy;
                    }
                }
                best
            }
        }
    };

    let selected = options
        .iter()
        .find(|o| o.strategy == chosen)
        .cloned()
        .unwrap_or_else(|| price_option(quote, chosen, params));
    let baseline = price_option(quote, GasStrategy::Fastest, params);

    let confidence = (params.history_confidence.clamp(Decimal::ZERO, Decimal::ONE)
        * quote.congestion.confidence_factor())
    .round_dp(4);

    let minutes = (Decimal::from(selected.est_confirmation_secs) / Decimal::from(60)).round_dp(2);

    let mut alternatives: Vec<StrategyOption> = options.into_iter().filter(|o| o.strategy != chosen).collect();
    alternatives.sort_by(|a, b| match (b.score, a.score) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cost_usd.cmp(&b.cost_usd),
    });

    GasOptimizationResult {
        network: request.network,
        strategy: chosen,
        recommended_price_gwei: selected.price_gwei,
        max_priority_fee_gwei: selected.priority_gwei,
        legacy: quote.is_legacy(),
        estimated_cost_native: selected.cost_native,
        estimated_cost_usd: selected.cost_usd,
        estimated_confirmation_minutes: minutes,
        savings_vs_baseline_usd: (baseline.cost_usd - selected.cost_usd).max(Decimal::ZERO),
        confidence,
        congestion: quote.congestion,
        reasoning: reasoning(&selected, request, quote, minutes),
        alternatives,
        generated_at: Utc::now(),
    }
}

fn reasoning(selected: &StrategyOption, request: &OptimizeRequest, quote: &GasQuote, minutes: Decimal) -> String {
    let share = match request.trade_value_usd {
        Some(value) if value > Decimal::ZERO => format!(
            "{}% of trade value ${}",
            (selected.cost_usd / value * Decimal::from(100)).round_dp(2),
            value.round_dp(2)
        ),
        _ => "no trade value supplied".to_string(),
    };
    format!(
        "{} strategy at {} gwei for {} urgency: est. cost ${} ({}), expected confirmation ~{} min, congestion {}{}",
        selected.strategy,
        selected.price_gwei.round_dp(3),
        request.urgency,
        selected.cost_usd.round_dp(2),
        share,
        minutes,
        quote.congestion,
        if quote.is_fallback { " (fallback fee data)" } else { "" }
    )
}
