//! Read-only analysis over quotes and quote history
//!
//! Created: 2026-10-18

use super::quote::GasQuote;
use super::strategy::GasStrategy;
use crate::units::gas_cost_native;
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub strategy: GasStrategy,
    pub price_gwei: Decimal,
    pub cost_native: Decimal,
    pub cost_usd: Decimal,
    pub est_confirmation_secs: u64,
}

/// Cost of `gas_units` under every strategy, cheapest first
pub fn estimate_cost(quote: &GasQuote, gas_units: u64, native_usd_price: Decimal) -> Vec<CostEstimate> {
    GasStrategy::ALL
        .iter()
        .map(|strategy| {
            let tier = quote.tier(strategy.tier());
            let cost_native = gas_cost_native(gas_units, tier.price_gwei);
            CostEstimate {
                strategy: *strategy,
                price_gwei: tier.price_gwei,
                cost_native,
                cost_usd: (cost_native * native_usd_price).round_dp(6),
                est_confirmation_secs: tier.est_confirmation_secs,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct GasTrend {
    pub samples: usize,
    pub mean_gwei: Decimal,
    pub min_gwei: Decimal,
    pub max_gwei: Decimal,
    /// Coefficient of variation (stddev / mean)
    pub volatility: Decimal,
    pub slope_gwei_per_hour: Decimal,
    pub direction: TrendDirection,
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
    Decimal::from((to - from).num_milliseconds()) / Decimal::from(3_600_000)
}

/// Standard-tier statistics over retained history. None with fewer than two samples.
pub fn analyze_trend(history: &[GasQuote]) -> Option<GasTrend> {
    if history.len() < 2 {
        return None;
    }
    let first_ts = history[0].timestamp;
    let points: Vec<(Decimal, Decimal)> = history
        .iter()
        .map(|q| (hours_between(first_ts, q.timestamp), q.standard.price_gwei))
        .collect();

    let n = Decimal::from(points.len());
    let mean_x = points.iter().map(|p| p.0).sum::<Decimal>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<Decimal>() / n;

    let mut cov = Decimal::ZERO;
    let mut var_x = Decimal::ZERO;
    let mut var_y = Decimal::ZERO;
    for (x, y) in &points {
        cov += (*x - mean_x) * (*y - mean_y);
        var_x += (*x - mean_x) * (*x - mean_x);
        var_y += (*y - mean_y) * (*y - mean_y);
    }
    let slope = if var_x.is_zero() { Decimal::ZERO } else { cov / var_x };

    let stddev = (var_y / n).sqrt().unwrap_or(Decimal::ZERO);
    let volatility = if mean_y.is_zero() { Decimal::ZERO } else { stddev / mean_y };

    // more than 5% of the mean per hour counts as a trend
    let threshold = mean_y * Decimal::new(5, 2);
    let direction = if slope > threshold {
        TrendDirection::Rising
    } else if slope < -threshold {
        TrendDirection::Falling
    } else {
        TrendDirection::Stable
    };

    Some(GasTrend {
        samples: points.len(),
        mean_gwei: mean_y.round_dp(4),
        min_gwei: points.iter().map(|p| p.1).min().unwrap_or(Decimal::ZERO),
        max_gwei: points.iter().map(|p| p.1).max().unwrap_or(Decimal::ZERO),
        volatility: volatility.round_dp(4),
        slope_gwei_per_hour: slope.round_dp(4),
        direction,
    })
}

/// Mean standard-tier price per UTC hour of day
pub fn hourly_profile(history: &[GasQuote]) -> [Option<Decimal>; 24] {
    let mut sums = [Decimal::ZERO; 24];
    let mut counts = [0u32; 24];
    for quote in history {
        let hour = quote.timestamp.hour() as usize;
        sums[hour] += quote.standard.price_gwei;
        counts[hour] += 1;
    }
    let mut profile = [None; 24];
    for hour in 0..24 {
        if counts[hour] > 0 {
            profile[hour] = Some(sums[hour] / Decimal::from(counts[hour]));
        }
    }
    profile
}

#[derive(Debug, Clone, Serialize)]
pub struct TradingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub expected_price_gwei: Decimal,
    pub current_price_gwei: Decimal,
    pub expected_savings_pct: Decimal,
    /// Lower the further out the window is
    pub confidence: Decimal,
    pub reasoning: String,
}

/// Cheapest one-hour window within `horizon_hours`, projected from the short-term
/// trend blended with the hour-of-day profile.
pub fn recommend_trading_window(
    history: &[GasQuote],
    current: &GasQuote,
    now: DateTime<Utc>,
    horizon_hours: u32,
) -> TradingWindow {
    let current_price = current.standard.price_gwei;
    let slope = analyze_trend(history)
        .map(|t| t.slope_gwei_per_hour)
        .unwrap_or(Decimal::ZERO);
    let profile = hourly_profile(history);

    let mut best_offset = 0u32;
    let mut best_price = current_price;
    let mut best_has_profile = false;

    for offset in 1..=horizon_hours {
        let at = now + ChronoDuration::hours(offset as i64);
        let trend_projection = (current_price + slope * Decimal::from(offset)).max(Decimal::ZERO);
        let (projected, has_profile) = match profile[at.hour() as usize] {
            Some(hourly) => ((trend_projection + hourly) / Decimal::from(2), true),
            None => (trend_projection, false),
        };
        if projected < best_price {
            best_price = projected;
            best_offset = offset;
            best_has_profile = has_profile;
        }
    }

    let base_confidence = if best_offset == 0 {
        Decimal::new(95, 2)
    } else if best_has_profile {
        Decimal::new(80, 2)
    } else {
        Decimal::new(60, 2)
    };
    let decay = (Decimal::ONE - Decimal::new(10, 2) * Decimal::from(best_offset)).max(Decimal::new(10, 2));
    let confidence = (base_confidence * decay).round_dp(4);

    let savings_pct = if current_price.is_zero() {
        Decimal::ZERO
    } else {
        ((current_price - best_price) / current_price * Decimal::from(100)).round_dp(2)
    };

    let start = now + ChronoDuration::hours(best_offset as i64);
    let reasoning = if best_offset == 0 {
        format!(
            "Now is the cheapest window in the next {}h at ~{} gwei ({} samples)",
            horizon_hours,
            current_price.round_dp(3),
            history.len()
        )
    } else {
        format!(
            "Wait ~{}h: projected {} gwei vs {} now ({}% cheaper); projection confidence {}",
            best_offset,
            best_price.round_dp(3),
            current_price.round_dp(3),
            savings_pct,
            confidence
        )
    };

    TradingWindow {
        start,
        end: start + ChronoDuration::hours(1),
        expected_price_gwei: best_price.round_dp(6),
        current_price_gwei: current_price,
        expected_savings_pct: savings_pct,
        confidence,
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::fee_snapshot_gwei;
    use crate::types::Network;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn quote_at(base: u64, ts: DateTime<Utc>) -> GasQuote {
        let mut q = GasQuote::from_snapshot(Network::Ethereum, &fee_snapshot_gwei(base, [0, 0, 0, 0]));
        q.timestamp = ts;
        q
    }

    #[test]
    fn test_estimate_cost_cheapest_first() {
        let quote = GasQuote::from_snapshot(Network::Ethereum, &fee_snapshot_gwei(20, [1, 2, 3, 4]));
        let estimates = estimate_cost(&quote, 100_000, dec!(2000));
        assert_eq!(estimates.len(), 4);
        assert_eq!(estimates[0].strategy, GasStrategy::Economy);
        // 100k gas @ 21 gwei = 0.0021 ETH = $4.20
        assert_eq!(estimates[0].cost_usd, dec!(4.2));
        for pair in estimates.windows(2) {
            assert!(pair[0].cost_usd <= pair[1].cost_usd);
        }
    }

    #[test]
    fn test_trend_rising() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        // standard = base * 1.125, base grows 8 gwei per hour
        let history: Vec<GasQuote> = (0..5)
            .map(|i| quote_at(40 + 8 * i, t0 + ChronoDuration::hours(i as i64)))
            .collect();
        let trend = analyze_trend(&history).unwrap();
        assert_eq!(trend.direction, TrendDirection::Rising);
        assert_eq!(trend.slope_gwei_per_hour, dec!(9));
        assert_eq!(trend.samples, 5);
        assert!(trend.volatility > Decimal::ZERO);
    }

    #[test]
    fn test_trend_needs_two_samples() {
        let t0 = Utc::now();
        assert!(analyze_trend(&[quote_at(10, t0)]).is_none());
    }

    #[test]
    fn test_trading_window_prefers_cheap_hour() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0).unwrap();
        // yesterday: 13:00 was cheap, everything else expensive
        let mut history = Vec::new();
        for hour in 0..24u32 {
            let base = if hour == 13 { 8 } else { 80 };
            history.push(quote_at(base, Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap()));
        }
        let current = quote_at(80, now);
        let window = recommend_trading_window(&history, &current, now, 6);
        assert_eq!(window.start.hour(), 13);
        assert!(window.expected_price_gwei < window.current_price_gwei);
        assert!(window.confidence < dec!(0.8));
    }

    #[test]
    fn test_trading_window_now_when_flat() {
        let now = Utc::now();
        let current = quote_at(30, now);
        let window = recommend_trading_window(&[], &current, now, 4);
        assert_eq!(window.start, now);
        assert_eq!(window.confidence, dec!(0.95));
        assert_eq!(window.expected_savings_pct, dec!(0));
    }
}
