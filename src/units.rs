//! Unit Conversions
//!
//! Wei ↔ gwei ↔ native conversions on `rust_decimal::Decimal`.
//! Fee comparisons never go through f64.
//!
//! Created: 2026-10-18

use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// 1 gwei = 10^9 wei
pub const GWEI_SCALE: u32 = 9;
/// 1 native unit (ETH/BNB/POL) = 10^18 wei
pub const NATIVE_SCALE: u32 = 18;

/// wei (u128) → gwei Decimal. Saturates at Decimal::MAX for absurd inputs.
pub fn wei_to_gwei(wei: u128) -> Decimal {
    let mantissa = wei.min(i128::MAX as u128) as i128;
    Decimal::try_from_i128_with_scale(mantissa, GWEI_SCALE)
        .map(|d| d.normalize())
        .unwrap_or(Decimal::MAX)
}

/// gwei Decimal → wei (u128), truncating sub-wei dust. Negative input → 0.
pub fn gwei_to_wei(gwei: Decimal) -> u128 {
    if gwei.is_sign_negative() {
        return 0;
    }
    (gwei * Decimal::from(1_000_000_000u64))
        .trunc()
        .to_u128()
        .unwrap_or(u128::MAX)
}

/// wei (U256) → native Decimal. Values that do not fit a Decimal saturate.
pub fn wei_to_native(wei: U256) -> Decimal {
    let as_u128: u128 = match wei.try_into() {
        Ok(v) => v,
        Err(_) => return Decimal::MAX,
    };
    let mantissa = as_u128.min(i128::MAX as u128) as i128;
    Decimal::try_from_i128_with_scale(mantissa, NATIVE_SCALE)
        .map(|d| d.normalize())
        .unwrap_or(Decimal::MAX)
}

/// native Decimal → wei (U256), truncating below 1 wei. Negative input → 0.
pub fn native_to_wei(native: Decimal) -> U256 {
    if native.is_sign_negative() {
        return U256::ZERO;
    }
    let gwei = (native * Decimal::from(1_000_000_000u64)).trunc();
    let gwei = gwei.to_u128().unwrap_or(0);
    let rem = native * Decimal::from(1_000_000_000u64) - Decimal::from(gwei);
    let rem_wei = (rem * Decimal::from(1_000_000_000u64)).trunc().to_u128().unwrap_or(0);
    U256::from(gwei) * U256::from(1_000_000_000u64) + U256::from(rem_wei)
}

/// Cost in native units of `gas_units` at `price_gwei`
pub fn gas_cost_native(gas_units: u64, price_gwei: Decimal) -> Decimal {
    Decimal::from(gas_units) * price_gwei / Decimal::from(1_000_000_000u64)
}
