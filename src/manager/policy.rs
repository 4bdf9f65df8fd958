//! Auto-snipe policy
//!
//! Pure go/no-go decision for a liquidity event. Gates run in a fixed order and the
//! first one that fails names the rejection. Live inputs (congestion, breaker state,
//! whether the token was already attempted) are gathered by the caller.
//!
//! Created: 2026-10-18

use crate::circuit_breaker::CircuitState;
use crate::config::AutoSnipeConfig;
use crate::gas::Congestion;
use crate::types::LiquidityAddEvent;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Live state the policy looks at besides the event
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyContext {
    pub congestion: Option<Congestion>,
    pub rpc_breaker: Option<CircuitState>,
    pub already_attempted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    Disabled,
    NotNewToken,
    TriggerFeeTooHigh { fee_gwei: Decimal, ceiling_gwei: Decimal },
    LiquidityTooLow { native: Decimal, min: Decimal },
    LiquidityTooHigh { native: Decimal, max: Decimal },
    ExtremeCongestion,
    BreakerOpen,
    Duplicate,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RejectReason::Disabled => write!(f, "auto-snipe disabled"),
            RejectReason::NotNewToken => write!(f, "not a new token"),
            RejectReason::TriggerFeeTooHigh { fee_gwei, ceiling_gwei } => {
                write!(f, "trigger fee {} gwei above ceiling {} gwei", fee_gwei, ceiling_gwei)
            }
            RejectReason::LiquidityTooLow { native, min } => write!(f, "liquidity {} below minimum {}", native, min),
            RejectReason::LiquidityTooHigh { native, max } => write!(f, "liquidity {} above maximum {}", native, max),
            RejectReason::ExtremeCongestion => write!(f, "extreme network congestion"),
            RejectReason::BreakerOpen => write!(f, "rpc circuit breaker open"),
            RejectReason::Duplicate => write!(f, "token already attempted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDecision {
    Accept,
    Reject(RejectReason),
}

impl PolicyDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, PolicyDecision::Accept)
    }
}

#[derive(Debug, Clone)]
pub struct AutoSnipePolicy {
    config: AutoSnipeConfig,
}

impl AutoSnipePolicy {
    pub fn new(config: AutoSnipeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AutoSnipeConfig {
        &self.config
    }

    pub fn evaluate(&self, event: &LiquidityAddEvent, ctx: &PolicyContext) -> PolicyDecision {
        match self.first_rejection(event, ctx) {
            Some(reason) => PolicyDecision::Reject(reason),
            None => PolicyDecision::Accept,
        }
    }

    fn first_rejection(&self, event: &LiquidityAddEvent, ctx: &PolicyContext) -> Option<RejectReason> {
        let cfg = &self.config;
        if !cfg.enabled {
            return Some(RejectReason::Disabled);
        }
        if !event.is_new_token() {
            return Some(RejectReason::NotNewToken);
        }

        let fee = event.pending_tx.fees.ceiling_gwei();
        if fee > cfg.max_trigger_gas_gwei {
            return Some(RejectReason::TriggerFeeTooHigh { fee_gwei: fee, ceiling_gwei: cfg.max_trigger_gas_gwei });
        }

        let native = event.native_liquidity();
        if cfg.min_liquidity_native > Decimal::ZERO && native < cfg.min_liquidity_native {
            return Some(RejectReason::LiquidityTooLow { native, min: cfg.min_liquidity_native });
        }
        if let Some(max) = cfg.max_liquidity_native {
            if native > max {
                return Some(RejectReason::LiquidityTooHigh { native, max });
            }
        }

        if cfg.skip_on_extreme_congestion && ctx.congestion == Some(Congestion::Extreme) {
            return Some(RejectReason::ExtremeCongestion);
        }
        if ctx.rpc_breaker == Some(CircuitState::Open) {
            return Some(RejectReason::BreakerOpen);
        }
        if ctx.already_attempted {
            return Some(RejectReason::Duplicate);
        }
        None
    }
}
