//! Sniper Statistics
//!
//! Per-network counters updated from the auto-snipe loop and manual snipes, with
//! a global roll-up. Plain data behind one mutex per network; readers get a
//! serializable snapshot.
//!
//! Created: 2026-10-18

use crate::sniper::{SnipeResult, SnipeStatus};
use crate::types::Network;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkStats {
    /// Liquidity events seen
    pub discoveries: u64,
    pub new_tokens: u64,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rejected_by_policy: u64,
    /// Native spent on confirmed buys
    pub volume_native: Decimal,
    pub last_snipe_at: Option<DateTime<Utc>>,
}

impl NetworkStats {
    /// successes / attempts in percent, 0 before any attempt
    pub fn success_rate(&self) -> Decimal {
        rate(self.successes, self.attempts)
    }

    fn absorb(&mut self, other: &NetworkStats) {
        self.discoveries += other.discoveries;
        self.new_tokens += other.new_tokens;
        self.attempts += other.attempts;
        self.successes += other.successes;
        self.failures += other.failures;
        self.timeouts += other.timeouts;
        self.rejected_by_policy += other.rejected_by_policy;
        self.volume_native += other.volume_native;
        self.last_snipe_at = match (self.last_snipe_at, other.last_snipe_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub total_discoveries: u64,
    pub total_new_tokens: u64,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_timeouts: u64,
    pub total_rejected: u64,
    pub total_volume_native: Decimal,
    /// percent
    pub success_rate: Decimal,
    pub uptime_secs: i64,
    /// Networks whose scanner is currently running
    pub active_networks: Vec<Network>,
    pub networks: BTreeMap<Network, NetworkStats>,
}

pub struct StatsBook {
    started_at: DateTime<Utc>,
    per_network: HashMap<Network, Mutex<NetworkStats>>,
}

impl StatsBook {
    pub fn new(networks: &[Network]) -> Self {
        Self {
            started_at: Utc::now(),
            per_network: networks.iter().map(|n| (*n, Mutex::new(NetworkStats::default()))).collect(),
        }
    }

    fn update(&self, network: Network, f: impl FnOnce(&mut NetworkStats)) {
        if let Some(slot) = self.per_network.get(&network) {
            let mut stats = slot.lock().unwrap_or_else(|p| p.into_inner());
            f(&mut stats);
        }
    }

    pub fn record_discovery(&self, network: Network, is_new_token: bool) {
        self.update(network, |s| {
            s.discoveries += 1;
            if is_new_token {
                s.new_tokens += 1;
            }
        });
    }

    pub fn record_rejection(&self, network: Network) {
        self.update(network, |s| s.rejected_by_policy += 1);
    }

    /// Count a finished attempt by its terminal status
    pub fn record_result(&self, result: &SnipeResult) {
        self.update(result.network, |s| {
            s.attempts += 1;
            s.last_snipe_at = Some(Utc::now());
            match result.status() {
                SnipeStatus::Confirmed => {
                    s.successes += 1;
                    s.volume_native += result.amount_native;
                }
                SnipeStatus::Timeout => s.timeouts += 1,
                SnipeStatus::Failed | SnipeStatus::Error => s.failures += 1,
                // still pending = monitor abandoned
                SnipeStatus::Pending => {}
            }
        });
    }

    pub fn network(&self, network: Network) -> Option<NetworkStats> {
        self.per_network
            .get(&network)
            .map(|slot| slot.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    pub fn snapshot(&self, active_networks: Vec<Network>) -> GlobalStats {
        let mut networks = BTreeMap::new();
        let mut total = NetworkStats::default();
        for (network, slot) in &self.per_network {
            let stats = slot.lock().unwrap_or_else(|p| p.into_inner()).clone();
            total.absorb(&stats);
            networks.insert(*network, stats);
        }

        GlobalStats {
            total_discoveries: total.discoveries,
            total_new_tokens: total.new_tokens,
            total_attempts: total.attempts,
            total_successes: total.successes,
            total_failures: total.failures,
            total_timeouts: total.timeouts,
            total_rejected: total.rejected_by_policy,
            total_volume_native: total.volume_native,
            success_rate: total.success_rate(),
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            active_networks,
            networks,
        }
    }
}

fn rate(part: u64, whole: u64) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::from(100) / Decimal::from(whole)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sniper::Settlement;
    use alloy::primitives::Address;
    use rust_decimal_macros::dec;

    fn finished(network: Network, amount: Decimal, settlement: Settlement) -> SnipeResult {
        let mut r = SnipeResult::pending(network, Address::repeat_byte(1), amount);
        r.settle(settlement);
        r
    }

    #[test]
    fn test_counts_by_status() {
        let book = StatsBook::new(&[Network::Ethereum, Network::Bsc]);
        book.record_discovery(Network::Ethereum, true);
        book.record_discovery(Network::Ethereum, false);
        book.record_rejection(Network::Ethereum);

        let receipt = crate::chain::TxReceipt {
            tx_hash: Default::default(),
            status: true,
            block_number: Some(1),
            gas_used: 1,
            effective_gas_price: 1,
            logs: Vec::new(),
        };
        book.record_result(&finished(
            Network::Ethereum,
            dec!(0.1),
            Settlement::Confirmed { receipt, tokens_received: Default::default() },
        ));
        book.record_result(&finished(Network::Ethereum, dec!(0.1), Settlement::Timeout));
        book.record_result(&finished(Network::Bsc, dec!(0.2), Settlement::Error("x".into())));

        let eth = book.network(Network::Ethereum).unwrap();
        assert_eq!(eth.discoveries, 2);
        assert_eq!(eth.new_tokens, 1);
        assert_eq!(eth.rejected_by_policy, 1);
        assert_eq!(eth.attempts, 2);
        assert_eq!(eth.successes, 1);
        assert_eq!(eth.timeouts, 1);
        assert_eq!(eth.volume_native, dec!(0.1));
        assert_eq!(eth.success_rate(), dec!(50));

        let global = book.snapshot(vec![Network::Ethereum]);
        assert_eq!(global.active_networks, vec![Network::Ethereum]);
        assert_eq!(global.total_attempts, 3);
        assert_eq!(global.total_failures, 1);
        assert_eq!(global.success_rate, dec!(33.33));
        assert_eq!(global.networks.len(), 2);
    }

    #[test]
    fn test_unknown_network_ignored() {
        let book = StatsBook::new(&[Network::Ethereum]);
        book.record_discovery(Network::Polygon, true);
        assert!(book.network(Network::Polygon).is_none());
        let global = book.snapshot(Vec::new());
        assert_eq!(global.total_discoveries, 0);
        assert_eq!(global.success_rate, Decimal::ZERO);
        assert!(global.active_networks.is_empty());
    }
}
