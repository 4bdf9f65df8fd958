//! Configuration management
//!
//! Reads sniper configuration from a TOML file and secrets from the environment
//! (.env via dotenv). The TOML layer keeps addresses as strings; `SniperConfig::load`
//! resolves them into typed values and validates everything up front, so a bad
//! config aborts startup instead of surfacing mid-race.
//!
//! Created: 2026-10-18

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::types::{DexId, Network, Urgency};
use alloy::primitives::{Address, B256};
use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

// ── TOML layer ──────────────────────────────────────────────────────

/// Top-level TOML configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub enabled_networks: Vec<String>,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub sniper: SniperSettings,
    #[serde(default)]
    pub auto_snipe: AutoSnipeConfig,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub gas: GasSettings,
    #[serde(rename = "network", default)]
    pub networks: Vec<TomlNetwork>,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_monitor_timeout")]
    pub monitor_timeout_secs: u64,
    #[serde(default = "default_receipt_poll")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    #[serde(default = "default_channel_capacity")]
    pub event_channel_capacity: usize,
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            monitor_timeout_secs: default_monitor_timeout(),
            receipt_poll_interval_ms: default_receipt_poll(),
            stats_interval_secs: default_stats_interval(),
            event_channel_capacity: default_channel_capacity(),
            startup_timeout_secs: default_startup_timeout(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_monitor_timeout() -> u64 { 60 }
fn default_receipt_poll() -> u64 { 1000 }
fn default_stats_interval() -> u64 { 300 }
fn default_channel_capacity() -> usize { 1024 }
fn default_startup_timeout() -> u64 { 10 }

/// Limits applied to every buy, manual or automatic
#[derive(Debug, Clone, Deserialize)]
pub struct SniperSettings {
    #[serde(default = "default_min_amount")]
    pub min_amount_native: Decimal,
    #[serde(default = "default_max_amount")]
    pub max_amount_native: Decimal,
    /// Extra native kept aside on top of amount + max gas cost
    #[serde(default = "default_fee_margin")]
    pub fee_safety_margin_native: Decimal,
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
    /// Hard cap on max_fee_per_gas regardless of gas engine advice
    #[serde(default = "default_sniper_max_gas")]
    pub max_gas_gwei: Decimal,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Informational only; min-out is always 1 wei for block-zero buys
    #[serde(default = "default_slippage")]
    pub slippage_tolerance_pct: Decimal,
    /// Use the fee-on-transfer tolerant swap variant
    #[serde(default = "default_true")]
    pub fee_on_transfer_swap: bool,
}

impl Default for SniperSettings {
    fn default() -> Self {
        Self {
            min_amount_native: default_min_amount(),
            max_amount_native: default_max_amount(),
            fee_safety_margin_native: default_fee_margin(),
            deadline_secs: default_deadline(),
            max_gas_gwei: default_sniper_max_gas(),
            gas_limit: default_gas_limit(),
            slippage_tolerance_pct: default_slippage(),
            fee_on_transfer_swap: true,
        }
    }
}

fn default_min_amount() -> Decimal { Decimal::new(1, 2) } // 0.01
fn default_max_amount() -> Decimal { Decimal::ONE }
fn default_fee_margin() -> Decimal { Decimal::new(5, 3) } // 0.005
fn default_deadline() -> u64 { 120 }
fn default_sniper_max_gas() -> Decimal { Decimal::from(500) }
fn default_gas_limit() -> u64 { 350_000 }
fn default_slippage() -> Decimal { Decimal::from(100) }
fn default_true() -> bool { true }

/// Auto-snipe go/no-go policy
#[derive(Debug, Clone, Deserialize)]
pub struct AutoSnipeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Reject triggers whose fee ceiling exceeds this (gwei)
    #[serde(default = "default_trigger_ceiling")]
    pub max_trigger_gas_gwei: Decimal,
    #[serde(default = "default_auto_amount")]
    pub amount_native: Decimal,
    #[serde(default = "default_auto_priority")]
    pub priority: Urgency,
    /// 0 = no minimum
    #[serde(default)]
    pub min_liquidity_native: Decimal,
    #[serde(default)]
    pub max_liquidity_native: Option<Decimal>,
    #[serde(default)]
    pub skip_on_extreme_congestion: bool,
    /// A token is not auto-sniped again on the same network within this window
    #[serde(default = "default_attempted_ttl")]
    pub attempted_ttl_secs: u64,
}

impl AutoSnipeConfig {
    pub fn attempted_ttl(&self) -> Duration {
        Duration::from_secs(self.attempted_ttl_secs)
    }
}

impl Default for AutoSnipeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_trigger_gas_gwei: default_trigger_ceiling(),
            amount_native: default_auto_amount(),
            priority: default_auto_priority(),
            min_liquidity_native: Decimal::ZERO,
            max_liquidity_native: None,
            skip_on_extreme_congestion: false,
            attempted_ttl_secs: default_attempted_ttl(),
        }
    }
}

fn default_trigger_ceiling() -> Decimal { Decimal::from(300) }
fn default_auto_amount() -> Decimal { Decimal::new(5, 2) } // 0.05
fn default_auto_priority() -> Urgency { Urgency::Critical }
fn default_attempted_ttl() -> u64 { 86_400 }

/// Protected relay (bundle) submission
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_relay_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self { enabled: false, request_timeout_secs: default_relay_timeout() }
    }
}

fn default_relay_timeout() -> u64 { 3 }

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: u64,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_half_open_calls")]
    pub half_open_max_calls: u32,
    #[serde(default = "default_failure_window")]
    pub failure_window_secs: u64,
    #[serde(default = "default_failure_window_size")]
    pub failure_window_size: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
            success_threshold: default_success_threshold(),
            call_timeout_secs: default_call_timeout(),
            half_open_max_calls: default_half_open_calls(),
            failure_window_secs: default_failure_window(),
            failure_window_size: default_failure_window_size(),
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            success_threshold: self.success_threshold,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            half_open_max_calls: self.half_open_max_calls,
            failure_window: Duration::from_secs(self.failure_window_secs),
            failure_window_size: self.failure_window_size,
        }
    }
}

fn default_failure_threshold() -> u32 { 5 }
fn default_recovery_timeout() -> u64 { 30 }
fn default_success_threshold() -> u32 { 2 }
fn default_call_timeout() -> u64 { 10 }
fn default_half_open_calls() -> u32 { 1 }
fn default_failure_window() -> u64 { 60 }
fn default_failure_window_size() -> usize { 100 }

#[derive(Debug, Clone, Deserialize)]
pub struct GasSettings {
    #[serde(default = "default_gas_refresh")]
    pub refresh_interval_secs: u64,
    /// Snapshots retained per network (2880 × 30s = 24h)
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Gas units assumed for a swap when estimating cost
    #[serde(default = "default_swap_gas_units")]
    pub swap_gas_units: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Trades at or above this never pick economy/standard
    #[serde(default = "default_large_trade")]
    pub large_trade_usd: Decimal,
    /// Trades below this never pick fast/fastest
    #[serde(default = "default_small_trade")]
    pub small_trade_usd: Decimal,
    #[serde(default = "default_outcome_history")]
    pub outcome_history: usize,
}

impl Default for GasSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_gas_refresh(),
            history_size: default_history_size(),
            swap_gas_units: default_swap_gas_units(),
            cache_ttl_secs: default_cache_ttl(),
            large_trade_usd: default_large_trade(),
            small_trade_usd: default_small_trade(),
            outcome_history: default_outcome_history(),
        }
    }
}

fn default_gas_refresh() -> u64 { 30 }
fn default_history_size() -> usize { 2880 }
fn default_swap_gas_units() -> u64 { 200_000 }
fn default_cache_ttl() -> u64 { 10 }
fn default_large_trade() -> Decimal { Decimal::from(10_000) }
fn default_small_trade() -> Decimal { Decimal::from(100) }
fn default_outcome_history() -> usize { 100 }

/// Per-network section as written in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlNetwork {
    pub name: String,
    pub ws_endpoints: Vec<String>,
    pub rpc_url: String,
    #[serde(default)]
    pub min_gas_gwei: Decimal,
    #[serde(default = "default_network_max_gas")]
    pub max_gas_gwei: Decimal,
    pub wrapped_native: String,
    #[serde(default)]
    pub base_assets: Vec<String>,
    pub native_usd_price: Decimal,
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(rename = "dex", default)]
    pub dexes: Vec<TomlDex>,
}

fn default_network_max_gas() -> Decimal { Decimal::from(1000) }

#[derive(Debug, Clone, Deserialize)]
pub struct TomlDex {
    pub name: String,
    pub router: String,
    #[serde(default)]
    pub factory: Option<String>,
    #[serde(default)]
    pub init_code_hash: Option<String>,
}

// ── Resolved configuration ──────────────────────────────────────────

/// A DEX whose router/factory calls the scanner recognizes
#[derive(Debug, Clone)]
pub struct DexConfig {
    pub id: DexId,
    pub router: Address,
    pub factory: Option<Address>,
    pub init_code_hash: Option<B256>,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub network: Network,
    pub ws_endpoints: Vec<String>,
    pub rpc_url: String,
    /// Pending txs priced outside [min, max] gwei are ignored
    pub min_gas_gwei: Decimal,
    pub max_gas_gwei: Decimal,
    pub wrapped_native: Address,
    /// Always contains `wrapped_native`
    pub base_assets: HashSet<Address>,
    pub native_usd_price: Decimal,
    /// Some = protected relay supported on this network
    pub relay_url: Option<String>,
    pub dexes: Vec<DexConfig>,
}

impl NetworkConfig {
    /// The DEX used for manual snipes (first configured)
    pub fn default_dex(&self) -> Option<&DexConfig> {
        self.dexes.first()
    }

    pub fn dex(&self, id: &DexId) -> Option<&DexConfig> {
        self.dexes.iter().find(|d| &d.id == id)
    }
}

/// Fully resolved configuration consumed by the manager and its components
#[derive(Debug, Clone)]
pub struct SniperConfig {
    pub general: GeneralConfig,
    pub sniper: SniperSettings,
    pub auto_snipe: AutoSnipeConfig,
    pub relay: RelaySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub gas: GasSettings,
    pub networks: HashMap<Network, NetworkConfig>,
}

impl SniperConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: TomlConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Self::resolve(raw)
    }

    /// Turn the TOML layer into typed config; only enabled networks are kept.
    pub fn resolve(raw: TomlConfig) -> Result<Self> {
        let mut enabled = HashSet::new();
        for name in &raw.enabled_networks {
            let network: Network = name.parse().map_err(|e| anyhow!("{}", e))?;
            enabled.insert(network);
        }

        let mut networks = HashMap::new();
        for section in &raw.networks {
            let network: Network = section.name.parse().map_err(|e| anyhow!("{}", e))?;
            if !enabled.contains(&network) {
                continue;
            }
            let resolved = resolve_network(network, section)
                .with_context(|| format!("Invalid [[network]] section '{}'", section.name))?;
            networks.insert(network, resolved);
        }

        let config = Self {
            general: raw.general,
            sniper: raw.sniper,
            auto_snipe: raw.auto_snipe,
            relay: raw.relay,
            circuit_breaker: raw.circuit_breaker,
            gas: raw.gas,
            networks,
        };

        for network in &enabled {
            if !config.networks.contains_key(network) {
                bail!("Network '{}' is enabled but has no [[network]] section", network);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            bail!("No enabled networks configured");
        }
        for (network, cfg) in &self.networks {
            if cfg.ws_endpoints.is_empty() {
                bail!("Network '{}' has no ws_endpoints", network);
            }
            if cfg.rpc_url.trim().is_empty() {
                bail!("Network '{}' has an empty rpc_url", network);
            }
            if cfg.min_gas_gwei > cfg.max_gas_gwei {
                bail!("Network '{}': min_gas_gwei > max_gas_gwei", network);
            }
            if cfg.dexes.is_empty() {
                bail!("Network '{}' has no [[network.dex]] entries", network);
            }
            if cfg.native_usd_price <= Decimal::ZERO {
                bail!("Network '{}': native_usd_price must be positive", network);
            }
        }
        if self.sniper.min_amount_native > self.sniper.max_amount_native {
            bail!("sniper.min_amount_native > sniper.max_amount_native");
        }
        if self.sniper.min_amount_native <= Decimal::ZERO {
            bail!("sniper.min_amount_native must be positive");
        }
        if self.auto_snipe.enabled
            && (self.auto_snipe.amount_native < self.sniper.min_amount_native
                || self.auto_snipe.amount_native > self.sniper.max_amount_native)
        {
            bail!("auto_snipe.amount_native is outside the sniper amount range");
        }
        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 || cb.success_threshold == 0 || cb.half_open_max_calls == 0 {
            bail!("circuit_breaker thresholds must be >= 1");
        }
        if self.gas.history_size == 0 || self.gas.refresh_interval_secs == 0 {
            bail!("gas.history_size and gas.refresh_interval_secs must be >= 1");
        }
        if self.general.event_channel_capacity == 0 {
            bail!("general.event_channel_capacity must be >= 1");
        }
        Ok(())
    }

    /// Restrict to a subset of the configured networks (CLI override)
    pub fn retain_networks(&mut self, keep: &[Network]) -> Result<()> {
        for n in keep {
            if !self.networks.contains_key(n) {
                bail!("Network '{}' requested but not configured/enabled", n);
            }
        }
        self.networks.retain(|n, _| keep.contains(n));
        Ok(())
    }

    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_secs(self.general.monitor_timeout_secs)
    }

    pub fn enabled_networks(&self) -> Vec<Network> {
        let mut list: Vec<Network> = self.networks.keys().copied().collect();
        list.sort();
        list
    }
}

fn resolve_network(network: Network, section: &TomlNetwork) -> Result<NetworkConfig> {
    let wrapped_native: Address = section
        .wrapped_native
        .parse()
        .context("Invalid wrapped_native address")?;

    let mut base_assets = HashSet::new();
    base_assets.insert(wrapped_native);
    for asset in &section.base_assets {
        let addr: Address = asset
            .parse()
            .with_context(|| format!("Invalid base asset address: {}", asset))?;
        base_assets.insert(addr);
    }

    let mut dexes = Vec::new();
    for dex in &section.dexes {
        let router: Address = dex
            .router
            .parse()
            .with_context(|| format!("Invalid router address for dex {}", dex.name))?;
        let factory = match &dex.factory {
            Some(f) => Some(
                f.parse::<Address>()
                    .with_context(|| format!("Invalid factory address for dex {}", dex.name))?,
            ),
            None => None,
        };
        let init_code_hash = match &dex.init_code_hash {
            Some(h) => Some(
                h.parse::<B256>()
                    .with_context(|| format!("Invalid init_code_hash for dex {}", dex.name))?,
            ),
            None => None,
        };
        dexes.push(DexConfig {
            id: DexId::new(dex.name.clone()),
            router,
            factory,
            init_code_hash,
        });
    }

    let relay_url = section
        .relay_url
        .as_ref()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    Ok(NetworkConfig {
        network,
        ws_endpoints: section.ws_endpoints.clone(),
        rpc_url: section.rpc_url.clone(),
        min_gas_gwei: section.min_gas_gwei,
        max_gas_gwei: section.max_gas_gwei,
        wrapped_native,
        base_assets,
        native_usd_price: section.native_usd_price,
        relay_url,
        dexes,
    })
}

/// Trading key from PRIVATE_KEY (.env honoured)
pub fn load_private_key() -> Result<String> {
    dotenv::dotenv().ok();
    let key = std::env::var("PRIVATE_KEY").context("PRIVATE_KEY not set")?;
    Ok(key.trim().to_string())
}

/// Optional relay reputation key from RELAY_SIGNING_KEY
pub fn load_relay_key() -> Option<String> {
    dotenv::dotenv().ok();
    std::env::var("RELAY_SIGNING_KEY")
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

#[cfg(test)]
pub(crate) const SAMPLE_TOML: &str = r#"
enabled_networks = ["ethereum"]

[general]
monitor_timeout_secs = 30

[sniper]
min_amount_native = 0.01
max_amount_native = 0.5

[auto_snipe]
enabled = true
max_trigger_gas_gwei = 150
amount_native = 0.05
priority = "critical"
min_liquidity_native = 1.0

[circuit_breaker]
failure_threshold = 3

[[network]]
name = "ethereum"
ws_endpoints = ["wss://node-a.example", "wss://node-b.example", "wss://node-c.example"]
rpc_url = "https://node-a.example"
min_gas_gwei = 1
max_gas_gwei = 500
wrapped_native = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
base_assets = ["0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "0xdAC17F958D2ee523a2206206994597C13D831ec7"]
native_usd_price = 3000
relay_url = "https://relay.flashbots.net"

[[network.dex]]
name = "uniswap_v2"
router = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"
factory = "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"
init_code_hash = "0x96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f"

[[network]]
name = "bsc"
ws_endpoints = ["wss://bsc.example"]
rpc_url = "https://bsc.example"
wrapped_native = "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"
native_usd_price = 600

[[network.dex]]
name = "pancakeswap_v2"
router = "0x10ED43C718714eb63d5aA57B78B54704E256024E"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_and_resolve() {
        let config = SniperConfig::from_toml_str(SAMPLE_TOML).unwrap();
        // bsc section present but not enabled
        assert_eq!(config.enabled_networks(), vec![Network::Ethereum]);

        let eth = &config.networks[&Network::Ethereum];
        assert_eq!(eth.ws_endpoints.len(), 3);
        assert_eq!(eth.base_assets.len(), 3); // WETH + USDC + USDT
        assert!(eth.base_assets.contains(&eth.wrapped_native));
        assert_eq!(eth.dexes[0].id, DexId::new("uniswap_v2"));
        assert!(eth.dexes[0].init_code_hash.is_some());
        assert_eq!(eth.relay_url.as_deref(), Some("https://relay.flashbots.net"));

        assert_eq!(config.sniper.max_amount_native, dec!(0.5));
        assert_eq!(config.auto_snipe.priority, Urgency::Critical);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        // untouched sections fall back to defaults
        assert_eq!(config.circuit_breaker.success_threshold, 2);
        assert_eq!(config.gas.refresh_interval_secs, 30);
        assert_eq!(config.monitor_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_enabled_network_without_section_fails() {
        let toml_str = SAMPLE_TOML.replace(
            "enabled_networks = [\"ethereum\"]",
            "enabled_networks = [\"ethereum\", \"polygon\"]",
        );
        assert!(SniperConfig::from_toml_str(&toml_str).is_err());
    }

    #[test]
    fn test_bad_address_fails() {
        let toml_str = SAMPLE_TOML.replace(
            "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D",
            "0xnot-an-address",
        );
        assert!(SniperConfig::from_toml_str(&toml_str).is_err());
    }

    #[test]
    fn test_amount_range_validated() {
        let toml_str = SAMPLE_TOML.replace("max_amount_native = 0.5", "max_amount_native = 0.001");
        assert!(SniperConfig::from_toml_str(&toml_str).is_err());
    }

    #[test]
    fn test_retain_networks() {
        let mut config = SniperConfig::from_toml_str(SAMPLE_TOML).unwrap();
        assert!(config.retain_networks(&[Network::Bsc]).is_err());
        config.retain_networks(&[Network::Ethereum]).unwrap();
        assert_eq!(config.networks.len(), 1);
    }
}
