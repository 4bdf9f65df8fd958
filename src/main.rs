//! Block-Zero Sniper
//!
//! Composition root: loads config, builds one scanner + sniper per network,
//! starts the manager and runs until SIGINT/SIGTERM.
//!
//! Usage:
//!   blockzero-sniper --config config/sniper.toml
//!   blockzero-sniper --networks ethereum,bsc --no-auto-snipe
//!
//! Created: 2026-10-18

use anyhow::{Context, Result};
use blockzero_sniper::chain::{
    AlloyChainClient, ChainClient, FlashbotsRelay, LocalTxSigner, TxSigner, WsPendingTransport,
};
use blockzero_sniper::config::{load_private_key, load_relay_key, SniperConfig};
use blockzero_sniper::{
    BlockZeroSniper, CircuitBreakerManager, GasStrategyEngine, MempoolManager, MempoolScanner, Network,
};
use clap::Parser;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "blockzero-sniper", about = "Multi-network block-zero liquidity sniper")]
struct Args {
    /// Path to the TOML configuration
    #[arg(long, env = "SNIPER_CONFIG", default_value = "config/sniper.toml")]
    config: PathBuf,

    /// Only run these networks (comma separated), must be enabled in the config
    #[arg(long, value_delimiter = ',')]
    networks: Vec<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Watch and record only; never buy automatically
    #[arg(long)]
    no_auto_snipe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = SniperConfig::load(&args.config).context("Failed to load configuration")?;
    init_logging(&config.general.log_level, args.json_logs);

    info!("===========================================");
    info!("   Block-Zero Sniper");
    info!("===========================================");
    info!("Config file: {}", args.config.display());

    if !args.networks.is_empty() {
        let keep = args
            .networks
            .iter()
            .map(|n| n.parse::<Network>())
            .collect::<Result<Vec<_>, _>>()?;
        config.retain_networks(&keep)?;
    }
    if args.no_auto_snipe {
        config.auto_snipe.enabled = false;
    }

    let manager = Arc::new(build_manager(&config)?);
    manager.start().await?;

    let stats_task = {
        let manager = Arc::clone(&manager);
        let interval = Duration::from_secs(config.general.stats_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                log_stats(&manager).await;
            }
        })
    };

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    if let Some(sig) = signals.next().await {
        info!("Received signal {} - shutting down", sig);
    }
    handle.close();

    stats_task.abort();
    manager.stop().await;
    log_stats(&manager).await;
    info!("Sniper stopped");
    Ok(())
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

fn build_manager(config: &SniperConfig) -> Result<MempoolManager> {
    let breakers = Arc::new(CircuitBreakerManager::new(config.circuit_breaker.to_breaker_config()));

    let private_key = load_private_key()?;
    let signer: Arc<dyn TxSigner> = Arc::new(LocalTxSigner::from_private_key(&private_key)?);
    info!("Wallet: {:?}", signer.address());

    let mut clients: Vec<(Network, Arc<dyn ChainClient>)> = Vec::new();
    let mut gas = GasStrategyEngine::new(config.gas.clone(), Arc::clone(&breakers));
    for network in config.enabled_networks() {
        let net = &config.networks[&network];
        let client: Arc<dyn ChainClient> = Arc::new(
            AlloyChainClient::connect_http(network, &net.rpc_url)
                .with_context(|| format!("Failed to create RPC client for {}", network))?,
        );
        gas.register_network(network, Arc::clone(&client), net.native_usd_price);
        clients.push((network, client));
    }
    let gas = Arc::new(gas);

    let relay_key = load_relay_key();
    let mut manager = MempoolManager::new(config, Arc::clone(&gas), Arc::clone(&breakers));
    for (network, client) in clients {
        let net = config.networks[&network].clone();

        let scanner = Arc::new(MempoolScanner::new(
            net.clone(),
            Arc::new(WsPendingTransport::new()),
            config.general.event_channel_capacity,
            Duration::from_secs(config.general.startup_timeout_secs),
        ));

        let mut sniper = BlockZeroSniper::new(
            net.clone(),
            config.sniper.clone(),
            client,
            Arc::clone(&signer),
            Arc::clone(&gas),
            Arc::clone(&breakers),
        )
        .with_receipt_poll_interval(Duration::from_millis(config.general.receipt_poll_interval_ms));

        match (&net.relay_url, config.relay.enabled) {
            (Some(url), true) => {
                let key = relay_key.as_deref().unwrap_or(&private_key);
                let timeout = Duration::from_secs(config.relay.request_timeout_secs);
                match FlashbotsRelay::from_key(url.clone(), key, timeout) {
                    Ok(relay) => {
                        info!("Relay enabled | network={} | url={}", network, url);
                        sniper = sniper.with_relay(Arc::new(relay));
                    }
                    Err(e) => error!("Relay setup failed, public broadcast only | network={} | {}", network, e),
                }
            }
            (None, true) => warn!("Relay enabled but no relay_url | network={}", network),
            _ => {}
        }

        manager.add_network(scanner, Arc::new(sniper));
    }

    Ok(manager)
}

async fn log_stats(manager: &MempoolManager) {
    let stats = manager.get_global_stats();
    let health = manager.health_check().await;
    info!(
        "📊 STATS | health={:?} | active={:?} | discoveries={} | new_tokens={} | attempts={} | ok={} | failed={} | timeout={} | rejected={} | volume={} | success={}% | uptime={}s",
        health.status,
        stats.active_networks,
        stats.total_discoveries,
        stats.total_new_tokens,
        stats.total_attempts,
        stats.total_successes,
        stats.total_failures,
        stats.total_timeouts,
        stats.total_rejected,
        stats.total_volume_native,
        stats.success_rate,
        stats.uptime_secs
    );
}
