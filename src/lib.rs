//! Block-Zero Sniper Library
//!
//! Watches public mempools on several EVM networks for liquidity being added to
//! new pairs, and buys the token in the same block the liquidity lands.
//! Components: circuit breakers around every remote call, a gas strategy engine,
//! per-network mempool scanners, a sniper that builds/signs/submits the buy, and
//! the manager that wires scanners to snipers under the auto-snipe policy.
//!
//! Created: 2026-10-18

pub mod chain;
pub mod circuit_breaker;
pub mod config;
pub mod contracts;
pub mod error;
pub mod events;
pub mod gas;
pub mod manager;
pub mod mempool;
pub mod sniper;
pub mod types;
pub mod units;

// Re-export commonly used types
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitState};
pub use config::{load_private_key, SniperConfig};
pub use error::{SniperError, SniperResult};
pub use gas::{GasStrategy, GasStrategyEngine};
pub use manager::{GlobalStats, ManagerHealth, MempoolManager};
pub use mempool::MempoolScanner;
pub use sniper::{BlockZeroSniper, SnipeResult, SnipeStatus};
pub use types::{LiquidityAddEvent, Network, Urgency};
