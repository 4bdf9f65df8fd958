//! Error Taxonomy
//!
//! One declared set of failure kinds for the whole pipeline. Component-internal
//! failures (decode misses, single connection drops) are absorbed where they occur;
//! attempt-scoped failures travel inside `SnipeResult`; only `Config` aborts startup.
//!
//! Created: 2026-10-18

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SniperError {
    /// WebSocket drop, RPC unreachable, relay HTTP failure
    #[error("connectivity: {0}")]
    Connectivity(String),

    /// Bad input or unmet precondition; never retried
    #[error("validation: {0}")]
    Validation(String),

    /// Malformed or unrecognized pending-transaction payload
    #[error("decode: {0}")]
    Decode(String),

    /// Signed transaction rejected by node or relay
    #[error("submission rejected: {0}")]
    Submission(String),

    /// No answer within the allowed window
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Dependency currently unhealthy; caller may skip instead of waiting
    #[error("circuit breaker '{0}' is open")]
    BreakerOpen(String),

    /// Transaction could not be built or signed
    #[error("signing: {0}")]
    Signing(String),

    /// Missing or inconsistent configuration
    #[error("configuration: {0}")]
    Config(String),
}

impl SniperError {
    /// Breaker-open and connectivity failures are transient; everything else is terminal
    /// for the attempt that produced it.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::BreakerOpen(_) | Self::Timeout(_))
    }
}

/// Error returned by `CircuitBreaker::call`.
/// Keeps "the breaker refused" apart from "the wrapped operation failed".
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    #[error("circuit breaker '{name}': call timed out after {after:?}")]
    Timeout { name: String, after: Duration },

    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BreakerError<anyhow::Error>> for SniperError {
    fn from(err: BreakerError<anyhow::Error>) -> Self {
        match err {
            BreakerError::Open { name } => SniperError::BreakerOpen(name),
            BreakerError::Timeout { after, .. } => SniperError::Timeout(after),
            BreakerError::Operation(e) => SniperError::Connectivity(format!("{:#}", e)),
        }
    }
}

impl From<BreakerError<SniperError>> for SniperError {
    fn from(err: BreakerError<SniperError>) -> Self {
        match err {
            BreakerError::Open { name } => SniperError::BreakerOpen(name),
            BreakerError::Timeout { after, .. } => SniperError::Timeout(after),
            BreakerError::Operation(e) => e,
        }
    }
}

pub type SniperResult<T> = std::result::Result<T, SniperError>;
