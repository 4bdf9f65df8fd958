//! Mempool Scanner Module
//!
//! Purpose:
//!     Watch pending transactions over redundant WebSocket feeds and surface
//!     liquidity additions (especially for never-before-pooled tokens) before
//!     they are mined.
//!
//! Created: 2026-10-18
//!
//! Architecture:
//!     connection.rs — Reconnect backoff, per-endpoint liveness, health classification
//!     decoder.rs    — Calldata → DecodedLiquidity (V2 router, factory, pair)
//!     dedupe.rs     — Cross-connection duplicate filter keyed by tx hash
//!     scanner.rs    — Connection tasks, filter pipeline, event publication

pub mod connection;
pub mod decoder;
pub mod dedupe;
pub mod scanner;

pub use connection::{ReconnectPolicy, ScannerHealth};
pub use scanner::{EventRef, MempoolScanner, ScannerHealthReport, ScannerStats};
