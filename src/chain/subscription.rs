//! WebSocket pending-transaction feed
//!
//! One `subscribe` call = one WebSocket connection with an
//! `eth_subscribe("newPendingTransactions", true)` subscription on it, so each
//! notification carries the full transaction object. Reconnecting is the caller's job.
//!
//! Created: 2026-10-18

use super::PendingTxTransport;
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct WsPendingTransport;

impl WsPendingTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PendingTxTransport for WsPendingTransport {
    async fn subscribe(&self, endpoint: &str) -> Result<BoxStream<'static, serde_json::Value>> {
        let ws = WsConnect::new(endpoint);
        let provider = ProviderBuilder::new()
            .connect_ws(ws)
            .await
            .with_context(|| format!("WebSocket connect failed: {}", endpoint))?
            .erased();

        let sub = provider
            .subscribe::<_, serde_json::Value>(("newPendingTransactions", true))
            .await
            .context("eth_subscribe(newPendingTransactions) failed")?;

        debug!("Pending subscription active | endpoint={}", endpoint);

        // provider moves into the stream so the socket lives as long as the stream
        let stream = sub.into_stream().map(move |msg| {
            let _keep_alive = &provider;
            msg
        });
        Ok(stream.boxed())
    }
}
