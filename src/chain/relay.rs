//! Flashbots-style private relay
//!
//! Posts `eth_sendBundle` with the `X-Flashbots-Signature` reputation header.
//! Any transport error, HTTP error status or JSON-RPC error object is returned as
//! an error so the sniper can fall back to public broadcast.
//!
//! Created: 2026-10-18

use super::{Bundle, BundleReceipt, BundleRelay};
use alloy::hex;
use alloy::primitives::{keccak256, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub struct FlashbotsRelay {
    url: String,
    client: reqwest::Client,
    reputation_key: PrivateKeySigner,
}

impl FlashbotsRelay {
    pub fn new(url: impl Into<String>, reputation_key: PrivateKeySigner, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build relay HTTP client")?;
        Ok(Self { url: url.into(), client, reputation_key })
    }

    pub fn from_key(url: impl Into<String>, key: &str, timeout: Duration) -> Result<Self> {
        let signer: PrivateKeySigner = key.trim().parse().context("Invalid relay signing key")?;
        Self::new(url, signer, timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn signature_header(&self, body: &str) -> Result<String> {
        let digest = format!("{:?}", keccak256(body.as_bytes()));
        let signature = self
            .reputation_key
            .sign_message(digest.as_bytes())
            .await
            .map_err(|e| anyhow!("relay header signing failed: {}", e))?;
        Ok(format!(
            "{:?}:0x{}",
            self.reputation_key.address(),
            hex::encode(signature.as_bytes())
        ))
    }
}

/// JSON-RPC request body for `eth_sendBundle`
pub fn bundle_request(bundle: &Bundle) -> Value {
    let txs: Vec<String> = bundle
        .txs
        .iter()
        .map(|raw| format!("0x{}", hex::encode(raw)))
        .collect();
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_sendBundle",
        "params": [{
            "txs": txs,
            "blockNumber": format!("0x{:x}", bundle.target_block),
        }]
    })
}

/// Interpret a relay JSON-RPC response
pub fn parse_bundle_response(response: &Value) -> Result<BundleReceipt> {
    if let Some(err) = response.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown relay error");
        bail!("relay rejected bundle: {}", message);
    }
    let result = response
        .get("result")
        .ok_or_else(|| anyhow!("relay response missing result"))?;
    let bundle_hash = result
        .get("bundleHash")
        .and_then(Value::as_str)
        .and_then(|h| h.parse::<B256>().ok());
    Ok(BundleReceipt { bundle_hash })
}

#[async_trait]
impl BundleRelay for FlashbotsRelay {
    async fn send_bundle(&self, bundle: &Bundle) -> Result<BundleReceipt> {
        let body = serde_json::to_string(&bundle_request(bundle))?;
        let signature = self.signature_header(&body).await?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Flashbots-Signature", signature)
            .body(body)
            .send()
            .await
            .context("relay request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("relay HTTP {}: {}", status, text);
        }

        let payload: Value = response.json().await.context("relay returned invalid JSON")?;
        let receipt = parse_bundle_response(&payload)?;
        debug!(
            "Bundle accepted | relay={} | block={} | txs={} | hash={:?}",
            self.url,
            bundle.target_block,
            bundle.txs.len(),
            receipt.bundle_hash
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;

    #[test]
    fn test_bundle_request_shape() {
        let bundle = Bundle {
            txs: vec![Bytes::from(vec![0x02, 0xaa]), Bytes::from(vec![0x02, 0xbb])],
            target_block: 19_000_001,
        };
        let body = bundle_request(&bundle);
        assert_eq!(body["method"], "eth_sendBundle");
        assert_eq!(body["params"][0]["blockNumber"], "0x121eac1");
        assert_eq!(body["params"][0]["txs"][0], "0x02aa");
        assert_eq!(body["params"][0]["txs"][1], "0x02bb");
    }

    #[test]
    fn test_parse_bundle_response() {
        let ok = json!({
            "jsonrpc": "2.0", "id": 1,
            "result": {"bundleHash": "0x2228f5d8954ce31dc1601a8ba264dbd401bf1428388ce88238932815c5d6f23f"}
        });
        assert!(parse_bundle_response(&ok).unwrap().bundle_hash.is_some());

        let err = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "bundle too old"}});
        let msg = parse_bundle_response(&err).unwrap_err().to_string();
        assert!(msg.contains("bundle too old"));

        assert!(parse_bundle_response(&json!({"id": 1})).is_err());
    }

    #[tokio::test]
    async fn test_signature_header_format() {
        let relay = FlashbotsRelay::from_key(
            "https://relay.example",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            Duration::from_secs(1),
        )
        .unwrap();
        let header = relay.signature_header("{}").await.unwrap();
        let (addr, sig) = header.split_once(':').unwrap();
        assert_eq!(addr.to_lowercase(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        // 65-byte signature, hex encoded
        assert_eq!(sig.len(), 2 + 130);
    }
}
