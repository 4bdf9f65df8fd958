//! Receipt monitoring
//!
//! Polls for the buy's receipt at a fixed interval until it appears or the deadline
//! passes, and sums the ERC20 Transfer logs that credited the signer.
//!
//! Created: 2026-10-18

use crate::chain::{ChainClient, ReceiptLog, TxReceipt};
use crate::circuit_breaker::CircuitBreaker;
use crate::contracts::IERC20;
use alloy::primitives::{Address, TxHash, U256};
use alloy::sol_types::SolEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Poll until a receipt exists. `None` = deadline passed without one.
/// RPC errors and open-breaker refusals are logged and polling continues.
/// Each poll is cut off at the deadline, whatever the breaker's call timeout.
pub async fn wait_for_receipt(
    client: &Arc<dyn ChainClient>,
    breaker: &CircuitBreaker,
    hash: TxHash,
    interval: Duration,
    timeout: Duration,
) -> Option<TxReceipt> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let c = Arc::clone(client);
        let poll = breaker.call(|| async move { c.get_transaction_receipt(hash).await });
        match tokio::time::timeout(remaining, poll).await {
            Ok(Ok(Some(receipt))) => return Some(receipt),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => debug!("Receipt poll failed | tx={:?} | {}", hash, e),
            Err(_) => {
                debug!("Receipt poll cut off at deadline | tx={:?}", hash);
                return None;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Total of `token` Transfer events whose recipient is `recipient`
pub fn tokens_received(logs: &[ReceiptLog], token: Address, recipient: Address) -> U256 {
    logs.iter()
        .filter(|log| log.address == token)
        .filter_map(|log| transfer_to(log, recipient))
        .fold(U256::ZERO, |acc, v| acc.saturating_add(v))
}

fn transfer_to(log: &ReceiptLog, recipient: Address) -> Option<U256> {
    // Transfer(address indexed from, address indexed to, uint256 value)
    if log.topics.len() != 3 || log.topics[0] != IERC20::Transfer::SIGNATURE_HASH {
        return None;
    }
    if Address::from_word(log.topics[2]) != recipient {
        return None;
    }
    let value = log.data.get(..32)?;
    Some(U256::from_be_slice(value))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::mock::MockChainClient;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use alloy::primitives::{Bytes, B256};
    use std::sync::atomic::Ordering;

    const TOKEN: Address = Address::repeat_byte(0x44);
    const ME: Address = Address::repeat_byte(0xaa);

    pub(crate) fn transfer_log(token: Address, from: Address, to: Address, amount: u64) -> ReceiptLog {
        ReceiptLog {
            address: token,
            topics: vec![IERC20::Transfer::SIGNATURE_HASH, from.into_word(), to.into_word()],
            data: Bytes::from(U256::from(amount).to_be_bytes::<32>().to_vec()),
        }
    }

    #[test]
    fn test_sums_transfers_to_recipient() {
        let pair = Address::repeat_byte(0x55);
        let logs = vec![
            transfer_log(TOKEN, pair, ME, 700),
            transfer_log(TOKEN, pair, Address::repeat_byte(0x66), 100), // tax wallet
            transfer_log(TOKEN, pair, ME, 300),
            transfer_log(Address::repeat_byte(0x77), pair, ME, 999), // other token
            ReceiptLog { address: TOKEN, topics: vec![B256::ZERO], data: Bytes::new() },
        ];
        assert_eq!(tokens_received(&logs, TOKEN, ME), U256::from(1000u64));
        assert_eq!(tokens_received(&[], TOKEN, ME), U256::ZERO);
    }

    #[tokio::test]
    async fn test_wait_times_out_without_receipt() {
        let client: Arc<dyn ChainClient> = Arc::new(MockChainClient::new());
        let breaker = CircuitBreaker::new("rpc:test", CircuitBreakerConfig::default());
        let started = Instant::now();
        let receipt = wait_for_receipt(
            &client,
            &breaker,
            TxHash::repeat_byte(1),
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await;
        assert!(receipt.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_slow_poll_does_not_outlive_deadline() {
        let mock = Arc::new(MockChainClient::new());
        *mock.receipt_delay.lock().unwrap() = Duration::from_secs(2);
        let client: Arc<dyn ChainClient> = mock;
        // call timeout far beyond the monitor deadline
        let breaker = CircuitBreaker::new("rpc:test", CircuitBreakerConfig::default());

        let started = Instant::now();
        let receipt = wait_for_receipt(
            &client,
            &breaker,
            TxHash::repeat_byte(3),
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await;
        assert!(receipt.is_none());
        assert!(started.elapsed() < Duration::from_millis(500));
        // an abandoned poll is neither a success nor a failure
        assert_eq!(breaker.snapshot().await.failed_calls, 0);
    }

    #[tokio::test]
    async fn test_wait_survives_rpc_errors() {
        let mock = Arc::new(MockChainClient::new());
        mock.fail_rpc.store(true, Ordering::SeqCst);
        let hash = TxHash::repeat_byte(2);
        mock.receipts.lock().unwrap().insert(
            hash,
            TxReceipt {
                tx_hash: hash,
                status: true,
                block_number: Some(101),
                gas_used: 100_000,
                effective_gas_price: 1,
                logs: Vec::new(),
            },
        );

        let client: Arc<dyn ChainClient> = mock.clone();
        let config = CircuitBreakerConfig { failure_threshold: 100, ..CircuitBreakerConfig::default() };
        let breaker = CircuitBreaker::new("rpc:test", config);
        let healer = {
            let mock = Arc::clone(&mock);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                mock.fail_rpc.store(false, Ordering::SeqCst);
            })
        };

        let receipt = wait_for_receipt(&client, &breaker, hash, Duration::from_millis(10), Duration::from_secs(1))
            .await
            .expect("receipt");
        assert!(receipt.status);
        healer.await.unwrap();
    }
}
