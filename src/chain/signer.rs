//! In-memory private key signer
//!
//! Created: 2026-10-18

use super::{SignedTx, TxSigner, UnsignedTx};
use crate::types::FeeFields;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{keccak256, Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use async_trait::async_trait;

#[derive(Clone)]
pub struct LocalTxSigner {
    signer: PrivateKeySigner,
    wallet: EthereumWallet,
}

impl LocalTxSigner {
    pub fn from_private_key(key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .context("Invalid PRIVATE_KEY")?;
        let wallet = EthereumWallet::from(signer.clone());
        Ok(Self { signer, wallet })
    }
}

impl std::fmt::Debug for LocalTxSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.debug_struct("LocalTxSigner").field("address", &self.signer.address()).finish()
    }
}

#[async_trait]
impl TxSigner for LocalTxSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign(&self, tx: &UnsignedTx) -> Result<SignedTx> {
        let mut request = TransactionRequest::default()
            .with_from(self.signer.address())
            .with_to(tx.to)
            .with_value(tx.value)
            .with_input(tx.input.clone())
            .with_nonce(tx.nonce)
            .with_chain_id(tx.chain_id)
            .with_gas_limit(tx.gas_limit);

        request = match tx.fees {
            FeeFields::Legacy { gas_price } => request.with_gas_price(gas_price),
            FeeFields::Eip1559 { max_fee_per_gas, max_priority_fee_per_gas } => request
                .with_max_fee_per_gas(max_fee_per_gas)
                .with_max_priority_fee_per_gas(max_priority_fee_per_gas),
        };

        let envelope = request
            .build(&self.wallet)
            .await
            .map_err(|e| anyhow::anyhow!("transaction signing failed: {}", e))?;

        let raw = Bytes::from(envelope.encoded_2718());
        let hash = keccak256(&raw);
        Ok(SignedTx { raw, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, U256};

    // well-known throwaway dev key (anvil account #0)
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_address_from_key() {
        let signer = LocalTxSigner::from_private_key(DEV_KEY).unwrap();
        assert_eq!(signer.address(), address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
        assert!(LocalTxSigner::from_private_key("not-a-key").is_err());
    }

    #[tokio::test]
    async fn test_sign_eip1559_is_deterministic() {
        let signer = LocalTxSigner::from_private_key(DEV_KEY).unwrap();
        let tx = UnsignedTx {
            chain_id: 1,
            nonce: 7,
            to: address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
            value: U256::from(10u64).pow(U256::from(16u64)),
            input: Bytes::from(vec![0xb6, 0xf9, 0xde, 0x95]),
            gas_limit: 350_000,
            fees: FeeFields::Eip1559 {
                max_fee_per_gas: 40_000_000_000,
                max_priority_fee_per_gas: 2_000_000_000,
            },
        };
        let a = signer.sign(&tx).await.unwrap();
        let b = signer.sign(&tx).await.unwrap();
        assert_eq!(a.hash, b.hash);
        // EIP-1559 typed envelope
        assert_eq!(a.raw[0], 0x02);
        assert_eq!(a.hash, keccak256(&a.raw));
    }
}
