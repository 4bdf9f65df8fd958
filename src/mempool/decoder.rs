//! Mempool Scanner — Liquidity Calldata Decoder
//!
//! Purpose:
//!     Recognize liquidity operations in pending transaction input and recover the
//!     pooled tokens and amounts.
//!
//! Created: 2026-10-18
//!
//! Supported Function Selectors:
//!     V2 Router:
//!       0xe8e33700 — addLiquidity(address,address,uint256,uint256,uint256,uint256,address,uint256)
//!       0xf305d719 — addLiquidityETH(address,uint256,uint256,uint256,address,uint256)
//!     V2 Factory:
//!       0xc9c65396 — createPair(address,address)
//!     V2 Pair:
//!       0x6a627842 — mint(address)  (recognized, produces no event)

use crate::contracts::{IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router02};
use crate::error::SniperError;
use crate::types::{LiquidityOperation, PendingTransaction, NATIVE_TOKEN};
use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::sol_types::SolCall;
use std::collections::HashSet;
use tracing::trace;

const ADD_LIQUIDITY: [u8; 4] = IUniswapV2Router02::addLiquidityCall::SELECTOR;
const ADD_LIQUIDITY_ETH: [u8; 4] = IUniswapV2Router02::addLiquidityETHCall::SELECTOR;
const CREATE_PAIR: [u8; 4] = IUniswapV2Factory::createPairCall::SELECTOR;
const MINT: [u8; 4] = IUniswapV2Pair::mintCall::SELECTOR;

/// Pooled legs recovered from calldata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLiquidity {
    pub operation: LiquidityOperation,
    pub token_a: Address,
    pub token_b: Address,
    pub amount_a: U256,
    pub amount_b: U256,
    /// Native coin committed (exact for addLiquidityETH, wrapped-native leg for addLiquidity)
    pub native_liquidity: U256,
}

/// Map a selector to the liquidity operation it performs
pub fn liquidity_operation(selector: [u8; 4]) -> Option<LiquidityOperation> {
    match selector {
        ADD_LIQUIDITY => Some(LiquidityOperation::AddLiquidity),
        ADD_LIQUIDITY_ETH => Some(LiquidityOperation::AddLiquidityEth),
        CREATE_PAIR => Some(LiquidityOperation::CreatePair),
        MINT => Some(LiquidityOperation::Mint),
        _ => None,
    }
}

/// Decode the call's parameters. `Ok(None)` = recognized but carries no tokens (mint).
pub fn decode_liquidity(
    operation: LiquidityOperation,
    tx: &PendingTransaction,
    wrapped_native: Address,
) -> Result<Option<DecodedLiquidity>, SniperError> {
    let input = tx.input.as_ref();
    match operation {
        LiquidityOperation::AddLiquidity => {
            let call = IUniswapV2Router02::addLiquidityCall::abi_decode(input)
                .map_err(|e| SniperError::Decode(format!("addLiquidity: {}", e)))?;
            let native_liquidity = if call.tokenA == wrapped_native {
                call.amountADesired
            } else if call.tokenB == wrapped_native {
                call.amountBDesired
            } else {
                U256::ZERO
            };
            Ok(Some(DecodedLiquidity {
                operation,
                token_a: call.tokenA,
                token_b: call.tokenB,
                amount_a: call.amountADesired,
                amount_b: call.amountBDesired,
                native_liquidity,
            }))
        }
        LiquidityOperation::AddLiquidityEth => {
            let call = IUniswapV2Router02::addLiquidityETHCall::abi_decode(input)
                .map_err(|e| SniperError::Decode(format!("addLiquidityETH: {}", e)))?;
            Ok(Some(DecodedLiquidity {
                operation,
                token_a: call.token,
                token_b: NATIVE_TOKEN,
                amount_a: call.amountTokenDesired,
                amount_b: tx.value,
                native_liquidity: tx.value,
            }))
        }
        LiquidityOperation::CreatePair => {
            let call = IUniswapV2Factory::createPairCall::abi_decode(input)
                .map_err(|e| SniperError::Decode(format!("createPair: {}", e)))?;
            Ok(Some(DecodedLiquidity {
                operation,
                token_a: call.tokenA,
                token_b: call.tokenB,
                amount_a: U256::ZERO,
                amount_b: U256::ZERO,
                native_liquidity: U256::ZERO,
            }))
        }
        LiquidityOperation::Mint => {
            // pool tokens are not in mint calldata
            IUniswapV2Pair::mintCall::abi_decode(input)
                .map_err(|e| SniperError::Decode(format!("mint: {}", e)))?;
            trace!("mint() seen, no token legs | tx={:?}", tx.hash);
            Ok(None)
        }
    }
}

/// The leg a buyer wants: the first one that is neither a base asset nor the native coin
pub fn target_token(decoded: &DecodedLiquidity, base_assets: &HashSet<Address>) -> Address {
    let is_base = |a: &Address| *a == NATIVE_TOKEN || base_assets.contains(a);
    if !is_base(&decoded.token_a) {
        decoded.token_a
    } else {
        decoded.token_b
    }
}

/// Uniswap V2 CREATE2 pair address. The native leg is replaced by its wrapped token.
pub fn pair_address(
    factory: Address,
    init_code_hash: B256,
    token_a: Address,
    token_b: Address,
    wrapped_native: Address,
) -> Address {
    let a = if token_a == NATIVE_TOKEN { wrapped_native } else { token_a };
    let b = if token_b == NATIVE_TOKEN { wrapped_native } else { token_b };
    let (token0, token1) = if a < b { (a, b) } else { (b, a) };

    let mut packed = [0u8; 40];
    packed[..20].copy_from_slice(token0.as_slice());
    packed[20..].copy_from_slice(token1.as_slice());
    let salt = keccak256(packed);

    factory.create2(salt, init_code_hash)
}

/// Return the 4-byte selector as a hex string for logging
pub fn selector_hex(input: &[u8]) -> String {
    if input.len() < 4 {
        return "0x????".to_string();
    }
    format!("0x{:02x}{:02x}{:02x}{:02x}", input[0], input[1], input[2], input[3])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::FeeFields;
    use alloy::primitives::{address, b256, Bytes, TxHash};
    use chrono::Utc;

    pub(crate) const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
    pub(crate) const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    pub(crate) const NEW_TOKEN: Address = address!("1234567890123456789012345678901234567890");

    pub(crate) fn pending(input: Vec<u8>, value: U256) -> PendingTransaction {
        PendingTransaction {
            hash: TxHash::repeat_byte(0x11),
            from: Address::repeat_byte(0x22),
            to: Some(address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D")),
            value,
            gas_limit: 3_000_000,
            fees: FeeFields::Legacy { gas_price: 30_000_000_000 },
            input: Bytes::from(input),
            observed_at: Utc::now(),
        }
    }

    pub(crate) fn add_liquidity_eth_input(token: Address) -> Vec<u8> {
        IUniswapV2Router02::addLiquidityETHCall {
            token,
            amountTokenDesired: U256::from(1_000_000u64),
            amountTokenMin: U256::ZERO,
            amountETHMin: U256::ZERO,
            to: Address::repeat_byte(0x22),
            deadline: U256::from(9_999_999_999u64),
        }
        .abi_encode()
    }

    #[test]
    fn test_selector_constants() {
        assert_eq!(selector_hex(&ADD_LIQUIDITY), "0xe8e33700");
        assert_eq!(selector_hex(&ADD_LIQUIDITY_ETH), "0xf305d719");
        assert_eq!(selector_hex(&CREATE_PAIR), "0xc9c65396");
        assert_eq!(selector_hex(&MINT), "0x6a627842");
        assert_eq!(selector_hex(&[0x41, 0x4b]), "0x????");
    }

    #[test]
    fn test_decode_add_liquidity_eth() {
        let two_eth = U256::from(2_000_000_000_000_000_000u128);
        let tx = pending(add_liquidity_eth_input(NEW_TOKEN), two_eth);
        let op = liquidity_operation(tx.selector().unwrap()).unwrap();
        assert_eq!(op, LiquidityOperation::AddLiquidityEth);

        let decoded = decode_liquidity(op, &tx, WETH).unwrap().unwrap();
        assert_eq!(decoded.token_a, NEW_TOKEN);
        assert_eq!(decoded.token_b, NATIVE_TOKEN);
        assert_eq!(decoded.amount_b, two_eth);
        assert_eq!(decoded.native_liquidity, two_eth);
    }

    #[test]
    fn test_decode_add_liquidity_weth_leg() {
        let input = IUniswapV2Router02::addLiquidityCall {
            tokenA: WETH,
            tokenB: NEW_TOKEN,
            amountADesired: U256::from(5u64),
            amountBDesired: U256::from(7u64),
            amountAMin: U256::ZERO,
            amountBMin: U256::ZERO,
            to: Address::ZERO,
            deadline: U256::ZERO,
        }
        .abi_encode();
        let tx = pending(input, U256::ZERO);
        let decoded = decode_liquidity(LiquidityOperation::AddLiquidity, &tx, WETH).unwrap().unwrap();
        assert_eq!(decoded.native_liquidity, U256::from(5u64));

        let base: HashSet<Address> = [WETH, USDC].into_iter().collect();
        assert_eq!(target_token(&decoded, &base), NEW_TOKEN);
    }

    #[test]
    fn test_truncated_calldata_is_decode_error() {
        let mut input = add_liquidity_eth_input(NEW_TOKEN);
        input.truncate(40);
        let tx = pending(input, U256::ZERO);
        let result = decode_liquidity(LiquidityOperation::AddLiquidityEth, &tx, WETH);
        assert!(matches!(result, Err(SniperError::Decode(_))));
    }

    #[test]
    fn test_mint_recognized_without_event() {
        let input = IUniswapV2Pair::mintCall { to: Address::repeat_byte(0x33) }.abi_encode();
        let tx = pending(input, U256::ZERO);
        let op = liquidity_operation(tx.selector().unwrap()).unwrap();
        assert_eq!(op, LiquidityOperation::Mint);
        assert_eq!(decode_liquidity(op, &tx, WETH).unwrap(), None);
    }

    #[test]
    fn test_unknown_selector() {
        assert_eq!(liquidity_operation([0x7f, 0xf3, 0x6a, 0xb5]), None);
    }

    #[test]
    fn test_pair_address_matches_uniswap_v2() {
        let factory = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
        let init = b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f");
        let expected = address!("B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc"); // USDC/WETH
        assert_eq!(pair_address(factory, init, WETH, USDC, WETH), expected);
        assert_eq!(pair_address(factory, init, USDC, WETH, WETH), expected);
        // native leg resolves to the wrapped token
        assert_eq!(pair_address(factory, init, USDC, NATIVE_TOKEN, WETH), expected);
    }
}
