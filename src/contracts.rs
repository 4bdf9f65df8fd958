//! Centralized Contract Definitions
//!
//! Solidity interfaces the sniper decodes or encodes, defined with alloy's `sol!`.
//! Calldata is decoded from pending transactions (router/factory/pair liquidity
//! calls) and encoded for the buy (`swapExactETHForTokens`).
//!
//! Created: 2026-10-18

use alloy::sol;

// ── ERC20 ─────────────────────────────────────────────────────────────

sol! {
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

// ── Uniswap V2 style router (Uniswap, Sushi, Pancake, QuickSwap forks) ─

sol! {
    interface IUniswapV2Router02 {
        function addLiquidity(
            address tokenA,
            address tokenB,
            uint256 amountADesired,
            uint256 amountBDesired,
            uint256 amountAMin,
            uint256 amountBMin,
            address to,
            uint256 deadline
        ) external returns (uint256 amountA, uint256 amountB, uint256 liquidity);

        function addLiquidityETH(
            address token,
            uint256 amountTokenDesired,
            uint256 amountTokenMin,
            uint256 amountETHMin,
            address to,
            uint256 deadline
        ) external payable returns (uint256 amountToken, uint256 amountETH, uint256 liquidity);

        function swapExactETHForTokens(
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external payable returns (uint256[] memory amounts);

        function swapExactETHForTokensSupportingFeeOnTransferTokens(
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external payable;
    }
}

// ── Uniswap V2 style factory / pair ─────────────────────────────────

sol! {
    interface IUniswapV2Factory {
        function createPair(address tokenA, address tokenB) external returns (address pair);
    }
}

sol! {
    interface IUniswapV2Pair {
        function mint(address to) external returns (uint256 liquidity);
    }
}
