//! Pool connectivity probe
//!
//! Run with: cargo run --bin pool-probe
//!
//! Checks RPC reachability, reads a well-known Uniswap V2 pair through the
//! factory, and prints reserves plus LP supply. Useful for verifying an RPC
//! endpoint before pointing the main CLI at it.

use alloy_primitives::{address, Address, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use eyre::Result;
use std::time::Instant;

sol! {
    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
        function totalSupply() external view returns (uint256);
    }
}

const FACTORY: Address = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

#[tokio::main]
async fn main() -> Result<()> {
    println!("🔌 Pool Probe");
    println!("=============\n");

    dotenvy::dotenv().ok();
    let rpc_url = std::env::var("RPC_URL")
        .unwrap_or_else(|_| "https://eth.llamarpc.com".to_string());

    println!("📡 RPC: {}\n", &rpc_url[..50.min(rpc_url.len())]);

    let provider = ProviderBuilder::new().connect_http(rpc_url.parse()?);

    // Basic connectivity
    let start = Instant::now();
    let block = provider.get_block_number().await?;
    println!("✅ Connected - block {} ({:?})\n", block, start.elapsed());

    let chain_id = provider.get_chain_id().await?;
    if chain_id != 1 {
        println!("⚠️  Chain id is {} (expected 1 for mainnet addresses below)\n", chain_id);
    }

    // Resolve the USDC/WETH pair through the factory
    println!("🔍 Factory lookup: USDC/WETH");
    let tx = TransactionRequest::default()
        .to(FACTORY)
        .input(IUniswapV2Factory::getPairCall { tokenA: USDC, tokenB: WETH }.abi_encode().into());
    let pair = IUniswapV2Factory::getPairCall::abi_decode_returns(&provider.call(tx).await?)?;

    if pair == Address::ZERO {
        println!("❌ Factory returned the zero address - wrong network or factory?");
        return Ok(());
    }
    println!("   Pair: {}\n", pair);

    // Read pair state
    let tx = TransactionRequest::default()
        .to(pair)
        .input(IUniswapV2Pair::getReservesCall {}.abi_encode().into());
    let reserves = IUniswapV2Pair::getReservesCall::abi_decode_returns(&provider.call(tx).await?)?;

    let tx = TransactionRequest::default()
        .to(pair)
        .input(IUniswapV2Pair::token0Call {}.abi_encode().into());
    let token0 = IUniswapV2Pair::token0Call::abi_decode_returns(&provider.call(tx).await?)?;

    let tx = TransactionRequest::default()
        .to(pair)
        .input(IUniswapV2Pair::totalSupplyCall {}.abi_encode().into());
    let total_supply = IUniswapV2Pair::totalSupplyCall::abi_decode_returns(&provider.call(tx).await?)?;

    let (usdc_reserve, weth_reserve) = if token0 == USDC {
        (reserves.reserve0, reserves.reserve1)
    } else {
        (reserves.reserve1, reserves.reserve0)
    };

    println!("📊 Pair state:");
    println!("   token0:       {}", token0);
    println!("   USDC reserve: {}", usdc_reserve);
    println!("   WETH reserve: {}", weth_reserve);
    println!("   LP supply:    {}", total_supply);

    if total_supply == U256::ZERO {
        println!("\n⚠️  Pool reports zero LP supply - reserves may be stale");
    } else {
        println!("\n✅ Pool data looks sane - endpoint is usable");
    }

    Ok(())
}
