//! Pool/Token Data Accessor - Multicall3 Edition
//!
//! Batches a whole pool snapshot (pair ordering, reserves, LP supply, both
//! tokens' metadata and balances) into a single Multicall3 round trip
//! instead of ~10 individual RPC calls.
//!
//! Token metadata (symbol, name, decimals) never changes, so it is cached
//! for the process lifetime. Reserves, supply and balances are never cached:
//! they are stale the moment they arrive, and the slippage-bounded minimums
//! in the math module are the defense against that.

use alloy_primitives::{Address, U256, address};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

use super::abi::{IERC20, IMulticall3, IUniswapV2Factory, IUniswapV2Pair};
use crate::tokens::{known_decimals, TokenInfo};

// ============================================
// CONSTANTS
// ============================================

/// Multicall3 address (same on all EVM chains)
const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

// ============================================
// TYPES
// ============================================

/// Snapshot of one Uniswap V2 pair plus both tokens, as seen by one owner.
#[derive(Debug, Clone)]
pub struct PoolInfo {
    /// Pair contract address
    pub address: Address,

    /// Canonical ordering: token0 is the numerically lower address
    pub token0: Address,
    pub token1: Address,

    /// Reserves in smallest units. Both zero means the pool exists but is
    /// uninitialized - no ratio to quote against.
    pub reserve0: U256,
    pub reserve1: U256,

    /// LP token total supply
    pub total_supply: U256,

    pub token0_info: TokenInfo,
    pub token1_info: TokenInfo,
}

impl PoolInfo {
    /// A pool with either reserve at zero has no ratio to enforce
    pub fn is_initialized(&self) -> bool {
        !self.reserve0.is_zero() && !self.reserve1.is_zero()
    }

    /// Reserves oriented to the caller's request order
    pub fn oriented_reserves(&self, token_a: Address) -> (U256, U256) {
        crate::math::oriented_reserves(self.token0, self.reserve0, self.reserve1, token_a)
    }

    /// TokenInfo for one side of the pair
    pub fn token_info(&self, token: Address) -> Option<&TokenInfo> {
        if token == self.token0 {
            Some(&self.token0_info)
        } else if token == self.token1 {
            Some(&self.token1_info)
        } else {
            None
        }
    }
}

/// Cached static token data (symbol, name, decimals - these don't change)
#[derive(Debug, Clone)]
struct CachedTokenMeta {
    symbol: String,
    name: String,
    decimals: u8,
}

lazy_static::lazy_static! {
    static ref TOKEN_META_CACHE: RwLock<HashMap<Address, CachedTokenMeta>> = RwLock::new(HashMap::new());
}

/// A truncated aggregate3 response would make the offset indexing below
/// read out of bounds. Keep that on the error path.
fn check_batch_len(expected: usize, got: usize) -> Result<()> {
    if got != expected {
        return Err(eyre!(
            "Multicall3 returned {} results for {} calls - malformed RPC response",
            got,
            expected
        ));
    }
    Ok(())
}

// ============================================
// POOL READER
// ============================================

/// Read-only chain accessor for pools, tokens and balances.
pub struct PoolReader {
    rpc_url: String,
    factory: Address,
    weth: Address,
}

impl PoolReader {
    pub fn new(rpc_url: String, factory: Address, weth: Address) -> Self {
        Self { rpc_url, factory, weth }
    }

    /// Execute a Multicall3 batch. The returned vec is guaranteed to have
    /// one entry per submitted call, so callers can index by offset.
    async fn execute_multicall(&self, calls: Vec<IMulticall3::Call3>) -> Result<Vec<IMulticall3::Result>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let expected = calls.len();

        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.parse()?);

        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();

        let tx = TransactionRequest::default()
            .to(MULTICALL3)
            .input(calldata.into());

        let result = provider.call(tx).await
            .map_err(|e| eyre!("Multicall3 failed: {}", e))?;

        let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&result)
            .map_err(|e| eyre!("Failed to decode multicall result: {}", e))?;

        check_batch_len(expected, decoded.len())?;

        Ok(decoded)
    }

    /// Single eth_call helper for the few reads that don't batch
    async fn call_one(&self, to: Address, calldata: Vec<u8>) -> Result<Vec<u8>> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);
        let tx = TransactionRequest::default().to(to).input(calldata.into());
        Ok(provider.call(tx).await?.to_vec())
    }

    /// Factory getPair lookup. The factory returns the zero address for a
    /// pair that was never created.
    pub async fn pair_address(&self, token_a: Address, token_b: Address) -> Result<Option<Address>> {
        let calldata = IUniswapV2Factory::getPairCall { tokenA: token_a, tokenB: token_b }.abi_encode();
        let raw = self.call_one(self.factory, calldata).await?;
        let pair = IUniswapV2Factory::getPairCall::abi_decode_returns(&raw)
            .map_err(|e| eyre!("Failed to decode getPair result: {}", e))?;

        if pair == Address::ZERO {
            Ok(None)
        } else {
            Ok(Some(pair))
        }
    }

    /// Fetch a full pool snapshot for (token_a, token_b) as seen by `owner`.
    ///
    /// Returns `Ok(None)` when the pair does not exist yet.
    pub async fn fetch_pool(
        &self,
        token_a: Address,
        token_b: Address,
        owner: Address,
    ) -> Result<Option<PoolInfo>> {
        let start = Instant::now();

        let Some(pair) = self.pair_address(token_a, token_b).await? else {
            debug!("No pair deployed for {:?}/{:?}", token_a, token_b);
            return Ok(None);
        };

        let (token0, token1) = crate::math::sort_tokens(token_a, token_b);

        // Which tokens still need metadata?
        let uncached: Vec<Address> = {
            let cache = TOKEN_META_CACHE.read().await;
            [token0, token1]
                .into_iter()
                .filter(|t| !cache.contains_key(t))
                .collect()
        };

        // ============================================
        // ONE BATCH: pair state + token meta + balances
        // ============================================
        let mut calls: Vec<IMulticall3::Call3> = Vec::new();

        // Pair state: reserves, total supply (calls 0..2)
        calls.push(IMulticall3::Call3 {
            target: pair,
            allowFailure: false,
            callData: IUniswapV2Pair::getReservesCall {}.abi_encode().into(),
        });
        calls.push(IMulticall3::Call3 {
            target: pair,
            allowFailure: false,
            callData: IUniswapV2Pair::totalSupplyCall {}.abi_encode().into(),
        });

        // Metadata for uncached tokens (3 calls each). symbol/name are
        // optional in ERC-20, so failures are allowed and fall back to the
        // known-token table.
        for token in &uncached {
            calls.push(IMulticall3::Call3 {
                target: *token,
                allowFailure: true,
                callData: IERC20::symbolCall {}.abi_encode().into(),
            });
            calls.push(IMulticall3::Call3 {
                target: *token,
                allowFailure: true,
                callData: IERC20::nameCall {}.abi_encode().into(),
            });
            calls.push(IMulticall3::Call3 {
                target: *token,
                allowFailure: true,
                callData: IERC20::decimalsCall {}.abi_encode().into(),
            });
        }

        // Owner balances for both tokens (last 2 calls)
        for token in [token0, token1] {
            calls.push(IMulticall3::Call3 {
                target: token,
                allowFailure: true,
                callData: IERC20::balanceOfCall { owner }.abi_encode().into(),
            });
        }

        let results = self.execute_multicall(calls).await?;

        // Pair state
        let reserves = IUniswapV2Pair::getReservesCall::abi_decode_returns(&results[0].returnData)
            .map_err(|e| eyre!("Failed to decode getReserves: {}", e))?;
        let reserve0 = U256::from(reserves.reserve0.to::<u128>());
        let reserve1 = U256::from(reserves.reserve1.to::<u128>());

        let total_supply = IUniswapV2Pair::totalSupplyCall::abi_decode_returns(&results[1].returnData)
            .map_err(|e| eyre!("Failed to decode totalSupply: {}", e))?;

        // Fill the metadata cache from this batch
        {
            let mut cache = TOKEN_META_CACHE.write().await;
            for (i, token) in uncached.iter().enumerate() {
                let offset = 2 + i * 3;

                let symbol = if results[offset].success {
                    IERC20::symbolCall::abi_decode_returns(&results[offset].returnData).ok()
                } else {
                    None
                };
                let name = if results[offset + 1].success {
                    IERC20::nameCall::abi_decode_returns(&results[offset + 1].returnData).ok()
                } else {
                    None
                };
                let decimals = if results[offset + 2].success {
                    IERC20::decimalsCall::abi_decode_returns(&results[offset + 2].returnData).ok()
                } else {
                    None
                };

                cache.insert(*token, CachedTokenMeta {
                    symbol: symbol.unwrap_or_else(|| format!("0x{}...", &format!("{:?}", token)[2..8])),
                    name: name.unwrap_or_default(),
                    decimals: decimals.unwrap_or_else(|| known_decimals(token)),
                });
            }
        }

        // Balances sit at the tail of the batch
        let balance_offset = 2 + uncached.len() * 3;
        let mut balances = [U256::ZERO, U256::ZERO];
        for (i, slot) in balances.iter_mut().enumerate() {
            if results[balance_offset + i].success {
                if let Ok(bal) = IERC20::balanceOfCall::abi_decode_returns(&results[balance_offset + i].returnData) {
                    *slot = bal;
                }
            } else {
                trace!("balanceOf failed for token {}", i);
            }
        }

        // Native balance only matters when one side is the wrapped-native token
        let native_balance = if token0 == self.weth || token1 == self.weth {
            Some(self.native_balance(owner).await?)
        } else {
            None
        };

        let cache = TOKEN_META_CACHE.read().await;
        let build_info = |token: Address, balance: U256| -> TokenInfo {
            let meta = cache.get(&token);
            let is_weth = token == self.weth;
            TokenInfo {
                address: token,
                symbol: meta.map(|m| m.symbol.clone()).unwrap_or_default(),
                name: meta.map(|m| m.name.clone()).unwrap_or_default(),
                decimals: meta.map(|m| m.decimals).unwrap_or_else(|| known_decimals(&token)),
                balance,
                is_weth,
                eth_balance: if is_weth { native_balance } else { None },
            }
        };

        let pool = PoolInfo {
            address: pair,
            token0,
            token1,
            reserve0,
            reserve1,
            total_supply,
            token0_info: build_info(token0, balances[0]),
            token1_info: build_info(token1, balances[1]),
        };

        info!(
            "⚡ Pool snapshot {:?} in {:?} ({} initialized)",
            pair,
            start.elapsed(),
            if pool.is_initialized() { "is" } else { "NOT" }
        );

        Ok(Some(pool))
    }

    /// ERC-20 balance of `owner`
    pub async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let raw = self.call_one(token, IERC20::balanceOfCall { owner }.abi_encode()).await?;
        IERC20::balanceOfCall::abi_decode_returns(&raw)
            .map_err(|e| eyre!("Failed to decode balanceOf: {}", e))
    }

    /// Native-currency balance of `owner`
    pub async fn native_balance(&self, owner: Address) -> Result<U256> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);
        Ok(provider.get_balance(owner).await?)
    }

    /// Current spend authorization from `owner` to `spender`
    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let raw = self.call_one(token, IERC20::allowanceCall { owner, spender }.abi_encode()).await?;
        IERC20::allowanceCall::abi_decode_returns(&raw)
            .map_err(|e| eyre!("Failed to decode allowance: {}", e))
    }

    /// LP-token balance of `owner` on a pair contract
    pub async fn lp_balance(&self, pair: Address, owner: Address) -> Result<U256> {
        self.erc20_balance(pair, owner).await
    }

    /// Cache statistics (cached token metas)
    pub async fn cache_stats(&self) -> usize {
        TOKEN_META_CACHE.read().await.len()
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::WETH_MAINNET;
    use std::str::FromStr;

    fn sample_pool() -> PoolInfo {
        let usdc = Address::from_str("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        let weth = Address::from_str(WETH_MAINNET).unwrap();
        let (token0, token1) = crate::math::sort_tokens(usdc, weth);
        PoolInfo {
            address: Address::from_str("0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc").unwrap(),
            token0,
            token1,
            reserve0: U256::from(1000u64),
            reserve1: U256::from(2000u64),
            total_supply: U256::from(100u64),
            token0_info: TokenInfo {
                address: token0,
                symbol: "USDC".into(),
                name: "USD Coin".into(),
                decimals: 6,
                balance: U256::ZERO,
                is_weth: false,
                eth_balance: None,
            },
            token1_info: TokenInfo {
                address: token1,
                symbol: "WETH".into(),
                name: "Wrapped Ether".into(),
                decimals: 18,
                balance: U256::ZERO,
                is_weth: true,
                eth_balance: Some(U256::from(5u64)),
            },
        }
    }

    #[test]
    fn test_oriented_reserves_both_orders() {
        let pool = sample_pool();

        let (ra, rb) = pool.oriented_reserves(pool.token0);
        assert_eq!((ra, rb), (U256::from(1000u64), U256::from(2000u64)));

        let (ra, rb) = pool.oriented_reserves(pool.token1);
        assert_eq!((ra, rb), (U256::from(2000u64), U256::from(1000u64)));
    }

    #[test]
    fn test_initialized_flag() {
        let mut pool = sample_pool();
        assert!(pool.is_initialized());

        pool.reserve0 = U256::ZERO;
        assert!(!pool.is_initialized());
    }

    #[test]
    fn test_truncated_batch_is_an_error() {
        assert!(check_batch_len(7, 7).is_ok());
        assert!(check_batch_len(0, 0).is_ok());

        let err = check_batch_len(7, 3).unwrap_err();
        assert!(err.to_string().contains("7 calls"));
        assert!(check_batch_len(2, 5).is_err());
    }

    #[test]
    fn test_token_info_lookup() {
        let pool = sample_pool();
        assert_eq!(pool.token_info(pool.token0).unwrap().symbol, "USDC");
        assert_eq!(pool.token_info(pool.token1).unwrap().symbol, "WETH");
        assert!(pool.token_info(Address::ZERO).is_none());
    }
}
