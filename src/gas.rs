//! Gas Price Oracle - RPC Edition
//!
//! Fetches current gas pricing from the RPC provider and turns it into the
//! EIP-1559 fee fields used when signing. Results are cached for a few
//! seconds to avoid hammering the endpoint, and every estimate is checked
//! against the configured gas-price cap before a transaction is signed.

use alloy_provider::{Provider, ProviderBuilder};
use eyre::{eyre, Result};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

// ============================================
// CONSTANTS
// ============================================

/// Cache duration for gas prices
const CACHE_DURATION_SECS: u64 = 10;

/// Minimum sane gas price (0.01 gwei)
const MIN_GAS_GWEI: f64 = 0.01;

/// Maximum sane gas price (1000 gwei - extreme congestion)
const MAX_GAS_GWEI: f64 = 1000.0;

/// Default priority fee when the node won't suggest one (1 gwei)
const DEFAULT_PRIORITY_FEE_WEI: u128 = 1_000_000_000;

const WEI_PER_GWEI: f64 = 1e9;

// ============================================
// ESTIMATE
// ============================================

/// One EIP-1559 fee estimate, in wei.
#[derive(Debug, Clone, Copy)]
pub struct GasEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl GasEstimate {
    pub fn gwei(&self) -> f64 {
        self.max_fee_per_gas as f64 / WEI_PER_GWEI
    }
}

// ============================================
// ORACLE
// ============================================

pub struct GasOracle {
    rpc_url: String,

    /// Abort threshold from config, in gwei
    max_gas_gwei: u64,

    cached: RwLock<Option<(GasEstimate, Instant)>>,
}

impl GasOracle {
    pub fn new(rpc_url: String, max_gas_gwei: u64) -> Self {
        Self {
            rpc_url,
            max_gas_gwei,
            cached: RwLock::new(None),
        }
    }

    /// Current estimate, cached for a few seconds.
    pub async fn estimate(&self) -> Result<GasEstimate> {
        {
            let cached = self.cached.read().await;
            if let Some((estimate, at)) = *cached {
                if at.elapsed() < Duration::from_secs(CACHE_DURATION_SECS) {
                    return Ok(estimate);
                }
            }
        }

        let estimate = self.fetch().await?;

        let mut cached = self.cached.write().await;
        *cached = Some((estimate, Instant::now()));

        Ok(estimate)
    }

    /// Current estimate, rejected if it exceeds the configured cap.
    /// Called immediately before signing anything.
    pub async fn estimate_within_cap(&self) -> Result<GasEstimate> {
        let estimate = self.estimate().await?;
        let cap = self.max_gas_gwei as f64;

        if estimate.gwei() > cap {
            return Err(eyre!(
                "gas price {:.2} gwei exceeds MAX_GAS_GWEI ({}) - aborting before signing",
                estimate.gwei(),
                self.max_gas_gwei
            ));
        }

        Ok(estimate)
    }

    async fn fetch(&self) -> Result<GasEstimate> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);

        let gas_price = provider.get_gas_price().await
            .map_err(|e| eyre!("eth_gasPrice failed: {}", e))?;

        let priority_fee = match provider.get_max_priority_fee_per_gas().await {
            Ok(fee) => fee,
            Err(e) => {
                warn!("eth_maxPriorityFeePerGas failed ({}), using 1 gwei default", e);
                DEFAULT_PRIORITY_FEE_WEI
            }
        };

        let gwei = gas_price as f64 / WEI_PER_GWEI;
        if !(MIN_GAS_GWEI..=MAX_GAS_GWEI).contains(&gwei) {
            return Err(eyre!("implausible gas price from RPC: {:.4} gwei", gwei));
        }

        // Headroom over the quoted price so the tx doesn't go stale
        // waiting for inclusion
        let max_fee = gas_price.saturating_mul(12) / 10;

        debug!("Gas estimate: {:.2} gwei (priority {:.2} gwei)",
            gwei, priority_fee as f64 / WEI_PER_GWEI);

        Ok(GasEstimate {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority_fee.min(max_fee),
        })
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_gwei_conversion() {
        let estimate = GasEstimate {
            max_fee_per_gas: 25_000_000_000, // 25 gwei
            max_priority_fee_per_gas: 1_000_000_000,
        };
        assert!((estimate.gwei() - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cap_rejects_over_threshold() {
        let oracle = GasOracle::new("http://localhost:1".to_string(), 50);

        // Seed the cache with an over-cap estimate so no RPC is needed
        {
            let mut cached = oracle.cached.write().await;
            *cached = Some((
                GasEstimate {
                    max_fee_per_gas: 80_000_000_000, // 80 gwei
                    max_priority_fee_per_gas: 2_000_000_000,
                },
                Instant::now(),
            ));
        }

        assert!(oracle.estimate_within_cap().await.is_err());
    }

    #[tokio::test]
    async fn test_cap_accepts_under_threshold() {
        let oracle = GasOracle::new("http://localhost:1".to_string(), 50);

        {
            let mut cached = oracle.cached.write().await;
            *cached = Some((
                GasEstimate {
                    max_fee_per_gas: 20_000_000_000, // 20 gwei
                    max_priority_fee_per_gas: 1_000_000_000,
                },
                Instant::now(),
            ));
        }

        let estimate = oracle.estimate_within_cap().await.unwrap();
        assert_eq!(estimate.max_fee_per_gas, 20_000_000_000);
    }
}
