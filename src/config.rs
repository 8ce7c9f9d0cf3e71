//! Configuration for poolhand
//!
//! All runtime parameters: RPC endpoint, chain id, protocol contract
//! addresses, slippage/deadline defaults, and the guardrails that keep a
//! DryRun from turning into a live transaction by accident.

use alloy_primitives::Address;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

// ============================================
// EXECUTION MODE
// ============================================

/// Execution mode determines whether transactions are actually submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// DryRun mode - plans, quotes and signs nothing; prints what would run
    DryRun,

    /// Live mode - actually signs and submits transactions
    /// CAUTION: This uses real funds!
    Live,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::DryRun
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::DryRun => write!(f, "DRY_RUN"),
            ExecutionMode::Live => write!(f, "LIVE"),
        }
    }
}

// ============================================
// DEFAULT CONTRACT ADDRESSES (Ethereum mainnet)
// ============================================

/// Uniswap V2 factory
const DEFAULT_FACTORY: &str = "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f";

/// Uniswap V2 router02
const DEFAULT_ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";

/// Canonical WETH
const DEFAULT_WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";

// ============================================
// MAIN CONFIGURATION
// ============================================

/// Main configuration struct for poolhand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// Primary RPC URL (Alchemy/Infura recommended)
    pub rpc_url: String,

    /// Chain ID (1 = Ethereum Mainnet)
    pub chain_id: u64,

    // ========== Protocol Contracts ==========
    /// Uniswap V2 factory address (getPair lookups)
    pub factory_address: String,

    /// Uniswap V2 router address (addLiquidity/removeLiquidity target,
    /// and the spender all approvals are granted to)
    pub router_address: String,

    /// Wrapped-native token address (deposit() target for wrapping)
    pub weth_address: String,

    /// Block explorer base URL for success links
    pub explorer_base_url: String,

    // ========== Execution Settings ==========
    /// Current execution mode
    pub execution_mode: ExecutionMode,

    /// Default slippage tolerance in basis points (50 = 0.5%)
    pub slippage_bps: u64,

    /// Transaction deadline offset in seconds
    pub deadline_secs: u64,

    /// Maximum acceptable gas price in gwei
    /// Abort before signing if the network exceeds this
    pub max_gas_gwei: u64,

    /// Gas limit for ERC-20 approvals
    pub approve_gas_limit: u64,

    /// Gas limit for add/remove-liquidity transactions
    pub liquidity_gas_limit: u64,

    /// Gas limit for WETH deposit (wrap)
    pub wrap_gas_limit: u64,

    // ========== Operation Log ==========
    /// Enable/disable the JSONL operation log
    pub operation_log: bool,

    /// Path to append operation records
    pub operation_log_path: String,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL")
                .unwrap_or_else(|_| "https://eth.llamarpc.com".to_string()),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),

            // Contracts
            factory_address: env::var("FACTORY_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_FACTORY.to_string()),
            router_address: env::var("ROUTER_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_ROUTER.to_string()),
            weth_address: env::var("WETH_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_WETH.to_string()),
            explorer_base_url: env::var("EXPLORER_BASE_URL")
                .unwrap_or_else(|_| "https://etherscan.io".to_string()),

            // Execution
            execution_mode: match env::var("EXECUTION_MODE")
                .unwrap_or_else(|_| "dry_run".to_string())
                .to_lowercase()
                .as_str()
            {
                "live" | "production" => ExecutionMode::Live,
                _ => ExecutionMode::DryRun,
            },
            slippage_bps: env::var("SLIPPAGE_BPS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            deadline_secs: env::var("DEADLINE_SECS")
                .unwrap_or_else(|_| "1200".to_string()) // 20 minutes
                .parse()
                .unwrap_or(1200),
            max_gas_gwei: env::var("MAX_GAS_GWEI")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            approve_gas_limit: env::var("APPROVE_GAS_LIMIT")
                .unwrap_or_else(|_| "80000".to_string())
                .parse()
                .unwrap_or(80_000),
            liquidity_gas_limit: env::var("LIQUIDITY_GAS_LIMIT")
                .unwrap_or_else(|_| "300000".to_string())
                .parse()
                .unwrap_or(300_000),
            wrap_gas_limit: env::var("WRAP_GAS_LIMIT")
                .unwrap_or_else(|_| "60000".to_string())
                .parse()
                .unwrap_or(60_000),

            // Operation log
            operation_log: env::var("OPERATION_LOG")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            operation_log_path: env::var("OPERATION_LOG_PATH")
                .unwrap_or_else(|_| "./logs/operations.log".to_string()),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Parsed factory address
    pub fn factory(&self) -> Result<Address> {
        Ok(Address::from_str(&self.factory_address)?)
    }

    /// Parsed router address
    pub fn router(&self) -> Result<Address> {
        Ok(Address::from_str(&self.router_address)?)
    }

    /// Parsed wrapped-native token address
    pub fn weth(&self) -> Result<Address> {
        Ok(Address::from_str(&self.weth_address)?)
    }

    /// Explorer URL for a transaction hash
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_base_url.trim_end_matches('/'), tx_hash)
    }

    /// Validate configuration before doing anything with it
    pub fn validate(&self) -> Result<()> {
        // Check RPC URL
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!("Invalid RPC_URL - please set a valid Alchemy/Infura URL"));
        }

        // Contract addresses must parse
        self.factory().map_err(|_| eyre::eyre!("Invalid FACTORY_ADDRESS: {}", self.factory_address))?;
        self.router().map_err(|_| eyre::eyre!("Invalid ROUTER_ADDRESS: {}", self.router_address))?;
        self.weth().map_err(|_| eyre::eyre!("Invalid WETH_ADDRESS: {}", self.weth_address))?;

        // Sanity checks
        if self.slippage_bps > 10_000 {
            return Err(eyre::eyre!(
                "SLIPPAGE_BPS must be <= 10000 (currently {})",
                self.slippage_bps
            ));
        }
        if self.slippage_bps > 500 && self.execution_mode == ExecutionMode::Live {
            return Err(eyre::eyre!(
                "SLIPPAGE_BPS > 500 (5%) in LIVE mode - refusing, this invites sandwiching"
            ));
        }
        if self.deadline_secs == 0 {
            return Err(eyre::eyre!("DEADLINE_SECS must be positive"));
        }

        // Live mode requires a signing key in the environment
        if self.execution_mode == ExecutionMode::Live && env::var("OPERATOR_PRIVATE_KEY").is_err() {
            return Err(eyre::eyre!("Live mode requires OPERATOR_PRIVATE_KEY"));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║               POOLHAND - CONFIGURATION                     ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Execution Mode:    {:^40} ║", self.execution_mode);
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CONTRACTS                                                  ║");
        println!("║ • Factory: {:>48} ║", self.factory_address);
        println!("║ • Router:  {:>48} ║", self.router_address);
        println!("║ • WETH:    {:>48} ║", self.weth_address);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ EXECUTION                                                  ║");
        println!("║ • Slippage:        {:>36} bps ║", self.slippage_bps);
        println!("║ • Deadline:        {:>37} s  ║", self.deadline_secs);
        println!("║ • Max Gas:         {:>34} gwei ║", self.max_gas_gwei);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ OPERATION LOG                                              ║");
        println!("║ • Enabled:         {:^40} ║",
            if self.operation_log { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://eth.llamarpc.com".to_string(),
            chain_id: 1,
            factory_address: DEFAULT_FACTORY.to_string(),
            router_address: DEFAULT_ROUTER.to_string(),
            weth_address: DEFAULT_WETH.to_string(),
            explorer_base_url: "https://etherscan.io".to_string(),
            execution_mode: ExecutionMode::DryRun,
            slippage_bps: 50,
            deadline_secs: 1200,
            max_gas_gwei: 50,
            approve_gas_limit: 80_000,
            liquidity_gas_limit: 300_000,
            wrap_gas_limit: 60_000,
            operation_log: true,
            operation_log_path: "./logs/operations.log".to_string(),
        }
    }
}

// ============================================
// OPERATION RECORD
// ============================================

use chrono::{DateTime, Utc};
use std::io::Write;

/// One terminal (succeeded or failed) liquidity operation, appended as a
/// JSONL record when the operation log is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub pair: Option<String>,
    pub token_a: String,
    pub token_b: String,
    pub amount_a: String,
    pub amount_b: String,
    pub tx_hashes: Vec<String>,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl OperationRecord {
    /// Append this record to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.execution_mode, ExecutionMode::DryRun);
        assert_eq!(config.slippage_bps, 50);
        assert!(config.factory().is_ok());
        assert!(config.router().is_ok());
        assert!(config.weth().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_slippage() {
        let mut config = Config::default();
        config.slippage_bps = 10_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_addresses() {
        let mut config = Config::default();
        config.router_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explorer_tx_url() {
        let config = Config::default();
        assert_eq!(
            config.explorer_tx_url("0xabc"),
            "https://etherscan.io/tx/0xabc"
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.router_address, config.router_address);
        assert_eq!(parsed.slippage_bps, config.slippage_bps);
    }
}
