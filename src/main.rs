//! poolhand - Uniswap V2 liquidity provisioning CLI
//!
//! Run with: cargo run -- <COMMAND>
//!
//! Commands:
//! - pool:     inspect a pair (reserves, LP supply, token meta)
//! - quote:    math-only deposit/withdrawal quote with slippage minimums
//! - add:      orchestrated add-liquidity (wrap → approve → submit → confirm)
//! - remove:   orchestrated remove-liquidity
//! - balances: operator balances for the known token set
//! - wrap:     explicit native → wrapped conversion

use alloy_primitives::{Address, U256};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod chain;
mod config;
mod events;
mod gas;
mod math;
mod orchestrator;
mod tokens;

use chain::{PoolInfo, PoolReader};
use config::{Config, ExecutionMode, OperationRecord};
use events::{OperationEvent, OperationState, Stage};
use math::{apply_slippage, quote_deposit, quote_withdrawal, QuoteError};
use orchestrator::{
    deadline_from_now, plan_add, plan_remove, AddLiquidityPlan, Orchestrator, RemoveLiquidityPlan,
    WalletManager,
};
use tokens::{format_units, parse_units};

// ============================================
// CLI
// ============================================

#[derive(Parser)]
#[command(name = "poolhand", about = "Liquidity provisioning for Uniswap V2-style pools", version)]
struct Cli {
    /// Load configuration from a TOML file instead of the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect a pair: reserves, LP supply, token metadata
    Pool {
        token_a: String,
        token_b: String,
    },

    /// Quote a proportional deposit or withdrawal without touching the
    /// chain write path
    Quote {
        token_a: String,
        token_b: String,
        /// Deposit amount of TOKEN_A, decimal units
        #[arg(long, required_unless_present = "remove")]
        amount_a: Option<String>,
        /// Quote a withdrawal instead of a deposit
        #[arg(long, requires = "lp")]
        remove: bool,
        /// LP token amount to burn, decimal units (18 decimals)
        #[arg(long)]
        lp: Option<String>,
    },

    /// Add liquidity (wrap if needed, approve, submit, confirm)
    Add {
        token_a: String,
        token_b: String,
        /// Deposit amount of TOKEN_A, decimal units
        #[arg(long)]
        amount_a: String,
        /// Second-side amount - only valid (and required) for an
        /// uninitialized pool, where the first provider sets the price
        #[arg(long)]
        amount_b: Option<String>,
    },

    /// Remove liquidity by burning LP tokens
    Remove {
        token_a: String,
        token_b: String,
        /// LP token amount to burn, decimal units (18 decimals)
        #[arg(long)]
        lp: String,
    },

    /// Show operator balances for the known token set
    Balances,

    /// Wrap native currency into the wrapped-native token
    Wrap {
        /// Amount to wrap, decimal units (18 decimals)
        #[arg(long)]
        amount: String,
    },
}

// ============================================
// APP CONTEXT
// ============================================

/// Explicit application context - config and collaborators built once in
/// main and passed by reference, no ambient globals.
struct AppContext {
    config: Config,
    reader: PoolReader,
    wallet: WalletManager,
}

impl AppContext {
    fn build(config_path: Option<&PathBuf>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::from_file(path)?,
            None => Config::from_env()?,
        };
        config.validate()?;

        let reader = PoolReader::new(config.rpc_url.clone(), config.factory()?, config.weth()?);
        let wallet = WalletManager::from_env(config.chain_id)?;

        Ok(Self { config, reader, wallet })
    }

    /// Address balances are queried for: the operator when a key is
    /// configured, otherwise the zero address (read-only runs)
    fn query_owner(&self) -> Address {
        self.wallet.operator_address().unwrap_or(Address::ZERO)
    }
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 💧 POOLHAND - Uniswap V2 Liquidity Provisioning").cyan().bold()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn parse_address(label: &str, value: &str) -> Result<Address> {
    Address::from_str(value).map_err(|_| eyre!("malformed {label} address: {value}"))
}

fn parse_pair(token_a: &str, token_b: &str) -> Result<(Address, Address)> {
    let a = parse_address("tokenA", token_a)?;
    let b = parse_address("tokenB", token_b)?;
    if a == b {
        return Err(eyre!("tokenA and tokenB are the same address"));
    }
    Ok((a, b))
}

// ============================================
// PROGRESS DISPLAY
// ============================================

/// Render operation events as a spinner until the sink is dropped.
fn spawn_progress(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<OperationEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("static template"),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));

        // A mirror of the operation state, folded from the same events
        let mut view = OperationState::new();

        while let Some(event) = rx.recv().await {
            view.apply(&event);

            match &event {
                OperationEvent::WrapSubmitted { hash, .. } => {
                    spinner.set_message(format!("wrapping native currency ({hash:?})"));
                }
                OperationEvent::ApprovalSubmitted { hash, .. } => {
                    spinner.set_message(format!("awaiting approval ({hash:?})"));
                }
                OperationEvent::LiquiditySubmitted { hash } => {
                    spinner.set_message(format!("awaiting confirmation ({hash:?})"));
                }
                _ => {
                    spinner.set_message(view.stage.to_string());
                }
            }

            if view.is_terminal() {
                break;
            }
        }

        spinner.finish_and_clear();
    })
}

// ============================================
// COMMANDS
// ============================================

fn print_pool(pool: &PoolInfo) {
    let t0 = &pool.token0_info;
    let t1 = &pool.token1_info;

    println!("{} Pair: {:?}", style("✓").green(), pool.address);
    println!("   token0: {} ({:?})", t0.symbol, pool.token0);
    println!("   token1: {} ({:?})", t1.symbol, pool.token1);
    println!(
        "   reserves: {} {} / {} {}",
        format_units(pool.reserve0, t0.decimals),
        t0.symbol,
        format_units(pool.reserve1, t1.decimals),
        t1.symbol
    );
    println!("   LP supply: {}", format_units(pool.total_supply, 18));

    if !pool.is_initialized() {
        // Legitimate state for a brand-new pair, not an error
        println!(
            "   {}",
            style("pool is uninitialized - the first liquidity provider sets the price").yellow()
        );
    }
}

async fn fetch_pool_or_bail(
    ctx: &AppContext,
    token_a: Address,
    token_b: Address,
) -> Result<PoolInfo> {
    ctx.reader
        .fetch_pool(token_a, token_b, ctx.query_owner())
        .await?
        .ok_or_else(|| eyre!("no pair deployed for this token combination"))
}

async fn cmd_pool(ctx: &AppContext, token_a: &str, token_b: &str) -> Result<()> {
    let (a, b) = parse_pair(token_a, token_b)?;

    match ctx.reader.fetch_pool(a, b, ctx.query_owner()).await? {
        Some(pool) => print_pool(&pool),
        None => println!(
            "{} no pair deployed for this token combination",
            style("○").yellow()
        ),
    }

    Ok(())
}

/// The four numbers a withdrawal quote prints: amounts out for both
/// reserves plus their slippage-bounded minimums.
fn withdrawal_quote(
    pool: &PoolInfo,
    lp_amount: U256,
    slippage_bps: u64,
) -> std::result::Result<(U256, U256, U256, U256), QuoteError> {
    let amount0 = quote_withdrawal(lp_amount, pool.reserve0, pool.total_supply)?;
    let amount1 = quote_withdrawal(lp_amount, pool.reserve1, pool.total_supply)?;
    Ok((
        amount0,
        amount1,
        apply_slippage(amount0, slippage_bps),
        apply_slippage(amount1, slippage_bps),
    ))
}

async fn cmd_quote(
    ctx: &AppContext,
    token_a: &str,
    token_b: &str,
    amount_a: Option<&str>,
    remove: bool,
    lp: Option<&str>,
) -> Result<()> {
    let (a, b) = parse_pair(token_a, token_b)?;
    let pool = fetch_pool_or_bail(ctx, a, b).await?;
    print_pool(&pool);
    println!();

    if remove {
        let lp = lp.ok_or_else(|| eyre!("--remove requires --lp"))?;
        let lp_amount = parse_units(lp, 18)?;

        match withdrawal_quote(&pool, lp_amount, ctx.config.slippage_bps) {
            Ok((amount0, amount1, min0, min1)) => {
                let t0 = &pool.token0_info;
                let t1 = &pool.token1_info;
                println!(
                    "Burning {} LP returns {} {} / {} {}",
                    format_units(lp_amount, 18),
                    format_units(amount0, t0.decimals),
                    t0.symbol,
                    format_units(amount1, t1.decimals),
                    t1.symbol
                );
                println!(
                    "Minimums at {} bps slippage: {} {} / {} {}",
                    ctx.config.slippage_bps,
                    format_units(min0, t0.decimals),
                    t0.symbol,
                    format_units(min1, t1.decimals),
                    t1.symbol
                );
            }
            Err(QuoteError::UninitializedPool) => {
                println!(
                    "{}",
                    style("No LP supply yet - there is nothing to withdraw from this pool.").yellow()
                );
            }
            Err(e) => return Err(e.into()),
        }
        return Ok(());
    }

    let amount_a = amount_a.ok_or_else(|| eyre!("supply --amount-a for a deposit quote"))?;
    let other = if a == pool.token0 { pool.token1 } else { pool.token0 };
    let info_a = pool.token_info(a).ok_or_else(|| eyre!("token metadata missing for {a:?}"))?;
    let info_b = pool
        .token_info(other)
        .ok_or_else(|| eyre!("token metadata missing for {other:?}"))?;
    let amount = parse_units(amount_a, info_a.decimals)?;

    let (reserve_a, reserve_b) = pool.oriented_reserves(a);
    match quote_deposit(amount, reserve_a, reserve_b) {
        Ok(quoted) => {
            let slippage = ctx.config.slippage_bps;
            println!(
                "Depositing {} {} pairs with {} {}",
                format_units(amount, info_a.decimals),
                info_a.symbol,
                format_units(quoted, info_b.decimals),
                info_b.symbol
            );
            println!(
                "Minimums at {} bps slippage: {} {} / {} {}",
                slippage,
                format_units(apply_slippage(amount, slippage), info_a.decimals),
                info_a.symbol,
                format_units(apply_slippage(quoted, slippage), info_b.decimals),
                info_b.symbol
            );
        }
        Err(QuoteError::UninitializedPool) => {
            println!(
                "{}",
                style("No ratio available yet - as the first provider you set the price (use `add` with --amount-b).").yellow()
            );
        }
        Err(QuoteError::AmountTooSmall) => {
            println!(
                "{}",
                style("Quantity too small: the proportional amount rounds to zero.").yellow()
            );
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Write the terminal operation record and refresh the affected pool.
async fn finish_operation(
    ctx: &AppContext,
    kind: &str,
    pool: &PoolInfo,
    amount_a: U256,
    amount_b: U256,
    state: &OperationState,
    outcome: &Result<()>,
) -> Result<()> {
    // Dry runs sign nothing and leave no record
    if ctx.config.operation_log && ctx.config.execution_mode == ExecutionMode::Live {
        let record = OperationRecord {
            timestamp: chrono::Utc::now(),
            kind: kind.to_string(),
            pair: Some(format!("{:?}", pool.address)),
            token_a: format!("{:?}", pool.token0),
            token_b: format!("{:?}", pool.token1),
            amount_a: amount_a.to_string(),
            amount_b: amount_b.to_string(),
            tx_hashes: state.tx_hashes.iter().map(|(_, h)| format!("{h:?}")).collect(),
            succeeded: outcome.is_ok(),
            error: state.error.as_ref().map(|(step, reason)| format!("{step}: {reason}")),
        };
        record.append_to_file(&ctx.config.operation_log_path)?;
    }

    match outcome {
        Ok(()) => {
            if state.stage == Stage::Succeeded {
                if let Some(hash) = state.liquidity_tx() {
                    println!(
                        "{} {}",
                        style("✓ confirmed:").green().bold(),
                        ctx.config.explorer_tx_url(&format!("{hash:?}"))
                    );
                }

                // Refresh affected queries instead of reloading everything
                if let Some(updated) = ctx
                    .reader
                    .fetch_pool(pool.token0, pool.token1, ctx.query_owner())
                    .await?
                {
                    println!();
                    print_pool(&updated);
                }
            }
        }
        Err(e) => {
            if let Some((step, reason)) = &state.error {
                error!("{} step failed: {}", step, reason);
            }
            println!(
                "{} {} - completed steps are preserved; rerun the same command to retry",
                style("✗").red().bold(),
                e
            );
        }
    }

    Ok(())
}

async fn cmd_add(
    ctx: &mut AppContext,
    token_a: &str,
    token_b: &str,
    amount_a: &str,
    amount_b: Option<&str>,
) -> Result<()> {
    let (a, b) = parse_pair(token_a, token_b)?;
    let pool = fetch_pool_or_bail(ctx, a, b).await?;
    print_pool(&pool);
    println!();

    if !ctx.wallet.has_operator() {
        warn!("No OPERATOR_PRIVATE_KEY configured - use `quote` for read-only output");
        return Err(eyre!("add requires an operator wallet"));
    }

    let info_a = pool.token_info(a).ok_or_else(|| eyre!("token metadata missing for {a:?}"))?;
    let amount_a_units = parse_units(amount_a, info_a.decimals)?;
    let amount_b_units = match amount_b {
        Some(raw) => {
            let other = if a == pool.token0 { pool.token1 } else { pool.token0 };
            let info_b = pool
                .token_info(other)
                .ok_or_else(|| eyre!("token metadata missing for {other:?}"))?;
            Some(parse_units(raw, info_b.decimals)?)
        }
        None => None,
    };

    let plan: AddLiquidityPlan = plan_add(
        &pool,
        a,
        amount_a_units,
        amount_b_units,
        ctx.config.slippage_bps,
        deadline_from_now(ctx.config.deadline_secs),
    )?;

    let (sink, rx) = events::channel();
    let progress = spawn_progress(rx);

    let mut state = OperationState::new();
    let outcome = {
        let mut orchestrator = Orchestrator::new(&ctx.config, &ctx.reader, &mut ctx.wallet, sink);
        orchestrator.run_add(&plan, &mut state).await
    };
    progress.await.ok();

    finish_operation(
        ctx,
        "add",
        &pool,
        plan.amount_a_desired,
        plan.amount_b_desired,
        &state,
        &outcome,
    )
    .await?;

    outcome
}

async fn cmd_remove(ctx: &mut AppContext, token_a: &str, token_b: &str, lp: &str) -> Result<()> {
    let (a, b) = parse_pair(token_a, token_b)?;
    let pool = fetch_pool_or_bail(ctx, a, b).await?;
    print_pool(&pool);
    println!();

    let owner = ctx.wallet.require_operator()?;

    // LP tokens are always 18 decimals
    let lp_amount = parse_units(lp, 18)?;
    let lp_balance = ctx.reader.lp_balance(pool.address, owner).await?;

    let plan: RemoveLiquidityPlan = plan_remove(
        &pool,
        lp_amount,
        lp_balance,
        ctx.config.slippage_bps,
        deadline_from_now(ctx.config.deadline_secs),
    )?;

    println!(
        "Burning {} LP for minimums {} {} / {} {}",
        format_units(plan.lp_amount, 18),
        format_units(plan.amount_a_min, pool.token0_info.decimals),
        pool.token0_info.symbol,
        format_units(plan.amount_b_min, pool.token1_info.decimals),
        pool.token1_info.symbol
    );

    let (sink, rx) = events::channel();
    let progress = spawn_progress(rx);

    let mut state = OperationState::new();
    let outcome = {
        let mut orchestrator = Orchestrator::new(&ctx.config, &ctx.reader, &mut ctx.wallet, sink);
        orchestrator.run_remove(&plan, &mut state).await
    };
    progress.await.ok();

    finish_operation(ctx, "remove", &pool, plan.lp_amount, U256::ZERO, &state, &outcome).await?;

    outcome
}

async fn cmd_balances(ctx: &AppContext) -> Result<()> {
    let owner = ctx.query_owner();
    if owner == Address::ZERO {
        warn!("No operator wallet configured - balances are for the zero address");
    }
    println!("Balances for {:?}", owner);
    println!();

    let native = ctx.reader.native_balance(owner).await?;
    println!("  {:>8}  {}", "ETH", format_units(native, 18));

    let weth = ctx.config.weth()?;
    for token in tokens::known_tokens() {
        let address = Address::from_str(token.address)?;
        let balance = ctx.reader.erc20_balance(address, owner).await?;

        if address == weth {
            let total = balance.saturating_add(native);
            println!(
                "  {:>8}  {} (spendable incl. native: {})",
                token.symbol,
                format_units(balance, token.decimals),
                format_units(total, token.decimals)
            );
        } else {
            println!("  {:>8}  {}", token.symbol, format_units(balance, token.decimals));
        }
    }

    Ok(())
}

async fn cmd_wrap(ctx: &mut AppContext, amount: &str) -> Result<()> {
    let amount_units = parse_units(amount, 18)?;
    if amount_units.is_zero() {
        return Err(eyre!("wrap amount must be positive"));
    }

    let owner = ctx.wallet.require_operator()?;

    let native = ctx.reader.native_balance(owner).await?;
    if native < amount_units {
        return Err(eyre!(
            "insufficient native balance: have {}, need {}",
            format_units(native, 18),
            format_units(amount_units, 18)
        ));
    }

    let mut orchestrator = Orchestrator::new(
        &ctx.config,
        &ctx.reader,
        &mut ctx.wallet,
        events::EventSink::disconnected(),
    );

    let hash = orchestrator.run_wrap(amount_units).await?;
    if ctx.config.execution_mode == ExecutionMode::Live {
        println!(
            "{} {}",
            style("✓ wrapped:").green().bold(),
            ctx.config.explorer_tx_url(&format!("{hash:?}"))
        );
    }

    Ok(())
}

// ============================================
// ENTRY POINT
// ============================================

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("poolhand=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    print_banner();

    let mut ctx = AppContext::build(cli.config.as_ref())?;
    ctx.config.print_summary();
    println!();

    if ctx.config.execution_mode == ExecutionMode::Live {
        warn!("⚠️  LIVE mode - transactions will spend real funds");
    }

    info!("RPC: {}", ctx.config.rpc_url);

    match &cli.command {
        Command::Pool { token_a, token_b } => cmd_pool(&ctx, token_a, token_b).await,
        Command::Quote { token_a, token_b, amount_a, remove, lp } => {
            cmd_quote(&ctx, token_a, token_b, amount_a.as_deref(), *remove, lp.as_deref()).await
        }
        Command::Add { token_a, token_b, amount_a, amount_b } => {
            cmd_add(&mut ctx, token_a, token_b, amount_a, amount_b.as_deref()).await
        }
        Command::Remove { token_a, token_b, lp } => {
            cmd_remove(&mut ctx, token_a, token_b, lp).await
        }
        Command::Balances => cmd_balances(&ctx).await,
        Command::Wrap { amount } => cmd_wrap(&mut ctx, amount).await,
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokens::{TokenInfo, WETH_MAINNET};

    fn sample_pool() -> PoolInfo {
        let usdc = Address::from_str("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        let weth = Address::from_str(WETH_MAINNET).unwrap();
        let (token0, token1) = math::sort_tokens(usdc, weth);
        let info = |address: Address, symbol: &str, decimals: u8| TokenInfo {
            address,
            symbol: symbol.into(),
            name: symbol.into(),
            decimals,
            balance: U256::ZERO,
            is_weth: false,
            eth_balance: None,
        };
        PoolInfo {
            address: Address::from_str("0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc").unwrap(),
            token0,
            token1,
            reserve0: U256::from(1000u64),
            reserve1: U256::from(2000u64),
            total_supply: parse_units("100", 18).unwrap(),
            token0_info: info(token0, "USDC", 6),
            token1_info: info(token1, "WETH", 18),
        }
    }

    #[test]
    fn test_withdrawal_quote_from_parsed_lp_amount() {
        let pool = sample_pool();

        // Burn half the supply, entered as a decimal string like the CLI
        let lp_amount = parse_units("50", 18).unwrap();
        let (amount0, amount1, min0, min1) = withdrawal_quote(&pool, lp_amount, 0).unwrap();

        assert_eq!(amount0, U256::from(500u64));
        assert_eq!(amount1, U256::from(1000u64));
        assert_eq!(min0, amount0); // zero tolerance is the identity
        assert_eq!(min1, amount1);

        // With slippage the minimums drop but the quoted amounts don't
        let (a0, _, min0, _) = withdrawal_quote(&pool, lp_amount, 100).unwrap();
        assert_eq!(a0, U256::from(500u64));
        assert_eq!(min0, U256::from(495u64)); // 1% off 500
    }

    #[test]
    fn test_withdrawal_quote_zero_supply_is_unavailable() {
        let mut pool = sample_pool();
        pool.total_supply = U256::ZERO;
        assert_eq!(
            withdrawal_quote(&pool, U256::from(1u64), 0),
            Err(QuoteError::UninitializedPool)
        );
    }

    #[test]
    fn test_quote_cli_accepts_withdrawal_mode() {
        let usdc = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
        let weth = WETH_MAINNET;

        let cli = Cli::try_parse_from([
            "poolhand", "quote", usdc, weth, "--remove", "--lp", "0.5",
        ])
        .unwrap();
        match cli.command {
            Command::Quote { remove, lp, amount_a, .. } => {
                assert!(remove);
                assert_eq!(lp.as_deref(), Some("0.5"));
                assert!(amount_a.is_none());
            }
            _ => panic!("expected quote subcommand"),
        }

        // --remove without --lp is rejected at parse time
        assert!(Cli::try_parse_from(["poolhand", "quote", usdc, weth, "--remove"]).is_err());

        // Deposit mode still requires --amount-a
        assert!(Cli::try_parse_from(["poolhand", "quote", usdc, weth]).is_err());
        assert!(Cli::try_parse_from([
            "poolhand", "quote", usdc, weth, "--amount-a", "1.5",
        ])
        .is_ok());
    }
}
