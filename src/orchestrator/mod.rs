//! Transaction Orchestrator
//!
//! Drives one liquidity operation end to end:
//! wrap (only when WETH is short) → check allowance → approve →
//! submit add/remove liquidity → await confirmation.
//!
//! Planning is pure and chain-free: `plan_add`/`plan_remove` turn a pool
//! snapshot plus user amounts into desired amounts, slippage-bounded
//! minimums and the wrap shortfall, rejecting bad input before anything is
//! signed. The driver then walks the plan, emitting `OperationEvent`s and
//! folding them into `OperationState` through the reducer.
//!
//! Ordering guarantee: every approval is confirmed before the dependent
//! liquidity transaction is submitted. Nothing retries automatically -
//! failures carry the underlying message and the caller decides.

mod signer;

pub use signer::WalletManager;

use alloy_network::Ethereum;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy_sol_types::SolCall;
use chrono::Utc;
use eyre::{eyre, Result};
use tracing::{debug, info, warn};

use crate::chain::abi::{IERC20, IUniswapV2Router02, IWETH9};
use crate::chain::{PoolInfo, PoolReader};
use crate::config::{Config, ExecutionMode};
use crate::events::{EventSink, OperationEvent, OperationState, StepKind};
use crate::gas::GasOracle;
use crate::math::{apply_slippage, quote_deposit, quote_withdrawal, QuoteError};
use crate::tokens::format_units;

// ============================================
// PLANS
// ============================================

/// Everything needed to execute one add-liquidity operation.
#[derive(Debug, Clone)]
pub struct AddLiquidityPlan {
    pub token_a: Address,
    pub token_b: Address,
    pub amount_a_desired: U256,
    pub amount_b_desired: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,

    /// Native currency to wrap before anything else; zero when the WETH
    /// balance already covers the deposit (or neither side is WETH)
    pub wrap_amount: U256,

    pub deadline: U256,
}

/// Everything needed to execute one remove-liquidity operation.
#[derive(Debug, Clone)]
pub struct RemoveLiquidityPlan {
    pub pair: Address,
    pub token_a: Address,
    pub token_b: Address,
    pub lp_amount: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,
    pub deadline: U256,
}

/// Unix deadline `secs` from now, as the router expects it
pub fn deadline_from_now(secs: u64) -> U256 {
    U256::from(Utc::now().timestamp() as u64 + secs)
}

/// Build an add-liquidity plan from a pool snapshot.
///
/// For an initialized pool the second-side amount is quoted from the
/// reserves and `amount_b` must not be supplied. For an uninitialized pool
/// there is no ratio to enforce - the caller provides both amounts and
/// sets the opening price (first-provider semantics).
pub fn plan_add(
    pool: &PoolInfo,
    token_a: Address,
    amount_a: U256,
    amount_b: Option<U256>,
    slippage_bps: u64,
    deadline: U256,
) -> Result<AddLiquidityPlan> {
    let token_b = if token_a == pool.token0 {
        pool.token1
    } else if token_a == pool.token1 {
        pool.token0
    } else {
        return Err(eyre!("token {:?} is not part of pool {:?}", token_a, pool.address));
    };

    if amount_a.is_zero() {
        return Err(eyre!("deposit amount must be positive"));
    }

    let amount_b_desired = if pool.is_initialized() {
        if amount_b.is_some() {
            return Err(eyre!(
                "pool is initialized - the second-side amount is quoted from reserves, do not supply it"
            ));
        }
        let (reserve_a, reserve_b) = pool.oriented_reserves(token_a);
        match quote_deposit(amount_a, reserve_a, reserve_b) {
            Ok(quoted) => quoted,
            Err(QuoteError::AmountTooSmall) => {
                return Err(eyre!(
                    "deposit quantity too small - the proportional amount rounds to zero"
                ));
            }
            Err(e) => return Err(eyre!("quote failed: {e}")),
        }
    } else {
        // First liquidity provider: no ratio enforcement, both sides explicit
        amount_b.ok_or_else(|| {
            eyre!("pool is uninitialized - supply the second-side amount to set the opening price")
        })?
    };

    if amount_b_desired.is_zero() {
        return Err(eyre!("second-side amount must be positive"));
    }

    // Client-side balance checks, counting wrappable native currency
    let mut wrap_amount = U256::ZERO;
    for (token, desired) in [(token_a, amount_a), (token_b, amount_b_desired)] {
        let Some(token_info) = pool.token_info(token) else {
            return Err(eyre!("missing token info for {:?}", token));
        };

        if token_info.spendable() < desired {
            return Err(eyre!(
                "insufficient {} balance: have {} (incl. wrappable), need {}",
                token_info.symbol,
                format_units(token_info.spendable(), token_info.decimals),
                format_units(desired, token_info.decimals),
            ));
        }

        if token_info.is_weth && token_info.balance < desired {
            // Wrap exactly the shortfall
            wrap_amount = desired - token_info.balance;
        }
    }

    Ok(AddLiquidityPlan {
        token_a,
        token_b,
        amount_a_desired: amount_a,
        amount_b_desired,
        amount_a_min: apply_slippage(amount_a, slippage_bps),
        amount_b_min: apply_slippage(amount_b_desired, slippage_bps),
        wrap_amount,
        deadline,
    })
}

/// Build a remove-liquidity plan from a pool snapshot.
pub fn plan_remove(
    pool: &PoolInfo,
    lp_amount: U256,
    lp_balance: U256,
    slippage_bps: u64,
    deadline: U256,
) -> Result<RemoveLiquidityPlan> {
    if lp_amount.is_zero() {
        return Err(eyre!("LP amount must be positive"));
    }
    if lp_amount > lp_balance {
        return Err(eyre!(
            "insufficient LP balance: have {}, need {}",
            lp_balance,
            lp_amount
        ));
    }

    let amount_0 = quote_withdrawal(lp_amount, pool.reserve0, pool.total_supply)
        .map_err(|e| eyre!("withdrawal quote failed: {e}"))?;
    let amount_1 = quote_withdrawal(lp_amount, pool.reserve1, pool.total_supply)
        .map_err(|e| eyre!("withdrawal quote failed: {e}"))?;

    Ok(RemoveLiquidityPlan {
        pair: pool.address,
        token_a: pool.token0,
        token_b: pool.token1,
        lp_amount,
        amount_a_min: apply_slippage(amount_0, slippage_bps),
        amount_b_min: apply_slippage(amount_1, slippage_bps),
        deadline,
    })
}

// ============================================
// ORCHESTRATOR
// ============================================

/// Drives planned operations against the chain.
pub struct Orchestrator<'a> {
    config: &'a Config,
    reader: &'a PoolReader,
    wallet: &'a mut WalletManager,
    gas: GasOracle,
    sink: EventSink,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a Config,
        reader: &'a PoolReader,
        wallet: &'a mut WalletManager,
        sink: EventSink,
    ) -> Self {
        let gas = GasOracle::new(config.rpc_url.clone(), config.max_gas_gwei);
        Self { config, reader, wallet, gas, sink }
    }

    pub fn operator_address(&self) -> Result<Address> {
        self.wallet.require_operator()
    }

    /// Apply an event to the state and forward it to subscribers
    fn transition(&self, state: &mut OperationState, event: OperationEvent) {
        state.apply(&event);
        self.sink.emit(event);
    }

    /// Fail the operation: record the step, surface the message verbatim.
    fn fail(&self, state: &mut OperationState, step: StepKind, reason: String) -> eyre::Report {
        self.transition(state, OperationEvent::Failed { step, reason: reason.clone() });
        eyre!("{step} step failed: {reason}")
    }

    /// Sign and broadcast one transaction. The caller awaits the receipt
    /// off the returned builder so it can report the hash immediately.
    async fn broadcast(
        &mut self,
        to: Address,
        calldata: Bytes,
        value: U256,
        gas_limit: u64,
    ) -> Result<PendingTransactionBuilder<Ethereum>> {
        let estimate = self.gas.estimate_within_cap().await?;

        let raw = self
            .wallet
            .sign_transaction(
                to,
                calldata,
                value,
                gas_limit,
                estimate.max_fee_per_gas,
                estimate.max_priority_fee_per_gas,
            )
            .await?;

        let provider = ProviderBuilder::new().connect_http(self.config.rpc_url.parse()?);

        let pending = provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| eyre!("{}", e))?;
        debug!("Submitted {:?}", pending.tx_hash());

        Ok(pending)
    }

    /// Sign, submit and await one transaction. Returns the hash and the
    /// receipt status.
    async fn submit_and_confirm(
        &mut self,
        to: Address,
        calldata: Bytes,
        value: U256,
        gas_limit: u64,
    ) -> Result<(B256, bool)> {
        let pending = self.broadcast(to, calldata, value, gas_limit).await?;
        let tx_hash = *pending.tx_hash();

        // No timeout here: confirmation waits on the provider's own
        // behavior. A broadcast transaction cannot be unsent.
        let receipt = pending.get_receipt().await.map_err(|e| eyre!("{}", e))?;

        Ok((tx_hash, receipt.status()))
    }

    /// Wrap native currency if the plan calls for it and a previous attempt
    /// has not already done so.
    async fn wrap_if_needed(&mut self, plan_wrap: U256, state: &mut OperationState) -> Result<()> {
        if plan_wrap.is_zero() || state.wrapped {
            return Ok(());
        }

        let weth = self.config.weth()?;
        info!(
            "Wrapping {} native wei into WETH (shortfall)",
            plan_wrap
        );

        let calldata: Bytes = IWETH9::depositCall {}.abi_encode().into();
        let pending = match self
            .broadcast(weth, calldata, plan_wrap, self.config.wrap_gas_limit)
            .await
        {
            Ok(pending) => pending,
            Err(e) => return Err(self.fail(state, StepKind::Wrap, e.to_string())),
        };

        let hash = *pending.tx_hash();
        self.transition(state, OperationEvent::WrapSubmitted { amount: plan_wrap, hash });

        match pending.get_receipt().await {
            Ok(receipt) if receipt.status() => {
                self.transition(state, OperationEvent::WrapConfirmed { hash });
                Ok(())
            }
            Ok(_) => {
                Err(self.fail(state, StepKind::Wrap, format!("wrap transaction {hash:?} reverted")))
            }
            Err(e) => Err(self.fail(state, StepKind::Wrap, e.to_string())),
        }
    }

    /// Ensure the router can spend `amount` of `token`, approving if the
    /// current allowance is short. Approvals recorded in the state from a
    /// previous attempt are skipped outright.
    async fn ensure_allowance(
        &mut self,
        token: Address,
        amount: U256,
        state: &mut OperationState,
    ) -> Result<()> {
        if state.approved.contains(&token) {
            debug!("Approval for {:?} already confirmed, skipping", token);
            return Ok(());
        }

        let owner = self.wallet.require_operator()?;
        let router = self.config.router()?;

        let allowance = self
            .reader
            .allowance(token, owner, router)
            .await
            .map_err(|e| self.fail(state, StepKind::Approval, e.to_string()))?;

        let sufficient = allowance >= amount;
        self.transition(state, OperationEvent::AllowanceChecked { token, sufficient });

        if sufficient {
            return Ok(());
        }

        info!("Approving router for {} of {:?}", amount, token);
        let calldata: Bytes = IERC20::approveCall { spender: router, amount }.abi_encode().into();

        let pending = match self
            .broadcast(token, calldata, U256::ZERO, self.config.approve_gas_limit)
            .await
        {
            Ok(pending) => pending,
            Err(e) => return Err(self.fail(state, StepKind::Approval, e.to_string())),
        };

        let hash = *pending.tx_hash();
        self.transition(state, OperationEvent::ApprovalSubmitted { token, hash });

        match pending.get_receipt().await {
            Ok(receipt) if receipt.status() => {
                self.transition(state, OperationEvent::ApprovalConfirmed { token, hash });
                Ok(())
            }
            Ok(_) => Err(self.fail(
                state,
                StepKind::Approval,
                format!("approval transaction {hash:?} reverted"),
            )),
            Err(e) => Err(self.fail(state, StepKind::Approval, e.to_string())),
        }
    }

    /// Execute an add-liquidity plan. `state` carries progress across
    /// retries of the same plan.
    pub async fn run_add(&mut self, plan: &AddLiquidityPlan, state: &mut OperationState) -> Result<()> {
        if self.config.execution_mode == ExecutionMode::DryRun {
            info!("📋 DRY RUN: would add liquidity");
            info!("   tokenA {:?}: desired {} min {}", plan.token_a, plan.amount_a_desired, plan.amount_a_min);
            info!("   tokenB {:?}: desired {} min {}", plan.token_b, plan.amount_b_desired, plan.amount_b_min);
            if !plan.wrap_amount.is_zero() {
                info!("   would wrap {} native wei first", plan.wrap_amount);
            }
            return Ok(());
        }

        let operator = self.wallet.require_operator()?;
        self.wallet.update_nonce(&self.config.rpc_url).await?;

        self.transition(state, OperationEvent::Started);

        self.wrap_if_needed(plan.wrap_amount, state).await?;

        // Approvals confirm before the deposit is submitted - no reordering
        self.ensure_allowance(plan.token_a, plan.amount_a_desired, state).await?;
        self.ensure_allowance(plan.token_b, plan.amount_b_desired, state).await?;

        let router = self.config.router()?;
        let calldata: Bytes = IUniswapV2Router02::addLiquidityCall {
            tokenA: plan.token_a,
            tokenB: plan.token_b,
            amountADesired: plan.amount_a_desired,
            amountBDesired: plan.amount_b_desired,
            amountAMin: plan.amount_a_min,
            amountBMin: plan.amount_b_min,
            to: operator,
            deadline: plan.deadline,
        }
        .abi_encode()
        .into();

        self.submit_liquidity(router, calldata, state, "addLiquidity").await
    }

    /// Broadcast and confirm the final liquidity transaction, shared by
    /// add and remove.
    async fn submit_liquidity(
        &mut self,
        router: Address,
        calldata: Bytes,
        state: &mut OperationState,
        label: &str,
    ) -> Result<()> {
        let pending = match self
            .broadcast(router, calldata, U256::ZERO, self.config.liquidity_gas_limit)
            .await
        {
            Ok(pending) => pending,
            Err(e) => return Err(self.fail(state, StepKind::Liquidity, e.to_string())),
        };

        let hash = *pending.tx_hash();
        self.transition(state, OperationEvent::LiquiditySubmitted { hash });

        match pending.get_receipt().await {
            Ok(receipt) if receipt.status() => {
                self.transition(state, OperationEvent::LiquidityConfirmed { hash });
                info!("✓ {} confirmed: {}", label, self.config.explorer_tx_url(&format!("{hash:?}")));
                Ok(())
            }
            Ok(_) => Err(self.fail(
                state,
                StepKind::Liquidity,
                format!("{label} transaction {hash:?} reverted"),
            )),
            Err(e) => Err(self.fail(state, StepKind::Liquidity, e.to_string())),
        }
    }

    /// Execute a remove-liquidity plan.
    pub async fn run_remove(&mut self, plan: &RemoveLiquidityPlan, state: &mut OperationState) -> Result<()> {
        if self.config.execution_mode == ExecutionMode::DryRun {
            info!("📋 DRY RUN: would remove liquidity");
            info!("   pair {:?}: burn {} LP", plan.pair, plan.lp_amount);
            info!("   minimums: {} / {}", plan.amount_a_min, plan.amount_b_min);
            return Ok(());
        }

        let operator = self.wallet.require_operator()?;
        self.wallet.update_nonce(&self.config.rpc_url).await?;

        self.transition(state, OperationEvent::Started);

        // The LP token is the pair contract itself; the router needs an
        // allowance on it to pull and burn the liquidity
        self.ensure_allowance(plan.pair, plan.lp_amount, state).await?;

        let router = self.config.router()?;
        let calldata: Bytes = IUniswapV2Router02::removeLiquidityCall {
            tokenA: plan.token_a,
            tokenB: plan.token_b,
            liquidity: plan.lp_amount,
            amountAMin: plan.amount_a_min,
            amountBMin: plan.amount_b_min,
            to: operator,
            deadline: plan.deadline,
        }
        .abi_encode()
        .into();

        self.submit_liquidity(router, calldata, state, "removeLiquidity").await
    }

    /// Explicit native→wrapped conversion (the `wrap` subcommand).
    pub async fn run_wrap(&mut self, amount: U256) -> Result<B256> {
        if self.config.execution_mode == ExecutionMode::DryRun {
            info!("📋 DRY RUN: would wrap {} native wei", amount);
            return Ok(B256::ZERO);
        }

        self.wallet.require_operator()?;
        self.wallet.update_nonce(&self.config.rpc_url).await?;

        let weth = self.config.weth()?;
        let calldata: Bytes = IWETH9::depositCall {}.abi_encode().into();

        let (hash, ok) = self
            .submit_and_confirm(weth, calldata, amount, self.config.wrap_gas_limit)
            .await?;

        if !ok {
            warn!("Wrap transaction {:?} reverted", hash);
            return Err(eyre!("wrap transaction {hash:?} reverted"));
        }

        Ok(hash)
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{TokenInfo, WETH_MAINNET};
    use std::str::FromStr;

    fn u(x: u64) -> U256 {
        U256::from(x)
    }

    fn token_info(address: Address, symbol: &str, balance: u64, is_weth: bool, eth: Option<u64>) -> TokenInfo {
        TokenInfo {
            address,
            symbol: symbol.into(),
            name: symbol.into(),
            decimals: 18,
            balance: u(balance),
            is_weth,
            eth_balance: eth.map(u),
        }
    }

    fn pool(reserve0: u64, reserve1: u64, bal0: u64, bal1: u64, weth_native: Option<u64>) -> PoolInfo {
        let usdc = Address::from_str("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        let weth = Address::from_str(WETH_MAINNET).unwrap();
        let (token0, token1) = crate::math::sort_tokens(usdc, weth);
        PoolInfo {
            address: Address::from_str("0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc").unwrap(),
            token0,
            token1,
            reserve0: u(reserve0),
            reserve1: u(reserve1),
            total_supply: u(100),
            token0_info: token_info(token0, "USDC", bal0, false, None),
            token1_info: token_info(token1, "WETH", bal1, true, weth_native),
        }
    }

    #[test]
    fn test_plan_add_quotes_second_side() {
        let p = pool(1000, 2000, 10_000, 10_000, None);
        let plan = plan_add(&p, p.token0, u(100), None, 50, u(999)).unwrap();

        assert_eq!(plan.amount_b_desired, u(200)); // 1:2 ratio preserved
        assert_eq!(plan.amount_a_min, u(99)); // 0.5% off 100, floored
        assert_eq!(plan.amount_b_min, u(199));
        assert_eq!(plan.wrap_amount, U256::ZERO);
    }

    #[test]
    fn test_plan_add_order_invariant() {
        let p = pool(1000, 2000, 10_000, 10_000, None);

        // Requesting from the token1 side quotes the token0 side
        let plan = plan_add(&p, p.token1, u(200), None, 0, u(999)).unwrap();
        assert_eq!(plan.amount_b_desired, u(100));
    }

    #[test]
    fn test_plan_add_uninitialized_requires_both_amounts() {
        let p = pool(0, 0, 10_000, 10_000, None);

        assert!(plan_add(&p, p.token0, u(100), None, 50, u(999)).is_err());

        // First provider sets the price; no ratio enforcement
        let plan = plan_add(&p, p.token0, u(100), Some(u(12345)), 50, u(999)).unwrap();
        assert_eq!(plan.amount_b_desired, u(12345));
    }

    #[test]
    fn test_plan_add_rejects_explicit_amount_on_initialized_pool() {
        let p = pool(1000, 2000, 10_000, 10_000, None);
        assert!(plan_add(&p, p.token0, u(100), Some(u(500)), 50, u(999)).is_err());
    }

    #[test]
    fn test_plan_add_insufficient_balance() {
        let p = pool(1000, 2000, 50, 10_000, None);
        let err = plan_add(&p, p.token0, u(100), None, 50, u(999)).unwrap_err();
        assert!(err.to_string().contains("insufficient"));
    }

    #[test]
    fn test_plan_add_weth_shortfall_wraps_exactly() {
        // Need 200 WETH-side, hold 150 wrapped + 100 native: wrap exactly 50
        let p = pool(1000, 2000, 10_000, 150, Some(100));
        let plan = plan_add(&p, p.token0, u(100), None, 50, u(999)).unwrap();
        assert_eq!(plan.wrap_amount, u(50));
    }

    #[test]
    fn test_plan_add_weth_shortfall_native_cannot_cover() {
        // Need 200, hold 150 wrapped + 10 native: hard insufficient
        let p = pool(1000, 2000, 10_000, 150, Some(10));
        assert!(plan_add(&p, p.token0, u(100), None, 50, u(999)).is_err());
    }

    #[test]
    fn test_plan_add_rejects_zero_amount() {
        let p = pool(1000, 2000, 10_000, 10_000, None);
        assert!(plan_add(&p, p.token0, U256::ZERO, None, 50, u(999)).is_err());
    }

    #[test]
    fn test_plan_add_rejects_foreign_token() {
        let p = pool(1000, 2000, 10_000, 10_000, None);
        assert!(plan_add(&p, Address::ZERO, u(100), None, 50, u(999)).is_err());
    }

    #[test]
    fn test_plan_remove_quotes_and_minimums() {
        let p = pool(1000, 2000, 0, 0, None);
        let plan = plan_remove(&p, u(50), u(60), 0, u(999)).unwrap();

        // 50 of 100 supply: half of each reserve, zero slippage
        assert_eq!(plan.amount_a_min, u(500));
        assert_eq!(plan.amount_b_min, u(1000));
        assert_eq!(plan.pair, p.address);
    }

    #[test]
    fn test_plan_remove_rejects_excess_lp() {
        let p = pool(1000, 2000, 0, 0, None);
        assert!(plan_remove(&p, u(50), u(49), 0, u(999)).is_err());
    }

    #[test]
    fn test_plan_remove_zero_supply() {
        let mut p = pool(1000, 2000, 0, 0, None);
        p.total_supply = U256::ZERO;
        assert!(plan_remove(&p, u(50), u(60), 0, u(999)).is_err());
    }

    #[test]
    fn test_deadline_is_in_the_future() {
        let deadline = deadline_from_now(1200);
        assert!(deadline > U256::from(Utc::now().timestamp() as u64));
    }
}
