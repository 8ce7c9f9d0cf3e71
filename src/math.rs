//! Liquidity Math - Exact Integer AMM Arithmetic
//!
//! Pure functions implementing the Uniswap V2 proportional-amount formulas:
//! - quote the second-side deposit amount from pool reserves
//! - quote withdrawal amounts from an LP burn
//! - apply a basis-point slippage tolerance to produce on-chain minimums
//!
//! Everything here is exact U256 integer math. Floating point would silently
//! corrupt amounts at token-unit scale (18 decimals), so it is never used.

use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Basis-point denominator (10000 bps = 100%)
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Why a quote could not be produced.
///
/// These are precondition signals, not panics: a zero-reserve pool is a
/// legitimate state (brand-new pair before the first mint) and callers
/// render it as informational, not as an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QuoteError {
    /// One of the reserves (or the LP total supply) is zero. There is no
    /// ratio to quote against - the first liquidity provider sets the price.
    #[error("pool is uninitialized (zero reserve or supply) - no ratio available")]
    UninitializedPool,

    /// The input was positive but the floor division produced zero.
    /// Proceeding would deposit one side for free.
    #[error("amount too small - quote rounds down to zero")]
    AmountTooSmall,

    /// Intermediate product exceeded 256 bits. Reserves fit in 112 bits so
    /// this only happens for absurd caller inputs, but it must not wrap.
    #[error("arithmetic overflow in quote")]
    Overflow,
}

/// Quote the second-side amount for a proportional deposit.
///
/// `other = floor(known * reserve_other / reserve_known)`
///
/// Both reserves must be positive; otherwise the pool has no ratio and the
/// caller gets [`QuoteError::UninitializedPool`] rather than a 0/0.
pub fn quote_deposit(known: U256, reserve_known: U256, reserve_other: U256) -> Result<U256, QuoteError> {
    if reserve_known.is_zero() || reserve_other.is_zero() {
        return Err(QuoteError::UninitializedPool);
    }
    if known.is_zero() {
        return Ok(U256::ZERO);
    }

    let product = known.checked_mul(reserve_other).ok_or(QuoteError::Overflow)?;
    let other = product / reserve_known;

    if other.is_zero() {
        // Positive input rounded to nothing - reject instead of quoting 0.
        return Err(QuoteError::AmountTooSmall);
    }

    Ok(other)
}

/// Quote the token amount returned for burning `lp_amount` LP tokens.
///
/// `token = floor(lp_amount * reserve / total_supply)`
pub fn quote_withdrawal(lp_amount: U256, reserve: U256, total_supply: U256) -> Result<U256, QuoteError> {
    if total_supply.is_zero() {
        return Err(QuoteError::UninitializedPool);
    }

    let product = lp_amount.checked_mul(reserve).ok_or(QuoteError::Overflow)?;
    Ok(product / total_supply)
}

/// Apply a slippage tolerance, producing the minimum amount to enforce
/// on-chain.
///
/// `minimum = floor(amount * (10000 - bps) / 10000)`
///
/// A tolerance of 0 bps is the identity; 10000 bps (or more - the value is
/// clamped) zeroes the minimum.
pub fn apply_slippage(amount: U256, tolerance_bps: u64) -> U256 {
    let bps = tolerance_bps.min(BPS_DENOMINATOR);
    let keep = U256::from(BPS_DENOMINATOR - bps);

    // amount fits in 112 bits for any real pool; the clamp keeps the
    // multiplier under 14 bits, so this cannot overflow for sane inputs.
    // Saturate rather than wrap for adversarial ones.
    let product = amount.checked_mul(keep).unwrap_or(U256::MAX);
    product / U256::from(BPS_DENOMINATOR)
}

/// Canonical Uniswap V2 pair ordering: token0 is the numerically lower
/// address. Returns (token0, token1).
pub fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a < b { (a, b) } else { (b, a) }
}

/// Orient a pool's canonical (reserve0, reserve1) to the caller's
/// (token_a, token_b) request order.
///
/// Returns (reserve_a, reserve_b) so that quoting is invariant under
/// swapping which token the caller names first.
pub fn oriented_reserves(
    token0: Address,
    reserve0: U256,
    reserve1: U256,
    token_a: Address,
) -> (U256, U256) {
    if token_a == token0 {
        (reserve0, reserve1)
    } else {
        (reserve1, reserve0)
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn u(x: u64) -> U256 {
        U256::from(x)
    }

    #[test]
    fn test_deposit_exact_ratio() {
        // reserves 1000:2000, deposit 100 -> exactly 200, no remainder
        let quoted = quote_deposit(u(100), u(1000), u(2000)).unwrap();
        assert_eq!(quoted, u(200));
    }

    #[test]
    fn test_deposit_floors() {
        // 7 * 10 / 3 = 23.33.. -> 23
        let quoted = quote_deposit(u(7), u(3), u(10)).unwrap();
        assert_eq!(quoted, u(23));
    }

    #[test]
    fn test_deposit_uninitialized_pool() {
        assert_eq!(quote_deposit(u(100), u(0), u(0)), Err(QuoteError::UninitializedPool));
        assert_eq!(quote_deposit(u(100), u(0), u(500)), Err(QuoteError::UninitializedPool));
        assert_eq!(quote_deposit(u(100), u(500), u(0)), Err(QuoteError::UninitializedPool));
    }

    #[test]
    fn test_deposit_underflow_is_an_error() {
        // 1 * 1 / 1000000 floors to zero -> must be rejected, not quoted
        assert_eq!(quote_deposit(u(1), u(1_000_000), u(1)), Err(QuoteError::AmountTooSmall));
    }

    #[test]
    fn test_deposit_zero_input_is_zero() {
        assert_eq!(quote_deposit(u(0), u(1000), u(2000)).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_deposit_round_trip_never_inflates() {
        // quote_deposit(quote_deposit(a, rA, rB), rB, rA) <= a for floors
        let cases = [
            (100u64, 1000u64, 2000u64),
            (333, 997, 31),
            (1, 3, 7),
            (123_456, 999_999, 777_777),
            (50_000, 12, 34),
        ];
        for (a, ra, rb) in cases {
            let fwd = match quote_deposit(u(a), u(ra), u(rb)) {
                Ok(v) => v,
                Err(QuoteError::AmountTooSmall) => continue,
                Err(e) => panic!("unexpected error: {e}"),
            };
            let back = match quote_deposit(fwd, u(rb), u(ra)) {
                Ok(v) => v,
                Err(QuoteError::AmountTooSmall) => continue,
                Err(e) => panic!("unexpected error: {e}"),
            };
            assert!(back <= u(a), "round trip inflated: {a} {ra} {rb} -> {back}");
        }
    }

    #[test]
    fn test_deposit_overflow_checked() {
        let result = quote_deposit(U256::MAX, u(1), U256::MAX);
        assert_eq!(result, Err(QuoteError::Overflow));
    }

    #[test]
    fn test_withdrawal_exact() {
        // burn 50 of 100 supply against reserve 1000 -> exactly 500
        assert_eq!(quote_withdrawal(u(50), u(1000), u(100)).unwrap(), u(500));
    }

    #[test]
    fn test_withdrawal_full_supply_returns_reserve() {
        assert_eq!(quote_withdrawal(u(100), u(1000), u(100)).unwrap(), u(1000));

        // Not evenly divisible: remainder stays bounded by totalSupply - 1
        let supply = u(7);
        let reserve = u(1000);
        let out = quote_withdrawal(supply, reserve, supply).unwrap();
        assert!(reserve - out < supply);
        assert_eq!(out, reserve); // full burn always gets the whole reserve
    }

    #[test]
    fn test_withdrawal_zero_supply() {
        assert_eq!(quote_withdrawal(u(10), u(1000), u(0)), Err(QuoteError::UninitializedPool));
    }

    #[test]
    fn test_slippage_identities() {
        let amount = u(123_456_789);
        assert_eq!(apply_slippage(amount, 0), amount);
        assert_eq!(apply_slippage(amount, BPS_DENOMINATOR), U256::ZERO);
        // clamped above 100%
        assert_eq!(apply_slippage(amount, 50_000), U256::ZERO);
    }

    #[test]
    fn test_slippage_half_percent() {
        // 50 bps off 10000 -> 9950
        assert_eq!(apply_slippage(u(10_000), 50), u(9_950));
        // floors, never rounds up
        assert_eq!(apply_slippage(u(999), 50), u(994)); // 999 * 9950 / 10000 = 994.005
    }

    #[test]
    fn test_sort_tokens() {
        let a = Address::from_str("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        let b = Address::from_str("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2").unwrap();
        assert_eq!(sort_tokens(a, b), (a, b));
        assert_eq!(sort_tokens(b, a), (a, b));
    }

    #[test]
    fn test_orientation_invariance() {
        let t0 = Address::from_str("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        let t1 = Address::from_str("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2").unwrap();
        let (r0, r1) = (u(1000), u(2000));

        // Requesting (t0, t1) and (t1, t0) must describe the same pool
        let (ra, rb) = oriented_reserves(t0, r0, r1, t0);
        let quote_ab = quote_deposit(u(100), ra, rb).unwrap();

        let (ra2, rb2) = oriented_reserves(t0, r0, r1, t1);
        let quote_ba = quote_deposit(quote_ab, ra2, rb2).unwrap();

        assert_eq!(quote_ab, u(200));
        assert!(quote_ba <= u(100));
    }
}
