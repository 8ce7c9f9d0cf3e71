//! Token definitions and unit formatting
//!
//! Holds:
//! - `TokenInfo`: per-token metadata + balances as read from chain
//! - a small table of well-known mainnet tokens used as a decimals/symbol
//!   fallback when an ERC-20 reverts on the optional metadata calls
//! - exact decimal-string <-> smallest-unit conversion (`format_units`,
//!   `parse_units`)

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use std::str::FromStr;

/// Mainnet WETH - the canonical wrapped-native token
pub const WETH_MAINNET: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";

/// Metadata and balances for one ERC-20 token as seen by one owner.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,

    /// ERC-20 balance of the querying owner, smallest units
    pub balance: U256,

    /// True when this token is the configured wrapped-native token
    pub is_weth: bool,

    /// Native-currency balance, populated only when `is_weth` - the
    /// spendable total for WETH is `balance + eth_balance` (wrap on demand)
    pub eth_balance: Option<U256>,
}

impl TokenInfo {
    /// Total amount spendable as this token, counting native currency that
    /// could be wrapped when this is the wrapped-native token.
    pub fn spendable(&self) -> U256 {
        self.balance.saturating_add(self.eth_balance.unwrap_or(U256::ZERO))
    }

    /// Human-readable balance string
    pub fn formatted_balance(&self) -> String {
        format_units(self.balance, self.decimals)
    }
}

/// A well-known token entry (fallback metadata)
#[derive(Debug, Clone)]
pub struct KnownToken {
    pub symbol: &'static str,
    pub address: &'static str,
    pub decimals: u8,
}

/// Well-known mainnet tokens. Used when an ERC-20's optional
/// symbol()/decimals() calls fail, and by the `balances` subcommand.
pub fn known_tokens() -> Vec<KnownToken> {
    vec![
        KnownToken { symbol: "WETH", address: WETH_MAINNET, decimals: 18 },
        KnownToken { symbol: "USDC", address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", decimals: 6 },
        KnownToken { symbol: "USDT", address: "0xdAC17F958D2ee523a2206206994597C13D831ec7", decimals: 6 },
        KnownToken { symbol: "DAI", address: "0x6B175474E89094C44Da98b954EedeAC495271d0F", decimals: 18 },
        KnownToken { symbol: "WBTC", address: "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599", decimals: 8 },
        KnownToken { symbol: "LINK", address: "0x514910771AF9Ca656af840dff83E8264EcF986CA", decimals: 18 },
        KnownToken { symbol: "UNI", address: "0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984", decimals: 18 },
    ]
}

/// Symbol lookup map keyed by address
pub fn known_symbols() -> HashMap<Address, &'static str> {
    known_tokens()
        .into_iter()
        .filter_map(|t| Address::from_str(t.address).ok().map(|a| (a, t.symbol)))
        .collect()
}

/// Fallback decimals for a known token, default 18
pub fn known_decimals(address: &Address) -> u8 {
    for t in known_tokens() {
        if Address::from_str(t.address).ok().as_ref() == Some(address) {
            return t.decimals;
        }
    }
    18
}

/// Short display form for a token address: symbol if known, else 0xabcdef...
pub fn display_token(address: &Address, symbols: &HashMap<Address, &str>) -> String {
    if let Some(symbol) = symbols.get(address) {
        symbol.to_string()
    } else {
        format!("0x{}...", &format!("{:?}", address)[2..8])
    }
}

// ============================================
// UNIT CONVERSION
// ============================================

/// Format a smallest-unit amount as a decimal string.
///
/// Exact: the fractional part is the true remainder with trailing zeros
/// trimmed. `format_units(1500000, 6) == "1.5"`.
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }

    let scale = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / scale;
    let frac = amount % scale;

    if frac.is_zero() {
        return whole.to_string();
    }

    let frac_str = format!("{:0>width$}", frac, width = decimals as usize);
    let trimmed = frac_str.trim_end_matches('0');
    format!("{}.{}", whole, trimmed)
}

/// Parse a decimal string into smallest units.
///
/// Rejects negative signs, more fractional digits than the token carries,
/// and anything non-numeric.
pub fn parse_units(value: &str, decimals: u8) -> eyre::Result<U256> {
    let value = value.trim();
    if value.is_empty() {
        return Err(eyre::eyre!("empty amount"));
    }
    if value.starts_with('-') {
        return Err(eyre::eyre!("negative amounts are not valid: {value}"));
    }

    let (whole_str, frac_str) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };

    if frac_str.len() > decimals as usize {
        return Err(eyre::eyre!(
            "amount {value} has more than {decimals} fractional digits"
        ));
    }

    let whole: U256 = if whole_str.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole_str, 10)
            .map_err(|_| eyre::eyre!("invalid amount: {value}"))?
    };

    let frac: U256 = if frac_str.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{:0<width$}", frac_str, width = decimals as usize);
        U256::from_str_radix(&padded, 10)
            .map_err(|_| eyre::eyre!("invalid amount: {value}"))?
    };

    let scale = U256::from(10u64).pow(U256::from(decimals));
    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| eyre::eyre!("amount {value} overflows"))
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(1_000_000u64), 6), "1");
        assert_eq!(format_units(U256::from(1u64), 6), "0.000001");
        assert_eq!(format_units(U256::ZERO, 18), "0");
        assert_eq!(format_units(U256::from(42u64), 0), "42");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_units("1", 6).unwrap(), U256::from(1_000_000u64));
        assert_eq!(parse_units("0.000001", 6).unwrap(), U256::from(1u64));
        assert_eq!(parse_units(".5", 2).unwrap(), U256::from(50u64));
    }

    #[test]
    fn test_parse_units_rejects_bad_input() {
        assert!(parse_units("-1", 6).is_err());
        assert!(parse_units("1.2345678", 6).is_err()); // too many digits
        assert!(parse_units("abc", 6).is_err());
        assert!(parse_units("", 6).is_err());
    }

    #[test]
    fn test_parse_format_round_trip() {
        for s in ["1.5", "0.000000001", "123456.789", "7"] {
            let parsed = parse_units(s, 9).unwrap();
            assert_eq!(format_units(parsed, 9), s);
        }
    }

    #[test]
    fn test_spendable_sums_native_for_weth() {
        let info = TokenInfo {
            address: Address::from_str(WETH_MAINNET).unwrap(),
            symbol: "WETH".into(),
            name: "Wrapped Ether".into(),
            decimals: 18,
            balance: U256::from(100u64),
            is_weth: true,
            eth_balance: Some(U256::from(50u64)),
        };
        assert_eq!(info.spendable(), U256::from(150u64));
    }

    #[test]
    fn test_known_decimals() {
        let usdc = Address::from_str("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        assert_eq!(known_decimals(&usdc), 6);
        assert_eq!(known_decimals(&Address::ZERO), 18);
    }
}
