use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::warn;

use crate::types::RawAmount;

/// NEAR (and wrapped NEAR) precision
pub const NATIVE_DECIMALS: u32 = 24;

/// Precision assumed for any token nothing else is known about
pub const DEFAULT_DECIMALS: u32 = 18;

/// Decimal keeps at most 28 significant digits without overflowing its mantissa
const MAX_SIGNIFICANT_DIGITS: usize = 28;

const BRIDGE_SUFFIX: &str = ".factory.bridge.near";

/// Bridged Ethereum assets whose precision differs from the bridge default
const BRIDGED_EXCEPTIONS: &[(&str, u32)] = &[
    ("dac17f958d2ee523a2206206994597c13d831ec7", 6), // USDT
    ("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", 6), // USDC
    ("2260fac5e5542a773aa44fbcfedf7c193bc2c599", 8), // WBTC
];

/// Naming conventions used by meme launchpads and generic token factories
const TOKEN_NAMING_HINTS: &[&str] = &["meme-cooking", ".tkn.", "token."];

const BUILTIN_DECIMALS: &[(&str, u32)] = &[
    ("dac17f958d2ee523a2206206994597c13d831ec7.factory.bridge.near", 6),
    ("usdt.tether-token.near", 6),
    ("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.factory.bridge.near", 6),
    ("17208628f84f5d6ad33f0da3bbbeb27ffcb398eac501a31bd6ad2011e36133a1", 18),
    ("wrap.near", 24),
    ("token.v2.ref-finance.near", 18),
    ("token.burrow.near", 9),
    ("meta-pool.near", 24),
    ("token.skyward.near", 18),
    ("token.pembrock.near", 18),
    ("2260fac5e5542a773aa44fbcfedf7c193bc2c599.factory.bridge.near", 8),
    ("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2.factory.bridge.near", 18),
    ("eth.bridge.near", 18),
    ("aurora", 18),
    ("token.paras.near", 18),
    ("game.hot.tg", 6),
    ("harvest-moon.near", 6),
    ("aa-harvest-moon.near", 9),
    ("token.0xshitzu.near", 18),
    ("pre.meteor-token.near", 9),
    ("meteor-points.near", 9),
    ("token.rhealab.near", 9),
    ("lst.rhealab.near", 24),
    ("token.lonkingnearbackto2024.near", 18),
    ("dd.tg", 18),
    ("benthedog.near", 18),
];

/// Contract → decimals lookup with heuristic fallback
#[derive(Debug, Clone)]
pub struct DecimalsTable {
    entries: HashMap<String, u32>,
    wrapped_native: String,
}

impl Default for DecimalsTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DecimalsTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_DECIMALS
                .iter()
                .map(|(contract, decimals)| (contract.to_string(), *decimals))
                .collect(),
            wrapped_native: "wrap.near".to_string(),
        }
    }

    /// Overrides replace built-in entries for the same contract
    pub fn with_overrides(mut self, overrides: &HashMap<String, u32>) -> Self {
        for (contract, decimals) in overrides {
            self.entries.insert(contract.clone(), *decimals);
        }
        self
    }

    pub fn with_wrapped_native(mut self, contract: &str) -> Self {
        self.wrapped_native = contract.to_lowercase();
        self
    }

    /// Decimals for a contract: exact entry, lower-cased entry, heuristics, then 18
    pub fn resolve(&self, contract_id: &str) -> u32 {
        if let Some(decimals) = self.entries.get(contract_id) {
            return *decimals;
        }

        let lower = contract_id.to_lowercase();
        if let Some(decimals) = self.entries.get(&lower) {
            return *decimals;
        }

        self.heuristic(&lower).unwrap_or(DEFAULT_DECIMALS)
    }

    fn heuristic(&self, lower: &str) -> Option<u32> {
        if lower == self.wrapped_native {
            return Some(NATIVE_DECIMALS);
        }

        if let Some(address) = lower.strip_suffix(BRIDGE_SUFFIX) {
            let decimals = BRIDGED_EXCEPTIONS
                .iter()
                .find(|(known, _)| *known == address)
                .map(|(_, decimals)| *decimals)
                .unwrap_or(DEFAULT_DECIMALS);
            return Some(decimals);
        }

        if TOKEN_NAMING_HINTS.iter().any(|hint| lower.contains(hint)) {
            return Some(DEFAULT_DECIMALS);
        }

        None
    }

    /// `raw / 10^decimals(contract)`; unparsed amounts normalize to zero
    pub fn normalize(&self, contract_id: &str, raw: &RawAmount) -> Decimal {
        match raw.digits() {
            Some(digits) => scale_digits(digits, self.resolve(contract_id)),
            None => Decimal::ZERO,
        }
    }
}

/// Yocto-NEAR to NEAR
pub fn yocto_to_near(raw: &RawAmount) -> Decimal {
    match raw.digits() {
        Some(digits) => scale_digits(digits, NATIVE_DECIMALS),
        None => Decimal::ZERO,
    }
}

/// Same as `yocto_to_near` for optional fields
pub fn optional_yocto_to_near(raw: Option<&RawAmount>) -> Decimal {
    raw.map(yocto_to_near).unwrap_or(Decimal::ZERO)
}

/// Place the decimal point `decimals` digits from the right of an integer string.
///
/// Works on the string so 10^24-scale amounts never pass through a float.
/// Fraction digits past Decimal's precision are truncated.
pub fn scale_digits(digits: &str, decimals: u32) -> Decimal {
    let decimals = decimals as usize;
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Decimal::ZERO;
    }

    let (integer, fraction) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{}{}", "0".repeat(decimals - digits.len()), digits))
    };

    let significant_integer = integer.trim_start_matches('0').len();
    let max_fraction = MAX_SIGNIFICANT_DIGITS.saturating_sub(significant_integer);
    let fraction = fraction.trim_end_matches('0');
    let fraction = &fraction[..fraction.len().min(max_fraction)];

    let text = if fraction.is_empty() {
        integer
    } else {
        format!("{}.{}", integer, fraction)
    };

    Decimal::from_str(&text).unwrap_or_else(|e| {
        warn!("Amount {} out of decimal range ({}), saturating", text, e);
        Decimal::MAX
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str) -> RawAmount {
        RawAmount::parse(text)
    }

    #[test]
    fn test_unknown_token_defaults_to_18() {
        let table = DecimalsTable::builtin();
        assert_eq!(table.resolve("token.zzz.near"), 18);
        assert_eq!(
            table.normalize("token.zzz.near", &raw("2500000000000000000")),
            Decimal::from_str("2.5").unwrap()
        );
        assert_eq!(table.resolve("completely-unknown.near"), 18);
    }

    #[test]
    fn test_table_lookup_then_lowercase() {
        let table = DecimalsTable::builtin();
        assert_eq!(table.resolve("usdt.tether-token.near"), 6);
        assert_eq!(table.resolve("USDT.Tether-Token.near"), 6);
        assert_eq!(table.resolve("token.burrow.near"), 9);
    }

    #[test]
    fn test_bridge_heuristics() {
        let table = DecimalsTable {
            entries: HashMap::new(),
            wrapped_native: "wrap.near".to_string(),
        };
        assert_eq!(
            table.resolve("dac17f958d2ee523a2206206994597c13d831ec7.factory.bridge.near"),
            6
        );
        assert_eq!(
            table.resolve("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.factory.bridge.near"),
            6
        );
        assert_eq!(
            table.resolve("2260fac5e5542a773aa44fbcfedf7c193bc2c599.factory.bridge.near"),
            8
        );
        assert_eq!(
            table.resolve("6b175474e89094c44da98b954eedeac495271d0f.factory.bridge.near"),
            18
        );
        assert_eq!(table.resolve("wrap.near"), 24);
        assert_eq!(table.resolve("lonk-1.meme-cooking.near"), 18);
    }

    #[test]
    fn test_overrides_win() {
        let mut overrides = HashMap::new();
        overrides.insert("token.burrow.near".to_string(), 12);
        let table = DecimalsTable::builtin().with_overrides(&overrides);
        assert_eq!(table.resolve("token.burrow.near"), 12);
    }

    #[test]
    fn test_yocto_conversion() {
        assert_eq!(yocto_to_near(&raw("2000000000000000000000000")), Decimal::from(2));
        assert_eq!(
            yocto_to_near(&raw("1")),
            Decimal::from_str("0.000000000000000000000001").unwrap()
        );
        assert_eq!(yocto_to_near(&raw("0")), Decimal::ZERO);
        assert_eq!(yocto_to_near(&RawAmount::Unparsed("n/a".to_string())), Decimal::ZERO);
    }

    #[test]
    fn test_large_amounts_do_not_overflow() {
        // 10 million NEAR in yocto
        let amount = yocto_to_near(&raw("10000000000000000000000000000000"));
        assert_eq!(amount, Decimal::from(10_000_000));

        let with_fraction = yocto_to_near(&raw("12345678901234567890123456789012"));
        assert!(with_fraction > Decimal::from(12_345_678));
        assert!(with_fraction < Decimal::from(12_345_679));
    }

    #[test]
    fn test_normalization_is_monotonic() {
        let table = DecimalsTable::builtin();
        for (contract, amount) in [
            ("token.zzz.near", "2500000000000000000"),
            ("usdt.tether-token.near", "1234567"),
            ("wrap.near", "5000000000000000000000000"),
            ("token.burrow.near", "999"),
        ] {
            let single = table.normalize(contract, &raw(amount));
            let doubled_raw = (amount.parse::<u128>().unwrap() * 2).to_string();
            let doubled = table.normalize(contract, &raw(&doubled_raw));
            assert_eq!(doubled, single * Decimal::from(2), "contract {}", contract);
        }
    }
}
