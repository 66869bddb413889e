//! Contract-name recognizers.
//!
//! Protocol, DEX and token-naming knowledge lives in one ordered table so new
//! protocols are a data change. Lookups are case-insensitive substring tests;
//! within a hint family the first table entry that matches any contract wins.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a token contract name encodes its symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenConvention {
    /// `token.<symbol>.<...>`: symbol is the second dot segment
    MethodPrefixed,
    /// `<symbol>-<n>.meme-cooking.near`: symbol is the hyphen prefix of the first segment
    MemeCooking,
    /// `<symbol>.tkn.near`: symbol is the first segment
    TknFactory,
    /// `<symbol>.<...>token.<...>`: symbol is the first segment
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternHint {
    Claim { protocol: String, icon: String },
    Dex { venue: String },
    Token(TokenConvention),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractPattern {
    pub needle: String,
    pub hint: PatternHint,
}

impl ContractPattern {
    fn new(needle: &str, hint: PatternHint) -> Self {
        Self {
            needle: needle.to_lowercase(),
            hint,
        }
    }

    pub fn matches(&self, contract: &str) -> bool {
        contract.to_lowercase().contains(&self.needle)
    }
}

/// Icon for reward protocols without one of their own
const DEFAULT_CLAIM_ICON: &str = "🎁";

/// Display symbols for contracts whose names do not carry one
const KNOWN_SYMBOLS: &[(&str, &str)] = &[
    ("wrap.near", "wNEAR"),
    ("usdt.tether-token.near", "USDT"),
    ("dac17f958d2ee523a2206206994597c13d831ec7.factory.bridge.near", "USDT.e"),
    ("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.factory.bridge.near", "USDC.e"),
    ("2260fac5e5542a773aa44fbcfedf7c193bc2c599.factory.bridge.near", "WBTC"),
    ("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2.factory.bridge.near", "WETH"),
    ("17208628f84f5d6ad33f0da3bbbeb27ffcb398eac501a31bd6ad2011e36133a1", "USDC"),
    ("game.hot.tg", "HOT"),
    ("meta-pool.near", "stNEAR"),
];

#[derive(Debug, Clone)]
pub struct PatternTable {
    patterns: Vec<ContractPattern>,
    wrapped_native: String,
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PatternTable {
    pub fn builtin() -> Self {
        let claim = |protocol: &str, icon: &str| PatternHint::Claim {
            protocol: protocol.to_string(),
            icon: icon.to_string(),
        };
        let dex = |venue: &str| PatternHint::Dex {
            venue: venue.to_string(),
        };

        Self {
            patterns: vec![
                ContractPattern::new("hot.tg", claim("HOT", "🔥")),
                ContractPattern::new("harvest-moon", claim("MOON", DEFAULT_CLAIM_ICON)),
                ContractPattern::new("meteor", claim("Meteor", DEFAULT_CLAIM_ICON)),
                ContractPattern::new("ref-finance", dex("Ref Finance")),
                ContractPattern::new("rhea", dex("RHEA")),
                ContractPattern::new("meme-cooking", PatternHint::Token(TokenConvention::MemeCooking)),
                ContractPattern::new(".tkn.", PatternHint::Token(TokenConvention::TknFactory)),
                ContractPattern::new("token.", PatternHint::Token(TokenConvention::Generic)),
            ],
            wrapped_native: "wrap.near".to_string(),
        }
    }

    pub fn with_wrapped_native(mut self, contract: &str) -> Self {
        self.wrapped_native = contract.to_lowercase();
        self
    }

    /// Add a reward protocol after the existing ones
    pub fn with_claim(self, needle: &str, protocol: &str) -> Self {
        self.insert_after_family(ContractPattern::new(
            needle,
            PatternHint::Claim {
                protocol: protocol.to_string(),
                icon: DEFAULT_CLAIM_ICON.to_string(),
            },
        ))
    }

    /// Add a DEX after the existing ones
    pub fn with_dex(self, needle: &str, venue: &str) -> Self {
        self.insert_after_family(ContractPattern::new(
            needle,
            PatternHint::Dex {
                venue: venue.to_string(),
            },
        ))
    }

    /// Extra claim and DEX patterns, inserted in needle order so runs are reproducible
    pub fn with_extra(
        self,
        claims: &HashMap<String, String>,
        dexes: &HashMap<String, String>,
    ) -> Self {
        let mut claims: Vec<_> = claims.iter().collect();
        claims.sort();
        let mut dexes: Vec<_> = dexes.iter().collect();
        dexes.sort();

        let table = claims
            .into_iter()
            .fold(self, |table, (needle, protocol)| table.with_claim(needle, protocol));
        dexes
            .into_iter()
            .fold(table, |table, (needle, venue)| table.with_dex(needle, venue))
    }

    fn insert_after_family(mut self, pattern: ContractPattern) -> Self {
        let same_family = |existing: &ContractPattern| {
            std::mem::discriminant(&existing.hint) == std::mem::discriminant(&pattern.hint)
        };
        let position = self
            .patterns
            .iter()
            .rposition(same_family)
            .map(|index| index + 1)
            .unwrap_or(self.patterns.len());
        self.patterns.insert(position, pattern);
        self
    }

    pub fn patterns(&self) -> &[ContractPattern] {
        &self.patterns
    }

    pub fn wrapped_native(&self) -> &str {
        &self.wrapped_native
    }

    pub fn is_wrapped_native(&self, contract: &str) -> bool {
        contract.eq_ignore_ascii_case(&self.wrapped_native)
    }

    /// Protocol and icon of the first claim pattern matched by any contract
    pub fn claim_protocol(&self, contracts: &[String]) -> Option<(&str, &str)> {
        self.patterns.iter().find_map(|pattern| match &pattern.hint {
            PatternHint::Claim { protocol, icon } if contracts.iter().any(|c| pattern.matches(c)) => {
                Some((protocol.as_str(), icon.as_str()))
            }
            _ => None,
        })
    }

    /// Venue of the first DEX pattern matched by any contract
    pub fn dex_venue(&self, contracts: &[String]) -> Option<&str> {
        self.patterns.iter().find_map(|pattern| match &pattern.hint {
            PatternHint::Dex { venue } if contracts.iter().any(|c| pattern.matches(c)) => {
                Some(venue.as_str())
            }
            _ => None,
        })
    }

    /// Naming convention of a single contract, if it looks like a token
    pub fn token_convention(&self, contract: &str) -> Option<TokenConvention> {
        let convention = self.patterns.iter().find_map(|pattern| match pattern.hint {
            PatternHint::Token(convention) if pattern.matches(contract) => Some(convention),
            _ => None,
        })?;

        let lower = contract.to_lowercase();
        let segments: Vec<&str> = lower.split('.').collect();
        if segments[0] == "token" && segments.len() >= 3 {
            return Some(TokenConvention::MethodPrefixed);
        }
        Some(convention)
    }

    /// First contract (in the given order) that follows a token naming convention
    pub fn token_contract<'a>(
        &self,
        contracts: &'a [String],
    ) -> Option<(&'a str, TokenConvention)> {
        contracts.iter().find_map(|contract| {
            self.token_convention(contract)
                .map(|convention| (contract.as_str(), convention))
        })
    }

    /// Display symbol for any contract: known symbol, naming convention, or first segment
    pub fn symbol_for(&self, contract: &str) -> String {
        let lower = contract.to_lowercase();
        if let Some((_, symbol)) = KNOWN_SYMBOLS.iter().find(|(known, _)| *known == lower) {
            return symbol.to_string();
        }

        match self.token_convention(contract) {
            Some(convention) => token_symbol(contract, convention),
            None => first_segment(contract).to_uppercase(),
        }
    }
}

fn first_segment(contract: &str) -> &str {
    contract.split('.').next().unwrap_or(contract)
}

/// Symbol a naming convention implies for a contract
pub fn token_symbol(contract: &str, convention: TokenConvention) -> String {
    let segments: Vec<&str> = contract.split('.').collect();
    let symbol = match convention {
        TokenConvention::MethodPrefixed => segments.get(1).copied().unwrap_or(segments[0]),
        TokenConvention::MemeCooking => segments[0].split('-').next().unwrap_or(segments[0]),
        TokenConvention::TknFactory | TokenConvention::Generic => segments[0],
    };

    if symbol.is_empty() {
        "TOKEN".to_string()
    } else {
        symbol.to_uppercase()
    }
}
