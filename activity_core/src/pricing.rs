use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::amount::DecimalsTable;
use crate::engine::EngineConfig;
use crate::types::{ResultSet, TokenTransferDetail};
use crate::Result;

/// Source of unit USD prices, keyed by contract id.
///
/// Native NEAR is priced under the wrapped-native contract.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn fetch_prices(&self, contracts: &[String]) -> Result<HashMap<String, Decimal>>;
}

impl TokenTransferDetail {
    pub fn decimals(&self, table: &DecimalsTable) -> u32 {
        table.resolve(&self.contract_id)
    }

    /// Token quantity in whole units
    pub fn quantity(&self, table: &DecimalsTable) -> Decimal {
        table.normalize(&self.contract_id, &self.raw_amount)
    }

    pub fn usd_value(&self, table: &DecimalsTable, prices: &HashMap<String, Decimal>) -> Option<Decimal> {
        let price = prices.get(&self.contract_id)?;
        self.quantity(table).checked_mul(*price)
    }
}

/// Contracts worth pricing for a result set: the wrapped-native contract
/// first, then every token seen in the detail index in sorted order
pub fn price_keys(result: &ResultSet, config: &EngineConfig) -> Vec<String> {
    let native = config.patterns.wrapped_native().to_string();
    let tokens: BTreeSet<&str> = result
        .detail_index
        .values()
        .flat_map(|detail| detail.transfers.iter())
        .map(|transfer| transfer.contract_id.as_str())
        .filter(|contract| *contract != native)
        .collect();

    std::iter::once(native.clone())
        .chain(tokens.into_iter().map(str::to_string))
        .collect()
}

/// Set `usd_value` on operations showing a native amount above the
/// visibility threshold. Returns how many operations were priced.
pub fn apply_prices(
    result: &mut ResultSet,
    prices: &HashMap<String, Decimal>,
    config: &EngineConfig,
) -> usize {
    let Some(near_price) = prices.get(config.patterns.wrapped_native()) else {
        debug!("No NEAR price available, leaving USD values empty");
        return 0;
    };

    let mut priced = 0;
    for operation in result
        .operations
        .iter_mut()
        .filter(|op| op.show_amount && op.amount > config.visibility_threshold)
    {
        operation.usd_value = operation.amount.checked_mul(*near_price);
        if operation.usd_value.is_some() {
            priced += 1;
        }
    }
    priced
}

/// Fetch prices for a result set and apply them.
///
/// A failed lookup is logged and leaves the result set untouched.
pub async fn enrich(
    result: &mut ResultSet,
    lookup: &dyn PriceLookup,
    config: &EngineConfig,
) -> usize {
    let keys = price_keys(result, config);
    match lookup.fetch_prices(&keys).await {
        Ok(prices) => {
            let priced = apply_prices(result, &prices, config);
            debug!("Priced {} of {} operations", priced, result.len());
            priced
        }
        Err(e) => {
            warn!("Price lookup failed, continuing without USD values: {}", e);
            0
        }
    }
}
