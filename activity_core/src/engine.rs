use config_manager::SystemConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::amount::DecimalsTable;
use crate::assembler::assemble;
use crate::classifier::classify;
use crate::details;
use crate::grouping::build_groups;
use crate::merge::merge_wrapped_swaps;
use crate::patterns::PatternTable;
use crate::types::{AnalyzedOperation, RawTransactionRecord, ResultSet, TransactionGroup};

/// Thresholds and tables the engine runs with
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub system_account: String,

    /// Deposits at or below this are ignored by the flow accumulator
    pub dust_threshold: Decimal,

    /// Small groups moving less than this are hidden
    pub hide_threshold: Decimal,

    /// Native amounts worth showing
    pub visibility_threshold: Decimal,

    pub merge_window_secs: u64,
    pub max_operations: usize,
    pub compact_operations: usize,
    pub patterns: PatternTable,
    pub decimals: DecimalsTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_account: "system".to_string(),
            dust_threshold: dec!(0.0001),
            hide_threshold: dec!(0.001),
            visibility_threshold: dec!(0.01),
            merge_window_secs: 180,
            max_operations: 15,
            compact_operations: 5,
            patterns: PatternTable::builtin(),
            decimals: DecimalsTable::builtin(),
        }
    }
}

impl EngineConfig {
    pub fn from_system_config(config: &SystemConfig) -> Self {
        let defaults = Self::default();
        let engine = &config.engine;
        let wrapped_native = config.system.wrapped_native_contract.as_str();

        Self {
            system_account: config.system.system_account.clone(),
            dust_threshold: threshold(engine.dust_threshold_near, defaults.dust_threshold),
            hide_threshold: threshold(engine.hide_threshold_near, defaults.hide_threshold),
            visibility_threshold: threshold(
                engine.visibility_threshold_near,
                defaults.visibility_threshold,
            ),
            merge_window_secs: engine.merge_window_seconds,
            max_operations: engine.max_operations,
            compact_operations: engine.compact_operations,
            patterns: PatternTable::builtin()
                .with_wrapped_native(wrapped_native)
                .with_extra(&engine.extra_claim_patterns, &engine.extra_dex_patterns),
            decimals: DecimalsTable::builtin()
                .with_wrapped_native(wrapped_native)
                .with_overrides(&config.decimals),
        }
    }

    /// Merge window in nanoseconds
    pub fn merge_window_nanos(&self) -> u64 {
        self.merge_window_secs.saturating_mul(1_000_000_000)
    }
}

/// Go through the textual form so 0.0001 stays exactly 0.0001
fn threshold(value: f64, fallback: Decimal) -> Decimal {
    Decimal::from_str(&value.to_string()).unwrap_or_else(|e| {
        warn!("Threshold {} is not representable ({}), using {}", value, e, fallback);
        fallback
    })
}

/// Turns an account's raw records into a bounded, ordered result set
#[derive(Debug, Clone, Default)]
pub struct ActivityEngine {
    config: EngineConfig,
}

impl ActivityEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Regular view, bounded by `max_operations`
    pub fn analyze(&self, records: &[RawTransactionRecord], account: &str) -> ResultSet {
        self.analyze_with_limit(records, account, self.config.max_operations)
    }

    /// Compact view, bounded by `compact_operations`
    pub fn analyze_compact(&self, records: &[RawTransactionRecord], account: &str) -> ResultSet {
        self.analyze_with_limit(records, account, self.config.compact_operations)
    }

    pub fn analyze_with_limit(
        &self,
        records: &[RawTransactionRecord],
        account: &str,
        limit: usize,
    ) -> ResultSet {
        info!(
            "Analyzing {} records for {} (limit {})",
            records.len(),
            account,
            limit
        );

        let groups = build_groups(records, &self.config.system_account);
        let mut operations = self.classify_groups(&groups, account);
        let classified = operations.len();

        // Most recent first, so the merge pass visits wraps newest to oldest
        operations.sort_by(|a, b| b.operation.timestamp_nanos.cmp(&a.operation.timestamp_nanos));

        // Hidden operations can still complete a wrap, so they leave only after merging
        let merged: Vec<AnalyzedOperation> = merge_wrapped_swaps(operations, &self.config)
            .into_iter()
            .filter(|analyzed| !analyzed.operation.is_hidden())
            .collect();
        debug!(
            "{} classified operations, {} visible after merging wraps into swaps",
            classified,
            merged.len()
        );

        let result = assemble(merged, limit);
        info!(
            "Returning {} of {} operations for {}",
            result.len(),
            result.total,
            account
        );
        result
    }

    /// Classify every group and attach its detail.
    ///
    /// Hidden operations are kept; callers decide when to drop them.
    pub fn classify_groups(&self, groups: &[TransactionGroup], account: &str) -> Vec<AnalyzedOperation> {
        let operations: Vec<AnalyzedOperation> = groups
            .iter()
            .map(|group| AnalyzedOperation {
                operation: classify(group, account, &self.config),
                detail: details::extract(group, account, &self.config),
            })
            .collect();

        debug!(
            "Classified {} groups, {} hidden",
            groups.len(),
            operations.iter().filter(|analyzed| analyzed.operation.is_hidden()).count()
        );
        operations
    }
}
