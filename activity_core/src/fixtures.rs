//! Record builders shared by unit tests.

use crate::grouping::build_groups;
use crate::types::{Action, EventLog, RawAmount, RawTransactionRecord, ReceiptOutcome, TransactionGroup};

pub(crate) const ACCOUNT: &str = "alice.near";

pub(crate) const SECOND: u64 = 1_000_000_000;

/// Base timestamp (2024-05-01T00:00:00Z) in nanoseconds
pub(crate) const T0: u64 = 1_714_521_600 * SECOND;

/// Whole NEAR as a yocto string
pub(crate) fn near(amount: u64) -> String {
    format!("{}{}", amount, "0".repeat(24))
}

pub(crate) struct RecordBuilder {
    record: RawTransactionRecord,
}

impl RecordBuilder {
    pub(crate) fn new(operation_id: &str, timestamp_nanos: u64, from: &str, to: &str) -> Self {
        Self {
            record: RawTransactionRecord {
                operation_id: operation_id.to_string(),
                timestamp_nanos,
                from_account: from.to_string(),
                to_account: to.to_string(),
                deposit_yocto: None,
                gas_fee_yocto: None,
                actions: Vec::new(),
                events: Vec::new(),
                receipt_outcome: None,
            },
        }
    }

    pub(crate) fn deposit(mut self, yocto: &str) -> Self {
        self.record.deposit_yocto = Some(RawAmount::parse(yocto));
        self
    }

    pub(crate) fn gas(mut self, yocto: &str) -> Self {
        self.record.gas_fee_yocto = Some(RawAmount::parse(yocto));
        self
    }

    pub(crate) fn call(mut self, method: &str, args: serde_json::Value) -> Self {
        self.record.actions.push(Action {
            action_kind: "FUNCTION_CALL".to_string(),
            method_name: Some(method.to_string()),
            args: Some(args),
        });
        self
    }

    pub(crate) fn event(mut self, log: serde_json::Value) -> Self {
        self.record.events.push(EventLog::from_value(log));
        self
    }

    pub(crate) fn receipt_log(mut self, log: serde_json::Value) -> Self {
        let outcome = self.record.receipt_outcome.get_or_insert_with(ReceiptOutcome::default);
        outcome
            .logs
            .get_or_insert_with(Vec::new)
            .push(EventLog::from_value(log));
        self
    }

    pub(crate) fn build(self) -> RawTransactionRecord {
        self.record
    }
}

/// NEP-141 `ft_transfer` event crediting `to`
pub(crate) fn ft_transfer_event(from: &str, to: &str, amount: &str) -> serde_json::Value {
    serde_json::json!({
        "standard": "nep141",
        "version": "1.0.0",
        "event": "ft_transfer",
        "data": [{ "old_owner_id": from, "new_owner_id": to, "amount": amount }]
    })
}

pub(crate) fn single_group(records: Vec<RawTransactionRecord>) -> TransactionGroup {
    let mut groups = build_groups(&records, "system");
    assert_eq!(groups.len(), 1, "records should share one operation id");
    groups.remove(0)
}
