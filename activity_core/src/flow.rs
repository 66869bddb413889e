use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::optional_yocto_to_near;
use crate::types::RawTransactionRecord;

/// Native NEAR moved by an account within one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeFlow {
    pub sent: Decimal,
    pub received: Decimal,
}

impl NativeFlow {
    pub fn total(&self) -> Decimal {
        self.sent + self.received
    }

    /// Absolute difference between what left and what arrived
    pub fn imbalance(&self) -> Decimal {
        (self.sent - self.received).abs()
    }
}

/// Sum deposits above `dust` where the account is a direct counterparty.
///
/// Runs over every member, system receipts included: refunds and other
/// internal receipts still carry real value.
pub fn accumulate(members: &[RawTransactionRecord], account: &str, dust: Decimal) -> NativeFlow {
    members.iter().fold(NativeFlow::default(), |mut flow, record| {
        let deposit = optional_yocto_to_near(record.deposit_yocto.as_ref());
        if deposit <= dust {
            return flow;
        }
        if record.from_account == account {
            flow.sent += deposit;
        }
        if record.to_account == account {
            flow.received += deposit;
        }
        flow
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawAmount;
    use std::str::FromStr;

    fn record(from: &str, to: &str, deposit: Option<&str>) -> RawTransactionRecord {
        RawTransactionRecord {
            operation_id: "op".to_string(),
            timestamp_nanos: 1,
            from_account: from.to_string(),
            to_account: to.to_string(),
            deposit_yocto: deposit.map(RawAmount::parse),
            gas_fee_yocto: None,
            actions: vec![],
            events: vec![],
            receipt_outcome: None,
        }
    }

    fn dust() -> Decimal {
        Decimal::from_str("0.0001").unwrap()
    }

    #[test]
    fn test_sent_and_received_are_separate() {
        let members = vec![
            record("alice.near", "bob.near", Some("3000000000000000000000000")),
            record("carol.near", "alice.near", Some("1000000000000000000000000")),
            record("carol.near", "dave.near", Some("9000000000000000000000000")),
        ];
        let flow = accumulate(&members, "alice.near", dust());
        assert_eq!(flow.sent, Decimal::from(3));
        assert_eq!(flow.received, Decimal::from(1));
        assert_eq!(flow.total(), Decimal::from(4));
        assert_eq!(flow.imbalance(), Decimal::from(2));
    }

    #[test]
    fn test_dust_and_missing_deposits_ignored() {
        let members = vec![
            // 0.00125 NEAR storage deposit is above dust
            record("alice.near", "token.near", Some("1250000000000000000000")),
            // 0.00001 NEAR is dust
            record("alice.near", "token.near", Some("10000000000000000000")),
            record("alice.near", "token.near", None),
            record("alice.near", "token.near", Some("garbage")),
        ];
        let flow = accumulate(&members, "alice.near", dust());
        assert_eq!(flow.sent, Decimal::from_str("0.00125").unwrap());
        assert_eq!(flow.received, Decimal::ZERO);
    }

    #[test]
    fn test_system_refund_counts_as_received() {
        let members = vec![record("system", "alice.near", Some("500000000000000000000000"))];
        let flow = accumulate(&members, "alice.near", dust());
        assert_eq!(flow.received, Decimal::from_str("0.5").unwrap());
    }
}
