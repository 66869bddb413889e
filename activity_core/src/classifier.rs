use rust_decimal::Decimal;
use tracing::trace;

use crate::details;
use crate::engine::EngineConfig;
use crate::flow::{self, NativeFlow};
use crate::patterns::token_symbol;
use crate::types::{ClassifiedOperation, OperationKind, RawTransactionRecord, TransactionGroup};

/// Counterparties longer than this are shortened in labels
const MAX_COUNTERPARTY_CHARS: usize = 20;
const SHORTENED_COUNTERPARTY_CHARS: usize = 17;

/// Classify one group for `account`.
///
/// Rules are tried in priority order and the first match wins:
/// claim, swap, native transfer, token transfer, dust suppression, contract call.
pub fn classify(group: &TransactionGroup, account: &str, config: &EngineConfig) -> ClassifiedOperation {
    let flow = flow::accumulate(&group.members, account, config.dust_threshold);
    let kind = decide(group, account, &flow, config);
    trace!("Group {} classified as {:?}", group.operation_id, kind.category());
    build_operation(group, kind, flow, config)
}

fn decide(
    group: &TransactionGroup,
    account: &str,
    flow: &NativeFlow,
    config: &EngineConfig,
) -> OperationKind {
    let Some(first) = group.relevant_members().next() else {
        return OperationKind::Hidden;
    };
    let contracts = &group.involved_contracts;
    let member_count = group.relevant_count();
    let patterns = &config.patterns;

    if let Some((protocol, icon)) = patterns.claim_protocol(contracts) {
        return OperationKind::Claim {
            protocol: protocol.to_string(),
            icon: icon.to_string(),
        };
    }

    let dex_venue = patterns.dex_venue(contracts);
    if let Some(venue) = dex_venue {
        if member_count > 1 {
            return OperationKind::Swap {
                venue: venue.to_string(),
                sent: flow.sent,
                received: flow.received,
                token_symbol: None,
            };
        }
    }

    // The side the transfer is shown on has to carry a visible amount
    if member_count == 1 && dex_venue.is_none() {
        let outgoing = is_outgoing(first, account, flow);
        let moved = if outgoing { flow.sent } else { flow.received };
        if moved > config.visibility_threshold {
            return native_transfer(first, outgoing);
        }
    }

    if let Some((contract, convention)) = patterns.token_contract(contracts) {
        let symbol = token_symbol(contract, convention);
        let contract = contract.to_string();
        return if first.from_account == account {
            OperationKind::TokenOut { symbol, contract }
        } else {
            OperationKind::TokenIn { symbol, contract }
        };
    }

    if flow.total() < config.hide_threshold && member_count <= 2 {
        return OperationKind::Hidden;
    }

    OperationKind::ContractCall { member_count }
}

fn is_outgoing(first: &RawTransactionRecord, account: &str, flow: &NativeFlow) -> bool {
    if first.from_account == account {
        true
    } else if first.to_account == account {
        false
    } else {
        flow.sent >= flow.received
    }
}

fn native_transfer(first: &RawTransactionRecord, outgoing: bool) -> OperationKind {
    if outgoing {
        OperationKind::TransferOut {
            counterparty: first.to_account.clone(),
        }
    } else {
        OperationKind::TransferIn {
            counterparty: first.from_account.clone(),
        }
    }
}

/// Shorten long account ids to 17 characters plus an ellipsis
pub fn shorten_account(account: &str) -> String {
    if account.chars().count() > MAX_COUNTERPARTY_CHARS {
        let prefix: String = account.chars().take(SHORTENED_COUNTERPARTY_CHARS).collect();
        format!("{}...", prefix)
    } else {
        account.to_string()
    }
}

/// Icon, label, amount and amount visibility for a kind
pub(crate) fn present<'k>(
    kind: &'k OperationKind,
    flow: &NativeFlow,
    dust: Decimal,
    visible: Decimal,
) -> (&'k str, String, Decimal, bool) {
    match kind {
        OperationKind::Claim { protocol, icon } => {
            (icon.as_str(), format!("Claim {}", protocol), Decimal::ZERO, false)
        }
        OperationKind::Swap {
            venue,
            sent,
            received,
            token_symbol,
        } => {
            let amount = (*sent - *received).abs();
            let label = match token_symbol {
                Some(symbol) => format!("Swap {} NEAR → {} ({})", sent.normalize(), symbol, venue),
                None if received > sent => format!("Swap ({}): NEAR received", venue),
                None => format!("Swap ({}): NEAR sent", venue),
            };
            ("🔄", label, amount, amount > dust)
        }
        OperationKind::TransferOut { counterparty } => (
            "📤",
            format!("Sent → {}", shorten_account(counterparty)),
            flow.sent,
            true,
        ),
        OperationKind::TransferIn { counterparty } => (
            "📥",
            format!("Received ← {}", shorten_account(counterparty)),
            flow.received,
            true,
        ),
        OperationKind::TokenOut { symbol, .. } => {
            ("🪙", format!("Sent {}", symbol), Decimal::ZERO, false)
        }
        OperationKind::TokenIn { symbol, .. } => {
            ("🪙", format!("Received {}", symbol), Decimal::ZERO, false)
        }
        OperationKind::ContractCall { member_count } => (
            "📝",
            format!("Contract call ({} transactions)", member_count),
            flow.sent,
            flow.sent > visible,
        ),
        OperationKind::Hidden => ("", "Hidden".to_string(), Decimal::ZERO, false),
    }
}

fn build_operation(
    group: &TransactionGroup,
    kind: OperationKind,
    flow: NativeFlow,
    config: &EngineConfig,
) -> ClassifiedOperation {
    let (icon, label, amount, show_amount) =
        present(&kind, &flow, config.dust_threshold, config.visibility_threshold);
    ClassifiedOperation {
        category: kind.category(),
        icon: icon.to_string(),
        kind,
        label,
        amount,
        show_amount,
        timestamp_nanos: group.timestamp_nanos,
        member_count: group.relevant_count(),
        operation_ids: vec![group.operation_id.clone()],
        net_sent: flow.sent,
        net_received: flow.received,
        gas_fee: details::total_gas(&group.members),
        involved_contracts: group.involved_contracts.clone(),
        usd_value: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{near, single_group, RecordBuilder, ACCOUNT, T0};
    use crate::types::Category;

    fn classify_records(records: Vec<RawTransactionRecord>) -> ClassifiedOperation {
        classify(&single_group(records), ACCOUNT, &EngineConfig::default())
    }

    #[test]
    fn test_simple_outgoing_transfer() {
        let counterparty = "a-very-long-counterparty-account.near";
        let op = classify_records(vec![
            RecordBuilder::new("tx1", T0, ACCOUNT, counterparty).deposit(&near(2)).build(),
        ]);

        assert_eq!(op.category, Category::TransferOut);
        assert_eq!(op.amount, Decimal::from(2));
        assert!(op.show_amount);
        assert!(op.label.contains("a-very-long-count..."));
        assert!(!op.label.contains(counterparty));
        assert_eq!(
            op.kind,
            OperationKind::TransferOut {
                counterparty: counterparty.to_string()
            }
        );
    }

    #[test]
    fn test_simple_incoming_transfer() {
        let op = classify_records(vec![
            RecordBuilder::new("tx1", T0, "bob.near", ACCOUNT).deposit(&near(7)).build(),
        ]);
        assert_eq!(op.category, Category::TransferIn);
        assert_eq!(op.amount, Decimal::from(7));
        assert_eq!(op.label, "Received ← bob.near");
    }

    #[test]
    fn test_claim_beats_everything() {
        let op = classify_records(vec![
            RecordBuilder::new("tx1", T0, ACCOUNT, "game.hot.tg").call("claim", serde_json::json!({})).build(),
            RecordBuilder::new("tx1", T0, "game.hot.tg", "v2.ref-finance.near").build(),
        ]);
        assert_eq!(op.category, Category::Claim);
        assert_eq!(op.label, "Claim HOT");
        assert_eq!(op.icon, "🔥");
        assert!(!op.show_amount);

        let moon = classify_records(vec![
            RecordBuilder::new("tx2", T0, ACCOUNT, "harvest-moon.near").build(),
        ]);
        assert_eq!(moon.label, "Claim MOON");
        assert_eq!(moon.icon, "🎁");
    }

    #[test]
    fn test_claim_icon_comes_from_pattern_table() {
        let mut config = EngineConfig::default();
        config.patterns = config.patterns.with_claim("kaiching", "KAI");
        let op = classify(
            &single_group(vec![RecordBuilder::new("tx1", T0, ACCOUNT, "kaiching.near").build()]),
            ACCOUNT,
            &config,
        );
        assert_eq!(
            op.kind,
            OperationKind::Claim {
                protocol: "KAI".to_string(),
                icon: "🎁".to_string(),
            }
        );
        assert_eq!(op.icon, "🎁");
    }

    #[test]
    fn test_swap_requires_multiple_members() {
        let op = classify_records(vec![
            RecordBuilder::new("tx1", T0, ACCOUNT, "v2.ref-finance.near").deposit(&near(3)).build(),
            RecordBuilder::new("tx1", T0, "v2.ref-finance.near", "token.v2.ref-finance.near").build(),
        ]);
        assert_eq!(op.category, Category::Swap);
        assert_eq!(op.amount, Decimal::from(3));
        assert!(op.show_amount);
        assert_eq!(op.label, "Swap (Ref Finance): NEAR sent");

        let single = classify_records(vec![
            RecordBuilder::new("tx2", T0, ACCOUNT, "v2.ref-finance.near").deposit(&near(3)).build(),
        ]);
        assert_eq!(single.category, Category::ContractCall);
        assert!(single.show_amount);
    }

    #[test]
    fn test_swap_received_side_dominates() {
        let op = classify_records(vec![
            RecordBuilder::new("tx1", T0, ACCOUNT, "dclv2.rhea.near").build(),
            RecordBuilder::new("tx1", T0, "dclv2.rhea.near", ACCOUNT).deposit(&near(4)).build(),
        ]);
        assert_eq!(op.category, Category::Swap);
        assert_eq!(op.label, "Swap (RHEA): NEAR received");
        assert_eq!(op.amount, Decimal::from(4));
    }

    #[test]
    fn test_token_transfer_direction_and_symbol() {
        let out = classify_records(vec![
            RecordBuilder::new("tx1", T0, ACCOUNT, "lonk-1.meme-cooking.near")
                .deposit("1")
                .call("ft_transfer", serde_json::json!({ "receiver_id": "bob.near", "amount": "100" }))
                .build(),
        ]);
        assert_eq!(out.category, Category::TokenOut);
        assert_eq!(out.label, "Sent LONK");
        assert!(!out.show_amount);

        let incoming = classify_records(vec![
            RecordBuilder::new("tx2", T0, "bob.near", "blackdragon.tkn.near").build(),
        ]);
        assert_eq!(incoming.category, Category::TokenIn);
        assert_eq!(incoming.label, "Received BLACKDRAGON");
    }

    #[test]
    fn test_dust_group_is_hidden() {
        let op = classify_records(vec![
            RecordBuilder::new("tx1", T0, ACCOUNT, "someapp.near").call("ping", serde_json::json!({})).build(),
        ]);
        assert_eq!(op.category, Category::Hidden);
        assert!(op.is_hidden());
    }

    #[test]
    fn test_refund_only_call_is_not_a_transfer() {
        // the account sends nothing; the only NEAR moving is a refund back to it
        let op = classify_records(vec![
            RecordBuilder::new("tx1", T0, ACCOUNT, "someapp.near").call("ping", serde_json::json!({})).build(),
            RecordBuilder::new("tx1", T0, "system", ACCOUNT).deposit(&near(1)).build(),
        ]);
        assert_eq!(op.category, Category::ContractCall);
        assert_eq!(op.net_received, Decimal::from(1));
        assert!(!op.show_amount);
    }

    #[test]
    fn test_shown_transfer_amount_is_never_zero() {
        let op = classify_records(vec![
            RecordBuilder::new("tx1", T0, ACCOUNT, "bob.near").deposit(&near(3)).build(),
            RecordBuilder::new("tx1", T0, "system", ACCOUNT).deposit(&near(1)).build(),
        ]);
        assert_eq!(op.category, Category::TransferOut);
        assert_eq!(op.amount, Decimal::from(3));
        assert!(op.show_amount);
    }

    #[test]
    fn test_contract_call_fallback() {
        let op = classify_records(vec![
            RecordBuilder::new("tx1", T0, ACCOUNT, "someapp.near").build(),
            RecordBuilder::new("tx1", T0, "someapp.near", "other.near").build(),
            RecordBuilder::new("tx1", T0, "other.near", "third.near").build(),
        ]);
        assert_eq!(op.category, Category::ContractCall);
        assert_eq!(op.label, "Contract call (3 transactions)");
        assert!(!op.show_amount);
    }

    #[test]
    fn test_only_system_rows_are_hidden() {
        let op = classify_records(vec![
            RecordBuilder::new("tx1", T0, "system", ACCOUNT).deposit(&near(1)).build(),
        ]);
        assert_eq!(op.category, Category::Hidden);
        // refunds still count towards flow
        assert_eq!(op.net_received, Decimal::from(1));
    }

    #[test]
    fn test_classification_is_idempotent() {
        let group = single_group(vec![
            RecordBuilder::new("tx1", T0, ACCOUNT, "v2.ref-finance.near").deposit(&near(1)).build(),
            RecordBuilder::new("tx1", T0, "v2.ref-finance.near", ACCOUNT).deposit("5").build(),
        ]);
        let config = EngineConfig::default();
        assert_eq!(classify(&group, ACCOUNT, &config), classify(&group, ACCOUNT, &config));
    }

    #[test]
    fn test_shorten_account() {
        assert_eq!(shorten_account("bob.near"), "bob.near");
        assert_eq!(shorten_account("exactly-twenty-chars"), "exactly-twenty-chars");
        assert_eq!(
            shorten_account("0123456789abcdef0123456789abcdef01234567"),
            "0123456789abcdef0..."
        );
    }
}
