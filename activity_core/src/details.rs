use rust_decimal::Decimal;
use tracing::debug;

use crate::amount::optional_yocto_to_near;
use crate::engine::EngineConfig;
use crate::types::{
    Direction, MemberReference, OperationDetail, RawTransactionRecord, TokenTransferDetail,
    TransactionGroup,
};

/// Gas paid by every member of a group, in NEAR
pub fn total_gas(members: &[RawTransactionRecord]) -> Decimal {
    members
        .iter()
        .map(|record| optional_yocto_to_near(record.gas_fee_yocto.as_ref()))
        .sum()
}

/// Token movements, gas and member references of one group for `account`.
///
/// Outgoing transfers come from the account's own `ft_transfer` calls,
/// incoming ones from NEP-141 `ft_transfer` events crediting the account.
/// In both cases the token is the contract the record was addressed to.
pub fn extract(group: &TransactionGroup, account: &str, config: &EngineConfig) -> OperationDetail {
    let mut transfers = Vec::new();

    for record in &group.members {
        if record.from_account == account {
            transfers.extend(outgoing_transfers(record, config));
        }
        transfers.extend(incoming_transfers(record, account, config));
    }

    let references = group
        .relevant_members()
        .map(|record| MemberReference {
            operation_id: record.operation_id.clone(),
            contract: record.to_account.clone(),
            method: record.primary_method(),
        })
        .collect();

    OperationDetail {
        transfers,
        gas_fee: total_gas(&group.members),
        references,
    }
}

fn outgoing_transfers<'a>(
    record: &'a RawTransactionRecord,
    config: &'a EngineConfig,
) -> impl Iterator<Item = TokenTransferDetail> + 'a {
    record.actions.iter().filter_map(move |action| {
        if !action.is_ft_transfer() {
            return None;
        }
        match action.ft_transfer_amount() {
            Some(raw_amount) => Some(TokenTransferDetail {
                token_symbol: config.patterns.symbol_for(&record.to_account),
                contract_id: record.to_account.clone(),
                raw_amount,
                direction: Direction::Out,
            }),
            None => {
                debug!(
                    "Skipping {} call without a readable amount in {}",
                    action.method_name.as_deref().unwrap_or_default(),
                    record.operation_id
                );
                None
            }
        }
    })
}

fn incoming_transfers(
    record: &RawTransactionRecord,
    account: &str,
    config: &EngineConfig,
) -> Vec<TokenTransferDetail> {
    record
        .all_events()
        .filter_map(|log| log.as_structured())
        .filter(|event| event.is_ft_transfer())
        .flat_map(|event| event.transfers.iter())
        .filter(|transfer| transfer.to_account == account && transfer.amount.digits().is_some())
        .map(|transfer| TokenTransferDetail {
            token_symbol: config.patterns.symbol_for(&record.to_account),
            contract_id: record.to_account.clone(),
            raw_amount: transfer.amount.clone(),
            direction: Direction::In,
        })
        .collect()
}
