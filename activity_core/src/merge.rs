//! Second pass that stitches a wrap of native NEAR onto the DEX operation
//! that spent it. Wallets submit the two as separate transactions, so they
//! arrive as separate groups a few seconds apart.

use rust_decimal::Decimal;
use tracing::debug;

use crate::classifier::present;
use crate::engine::EngineConfig;
use crate::flow::NativeFlow;
use crate::types::{AnalyzedOperation, Category, ClassifiedOperation, OperationKind};

/// Merge wrap operations into nearby swaps.
///
/// `operations` should be ordered most recent first. Each wrap (a visible
/// operation touching the wrapped-native contract that sent NEAR) looks for
/// an unused partner within the merge window, older operations first. A
/// partner is a Swap or TokenIn, or any other non-claim operation that
/// touches a DEX or credits the account with tokens; hidden operations
/// qualify too. A match produces one composite Swap at the earlier of the
/// two positions; every operation is used at most once.
pub fn merge_wrapped_swaps(
    operations: Vec<AnalyzedOperation>,
    config: &EngineConfig,
) -> Vec<AnalyzedOperation> {
    let count = operations.len();
    let mut slots: Vec<Option<AnalyzedOperation>> = operations.into_iter().map(Some).collect();
    let mut output: Vec<(usize, AnalyzedOperation)> = Vec::with_capacity(count);

    for index in 0..count {
        let Some(timestamp_nanos) = slots[index]
            .as_ref()
            .filter(|current| is_wrap(&current.operation, config))
            .map(|current| current.operation.timestamp_nanos)
        else {
            continue;
        };
        let Some(partner_index) = find_partner(&slots, index, timestamp_nanos, config) else {
            continue;
        };
        let (Some(wrap), Some(partner)) = (slots[index].take(), slots[partner_index].take()) else {
            continue;
        };

        debug!(
            "Merging wrap {:?} with {:?}",
            wrap.operation.operation_ids, partner.operation.operation_ids
        );
        output.push((index.min(partner_index), combine(wrap, partner, config)));
    }

    output.extend(
        slots
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|operation| (index, operation))),
    );
    output.sort_by_key(|(position, _)| *position);
    output.into_iter().map(|(_, operation)| operation).collect()
}

fn is_wrap(operation: &ClassifiedOperation, config: &EngineConfig) -> bool {
    !matches!(operation.category, Category::Swap | Category::Hidden)
        && operation.net_sent > Decimal::ZERO
        && operation
            .involved_contracts
            .iter()
            .any(|contract| config.patterns.is_wrapped_native(contract))
}

fn is_partner(candidate: &AnalyzedOperation, config: &EngineConfig) -> bool {
    let operation = &candidate.operation;
    match operation.category {
        Category::Swap | Category::TokenIn => true,
        Category::Claim => false,
        _ => {
            !is_wrap(operation, config)
                && (config.patterns.dex_venue(&operation.involved_contracts).is_some()
                    || candidate.detail.incoming().next().is_some())
        }
    }
}

fn find_partner(
    slots: &[Option<AnalyzedOperation>],
    index: usize,
    timestamp_nanos: u64,
    config: &EngineConfig,
) -> Option<usize> {
    let window = config.merge_window_nanos();
    let older = index + 1..slots.len();
    let newer = (0..index).rev();

    older.chain(newer).find(|&candidate| {
        slots[candidate].as_ref().is_some_and(|other| {
            is_partner(other, config)
                && other.operation.timestamp_nanos.abs_diff(timestamp_nanos) <= window
        })
    })
}

fn combine(
    wrap: AnalyzedOperation,
    partner: AnalyzedOperation,
    config: &EngineConfig,
) -> AnalyzedOperation {
    let patterns = &config.patterns;

    let symbol = partner
        .detail
        .incoming()
        .find(|transfer| !patterns.is_wrapped_native(&transfer.contract_id))
        .map(|transfer| transfer.token_symbol.clone())
        .or_else(|| match &partner.operation.kind {
            OperationKind::TokenIn { symbol, .. } => Some(symbol.clone()),
            OperationKind::Swap {
                token_symbol: Some(symbol),
                ..
            } => Some(symbol.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "TOKEN".to_string());

    let venue = match &partner.operation.kind {
        OperationKind::Swap { venue, .. } => Some(venue.clone()),
        _ => None,
    }
    .or_else(|| {
        patterns
            .dex_venue(&partner.operation.involved_contracts)
            .map(str::to_string)
    })
    .unwrap_or_else(|| "DEX".to_string());

    let wrap_op = wrap.operation;
    let partner_op = partner.operation;

    let kind = OperationKind::Swap {
        venue,
        sent: wrap_op.net_sent,
        received: partner_op.net_received,
        token_symbol: Some(symbol),
    };
    let flow = NativeFlow {
        sent: wrap_op.net_sent + partner_op.net_sent,
        received: wrap_op.net_received + partner_op.net_received,
    };
    let (icon, label, _, _) = present(
        &kind,
        &flow,
        config.dust_threshold,
        config.visibility_threshold,
    );

    let mut involved_contracts = wrap_op.involved_contracts;
    for contract in partner_op.involved_contracts {
        if !involved_contracts.contains(&contract) {
            involved_contracts.push(contract);
        }
    }

    let mut operation_ids = wrap_op.operation_ids;
    operation_ids.extend(partner_op.operation_ids);

    let operation = ClassifiedOperation {
        category: kind.category(),
        icon: icon.to_string(),
        kind,
        label,
        amount: wrap_op.net_sent,
        show_amount: true,
        timestamp_nanos: wrap_op.timestamp_nanos.max(partner_op.timestamp_nanos),
        member_count: wrap_op.member_count + partner_op.member_count,
        operation_ids,
        net_sent: flow.sent,
        net_received: flow.received,
        gas_fee: wrap_op.gas_fee + partner_op.gas_fee,
        involved_contracts,
        usd_value: None,
    };

    let mut detail = wrap.detail;
    detail.absorb(partner.detail);

    AnalyzedOperation { operation, detail }
}
