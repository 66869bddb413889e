use std::collections::HashMap;
use tracing::{debug, trace};

use crate::types::{RawTransactionRecord, TransactionGroup};

/// Partition records into groups by operation id.
///
/// Groups come out in first-seen order with members in input order.
/// System-to-system rows are dropped before grouping; rows with no operation
/// id cannot be grouped and are skipped.
pub fn build_groups(records: &[RawTransactionRecord], system_account: &str) -> Vec<TransactionGroup> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<TransactionGroup> = Vec::new();

    for record in records {
        if record.is_system_to_system(system_account) {
            trace!("Dropping system-to-system row in {}", record.operation_id);
            continue;
        }
        if record.operation_id.is_empty() {
            debug!("Skipping record without operation id ({} -> {})", record.from_account, record.to_account);
            continue;
        }

        match positions.get(record.operation_id.as_str()) {
            Some(&position) => push_member(&mut groups[position], record.clone(), system_account),
            None => {
                positions.insert(record.operation_id.as_str(), groups.len());
                let mut group = TransactionGroup {
                    operation_id: record.operation_id.clone(),
                    members: Vec::new(),
                    timestamp_nanos: record.timestamp_nanos,
                    involved_contracts: Vec::new(),
                    relevant: Vec::new(),
                };
                push_member(&mut group, record.clone(), system_account);
                groups.push(group);
            }
        }
    }

    debug!("Built {} groups from {} records", groups.len(), records.len());
    groups
}

fn push_member(group: &mut TransactionGroup, record: RawTransactionRecord, system_account: &str) {
    if !record.touches_system(system_account) {
        group.relevant.push(group.members.len());
        if !record.to_account.is_empty() && !group.involved_contracts.contains(&record.to_account) {
            group.involved_contracts.push(record.to_account.clone());
        }
    }
    group.members.push(record);
}
