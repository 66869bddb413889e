use tracing::trace;

use crate::types::{AnalyzedOperation, DetailIndex, ResultSet};

/// Order, bound and index a list of analyzed operations.
///
/// Sorting is stable on timestamp (newest first) so equal timestamps keep
/// their incoming order. `total` counts operations before truncation; only
/// multi-member operations get a detail entry.
pub fn assemble(mut operations: Vec<AnalyzedOperation>, limit: usize) -> ResultSet {
    operations.sort_by(|a, b| b.operation.timestamp_nanos.cmp(&a.operation.timestamp_nanos));
    let total = operations.len();
    operations.truncate(limit);

    let mut detail_index = DetailIndex::new();
    let operations = operations
        .into_iter()
        .enumerate()
        .map(|(position, analyzed)| {
            if analyzed.operation.member_count > 1 {
                trace!("Indexing detail for position {}", position);
                detail_index.insert(position, analyzed.detail);
            }
            analyzed.operation
        })
        .collect();

    ResultSet {
        operations,
        total,
        detail_index,
    }
}
