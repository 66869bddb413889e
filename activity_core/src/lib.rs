//! Groups an account's raw NEAR records into operations, classifies them and
//! assembles a bounded, ordered result set with expandable details.

pub mod amount;
pub mod analytics;
pub mod assembler;
pub mod classifier;
pub mod details;
pub mod engine;
pub mod flow;
pub mod grouping;
pub mod merge;
pub mod patterns;
pub mod pricing;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use analytics::{summarize, ActivitySummary};
pub use engine::{ActivityEngine, EngineConfig};
pub use pricing::{enrich, PriceLookup};
pub use types::*;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ActivityError {
    #[error("Record decoding error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Price lookup error: {0}")]
    PriceLookup(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, ActivityError>;

/// Raw dumps come either as a bare array or wrapped the way NearBlocks serves them
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordDump {
    Records(Vec<RawTransactionRecord>),
    Wrapped { txns: Vec<RawTransactionRecord> },
}

/// Decode a JSON dump of raw records
pub fn parse_records(json: &str) -> Result<Vec<RawTransactionRecord>> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if !value.is_array() && value.get("txns").is_none() {
        return Err(ActivityError::InvalidInput(
            "expected an array of records or an object with a `txns` array".to_string(),
        ));
    }

    let records = match serde_json::from_value::<RecordDump>(value)? {
        RecordDump::Records(records) | RecordDump::Wrapped { txns: records } => records,
    };
    debug!("Decoded {} raw records", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array_and_wrapped() {
        let bare = r#"[{ "operation_id": "a", "timestamp_nanos": 1, "from_account": "x", "to_account": "y" }]"#;
        assert_eq!(parse_records(bare).unwrap().len(), 1);

        let wrapped = r#"{ "txns": [
            { "transaction_hash": "a", "block_timestamp": "1", "predecessor_account_id": "x", "receiver_account_id": "y" },
            { "transaction_hash": "b", "block_timestamp": "2", "predecessor_account_id": "x", "receiver_account_id": "y" }
        ] }"#;
        let records = parse_records(wrapped).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].operation_id, "b");
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        assert!(matches!(parse_records("{\"foo\": 1}"), Err(ActivityError::InvalidInput(_))));
        assert!(matches!(parse_records("not json"), Err(ActivityError::Decode(_))));
    }
}
