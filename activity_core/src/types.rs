use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::trace;

/// Prefix NEAR contracts put in front of structured logs
const EVENT_JSON_PREFIX: &str = "EVENT_JSON:";

/// Token standard whose `ft_transfer` events describe fungible token movements
const FT_STANDARD: &str = "nep141";

const FT_TRANSFER_EVENT: &str = "ft_transfer";

/// Methods that move fungible tokens out of the caller's balance
pub const FT_TRANSFER_METHODS: &[&str] = &["ft_transfer", "ft_transfer_call"];

/// An externally sourced integer amount, validated once when it enters the system.
///
/// Anything that is not a plain non-negative integer is kept verbatim as
/// `Unparsed` and counts as zero wherever amounts are summed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawAmount {
    Digits(String),
    Unparsed(String),
}

impl RawAmount {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return RawAmount::Unparsed(text.to_string());
        }

        let stripped = trimmed.trim_start_matches('0');
        if stripped.is_empty() {
            RawAmount::Digits("0".to_string())
        } else {
            RawAmount::Digits(stripped.to_string())
        }
    }

    pub fn zero() -> Self {
        RawAmount::Digits("0".to_string())
    }

    /// Validated digits, or `None` for unparsed input
    pub fn digits(&self) -> Option<&str> {
        match self {
            RawAmount::Digits(digits) => Some(digits),
            RawAmount::Unparsed(_) => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, RawAmount::Digits(digits) if digits == "0")
    }

    pub fn as_str(&self) -> &str {
        match self {
            RawAmount::Digits(text) | RawAmount::Unparsed(text) => text,
        }
    }
}

impl Serialize for RawAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Indexers emit amounts as strings, integers or (for large values) floats
#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Text(String),
    Integer(u64),
    Float(f64),
}

impl<'de> Deserialize<'de> for RawAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = match AmountRepr::deserialize(deserializer)? {
            AmountRepr::Text(text) => RawAmount::parse(&text),
            AmountRepr::Integer(value) => RawAmount::Digits(value.to_string()),
            AmountRepr::Float(value) if value.is_finite() && value >= 0.0 => {
                RawAmount::parse(&format!("{:.0}", value))
            }
            AmountRepr::Float(value) => RawAmount::Unparsed(value.to_string()),
        };
        Ok(amount)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NanosRepr {
    Text(String),
    Integer(u64),
    Float(f64),
}

fn deserialize_nanos<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let nanos = match Option::<NanosRepr>::deserialize(deserializer)? {
        Some(NanosRepr::Text(text)) => text.trim().parse::<u64>().unwrap_or(0),
        Some(NanosRepr::Integer(value)) => value,
        Some(NanosRepr::Float(value)) if value.is_finite() && value >= 0.0 => value as u64,
        _ => 0,
    };
    Ok(nanos)
}

/// One action inside a transaction (function call, transfer, ...)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Action {
    #[serde(alias = "action", default)]
    pub action_kind: String,

    #[serde(alias = "method", default)]
    pub method_name: Option<String>,

    /// JSON object, or a JSON document encoded as a string
    #[serde(default)]
    pub args: Option<serde_json::Value>,
}

impl Action {
    /// Call arguments as a JSON object, if they can be read as one
    pub fn args_object(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        match self.args.as_ref()? {
            serde_json::Value::Object(map) => Some(map.clone()),
            serde_json::Value::String(encoded) => {
                match serde_json::from_str::<serde_json::Value>(encoded) {
                    Ok(serde_json::Value::Object(map)) => Some(map),
                    _ => {
                        trace!("Skipping non-JSON action args");
                        None
                    }
                }
            }
            _ => None,
        }
    }

    pub fn is_ft_transfer(&self) -> bool {
        self.method_name
            .as_deref()
            .map(|method| FT_TRANSFER_METHODS.contains(&method))
            .unwrap_or(false)
    }

    /// Amount argument of an `ft_transfer`/`ft_transfer_call`, when it is a valid integer
    pub fn ft_transfer_amount(&self) -> Option<RawAmount> {
        if !self.is_ft_transfer() {
            return None;
        }

        let args = self.args_object()?;
        let amount = match args.get("amount")? {
            serde_json::Value::String(text) => RawAmount::parse(text),
            serde_json::Value::Number(number) => RawAmount::parse(&number.to_string()),
            _ => return None,
        };

        amount.digits().is_some().then_some(amount)
    }
}

/// One movement inside a token transfer event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferEntry {
    #[serde(alias = "old_owner_id")]
    pub from_account: String,

    #[serde(alias = "new_owner_id")]
    pub to_account: String,

    pub amount: RawAmount,
}

/// A structured log entry following a NEP event standard
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredEvent {
    pub standard: String,
    pub event: String,
    pub transfers: Vec<TransferEntry>,
}

impl StructuredEvent {
    pub fn is_ft_transfer(&self) -> bool {
        self.standard.eq_ignore_ascii_case(FT_STANDARD) && self.event == FT_TRANSFER_EVENT
    }
}

#[derive(Deserialize)]
struct StructuredEventWire {
    standard: String,
    #[serde(alias = "eventName", alias = "event_name")]
    event: String,
    #[serde(alias = "transfers", default)]
    data: Option<Vec<serde_json::Value>>,
}

/// A log entry attached to a record.
///
/// Entries that do not follow the event schema are kept as `Unparsed` so a
/// single bad log never fails the whole record.
#[derive(Debug, Clone, PartialEq)]
pub enum EventLog {
    Structured(StructuredEvent),
    Unparsed(String),
}

impl EventLog {
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => {
                let body = text
                    .trim()
                    .strip_prefix(EVENT_JSON_PREFIX)
                    .unwrap_or(text.trim())
                    .trim();
                match serde_json::from_str::<serde_json::Value>(body) {
                    Ok(parsed @ serde_json::Value::Object(_)) => Self::from_object(parsed, text),
                    _ => EventLog::Unparsed(text),
                }
            }
            object @ serde_json::Value::Object(_) => {
                let original = object.to_string();
                Self::from_object(object, original)
            }
            other => EventLog::Unparsed(other.to_string()),
        }
    }

    fn from_object(object: serde_json::Value, original: String) -> Self {
        match serde_json::from_value::<StructuredEventWire>(object) {
            Ok(wire) => {
                let transfers = wire
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|entry| serde_json::from_value::<TransferEntry>(entry).ok())
                    .collect();
                EventLog::Structured(StructuredEvent {
                    standard: wire.standard,
                    event: wire.event,
                    transfers,
                })
            }
            Err(_) => EventLog::Unparsed(original),
        }
    }

    pub fn as_structured(&self) -> Option<&StructuredEvent> {
        match self {
            EventLog::Structured(event) => Some(event),
            EventLog::Unparsed(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for EventLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(EventLog::from_value(value))
    }
}

/// Per-receipt execution outcome carrying its own logs
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReceiptOutcome {
    #[serde(default)]
    pub logs: Option<Vec<EventLog>>,
}

#[derive(Deserialize)]
struct ActionsAgg {
    #[serde(default)]
    deposit: Option<RawAmount>,
}

#[derive(Deserialize)]
struct OutcomesAgg {
    #[serde(default)]
    transaction_fee: Option<RawAmount>,
}

/// Wire shape accepted for a raw record: the canonical field names or the
/// NearBlocks `txns` names.
#[derive(Deserialize)]
struct RecordWire {
    #[serde(alias = "transaction_hash", default)]
    operation_id: Option<String>,
    #[serde(alias = "block_timestamp", deserialize_with = "deserialize_nanos", default)]
    timestamp_nanos: u64,
    #[serde(alias = "predecessor_account_id", default)]
    from_account: Option<String>,
    #[serde(alias = "receiver_account_id", default)]
    to_account: Option<String>,
    #[serde(default)]
    deposit_yocto: Option<RawAmount>,
    #[serde(default)]
    gas_fee_yocto: Option<RawAmount>,
    #[serde(default)]
    actions_agg: Option<ActionsAgg>,
    #[serde(default)]
    outcomes_agg: Option<OutcomesAgg>,
    #[serde(default)]
    actions: Option<Vec<Action>>,
    #[serde(alias = "logs", default)]
    events: Option<Vec<EventLog>>,
    #[serde(default)]
    receipt_outcome: Option<ReceiptOutcome>,
}

/// One transaction or receipt row for an account, as produced by the fetch layer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RecordWire")]
pub struct RawTransactionRecord {
    pub operation_id: String,
    pub timestamp_nanos: u64,
    pub from_account: String,
    pub to_account: String,
    pub deposit_yocto: Option<RawAmount>,
    pub gas_fee_yocto: Option<RawAmount>,
    pub actions: Vec<Action>,
    pub events: Vec<EventLog>,
    pub receipt_outcome: Option<ReceiptOutcome>,
}

impl From<RecordWire> for RawTransactionRecord {
    fn from(wire: RecordWire) -> Self {
        let deposit_yocto = wire
            .deposit_yocto
            .or_else(|| wire.actions_agg.and_then(|agg| agg.deposit));
        let gas_fee_yocto = wire
            .gas_fee_yocto
            .or_else(|| wire.outcomes_agg.and_then(|agg| agg.transaction_fee));

        Self {
            operation_id: wire.operation_id.unwrap_or_default(),
            timestamp_nanos: wire.timestamp_nanos,
            from_account: wire.from_account.unwrap_or_default(),
            to_account: wire.to_account.unwrap_or_default(),
            deposit_yocto,
            gas_fee_yocto,
            actions: wire.actions.unwrap_or_default(),
            events: wire.events.unwrap_or_default(),
            receipt_outcome: wire.receipt_outcome,
        }
    }
}

impl RawTransactionRecord {
    /// Top-level events followed by the events nested in the receipt outcome
    pub fn all_events(&self) -> impl Iterator<Item = &EventLog> {
        let nested = self
            .receipt_outcome
            .as_ref()
            .and_then(|outcome| outcome.logs.as_ref())
            .map(|logs| logs.as_slice())
            .unwrap_or(&[]);
        self.events.iter().chain(nested.iter())
    }

    pub fn is_system_to_system(&self, system_account: &str) -> bool {
        self.from_account == system_account && self.to_account == system_account
    }

    pub fn touches_system(&self, system_account: &str) -> bool {
        self.from_account == system_account || self.to_account == system_account
    }

    /// First method name among the actions, `"Transfer"` for plain transfers
    pub fn primary_method(&self) -> String {
        self.actions
            .iter()
            .find_map(|action| action.method_name.clone())
            .unwrap_or_else(|| "Transfer".to_string())
    }
}

/// Records sharing one operation id
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionGroup {
    pub operation_id: String,

    /// Every member except system-to-system rows, in input order
    pub members: Vec<RawTransactionRecord>,

    /// Timestamp of the first member
    pub timestamp_nanos: u64,

    /// Receivers of the relevant members, first-seen order, no duplicates
    pub involved_contracts: Vec<String>,

    /// Indices into `members` of rows that do not touch the system account
    pub relevant: Vec<usize>,
}

impl TransactionGroup {
    pub fn relevant_members(&self) -> impl Iterator<Item = &RawTransactionRecord> {
        self.relevant.iter().map(move |&index| &self.members[index])
    }

    pub fn relevant_count(&self) -> usize {
        self.relevant.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Claim,
    Swap,
    TransferOut,
    TransferIn,
    TokenOut,
    TokenIn,
    ContractCall,
    Hidden,
}

/// What an operation is, with only the fields that make sense for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Claim {
        protocol: String,
        icon: String,
    },
    Swap {
        venue: String,
        sent: Decimal,
        received: Decimal,
        token_symbol: Option<String>,
    },
    TransferOut {
        counterparty: String,
    },
    TransferIn {
        counterparty: String,
    },
    TokenOut {
        symbol: String,
        contract: String,
    },
    TokenIn {
        symbol: String,
        contract: String,
    },
    ContractCall {
        member_count: usize,
    },
    Hidden,
}

impl OperationKind {
    pub fn category(&self) -> Category {
        match self {
            OperationKind::Claim { .. } => Category::Claim,
            OperationKind::Swap { .. } => Category::Swap,
            OperationKind::TransferOut { .. } => Category::TransferOut,
            OperationKind::TransferIn { .. } => Category::TransferIn,
            OperationKind::TokenOut { .. } => Category::TokenOut,
            OperationKind::TokenIn { .. } => Category::TokenIn,
            OperationKind::ContractCall { .. } => Category::ContractCall,
            OperationKind::Hidden => Category::Hidden,
        }
    }
}

/// One user-facing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedOperation {
    pub kind: OperationKind,
    pub category: Category,
    pub icon: String,
    pub label: String,

    /// NEAR amount, never negative
    pub amount: Decimal,
    pub show_amount: bool,
    pub timestamp_nanos: u64,
    pub member_count: usize,
    pub operation_ids: Vec<String>,

    /// Native flow over the whole group, system receipts included
    pub net_sent: Decimal,
    pub net_received: Decimal,

    /// Gas paid across members, in NEAR
    pub gas_fee: Decimal,
    pub involved_contracts: Vec<String>,

    /// Filled in by the pricing step, never by classification
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usd_value: Option<Decimal>,
}

impl ClassifiedOperation {
    pub fn is_hidden(&self) -> bool {
        self.category == Category::Hidden
    }

    pub fn involves(&self, contract: &str) -> bool {
        self.involved_contracts.iter().any(|c| c == contract)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

/// A fungible token movement; decimals are resolved on demand from `contract_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransferDetail {
    pub token_symbol: String,
    pub contract_id: String,
    pub raw_amount: RawAmount,
    pub direction: Direction,
}

/// Raw reference to one member record, for the expanded view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberReference {
    pub operation_id: String,
    pub contract: String,
    pub method: String,
}

/// Expandable detail of an operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationDetail {
    pub transfers: Vec<TokenTransferDetail>,
    pub gas_fee: Decimal,
    pub references: Vec<MemberReference>,
}

impl OperationDetail {
    pub fn incoming(&self) -> impl Iterator<Item = &TokenTransferDetail> {
        self.transfers
            .iter()
            .filter(|transfer| transfer.direction == Direction::In)
    }

    pub fn outgoing(&self) -> impl Iterator<Item = &TokenTransferDetail> {
        self.transfers
            .iter()
            .filter(|transfer| transfer.direction == Direction::Out)
    }

    pub fn absorb(&mut self, other: OperationDetail) {
        self.transfers.extend(other.transfers);
        self.gas_fee += other.gas_fee;
        self.references.extend(other.references);
    }
}

/// A classified operation travelling with its detail through merge and assembly
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedOperation {
    pub operation: ClassifiedOperation,
    pub detail: OperationDetail,
}

/// Detail records keyed by position in `ResultSet::operations`
pub type DetailIndex = BTreeMap<usize, OperationDetail>;

/// Ordered, bounded output of one analysis run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub operations: Vec<ClassifiedOperation>,

    /// Visible operations before truncation
    pub total: usize,

    /// Only operations with more than one member have an entry
    pub detail_index: DetailIndex,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn detail(&self, position: usize) -> Option<&OperationDetail> {
        self.detail_index.get(&position)
    }
}
