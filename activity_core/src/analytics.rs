use chrono::{DateTime, Datelike, Utc, Weekday};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::types::{Category, ClassifiedOperation};

/// How many contracts the summary ranks
const TOP_CONTRACTS: usize = 6;

const MAX_CONTRACT_NAME_CHARS: usize = 20;
const SHORTENED_CONTRACT_NAME_CHARS: usize = 15;

/// Display names for protocols users recognise by brand
const KNOWN_PROTOCOLS: &[(&str, &str, &str, CategoryGroup)] = &[
    ("game.hot.tg", "Hot Protocol", "🔥", CategoryGroup::Gaming),
    ("v2.ref-finance.near", "Ref Finance", "💱", CategoryGroup::Defi),
    ("harvest-moon.near", "Moon Protocol", "🌙", CategoryGroup::Gaming),
];

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryGroup {
    Gaming,
    Defi,
    Transfers,
    Other,
}

impl CategoryGroup {
    pub fn of(category: Category) -> Self {
        match category {
            Category::Claim => CategoryGroup::Gaming,
            Category::Swap | Category::TokenIn | Category::TokenOut => CategoryGroup::Defi,
            Category::TransferIn | Category::TransferOut => CategoryGroup::Transfers,
            Category::ContractCall | Category::Hidden => CategoryGroup::Other,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CategoryGroup::Gaming => "Gaming",
            CategoryGroup::Defi => "DeFi",
            CategoryGroup::Transfers => "Transfers",
            CategoryGroup::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub group: CategoryGroup,
    pub count: usize,

    /// Share of all operations, rounded to a whole percent
    pub percent: u32,

    /// NEAR sent by operations in this group
    pub near_spent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractActivity {
    pub contract: String,
    pub display_name: String,
    pub icon: String,
    pub category: String,
    pub operations: usize,
    pub gas_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayActivity {
    pub weekday: String,
    pub operations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub total_operations: usize,
    pub total_gas: Decimal,
    pub unique_contracts: usize,
    pub categories: Vec<CategoryBreakdown>,
    pub top_contracts: Vec<ContractActivity>,
    pub most_active_contract: Option<String>,

    /// Monday first, UTC
    pub weekday_activity: Vec<WeekdayActivity>,
}

struct ContractTally {
    operations: usize,
    gas_fee: Decimal,
    group: CategoryGroup,
}

/// Summarize a list of visible operations.
///
/// Contracts are counted once per operation they take part in; the system
/// account is never counted.
pub fn summarize(operations: &[ClassifiedOperation], system_account: &str) -> ActivitySummary {
    let total_operations = operations.len();
    let total_gas = operations.iter().map(|op| op.gas_fee).sum();

    let mut first_seen: Vec<&str> = Vec::new();
    let mut tallies: HashMap<&str, ContractTally> = HashMap::new();
    for operation in operations {
        let group = CategoryGroup::of(operation.category);
        let mut seen_here = HashSet::new();
        for contract in &operation.involved_contracts {
            if contract == system_account || !seen_here.insert(contract.as_str()) {
                continue;
            }
            let tally = tallies.entry(contract.as_str()).or_insert_with(|| {
                first_seen.push(contract.as_str());
                ContractTally {
                    operations: 0,
                    gas_fee: Decimal::ZERO,
                    group,
                }
            });
            tally.operations += 1;
            tally.gas_fee += operation.gas_fee;
            tally.group = group;
        }
    }

    let mut ranked: Vec<&str> = first_seen.clone();
    ranked.sort_by(|a, b| tallies[b].operations.cmp(&tallies[a].operations));
    let top_contracts: Vec<ContractActivity> = ranked
        .into_iter()
        .take(TOP_CONTRACTS)
        .map(|contract| contract_activity(contract, &tallies[contract]))
        .collect();
    let most_active_contract = top_contracts.first().map(|top| top.display_name.clone());

    debug!(
        "Summarized {} operations over {} contracts",
        total_operations,
        first_seen.len()
    );

    ActivitySummary {
        total_operations,
        total_gas,
        unique_contracts: first_seen.len(),
        categories: category_breakdown(operations),
        top_contracts,
        most_active_contract,
        weekday_activity: weekday_activity(operations),
    }
}

fn category_breakdown(operations: &[ClassifiedOperation]) -> Vec<CategoryBreakdown> {
    let total = operations.len();
    [
        CategoryGroup::Gaming,
        CategoryGroup::Defi,
        CategoryGroup::Transfers,
        CategoryGroup::Other,
    ]
    .into_iter()
    .filter_map(|group| {
        let members: Vec<&ClassifiedOperation> = operations
            .iter()
            .filter(|op| CategoryGroup::of(op.category) == group)
            .collect();
        // "other" is only listed when something falls into it
        if members.is_empty() && group == CategoryGroup::Other {
            return None;
        }
        Some(CategoryBreakdown {
            group,
            count: members.len(),
            percent: percent(members.len(), total),
            near_spent: members.iter().map(|op| op.net_sent).sum(),
        })
    })
    .collect()
}

fn percent(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let share = Decimal::from(count as u64 * 100) / Decimal::from(total as u64);
    share.round().to_u32().unwrap_or(0)
}

fn contract_activity(contract: &str, tally: &ContractTally) -> ContractActivity {
    match KNOWN_PROTOCOLS.iter().find(|(known, ..)| *known == contract) {
        Some((_, name, icon, group)) => ContractActivity {
            contract: contract.to_string(),
            display_name: name.to_string(),
            icon: icon.to_string(),
            category: group.display_name().to_string(),
            operations: tally.operations,
            gas_fee: tally.gas_fee,
        },
        None => ContractActivity {
            contract: contract.to_string(),
            display_name: short_contract_name(contract),
            icon: "📝".to_string(),
            category: tally.group.display_name().to_string(),
            operations: tally.operations,
            gas_fee: tally.gas_fee,
        },
    }
}

fn short_contract_name(contract: &str) -> String {
    let first = contract.split('.').next().unwrap_or(contract);
    if first.chars().count() <= MAX_CONTRACT_NAME_CHARS {
        first.to_string()
    } else {
        let prefix: String = first.chars().take(SHORTENED_CONTRACT_NAME_CHARS).collect();
        format!("{}...", prefix)
    }
}

fn weekday_activity(operations: &[ClassifiedOperation]) -> Vec<WeekdayActivity> {
    let mut counts = [0usize; 7];
    for operation in operations {
        if let Some(weekday) = weekday_of(operation.timestamp_nanos) {
            counts[weekday.num_days_from_monday() as usize] += 1;
        }
    }

    WEEKDAYS
        .iter()
        .zip(counts)
        .map(|(weekday, operations)| WeekdayActivity {
            weekday: weekday.to_string(),
            operations,
        })
        .collect()
}

fn weekday_of(timestamp_nanos: u64) -> Option<Weekday> {
    if timestamp_nanos == 0 {
        return None;
    }
    let seconds = i64::try_from(timestamp_nanos / 1_000_000_000).ok()?;
    let nanos = (timestamp_nanos % 1_000_000_000) as u32;
    DateTime::<Utc>::from_timestamp(seconds, nanos).map(|moment| moment.weekday())
}
