use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One row of the source table after parsing.
///
/// `date` and `amount` are `None` when the raw cell could not be parsed;
/// such records never reach a grid cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    pub raw_entity: String,
    pub date: Option<NaiveDate>,
    pub amount: Option<f64>,
}

/// Raw source name -> canonical target name. An empty target means
/// "do not map".
pub type EntityMapping = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Template axes
// ---------------------------------------------------------------------------

/// Entity rows found between the entity label row and the GP row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityAxis {
    pub label_row: usize,
    pub gp_row: usize,
    pub entries: Vec<EntityRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRow {
    pub row: usize,
    pub name: String,
}

impl EntityAxis {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }
}

/// Column -> distribution date, for every column carrying the date header.
/// `None` marks a header whose date could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateAxis {
    pub header_row: usize,
    pub columns: BTreeMap<usize, Option<NaiveDate>>,
}

impl DateAxis {
    /// Parsed dates, in column order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.columns.values().filter_map(|d| *d)
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.dates().any(|d| d == date)
    }

    pub fn unparsed_columns(&self) -> usize {
        self.columns.values().filter(|d| d.is_none()).count()
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Best-guess target for one source name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub source: String,
    /// Empty when nothing scored above the cutoff.
    pub target: String,
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

/// Group key = (canonical entity, distribution date).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityDateKey {
    pub entity: String,
    pub date: NaiveDate,
}

impl EntityDateKey {
    pub fn new(entity: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            entity: entity.into(),
            date,
        }
    }
}

impl std::fmt::Display for EntityDateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on {}", self.entity, self.date)
    }
}

/// Amounts sharing one key, in source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub key: EntityDateKey,
    pub amounts: Vec<f64>,
}

impl DuplicateGroup {
    pub fn sum(&self) -> f64 {
        self.amounts.iter().sum()
    }
}

/// Output of grouping: keys with several amounts need a choice, the rest
/// pass through with their single amount.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Grouping {
    pub duplicates: Vec<DuplicateGroup>,
    pub singles: BTreeMap<EntityDateKey, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    Sum,
    Pick(f64),
}

impl Default for ResolutionChoice {
    fn default() -> Self {
        Self::Sum
    }
}

impl std::fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sum => write!(f, "sum"),
            Self::Pick(amount) => write!(f, "{amount}"),
        }
    }
}

/// Final amount per (entity, date).
pub type ResolvedAmounts = BTreeMap<EntityDateKey, f64>;

// ---------------------------------------------------------------------------
// Distribution types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionType {
    PreferredReturn,
    Interest,
    Profit,
    ReturnOfCapital,
    Principal,
    Promote,
    CatchUp,
    AvailableCashProfit,
}

impl Default for DistributionType {
    fn default() -> Self {
        Self::PreferredReturn
    }
}

impl DistributionType {
    pub const ALL: [DistributionType; 8] = [
        Self::PreferredReturn,
        Self::Interest,
        Self::Profit,
        Self::ReturnOfCapital,
        Self::Principal,
        Self::Promote,
        Self::CatchUp,
        Self::AvailableCashProfit,
    ];

    /// Text written into the template.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PreferredReturn => "Preferred Return",
            Self::Interest => "Interest",
            Self::Profit => "Profit",
            Self::ReturnOfCapital => "Return of Capital",
            Self::Principal => "Principal",
            Self::Promote => "Promote",
            Self::CatchUp => "Catch Up",
            Self::AvailableCashProfit => "Available Cash (Profit)",
        }
    }
}

impl std::fmt::Display for DistributionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteReport {
    pub written: usize,
    /// Target cells with no source amount; left untouched.
    pub unmatched: Vec<EntityDateKey>,
    /// Date columns skipped because their date did not parse.
    pub skipped_columns: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppendReport {
    /// Dates that received a block, placeholders included, in block order.
    pub dates: Vec<NaiveDate>,
    pub placeholders: usize,
    /// First column of each appended block.
    pub block_columns: Vec<usize>,
    pub existing_blocks: usize,
}
