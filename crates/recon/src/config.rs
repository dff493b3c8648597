use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::{DistributionType, ResolutionChoice};

// ---------------------------------------------------------------------------
// Job file
// ---------------------------------------------------------------------------

/// One run of the tool: input files, column selection and every choice the
/// user has made so far. Stages read it and `suggest --write` updates it, so
/// choices persist between invocations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobConfig {
    pub source: String,
    pub target: String,
    /// Source sheet name; the first sheet when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Bulk "sum all duplicates" action; overrides `duplicates`.
    #[serde(default)]
    pub sum_all: bool,
    pub columns: ColumnSelection,
    #[serde(default)]
    pub matcher: MatcherConfig,
    /// Manual overrides: raw source name -> canonical name ("" = do not map).
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<DuplicateChoiceEntry>,
    #[serde(default)]
    pub extend: ExtendConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnSelection {
    /// Investing entity column header (complete flow).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub date: String,
    /// Amount column header (complete flow).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

/// Resolved column headers for the complete flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumns {
    pub entity: String,
    pub date: String,
    pub amount: String,
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatcherConfig {
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
}

fn default_cutoff() -> f64 {
    0.6
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { cutoff: default_cutoff() }
    }
}

// ---------------------------------------------------------------------------
// Duplicate choices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DuplicateChoiceEntry {
    pub entity: String,
    pub date: NaiveDate,
    pub choice: ChoiceValue,
}

/// `"sum"` or one of the group's amounts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChoiceValue {
    Amount(f64),
    Keyword(String),
}

impl ChoiceValue {
    pub fn to_choice(&self) -> Result<ResolutionChoice, ReconError> {
        match self {
            Self::Amount(a) => Ok(ResolutionChoice::Pick(*a)),
            Self::Keyword(k) if k.eq_ignore_ascii_case("sum") => Ok(ResolutionChoice::Sum),
            Self::Keyword(k) => Err(ReconError::ConfigValidation(format!(
                "duplicate choice must be \"sum\" or an amount, got \"{k}\""
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Incomplete flow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtendConfig {
    #[serde(default)]
    pub distribution_type: DistributionType,
    /// Explicit multi-select; every candidate date when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dates: Option<Vec<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
    /// Year written into each new block's label row; the current year when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_year: Option<i32>,
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Positional conventions of the target import template. All indices are
/// zero-based; the defaults describe the stock template (entity names in
/// column C, first distribution block at column F).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub entity_column: usize,
    pub entity_label: String,
    pub gp_label: String,
    pub date_header: String,
    /// Rows between the date header row and the entity label row.
    pub date_header_rows_above: usize,
    /// Column of the written amount relative to the date header column.
    /// The gross sub-column sits one to the left of "Last Day".
    pub amount_column_offset: i64,
    pub block: BlockLayout,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            entity_column: 2,
            entity_label: "Investing Entity".into(),
            gp_label: "GP".into(),
            date_header: "Last Day".into(),
            date_header_rows_above: 2,
            amount_column_offset: -1,
            block: BlockLayout::default(),
        }
    }
}

/// Shape of one repeating distribution block.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockLayout {
    pub first_column: usize,
    pub width: usize,
    /// Rows copied verbatim from the first block.
    pub header_rows: Vec<usize>,
    pub short_label_row: usize,
    pub full_label_row: usize,
    /// Column offset of the date header, and of the existing date in the
    /// full-label row.
    pub existing_date_offset: usize,
    pub gross: usize,
    pub transfer: usize,
    pub promote: usize,
    pub adjustment: usize,
    pub net: usize,
    pub payment_date: usize,
    pub currency: String,
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self {
            first_column: 5,
            width: 7,
            header_rows: vec![0, 2, 4],
            short_label_row: 1,
            full_label_row: 3,
            existing_date_offset: 1,
            gross: 0,
            transfer: 1,
            promote: 2,
            adjustment: 3,
            net: 4,
            payment_date: 5,
            currency: "USD".into(),
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.date_header_rows_above == 0 {
            return Err(ReconError::ConfigValidation(
                "layout.date_header_rows_above must be at least 1".into(),
            ));
        }
        let b = &self.block;
        if b.width == 0 {
            return Err(ReconError::ConfigValidation("layout.block.width must be positive".into()));
        }
        let offsets = [
            ("existing_date_offset", b.existing_date_offset),
            ("gross", b.gross),
            ("transfer", b.transfer),
            ("promote", b.promote),
            ("adjustment", b.adjustment),
            ("net", b.net),
            ("payment_date", b.payment_date),
        ];
        for (name, offset) in offsets {
            if offset >= b.width {
                return Err(ReconError::ConfigValidation(format!(
                    "layout.block.{name} = {offset} lies outside a block of width {}",
                    b.width
                )));
            }
        }
        if b.header_rows.is_empty() {
            return Err(ReconError::ConfigValidation(
                "layout.block.header_rows must list at least one row".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl JobConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: JobConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ReconError> {
        toml::to_string_pretty(self).map_err(|e| ReconError::ConfigParse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.source.trim().is_empty() || self.target.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "both source and target files are required".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.matcher.cutoff) {
            return Err(ReconError::ConfigValidation(format!(
                "matcher.cutoff must be within [0, 1], got {}",
                self.matcher.cutoff
            )));
        }

        for entry in &self.duplicates {
            entry.choice.to_choice()?;
        }

        if let (Some(from), Some(to)) = (self.extend.from, self.extend.to) {
            if from > to {
                return Err(ReconError::ConfigValidation(format!(
                    "extend.from ({from}) is after extend.to ({to})"
                )));
            }
        }

        self.layout.validate()
    }

    /// Column headers needed by the complete flow.
    pub fn complete_columns(&self) -> Result<SourceColumns, ReconError> {
        let entity = self.columns.entity.clone().ok_or_else(|| {
            ReconError::ConfigValidation("columns.entity is required for the complete flow".into())
        })?;
        let amount = self.columns.amount.clone().ok_or_else(|| {
            ReconError::ConfigValidation("columns.amount is required for the complete flow".into())
        })?;
        Ok(SourceColumns {
            entity,
            date: self.columns.date.clone(),
            amount,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
