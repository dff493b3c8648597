use std::fmt;

use chrono::NaiveDate;

/// The target grid does not follow the expected template layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// No entity label row in the entity column.
    MissingEntityLabel { label: String, column: String },
    /// No GP row below the entity label row.
    MissingGpLabel { label: String, column: String, below_row: usize },
    /// The date header row would sit above the first row.
    HeaderRowOutOfRange { label_row: usize, rows_above: usize },
    /// No column carries the date header.
    NoDateColumns { header: String, row: usize },
    /// No distribution block at the configured first block column.
    NoExistingBlock { column: String },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot find expected layout: ")?;
        match self {
            Self::MissingEntityLabel { label, column } => {
                write!(f, "no '{label}' row in column {column}")
            }
            Self::MissingGpLabel { label, column, below_row } => {
                write!(f, "no '{label}' row in column {column} below row {}", below_row + 1)
            }
            Self::HeaderRowOutOfRange { label_row, rows_above } => {
                write!(
                    f,
                    "date header row would be {rows_above} row(s) above row {}, outside the sheet",
                    label_row + 1
                )
            }
            Self::NoDateColumns { header, row } => {
                write!(f, "no '{header}' header in row {}", row + 1)
            }
            Self::NoExistingBlock { column } => {
                write!(f, "no distribution block starting at column {column}")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

#[derive(Debug)]
pub enum ReconError {
    /// Target template layout could not be located.
    Layout(LayoutError),
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad offsets, bad cutoff, etc.).
    ConfigValidation(String),
    /// Missing required column in the source table.
    MissingColumn { column: String },
    /// A duplicate choice names an amount that is not in its group.
    InvalidChoice { entity: String, date: NaiveDate, amount: f64 },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layout(err) => write!(f, "{err}"),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { column } => {
                write!(f, "source table: missing column '{column}'")
            }
            Self::InvalidChoice { entity, date, amount } => {
                write!(f, "'{entity}' on {date}: chosen amount {amount} is not one of the duplicates")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Layout(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LayoutError> for ReconError {
    fn from(err: LayoutError) -> Self {
        Self::Layout(err)
    }
}
