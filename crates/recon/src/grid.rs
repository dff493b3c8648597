use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Cell values
// ---------------------------------------------------------------------------

/// A single scalar cell value.
///
/// `Formula` keeps the source including the leading `=`; nothing in this
/// crate evaluates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Formula(String),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed text content, if this is a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.trim()),
            _ => None,
        }
    }

    /// Human-readable rendering, used for names read out of numeric cells
    /// and for CLI output.
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Formula(f) => f.clone(),
        }
    }
}

static EMPTY: CellValue = CellValue::Empty;

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Sparse, zero-indexed cell grid standing in for one worksheet.
///
/// Cells written through [`Grid::set`] are remembered as edits so the codec
/// can save only what changed. [`Grid::load`] is for importers and does not
/// count as an edit.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    cells: BTreeMap<(usize, usize), CellValue>,
    edits: BTreeSet<(usize, usize)>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a grid from dense rows starting at A1. Nothing is marked edited.
    pub fn from_rows(rows: Vec<Vec<CellValue>>) -> Self {
        let mut grid = Self::new();
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                grid.load(r, c, value);
            }
        }
        grid
    }

    pub fn get(&self, row: usize, col: usize) -> &CellValue {
        self.cells.get(&(row, col)).unwrap_or(&EMPTY)
    }

    /// Trimmed text of a text cell.
    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        self.get(row, col).as_text()
    }

    /// Store an imported value without recording an edit.
    pub fn load(&mut self, row: usize, col: usize, value: CellValue) {
        if matches!(value, CellValue::Empty) {
            self.cells.remove(&(row, col));
        } else {
            self.cells.insert((row, col), value);
        }
    }

    /// Write a value and record the coordinate as edited.
    pub fn set(&mut self, row: usize, col: usize, value: CellValue) {
        self.load(row, col, value);
        self.edits.insert((row, col));
    }

    /// One past the last populated row.
    pub fn row_count(&self) -> usize {
        self.cells.keys().map(|(r, _)| r + 1).max().unwrap_or(0)
    }

    /// One past the last populated column.
    pub fn col_count(&self) -> usize {
        self.cells.keys().map(|(_, c)| c + 1).max().unwrap_or(0)
    }

    /// Populated cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &CellValue)> {
        self.cells.iter().map(|(&(r, c), v)| (r, c, v))
    }

    /// Edited cells in row-major order, with their current value.
    pub fn edits(&self) -> impl Iterator<Item = (usize, usize, &CellValue)> {
        self.edits.iter().map(|&(r, c)| (r, c, self.get(r, c)))
    }

    pub fn edit_count(&self) -> usize {
        self.edits.len()
    }

    pub fn is_edited(&self, row: usize, col: usize) -> bool {
        self.edits.contains(&(row, col))
    }
}

// ---------------------------------------------------------------------------
// A1 addressing
// ---------------------------------------------------------------------------

/// Convert column index to letter (0 -> A, 1 -> B, 26 -> AA, etc.)
pub fn col_to_letter(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Convert column letters to a zero-based index (A -> 0, AA -> 26).
pub fn letter_to_col(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut n = 0usize;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        n = n * 26 + (ch.to_ascii_uppercase() as u8 - b'A') as usize + 1;
    }
    Some(n - 1)
}

/// A1-style reference for a zero-indexed coordinate (row 0, col 5 -> "F1").
pub fn cell_ref(row: usize, col: usize) -> String {
    format!("{}{}", col_to_letter(col), row + 1)
}

/// Parse an A1-style reference ("F6", "$F$6") into a zero-indexed coordinate.
pub fn parse_cell_ref(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let col = letter_to_col(&reference[..split])?;
    let row: usize = reference[split..].parse().ok()?;
    row.checked_sub(1).map(|row| (row, col))
}
