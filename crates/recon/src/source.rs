//! Source table -> Source Records.
//!
//! The table is whatever the codec read from the distribution export: one
//! header row and data rows of scalar cells. Columns are picked by header
//! name.

use chrono::NaiveDate;
use serde::Serialize;

use crate::dates::parse_date_cell;
use crate::error::ReconError;
use crate::grid::CellValue;
use crate::model::SourceRecord;

/// Header row plus data rows, as read from the source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SourceTable {
    /// Parse CSV text. The first record is the header row; every field is
    /// kept as text and blank fields become `Empty`.
    pub fn from_csv(data: &str, delimiter: u8) -> Result<Self, ReconError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ReconError::Io(e.to_string()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ReconError::Io(e.to_string()))?;
            rows.push(
                record
                    .iter()
                    .map(|field| if field.trim().is_empty() { CellValue::Empty } else { CellValue::text(field) })
                    .collect(),
            );
        }
        Ok(Self { headers, rows })
    }

    pub fn column(&self, header: &str) -> Result<usize, ReconError> {
        self.headers
            .iter()
            .position(|h| h.trim() == header.trim())
            .ok_or_else(|| ReconError::MissingColumn { column: header.to_string() })
    }

    /// Distinct values of one column parsed as dates, sorted, with the
    /// number of rows whose cell did not parse.
    pub fn column_dates(&self, header: &str) -> Result<ColumnDates, ReconError> {
        let col = self.column(header)?;
        let mut found = ColumnDates::default();
        for row in &self.rows {
            match row.get(col).and_then(parse_date_cell) {
                Some(date) => found.dates.push(date),
                None => found.unparseable += 1,
            }
        }
        found.dates.sort();
        found.dates.dedup();

        if found.unparseable > 0 {
            log::warn!("{} source row(s) have unparseable dates and will be skipped", found.unparseable);
        }
        Ok(found)
    }
}

/// Candidate dates read from a source column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnDates {
    pub dates: Vec<NaiveDate>,
    pub unparseable: usize,
}

/// Which headers hold the entity, date and amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordColumns<'a> {
    pub entity: &'a str,
    pub date: &'a str,
    pub amount: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadedRecords {
    pub records: Vec<SourceRecord>,
    pub unparseable_dates: usize,
    pub unparseable_amounts: usize,
}

/// Build records from the selected columns.
///
/// Rows with a blank entity are dropped. A date or amount that does not
/// parse is counted and kept as `None`; grouping ignores such records.
pub fn load_records(table: &SourceTable, columns: &RecordColumns<'_>) -> Result<LoadedRecords, ReconError> {
    let entity_col = table.column(columns.entity)?;
    let date_col = table.column(columns.date)?;
    let amount_col = table.column(columns.amount)?;

    let mut loaded = LoadedRecords::default();
    for row in &table.rows {
        let cell = |col: usize| row.get(col).unwrap_or(&CellValue::Empty);

        let raw_entity = cell(entity_col).display().trim().to_string();
        if raw_entity.is_empty() {
            continue;
        }

        let date = parse_date_cell(cell(date_col));
        if date.is_none() {
            loaded.unparseable_dates += 1;
        }
        let amount = parse_amount_cell(cell(amount_col));
        if amount.is_none() {
            loaded.unparseable_amounts += 1;
        }

        loaded.records.push(SourceRecord { raw_entity, date, amount });
    }

    if loaded.unparseable_dates > 0 {
        log::warn!("{} source row(s) have a date that could not be parsed", loaded.unparseable_dates);
    }
    if loaded.unparseable_amounts > 0 {
        log::warn!("{} source row(s) have an amount that could not be parsed", loaded.unparseable_amounts);
    }
    Ok(loaded)
}

/// Raw entity names in first-seen order.
pub fn distinct_entities(records: &[SourceRecord]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.raw_entity.as_str()))
        .map(|r| r.raw_entity.clone())
        .collect()
}

pub fn parse_amount_cell(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) if n.is_finite() => Some(*n),
        CellValue::Text(s) => parse_amount_text(s),
        _ => None,
    }
}

/// Accepts "1250", "-1,250.50", "$1,250.00", "(300)" and "USD 40".
pub fn parse_amount_text(input: &str) -> Option<f64> {
    let mut s = input.trim();
    let mut negative = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.trim_start();
    }

    let cleaned: String = s
        .trim_start_matches("USD")
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn table() -> SourceTable {
        SourceTable {
            headers: vec!["Investor".into(), " Date ".into(), "Amount".into()],
            rows: vec![
                vec![CellValue::text("Jon Smith"), CellValue::text("1/15/2024"), CellValue::Number(100.0)],
                vec![CellValue::text(" John Smith "), CellValue::Date(d(2024, 1, 15)), CellValue::text("$50.00")],
                vec![CellValue::Empty, CellValue::text("1/15/2024"), CellValue::Number(9.0)],
                vec![CellValue::text("Acme LLC"), CellValue::text("not a date"), CellValue::text("(300)")],
                vec![CellValue::text("Jon Smith"), CellValue::Number(45382.0), CellValue::text("n/a")],
            ],
        }
    }

    const COLS: RecordColumns<'static> = RecordColumns { entity: "Investor", date: "Date", amount: "Amount" };

    #[test]
    fn loads_and_counts_bad_cells() {
        let loaded = load_records(&table(), &COLS).unwrap();
        assert_eq!(loaded.records.len(), 4);
        assert_eq!(loaded.unparseable_dates, 1);
        assert_eq!(loaded.unparseable_amounts, 1);

        assert_eq!(loaded.records[0].date, Some(d(2024, 1, 15)));
        assert_eq!(loaded.records[1].raw_entity, "John Smith");
        assert_eq!(loaded.records[1].amount, Some(50.0));
        assert_eq!(loaded.records[2].amount, Some(-300.0));
        assert_eq!(loaded.records[2].date, None);
        assert_eq!(loaded.records[3].date, Some(d(2024, 3, 31)));
        assert_eq!(loaded.records[3].amount, None);
    }

    #[test]
    fn missing_header_is_reported() {
        let cols = RecordColumns { amount: "Net", ..COLS };
        let err = load_records(&table(), &cols).unwrap_err();
        assert!(matches!(err, ReconError::MissingColumn { ref column } if column == "Net"));
    }

    #[test]
    fn distinct_names_keep_first_seen_order() {
        let loaded = load_records(&table(), &COLS).unwrap();
        assert_eq!(distinct_entities(&loaded.records), vec!["Jon Smith", "John Smith", "Acme LLC"]);
    }

    #[test]
    fn column_dates_are_sorted_and_unique() {
        let found = table().column_dates("Date").unwrap();
        assert_eq!(found.dates, vec![d(2024, 1, 15), d(2024, 3, 31)]);
        assert_eq!(found.unparseable, 1);
    }

    #[test]
    fn column_dates_count_blank_and_text_cells() {
        let table = SourceTable {
            headers: vec!["Date".into()],
            rows: vec![
                vec![CellValue::text("1/15/2024")],
                vec![CellValue::text("TBD")],
                vec![CellValue::Empty],
                vec![],
            ],
        };
        let found = table.column_dates("Date").unwrap();
        assert_eq!(found.dates, vec![d(2024, 1, 15)]);
        assert_eq!(found.unparseable, 3);
    }

    #[test]
    fn csv_text_becomes_a_table() {
        let data = "\u{feff}Investor;Date;Amount\nJon Smith;1/15/2024;\"$1,250.00\"\n;;\nAcme LLC;3/31/2024\n";
        let table = SourceTable::from_csv(data, b';').unwrap();
        assert_eq!(table.headers, vec!["Investor", "Date", "Amount"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[1], vec![CellValue::Empty, CellValue::Empty, CellValue::Empty]);

        let loaded = load_records(&table, &COLS).unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.records[0].amount, Some(1250.0));
        assert_eq!(loaded.unparseable_amounts, 1);
    }

    #[test]
    fn amount_text_forms() {
        assert_eq!(parse_amount_text("1250"), Some(1250.0));
        assert_eq!(parse_amount_text("$1,250.00"), Some(1250.0));
        assert_eq!(parse_amount_text("-1,250.50"), Some(-1250.5));
        assert_eq!(parse_amount_text("( 300 )"), Some(-300.0));
        assert_eq!(parse_amount_text("USD 40"), Some(40.0));
        assert_eq!(parse_amount_text(""), None);
        assert_eq!(parse_amount_text("$"), None);
        assert_eq!(parse_amount_text("twelve"), None);
    }
}
