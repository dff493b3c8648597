// Source export import: header row + data rows

use std::path::Path;

use calamine::{open_workbook_auto, Sheets};
use distmerge_recon::source::SourceTable;

use crate::target::cell_from_data;
use crate::{is_delimited, read_workbook_sheet};

/// Read the distribution export. Delimited text goes through the CSV
/// reader; workbooks use `sheet` or their first sheet. The first row of the
/// used range is the header row.
pub fn read_table(path: &Path, sheet: Option<&str>) -> Result<SourceTable, String> {
    if is_delimited(path) {
        if sheet.is_some() {
            log::warn!("{} is a delimited file; ignoring the sheet name", path.display());
        }
        return crate::csv::read_table(path);
    }

    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
    let (sheet_name, range) = read_workbook_sheet(&mut workbook, sheet)?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|header| header.iter().map(|d| cell_from_data(d).display().trim().to_string()).collect())
        .unwrap_or_default();
    if headers.is_empty() {
        return Err(format!("Sheet '{}' in {} is empty", sheet_name, path.display()));
    }

    let rows: Vec<_> = rows
        .map(|row| row.iter().map(cell_from_data).collect::<Vec<_>>())
        .filter(|row: &Vec<_>| row.iter().any(|c| !c.is_empty()))
        .collect();

    log::debug!("read {} source row(s) from sheet '{}'", rows.len(), sheet_name);
    Ok(SourceTable { headers, rows })
}
