// Spreadsheet I/O for the distribution merge tool

use std::io::{Read, Seek};
use std::path::Path;

use calamine::{Data, Range, Reader, Sheets};

pub mod csv;
pub mod package;
pub mod patch;
pub mod sheet_xml;
pub mod source;
pub mod styles;
pub mod target;

/// Output name for the complete flow.
pub const COMPLETE_OUTPUT: &str = "updated_target.xlsx";
/// Output name for the incomplete flow.
pub const EXTEND_OUTPUT: &str = "populated_incomplete_filtered.xlsx";

pub(crate) fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub(crate) fn is_delimited(path: &Path) -> bool {
    matches!(extension(path).as_str(), "csv" | "tsv" | "txt")
}

/// `name`, or the first sheet when `None`, together with its used range.
pub(crate) fn read_workbook_sheet<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
    name: Option<&str>,
) -> Result<(String, Range<Data>), String> {
    let names = workbook.sheet_names().to_vec();
    let sheet = match name {
        Some(name) => names
            .iter()
            .find(|n| n.as_str() == name)
            .cloned()
            .ok_or_else(|| format!("Sheet '{}' not found (available: {})", name, names.join(", ")))?,
        None => names.first().cloned().ok_or_else(|| "Workbook contains no sheets".to_string())?,
    };
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| format!("Failed to read sheet '{}': {}", sheet, e))?;
    Ok((sheet, range))
}
