// Target template import: first worksheet -> headerless grid

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use distmerge_recon::dates::{parse_date_text, serial_to_date};
use distmerge_recon::grid::{CellValue, Grid};

use crate::{is_delimited, read_workbook_sheet};

/// Read the template as a grid with absolute coordinates (A1 = (0, 0)).
///
/// Workbooks (xlsx, xlsm, xls, xlsb, ods) are read with their first sheet;
/// delimited text is read as-is. Date-typed cells become `Date`. A formula
/// cell keeps its cached value when it has one, and its source otherwise.
pub fn read_grid(path: &Path) -> Result<Grid, String> {
    if is_delimited(path) {
        return crate::csv::read_grid(path);
    }

    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
    let (sheet_name, range) = read_workbook_sheet(&mut workbook, None)?;

    let mut grid = Grid::new();
    load_range(&mut grid, &range);

    if let Ok(formulas) = workbook.worksheet_formula(&sheet_name) {
        let (start_row, start_col) = formulas.start().unwrap_or((0, 0));
        for (r, row) in formulas.rows().enumerate() {
            for (c, source) in row.iter().enumerate() {
                let (row, col) = (start_row as usize + r, start_col as usize + c);
                if !source.is_empty() && grid.get(row, col).is_empty() {
                    grid.load(row, col, CellValue::Formula(format!("={source}")));
                }
            }
        }
    }

    log::debug!(
        "read target sheet '{}' from {}: {} rows x {} cols",
        sheet_name,
        path.display(),
        grid.row_count(),
        grid.col_count()
    );
    Ok(grid)
}

fn load_range(grid: &mut Grid, range: &Range<Data>) {
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    for (r, row) in range.rows().enumerate() {
        for (c, data) in row.iter().enumerate() {
            let value = cell_from_data(data);
            if !matches!(value, CellValue::Empty) {
                grid.load(start_row as usize + r, start_col as usize + c, value);
            }
        }
    }
}

/// Calamine value -> grid cell.
pub(crate) fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::text(if *b { "TRUE" } else { "FALSE" }),
        Data::Error(e) => CellValue::Text(format!("#{e:?}")),
        Data::DateTime(dt) => match serial_to_date(dt.as_f64()) {
            Some(date) if dt.is_datetime() => CellValue::Date(date),
            _ => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => match parse_date_text(s) {
            Some(date) => CellValue::Date(date),
            None => CellValue::Text(s.clone()),
        },
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}
