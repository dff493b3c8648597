// Saving a filled-in template
//
// xlsx templates are patched in place: only the first worksheet, the
// stylesheet (when dates need a format) and the workbook part change.
// Anything else is exported as a fresh values-only workbook.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Cursor;
use std::path::Path;

use distmerge_recon::dates::date_to_serial;
use distmerge_recon::grid::{CellValue, Grid};
use rust_xlsxwriter::{Format, Workbook};
use zip::ZipArchive;

use crate::extension;
use crate::package::{
    first_worksheet_path, read_part, set_full_calc_on_load, write_package, STYLES_PART, WORKBOOK_PART,
};
use crate::sheet_xml::{cell_styles, patch_worksheet, CellEdits};
use crate::styles::{add_date_styles, DATE_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Original package rewritten with the edits applied.
    Patched,
    /// New workbook holding cell values only.
    Exported,
}

impl SaveMode {
    pub fn label(self) -> &'static str {
        match self {
            SaveMode::Patched => "patched",
            SaveMode::Exported => "exported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub mode: SaveMode,
    /// Worksheet part that was rewritten, when patching.
    pub sheet_part: Option<String>,
    pub cells_written: usize,
    pub cells_replaced: usize,
    pub cells_inserted: usize,
    pub rows_inserted: usize,
    pub date_styles_added: usize,
}

impl SaveReport {
    fn new(mode: SaveMode) -> Self {
        Self {
            mode,
            sheet_part: None,
            cells_written: 0,
            cells_replaced: 0,
            cells_inserted: 0,
            rows_inserted: 0,
            date_styles_added: 0,
        }
    }
}

/// Save `grid` (read from `original`) to `output`.
///
/// `.xlsx`/`.xlsm` templates keep every part they had; only edited cells
/// change. Other formats fall back to [`export_values`].
pub fn save_patched(original: &Path, grid: &Grid, output: &Path) -> Result<SaveReport, String> {
    if !matches!(extension(original).as_str(), "xlsx" | "xlsm") {
        log::info!("{} is not an xlsx package; exporting values only", original.display());
        return export_values(grid, output);
    }

    let bytes = fs::read(original).map_err(|e| format!("Failed to read {}: {}", original.display(), e))?;
    let edits: CellEdits = grid.edits().map(|(r, c, v)| ((r, c), v.clone())).collect();
    let mut report = SaveReport::new(SaveMode::Patched);

    if edits.is_empty() {
        log::debug!("no edits; copying {} unchanged", original.display());
        write_output(output, &bytes)?;
        return Ok(report);
    }

    let mut archive =
        ZipArchive::new(Cursor::new(bytes.as_slice())).map_err(|e| format!("Failed to read xlsx zip: {}", e))?;
    let sheet_part = first_worksheet_path(&mut archive)?;
    let sheet_xml = read_part(&mut archive, &sheet_part)?;
    let mut replacements: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    // Dates need a date number format layered on whatever style the cell has
    let date_cells: BTreeSet<(usize, usize)> = edits
        .iter()
        .filter(|(_, v)| matches!(v, CellValue::Date(_)))
        .map(|(&at, _)| at)
        .collect();
    let mut date_styles = BTreeMap::new();
    if !date_cells.is_empty() {
        let existing = cell_styles(&sheet_xml, &date_cells)?;
        let bases: BTreeSet<u32> = date_cells.iter().map(|at| existing.get(at).copied().unwrap_or(0)).collect();
        let styles_xml = read_part(&mut archive, STYLES_PART)?;
        let (styles, mapping) = add_date_styles(&styles_xml, &bases)?;
        report.date_styles_added = mapping.len();
        date_styles = mapping;
        replacements.insert(STYLES_PART.to_string(), styles);
    }

    let (patched, stats) = patch_worksheet(&sheet_xml, &edits, &date_styles)?;
    replacements.insert(sheet_part.clone(), patched);

    let workbook_xml = read_part(&mut archive, WORKBOOK_PART)?;
    replacements.insert(WORKBOOK_PART.to_string(), set_full_calc_on_load(&workbook_xml)?);
    drop(archive);

    let package = write_package(&bytes, &replacements)?;
    write_output(output, &package)?;

    report.sheet_part = Some(sheet_part);
    report.cells_written = edits.values().filter(|v| !matches!(v, CellValue::Empty)).count();
    report.cells_replaced = stats.replaced;
    report.cells_inserted = stats.inserted;
    report.rows_inserted = stats.rows_inserted;
    log::debug!(
        "patched {}: {} replaced, {} inserted, {} new rows, {} date styles",
        output.display(),
        stats.replaced,
        stats.inserted,
        stats.rows_inserted,
        report.date_styles_added
    );
    Ok(report)
}

fn write_output(output: &Path, bytes: &[u8]) -> Result<(), String> {
    fs::write(output, bytes).map_err(|e| format!("Failed to write {}: {}", output.display(), e))
}

/// Write every populated cell of `grid` to a new single-sheet workbook.
///
/// Dates are stored as serials with a `m/d/yyyy` format; formulas keep
/// their source.
pub fn export_values(grid: &Grid, output: &Path) -> Result<SaveReport, String> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format(DATE_FORMAT);
    let worksheet = workbook.add_worksheet();
    let mut written = 0;

    for (row, col, value) in grid.cells() {
        let r = u32::try_from(row).map_err(|_| format!("Row {} is out of range for xlsx", row + 1))?;
        let c = u16::try_from(col).map_err(|_| format!("Column {} is out of range for xlsx", col + 1))?;
        let result = match value {
            CellValue::Empty => continue,
            CellValue::Text(s) => worksheet.write_string(r, c, s.as_str()).map(|_| ()),
            CellValue::Number(n) => worksheet.write_number(r, c, *n).map(|_| ()),
            CellValue::Date(d) => worksheet
                .write_number_with_format(r, c, date_to_serial(*d), &date_format)
                .map(|_| ()),
            CellValue::Formula(f) => worksheet.write_formula(r, c, f.as_str()).map(|_| ()),
        };
        result.map_err(|e| format!("Failed to write cell {}: {}", distmerge_recon::grid::cell_ref(row, col), e))?;
        written += 1;
    }

    workbook
        .save(output)
        .map_err(|e| format!("Failed to save {}: {}", output.display(), e))?;

    let mut report = SaveReport::new(SaveMode::Exported);
    report.cells_written = written;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto, Reader};
    use chrono::NaiveDate;
    use std::io::Read;

    fn template(path: &Path) {
        let mut wb = Workbook::new();
        let bold = Format::new().set_bold();
        let ws = wb.add_worksheet();
        ws.set_name("Import").unwrap();
        ws.write_string_with_format(4, 2, "Investing Entity", &bold).unwrap();
        ws.write_string(5, 2, "John Smith").unwrap();
        ws.write_number(5, 5, 0.0).unwrap();
        wb.add_worksheet().write_string(0, 0, "notes").unwrap();
        wb.save(path).unwrap();
    }

    fn part(path: &Path, name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        data
    }

    #[test]
    fn unedited_grid_is_copied_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("template.xlsx");
        let output = dir.path().join("out.xlsx");
        template(&input);

        let report = save_patched(&input, &Grid::new(), &output).unwrap();
        assert_eq!(report.mode, SaveMode::Patched);
        assert_eq!(report.cells_written, 0);
        assert_eq!(fs::read(&input).unwrap(), fs::read(&output).unwrap());
    }

    #[test]
    fn edits_land_in_first_sheet_and_other_parts_survive() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("template.xlsx");
        let output = dir.path().join("out.xlsx");
        template(&input);

        let mut grid = crate::target::read_grid(&input).unwrap();
        grid.set(5, 5, CellValue::Number(150.0));
        grid.set(5, 6, CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
        grid.set(5, 9, CellValue::Formula("=SUM(F6,-G6)".into()));
        grid.set(7, 2, CellValue::text("GP"));

        let report = save_patched(&input, &grid, &output).unwrap();
        assert_eq!(report.sheet_part.as_deref(), Some("xl/worksheets/sheet1.xml"));
        assert_eq!(report.cells_written, 4);
        assert_eq!(report.cells_replaced, 1);
        assert_eq!(report.cells_inserted, 3);
        assert_eq!(report.rows_inserted, 1);
        assert_eq!(report.date_styles_added, 1);

        assert_eq!(part(&input, "xl/worksheets/sheet2.xml"), part(&output, "xl/worksheets/sheet2.xml"));
        assert_eq!(part(&input, "xl/sharedStrings.xml"), part(&output, "xl/sharedStrings.xml"));
        let styles = String::from_utf8(part(&output, STYLES_PART)).unwrap();
        assert!(styles.contains(r#"formatCode="m/d/yyyy""#));
        let workbook = String::from_utf8(part(&output, WORKBOOK_PART)).unwrap();
        assert!(workbook.contains(r#"fullCalcOnLoad="1""#));

        let wb = open_workbook_auto(&output).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Import".to_string(), "Sheet2".to_string()]);
        let reread = crate::target::read_grid(&output).unwrap();
        assert_eq!(reread.get(5, 5), &CellValue::Number(150.0));
        assert_eq!(reread.get(5, 6), &CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
        assert_eq!(reread.text(4, 2), Some("Investing Entity"));
        assert_eq!(reread.text(7, 2), Some("GP"));
        assert_eq!(reread.get(5, 9), &CellValue::Formula("=SUM(F6,-G6)".into()));
    }

    #[test]
    fn non_xlsx_targets_are_exported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("template.csv");
        fs::write(&input, "Investing Entity,,\nJohn Smith,,\n").unwrap();
        let output = dir.path().join("out.xlsx");

        let mut grid = crate::target::read_grid(&input).unwrap();
        grid.set(1, 1, CellValue::Number(42.0));
        grid.set(1, 2, CellValue::Date(NaiveDate::from_ymd_opt(2040, 1, 1).unwrap()));

        let report = save_patched(&input, &grid, &output).unwrap();
        assert_eq!(report.mode, SaveMode::Exported);
        assert_eq!(report.cells_written, 4);

        let reread = crate::target::read_grid(&output).unwrap();
        assert_eq!(reread.text(0, 0), Some("Investing Entity"));
        assert_eq!(reread.get(1, 1), &CellValue::Number(42.0));
        assert_eq!(reread.get(1, 2), &CellValue::Date(NaiveDate::from_ymd_opt(2040, 1, 1).unwrap()));
    }
}
