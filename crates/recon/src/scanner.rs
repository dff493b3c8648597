//! Locate the entity axis and the date axis inside a target template grid.

use std::collections::BTreeMap;

use crate::config::LayoutConfig;
use crate::dates::parse_date_cell;
use crate::error::LayoutError;
use crate::grid::{col_to_letter, Grid};
use crate::model::{DateAxis, EntityAxis, EntityRow};

/// Scan both axes.
pub fn scan(grid: &Grid, layout: &LayoutConfig) -> Result<(EntityAxis, DateAxis), LayoutError> {
    let entities = scan_entities(grid, layout)?;
    let dates = scan_dates(grid, entities.label_row, layout)?;
    log::debug!(
        "scanned {} entity rows (label row {}, GP row {}) and {} date columns",
        entities.len(),
        entities.label_row + 1,
        entities.gp_row + 1,
        dates.columns.len()
    );
    Ok((entities, dates))
}

/// Rows strictly between the first entity label and the first GP label below
/// it, in sheet order. Blank rows stay in the axis with an empty name.
pub fn scan_entities(grid: &Grid, layout: &LayoutConfig) -> Result<EntityAxis, LayoutError> {
    let col = layout.entity_column;
    let rows = grid.row_count();

    let label_row = (0..rows)
        .find(|&r| grid.text(r, col) == Some(layout.entity_label.as_str()))
        .ok_or_else(|| LayoutError::MissingEntityLabel {
            label: layout.entity_label.clone(),
            column: col_to_letter(col),
        })?;

    let gp_row = (label_row + 1..rows)
        .find(|&r| grid.text(r, col) == Some(layout.gp_label.as_str()))
        .ok_or_else(|| LayoutError::MissingGpLabel {
            label: layout.gp_label.clone(),
            column: col_to_letter(col),
            below_row: label_row,
        })?;

    let entries = (label_row + 1..gp_row)
        .map(|row| EntityRow {
            row,
            name: grid.get(row, col).display().trim().to_string(),
        })
        .collect();

    Ok(EntityAxis {
        label_row,
        gp_row,
        entries,
    })
}

/// Columns whose header cell reads the date header, with the date parsed
/// from the cell right below.
pub fn scan_dates(grid: &Grid, label_row: usize, layout: &LayoutConfig) -> Result<DateAxis, LayoutError> {
    let header_row = label_row
        .checked_sub(layout.date_header_rows_above)
        .ok_or(LayoutError::HeaderRowOutOfRange {
            label_row,
            rows_above: layout.date_header_rows_above,
        })?;

    let columns: BTreeMap<_, _> = (0..grid.col_count())
        .filter(|&c| grid.text(header_row, c) == Some(layout.date_header.as_str()))
        .map(|c| (c, parse_date_cell(grid.get(header_row + 1, c))))
        .collect();

    if columns.is_empty() {
        return Err(LayoutError::NoDateColumns {
            header: layout.date_header.clone(),
            row: header_row,
        });
    }

    let axis = DateAxis { header_row, columns };
    let unparsed = axis.unparsed_columns();
    if unparsed > 0 {
        log::warn!("{unparsed} '{}' column(s) have no parseable date and will be skipped", layout.date_header);
    }
    Ok(axis)
}
