//! Extend an incomplete template with one distribution block per new date.
//!
//! A block is `layout.block.width` columns wide. The first block of the
//! template supplies the header rows; every new block gets its own labels,
//! payment dates and formulas. Formulas are emitted as text for the
//! spreadsheet application to evaluate.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

use crate::config::LayoutConfig;
use crate::dates::parse_date_cell;
use crate::error::LayoutError;
use crate::grid::{col_to_letter, CellValue, Grid};
use crate::model::{AppendReport, DistributionType, EntityAxis};
use crate::quota::pad_with_placeholders;

/// Append blocks for `new_dates` after the template's existing blocks.
///
/// Dates already present in an existing block and repeated dates are
/// dropped; the rest are appended in ascending order, followed by the
/// placeholder periods the import quota requires.
pub fn append_blocks(
    grid: &mut Grid,
    entities: &EntityAxis,
    new_dates: &[NaiveDate],
    distribution_type: DistributionType,
    current_year: i32,
    layout: &LayoutConfig,
) -> Result<AppendReport, LayoutError> {
    let block = &layout.block;
    let header_row = entities
        .label_row
        .checked_sub(layout.date_header_rows_above)
        .ok_or(LayoutError::HeaderRowOutOfRange {
            label_row: entities.label_row,
            rows_above: layout.date_header_rows_above,
        })?;

    let existing_blocks = count_blocks(grid, header_row, layout);
    if existing_blocks == 0 {
        return Err(LayoutError::NoExistingBlock {
            column: col_to_letter(block.first_column),
        });
    }

    let existing_dates: BTreeSet<NaiveDate> = (0..existing_blocks)
        .filter_map(|i| {
            let col = block_base(layout, i) + block.existing_date_offset;
            parse_date_cell(grid.get(block.full_label_row, col))
        })
        .collect();

    let mut dates: Vec<NaiveDate> = new_dates
        .iter()
        .copied()
        .filter(|d| !existing_dates.contains(d))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let placeholders = pad_with_placeholders(&mut dates);

    let mut report = AppendReport {
        dates: dates.clone(),
        placeholders,
        block_columns: Vec::with_capacity(dates.len()),
        existing_blocks,
    };

    for (i, date) in dates.iter().enumerate() {
        let base = block_base(layout, existing_blocks + i);
        write_block(grid, entities, base, *date, distribution_type, current_year, layout);
        report.block_columns.push(base);
    }

    log::debug!(
        "appended {} block(s) after {} existing, {} placeholder(s)",
        report.dates.len(),
        existing_blocks,
        placeholders
    );
    Ok(report)
}

/// Consecutive blocks from the first block column whose date header cell
/// carries the date header text.
pub fn count_blocks(grid: &Grid, header_row: usize, layout: &LayoutConfig) -> usize {
    let mut count = 0;
    while grid.text(header_row, block_base(layout, count) + layout.block.existing_date_offset)
        == Some(layout.date_header.as_str())
    {
        count += 1;
    }
    count
}

fn block_base(layout: &LayoutConfig, index: usize) -> usize {
    layout.block.first_column + layout.block.width * index
}

/// "15 Jan 2024"
fn short_date(date: NaiveDate) -> String {
    format!("{} {} {}", date.day(), date.format("%b"), date.year())
}

/// "15 January 2024"
fn long_date(date: NaiveDate) -> String {
    format!("{} {} {}", date.day(), date.format("%B"), date.year())
}

fn write_row(grid: &mut Grid, row: usize, base: usize, values: Vec<CellValue>) {
    for (offset, value) in values.into_iter().enumerate() {
        grid.set(row, base + offset, value);
    }
}

fn write_block(
    grid: &mut Grid,
    entities: &EntityAxis,
    base: usize,
    date: NaiveDate,
    distribution_type: DistributionType,
    current_year: i32,
    layout: &LayoutConfig,
) {
    let block = &layout.block;
    let first = block.first_column;

    for &row in &block.header_rows {
        for j in 0..block.width {
            let value = grid.get(row, first + j).clone();
            grid.set(row, base + j, value);
        }
    }

    let short = short_date(date);
    write_row(
        grid,
        block.short_label_row,
        base,
        vec![
            CellValue::Text(format!("{short} - {short}")),
            CellValue::text("Custom"),
            CellValue::text("-"),
            CellValue::Number(current_year as f64),
        ],
    );

    let long = long_date(date);
    write_row(
        grid,
        block.full_label_row,
        base,
        vec![
            CellValue::Text(long.clone()),
            CellValue::Text(long),
            CellValue::text(distribution_type.label()),
            CellValue::Text(block.currency.clone()),
        ],
    );

    for row in entities.entries.iter().map(|e| e.row).chain([entities.gp_row]) {
        grid.set(row, base + block.payment_date, CellValue::Date(date));
    }

    let gross = col_to_letter(base + block.gross);
    let transfer = col_to_letter(base + block.transfer);
    let promote = col_to_letter(base + block.promote);
    let adjustment = col_to_letter(base + block.adjustment);
    let net = base + block.net;

    if let (Some(top), Some(bottom)) = (entities.entries.first(), entities.entries.last()) {
        grid.set(
            entities.gp_row,
            base + block.gross,
            CellValue::Formula(format!("=SUM({promote}{}:{promote}{})", top.row + 1, bottom.row + 1)),
        );
    }

    for entry in &entities.entries {
        let r = entry.row + 1;
        grid.set(
            entry.row,
            net,
            CellValue::Formula(format!("=SUM({gross}{r},-{transfer}{r},{adjustment}{r},-{promote}{r})")),
        );
    }

    let r = entities.gp_row + 1;
    grid.set(
        entities.gp_row,
        net,
        CellValue::Formula(format!("=SUM({gross}{r},-{transfer}{r},{adjustment}{r})")),
    );
}
