use crate::config::LayoutConfig;
use crate::grid::{CellValue, Grid};
use crate::model::{DateAxis, EntityAxis, EntityDateKey, ResolvedAmounts, WriteReport};

/// Write resolved amounts into the template grid (complete flow).
///
/// Every entity row is crossed with every dated column. A resolved amount is
/// written at the entity row, shifted by `amount_column_offset` from the
/// date header column; pairs without an amount are reported as unmatched and
/// their cells stay untouched. Columns whose date did not parse are skipped,
/// and so are blank entity rows.
pub fn write(
    grid: &mut Grid,
    entities: &EntityAxis,
    dates: &DateAxis,
    resolved: &ResolvedAmounts,
    layout: &LayoutConfig,
) -> WriteReport {
    let mut report = WriteReport::default();

    for entity in &entities.entries {
        if entity.name.is_empty() {
            continue;
        }
        for (&col, date) in &dates.columns {
            let Some(date) = *date else {
                continue;
            };
            let key = EntityDateKey::new(entity.name.clone(), date);
            match (resolved.get(&key), amount_column(col, layout)) {
                (Some(&amount), Some(target_col)) => {
                    grid.set(entity.row, target_col, CellValue::Number(amount));
                    report.written += 1;
                }
                _ => report.unmatched.push(key),
            }
        }
    }

    report.skipped_columns = dates.unparsed_columns();
    log::debug!(
        "wrote {} amount(s); {} target cell(s) unmatched",
        report.written,
        report.unmatched.len()
    );
    report
}

fn amount_column(date_col: usize, layout: &LayoutConfig) -> Option<usize> {
    let col = date_col as i64 + layout.amount_column_offset;
    usize::try_from(col).ok()
}
