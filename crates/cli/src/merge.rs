//! `distmerge` subcommands: scan, suggest, duplicates, complete, extend,
//! validate.

use std::path::{Path, PathBuf};

use chrono::Datelike;
use distmerge_io::patch::{save_patched, SaveReport};
use distmerge_io::{COMPLETE_OUTPUT, EXTEND_OUTPUT};
use distmerge_recon::grid::col_to_letter;
use distmerge_recon::scanner::{scan, scan_entities};
use distmerge_recon::{complete, extend, find_duplicates, DateSelection, LayoutConfig, Resolutions};
use serde_json::json;

use crate::exit_codes::{EXIT_ERROR, EXIT_UNMATCHED};
use crate::job::Job;
use crate::CliError;

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError {
        code: EXIT_ERROR,
        message: format!("JSON serialization error: {e}"),
        hint: None,
    })?;
    println!("{text}");
    Ok(())
}

fn save_json(report: &SaveReport, output: &Path) -> serde_json::Value {
    json!({
        "path": output.display().to_string(),
        "mode": report.mode.label(),
        "cells_written": report.cells_written,
        "cells_replaced": report.cells_replaced,
        "cells_inserted": report.cells_inserted,
        "rows_inserted": report.rows_inserted,
        "date_styles_added": report.date_styles_added,
    })
}

// ============================================================================
// scan
// ============================================================================

pub fn cmd_scan(target: PathBuf, job: Option<PathBuf>, json_output: bool) -> Result<(), CliError> {
    let layout = match job {
        Some(path) => Job::load(&path)?.config.layout,
        None => LayoutConfig::default(),
    };
    let grid = distmerge_io::target::read_grid(&target).map_err(CliError::runtime)?;
    let (entities, dates) = scan(&grid, &layout).map_err(|e| CliError::recon(e.into()))?;

    if json_output {
        return print_json(&json!({
            "target": target.display().to_string(),
            "entities": entities,
            "dates": dates,
        }));
    }

    eprintln!(
        "{}: {} entities (rows {}..{}), {} date column(s)",
        target.display(),
        entities.len(),
        entities.label_row + 2,
        entities.gp_row,
        dates.columns.len()
    );
    for entry in &entities.entries {
        eprintln!("  row {:>4}  {}", entry.row + 1, entry.name);
    }
    for (&col, date) in &dates.columns {
        match date {
            Some(d) => eprintln!("  col {:>4}  {}", col_to_letter(col), d),
            None => eprintln!("  col {:>4}  (unparseable date)", col_to_letter(col)),
        }
    }
    Ok(())
}

// ============================================================================
// suggest
// ============================================================================

pub fn cmd_suggest(job_path: PathBuf, write: bool, json_output: bool) -> Result<(), CliError> {
    let mut job = Job::load(&job_path)?;
    let table = job.read_source()?;
    let records = job.records(&table)?;
    let grid = job.read_target()?;
    let mapping = job.mapping(&records, &grid)?;

    if json_output {
        print_json(&json!({ "rows": mapping.rows }))?;
    } else {
        eprintln!("{:<32} {:<32} {:>6}  {}", "SOURCE", "SUGGESTION", "SCORE", "EFFECTIVE");
        for row in &mapping.rows {
            let effective = if row.effective.is_empty() { "(skip)" } else { row.effective.as_str() };
            let marker = if row.overridden { " *" } else { "" };
            eprintln!("{:<32} {:<32} {:>6.3}  {}{}", row.source, row.suggestion, row.score, effective, marker);
        }
        let unmapped = mapping.unmapped().count();
        eprintln!("{} source name(s), {} unmapped; * = manual override", mapping.rows.len(), unmapped);
    }

    if write {
        job.config.mapping = mapping.mapping();
        job.save()?;
        eprintln!("wrote {} mapping entries to {}", job.config.mapping.len(), job.path.display());
    }
    Ok(())
}

// ============================================================================
// duplicates
// ============================================================================

pub fn cmd_duplicates(job_path: PathBuf, json_output: bool) -> Result<(), CliError> {
    let job = Job::load(&job_path)?;
    let table = job.read_source()?;
    let records = job.records(&table)?;
    let grid = job.read_target()?;
    let mapping = job.mapping(&records, &grid)?.mapping();

    let groups = find_duplicates(&grid, &records.records, &mapping, &job.config.layout).map_err(CliError::recon)?;
    let resolutions = Resolutions::from_job(&job.config, &groups).map_err(CliError::recon)?;

    if json_output {
        let listed: Vec<_> = groups
            .iter()
            .map(|g| {
                json!({
                    "entity": g.key.entity,
                    "date": g.key.date,
                    "amounts": g.amounts,
                    "sum": g.sum(),
                    "choice": resolutions.choice(&g.key),
                })
            })
            .collect();
        return print_json(&json!({ "groups": listed }));
    }

    if groups.is_empty() {
        eprintln!("no duplicate (entity, date) pairs");
        return Ok(());
    }
    for g in &groups {
        let amounts: Vec<String> = g.amounts.iter().map(|a| a.to_string()).collect();
        eprintln!("{}: [{}] sum {} -> {}", g.key, amounts.join(", "), g.sum(), resolutions.choice(&g.key));
    }
    eprintln!("{} duplicate group(s); set choices under [[duplicates]] in {}", groups.len(), job.path.display());
    Ok(())
}

// ============================================================================
// complete
// ============================================================================

pub fn cmd_complete(job_path: PathBuf, output: Option<PathBuf>, strict: bool, json_output: bool) -> Result<(), CliError> {
    let job = Job::load(&job_path)?;
    let table = job.read_source()?;
    let records = job.records(&table)?;
    let mut grid = job.read_target()?;
    let layout = &job.config.layout;
    let mapping = job.mapping(&records, &grid)?.mapping();

    let groups = find_duplicates(&grid, &records.records, &mapping, layout).map_err(CliError::recon)?;
    let resolutions = Resolutions::from_job(&job.config, &groups).map_err(CliError::recon)?;
    let outcome = complete(&mut grid, &records.records, &mapping, &resolutions, layout).map_err(CliError::recon)?;

    let output = job.output_path(output, COMPLETE_OUTPUT);
    let saved = save_patched(&job.target_path(), &grid, &output).map_err(CliError::runtime)?;
    let unmatched = &outcome.report.unmatched;

    if json_output {
        print_json(&json!({
            "written": outcome.report.written,
            "unmatched": unmatched,
            "skipped_columns": outcome.report.skipped_columns,
            "duplicate_groups": outcome.duplicates.len(),
            "unparseable_dates": records.unparseable_dates,
            "unparseable_amounts": records.unparseable_amounts,
            "output": save_json(&saved, &output),
        }))?;
    } else {
        for key in unmatched {
            eprintln!("  unmatched: {key}");
        }
        eprintln!(
            "complete: {} amount(s) written, {} unmatched, {} duplicate group(s), {} unparseable date(s), {} unparseable amount(s)",
            outcome.report.written,
            unmatched.len(),
            outcome.duplicates.len(),
            records.unparseable_dates,
            records.unparseable_amounts,
        );
        eprintln!("wrote {} ({})", output.display(), saved.mode.label());
    }

    if strict && !unmatched.is_empty() {
        return Err(CliError {
            code: EXIT_UNMATCHED,
            message: format!("{} target cell(s) have no source amount", unmatched.len()),
            hint: Some("add [mapping] overrides or drop --strict".into()),
        });
    }
    Ok(())
}

// ============================================================================
// extend
// ============================================================================

pub fn cmd_extend(job_path: PathBuf, output: Option<PathBuf>, year: Option<i32>, json_output: bool) -> Result<(), CliError> {
    let job = Job::load(&job_path)?;
    let table = job.read_source()?;
    let source_dates = table.column_dates(&job.config.columns.date).map_err(|e| {
        CliError::recon(e).with_hint(format!("available columns: {}", table.headers.join(", ")))
    })?;
    let mut grid = job.read_target()?;

    let settings = &job.config.extend;
    let selection = DateSelection::from_config(settings);
    let current_year = year
        .or(settings.current_year)
        .unwrap_or_else(|| chrono::Local::now().year());

    let outcome = extend(&mut grid, &source_dates.dates, &selection, settings.distribution_type, current_year, &job.config.layout)
        .map_err(CliError::recon)?;

    let output = job.output_path(output, EXTEND_OUTPUT);
    let saved = save_patched(&job.target_path(), &grid, &output).map_err(CliError::runtime)?;
    let report = &outcome.report;

    if json_output {
        let columns: Vec<String> = report.block_columns.iter().map(|&c| col_to_letter(c)).collect();
        return print_json(&json!({
            "candidates": outcome.candidates,
            "unparseable_dates": source_dates.unparseable,
            "selected": outcome.selected,
            "dates": report.dates,
            "placeholders": report.placeholders,
            "block_columns": columns,
            "existing_blocks": report.existing_blocks,
            "output": save_json(&saved, &output),
        }));
    }

    if source_dates.unparseable > 0 {
        eprintln!("  skipped {} row(s) with unparseable dates", source_dates.unparseable);
    }
    if report.dates.is_empty() {
        eprintln!("extend: no new dates among {} candidate(s); nothing appended", outcome.candidates.len());
    } else {
        for (date, &col) in report.dates.iter().zip(&report.block_columns) {
            eprintln!("  block at {:>4}: {}", col_to_letter(col), date);
        }
        eprintln!(
            "extend: {} block(s) appended after {} existing ({} placeholder), type '{}'",
            report.dates.len(),
            report.existing_blocks,
            report.placeholders,
            settings.distribution_type,
        );
    }
    eprintln!("wrote {} ({})", output.display(), saved.mode.label());
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

pub fn cmd_validate(job_path: PathBuf) -> Result<(), CliError> {
    let job = Job::load(&job_path)?;
    let config = &job.config;

    for (role, path) in [("source", job.source_path()), ("target", job.target_path())] {
        if !path.exists() {
            eprintln!("warning: {role} file {} does not exist", path.display());
        }
    }
    if let Ok(grid) = job.read_target() {
        if let Err(e) = scan_entities(&grid, &config.layout) {
            eprintln!("warning: {e}");
        }
    }

    eprintln!(
        "valid: {} -> {}, {} mapping override(s), {} duplicate choice(s){}",
        config.source,
        config.target,
        config.mapping.len(),
        config.duplicates.len(),
        if config.sum_all { ", sum all" } else { "" },
    );
    Ok(())
}
