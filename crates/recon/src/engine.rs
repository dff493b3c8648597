use chrono::NaiveDate;
use serde::Serialize;

use crate::appender::append_blocks;
use crate::config::{JobConfig, LayoutConfig};
use crate::error::ReconError;
use crate::grid::Grid;
use crate::matcher::{apply_overrides, suggestions_with_scores};
use crate::model::{
    AppendReport, DateAxis, DistributionType, DuplicateGroup, EntityAxis, EntityDateKey,
    EntityMapping, SourceRecord, WriteReport,
};
use crate::resolver::{group, resolve, Resolutions};
use crate::scanner::{scan, scan_entities};
use crate::selection::{select_dates, DateSelection};
use crate::source::distinct_entities;
use crate::writer::write;

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// One line of the mapping table: the matcher's guess and what will
/// actually be used after overrides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingRow {
    pub source: String,
    pub suggestion: String,
    pub score: f64,
    pub effective: String,
    pub overridden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingTable {
    pub rows: Vec<MappingRow>,
}

impl MappingTable {
    /// The authoritative mapping fed to grouping.
    pub fn mapping(&self) -> EntityMapping {
        self.rows.iter().map(|r| (r.source.clone(), r.effective.clone())).collect()
    }

    pub fn unmapped(&self) -> impl Iterator<Item = &MappingRow> {
        self.rows.iter().filter(|r| r.effective.is_empty())
    }
}

/// Suggest a target for every distinct source name and layer the manual
/// overrides on top.
pub fn build_mapping(
    records: &[SourceRecord],
    targets: &[String],
    cutoff: f64,
    overrides: &EntityMapping,
) -> MappingTable {
    let sources = distinct_entities(records);
    let suggestions = suggestions_with_scores(&sources, targets, cutoff);
    let guessed: EntityMapping = suggestions.iter().map(|s| (s.source.clone(), s.target.clone())).collect();
    let effective = apply_overrides(&guessed, overrides);

    let rows = suggestions
        .into_iter()
        .map(|s| {
            let chosen = effective.get(&s.source).cloned().unwrap_or_default();
            MappingRow {
                overridden: overrides.contains_key(&s.source),
                effective: chosen,
                source: s.source,
                suggestion: s.target,
                score: s.score,
            }
        })
        .collect();
    MappingTable { rows }
}

// ---------------------------------------------------------------------------
// Duplicate choices
// ---------------------------------------------------------------------------

impl Resolutions {
    /// Choices persisted in a job file. `sum_all` is applied after the
    /// individual entries and resets them.
    pub fn from_job(config: &JobConfig, groups: &[DuplicateGroup]) -> Result<Self, ReconError> {
        let mut resolutions = Resolutions::new();
        for entry in &config.duplicates {
            let key = EntityDateKey::new(entry.entity.trim(), entry.date);
            if !groups.iter().any(|g| g.key == key) {
                log::warn!("duplicate choice for {key} does not match any duplicate group");
            }
            resolutions.choose(key, entry.choice.to_choice()?);
        }
        if config.sum_all {
            resolutions.select_sum_for_all(groups);
        }
        Ok(resolutions)
    }
}

// ---------------------------------------------------------------------------
// Complete flow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CompleteOutcome {
    pub entities: EntityAxis,
    pub dates: DateAxis,
    pub duplicates: Vec<DuplicateGroup>,
    pub report: WriteReport,
}

/// Scan the template, group and resolve the records, then write the
/// amounts into `grid`.
pub fn complete(
    grid: &mut Grid,
    records: &[SourceRecord],
    mapping: &EntityMapping,
    resolutions: &Resolutions,
    layout: &LayoutConfig,
) -> Result<CompleteOutcome, ReconError> {
    let (entities, dates) = scan(grid, layout)?;
    let grouping = group(records, mapping, &dates);
    let resolved = resolve(&grouping, resolutions)?;
    let report = write(grid, &entities, &dates, &resolved, layout);

    Ok(CompleteOutcome {
        entities,
        dates,
        duplicates: grouping.duplicates,
        report,
    })
}

/// Duplicate groups the complete flow would ask about, without writing.
pub fn find_duplicates(
    grid: &Grid,
    records: &[SourceRecord],
    mapping: &EntityMapping,
    layout: &LayoutConfig,
) -> Result<Vec<DuplicateGroup>, ReconError> {
    let (_, dates) = scan(grid, layout)?;
    Ok(group(records, mapping, &dates).duplicates)
}

// ---------------------------------------------------------------------------
// Incomplete flow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ExtendOutcome {
    pub entities: EntityAxis,
    /// Distinct candidate dates from the source, sorted.
    pub candidates: Vec<NaiveDate>,
    /// Candidates that passed the selection.
    pub selected: Vec<NaiveDate>,
    pub report: AppendReport,
}

/// Append one block per selected source date to `grid`.
pub fn extend(
    grid: &mut Grid,
    candidate_dates: &[NaiveDate],
    selection: &DateSelection,
    distribution_type: DistributionType,
    current_year: i32,
    layout: &LayoutConfig,
) -> Result<ExtendOutcome, ReconError> {
    let entities = scan_entities(grid, layout)?;
    let candidates = select_dates(candidate_dates.iter().copied(), &DateSelection::all());
    let selected = select_dates(candidates.iter().copied(), selection);
    let report = append_blocks(grid, &entities, &selected, distribution_type, current_year, layout)?;

    Ok(ExtendOutcome {
        entities,
        candidates,
        selected,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChoiceValue;
    use crate::config::DuplicateChoiceEntry;
    use crate::grid::CellValue;
    use crate::model::ResolutionChoice;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rec(name: &str, amount: f64) -> SourceRecord {
        SourceRecord { raw_entity: name.into(), date: Some(d(2024, 1, 15)), amount: Some(amount) }
    }

    fn job(extra: &str) -> JobConfig {
        JobConfig::from_toml(&format!(
            "source = \"s.csv\"\ntarget = \"t.xlsx\"\n{extra}\n[columns]\ndate = \"Date\"\n"
        ))
        .unwrap()
    }

    #[test]
    fn mapping_table_marks_overrides() {
        let records = vec![rec("Jon Smith", 1.0), rec("Fund Admin", 2.0), rec("Jon Smith", 3.0)];
        let targets = vec!["John Smith".to_string(), "Jane Doe".to_string()];
        let overrides: EntityMapping = [("Fund Admin".to_string(), String::new())].into_iter().collect();
        let table = build_mapping(&records, &targets, 0.6, &overrides);

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].suggestion, "John Smith");
        assert_eq!(table.rows[0].effective, "John Smith");
        assert!(!table.rows[0].overridden);
        assert!(table.rows[1].overridden);
        assert_eq!(table.unmapped().count(), 1);
        assert_eq!(table.mapping()["Fund Admin"], "");
    }

    #[test]
    fn mapping_table_serializes_as_rows() {
        let records = vec![rec("Jon Smith", 1.0)];
        let table = build_mapping(&records, &["John Smith".to_string()], 0.6, &EntityMapping::new());
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["rows"][0]["source"], "Jon Smith");
        assert_eq!(json["rows"][0]["effective"], "John Smith");
        assert_eq!(json["rows"][0]["overridden"], false);
    }

    #[test]
    fn sum_all_overrides_individual_choices() {
        let key = EntityDateKey::new("John Smith", d(2024, 1, 15));
        let groups = vec![DuplicateGroup { key: key.clone(), amounts: vec![100.0, 50.0] }];
        let mut config = job("");
        config.duplicates.push(DuplicateChoiceEntry {
            entity: "John Smith".into(),
            date: d(2024, 1, 15),
            choice: ChoiceValue::Amount(100.0),
        });

        let res = Resolutions::from_job(&config, &groups).unwrap();
        assert_eq!(res.choice(&key), ResolutionChoice::Pick(100.0));

        config.sum_all = true;
        let res = Resolutions::from_job(&config, &groups).unwrap();
        assert_eq!(res.choice(&key), ResolutionChoice::Sum);
    }

    #[test]
    fn complete_reports_duplicates_and_unmatched() {
        let mut grid = Grid::new();
        grid.load(2, 6, CellValue::text("Last Day"));
        grid.load(3, 6, CellValue::text("15 January 2024"));
        grid.load(4, 2, CellValue::text("Investing Entity"));
        grid.load(5, 2, CellValue::text("John Smith"));
        grid.load(6, 2, CellValue::text("Jane Doe"));
        grid.load(7, 2, CellValue::text("GP"));

        let records = vec![rec("Jon Smith", 100.0), rec("John Smith", 50.0)];
        let mapping = build_mapping(
            &records,
            &["John Smith".to_string(), "Jane Doe".to_string()],
            0.6,
            &EntityMapping::new(),
        )
        .mapping();

        let outcome = complete(&mut grid, &records, &mapping, &Resolutions::new(), &LayoutConfig::default()).unwrap();
        assert_eq!(outcome.duplicates.len(), 1);
        assert_eq!(outcome.report.written, 1);
        assert_eq!(outcome.report.unmatched, vec![EntityDateKey::new("Jane Doe", d(2024, 1, 15))]);
        assert_eq!(grid.get(5, 5), &CellValue::Number(150.0));
    }

    #[test]
    fn extend_without_selected_dates_leaves_grid_alone() {
        let mut grid = Grid::new();
        grid.load(2, 6, CellValue::text("Last Day"));
        grid.load(4, 2, CellValue::text("Investing Entity"));
        grid.load(5, 2, CellValue::text("GP"));

        let selection = DateSelection { to: Some(d(2023, 1, 1)), ..DateSelection::default() };
        let outcome = extend(
            &mut grid,
            &[d(2024, 1, 15)],
            &selection,
            DistributionType::default(),
            2026,
            &LayoutConfig::default(),
        )
        .unwrap();
        assert_eq!(outcome.candidates, vec![d(2024, 1, 15)]);
        assert!(outcome.selected.is_empty());
        assert_eq!(grid.edit_count(), 0);
    }
}
