//! Job files: loading, path resolution and the input reads every command
//! shares.

use std::path::{Path, PathBuf};

use distmerge_recon::config::SourceColumns;
use distmerge_recon::scanner::scan_entities;
use distmerge_recon::{build_mapping, load_records, Grid, JobConfig, LoadedRecords, MappingTable, RecordColumns, SourceTable};

use crate::exit_codes::{EXIT_JOB_INVALID, EXIT_RUNTIME};
use crate::CliError;

pub struct Job {
    pub path: PathBuf,
    pub config: JobConfig,
    base_dir: PathBuf,
}

impl Job {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CliError::runtime(format!("cannot read job file {}: {e}", path.display())))?;
        let config = JobConfig::from_toml(&text).map_err(|e| {
            CliError { code: EXIT_JOB_INVALID, message: format!("{}: {e}", path.display()), hint: None }
        })?;

        // Relative paths in the job file are relative to the job file
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        log::debug!("loaded job {} (base dir {})", path.display(), base_dir.display());
        Ok(Self { path: path.to_path_buf(), config, base_dir })
    }

    pub fn resolve(&self, file: &str) -> PathBuf {
        self.base_dir.join(file)
    }

    pub fn source_path(&self) -> PathBuf {
        self.resolve(&self.config.source)
    }

    pub fn target_path(&self) -> PathBuf {
        self.resolve(&self.config.target)
    }

    /// `output` when given, otherwise `default_name` next to the job file.
    pub fn output_path(&self, output: Option<PathBuf>, default_name: &str) -> PathBuf {
        output.unwrap_or_else(|| self.base_dir.join(default_name))
    }

    pub fn read_source(&self) -> Result<SourceTable, CliError> {
        let path = self.source_path();
        distmerge_io::source::read_table(&path, self.config.sheet.as_deref()).map_err(CliError::runtime)
    }

    pub fn read_target(&self) -> Result<Grid, CliError> {
        distmerge_io::target::read_grid(&self.target_path()).map_err(CliError::runtime)
    }

    pub fn complete_columns(&self) -> Result<SourceColumns, CliError> {
        self.config.complete_columns().map_err(CliError::recon)
    }

    /// Parse the complete-flow records out of `table`.
    pub fn records(&self, table: &SourceTable) -> Result<LoadedRecords, CliError> {
        let cols = self.complete_columns()?;
        let columns = RecordColumns { entity: &cols.entity, date: &cols.date, amount: &cols.amount };
        load_records(table, &columns).map_err(|e| {
            CliError::recon(e).with_hint(format!("available columns: {}", table.headers.join(", ")))
        })
    }

    /// Matcher suggestions against the template's entity names, with the
    /// job's overrides applied.
    pub fn mapping(&self, records: &LoadedRecords, grid: &Grid) -> Result<MappingTable, CliError> {
        let entities = scan_entities(grid, &self.config.layout).map_err(|e| CliError::recon(e.into()))?;
        Ok(build_mapping(&records.records, &entities.names(), self.config.matcher.cutoff, &self.config.mapping))
    }

    /// Write the (possibly updated) config back to the job file.
    pub fn save(&self) -> Result<(), CliError> {
        let text = self.config.to_toml().map_err(CliError::recon)?;
        std::fs::write(&self.path, text).map_err(|e| CliError {
            code: EXIT_RUNTIME,
            message: format!("cannot write job file {}: {e}", self.path.display()),
            hint: None,
        })
    }
}
