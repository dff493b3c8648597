//! `distmerge-recon` - distribution reconciliation engine.
//!
//! Pure engine crate: receives a loaded template grid and source records,
//! edits the grid in place and reports what it did. No CLI or IO
//! dependencies.

pub mod appender;
pub mod config;
pub mod dates;
pub mod engine;
pub mod error;
pub mod grid;
pub mod matcher;
pub mod model;
pub mod quota;
pub mod resolver;
pub mod scanner;
pub mod selection;
pub mod source;
pub mod writer;

pub use config::{JobConfig, LayoutConfig};
pub use engine::{build_mapping, complete, extend, find_duplicates, CompleteOutcome, ExtendOutcome, MappingTable};
pub use error::{LayoutError, ReconError};
pub use grid::{CellValue, Grid};
pub use model::{DistributionType, EntityMapping, ResolutionChoice, SourceRecord};
pub use resolver::Resolutions;
pub use selection::DateSelection;
pub use source::{load_records, ColumnDates, LoadedRecords, RecordColumns, SourceTable};
