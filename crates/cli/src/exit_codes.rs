//! CLI Exit Code Registry
//!
//! Single source of truth for the exit codes of `distmerge`. Scripts rely
//! on them.
//!
//! | Code | Meaning                                               |
//! |------|-------------------------------------------------------|
//! | 0    | Success                                               |
//! | 1    | General error (unspecified)                           |
//! | 2    | Usage error (bad arguments)                           |
//! | 60   | Job file unreadable as TOML or failing validation     |
//! | 61   | Target template does not have the expected layout     |
//! | 62   | Runtime failure: reading inputs or writing the output |
//! | 63   | `--strict` and some target cells had no source amount |

use distmerge_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Job file could not be parsed, failed validation, or names a source
/// column that does not exist.
pub const EXIT_JOB_INVALID: u8 = 60;

/// Target template layout not found (entity label, GP row, date header,
/// first block).
pub const EXIT_LAYOUT: u8 = 61;

/// Reading a source/target file or writing the output failed.
pub const EXIT_RUNTIME: u8 = 62;

/// Unmatched (entity, date) pairs with `--strict`. The output is still
/// written.
pub const EXIT_UNMATCHED: u8 = 63;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::Layout(_) => EXIT_LAYOUT,
        ReconError::ConfigParse(_)
        | ReconError::ConfigValidation(_)
        | ReconError::MissingColumn { .. }
        | ReconError::InvalidChoice { .. } => EXIT_JOB_INVALID,
        ReconError::Io(_) => EXIT_RUNTIME,
    }
}
