//! ow-report: parsers for the engine's energy outputs.
//!
//! Contains:
//! - report (tab-separated energy-capture report, header located by content)
//! - results (compact per-round results file used in interactive mode)
//! - record (optional-field per-turbine rows)
//! - summary (GWh aggregates and plant loss adjustment)

pub mod record;
pub mod report;
pub mod results;
pub mod summary;

use std::path::{Path, PathBuf};

pub use record::{ReportRecord, columns};
pub use report::{
    EnergyReport, ParamValue, is_engine_failure_line, is_turbine_replacement_failure,
    parse_report, read_report,
};
pub use results::{InteractiveResults, parse_results, read_results, results_complete};
pub use summary::{AdjustedAep, AepSummary, KWH_PER_GWH, LossFactors};

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("No turbine table header (Gross/Net) found in {}", path.display())]
    MissingHeader {
        path: PathBuf,
        /// Engine failure lines seen while scanning.
        engine_errors: Vec<String>,
    },

    #[error("Malformed results file {}: {reason}", path.display())]
    MalformedResults { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Engine failure lines in a report, without parsing its table.
pub fn scan_engine_errors(path: &Path) -> ReportResult<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim_end)
        .filter(|l| is_engine_failure_line(l))
        .map(str::to_string)
        .collect())
}
