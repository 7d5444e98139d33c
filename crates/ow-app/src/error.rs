//! Error types for the coordination service layer.

use std::path::PathBuf;

/// Unified error for callers of the coordinator. Backend crate errors are
/// folded into the categories a caller acts on: fix the setup, fix the
/// script, inspect the engine output, or kill the engine.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing executable, script, workbook or turbine file; raised before
    /// any process is spawned.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Script validation failed: {0}")]
    ScriptValidation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Engine did not answer within {waited_s:.1} s (waiting on {})", path.display())]
    EngineTimeout { path: PathBuf, waited_s: f64 },

    #[error("Engine reported {count} failure(s) in {}: {message}", report.display())]
    EngineReportedFailure {
        report: PathBuf,
        count: usize,
        message: String,
    },

    #[error("Engine process error: {0}")]
    Process(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("History error: {0}")]
    History(String),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Invalid coordinator state: {0}")]
    InvalidState(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// Result type for ow-app operations.
pub type AppResult<T> = Result<T, AppError>;

// Conversions from backend error types
impl From<ow_script::ScriptError> for AppError {
    fn from(err: ow_script::ScriptError) -> Self {
        use ow_script::ScriptError;
        match err {
            ScriptError::NotFound { .. } => AppError::Configuration(err.to_string()),
            ScriptError::Validation(v) => AppError::ScriptValidation(v.to_string()),
            ScriptError::Io { path, source } => AppError::Io { path, source },
            other => AppError::Parse(other.to_string()),
        }
    }
}

impl From<ow_script::ValidationError> for AppError {
    fn from(err: ow_script::ValidationError) -> Self {
        AppError::ScriptValidation(err.to_string())
    }
}

impl From<ow_turbine::TurbineError> for AppError {
    fn from(err: ow_turbine::TurbineError) -> Self {
        use ow_turbine::TurbineError;
        match err {
            TurbineError::Io { path, source } => AppError::Io { path, source },
            TurbineError::LayoutMismatch { .. }
            | TurbineError::EmptyLayout
            | TurbineError::IndexOutOfRange { .. }
            | TurbineError::UnknownTurbineType { .. }
            | TurbineError::InvalidDefinition { .. }
            | TurbineError::InvalidName { .. } => AppError::InvalidLayout(err.to_string()),
            other => AppError::Parse(other.to_string()),
        }
    }
}

impl From<ow_report::ReportError> for AppError {
    fn from(err: ow_report::ReportError) -> Self {
        use ow_report::ReportError;
        match err {
            ReportError::Io { path, source } => AppError::Io { path, source },
            other => AppError::Parse(other.to_string()),
        }
    }
}

impl From<ow_notify::NotifyError> for AppError {
    fn from(err: ow_notify::NotifyError) -> Self {
        use ow_notify::NotifyError;
        match err {
            NotifyError::Timeout { path, waited } => AppError::EngineTimeout {
                path,
                waited_s: waited.as_secs_f64(),
            },
            NotifyError::Cancelled { .. } => AppError::Cancelled(err.to_string()),
            NotifyError::MissingDirectory { .. } => AppError::Configuration(err.to_string()),
            NotifyError::Io { path, source } => AppError::Io { path, source },
            other => AppError::Process(other.to_string()),
        }
    }
}

impl From<ow_history::HistoryError> for AppError {
    fn from(err: ow_history::HistoryError) -> Self {
        AppError::History(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn handshake_timeout_maps_to_engine_timeout() {
        let err: AppError = ow_notify::NotifyError::Timeout {
            path: PathBuf::from("/work/results.txt"),
            waited: Duration::from_secs(3),
        }
        .into();
        assert!(matches!(err, AppError::EngineTimeout { .. }));
        assert!(err.to_string().contains("results.txt"));
    }

    #[test]
    fn missing_script_is_configuration() {
        let err: AppError = ow_script::ScriptError::NotFound {
            path: PathBuf::from("run.xml"),
        }
        .into();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(err.to_string().contains("run.xml"));
    }

    #[test]
    fn report_without_header_is_parse_error() {
        let err: AppError = ow_report::ReportError::MissingHeader {
            path: PathBuf::from("report.txt"),
            engine_errors: vec![],
        }
        .into();
        assert!(matches!(err, AppError::Parse(_)));
    }
}
