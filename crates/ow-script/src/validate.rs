//! Script validation against the intended drive flow.

use crate::info::DriveFlow;
use crate::schema::{OperationKind, Script};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Report path is empty")]
    EmptyReportPath,

    #[error("Interactive scripts need exactly one Optimise operation, found {count}")]
    OptimizeCount { count: usize },

    #[error("Run-to-completion scripts must end with Exit (last operation: {last})")]
    MissingExit { last: String },
}

/// Check the structural requirements of `flow`.
pub fn validate_script(script: &Script, flow: DriveFlow) -> Result<(), ValidationError> {
    if script.report_path.trim().is_empty() {
        return Err(ValidationError::EmptyReportPath);
    }
    validate_kinds(&script.operation_kinds(), flow)
}

pub fn validate_kinds(kinds: &[OperationKind], flow: DriveFlow) -> Result<(), ValidationError> {
    match flow {
        DriveFlow::Interactive => {
            let count = kinds
                .iter()
                .filter(|k| **k == OperationKind::Optimize)
                .count();
            if count != 1 {
                return Err(ValidationError::OptimizeCount { count });
            }
        }
        DriveFlow::RunToCompletion => {
            if kinds.last() != Some(&OperationKind::Exit) {
                return Err(ValidationError::MissingExit {
                    last: kinds
                        .last()
                        .map(|k| k.type_name().to_string())
                        .unwrap_or_else(|| "none".to_string()),
                });
            }
        }
    }
    Ok(())
}
