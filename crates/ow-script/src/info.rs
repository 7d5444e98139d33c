//! Script summary and drive-mode classification.

use serde::Serialize;
use std::path::Path;

use crate::schema::{Operation, OperationKind, Script};
use crate::ScriptResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurbineReplacement {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionReplacement {
    pub site_name: String,
    pub path: String,
}

/// The parts of a script the coordinator acts on. Fields whose operation is
/// absent are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptInfo {
    /// Report path with backslashes normalized to `/`.
    pub report_path: String,
    pub workbook: Option<String>,
    pub replaced_turbine: Option<TurbineReplacement>,
    pub replaced_positions: Option<PositionReplacement>,
    pub optimise_iterations: Option<u32>,
    pub operations: Vec<OperationKind>,
}

impl ScriptInfo {
    pub fn from_script(script: &Script) -> Self {
        let mut info = ScriptInfo {
            report_path: script.report_path.replace('\\', "/"),
            workbook: None,
            replaced_turbine: None,
            replaced_positions: None,
            optimise_iterations: None,
            operations: script.operation_kinds(),
        };
        for op in &script.operations {
            match op {
                Operation::ChangeWorkbook { path } if info.workbook.is_none() => {
                    info.workbook = Some(path.clone());
                }
                Operation::ReplaceTurbineType { name, path } if info.replaced_turbine.is_none() => {
                    info.replaced_turbine = Some(TurbineReplacement {
                        name: name.clone(),
                        path: path.clone(),
                    });
                }
                Operation::ReplaceTurbinePositions { site_name, path }
                    if info.replaced_positions.is_none() =>
                {
                    info.replaced_positions = Some(PositionReplacement {
                        site_name: site_name.clone(),
                        path: path.clone(),
                    });
                }
                Operation::Optimize {
                    iterations: Some(n),
                } if info.optimise_iterations.is_none() => {
                    info.optimise_iterations = Some(*n);
                }
                _ => {}
            }
        }
        info
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        self.operations.contains(&kind)
    }
}

/// Read a script file and summarize it.
pub fn read_script_info(path: &Path) -> ScriptResult<ScriptInfo> {
    let script = crate::load_script(path)?;
    let info = ScriptInfo::from_script(&script);
    tracing::debug!(
        path = %path.display(),
        operations = info.operations.len(),
        workbook = info.workbook.as_deref().unwrap_or("-"),
        "read script"
    );
    Ok(info)
}

/// True iff the script has an `Optimise` operation, i.e. the engine should be
/// driven interactively.
pub fn requires_optimize_flow(info: &ScriptInfo) -> bool {
    info.contains(OperationKind::Optimize)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriveFlow {
    /// Host pushes positions and waits for each re-evaluation.
    Interactive,
    /// Engine runs the whole script and exits.
    RunToCompletion,
}

/// Why a long-lived engine process cannot be reused across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StartOnceBlocker {
    /// The turbine file must be rewritten before every engine start.
    ReplaceTurbineType,
    /// Positions are loaded from a file by the script at start-up.
    ReplaceTurbinePositions,
}

/// Classification result handed to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrivePolicy {
    pub flow: DriveFlow,
    /// Turbine file the coordinator must rewrite before each round.
    pub turbine_rewrite: Option<TurbineReplacement>,
    pub start_once_blocker: Option<StartOnceBlocker>,
}

impl DrivePolicy {
    pub fn start_once_allowed(&self) -> bool {
        self.start_once_blocker.is_none()
    }
}

pub fn classify(info: &ScriptInfo) -> DrivePolicy {
    let flow = if requires_optimize_flow(info) {
        DriveFlow::Interactive
    } else {
        DriveFlow::RunToCompletion
    };
    let start_once_blocker = if info.replaced_turbine.is_some() {
        Some(StartOnceBlocker::ReplaceTurbineType)
    } else if info.replaced_positions.is_some() {
        Some(StartOnceBlocker::ReplaceTurbinePositions)
    } else {
        None
    };
    DrivePolicy {
        flow,
        turbine_rewrite: info.replaced_turbine.clone(),
        start_once_blocker,
    }
}

/// Build the summary directly from script text.
pub fn script_info_from_str(text: &str, origin: &Path) -> ScriptResult<ScriptInfo> {
    let script = crate::codec::decode_script(text, origin)?;
    Ok(ScriptInfo::from_script(&script))
}

impl From<&Script> for ScriptInfo {
    fn from(script: &Script) -> Self {
        ScriptInfo::from_script(script)
    }
}
