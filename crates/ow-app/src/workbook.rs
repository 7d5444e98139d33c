//! Questions answered by running the engine once over a workbook.
//!
//! A throwaway script (open workbook, energy capture, exit) is written next
//! to the workbook, run to completion, and its report read back.

use std::path::{Path, PathBuf};

use ow_report::{AepSummary, EnergyReport};
use ow_script::{EnergyCapture, Operation, OutputFields, Script, WriteOptions, save_script};
use ow_turbine::Position;

use crate::config::CoordinatorConfig;
use crate::coordinator::ProcessCoordinator;
use crate::engine::{EngineSpawner, SystemSpawner};
use crate::error::{AppError, AppResult};

pub const QUERY_SCRIPT: &str = "gtpScript.xml";
pub const QUERY_REPORT: &str = "gtpReport.txt";

#[derive(Debug, Clone)]
pub struct WorkbookQuery {
    /// Discovered when `None`.
    pub engine: Option<PathBuf>,
    pub wake_model: String,
    pub timeout_s: Option<f64>,
    /// Leave the generated script and report next to the workbook.
    pub keep_files: bool,
}

impl Default for WorkbookQuery {
    fn default() -> Self {
        Self {
            engine: None,
            wake_model: ow_script::DEFAULT_WAKE_MODEL.to_string(),
            timeout_s: Some(600.0),
            keep_files: false,
        }
    }
}

pub fn query_script(workbook: &Path, report: &Path, wake_model: &str) -> Script {
    let mut script = Script::new(report.to_string_lossy());
    script.fields = OutputFields::default().with_positions(true);
    script.fields.set_flag("TurbineTypeField", true);
    script
        .add_operation(Operation::ChangeWorkbook {
            path: workbook.to_string_lossy().into_owned(),
        })
        .add_operation(Operation::EnergyCapture(EnergyCapture::new(wake_model)))
        .add_operation(Operation::Exit);
    script
}

pub fn evaluate_workbook(workbook: &Path, query: &WorkbookQuery) -> AppResult<EnergyReport> {
    evaluate_workbook_with(workbook, query, Box::new(SystemSpawner))
}

pub fn evaluate_workbook_with(
    workbook: &Path,
    query: &WorkbookQuery,
    spawner: Box<dyn EngineSpawner>,
) -> AppResult<EnergyReport> {
    if !workbook.is_file() {
        return Err(AppError::Configuration(format!(
            "workbook not found: {}",
            workbook.display()
        )));
    }
    // the script names the workbook, so it must not depend on the current directory
    let workbook = std::path::absolute(workbook).map_err(|source| AppError::Io {
        path: workbook.to_path_buf(),
        source,
    })?;
    let dir = match workbook.parent() {
        Some(d) => d.to_path_buf(),
        None => PathBuf::from("."),
    };
    let script_path = dir.join(QUERY_SCRIPT);
    let report_path = dir.join(QUERY_REPORT);

    let script = query_script(&workbook, &report_path, &query.wake_model);
    save_script(&script_path, &script, WriteOptions::engine())?;

    let mut config = CoordinatorConfig::for_script(&script_path);
    config.engine = query.engine.clone();
    config.timeout_s = query.timeout_s;

    let result = ProcessCoordinator::with_spawner(config, spawner)
        .and_then(|mut coordinator| coordinator.run_to_completion(None));

    if !query.keep_files {
        for path in [&script_path, &report_path] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "could not remove query file");
                }
            }
        }
    }
    result.map(|outcome| outcome.report)
}

/// Turbine positions of the rows that carry coordinates.
pub fn positions_from_report(report: &EnergyReport) -> AppResult<Vec<Position>> {
    let positions: Vec<Position> = report
        .positions()
        .into_iter()
        .map(|(x, y)| Position::new(x, y))
        .collect();
    if positions.is_empty() && !report.records.is_empty() {
        return Err(AppError::Parse(
            "report rows carry no X[m]/Y[m] columns".to_string(),
        ));
    }
    Ok(positions)
}

/// Turbine positions stored in a workbook.
pub fn turbine_positions(workbook: &Path, query: &WorkbookQuery) -> AppResult<Vec<Position>> {
    positions_from_report(&evaluate_workbook(workbook, query)?)
}

/// Energy of the workbook's own layout.
pub fn baseline_energy(workbook: &Path, query: &WorkbookQuery) -> AppResult<AepSummary> {
    Ok(evaluate_workbook(workbook, query)?.summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ow_script::OperationKind;

    #[test]
    fn query_script_turns_on_positions_and_type() {
        let script = query_script(Path::new("/w/plant.blb"), Path::new("/w/gtpReport.txt"), "Park");
        assert!(script.fields.turbine_x && script.fields.turbine_y && script.fields.turbine_type);
        assert_eq!(
            script.operation_kinds(),
            vec![
                OperationKind::ChangeWorkbook,
                OperationKind::EnergyCapture,
                OperationKind::Exit
            ]
        );
    }

    #[test]
    fn positions_require_coordinate_columns() {
        let with_xy = ow_report::parse_report(
            "Site\tIndex\tX[m]\tY[m]\tGross [kWh]\tNet [kWh]\nS\t1\t10\t20\t5\t4\n",
            Path::new("r.txt"),
        )
        .unwrap();
        assert_eq!(positions_from_report(&with_xy).unwrap(), vec![Position::new(10.0, 20.0)]);

        let without = ow_report::parse_report(
            "Site\tIndex\tGross [kWh]\tNet [kWh]\nS\t1\t5\t4\n",
            Path::new("r.txt"),
        )
        .unwrap();
        assert!(positions_from_report(&without).is_err());
    }
}
