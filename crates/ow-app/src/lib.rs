//! Coordination service layer for the external wind-farm engine.
//!
//! This crate ties the script, turbine, report and handshake crates into a
//! coordinator that launches the engine, drives it round by round or to
//! completion, and reports energy figures back to CLI and library callers.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod locate;
pub mod progress;
pub mod workbook;

// Re-export key types for convenience
pub use config::{CoordinatorConfig, LaunchMode, load_config, parse_config};
pub use coordinator::{
    CoordinatorState, IterationOutcome, ProcessCoordinator, RunOutcome, SessionPaths,
};
pub use engine::{EngineProcess, EngineSpawner, SystemSpawner};
pub use error::{AppError, AppResult};
pub use locate::{find_engine, find_engine_in};
pub use progress::{RunProgressEvent, RunStage};
pub use workbook::{
    WorkbookQuery, baseline_energy, evaluate_workbook, evaluate_workbook_with,
    positions_from_report, turbine_positions,
};
