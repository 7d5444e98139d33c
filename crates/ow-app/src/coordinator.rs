//! Drives the engine process through a script.
//!
//! One coordinator owns one engine working directory. Interactive scripts
//! (those with an `Optimise` operation) are driven round by round through the
//! file handshake; other scripts run to completion and are read from their
//! report.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::{Instant, SystemTime};

use ow_history::{HistoryStore, IterationRecord, SessionId, SessionManifest, compute_session_id};
use ow_notify::{
    CancelToken, NotifyError, NotifySession, RESULTS_FILE, advanced, modified_time, write_positions,
    write_ready,
};
use ow_report::{
    AdjustedAep, AepSummary, EnergyReport, InteractiveResults, ReportRecord,
    is_turbine_replacement_failure, parse_results, read_report, results_complete,
    scan_engine_errors,
};
use ow_script::validate::validate_kinds;
use ow_script::{DriveFlow, DrivePolicy, ScriptInfo, StartOnceBlocker, classify, read_script_info};
use ow_turbine::{TurbineCatalog, TurbineError, TurbineLayout};

use crate::config::{CoordinatorConfig, LaunchMode};
use crate::engine::{EngineProcess, EngineSpawner, SystemSpawner};
use crate::error::{AppError, AppResult};
use crate::locate::find_engine;
use crate::progress::{RunProgressEvent, RunStage, emit_progress};

/// Session state. `Running` means the session is live; in per-iteration
/// mode the engine process itself only exists for the length of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    NotStarted,
    Running,
    WaitingForResult,
    /// Terminal.
    Terminated,
}

/// Absolute locations derived from the config and the script.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPaths {
    pub engine: PathBuf,
    pub script: PathBuf,
    pub workbook: Option<PathBuf>,
    /// Where the handshake files live.
    pub work_dir: PathBuf,
    pub report: PathBuf,
    /// OWTG file rewritten before each round, when the script replaces a turbine type.
    pub turbine_file: Option<PathBuf>,
}

impl SessionPaths {
    pub fn results_file(&self) -> PathBuf {
        self.work_dir.join(RESULTS_FILE)
    }
}

#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub iteration: u32,
    pub results: InteractiveResults,
    pub records: Vec<ReportRecord>,
    pub summary: AepSummary,
    pub adjusted: AdjustedAep,
    /// Engine failure lines found in the run report (non-fatal when the
    /// config says so).
    pub engine_errors: Vec<String>,
    pub elapsed_s: f64,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: EnergyReport,
    pub adjusted: AdjustedAep,
    pub exit_code: Option<i32>,
    pub elapsed_s: f64,
}

pub struct ProcessCoordinator {
    config: CoordinatorConfig,
    paths: SessionPaths,
    info: ScriptInfo,
    policy: DrivePolicy,
    spawner: Box<dyn EngineSpawner>,
    process: Option<EngineProcess>,
    state: CoordinatorState,
    cancel: CancelToken,
    iteration: u32,
    /// Set from spawn until the engine's start-up evaluation has been seen.
    startup_baseline: Option<Option<SystemTime>>,
    /// Report modification time at spawn, moved forward after each scan.
    report_baseline: Option<SystemTime>,
    history: Option<(HistoryStore, SessionId)>,
}

/// Directory part of `path`, `.` when it has none.
fn dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn resolve_against(base: &Path, named: &str) -> PathBuf {
    let p = PathBuf::from(named);
    if p.is_relative() { base.join(p) } else { p }
}

fn blocker_reason(blocker: StartOnceBlocker) -> &'static str {
    match blocker {
        StartOnceBlocker::ReplaceTurbineType => {
            "the script replaces a turbine type, so the turbine file must be rewritten before every engine start"
        }
        StartOnceBlocker::ReplaceTurbinePositions => {
            "the script loads turbine positions from a file at start-up"
        }
    }
}

impl ProcessCoordinator {
    /// Check the configuration and classify the script. Nothing is spawned.
    pub fn prepare(config: CoordinatorConfig) -> AppResult<Self> {
        Self::with_spawner(config, Box::new(SystemSpawner))
    }

    pub fn with_spawner(config: CoordinatorConfig, spawner: Box<dyn EngineSpawner>) -> AppResult<Self> {
        config.check()?;

        let engine = match &config.engine {
            Some(p) => p.clone(),
            None => find_engine(false).ok_or_else(|| {
                AppError::Configuration(format!(
                    "no engine configured and none found in the usual locations (set {})",
                    crate::locate::ENGINE_ENV
                ))
            })?,
        };
        if !engine.is_file() {
            return Err(AppError::Configuration(format!(
                "engine executable not found: {}",
                engine.display()
            )));
        }
        if !config.script.is_file() {
            return Err(AppError::Configuration(format!(
                "script not found: {}",
                config.script.display()
            )));
        }

        let info = read_script_info(&config.script)?;
        let policy = classify(&info);
        let script_dir = dir_of(&config.script);

        let workbook = info
            .workbook
            .as_deref()
            .map(|w| resolve_against(&script_dir, w));
        if let Some(wb) = &workbook {
            if !wb.is_file() {
                return Err(AppError::Configuration(format!(
                    "workbook named by {} not found: {}",
                    config.script.display(),
                    wb.display()
                )));
            }
        }

        if config.mode == LaunchMode::StartOnce {
            if let Some(blocker) = policy.start_once_blocker {
                return Err(AppError::Configuration(format!(
                    "start_once cannot be used with {}: {}",
                    config.script.display(),
                    blocker_reason(blocker)
                )));
            }
        }

        let work_dir = match (&config.work_dir, &workbook) {
            (Some(dir), _) => dir.clone(),
            (None, Some(wb)) => dir_of(wb),
            (None, None) => script_dir.clone(),
        };
        if !work_dir.is_dir() {
            return Err(AppError::Configuration(format!(
                "work directory not found: {}",
                work_dir.display()
            )));
        }

        let paths = SessionPaths {
            report: resolve_against(&script_dir, &info.report_path),
            turbine_file: policy
                .turbine_rewrite
                .as_ref()
                .map(|t| resolve_against(&script_dir, &t.path)),
            engine,
            script: config.script.clone(),
            workbook,
            work_dir,
        };

        let history = match &config.history_dir {
            Some(dir) => Some(open_history(dir, &paths, config.mode)?),
            None => None,
        };

        tracing::info!(
            script = %paths.script.display(),
            engine = %paths.engine.display(),
            work_dir = %paths.work_dir.display(),
            flow = ?policy.flow,
            mode = config.mode.as_str(),
            "coordinator prepared"
        );

        Ok(Self {
            config,
            paths,
            info,
            policy,
            spawner,
            process: None,
            state: CoordinatorState::NotStarted,
            cancel: CancelToken::new(),
            iteration: 0,
            startup_baseline: None,
            report_baseline: None,
            history,
        })
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn info(&self) -> &ScriptInfo {
        &self.info
    }

    pub fn policy(&self) -> &DrivePolicy {
        &self.policy
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Rounds started so far.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn engine_pid(&self) -> Option<u32> {
        self.process.as_ref().map(EngineProcess::pid)
    }

    pub fn history_session(&self) -> Option<&str> {
        self.history.as_ref().map(|(_, id)| id.as_str())
    }

    /// Cancelling the token abandons the current wait, kills the engine and
    /// ends the session.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn ensure_live(&self) -> AppResult<()> {
        if self.state == CoordinatorState::Terminated {
            return Err(AppError::InvalidState(
                "coordinator has been terminated".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether an engine process is alive; forgets one that has exited.
    fn process_alive(&mut self) -> AppResult<bool> {
        let Some(process) = self.process.as_mut() else {
            return Ok(false);
        };
        if process.has_exited()? {
            tracing::warn!(pid = process.pid(), status = ?process.exit_status(), "engine exited on its own");
            self.process = None;
            self.startup_baseline = None;
            return Ok(false);
        }
        Ok(true)
    }

    fn spawn_engine(&mut self) -> AppResult<()> {
        let baseline = modified_time(&self.paths.results_file())?;
        let report_baseline = modified_time(&self.paths.report)?;
        let process = EngineProcess::spawn(
            &*self.spawner,
            &self.paths.engine,
            &self.paths.script,
            &self.paths.work_dir,
        )?;
        self.process = Some(process);
        self.startup_baseline = Some(baseline);
        self.report_baseline = report_baseline;
        self.state = CoordinatorState::Running;
        Ok(())
    }

    /// Start the engine if it is not already running. Interactive rounds
    /// launch on their own; this is for starting a start-once engine early.
    pub fn launch(&mut self) -> AppResult<()> {
        self.ensure_live()?;
        if self.process_alive()? {
            return Ok(());
        }
        self.spawn_engine()
    }

    /// Stop the engine without ending the session.
    fn stop_engine(&mut self) -> AppResult<()> {
        if let Some(process) = self.process.as_mut() {
            process.terminate()?;
        }
        self.process = None;
        self.startup_baseline = None;
        Ok(())
    }

    /// Kill the engine (if any) and end the session. Safe to call repeatedly.
    pub fn terminate(&mut self) -> AppResult<()> {
        self.stop_engine()?;
        if self.state != CoordinatorState::Terminated {
            tracing::info!(iterations = self.iteration, "coordinator terminated");
        }
        self.state = CoordinatorState::Terminated;
        Ok(())
    }

    /// Terminate on a fatal error path; the original error wins.
    fn abort(&mut self) {
        if let Err(e) = self.terminate() {
            tracing::error!(error = %e, "failed to terminate engine after fatal error");
        }
    }

    /// Map a failed wait. A timeout on an engine that has already died is
    /// reported as a process failure instead. Cancellation ends the session.
    fn wait_failed(&mut self, err: NotifyError) -> AppError {
        if let NotifyError::Cancelled { .. } = err {
            self.abort();
            return err.into();
        }
        self.state = CoordinatorState::Running;
        if let NotifyError::Timeout { .. } = err {
            if let Some(process) = self.process.as_mut() {
                if let Ok(true) = process.has_exited() {
                    return AppError::Process(format!(
                        "engine pid {} exited ({:?}) before writing {}",
                        process.pid(),
                        process.exit_status(),
                        self.paths.results_file().display()
                    ));
                }
            }
        }
        err.into()
    }

    fn await_startup(&mut self) -> AppResult<()> {
        let Some(baseline) = self.startup_baseline else {
            return Ok(());
        };
        let session = NotifySession::begin(
            &self.paths.work_dir,
            self.config.wait_options(),
            self.cancel.clone(),
        )?
        .with_baseline(baseline);
        self.state = CoordinatorState::WaitingForResult;
        if let Err(e) = session.wait() {
            return Err(self.wait_failed(e));
        }
        self.state = CoordinatorState::Running;
        self.startup_baseline = None;
        Ok(())
    }

    fn write_turbine_file(&self, layout: &TurbineLayout, catalog: &TurbineCatalog) -> AppResult<()> {
        let (Some(path), Some(replacement)) =
            (&self.paths.turbine_file, &self.policy.turbine_rewrite)
        else {
            return Ok(());
        };
        let entry = layout.primary(catalog)?;
        let bytes = ow_turbine::encode(&entry.definition, &replacement.name, &entry.name)?;
        std::fs::write(path, bytes).map_err(|source| AppError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), turbine = %entry.name, "turbine file written");
        Ok(())
    }

    /// Engine failure lines in the run report. Fatal (and terminating) when
    /// the config says so. A report the engine has not rewritten since it
    /// was spawned (or since the last scan) belongs to an earlier run and is
    /// skipped.
    fn check_report(&mut self) -> AppResult<Vec<String>> {
        let stamp = modified_time(&self.paths.report)?;
        if !advanced(stamp, self.report_baseline) {
            return Ok(Vec::new());
        }
        self.report_baseline = stamp;
        let errors = scan_engine_errors(&self.paths.report)?;
        if errors.is_empty() {
            return Ok(errors);
        }
        let mut message = errors.join("; ");
        if let Some(t) = &self.policy.turbine_rewrite {
            if errors.iter().any(|e| is_turbine_replacement_failure(e)) {
                message.push_str(&format!(
                    " (replacement turbine '{}' from {})",
                    t.name, t.path
                ));
            }
        }
        if self.config.fail_on_engine_errors {
            self.abort();
            return Err(AppError::EngineReportedFailure {
                report: self.paths.report.clone(),
                count: errors.len(),
                message,
            });
        }
        tracing::warn!(report = %self.paths.report.display(), count = errors.len(), %message, "engine reported failures");
        Ok(errors)
    }

    /// One interactive round: write the turbine file if the script replaces
    /// a turbine type, make sure an engine is running and has finished its
    /// start-up evaluation, push the layout, and read the engine's answer.
    pub fn run_iteration(
        &mut self,
        layout: &TurbineLayout,
        catalog: &TurbineCatalog,
        progress: Option<&mut dyn FnMut(RunProgressEvent)>,
    ) -> AppResult<IterationOutcome> {
        let mut progress = progress;
        let started = Instant::now();
        self.ensure_live()?;

        emit_progress(&mut progress, RunStage::Classifying, None, started, None);
        validate_kinds(&self.info.operations, DriveFlow::Interactive)?;
        if layout.is_empty() {
            return Err(TurbineError::EmptyLayout.into());
        }
        layout.check_against(catalog)?;

        self.iteration += 1;
        let n = self.iteration;

        if self.config.mode == LaunchMode::PerIteration {
            // left over when stop_engine is off
            self.stop_engine()?;
        }

        if self.paths.turbine_file.is_some() {
            emit_progress(&mut progress, RunStage::WritingTurbine, Some(n), started, None);
            self.write_turbine_file(layout, catalog)?;
        }

        if !self.process_alive()? {
            emit_progress(&mut progress, RunStage::Launching, Some(n), started, None);
            self.spawn_engine()?;
        }
        if self.startup_baseline.is_some() {
            emit_progress(&mut progress, RunStage::InitialEvaluation, Some(n), started, None);
            self.await_startup()?;
        }

        emit_progress(&mut progress, RunStage::WritingPositions, Some(n), started, None);
        write_positions(&self.paths.work_dir, layout.positions())?;
        let session = NotifySession::begin(
            &self.paths.work_dir,
            self.config.wait_options(),
            self.cancel.clone(),
        )?
        .complete_when(results_complete);
        write_ready(&self.paths.work_dir)?;

        self.state = CoordinatorState::WaitingForResult;
        emit_progress(&mut progress, RunStage::AwaitingResults, Some(n), started, None);
        let text = match session.wait() {
            Ok(text) => text,
            Err(e) => return Err(self.wait_failed(e)),
        };
        self.state = CoordinatorState::Running;

        emit_progress(&mut progress, RunStage::Parsing, Some(n), started, None);
        let results = match parse_results(&text, &self.paths.results_file()) {
            Ok(r) => r,
            Err(e) => {
                self.abort();
                return Err(e.into());
            }
        };
        if results.turbine_count != layout.len() {
            tracing::warn!(
                pushed = layout.len(),
                reported = results.turbine_count,
                "engine reported a different turbine count"
            );
        }

        if self.config.mode == LaunchMode::PerIteration && self.config.stop_engine {
            emit_progress(&mut progress, RunStage::Terminating, Some(n), started, None);
            self.stop_engine()?;
        }

        emit_progress(&mut progress, RunStage::CheckingReport, Some(n), started, None);
        let engine_errors = self.check_report()?;

        let summary = results.summary();
        let adjusted = summary.with_losses(self.config.losses);
        let elapsed_s = started.elapsed().as_secs_f64();

        if let Some((store, id)) = &self.history {
            let record = IterationRecord {
                iteration: n,
                timestamp: ow_history::timestamp_now(),
                gross_gwh: summary.gross_gwh,
                net_gwh: summary.net_gwh,
                positions: layout.positions().iter().map(|p| [p.x, p.y]).collect(),
                elapsed_s,
            };
            store.append_iteration(id, &record)?;
        }

        tracing::info!(
            iteration = n,
            gross_gwh = summary.gross_gwh,
            net_gwh = summary.net_gwh,
            elapsed_s,
            "round complete"
        );
        emit_progress(&mut progress, RunStage::Completed, Some(n), started, None);

        Ok(IterationOutcome {
            iteration: n,
            records: results.to_records(),
            results,
            summary,
            adjusted,
            engine_errors,
            elapsed_s,
        })
    }

    /// Run the whole script once and read its report. The session ends
    /// with the engine's exit.
    pub fn run_to_completion(
        &mut self,
        progress: Option<&mut dyn FnMut(RunProgressEvent)>,
    ) -> AppResult<RunOutcome> {
        let mut progress = progress;
        let started = Instant::now();
        self.ensure_live()?;

        emit_progress(&mut progress, RunStage::Classifying, None, started, None);
        validate_kinds(&self.info.operations, DriveFlow::RunToCompletion)?;
        if let Some(path) = &self.paths.turbine_file {
            if !path.is_file() {
                return Err(AppError::Configuration(format!(
                    "turbine file named by the script not found: {}",
                    path.display()
                )));
            }
        }
        if self.process_alive()? {
            return Err(AppError::InvalidState(
                "an engine is already running for this session".to_string(),
            ));
        }

        emit_progress(&mut progress, RunStage::Launching, None, started, None);
        self.spawn_engine()?;
        let report_before = self.report_baseline;
        self.state = CoordinatorState::WaitingForResult;
        emit_progress(&mut progress, RunStage::AwaitingResults, None, started, None);
        let status = self.wait_for_engine_exit()?;
        self.process = None;
        self.startup_baseline = None;
        self.state = CoordinatorState::Terminated;
        if !status.success() {
            tracing::warn!(?status, "engine exited with failure status");
        }
        // a report left over from an earlier run says nothing about this one
        if !advanced(modified_time(&self.paths.report)?, report_before) {
            return Err(AppError::Process(format!(
                "engine exited ({status}) without writing {}",
                self.paths.report.display()
            )));
        }

        emit_progress(&mut progress, RunStage::Parsing, None, started, None);
        let report = read_report(&self.paths.report)?;
        if report.engine_error_count() > 0 {
            let message = report.engine_errors.join("; ");
            if self.config.fail_on_engine_errors {
                return Err(AppError::EngineReportedFailure {
                    report: self.paths.report.clone(),
                    count: report.engine_error_count(),
                    message,
                });
            }
            tracing::warn!(report = %self.paths.report.display(), %message, "engine reported failures");
        }

        let adjusted = report.summary.with_losses(self.config.losses);
        let elapsed_s = started.elapsed().as_secs_f64();
        tracing::info!(
            turbines = report.summary.turbine_count,
            net_gwh = report.summary.net_gwh,
            elapsed_s,
            "run complete"
        );
        emit_progress(&mut progress, RunStage::Completed, None, started, None);
        Ok(RunOutcome {
            report,
            adjusted,
            exit_code: status.code(),
            elapsed_s,
        })
    }

    fn wait_for_engine_exit(&mut self) -> AppResult<ExitStatus> {
        let timeout = self.config.timeout();
        let poll = self.config.wait_options().poll_interval;
        let Some(process) = self.process.as_mut() else {
            return Err(AppError::InvalidState("no engine process".to_string()));
        };
        let clock = Instant::now();
        loop {
            // wait in poll-sized slices so cancellation is noticed
            let slice = match timeout {
                Some(t) => match t.checked_sub(clock.elapsed()) {
                    Some(left) if !left.is_zero() => left.min(poll * 4),
                    _ => {
                        self.state = CoordinatorState::Running;
                        return Err(AppError::EngineTimeout {
                            path: self.paths.report.clone(),
                            waited_s: clock.elapsed().as_secs_f64(),
                        });
                    }
                },
                None => poll * 4,
            };
            match process.wait_for_exit(Some(slice), poll) {
                Ok(status) => return Ok(status),
                Err(AppError::EngineTimeout { .. }) => {
                    if self.cancel.is_cancelled() {
                        self.abort();
                        return Err(AppError::Cancelled(format!(
                            "run of {} cancelled",
                            self.paths.script.display()
                        )));
                    }
                }
                Err(e) => {
                    self.state = CoordinatorState::Running;
                    return Err(e);
                }
            }
        }
    }
}

impl Drop for ProcessCoordinator {
    fn drop(&mut self) {
        if let Some(process) = self.process.as_mut() {
            if let Err(e) = process.terminate() {
                tracing::warn!(pid = process.pid(), error = %e, "could not terminate engine on drop");
            }
        }
    }
}

fn open_history(
    dir: &Path,
    paths: &SessionPaths,
    mode: LaunchMode,
) -> AppResult<(HistoryStore, SessionId)> {
    let store = HistoryStore::new(dir.to_path_buf())?;
    let script_bytes = std::fs::read(&paths.script).map_err(|source| AppError::Io {
        path: paths.script.clone(),
        source,
    })?;
    let id = compute_session_id(&script_bytes, &paths.engine);
    let manifest = SessionManifest::new(
        id.clone(),
        &paths.script.display().to_string(),
        &paths.engine.display().to_string(),
        mode.as_str(),
    );
    store.create_session(&manifest)?;
    Ok((store, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_of_handles_bare_names() {
        assert_eq!(dir_of(Path::new("run.xml")), PathBuf::from("."));
        assert_eq!(dir_of(Path::new("a/run.xml")), PathBuf::from("a"));
    }

    #[test]
    fn relative_names_resolve_against_base() {
        assert_eq!(
            resolve_against(Path::new("/w"), "plant.blb"),
            PathBuf::from("/w/plant.blb")
        );
        assert_eq!(
            resolve_against(Path::new("/w"), "/abs/plant.blb"),
            PathBuf::from("/abs/plant.blb")
        );
    }
}
