use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Classifying,
    WritingTurbine,
    Launching,
    InitialEvaluation,
    WritingPositions,
    AwaitingResults,
    Parsing,
    CheckingReport,
    Terminating,
    Completed,
}

impl RunStage {
    pub fn label(self) -> &'static str {
        match self {
            RunStage::Classifying => "classifying script",
            RunStage::WritingTurbine => "writing turbine file",
            RunStage::Launching => "launching engine",
            RunStage::InitialEvaluation => "initial evaluation",
            RunStage::WritingPositions => "writing positions",
            RunStage::AwaitingResults => "awaiting results",
            RunStage::Parsing => "parsing results",
            RunStage::CheckingReport => "checking report",
            RunStage::Terminating => "stopping engine",
            RunStage::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunProgressEvent {
    pub stage: RunStage,
    /// Interactive round number, starting at 1.
    pub iteration: Option<u32>,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
}

impl RunProgressEvent {
    pub fn stage(
        stage: RunStage,
        iteration: Option<u32>,
        elapsed_wall_s: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            stage,
            iteration,
            elapsed_wall_s,
            message,
        }
    }
}

pub(crate) fn emit_progress(
    progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    stage: RunStage,
    iteration: Option<u32>,
    started: Instant,
    message: Option<String>,
) {
    tracing::debug!(?stage, ?iteration, "stage");
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(RunProgressEvent::stage(
            stage,
            iteration,
            started.elapsed().as_secs_f64(),
            message,
        ));
    }
}
