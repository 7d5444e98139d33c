//! Coordinator configuration loaded from YAML.
//!
//! ```yaml
//! engine: C:/Models/Openwind/openWind64.exe
//! script: opt/optimise.xml
//! mode: per_iteration
//! timeout_s: 900
//! losses:
//!   availability: 0.97
//! history_dir: opt/history
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ow_notify::WaitOptions;
use ow_report::LossFactors;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// How engine processes map onto interactive rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    /// Spawn one engine and reuse it for every round.
    StartOnce,
    /// Spawn a fresh engine for every round.
    #[default]
    PerIteration,
}

impl LaunchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LaunchMode::StartOnce => "start_once",
            LaunchMode::PerIteration => "per_iteration",
        }
    }
}

fn default_timeout_s() -> Option<f64> {
    Some(600.0)
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Engine executable; discovered from the usual install locations when absent.
    #[serde(default)]
    pub engine: Option<PathBuf>,
    pub script: PathBuf,
    #[serde(default)]
    pub mode: LaunchMode,
    /// Bound on every wait for the engine. `null` waits until cancelled.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: Option<f64>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Terminate the engine when a per-iteration round ends. When off, the
    /// engine is left running until the next round or until the coordinator
    /// is terminated.
    #[serde(default = "yes")]
    pub stop_engine: bool,
    #[serde(default = "yes")]
    pub fail_on_engine_errors: bool,
    #[serde(default)]
    pub losses: LossFactors,
    #[serde(default)]
    pub history_dir: Option<PathBuf>,
    /// Handshake directory; defaults to the workbook's directory, then the
    /// script's.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl CoordinatorConfig {
    pub fn new(engine: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            engine: Some(engine.into()),
            ..Self::for_script(script)
        }
    }

    /// Defaults everywhere; the engine is discovered at prepare time.
    pub fn for_script(script: impl Into<PathBuf>) -> Self {
        Self {
            engine: None,
            script: script.into(),
            mode: LaunchMode::default(),
            timeout_s: default_timeout_s(),
            poll_interval_ms: default_poll_interval_ms(),
            stop_engine: true,
            fail_on_engine_errors: true,
            losses: LossFactors::default(),
            history_dir: None,
            work_dir: None,
        }
    }

    /// Values `check` rejects come back as `None`.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_s.and_then(|t| Duration::try_from_secs_f64(t).ok())
    }

    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            timeout: self.timeout(),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }

    /// Range checks that do not touch the filesystem.
    pub fn check(&self) -> AppResult<()> {
        if let Some(t) = self.timeout_s {
            if !(t.is_finite() && t > 0.0) {
                return Err(AppError::Configuration(format!(
                    "timeout_s must be positive, got {t}"
                )));
            }
            if Duration::try_from_secs_f64(t).is_err() {
                return Err(AppError::Configuration(format!(
                    "timeout_s is too large, got {t}"
                )));
            }
        }
        let l = self.losses;
        if !(0.0..=1.0).contains(&l.availability) || !(0.0..1.0).contains(&l.other_losses) {
            return Err(AppError::Configuration(format!(
                "losses out of range: availability={} other_losses={}",
                l.availability, l.other_losses
            )));
        }
        Ok(())
    }

    /// Make relative paths relative to `base` (the config file's directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.script);
        if let Some(p) = self.engine.as_mut() {
            fix(p);
        }
        if let Some(p) = self.history_dir.as_mut() {
            fix(p);
        }
        if let Some(p) = self.work_dir.as_mut() {
            fix(p);
        }
    }
}

pub fn parse_config(text: &str, origin: &Path) -> AppResult<CoordinatorConfig> {
    let config: CoordinatorConfig = serde_yaml::from_str(text).map_err(|e| {
        AppError::Configuration(format!("cannot read {}: {e}", origin.display()))
    })?;
    config.check()?;
    Ok(config)
}

/// Load a config file; relative paths inside it are taken from its directory.
pub fn load_config(path: &Path) -> AppResult<CoordinatorConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| AppError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&content, path)?;
    if let Some(dir) = path.parent() {
        config.resolve_paths(dir);
    }
    tracing::debug!(path = %path.display(), mode = config.mode.as_str(), "loaded config");
    Ok(config)
}
