//! One handshake round against an engine working directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ow_turbine::Position;

use crate::cancel::CancelToken;
use crate::files::{RESULTS_FILE, modified_time, write_positions, write_ready};
use crate::wait::{ChangeWatcher, WaitOptions};
use crate::{NotifyError, NotifyResult};

/// Owns the watcher and callback for a single round. Sessions against
/// different directories are independent; two sessions on one directory
/// would race on the fixed file names.
pub struct NotifySession<'cb> {
    dir: PathBuf,
    watcher: ChangeWatcher,
    baseline: Option<SystemTime>,
    options: WaitOptions,
    cancel: CancelToken,
    on_change: Option<Box<dyn FnMut(&str) + 'cb>>,
    is_complete: Option<Box<dyn Fn(&str) -> bool + 'cb>>,
}

impl<'cb> NotifySession<'cb> {
    /// Install the results watch and record the results file's current
    /// modification time as the baseline.
    pub fn begin(dir: &Path, options: WaitOptions, cancel: CancelToken) -> NotifyResult<Self> {
        if !dir.is_dir() {
            return Err(NotifyError::MissingDirectory {
                path: dir.to_path_buf(),
            });
        }
        let results = dir.join(RESULTS_FILE);
        let watcher = ChangeWatcher::install(&results)?;
        let baseline = modified_time(&results)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            watcher,
            baseline,
            options,
            cancel,
            on_change: None,
            is_complete: None,
        })
    }

    /// Override the recorded baseline.
    pub fn with_baseline(mut self, baseline: Option<SystemTime>) -> Self {
        self.baseline = baseline;
        self
    }

    /// Called with the new results text before `wait` returns it.
    pub fn on_change(mut self, callback: impl FnMut(&str) + 'cb) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    /// Only accept results text that `check` considers complete. Anything
    /// else is taken as a write still in progress.
    pub fn complete_when(mut self, check: impl Fn(&str) -> bool + 'cb) -> Self {
        self.is_complete = Some(Box::new(check));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn results_path(&self) -> &Path {
        self.watcher.path()
    }

    pub fn baseline(&self) -> Option<SystemTime> {
        self.baseline
    }

    /// Block for the results change, then tear the watch down.
    pub fn wait(mut self) -> NotifyResult<String> {
        let text = match &self.is_complete {
            Some(check) => {
                self.watcher
                    .wait_until(self.baseline, &self.options, &self.cancel, check.as_ref())?
            }
            None => self.watcher.wait(self.baseline, &self.options, &self.cancel)?,
        };
        if let Some(callback) = self.on_change.as_mut() {
            callback(&text);
        }
        Ok(text)
    }
}

/// Push positions and wait for the engine's answer.
///
/// Order: positions written and synced, results baseline recorded with the
/// watch already installed, ready file written, then the wait.
pub fn handshake_round(
    dir: &Path,
    positions: &[Position],
    options: WaitOptions,
    cancel: CancelToken,
) -> NotifyResult<String> {
    write_positions(dir, positions)?;
    let session = NotifySession::begin(dir, options, cancel)?;
    write_ready(dir)?;
    tracing::debug!(dir = %dir.display(), turbines = positions.len(), "handshake started");
    session.wait()
}
