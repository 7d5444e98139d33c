//! Block until a file changes.
//!
//! The watcher is installed before the file is first checked, so a write
//! that lands between "record baseline" and "start waiting" is caught either
//! by the buffered event or by the modification-time check. Modification
//! times are also polled on every slice in case the platform drops events
//! (network shares, some virtualized filesystems).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant, SystemTime};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use ow_core::Stopwatch;

use crate::cancel::CancelToken;
use crate::files::modified_time;
use crate::{NotifyError, NotifyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// `None` waits until cancelled.
    pub timeout: Option<Duration>,
    /// Upper bound between modification-time checks and cancel checks.
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(600)),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }
}

/// A directory watch filtered to a single file name. Dropping it removes
/// the watch.
pub struct ChangeWatcher {
    path: PathBuf,
    file_name: OsString,
    rx: Receiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
}

impl ChangeWatcher {
    pub fn install(path: &Path) -> NotifyResult<Self> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            return Err(NotifyError::MissingDirectory { path: dir });
        }
        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| NotifyError::MissingDirectory { path: path.to_path_buf() })?;

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).map_err(|source| NotifyError::Watch {
            path: dir.clone(),
            source,
        })?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| NotifyError::Watch {
                path: dir.clone(),
                source,
            })?;
        tracing::debug!(dir = %dir.display(), file = ?file_name, "watch installed");

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            rx,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn concerns_file(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(self.file_name.as_os_str()))
    }

    /// Wait until the file's modification time moves past `baseline` (or the
    /// file appears, when `baseline` is `None`) or a write event arrives, then
    /// return its contents once they have settled.
    pub fn wait(
        &self,
        baseline: Option<SystemTime>,
        opts: &WaitOptions,
        cancel: &CancelToken,
    ) -> NotifyResult<String> {
        self.wait_until(baseline, opts, cancel, &|_| true)
    }

    /// Like [`ChangeWatcher::wait`], but the contents are only handed back
    /// when `is_complete` accepts them.
    ///
    /// Contents are returned once they are non-empty and neither the text
    /// nor the modification time has moved for a full `poll_interval`. An
    /// empty file means the writer has only truncated it so far. Text that
    /// `is_complete` rejects is treated as a write still in progress, and the
    /// wait continues until the next change or the timeout.
    pub fn wait_until(
        &self,
        baseline: Option<SystemTime>,
        opts: &WaitOptions,
        cancel: &CancelToken,
        is_complete: &dyn Fn(&str) -> bool,
    ) -> NotifyResult<String> {
        let clock = Stopwatch::start("wait_for_change");
        let mut event_seen = false;
        let mut pending: Option<Pending> = None;

        loop {
            let stamp = modified_time(&self.path)?;
            if event_seen || pending.is_some() || advanced(stamp, baseline) {
                event_seen = false;
                match read_if_present(&self.path)? {
                    Some(text) if !text.trim().is_empty() => {
                        let same = pending
                            .as_ref()
                            .is_some_and(|p| p.text == text && p.stamp == stamp);
                        if !same {
                            pending = Some(Pending {
                                text,
                                stamp,
                                since: Instant::now(),
                            });
                        }
                        let settled = same
                            && pending
                                .as_ref()
                                .is_some_and(|p| p.since.elapsed() >= opts.poll_interval);
                        if settled {
                            if let Some(p) = pending.take() {
                                if is_complete(&p.text) {
                                    tracing::debug!(path = %self.path.display(), "change detected");
                                    clock.finish();
                                    return Ok(p.text);
                                }
                                tracing::trace!(path = %self.path.display(), "contents incomplete");
                                pending = Some(Pending {
                                    since: Instant::now(),
                                    ..p
                                });
                            }
                        }
                    }
                    _ => pending = None,
                }
            }

            if cancel.is_cancelled() {
                tracing::info!(path = %self.path.display(), "wait cancelled");
                return Err(NotifyError::Cancelled {
                    path: self.path.clone(),
                });
            }

            let slice = match opts.timeout {
                Some(budget) => match clock.remaining(budget) {
                    Some(left) => left.min(opts.poll_interval),
                    None => {
                        tracing::warn!(path = %self.path.display(), "no change before timeout");
                        return Err(NotifyError::Timeout {
                            path: self.path.clone(),
                            waited: clock.elapsed(),
                        });
                    }
                },
                None => opts.poll_interval,
            };

            match self.rx.recv_timeout(slice) {
                Ok(Ok(event)) => {
                    if self.concerns_file(&event) {
                        event_seen = true;
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "watcher error");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(NotifyError::WatcherDisconnected {
                        path: self.path.clone(),
                    });
                }
            }
        }
    }
}

/// Contents seen on the last check, with the time they were first seen.
struct Pending {
    text: String,
    stamp: Option<SystemTime>,
    since: Instant,
}

/// Whether `current` is a newer modification time than `baseline`. A file
/// that appears where none was recorded counts as newer.
pub fn advanced(current: Option<SystemTime>, baseline: Option<SystemTime>) -> bool {
    match (current, baseline) {
        (Some(now), Some(before)) => now > before,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn read_if_present(path: &Path) -> NotifyResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(NotifyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Install a watch on `path`, then block until it changes relative to
/// `baseline`. A change that happened before the call returns immediately.
pub fn wait_for_change(
    path: &Path,
    baseline: Option<SystemTime>,
    opts: &WaitOptions,
    cancel: &CancelToken,
) -> NotifyResult<String> {
    ChangeWatcher::install(path)?.wait(baseline, opts, cancel)
}
