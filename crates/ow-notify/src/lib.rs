//! ow-notify: file-based handshake with an engine that watches a shared directory.
//!
//! Contains:
//! - files (fixed handshake file names, position and ready-file writers)
//! - cancel (shared cancellation flag)
//! - wait (watch-then-check `wait_for_change` primitive)
//! - session (one handshake round owning its own watcher)

pub mod cancel;
pub mod files;
pub mod session;
pub mod wait;

use std::path::PathBuf;
use std::time::Duration;

pub use cancel::CancelToken;
pub use files::{
    POSITIONS_FILE, READY_FILE, RESULTS_FILE, modified_time, write_positions, write_ready,
};
pub use session::{NotifySession, handshake_round};
pub use wait::{ChangeWatcher, WaitOptions, advanced, wait_for_change};

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("No change to {} after {:.1} s", path.display(), waited.as_secs_f64())]
    Timeout { path: PathBuf, waited: Duration },

    #[error("Wait for {} was cancelled", path.display())]
    Cancelled { path: PathBuf },

    #[error("File watcher for {} stopped delivering events", path.display())]
    WatcherDisconnected { path: PathBuf },

    #[error("Cannot watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Handshake directory {} does not exist", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NotifyError {
    /// The file or directory the error concerns.
    pub fn path(&self) -> &std::path::Path {
        match self {
            NotifyError::Timeout { path, .. }
            | NotifyError::Cancelled { path }
            | NotifyError::WatcherDisconnected { path }
            | NotifyError::Watch { path, .. }
            | NotifyError::MissingDirectory { path }
            | NotifyError::Io { path, .. } => path,
        }
    }
}
