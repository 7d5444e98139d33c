//! Handshake files. The names are fixed by the engine and must not change.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ow_turbine::{Position, format_positions};

use crate::{NotifyError, NotifyResult};

/// Turbine positions for the next round, one `x\ty` line per turbine.
pub const POSITIONS_FILE: &str = "positions.txt";
/// Sentinel the engine polls for; its creation is the "go" signal.
pub const READY_FILE: &str = "notifyOW.txt";
/// Compact results the engine writes at the end of a round.
pub const RESULTS_FILE: &str = "results.txt";

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> NotifyError + '_ {
    move |source| NotifyError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write the positions file and sync it to disk before returning, so the
/// engine never sees a ready file ahead of the positions it refers to.
pub fn write_positions(dir: &Path, positions: &[Position]) -> NotifyResult<PathBuf> {
    let path = dir.join(POSITIONS_FILE);
    if positions.is_empty() {
        tracing::warn!(path = %path.display(), "writing empty positions file");
    }
    let mut file = File::create(&path).map_err(io_err(&path))?;
    file.write_all(format_positions(positions).as_bytes())
        .map_err(io_err(&path))?;
    file.flush().map_err(io_err(&path))?;
    file.sync_all().map_err(io_err(&path))?;
    tracing::debug!(path = %path.display(), turbines = positions.len(), "positions written");
    Ok(path)
}

/// Truncate-create the ready sentinel and close it.
pub fn write_ready(dir: &Path) -> NotifyResult<PathBuf> {
    let path = dir.join(READY_FILE);
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(io_err(&path))?;
    tracing::debug!(path = %path.display(), "ready file written");
    Ok(path)
}

/// Modification time of `path`, `None` when it does not exist yet.
pub fn modified_time(path: &Path) -> NotifyResult<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(meta) => meta.modified().map(Some).map_err(io_err(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path)(e)),
    }
}
