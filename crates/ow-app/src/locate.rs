//! Engine executable discovery.

use std::path::{Path, PathBuf};

/// Overrides the search when set to an existing file.
pub const ENGINE_ENV: &str = "OPENWIND_EXE";

pub const ENGINE_EXE: &str = "openWind64.exe";
pub const ACADEMIC_ENGINE_EXE: &str = "openWind64_ac.exe";

/// Usual install locations, searched in order.
pub const SEARCH_DIRS: &[&str] = &["C:/rassess/Openwind", "C:/Models/Openwind"];

pub fn engine_file_name(academic: bool) -> &'static str {
    if academic { ACADEMIC_ENGINE_EXE } else { ENGINE_EXE }
}

/// First directory in `dirs` that holds the engine executable.
pub fn find_engine_in<P: AsRef<Path>>(dirs: &[P], academic: bool) -> Option<PathBuf> {
    let name = engine_file_name(academic);
    dirs.iter()
        .map(|d| d.as_ref().join(name))
        .find(|p| p.is_file())
}

/// Environment override first, then the usual install locations.
pub fn find_engine(academic: bool) -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(ENGINE_ENV).map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), "{ENGINE_ENV} does not name a file, searching");
    }
    let found = find_engine_in(SEARCH_DIRS, academic);
    match &found {
        Some(p) => tracing::debug!(path = %p.display(), "engine found"),
        None => tracing::debug!(dirs = ?SEARCH_DIRS, "engine not found"),
    }
    found
}
