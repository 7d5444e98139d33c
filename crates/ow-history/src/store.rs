//! Session storage API.

use crate::types::{IterationRecord, SessionManifest};
use crate::{HistoryError, HistoryResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "manifest.json";
const ITERATIONS_FILE: &str = "iterations.jsonl";

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> HistoryError + '_ {
    move |source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_err(path: &Path) -> impl FnOnce(serde_json::Error) -> HistoryError + '_ {
    move |source| HistoryError::Json {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    root_dir: PathBuf,
}

impl HistoryStore {
    pub fn new(root_dir: PathBuf) -> HistoryResult<Self> {
        fs::create_dir_all(&root_dir).map_err(io_err(&root_dir))?;
        Ok(Self { root_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root_dir.join(session_id)
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.session_dir(session_id).join(MANIFEST_FILE).exists()
    }

    /// Create (or reopen) a session directory and write its manifest.
    /// Iterations already logged for the session are kept.
    pub fn create_session(&self, manifest: &SessionManifest) -> HistoryResult<()> {
        let dir = self.session_dir(&manifest.session_id);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(manifest).map_err(json_err(&path))?;
        fs::write(&path, json).map_err(io_err(&path))?;
        tracing::debug!(session = %manifest.session_id, dir = %dir.display(), "history session opened");
        Ok(())
    }

    pub fn append_iteration(&self, session_id: &str, record: &IterationRecord) -> HistoryResult<()> {
        if !self.has_session(session_id) {
            return Err(HistoryError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        let path = self.session_dir(session_id).join(ITERATIONS_FILE);
        let mut line = serde_json::to_string(record).map_err(json_err(&path))?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err(&path))?;
        file.write_all(line.as_bytes()).map_err(io_err(&path))?;
        Ok(())
    }

    pub fn load_manifest(&self, session_id: &str) -> HistoryResult<SessionManifest> {
        let path = self.session_dir(session_id).join(MANIFEST_FILE);
        if !path.exists() {
            return Err(HistoryError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        let content = fs::read_to_string(&path).map_err(io_err(&path))?;
        serde_json::from_str(&content).map_err(json_err(&path))
    }

    /// Logged iterations in write order; empty for a session with none yet.
    pub fn load_iterations(&self, session_id: &str) -> HistoryResult<Vec<IterationRecord>> {
        if !self.has_session(session_id) {
            return Err(HistoryError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        let path = self.session_dir(session_id).join(ITERATIONS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(io_err(&path))?;
        let mut records = Vec::new();
        for line in content.lines() {
            if !line.trim().is_empty() {
                let record: IterationRecord = serde_json::from_str(line).map_err(json_err(&path))?;
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Manifests of every session under the root, oldest first.
    pub fn list_sessions(&self) -> HistoryResult<Vec<SessionManifest>> {
        let mut sessions = Vec::new();
        let entries = fs::read_dir(&self.root_dir).map_err(io_err(&self.root_dir))?;
        for entry in entries {
            let entry = entry.map_err(io_err(&self.root_dir))?;
            if entry.path().is_dir() {
                let session_id = entry.file_name().to_string_lossy().to_string();
                match self.load_manifest(&session_id) {
                    Ok(manifest) => sessions.push(manifest),
                    Err(e) => tracing::warn!(session = %session_id, error = %e, "skipping unreadable session"),
                }
            }
        }
        sessions.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(sessions)
    }

    pub fn delete_session(&self, session_id: &str) -> HistoryResult<()> {
        let dir = self.session_dir(session_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        }
        Ok(())
    }
}
