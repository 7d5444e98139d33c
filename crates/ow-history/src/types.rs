//! History record types.

use serde::{Deserialize, Serialize};

pub type SessionId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub session_id: SessionId,
    pub script: String,
    pub engine: String,
    /// RFC 3339 creation time.
    pub created: String,
    pub mode: String,
}

/// One interactive round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    /// RFC 3339 completion time.
    pub timestamp: String,
    pub gross_gwh: f64,
    pub net_gwh: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<[f64; 2]>,
    pub elapsed_s: f64,
}

/// Current UTC time as stored in manifests and iteration records.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl SessionManifest {
    pub fn new(session_id: SessionId, script: &str, engine: &str, mode: &str) -> Self {
        Self {
            session_id,
            script: script.to_string(),
            engine: engine.to_string(),
            created: timestamp_now(),
            mode: mode.to_string(),
        }
    }
}
