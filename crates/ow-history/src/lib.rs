//! ow-history: per-session optimization log.
//!
//! A session is one coordinator run against one script; its id is a content
//! hash of the script and engine path so reruns land in the same directory.

pub mod hash;
pub mod store;
pub mod types;

use std::path::PathBuf;

pub use hash::compute_session_id;
pub use store::HistoryStore;
pub use types::*;

pub type HistoryResult<T> = Result<T, HistoryError>;

#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bad history record in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },
}
