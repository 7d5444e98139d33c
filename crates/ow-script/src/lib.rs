//! ow-script: the engine's XML control script.
//!
//! Build scripts from typed operations, write them for the engine, read them
//! back and classify how the engine has to be driven.

pub mod codec;
pub mod info;
pub mod schema;
pub mod validate;

use std::path::{Path, PathBuf};

pub use codec::{WriteOptions, decode_script, to_bytes};
pub use info::{
    DriveFlow, DrivePolicy, PositionReplacement, ScriptInfo, StartOnceBlocker, TurbineReplacement,
    classify, read_script_info, requires_optimize_flow,
};
pub use schema::*;
pub use validate::{ValidationError, validate_script};

pub type ScriptResult<T> = Result<T, ScriptError>;

#[derive(thiserror::Error, Debug)]
pub enum ScriptError {
    #[error("Script file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Malformed script XML in {}: {source}", path.display())]
    Xml {
        path: PathBuf,
        #[source]
        source: ow_core::CoreError,
    },

    #[error("Invalid script {}: {what}", path.display())]
    Structure { path: PathBuf, what: String },

    #[error("Unknown operation type '{type_name}' in {}", path.display())]
    UnknownOperation { path: PathBuf, type_name: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScriptError {
    /// File the error concerns, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ScriptError::NotFound { path }
            | ScriptError::Xml { path, .. }
            | ScriptError::Structure { path, .. }
            | ScriptError::UnknownOperation { path, .. }
            | ScriptError::Io { path, .. } => Some(path),
            ScriptError::Validation(_) => None,
        }
    }
}

pub fn load_script(path: &Path) -> ScriptResult<Script> {
    if !path.is_file() {
        return Err(ScriptError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_script(&content, path)
}

pub fn save_script(path: &Path, script: &Script, opts: WriteOptions) -> ScriptResult<()> {
    let bytes = to_bytes(script, opts)?;
    std::fs::write(path, bytes).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), operations = script.operations.len(), "wrote script");
    Ok(())
}
