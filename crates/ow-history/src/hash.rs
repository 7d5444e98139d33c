//! Content-based hashing for session ids.

use sha2::{Digest, Sha256};
use std::path::Path;

pub fn compute_session_id(script_bytes: &[u8], engine: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(script_bytes);
    // separator so (ab, c) and (a, bc) hash differently
    hasher.update([0u8]);
    hasher.update(engine.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    // 16 hex chars is plenty for a handful of local sessions
    format!("{:x}", digest)[..16].to_string()
}
