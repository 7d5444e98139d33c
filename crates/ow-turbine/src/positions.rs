//! Plain-text position files.
//!
//! The engine reads one `x<TAB>y` pair per line. Files read back may use any
//! whitespace and may carry `#` comments.

use std::path::Path;

use ow_core::parse_real;

use crate::layout::Position;
use crate::{TurbineError, TurbineResult};

/// Format positions the way the engine expects them.
pub fn format_positions(positions: &[Position]) -> String {
    let mut out = String::with_capacity(positions.len() * 22);
    for p in positions {
        out.push_str(&format!("{:9.1}\t{:10.1}\n", p.x, p.y));
    }
    out
}

pub fn parse_positions(text: &str, origin: &Path) -> TurbineResult<Vec<Position>> {
    let mut positions = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let bad = || TurbineError::InvalidValue {
            path: origin.to_path_buf(),
            field: format!("line {}", lineno + 1),
            text: raw.to_string(),
        };
        if fields.len() < 2 {
            return Err(bad());
        }
        let x = parse_real(fields[0], "x").map_err(|_| bad())?;
        let y = parse_real(fields[1], "y").map_err(|_| bad())?;
        positions.push(Position::new(x, y));
    }
    Ok(positions)
}

pub fn read_positions(path: &Path) -> TurbineResult<Vec<Position>> {
    let text = std::fs::read_to_string(path).map_err(|source| TurbineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_positions(&text, path)
}
