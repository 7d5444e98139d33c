//! Compact results file written by the engine after each interactive round.
//!
//! ```text
//! 2	turbines	NetEnergy=	45486517.62	currentNet	currentGross	bestNet
//! 22726427.09	24604810.14	22726427.09
//! 22760090.53	24633894.80	22760090.53
//! ```

use std::path::Path;

use ow_core::Real;
use serde::Serialize;

use crate::record::ReportRecord;
use crate::summary::{AepSummary, KWH_PER_GWH};
use crate::{ReportError, ReportResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractiveResults {
    pub turbine_count: usize,
    /// Plant net energy from the first line, in kWh.
    pub net_energy_kwh: Real,
    pub net_by_turbine: Vec<Real>,
    pub gross_by_turbine: Vec<Real>,
}

impl InteractiveResults {
    pub fn gross_energy_kwh(&self) -> Real {
        self.gross_by_turbine.iter().sum()
    }

    pub fn summary(&self) -> AepSummary {
        AepSummary {
            gross_gwh: self.gross_energy_kwh() / KWH_PER_GWH,
            array_gwh: None,
            net_gwh: self.net_energy_kwh / KWH_PER_GWH,
            turbine_count: self.turbine_count,
            active_count: self.gross_by_turbine.iter().filter(|g| **g > 0.0).count(),
        }
    }

    /// One record per turbine, indexed from 1.
    pub fn to_records(&self) -> Vec<ReportRecord> {
        self.net_by_turbine
            .iter()
            .zip(&self.gross_by_turbine)
            .enumerate()
            .map(|(i, (net, gross))| ReportRecord {
                index: u32::try_from(i + 1).ok(),
                gross_kwh: Some(*gross),
                net_kwh: Some(*net),
                ..ReportRecord::default()
            })
            .collect()
    }
}

pub fn read_results(path: &Path) -> ReportResult<InteractiveResults> {
    let text = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_results(&text, path)
}

/// False while the header announces more turbine lines than have been
/// written, which is how a results file looks mid-write. Text with a header
/// that cannot be read counts as complete so the parser can report it.
pub fn results_complete(text: &str) -> bool {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let announced = lines
        .next()
        .and_then(|first| first.split_whitespace().next())
        .and_then(|n| n.parse::<usize>().ok());
    match announced {
        Some(n) => lines.count() >= n,
        None => true,
    }
}

pub fn parse_results(text: &str, origin: &Path) -> ReportResult<InteractiveResults> {
    let malformed = |reason: String| ReportError::MalformedResults {
        path: origin.to_path_buf(),
        reason,
    };

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let first = lines
        .next()
        .ok_or_else(|| malformed("file is empty".to_string()))?;
    let head: Vec<&str> = first.split_whitespace().collect();
    if head.len() < 4 {
        return Err(malformed(format!("first line has {} fields: '{first}'", head.len())));
    }
    let turbine_count: usize = head[0]
        .parse()
        .map_err(|_| malformed(format!("turbine count '{}' is not an integer", head[0])))?;
    let net_energy_kwh: Real = head[3]
        .parse()
        .map_err(|_| malformed(format!("net energy '{}' is not a number", head[3])))?;

    let mut net_by_turbine = Vec::with_capacity(turbine_count);
    let mut gross_by_turbine = Vec::with_capacity(turbine_count);
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (Some(net), Some(gross)) = (fields.first(), fields.get(1)) else {
            return Err(malformed(format!("turbine line '{line}' needs net and gross")));
        };
        let parse = |s: &str| {
            s.parse::<Real>()
                .map_err(|_| malformed(format!("'{s}' is not a number in line '{line}'")))
        };
        net_by_turbine.push(parse(*net)?);
        gross_by_turbine.push(parse(*gross)?);
    }

    if net_by_turbine.len() != turbine_count {
        return Err(malformed(format!(
            "header announces {turbine_count} turbines but {} lines follow",
            net_by_turbine.len()
        )));
    }

    Ok(InteractiveResults {
        turbine_count,
        net_energy_kwh,
        net_by_turbine,
        gross_by_turbine,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_sample_parses() {
        let text = "2\tturbines\tNetEnergy=\t45486517.625150\tcurrentNet\tcurrentGross\tbestNet\n\
                    22726427.094659425000\t24604810.142472614000\t22726427.094659425000\n\
                    22760090.530491002000\t24633894.805187557000\t22760090.530491002000\n";
        let res = parse_results(text, Path::new("results.txt")).unwrap();
        assert_eq!(res.turbine_count, 2);
        assert!((res.net_energy_kwh - 45486517.62515).abs() < 1e-6);
        assert_eq!(res.to_records().len(), 2);
        assert_eq!(res.summary().active_count, 2);
    }

    #[test]
    fn count_mismatch_is_malformed() {
        let err = parse_results("3 turbines NetEnergy= 10\n1 2\n", Path::new("results.txt")).unwrap_err();
        assert!(matches!(err, ReportError::MalformedResults { .. }));
        assert!(err.to_string().contains("results.txt"));
    }

    #[test]
    fn empty_file_is_malformed() {
        assert!(parse_results("", Path::new("results.txt")).is_err());
        assert!(parse_results("x turbines NetEnergy= 1\n", Path::new("r")).is_err());
    }

    #[test]
    fn partial_table_is_not_complete() {
        assert!(!results_complete("2 turbines NetEnergy= 9\n4\t5\n"));
        assert!(results_complete("2 turbines NetEnergy= 9\n4\t5\n5\t6\n"));
        // unreadable headers are left for the parser to reject
        assert!(results_complete("x turbines NetEnergy= 1\n"));
    }
}
