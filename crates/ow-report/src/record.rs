//! Per-turbine report rows and the header schema they are read through.

use ow_core::Real;
use serde::Serialize;
use std::collections::HashMap;

/// Column titles as the engine writes them.
pub mod columns {
    pub const SITE: &str = "Site";
    pub const SITE_NAME: &str = "Site Name";
    pub const INDEX: &str = "Index";
    pub const X: &str = "X[m]";
    pub const Y: &str = "Y[m]";
    pub const GROSS: &str = "Gross [kWh]";
    pub const NET: &str = "Net [kWh]";
    pub const ARRAY_EFFICIENCY: &[&str] = &["Array Efficiency [%]", "Array Efficiency [%%]"];
    pub const FREE_SPEED: &str = "Free Speed [m/s]";
    pub const MEAN_SPEED: &str = "Mean Speed [m/s]";
    pub const TYPE: &str = "Type";
}

/// One turbine row. Every column is optional because the set of columns
/// depends on the output fields the script asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportRecord {
    pub site: Option<String>,
    pub index: Option<u32>,
    pub x: Option<Real>,
    pub y: Option<Real>,
    pub gross_kwh: Option<Real>,
    pub net_kwh: Option<Real>,
    pub array_efficiency_pct: Option<Real>,
    pub free_speed_ms: Option<Real>,
    pub mean_speed_ms: Option<Real>,
    pub turbine_type: Option<String>,
}

impl ReportRecord {
    /// Inactive turbines (disabled layouts) report no or non-positive gross.
    pub fn is_active(&self) -> bool {
        self.gross_kwh.is_some_and(|g| g > 0.0)
    }

    pub fn array_kwh(&self) -> Option<Real> {
        Some(0.01 * self.array_efficiency_pct? * self.gross_kwh?)
    }

    pub fn position(&self) -> Option<(Real, Real)> {
        Some((self.x?, self.y?))
    }
}

/// Column positions located by title.
#[derive(Debug, Clone, Default)]
pub(crate) struct Schema {
    pub site: Option<usize>,
    pub index: Option<usize>,
    pub x: Option<usize>,
    pub y: Option<usize>,
    pub gross: Option<usize>,
    pub net: Option<usize>,
    pub array_efficiency: Option<usize>,
    pub free_speed: Option<usize>,
    pub mean_speed: Option<usize>,
    pub turbine_type: Option<usize>,
}

impl Schema {
    pub fn from_columns(cols: &[String]) -> Self {
        let by_name: HashMap<&str, usize> = cols
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let find = |names: &[&str]| names.iter().find_map(|n| by_name.get(n).copied());
        Self {
            site: find(&[columns::SITE, columns::SITE_NAME]),
            index: find(&[columns::INDEX]),
            x: find(&[columns::X]),
            y: find(&[columns::Y]),
            gross: find(&[columns::GROSS]),
            net: find(&[columns::NET]),
            array_efficiency: find(columns::ARRAY_EFFICIENCY),
            free_speed: find(&[columns::FREE_SPEED]),
            mean_speed: find(&[columns::MEAN_SPEED]),
            turbine_type: find(&[columns::TYPE]),
        }
    }
}
