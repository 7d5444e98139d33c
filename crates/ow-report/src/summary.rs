//! Aggregate energy figures.

use ow_core::Real;
use serde::{Deserialize, Serialize};

/// Reports carry per-turbine kWh; aggregates are exposed in GWh.
pub const KWH_PER_GWH: Real = 1.0e6;

/// Plant-level energy totals over the active turbines of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AepSummary {
    /// Wake-free energy.
    pub gross_gwh: Real,
    /// Wake-affected energy; `None` when the report has no array efficiency.
    pub array_gwh: Option<Real>,
    pub net_gwh: Real,
    pub turbine_count: usize,
    pub active_count: usize,
}

impl AepSummary {
    /// Array energy over gross energy.
    pub fn array_efficiency(&self) -> Option<Real> {
        let array = self.array_gwh?;
        (self.gross_gwh > 0.0).then(|| array / self.gross_gwh)
    }

    pub fn array_losses(&self) -> Option<Real> {
        self.array_efficiency().map(|eff| 1.0 - eff)
    }

    pub fn with_losses(&self, losses: LossFactors) -> AdjustedAep {
        AdjustedAep {
            summary: *self,
            losses,
            net_gwh: self.net_gwh * losses.availability * (1.0 - losses.other_losses),
        }
    }
}

/// Plant losses applied after the engine's own net figure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossFactors {
    pub availability: Real,
    /// Soiling and other fractional losses.
    pub other_losses: Real,
}

impl Default for LossFactors {
    fn default() -> Self {
        Self {
            availability: 0.95,
            other_losses: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdjustedAep {
    pub summary: AepSummary,
    pub losses: LossFactors,
    pub net_gwh: Real,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn losses_scale_net_only() {
        let summary = AepSummary {
            gross_gwh: 10.0,
            array_gwh: Some(9.0),
            net_gwh: 8.0,
            turbine_count: 3,
            active_count: 3,
        };
        let adjusted = summary.with_losses(LossFactors {
            availability: 0.95,
            other_losses: 0.1,
        });
        assert!((adjusted.net_gwh - 8.0 * 0.95 * 0.9).abs() < 1e-12);
        assert_eq!(adjusted.summary.gross_gwh, 10.0);
        assert!((summary.array_efficiency().unwrap() - 0.9).abs() < 1e-12);
        assert!((summary.array_losses().unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn efficiency_needs_gross_energy() {
        let summary = AepSummary {
            array_gwh: Some(0.0),
            ..AepSummary::default()
        };
        assert_eq!(summary.array_efficiency(), None);
        assert_eq!(AepSummary::default().array_losses(), None);
    }
}
