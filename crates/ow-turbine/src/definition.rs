//! Turbine definitions and the shared catalog layouts point into.

use ow_core::{Real, TurbineTypeId, ensure_finite};
use serde::{Deserialize, Serialize};

use crate::{TurbineError, TurbineResult};

/// Sea-level standard air density the tables refer to unless stated otherwise.
pub const STANDARD_AIR_DENSITY: Real = 1.225;

/// Physical description of one turbine model.
///
/// The power, thrust and rpm tables are parallel to `velocities_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurbineDefinition {
    pub hub_height_m: Real,
    pub rotor_diameter_m: Real,
    pub rated_power_kw: Real,
    pub cut_in_ms: Real,
    pub cut_out_ms: Real,
    pub blade_count: u32,
    pub velocities_ms: Vec<Real>,
    pub power_kw: Vec<Real>,
    pub thrust_coefficient: Vec<Real>,
    pub rotor_rpm: Vec<Real>,
    #[serde(default = "default_density")]
    pub air_density_kg_m3: Real,
}

fn default_density() -> Real {
    STANDARD_AIR_DENSITY
}

impl TurbineDefinition {
    pub fn validate(&self) -> TurbineResult<()> {
        let scalars = [
            ("hub height", self.hub_height_m),
            ("rotor diameter", self.rotor_diameter_m),
            ("rated power", self.rated_power_kw),
            ("cut-in speed", self.cut_in_ms),
            ("cut-out speed", self.cut_out_ms),
            ("air density", self.air_density_kg_m3),
        ];
        for (what, v) in scalars {
            ensure_finite(v, what).map_err(|e| invalid(e.to_string()))?;
        }
        if self.hub_height_m <= 0.0 || self.rotor_diameter_m <= 0.0 {
            return Err(invalid("hub height and rotor diameter must be positive"));
        }
        if self.cut_in_ms >= self.cut_out_ms {
            return Err(invalid(format!(
                "cut-in speed {} must be below cut-out speed {}",
                self.cut_in_ms, self.cut_out_ms
            )));
        }

        let n = self.velocities_ms.len();
        if n == 0 {
            return Err(invalid("velocity axis is empty"));
        }
        for (table, values) in [
            ("power", &self.power_kw),
            ("thrust", &self.thrust_coefficient),
            ("rpm", &self.rotor_rpm),
        ] {
            if values.len() != n {
                return Err(invalid(format!(
                    "{table} table has {} rows, velocity axis has {n}",
                    values.len()
                )));
            }
        }
        let all = self
            .velocities_ms
            .iter()
            .chain(&self.power_kw)
            .chain(&self.thrust_coefficient)
            .chain(&self.rotor_rpm);
        for v in all.copied() {
            ensure_finite(v, "performance table").map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }

    pub fn table_len(&self) -> usize {
        self.velocities_ms.len()
    }

    /// Scale the rotor diameter, keeping everything else.
    pub fn with_rotor_diameter(mut self, diameter_m: Real) -> Self {
        self.rotor_diameter_m = diameter_m;
        self
    }
}

fn invalid(what: impl Into<String>) -> TurbineError {
    TurbineError::InvalidDefinition { what: what.into() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub definition: TurbineDefinition,
}

/// Owns turbine definitions; layouts refer to entries by id.
#[derive(Debug, Clone, Default)]
pub struct TurbineCatalog {
    entries: Vec<CatalogEntry>,
}

impl TurbineCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, definition: TurbineDefinition) -> TurbineTypeId {
        let id = TurbineTypeId::from_index(self.entries.len() as u32);
        self.entries.push(CatalogEntry {
            name: name.into(),
            definition,
        });
        id
    }

    pub fn get(&self, id: TurbineTypeId) -> Option<&CatalogEntry> {
        self.entries.get(id.index() as usize)
    }

    pub fn require(&self, id: TurbineTypeId) -> TurbineResult<&CatalogEntry> {
        self.get(id)
            .ok_or(TurbineError::UnknownTurbineType { id: id.index() })
    }

    pub fn find(&self, name: &str) -> Option<TurbineTypeId> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|i| TurbineTypeId::from_index(i as u32))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn sample_definition() -> TurbineDefinition {
    let velocities_ms: Vec<Real> = (0..26).map(Real::from).collect();
    let power_kw = velocities_ms
        .iter()
        .map(|v| if *v < 3.0 { 0.0 } else { (v * v * 25.0).min(3000.0) })
        .collect();
    let thrust_coefficient = velocities_ms
        .iter()
        .map(|v| if *v < 3.0 { 0.0 } else { 0.88 / (1.0 + 0.02 * v * v) })
        .collect();
    let rotor_rpm = velocities_ms.iter().map(|v| (v * 1.2).min(12.1)).collect();
    TurbineDefinition {
        hub_height_m: 100.0,
        rotor_diameter_m: 126.0,
        rated_power_kw: 3000.0,
        cut_in_ms: 3.0,
        cut_out_ms: 25.0,
        blade_count: 3,
        velocities_ms,
        power_kw,
        thrust_coefficient,
        rotor_rpm,
        air_density_kg_m3: STANDARD_AIR_DENSITY,
    }
}
