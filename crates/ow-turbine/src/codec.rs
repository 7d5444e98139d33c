//! OWTG turbine file codec.
//!
//! Layout of a table block (`Power_Table0`, `Thrust_Table`, `RPM_Table`):
//!
//! ```text
//! <Thrust_Table>
//!   <Type>TurbineTable</Type>
//!   <TI_min value="0"/> <TI_max value="60"/>
//!   <Velocities> <Count value="N"/> <Velocity0 value=".."/> ... </Velocities>
//!   <AirDensities> <Count value="1"/> <Rho0 value="1.225"/> </AirDensities>
//!   <Values> <Columns value="1"/>
//!     <Rho1.225000> <Rows value="N"/> <v0-0 value=".."/> ... </Rho1.225000>
//!   </Values>
//! </Thrust_Table>
//! ```

use std::path::Path;

use ow_core::{Element, Real, XmlDocument, format_real, parse_real};

use crate::definition::{STANDARD_AIR_DENSITY, TurbineDefinition};
use crate::{TurbineError, TurbineResult};

const POWER_TABLES: &str = "Power_Tables";
const POWER_TABLE: &str = "Power_Table0";
const THRUST_TABLE: &str = "Thrust_Table";
const RPM_TABLE: &str = "RPM_Table";

const NOISE_BANDS_HZ: [u32; 8] = [63, 125, 250, 500, 1000, 2000, 4000, 8000];

/// A decoded OWTG file.
#[derive(Debug, Clone, PartialEq)]
pub struct OwtgFile {
    /// Root element name; the engine's short turbine name.
    pub name: String,
    /// Free-form `<Name>` text.
    pub description: String,
    pub definition: TurbineDefinition,
}

/// A maintenance cost item written under `PeriodicCosts`.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicCost {
    pub component: String,
    pub cost: u64,
    pub period_years: u32,
}

/// Values the engine needs but the coupling layer does not model.
#[derive(Debug, Clone, PartialEq)]
pub struct OwtgExtras {
    pub total_cost: u64,
    pub foundation_cost: u64,
    pub periodic_costs: Vec<PeriodicCost>,
    pub comments: String,
}

impl Default for OwtgExtras {
    fn default() -> Self {
        Self {
            total_cost: 2_000_000,
            foundation_cost: 100_000,
            periodic_costs: Vec::new(),
            comments: "This is not a warrantied power curve.".to_string(),
        }
    }
}

pub fn decode(path: &Path) -> TurbineResult<TurbineDefinition> {
    Ok(read_owtg(path)?.definition)
}

pub fn read_owtg(path: &Path) -> TurbineResult<OwtgFile> {
    let text = std::fs::read_to_string(path).map_err(|source| TurbineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_str(&text, path)
}

/// Decode OWTG text; `origin` is only used in error messages.
pub fn decode_str(text: &str, origin: &Path) -> TurbineResult<OwtgFile> {
    let doc = XmlDocument::parse(text).map_err(|source| TurbineError::Xml {
        path: origin.to_path_buf(),
        source,
    })?;
    let root = &doc.root;
    let ctx = Ctx { origin };

    let power_block = root.child(POWER_TABLES).ok_or_else(|| ctx.missing(POWER_TABLES))?;
    if let Some(count) = power_block.child_value("Count") {
        if count.trim() != "1" {
            tracing::warn!(
                path = %origin.display(),
                count = count.trim(),
                "multiple power tables; only {POWER_TABLE} is used"
            );
        }
    }
    let power_el = power_block
        .child(POWER_TABLE)
        .ok_or_else(|| ctx.missing(POWER_TABLE))?;
    let power = ctx.table(power_el)?;
    let thrust = ctx.table(root.child(THRUST_TABLE).ok_or_else(|| ctx.missing(THRUST_TABLE))?)?;
    let rpm = ctx.table(root.child(RPM_TABLE).ok_or_else(|| ctx.missing(RPM_TABLE))?)?;

    for (name, other) in [(THRUST_TABLE, &thrust), (RPM_TABLE, &rpm)] {
        if other.velocities != power.velocities {
            return Err(TurbineError::VelocityAxisMismatch {
                path: origin.to_path_buf(),
                table: name.to_string(),
            });
        }
    }

    let definition = TurbineDefinition {
        hub_height_m: ctx.scalar(root, "HubHeight")?,
        rotor_diameter_m: ctx.scalar(root, "RotorDiameter")?,
        rated_power_kw: ctx.scalar(root, "CapacityKW")?,
        cut_in_ms: ctx.scalar(root, "LowCutIn")?,
        cut_out_ms: ctx.scalar(root, "HighCutOut")?,
        blade_count: ctx.count(root, "NumBlades")?,
        velocities_ms: power.velocities,
        power_kw: power.values,
        thrust_coefficient: thrust.values,
        rotor_rpm: rpm.values,
        air_density_kg_m3: power.density,
    };

    Ok(OwtgFile {
        name: root.name.clone(),
        description: root
            .child("Name")
            .and_then(|n| n.text.clone())
            .unwrap_or_default(),
        definition,
    })
}

struct Table {
    velocities: Vec<Real>,
    values: Vec<Real>,
    density: Real,
}

struct Ctx<'a> {
    origin: &'a Path,
}

impl Ctx<'_> {
    fn missing(&self, field: &str) -> TurbineError {
        TurbineError::MissingField {
            path: self.origin.to_path_buf(),
            field: field.to_string(),
        }
    }

    fn shape(&self, table: &str, what: String) -> TurbineError {
        TurbineError::TableShape {
            path: self.origin.to_path_buf(),
            table: table.to_string(),
            what,
        }
    }

    fn number(&self, field: &str, text: &str) -> TurbineResult<Real> {
        parse_real(text, field).map_err(|_| TurbineError::InvalidValue {
            path: self.origin.to_path_buf(),
            field: field.to_string(),
            text: text.to_string(),
        })
    }

    fn scalar(&self, parent: &Element, field: &str) -> TurbineResult<Real> {
        let text = parent.child_value(field).ok_or_else(|| self.missing(field))?;
        self.number(field, text)
    }

    fn count(&self, parent: &Element, field: &str) -> TurbineResult<u32> {
        let v = self.scalar(parent, field)?;
        if v < 0.0 || v.fract() != 0.0 || v > Real::from(u32::MAX) {
            return Err(TurbineError::InvalidValue {
                path: self.origin.to_path_buf(),
                field: field.to_string(),
                text: format_real(v),
            });
        }
        Ok(v as u32)
    }

    /// Values of `prefix0..prefixN` children, checked against the `Count`-like
    /// child named `count_field`.
    fn indexed(&self, block: &Element, table: &str, count_field: &str, prefix: &str) -> TurbineResult<Vec<Real>> {
        let declared = self.count(block, count_field)? as usize;
        let mut values = Vec::with_capacity(declared);
        for child in &block.children {
            if child.name == count_field {
                continue;
            }
            let Some(suffix) = child.name.strip_prefix(prefix) else {
                continue;
            };
            if suffix.parse::<usize>().map_or(true, |i| i != values.len()) {
                return Err(self.shape(table, format!("unexpected element <{}>", child.name)));
            }
            let text = child.value().ok_or_else(|| self.missing(&child.name))?;
            values.push(self.number(&child.name, text)?);
        }
        if values.len() != declared {
            return Err(self.shape(
                table,
                format!("{count_field} says {declared} but {} rows found", values.len()),
            ));
        }
        Ok(values)
    }

    fn table(&self, el: &Element) -> TurbineResult<Table> {
        let table = el.name.as_str();
        let velocities_el = el.child("Velocities").ok_or_else(|| self.missing("Velocities"))?;
        let velocities = self.indexed(velocities_el, table, "Count", "Velocity")?;

        let values_el = el.child("Values").ok_or_else(|| self.missing("Values"))?;
        let columns: Vec<&Element> = values_el
            .children
            .iter()
            .filter(|c| c.name.starts_with("Rho"))
            .collect();
        let first = columns
            .first()
            .ok_or_else(|| self.shape(table, "no air-density column under <Values>".to_string()))?;
        if columns.len() > 1 {
            tracing::warn!(
                path = %self.origin.display(),
                table,
                columns = columns.len(),
                "only one air-density column is supported; using the first for all densities"
            );
        }
        let values = self.indexed(first, table, "Rows", "v0-")?;
        if values.len() != velocities.len() {
            return Err(self.shape(
                table,
                format!(
                    "{} values for {} velocities",
                    values.len(),
                    velocities.len()
                ),
            ));
        }

        let density = match el.child("AirDensities").and_then(|d| d.child_value("Rho0")) {
            Some(text) => self.number("Rho0", text)?,
            None => first.name[3..].parse().unwrap_or(STANDARD_AIR_DENSITY),
        };

        Ok(Table {
            velocities,
            values,
            density,
        })
    }
}

/// Encode with default extras.
pub fn encode(def: &TurbineDefinition, name: &str, description: &str) -> TurbineResult<Vec<u8>> {
    encode_with(def, name, description, &OwtgExtras::default())
}

pub fn encode_with(
    def: &TurbineDefinition,
    name: &str,
    description: &str,
    extras: &OwtgExtras,
) -> TurbineResult<Vec<u8>> {
    def.validate()?;
    if !is_xml_name(name) {
        return Err(TurbineError::InvalidName {
            name: name.to_string(),
        });
    }

    let mut root = Element::new(name);
    root.push(Element::with_text("Name", description));
    root.push_value("HubHeight", format_real(def.hub_height_m));
    root.push_value("RotorDiameter", format_real(def.rotor_diameter_m));
    root.push_value("VoltageV", "690");
    root.push_value("CapacityKW", format_real(def.rated_power_kw));
    root.push_value("IsPitchControlled", "1");
    root.push_value("LowCutIn", format_real(def.cut_in_ms));
    root.push_value("HighCutOut", format_real(def.cut_out_ms));
    root.push_value("IEC_adjustment", "0");
    root.push_value("NumBlades", def.blade_count.to_string());
    root.push_value("LowTemperatureShutDown", "-30");
    root.push_value("HighTemperatureShutDown", "45");
    root.push_value("LowTemperatureUnits", "0");
    root.push_value("HighTemperatureUnits", "0");
    root.push_value("LowTemperatureRestart", "-20");
    root.push_value("HighTemperatureRestart", "30");
    root.push_value("IsVariableSpeed", "1");
    root.push_value("TiltAngleDegrees", "5");
    root.push_value("PeakOutputKW", format_real(def.rated_power_kw));
    root.push_value("SpeedClass", "1");
    root.push_value("TiClass", "1");
    root.push_value("SpeedMax", "10");
    root.push_value("TiMax", "14");
    root.push(Element::with_text("Comments", extras.comments.as_str()));

    let mut power_tables = Element::new(POWER_TABLES);
    power_tables.push_value("Count", "1");
    power_tables.push(table_element(POWER_TABLE, def, &def.power_kw));
    root.push(power_tables);
    root.push(table_element(THRUST_TABLE, def, &def.thrust_coefficient));
    root.push(table_element(RPM_TABLE, def, &def.rotor_rpm));

    root.push_value("TotalCost", extras.total_cost.to_string());
    root.push_value("FoundationCost", extras.foundation_cost.to_string());
    if !extras.periodic_costs.is_empty() {
        let mut costs = Element::new("PeriodicCosts");
        costs.push_value("Count", extras.periodic_costs.len().to_string());
        for (i, cost) in extras.periodic_costs.iter().enumerate() {
            costs.push(periodic_cost_element(i, cost));
        }
        root.push(costs);
    }

    root.push_value("TotalNoise", "100");
    for hz in NOISE_BANDS_HZ {
        root.push_value(&format!("Noise{hz}hz"), "0");
    }

    let xml = XmlDocument::new(root)
        .to_xml_string()
        .map_err(|source| TurbineError::Xml {
            path: format!("<{name}>").into(),
            source,
        })?;
    Ok(xml.into_bytes())
}

fn table_element(name: &str, def: &TurbineDefinition, values: &[Real]) -> Element {
    let mut table = Element::new(name);
    table.push(Element::with_text("Type", "TurbineTable"));
    table.push_value("TI_min", "0");
    table.push_value("TI_max", "60");

    let mut velocities = Element::new("Velocities");
    velocities.push_value("Count", def.velocities_ms.len().to_string());
    for (i, v) in def.velocities_ms.iter().enumerate() {
        velocities.push_value(&format!("Velocity{i}"), format_real(*v));
    }
    table.push(velocities);

    let mut densities = Element::new("AirDensities");
    densities.push_value("Count", "1");
    densities.push_value("Rho0", format_real(def.air_density_kg_m3));
    table.push(densities);

    let mut column = Element::new(format!("Rho{:.6}", def.air_density_kg_m3));
    column.push_value("Rows", values.len().to_string());
    for (i, v) in values.iter().enumerate() {
        column.push_value(&format!("v0-{i}"), format_real(*v));
    }
    let mut values_el = Element::new("Values");
    values_el.push_value("Columns", "1");
    values_el.push(column);
    table.push(values_el);
    table
}

fn periodic_cost_element(index: usize, cost: &PeriodicCost) -> Element {
    let mut el = Element::new(format!("PeriodicCost{index}"));
    el.push(Element::with_text("Type", "PeriodicCost"));
    el.push(Element::with_text("Component", cost.component.as_str()));
    el.push_value("Cost", cost.cost.to_string());
    el.push_value("PeriodYears", cost.period_years.to_string());
    for (field, value) in [
        ("CostVariable", "0"),
        ("PeriodVariable", "0"),
        ("IsVariablePeriod", "0"),
        ("IsVariableCost", "0"),
        ("CostExponent", "1"),
        ("PeriodExponent", "1"),
        ("CostFactor", "1"),
        ("PeriodFactor", "1"),
    ] {
        el.push_value(field, value);
    }
    el
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.to_ascii_lowercase().starts_with("xml")
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Rewrite the rotor diameter of an existing OWTG file, leaving the rest of
/// the document as it was.
pub fn set_rotor_diameter(src: &Path, dst: &Path, diameter_m: Real) -> TurbineResult<()> {
    let text = std::fs::read_to_string(src).map_err(|source| TurbineError::Io {
        path: src.to_path_buf(),
        source,
    })?;
    let xml_err = |source| TurbineError::Xml {
        path: src.to_path_buf(),
        source,
    };
    let mut doc = XmlDocument::parse(&text).map_err(xml_err)?;
    let el = doc
        .root
        .child_mut("RotorDiameter")
        .ok_or_else(|| TurbineError::MissingField {
            path: src.to_path_buf(),
            field: "RotorDiameter".to_string(),
        })?;
    el.set_attr("value", format!("{diameter_m:.2}"));
    if doc.doctype.is_none() {
        doc.doctype = Some(doc.root.name.clone());
    }
    let out = doc.to_xml_string().map_err(xml_err)?;
    std::fs::write(dst, out).map_err(|source| TurbineError::Io {
        path: dst.to_path_buf(),
        source,
    })?;
    tracing::info!(src = %src.display(), dst = %dst.display(), diameter_m, "rewrote rotor diameter");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::sample_definition;

    fn encoded() -> String {
        String::from_utf8(encode(&sample_definition(), "OWTestTurb", "Test turbine").unwrap()).unwrap()
    }

    #[test]
    fn encode_nests_power_table() {
        let xml = encoded();
        assert!(xml.contains("<!DOCTYPE OWTestTurb>"));
        assert!(xml.contains("<Name>Test turbine</Name>"));
        assert!(xml.contains("<Power_Tables>"));
        assert!(xml.contains("<Power_Table0>"));
        assert!(xml.contains("<Type>TurbineTable</Type>"));
        assert!(xml.contains("<Rho1.225000>"));
        assert!(xml.contains("<v0-25 value="));
        assert!(xml.contains("<Noise8000hz value=\"0\"/>"));
        assert!(!xml.contains("PeriodicCosts"));
    }

    #[test]
    fn decode_reads_back_scalars_and_name() {
        let file = decode_str(&encoded(), Path::new("t.owtg")).unwrap();
        assert_eq!(file.name, "OWTestTurb");
        assert_eq!(file.description, "Test turbine");
        assert_eq!(file.definition, sample_definition());
    }

    #[test]
    fn rejects_invalid_element_name() {
        let err = encode(&sample_definition(), "3 MW turbine", "x").unwrap_err();
        assert!(matches!(err, TurbineError::InvalidName { .. }));
    }

    #[test]
    fn multiple_density_columns_use_first() {
        let xml = encoded().replace(
            "</Rho1.225000>",
            "</Rho1.225000><Rho1.100000><Rows value=\"1\"/><v1-0 value=\"9\"/></Rho1.100000>",
        );
        let file = decode_str(&xml, Path::new("t.owtg")).unwrap();
        assert_eq!(file.definition.power_kw, sample_definition().power_kw);
    }

    #[test]
    fn mismatched_velocity_axis_is_error() {
        let xml = encoded();
        // Shift the last thrust velocity only.
        let thrust_start = xml.find("<Thrust_Table>").unwrap();
        let (head, tail) = xml.split_at(thrust_start);
        let tail = tail.replacen("<Velocity25 value=\"25\"/>", "<Velocity25 value=\"26\"/>", 1);
        let err = decode_str(&format!("{head}{tail}"), Path::new("t.owtg")).unwrap_err();
        assert!(matches!(err, TurbineError::VelocityAxisMismatch { .. }));
    }

    #[test]
    fn row_count_mismatch_is_error() {
        let xml = encoded().replacen("<Rows value=\"26\"/>", "<Rows value=\"27\"/>", 1);
        let err = decode_str(&xml, Path::new("t.owtg")).unwrap_err();
        assert!(err.to_string().contains("Power_Table0"));
    }

    #[test]
    fn periodic_costs_are_written_when_present() {
        let extras = OwtgExtras {
            periodic_costs: vec![PeriodicCost {
                component: "Blades".into(),
                cost: 200_000,
                period_years: 15,
            }],
            ..OwtgExtras::default()
        };
        let xml = String::from_utf8(encode_with(&sample_definition(), "T", "d", &extras).unwrap()).unwrap();
        assert!(xml.contains("<PeriodicCost0>"));
        assert!(xml.contains("<PeriodYears value=\"15\"/>"));
    }
}
