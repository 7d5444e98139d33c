//! Script XML encoding and decoding.
//!
//! All engine element names live in this module; the rest of the crate works
//! with [`Script`] and [`Operation`] values only.

use std::path::Path;

use ow_core::{Element, XmlDocument};

use crate::schema::*;
use crate::{ScriptError, ScriptResult};

pub const ROOT_ELEMENT: &str = "OpenWindScript";

/// Site-properties turbine type meaning "leave unchanged".
const NO_TURBINE_TYPE: &str = "<none>";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Widen single-space continuation indents to three spaces. Some engine
    /// builds misread the narrower indentation.
    pub widen_indent: bool,
    /// Prepend a comment recording when the file was written.
    pub stamp: bool,
}

impl WriteOptions {
    /// Settings for files handed to the real engine.
    pub fn engine() -> Self {
        Self {
            widen_indent: true,
            stamp: true,
        }
    }
}

pub fn to_document(script: &Script, opts: WriteOptions) -> XmlDocument {
    let mut root = Element::new(ROOT_ELEMENT);
    if opts.stamp {
        root.comment = Some(format!(
            " Written by ow-script on {} ",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
    }
    root.push_value("ReportPath", script.report_path.as_str());
    root.push_value("AppendOperations", script.append_operations.as_str());
    for (name, on) in script.fields.flags() {
        root.push_value(name, bool_str(on));
    }

    let mut all = Element::new("AllOperations");
    for op in &script.operations {
        all.push(encode_operation(op));
    }
    root.push(all);
    XmlDocument::new(root)
}

/// Serialize to bytes ready to write.
pub fn to_bytes(script: &Script, opts: WriteOptions) -> ScriptResult<Vec<u8>> {
    let xml = to_document(script, opts)
        .to_xml_string()
        .map_err(|source| ScriptError::Xml {
            path: "<memory>".into(),
            source,
        })?;
    let xml = if opts.widen_indent {
        xml.replace("\n ", "\n   ")
    } else {
        xml
    };
    Ok(xml.into_bytes())
}

fn encode_operation(op: &Operation) -> Element {
    let mut el = Element::new("Operation");
    el.push_value("Type", op.kind().type_name());
    match op {
        Operation::ChangeWorkbook { path } => {
            el.push_value("Path", path.as_str());
        }
        Operation::ReplaceTurbineType { name, path } => {
            el.push_value("TurbineName", name.as_str());
            el.push_value("TurbinePath", path.as_str());
        }
        Operation::ReplaceTurbinePositions { site_name, path } => {
            el.push_value("SiteName", site_name.as_str());
            el.push_value("TurbinePosPath", path.as_str());
        }
        Operation::EnergyCapture(ec) => {
            el.push_value("WakeModel", ec.wake_model.as_str());
            el.push_value("Umin", one_decimal(ec.speed_range.min_ms));
            el.push_value("Umax", one_decimal(ec.speed_range.max_ms));
            el.push_value("Ustep", one_decimal(ec.speed_range.step_ms));
            el.push_value("TotalDirections", one_decimal(ec.direction_range.total));
            el.push_value("FirstDirection", one_decimal(ec.direction_range.first));
            el.push_value("LastDirection", one_decimal(ec.direction_range.last));
            el.push_value("DirectionOffset", one_decimal(ec.direction_offset));
            el.push_value("Pxx", one_decimal(ec.pxx));
        }
        Operation::Optimize { iterations } => {
            if let Some(n) = iterations {
                el.push_value("Iterations", n.to_string());
            }
        }
        Operation::SiteProperties { site_name, enabled } => {
            let flag = if *enabled { "1" } else { "0" };
            el.push_value("SiteName", site_name.as_str());
            el.push_value("Enable", flag);
            el.push_value("Fixed", "1");
            el.push_value("Grow", "0");
            el.push_value("IncludeInOptimiser", flag);
            el.push_value("SetTurbineType", "0");
            el.push_value("TurbineType", NO_TURBINE_TYPE);
        }
        Operation::OptimizeCostOfEnergy | Operation::Exit => {}
    }
    el
}

fn one_decimal(v: f64) -> String {
    format!("{v:.1}")
}

fn bool_str(v: bool) -> &'static str {
    if v { "true" } else { "false" }
}

/// Decode script text. `origin` is only used in error messages.
pub fn decode_script(text: &str, origin: &Path) -> ScriptResult<Script> {
    let doc = XmlDocument::parse(text).map_err(|source| ScriptError::Xml {
        path: origin.to_path_buf(),
        source,
    })?;
    from_document(&doc, origin)
}

pub fn from_document(doc: &XmlDocument, origin: &Path) -> ScriptResult<Script> {
    let root = &doc.root;
    if root.name != ROOT_ELEMENT {
        tracing::warn!(path = %origin.display(), root = %root.name, "unexpected script root element");
    }

    let report_path = root
        .child_value("ReportPath")
        .ok_or_else(|| structure(origin, "missing <ReportPath value=...>"))?;
    let mut script = Script::new(report_path);
    if let Some(append) = root.child_value("AppendOperations") {
        script.append_operations = append.to_string();
    }
    for child in &root.children {
        if let Some(v) = child.value() {
            if let Some(on) = parse_bool(v) {
                script.fields.set_flag(&child.name, on);
            }
        }
    }

    if let Some(all) = root.child("AllOperations") {
        for (index, op_el) in all.children_named("Operation").enumerate() {
            script.operations.push(decode_operation(op_el, index, origin)?);
        }
    }
    Ok(script)
}

fn decode_operation(el: &Element, index: usize, origin: &Path) -> ScriptResult<Operation> {
    let type_name = el
        .child_value("Type")
        .ok_or_else(|| structure(origin, format!("operation {} has no <Type>", index + 1)))?;
    let kind = OperationKind::from_type_name(type_name).ok_or_else(|| ScriptError::UnknownOperation {
        path: origin.to_path_buf(),
        type_name: type_name.to_string(),
    })?;
    if type_name.trim() == "Optimize" {
        tracing::warn!(
            path = %origin.display(),
            "operation {} uses 'Optimize'; the engine expects 'Optimise'",
            index + 1
        );
    }

    let need = |name: &str| -> ScriptResult<String> {
        el.child_value(name).map(str::to_string).ok_or_else(|| {
            structure(
                origin,
                format!("'{}' operation {} is missing <{}>", type_name, index + 1, name),
            )
        })
    };

    let op = match kind {
        OperationKind::ChangeWorkbook => Operation::ChangeWorkbook { path: need("Path")? },
        OperationKind::ReplaceTurbineType => Operation::ReplaceTurbineType {
            name: need("TurbineName")?,
            path: need("TurbinePath")?,
        },
        OperationKind::ReplaceTurbinePositions => Operation::ReplaceTurbinePositions {
            site_name: need("SiteName")?,
            path: need("TurbinePosPath")?,
        },
        OperationKind::EnergyCapture => {
            let mut ec = EnergyCapture::default();
            if let Some(wm) = el.child_value("WakeModel") {
                ec.wake_model = wm.to_string();
            }
            let num = |name: &str, fallback: f64| -> ScriptResult<f64> {
                match el.child_value(name) {
                    Some(text) => ow_core::parse_real(text, name)
                        .map_err(|e| structure(origin, e.to_string())),
                    None => Ok(fallback),
                }
            };
            ec.speed_range = SpeedRange {
                min_ms: num("Umin", ec.speed_range.min_ms)?,
                max_ms: num("Umax", ec.speed_range.max_ms)?,
                step_ms: num("Ustep", ec.speed_range.step_ms)?,
            };
            ec.direction_range = DirectionRange {
                total: num("TotalDirections", ec.direction_range.total)?,
                first: num("FirstDirection", ec.direction_range.first)?,
                last: num("LastDirection", ec.direction_range.last)?,
            };
            ec.direction_offset = num("DirectionOffset", ec.direction_offset)?;
            ec.pxx = num("Pxx", ec.pxx)?;
            Operation::EnergyCapture(ec)
        }
        OperationKind::Optimize => {
            let iterations = match el.child_value("Iterations") {
                Some(text) => Some(text.trim().parse::<u32>().map_err(|_| {
                    structure(origin, format!("invalid Iterations value '{text}'"))
                })?),
                None => None,
            };
            Operation::Optimize { iterations }
        }
        OperationKind::OptimizeCostOfEnergy => Operation::OptimizeCostOfEnergy,
        OperationKind::SiteProperties => Operation::SiteProperties {
            site_name: need("SiteName")?,
            enabled: el
                .child_value("Enable")
                .and_then(parse_bool)
                .unwrap_or(true),
        },
        OperationKind::Exit => Operation::Exit,
    };
    Ok(op)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn structure(origin: &Path, what: impl Into<String>) -> ScriptError {
    ScriptError::Structure {
        path: origin.to_path_buf(),
        what: what.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(script: &Script, opts: WriteOptions) -> String {
        String::from_utf8(to_bytes(script, opts).unwrap()).unwrap()
    }

    #[test]
    fn header_has_declaration_and_doctype() {
        let xml = text(&Script::new("C:/out/report.txt"), WriteOptions::default());
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<!DOCTYPE OpenWindScript>"));
        assert!(xml.contains("<ReportPath value=\"C:/out/report.txt\"/>"));
        assert!(xml.contains("<AppendOperations value=\"After\"/>"));
        assert!(xml.contains("<TurbineXField value=\"false\"/>"));
        assert!(xml.contains("<TI15 value=\"true\"/>"));
    }

    #[test]
    fn energy_capture_parameters_use_one_decimal() {
        let mut script = Script::new("r.txt");
        script.add_operation(Operation::EnergyCapture(EnergyCapture::default()));
        let xml = text(&script, WriteOptions::default());
        assert!(xml.contains("<Type value=\"Energy Capture\"/>"));
        assert!(xml.contains("<Umax value=\"70.0\"/>"));
        assert!(xml.contains("<TotalDirections value=\"72.0\"/>"));
        assert!(xml.contains("<Pxx value=\"50.0\"/>"));
    }

    #[test]
    fn optimize_is_written_with_engine_spelling() {
        let mut script = Script::new("r.txt");
        script.add_operation(Operation::Optimize {
            iterations: Some(40),
        });
        let xml = text(&script, WriteOptions::default());
        assert!(xml.contains("<Type value=\"Optimise\"/>"));
        assert!(xml.contains("<Iterations value=\"40\"/>"));
    }

    #[test]
    fn widened_indent_still_parses() {
        let mut script = Script::new("r.txt");
        script.add_operation(Operation::Exit);
        let xml = text(&script, WriteOptions::engine());
        assert!(xml.contains("\n    <ReportPath"));
        assert!(xml.contains("<!-- Written by ow-script on "));
        let back = decode_script(&xml, Path::new("s.xml")).unwrap();
        assert_eq!(back, script);
    }

    #[test]
    fn site_properties_roundtrip_disabled() {
        let mut script = Script::new("r.txt");
        script.add_operation(Operation::SiteProperties {
            site_name: "North".into(),
            enabled: false,
        });
        let xml = text(&script, WriteOptions::default());
        assert!(xml.contains("<IncludeInOptimiser value=\"0\"/>"));
        assert!(xml.contains("<TurbineType value=\"&lt;none&gt;\"/>"));
        let back = decode_script(&xml, Path::new("s.xml")).unwrap();
        assert_eq!(back.operations, script.operations);
    }

    #[test]
    fn unknown_operation_type_is_reported() {
        let xml = r#"<OpenWindScript><ReportPath value="r.txt"/><AllOperations>
            <Operation><Type value="Teleport"/></Operation></AllOperations></OpenWindScript>"#;
        let err = decode_script(xml, Path::new("bad.xml")).unwrap_err();
        assert!(matches!(err, ScriptError::UnknownOperation { .. }));
        assert!(err.to_string().contains("bad.xml"));
    }

    #[test]
    fn american_spelling_is_accepted() {
        let xml = r#"<OpenWindScript><ReportPath value="r.txt"/><AllOperations>
            <Operation><Type value="Optimize"/><Iterations value="5"/></Operation>
            </AllOperations></OpenWindScript>"#;
        let script = decode_script(xml, Path::new("s.xml")).unwrap();
        assert_eq!(
            script.operations,
            vec![Operation::Optimize {
                iterations: Some(5)
            }]
        );
    }

    #[test]
    fn missing_report_path_is_structure_error() {
        let err = decode_script("<OpenWindScript/>", Path::new("s.xml")).unwrap_err();
        assert!(matches!(err, ScriptError::Structure { .. }));
    }
}
