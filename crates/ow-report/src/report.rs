//! Full energy-capture report (run-to-completion output).
//!
//! Lines are consumed by a small state machine: seek the header row, read
//! turbine rows until a blank or short line, then ignore the rest. Engine
//! failure lines and four-tab parameter lines are recognized in every state.

use std::collections::BTreeMap;
use std::path::Path;

use ow_core::Real;
use serde::Serialize;

use crate::record::{ReportRecord, Schema, columns};
use crate::summary::{AepSummary, KWH_PER_GWH};
use crate::{ReportError, ReportResult};

const PARAMETER_PREFIX: &str = "\t\t\t\t";

/// Known engine failure messages.
pub fn is_engine_failure_line(line: &str) -> bool {
    line.starts_with("Failed to find and replace turbine type")
        || line.contains("not have access to an appropriate WRG")
}

/// Turbine replacement failures get extra context from the caller.
pub fn is_turbine_replacement_failure(line: &str) -> bool {
    line.starts_with("Failed to find and replace turbine type")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(Real),
    Text(String),
}

impl ParamValue {
    fn parse(text: &str) -> Self {
        match text.trim().parse::<Real>() {
            Ok(v) => ParamValue::Number(v),
            Err(_) => ParamValue::Text(text.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyReport {
    /// Free-form `key=value` lines; not used by the aggregation.
    pub parameters: BTreeMap<String, ParamValue>,
    pub columns: Vec<String>,
    /// Every turbine row, active or not.
    pub records: Vec<ReportRecord>,
    pub summary: AepSummary,
    /// Lines matching known engine failure messages.
    pub engine_errors: Vec<String>,
    /// Recoverable per-row problems.
    pub warnings: Vec<String>,
}

impl EnergyReport {
    pub fn engine_error_count(&self) -> usize {
        self.engine_errors.len()
    }

    pub fn active_records(&self) -> impl Iterator<Item = &ReportRecord> {
        self.records.iter().filter(|r| r.is_active())
    }

    /// Positions of all rows that carry both coordinates.
    pub fn positions(&self) -> Vec<(Real, Real)> {
        self.records.iter().filter_map(ReportRecord::position).collect()
    }
}

enum State {
    SeekingHeader,
    Records(Header),
    Done,
}

struct Header {
    columns: Vec<String>,
    schema: Schema,
}

#[derive(Default)]
struct Totals {
    gross_kwh: Real,
    net_kwh: Real,
    array_kwh: Real,
}

pub fn read_report(path: &Path) -> ReportResult<EnergyReport> {
    let text = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_report(&text, path)
}

/// Parse report text; `origin` names the file in errors and warnings.
pub fn parse_report(text: &str, origin: &Path) -> ReportResult<EnergyReport> {
    let mut state = State::SeekingHeader;
    let mut parameters = BTreeMap::new();
    let mut engine_errors = Vec::new();
    let mut warnings = Vec::new();
    let mut records = Vec::new();
    let mut columns_out = Vec::new();
    let mut totals = Totals::default();
    let mut has_array_column = false;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim_end();

        if is_engine_failure_line(line) {
            tracing::warn!(path = %origin.display(), line, "engine reported failure");
            engine_errors.push(line.to_string());
            continue;
        }

        if line.starts_with(PARAMETER_PREFIX) {
            if let Some((key, value)) = line.trim().split_once('=') {
                parameters.insert(key.trim().to_string(), ParamValue::parse(value));
            }
            continue;
        }

        state = match state {
            State::SeekingHeader => match header_from_line(line) {
                Some(header) => {
                    for required in [columns::GROSS, columns::NET] {
                        if !header.columns.iter().any(|c| c == required) {
                            let msg = format!("header has no '{required}' column");
                            tracing::warn!(path = %origin.display(), "{msg}");
                            warnings.push(msg);
                        }
                    }
                    has_array_column = header.schema.array_efficiency.is_some();
                    columns_out = header.columns.clone();
                    State::Records(header)
                }
                None => State::SeekingHeader,
            },
            State::Records(header) => {
                match row_fields(line, &header) {
                    Some(fields) => {
                        let mut row_warnings = Vec::new();
                        let record = build_record(&fields, &header.schema, &mut row_warnings);
                        let label = format!("{} line {}", origin.display(), lineno + 1);
                        accumulate(&record, has_array_column, &mut totals, &label, &mut row_warnings);
                        for w in &row_warnings {
                            tracing::warn!("{w}");
                        }
                        warnings.extend(row_warnings);
                        records.push(record);
                        State::Records(header)
                    }
                    None => State::Done,
                }
            }
            State::Done => State::Done,
        };
    }

    if matches!(state, State::SeekingHeader) {
        return Err(ReportError::MissingHeader {
            path: origin.to_path_buf(),
            engine_errors,
        });
    }

    let active_count = records.iter().filter(|r| r.is_active()).count();
    let summary = AepSummary {
        gross_gwh: totals.gross_kwh / KWH_PER_GWH,
        array_gwh: has_array_column.then(|| totals.array_kwh / KWH_PER_GWH),
        net_gwh: totals.net_kwh / KWH_PER_GWH,
        turbine_count: records.len(),
        active_count,
    };
    if !engine_errors.is_empty() {
        tracing::warn!(
            path = %origin.display(),
            count = engine_errors.len(),
            "engine failure lines found in report"
        );
    }
    tracing::debug!(
        path = %origin.display(),
        turbines = summary.turbine_count,
        active = summary.active_count,
        gross_gwh = summary.gross_gwh,
        net_gwh = summary.net_gwh,
        "parsed report"
    );

    Ok(EnergyReport {
        parameters,
        columns: columns_out,
        records,
        summary,
        engine_errors,
        warnings,
    })
}

fn header_from_line(line: &str) -> Option<Header> {
    if !(line.contains("Gross") && line.contains("Net")) {
        return None;
    }
    let columns: Vec<String> = line.split('\t').map(|c| c.trim().to_string()).collect();
    if columns.len() <= 2 {
        return None;
    }
    let schema = Schema::from_columns(&columns);
    Some(Header { columns, schema })
}

/// Fields of a turbine row aligned to the header, or `None` when the table
/// has ended. Rows that omit only a leading `Site` cell are aligned to the
/// remaining columns.
fn row_fields<'a>(line: &'a str, header: &Header) -> Option<Vec<Option<&'a str>>> {
    if line.is_empty() {
        return None;
    }
    let fields: Vec<&str> = line.split('\t').collect();
    let width = header.columns.len();
    let offset = if fields.len() >= width {
        0
    } else if fields.len() + 1 == width && header.schema.site == Some(0) {
        1
    } else {
        return None;
    };
    let mut aligned = vec![None; width];
    for (i, f) in fields.into_iter().enumerate() {
        if let Some(slot) = aligned.get_mut(i + offset) {
            *slot = Some(f.trim());
        }
    }
    Some(aligned)
}

fn cell<'a>(fields: &[Option<&'a str>], col: Option<usize>) -> Option<&'a str> {
    col.and_then(|i| fields.get(i).copied().flatten())
        .filter(|s| !s.is_empty())
}

fn cell_number(
    fields: &[Option<&str>],
    col: Option<usize>,
    name: &str,
    warnings: &mut Vec<String>,
) -> Option<Real> {
    let s = cell(fields, col)?;
    match s.parse::<Real>() {
        Ok(v) => Some(v),
        Err(_) => {
            warnings.push(format!("could not read '{name}' from '{s}'"));
            None
        }
    }
}

fn build_record(fields: &[Option<&str>], schema: &Schema, warnings: &mut Vec<String>) -> ReportRecord {
    ReportRecord {
        site: cell(fields, schema.site).map(str::to_string),
        index: cell(fields, schema.index).and_then(|s| s.parse().ok()),
        x: cell_number(fields, schema.x, columns::X, warnings),
        y: cell_number(fields, schema.y, columns::Y, warnings),
        gross_kwh: cell_number(fields, schema.gross, columns::GROSS, warnings),
        net_kwh: cell_number(fields, schema.net, columns::NET, warnings),
        array_efficiency_pct: cell_number(
            fields,
            schema.array_efficiency,
            columns::ARRAY_EFFICIENCY[0],
            warnings,
        ),
        free_speed_ms: cell_number(fields, schema.free_speed, columns::FREE_SPEED, warnings),
        mean_speed_ms: cell_number(fields, schema.mean_speed, columns::MEAN_SPEED, warnings),
        turbine_type: cell(fields, schema.turbine_type).map(str::to_string),
    }
}

fn accumulate(
    record: &ReportRecord,
    has_array_column: bool,
    totals: &mut Totals,
    label: &str,
    warnings: &mut Vec<String>,
) {
    let Some(gross) = record.gross_kwh.filter(|g| *g > 0.0) else {
        return;
    };
    let Some(net) = record.net_kwh else {
        warnings.push(format!("{label}: no net energy; turbine left out of totals"));
        return;
    };
    let array = if has_array_column {
        match record.array_kwh() {
            Some(a) => a,
            None => {
                warnings.push(format!("{label}: no array efficiency; turbine left out of totals"));
                return;
            }
        }
    } else {
        0.0
    };
    totals.gross_kwh += gross;
    totals.net_kwh += net;
    totals.array_kwh += array;
}
