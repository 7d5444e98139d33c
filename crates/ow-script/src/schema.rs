//! Script data model: header configuration plus an ordered operation list.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wake model used when none is given.
pub const DEFAULT_WAKE_MODEL: &str = "DAWM Eddy-Viscosity";

/// How new operations combine with the workbook's existing ones.
pub const DEFAULT_APPEND_OPERATIONS: &str = "After";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Script {
    /// Where the engine writes its tabular report.
    pub report_path: String,
    #[serde(default = "default_append")]
    pub append_operations: String,
    #[serde(default)]
    pub fields: OutputFields,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

fn default_append() -> String {
    DEFAULT_APPEND_OPERATIONS.to_string()
}

impl Script {
    pub fn new(report_path: impl Into<String>) -> Self {
        Self {
            report_path: report_path.into(),
            append_operations: default_append(),
            fields: OutputFields::default(),
            operations: Vec::new(),
        }
    }

    /// Append an operation. Nothing is validated here.
    pub fn add_operation(&mut self, op: Operation) -> &mut Self {
        self.operations.push(op);
        self
    }

    pub fn operation_kinds(&self) -> Vec<OperationKind> {
        self.operations.iter().map(Operation::kind).collect()
    }
}

/// Report columns the engine should emit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputFields {
    pub site_name: bool,
    pub turbine_type: bool,
    pub turbine_label: bool,
    pub turbine_index: bool,
    pub turbine_x: bool,
    pub turbine_y: bool,
    pub gross_energy: bool,
    pub net_energy: bool,
    pub array_efficiency: bool,
    pub free_windspeed: bool,
    pub mean_windspeed: bool,
    pub turbulence_total: bool,
    pub ti15: bool,
}

impl Default for OutputFields {
    fn default() -> Self {
        Self {
            site_name: true,
            turbine_type: false,
            turbine_label: false,
            turbine_index: true,
            turbine_x: false,
            turbine_y: false,
            gross_energy: true,
            net_energy: true,
            array_efficiency: true,
            free_windspeed: true,
            mean_windspeed: true,
            turbulence_total: true,
            ti15: true,
        }
    }
}

impl OutputFields {
    /// Element names paired with their current values, in document order.
    pub fn flags(&self) -> [(&'static str, bool); 13] {
        [
            ("SiteNameField", self.site_name),
            ("TurbineTypeField", self.turbine_type),
            ("TurbineLabelField", self.turbine_label),
            ("TurbineIndexField", self.turbine_index),
            ("TurbineXField", self.turbine_x),
            ("TurbineYField", self.turbine_y),
            ("GrossEnergyField", self.gross_energy),
            ("NetEnergyField", self.net_energy),
            ("ArrayEfficiencyField", self.array_efficiency),
            ("FreeWindspeedField", self.free_windspeed),
            ("MeanWindspeedField", self.mean_windspeed),
            ("TurbulenceTotalField", self.turbulence_total),
            ("TI15", self.ti15),
        ]
    }

    /// Set a flag by element name. Returns false for unknown names.
    pub fn set_flag(&mut self, element: &str, value: bool) -> bool {
        let slot = match element {
            "SiteNameField" => &mut self.site_name,
            "TurbineTypeField" => &mut self.turbine_type,
            "TurbineLabelField" => &mut self.turbine_label,
            "TurbineIndexField" => &mut self.turbine_index,
            "TurbineXField" => &mut self.turbine_x,
            "TurbineYField" => &mut self.turbine_y,
            "GrossEnergyField" => &mut self.gross_energy,
            "NetEnergyField" => &mut self.net_energy,
            "ArrayEfficiencyField" => &mut self.array_efficiency,
            "FreeWindspeedField" => &mut self.free_windspeed,
            "MeanWindspeedField" => &mut self.mean_windspeed,
            "TurbulenceTotalField" => &mut self.turbulence_total,
            "TI15" => &mut self.ti15,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn with_positions(mut self, on: bool) -> Self {
        self.turbine_x = on;
        self.turbine_y = on;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpeedRange {
    pub min_ms: f64,
    pub max_ms: f64,
    pub step_ms: f64,
}

impl Default for SpeedRange {
    fn default() -> Self {
        Self {
            min_ms: 0.0,
            max_ms: 70.0,
            step_ms: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DirectionRange {
    pub total: f64,
    pub first: f64,
    pub last: f64,
}

impl Default for DirectionRange {
    fn default() -> Self {
        Self {
            total: 72.0,
            first: 0.0,
            last: 71.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyCapture {
    pub wake_model: String,
    #[serde(default)]
    pub speed_range: SpeedRange,
    #[serde(default)]
    pub direction_range: DirectionRange,
    #[serde(default)]
    pub direction_offset: f64,
    #[serde(default = "default_pxx")]
    pub pxx: f64,
}

fn default_pxx() -> f64 {
    50.0
}

impl EnergyCapture {
    pub fn new(wake_model: impl Into<String>) -> Self {
        Self {
            wake_model: wake_model.into(),
            ..Self::default()
        }
    }
}

impl Default for EnergyCapture {
    fn default() -> Self {
        Self {
            wake_model: DEFAULT_WAKE_MODEL.to_string(),
            speed_range: SpeedRange::default(),
            direction_range: DirectionRange::default(),
            direction_offset: 0.0,
            pxx: default_pxx(),
        }
    }
}

/// One scripted engine operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Operation {
    ChangeWorkbook {
        path: String,
    },
    ReplaceTurbineType {
        name: String,
        path: String,
    },
    ReplaceTurbinePositions {
        site_name: String,
        path: String,
    },
    EnergyCapture(EnergyCapture),
    Optimize {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iterations: Option<u32>,
    },
    OptimizeCostOfEnergy,
    SiteProperties {
        site_name: String,
        enabled: bool,
    },
    Exit,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ChangeWorkbook { .. } => OperationKind::ChangeWorkbook,
            Operation::ReplaceTurbineType { .. } => OperationKind::ReplaceTurbineType,
            Operation::ReplaceTurbinePositions { .. } => OperationKind::ReplaceTurbinePositions,
            Operation::EnergyCapture(_) => OperationKind::EnergyCapture,
            Operation::Optimize { .. } => OperationKind::Optimize,
            Operation::OptimizeCostOfEnergy => OperationKind::OptimizeCostOfEnergy,
            Operation::SiteProperties { .. } => OperationKind::SiteProperties,
            Operation::Exit => OperationKind::Exit,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ChangeWorkbook,
    ReplaceTurbineType,
    ReplaceTurbinePositions,
    EnergyCapture,
    Optimize,
    OptimizeCostOfEnergy,
    SiteProperties,
    Exit,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        OperationKind::ChangeWorkbook,
        OperationKind::ReplaceTurbineType,
        OperationKind::ReplaceTurbinePositions,
        OperationKind::EnergyCapture,
        OperationKind::Optimize,
        OperationKind::OptimizeCostOfEnergy,
        OperationKind::SiteProperties,
        OperationKind::Exit,
    ];

    /// The `Type` value the engine expects.
    pub fn type_name(self) -> &'static str {
        match self {
            OperationKind::ChangeWorkbook => "Change Workbook",
            OperationKind::ReplaceTurbineType => "Replace Turbine Type",
            OperationKind::ReplaceTurbinePositions => "Replace Turbine Positions",
            OperationKind::EnergyCapture => "Energy Capture",
            OperationKind::Optimize => "Optimise",
            OperationKind::OptimizeCostOfEnergy => "OCOE",
            OperationKind::SiteProperties => "Site Properties",
            OperationKind::Exit => "Exit",
        }
    }

    /// Inverse of [`OperationKind::type_name`]; also accepts `Optimize`.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name == "Optimize" {
            return Some(OperationKind::Optimize);
        }
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}
