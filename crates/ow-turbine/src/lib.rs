//! ow-turbine: turbine definitions, the OWTG file codec and turbine layouts.

pub mod codec;
pub mod definition;
pub mod layout;
pub mod positions;

use std::path::PathBuf;

pub use codec::{
    OwtgExtras, OwtgFile, PeriodicCost, decode, decode_str, encode, encode_with, read_owtg,
    set_rotor_diameter,
};
pub use definition::{CatalogEntry, STANDARD_AIR_DENSITY, TurbineCatalog, TurbineDefinition};
pub use layout::{Position, TurbineLayout};
pub use positions::{format_positions, parse_positions, read_positions};

pub type TurbineResult<T> = Result<T, TurbineError>;

#[derive(thiserror::Error, Debug)]
pub enum TurbineError {
    #[error("Malformed turbine XML in {}: {source}", path.display())]
    Xml {
        path: PathBuf,
        #[source]
        source: ow_core::CoreError,
    },

    #[error("Missing field {field} in {}", path.display())]
    MissingField { path: PathBuf, field: String },

    #[error("Invalid value for {field} in {}: '{text}'", path.display())]
    InvalidValue {
        path: PathBuf,
        field: String,
        text: String,
    },

    #[error("Bad table {table} in {}: {what}", path.display())]
    TableShape {
        path: PathBuf,
        table: String,
        what: String,
    },

    #[error("Velocity axis of {table} differs from the power table in {}", path.display())]
    VelocityAxisMismatch { path: PathBuf, table: String },

    #[error("Invalid turbine definition: {what}")]
    InvalidDefinition { what: String },

    #[error("Invalid turbine name '{name}': must be a valid XML element name")]
    InvalidName { name: String },

    #[error("Layout has {positions} positions but {types} turbine types")]
    LayoutMismatch { positions: usize, types: usize },

    #[error("Layout has no turbines")]
    EmptyLayout,

    #[error("Turbine index {index} out of range (len={len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown turbine type id {id}")]
    UnknownTurbineType { id: u32 },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
