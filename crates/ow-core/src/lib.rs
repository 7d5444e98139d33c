//! ow-core: shared foundation for the engine coupling crates.
//!
//! Contains:
//! - error (shared error types)
//! - numeric (Real + tolerances + float helpers)
//! - ids (compact catalog identifiers)
//! - timing (wall-clock stopwatch)
//! - xml (minimal element tree used by the script and turbine codecs)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;
pub mod xml;

pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use timing::Stopwatch;
pub use xml::{Element, XmlDocument};
