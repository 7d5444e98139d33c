use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid number for {what}: '{text}'")]
    InvalidNumber { what: String, text: String },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("Malformed XML: {what}")]
    MalformedXml { what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
