//! Scene description tree for the physim simulation core.
//!
//! A scene is a hierarchy of tagged elements with attributes, a text value
//! and children, read from and written to XML. Entities pull their own
//! parameters out of the tree; this crate only knows how to walk it and how
//! to turn text into typed values.

mod element;
mod reader;
mod value;
mod writer;

pub use element::Element;
pub use value::SceneValue;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("<{parent}> is missing required element <{tag}>")]
    MissingElement { parent: String, tag: String },

    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    #[error("invalid value '{value}' in <{element}>: expected {expected}")]
    InvalidValue {
        element: String,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid scene: {0}")]
    InvalidScene(String),
}

pub type Result<T> = std::result::Result<T, SceneError>;
