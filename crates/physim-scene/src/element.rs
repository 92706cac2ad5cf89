//! The element tree.

use crate::value::SceneValue;
use crate::{Result, SceneError};
use std::fs;
use std::path::Path;

/// One node of a scene description: `<tag attr="..">text<child/>..</tag>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Tag name.
    pub tag: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Trimmed text content.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<Element>,
}

impl Element {
    /// Create an empty element.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Parse a document from an XML string. The document element is returned.
    pub fn from_xml_str(xml: &str) -> Result<Self> {
        crate::reader::parse_document(xml)
    }

    /// Parse a document from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let xml = fs::read_to_string(path)?;
        Self::from_xml_str(&xml)
    }

    /// Serialize this element and its subtree as indented XML.
    pub fn to_xml_string(&self) -> Result<String> {
        crate::writer::write_document(self)
    }

    /// Builder: set an attribute.
    pub fn with_attr(mut self, name: &str, value: impl SceneValue) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder: set the text value.
    pub fn with_text(mut self, value: impl SceneValue) -> Self {
        self.text = value.format_value();
        self
    }

    /// Builder: append a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Builder: append `<tag>value</tag>`.
    pub fn with_value(self, tag: &str, value: impl SceneValue) -> Self {
        self.with_child(Element::new(tag).with_text(value))
    }

    /// Set or replace an attribute.
    pub fn set_attr(&mut self, name: &str, value: impl SceneValue) {
        let value = value.format_value();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Raw attribute text.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All children with the given tag, in document order.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// First child with the given tag, or a `MissingElement` error.
    pub fn required_child(&self, tag: &str) -> Result<&Element> {
        self.child(tag).ok_or_else(|| SceneError::MissingElement {
            parent: self.tag.clone(),
            tag: tag.to_string(),
        })
    }

    /// Parse this element's own text.
    pub fn value<T: SceneValue>(&self) -> Result<T> {
        T::parse_value(&self.text).ok_or_else(|| SceneError::InvalidValue {
            element: self.tag.clone(),
            value: self.text.clone(),
            expected: T::EXPECTED,
        })
    }

    /// Parse an attribute, if present.
    pub fn parse_attr<T: SceneValue>(&self, name: &str) -> Result<Option<T>> {
        match self.attr(name) {
            None => Ok(None),
            Some(raw) => T::parse_value(raw)
                .map(Some)
                .ok_or_else(|| SceneError::InvalidValue {
                    element: format!("{}@{}", self.tag, name),
                    value: raw.to_string(),
                    expected: T::EXPECTED,
                }),
        }
    }

    /// Parse an attribute that must be present.
    pub fn required_attr<T: SceneValue>(&self, name: &str) -> Result<T> {
        self.parse_attr(name)?
            .ok_or_else(|| SceneError::MissingAttribute {
                element: self.tag.clone(),
                attribute: name.to_string(),
            })
    }

    /// Parse the text of child `<tag>`, if present.
    pub fn child_value<T: SceneValue>(&self, tag: &str) -> Result<Option<T>> {
        self.child(tag).map(Element::value).transpose()
    }

    /// Parse the text of child `<tag>`, which must be present.
    pub fn required_value<T: SceneValue>(&self, tag: &str) -> Result<T> {
        self.required_child(tag)?.value()
    }

    /// Parse the text of child `<tag>`, falling back to `default` when absent.
    ///
    /// A present but malformed value is still an error.
    pub fn value_or<T: SceneValue>(&self, tag: &str, default: T) -> Result<T> {
        Ok(self.child_value(tag)?.unwrap_or(default))
    }
}
