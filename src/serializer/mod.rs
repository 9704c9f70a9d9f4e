//! Serializers turn a document, or some of its nodes, into text.
//!
//! A [`SerializerFactories`] registry asks each factory in turn for a
//! serializer matching the content type; the first one offered is used.

mod json;
mod xml;

use std::fmt;

use crate::content_type::ContentType;
use crate::dom::{Document, Node};
use crate::error::FluentError;

pub use json::BadgerFishSerializer;
pub use xml::{HtmlSerializer, XmlSerializer};

pub trait Serializer {
    /// Renders the whole document, or just `nodes` one after another.
    fn serialize(&self, document: &Document, nodes: Option<&[Node]>) -> Result<String, FluentError>;
}

pub trait SerializerFactory {
    fn create_serializer(&self, content_type: &ContentType) -> Option<Box<dyn Serializer>>;
}

impl<F> SerializerFactory for F
where
    F: Fn(&ContentType) -> Option<Box<dyn Serializer>>,
{
    fn create_serializer(&self, content_type: &ContentType) -> Option<Box<dyn Serializer>> {
        self(content_type)
    }
}

/// XML, HTML and BadgerFish serializers by content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSerializers;

impl SerializerFactory for DefaultSerializers {
    fn create_serializer(&self, content_type: &ContentType) -> Option<Box<dyn Serializer>> {
        match content_type {
            ContentType::Xml => Some(Box::new(XmlSerializer)),
            ContentType::Html => Some(Box::new(HtmlSerializer)),
            other if BadgerFishSerializer::supports(other) => Some(Box::new(BadgerFishSerializer)),
            ContentType::Other(_) => None,
        }
    }
}

pub struct SerializerFactories {
    factories: Vec<Box<dyn SerializerFactory>>,
}

impl SerializerFactories {
    pub fn new() -> Self {
        SerializerFactories {
            factories: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut factories = SerializerFactories::new();
        factories.add(DefaultSerializers);
        factories
    }

    pub fn add(&mut self, factory: impl SerializerFactory + 'static) -> &mut Self {
        self.factories.push(Box::new(factory));
        self
    }

    pub fn create_serializer(&self, content_type: &ContentType) -> Option<Box<dyn Serializer>> {
        self.factories
            .iter()
            .find_map(|factory| factory.create_serializer(content_type))
    }

    /// Serializes with the first serializer offered for `content_type`.
    pub fn serialize(
        &self,
        content_type: &ContentType,
        document: &Document,
        nodes: Option<&[Node]>,
    ) -> Result<String, FluentError> {
        let serializer = self
            .create_serializer(content_type)
            .ok_or_else(|| FluentError::NoSerializer(content_type.to_string()))?;
        serializer.serialize(document, nodes)
    }
}

impl Default for SerializerFactories {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for SerializerFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerFactories")
            .field("count", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Serializer for Upper {
        fn serialize(&self, document: &Document, _nodes: Option<&[Node]>) -> Result<String, FluentError> {
            Ok(document.to_xml().to_uppercase())
        }
    }

    #[test]
    fn closures_are_factories() {
        let mut factories = SerializerFactories::new();
        factories.add(|content_type: &ContentType| -> Option<Box<dyn Serializer>> {
            content_type
                .is_any_of(&["text/upper"])
                .then(|| Box::new(Upper) as Box<dyn Serializer>)
        });
        let document = Document::parse_xml("<a/>").unwrap();
        let text = factories
            .serialize(&"text/upper".into(), &document, None)
            .unwrap();
        assert_eq!(text, "<?XML VERSION=\"1.0\"?>\n<A/>\n");
    }

    #[test]
    fn missing_serializer_is_reported() {
        let document = Document::new();
        let err = SerializerFactories::with_defaults()
            .serialize(&"application/pdf".into(), &document, None)
            .unwrap_err();
        assert_eq!(err, FluentError::NoSerializer("application/pdf".to_string()));
    }
}
