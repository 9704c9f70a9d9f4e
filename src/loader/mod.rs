//! Loaders turn a [`Source`] into a [`Document`].
//!
//! A [`Loaders`] registry tries its loaders in registration order and uses
//! the first one that supports the requested content type and produces a
//! result.

mod json;
mod xml;

use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::content_type::ContentType;
use crate::dom::{Document, Node};
use crate::error::FluentError;

pub use json::{BadgerFishLoader, SimpleXmlLoader, SIMPLEXML_NAMESPACE};
pub use xml::{HtmlLoader, XmlLoader};

/// Something a document can be loaded from.
#[derive(Debug, Clone)]
pub enum Source {
    Markup(String),
    File(PathBuf),
    Json(serde_json::Value),
    Document(Document),
    Node(Node),
}

impl From<&str> for Source {
    fn from(markup: &str) -> Self {
        Source::Markup(markup.to_string())
    }
}

impl From<String> for Source {
    fn from(markup: String) -> Self {
        Source::Markup(markup)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::File(path)
    }
}

impl From<serde_json::Value> for Source {
    fn from(value: serde_json::Value) -> Self {
        Source::Json(value)
    }
}

impl From<Document> for Source {
    fn from(document: Document) -> Self {
        Source::Document(document)
    }
}

impl From<Node> for Source {
    fn from(node: Node) -> Self {
        Source::Node(node)
    }
}

impl Source {
    /// The text behind a markup or file source.
    pub(crate) fn read_text(&self) -> Result<Option<String>, FluentError> {
        match self {
            Source::Markup(markup) => Ok(Some(markup.clone())),
            Source::File(path) => fs::read_to_string(path).map(Some).map_err(|err| {
                FluentError::InvalidSource(format!("cannot read {}: {err}", path.display()))
            }),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Keep whitespace-only text nodes.
    pub preserve_whitespace: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            preserve_whitespace: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    document: Document,
    selection: Option<Vec<Node>>,
    content_type: ContentType,
}

impl LoadResult {
    pub fn new(document: Document, content_type: ContentType) -> Self {
        LoadResult {
            document,
            selection: None,
            content_type,
        }
    }

    /// Nodes the loaded selection should start with.
    pub fn with_selection(mut self, nodes: Vec<Node>) -> Self {
        self.selection = Some(nodes);
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn selection(&self) -> Option<&[Node]> {
        self.selection.as_deref()
    }

    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }
}

pub trait Loader {
    fn supports(&self, content_type: &ContentType) -> bool;

    /// `Ok(None)` when the source is of a shape this loader does not handle.
    fn load(
        &self,
        source: &Source,
        content_type: &ContentType,
        options: &LoadOptions,
    ) -> Result<Option<LoadResult>, FluentError>;
}

pub struct Loaders {
    loaders: Vec<Box<dyn Loader>>,
}

impl Loaders {
    /// An empty registry.
    pub fn new() -> Self {
        Loaders {
            loaders: Vec::new(),
        }
    }

    /// XML, HTML, BadgerFish and SimpleXML JSON.
    pub fn with_defaults() -> Self {
        let mut loaders = Loaders::new();
        loaders
            .add(XmlLoader)
            .add(HtmlLoader)
            .add(BadgerFishLoader::default())
            .add(SimpleXmlLoader::default());
        loaders
    }

    pub fn add(&mut self, loader: impl Loader + 'static) -> &mut Self {
        self.loaders.push(Box::new(loader));
        self
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    pub fn supports(&self, content_type: &ContentType) -> bool {
        self.loaders.iter().any(|loader| loader.supports(content_type))
    }

    pub fn load(
        &self,
        source: &Source,
        content_type: &ContentType,
        options: &LoadOptions,
    ) -> Result<LoadResult, FluentError> {
        for (index, loader) in self.loaders.iter().enumerate() {
            if !loader.supports(content_type) {
                continue;
            }
            log::debug!("Trying loader #{index} for content type '{content_type}'");
            if let Some(result) = loader.load(source, content_type, options)? {
                return Ok(result);
            }
        }
        Err(FluentError::InvalidSource(format!(
            "no loader can load this source as '{content_type}'"
        )))
    }
}

impl Default for Loaders {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for Loaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loaders")
            .field("count", &self.loaders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    struct Fixed;

    impl Loader for Fixed {
        fn supports(&self, content_type: &ContentType) -> bool {
            content_type.is_any_of(&["text/fixed"])
        }

        fn load(
            &self,
            _source: &Source,
            content_type: &ContentType,
            _options: &LoadOptions,
        ) -> Result<Option<LoadResult>, FluentError> {
            let document = Document::parse_xml("<fixed/>")?;
            Ok(Some(LoadResult::new(document, content_type.clone())))
        }
    }

    #[test]
    fn first_supporting_loader_wins() {
        let mut loaders = Loaders::with_defaults();
        loaders.add(Fixed);
        let result = loaders
            .load(&"ignored".into(), &"text/fixed".into(), &LoadOptions::default())
            .unwrap();
        assert_eq!(result.document().document_element().unwrap().node_name(), "fixed");
        assert_eq!(result.content_type().as_str(), "text/fixed");
    }

    #[test]
    fn unsupported_content_type_is_invalid_source() {
        let loaders = Loaders::with_defaults();
        let err = loaders
            .load(&"<a/>".into(), &"text/unknown".into(), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, FluentError::InvalidSource(_)));
        assert!(!loaders.supports(&"text/unknown".into()));
        assert!(Loaders::new().is_empty());
    }

    #[test]
    fn file_sources_are_read() {
        let file = assert_fs::NamedTempFile::new("doc.xml").unwrap();
        file.write_str("<from-file/>").unwrap();
        let result = Loaders::default()
            .load(
                &Source::File(file.path().to_path_buf()),
                &ContentType::Xml,
                &LoadOptions::default(),
            )
            .unwrap();
        assert_eq!(
            result.document().document_element().unwrap().node_name(),
            "from-file"
        );
    }
}
