//! Turning caller input into nodes of a target document.

use crate::dom::{Document, Node, ParseOptions};
use crate::error::FluentError;
use crate::nodes::NodeSet;

/// Input accepted by the mutation verbs.
#[derive(Debug, Clone)]
pub enum Content {
    /// Markup parsed as a fragment in the target document's context.
    Markup(String),
    Node(Node),
    Nodes(Vec<Node>),
}

impl From<&str> for Content {
    fn from(markup: &str) -> Self {
        Content::Markup(markup.to_string())
    }
}

impl From<String> for Content {
    fn from(markup: String) -> Self {
        Content::Markup(markup)
    }
}

impl From<Node> for Content {
    fn from(node: Node) -> Self {
        Content::Node(node)
    }
}

impl From<&Node> for Content {
    fn from(node: &Node) -> Self {
        Content::Node(node.clone())
    }
}

impl From<Vec<Node>> for Content {
    fn from(nodes: Vec<Node>) -> Self {
        Content::Nodes(nodes)
    }
}

impl From<&[Node]> for Content {
    fn from(nodes: &[Node]) -> Self {
        Content::Nodes(nodes.to_vec())
    }
}

impl From<&NodeSet> for Content {
    fn from(nodes: &NodeSet) -> Self {
        Content::Nodes(nodes.to_vec())
    }
}

/// Resolves [`Content`] into an ordered list of nodes owned by one document.
///
/// Candidates are filtered to elements and, unless disabled, text nodes
/// with non-whitespace content. The limit applies after filtering. Nodes
/// from other documents are deep-imported; parsed markup is detached from
/// its temporary fragment.
pub struct ContentResolver<'a> {
    document: &'a Document,
    context: Option<Node>,
    include_text: bool,
    limit: Option<usize>,
    parse_options: ParseOptions,
}

impl<'a> ContentResolver<'a> {
    pub fn new(document: &'a Document) -> Self {
        ContentResolver {
            document,
            context: None,
            include_text: true,
            limit: None,
            parse_options: ParseOptions::xml(),
        }
    }

    pub fn with_text_nodes(mut self, include: bool) -> Self {
        self.include_text = include;
        self
    }

    /// Stops after `limit` nodes; zero means no limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Resolves markup prefixes against the declarations in scope at `node`.
    pub fn with_context(mut self, node: &Node) -> Self {
        self.context = Some(node.clone());
        self
    }

    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = options;
        self
    }

    fn accepts(&self, node: &Node) -> bool {
        node.is_element() || (self.include_text && node.is_selectable())
    }

    fn is_full(&self, count: usize) -> bool {
        self.limit.is_some_and(|limit| count >= limit)
    }

    pub fn resolve(&self, content: impl Into<Content>) -> Result<Vec<Node>, FluentError> {
        let candidates = match content.into() {
            Content::Markup(markup) => return self.resolve_markup(&markup),
            Content::Node(node) => vec![node],
            Content::Nodes(nodes) => nodes,
        };
        let mut selected = Vec::new();
        for node in candidates {
            if self.is_full(selected.len()) {
                break;
            }
            if self.accepts(&node) {
                selected.push(node);
            }
        }
        if selected.is_empty() {
            return Err(FluentError::EmptyContent);
        }
        selected
            .into_iter()
            .map(|node| {
                if node.owner_document().ptr_eq(self.document) {
                    Ok(node)
                } else {
                    log::debug!("Importing foreign <{}> into target document", node.node_name());
                    self.document.import_node(&node, true)
                }
            })
            .collect()
    }

    fn resolve_markup(&self, markup: &str) -> Result<Vec<Node>, FluentError> {
        let fragment =
            self.document
                .parse_fragment(markup, self.context.as_ref(), self.parse_options)?;
        let mut selected = Vec::new();
        for child in fragment.children() {
            if self.is_full(selected.len()) {
                break;
            }
            if self.accepts(&child) {
                child.remove();
                selected.push(child);
            }
        }
        if selected.is_empty() {
            return Err(FluentError::EmptyContent);
        }
        Ok(selected)
    }

    /// The first element `content` resolves to.
    pub fn resolve_single_element(&self, content: impl Into<Content>) -> Result<Node, FluentError> {
        let resolver = ContentResolver {
            document: self.document,
            context: self.context.clone(),
            include_text: false,
            limit: Some(1),
            parse_options: self.parse_options,
        };
        resolver
            .resolve(content)?
            .into_iter()
            .next()
            .ok_or(FluentError::EmptyContent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Document {
        Document::parse_xml("<p/>").unwrap()
    }

    #[test]
    fn markup_resolves_to_elements_of_the_target() {
        let document = target();
        let nodes = ContentResolver::new(&document).resolve("<b>Hi</b>").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_name(), "b");
        assert_eq!(nodes[0].owner_document(), document);
        assert!(nodes[0].parent().is_none());

        let p = document.document_element().unwrap();
        p.append_child(&nodes[0]).unwrap();
        assert_eq!(p.to_xml(), "<p><b>Hi</b></p>");
    }

    #[test]
    fn markup_keeps_document_order_and_skips_whitespace() {
        let document = target();
        let nodes = ContentResolver::new(&document)
            .resolve("<a/> <!--c--> text <b/>")
            .unwrap();
        let names: Vec<String> = nodes.iter().map(Node::node_name).collect();
        assert_eq!(names, ["a", "#text", "b"]);
    }

    #[test]
    fn text_nodes_can_be_excluded() {
        let document = target();
        let nodes = ContentResolver::new(&document)
            .with_text_nodes(false)
            .resolve("text <a/>")
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].is_element());
    }

    #[test]
    fn empty_content_is_an_error() {
        let document = target();
        let resolver = ContentResolver::new(&document);
        assert_eq!(resolver.resolve(""), Err(FluentError::EmptyContent));
        assert_eq!(resolver.resolve("   "), Err(FluentError::EmptyContent));
        assert_eq!(resolver.resolve(Vec::<Node>::new()), Err(FluentError::EmptyContent));
        let comment = document.create_comment("c");
        assert_eq!(resolver.resolve(vec![comment]), Err(FluentError::EmptyContent));
    }

    #[test]
    fn malformed_markup_is_a_fragment_error() {
        let document = target();
        let err = ContentResolver::new(&document).resolve("<a>").unwrap_err();
        assert!(matches!(err, FluentError::FragmentParse(_)));
    }

    #[test]
    fn foreign_nodes_are_deep_imported() {
        let document = target();
        let source = Document::parse_xml("<a><b>text</b></a>").unwrap();
        let a = source.document_element().unwrap();
        let nodes = ContentResolver::new(&document).resolve(&a).unwrap();
        assert_eq!(nodes[0].owner_document(), document);
        assert_eq!(nodes[0].to_xml(), a.to_xml());
        assert_eq!(a.owner_document(), source);
    }

    #[test]
    fn own_nodes_are_returned_as_is() {
        let document = target();
        let p = document.document_element().unwrap();
        let nodes = ContentResolver::new(&document).resolve(&p).unwrap();
        assert_eq!(nodes[0], p);
    }

    #[test]
    fn limit_applies_after_filtering() {
        let document = target();
        let nodes = ContentResolver::new(&document)
            .with_limit(2)
            .resolve("<!--x--><a/><b/><c/>")
            .unwrap();
        let names: Vec<String> = nodes.iter().map(Node::node_name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn single_element_skips_leading_text() {
        let document = target();
        let wrapper = ContentResolver::new(&document)
            .resolve_single_element("text <div><span/></div><em/>")
            .unwrap();
        assert_eq!(wrapper.node_name(), "div");
    }

    #[test]
    fn markup_uses_namespaces_of_the_context() {
        let document = Document::parse_xml(r#"<r xmlns:x="urn:x"><c/></r>"#).unwrap();
        let c = document.document_element().unwrap().first_child().unwrap();
        let nodes = ContentResolver::new(&document)
            .with_context(&c)
            .resolve("<x:item/>")
            .unwrap();
        assert_eq!(nodes[0].namespace_uri().as_deref(), Some("urn:x"));
    }
}
