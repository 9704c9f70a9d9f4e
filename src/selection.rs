//! Chainable selections over one document.
//!
//! A [`Selection`] is an immutable list of nodes plus a link to the
//! selection it was derived from. Every query or edit returns a new
//! selection whose parent is the receiver, so [`Selection::end`] walks back
//! through the chain. Selections derived from one another share the
//! document and the [`QueryContext`].

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::content::Content;
use crate::content_type::ContentType;
use crate::dom::{Document, Node};
use crate::error::FluentError;
use crate::loader::{LoadOptions, Loaders, Source};
use crate::nodes::NodeSet;
use crate::query::QueryContext;
use crate::serializer::SerializerFactories;

/// Rewrites a selector before it is evaluated, e.g. to translate another
/// selector dialect into XPath.
pub type SelectorHook = Rc<dyn Fn(&str) -> String>;

/// What [`Selection::filter`] and friends test nodes against.
#[derive(Clone)]
pub enum Selector {
    /// An expression evaluated with the node as context.
    Expression(String),
    Node(Node),
    Nodes(Vec<Node>),
    /// Called with the node and its position in the selection.
    Predicate(Rc<dyn Fn(&Node, usize) -> bool>),
}

impl Selector {
    pub fn predicate(predicate: impl Fn(&Node, usize) -> bool + 'static) -> Self {
        Selector::Predicate(Rc::new(predicate))
    }
}

impl From<&str> for Selector {
    fn from(expression: &str) -> Self {
        Selector::Expression(expression.to_string())
    }
}

impl From<String> for Selector {
    fn from(expression: String) -> Self {
        Selector::Expression(expression)
    }
}

impl From<Node> for Selector {
    fn from(node: Node) -> Self {
        Selector::Node(node)
    }
}

impl From<&Node> for Selector {
    fn from(node: &Node) -> Self {
        Selector::Node(node.clone())
    }
}

impl From<Vec<Node>> for Selector {
    fn from(nodes: Vec<Node>) -> Self {
        Selector::Nodes(nodes)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Expression(expression) => f.debug_tuple("Expression").field(expression).finish(),
            Selector::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Selector::Nodes(nodes) => f.debug_tuple("Nodes").field(nodes).finish(),
            Selector::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

struct Inner {
    document: Document,
    nodes: NodeSet,
    query: Rc<QueryContext>,
    /// Strong link back for `end()`; parents never point at children, so no cycle.
    parent: Option<Selection>,
    use_document_context: bool,
    content_type: RefCell<ContentType>,
    selector_hook: RefCell<Option<SelectorHook>>,
    loaders: RefCell<Rc<Loaders>>,
    serializers: RefCell<Rc<SerializerFactories>>,
}

#[derive(Clone)]
pub struct Selection {
    inner: Rc<Inner>,
}

impl Selection {
    /// A selection over a new, empty document.
    pub fn new() -> Self {
        Self::from_document(Document::new())
    }

    /// A root selection over `document`. Queries run from the document node.
    pub fn from_document(document: Document) -> Self {
        let query = Rc::new(QueryContext::new(document.clone()));
        let mut nodes = NodeSet::new(document.clone());
        nodes.freeze();
        Selection {
            inner: Rc::new(Inner {
                document,
                nodes,
                query,
                parent: None,
                use_document_context: true,
                content_type: RefCell::new(ContentType::Xml),
                selector_hook: RefCell::new(None),
                loaders: RefCell::new(Rc::new(Loaders::default())),
                serializers: RefCell::new(Rc::new(SerializerFactories::default())),
            }),
        }
    }

    /// Loads `source` with the registered loaders into a new root selection.
    ///
    /// Documents and nodes are used directly; a node source starts the
    /// selection with that node. Loaders, serializers, the selector hook and
    /// registered namespaces carry over from `self`.
    pub fn load(
        &self,
        source: impl Into<Source>,
        content_type: impl Into<ContentType>,
    ) -> Result<Selection, FluentError> {
        self.load_with(source, content_type, &LoadOptions::default())
    }

    pub fn load_with(
        &self,
        source: impl Into<Source>,
        content_type: impl Into<ContentType>,
        options: &LoadOptions,
    ) -> Result<Selection, FluentError> {
        let content_type = content_type.into();
        let (document, selection, content_type) = match source.into() {
            Source::Document(document) => (document, None, content_type),
            Source::Node(node) => (node.owner_document(), Some(vec![node]), content_type),
            source => {
                let result = self.loaders().load(&source, &content_type, options)?;
                (
                    result.document().clone(),
                    result.selection().map(<[Node]>::to_vec),
                    result.content_type().clone(),
                )
            }
        };

        let query = QueryContext::new(document.clone());
        for (prefix, uri) in self.inner.query.namespaces() {
            query.register_namespace(&prefix, &uri)?;
        }
        let use_document_context = selection.is_none();
        let mut nodes = NodeSet::new(document.clone());
        if let Some(selection) = selection {
            nodes.push(selection, true)?;
        }
        nodes.freeze();

        Ok(Selection {
            inner: Rc::new(Inner {
                document,
                nodes,
                query: Rc::new(query),
                parent: None,
                use_document_context,
                content_type: RefCell::new(content_type),
                selector_hook: RefCell::new(self.selector_hook()),
                loaders: RefCell::new(self.loaders()),
                serializers: RefCell::new(self.serializer_factories()),
            }),
        })
    }

    fn derive(&self, mut nodes: NodeSet) -> Selection {
        nodes.freeze();
        Selection {
            inner: Rc::new(Inner {
                document: self.inner.document.clone(),
                nodes,
                query: Rc::clone(&self.inner.query),
                parent: Some(self.clone()),
                use_document_context: false,
                content_type: RefCell::new(self.content_type()),
                selector_hook: RefCell::new(self.selector_hook()),
                loaders: RefCell::new(self.loaders()),
                serializers: RefCell::new(self.serializer_factories()),
            }),
        }
    }

    /// An empty selection whose parent is `self`.
    pub fn spawn(&self) -> Selection {
        self.derive(NodeSet::new(self.document()))
    }

    /// A selection of `nodes` whose parent is `self`.
    pub fn spawn_with<I>(&self, nodes: I) -> Result<Selection, FluentError>
    where
        I: IntoIterator<Item = Node>,
    {
        let mut set = NodeSet::new(self.document());
        set.push(nodes, false)?;
        Ok(self.derive(set))
    }

    fn prepare_selector(&self, selector: &str) -> Result<String, FluentError> {
        if selector.trim().is_empty() {
            return Err(FluentError::InvalidArgument(
                "Invalid selector argument.".to_string(),
            ));
        }
        Ok(match self.selector_hook() {
            Some(hook) => hook(selector),
            None => selector.to_string(),
        })
    }

    /// Evaluates `expression` from every selected node (or from the
    /// document when this is a root selection) and selects the union of the
    /// results.
    pub fn find(&self, expression: &str) -> Result<Selection, FluentError> {
        let expression = self.prepare_selector(expression)?;
        let mut nodes = NodeSet::new(self.document());
        if self.inner.use_document_context {
            nodes.push(self.query_nodes(&expression, None)?, true)?;
        } else {
            for context in self.iter() {
                nodes.push(self.query_nodes(&expression, Some(context))?, true)?;
            }
        }
        Ok(self.derive(nodes))
    }

    fn query_nodes(&self, expression: &str, context: Option<&Node>) -> Result<Vec<Node>, FluentError> {
        let result = self.inner.query.evaluate(expression, context)?;
        if !result.is_node_set() {
            return Err(FluentError::Query(format!(
                "'{expression}' does not select nodes"
            )));
        }
        Ok(result.nodes())
    }

    /// Tests `expression` against `context`, or the document when `None`.
    pub fn matches(&self, expression: &str, context: Option<&Node>) -> Result<bool, FluentError> {
        let expression = self.prepare_selector(expression)?;
        self.inner.query.matches(&expression, context)
    }

    /// Builds a node test from `selector`.
    pub(crate) fn selector_test(
        &self,
        selector: Selector,
    ) -> Result<impl Fn(&Node, usize) -> Result<bool, FluentError> + '_, FluentError> {
        let expression = match &selector {
            Selector::Expression(expression) => Some(self.prepare_selector(expression)?),
            _ => None,
        };
        Ok(move |node: &Node, index: usize| match &selector {
            Selector::Expression(_) => match &expression {
                Some(expression) => self.inner.query.matches(expression, Some(node)),
                None => Ok(false),
            },
            Selector::Node(target) => Ok(target == node),
            Selector::Nodes(targets) => Ok(targets.contains(node)),
            Selector::Predicate(predicate) => Ok(predicate(node, index)),
        })
    }

    /// Keeps the selected nodes matching `selector`.
    pub fn filter(&self, selector: impl Into<Selector>) -> Result<Selection, FluentError> {
        let test = self.selector_test(selector.into())?;
        let mut kept = Vec::new();
        for (index, node) in self.iter().enumerate() {
            if test(node, index)? {
                kept.push(node.clone());
            }
        }
        self.spawn_with(kept)
    }

    /// The selection this one was derived from, or `self` at the root.
    pub fn end(&self) -> Selection {
        match &self.inner.parent {
            Some(parent) => parent.clone(),
            None => self.clone(),
        }
    }

    /// Drops repeated nodes, keeping the first occurrence.
    pub fn unique<I>(&self, nodes: I) -> Vec<Node>
    where
        I: IntoIterator<Item = Node>,
    {
        let mut seen = HashSet::new();
        nodes
            .into_iter()
            .filter(|node| seen.insert(node.clone()))
            .collect()
    }

    pub fn item(&self, index: usize) -> Option<Node> {
        self.inner.nodes.item(index).cloned()
    }

    pub fn length(&self) -> usize {
        self.inner.nodes.count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.inner.nodes.iter()
    }

    pub fn nodes(&self) -> &NodeSet {
        &self.inner.nodes
    }

    pub fn to_vec(&self) -> Vec<Node> {
        self.inner.nodes.to_vec()
    }

    pub fn document(&self) -> Document {
        self.inner.document.clone()
    }

    pub fn xpath(&self) -> Rc<QueryContext> {
        Rc::clone(&self.inner.query)
    }

    pub fn register_namespace(&self, prefix: &str, uri: &str) -> Result<(), FluentError> {
        self.inner.query.register_namespace(prefix, uri)
    }

    pub fn content_type(&self) -> ContentType {
        self.inner.content_type.borrow().clone()
    }

    /// Sets the content type on this selection and every ancestor.
    pub fn set_content_type(&self, content_type: impl Into<ContentType>) {
        let content_type = content_type.into();
        let mut current = Some(self);
        while let Some(selection) = current {
            *selection.inner.content_type.borrow_mut() = content_type.clone();
            current = selection.inner.parent.as_ref();
        }
    }

    pub fn selector_hook(&self) -> Option<SelectorHook> {
        self.inner.selector_hook.borrow().clone()
    }

    /// Installs a selector rewrite used by `find`, `filter` and `matches`.
    /// Selections derived afterwards inherit it.
    pub fn set_selector_hook(&self, hook: impl Fn(&str) -> String + 'static) {
        *self.inner.selector_hook.borrow_mut() = Some(Rc::new(hook));
    }

    pub fn clear_selector_hook(&self) {
        *self.inner.selector_hook.borrow_mut() = None;
    }

    pub fn loaders(&self) -> Rc<Loaders> {
        Rc::clone(&self.inner.loaders.borrow())
    }

    pub fn set_loaders(&self, loaders: Loaders) {
        *self.inner.loaders.borrow_mut() = Rc::new(loaders);
    }

    pub fn serializer_factories(&self) -> Rc<SerializerFactories> {
        Rc::clone(&self.inner.serializers.borrow())
    }

    pub fn set_serializer_factories(&self, factories: SerializerFactories) {
        *self.inner.serializers.borrow_mut() = Rc::new(factories);
    }

    /// Serializes the whole document for the current content type.
    pub fn serialize(&self) -> Result<String, FluentError> {
        self.serializer_factories()
            .serialize(&self.content_type(), &self.inner.document, None)
    }

    /// Serializes only the selected nodes.
    pub fn serialize_nodes(&self) -> Result<String, FluentError> {
        self.serializer_factories().serialize(
            &self.content_type(),
            &self.inner.document,
            Some(self.inner.nodes.as_slice()),
        )
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Selection) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Selection {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("length", &self.length())
            .field("content_type", &self.content_type())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// Writes the serialized document, or nothing when no serializer applies.
impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.serialize() {
            Ok(text) => f.write_str(&text),
            Err(err) => {
                log::warn!("Rendering selection as empty text: {err}");
                Ok(())
            }
        }
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl From<&Selection> for Content {
    fn from(selection: &Selection) -> Self {
        Content::Nodes(selection.to_vec())
    }
}

impl From<&Selection> for Selector {
    fn from(selection: &Selection) -> Self {
        Selector::Nodes(selection.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::Serializer;

    const XML: &str = "<items version=\"1.0\"><group id=\"1\"><item>a</item><item>b</item></group><item>c</item></items>";

    fn load(xml: &str) -> Selection {
        Selection::new().load(xml, "xml").unwrap()
    }

    #[test]
    fn find_then_end_returns_the_receiver() {
        let root = load("<items><item>a</item><item>b</item></items>");
        let found = root.find("//item").unwrap();
        assert_eq!(found.length(), 2);
        assert!(found.end().ptr_eq(&root));
        assert_eq!(found.end().length(), 0);
        assert!(root.end().ptr_eq(&root));
    }

    #[test]
    fn find_from_selected_nodes_unions_results() {
        let root = load(XML);
        let groups = root.find("//group").unwrap();
        let items = groups.find("item").unwrap();
        assert_eq!(items.length(), 2);

        let all = root.find("//item").unwrap();
        let parents = all.find("..").unwrap();
        assert_eq!(parents.length(), 2);
    }

    #[test]
    fn find_rejects_scalar_expressions() {
        let root = load(XML);
        assert!(matches!(root.find("count(//item)"), Err(FluentError::Query(_))));
    }

    #[test]
    fn spawned_selection_from_empty_set_finds_nothing() {
        let root = load(XML);
        let child = root.spawn();
        assert_eq!(child.find("//item").unwrap().length(), 0);
    }

    #[test]
    fn spawn_with_nodes_keeps_them() {
        let root = load(XML);
        let element = root.document().document_element().unwrap();
        let child = root.spawn_with(vec![element.clone()]).unwrap();
        assert_eq!(child.item(0), Some(element));
        assert!(child.end().ptr_eq(&root));
    }

    #[test]
    fn matches_uses_the_selector_hook() {
        let root = load(XML);
        assert!(root.matches("/*", None).unwrap());
        assert!(!root.matches("invalid", None).unwrap());
        assert!(root.matches("count(/items)", None).unwrap());

        root.set_selector_hook(|selector| format!("/{selector}"));
        assert!(root.matches("*", None).unwrap());
        assert!(root.spawn().selector_hook().is_some());
    }

    #[test]
    fn matches_with_context_node() {
        let root = load(XML);
        let group = root.find("//group").unwrap().item(0).unwrap();
        assert!(root.matches("count(item)", Some(&group)).unwrap());
        assert!(!root.matches("count(item)", None).unwrap());
    }

    #[test]
    fn empty_selector_is_invalid() {
        let root = load(XML);
        assert!(matches!(root.find(""), Err(FluentError::InvalidArgument(_))));
    }

    #[test]
    fn filter_accepts_every_selector_shape() {
        let root = load(XML);
        let items = root.find("//item").unwrap();
        assert_eq!(items.filter(". = 'b'").unwrap().length(), 1);
        let first = items.item(0).unwrap();
        assert_eq!(items.filter(&first).unwrap().item(0), Some(first.clone()));
        assert_eq!(items.filter(vec![first]).unwrap().length(), 1);
        assert_eq!(items.filter(Vec::<Node>::new()).unwrap().length(), 0);
        let odd = items.filter(Selector::predicate(|_, index| index % 2 == 0)).unwrap();
        assert_eq!(odd.length(), 2);
    }

    #[test]
    fn unique_removes_repeated_nodes() {
        let root = load(XML);
        let element = root.document().document_element().unwrap();
        assert_eq!(root.unique(vec![element.clone(), element.clone()]).len(), 1);

        let detached = root.document().create_element("test").unwrap();
        let once = root.unique(vec![detached.clone(), detached.clone()]);
        assert_eq!(root.unique(once.clone()), once);
        assert_eq!(once.len(), 1);
    }

    #[test]
    fn content_type_propagates_to_ancestors() {
        let parent = Selection::new();
        let child = parent.spawn();
        child.set_content_type("HTML");
        assert_eq!(parent.content_type(), ContentType::Html);
        assert_eq!(Selection::new().content_type().as_str(), "text/xml");
    }

    #[test]
    fn display_degrades_to_empty_text_without_serializer() {
        let root = load(XML);
        assert_eq!(root.to_string(), root.document().to_xml());

        root.set_serializer_factories(SerializerFactories::new());
        assert_eq!(root.to_string(), "");
        assert!(matches!(root.serialize(), Err(FluentError::NoSerializer(_))));
    }

    #[test]
    fn display_degrades_when_the_serializer_fails() {
        struct Failing;
        impl Serializer for Failing {
            fn serialize(&self, _: &Document, _: Option<&[Node]>) -> Result<String, FluentError> {
                Err(FluentError::InvalidArgument("broken".to_string()))
            }
        }
        let root = load(XML);
        let mut factories = SerializerFactories::new();
        factories.add(|_: &ContentType| -> Option<Box<dyn Serializer>> { Some(Box::new(Failing)) });
        root.set_serializer_factories(factories);
        assert_eq!(root.to_string(), "");
    }

    #[test]
    fn html_content_type_serializes_html() {
        let root = Selection::new().load("<p>a<br>b</p>", "html").unwrap();
        assert_eq!(root.to_string(), "<p>a<br>b</p>\n");
    }

    #[test]
    fn load_with_document_and_node_sources() {
        let document = Document::parse_xml(XML).unwrap();
        let from_document = Selection::new().load(document.clone(), "xml").unwrap();
        assert_eq!(from_document.document(), document);
        assert!(from_document.is_empty());

        let element = document.document_element().unwrap();
        let from_node = Selection::new().load(element.clone(), "xml").unwrap();
        assert_eq!(from_node.item(0), Some(element));
        assert_eq!(from_node.find("group").unwrap().length(), 1);
    }

    #[test]
    fn unknown_content_type_is_invalid_source() {
        let err = Selection::new().load("<a/>", "text/unknown").unwrap_err();
        assert!(matches!(err, FluentError::InvalidSource(_)));
    }

    #[test]
    fn namespaces_registered_before_load_apply_after() {
        let empty = Selection::new();
        empty.register_namespace("f", "urn:f").unwrap();
        let root = empty.load(r#"<r xmlns:x="urn:f"><x:a/></r>"#, "xml").unwrap();
        assert_eq!(root.find("//f:a").unwrap().length(), 1);
    }

    #[test]
    fn default_namespace_prefix_is_available() {
        let root = load(r#"<feed xmlns="urn:atom"><entry/></feed>"#);
        assert_eq!(root.find("//_:entry").unwrap().length(), 1);
    }
}
