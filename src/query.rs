//! Cached XPath evaluation bound to one document.
//!
//! Expressions are compiled and run by `xee-xpath` directly on the
//! document's `xot` tree.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use xee_xpath::context::StaticContextBuilder;
use xee_xpath::query::SequenceQuery;
use xee_xpath::{Item, Queries, Query, Sequence};
use xot::ValueType;

use crate::dom::{is_ncname, Document, Node};
use crate::error::FluentError;

/// Prefix under which the document's default namespace is registered.
pub const DEFAULT_NAMESPACE_PREFIX: &str = "_";

/// An attribute returned by an expression such as `//@href`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeNode {
    pub owner: Node,
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XPathItem {
    Node(Node),
    Attribute(AttributeNode),
}

impl XPathItem {
    pub fn string_value(&self) -> String {
        match self {
            XPathItem::Node(node) => node.text_content(),
            XPathItem::Attribute(attribute) => attribute.value.clone(),
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            XPathItem::Node(node) => Some(node),
            XPathItem::Attribute(_) => None,
        }
    }
}

/// The result of [`QueryContext::evaluate`]: a node-set or a scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    NodeSet(Vec<XPathItem>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Evaluation {
    pub fn is_node_set(&self) -> bool {
        matches!(self, Evaluation::NodeSet(_))
    }

    /// Tree nodes of a node-set result, in document order. Attributes and
    /// scalar results yield nothing.
    pub fn nodes(&self) -> Vec<Node> {
        match self {
            Evaluation::NodeSet(items) => items.iter().filter_map(XPathItem::as_node).cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Evaluation::NodeSet(items) => !items.is_empty(),
            Evaluation::Boolean(value) => *value,
            Evaluation::Number(value) => *value != 0.0 && !value.is_nan(),
            Evaluation::String(value) => !value.is_empty(),
        }
    }

    pub fn to_string_value(&self) -> String {
        match self {
            Evaluation::NodeSet(items) => items.first().map(XPathItem::string_value).unwrap_or_default(),
            Evaluation::Boolean(value) => value.to_string(),
            Evaluation::Number(value) => format_number(*value),
            Evaluation::String(value) => value.clone(),
        }
    }
}

struct Cache {
    document: Document,
    generation: u64,
    namespaces: HashMap<String, String>,
    queries: HashMap<String, SequenceQuery>,
}

impl Cache {
    fn compile(&mut self, expression: &str) -> Result<SequenceQuery, FluentError> {
        if let Some(query) = self.queries.get(expression) {
            return Ok(query.clone());
        }
        let mut builder = StaticContextBuilder::default();
        for (prefix, uri) in &self.namespaces {
            builder.add_namespace(prefix, uri);
        }
        let query = Queries::new(builder)
            .sequence(expression)
            .map_err(|err| FluentError::Query(format!("'{expression}': {err}")))?;
        self.queries.insert(expression.to_string(), query.clone());
        Ok(query)
    }
}

/// One item of a raw result sequence, detached from the store borrow.
enum Raw {
    Node(xot::Node),
    Attribute {
        owner: xot::Node,
        local_name: String,
        namespace: Option<String>,
        value: String,
    },
    Skipped,
    Atomic(Item),
}

/// Evaluates XPath expressions against one document.
///
/// The compiled state (namespace table plus compiled expressions) is built
/// on first use and rebuilt lazily after the bound document changes or a
/// new prefix mapping is registered.
pub struct QueryContext {
    document: RefCell<Document>,
    namespaces: RefCell<HashMap<String, String>>,
    generation: Cell<u64>,
    cache: RefCell<Option<Cache>>,
}

impl QueryContext {
    pub fn new(document: Document) -> Self {
        QueryContext {
            document: RefCell::new(document),
            namespaces: RefCell::new(HashMap::new()),
            generation: Cell::new(0),
            cache: RefCell::new(None),
        }
    }

    pub fn document(&self) -> Document {
        self.document.borrow().clone()
    }

    /// Points the context at another document.
    pub fn bind(&self, document: Document) {
        *self.document.borrow_mut() = document;
    }

    /// Adds or overwrites a prefix mapping used by name tests.
    pub fn register_namespace(&self, prefix: &str, uri: &str) -> Result<(), FluentError> {
        if !is_ncname(prefix) {
            return Err(FluentError::InvalidArgument(format!(
                "'{prefix}' is not a valid namespace prefix"
            )));
        }
        let mut namespaces = self.namespaces.borrow_mut();
        if namespaces.get(prefix).map(String::as_str) != Some(uri) {
            namespaces.insert(prefix.to_string(), uri.to_string());
            self.generation.set(self.generation.get() + 1);
        }
        Ok(())
    }

    /// Caller-registered mappings, without the inferred `_` prefix.
    pub fn namespaces(&self) -> HashMap<String, String> {
        self.namespaces.borrow().clone()
    }

    pub fn evaluate(&self, expression: &str, context: Option<&Node>) -> Result<Evaluation, FluentError> {
        let document = self.document();
        if let Some(node) = context {
            if !node.owner_document().ptr_eq(&document) {
                return Err(FluentError::OutOfBounds);
            }
        }
        let query = self.prepare(&document, expression)?;
        let raw = {
            let mut store = document.store_mut();
            let context_node = context.map_or_else(|| store.root(), Node::id);
            let documents = store.documents_mut();
            let mut builder = query.dynamic_context_builder(documents);
            builder.context_node(context_node);
            let dynamic = builder.build();
            let sequence = query
                .execute_with_context(documents, &dynamic)
                .map_err(|err| FluentError::Query(format!("'{expression}': {err}")))?;
            classify(store.xot(), &sequence)
        };
        evaluation(&document, expression, raw)
    }

    /// True when the expression selects at least one node or its scalar
    /// result is truthy.
    pub fn matches(&self, expression: &str, context: Option<&Node>) -> Result<bool, FluentError> {
        Ok(self.evaluate(expression, context)?.to_boolean())
    }

    fn prepare(&self, document: &Document, expression: &str) -> Result<SequenceQuery, FluentError> {
        let generation = self.generation.get();
        let mut cache = self.cache.borrow_mut();
        let stale = cache
            .as_ref()
            .map_or(true, |c| !c.document.ptr_eq(document) || c.generation != generation);
        if stale {
            *cache = None;
        }
        let cache = cache.get_or_insert_with(|| {
            let namespaces = self.effective_namespaces(document);
            log::debug!(
                "Building XPath context with {} namespace prefix(es)",
                namespaces.len()
            );
            Cache {
                document: document.clone(),
                generation,
                namespaces,
                queries: HashMap::new(),
            }
        });
        cache.compile(expression)
    }

    fn effective_namespaces(&self, document: &Document) -> HashMap<String, String> {
        let mut namespaces = HashMap::new();
        if let Some(root) = document.document_element() {
            let inferred = root
                .lookup_namespace_uri(Some(DEFAULT_NAMESPACE_PREFIX))
                .or_else(|| root.lookup_namespace_uri(None))
                .filter(|uri| !uri.is_empty());
            if let Some(uri) = inferred {
                namespaces.insert(DEFAULT_NAMESPACE_PREFIX.to_string(), uri);
            }
        }
        for (prefix, uri) in self.namespaces.borrow().iter() {
            namespaces.insert(prefix.clone(), uri.clone());
        }
        namespaces
    }
}

fn classify(xot: &xot::Xot, sequence: &Sequence) -> Vec<Raw> {
    sequence
        .iter()
        .map(|item| match item {
            Item::Node(node) => match xot.value_type(node) {
                ValueType::Attribute => match (xot.parent(node), xot.attribute_node(node)) {
                    (Some(owner), Some(attribute)) => {
                        let (local_name, uri) = xot.name_ns_str(attribute.name());
                        Raw::Attribute {
                            owner,
                            local_name: local_name.to_string(),
                            namespace: (!uri.is_empty()).then(|| uri.to_string()),
                            value: attribute.value().to_string(),
                        }
                    }
                    _ => Raw::Skipped,
                },
                ValueType::Namespace => Raw::Skipped,
                _ => Raw::Node(node),
            },
            other => Raw::Atomic(other),
        })
        .collect()
}

/// Maps a result sequence onto the node-set or scalar shape callers expect.
fn evaluation(document: &Document, expression: &str, raw: Vec<Raw>) -> Result<Evaluation, FluentError> {
    let atomics = raw.iter().filter(|item| matches!(item, Raw::Atomic(_))).count();
    if atomics == 0 {
        let items = raw
            .into_iter()
            .filter_map(|item| match item {
                Raw::Node(id) => Some(XPathItem::Node(document.node(id))),
                Raw::Attribute {
                    owner,
                    local_name,
                    namespace,
                    value,
                } => {
                    let owner = document.node(owner);
                    let name = owner
                        .attributes()
                        .into_iter()
                        .find(|attribute| {
                            attribute.local_name == local_name && attribute.namespace == namespace
                        })
                        .map_or(local_name, |attribute| attribute.qualified_name());
                    Some(XPathItem::Attribute(AttributeNode {
                        owner,
                        name,
                        namespace,
                        value,
                    }))
                }
                Raw::Skipped | Raw::Atomic(_) => None,
            })
            .collect();
        return Ok(Evaluation::NodeSet(items));
    }
    let mut raw = raw;
    let (1, Some(Raw::Atomic(Item::Atomic(atomic)))) = (raw.len(), raw.pop()) else {
        return Err(FluentError::Query(format!(
            "'{expression}' must yield nodes or a single value"
        )));
    };
    if let Ok(value) = bool::try_from(atomic.clone()) {
        return Ok(Evaluation::Boolean(value));
    }
    if atomic.is_numeric() {
        let value = f64::try_from(atomic)
            .map_err(|err| FluentError::Query(format!("'{expression}': {err}")))?;
        return Ok(Evaluation::Number(value));
    }
    let value = Item::Atomic(atomic)
        .string_value(document.store().xot())
        .map_err(|err| FluentError::Query(format!("'{expression}': {err}")))?;
    Ok(Evaluation::String(value))
}

/// Lexical form of a number the way XPath casts it to a string.
fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "INF" } else { "-INF" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(markup: &str) -> QueryContext {
        QueryContext::new(Document::parse_xml(markup).unwrap())
    }

    #[test]
    fn evaluates_node_sets_and_scalars() {
        let query = context("<items><item>a</item><item>b</item></items>");
        let result = query.evaluate("//item", None).unwrap();
        assert_eq!(result.nodes().len(), 2);
        assert_eq!(
            query.evaluate("count(//item)", None).unwrap(),
            Evaluation::Number(2.0)
        );
        assert_eq!(
            query.evaluate("string(//item[2])", None).unwrap(),
            Evaluation::String("b".to_string())
        );
    }

    #[test]
    fn evaluates_relative_to_context_node() {
        let query = context("<r><a><b/></a><b/></r>");
        let a = query.evaluate("/r/a", None).unwrap().nodes()[0].clone();
        assert_eq!(query.evaluate("b", Some(&a)).unwrap().nodes().len(), 1);
        assert_eq!(query.evaluate("//b", Some(&a)).unwrap().nodes().len(), 2);
    }

    #[test]
    fn matches_coerces_results() {
        let query = context("<r><a/></r>");
        assert!(query.matches("//a", None).unwrap());
        assert!(!query.matches("//b", None).unwrap());
        assert!(query.matches("1 = 1", None).unwrap());
        assert!(!query.matches("''", None).unwrap());
    }

    #[test]
    fn default_namespace_is_registered_as_underscore() {
        let query = context(r#"<feed xmlns="urn:atom"><entry/></feed>"#);
        assert_eq!(query.evaluate("//_:entry", None).unwrap().nodes().len(), 1);
        assert!(query.evaluate("//entry", None).unwrap().nodes().is_empty());
    }

    #[test]
    fn explicit_underscore_declaration_wins_over_default() {
        let query = context(r#"<r xmlns="urn:d" xmlns:_="urn:u"><_:x/></r>"#);
        assert_eq!(query.evaluate("//_:x", None).unwrap().nodes().len(), 1);
    }

    #[test]
    fn registered_namespaces_apply_after_first_use() {
        let query = context(r#"<r xmlns:a="urn:a"><a:x/></r>"#);
        let err = query.evaluate("//n:x", None).unwrap_err();
        assert!(matches!(err, FluentError::Query(_)));

        query.register_namespace("n", "urn:a").unwrap();
        assert_eq!(query.evaluate("//n:x", None).unwrap().nodes().len(), 1);
    }

    #[test]
    fn rebinding_the_document_rebuilds_the_context() {
        let query = context("<r><a/></r>");
        assert_eq!(query.evaluate("count(//a)", None).unwrap(), Evaluation::Number(1.0));
        query.bind(Document::parse_xml("<r><a/><a/></r>").unwrap());
        assert_eq!(query.evaluate("count(//a)", None).unwrap(), Evaluation::Number(2.0));
    }

    #[test]
    fn malformed_expression_is_a_query_error() {
        let query = context("<r/>");
        assert!(matches!(
            query.evaluate("//[", None),
            Err(FluentError::Query(_))
        ));
    }

    #[test]
    fn foreign_context_node_is_rejected() {
        let query = context("<r/>");
        let other = Document::parse_xml("<x/>").unwrap();
        let foreign = other.document_element().unwrap();
        assert_eq!(
            query.evaluate(".", Some(&foreign)),
            Err(FluentError::OutOfBounds)
        );
    }

    #[test]
    fn sequences_of_values_are_rejected() {
        let query = context("<r/>");
        assert!(matches!(
            query.evaluate("(1, 2)", None),
            Err(FluentError::Query(_))
        ));
        assert_eq!(
            query.evaluate("()", None).unwrap(),
            Evaluation::NodeSet(Vec::new())
        );
    }

    #[test]
    fn normalize_space_trims_xml_whitespace_only() {
        let query = context("<r>\u{A0}a \t b\u{A0}</r>");
        assert_eq!(
            query.evaluate("normalize-space(/r)", None).unwrap(),
            Evaluation::String("\u{A0}a b\u{A0}".to_string())
        );
    }

    #[test]
    fn numbers_format_like_xpath() {
        assert_eq!(Evaluation::Number(2.0).to_string_value(), "2");
        assert_eq!(Evaluation::Number(0.5).to_string_value(), "0.5");
        assert_eq!(Evaluation::Number(f64::NAN).to_string_value(), "NaN");
    }

    #[test]
    fn attributes_are_returned_as_items() {
        let query = context(r#"<r><a href="x"/></r>"#);
        let Evaluation::NodeSet(items) = query.evaluate("//@href", None).unwrap() else {
            panic!("expected a node-set");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].string_value(), "x");
        let XPathItem::Attribute(attribute) = &items[0] else {
            panic!("expected an attribute");
        };
        assert_eq!(attribute.name, "href");
        assert_eq!(attribute.owner.node_name(), "a");
    }
}
