//! Mutable, namespace-aware documents on top of a [`xot`] arena.
//!
//! A [`Document`] owns one `Xot`, kept inside the [`xee_xpath::Documents`]
//! that queries are evaluated against, and is shared by cheap clones.
//! [`Node`] is a `(document, node)` handle. Equality is identity: two
//! handles are equal when they point at the same document (and the same
//! node).
//!
//! Handles are counted per node. Subtrees that were taken out of the tree
//! and are no longer reachable through any handle are freed at the next
//! insertion or removal.

mod html;
mod node;

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use xee_xpath::Documents;
use xot::{NamespaceId, NodeEdge, PrefixId, Value, Xot};

use crate::error::FluentError;

pub use node::{Attribute, Node, NodeType};
pub(crate) use xot::Node as NodeId;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// How markup is turned into nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Lenient HTML parsing: lower-cased names, void elements, no namespaces.
    pub html: bool,
    /// Keep whitespace-only text nodes.
    pub preserve_whitespace: bool,
}

impl ParseOptions {
    pub fn xml() -> Self {
        ParseOptions {
            html: false,
            preserve_whitespace: true,
        }
    }

    pub fn html() -> Self {
        ParseOptions {
            html: true,
            preserve_whitespace: true,
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::xml()
    }
}

pub(crate) struct Store {
    documents: Documents,
    root: xot::Node,
    /// Roots of subtrees taken out of the tree, freed once unreachable.
    detached: Vec<xot::Node>,
    doctype: Option<String>,
}

impl Store {
    pub(crate) fn xot(&self) -> &Xot {
        self.documents.xot()
    }

    pub(crate) fn xot_mut(&mut self) -> &mut Xot {
        self.documents.xot_mut()
    }

    pub(crate) fn documents_mut(&mut self) -> &mut Documents {
        &mut self.documents
    }

    pub(crate) fn root(&self) -> xot::Node {
        self.root
    }

    fn track(&mut self, node: xot::Node) {
        self.detached.push(node);
    }
}

struct Shared {
    store: RefCell<Store>,
    handles: RefCell<HashMap<xot::Node, usize>>,
}

#[derive(Clone)]
pub struct Document {
    inner: Rc<Shared>,
}

fn new_documents() -> Documents {
    let mut documents = Documents::new();
    documents.xot_mut().set_text_consolidation(false);
    documents
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        let mut documents = new_documents();
        let root = documents.xot_mut().new_document();
        Self::from_parts(documents, root, None)
    }

    fn from_parts(documents: Documents, root: xot::Node, doctype: Option<String>) -> Self {
        Document {
            inner: Rc::new(Shared {
                store: RefCell::new(Store {
                    documents,
                    root,
                    detached: Vec::new(),
                    doctype,
                }),
                handles: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn parse_xml(markup: &str) -> Result<Self, FluentError> {
        Self::parse_with(markup, ParseOptions::xml())
    }

    pub fn parse_html(markup: &str) -> Result<Self, FluentError> {
        Self::parse_with(markup, ParseOptions::html())
    }

    pub fn parse_with(markup: &str, options: ParseOptions) -> Result<Self, FluentError> {
        let mut documents = new_documents();
        let xot = documents.xot_mut();
        let (root, doctype) = if options.html {
            let root = xot.new_document();
            let doctype = html::parse_into(xot, root, markup).map_err(FluentError::Parse)?;
            (root, doctype)
        } else {
            let root = xot
                .parse(markup)
                .map_err(|err| FluentError::Parse(err.to_string()))?;
            (root, None)
        };
        if !options.preserve_whitespace {
            strip_whitespace_text(xot, root)?;
        }
        Ok(Self::from_parts(documents, root, doctype))
    }

    pub(crate) fn store(&self) -> Ref<'_, Store> {
        self.inner.store.borrow()
    }

    pub(crate) fn store_mut(&self) -> RefMut<'_, Store> {
        self.inner.store.borrow_mut()
    }

    pub(crate) fn node(&self, id: xot::Node) -> Node {
        Node::new(self.clone(), id)
    }

    fn retain(&self, id: xot::Node) {
        *self.inner.handles.borrow_mut().entry(id).or_insert(0) += 1;
    }

    fn release(&self, id: xot::Node) {
        let mut handles = self.inner.handles.borrow_mut();
        if let Some(count) = handles.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                handles.remove(&id);
            }
        }
    }

    /// Frees tracked subtrees that are still detached and that no handle
    /// points into.
    fn collect_garbage(&self) {
        let handles = self.inner.handles.borrow();
        let mut store = self.store_mut();
        let tracked = std::mem::take(&mut store.detached);
        let mut kept = Vec::with_capacity(tracked.len());
        for node in tracked {
            let xot = store.xot();
            if xot.is_removed(node) || xot.parent(node).is_some() {
                continue;
            }
            if xot.descendants(node).any(|id| handles.contains_key(&id)) {
                kept.push(node);
                continue;
            }
            if let Err(err) = store.xot_mut().remove(node) {
                log::warn!("Failed to free a detached subtree: {err}");
            }
        }
        if !kept.is_empty() {
            log::trace!("{} detached subtrees still referenced", kept.len());
        }
        store.detached.extend(kept);
    }

    /// Nodes held by the arena: the tree plus every detached subtree that
    /// has not been freed yet.
    #[cfg(test)]
    pub(crate) fn retained_node_count(&self) -> usize {
        let store = self.store();
        let xot = store.xot();
        std::iter::once(store.root)
            .chain(store.detached.iter().copied())
            .filter(|node| !xot.is_removed(*node))
            .filter(|node| *node == store.root || xot.parent(*node).is_none())
            .map(|node| xot.descendants(node).count())
            .sum()
    }

    fn create(&self, build: impl FnOnce(&mut Xot) -> xot::Node) -> Node {
        let id = {
            let mut store = self.store_mut();
            let id = build(store.xot_mut());
            store.track(id);
            id
        };
        self.node(id)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The document node itself.
    pub fn root(&self) -> Node {
        let root = self.store().root;
        self.node(root)
    }

    pub fn document_element(&self) -> Option<Node> {
        let id = {
            let store = self.store();
            let xot = store.xot();
            let found = xot.children(store.root).find(|child| xot.is_element(*child));
            found
        };
        id.map(|id| self.node(id))
    }

    /// Creates an element without namespace. The name is kept verbatim.
    pub fn create_element(&self, name: &str) -> Result<Node, FluentError> {
        split_qname(name)?;
        Ok(self.create(|xot| {
            let name = xot.add_name(name);
            xot.new_element(name)
        }))
    }

    /// Creates an element in `namespace` named by the qualified name `qname`.
    ///
    /// The element declares its own prefix (or the default namespace), so it
    /// serializes correctly wherever it ends up.
    pub fn create_element_ns(
        &self,
        namespace: Option<&str>,
        qname: &str,
    ) -> Result<Node, FluentError> {
        let (prefix, local_name) = split_qname(qname)?;
        let namespace = namespace.filter(|uri| !uri.is_empty());
        if prefix.is_some() && namespace.is_none() {
            return Err(FluentError::InvalidQName {
                name: qname.to_string(),
                reason: "a prefixed name requires a namespace".to_string(),
            });
        }
        Ok(self.create(|xot| match namespace {
            Some(uri) => {
                let ns = xot.add_namespace(uri);
                let name = xot.add_name_ns(local_name, ns);
                let element = xot.new_element(name);
                if ns != xot.xml_namespace() {
                    let prefix = match prefix {
                        Some(prefix) => xot.add_prefix(prefix),
                        None => xot.empty_prefix(),
                    };
                    xot.namespaces_mut(element).insert(prefix, ns);
                }
                element
            }
            None => {
                let name = xot.add_name(local_name);
                xot.new_element(name)
            }
        }))
    }

    pub fn create_text_node(&self, text: &str) -> Node {
        self.create(|xot| xot.new_text(text))
    }

    /// CDATA sections are plain text once parsed; this is a text node.
    pub fn create_cdata_section(&self, text: &str) -> Node {
        self.create_text_node(text)
    }

    pub fn create_comment(&self, text: &str) -> Node {
        self.create(|xot| xot.new_comment(text))
    }

    pub fn create_processing_instruction(
        &self,
        target: &str,
        data: &str,
    ) -> Result<Node, FluentError> {
        if !is_ncname(target) {
            return Err(FluentError::InvalidQName {
                name: target.to_string(),
                reason: "invalid processing instruction target".to_string(),
            });
        }
        Ok(self.create(|xot| {
            let target = xot.add_name(target);
            xot.new_processing_instruction(target, (!data.is_empty()).then_some(data))
        }))
    }

    pub fn create_document_fragment(&self) -> Node {
        self.create(|xot| xot.new_document())
    }

    /// Copies `node` (and its subtree when `deep`) into this document.
    ///
    /// The copy is not attached anywhere. Importing a document node yields
    /// a fragment holding copies of its children. Namespace bindings the
    /// copy relied on in its old place are declared on it.
    pub fn import_node(&self, node: &Node, deep: bool) -> Result<Node, FluentError> {
        let source = node.owner_document();
        if source.ptr_eq(self) {
            return Ok(node.clone_node(deep));
        }
        let id = {
            let from = source.store();
            let mut to = self.store_mut();
            let copy = copy_across(from.xot(), node.id(), to.xot_mut(), deep)?;
            for (prefix, ns) in inherited_bindings(from.xot(), node.id()) {
                let xot = to.xot_mut();
                let prefix = xot.add_prefix(from.xot().prefix_str(prefix));
                let ns = xot.add_namespace(from.xot().namespace_str(ns));
                if !xot.namespaces(copy).contains_key(prefix) {
                    xot.namespaces_mut(copy).insert(prefix, ns);
                }
            }
            to.track(copy);
            copy
        };
        Ok(self.node(id))
    }

    /// A new, independent document with the same content.
    pub fn deep_copy(&self) -> Result<Document, FluentError> {
        let copy = Document::new();
        {
            let from = self.store();
            let mut to = copy.store_mut();
            let root = to.root;
            for child in from.xot().children(from.root) {
                let node = copy_across(from.xot(), child, to.xot_mut(), true)?;
                to.xot_mut().append(root, node)?;
            }
            to.doctype = from.doctype.clone();
        }
        Ok(copy)
    }

    /// Swaps in the content of `other`, keeping this handle's identity.
    ///
    /// Node handles taken from this document before the call keep pointing
    /// at the old, now detached, content.
    pub fn replace_contents(&self, other: &Document) -> Result<(), FluentError> {
        if self.ptr_eq(other) {
            return Ok(());
        }
        self.collect_garbage();
        let from = other.store();
        let mut to = self.store_mut();
        let root = to.root;
        let old: Vec<xot::Node> = to.xot().children(root).collect();
        for node in old {
            to.xot_mut().detach(node)?;
            to.track(node);
        }
        for child in from.xot().children(from.root) {
            let node = copy_across(from.xot(), child, to.xot_mut(), true)?;
            to.xot_mut().append(root, node)?;
        }
        to.doctype = from.doctype.clone();
        Ok(())
    }

    /// Parses `markup` into a detached fragment of this document.
    ///
    /// Prefixes resolve against the declarations in scope at `context`, or at
    /// the document element when no context is given.
    pub fn parse_fragment(
        &self,
        markup: &str,
        context: Option<&Node>,
        options: ParseOptions,
    ) -> Result<Node, FluentError> {
        let bindings = match context {
            Some(node) => node.in_scope_namespaces(),
            None => self
                .document_element()
                .map(|element| element.in_scope_namespaces())
                .unwrap_or_default(),
        };
        let fragment = self.create_document_fragment();
        {
            let mut store = self.store_mut();
            let xot = store.xot_mut();
            if options.html {
                html::parse_into(xot, fragment.id(), markup).map_err(FluentError::FragmentParse)?;
            } else {
                let wrapped = wrap_fragment(markup, &bindings);
                let parsed = xot
                    .parse(&wrapped)
                    .map_err(|err| FluentError::FragmentParse(err.to_string()))?;
                let moved = move_children(xot, parsed, fragment.id());
                xot.remove(parsed)?;
                moved?;
            }
            if !options.preserve_whitespace {
                strip_whitespace_text(xot, fragment.id())?;
            }
        }
        Ok(fragment)
    }

    /// Serializes the whole document as XML with a declaration line.
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\"?>\n");
        for child in self.root().children() {
            out.push_str(&child.to_xml());
            out.push('\n');
        }
        out
    }

    /// Serializes the whole document as HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        if let Some(doctype) = self.store().doctype.as_deref() {
            out.push_str("<!DOCTYPE ");
            out.push_str(doctype);
            out.push_str(">\n");
        }
        for child in self.root().children() {
            out.push_str(&child.to_html());
            out.push('\n');
        }
        out
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Document {}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("address", &Rc::as_ptr(&self.inner))
            .finish()
    }
}

fn is_name_start_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic() || (!c.is_ascii() && c.is_alphabetic())
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || c.is_ascii_digit()
        || c == '-'
        || c == '.'
        || c == '\u{B7}'
        || (!c.is_ascii() && c.is_alphanumeric())
}

/// Index of the first character that makes `name` an invalid NCName.
fn invalid_ncname_offset(name: &str) -> Option<usize> {
    let mut chars = name.char_indices();
    match chars.next() {
        None => return Some(0),
        Some((_, c)) if !is_name_start_char(c) => return Some(0),
        _ => {}
    }
    chars.find(|(_, c)| !is_name_char(*c)).map(|(index, _)| index)
}

pub(crate) fn is_ncname(name: &str) -> bool {
    invalid_ncname_offset(name).is_none()
}

/// Splits `prefix:local` after validating both parts.
pub(crate) fn split_qname(qname: &str) -> Result<(Option<&str>, &str), FluentError> {
    let invalid = |reason: String| FluentError::InvalidQName {
        name: qname.to_string(),
        reason,
    };
    if qname.is_empty() {
        return Err(invalid("name is empty".to_string()));
    }
    let (prefix, local) = match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    };
    if let Some(offset) = prefix.and_then(invalid_ncname_offset) {
        return Err(invalid(format!("invalid character at offset {offset}")));
    }
    let local_start = prefix.map_or(0, |p| p.len() + 1);
    if let Some(offset) = invalid_ncname_offset(local) {
        return Err(invalid(format!(
            "invalid character at offset {}",
            local_start + offset
        )));
    }
    Ok((prefix, local))
}

/// Bindings in scope at the parent of `node` that its subtree uses but does
/// not declare itself.
fn inherited_bindings(xot: &Xot, node: xot::Node) -> Vec<(PrefixId, NamespaceId)> {
    if !xot.is_element(node) {
        return Vec::new();
    }
    let Some(parent) = xot.parent(node) else {
        return Vec::new();
    };
    let needed = xot.unresolved_namespaces(node);
    let own = xot.namespaces(node);
    xot.namespaces_in_scope(parent)
        .filter(|(prefix, ns)| {
            *ns != xot.xml_namespace()
                && *ns != xot.no_namespace()
                && needed.contains(ns)
                && !own.contains_key(*prefix)
        })
        .collect()
}

/// Declares on `node` the inherited bindings it needs, so it keeps its
/// names when moved away from its ancestors.
fn carry_prefixes(xot: &mut Xot, node: xot::Node) {
    for (prefix, ns) in inherited_bindings(xot, node) {
        xot.namespaces_mut(node).insert(prefix, ns);
    }
}

/// Tidies the declarations of a subtree that was just attached: bindings
/// the new ancestors already provide are dropped, and elements in no
/// namespace undeclare an inherited default namespace.
fn settle_namespaces(xot: &mut Xot, node: xot::Node) {
    let elements: Vec<xot::Node> = xot
        .descendants(node)
        .filter(|id| xot.is_element(*id))
        .collect();
    let empty = xot.empty_prefix();
    let no_namespace = xot.no_namespace();
    for element in elements {
        let Some(parent) = xot.parent(element) else {
            continue;
        };
        let declared: Vec<(PrefixId, NamespaceId)> = xot
            .namespaces(element)
            .iter()
            .map(|(prefix, ns)| (prefix, *ns))
            .collect();
        for (prefix, ns) in declared {
            let inherited = xot
                .namespace_for_prefix(parent, prefix)
                .unwrap_or(no_namespace);
            if inherited == ns {
                xot.namespaces_mut(element).remove(prefix);
            }
        }
        let in_no_namespace = xot
            .element(element)
            .is_some_and(|data| xot.namespace_for_name(data.name()) == no_namespace);
        if in_no_namespace && xot.namespace_for_prefix(element, empty).is_some() {
            xot.namespaces_mut(element).insert(empty, no_namespace);
        }
    }
}

/// Detaches `node` from its parent, keeping the bindings it needs.
fn take_out(xot: &mut Xot, node: xot::Node) -> Result<(), xot::Error> {
    if xot.parent(node).is_none() {
        return Ok(());
    }
    carry_prefixes(xot, node);
    xot.detach(node)
}

fn move_children(xot: &mut Xot, parsed: xot::Node, target: xot::Node) -> Result<(), FluentError> {
    let wrapper = xot.document_element(parsed)?;
    let children: Vec<xot::Node> = xot.children(wrapper).collect();
    for child in children {
        take_out(xot, child)?;
        xot.append(target, child)?;
    }
    Ok(())
}

/// Encloses fragment markup in an element declaring `bindings`.
fn wrap_fragment(markup: &str, bindings: &[(Option<String>, String)]) -> String {
    let mut wrapped = String::from("<fragment");
    for (prefix, uri) in bindings {
        match prefix {
            Some(prefix) => wrapped.push_str(&format!(" xmlns:{prefix}=\"")),
            None => wrapped.push_str(" xmlns=\""),
        }
        wrapped.push_str(&quick_xml::escape::escape(uri.as_str()));
        wrapped.push('"');
    }
    wrapped.push('>');
    wrapped.push_str(markup);
    wrapped.push_str("</fragment>");
    wrapped
}

fn strip_whitespace_text(xot: &mut Xot, node: xot::Node) -> Result<(), xot::Error> {
    let blank: Vec<xot::Node> = xot
        .descendants(node)
        .filter(|id| {
            xot.text_str(*id)
                .is_some_and(|text| text.chars().all(|c| matches!(c, ' ' | '\t' | '\r' | '\n')))
        })
        .collect();
    for id in blank {
        xot.remove(id)?;
    }
    Ok(())
}

/// Copies a node of one arena into another, unattached.
fn copy_across(
    from: &Xot,
    source: xot::Node,
    to: &mut Xot,
    deep: bool,
) -> Result<xot::Node, xot::Error> {
    if !deep {
        return Ok(copy_value(from, source, to).unwrap_or_else(|| to.new_document()));
    }
    let mut top = None;
    let mut open: Vec<Option<xot::Node>> = Vec::new();
    for edge in from.traverse(source) {
        match edge {
            NodeEdge::Start(node) => {
                let copy = copy_value(from, node, to);
                match (copy, open.last()) {
                    (Some(copy), Some(Some(parent))) => to.append(*parent, copy)?,
                    (Some(copy), None) => top = Some(copy),
                    _ => {}
                }
                open.push(copy);
            }
            NodeEdge::End(_) => {
                open.pop();
            }
        }
    }
    Ok(top.unwrap_or_else(|| to.new_document()))
}

fn copy_value(from: &Xot, node: xot::Node, to: &mut Xot) -> Option<xot::Node> {
    let copy = match from.value(node) {
        Value::Document => to.new_document(),
        Value::Element(element) => {
            let name = copy_name(from, element.name(), to);
            let copy = to.new_element(name);
            for (prefix, ns) in from.namespaces(node).iter() {
                let prefix = to.add_prefix(from.prefix_str(prefix));
                let ns = to.add_namespace(from.namespace_str(*ns));
                to.namespaces_mut(copy).insert(prefix, ns);
            }
            for (name, value) in from.attributes(node).iter() {
                let name = copy_name(from, name, to);
                to.attributes_mut(copy).insert(name, value.clone());
            }
            copy
        }
        Value::Text(text) => to.new_text(text.get()),
        Value::Comment(comment) => to.new_comment(comment.get()),
        Value::ProcessingInstruction(instruction) => {
            let target = copy_name(from, instruction.target(), to);
            to.new_processing_instruction(target, instruction.data())
        }
        Value::Attribute(_) | Value::Namespace(_) => return None,
    };
    Some(copy)
}

fn copy_name(from: &Xot, name: xot::NameId, to: &mut Xot) -> xot::NameId {
    let (local, uri) = from.name_ns_str(name);
    let ns = to.add_namespace(uri);
    to.add_name_ns(local, ns)
}
