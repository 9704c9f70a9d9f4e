use std::fmt;
use std::hash::{Hash, Hasher};

use xot::{NamespaceId, ValueType, Xot};

use super::{
    inherited_bindings, settle_namespaces, split_qname, take_out, Document, Store,
    XMLNS_NAMESPACE,
};
use crate::error::FluentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Document,
    DocumentFragment,
    Element,
    Text,
    Comment,
    ProcessingInstruction,
    /// Attribute and namespace nodes; handles never point at them.
    Attribute,
}

/// An attribute as seen through [`Node::attributes`].
///
/// Namespace declarations are listed as attributes too: they live in the
/// `http://www.w3.org/2000/xmlns/` namespace, either as `xmlns` (default
/// namespace) or `xmlns:prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
    pub value: String,
}

impl Attribute {
    pub fn namespace_declaration(prefix: Option<&str>, uri: &str) -> Self {
        let (prefix, local_name) = match prefix {
            Some(prefix) => (Some("xmlns".to_string()), prefix.to_string()),
            None => (None, "xmlns".to_string()),
        };
        Attribute {
            prefix,
            local_name,
            namespace: Some(XMLNS_NAMESPACE.to_string()),
            value: uri.to_string(),
        }
    }

    pub fn qualified_name(&self) -> String {
        qualified(self.prefix.as_deref(), &self.local_name)
    }

    pub fn is_namespace_declaration(&self) -> bool {
        self.namespace.as_deref() == Some(XMLNS_NAMESPACE)
    }

    /// The prefix bound by this declaration. The outer `None` means "not a
    /// declaration", the inner `None` the default namespace.
    pub fn declared_prefix(&self) -> Option<Option<&str>> {
        if !self.is_namespace_declaration() {
            return None;
        }
        match self.prefix.as_deref() {
            Some("xmlns") => Some(Some(self.local_name.as_str())),
            _ => Some(None),
        }
    }
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

/// The prefix an element name is written with: `None` when its namespace
/// is the default one (or it has none).
fn element_prefix(xot: &Xot, element: xot::Node, ns: NamespaceId) -> Option<String> {
    if ns == xot.no_namespace() {
        return None;
    }
    let mut found = None;
    for (prefix, bound) in xot.namespaces_in_scope(element) {
        if bound != ns {
            continue;
        }
        if prefix == xot.empty_prefix() {
            return None;
        }
        found.get_or_insert(prefix);
    }
    found.map(|prefix| xot.prefix_str(prefix).to_string())
}

/// Attributes in a namespace always need a non-empty prefix.
fn attribute_prefix(xot: &Xot, element: xot::Node, ns: NamespaceId) -> Option<String> {
    if ns == xot.no_namespace() {
        return None;
    }
    xot.namespaces_in_scope(element)
        .find(|(prefix, bound)| *bound == ns && *prefix != xot.empty_prefix())
        .map(|(prefix, _)| xot.prefix_str(prefix).to_string())
}

/// `ns0`, `ns1`, ...: the first one not bound at `element`.
fn fresh_prefix(xot: &Xot, element: xot::Node) -> String {
    (0..)
        .map(|n| format!("ns{n}"))
        .find(|candidate| {
            xot.prefix(candidate)
                .map_or(true, |prefix| xot.namespace_for_prefix(element, prefix).is_none())
        })
        .unwrap_or_default()
}

/// A handle to one node of a [`Document`].
///
/// Handles are counted by their document: a detached subtree is only freed
/// once no handle points into it.
pub struct Node {
    document: Document,
    id: xot::Node,
}

impl Node {
    pub(crate) fn new(document: Document, id: xot::Node) -> Self {
        document.retain(id);
        Node { document, id }
    }

    pub(crate) fn id(&self) -> xot::Node {
        self.id
    }

    pub fn owner_document(&self) -> Document {
        self.document.clone()
    }

    pub fn node_type(&self) -> NodeType {
        let store = self.document.store();
        match store.xot().value_type(self.id) {
            ValueType::Document if self.id == store.root() => NodeType::Document,
            ValueType::Document => NodeType::DocumentFragment,
            ValueType::Element => NodeType::Element,
            ValueType::Text => NodeType::Text,
            ValueType::Comment => NodeType::Comment,
            ValueType::ProcessingInstruction => NodeType::ProcessingInstruction,
            ValueType::Attribute | ValueType::Namespace => NodeType::Attribute,
        }
    }

    pub fn is_element(&self) -> bool {
        self.document.store().xot().is_element(self.id)
    }

    pub fn is_text(&self) -> bool {
        self.document.store().xot().is_text(self.id)
    }

    /// A text node made of spaces, tabs and line breaks only.
    pub fn is_whitespace_text(&self) -> bool {
        let store = self.document.store();
        store
            .xot()
            .text_str(self.id)
            .is_some_and(|text| text.chars().all(|c| matches!(c, ' ' | '\t' | '\r' | '\n')))
    }

    /// Whether the node may be a member of a selection: an element, or a
    /// text node with some non-whitespace content.
    pub fn is_selectable(&self) -> bool {
        self.is_element() || (self.is_text() && !self.is_whitespace_text())
    }

    /// The DOM `nodeName`.
    pub fn node_name(&self) -> String {
        match self.node_type() {
            NodeType::Document => "#document".to_string(),
            NodeType::DocumentFragment => "#document-fragment".to_string(),
            NodeType::Element => qualified(
                self.prefix().as_deref(),
                &self.local_name().unwrap_or_default(),
            ),
            NodeType::Text => "#text".to_string(),
            NodeType::Comment => "#comment".to_string(),
            NodeType::ProcessingInstruction => {
                let store = self.document.store();
                let xot = store.xot();
                xot.processing_instruction(self.id)
                    .map(|instruction| xot.local_name_str(instruction.target()).to_string())
                    .unwrap_or_default()
            }
            NodeType::Attribute => "#attribute".to_string(),
        }
    }

    pub fn local_name(&self) -> Option<String> {
        let store = self.document.store();
        let xot = store.xot();
        let element = xot.element(self.id)?;
        Some(xot.local_name_str(element.name()).to_string())
    }

    pub fn prefix(&self) -> Option<String> {
        let store = self.document.store();
        let xot = store.xot();
        let element = xot.element(self.id)?;
        element_prefix(xot, self.id, xot.namespace_for_name(element.name()))
    }

    pub fn namespace_uri(&self) -> Option<String> {
        let store = self.document.store();
        let xot = store.xot();
        let element = xot.element(self.id)?;
        let uri = xot.uri_str(element.name());
        (!uri.is_empty()).then(|| uri.to_string())
    }

    pub fn text_content(&self) -> String {
        self.document.store().xot().string_value(self.id)
    }

    /// Replaces the text of a text, comment or processing instruction node,
    /// or all children of an element with one text node.
    pub fn set_text_content(&self, text: &str) -> Result<(), FluentError> {
        let mut store = self.document.store_mut();
        let xot = store.xot_mut();
        match xot.value_type(self.id) {
            ValueType::Text => {
                if let Some(existing) = xot.text_mut(self.id) {
                    existing.set(text);
                }
            }
            ValueType::Comment => {
                if let Some(comment) = xot.comment_mut(self.id) {
                    comment
                        .set(text)
                        .map_err(|err| FluentError::InvalidArgument(err.to_string()))?;
                }
            }
            ValueType::ProcessingInstruction => {
                if let Some(instruction) = xot.processing_instruction_mut(self.id) {
                    instruction.set_data(Some(text));
                }
            }
            ValueType::Element | ValueType::Document => {
                let children: Vec<xot::Node> = xot.children(self.id).collect();
                for child in children {
                    take_out(store.xot_mut(), child)?;
                    store.track(child);
                }
                if !text.is_empty() {
                    let xot = store.xot_mut();
                    let node = xot.new_text(text);
                    xot.append(self.id, node)?;
                }
            }
            ValueType::Attribute | ValueType::Namespace => {}
        }
        Ok(())
    }

    fn wrap(&self, id: Option<xot::Node>) -> Option<Node> {
        id.map(|id| self.document.node(id))
    }

    pub fn parent(&self) -> Option<Node> {
        let parent = self.document.store().xot().parent(self.id);
        self.wrap(parent)
    }

    pub fn children(&self) -> Vec<Node> {
        let ids: Vec<xot::Node> = self.document.store().xot().children(self.id).collect();
        ids.into_iter().map(|id| self.document.node(id)).collect()
    }

    pub fn first_child(&self) -> Option<Node> {
        let id = self.document.store().xot().first_child(self.id);
        self.wrap(id)
    }

    pub fn last_child(&self) -> Option<Node> {
        let id = self.document.store().xot().last_child(self.id);
        self.wrap(id)
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let id = self.document.store().xot().next_sibling(self.id);
        self.wrap(id)
    }

    pub fn previous_sibling(&self) -> Option<Node> {
        let id = self.document.store().xot().previous_sibling(self.id);
        self.wrap(id)
    }

    /// All attributes, namespace declarations first.
    pub fn attributes(&self) -> Vec<Attribute> {
        let store = self.document.store();
        let xot = store.xot();
        if !xot.is_element(self.id) {
            return Vec::new();
        }
        let mut attributes: Vec<Attribute> = xot
            .namespaces(self.id)
            .iter()
            .map(|(prefix, ns)| {
                let prefix = (prefix != xot.empty_prefix()).then(|| xot.prefix_str(prefix));
                Attribute::namespace_declaration(prefix, xot.namespace_str(*ns))
            })
            .collect();
        for (name, value) in xot.attributes(self.id).iter() {
            let ns = xot.namespace_for_name(name);
            let uri = xot.namespace_str(ns);
            attributes.push(Attribute {
                prefix: attribute_prefix(xot, self.id, ns),
                local_name: xot.local_name_str(name).to_string(),
                namespace: (!uri.is_empty()).then(|| uri.to_string()),
                value: value.clone(),
            });
        }
        attributes
    }

    /// Value of the attribute with the qualified name `name`.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes()
            .into_iter()
            .find(|attribute| attribute.qualified_name() == name)
            .map(|attribute| attribute.value)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    fn element_only(&self, xot: &Xot) -> Result<(), FluentError> {
        if xot.is_element(self.id) {
            Ok(())
        } else {
            Err(FluentError::InvalidArgument(
                "attributes can only be set on elements".to_string(),
            ))
        }
    }

    /// Sets an attribute by qualified name.
    ///
    /// `xmlns` and `xmlns:*` names are stored as namespace declarations. A
    /// prefixed name resolves its prefix in the scope of this element.
    pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), FluentError> {
        let (prefix, local) = split_qname(name)?;
        let mut store = self.document.store_mut();
        let xot = store.xot_mut();
        self.element_only(xot)?;
        match (prefix, local) {
            (None, "xmlns") => {
                let ns = xot.add_namespace(value);
                let empty = xot.empty_prefix();
                xot.namespaces_mut(self.id).insert(empty, ns);
            }
            (Some("xmlns"), declared) => {
                if value.is_empty() {
                    return Err(FluentError::InvalidQName {
                        name: name.to_string(),
                        reason: "a prefix cannot be bound to an empty namespace".to_string(),
                    });
                }
                let ns = xot.add_namespace(value);
                let declared = xot.add_prefix(declared);
                xot.namespaces_mut(self.id).insert(declared, ns);
            }
            (None, local) => {
                let name = xot.add_name(local);
                xot.attributes_mut(self.id).insert(name, value.to_string());
            }
            (Some(prefix), local) => {
                let ns = xot
                    .prefix(prefix)
                    .and_then(|id| xot.namespace_for_prefix(self.id, id))
                    .ok_or_else(|| FluentError::InvalidQName {
                        name: name.to_string(),
                        reason: format!("prefix {prefix} is not declared"),
                    })?;
                let name = xot.add_name_ns(local, ns);
                xot.attributes_mut(self.id).insert(name, value.to_string());
            }
        }
        Ok(())
    }

    /// Sets an attribute in `namespace` named by the qualified name `qname`,
    /// declaring a prefix on this element when the namespace has none in
    /// scope.
    pub fn set_attribute_ns(
        &self,
        namespace: Option<&str>,
        qname: &str,
        value: &str,
    ) -> Result<(), FluentError> {
        let (prefix, local) = split_qname(qname)?;
        let namespace = namespace.filter(|uri| !uri.is_empty());
        if namespace == Some(XMLNS_NAMESPACE) {
            return self.set_attribute(qname, value);
        }
        if prefix.is_some() && namespace.is_none() {
            return Err(FluentError::InvalidQName {
                name: qname.to_string(),
                reason: "a prefixed name requires a namespace".to_string(),
            });
        }
        let Some(uri) = namespace else {
            return self.set_attribute(local, value);
        };
        let mut store = self.document.store_mut();
        let xot = store.xot_mut();
        self.element_only(xot)?;
        let ns = xot.add_namespace(uri);
        let name = xot.add_name_ns(local, ns);
        xot.attributes_mut(self.id).insert(name, value.to_string());
        if ns == xot.xml_namespace() {
            return Ok(());
        }
        // Some(None): the requested prefix is already bound to `ns`.
        let requested = prefix.and_then(|prefix| {
            let bound = xot
                .prefix(prefix)
                .and_then(|id| xot.namespace_for_prefix(self.id, id));
            match bound {
                Some(bound) if bound == ns => Some(None),
                Some(_) => None,
                None => Some(Some(prefix.to_string())),
            }
        });
        let declare = match requested {
            Some(declare) => declare,
            None if attribute_prefix(xot, self.id, ns).is_some() => None,
            None => Some(fresh_prefix(xot, self.id)),
        };
        if let Some(declare) = declare {
            let declare = xot.add_prefix(&declare);
            xot.namespaces_mut(self.id).insert(declare, ns);
        }
        Ok(())
    }

    /// Removes the attribute with the qualified name `name`. Returns whether
    /// one existed.
    pub fn remove_attribute(&self, name: &str) -> bool {
        let Ok((prefix, local)) = split_qname(name) else {
            return false;
        };
        let mut store = self.document.store_mut();
        let xot = store.xot_mut();
        if !xot.is_element(self.id) {
            return false;
        }
        match (prefix, local) {
            (None, "xmlns") => {
                let empty = xot.empty_prefix();
                xot.namespaces_mut(self.id).remove(empty).is_some()
            }
            (Some("xmlns"), declared) => match xot.prefix(declared) {
                Some(declared) => xot.namespaces_mut(self.id).remove(declared).is_some(),
                None => false,
            },
            _ => {
                let found = xot.attributes(self.id).keys().find(|key| {
                    let ns = xot.namespace_for_name(*key);
                    qualified(
                        attribute_prefix(xot, self.id, ns).as_deref(),
                        xot.local_name_str(*key),
                    ) == name
                });
                match found {
                    Some(key) => xot.attributes_mut(self.id).remove(key).is_some(),
                    None => false,
                }
            }
        }
    }

    /// Resolves a prefix (`None` for the default namespace) in the scope of
    /// this node.
    pub fn lookup_namespace_uri(&self, prefix: Option<&str>) -> Option<String> {
        let store = self.document.store();
        let xot = store.xot();
        let prefix = match prefix {
            Some(prefix) => xot.prefix(prefix)?,
            None => xot.empty_prefix(),
        };
        let ns = xot.namespace_for_prefix(self.id, prefix)?;
        Some(xot.namespace_str(ns).to_string())
    }

    /// Prefix bindings visible at this node, in the order they were first
    /// introduced walking down from the outermost element.
    ///
    /// An undeclared default namespace (`xmlns=""`) appears with an empty URI.
    pub fn in_scope_namespaces(&self) -> Vec<(Option<String>, String)> {
        let store = self.document.store();
        let xot = store.xot();
        let chain: Vec<xot::Node> = xot
            .ancestors(self.id)
            .filter(|id| xot.is_element(*id))
            .collect();

        let mut bindings: Vec<(Option<String>, String)> = Vec::new();
        for element in chain.into_iter().rev() {
            for (prefix, ns) in xot.namespaces(element).iter() {
                let prefix =
                    (prefix != xot.empty_prefix()).then(|| xot.prefix_str(prefix).to_string());
                let uri = xot.namespace_str(*ns).to_string();
                match bindings.iter_mut().find(|(bound, _)| *bound == prefix) {
                    Some((_, existing)) => *existing = uri,
                    None => bindings.push((prefix, uri)),
                }
            }
        }
        bindings
    }

    /// Inserts `child` as the last child of this node.
    ///
    /// Fragments are emptied into this node. The child must belong to the
    /// same document; use [`Document::import_node`] first otherwise.
    pub fn append_child(&self, child: &Node) -> Result<(), FluentError> {
        self.insert_before(child, None)
    }

    /// Inserts `child` before `reference`, or last when `reference` is `None`.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) -> Result<(), FluentError> {
        if child.document != self.document {
            return Err(FluentError::OutOfBounds);
        }
        self.document.collect_garbage();
        let mut store = self.document.store_mut();
        let root = store.root();
        let xot = store.xot_mut();
        if !matches!(
            xot.value_type(self.id),
            ValueType::Element | ValueType::Document
        ) {
            return Err(FluentError::Hierarchy(
                "this node type cannot have children".to_string(),
            ));
        }
        if let Some(reference) = reference {
            if reference.document != self.document || xot.parent(reference.id) != Some(self.id) {
                return Err(FluentError::Hierarchy(
                    "the reference node is not a child of this node".to_string(),
                ));
            }
        }

        let incoming: Vec<xot::Node> = match xot.value_type(child.id) {
            ValueType::Document if child.id == root => {
                return Err(FluentError::Hierarchy(
                    "a document cannot be inserted".to_string(),
                ))
            }
            ValueType::Document => xot.children(child.id).collect(),
            _ => vec![child.id],
        };
        if self.id == root {
            let mut elements = incoming.iter().filter(|id| xot.is_element(**id)).count();
            if let Some(existing) = xot.children(root).find(|id| xot.is_element(*id)) {
                if !incoming.contains(&existing) {
                    elements += 1;
                }
            }
            if elements > 1 {
                return Err(FluentError::Hierarchy(
                    "a document can only have one document element".to_string(),
                ));
            }
            if incoming.iter().any(|id| xot.is_text(*id)) {
                return Err(FluentError::Hierarchy(
                    "text cannot be inserted at document level".to_string(),
                ));
            }
        }
        if xot.ancestors(self.id).any(|ancestor| ancestor == child.id) {
            return Err(FluentError::Hierarchy(
                "a node cannot be inserted into its own subtree".to_string(),
            ));
        }
        if reference.is_some_and(|reference| incoming.contains(&reference.id)) {
            return Ok(());
        }
        for id in incoming {
            take_out(xot, id)?;
            match reference {
                Some(reference) => xot.insert_before(reference.id, id)?,
                None => xot.append(self.id, id)?,
            }
            settle_namespaces(xot, id);
        }
        Ok(())
    }

    /// Detaches this node from its parent. It keeps its owner document and
    /// the namespace bindings it needs.
    pub fn remove(&self) {
        self.document.collect_garbage();
        let mut store = self.document.store_mut();
        if store.xot().parent(self.id).is_none() {
            return;
        }
        match take_out(store.xot_mut(), self.id) {
            Ok(()) => store.track(self.id),
            Err(err) => log::warn!("Failed to detach node: {err}"),
        }
    }

    /// A copy of this node in the same document, not attached anywhere.
    pub fn clone_node(&self, deep: bool) -> Node {
        let id = {
            let mut store = self.document.store_mut();
            let xot = store.xot_mut();
            let copy = if deep {
                xot.clone_node(self.id)
            } else {
                shallow_clone(xot, self.id)
            };
            for (prefix, ns) in inherited_bindings(xot, self.id) {
                xot.namespaces_mut(copy).insert(prefix, ns);
            }
            store.track(copy);
            copy
        };
        self.document.node(id)
    }

    /// Outer XML of the node, with the namespace declarations it needs.
    pub fn to_xml(&self) -> String {
        match self.node_type() {
            NodeType::Document => self.document.to_xml(),
            NodeType::DocumentFragment => self.children().iter().map(Node::to_xml).collect(),
            _ => serialize_standalone(&mut self.document.store_mut(), self.id, false),
        }
    }

    /// Outer HTML of the node.
    pub fn to_html(&self) -> String {
        match self.node_type() {
            NodeType::Document => self.document.to_html(),
            NodeType::DocumentFragment => self.children().iter().map(Node::to_html).collect(),
            _ => serialize_standalone(&mut self.document.store_mut(), self.id, true),
        }
    }
}

fn shallow_clone(xot: &mut Xot, node: xot::Node) -> xot::Node {
    let Some(name) = xot.element(node).map(|element| element.name()) else {
        return match xot.value_type(node) {
            ValueType::Document => xot.new_document(),
            _ => xot.clone_node(node),
        };
    };
    let copy = xot.new_element(name);
    let namespaces = xot.namespaces(node).to_vec();
    let attributes = xot.attributes(node).to_vec();
    for (prefix, ns) in namespaces {
        xot.namespaces_mut(copy).insert(prefix, ns);
    }
    for (name, value) in attributes {
        xot.attributes_mut(copy).insert(name, value);
    }
    copy
}

/// Serializes a copy of `node` that declares everything it inherits, so
/// the output is well-formed on its own.
fn serialize_standalone(store: &mut Store, node: xot::Node, html: bool) -> String {
    const HTML5_DOCTYPE: &str = "<!DOCTYPE html>";

    let xot = store.xot_mut();
    let bindings = inherited_bindings(xot, node);
    let copy = xot.clone_node(node);
    if xot.is_element(copy) {
        for (prefix, ns) in bindings {
            xot.namespaces_mut(copy).insert(prefix, ns);
        }
        let empty = xot.empty_prefix();
        let no_namespace = xot.no_namespace();
        if xot.namespaces(copy).get(empty) == Some(&no_namespace) {
            xot.namespaces_mut(copy).remove(empty);
        }
        if let Err(err) = xot.create_missing_prefixes(copy) {
            log::warn!("Failed to declare missing prefixes: {err}");
        }
    }
    let written = if html {
        xot.html5()
            .to_string(copy)
            .map(|out| match out.strip_prefix(HTML5_DOCTYPE) {
                Some(rest) => rest.to_string(),
                None => out,
            })
    } else {
        xot.to_string(copy)
    };
    if let Err(err) = xot.remove(copy) {
        log::warn!("Failed to free a serialization copy: {err}");
    }
    written.unwrap_or_else(|err| {
        log::warn!("Failed to serialize node: {err}");
        String::new()
    })
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Node::new(self.document.clone(), self.id)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.document.release(self.id);
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.document == other.document
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.node_name())
            .field("id", &self.id)
            .finish()
    }
}
