//! The ordered, document-bound node list behind every selection.

use std::collections::HashSet;
use std::ops::Index;

use crate::dom::{Document, Node, NodeId};
use crate::error::FluentError;

/// An ordered list of nodes that all belong to one [`Document`].
///
/// Only elements and non-whitespace text nodes are admitted; anything else
/// handed to [`NodeSet::push`] is skipped. There is no indexed write access.
/// Once [`frozen`](NodeSet::freeze), every push fails with
/// [`FluentError::ReadOnly`].
#[derive(Debug, Clone)]
pub struct NodeSet {
    document: Document,
    nodes: Vec<Node>,
    members: HashSet<NodeId>,
    include_text: bool,
    frozen: bool,
}

impl NodeSet {
    pub fn new(document: Document) -> Self {
        NodeSet {
            document,
            nodes: Vec::new(),
            members: HashSet::new(),
            include_text: true,
            frozen: false,
        }
    }

    /// Only admit elements.
    pub fn elements_only(mut self) -> Self {
        self.include_text = false;
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn admits(&self, node: &Node) -> bool {
        node.is_element() || (self.include_text && node.is_selectable())
    }

    /// Appends every admissible node. Fails on the first node owned by a
    /// different document; nodes pushed before it stay in the set.
    pub fn push<I>(&mut self, nodes: I, unique: bool) -> Result<(), FluentError>
    where
        I: IntoIterator<Item = Node>,
    {
        if self.frozen {
            return Err(FluentError::ReadOnly);
        }
        for node in nodes {
            if !self.admits(&node) {
                continue;
            }
            if !node.owner_document().ptr_eq(&self.document) {
                return Err(FluentError::OutOfBounds);
            }
            if unique && self.members.contains(&node.id()) {
                continue;
            }
            self.members.insert(node.id());
            self.nodes.push(node);
        }
        Ok(())
    }

    pub fn push_node(&mut self, node: &Node, unique: bool) -> Result<(), FluentError> {
        self.push(std::iter::once(node.clone()), unique)
    }

    /// Makes the set read-only.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The node at `index`, or `None` when out of range.
    pub fn item(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: &Node) -> bool {
        node.owner_document().ptr_eq(&self.document) && self.members.contains(&node.id())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn as_slice(&self) -> &[Node] {
        &self.nodes
    }

    pub fn to_vec(&self) -> Vec<Node> {
        self.nodes.clone()
    }
}

impl Index<usize> for NodeSet {
    type Output = Node;

    fn index(&self, index: usize) -> &Node {
        &self.nodes[index]
    }
}

impl<'a> IntoIterator for &'a NodeSet {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
