//! Mutation verbs on [`Selection`].
//!
//! Every verb returns a selection derived from the receiver holding the
//! nodes it produced. Content is resolved once; the first target receives
//! the resolved nodes and every further target a deep clone of them.

use crate::content::{Content, ContentResolver};
use crate::content_type::ContentType;
use crate::dom::{Document, Node, ParseOptions};
use crate::error::FluentError;
use crate::selection::Selection;

/// Where [`Selection::insert`] puts new content relative to each target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    Before,
    After,
    Prepend,
    #[default]
    Append,
}

impl Selection {
    fn resolver<'d>(&self, document: &'d Document, context: Option<&Node>) -> ContentResolver<'d> {
        let options = match self.content_type() {
            ContentType::Html => ParseOptions::html(),
            _ => ParseOptions::xml(),
        };
        let resolver = ContentResolver::new(document).with_parse_options(options);
        match context {
            Some(node) => resolver.with_context(node),
            None => resolver,
        }
    }

    fn distribute<F>(
        &self,
        targets: &[Node],
        content: Content,
        mut insert: F,
    ) -> Result<Selection, FluentError>
    where
        F: FnMut(&Node, &[Node]) -> Result<(), FluentError>,
    {
        let Some(first) = targets.first() else {
            return Ok(self.spawn());
        };
        let document = self.document();
        let context = if first.is_element() { Some(first.clone()) } else { first.parent() };
        let nodes = self.resolver(&document, context.as_ref()).resolve(content)?;

        let mut inserted = Vec::new();
        for (index, target) in targets.iter().enumerate() {
            let batch: Vec<Node> = if index == 0 {
                nodes.clone()
            } else {
                nodes.iter().map(|node| node.clone_node(true)).collect()
            };
            insert(target, &batch)?;
            inserted.extend(batch);
        }
        self.spawn_with(inserted)
    }

    fn elements(&self) -> Vec<Node> {
        self.iter().filter(|node| node.is_element()).cloned().collect()
    }

    fn attached(&self) -> Vec<Node> {
        self.iter().filter(|node| node.parent().is_some()).cloned().collect()
    }

    /// Inserts `content` as the last children of every selected element.
    pub fn append(&self, content: impl Into<Content>) -> Result<Selection, FluentError> {
        self.distribute(&self.elements(), content.into(), |target, nodes| {
            nodes.iter().try_for_each(|node| target.append_child(node))
        })
    }

    /// Inserts `content` as the first children of every selected element.
    pub fn prepend(&self, content: impl Into<Content>) -> Result<Selection, FluentError> {
        self.distribute(&self.elements(), content.into(), |target, nodes| {
            let reference = target.first_child();
            nodes
                .iter()
                .try_for_each(|node| target.insert_before(node, reference.as_ref()))
        })
    }

    pub fn before(&self, content: impl Into<Content>) -> Result<Selection, FluentError> {
        self.distribute(&self.attached(), content.into(), |target, nodes| {
            let Some(parent) = target.parent() else {
                return Ok(());
            };
            nodes
                .iter()
                .try_for_each(|node| parent.insert_before(node, Some(target)))
        })
    }

    pub fn after(&self, content: impl Into<Content>) -> Result<Selection, FluentError> {
        self.distribute(&self.attached(), content.into(), |target, nodes| {
            let Some(parent) = target.parent() else {
                return Ok(());
            };
            let reference = target.next_sibling();
            nodes
                .iter()
                .try_for_each(|node| parent.insert_before(node, reference.as_ref()))
        })
    }

    /// Dispatches to [`append`](Self::append), [`prepend`](Self::prepend),
    /// [`before`](Self::before) or [`after`](Self::after).
    pub fn insert(
        &self,
        position: Position,
        content: impl Into<Content>,
    ) -> Result<Selection, FluentError> {
        match position {
            Position::Before => self.before(content),
            Position::After => self.after(content),
            Position::Prepend => self.prepend(content),
            Position::Append => self.append(content),
        }
    }

    /// Puts `content` where each selected node was and detaches the node.
    pub fn replace_with(&self, content: impl Into<Content>) -> Result<Selection, FluentError> {
        self.distribute(&self.attached(), content.into(), |target, nodes| {
            let Some(parent) = target.parent() else {
                return Ok(());
            };
            for node in nodes {
                parent.insert_before(node, Some(target))?;
            }
            target.remove();
            Ok(())
        })
    }

    /// Detaches the selected nodes, or only those matching `filter`.
    pub fn remove(&self, filter: Option<&str>) -> Result<Selection, FluentError> {
        let mut removed = Vec::new();
        for node in self.iter() {
            let selected = match filter {
                Some(expression) => self.matches(expression, Some(node))?,
                None => true,
            };
            if selected {
                node.remove();
                removed.push(node.clone());
            }
        }
        self.spawn_with(removed)
    }

    /// Wraps every attached node in a copy of `template`.
    ///
    /// The node moves into the innermost first element of the wrapper.
    pub fn wrap(&self, template: impl Into<Content>) -> Result<Selection, FluentError> {
        let targets = self.attached();
        let Some(first) = targets.first() else {
            return Ok(self.spawn());
        };
        let document = self.document();
        let context = first.parent();
        let template = self
            .resolver(&document, context.as_ref())
            .resolve_single_element(template)?;

        // Copies are taken before any target moves into the template.
        let copies: Vec<Node> = (0..targets.len())
            .map(|index| {
                if index == 0 {
                    template.clone()
                } else {
                    template.clone_node(true)
                }
            })
            .collect();

        let mut wrappers = Vec::new();
        for (target, wrapper) in targets.iter().zip(copies) {
            let Some(parent) = target.parent() else {
                continue;
            };
            parent.insert_before(&wrapper, Some(target))?;
            let mut innermost = wrapper.clone();
            while let Some(child) = innermost.children().into_iter().find(Node::is_element) {
                innermost = child;
            }
            innermost.append_child(target)?;
            wrappers.push(wrapper);
        }
        self.spawn_with(wrappers)
    }

    /// Replaces each distinct parent element of the selection with its
    /// children. With `filter`, only parents matching it are removed.
    pub fn unwrap(&self, filter: Option<&str>) -> Result<Selection, FluentError> {
        let parents = self.unique(self.iter().filter_map(Node::parent).filter(Node::is_element));
        for parent in parents {
            let Some(grandparent) = parent.parent() else {
                continue;
            };
            if let Some(expression) = filter {
                if !self.matches(expression, Some(&parent))? {
                    continue;
                }
            }
            for child in parent.children() {
                grandparent.insert_before(&child, Some(&parent))?;
            }
            parent.remove();
        }
        self.spawn_with(self.to_vec())
    }

    /// Text content of all selected nodes, concatenated.
    pub fn text(&self) -> String {
        self.iter().map(Node::text_content).collect()
    }

    pub fn set_text(&self, text: &str) -> Result<Selection, FluentError> {
        for node in self.iter() {
            node.set_text_content(text)?;
        }
        self.spawn_with(self.to_vec())
    }

    /// The attribute value on the first selected element.
    pub fn attr(&self, name: &str) -> Option<String> {
        self.iter()
            .find(|node| node.is_element())
            .and_then(|element| element.attribute(name))
    }

    pub fn set_attr(&self, name: &str, value: &str) -> Result<Selection, FluentError> {
        let elements = self.elements();
        for element in &elements {
            element.set_attribute(name, value)?;
        }
        self.spawn_with(elements)
    }

    pub fn remove_attr(&self, name: &str) -> Result<Selection, FluentError> {
        let elements = self.elements();
        for element in &elements {
            element.remove_attribute(name);
        }
        self.spawn_with(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    fn load(xml: &str) -> Selection {
        Selection::new().load(xml, "xml").unwrap()
    }

    fn body(selection: &Selection) -> String {
        selection
            .document()
            .document_element()
            .map(|element| element.to_xml())
            .unwrap_or_default()
    }

    #[test]
    fn append_gives_clones_to_later_targets() {
        let root = load("<r><a/><a/></r>");
        let appended = root.find("//a").unwrap().append("<b>x</b>").unwrap();
        assert_eq!(appended.length(), 2);
        assert_ne!(appended.item(0), appended.item(1));
        assert_eq!(body(&root), "<r><a><b>x</b></a><a><b>x</b></a></r>");
        assert_eq!(appended.end().length(), 2);
    }

    #[test]
    fn prepend_keeps_content_order() {
        let root = load("<r><a><z/></a></r>");
        root.find("//a").unwrap().prepend("<x/><y/>").unwrap();
        assert_eq!(body(&root), "<r><a><x/><y/><z/></a></r>");
    }

    #[test]
    fn before_and_after_insert_siblings() {
        let root = load("<r><a/></r>");
        let a = root.find("//a").unwrap();
        a.before("<x/>").unwrap();
        a.after("<y/>text").unwrap();
        assert_eq!(body(&root), "<r><x/><a/><y/>text</r>");
    }

    #[test]
    fn insert_dispatches_on_position() {
        let root = load("<r><a/></r>");
        root.find("//a").unwrap().insert(Position::After, "<b/>").unwrap();
        assert_eq!(body(&root), "<r><a/><b/></r>");
    }

    #[test]
    fn replace_with_detaches_targets() {
        let root = load("<r><a>1</a><b/><a>2</a></r>");
        let replaced = root.find("//a").unwrap().replace_with("<c/>").unwrap();
        assert_eq!(replaced.length(), 2);
        assert_eq!(body(&root), "<r><c/><b/><c/></r>");
    }

    #[test]
    fn remove_with_filter() {
        let root = load("<r><a>1</a><a>2</a></r>");
        let removed = root.find("//a").unwrap().remove(Some(". = '2'")).unwrap();
        assert_eq!(removed.length(), 1);
        assert_eq!(removed.text(), "2");
        assert_eq!(body(&root), "<r><a>1</a></r>");
    }

    #[test]
    fn wrap_moves_targets_into_innermost_element() {
        let root = load("<r><a/><b/></r>");
        let wrappers = root.find("/r/*").unwrap().wrap("<w><inner/><other/></w>").unwrap();
        assert_eq!(wrappers.length(), 2);
        assert_snapshot!(body(&root), @"<r><w><inner><a/></inner><other/></w><w><inner><b/></inner><other/></w></r>");
    }

    #[test]
    fn wrap_gives_every_target_a_pristine_copy() {
        let root = load("<r><a/><b/><c/></r>");
        root.find("/r/*").unwrap().wrap("<w><i/></w>").unwrap();
        assert_eq!(
            body(&root),
            "<r><w><i><a/></i></w><w><i><b/></i></w><w><i><c/></i></w></r>"
        );
    }

    #[test]
    fn repeated_append_and_remove_does_not_grow_the_arena() {
        let root = load("<r/>");
        let r = root.find("/r").unwrap();
        let baseline = root.document().retained_node_count();
        for _ in 0..1000 {
            r.append("<a><b>x</b></a>").unwrap();
            r.find("a").unwrap().remove(None).unwrap();
        }
        assert_eq!(body(&root), "<r/>");
        assert!(root.document().retained_node_count() <= baseline + 16);
    }

    #[test]
    fn wrap_rejects_text_only_template() {
        let root = load("<r><a/></r>");
        let err = root.find("//a").unwrap().wrap("just text").unwrap_err();
        assert_eq!(err, FluentError::EmptyContent);
    }

    #[test]
    fn unwrap_replaces_parents_with_children() {
        let root = load("<r><p><a/><b/></p><q><c/></q></r>");
        root.find("//a | //b | //c").unwrap().unwrap(Some("self::p")).unwrap();
        assert_eq!(body(&root), "<r><a/><b/><q><c/></q></r>");
    }

    #[test]
    fn text_and_attributes() {
        let root = load(r#"<r><a id="1">x</a><a>y</a></r>"#);
        let items = root.find("//a").unwrap();
        assert_eq!(items.text(), "xy");
        assert_eq!(items.attr("id").as_deref(), Some("1"));
        items.set_attr("class", "item").unwrap();
        items.remove_attr("id").unwrap();
        items.set_text("z").unwrap();
        assert_eq!(body(&root), r#"<r><a class="item">z</a><a class="item">z</a></r>"#);
    }

    #[test]
    fn verbs_on_empty_selection_do_nothing() {
        let root = load("<r/>");
        let none = root.find("//missing").unwrap();
        assert!(none.append("<a/>").unwrap().is_empty());
        assert!(none.wrap("<w/>").unwrap().is_empty());
        assert_eq!(body(&root), "<r/>");
    }

    #[test]
    fn foreign_nodes_are_imported() {
        let root = load("<r/>");
        let other = Document::parse_xml("<x><y/></x>").unwrap();
        let x = other.document_element().unwrap();
        let appended = root.find("/r").unwrap().append(&x).unwrap();
        assert_eq!(appended.item(0).unwrap().owner_document(), root.document());
        assert_eq!(body(&root), "<r><x><y/></x></r>");
        assert_eq!(other.document_element().unwrap().to_xml(), "<x><y/></x>");
    }

    #[test]
    fn markup_uses_prefixes_in_scope_at_the_target() {
        let root = load(r#"<r xmlns:f="urn:f"><a/></r>"#);
        let appended = root.find("//a").unwrap().append("<f:b/>").unwrap();
        assert_eq!(appended.item(0).unwrap().namespace_uri().as_deref(), Some("urn:f"));
    }
}
