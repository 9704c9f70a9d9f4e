//! Rewrites documents to use caller-chosen prefixes and minimal
//! namespace declarations.

use std::collections::HashMap;

use crate::dom::{Attribute, Document, Node, XML_NAMESPACE};
use crate::error::FluentError;

/// Prefix value mapping a namespace URI to the default namespace.
pub const DEFAULT_NAMESPACE: &str = "#default";

/// Copies a document, renaming namespaced elements and attributes to the
/// prefixes of a URI to prefix map and declaring each binding once, on the
/// highest element it can live on.
///
/// The input document is never modified. Namespaces absent from the map
/// keep the prefix they had.
#[derive(Debug, Clone, Default)]
pub struct NamespaceOptimizer {
    prefixes: HashMap<String, String>,
}

impl NamespaceOptimizer {
    /// `mapping` pairs namespace URIs with prefixes. An empty prefix or
    /// [`DEFAULT_NAMESPACE`] selects the default namespace.
    pub fn new<I, U, P>(mapping: I) -> Result<Self, FluentError>
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        let mut prefixes = HashMap::new();
        for (uri, prefix) in mapping {
            let prefix = prefix.into();
            if !(prefix.is_empty() || prefix == DEFAULT_NAMESPACE || crate::dom::is_ncname(&prefix)) {
                return Err(FluentError::InvalidArgument(format!(
                    "'{prefix}' is not a valid namespace prefix"
                )));
            }
            prefixes.insert(uri.into(), prefix);
        }
        Ok(NamespaceOptimizer { prefixes })
    }

    /// The prefix mapped to `uri`: `Some(None)` for the default namespace,
    /// `None` when the URI is not mapped.
    fn mapped_prefix(&self, uri: &str) -> Option<Option<&str>> {
        self.prefixes.get(uri).map(|prefix| {
            if prefix.is_empty() || prefix == DEFAULT_NAMESPACE {
                None
            } else {
                Some(prefix.as_str())
            }
        })
    }

    pub fn optimize(&self, document: &Document) -> Result<Document, FluentError> {
        let working = document.deep_copy()?;
        let output = Document::new();

        let mut pending: Vec<(Node, Node)> = working
            .root()
            .children()
            .into_iter()
            .rev()
            .map(|child| (child, output.root()))
            .collect();

        while let Some((source, parent)) = pending.pop() {
            if !source.is_element() {
                parent.append_child(&output.import_node(&source, true)?)?;
                continue;
            }
            let element = self.rewrite_element(&output, &source, &parent)?;
            for child in source.children().into_iter().rev() {
                pending.push((child, element.clone()));
            }
        }
        Ok(output)
    }

    fn rewrite_element(
        &self,
        output: &Document,
        source: &Node,
        parent: &Node,
    ) -> Result<Node, FluentError> {
        let local = source.local_name().unwrap_or_else(|| source.node_name());
        let element = match source.namespace_uri() {
            Some(uri) => {
                // A source prefix spelled `default` stands for the default namespace.
                let prefix = match self.mapped_prefix(&uri) {
                    Some(prefix) => prefix.map(str::to_string),
                    None => source.prefix().filter(|prefix| prefix != "default"),
                };
                let qname = qualified(prefix.as_deref(), &local);
                let element = output.create_element_ns(Some(&uri), &qname)?;
                parent.append_child(&element)?;
                match prefix.as_deref() {
                    Some(prefix) => element.remove_attribute(&format!("xmlns:{prefix}")),
                    None => element.remove_attribute("xmlns"),
                };
                declare_namespace(&element, prefix.as_deref(), &uri)?;
                element
            }
            None => {
                let element = output.create_element(&local)?;
                parent.append_child(&element)?;
                if declared_namespace(&element, None).is_some_and(|uri| !uri.is_empty()) {
                    element.set_attribute("xmlns", "")?;
                }
                element
            }
        };

        for attribute in source.attributes() {
            if attribute.is_namespace_declaration() {
                continue;
            }
            self.copy_attribute(&element, &attribute)?;
        }
        Ok(element)
    }

    fn copy_attribute(&self, element: &Node, attribute: &Attribute) -> Result<(), FluentError> {
        let Some(uri) = attribute.namespace.as_deref() else {
            return element.set_attribute(&attribute.local_name, &attribute.value);
        };
        // Unprefixed attributes are never in a namespace, so a default
        // mapping keeps the attribute's own prefix.
        let prefix = match self.mapped_prefix(uri) {
            Some(Some(prefix)) if uri != XML_NAMESPACE => Some(prefix.to_string()),
            _ => attribute.prefix.clone(),
        };
        let Some(prefix) = prefix else {
            return element.set_attribute(&attribute.local_name, &attribute.value);
        };
        if uri != XML_NAMESPACE {
            declare_namespace(element, Some(&prefix), uri)?;
        }
        element.set_attribute_ns(
            Some(uri),
            &qualified(Some(&prefix), &attribute.local_name),
            &attribute.value,
        )
    }
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn own_declaration(node: &Node, prefix: Option<&str>) -> Option<String> {
    node.attributes()
        .into_iter()
        .find(|attribute| attribute.declared_prefix() == Some(prefix))
        .map(|attribute| attribute.value)
}

/// The URI bound to `prefix` by `xmlns` attributes on `node` or its ancestors.
fn declared_namespace(node: &Node, prefix: Option<&str>) -> Option<String> {
    let mut current = Some(node.clone());
    while let Some(candidate) = current {
        if !candidate.is_element() {
            return None;
        }
        if let Some(uri) = own_declaration(&candidate, prefix) {
            return Some(uri);
        }
        current = candidate.parent();
    }
    None
}

/// Whether declaring `prefix` as `uri` on `node` would change the meaning
/// of `node` itself.
fn conflicts(node: &Node, prefix: Option<&str>, uri: &str) -> bool {
    if own_declaration(node, prefix).is_some_and(|declared| declared != uri) {
        return true;
    }
    if node.prefix().as_deref() == prefix && node.namespace_uri().as_deref().unwrap_or("") != uri {
        return true;
    }
    prefix.is_some()
        && node.attributes().iter().any(|attribute| {
            !attribute.is_namespace_declaration()
                && attribute.prefix.as_deref() == prefix
                && attribute.namespace.as_deref() != Some(uri)
        })
}

/// Makes `prefix` resolve to `uri` at `element`, declaring it on the highest
/// ancestor where the declaration does not clash with an existing binding.
fn declare_namespace(element: &Node, prefix: Option<&str>, uri: &str) -> Result<(), FluentError> {
    if declared_namespace(element, prefix).as_deref() == Some(uri) {
        return Ok(());
    }
    let mut target = element.clone();
    let mut current = element.parent();
    while let Some(ancestor) = current {
        if !ancestor.is_element() || conflicts(&ancestor, prefix, uri) {
            break;
        }
        current = ancestor.parent();
        target = ancestor;
    }
    log::debug!(
        "Declaring namespace {} = {uri} on <{}>",
        prefix.unwrap_or("(default)"),
        target.node_name()
    );
    match prefix {
        Some(prefix) => target.set_attribute(&format!("xmlns:{prefix}"), uri),
        None => target.set_attribute("xmlns", uri),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn optimize(xml: &str, mapping: &[(&str, &str)]) -> String {
        let document = Document::parse_xml(xml).unwrap();
        let optimizer = NamespaceOptimizer::new(mapping.iter().copied()).unwrap();
        let optimized = optimizer.optimize(&document).unwrap();
        optimized.document_element().unwrap().to_xml()
    }

    #[rstest]
    #[case::default_to_prefix(
        r#"<a xmlns="urn:x"><b>t</b></a>"#,
        &[("urn:x", "ns")],
        r#"<ns:a xmlns:ns="urn:x"><ns:b>t</ns:b></ns:a>"#
    )]
    #[case::prefix_to_default(
        r#"<x:a xmlns:x="urn:x"><x:b/></x:a>"#,
        &[("urn:x", "#default")],
        r#"<a xmlns="urn:x"><b/></a>"#
    )]
    #[case::empty_prefix_is_default(
        r#"<x:a xmlns:x="urn:x"/>"#,
        &[("urn:x", "")],
        r#"<a xmlns="urn:x"/>"#
    )]
    #[case::hoists_repeated_declarations(
        r#"<r><x:a xmlns:x="urn:x"/><x:b xmlns:x="urn:x"/></r>"#,
        &[],
        r#"<r xmlns:x="urn:x"><x:a/><x:b/></r>"#
    )]
    #[case::drops_unused_declarations(r#"<r xmlns:u="urn:u"><a/></r>"#, &[], "<r><a/></r>")]
    #[case::keeps_conflicting_defaults_apart(
        r#"<r xmlns="urn:r"><a xmlns="urn:a"/></r>"#,
        &[],
        r#"<r xmlns="urn:r"><a xmlns="urn:a"/></r>"#
    )]
    #[case::undeclares_default_for_plain_elements(
        r#"<r xmlns="urn:r"><a xmlns=""/></r>"#,
        &[],
        r#"<r xmlns="urn:r"><a xmlns=""/></r>"#
    )]
    #[case::renames_attributes(
        r#"<r xmlns:x="urn:x" x:id="1" plain="2"/>"#,
        &[("urn:x", "y")],
        r#"<r xmlns:y="urn:x" y:id="1" plain="2"/>"#
    )]
    #[case::prefix_named_default_becomes_default_namespace(
        r#"<default:a xmlns:default="urn:x"/>"#,
        &[],
        r#"<a xmlns="urn:x"/>"#
    )]
    #[case::attributes_keep_prefix_under_default_mapping(
        r#"<x:r xmlns:x="urn:x" x:id="1"/>"#,
        &[("urn:x", "#default")],
        r#"<r xmlns="urn:x" xmlns:x="urn:x" x:id="1"/>"#
    )]
    fn optimizes_declarations(
        #[case] xml: &str,
        #[case] mapping: &[(&str, &str)],
        #[case] expected: &str,
    ) {
        assert_eq!(optimize(xml, mapping), expected);
    }

    #[test]
    fn leaves_the_input_untouched() {
        let document = Document::parse_xml(r#"<a xmlns="urn:x"><b/></a>"#).unwrap();
        let before = document.to_xml();
        let optimizer = NamespaceOptimizer::new([("urn:x", "ns")]).unwrap();
        let optimized = optimizer.optimize(&document).unwrap();
        assert_eq!(document.to_xml(), before);
        assert!(!optimized.ptr_eq(&document));
    }

    #[test]
    fn is_idempotent() {
        let document = Document::parse_xml(
            r#"<r xmlns="urn:r"><x:a xmlns:x="urn:x"><!-- c --><x:b x:k="v">t</x:b></x:a></r>"#,
        )
        .unwrap();
        let optimizer = NamespaceOptimizer::new([("urn:x", "p")]).unwrap();
        let once = optimizer.optimize(&document).unwrap();
        let twice = optimizer.optimize(&once).unwrap();
        assert_eq!(once.to_xml(), twice.to_xml());
        assert_eq!(
            once.document_element().unwrap().to_xml(),
            r#"<r xmlns="urn:r" xmlns:p="urn:x"><p:a><!-- c --><p:b p:k="v">t</p:b></p:a></r>"#
        );
    }

    #[test]
    fn deep_documents_do_not_recurse() {
        let depth = 1000;
        let xml = format!("{}{}", "<a xmlns=\"urn:x\">".repeat(depth), "</a>".repeat(depth));
        let document = Document::parse_xml(&xml).unwrap();
        let optimizer = NamespaceOptimizer::new([("urn:x", "n")]).unwrap();
        let optimized = optimizer.optimize(&document).unwrap();
        let root = optimized.document_element().unwrap();
        assert_eq!(root.attributes().len(), 1);
    }

    #[test]
    fn rejects_invalid_prefixes() {
        let err = NamespaceOptimizer::new([("urn:x", "1bad")]).unwrap_err();
        assert!(matches!(err, FluentError::InvalidArgument(_)));
    }
}
