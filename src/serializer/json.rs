use serde_json::{Map, Value};

use super::Serializer;
use crate::content_type::ContentType;
use crate::dom::{Document, Node};
use crate::error::FluentError;

/// Writes elements as BadgerFish JSON objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct BadgerFishSerializer;

impl BadgerFishSerializer {
    pub fn supports(content_type: &ContentType) -> bool {
        content_type.is_any_of(&[
            "badgerfish",
            "application/badgerfish",
            "application/badgerfish+json",
        ])
    }
}

fn element_value(element: &Node) -> Value {
    let mut object = Map::new();

    let texts: Vec<Node> = element.children().into_iter().filter(Node::is_text).collect();
    if texts.iter().any(|text| !text.is_whitespace_text()) {
        let text: String = texts.iter().map(Node::text_content).collect();
        object.insert("$".to_string(), Value::String(text));
    }

    for attribute in element.attributes() {
        if !attribute.is_namespace_declaration() {
            object.insert(
                format!("@{}", attribute.qualified_name()),
                Value::String(attribute.value),
            );
        }
    }

    for child in element.children().into_iter().filter(Node::is_element) {
        let name = child.node_name();
        let value = element_value(&child);
        match object.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(name, value);
            }
        }
    }

    let unprefixed = element.prefix().is_none();
    let mut namespaces = Map::new();
    for (prefix, uri) in element.in_scope_namespaces() {
        if uri.is_empty() {
            continue;
        }
        match prefix {
            None if unprefixed => {
                namespaces.insert("$".to_string(), Value::String(uri));
            }
            None => {}
            Some(prefix) if prefix == "xml" => {}
            Some(prefix) => {
                namespaces.insert(prefix, Value::String(uri));
            }
        }
    }
    if !namespaces.is_empty() {
        object.insert("@xmlns".to_string(), Value::Object(namespaces));
    }

    Value::Object(object)
}

fn render(value: &Value) -> Result<String, FluentError> {
    serde_json::to_string_pretty(value).map_err(|err| FluentError::InvalidArgument(err.to_string()))
}

impl Serializer for BadgerFishSerializer {
    fn serialize(&self, document: &Document, nodes: Option<&[Node]>) -> Result<String, FluentError> {
        match nodes {
            None => {
                let mut object = Map::new();
                if let Some(root) = document.document_element() {
                    object.insert(root.node_name(), element_value(&root));
                }
                render(&Value::Object(object))
            }
            Some(nodes) => {
                let mut parts = Vec::new();
                for node in nodes {
                    let value = if node.is_element() {
                        let mut object = Map::new();
                        object.insert(node.node_name(), element_value(node));
                        Value::Object(object)
                    } else {
                        Value::String(node.text_content())
                    };
                    parts.push(render(&value)?);
                }
                Ok(parts.join("\n"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn badgerfish(xml: &str) -> Value {
        let document = Document::parse_xml(xml).unwrap();
        let text = BadgerFishSerializer.serialize(&document, None).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[rstest]
    #[case::text("<alice>bob</alice>", json!({"alice": {"$": "bob"}}))]
    #[case::nested(
        "<alice><bob>charlie</bob><david>edgar</david></alice>",
        json!({"alice": {"bob": {"$": "charlie"}, "david": {"$": "edgar"}}})
    )]
    #[case::repeated(
        "<alice><bob>charlie</bob><bob>david</bob></alice>",
        json!({"alice": {"bob": [{"$": "charlie"}, {"$": "david"}]}})
    )]
    #[case::attributes(
        r#"<alice charlie="david">bob</alice>"#,
        json!({"alice": {"$": "bob", "@charlie": "david"}})
    )]
    #[case::default_namespace(
        r#"<alice xmlns="http://some-namespace">bob</alice>"#,
        json!({"alice": {"$": "bob", "@xmlns": {"$": "http://some-namespace"}}})
    )]
    #[case::prefixed_elements(
        r#"<alice xmlns="http://some-namespace" xmlns:charlie="http://some-other-namespace"> <bob>david</bob> <charlie:edgar>frank</charlie:edgar> </alice>"#,
        json!({"alice": {
            "bob": {"$": "david", "@xmlns": {"$": "http://some-namespace", "charlie": "http://some-other-namespace"}},
            "charlie:edgar": {"$": "frank", "@xmlns": {"charlie": "http://some-other-namespace"}},
            "@xmlns": {"$": "http://some-namespace", "charlie": "http://some-other-namespace"}
        }})
    )]
    fn writes_badgerfish_conventions(#[case] xml: &str, #[case] expected: Value) {
        assert_eq!(badgerfish(xml), expected);
    }

    #[test]
    fn namespaces_are_listed_last() {
        let document = Document::parse_xml(r#"<a xmlns="urn:a" id="1"><b/></a>"#).unwrap();
        let text = BadgerFishSerializer.serialize(&document, None).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        let keys: Vec<&String> = value["a"].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["@id", "b", "@xmlns"]);
    }
}
