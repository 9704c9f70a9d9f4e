//! JSON object trees as documents.

use serde_json::{Map, Value};

use super::{LoadOptions, LoadResult, Loader, Source};
use crate::content_type::ContentType;
use crate::dom::{split_qname, Document, Node};
use crate::error::FluentError;

/// Namespace of the `json:json` root element built by [`SimpleXmlLoader`].
pub const SIMPLEXML_NAMESPACE: &str = "urn:carica-json-dom.2013";

const MAX_DEPTH: usize = 100;

/// The JSON value behind a source, if the source is JSON at all.
fn json_value(source: &Source) -> Result<Option<Value>, FluentError> {
    let text = match source {
        Source::Json(value) => return Ok(Some(value.clone())),
        Source::Markup(markup) => {
            let start = markup.trim_start();
            if !(start.starts_with('{') || start.starts_with('[')) {
                return Ok(None);
            }
            markup.clone()
        }
        Source::File(_) => match source.read_text()? {
            Some(text) => text,
            None => return Ok(None),
        },
        Source::Document(_) | Source::Node(_) => return Ok(None),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|err| FluentError::InvalidSource(format!("malformed JSON: {err}")))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn invalid(err: FluentError) -> FluentError {
    match err {
        FluentError::InvalidSource(_) => err,
        other => FluentError::InvalidSource(other.to_string()),
    }
}

fn descend(depth: usize) -> Result<usize, FluentError> {
    depth
        .checked_sub(1)
        .filter(|remaining| *remaining > 0)
        .ok_or_else(|| {
            FluentError::InvalidSource(format!("JSON is nested deeper than {MAX_DEPTH} levels"))
        })
}

/// Loads the JSON produced by encoding a SimpleXML element.
///
/// Keys become child elements of a `json:json` root, arrays repeat the
/// element, `@attributes` holds attributes and scalars become text.
#[derive(Debug, Clone)]
pub struct SimpleXmlLoader {
    max_depth: usize,
}

impl Default for SimpleXmlLoader {
    fn default() -> Self {
        SimpleXmlLoader {
            max_depth: MAX_DEPTH,
        }
    }
}

impl SimpleXmlLoader {
    fn transfer(&self, node: &Node, value: &Value, depth: usize) -> Result<(), FluentError> {
        let document = node.owner_document();
        match value {
            Value::Object(map) => {
                for (name, data) in map {
                    if name == "@attributes" {
                        if let Value::Object(attributes) = data {
                            for (attribute, value) in attributes {
                                node.set_attribute(attribute, &scalar_text(value))?;
                            }
                        }
                        continue;
                    }
                    let items = match data {
                        Value::Array(items) => items.iter().collect(),
                        other => vec![other],
                    };
                    for item in items {
                        let child = document.create_element(name)?;
                        node.append_child(&child)?;
                        self.transfer(&child, item, descend(depth)?)?;
                    }
                }
            }
            Value::Null | Value::Array(_) => {}
            scalar => node.append_child(&document.create_text_node(&scalar_text(scalar)))?,
        }
        Ok(())
    }
}

impl Loader for SimpleXmlLoader {
    fn supports(&self, content_type: &ContentType) -> bool {
        content_type.is_any_of(&[
            "simplexml",
            "application/simplexml",
            "application/simplexml+json",
        ])
    }

    fn load(
        &self,
        source: &Source,
        content_type: &ContentType,
        _options: &LoadOptions,
    ) -> Result<Option<LoadResult>, FluentError> {
        let Some(json) = json_value(source)? else {
            return Ok(None);
        };
        let document = Document::new();
        let root = document.create_element_ns(Some(SIMPLEXML_NAMESPACE), "json:json")?;
        document.root().append_child(&root)?;
        self.transfer(&root, &json, self.max_depth).map_err(invalid)?;
        Ok(Some(LoadResult::new(document, content_type.clone())))
    }
}

/// Loads BadgerFish JSON: `$` holds text, `@name` attributes, `@xmlns`
/// namespace declarations (`$` for the default namespace), every other key
/// a child element.
#[derive(Debug, Clone)]
pub struct BadgerFishLoader {
    max_depth: usize,
}

impl Default for BadgerFishLoader {
    fn default() -> Self {
        BadgerFishLoader {
            max_depth: MAX_DEPTH,
        }
    }
}

impl BadgerFishLoader {
    fn transfer_children(
        &self,
        parent: &Node,
        map: &Map<String, Value>,
        depth: usize,
    ) -> Result<(), FluentError> {
        for (name, value) in map {
            if name.starts_with('@') || name == "$" {
                continue;
            }
            self.create_element(parent, name, value, descend(depth)?)?;
        }
        Ok(())
    }

    fn create_element(
        &self,
        parent: &Node,
        name: &str,
        value: &Value,
        depth: usize,
    ) -> Result<(), FluentError> {
        if let Value::Array(items) = value {
            for item in items {
                self.create_element(parent, name, item, descend(depth)?)?;
            }
            return Ok(());
        }
        let document = parent.owner_document();
        let declarations: Vec<(Option<&str>, String)> = value
            .get("@xmlns")
            .and_then(Value::as_object)
            .map(|namespaces| {
                namespaces
                    .iter()
                    .map(|(prefix, uri)| {
                        let prefix = (prefix != "$").then_some(prefix.as_str());
                        (prefix, scalar_text(uri))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let (prefix, _) = split_qname(name)?;
        let namespace = declarations
            .iter()
            .find(|(declared, _)| *declared == prefix)
            .map(|(_, uri)| uri.clone())
            .or_else(|| parent.lookup_namespace_uri(prefix));
        let element = document.create_element_ns(namespace.as_deref(), name)?;
        parent.append_child(&element)?;
        for (prefix, uri) in &declarations {
            match prefix {
                Some(prefix) => element.set_attribute(&format!("xmlns:{prefix}"), uri)?,
                None => element.set_attribute("xmlns", uri)?,
            }
        }

        match value {
            Value::Object(map) => {
                for (key, data) in map {
                    if key == "@xmlns" {
                        continue;
                    }
                    if key == "$" {
                        element.append_child(&document.create_text_node(&scalar_text(data)))?;
                    } else if let Some(attribute) = key.strip_prefix('@') {
                        match split_qname(attribute)? {
                            (Some(prefix), _) => {
                                let uri = element.lookup_namespace_uri(Some(prefix));
                                element.set_attribute_ns(uri.as_deref(), attribute, &scalar_text(data))?;
                            }
                            (None, _) => element.set_attribute(attribute, &scalar_text(data))?,
                        }
                    }
                }
                self.transfer_children(&element, map, depth)
            }
            Value::Null | Value::Array(_) => Ok(()),
            scalar => element.append_child(&document.create_text_node(&scalar_text(scalar))),
        }
    }
}

impl Loader for BadgerFishLoader {
    fn supports(&self, content_type: &ContentType) -> bool {
        content_type.is_any_of(&[
            "badgerfish",
            "application/badgerfish",
            "application/badgerfish+json",
        ])
    }

    fn load(
        &self,
        source: &Source,
        content_type: &ContentType,
        _options: &LoadOptions,
    ) -> Result<Option<LoadResult>, FluentError> {
        let Some(json) = json_value(source)? else {
            return Ok(None);
        };
        let Value::Object(map) = &json else {
            return Err(FluentError::InvalidSource(
                "BadgerFish JSON must be an object".to_string(),
            ));
        };
        let document = Document::new();
        self.transfer_children(&document.root(), map, self.max_depth)
            .map_err(invalid)?;
        Ok(Some(LoadResult::new(document, content_type.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    fn load(loader: &dyn Loader, json: &str, content_type: &str) -> Document {
        loader
            .load(&json.into(), &content_type.into(), &LoadOptions::default())
            .unwrap()
            .unwrap()
            .document()
            .clone()
    }

    #[test]
    fn simplexml_json_becomes_elements_and_attributes() {
        let json = r#"{"@attributes":{"id":"1"},"item":["a",{"@attributes":{"n":"2"}},true],"empty":null}"#;
        let document = load(&SimpleXmlLoader::default(), json, "simplexml");
        assert_snapshot!(document.to_xml(), @r#"
        <?xml version="1.0"?>
        <json:json xmlns:json="urn:carica-json-dom.2013" id="1"><item>a</item><item n="2"/><item>true</item><empty/></json:json>
        "#);
    }

    #[test]
    fn badgerfish_json_becomes_namespaced_elements() {
        let json = r#"{"alice":{"@xmlns":{"$":"urn:d","c":"urn:c"},"bob":{"$":"david"},"c:edgar":[{"$":"1"},{"$":"2"}],"@id":"x"}}"#;
        let document = load(&BadgerFishLoader::default(), json, "badgerfish");
        assert_snapshot!(document.to_xml(), @r#"
        <?xml version="1.0"?>
        <alice xmlns="urn:d" xmlns:c="urn:c" id="x"><bob>david</bob><c:edgar>1</c:edgar><c:edgar>2</c:edgar></alice>
        "#);
        let alice = document.document_element().unwrap();
        assert_eq!(alice.namespace_uri().as_deref(), Some("urn:d"));
        assert_eq!(alice.first_child().unwrap().namespace_uri().as_deref(), Some("urn:d"));
    }

    #[test]
    fn markup_that_is_not_json_is_left_to_other_loaders() {
        let result = BadgerFishLoader::default()
            .load(&"<a/>".into(), &"badgerfish".into(), &LoadOptions::default())
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn malformed_json_is_invalid_source() {
        let err = SimpleXmlLoader::default()
            .load(&"{oops".into(), &"simplexml".into(), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, FluentError::InvalidSource(_)));
    }

    #[test]
    fn nesting_is_bounded() {
        let mut json = String::from("1");
        for _ in 0..(MAX_DEPTH + 5) {
            json = format!("{{\"a\":{json}}}");
        }
        let err = SimpleXmlLoader::default()
            .load(&json.as_str().into(), &"simplexml".into(), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, FluentError::InvalidSource(_)));
    }
}
