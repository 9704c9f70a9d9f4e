use super::Serializer;
use crate::dom::{Document, Node};
use crate::error::FluentError;

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlSerializer;

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSerializer;

impl Serializer for XmlSerializer {
    fn serialize(&self, document: &Document, nodes: Option<&[Node]>) -> Result<String, FluentError> {
        Ok(match nodes {
            Some(nodes) => nodes.iter().map(Node::to_xml).collect(),
            None => document.to_xml(),
        })
    }
}

impl Serializer for HtmlSerializer {
    fn serialize(&self, document: &Document, nodes: Option<&[Node]>) -> Result<String, FluentError> {
        Ok(match nodes {
            Some(nodes) => nodes.iter().map(Node::to_html).collect(),
            None => document.to_html(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_output_renders_only_the_given_nodes() {
        let document = Document::parse_xml("<r><a>1</a><b/><a>2</a></r>").unwrap();
        let root = document.document_element().unwrap();
        let nodes: Vec<Node> = root
            .children()
            .into_iter()
            .filter(|n| n.node_name() == "a")
            .collect();
        let text = XmlSerializer.serialize(&document, Some(&nodes)).unwrap();
        assert_eq!(text, "<a>1</a><a>2</a>");
    }

    #[test]
    fn html_serializer_writes_html() {
        let document = Document::parse_html("<div><br></div>").unwrap();
        assert_eq!(
            HtmlSerializer.serialize(&document, None).unwrap(),
            "<div><br></div>\n"
        );
    }
}
