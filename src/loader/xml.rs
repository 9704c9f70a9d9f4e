use super::{LoadOptions, LoadResult, Loader, Source};
use crate::content_type::ContentType;
use crate::dom::{Document, ParseOptions};
use crate::error::FluentError;

/// Loads `text/xml` markup or files.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlLoader;

/// Loads `text/html` markup or files with the lenient HTML parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlLoader;

fn load_markup(
    source: &Source,
    content_type: &ContentType,
    options: ParseOptions,
) -> Result<Option<LoadResult>, FluentError> {
    let Some(markup) = source.read_text()? else {
        return Ok(None);
    };
    let document = Document::parse_with(&markup, options)
        .map_err(|err| FluentError::InvalidSource(err.to_string()))?;
    Ok(Some(LoadResult::new(document, content_type.clone())))
}

impl Loader for XmlLoader {
    fn supports(&self, content_type: &ContentType) -> bool {
        *content_type == ContentType::Xml
    }

    fn load(
        &self,
        source: &Source,
        content_type: &ContentType,
        options: &LoadOptions,
    ) -> Result<Option<LoadResult>, FluentError> {
        let parse = ParseOptions {
            html: false,
            preserve_whitespace: options.preserve_whitespace,
        };
        load_markup(source, content_type, parse)
    }
}

impl Loader for HtmlLoader {
    fn supports(&self, content_type: &ContentType) -> bool {
        *content_type == ContentType::Html
    }

    fn load(
        &self,
        source: &Source,
        content_type: &ContentType,
        options: &LoadOptions,
    ) -> Result<Option<LoadResult>, FluentError> {
        let parse = ParseOptions {
            html: true,
            preserve_whitespace: options.preserve_whitespace,
        };
        load_markup(source, content_type, parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_loader_rejects_malformed_markup() {
        let err = XmlLoader
            .load(&"<a>".into(), &ContentType::Xml, &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, FluentError::InvalidSource(_)));
    }

    #[test]
    fn xml_loader_can_drop_whitespace() {
        let options = LoadOptions {
            preserve_whitespace: false,
        };
        let result = XmlLoader
            .load(&"<a>\n  <b/>\n</a>".into(), &ContentType::Xml, &options)
            .unwrap()
            .unwrap();
        assert_eq!(result.document().document_element().unwrap().children().len(), 1);
    }

    #[test]
    fn html_loader_is_lenient() {
        let result = HtmlLoader
            .load(&"<P>one<br>two".into(), &ContentType::Html, &LoadOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(result.document().to_html(), "<p>one<br>two</p>\n");
    }

    #[test]
    fn json_sources_are_not_markup() {
        let source = Source::Json(serde_json::json!({"a": 1}));
        assert!(XmlLoader
            .load(&source, &ContentType::Xml, &LoadOptions::default())
            .unwrap()
            .is_none());
    }
}
