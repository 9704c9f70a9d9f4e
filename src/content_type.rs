//! Content-type names used to pick loaders and serializers.

use std::fmt;
use std::str::FromStr;

/// A normalized content type.
///
/// `xml`, `application/xml` and `text/xml` become [`ContentType::Xml`];
/// `html` and `text/html` become [`ContentType::Html`]. Anything else is
/// kept, lower-cased, as an opaque name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    #[default]
    Xml,
    Html,
    Other(String),
}

impl ContentType {
    pub fn new(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "xml" | "application/xml" | "text/xml" => ContentType::Xml,
            "html" | "text/html" => ContentType::Html,
            _ => ContentType::Other(name),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Xml => "text/xml",
            ContentType::Html => "text/html",
            ContentType::Other(name) => name,
        }
    }

    /// True if this is one of `names`, compared after normalization.
    pub fn is_any_of(&self, names: &[&str]) -> bool {
        names.iter().any(|name| ContentType::new(name) == *self)
    }
}

impl From<&str> for ContentType {
    fn from(name: &str) -> Self {
        ContentType::new(name)
    }
}

impl FromStr for ContentType {
    type Err = std::convert::Infallible;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(ContentType::new(name))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("text/xml", "text/xml")]
    #[case("text/html", "text/html")]
    #[case("xml", "text/xml")]
    #[case("html", "text/html")]
    #[case("TEXT/XML", "text/xml")]
    #[case("TEXT/HTML", "text/html")]
    #[case("XML", "text/xml")]
    #[case("application/xml", "text/xml")]
    #[case("HTML", "text/html")]
    #[case("Application/JSON", "application/json")]
    fn normalizes_aliases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(ContentType::new(input).as_str(), expected);
    }

    #[test]
    fn unknown_types_are_kept() {
        let custom = ContentType::new("badgerfish");
        assert_eq!(custom, ContentType::Other("badgerfish".to_string()));
        assert!(custom.is_any_of(&["application/badgerfish", "BadgerFish"]));
        assert_eq!(ContentType::default().to_string(), "text/xml");
    }
}
