//! Defines the error type shared by every part of the library.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FluentError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Failed to parse markup fragment: {0}")]
    FragmentParse(String),

    #[error("Content did not resolve to any element or text node.")]
    EmptyContent,

    #[error("Node is not a part of this document.")]
    OutOfBounds,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid XPath expression: {0}")]
    Query(String),

    #[error("The node set is read only.")]
    ReadOnly,

    #[error("No serializer available for content type '{0}'.")]
    NoSerializer(String),

    #[error("Failed to parse document: {0}")]
    Parse(String),

    #[error("Invalid QName '{name}': {reason}")]
    InvalidQName { name: String, reason: String },

    #[error("Hierarchy request error: {0}")]
    Hierarchy(String),

    #[error("Selector '{0}' did not match any nodes in the document.")]
    NoMatch(String),

    #[error("Failed to parse operations: {0}")]
    OperationParse(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FluentError {
    fn from(err: std::io::Error) -> Self {
        FluentError::Io(err.to_string())
    }
}

impl From<xot::Error> for FluentError {
    fn from(err: xot::Error) -> Self {
        FluentError::Hierarchy(err.to_string())
    }
}
