//! `fluent-xml` is a chainable, namespace-aware selection and editing layer
//! for XML and HTML documents, and powers the `fluent-xml` CLI.
//!
//! A [`Selection`] wraps a document and a list of selected nodes. Documents
//! are `xot` trees; queries are XPath 3.1 expressions run by `xee-xpath`
//! through a [`QueryContext`] that knows the registered namespace prefixes
//! (plus `_` for the document's default namespace). Edits accept markup,
//! nodes from any document, or other selections; [`ContentResolver`] turns
//! them into nodes of the target document. Documents come in through pluggable [`loader`]s and go out
//! through pluggable [`serializer`]s chosen by [`ContentType`].
//!
//! # Example
//!
//! ```rust
//! use fluent_xml::Selection;
//!
//! # fn demo() -> Result<(), fluent_xml::FluentError> {
//! let root = Selection::new().load(
//!     r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry/></feed>"#,
//!     "xml",
//! )?;
//!
//! let entries = root.find("//_:entry")?;
//! entries.append("<title>Hello</title>")?;
//!
//! assert_eq!(entries.end().length(), 0);
//! assert!(root.to_string().contains("<entry><title>Hello</title></entry>"));
//! # Ok(())
//! # }
//! # demo().unwrap();
//! ```

pub mod content;
pub mod content_type;
pub mod dom;
pub mod error;
pub mod loader;
pub mod manipulation;
pub mod namespaces;
pub mod nodes;
pub mod query;
pub mod selection;
pub mod serializer;
pub mod transaction;

pub use crate::content::{Content, ContentResolver};
pub use crate::content_type::ContentType;
pub use crate::dom::{Document, Node, NodeType};
pub use crate::error::FluentError;
pub use crate::namespaces::NamespaceOptimizer;
pub use crate::nodes::NodeSet;
pub use crate::query::{Evaluation, QueryContext};
pub use crate::selection::{Selection, Selector};
