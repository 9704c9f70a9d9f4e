//! Batches of edits described as data and applied all-or-nothing.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::dom::Document;
use crate::error::FluentError;
use crate::selection::Selection;

#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Append(ContentOperation),
    Prepend(ContentOperation),
    Before(ContentOperation),
    After(ContentOperation),
    Replace(ContentOperation),
    Wrap(ContentOperation),
    Remove(SelectOperation),
    Unwrap(SelectOperation),
    SetAttribute(SetAttributeOperation),
    RemoveAttribute(RemoveAttributeOperation),
    SetText(SetTextOperation),
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ContentOperation {
    pub select: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SelectOperation {
    pub select: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SetAttributeOperation {
    pub select: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct RemoveAttributeOperation {
    pub select: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SetTextOperation {
    pub select: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub text: String,
}

impl Operation {
    /// The XPath expression choosing the nodes this operation edits.
    pub fn select(&self) -> &str {
        match self {
            Operation::Append(op)
            | Operation::Prepend(op)
            | Operation::Before(op)
            | Operation::After(op)
            | Operation::Replace(op)
            | Operation::Wrap(op) => &op.select,
            Operation::Remove(op) | Operation::Unwrap(op) => &op.select,
            Operation::SetAttribute(op) => &op.select,
            Operation::RemoveAttribute(op) => &op.select,
            Operation::SetText(op) => &op.select,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        match self {
            Operation::Append(op)
            | Operation::Prepend(op)
            | Operation::Before(op)
            | Operation::After(op)
            | Operation::Replace(op)
            | Operation::Wrap(op) => op.comment.as_deref(),
            Operation::Remove(op) | Operation::Unwrap(op) => op.comment.as_deref(),
            Operation::SetAttribute(op) => op.comment.as_deref(),
            Operation::RemoveAttribute(op) => op.comment.as_deref(),
            Operation::SetText(op) => op.comment.as_deref(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Operation::Append(_) => "append",
            Operation::Prepend(_) => "prepend",
            Operation::Before(_) => "before",
            Operation::After(_) => "after",
            Operation::Replace(_) => "replace",
            Operation::Wrap(_) => "wrap",
            Operation::Remove(_) => "remove",
            Operation::Unwrap(_) => "unwrap",
            Operation::SetAttribute(_) => "set_attribute",
            Operation::RemoveAttribute(_) => "remove_attribute",
            Operation::SetText(_) => "set_text",
        }
    }
}

impl ContentOperation {
    fn resolve_content(&self) -> Result<String, FluentError> {
        match (&self.content, &self.content_file) {
            (Some(inline), None) => Ok(inline.clone()),
            (None, Some(path)) => fs::read_to_string(path).map_err(|err| {
                FluentError::Io(format!("failed to read content file {}: {err}", path.display()))
            }),
            (Some(_), Some(_)) => Err(FluentError::OperationParse(
                "operation cannot specify both inline content and a content_file".to_string(),
            )),
            (None, None) => Err(FluentError::OperationParse(
                "operation must provide inline content or a content_file".to_string(),
            )),
        }
    }
}

/// Parses a list of operations from JSON or YAML text.
pub fn parse_operations(text: &str) -> Result<Vec<Operation>, FluentError> {
    serde_yaml::from_str(text).map_err(|err| FluentError::OperationParse(err.to_string()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub operations_applied: usize,
    /// Nodes selected across all operations.
    pub nodes_affected: usize,
}

/// Applies `operations` in order to a copy of `document` and swaps the
/// result in once all of them succeeded.
///
/// `namespaces` are registered as query prefixes before the first
/// operation. On error the document is left as it was.
pub fn apply_operations(
    document: &Document,
    namespaces: &[(String, String)],
    operations: Vec<Operation>,
) -> Result<ApplyOutcome, FluentError> {
    let working = document.deep_copy()?;
    let root = Selection::from_document(working.clone());
    for (prefix, uri) in namespaces {
        root.register_namespace(prefix, uri)?;
    }

    let mut outcome = ApplyOutcome::default();
    for operation in operations {
        let targets = root.find(operation.select())?;
        if targets.is_empty() {
            return Err(FluentError::NoMatch(operation.select().to_string()));
        }
        match operation.comment() {
            Some(comment) => log::debug!("Applying {} ({comment})", operation.name()),
            None => log::debug!("Applying {} to {}", operation.name(), operation.select()),
        }
        apply_one(&targets, &operation).map_err(|err| match err {
            FluentError::Io(_) | FluentError::OperationParse(_) => err,
            other => FluentError::OperationFailed(format!(
                "{} '{}': {other}",
                operation.name(),
                operation.select()
            )),
        })?;
        outcome.operations_applied += 1;
        outcome.nodes_affected += targets.length();
    }

    document.replace_contents(&working)?;
    Ok(outcome)
}

fn apply_one(targets: &Selection, operation: &Operation) -> Result<(), FluentError> {
    match operation {
        Operation::Append(op) => targets.append(op.resolve_content()?)?,
        Operation::Prepend(op) => targets.prepend(op.resolve_content()?)?,
        Operation::Before(op) => targets.before(op.resolve_content()?)?,
        Operation::After(op) => targets.after(op.resolve_content()?)?,
        Operation::Replace(op) => targets.replace_with(op.resolve_content()?)?,
        Operation::Wrap(op) => targets.wrap(op.resolve_content()?)?,
        Operation::Remove(_) => targets.remove(None)?,
        Operation::Unwrap(_) => targets.unwrap(None)?,
        Operation::SetAttribute(op) => targets.set_attr(&op.name, &op.value)?,
        Operation::RemoveAttribute(op) => targets.remove_attr(&op.name)?,
        Operation::SetText(op) => targets.set_text(&op.text)?,
    };
    Ok(())
}
