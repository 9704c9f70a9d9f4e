//! Defines the command-line interface for the application.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fluent-xml",
    version,
    about = "Query and edit XML, HTML and JSON-mapped documents with XPath."
)]
pub struct Cli {
    /// The document to read and modify. [default: reads from stdin]
    #[arg(short, long, global = true, value_name = "FILE_PATH")]
    pub file: Option<PathBuf>,

    /// Write the output to a new file instead of modifying the original.
    #[arg(short, long, global = true, value_name = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Content type of the input (e.g. 'xml', 'html', 'badgerfish', 'simplexml').
    #[arg(
        short = 't',
        long,
        global = true,
        value_name = "TYPE",
        default_value = "xml"
    )]
    pub content_type: String,

    /// Register a namespace prefix for XPath expressions, as PREFIX=URI. Repeatable.
    #[arg(short, long = "namespace", global = true, value_name = "PREFIX=URI")]
    pub namespaces: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the nodes matching an XPath expression without modifying the file.
    Get(GetArgs),
    /// Insert new content relative to every matching node.
    Insert(ModificationArgs),
    /// Replace every matching node with new content.
    Replace(ModificationArgs),
    /// Delete every matching node.
    #[command(alias = "remove")]
    Delete(DeleteArgs),
    /// Apply a sequence of transactional operations to the document.
    Apply(ApplyArgs),
    /// Rewrite namespace prefixes and drop redundant declarations.
    Optimize(OptimizeArgs),
    /// Serialize the document with another content type.
    Convert(ConvertArgs),
}

/// Node selection shared by the commands that target nodes.
#[derive(Parser, Debug)]
pub struct SelectArgs {
    /// XPath expression selecting the target nodes.
    #[arg(short, long, value_name = "XPATH", allow_hyphen_values = true)]
    pub select: String,

    /// Only keep matches whose text content matches this regex.
    #[arg(long, value_name = "REGEX")]
    pub matching: Option<String>,
}

#[derive(Parser, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub selector: SelectArgs,

    /// Print the text content of each match instead of its markup.
    #[arg(long)]
    pub text: bool,
}

#[derive(Parser, Debug)]
pub struct ModificationArgs {
    #[command(flatten)]
    pub selector: SelectArgs,

    /// The markup to insert or replace with.
    #[arg(
        short,
        long,
        value_name = "MARKUP",
        conflicts_with = "content_file",
        allow_hyphen_values = true
    )]
    pub content: Option<String>,

    /// A file containing the markup. Use '-' to read from stdin.
    #[arg(long, value_name = "CONTENT_PATH", conflicts_with = "content")]
    pub content_file: Option<PathBuf>,

    /// Position for the 'insert' command.
    #[arg(short, long, value_enum, default_value_t = InsertPosition::Append)]
    pub position: InsertPosition,
}

/// Arguments for the `delete` command.
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub selector: SelectArgs,
}

#[derive(Parser, Debug)]
pub struct ApplyArgs {
    /// Path to a JSON or YAML file containing the operations. Use '-' for stdin.
    #[arg(short = 'O', long, value_name = "PATH", conflicts_with = "operations")]
    pub operations_file: Option<PathBuf>,

    /// JSON string describing the operations inline.
    #[arg(long, value_name = "JSON_STRING", conflicts_with = "operations_file")]
    pub operations: Option<String>,

    /// Preview the result without writing any files.
    #[arg(long)]
    pub dry_run: bool,

    /// Show a diff of the pending changes instead of writing files.
    #[arg(long)]
    pub diff: bool,
}

#[derive(Parser, Debug)]
pub struct OptimizeArgs {
    /// Map a namespace URI to a prefix, as URI=PREFIX. Use '#default' or an
    /// empty prefix for the default namespace. Repeatable.
    #[arg(short, long = "map", value_name = "URI=PREFIX")]
    pub mappings: Vec<String>,

    /// A TOML, YAML or JSON file mapping namespace URIs to prefixes.
    #[arg(long, value_name = "PATH")]
    pub map_file: Option<PathBuf>,

    /// Show a diff of the pending changes instead of writing files.
    #[arg(long)]
    pub diff: bool,
}

#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Content type to serialize the document as.
    #[arg(long, value_name = "TYPE")]
    pub to: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertPosition {
    /// Insert before the selected node (as a sibling).
    Before,
    /// Insert after the selected node (as a sibling).
    After,
    /// Insert as the first child of the selected node.
    Prepend,
    /// Insert as the last child of the selected node.
    Append,
}
