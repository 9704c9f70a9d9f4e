use crate::cli::{
    ApplyArgs, Cli, Command, ConvertArgs, DeleteArgs, GetArgs, InsertPosition as CliInsertPosition,
    ModificationArgs, OptimizeArgs, SelectArgs,
};
use anyhow::{anyhow, Context};
use clap::Parser;
use fluent_xml::manipulation::Position;
use fluent_xml::transaction::{apply_operations, parse_operations, Operation};
use fluent_xml::{ContentType, FluentError, NamespaceOptimizer, Selection, Selector};
use regex::Regex;
use similar::TextDiff;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder as TempFileBuilder;

pub fn run() -> anyhow::Result<()> {
    env_logger::init();

    let Cli {
        file,
        output,
        content_type,
        namespaces,
        command,
    } = Cli::parse();

    validate_stdin_usage(&file, &command)?;

    let namespaces = parse_pairs(&namespaces, "--namespace", split_namespace)?;
    let content_type = ContentType::new(&content_type);
    let input_content = read_input(file.as_ref())?;
    let root = load_document(&input_content, &content_type, &namespaces)?;

    match command {
        Command::Get(args) => process_get(&root, args),
        Command::Insert(args) => {
            let position = map_cli_insert_position(args.position);
            let content = read_content(args.content, args.content_file)?;
            let targets = select_targets(&root, &args.selector)?;
            targets.insert(position, content)?;
            finalize_output(OutputMode::Write, &output, &file, &input_content, root.serialize()?)
        }
        Command::Replace(args) => {
            let ModificationArgs {
                selector,
                content,
                content_file,
                position: _,
            } = args;
            let content = read_content(content, content_file)?;
            select_targets(&root, &selector)?.replace_with(content)?;
            finalize_output(OutputMode::Write, &output, &file, &input_content, root.serialize()?)
        }
        Command::Delete(DeleteArgs { selector }) => {
            select_targets(&root, &selector)?.remove(None)?;
            finalize_output(OutputMode::Write, &output, &file, &input_content, root.serialize()?)
        }
        Command::Apply(args) => {
            let (operations, mode) = prepare_apply_operations(args)?;
            apply_operations(&root.document(), &namespaces, operations)
                .map_err(map_fluent_error)?;
            finalize_output(mode, &output, &file, &input_content, root.serialize()?)
        }
        Command::Optimize(args) => {
            let mode = if args.diff {
                OutputMode::Diff
            } else {
                OutputMode::Write
            };
            let optimizer = build_optimizer(args)?;
            let optimized = optimizer.optimize(&root.document())?;
            let result = root.load(optimized, content_type)?;
            finalize_output(mode, &output, &file, &input_content, result.serialize()?)
        }
        Command::Convert(ConvertArgs { to }) => {
            root.set_content_type(to.as_str());
            let rendered = root.serialize()?;
            // Converting changes the format, so the input file is never overwritten.
            finalize_output(OutputMode::Write, &output, &None, &input_content, rendered)
        }
    }
}

fn validate_stdin_usage(file: &Option<PathBuf>, command: &Command) -> anyhow::Result<()> {
    let from_stdin = |path: Option<&PathBuf>| path.is_some_and(|path| path.to_string_lossy() == "-");
    let secondary_stdin = match command {
        Command::Insert(args) | Command::Replace(args) => from_stdin(args.content_file.as_ref()),
        Command::Apply(args) => from_stdin(args.operations_file.as_ref()),
        _ => false,
    };
    if file.is_none() && secondary_stdin {
        return Err(anyhow!(
            "Cannot read both the document and additional input from stdin. Use --file for the document."
        ));
    }
    Ok(())
}

fn read_input(path: Option<&PathBuf>) -> anyhow::Result<String> {
    if let Some(file_path) = path {
        fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read input file: {}", file_path.display()))
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    }
}

fn load_document(
    input: &str,
    content_type: &ContentType,
    namespaces: &[(String, String)],
) -> anyhow::Result<Selection> {
    let empty = Selection::new();
    for (prefix, uri) in namespaces {
        empty.register_namespace(prefix, uri)?;
    }
    empty
        .load(input, content_type.clone())
        .with_context(|| format!("Failed to load input as '{content_type}'"))
}

fn split_namespace(pair: &str) -> Option<(String, String)> {
    let (prefix, uri) = pair.split_once('=')?;
    Some((prefix.to_string(), uri.to_string()))
}

/// URIs may contain '=' themselves; prefixes never do.
fn split_mapping(pair: &str) -> Option<(String, String)> {
    let (uri, prefix) = pair.rsplit_once('=')?;
    Some((uri.to_string(), prefix.to_string()))
}

fn parse_pairs(
    values: &[String],
    flag: &str,
    split: fn(&str) -> Option<(String, String)>,
) -> anyhow::Result<Vec<(String, String)>> {
    values
        .iter()
        .map(|value| split(value).ok_or_else(|| anyhow!("Invalid {flag} value '{value}': expected KEY=VALUE")))
        .collect()
}

fn select_targets(root: &Selection, args: &SelectArgs) -> anyhow::Result<Selection> {
    let found = root.find(&args.select)?;
    let targets = match &args.matching {
        Some(pattern) => {
            let regex = Regex::new(pattern)
                .with_context(|| format!("Invalid regex pattern for --matching: {pattern}"))?;
            found.filter(Selector::predicate(move |node, _| {
                regex.is_match(&node.text_content())
            }))?
        }
        None => found,
    };
    if targets.is_empty() {
        return Err(FluentError::NoMatch(args.select.clone()).into());
    }
    Ok(targets)
}

fn process_get(root: &Selection, args: GetArgs) -> anyhow::Result<()> {
    let matches = match select_targets(root, &args.selector) {
        Ok(matches) => matches,
        Err(err) if is_no_match(&err) => return Ok(()),
        Err(err) => return Err(err),
    };

    let factories = root.serializer_factories();
    let document = root.document();
    let content_type = root.content_type();
    let mut stdout = io::stdout().lock();
    for node in &matches {
        let rendered = if args.text {
            node.text_content()
        } else {
            factories.serialize(&content_type, &document, Some(std::slice::from_ref(node)))?
        };
        writeln!(stdout, "{}", rendered.trim_end_matches('\n'))?;
    }
    Ok(())
}

fn is_no_match(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<FluentError>(), Some(FluentError::NoMatch(_)))
}

fn read_content(content: Option<String>, content_file: Option<PathBuf>) -> anyhow::Result<String> {
    match (content, content_file) {
        (Some(inline), None) => Ok(inline),
        (None, Some(path)) => {
            if path.to_string_lossy() == "-" {
                let mut buf = String::new();
                io::stdin()
                    .read_to_string(&mut buf)
                    .with_context(|| "Failed to read content from stdin")?;
                Ok(buf)
            } else {
                fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read content file: {}", path.display()))
            }
        }
        (Some(_), Some(_)) => unreachable!("clap enforces mutual exclusivity"),
        (None, None) => Err(anyhow!("Either --content or --content-file must be provided.")),
    }
}

fn map_cli_insert_position(position: CliInsertPosition) -> Position {
    match position {
        CliInsertPosition::Before => Position::Before,
        CliInsertPosition::After => Position::After,
        CliInsertPosition::Prepend => Position::Prepend,
        CliInsertPosition::Append => Position::Append,
    }
}

fn prepare_apply_operations(args: ApplyArgs) -> anyhow::Result<(Vec<Operation>, OutputMode)> {
    let ApplyArgs {
        operations_file,
        operations,
        dry_run,
        diff,
    } = args;

    let operations_data = match (operations_file, operations) {
        (Some(path), None) => {
            if path.to_string_lossy() == "-" {
                let mut buf = String::new();
                io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                fs::read_to_string(&path).with_context(|| {
                    format!("Failed to read operations file: {}", path.display())
                })?
            }
        }
        (None, Some(inline)) => inline,
        (Some(_), Some(_)) => unreachable!("clap enforces mutual exclusivity"),
        (None, None) => {
            return Err(anyhow!(
                "Either --operations-file or --operations must be provided."
            ));
        }
    };

    let operations = parse_operations(&operations_data)
        .with_context(|| "Failed to parse operations data as JSON or YAML")?;

    let mode = if diff {
        OutputMode::Diff
    } else if dry_run {
        OutputMode::DryRun
    } else {
        OutputMode::Write
    };

    Ok((operations, mode))
}

fn build_optimizer(args: OptimizeArgs) -> anyhow::Result<NamespaceOptimizer> {
    let mut mapping = match &args.map_file {
        Some(path) => read_mapping_file(path)?,
        None => BTreeMap::new(),
    };
    for (uri, prefix) in parse_pairs(&args.mappings, "--map", split_mapping)? {
        mapping.insert(uri, prefix);
    }
    Ok(NamespaceOptimizer::new(mapping)?)
}

fn read_mapping_file(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read namespace map: {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mapping = match extension.as_str() {
        "toml" => toml::from_str(&data)
            .with_context(|| format!("Failed to parse TOML namespace map: {}", path.display()))?,
        "json" => serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse JSON namespace map: {}", path.display()))?,
        _ => serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse YAML namespace map: {}", path.display()))?,
    };
    Ok(mapping)
}

fn finalize_output(
    mode: OutputMode,
    output_path: &Option<PathBuf>,
    input_path: &Option<PathBuf>,
    original_content: &str,
    rendered_content: String,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::DryRun => {
            io::stdout().write_all(rendered_content.as_bytes())?;
            return Ok(());
        }
        OutputMode::Diff => {
            let diff_output = TextDiff::from_lines(original_content, &rendered_content)
                .unified_diff()
                .header("original", "modified")
                .to_string();

            io::stdout().write_all(diff_output.as_bytes())?;
            return Ok(());
        }
        OutputMode::Write => {}
    }

    if let Some(path) = output_path {
        fs::write(path, &rendered_content)
            .with_context(|| format!("Failed to write to output file: {}", path.display()))?;
        return Ok(());
    }

    if let Some(input_path) = input_path {
        let parent_dir = match input_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            Some(_) => Path::new("."),
            None => {
                return Err(anyhow!(
                    "Could not determine parent directory of {}",
                    input_path.display()
                ))
            }
        };

        let mut temp_file = TempFileBuilder::new()
            .prefix(".fluent-xml-")
            .suffix(".tmp")
            .tempfile_in(parent_dir)
            .with_context(|| {
                format!(
                    "Failed to create temporary file in {}",
                    parent_dir.display()
                )
            })?;

        temp_file
            .write_all(rendered_content.as_bytes())
            .with_context(|| "Failed to write to temporary file")?;

        temp_file
            .persist(input_path)
            .with_context(|| format!("Failed to replace original file {}", input_path.display()))?;
    } else {
        io::stdout().write_all(rendered_content.as_bytes())?;
    }

    Ok(())
}

fn map_fluent_error(err: FluentError) -> anyhow::Error {
    match err {
        FluentError::OperationFailed(message) => anyhow!(message),
        other => anyhow!(other),
    }
}

#[derive(Clone, Copy)]
enum OutputMode {
    Write,
    DryRun,
    Diff,
}
