mod augment;
mod basing;
mod contents;
mod diagnostics;
mod distinct;
mod events;
mod loader;
mod pipeline;
mod state;
mod store;
mod util;

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};

use crate::augment::{EMBEDDED_SCHEME, PLACEHOLDER, ResultId};
use crate::basing::{Baser, LocalFiles, NoPrompt};
use crate::contents::embedded_content;
use crate::diagnostics::{Severity, code_flow_lines, diagnostics_for};
use crate::distinct::map_distinct;
use crate::events::{EventSink, TracingSink, ViewEvent};
use crate::loader::load_logs;
use crate::pipeline::{GroupBy, Row, SortBy, run_pipeline};
use crate::state::{DEFAULT_STATE_PATH, FilterCategories, ViewState, load_state, save_state};
use crate::store::Store;

/// CLI arguments for sariflens execution.
#[derive(Parser, Debug)]
#[command(
    name = "sariflens",
    about = "Browse, filter, and resolve SARIF static-analysis logs from the terminal.",
    version,
    subcommand_negates_reqs = true
)]
struct Cli {
    #[command(flatten)]
    list: ListArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

/// Options for the default result listing.
#[derive(Args, Debug, Clone)]
struct ListArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "file")]
    group_by: GroupBy,
    #[arg(long, value_enum, default_value = "line")]
    sort_by: SortBy,
    #[arg(long, help = "Sort rows within each group in descending order.")]
    desc: bool,
    #[arg(
        long,
        value_name = "LEVEL[,LEVEL...]",
        help = "Show only these levels (error, warning, note, none)."
    )]
    level: Option<String>,
    #[arg(
        long,
        value_name = "STATE[,STATE...]",
        help = "Show only these baseline states (new, unchanged, updated, absent)."
    )]
    baseline: Option<String>,
    #[arg(
        long,
        value_name = "STATE[,STATE...]",
        help = "Show only these suppression states (suppressed, not-suppressed)."
    )]
    suppression: Option<String>,
    #[arg(long, value_name = "WORDS", default_value = "")]
    keywords: String,
    #[arg(
        long,
        value_name = "URI",
        help = "Drop a loaded log from the active set by origin URI. Repeatable."
    )]
    exclude: Vec<String>,
    #[arg(long, value_name = "PATH", default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,
    #[arg(long, help = "Persist the effective row filters for future runs.")]
    save_filters: bool,
}

/// Input logs shared by all log-consuming commands.
#[derive(Args, Debug, Clone)]
struct InputArgs {
    #[arg(
        long,
        value_name = "PATH",
        required = true,
        num_args = 1..,
        help = "Input SARIF log paths."
    )]
    input: Vec<PathBuf>,
}

/// Subcommands supported by the CLI.
#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a selected result to a local path and print its location.
    Open(OpenArgs),
    /// Print findings attached to one local document.
    Diagnostics(DiagnosticsArgs),
    /// Print or reset persisted view preferences.
    State(StateArgs),
}

/// Arguments for resolving one selected result.
#[derive(Args, Debug, Clone)]
struct OpenArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(
        long,
        value_name = "ORIGIN:RUN:RESULT",
        help = "Selection id as printed by the default listing."
    )]
    id: String,
    #[arg(
        long,
        value_name = "DIR",
        help = "Workspace root used to match files by name."
    )]
    workspace: Option<PathBuf>,
}

/// Arguments for printing per-document findings.
#[derive(Args, Debug, Clone)]
struct DiagnosticsArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long, value_name = "PATH", help = "Local document to publish findings for.")]
    doc: String,
    #[arg(
        long,
        value_name = "DIR",
        help = "Workspace root used to match files by name."
    )]
    workspace: Option<PathBuf>,
}

/// Arguments for inspecting persisted view preferences.
#[derive(Args, Debug, Clone)]
struct StateArgs {
    #[arg(long, value_name = "PATH", default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,
    #[arg(long, help = "Reset preferences to their defaults.")]
    clear: bool,
}

fn main() -> std::process::ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            std::process::ExitCode::from(1)
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Command::Open(args)) => run_open(args),
        Some(Command::Diagnostics(args)) => run_diagnostics(args),
        Some(Command::State(args)) => run_state(args),
        None => run_list(cli.list),
    }
}

fn run_list(args: ListArgs) -> Result<()> {
    let mut store = Store::default();
    store.add_logs(load_logs(&args.input.input), &TracingSink);
    for uri in &args.exclude {
        if !store.remove_log(uri, &TracingSink) {
            warn!("no loaded log with origin '{uri}' to exclude");
        }
    }
    debug!(logs = store.logs().len(), "active log set ready");

    let mut state = load_state(&args.state)?;
    apply_facet_selection(&mut state.filters_row, "Level", args.level.as_deref());
    apply_facet_selection(&mut state.filters_row, "Baseline", args.baseline.as_deref());
    apply_facet_selection(
        &mut state.filters_row,
        "Suppression",
        args.suppression.as_deref(),
    );

    let rows = run_pipeline(
        store.results(),
        &state.filters_row,
        &args.keywords,
        args.group_by,
        args.sort_by,
        args.desc,
    );
    let mut writer = output_writer(args.output.as_deref())?;
    write_rows(writer.as_mut(), &rows).context("failed to write result rows")?;

    if args.save_filters {
        save_state(&args.state, &state)?;
    }
    Ok(())
}

fn write_rows(writer: &mut dyn Write, rows: &[Row<'_>]) -> Result<()> {
    for row in rows {
        match row {
            Row::Group { key, count } => writeln!(writer, "{key} ({count})")?,
            Row::Item(result) => {
                let line = if result.line >= 0 {
                    (result.line + 1).to_string()
                } else {
                    PLACEHOLDER.to_string()
                };
                writeln!(
                    writer,
                    "  {line}\t{}\t{}\t[{}]",
                    result.level, result.message, result.id
                )?;
            }
        }
    }
    Ok(())
}

fn run_open(args: OpenArgs) -> Result<()> {
    let mut store = Store::default();
    store.add_logs(load_logs(&args.input.input), &TracingSink);

    let id: ResultId = args.id.parse()?;
    let (result, annotations) = store
        .select(&id)
        .with_context(|| format!("no result with id '{}'", args.id))?;
    TracingSink.emit(&ViewEvent::Select { id: id.clone() });
    let Some(uri) = annotations.uri.as_deref() else {
        anyhow::bail!("result '{}' has no location", args.id);
    };

    if uri.starts_with(EMBEDDED_SCHEME) {
        let contents = embedded_content(&store, uri).context("embedded contents are missing")?;
        println!("{contents}");
        return Ok(());
    }

    let distinct_local = workspace_distinct_names(args.workspace.as_deref())?;
    let files = LocalFiles;
    let prompt = NoPrompt;
    let mut baser = Baser::new(distinct_local, &store, &files, &prompt);
    let local = baser.resolve_artifact_to_local(uri);
    if local.is_empty() {
        anyhow::bail!("unable to find '{uri}' on the local filesystem");
    }

    println!("{local}");
    if let Some(rule) = store
        .find_log(&id.0)
        .and_then(|log| log.sarif.runs.get(id.1))
        .and_then(|run| run.tool.driver.rules.as_ref())
        .zip(annotations.rule_index)
        .and_then(|(rules, index)| rules.get(index))
    {
        match &rule.name {
            Some(name) => println!("rule: {} ({name})", rule.id),
            None => println!("rule: {}", rule.id),
        }
    }
    if let Some(region) = annotations.region {
        println!("region: {}", serde_json::to_string(&region)?);
    }
    let flow_lines = code_flow_lines(result);
    if !flow_lines.is_empty() {
        let rendered: Vec<String> = flow_lines
            .iter()
            .map(|line| {
                line.map(|line| line.to_string())
                    .unwrap_or_else(|| PLACEHOLDER.to_string())
            })
            .collect();
        println!("code flow lines: {}", rendered.join(", "));
    }
    Ok(())
}

fn run_diagnostics(args: DiagnosticsArgs) -> Result<()> {
    let mut store = Store::default();
    store.add_logs(load_logs(&args.input.input), &TracingSink);

    let distinct_local = workspace_distinct_names(args.workspace.as_deref())?;
    let files = LocalFiles;
    let prompt = NoPrompt;
    let mut baser = Baser::new(distinct_local, &store, &files, &prompt);
    baser.set_open_documents(vec![args.doc.clone()]);
    baser.set_workspace_open(args.workspace.is_some());

    for diagnostic in diagnostics_for(&store, &mut baser, &args.doc) {
        let severity = match diagnostic.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Information => "info",
        };
        let region = diagnostic
            .region
            .map(|region| serde_json::to_string(&region).unwrap_or_default())
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        println!("{severity}\t{region}\t{}", diagnostic.message);
    }
    Ok(())
}

fn run_state(args: StateArgs) -> Result<()> {
    if args.clear {
        save_state(&args.state, &ViewState::default())?;
    }
    let state = load_state(&args.state)?;
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    serde::Serialize::serialize(&state, &mut serializer)
        .context("failed to serialize view state")?;
    let mut stdout = io::stdout();
    stdout.write_all(&buffer)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

/// Narrows one filter category to the comma-separated selection; absent
/// selections leave the persisted state untouched.
fn apply_facet_selection(filters: &mut FilterCategories, category: &str, selection: Option<&str>) {
    let Some(selection) = selection else {
        return;
    };
    let chosen: BTreeSet<String> = selection
        .split(',')
        .map(|value| value.trim().replace('-', " ").to_lowercase())
        .filter(|value| !value.is_empty())
        .collect();
    if chosen.is_empty() {
        return;
    }
    let values = filters.entry(category.to_string()).or_default();
    for (value, enabled) in values.iter_mut() {
        *enabled = chosen.contains(value.as_str());
    }
    for value in chosen {
        values.entry(value).or_insert(true);
    }
}

/// Unambiguous filename index for the workspace tree, skipping dot
/// directories and SARIF logs themselves.
fn workspace_distinct_names(workspace: Option<&Path>) -> Result<BTreeMap<String, String>> {
    let Some(root) = workspace else {
        return Ok(BTreeMap::new());
    };
    let mut pairs = Vec::new();
    collect_files(root, &mut pairs)
        .with_context(|| format!("failed to scan workspace {}", root.display()))?;
    Ok(map_distinct(pairs))
}

fn collect_files(dir: &Path, pairs: &mut Vec<(String, String)>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, pairs)?;
            continue;
        }
        if path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("sarif"))
        {
            continue;
        }
        pairs.push((name, path.display().to_string()));
    }
    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(File::create(path).with_context(|| {
            format!("failed to open {}", path.display())
        })?)),
        None => Ok(Box::new(io::stdout())),
    }
}
