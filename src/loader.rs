use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use serde_sarif::sarif::Sarif;
use tracing::{error, warn};

use crate::augment::{LoadedLog, augment};

/// Most log files a single load call will process.
const MAX_LOGS_PER_LOAD: usize = 20;

/// Schema identifier accepted without transformation.
const CURRENT_SCHEMA: &str = "2.1.0-rtm.5";

/// Environment variable naming the SARIF converter executable.
const CONVERTER_ENV: &str = "SARIFLENS_MULTITOOL";

/// What to do with a log of a given version and schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VersionDecision {
    Current,
    Upgrade,
    TooNew,
}

/// Reads, parses, upgrades, and augments a batch of log files.
///
/// Failures are reported per file and the rest of the batch continues; a
/// "newer than this tool" warning is surfaced at most once per batch.
pub(crate) fn load_logs(paths: &[PathBuf]) -> Vec<LoadedLog> {
    if paths.len() > MAX_LOGS_PER_LOAD {
        warn!(
            "loading the first {MAX_LOGS_PER_LOAD} of {} logs",
            paths.len()
        );
    }
    let mut warn_too_new = false;
    let mut logs = Vec::new();
    for path in paths.iter().take(MAX_LOGS_PER_LOAD) {
        match load_one(path, &mut warn_too_new) {
            Ok(log) => logs.push(log),
            Err(err) => error!("failed to load {}: {err:#}", path.display()),
        }
    }
    if warn_too_new {
        warn!("some log versions are newer than this tool; loading them as-is");
    }
    for log in &mut logs {
        augment(log);
    }
    logs
}

fn load_one(path: &Path, warn_too_new: &mut bool) -> Result<LoadedLog> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let sarif =
        parse_log(&content).with_context(|| format!("failed to parse {}", path.display()))?;
    let origin = path.display().to_string();
    match detect_version(&sarif) {
        VersionDecision::Current => Ok(LoadedLog::new(origin, sarif)),
        VersionDecision::TooNew => {
            *warn_too_new = true;
            Ok(LoadedLog::new(origin, sarif))
        }
        VersionDecision::Upgrade => {
            let upgraded = upgrade_log(path)
                .with_context(|| format!("failed to upgrade {}", path.display()))?;
            let content = fs::read_to_string(&upgraded)
                .with_context(|| format!("failed to read {}", upgraded.display()))?;
            let sarif = parse_log(&content)
                .with_context(|| format!("failed to parse upgraded {}", upgraded.display()))?;
            let mut log = LoadedLog::new(origin, sarif);
            log.uri_upgraded = Some(upgraded.display().to_string());
            Ok(log)
        }
    }
}

/// Parses one log document, reporting the JSON path of any mismatch.
pub(crate) fn parse_log(content: &str) -> Result<Sarif> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut deserializer = serde_json::Deserializer::from_str(content);
    Ok(serde_path_to_error::deserialize(&mut deserializer)?)
}

/// Classifies a log by version and schema identifier.
///
/// A log is current only at version 2.1.0 with no schema, or with a
/// schema that normalizes to the rtm.5 identifier. Older versions and
/// schema variants go through the converter; newer versions load as-is.
pub(crate) fn detect_version(sarif: &Sarif) -> VersionDecision {
    let version = sarif.version.as_str().unwrap_or("");
    match compare_versions(version, "2.1.0") {
        Ordering::Less => VersionDecision::Upgrade,
        Ordering::Greater => VersionDecision::TooNew,
        Ordering::Equal => match normalized_schema(sarif) {
            None => VersionDecision::Current,
            Some(schema) if schema == CURRENT_SCHEMA => VersionDecision::Current,
            Some(_) => VersionDecision::Upgrade,
        },
    }
}

fn normalized_schema(sarif: &Sarif) -> Option<String> {
    let schema = sarif.schema.as_deref()?;
    let schema = schema
        .strip_prefix("http://json.schemastore.org/sarif-")
        .unwrap_or(schema);
    let schema = schema
        .strip_prefix("https://schemastore.azurewebsites.net/schemas/json/sarif-")
        .unwrap_or(schema);
    let schema = schema.strip_suffix(".json").unwrap_or(schema);
    Some(schema.to_string())
}

/// Numeric comparison of dotted version strings; missing or unparseable
/// parts count as zero, so an absent version sorts before 2.1.0.
fn compare_versions(left: &str, right: &str) -> Ordering {
    let parse = |version: &str| -> Vec<u64> {
        version
            .split('.')
            .map(|part| part.trim().parse().unwrap_or(0))
            .collect()
    };
    let left = parse(left);
    let right = parse(right);
    for index in 0..left.len().max(right.len()) {
        let ordering = left
            .get(index)
            .copied()
            .unwrap_or(0)
            .cmp(&right.get(index).copied().unwrap_or(0));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Transforms a pre-2.1.0 or schema-variant log with the external
/// converter, returning the transformed log's temporary path.
pub(crate) fn upgrade_log(path: &Path) -> Result<PathBuf> {
    let converter =
        std::env::var(CONVERTER_ENV).unwrap_or_else(|_| "Sarif.Multitool".to_string());
    upgrade_log_with(&converter, path)
}

fn upgrade_log_with(converter: &str, path: &Path) -> Result<PathBuf> {
    let output = tempfile::Builder::new()
        .prefix("sariflens-upgrade-")
        .suffix(".sarif")
        .tempfile()
        .context("failed to create upgrade output file")?;
    let output_path = output
        .into_temp_path()
        .keep()
        .context("failed to keep upgrade output file")?;
    let status = Command::new(converter)
        .arg("transform")
        .arg(path)
        .arg("--force")
        .arg("--pretty-print")
        .arg("--output")
        .arg(&output_path)
        .status()
        .with_context(|| format!("failed to run {converter}"))?;
    if !status.success() {
        anyhow::bail!("{converter} exited with {status}");
    }
    Ok(output_path)
}
