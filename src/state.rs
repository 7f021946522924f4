use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default location of the persisted view preferences.
pub(crate) const DEFAULT_STATE_PATH: &str = ".sariflens/state.json";

/// Checkbox states nested by category, e.g. `Level` -> `error` -> true.
pub(crate) type FilterCategories = BTreeMap<String, BTreeMap<String, bool>>;

/// Persisted view preferences: row-filter states and optional-column
/// visibility, round-tripped verbatim (unknown keys survive a rewrite).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct ViewState {
    #[serde(rename = "filtersRow", default)]
    pub(crate) filters_row: FilterCategories,
    #[serde(rename = "filtersColumn", default)]
    pub(crate) filters_column: FilterCategories,
    #[serde(flatten)]
    pub(crate) rest: BTreeMap<String, serde_json::Value>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            filters_row: BTreeMap::from([
                (
                    "Level".to_string(),
                    category(&["error", "warning", "note", "none"], true),
                ),
                (
                    "Baseline".to_string(),
                    category(&["new", "unchanged", "updated", "absent"], true),
                ),
                (
                    "Suppression".to_string(),
                    category(&["not suppressed", "suppressed"], true),
                ),
            ]),
            filters_column: BTreeMap::from([(
                "Columns".to_string(),
                category(&["Baseline", "Suppression", "Rule"], false),
            )]),
            rest: BTreeMap::new(),
        }
    }
}

fn category(values: &[&str], enabled: bool) -> BTreeMap<String, bool> {
    values
        .iter()
        .map(|value| (value.to_string(), enabled))
        .collect()
}

/// Loads preferences; a missing file yields the defaults.
pub(crate) fn load_state(path: &Path) -> Result<ViewState> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ViewState::default()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read view state {}", path.display()));
        }
    };
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse view state {}", path.display()))
}

/// Writes preferences as indented JSON with a stable key order.
pub(crate) fn save_state(path: &Path, state: &ViewState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create state directory {}", parent.display())
            })?;
        }
    }
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    state
        .serialize(&mut serializer)
        .context("failed to serialize view state")?;
    buffer.push(b'\n');
    fs::write(path, buffer)
        .with_context(|| format!("failed to write view state {}", path.display()))
}
