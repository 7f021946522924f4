use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::warn;

use crate::augment::EMBEDDED_SCHEME;
use crate::util::{common_length, file_name};

/// Capability to test whether a candidate path can be opened.
///
/// No assumption is made about why a path fails; permissions and absence
/// are indistinguishable to callers.
pub(crate) trait FileExists {
    fn exists(&self, path: &str) -> bool;
}

/// Existence oracle backed by the local filesystem.
pub(crate) struct LocalFiles;

impl FileExists for LocalFiles {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }
}

/// Capability to ask the user to locate a file the resolver cannot find.
pub(crate) trait LocatePrompt {
    /// Returns the chosen replacement path, or None on decline or cancel.
    fn locate(&self, file_name: &str, extension: Option<&str>) -> Option<String>;
}

/// Prompt for non-interactive contexts: always declines.
pub(crate) struct NoPrompt;

impl LocatePrompt for NoPrompt {
    fn locate(&self, _file_name: &str, _extension: Option<&str>) -> Option<String> {
        None
    }
}

/// Provider of the active distinct-artifact-name index.
pub(crate) trait ArtifactNames {
    fn distinct_artifact_names(&self) -> BTreeMap<String, String>;
}

/// Maps between artifact paths recorded in logs and paths present on the
/// local filesystem, learning prefix-rewrite rules from successful
/// resolutions. Caches and learned rules only grow within a session.
pub(crate) struct Baser<'a> {
    distinct_local_names: BTreeMap<String, String>,
    artifact_names: &'a dyn ArtifactNames,
    files: &'a dyn FileExists,
    prompt: &'a dyn LocatePrompt,
    open_documents: Vec<String>,
    workspace_open: bool,
    /// Learned (artifact-prefix, local-prefix) pairs, in insertion order.
    bases_artifact_to_local: Vec<(String, String)>,
    validated_artifact_to_local: BTreeMap<String, String>,
    validated_local_to_artifact: BTreeMap<String, String>,
    /// Artifact paths already offered a locate prompt this session.
    prompted: BTreeSet<String>,
}

impl<'a> Baser<'a> {
    pub(crate) fn new(
        distinct_local_names: BTreeMap<String, String>,
        artifact_names: &'a dyn ArtifactNames,
        files: &'a dyn FileExists,
        prompt: &'a dyn LocatePrompt,
    ) -> Self {
        Self {
            distinct_local_names,
            artifact_names,
            files,
            prompt,
            open_documents: Vec::new(),
            workspace_open: true,
            bases_artifact_to_local: Vec::new(),
            validated_artifact_to_local: BTreeMap::new(),
            validated_local_to_artifact: BTreeMap::new(),
            prompted: BTreeSet::new(),
        }
    }

    pub(crate) fn set_open_documents(&mut self, open_documents: Vec<String>) {
        self.open_documents = open_documents;
    }

    pub(crate) fn set_workspace_open(&mut self, workspace_open: bool) {
        self.workspace_open = workspace_open;
    }

    /// Resolves a recorded artifact path to an openable local path.
    ///
    /// Returns an empty string when resolution fails; absence is not an
    /// error. At most one locate prompt is offered per distinct path per
    /// session.
    pub(crate) fn resolve_artifact_to_local(&mut self, artifact_path: &str) -> String {
        if artifact_path.starts_with(EMBEDDED_SCHEME) {
            // Embedded contents bypass the filesystem entirely.
            return artifact_path.to_string();
        }
        if let Some(local_path) = self.try_resolve(artifact_path) {
            return local_path;
        }
        if !self.prompted.insert(artifact_path.to_string()) {
            return String::new();
        }
        let name = file_name(artifact_path).unwrap_or(artifact_path);
        if let Some(chosen) = self.prompt.locate(name, extension_of(name)) {
            let chosen_name = file_name(&chosen).unwrap_or(&chosen);
            if chosen_name != name {
                warn!("file names must match: \"{name}\" and \"{chosen_name}\"");
                return String::new();
            }
            self.update_bases(artifact_path, &chosen);
        }
        self.try_resolve(artifact_path).unwrap_or_default()
    }

    /// Translates a local path to its artifact path, learning from
    /// distinct names; returns the input unchanged when no mapping is
    /// known.
    pub(crate) fn resolve_local_to_artifact(&mut self, local_path: &str) -> String {
        if !self.validated_local_to_artifact.contains_key(local_path) {
            if let Some(name) = file_name(local_path) {
                // With no workspace open, the open documents are the
                // implicit workspace and the local distinctness check is
                // skipped.
                let locally_distinct = if self.workspace_open {
                    self.distinct_local_names.contains_key(name)
                } else {
                    true
                };
                if locally_distinct {
                    if let Some(artifact_path) =
                        self.artifact_names.distinct_artifact_names().get(name).cloned()
                    {
                        self.update_validated(&artifact_path, local_path);
                        self.update_bases(&artifact_path, local_path);
                    }
                }
            }
        }
        self.validated_local_to_artifact
            .get(local_path)
            .cloned()
            .unwrap_or_else(|| local_path.to_string())
    }

    /// Non-interactive resolution: cache, verbatim existence, learned
    /// rules, distinct names, then open documents.
    fn try_resolve(&mut self, artifact_path: &str) -> Option<String> {
        if let Some(local_path) = self.validated_artifact_to_local.get(artifact_path) {
            return Some(local_path.clone());
        }
        if self.files.exists(artifact_path) {
            self.update_validated(artifact_path, artifact_path);
            return Some(artifact_path.to_string());
        }

        let mut rewritten = None;
        for (artifact_base, local_base) in &self.bases_artifact_to_local {
            if !artifact_path.starts_with(artifact_base.as_str()) {
                continue;
            }
            let local_path = format!("{local_base}{}", &artifact_path[artifact_base.len()..]);
            if self.files.exists(&local_path) {
                rewritten = Some(local_path);
                break; // First matching rule wins.
            }
        }
        if let Some(local_path) = rewritten {
            self.update_validated(artifact_path, &local_path);
            return Some(local_path);
        }

        let name = file_name(artifact_path)?;
        if self.artifact_names.distinct_artifact_names().contains_key(name) {
            if let Some(local_path) = self.distinct_local_names.get(name).cloned() {
                self.update_validated(artifact_path, &local_path);
                self.update_bases(artifact_path, &local_path);
                return Some(local_path);
            }
        }
        if let Some(document) = self
            .open_documents
            .iter()
            .find(|document| file_name(document.as_str()) == Some(name))
            .cloned()
        {
            self.update_validated(artifact_path, &document);
            self.update_bases(artifact_path, &document);
            return Some(document);
        }
        None
    }

    /// Learns a prefix-rewrite rule from two paths that share a trailing
    /// run of segments. Paths sharing no suffix yield no rule.
    fn update_bases(&mut self, artifact: &str, local: &str) {
        let artifact_parts: Vec<&str> = artifact.split('/').collect();
        let local_parts: Vec<&str> = local.split('/').collect();
        let artifact_reversed: Vec<&str> = artifact_parts.iter().rev().copied().collect();
        let local_reversed: Vec<&str> = local_parts.iter().rev().copied().collect();
        let shared = common_length(&artifact_reversed, &local_reversed);
        if shared == 0 {
            return;
        }
        let artifact_base = artifact_parts[..artifact_parts.len() - shared].join("/");
        let local_base = local_parts[..local_parts.len() - shared].join("/");
        match self
            .bases_artifact_to_local
            .iter_mut()
            .find(|(base, _)| *base == artifact_base)
        {
            Some(entry) => entry.1 = local_base,
            None => self.bases_artifact_to_local.push((artifact_base, local_base)),
        }
    }

    fn update_validated(&mut self, artifact: &str, local: &str) {
        self.validated_artifact_to_local
            .insert(artifact.to_string(), local.to_string());
        self.validated_local_to_artifact
            .insert(local.to_string(), artifact.to_string());
    }
}

/// Trailing extension of a filename, for the locate dialog's filter.
fn extension_of(name: &str) -> Option<&str> {
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    extension
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_')
        .then_some(extension)
}
