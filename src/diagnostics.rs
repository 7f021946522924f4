use serde_sarif::sarif::Result as SarifResult;

use crate::augment::Region;
use crate::basing::Baser;
use crate::store::Store;

/// Severity bucket for published findings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Severity {
    Error,
    Warning,
    Information,
}

/// One finding attached to an open document.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Diagnostic {
    pub(crate) message: String,
    pub(crate) region: Option<Region>,
    pub(crate) severity: Severity,
}

/// Findings for one local document, matched through its artifact path.
pub(crate) fn diagnostics_for(
    store: &Store,
    baser: &mut Baser<'_>,
    local_path: &str,
) -> Vec<Diagnostic> {
    let artifact_path = baser.resolve_local_to_artifact(local_path);
    store
        .results()
        .filter(|result| result.uri.as_deref() == Some(artifact_path.as_str()))
        .map(|result| Diagnostic {
            message: result.message.clone(),
            region: result.region,
            severity: match result.level.as_str() {
                "error" => Severity::Error,
                "warning" => Severity::Warning,
                _ => Severity::Information, // note, none, anything unrecognized.
            },
        })
        .collect()
}

/// Start lines of the first code flow's first thread flow, as recorded.
pub(crate) fn code_flow_lines(result: &SarifResult) -> Vec<Option<i64>> {
    result
        .code_flows
        .as_ref()
        .and_then(|flows| flows.first())
        .and_then(|flow| flow.thread_flows.first())
        .map(|thread| {
            thread
                .locations
                .iter()
                .map(|flow_location| {
                    flow_location
                        .location
                        .as_ref()
                        .and_then(|location| location.physical_location.as_ref())
                        .and_then(|physical| physical.region.as_ref())
                        .and_then(|region| region.start_line)
                })
                .collect()
        })
        .unwrap_or_default()
}
