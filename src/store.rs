use std::collections::BTreeMap;

use serde_sarif::sarif::Result as SarifResult;

use crate::augment::{LoadedLog, ResultAnnotations, ResultId};
use crate::basing::ArtifactNames;
use crate::distinct::map_distinct;
use crate::events::{EventSink, ViewEvent};

/// Active set of loaded logs.
#[derive(Default)]
pub(crate) struct Store {
    logs: Vec<LoadedLog>,
}

impl Store {
    pub(crate) fn logs(&self) -> &[LoadedLog] {
        &self.logs
    }

    /// Appends loaded logs, announcing each on the view channel.
    pub(crate) fn add_logs(&mut self, logs: Vec<LoadedLog>, sink: &dyn EventSink) {
        for log in logs {
            sink.emit(&ViewEvent::LogAdded {
                uri: log.uri.clone(),
                uri_upgraded: log.uri_upgraded.clone(),
            });
            self.logs.push(log);
        }
    }

    /// Removes a log by origin URI, announcing the removal.
    pub(crate) fn remove_log(&mut self, uri: &str, sink: &dyn EventSink) -> bool {
        let Some(index) = self.logs.iter().position(|log| log.uri == uri) else {
            return false;
        };
        self.logs.remove(index);
        sink.emit(&ViewEvent::LogRemoved {
            uri: uri.to_string(),
        });
        true
    }

    pub(crate) fn find_log(&self, uri: &str) -> Option<&LoadedLog> {
        self.logs.iter().find(|log| log.uri == uri)
    }

    /// Annotations of every result across the loaded logs, in load order.
    pub(crate) fn results(&self) -> impl Iterator<Item = &ResultAnnotations> {
        self.logs
            .iter()
            .flat_map(|log| log.runs.iter())
            .flat_map(|run| run.results.iter())
    }

    /// Recorded result plus annotations for a selection id.
    pub(crate) fn select(&self, id: &ResultId) -> Option<(&SarifResult, &ResultAnnotations)> {
        self.find_log(&id.0)?.result(id.1, id.2)
    }
}

impl ArtifactNames for Store {
    /// Filenames that are unambiguous across every loaded log.
    fn distinct_artifact_names(&self) -> BTreeMap<String, String> {
        map_distinct(
            self.logs
                .iter()
                .flat_map(|log| log.distinct_names.iter())
                .map(|(name, uri)| (name.clone(), uri.clone())),
        )
    }
}
