use serde::Serialize;
use tracing::debug;

use crate::augment::ResultId;

/// Notifications carried over the view channel.
///
/// Only the payloads are defined here; the transport belongs to the host.
/// Field order is fixed by the type so serialized output is stable.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub(crate) enum ViewEvent {
    Select {
        id: ResultId,
    },
    LogAdded {
        uri: String,
        #[serde(rename = "uriUpgraded", skip_serializing_if = "Option::is_none")]
        uri_upgraded: Option<String>,
    },
    LogRemoved {
        uri: String,
    },
}

impl ViewEvent {
    pub(crate) fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Capability to deliver view-channel events.
pub(crate) trait EventSink {
    fn emit(&self, event: &ViewEvent);
}

/// Sink that records events in the diagnostic log stream.
pub(crate) struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ViewEvent) {
        debug!(event = %event.to_json(), "view event");
    }
}
