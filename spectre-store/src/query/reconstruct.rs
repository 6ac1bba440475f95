//! Grouping scanned events back into per-resource views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use spectre_core::{Event, ResourceIdentity, StatusSegment, Timestamp};

use super::status::derive_segments;

/// A resource reconstructed across a query window
///
/// Carries the identity, the status segments derived from the resource's own
/// change events, and any Kubernetes `Event` objects attributed to it via
/// their `involvedObject.uid`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Identity of the resource
    pub identity: ResourceIdentity,
    /// Ordered, non-overlapping status segments within the window
    pub status_segments: Vec<StatusSegment>,
    /// Kubernetes Event objects attached to this resource, in time order
    pub events: Vec<Event>,
}

impl Resource {
    /// Ordering key for resource-major pagination
    #[must_use]
    pub fn sort_key(&self) -> (&str, &str, &str) {
        (
            &self.identity.kind,
            &self.identity.namespace,
            &self.identity.name,
        )
    }
}

/// Reconstruct resources from the ordered events of one scan
///
/// Events are grouped by `resource.uid`; `Event`-kind records that name an
/// involved object are attached to that object's reconstruction rather than
/// surfaced as resources of their own. Complexity is linear in the number of
/// scanned events. The result is ordered by `(kind, namespace, name)`.
pub fn reconstruct(
    events: Vec<Event>,
    window_start: Timestamp,
    window_end: Timestamp,
) -> Vec<Resource> {
    let mut change_events: BTreeMap<String, Vec<Event>> = BTreeMap::new();
    let mut attached: BTreeMap<String, Vec<Event>> = BTreeMap::new();
    for event in events {
        match event.resource.involved_object_uid.clone() {
            Some(target) if event.resource.kind == "Event" => {
                attached.entry(target).or_default().push(event);
            }
            _ => {
                change_events
                    .entry(event.resource.uid.clone())
                    .or_default()
                    .push(event);
            }
        }
    }
    let mut resources: Vec<Resource> = change_events
        .into_iter()
        .map(|(uid, events)| {
            // the newest event carries the freshest identity fields
            let identity = events
                .last()
                .map(|e| e.resource.clone())
                .unwrap_or_default();
            let status_segments = derive_segments(&events, window_start, window_end);
            Resource {
                identity,
                status_segments,
                events: attached.remove(&uid).unwrap_or_default(),
            }
        })
        .collect();
    resources.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    resources
}
