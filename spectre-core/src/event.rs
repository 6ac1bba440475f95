//! The canonical event record and its factory.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{object::RawObject, Error, ResourceIdentity, Result, Timestamp};

/// The action an event records
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// The resource was first observed
    Create,
    /// The resource changed
    Update,
    /// The resource was removed
    Delete,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Create => "create".fmt(f),
            EventType::Update => "update".fmt(f),
            EventType::Delete => "delete".fmt(f),
        }
    }
}

/// An atomic record of one observed change to a cluster resource
///
/// `id` and `timestamp` are immutable once the event is written to the log;
/// events are removed only by bulk retention, never mutated.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique event id
    pub id: String,
    /// Observation time in Unix nanoseconds
    pub timestamp: Timestamp,
    /// Action recorded by this event
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Identity of the observed resource
    pub resource: ResourceIdentity,
    /// Pruned snapshot of the observed object
    pub data: Value,
    /// Serialized size of the snapshot before pruning, in bytes
    #[serde(default)]
    pub data_size: u64,
}

/// High-volume metadata annotations dropped before storage
const PRUNED_ANNOTATIONS: &[&str] = &["kubectl.kubernetes.io/last-applied-configuration"];

impl Event {
    /// Build an event from an observed object
    ///
    /// The snapshot is pruned of server-side-apply bookkeeping
    /// (`metadata.managedFields` and the last-applied-configuration
    /// annotation) whose churn would dominate storage. `data_size` is
    /// recorded before pruning so observability sees the original cost.
    /// A pruning failure is non-fatal and falls back to the untrimmed
    /// payload.
    pub fn from_object(event_type: EventType, obj: &RawObject, observed_at: Timestamp) -> Result<Self> {
        let resource = obj.identity();
        let raw = serde_json::to_value(obj)?;
        let data_size = serde_json::to_vec(&raw).map(|b| b.len() as u64).unwrap_or(0);
        let data = match prune(raw.clone()) {
            Ok(v) => v,
            Err(err) => {
                warn!(%resource, error = %err, "failed to prune event payload, storing untrimmed");
                raw
            }
        };
        let event = Event {
            id: format!("{}-{}-{}", resource.uid, event_type, observed_at.as_nanos()),
            timestamp: observed_at,
            event_type,
            resource,
            data,
            data_size,
        };
        event.validate()?;
        Ok(event)
    }

    /// Reject events that cannot be attributed or ordered
    pub fn validate(&self) -> Result<()> {
        if self.resource.uid.is_empty() {
            return Err(Error::Validation("event resource has empty uid".into()));
        }
        if self.resource.kind.is_empty() {
            return Err(Error::Validation("event resource has empty kind".into()));
        }
        if self.timestamp.as_nanos() <= 0 {
            return Err(Error::Validation(format!(
                "event timestamp must be positive, got {}",
                self.timestamp
            )));
        }
        Ok(())
    }

    /// Reparse the stored snapshot into a [`RawObject`] view
    pub fn object(&self) -> Result<RawObject> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

fn prune(mut value: Value) -> Result<Value> {
    let meta = value
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| Error::Validation("payload has no metadata object".into()))?;
    meta.remove("managedFields");
    if let Some(annotations) = meta.get_mut("annotations").and_then(Value::as_object_mut) {
        for key in PRUNED_ANNOTATIONS {
            annotations.remove(*key);
        }
        if annotations.is_empty() {
            meta.remove("annotations");
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod() -> RawObject {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-0",
                "namespace": "default",
                "uid": "p-1",
                "annotations": {
                    "kubectl.kubernetes.io/last-applied-configuration": "{...}",
                    "team": "platform"
                },
                "managedFields": [{"manager": "kubelet", "operation": "Update"}]
            },
            "status": {"phase": "Running"}
        }))
        .unwrap()
    }

    #[test]
    fn factory_prunes_but_records_original_size() {
        let ts = Timestamp::from_secs(1_700_000_000);
        let event = Event::from_object(EventType::Create, &pod(), ts).unwrap();
        assert!(event.data.pointer("/metadata/managedFields").is_none());
        assert!(event
            .data
            .pointer("/metadata/annotations/kubectl.kubernetes.io~1last-applied-configuration")
            .is_none());
        assert_eq!(
            event.data.pointer("/metadata/annotations/team"),
            Some(&json!("platform"))
        );
        // original size counts the pruned fields
        assert!(event.data_size > serde_json::to_vec(&event.data).unwrap().len() as u64);
    }

    #[test]
    fn validation_rejects_anonymous_events() {
        let mut obj = pod();
        obj.metadata.uid.clear();
        let err = Event::from_object(EventType::Create, &obj, Timestamp::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err =
            Event::from_object(EventType::Update, &pod(), Timestamp::from_nanos(0)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn event_id_is_stable_per_observation() {
        let ts = Timestamp::from_secs(1_700_000_000);
        let a = Event::from_object(EventType::Update, &pod(), ts).unwrap();
        let b = Event::from_object(EventType::Update, &pod(), ts).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, format!("p-1-update-{}", ts.as_nanos()));
    }
}
