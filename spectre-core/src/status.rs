//! Coarse resource status and the derived status-segment model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{event::EventType, Timestamp};

/// Coarse health of a resource at a point in time
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceStatus {
    /// A positive readiness signal and no failing condition
    Ready,
    /// One or more non-fatal conditions, the object still exists
    Warning,
    /// A failing condition of severity error, or a restart loop
    Error,
    /// The object carries a deletion timestamp or was deleted
    Terminating,
    /// Classification could not be derived from the payload
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceStatus::Ready => "Ready",
            ResourceStatus::Warning => "Warning",
            ResourceStatus::Error => "Error",
            ResourceStatus::Terminating => "Terminating",
            ResourceStatus::Unknown => "Unknown",
        };
        s.fmt(f)
    }
}

/// A derived interval during which one resource maintained one status
///
/// Segments of one resource are non-overlapping, ordered, and consecutive
/// segments carry distinct statuses. They are derived per query and never
/// persisted.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSegment {
    /// Segment start (inclusive)
    pub start_time: Timestamp,
    /// Segment end (exclusive)
    pub end_time: Timestamp,
    /// Status held throughout the segment
    pub status: ResourceStatus,
    /// Short human-readable source of the classification
    #[serde(default)]
    pub message: String,
    /// Snapshot the segment was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_data: Option<Value>,
}

/// Conditions that indicate degradation without outright failure
const WARNING_REASONS: &[&str] = &["BackOff", "Throttling", "FailedScheduling", "Unhealthy", "ProgressDeadlineExceeded"];

/// Classify a single event payload into a status and message
///
/// The walk checks, in order: deletion markers, container restart loops,
/// failing conditions, warning conditions, then positive readiness via
/// conditions or `status.phase`. Anything else is `Unknown`.
#[must_use]
pub fn classify(event_type: EventType, data: &Value) -> (ResourceStatus, String) {
    if event_type == EventType::Delete {
        return (ResourceStatus::Terminating, "deleted".to_string());
    }
    if data.pointer("/metadata/deletionTimestamp").is_some() {
        return (ResourceStatus::Terminating, "deletionTimestamp set".to_string());
    }

    if let Some(msg) = restart_loop(data) {
        return (ResourceStatus::Error, msg);
    }

    let conditions = data
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for cond in conditions {
        let ctype = cond.get("type").and_then(Value::as_str).unwrap_or("");
        let status = cond.get("status").and_then(Value::as_str).unwrap_or("");
        let reason = cond.get("reason").and_then(Value::as_str).unwrap_or("");
        let failing = matches!(ctype, "Ready" | "Available" | "Healthy") && status == "False";
        if failing && !WARNING_REASONS.contains(&reason) {
            let message = cond
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(reason)
                .to_string();
            return (
                ResourceStatus::Error,
                if message.is_empty() { format!("{ctype}=False") } else { message },
            );
        }
    }
    for cond in conditions {
        let reason = cond.get("reason").and_then(Value::as_str).unwrap_or("");
        if WARNING_REASONS.contains(&reason) {
            return (ResourceStatus::Warning, reason.to_string());
        }
    }
    for cond in conditions {
        let ctype = cond.get("type").and_then(Value::as_str).unwrap_or("");
        let status = cond.get("status").and_then(Value::as_str).unwrap_or("");
        if matches!(ctype, "Ready" | "Available" | "Healthy") && status == "True" {
            return (ResourceStatus::Ready, format!("{ctype}=True"));
        }
    }

    match data.pointer("/status/phase").and_then(Value::as_str) {
        Some(phase @ ("Running" | "Active" | "Succeeded" | "Bound")) => {
            (ResourceStatus::Ready, phase.to_string())
        }
        Some(phase @ ("Pending" | "Released")) => (ResourceStatus::Warning, phase.to_string()),
        Some(phase @ ("Failed" | "Lost")) => (ResourceStatus::Error, phase.to_string()),
        Some(phase @ "Terminating") => (ResourceStatus::Terminating, phase.to_string()),
        _ => (ResourceStatus::Unknown, String::new()),
    }
}

/// Detect a container stuck in a restart loop
fn restart_loop(data: &Value) -> Option<String> {
    let statuses = data
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)?;
    for cs in statuses {
        let waiting_reason = cs
            .pointer("/state/waiting/reason")
            .and_then(Value::as_str)
            .unwrap_or("");
        if waiting_reason == "CrashLoopBackOff" {
            let name = cs.get("name").and_then(Value::as_str).unwrap_or("container");
            return Some(format!("{name} in CrashLoopBackOff"));
        }
    }
    None
}
