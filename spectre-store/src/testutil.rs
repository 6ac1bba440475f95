//! Shared fixtures for store tests.

use serde_json::Value;
use spectre_core::{Event, EventType, RawObject, Timestamp};

/// An update event for a minimal object of the given identity
pub(crate) fn event(kind: &str, ns: &str, uid: &str, ts_secs: i64) -> Event {
    event_at(kind, ns, uid, Timestamp::from_secs(ts_secs), EventType::Update)
}

/// An event with explicit timestamp and type
pub(crate) fn event_at(
    kind: &str,
    ns: &str,
    uid: &str,
    ts: Timestamp,
    event_type: EventType,
) -> Event {
    let obj = RawObject::new("apps/v1", kind, &format!("{uid}-name"), uid).within(ns);
    Event::from_object(event_type, &obj, ts).unwrap()
}

/// An event whose payload carries the given `status` object
pub(crate) fn event_with_status(
    kind: &str,
    ns: &str,
    uid: &str,
    ts: Timestamp,
    event_type: EventType,
    status: Value,
) -> Event {
    let obj = RawObject::new("apps/v1", kind, &format!("{uid}-name"), uid)
        .within(ns)
        .data(serde_json::json!({ "status": status }));
    Event::from_object(event_type, &obj, ts).unwrap()
}
