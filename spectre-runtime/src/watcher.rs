//! Adapter between informer callbacks and the append log.

use std::sync::Arc;

use spectre_core::{Event, EventType, RawObject, Result, Timestamp};
use spectre_store::EventLog;
use tracing::{debug, error};

type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Maps informer callbacks onto log appends
///
/// Each callback is a pure mapping from the observed object to exactly one
/// event: extract identity, prune, assemble, forward. The adapter never
/// buffers beyond the duration of a single callback, so the log stays
/// authoritative; write failures are logged and surfaced to the caller.
pub struct WatcherAdapter {
    log: Arc<EventLog>,
    clock: Clock,
}

impl WatcherAdapter {
    /// Adapter writing into the given log
    #[must_use]
    pub fn new(log: Arc<EventLog>) -> Self {
        Self {
            log,
            clock: Arc::new(Timestamp::now),
        }
    }

    /// Replace the observation clock (used by tests and replays)
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// An object appeared
    pub fn on_add(&self, obj: &RawObject) -> Result<()> {
        self.record(EventType::Create, obj)
    }

    /// An object changed; only the new state is recorded
    pub fn on_update(&self, _old: &RawObject, new: &RawObject) -> Result<()> {
        self.record(EventType::Update, new)
    }

    /// An object went away
    pub fn on_delete(&self, obj: &RawObject) -> Result<()> {
        self.record(EventType::Delete, obj)
    }

    fn record(&self, event_type: EventType, obj: &RawObject) -> Result<()> {
        let event = Event::from_object(event_type, obj, (self.clock)())?;
        debug!(resource = %event.resource, %event_type, "recording event");
        self.log.append(event).map_err(|err| {
            error!(error = %err, "failed to append watch event");
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectre_core::EventFilter;
    use spectre_store::LogConfig;
    use tokio_util::sync::CancellationToken;

    fn fixed_clock(secs: i64) -> impl Fn() -> Timestamp {
        move || Timestamp::from_secs(secs)
    }

    fn obj(uid: &str) -> RawObject {
        RawObject::new("v1", "ConfigMap", "cm", uid).within("default")
    }

    #[test]
    fn each_callback_writes_exactly_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(EventLog::open(LogConfig::new(dir.path())).unwrap());
        let adapter = WatcherAdapter::new(log.clone()).with_clock(fixed_clock(1_700_000_000));

        adapter.on_add(&obj("u-1")).unwrap();
        adapter.on_update(&obj("u-1"), &obj("u-1")).unwrap();
        adapter.on_delete(&obj("u-1")).unwrap();

        let (events, _) = log
            .read_range(
                Timestamp::from_secs(1_699_999_000),
                Timestamp::from_secs(1_700_001_000),
                &EventFilter::any(),
                None,
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(events.len(), 3);
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Create, EventType::Delete, EventType::Update]);
    }

    #[test]
    fn invalid_objects_surface_to_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(EventLog::open(LogConfig::new(dir.path())).unwrap());
        let adapter = WatcherAdapter::new(log).with_clock(fixed_clock(1_700_000_000));
        let anonymous = RawObject::new("v1", "ConfigMap", "cm", "");
        assert!(adapter.on_add(&anonymous).is_err());
    }
}
