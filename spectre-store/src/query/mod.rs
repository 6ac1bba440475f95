//! Time-windowed queries over the append log.

mod reconstruct;
pub use reconstruct::{reconstruct, Resource};

pub mod status;
pub use status::derive_segments;

mod timeline;
pub use timeline::{TimelineBatch, TimelineChunk, TimelineMetadata, TimelineRequest};

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use serde::{Deserialize, Serialize};
use spectre_core::{
    Cursor, Error, Event, EventFilter, ResourceIdentity, Result, StatusSegment, Timestamp,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::log::{EventLog, ScanCounters};

/// One page of reconstructed resources
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    /// Resources in `(kind, namespace, name)` order
    pub resources: Vec<Resource>,
    /// Resources matching the query across all pages
    pub total_count: usize,
    /// Scan statistics
    pub counters: ScanCounters,
    /// Cursor resuming after this page, present iff `has_more`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Whether resources beyond this page were detected
    pub has_more: bool,
    /// Wall time spent executing
    pub execution_time_ms: u64,
}

/// Distinct attribute values and bounds over a window
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    /// Distinct namespaces observed
    pub namespaces: Vec<String>,
    /// Distinct kinds observed
    pub kinds: Vec<String>,
    /// Distinct API groups observed
    pub groups: Vec<String>,
    /// Distinct resources per kind
    pub counts_by_kind: BTreeMap<String, usize>,
    /// Smallest event timestamp in the window, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest: Option<Timestamp>,
    /// Largest event timestamp in the window, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<Timestamp>,
}

/// Identity-only search results
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Matching resource identities
    pub resources: Vec<ResourceIdentity>,
    /// Number of matches
    pub count: usize,
    /// Wall time spent executing
    pub execution_time_ms: u64,
}

/// Executes time-windowed queries against an [`EventLog`]
///
/// The engine treats `[start, end]` literally; any 30-second bucketing for
/// cacheability is an upstream-handler concern.
#[derive(Clone)]
pub struct QueryEngine {
    log: Arc<EventLog>,
}

impl QueryEngine {
    /// Wrap a log
    #[must_use]
    pub fn new(log: Arc<EventLog>) -> Self {
        Self { log }
    }

    /// The underlying log
    #[must_use]
    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    fn validate_window(start: Timestamp, end: Timestamp) -> Result<()> {
        if start.as_nanos() <= 0 || end.as_nanos() <= 0 {
            return Err(Error::Validation("window bounds must be positive".into()));
        }
        if start > end {
            return Err(Error::Validation(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(())
    }

    /// Reconstruct resources in the window, with cursor pagination
    pub fn query(
        &self,
        start: Timestamp,
        end: Timestamp,
        filter: &EventFilter,
        page_size: Option<usize>,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<QueryPage> {
        Self::validate_window(start, end)?;
        let cursor = cursor.map(Cursor::decode).transpose()?;
        let began = Instant::now();
        let (events, counters) = self.log.read_range(start, end, filter, None, cancel)?;
        let mut resources = reconstruct(events, start, end);
        let total_count = resources.len();
        if let Some(cursor) = cursor {
            resources.retain(|r| {
                let (kind, ns, name) = r.sort_key();
                (kind, ns, name) > (cursor.kind.as_str(), cursor.namespace.as_str(), cursor.name.as_str())
            });
        }
        let page_size = page_size.unwrap_or(usize::MAX).max(1);
        let has_more = resources.len() > page_size;
        resources.truncate(page_size);
        let next_cursor = if has_more {
            resources.last().map(|r| {
                Cursor::new(&r.identity.kind, &r.identity.namespace, &r.identity.name).encode()
            })
        } else {
            None
        };
        debug!(
            total_count,
            returned = resources.len(),
            ?counters,
            "query executed"
        );
        Ok(QueryPage {
            resources,
            total_count,
            counters,
            next_cursor,
            has_more,
            execution_time_ms: began.elapsed().as_millis() as u64,
        })
    }

    /// Identity-only search over the window
    pub fn search(
        &self,
        start: Timestamp,
        end: Timestamp,
        filter: &EventFilter,
        cancel: &CancellationToken,
    ) -> Result<SearchResult> {
        let began = Instant::now();
        let page = self.query(start, end, filter, None, None, cancel)?;
        let resources: Vec<ResourceIdentity> =
            page.resources.into_iter().map(|r| r.identity).collect();
        Ok(SearchResult {
            count: resources.len(),
            resources,
            execution_time_ms: began.elapsed().as_millis() as u64,
        })
    }

    /// Status segments of one resource
    pub fn get_segments(
        &self,
        resource_uid: &str,
        start: Timestamp,
        end: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<StatusSegment>> {
        Self::validate_window(start, end)?;
        let (events, _) = self
            .log
            .read_range(start, end, &EventFilter::any(), None, cancel)?;
        let own: Vec<Event> = events
            .into_iter()
            .filter(|e| e.resource.uid == resource_uid && e.resource.kind != "Event")
            .collect();
        Ok(derive_segments(&own, start, end))
    }

    /// Kubernetes Events attributed to one resource via `involvedObject.uid`
    pub fn get_events(
        &self,
        resource_uid: &str,
        start: Timestamp,
        end: Timestamp,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>> {
        Self::validate_window(start, end)?;
        let filter = EventFilter::any().kind("Event");
        let (events, _) = self.log.read_range(start, end, &filter, None, cancel)?;
        let mut attributed: Vec<Event> = events
            .into_iter()
            .filter(|e| e.resource.involved_object_uid.as_deref() == Some(resource_uid))
            .collect();
        if let Some(limit) = limit {
            attributed.truncate(limit);
        }
        Ok(attributed)
    }

    /// Distinct namespaces, kinds, groups, per-kind resource counts and the
    /// observed timestamp bounds within the window
    pub fn query_distinct_metadata(
        &self,
        start: Timestamp,
        end: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<QueryMetadata> {
        Self::validate_window(start, end)?;
        let (events, _) = self
            .log
            .read_range(start, end, &EventFilter::any(), None, cancel)?;
        let mut namespaces = std::collections::BTreeSet::new();
        let mut kinds = std::collections::BTreeSet::new();
        let mut groups = std::collections::BTreeSet::new();
        let mut uids_by_kind: BTreeMap<String, std::collections::BTreeSet<String>> = BTreeMap::new();
        let mut earliest: Option<Timestamp> = None;
        let mut latest: Option<Timestamp> = None;
        for event in &events {
            if !event.resource.namespace.is_empty() {
                namespaces.insert(event.resource.namespace.clone());
            }
            kinds.insert(event.resource.kind.clone());
            groups.insert(event.resource.group.clone());
            uids_by_kind
                .entry(event.resource.kind.clone())
                .or_default()
                .insert(event.resource.uid.clone());
            earliest = Some(earliest.map_or(event.timestamp, |e| e.min(event.timestamp)));
            latest = Some(latest.map_or(event.timestamp, |l| l.max(event.timestamp)));
        }
        Ok(QueryMetadata {
            namespaces: namespaces.into_iter().collect(),
            kinds: kinds.into_iter().collect(),
            groups: groups.into_iter().collect(),
            counts_by_kind: uids_by_kind
                .into_iter()
                .map(|(k, uids)| (k, uids.len()))
                .collect(),
            earliest,
            latest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogConfig;
    use crate::testutil::{event, event_at, event_with_status};
    use serde_json::json;
    use spectre_core::{EventType, ResourceStatus};

    fn engine(dir: &std::path::Path) -> QueryEngine {
        let mut config = LogConfig::new(dir);
        config.block_target_bytes = 512;
        QueryEngine::new(Arc::new(EventLog::open(config).unwrap()))
    }

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    const T: i64 = 1_700_000_000_000_000_000;

    #[test]
    fn late_arrivals_reconstruct_into_ordered_segments() {
        // S1: create at t, then a late update one minute earlier
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let t = Timestamp::from_nanos(T);
        let earlier = Timestamp::from_nanos(T - 60 * 1_000_000_000);
        engine
            .log()
            .append(event_with_status("Pod", "ns", "p-1", t, EventType::Create, json!({"phase": "Running"})))
            .unwrap();
        engine
            .log()
            .append(event_at("Pod", "ns", "p-1", earlier, EventType::Update))
            .unwrap();

        let window_start = t - std::time::Duration::from_secs(900);
        let page = engine
            .query(window_start, t, &EventFilter::any(), None, None, &cancel())
            .unwrap();
        assert_eq!(page.total_count, 1);
        let segments = &page.resources[0].status_segments;
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start_time, earlier);
        assert_eq!(segments[0].status, ResourceStatus::Unknown);
        assert_eq!(segments[1].status, ResourceStatus::Ready);
    }

    #[test]
    fn pre_window_state_is_not_reported() {
        // S2: a create strictly before the window must not surface
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .log()
            .append(event("Pod", "ns", "p-1", 1_700_000_000))
            .unwrap();
        let page = engine
            .query(
                Timestamp::from_secs(1_700_000_500),
                Timestamp::from_secs(1_700_000_900),
                &EventFilter::any(),
                None,
                None,
                &cancel(),
            )
            .unwrap();
        assert_eq!(page.total_count, 0);
        assert!(page.resources.is_empty());
    }

    #[test]
    fn segment_timestamps_stay_inside_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        for i in 0..5 {
            engine
                .log()
                .append(event("Pod", "ns", "p-1", 1_700_000_000 + i * 100))
                .unwrap();
        }
        let start = Timestamp::from_secs(1_700_000_150);
        let end = Timestamp::from_secs(1_700_000_350);
        let page = engine
            .query(start, end, &EventFilter::any(), None, None, &cancel())
            .unwrap();
        for resource in &page.resources {
            for segment in &resource.status_segments {
                assert!(segment.start_time >= start && segment.start_time <= end);
            }
        }
    }

    #[test]
    fn cursor_pagination_walks_the_resource_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        for i in 0..7 {
            engine
                .log()
                .append(event("Pod", "ns", &format!("p-{i}"), 1_700_000_000 + i))
                .unwrap();
        }
        let start = Timestamp::from_secs(1_699_999_000);
        let end = Timestamp::from_secs(1_700_001_000);

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = engine
                .query(start, end, &EventFilter::any(), Some(3), cursor.as_deref(), &cancel())
                .unwrap();
            assert_eq!(page.total_count, 7);
            seen.extend(page.resources.iter().map(|r| r.identity.uid.clone()));
            if !page.has_more {
                break;
            }
            cursor = page.next_cursor.clone();
            assert!(cursor.is_some());
        }
        assert_eq!(seen.len(), 7);
        let mut sorted = seen.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 7);
    }

    #[test]
    fn metadata_reports_distincts_and_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.log().append(event("Pod", "a", "p-1", 1_700_000_000)).unwrap();
        engine.log().append(event("Pod", "b", "p-2", 1_700_000_010)).unwrap();
        engine.log().append(event("Service", "a", "s-1", 1_700_000_020)).unwrap();
        let meta = engine
            .query_distinct_metadata(
                Timestamp::from_secs(1_699_999_000),
                Timestamp::from_secs(1_700_001_000),
                &cancel(),
            )
            .unwrap();
        assert_eq!(meta.namespaces, vec!["a", "b"]);
        assert_eq!(meta.kinds, vec!["Pod", "Service"]);
        assert_eq!(meta.counts_by_kind["Pod"], 2);
        assert_eq!(meta.earliest, Some(Timestamp::from_secs(1_700_000_000)));
        assert_eq!(meta.latest, Some(Timestamp::from_secs(1_700_000_020)));
    }

    #[test]
    fn invalid_windows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let err = engine
            .query(
                Timestamp::from_secs(2),
                Timestamp::from_secs(1),
                &EventFilter::any(),
                None,
                None,
                &cancel(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.code().as_str(), "INVALID_REQUEST");
    }

    #[test]
    fn events_are_attributed_via_involved_object() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.log().append(event("Pod", "ns", "p-1", 1_700_000_000)).unwrap();
        let k8s_event: spectre_core::RawObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Event",
            "metadata": {"name": "e", "namespace": "ns", "uid": "e-1"},
            "involvedObject": {"uid": "p-1"}
        }))
        .unwrap();
        engine
            .log()
            .append(
                Event::from_object(EventType::Create, &k8s_event, Timestamp::from_secs(1_700_000_001))
                    .unwrap(),
            )
            .unwrap();
        let events = engine
            .get_events(
                "p-1",
                Timestamp::from_secs(1_699_999_000),
                Timestamp::from_secs(1_700_001_000),
                None,
                &cancel(),
            )
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource.uid, "e-1");
    }
}
