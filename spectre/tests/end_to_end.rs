//! Cross-crate flows: watcher → log → query, and log → pipeline → graph.

use std::sync::Arc;

use spectre::graph::{EdgeQuery, EdgeType, NodeKind};
use spectre::prelude::*;
use spectre::runtime::extract::ScoringConfig;
use tokio_util::sync::CancellationToken;

fn object(value: serde_json::Value) -> RawObject {
    serde_json::from_value(value).unwrap()
}

fn pod(uid: &str, phase: &str) -> RawObject {
    object(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": format!("pod-{uid}"), "namespace": "default", "uid": uid},
        "status": {"phase": phase}
    }))
}

#[test]
fn watch_store_query_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(EventLog::open(LogConfig::new(dir.path())).unwrap());
    let base = Timestamp::from_secs(1_700_000_000);
    let tick = std::sync::atomic::AtomicI64::new(0);
    let adapter = WatcherAdapter::new(log.clone()).with_clock(move || {
        let i = tick.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        base + std::time::Duration::from_secs(i as u64)
    });

    adapter.on_add(&pod("p-1", "Pending")).unwrap();
    adapter
        .on_update(&pod("p-1", "Pending"), &pod("p-1", "Running"))
        .unwrap();
    adapter.on_add(&pod("p-2", "Running")).unwrap();

    let engine = QueryEngine::new(log);
    let page = engine
        .query(
            base,
            base + std::time::Duration::from_secs(600),
            &EventFilter::any(),
            None,
            None,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(page.total_count, 2);

    let p1 = page
        .resources
        .iter()
        .find(|r| r.identity.uid == "p-1")
        .unwrap();
    // Pending then Running: two segments, warning then ready
    assert_eq!(p1.status_segments.len(), 2);
    assert_eq!(p1.status_segments[0].status, ResourceStatus::Warning);
    assert_eq!(p1.status_segments[1].status, ResourceStatus::Ready);
}

#[tokio::test]
async fn log_to_graph_projection_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(EventLog::open(LogConfig::new(dir.path())).unwrap());
    let base = Timestamp::from_secs(1_700_000_000);
    for (i, obj) in [pod("p-1", "Running"), pod("p-2", "Pending")].iter().enumerate() {
        let event = Event::from_object(
            EventType::Create,
            obj,
            base + std::time::Duration::from_secs(i as u64),
        )
        .unwrap();
        log.append(event).unwrap();
    }

    let (events, _) = log
        .read_range(
            base,
            base + std::time::Duration::from_secs(600),
            &EventFilter::any(),
            None,
            &CancellationToken::new(),
        )
        .unwrap();

    let graph = Arc::new(MemoryGraph::new());
    let registry = Arc::new(ExtractorRegistry::with_defaults(ScoringConfig::default()));
    let pipeline = SyncPipeline::new(graph.clone(), registry);

    let report = pipeline.process_batch(&events).await;
    assert_eq!(report.failed, 0);
    let nodes = graph.node_count();
    let edges = graph.edge_count();

    // replaying the same batch changes nothing
    pipeline.process_batch(&events).await;
    assert_eq!(graph.node_count(), nodes);
    assert_eq!(graph.edge_count(), edges);

    let changed = graph
        .edges(EdgeQuery {
            edge_type: Some(EdgeType::Changed),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(changed.len(), 2);
    assert!(graph
        .get_node(NodeKind::ResourceIdentity, "p-1")
        .await
        .unwrap()
        .is_some());
}
