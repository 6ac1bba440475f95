//! Projection of log events into the graph.

use std::sync::Arc;

use serde_json::Value;
use spectre_core::{Event, EventType, Result};
use spectre_graph::{
    EdgeQuery, EdgeType, GraphClient, GraphEdge, GraphNode, GraphUpdate, NodeKind, NodeRef,
    ValidationState,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extract::{ExtractorRegistry, GraphLookup};

/// Outcome of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Events fully projected
    pub processed: usize,
    /// Events that failed (logged and skipped; the batch continued)
    pub failed: usize,
}

/// Projects events into graph nodes and edges, idempotently
///
/// Per event: upsert the `ResourceIdentity` and `ChangeEvent` nodes, link
/// them with `CHANGED`, then apply every edge the extractor registry emits.
/// All writes MERGE on stable keys, so replaying a batch cannot double
/// anything.
///
/// Batches run in two phases: identities for the whole batch land first,
/// then extraction runs per event in source order. Within one batch an
/// extractor can therefore resolve references to resources that arrived
/// later in the same batch.
pub struct SyncPipeline<C> {
    graph: Arc<C>,
    registry: Arc<ExtractorRegistry>,
}

impl<C: GraphClient> SyncPipeline<C> {
    /// Pipeline writing through the given client
    #[must_use]
    pub fn new(graph: Arc<C>, registry: Arc<ExtractorRegistry>) -> Self {
        Self { graph, registry }
    }

    /// Project a single event
    pub async fn process_event(&self, event: &Event) -> Result<()> {
        event.validate()?;
        self.project_identity(event).await?;
        self.project_relationships(event).await
    }

    /// Project a batch, isolating per-event failures
    ///
    /// This is the ingestion path for import. Events are handled in source
    /// order; a failing event is logged and skipped so partial progress is
    /// never lost.
    pub async fn process_batch(&self, events: &[Event]) -> BatchReport {
        let mut report = BatchReport::default();
        let mut identity_ok = vec![false; events.len()];
        for (i, event) in events.iter().enumerate() {
            let result = match event.validate() {
                Ok(()) => self.project_identity(event).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => identity_ok[i] = true,
                Err(err) => {
                    warn!(event = %event.id, error = %err, "failed to project identity, skipping event");
                    report.failed += 1;
                }
            }
        }
        for (i, event) in events.iter().enumerate() {
            if !identity_ok[i] {
                continue;
            }
            match self.project_relationships(event).await {
                Ok(()) => report.processed += 1,
                Err(err) => {
                    warn!(event = %event.id, error = %err, "failed to project relationships, skipping event");
                    report.failed += 1;
                }
            }
        }
        info!(processed = report.processed, failed = report.failed, "batch projected");
        report
    }

    async fn project_identity(&self, event: &Event) -> Result<()> {
        let mut resource = GraphNode::resource(&event.resource, event.timestamp);
        if event.event_type == EventType::Delete {
            resource = resource
                .tombstone()
                .prop("deletedAt", event.timestamp.as_nanos());
        }
        let mut change = GraphNode::new(NodeKind::ChangeEvent, &event.id, event.timestamp)
            .prop("timestamp", event.timestamp.as_nanos())
            .prop("eventType", event.event_type.to_string())
            .prop("kind", event.resource.kind.clone())
            .prop("resourceUid", event.resource.uid.clone())
            .prop("dataSize", event.data_size);
        if let Some(reason) = event.data.get("reason").and_then(Value::as_str) {
            change = change.prop("reason", reason);
        }
        let mut update = GraphUpdate::new().node(resource).node(change);
        if event.event_type != EventType::Delete {
            update = update.edge(GraphEdge::new(
                EdgeType::Changed,
                NodeRef::new(NodeKind::ChangeEvent, &event.id),
                NodeRef::resource(&event.resource.uid),
                event.timestamp,
            ));
        }
        self.graph.apply(update).await
    }

    async fn project_relationships(&self, event: &Event) -> Result<()> {
        if event.event_type == EventType::Delete {
            return self.mark_inferred_stale(&event.resource.uid).await;
        }
        let lookup = GraphLookup::new(self.graph.clone(), event.timestamp);
        let edges = self.registry.run(event, &lookup).await;
        if edges.is_empty() {
            return Ok(());
        }
        debug!(event = %event.id, edges = edges.len(), "applying extracted edges");
        let mut update = GraphUpdate::new();
        for edge in edges {
            update = update.edge(edge);
        }
        self.graph.apply(update).await
    }

    /// A deleted resource's outgoing inferred edges go stale; revalidation
    /// removes them on its next pass
    async fn mark_inferred_stale(&self, uid: &str) -> Result<()> {
        let mut update = GraphUpdate::new();
        for edge_type in [EdgeType::Manages, EdgeType::CreatesObserved] {
            let edges = self
                .graph
                .edges(EdgeQuery {
                    edge_type: Some(edge_type),
                    from: Some(NodeRef::resource(uid)),
                    ..Default::default()
                })
                .await?;
            for mut edge in edges {
                edge.validation_state = Some(ValidationState::Stale);
                update = update.edge(edge);
            }
        }
        if update.is_empty() {
            return Ok(());
        }
        self.graph.apply(update).await
    }
}

/// One ingestion worker draining a bounded channel into the pipeline
///
/// The channel bound provides back-pressure: a full channel blocks the
/// sender (the watcher side never drops, the log stays authoritative). On
/// cancellation the worker drains whatever is already queued, then exits.
pub struct PipelineWorker {
    handle: tokio::task::JoinHandle<()>,
}

impl PipelineWorker {
    /// Spawn a worker owning the receiving end
    #[must_use]
    pub fn spawn<C: GraphClient + 'static>(
        pipeline: Arc<SyncPipeline<C>>,
        mut events: mpsc::Receiver<Event>,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        while let Ok(event) = events.try_recv() {
                            if let Err(err) = pipeline.process_event(&event).await {
                                warn!(event = %event.id, error = %err, "failed to project event during drain");
                            }
                        }
                        break;
                    }
                    received = events.recv() => match received {
                        Some(event) => {
                            if let Err(err) = pipeline.process_event(&event).await {
                                warn!(event = %event.id, error = %err, "failed to project event");
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("pipeline worker stopped");
        });
        Self { handle }
    }

    /// Wait for the worker to finish
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
