//! Pluggable relationship extraction.

mod evidence;
pub use evidence::{decayed_confidence, EvidenceBuilder, ScoringConfig};

mod flux;
pub use flux::HelmReleaseExtractor;

mod gateway;
pub use gateway::GatewayApiExtractor;

mod native;
pub use native::NativeOwnershipExtractor;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use spectre_core::{Event, Result, Timestamp};
use spectre_graph::{
    cypher::Statement, EdgeQuery, EdgeType, GraphClient, GraphEdge, GraphNode, NodeKind, NodeRef,
};
use tracing::warn;

/// Resolves references against the live graph
///
/// Extractors never re-read the log; identity lookups, recent change events
/// and raw dialect queries all go through this seam.
#[async_trait]
pub trait ResourceLookup: Send + Sync {
    /// A resource node by apiserver uid
    async fn find_by_uid(&self, uid: &str) -> Result<Option<GraphNode>>;

    /// A resource node by namespace, kind and name
    async fn find_by_namespace(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<GraphNode>>;

    /// Change events attached to a resource within the trailing window
    async fn find_recent_events(&self, uid: &str, window: Duration) -> Result<Vec<GraphNode>>;

    /// Raw pass-through in the graph engine's dialect
    async fn query_graph(&self, statement: Statement) -> Result<Vec<Value>>;
}

/// [`ResourceLookup`] over a [`GraphClient`]
pub struct GraphLookup<C> {
    graph: Arc<C>,
    /// The reference instant for recency windows
    now: Timestamp,
}

impl<C: GraphClient> GraphLookup<C> {
    /// Lookup evaluating recency relative to `now`
    #[must_use]
    pub fn new(graph: Arc<C>, now: Timestamp) -> Self {
        Self { graph, now }
    }
}

#[async_trait]
impl<C: GraphClient> ResourceLookup for GraphLookup<C> {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<GraphNode>> {
        self.graph.get_node(NodeKind::ResourceIdentity, uid).await
    }

    async fn find_by_namespace(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<GraphNode>> {
        let found = self
            .graph
            .find_nodes(
                NodeKind::ResourceIdentity,
                &[
                    ("namespace", namespace.into()),
                    ("kind", kind.into()),
                    ("name", name.into()),
                ],
            )
            .await?;
        Ok(found.into_iter().next())
    }

    async fn find_recent_events(&self, uid: &str, window: Duration) -> Result<Vec<GraphNode>> {
        let since = self.now - window;
        let edges = self
            .graph
            .edges(EdgeQuery {
                edge_type: Some(EdgeType::Changed),
                to: Some(NodeRef::resource(uid)),
                ..Default::default()
            })
            .await?;
        let mut events = Vec::new();
        for edge in edges {
            if let Some(node) = self
                .graph
                .get_node(NodeKind::ChangeEvent, &edge.key.from.key)
                .await?
            {
                let ts = node
                    .properties
                    .get("timestamp")
                    .and_then(Value::as_i64)
                    .map(Timestamp::from_nanos);
                if ts.is_some_and(|t| t >= since && t <= self.now) {
                    events.push(node);
                }
            }
        }
        events.sort_by_key(|n| n.properties.get("timestamp").and_then(Value::as_i64));
        Ok(events)
    }

    async fn query_graph(&self, statement: Statement) -> Result<Vec<Value>> {
        self.graph.query(statement).await
    }
}

/// One pluggable relationship extractor
///
/// Extractors are pure with respect to the log: they see one event and the
/// lookup, and return edges. A failing extractor never blocks the others.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Unique name, used in logs
    fn name(&self) -> &'static str;

    /// Run order; lower runs first
    fn priority(&self) -> i32;

    /// Cheap pre-filter deciding whether [`Extractor::extract`] runs
    fn matches(&self, event: &Event) -> bool;

    /// Emit edges for one event
    async fn extract(
        &self,
        event: &Event,
        lookup: &dyn ResourceLookup,
    ) -> Result<Vec<GraphEdge>>;
}

/// Holds extractors sorted by priority and applies every matching one
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The default set: native ownership, Flux HelmRelease, Gateway API
    #[must_use]
    pub fn with_defaults(scoring: ScoringConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NativeOwnershipExtractor::default()));
        registry.register(Arc::new(HelmReleaseExtractor::new(scoring)));
        registry.register(Arc::new(GatewayApiExtractor::default()));
        registry
    }

    /// Add an extractor, keeping priority order
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.push(extractor);
        self.extractors.sort_by_key(|e| e.priority());
    }

    /// Registered extractor names, in run order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Apply every matching extractor to the event
    ///
    /// A failing extractor is logged and skipped; its edges are dropped but
    /// every other extractor still runs.
    pub async fn run(&self, event: &Event, lookup: &dyn ResourceLookup) -> Vec<GraphEdge> {
        let mut edges = Vec::new();
        for extractor in &self.extractors {
            if !extractor.matches(event) {
                continue;
            }
            match extractor.extract(event, lookup).await {
                Ok(extracted) => edges.extend(extracted),
                Err(err) => {
                    warn!(
                        extractor = extractor.name(),
                        event = %event.id,
                        error = %err,
                        "extractor failed, skipping"
                    );
                }
            }
        }
        edges
    }
}
