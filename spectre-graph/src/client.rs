//! The client seam towards the external graph engine.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde_json::Value;
use spectre_core::{Error, Result, Timestamp};
use tracing::warn;

use crate::{
    cypher::Statement,
    edge::{EdgeKey, EdgeQuery, GraphEdge},
    node::{GraphNode, NodeKind},
    update::GraphUpdate,
};

/// Operations every graph backend provides
///
/// Structured writes go through [`GraphUpdate`]s so MERGE semantics are
/// uniform across backends; `query` is the raw pass-through used where an
/// extractor or analysis needs the engine's own dialect.
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Apply an update idempotently
    async fn apply(&self, update: GraphUpdate) -> Result<()>;

    /// Fetch a node by label and merge key
    async fn get_node(&self, kind: NodeKind, key: &str) -> Result<Option<GraphNode>>;

    /// Fetch nodes of one label whose properties equal every given pair
    async fn find_nodes(&self, kind: NodeKind, props: &[(&str, Value)]) -> Result<Vec<GraphNode>>;

    /// Fetch edges matching the query predicates
    async fn edges(&self, query: EdgeQuery) -> Result<Vec<GraphEdge>>;

    /// Delete edges by identity, returning how many existed
    async fn delete_edges(&self, keys: &[EdgeKey]) -> Result<usize>;

    /// Run a raw statement in the engine's dialect
    async fn query(&self, statement: Statement) -> Result<Vec<Value>>;
}

/// Timeouts and retry bounds for graph calls
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Per-request deadline
    pub request_timeout: Duration,
    /// Maximum retry attempts on transient failures
    pub max_retries: usize,
    /// First backoff delay; grows exponentially per attempt
    pub initial_backoff: Duration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

/// Wraps a backend with per-request timeouts and bounded retries
///
/// Only transient failures are retried; validation and corruption surface
/// immediately. A timeout is itself transient, so a slow engine gets a
/// bounded number of chances before the error propagates.
#[derive(Clone)]
pub struct RetryingClient<C> {
    inner: Arc<C>,
    config: GraphConfig,
}

impl<C: GraphClient> RetryingClient<C> {
    /// Wrap a backend
    #[must_use]
    pub fn new(inner: Arc<C>, config: GraphConfig) -> Self {
        Self { inner, config }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.config.initial_backoff)
            .with_max_times(self.config.max_retries)
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let timeout = self.config.request_timeout;
        let attempt = || async {
            match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Transient(format!(
                    "graph request exceeded {timeout:?}"
                ))),
            }
        };
        attempt
            .retry(self.backoff())
            .when(Error::is_transient)
            .notify(|err, delay| warn!(error = %err, ?delay, "retrying graph request"))
            .await
    }
}

#[async_trait]
impl<C: GraphClient> GraphClient for RetryingClient<C> {
    async fn apply(&self, update: GraphUpdate) -> Result<()> {
        self.run(|| self.inner.apply(update.clone())).await
    }

    async fn get_node(&self, kind: NodeKind, key: &str) -> Result<Option<GraphNode>> {
        self.run(|| self.inner.get_node(kind, key)).await
    }

    async fn find_nodes(&self, kind: NodeKind, props: &[(&str, Value)]) -> Result<Vec<GraphNode>> {
        self.run(|| self.inner.find_nodes(kind, props)).await
    }

    async fn edges(&self, query: EdgeQuery) -> Result<Vec<GraphEdge>> {
        self.run(|| self.inner.edges(query.clone())).await
    }

    async fn delete_edges(&self, keys: &[EdgeKey]) -> Result<usize> {
        self.run(|| self.inner.delete_edges(keys)).await
    }

    async fn query(&self, statement: Statement) -> Result<Vec<Value>> {
        self.run(|| self.inner.query(statement.clone())).await
    }
}

/// Convenience: the most recent unexpired edge of one type leaving a node
pub async fn latest_edge<C: GraphClient + ?Sized>(
    client: &C,
    query: EdgeQuery,
    now: Timestamp,
) -> Result<Option<GraphEdge>> {
    let mut edges = client
        .edges(EdgeQuery {
            unexpired_at: Some(now),
            ..query
        })
        .await?;
    edges.sort_by_key(|e| std::cmp::Reverse(e.first_observed));
    Ok(edges.into_iter().next())
}
