//! Hourly dashboard sync.

use std::{collections::BTreeMap, hash::BuildHasher, sync::Arc, time::Duration};

use ahash::RandomState;
use async_trait::async_trait;
use serde_json::json;
use spectre_core::{Result, Timestamp};
use spectre_graph::{EdgeType, GraphClient, GraphEdge, GraphNode, GraphUpdate, NodeKind, NodeRef};
use tracing::{debug, warn};

use super::{SyncStats, Syncer};
use crate::grafana::DashboardSource;
use crate::promql::{self, MatchOp, QueryInsights};

/// Classification of dashboards from their tags
///
/// Tags are checked against a user-supplied tag → level map; a dashboard with
/// no mapped tag defaults to `detail`.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    levels: BTreeMap<String, String>,
}

impl Hierarchy {
    /// A hierarchy from tag → level pairs (levels: overview, drilldown, detail)
    #[must_use]
    pub fn from_tags(pairs: &[(&str, &str)]) -> Self {
        Self {
            levels: pairs
                .iter()
                .map(|(tag, level)| (tag.to_string(), level.to_string()))
                .collect(),
        }
    }

    /// Classify a dashboard by its tags
    #[must_use]
    pub fn classify(&self, tags: &[String]) -> &str {
        for tag in tags {
            if let Some(level) = self.levels.get(tag) {
                return level;
            }
        }
        "detail"
    }
}

/// Synchronises dashboards into
/// `Dashboard → QUERIES → Query → REFERENCES → Metric → TRACKS → Service`
///
/// The dashboard `version` counter is the change key: an unchanged version
/// skips the fetch entirely. Per-dashboard failures leave that dashboard's
/// `lastSyncedAt` untouched and the sync alive.
pub struct DashboardSyncer<C, S> {
    graph: Arc<C>,
    source: Arc<S>,
    hierarchy: Hierarchy,
    interval: Duration,
}

impl<C: GraphClient, S: DashboardSource> DashboardSyncer<C, S> {
    /// Syncer reading from `source` and writing through `graph`
    #[must_use]
    pub fn new(graph: Arc<C>, source: Arc<S>, hierarchy: Hierarchy) -> Self {
        Self {
            graph,
            source,
            hierarchy,
            interval: Duration::from_secs(3600),
        }
    }

    /// Override the tick period (builder-style)
    #[must_use]
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    async fn sync_dashboard(
        &self,
        uid: &str,
        tags: &[String],
        now: Timestamp,
    ) -> Result<()> {
        let detail = self.source.get_dashboard(uid).await?;
        let hierarchy = self
            .hierarchy
            .classify(if detail.tags.is_empty() { tags } else { detail.tags.as_slice() });
        let mut update = GraphUpdate::new().node(
            GraphNode::new(NodeKind::Dashboard, uid, now)
                .prop("title", detail.title.clone())
                .prop("version", detail.version)
                .prop("hierarchy", hierarchy)
                .prop("lastSyncedAt", now.as_nanos()),
        );

        for panel in &detail.panels {
            for target in &panel.targets {
                if target.expr.is_empty() {
                    continue;
                }
                let insights = promql::walk(&target.expr);
                let query_key = content_hash(&target.expr);
                update = update.node(
                    GraphNode::new(NodeKind::Query, &query_key, now)
                        .prop("expr", target.expr.clone())
                        .prop("panel", panel.title.clone())
                        .prop("refId", target.ref_id.clone())
                        .prop("hasTemplateVariables", insights.has_template_variables)
                        .prop("aggregations", json!(insights.aggregations)),
                );
                update = update.edge(GraphEdge::new(
                    EdgeType::Queries,
                    NodeRef::new(NodeKind::Dashboard, uid),
                    NodeRef::new(NodeKind::Query, &query_key),
                    now,
                ));
                for metric in &insights.metrics {
                    update = update.node(GraphNode::new(NodeKind::Metric, metric, now));
                    update = update.edge(GraphEdge::new(
                        EdgeType::References,
                        NodeRef::new(NodeKind::Query, &query_key),
                        NodeRef::new(NodeKind::Metric, metric),
                        now,
                    ));
                    if let Some(service) = derive_service(metric, &insights) {
                        update = update.node(GraphNode::new(NodeKind::Service, &service, now));
                        update = update.edge(GraphEdge::new(
                            EdgeType::Tracks,
                            NodeRef::new(NodeKind::Metric, metric),
                            NodeRef::new(NodeKind::Service, &service),
                            now,
                        ));
                    }
                }
            }
        }
        self.graph.apply(update).await
    }
}

/// Derive the service a metric tracks
///
/// A `job` or `service` equality matcher wins; otherwise the metric-name
/// prefix up to the first underscore. Template values derive nothing.
fn derive_service(metric: &str, insights: &QueryInsights) -> Option<String> {
    for matcher in &insights.label_matchers {
        if matcher.op == MatchOp::Eq
            && matches!(matcher.name.as_str(), "job" | "service")
            && !matcher.value.contains('$')
        {
            return Some(matcher.value.clone());
        }
    }
    let prefix = metric.split('_').next().unwrap_or_default();
    (!prefix.is_empty() && prefix != metric).then(|| prefix.to_string())
}

/// Stable content hash used as the Query node key
fn content_hash(expr: &str) -> String {
    let hash = RandomState::with_seeds(0x51, 0x52, 0x53, 0x54).hash_one(expr);
    format!("q-{hash:016x}")
}

#[async_trait]
impl<C: GraphClient + 'static, S: DashboardSource + 'static> Syncer for DashboardSyncer<C, S> {
    fn name(&self) -> &'static str {
        "dashboards"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn sync(&self, now: Timestamp) -> Result<SyncStats> {
        let dashboards = self.source.list_dashboards().await?;
        let mut stats = SyncStats::default();
        for summary in dashboards {
            stats.seen += 1;
            let known_version = self
                .graph
                .get_node(NodeKind::Dashboard, &summary.uid)
                .await?
                .and_then(|n| n.properties.get("version").and_then(serde_json::Value::as_i64));
            if known_version == Some(summary.version) {
                debug!(dashboard = %summary.uid, version = summary.version, "unchanged");
                stats.unchanged += 1;
                continue;
            }
            match self.sync_dashboard(&summary.uid, &summary.tags, now).await {
                Ok(()) => stats.updated += 1,
                Err(err) => {
                    warn!(dashboard = %summary.uid, error = %err, "dashboard sync failed, continuing");
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }
}
