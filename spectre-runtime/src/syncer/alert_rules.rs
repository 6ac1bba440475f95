//! Hourly alert-rule sync.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::json;
use spectre_core::{Result, Timestamp};
use spectre_graph::{EdgeQuery, EdgeType, GraphClient, GraphEdge, GraphNode, GraphUpdate, NodeKind, NodeRef};
use tracing::{debug, warn};

use super::{SyncStats, Syncer};
use crate::grafana::AlertSource;
use crate::promql;

/// Synchronises alert rules into `Alert → MONITORS → Metric`
///
/// The change key is the rule's `updated` ISO-8601 timestamp (alert rules
/// have no version counter). Transitive Alert → Service relationships are
/// answered by [`alert_services`], never stored.
pub struct AlertRuleSyncer<C, S> {
    graph: Arc<C>,
    source: Arc<S>,
    interval: Duration,
}

impl<C: GraphClient, S: AlertSource> AlertRuleSyncer<C, S> {
    /// Syncer reading from `source` and writing through `graph`
    #[must_use]
    pub fn new(graph: Arc<C>, source: Arc<S>) -> Self {
        Self {
            graph,
            source,
            interval: Duration::from_secs(3600),
        }
    }

    /// Override the tick period (builder-style)
    #[must_use]
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl<C: GraphClient + 'static, S: AlertSource + 'static> Syncer for AlertRuleSyncer<C, S> {
    fn name(&self) -> &'static str {
        "alert-rules"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn sync(&self, now: Timestamp) -> Result<SyncStats> {
        let rules = self.source.list_rules().await?;
        let mut stats = SyncStats::default();
        for rule in rules {
            stats.seen += 1;
            let known_updated = self
                .graph
                .get_node(NodeKind::Alert, &rule.uid)
                .await?
                .and_then(|n| n.str_prop("updated").map(str::to_string));
            if known_updated.as_deref() == Some(rule.updated.as_str()) {
                debug!(rule = %rule.uid, "unchanged");
                stats.unchanged += 1;
                continue;
            }

            let insights = promql::walk(&rule.expr);
            let mut update = GraphUpdate::new().node(
                GraphNode::new(NodeKind::Alert, &rule.uid, now)
                    .prop("title", rule.title.clone())
                    .prop("updated", rule.updated.clone())
                    .prop("expr", rule.expr.clone())
                    .prop("labels", json!(rule.labels)),
            );
            for metric in &insights.metrics {
                update = update.node(GraphNode::new(NodeKind::Metric, metric, now));
                update = update.edge(GraphEdge::new(
                    EdgeType::Monitors,
                    NodeRef::new(NodeKind::Alert, &rule.uid),
                    NodeRef::new(NodeKind::Metric, metric),
                    now,
                ));
            }
            match self.graph.apply(update).await {
                Ok(()) => stats.updated += 1,
                Err(err) => {
                    warn!(rule = %rule.uid, error = %err, "alert rule sync failed, continuing");
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }
}

/// The services an alert transitively monitors
///
/// Walks `Alert → MONITORS → Metric → TRACKS → Service` at read time; the
/// transitive relationship is intentionally never materialised as an edge.
pub async fn alert_services<C: GraphClient>(graph: &C, alert_uid: &str) -> Result<Vec<String>> {
    let monitors = graph
        .edges(EdgeQuery {
            edge_type: Some(EdgeType::Monitors),
            from: Some(NodeRef::new(NodeKind::Alert, alert_uid)),
            ..Default::default()
        })
        .await?;
    let mut services = Vec::new();
    for monitor in monitors {
        let tracks = graph
            .edges(EdgeQuery {
                edge_type: Some(EdgeType::Tracks),
                from: Some(monitor.key.to.clone()),
                ..Default::default()
            })
            .await?;
        for track in tracks {
            if !services.contains(&track.key.to.key) {
                services.push(track.key.to.key.clone());
            }
        }
    }
    services.sort();
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grafana::{AlertInstance, AlertRule};
    use spectre_graph::MemoryGraph;

    struct FakeAlerts {
        rules: Vec<AlertRule>,
    }

    #[async_trait]
    impl AlertSource for FakeAlerts {
        async fn list_rules(&self) -> Result<Vec<AlertRule>> {
            Ok(self.rules.clone())
        }

        async fn current_states(&self) -> Result<Vec<AlertInstance>> {
            Ok(Vec::new())
        }
    }

    fn rule(updated: &str) -> AlertRule {
        AlertRule {
            uid: "r-1".into(),
            title: "HighErrorRate".into(),
            updated: updated.into(),
            expr: r#"sum(rate(errors_total{job="api"}[5m])) > 10"#.into(),
            labels: Default::default(),
        }
    }

    #[tokio::test]
    async fn rules_project_monitors_edges() {
        let graph = Arc::new(MemoryGraph::new());
        let syncer = AlertRuleSyncer::new(
            graph.clone(),
            Arc::new(FakeAlerts {
                rules: vec![rule("2026-07-01T10:00:00Z")],
            }),
        );
        let stats = syncer.sync(Timestamp::from_secs(1_700_000_000)).await.unwrap();
        assert_eq!(stats.updated, 1);

        let monitors = graph
            .edges(EdgeQuery {
                edge_type: Some(EdgeType::Monitors),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(monitors.len(), 1);
        assert_eq!(monitors[0].key.to.key, "errors_total");
    }

    #[tokio::test]
    async fn the_updated_stamp_is_the_change_key() {
        let graph = Arc::new(MemoryGraph::new());
        let unchanged = AlertRuleSyncer::new(
            graph.clone(),
            Arc::new(FakeAlerts {
                rules: vec![rule("2026-07-01T10:00:00Z")],
            }),
        );
        unchanged.sync(Timestamp::from_secs(1_700_000_000)).await.unwrap();
        let stats = unchanged.sync(Timestamp::from_secs(1_700_003_600)).await.unwrap();
        assert_eq!(stats.unchanged, 1);

        let touched = AlertRuleSyncer::new(
            graph.clone(),
            Arc::new(FakeAlerts {
                rules: vec![rule("2026-07-02T08:00:00Z")],
            }),
        );
        let stats = touched.sync(Timestamp::from_secs(1_700_007_200)).await.unwrap();
        assert_eq!(stats.updated, 1);
    }

    #[tokio::test]
    async fn alert_to_service_is_queried_not_stored() {
        let graph = Arc::new(MemoryGraph::new());
        let now = Timestamp::from_secs(1_700_000_000);
        // rule sync writes MONITORS; a dashboard sync contributed TRACKS
        let syncer = AlertRuleSyncer::new(
            graph.clone(),
            Arc::new(FakeAlerts {
                rules: vec![rule("2026-07-01T10:00:00Z")],
            }),
        );
        syncer.sync(now).await.unwrap();
        graph
            .apply(
                GraphUpdate::new()
                    .node(GraphNode::new(NodeKind::Service, "api", now))
                    .edge(GraphEdge::new(
                        EdgeType::Tracks,
                        NodeRef::new(NodeKind::Metric, "errors_total"),
                        NodeRef::new(NodeKind::Service, "api"),
                        now,
                    )),
            )
            .await
            .unwrap();

        let services = alert_services(graph.as_ref(), "r-1").await.unwrap();
        assert_eq!(services, vec!["api"]);
        // and no materialised Alert → Service edge exists
        assert!(graph
            .all_edges()
            .iter()
            .all(|e| !(e.key.from.kind == NodeKind::Alert && e.key.to.kind == NodeKind::Service)));
    }
}
