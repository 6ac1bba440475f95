//! Five-minute alert-state sampling.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use spectre_core::{Result, Timestamp};
use spectre_graph::{
    latest_edge, EdgeQuery, EdgeType, GraphClient, GraphEdge, GraphNode, GraphUpdate, NodeKind,
    NodeRef,
};
use tracing::debug;

use super::{SyncStats, Syncer};
use crate::grafana::{AlertSource, AlertStateKind};

/// Read-side lifetime of a state-transition edge
pub const STATE_TRANSITION_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Samples alert states and appends `STATE_TRANSITION` self-edges
///
/// State history is a sequence of timestamp-keyed self-edges rather than a
/// node cycle, so time-window queries never traverse the graph. Identical
/// consecutive states are deduplicated; instances of one rule are folded
/// worst-state-wins. `Alert.lastSyncedAt` advances only on a successful
/// fetch, so consumers detect staleness by its age.
pub struct AlertStateSyncer<C, S> {
    graph: Arc<C>,
    source: Arc<S>,
    interval: Duration,
}

impl<C: GraphClient, S: AlertSource> AlertStateSyncer<C, S> {
    /// Syncer reading from `source` and writing through `graph`
    #[must_use]
    pub fn new(graph: Arc<C>, source: Arc<S>) -> Self {
        Self {
            graph,
            source,
            interval: Duration::from_secs(300),
        }
    }

    /// Override the tick period (builder-style)
    #[must_use]
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The last recorded state of an alert, read through the TTL filter
    async fn last_known_state(&self, uid: &str, now: Timestamp) -> Result<Option<AlertStateKind>> {
        let newest = latest_edge(
            self.graph.as_ref(),
            EdgeQuery {
                edge_type: Some(EdgeType::StateTransition),
                from: Some(NodeRef::new(NodeKind::Alert, uid)),
                ..Default::default()
            },
            now,
        )
        .await?;
        Ok(newest
            .and_then(|e| e.properties.get("toState").and_then(serde_json::Value::as_str).map(str::to_string))
            .and_then(|s| AlertStateKind::parse(&s)))
    }
}

#[async_trait]
impl<C: GraphClient + 'static, S: AlertSource + 'static> Syncer for AlertStateSyncer<C, S> {
    fn name(&self) -> &'static str {
        "alert-state"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn sync(&self, now: Timestamp) -> Result<SyncStats> {
        let instances = self.source.current_states().await?;
        let mut stats = SyncStats::default();

        // fold instances per rule, worst state wins
        let mut folded: BTreeMap<String, (AlertStateKind, String)> = BTreeMap::new();
        for instance in instances {
            let entry = folded
                .entry(instance.rule_uid.clone())
                .or_insert((instance.state, instance.title.clone()));
            if instance.state > entry.0 {
                entry.0 = instance.state;
            }
        }

        for (uid, (state, title)) in folded {
            stats.seen += 1;
            let alert_ref = NodeRef::new(NodeKind::Alert, &uid);
            let last_known = self.last_known_state(&uid, now).await?;
            let mut update = GraphUpdate::new().node(
                GraphNode::new(NodeKind::Alert, &uid, now)
                    .prop("title", title)
                    .prop("currentState", state.as_str())
                    .prop("lastSyncedAt", now.as_nanos()),
            );
            if last_known == Some(state) {
                debug!(alert = %uid, state = state.as_str(), "state unchanged, deduplicated");
                stats.unchanged += 1;
                self.graph.apply(update).await?;
                continue;
            }
            let transition = GraphEdge::new(
                EdgeType::StateTransition,
                alert_ref.clone(),
                alert_ref,
                now,
            )
            .discriminated(&now.as_nanos().to_string())
            .prop("fromState", last_known.map_or("Unknown", |s| s.as_str()))
            .prop("toState", state.as_str())
            .prop("timestamp", now.as_nanos())
            .expires(now + STATE_TRANSITION_TTL);
            update = update.edge(transition);
            self.graph.apply(update).await?;
            stats.updated += 1;
        }
        Ok(stats)
    }
}
