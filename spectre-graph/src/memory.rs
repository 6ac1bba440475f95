//! An in-memory graph backend.
//!
//! Implements the same MERGE semantics a real engine applies to the rendered
//! statements, but consumes the structured [`GraphUpdate`] form directly.
//! Used by unit tests across the workspace and by the timeline cross-check
//! path; raw dialect queries are not interpreted here.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use spectre_core::{Error, Result};

use crate::{
    client::GraphClient,
    cypher::Statement,
    edge::{EdgeKey, EdgeQuery, GraphEdge},
    node::{GraphNode, NodeKind},
    update::GraphUpdate,
};

/// In-memory [`GraphClient`]
#[derive(Default)]
pub struct MemoryGraph {
    nodes: RwLock<HashMap<(NodeKind, String), GraphNode>>,
    edges: RwLock<HashMap<EdgeKey, GraphEdge>>,
}

impl MemoryGraph {
    /// An empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Number of stored edges, expired ones included
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }

    /// Snapshot of every edge, for test assertions
    #[must_use]
    pub fn all_edges(&self) -> Vec<GraphEdge> {
        self.edges.read().values().cloned().collect()
    }

    fn merge_node(nodes: &mut HashMap<(NodeKind, String), GraphNode>, node: GraphNode) {
        match nodes.entry((node.kind, node.key.clone())) {
            std::collections::hash_map::Entry::Occupied(mut existing) => {
                let existing = existing.get_mut();
                // ON MATCH: overwrite given properties, keep firstSeen
                existing.properties.extend(node.properties);
                existing.last_seen = node.last_seen;
                existing.deleted = node.deleted;
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(node);
            }
        }
    }

    fn merge_edge(edges: &mut HashMap<EdgeKey, GraphEdge>, edge: GraphEdge) {
        match edges.entry(edge.key.clone()) {
            std::collections::hash_map::Entry::Occupied(mut existing) => {
                let existing = existing.get_mut();
                // ON MATCH: overwrite everything except firstObserved
                existing.properties.extend(edge.properties);
                existing.confidence = edge.confidence.or(existing.confidence);
                if !edge.evidence.is_empty() {
                    existing.evidence = edge.evidence;
                }
                existing.last_validated = edge.last_validated.or(existing.last_validated);
                existing.validation_state = edge.validation_state.or(existing.validation_state);
                existing.expires_at = edge.expires_at.or(existing.expires_at);
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(edge);
            }
        }
    }
}

#[async_trait]
impl GraphClient for MemoryGraph {
    async fn apply(&self, update: GraphUpdate) -> Result<()> {
        {
            let mut nodes = self.nodes.write();
            for node in update.nodes {
                Self::merge_node(&mut nodes, node);
            }
        }
        let mut edges = self.edges.write();
        for edge in update.edges {
            Self::merge_edge(&mut edges, edge);
        }
        Ok(())
    }

    async fn get_node(&self, kind: NodeKind, key: &str) -> Result<Option<GraphNode>> {
        Ok(self.nodes.read().get(&(kind, key.to_string())).cloned())
    }

    async fn find_nodes(&self, kind: NodeKind, props: &[(&str, Value)]) -> Result<Vec<GraphNode>> {
        let nodes = self.nodes.read();
        let mut found: Vec<GraphNode> = nodes
            .values()
            .filter(|n| n.kind == kind)
            .filter(|n| {
                props
                    .iter()
                    .all(|(key, value)| n.properties.get(*key) == Some(value))
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    async fn edges(&self, query: EdgeQuery) -> Result<Vec<GraphEdge>> {
        let edges = self.edges.read();
        let mut found: Vec<GraphEdge> = edges.values().filter(|e| query.matches(e)).cloned().collect();
        found.sort_by(|a, b| (a.first_observed, &a.key).cmp(&(b.first_observed, &b.key)));
        Ok(found)
    }

    async fn delete_edges(&self, keys: &[EdgeKey]) -> Result<usize> {
        let mut edges = self.edges.write();
        let mut removed = 0;
        for key in keys {
            if edges.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn query(&self, statement: Statement) -> Result<Vec<Value>> {
        Err(Error::Dependency(format!(
            "memory backend does not interpret dialect queries: {}",
            statement.query
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{EdgeType, NodeRef};
    use spectre_core::Timestamp;

    fn node(key: &str, secs: i64) -> GraphNode {
        GraphNode::new(NodeKind::ResourceIdentity, key, Timestamp::from_secs(secs))
    }

    #[tokio::test]
    async fn applying_twice_is_idempotent() {
        let graph = MemoryGraph::new();
        let update = GraphUpdate::new()
            .node(node("u-1", 1).prop("kind", "Pod"))
            .edge(GraphEdge::new(
                EdgeType::Changed,
                NodeRef::new(NodeKind::ChangeEvent, "e-1"),
                NodeRef::resource("u-1"),
                Timestamp::from_secs(1),
            ));
        graph.apply(update.clone()).await.unwrap();
        let nodes_once = graph.node_count();
        let edges_once = graph.edge_count();
        graph.apply(update).await.unwrap();
        assert_eq!(graph.node_count(), nodes_once);
        assert_eq!(graph.edge_count(), edges_once);
    }

    #[tokio::test]
    async fn merge_preserves_first_seen_and_updates_props() {
        let graph = MemoryGraph::new();
        graph
            .apply(GraphUpdate::new().node(node("u-1", 1).prop("phase", "Pending")))
            .await
            .unwrap();
        graph
            .apply(GraphUpdate::new().node(node("u-1", 9).prop("phase", "Running")))
            .await
            .unwrap();
        let merged = graph
            .get_node(NodeKind::ResourceIdentity, "u-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged.first_seen, Timestamp::from_secs(1));
        assert_eq!(merged.last_seen, Timestamp::from_secs(9));
        assert_eq!(merged.str_prop("phase"), Some("Running"));
    }

    #[tokio::test]
    async fn find_nodes_matches_on_properties() {
        let graph = MemoryGraph::new();
        graph
            .apply(
                GraphUpdate::new()
                    .node(node("u-1", 1).prop("kind", "Secret").prop("namespace", "prod").prop("name", "values"))
                    .node(node("u-2", 1).prop("kind", "Secret").prop("namespace", "dev").prop("name", "values")),
            )
            .await
            .unwrap();
        let found = graph
            .find_nodes(
                NodeKind::ResourceIdentity,
                &[
                    ("kind", "Secret".into()),
                    ("namespace", "prod".into()),
                    ("name", "values".into()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "u-1");
    }

    #[tokio::test]
    async fn discriminated_edges_coexist() {
        let graph = MemoryGraph::new();
        let alert = NodeRef::new(NodeKind::Alert, "a-1");
        for (i, disc) in ["t1", "t2"].iter().enumerate() {
            graph
                .apply(GraphUpdate::new().edge(
                    GraphEdge::new(
                        EdgeType::StateTransition,
                        alert.clone(),
                        alert.clone(),
                        Timestamp::from_secs(i as i64 + 1),
                    )
                    .discriminated(disc),
                ))
                .await
                .unwrap();
        }
        assert_eq!(graph.edge_count(), 2);
    }
}
