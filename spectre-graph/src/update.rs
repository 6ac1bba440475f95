//! Idempotent batches of node and edge writes.

use serde::{Deserialize, Serialize};

use crate::{edge::GraphEdge, node::GraphNode};

/// One batch of graph writes
///
/// Applying an update is idempotent: nodes and edges MERGE on their keys, so
/// replaying the same update (or the same event through the sync pipeline)
/// leaves the graph unchanged.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphUpdate {
    /// Nodes to upsert, in order
    pub nodes: Vec<GraphNode>,
    /// Edges to upsert, in order (after the nodes)
    pub edges: Vec<GraphEdge>,
}

impl GraphUpdate {
    /// An empty update
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether there is nothing to write
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Add a node (builder-style)
    #[must_use]
    pub fn node(mut self, node: GraphNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge (builder-style)
    #[must_use]
    pub fn edge(mut self, edge: GraphEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Append another update's writes
    pub fn extend(&mut self, other: GraphUpdate) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }
}
