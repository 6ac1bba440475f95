//! Rendering updates into the engine's Cypher-like dialect.
//!
//! Values never get spliced into query text; every dynamic value travels as
//! a `$param`. Real backends send these statements over their transport,
//! [`MemoryGraph`][crate::MemoryGraph] consumes the structured form directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use spectre_core::Timestamp;

use crate::{edge::GraphEdge, node::GraphNode, update::GraphUpdate};

/// One parameterised statement
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Statement {
    /// Query text with `$param` placeholders
    pub query: String,
    /// Parameter values
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl Statement {
    /// A statement without parameters
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: BTreeMap::new(),
        }
    }

    /// Attach a parameter (builder-style)
    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// The predicate every read over TTL edges must carry
#[must_use]
pub fn ttl_predicate(alias: &str) -> String {
    format!("({alias}.expiresAt IS NULL OR {alias}.expiresAt > $now)")
}

/// Render a node upsert
#[must_use]
pub fn merge_node(node: &GraphNode) -> Statement {
    let query = format!(
        "MERGE (n:{label} {{key: $key}}) \
         ON CREATE SET n.firstSeen = $observed, n += $props, n.lastSeen = $observed, n.deleted = $deleted \
         ON MATCH SET n += $props, n.lastSeen = $observed, n.deleted = $deleted",
        label = node.kind.label()
    );
    Statement::new(query)
        .param("key", node.key.clone())
        .param("observed", node.last_seen.as_nanos())
        .param("deleted", node.deleted)
        .param("props", json!(node.properties))
}

/// Render an edge upsert
#[must_use]
pub fn merge_edge(edge: &GraphEdge) -> Statement {
    let query = format!(
        "MATCH (a:{from} {{key: $fromKey}}), (b:{to} {{key: $toKey}}) \
         MERGE (a)-[r:{rel} {{discriminator: $discriminator}}]->(b) \
         ON CREATE SET r.firstObserved = $observed, r += $props \
         ON MATCH SET r += $props",
        from = edge.key.from.kind.label(),
        to = edge.key.to.kind.label(),
        rel = edge.key.edge_type.label(),
    );
    let mut props = BTreeMap::new();
    for (key, value) in &edge.properties {
        props.insert(key.clone(), value.clone());
    }
    if let Some(confidence) = edge.confidence {
        props.insert("confidence".into(), json!(confidence));
    }
    if !edge.evidence.is_empty() {
        props.insert("evidence".into(), json!(edge.evidence));
    }
    if let Some(validated) = edge.last_validated {
        props.insert("lastValidated".into(), json!(validated.as_nanos()));
    }
    if let Some(state) = edge.validation_state {
        props.insert("validationState".into(), json!(state));
    }
    if let Some(expires) = edge.expires_at {
        props.insert("expiresAt".into(), json!(expires.as_nanos()));
    }
    Statement::new(query)
        .param("fromKey", edge.key.from.key.clone())
        .param("toKey", edge.key.to.key.clone())
        .param("discriminator", edge.key.discriminator.clone())
        .param("observed", edge.first_observed.as_nanos())
        .param("props", json!(props))
}

/// Render a whole update, nodes before edges
#[must_use]
pub fn render_update(update: &GraphUpdate) -> Vec<Statement> {
    update
        .nodes
        .iter()
        .map(merge_node)
        .chain(update.edges.iter().map(merge_edge))
        .collect()
}

/// Render a TTL-aware read of edges leaving a node
#[must_use]
pub fn edges_from(kind: &str, rel: &str, now: Timestamp) -> Statement {
    let query = format!(
        "MATCH (a:{kind} {{key: $key}})-[r:{rel}]->(b) WHERE {ttl} RETURN r, b ORDER BY r.firstObserved DESC",
        ttl = ttl_predicate("r"),
    );
    Statement::new(query).param("now", now.as_nanos())
}
