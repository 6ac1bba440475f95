//! The property-graph side of Spectre.
//!
//! The graph engine itself is external (a property-graph database speaking a
//! Cypher-like dialect); this crate defines everything up to that boundary:
//! the node and edge model, idempotent [`GraphUpdate`] batches with their
//! MERGE statement rendering, the [`GraphClient`] seam with timeout and
//! retry, and an in-memory backend used by tests and timeline cross-checks.
//!
//! The graph never duplicates event bodies: `ChangeEvent` nodes reference
//! log events by id and the append log stays authoritative.

mod client;
pub use client::{latest_edge, GraphClient, GraphConfig, RetryingClient};

pub mod cypher;
pub use cypher::Statement;

mod edge;
pub use edge::{EdgeKey, EdgeQuery, EdgeType, Evidence, EvidenceKind, GraphEdge, NodeRef, ValidationState};

mod memory;
pub use memory::MemoryGraph;

mod node;
pub use node::{GraphNode, NodeKind};

mod update;
pub use update::GraphUpdate;

pub use spectre_core::{Error, Result};
