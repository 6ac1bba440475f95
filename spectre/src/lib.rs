//! Spectre captures a full audit trail of cluster resource mutations and
//! derives a causal knowledge graph tying resources, changes, controllers,
//! dashboards and alert state into one queryable structure.
//!
//! This crate is the facade over the workspace:
//!
//! - [`core`] — the event model, resource identity and status types
//! - [`store`] — the segmented append log and its query engine
//! - [`graph`] — the property-graph model and client seam
//! - [`runtime`] — watcher adapter, extractors, sync pipeline and syncers
//!
//! # Example
//!
//! Record a watched object and query it back:
//!
//! ```rust
//! use std::sync::Arc;
//! use spectre::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # fn main() -> spectre::Result<()> {
//! let dir = tempfile::tempdir().unwrap();
//! let log = Arc::new(EventLog::open(LogConfig::new(dir.path()))?);
//! let adapter = WatcherAdapter::new(log.clone());
//!
//! let pod: RawObject = serde_json::from_value(serde_json::json!({
//!     "apiVersion": "v1",
//!     "kind": "Pod",
//!     "metadata": {"name": "web-0", "namespace": "default", "uid": "p-1"},
//!     "status": {"phase": "Running"}
//! }))
//! .unwrap();
//! adapter.on_add(&pod)?;
//!
//! let engine = QueryEngine::new(log);
//! let page = engine.query(
//!     Timestamp::from_secs(1),
//!     Timestamp::now(),
//!     &EventFilter::any().kind("Pod"),
//!     None,
//!     None,
//!     &CancellationToken::new(),
//! )?;
//! assert_eq!(page.total_count, 1);
//! # Ok(())
//! # }
//! ```

pub use spectre_core as core;
pub use spectre_graph as graph;
pub use spectre_runtime as runtime;
pub use spectre_store as store;

pub use spectre_core::{
    Cursor, Error, ErrorCode, Event, EventFilter, EventType, RawObject, ResourceIdentity,
    ResourceStatus, Result, StatusSegment, Timestamp,
};
pub use spectre_graph::{GraphClient, GraphConfig, GraphUpdate, MemoryGraph, RetryingClient};
pub use spectre_runtime::{ExtractorRegistry, SyncPipeline, WatcherAdapter};
pub use spectre_store::{EventLog, LogConfig, QueryEngine};

/// Commonly used types, re-exported in one flat namespace
pub mod prelude {
    pub use crate::core::{
        Event, EventFilter, EventType, RawObject, ResourceIdentity, ResourceStatus, StatusSegment,
        Timestamp,
    };
    pub use crate::graph::{GraphClient, GraphUpdate, MemoryGraph};
    pub use crate::runtime::{ExtractorRegistry, SyncPipeline, WatcherAdapter};
    pub use crate::store::{EventLog, LogConfig, QueryEngine};
}
