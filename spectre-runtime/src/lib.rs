//! The Spectre ingestion runtime.
//!
//! Everything that moves data between the cluster, the append log and the
//! graph lives here: the watcher adapter (informer callbacks → events), the
//! relationship-extractor framework and its concrete extractors, the graph
//! sync pipeline, the inferred-edge revalidation worker, the external-system
//! syncers (dashboards, alert rules, alert states) and the baseline/analysis
//! services. Workers communicate through the log and the graph only; there
//! is no shared in-memory queue between extraction and syncing.

pub mod analysis;

pub mod extract;
pub use extract::{Extractor, ExtractorRegistry, GraphLookup, ResourceLookup};

pub mod grafana;

pub mod promql;
pub use promql::QueryInsights;

mod revalidate;
pub use revalidate::{RevalidationConfig, Revalidator};

mod sync;
pub use sync::{BatchReport, PipelineWorker, SyncPipeline};

pub mod syncer;
pub use syncer::{SyncHandle, SyncStatus, Syncer};

mod watcher;
pub use watcher::WatcherAdapter;

pub use spectre_core::{Error, Result};
