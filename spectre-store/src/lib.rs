//! Durable, compressed, time-partitioned storage for Spectre events.
//!
//! Events are bucketed by the hour of their observation timestamp under
//! `<root>/hours/<YYYYMMDDHH>/seg-<n>.blk`. Each segment file holds one or
//! more compressed blocks with self-describing headers, so time-windowed
//! scans can skip whole blocks without decompressing them. The [`EventLog`]
//! owns the bytes; the [`query::QueryEngine`] derives resources, status
//! segments and timelines on demand.

mod block;
pub use block::{BlockHeader, BLOCK_MAGIC, BLOCK_VERSION};

mod cache;
pub use cache::BlockCache;

mod archive;
pub use archive::{ExportOptions, ImportOptions, ImportReport};

mod log;
pub use log::{EventLog, LogConfig, ScanCounters};

mod manifest;
pub use manifest::HourManifest;

mod segment;
pub use segment::{SegmentMeta, SegmentReader};

#[cfg(test)]
pub(crate) mod testutil;

pub mod query;
pub use query::{QueryEngine, QueryMetadata, QueryPage, Resource};

pub use spectre_core::{Error, Result};
