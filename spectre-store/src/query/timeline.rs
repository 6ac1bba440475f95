//! The chunked timeline stream.

use async_stream::stream;
use futures::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use spectre_core::{EventFilter, Result, Timestamp};
use tokio_util::sync::CancellationToken;

use super::{QueryEngine, Resource};

/// Parameters of a timeline request
#[derive(Debug, Clone)]
pub struct TimelineRequest {
    /// Window start (inclusive)
    pub start: Timestamp,
    /// Window end (inclusive)
    pub end: Timestamp,
    /// Attribute filters
    pub filter: EventFilter,
    /// Resources per page, `None` for a single unbounded page
    pub page_size: Option<usize>,
    /// Resume cursor from a previous page
    pub cursor: Option<String>,
}

/// Head-of-stream metadata, always the first chunk
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMetadata {
    /// Resources matching across all pages
    pub total_count: usize,
    /// Segment files inspected
    pub files_searched: u64,
    /// Blocks decoded
    pub segments_scanned: u64,
    /// Blocks skipped by pushdown
    pub segments_skipped: u64,
    /// Wall time of the query
    pub execution_time_ms: u64,
    /// Cursor resuming after this page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Whether more resources exist beyond this page
    pub has_more: bool,
    /// Effective page size
    pub page_size: usize,
}

/// A batch of resources sharing one kind
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBatch {
    /// Kind shared by every resource in the batch
    pub kind: String,
    /// The resources
    pub resources: Vec<Resource>,
    /// Set on the last batch of the stream
    pub is_final_batch: bool,
}

/// One chunk of the timeline stream
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum TimelineChunk {
    /// Head-of-stream metadata
    Metadata(TimelineMetadata),
    /// A kind-grouped resource batch
    Batch(TimelineBatch),
}

impl QueryEngine {
    /// Stream a timeline: one metadata chunk, then resource batches grouped
    /// by kind, the last one flagged `is_final_batch` (and possibly empty
    /// when nothing matched)
    pub fn get_timeline(
        &self,
        request: TimelineRequest,
        cancel: &CancellationToken,
    ) -> Result<BoxStream<'static, TimelineChunk>> {
        let page = self.query(
            request.start,
            request.end,
            &request.filter,
            request.page_size,
            request.cursor.as_deref(),
            cancel,
        )?;
        let metadata = TimelineMetadata {
            total_count: page.total_count,
            files_searched: page.counters.files_searched,
            segments_scanned: page.counters.segments_scanned,
            segments_skipped: page.counters.segments_skipped,
            execution_time_ms: page.execution_time_ms,
            next_cursor: page.next_cursor,
            has_more: page.has_more,
            page_size: request.page_size.unwrap_or(page.resources.len()),
        };

        // resources arrive kind-major, so batches are contiguous runs
        let mut batches: Vec<TimelineBatch> = Vec::new();
        for resource in page.resources {
            match batches.last_mut() {
                Some(batch) if batch.kind == resource.identity.kind => {
                    batch.resources.push(resource);
                }
                _ => batches.push(TimelineBatch {
                    kind: resource.identity.kind.clone(),
                    resources: vec![resource],
                    is_final_batch: false,
                }),
            }
        }
        if let Some(last) = batches.last_mut() {
            last.is_final_batch = true;
        } else {
            batches.push(TimelineBatch {
                kind: String::new(),
                resources: Vec::new(),
                is_final_batch: true,
            });
        }
        Ok(stream! {
            yield TimelineChunk::Metadata(metadata);
            for batch in batches {
                yield TimelineChunk::Batch(batch);
            }
        }
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{EventLog, LogConfig};
    use crate::testutil::event;
    use std::sync::Arc;

    fn engine(dir: &std::path::Path) -> QueryEngine {
        QueryEngine::new(Arc::new(EventLog::open(LogConfig::new(dir)).unwrap()))
    }

    fn request(start: i64, end: i64) -> TimelineRequest {
        TimelineRequest {
            start: Timestamp::from_secs(start),
            end: Timestamp::from_secs(end),
            filter: EventFilter::any(),
            page_size: None,
            cursor: None,
        }
    }

    #[tokio::test]
    async fn stream_leads_with_metadata_and_ends_with_final_batch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.log().append(event("Deployment", "ns", "d-1", 1_700_000_000)).unwrap();
        engine.log().append(event("Pod", "ns", "p-1", 1_700_000_001)).unwrap();
        engine.log().append(event("Pod", "ns", "p-2", 1_700_000_002)).unwrap();

        let chunks: Vec<TimelineChunk> = engine
            .get_timeline(request(1_699_999_000, 1_700_001_000), &CancellationToken::new())
            .unwrap()
            .collect()
            .await;
        assert!(matches!(&chunks[0], TimelineChunk::Metadata(m) if m.total_count == 3));
        let batches: Vec<&TimelineBatch> = chunks
            .iter()
            .filter_map(|c| match c {
                TimelineChunk::Batch(b) => Some(b),
                TimelineChunk::Metadata(_) => None,
            })
            .collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].kind, "Deployment");
        assert_eq!(batches[1].kind, "Pod");
        assert_eq!(batches[1].resources.len(), 2);
        assert!(batches[1].is_final_batch);
        assert!(!batches[0].is_final_batch);
    }

    #[tokio::test]
    async fn empty_windows_still_emit_a_final_batch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let chunks: Vec<TimelineChunk> = engine
            .get_timeline(request(1_700_000_000, 1_700_000_100), &CancellationToken::new())
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert!(
            matches!(&chunks[1], TimelineChunk::Batch(b) if b.is_final_batch && b.resources.is_empty())
        );
    }
}
