//! The segmented append log.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::PathBuf,
    sync::Arc,
};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use spectre_core::{Error, Event, EventFilter, Result, Timestamp};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    archive::ImportOptions,
    block,
    cache::BlockCache,
    manifest::{HourManifest, MANIFEST_NAME},
    segment::{self, SegmentMeta, SegmentReader},
};

/// Tuning knobs for the log
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory the log owns; hours live under `<root>/hours/`
    pub root: PathBuf,
    /// A segment rotates (and becomes read-only) past this size
    pub target_segment_bytes: u64,
    /// The open segment's buffer is flushed into a block past this size
    pub block_target_bytes: usize,
    /// Decompressed-byte capacity of the block cache, 0 disables it
    pub cache_capacity_bytes: usize,
}

impl LogConfig {
    /// Defaults rooted at the given directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            target_segment_bytes: 10 * 1024 * 1024,
            block_target_bytes: 1024 * 1024,
            cache_capacity_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Scan statistics returned alongside query results
///
/// `files_searched` counts segment files whose hour intersected the window,
/// `segments_scanned` counts blocks that were decompressed and decoded,
/// `segments_skipped` counts blocks dismissed by header pushdown, and
/// `corrupt_blocks` counts blocks dropped by checksum or decode failures
/// (these are also included in `segments_skipped`).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanCounters {
    /// Segment files inspected
    pub files_searched: u64,
    /// Blocks decompressed and decoded
    pub segments_scanned: u64,
    /// Blocks skipped by time range or bitset pushdown
    pub segments_skipped: u64,
    /// Blocks skipped because they failed validation
    pub corrupt_blocks: u64,
}

impl ScanCounters {
    /// Merge counters from a sub-scan
    pub fn merge(&mut self, other: ScanCounters) {
        self.files_searched += other.files_searched;
        self.segments_scanned += other.segments_scanned;
        self.segments_skipped += other.segments_skipped;
        self.corrupt_blocks += other.corrupt_blocks;
    }
}

struct OpenSegment {
    id: u64,
    path: PathBuf,
    file: fs::File,
    /// Bytes of fully written blocks; readers never look past this
    written: u64,
    buffer: Vec<Event>,
    buffered_bytes: usize,
}

#[derive(Default)]
struct HourState {
    manifest: HourManifest,
    open: Option<OpenSegment>,
}

struct HourPartition {
    dir: PathBuf,
    state: RwLock<HourState>,
}

impl HourPartition {
    /// Metadata of every closed segment, id order
    fn closed_segments(state: &HourState, dir: &PathBuf) -> Vec<SegmentMeta> {
        let open_id = state.open.as_ref().map(|o| o.id);
        state
            .manifest
            .segments
            .iter()
            .filter(|entry| Some(entry.id) != open_id)
            .map(|entry| SegmentMeta {
                id: entry.id,
                path: HourManifest::segment_path(dir, entry.id),
                len: entry.len,
            })
            .collect()
    }
}

/// Durable, compressed, hour-partitioned storage of events
///
/// Writes are serialised per hour by that hour's lock; reads take only a
/// brief read lock to snapshot the open segment and are otherwise lock-free
/// against closed (immutable) segment files.
pub struct EventLog {
    config: LogConfig,
    cache: Option<BlockCache>,
    hours: DashMap<String, Arc<HourPartition>>,
    current_hour: Mutex<Option<String>>,
}

impl EventLog {
    /// Open (or create) a log rooted at `config.root`
    ///
    /// Existing hours are loaded from their manifests; the youngest segment
    /// of every hour is re-validated block by block and truncated to its
    /// last good block, so a crash mid-write costs at most the unflushed
    /// tail.
    pub fn open(config: LogConfig) -> Result<Self> {
        let hours_dir = config.root.join("hours");
        fs::create_dir_all(&hours_dir)?;
        let log = Self {
            cache: (config.cache_capacity_bytes > 0)
                .then(|| BlockCache::new(config.cache_capacity_bytes)),
            config,
            hours: DashMap::new(),
            current_hour: Mutex::new(None),
        };
        for entry in fs::read_dir(&hours_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let hour = entry.file_name().to_string_lossy().to_string();
            let partition = log.recover_hour(&hour, entry.path())?;
            log.hours.insert(hour, Arc::new(partition));
        }
        info!(hours = log.hours.len(), root = %log.config.root.display(), "event log opened");
        Ok(log)
    }

    fn recover_hour(&self, hour: &str, dir: PathBuf) -> Result<HourPartition> {
        let mut manifest = HourManifest::load(&dir)?;
        // pick up segment files a crash left unlisted
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some(id) = name
                .strip_prefix("seg-")
                .and_then(|s| s.strip_suffix(".blk"))
                .and_then(|s| s.parse::<u64>().ok())
            {
                if manifest.len_of(id).is_none() {
                    manifest.upsert(id, 0);
                }
            }
        }
        // the youngest segment may have a torn tail
        if let Some(last) = manifest.segments.last().cloned() {
            let path = HourManifest::segment_path(&dir, last.id);
            let good = segment::recover_len(&path)?;
            if good != last.len {
                warn!(hour, segment = last.id, recorded = last.len, good, "truncating segment to last good block");
                let file = fs::OpenOptions::new().write(true).open(&path)?;
                file.set_len(good)?;
                file.sync_all()?;
            }
            manifest.upsert(last.id, good);
        }
        manifest.store(&dir)?;
        Ok(HourPartition {
            dir,
            state: RwLock::new(HourState {
                manifest,
                open: None,
            }),
        })
    }

    fn partition(&self, hour: &str) -> Result<Arc<HourPartition>> {
        if let Some(p) = self.hours.get(hour) {
            return Ok(p.value().clone());
        }
        let dir = self.config.root.join("hours").join(hour);
        fs::create_dir_all(&dir)?;
        let partition = Arc::new(HourPartition {
            dir,
            state: RwLock::new(HourState::default()),
        });
        Ok(self
            .hours
            .entry(hour.to_string())
            .or_insert(partition)
            .value()
            .clone())
    }

    /// Append a single event
    ///
    /// Events for the newest observed hour go to that hour's open segment;
    /// a newer hour closes the previous open segment first. Late events
    /// (an hour older than the current one) are written as their own closed
    /// segment — hours never merge eagerly, compaction does that.
    pub fn append(&self, event: Event) -> Result<()> {
        event.validate()?;
        let hour = event.timestamp.hour_key();
        let mut current = self.current_hour.lock();
        let is_late = matches!(current.as_deref(), Some(cur) if hour.as_str() < cur);
        if is_late {
            drop(current);
            return self.write_closed_segment(&hour, std::slice::from_ref(&event));
        }
        if current.as_deref() != Some(hour.as_str()) {
            if let Some(prev) = current.replace(hour.clone()) {
                self.close_open_segment(&prev)?;
            }
        }
        drop(current);
        self.append_open(&hour, event)
    }

    fn append_open(&self, hour: &str, event: Event) -> Result<()> {
        let partition = self.partition(hour)?;
        let mut state = partition.state.write();
        if state.open.is_none() {
            let id = state.manifest.next_id();
            let path = HourManifest::segment_path(&partition.dir, id);
            let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
            state.manifest.upsert(id, 0);
            state.manifest.store(&partition.dir)?;
            debug!(hour, segment = id, "opened segment");
            state.open = Some(OpenSegment {
                id,
                path,
                file,
                written: 0,
                buffer: Vec::new(),
                buffered_bytes: 0,
            });
        }
        let block_target = self.config.block_target_bytes;
        let open = state.open.as_mut().expect("open segment just ensured");
        open.buffered_bytes += serde_json::to_vec(&event).map(|b| b.len()).unwrap_or(0) + 4;
        open.buffer.push(event);
        if open.buffered_bytes >= block_target {
            Self::flush_block(open)?;
        }
        if open.written >= self.config.target_segment_bytes {
            self.rotate_locked(&partition.dir, &mut state)?;
        }
        Ok(())
    }

    fn flush_block(open: &mut OpenSegment) -> Result<()> {
        if open.buffer.is_empty() {
            return Ok(());
        }
        let bytes = block::encode_block(&open.buffer)?;
        open.file.write_all(&bytes)?;
        open.written += bytes.len() as u64;
        open.buffer.clear();
        open.buffered_bytes = 0;
        Ok(())
    }

    fn rotate_locked(&self, dir: &PathBuf, state: &mut HourState) -> Result<()> {
        if let Some(mut open) = state.open.take() {
            Self::flush_block(&mut open)?;
            open.file.sync_all()?;
            state.manifest.upsert(open.id, open.written);
            state.manifest.store(dir)?;
            debug!(segment = open.id, bytes = open.written, "rotated segment");
        }
        Ok(())
    }

    fn close_open_segment(&self, hour: &str) -> Result<()> {
        if let Some(partition) = self.hours.get(hour).map(|p| p.value().clone()) {
            let mut state = partition.state.write();
            self.rotate_locked(&partition.dir, &mut state)?;
        }
        Ok(())
    }

    /// Flush buffered events and fsync every open segment
    pub fn flush(&self) -> Result<()> {
        let hours: Vec<Arc<HourPartition>> = self.hours.iter().map(|e| e.value().clone()).collect();
        for partition in hours {
            let mut state = partition.state.write();
            if let Some(open) = state.open.as_mut() {
                Self::flush_block(open)?;
                open.file.sync_all()?;
                let (id, written) = (open.id, open.written);
                state.manifest.upsert(id, written);
                state.manifest.store(&partition.dir)?;
            }
        }
        Ok(())
    }

    fn write_closed_segment(&self, hour: &str, events: &[Event]) -> Result<()> {
        let partition = self.partition(hour)?;
        let mut state = partition.state.write();
        let id = state.manifest.next_id();
        let path = HourManifest::segment_path(&partition.dir, id);
        let mut file = fs::File::create(&path)?;
        let mut written = 0u64;
        for chunk in chunk_by_bytes(events, self.config.block_target_bytes) {
            let bytes = block::encode_block(chunk)?;
            file.write_all(&bytes)?;
            written += bytes.len() as u64;
        }
        file.sync_all()?;
        state.manifest.upsert(id, written);
        state.manifest.store(&partition.dir)?;
        debug!(hour, segment = id, events = events.len(), "wrote late segment");
        Ok(())
    }

    /// Bulk-append events, used by import
    ///
    /// Events are validated, grouped by hour, and written as new closed
    /// segments. Hours that already held data are then compacted so
    /// duplicate ids resolve per `opts.overwrite_existing`.
    pub fn add_batch(&self, mut events: Vec<Event>, opts: &ImportOptions) -> Result<usize> {
        for event in &events {
            event.validate()?;
        }
        events.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        let mut by_hour: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        for event in events {
            by_hour.entry(event.timestamp.hour_key()).or_default().push(event);
        }
        let mut appended = 0;
        let current = self.current_hour.lock().clone();
        for (hour, batch) in by_hour {
            appended += batch.len();
            let had_data = self
                .hours
                .get(&hour)
                .map(|p| !p.state.read().manifest.segments.is_empty())
                .unwrap_or(false);
            self.write_closed_segment(&hour, &batch)?;
            let is_open_hour = current.as_deref() == Some(hour.as_str());
            if had_data && !is_open_hour {
                self.compact_hour(&hour, opts.overwrite_existing)?;
            }
        }
        Ok(appended)
    }

    /// Merge every segment of a closed hour into one, dropping duplicate ids
    ///
    /// With `overwrite_existing`, the copy from the newest segment wins;
    /// otherwise the oldest copy is kept. Never touches the hour with an
    /// open segment.
    pub fn compact_hour(&self, hour: &str, overwrite_existing: bool) -> Result<()> {
        let Some(partition) = self.hours.get(hour).map(|p| p.value().clone()) else {
            return Err(Error::NotFound(format!("hour {hour} not present")));
        };
        let mut state = partition.state.write();
        if state.open.is_some() {
            return Err(Error::Conflict(format!("hour {hour} has an open segment")));
        }
        if state.manifest.segments.len() <= 1 {
            return Ok(());
        }
        let segments = HourPartition::closed_segments(&state, &partition.dir);
        let mut by_id: BTreeMap<String, Event> = BTreeMap::new();
        for meta in &segments {
            let reader = SegmentReader::open(meta)?;
            for raw in reader.blocks() {
                for event in segment::decode_block_events(&raw)? {
                    if overwrite_existing {
                        by_id.insert(event.id.clone(), event);
                    } else {
                        by_id.entry(event.id.clone()).or_insert(event);
                    }
                }
            }
        }
        let mut merged: Vec<Event> = by_id.into_values().collect();
        merged.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));

        let id = state.manifest.next_id();
        let path = HourManifest::segment_path(&partition.dir, id);
        let mut file = fs::File::create(&path)?;
        let mut written = 0u64;
        for chunk in chunk_by_bytes(&merged, self.config.block_target_bytes) {
            let bytes = block::encode_block(chunk)?;
            file.write_all(&bytes)?;
            written += bytes.len() as u64;
        }
        file.sync_all()?;
        let old = std::mem::take(&mut state.manifest.segments);
        state.manifest.upsert(id, written);
        state.manifest.store(&partition.dir)?;
        for entry in old {
            let _ = fs::remove_file(HourManifest::segment_path(&partition.dir, entry.id));
        }
        info!(hour, events = merged.len(), segment = id, "compacted hour");
        Ok(())
    }

    /// Drop whole hour directories strictly older than `cutoff`
    ///
    /// The hour holding the open segment is never pruned.
    pub fn prune_before(&self, cutoff: Timestamp) -> Result<usize> {
        let cutoff_hour = cutoff.hour_key();
        let current = self.current_hour.lock().clone();
        let doomed: Vec<String> = self
            .hours
            .iter()
            .map(|e| e.key().clone())
            .filter(|h| *h < cutoff_hour && current.as_deref() != Some(h.as_str()))
            .collect();
        let mut removed = 0;
        for hour in doomed {
            if let Some((_, partition)) = self.hours.remove(&hour) {
                let _state = partition.state.write();
                fs::remove_dir_all(&partition.dir)?;
                removed += 1;
                info!(hour, "pruned hour");
            }
        }
        Ok(removed)
    }

    /// Scan events with `timestamp ∈ [start, end]` matching the filter
    ///
    /// Results are ordered by `(timestamp, id)`. `limit`, when set, truncates
    /// after ordering. The scan checks `cancel` between segments and bails
    /// out with a transient error when it fires.
    pub fn read_range(
        &self,
        start: Timestamp,
        end: Timestamp,
        filter: &EventFilter,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Event>, ScanCounters)> {
        if start > end {
            return Err(Error::Validation(format!(
                "window start {start} is after end {end}"
            )));
        }
        let start_key = start.hour_key();
        let end_key = end.hour_key();
        let mut hour_keys: Vec<String> = self
            .hours
            .iter()
            .map(|e| e.key().clone())
            .filter(|h| *h >= start_key && *h <= end_key)
            .collect();
        hour_keys.sort();

        let mut events = Vec::new();
        let mut counters = ScanCounters::default();
        for hour in hour_keys {
            let Some(partition) = self.hours.get(&hour).map(|p| p.value().clone()) else {
                continue;
            };
            // snapshot under the read lock, then scan without it
            let (closed, open_view) = {
                let state = partition.state.read();
                let closed = HourPartition::closed_segments(&state, &partition.dir);
                let open_view = state.open.as_ref().map(|open| {
                    (
                        SegmentMeta {
                            id: open.id,
                            path: open.path.clone(),
                            len: open.written,
                        },
                        open.buffer.clone(),
                    )
                });
                (closed, open_view)
            };
            for meta in closed {
                if cancel.is_cancelled() {
                    return Err(Error::Transient("scan cancelled".into()));
                }
                counters.files_searched += 1;
                self.scan_segment(&meta, start, end, filter, &mut events, &mut counters)?;
            }
            if let Some((meta, buffer)) = open_view {
                counters.files_searched += 1;
                if meta.len > 0 {
                    self.scan_segment(&meta, start, end, filter, &mut events, &mut counters)?;
                }
                events.extend(buffer.into_iter().filter(|e| {
                    e.timestamp >= start && e.timestamp <= end && filter.matches_event(e)
                }));
            }
        }
        events.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        if let Some(limit) = limit {
            events.truncate(limit);
        }
        Ok((events, counters))
    }

    fn scan_segment(
        &self,
        meta: &SegmentMeta,
        start: Timestamp,
        end: Timestamp,
        filter: &EventFilter,
        out: &mut Vec<Event>,
        counters: &mut ScanCounters,
    ) -> Result<()> {
        let reader = SegmentReader::open(meta)?;
        let segment_key = BlockCache::segment_key(&meta.path);
        let mut blocks = reader.blocks();
        while let Some(raw) = blocks.next() {
            if !raw.header.overlaps(start, end)
                || !raw.header.may_contain_kind(&filter.kinds)
                || !raw.header.may_contain_namespace(&filter.namespaces)
            {
                counters.segments_skipped += 1;
                continue;
            }
            let cache_key = (segment_key, raw.offset);
            let payload = match self.cache.as_ref().and_then(|c| c.get(&cache_key)) {
                Some(hit) => hit,
                None => match block::decompress_payload(&raw.header, &raw.payload) {
                    Ok(payload) => {
                        if let Some(cache) = &self.cache {
                            cache.insert(cache_key, payload.clone());
                        }
                        payload
                    }
                    Err(err) => {
                        warn!(segment = %meta.path.display(), offset = raw.offset, error = %err, "skipping corrupt block");
                        counters.corrupt_blocks += 1;
                        counters.segments_skipped += 1;
                        continue;
                    }
                },
            };
            match block::decode_events(&payload) {
                Ok(decoded) => {
                    counters.segments_scanned += 1;
                    out.extend(decoded.into_iter().filter(|e| {
                        e.timestamp >= start && e.timestamp <= end && filter.matches_event(e)
                    }));
                }
                Err(err) => {
                    warn!(segment = %meta.path.display(), offset = raw.offset, error = %err, "skipping undecodable block");
                    counters.corrupt_blocks += 1;
                    counters.segments_skipped += 1;
                }
            }
        }
        if blocks.corrupt {
            counters.corrupt_blocks += 1;
            counters.segments_skipped += 1;
        }
        Ok(())
    }

    /// Hour keys currently present, ascending
    #[must_use]
    pub fn hour_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.hours.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Segment files of one hour together with that hour's manifest path
    ///
    /// Used by export; the open segment is reported at its flushed length.
    pub(crate) fn hour_files(&self, hour: &str) -> Option<(Vec<SegmentMeta>, PathBuf)> {
        let partition = self.hours.get(hour)?.value().clone();
        let state = partition.state.read();
        let mut segments = HourPartition::closed_segments(&state, &partition.dir);
        if let Some(open) = state.open.as_ref() {
            if open.written > 0 {
                segments.push(SegmentMeta {
                    id: open.id,
                    path: open.path.clone(),
                    len: open.written,
                });
            }
        }
        Some((segments, partition.dir.join(MANIFEST_NAME)))
    }

    /// The log's configuration
    #[must_use]
    pub fn config(&self) -> &LogConfig {
        &self.config
    }
}

/// Split events into chunks whose serialized size approximates the target
fn chunk_by_bytes<'a>(events: &'a [Event], target: usize) -> impl Iterator<Item = &'a [Event]> + 'a {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut size = 0usize;
    for (i, event) in events.iter().enumerate() {
        size += serde_json::to_vec(event).map(|b| b.len()).unwrap_or(0) + 4;
        if size >= target && i + 1 > start {
            chunks.push(&events[start..=i]);
            start = i + 1;
            size = 0;
        }
    }
    if start < events.len() {
        chunks.push(&events[start..]);
    }
    chunks.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{event, event_at};
    use spectre_core::EventType;

    fn test_log(dir: &std::path::Path) -> EventLog {
        let mut config = LogConfig::new(dir);
        config.block_target_bytes = 512; // tiny blocks, more pushdown coverage
        EventLog::open(config).unwrap()
    }

    fn scan_all(log: &EventLog) -> Vec<Event> {
        let (events, _) = log
            .read_range(
                Timestamp::from_nanos(1),
                Timestamp::from_nanos(i64::MAX),
                &EventFilter::any(),
                None,
                &CancellationToken::new(),
            )
            .unwrap();
        events
    }

    #[test]
    fn roundtrips_in_timestamp_id_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        let mut expected = Vec::new();
        for i in 0..20 {
            let e = event("Pod", "default", &format!("p-{i}"), 1_700_000_000 + i);
            log.append(e.clone()).unwrap();
            expected.push(e);
        }
        let events = scan_all(&log);
        assert_eq!(events, expected);
    }

    #[test]
    fn late_events_land_in_their_own_hour() {
        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        let now = 1_700_000_000;
        log.append(event("Pod", "default", "p-now", now)).unwrap();
        // an hour older
        log.append(event("Pod", "default", "p-late", now - 3600)).unwrap();
        assert_eq!(log.hour_keys().len(), 2);
        let events = scan_all(&log);
        assert_eq!(events[0].resource.uid, "p-late");
        assert_eq!(events[1].resource.uid, "p-now");
    }

    #[test]
    fn filters_push_down_and_count_skips() {
        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        for i in 0..10 {
            log.append(event("Deployment", "prod", &format!("d-{i}"), 1_700_000_000 + i))
                .unwrap();
        }
        log.flush().unwrap();
        let (events, counters) = log
            .read_range(
                Timestamp::from_secs(1_700_000_000),
                Timestamp::from_secs(1_700_001_000),
                &EventFilter::any().kind("Service"),
                None,
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(events.is_empty());
        assert!(counters.segments_skipped > 0);
        assert_eq!(counters.segments_scanned, 0);
    }

    #[test]
    fn survives_reopen_and_truncates_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = test_log(dir.path());
            for i in 0..5 {
                log.append(event("Pod", "default", &format!("p-{i}"), 1_700_000_000 + i))
                    .unwrap();
            }
            log.flush().unwrap();
            // simulate a torn write on the open segment
            let hour = Timestamp::from_secs(1_700_000_000).hour_key();
            let seg = dir.path().join("hours").join(&hour).join("seg-000000.blk");
            let mut file = fs::OpenOptions::new().append(true).open(seg).unwrap();
            file.write_all(b"torn garbage").unwrap();
        }
        let log = test_log(dir.path());
        let events = scan_all(&log);
        assert_eq!(events.len(), 5);
    }

    #[test]
    fn add_batch_overwrites_duplicates_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        let ts = Timestamp::from_secs(1_690_000_000); // hour older than anything else
        let original = event_at("Pod", "default", "p-1", ts, EventType::Update);
        log.add_batch(vec![original.clone()], &ImportOptions::default())
            .unwrap();

        let mut replacement = original.clone();
        replacement.data = serde_json::json!({"metadata": {"uid": "p-1"}, "note": "replaced"});
        log.add_batch(
            vec![replacement.clone()],
            &ImportOptions {
                overwrite_existing: true,
            },
        )
        .unwrap();

        let events = scan_all(&log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["note"], "replaced");
    }

    #[test]
    fn prune_drops_old_hours_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        let now = 1_700_000_000;
        log.append(event("Pod", "default", "p-old", now - 7200)).unwrap();
        log.append(event("Pod", "default", "p-now", now)).unwrap();
        let removed = log.prune_before(Timestamp::from_secs(now - 3600)).unwrap();
        assert_eq!(removed, 1);
        let events = scan_all(&log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource.uid, "p-now");
    }

    #[test]
    fn cancellation_aborts_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let log = test_log(dir.path());
        log.append(event("Pod", "default", "p-1", 1_700_000_000)).unwrap();
        log.flush().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = log
            .read_range(
                Timestamp::from_secs(1),
                Timestamp::from_secs(2_000_000_000),
                &EventFilter::any(),
                None,
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
    }
}
