//! Per-hour manifest used for crash recovery.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use spectre_core::Result;

/// File name of the hidden manifest inside each hour directory
pub const MANIFEST_NAME: &str = ".manifest";

/// One segment entry in the manifest
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Monotonic segment id within the hour
    pub id: u64,
    /// Last known good byte length of the segment file
    pub len: u64,
}

/// Listing of an hour's segments and their last known byte lengths
///
/// The manifest is rewritten (atomically, via rename) whenever a segment
/// rotates or an hour is compacted. On restart, bytes beyond the recorded
/// length are assumed to be a torn write and truncated away; the segment is
/// then re-validated block by block.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct HourManifest {
    /// Segments in id order
    pub segments: Vec<ManifestEntry>,
}

impl HourManifest {
    /// Load the manifest for an hour directory, empty if absent
    pub fn load(hour_dir: &Path) -> Result<Self> {
        let path = hour_dir.join(MANIFEST_NAME);
        match fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the manifest atomically and fsync it
    pub fn store(&self, hour_dir: &Path) -> Result<()> {
        let tmp = hour_dir.join(format!("{MANIFEST_NAME}.tmp"));
        let path = hour_dir.join(MANIFEST_NAME);
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(self)?)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Record (or update) a segment's length
    pub fn upsert(&mut self, id: u64, len: u64) {
        match self.segments.iter_mut().find(|s| s.id == id) {
            Some(entry) => entry.len = len,
            None => {
                self.segments.push(ManifestEntry { id, len });
                self.segments.sort_by_key(|s| s.id);
            }
        }
    }

    /// The recorded length of a segment, if listed
    #[must_use]
    pub fn len_of(&self, id: u64) -> Option<u64> {
        self.segments.iter().find(|s| s.id == id).map(|s| s.len)
    }

    /// The next free segment id for this hour
    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.segments.last().map(|s| s.id + 1).unwrap_or(0)
    }

    /// Path of a segment file within its hour directory
    #[must_use]
    pub fn segment_path(hour_dir: &Path, id: u64) -> PathBuf {
        hour_dir.join(format!("seg-{id:06}.blk"))
    }
}
