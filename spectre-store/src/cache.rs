//! In-memory cache of decompressed block payloads.

use ahash::RandomState;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;

/// Cache key: a stable hash of the segment path plus the block offset
pub(crate) type BlockKey = (u64, u64);

const SHARDS: usize = 8;

struct Shard {
    entries: LruCache<BlockKey, Bytes>,
    bytes: usize,
}

/// Size-capped, sharded LRU cache from `(segment, blockOffset)` to the
/// decompressed payload bytes of that block
///
/// The cache is purely an optimisation: correctness never depends on it, and
/// eviction runs inline on insertion. Capacity is accounted in decompressed
/// bytes, split evenly across shards.
pub struct BlockCache {
    shards: Vec<Mutex<Shard>>,
    shard_capacity: usize,
    hasher: RandomState,
}

impl BlockCache {
    /// Create a cache holding roughly `capacity_bytes` of decompressed blocks
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        let shards = (0..SHARDS)
            .map(|_| {
                Mutex::new(Shard {
                    // capped by byte accounting, not entry count
                    entries: LruCache::unbounded(),
                    bytes: 0,
                })
            })
            .collect();
        Self {
            shards,
            shard_capacity: capacity_bytes / SHARDS,
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, key: &BlockKey) -> &Mutex<Shard> {
        let idx = (self.hasher.hash_one(key) % SHARDS as u64) as usize;
        &self.shards[idx]
    }

    /// Fetch a cached payload
    #[must_use]
    pub fn get(&self, key: &BlockKey) -> Option<Bytes> {
        self.shard(key).lock().entries.get(key).cloned()
    }

    /// Insert a payload, evicting least-recently-used entries while the
    /// shard is over budget
    pub fn insert(&self, key: BlockKey, payload: Bytes) {
        if payload.len() > self.shard_capacity {
            return;
        }
        let mut shard = self.shard(&key).lock();
        if let Some(old) = shard.entries.put(key, payload.clone()) {
            shard.bytes -= old.len();
        }
        shard.bytes += payload.len();
        while shard.bytes > self.shard_capacity {
            match shard.entries.pop_lru() {
                Some((_, evicted)) => shard.bytes -= evicted.len(),
                None => break,
            }
        }
    }

    /// Total decompressed bytes currently held
    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.shards.iter().map(|s| s.lock().bytes).sum()
    }

    /// Stable key for a segment path
    #[must_use]
    pub fn segment_key(path: &std::path::Path) -> u64 {
        // fixed seeds so a path maps to the same key across log reopens
        RandomState::with_seeds(1, 2, 3, 4).hash_one(path.to_string_lossy().as_ref())
    }
}
