//! Per-alert caching of analysis results.

use std::{collections::HashMap, time::Duration};

use parking_lot::Mutex;
use spectre_core::Timestamp;

/// Copy-on-read cache keyed by alert
///
/// An entry satisfies reads for one TTL (one sampling interval) from its
/// `computed_at`. Values are cloned out so a caller can never mutate the
/// cached copy.
pub struct AnalysisCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (T, Timestamp)>>,
}

impl<T: Clone> AnalysisCache<T> {
    /// Cache whose entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A clone of the entry, if still fresh at `now`
    #[must_use]
    pub fn get(&self, key: &str, now: Timestamp) -> Option<T> {
        let entries = self.entries.lock();
        let (value, computed_at) = entries.get(key)?;
        (now.as_nanos() - computed_at.as_nanos() < self.ttl.as_nanos() as i64)
            .then(|| value.clone())
    }

    /// Store a freshly computed entry
    pub fn put(&self, key: &str, value: T, computed_at: Timestamp) {
        self.entries
            .lock()
            .insert(key.to_string(), (value, computed_at));
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_one_interval() {
        let cache = AnalysisCache::new(Duration::from_secs(300));
        let t0 = Timestamp::from_secs(1_700_000_000);
        cache.put("alert-1", 42u32, t0);
        assert_eq!(cache.get("alert-1", t0 + Duration::from_secs(299)), Some(42));
        assert_eq!(cache.get("alert-1", t0 + Duration::from_secs(300)), None);
        assert_eq!(cache.get("other", t0), None);
    }

    #[test]
    fn reads_clone_rather_than_share() {
        let cache = AnalysisCache::new(Duration::from_secs(300));
        let t0 = Timestamp::from_secs(1_700_000_000);
        cache.put("alert-1", vec![1, 2, 3], t0);
        let mut copy = cache.get("alert-1", t0).unwrap();
        copy.push(4);
        assert_eq!(cache.get("alert-1", t0).unwrap(), vec![1, 2, 3]);
    }
}
