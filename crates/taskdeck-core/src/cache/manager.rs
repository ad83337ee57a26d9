use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::InvalidationTag;

/// Consider a read result stale after 5 minutes even if nothing invalidated it.
/// Task data changes from other clients too, so keep this short.
pub const DEFAULT_STALE_MINUTES: i64 = 5;

/// A tag plus the variant of the read (e.g. the task list's query string).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tag: InvalidationTag,
    pub variant: String,
}

impl CacheKey {
    pub fn new(tag: InvalidationTag) -> Self {
        Self {
            tag,
            variant: String::new(),
        }
    }

    pub fn with_variant(tag: InvalidationTag, variant: impl Into<String>) -> Self {
        Self {
            tag,
            variant: variant.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    #[serde(default)]
    pub invalidated: bool,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
            invalidated: false,
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn is_stale(&self, max_age_minutes: i64) -> bool {
        self.invalidated || self.age_minutes() >= max_age_minutes
    }
}

/// Handed out when a read starts; a result is only stored if no matching
/// invalidation happened while the read was in flight.
#[derive(Debug, Clone)]
pub struct ReadTicket {
    key: CacheKey,
    tag_epoch: u64,
    generation: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CachedData<Value>>,
    epochs: HashMap<InvalidationTag, u64>,
    generation: u64,
}

impl CacheState {
    fn epoch(&self, tag: InvalidationTag) -> u64 {
        self.epochs.get(&tag).copied().unwrap_or(0)
    }
}

/// Tracks which read results are still fresh.
///
/// Holds the last result per key so a fresh read can be served without a
/// round-trip; it never evicts on its own. Staleness comes from explicit
/// invalidation after a confirmed mutation, or from age.
pub struct CacheManager {
    state: Mutex<CacheState>,
    stale_minutes: i64,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_MINUTES)
    }
}

impl CacheManager {
    pub fn new(stale_minutes: i64) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            stale_minutes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The cached value for `key`, if present and fresh.
    pub fn load<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let state = self.lock();
        let cached = state.entries.get(key)?;
        if cached.is_stale(self.stale_minutes) {
            return None;
        }
        match serde_json::from_value(cached.data.clone()) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(tag = %key.tag, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.lock()
            .entries
            .get(key)
            .map(|c| c.is_stale(self.stale_minutes))
            .unwrap_or(true)
    }

    pub fn begin_read(&self, key: CacheKey) -> ReadTicket {
        let state = self.lock();
        ReadTicket {
            tag_epoch: state.epoch(key.tag),
            generation: state.generation,
            key,
        }
    }

    /// Store a read result. Returns `false` (and stores nothing) when the
    /// key was invalidated after `ticket` was issued.
    pub fn save<T: Serialize>(&self, ticket: ReadTicket, data: &T) -> bool {
        let value = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                warn!(tag = %ticket.key.tag, error = %e, "Failed to cache value");
                return false;
            }
        };

        let mut state = self.lock();
        if state.generation != ticket.generation || state.epoch(ticket.key.tag) != ticket.tag_epoch {
            debug!(tag = %ticket.key.tag, "Discarding read that raced an invalidation");
            return false;
        }
        state.entries.insert(ticket.key, CachedData::new(value));
        true
    }

    /// Mark every result carrying one of `tags` as needing a refetch.
    pub fn invalidate(&self, tags: &[InvalidationTag]) {
        let mut state = self.lock();
        for tag in tags {
            *state.epochs.entry(*tag).or_insert(0) += 1;
        }
        let mut marked = 0;
        for (key, cached) in state.entries.iter_mut() {
            if tags.contains(&key.tag) && !cached.invalidated {
                cached.invalidated = true;
                marked += 1;
            }
        }
        debug!(?tags, marked, "Invalidated cached reads");
    }

    /// Forget everything, e.g. when the session ends.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.generation += 1;
        debug!("Cache cleared");
    }
}
