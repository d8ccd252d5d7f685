use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::trace;

/// Result of asking the cache for a fingerprint.
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a, V> {
    Fresh(&'a V),
    /// Another caller already started this fetch.
    InFlight,
    Miss,
}

#[derive(Debug)]
enum Entry<V> {
    Pending { since: DateTime<Utc> },
    Ready { at: DateTime<Utc>, value: V },
}

/// Fetch results keyed by request fingerprint, with a TTL and
/// deduplication of fetches already in flight.
///
/// Clock readings are always supplied by the caller.
#[derive(Debug)]
pub struct FetchCache<V> {
    ttl: Duration,
    entries: HashMap<String, Entry<V>>,
}

impl<V> FetchCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn lookup(&self, key: &str, now: DateTime<Utc>) -> Lookup<'_, V> {
        match self.entries.get(key) {
            Some(Entry::Ready { at, value }) if now - *at < self.ttl => Lookup::Fresh(value),
            // a pending fetch that outlived the TTL is treated as lost
            Some(Entry::Pending { since }) if now - *since < self.ttl => Lookup::InFlight,
            _ => Lookup::Miss,
        }
    }

    /// Marks `key` as being fetched. Returns false when a live fetch for the
    /// same key is already pending, in which case the caller should not
    /// issue another.
    pub fn begin(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        if matches!(self.lookup(key, now), Lookup::InFlight) {
            trace!(key, "fetch already in flight");
            return false;
        }
        self.entries
            .insert(key.to_string(), Entry::Pending { since: now });
        true
    }

    pub fn fulfill(&mut self, key: &str, value: V, now: DateTime<Utc>) {
        trace!(key, "fetch fulfilled");
        self.entries
            .insert(key.to_string(), Entry::Ready { at: now, value });
    }

    /// Drops a pending marker after a failed fetch. Ready values are kept.
    pub fn abandon(&mut self, key: &str) {
        if matches!(self.entries.get(key), Some(Entry::Pending { .. })) {
            self.entries.remove(key);
        }
    }

    pub fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stable key for a request made of several parts.
pub fn fingerprint(parts: &[&str]) -> String {
    json!(parts).to_string()
}
