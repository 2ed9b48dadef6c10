//! Response cache with lazy expiry

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::fingerprint::Fingerprint;
use crate::error::Result;
use crate::models::CompletionResponse;

/// Storage for cached completions.
///
/// Errors from a store are never fatal: the router treats a failed read as a miss and a
/// failed write as a no-op.
pub trait ResponseStore: Send + Sync {
    /// Look up a live entry
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CompletionResponse>>;

    /// Store a response, replacing any previous entry for the fingerprint
    fn put(&self, fingerprint: Fingerprint, response: CompletionResponse, ttl: Duration)
        -> Result<()>;

    /// Number of stored entries, expired ones included
    fn len(&self) -> usize;

    /// Whether the store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    fn clear(&self);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CompletionResponse,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) < self.ttl
    }
}

/// Entries plus their insertion order.
///
/// `order` may hold records for entries that were since replaced or removed; a record
/// is current only while its timestamp matches the entry's.
#[derive(Debug, Default)]
struct Entries {
    map: HashMap<Fingerprint, CacheEntry>,
    order: VecDeque<(Fingerprint, Instant)>,
}

impl Entries {
    fn is_current(&self, key: &Fingerprint, created_at: Instant) -> bool {
        self.map
            .get(key)
            .is_some_and(|entry| entry.created_at == created_at)
    }

    /// Evict in insertion order until there is room for one more entry
    fn make_room(&mut self, max_entries: usize) {
        while self.map.len() >= max_entries {
            let Some((key, created_at)) = self.order.pop_front() else {
                break;
            };
            if self.is_current(&key, created_at) {
                self.map.remove(&key);
            }
        }
    }

    /// Drop stale order records once they outnumber live entries
    fn compact(&mut self) {
        if self.order.len() > 2 * self.map.len().max(16) {
            let map = &self.map;
            self.order.retain(|(key, created_at)| {
                map.get(key)
                    .is_some_and(|entry| entry.created_at == *created_at)
            });
        }
    }
}

/// In-memory response cache.
///
/// Lookups take the shared lock; writes and evictions take the exclusive lock.
/// Expired entries are removed when a lookup finds them. A bounded cache evicts the
/// oldest entry to make room, which under the router's single TTL is also the first
/// to expire.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<Entries>,
    max_entries: Option<usize>,
}

impl ResponseCache {
    /// Create an unbounded cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache holding at most `max_entries` entries
    pub fn with_capacity(max_entries: usize) -> Self {
        let reserve = max_entries.min(1024);
        Self {
            entries: RwLock::new(Entries {
                map: HashMap::with_capacity(reserve),
                order: VecDeque::with_capacity(reserve),
            }),
            max_entries: Some(max_entries.max(1)),
        }
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.map.len();
        entries.map.retain(|_, entry| entry.is_live(now));
        entries.compact();
        before - entries.map.len()
    }
}

impl ResponseStore for ResponseCache {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CompletionResponse>> {
        let now = Instant::now();

        {
            let entries = self.entries.read();
            match entries.map.get(fingerprint) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.response.clone())),
                Some(_) => {}
            }
        }

        // Expired: evict unless a concurrent put already refreshed it
        let mut entries = self.entries.write();
        if let Some(entry) = entries.map.get(fingerprint) {
            if entry.is_live(now) {
                return Ok(Some(entry.response.clone()));
            }
            entries.map.remove(fingerprint);
        }
        Ok(None)
    }

    fn put(
        &self,
        fingerprint: Fingerprint,
        response: CompletionResponse,
        ttl: Duration,
    ) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write();

        if let Some(max_entries) = self.max_entries {
            if !entries.map.contains_key(&fingerprint) {
                entries.make_room(max_entries);
            }
            entries.order.push_back((fingerprint.clone(), now));
        }

        entries.map.insert(
            fingerprint,
            CacheEntry {
                response,
                created_at: now,
                ttl,
            },
        );
        if self.max_entries.is_some() {
            entries.compact();
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    fn clear(&self) {
        let mut entries = self.entries.write();
        entries.map.clear();
        entries.order.clear();
    }
}
