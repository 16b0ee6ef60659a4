//! Fingerprint-keyed response cache
//!
//! Bounded LRU with per-kind soft TTLs and a pin floor: fingerprints tied
//! to live world state (the room the player is standing in) are never
//! evicted, whatever the pressure.

use crate::fingerprint::Fingerprint;
use crate::kind::RequestKind;
use crate::response::ValidatedResponse;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

struct CacheEntry {
    value: ValidatedResponse,
    kind: RequestKind,
    inserted_at: Instant,
}

pub struct ResponseCache {
    capacity: usize,
    entries: HashMap<Fingerprint, CacheEntry>,
    /// Recency order, least recent at the front.
    order: VecDeque<Fingerprint>,
    pinned: HashSet<Fingerprint>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            pinned: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, fingerprint: &Fingerprint) -> Option<ValidatedResponse> {
        let expired = match self.entries.get(fingerprint) {
            None => return None,
            Some(entry) => match entry.kind.cache_ttl() {
                Some(ttl) => entry.inserted_at.elapsed() > ttl,
                None => false,
            },
        };
        if expired {
            self.remove(fingerprint);
            return None;
        }
        self.touch(fingerprint);
        self.entries.get(fingerprint).map(|e| e.value.clone())
    }

    pub fn insert(&mut self, fingerprint: Fingerprint, kind: RequestKind, value: ValidatedResponse) {
        if !kind.cacheable() {
            return;
        }
        if self.entries.contains_key(&fingerprint) {
            self.touch(&fingerprint);
            if let Some(entry) = self.entries.get_mut(&fingerprint) {
                entry.value = value;
                entry.inserted_at = Instant::now();
            }
            return;
        }
        self.evict_to_fit();
        self.entries.insert(
            fingerprint,
            CacheEntry { value, kind, inserted_at: Instant::now() },
        );
        self.order.push_back(fingerprint);
    }

    /// Pin a fingerprint against eviction while its world state is live.
    pub fn pin(&mut self, fingerprint: Fingerprint) {
        self.pinned.insert(fingerprint);
    }

    pub fn unpin(&mut self, fingerprint: &Fingerprint) {
        self.pinned.remove(fingerprint);
    }

    /// Drop the oldest unpinned entries until one slot is free.
    fn evict_to_fit(&mut self) {
        while self.entries.len() >= self.capacity {
            let victim = self
                .order
                .iter()
                .find(|fp| !self.pinned.contains(fp))
                .copied();
            match victim {
                Some(fp) => self.remove(&fp),
                // everything is pinned; let the cache grow past capacity
                None => break,
            }
        }
    }

    fn remove(&mut self, fingerprint: &Fingerprint) {
        self.entries.remove(fingerprint);
        self.order.retain(|fp| fp != fingerprint);
    }

    fn touch(&mut self, fingerprint: &Fingerprint) {
        self.order.retain(|fp| fp != fingerprint);
        self.order.push_back(*fingerprint);
    }
}
