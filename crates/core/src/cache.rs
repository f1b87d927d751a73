//! Bounded, thread-safe caches shared by the detector, the translator and the
//! session-language memory.
//!
//! Eviction is FIFO: when a new key arrives at a full cache, the entry that was
//! inserted first is removed. Reads do not refresh an entry's position and
//! overwriting an existing key keeps its original slot.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheCounters {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

struct Slots<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

pub struct BoundedCache<K, V> {
    capacity: usize,
    slots: Mutex<Slots<K, V>>,
    counters: CacheCounters,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A zero capacity is raised to one so an insert always lands.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: Mutex::new(Slots {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            counters: CacheCounters::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock();
        match slots.entries.get(key) {
            Some(value) => {
                self.counters.record_hit();
                Some(value.clone())
            }
            None => {
                self.counters.record_miss();
                None
            }
        }
    }

    /// Size check, eviction and insertion happen under one lock.
    /// Returns the evicted key, if any.
    pub fn insert(&self, key: K, value: V) -> Option<K> {
        let mut slots = self.slots.lock();
        if let Some(existing) = slots.entries.get_mut(&key) {
            *existing = value;
            return None;
        }

        let mut evicted = None;
        if slots.entries.len() >= self.capacity {
            if let Some(oldest) = slots.order.pop_front() {
                slots.entries.remove(&oldest);
                self.counters.record_eviction();
                evicted = Some(oldest);
            }
        }

        slots.order.push_back(key.clone());
        slots.entries.insert(key, value);
        evicted
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry and resets the counters, returning how many entries were removed.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock();
        let removed = slots.entries.len();
        slots.entries.clear();
        slots.order.clear();
        self.counters.reset();
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.len();
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            size,
            capacity: self.capacity,
            hits,
            misses,
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}
