// Expiring cache sitting between the planner and every upstream provider.
// Entries live for a fixed TTL from insertion; when the cache is full the
// oldest insertion is evicted.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::ConfigError;

// Cache configuration options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub items_count: usize,
    pub capacity: usize,
    pub ttl: Duration,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
}

struct Node<V> {
    key: String,
    value: V,
    inserted_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

// Slots form a doubly linked list in insertion order: `head` is the oldest
// insertion and `tail` the newest. Position in the list is the insertion
// sequence, so two entries stamped with the same Instant still evict in the
// order they were written.
struct Inner<V> {
    index: HashMap<String, usize>,
    slots: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    hits: usize,
    misses: usize,
    evictions: usize,
    expirations: usize,
}

impl<V> Inner<V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn node(&self, idx: usize) -> Option<&Node<V>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<V>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn push_back(&mut self, key: String, value: V, inserted_at: Instant) {
        let node = Node {
            key: key.clone(),
            value,
            inserted_at,
            prev: self.tail,
            next: None,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(tail) => {
                if let Some(prev) = self.node_mut(tail) {
                    prev.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.index.insert(key, idx);
    }

    fn detach(&mut self, idx: usize) -> Option<Node<V>> {
        let node = self.slots.get_mut(idx)?.take()?;

        match node.prev {
            Some(prev) => {
                if let Some(p) = self.node_mut(prev) {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.node_mut(next) {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.free.push(idx);
        self.index.remove(&node.key);
        Some(node)
    }

    fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }
}

/// Bounded key/value store with time-to-live expiry.
///
/// A read never refreshes an entry: this is TTL retention, not LRU. All
/// bookkeeping sits behind one mutex so eviction-candidate selection is atomic
/// with respect to concurrent inserts.
pub struct ExpiringCache<V> {
    max_size: usize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        if config.max_size == 0 {
            return Err(ConfigError::Invalid {
                key: "cache.max_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            max_size: config.max_size,
            ttl: config.ttl,
            inner: Mutex::new(Inner::new()),
        })
    }

    // Returns the value if present and younger than the TTL. A stale entry is
    // dropped on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let Some(&idx) = inner.index.get(key) else {
            inner.misses += 1;
            return None;
        };

        let expired = inner
            .node(idx)
            .map_or(true, |node| now.duration_since(node.inserted_at) >= self.ttl);

        if expired {
            inner.detach(idx);
            inner.expirations += 1;
            inner.misses += 1;
            trace!(key, "cache entry expired");
            return None;
        }

        inner.hits += 1;
        inner.node(idx).map(|node| node.value.clone())
    }

    // Like `get`, but leaves the counters and the entry list untouched
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let inner = self.inner.lock();
        let idx = *inner.index.get(key)?;
        inner
            .node(idx)
            .filter(|node| now.duration_since(node.inserted_at) < self.ttl)
            .map(|node| node.value.clone())
    }

    // Overwriting a key re-stamps it and moves it to the newest position.
    // Only a brand-new key can push the cache past capacity.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if let Some(&idx) = inner.index.get(&key) {
            inner.detach(idx);
        } else if inner.index.len() >= self.max_size {
            if let Some(head) = inner.head {
                if let Some(evicted) = inner.detach(head) {
                    inner.evictions += 1;
                    debug!(key = %evicted.key, "evicted oldest cache entry");
                }
            }
        }

        inner.push_back(key, value, now);
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let idx = *inner.index.get(key)?;
        inner.detach(idx).map(|node| node.value)
    }

    // Entries share one TTL, so the expired ones are always a prefix of the
    // insertion list.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let mut purged = 0;

        while let Some(head) = inner.head {
            let stale = inner
                .node(head)
                .map_or(false, |node| now.duration_since(node.inserted_at) >= self.ttl);
            if !stale {
                break;
            }
            inner.detach(head);
            purged += 1;
        }

        inner.expirations += purged;
        purged
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            items_count: inner.index.len(),
            capacity: self.max_size,
            ttl: self.ttl,
            hit_count: inner.hits,
            miss_count: inner.misses,
            eviction_count: inner.evictions,
            expired_count: inner.expirations,
        }
    }
}
