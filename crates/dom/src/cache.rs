//! Shared cache of instance trees loaded from external sources.
//!
//! Trees are published as `Arc<XmlTree>` and never mutated once cached; an
//! [`Instance`](crate::Instance) holding a cached tree copies it on first
//! write. Each key is loaded at most once at a time: concurrent first
//! requests for the same key wait on the same cell instead of issuing
//! duplicate loads.

use crate::tree::XmlTree;
use core::time::Duration;
use dashmap::DashMap;
use log::{debug, trace};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Default number of cached instances.
pub const DEFAULT_CACHE_SIZE: usize = 200;

/// Identity of a cached instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub static_id: String,
    pub source_uri: String,
}

impl CacheKey {
    pub fn new(static_id: &str, source_uri: &str) -> Self {
        Self {
            static_id: static_id.to_owned(),
            source_uri: source_uri.to_owned(),
        }
    }
}

#[derive(Debug)]
struct CachedTree {
    tree: Arc<XmlTree>,
    loaded_at: Instant,
    ttl: Option<Duration>,
}

impl CachedTree {
    fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.loaded_at.elapsed() >= ttl)
    }
}

type Slot = Arc<OnceCell<CachedTree>>;

/// Process-wide store of read-only instance trees.
#[derive(Debug)]
pub struct InstanceCache {
    entries: DashMap<CacheKey, Slot, FxBuildHasher>,
    order: Mutex<VecDeque<CacheKey>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for InstanceCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl InstanceCache {
    /// Create a cache holding at most `max_entries` trees (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::with_hasher(FxBuildHasher),
            order: Mutex::new(VecDeque::new()),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached tree for `key`, loading it with `loader` if needed.
    ///
    /// Only one caller runs `loader` for a given key; others block until it
    /// finishes and then share the result. A failed load leaves the entry
    /// empty so that a later request retries.
    ///
    /// # Errors
    /// Propagates the loader's error.
    pub fn get_or_load<E, F>(&self, key: &CacheKey, ttl: Option<Duration>, loader: F) -> Result<Arc<XmlTree>, E>
    where
        F: FnOnce() -> Result<XmlTree, E>,
    {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|slot| slot.get().is_some_and(CachedTree::is_expired));
        if expired {
            debug!("instance cache: `{}` expired", key.source_uri);
            self.invalidate(key);
        }

        let slot: Slot = Arc::clone(
            self.entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        let mut loaded = false;
        let attempt = slot.get_or_try_init(|| {
            loaded = true;
            trace!("instance cache: loading `{}`", key.source_uri);
            loader().map(|tree| CachedTree {
                tree: Arc::new(tree),
                loaded_at: Instant::now(),
                ttl,
            })
        });
        let cached = match attempt {
            Ok(cached) => cached,
            Err(error) => {
                debug!("instance cache: loading `{}` failed", key.source_uri);
                self.entries.remove_if(key, |_, slot| slot.get().is_none());
                return Err(error);
            }
        };

        if loaded {
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.record_insert(key);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("instance cache: hit for `{}`", key.source_uri);
        }
        Ok(Arc::clone(&cached.tree))
    }

    /// Tree for `key` if it is cached and fresh.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<XmlTree>> {
        self.entries.get(key).and_then(|slot| {
            slot.get()
                .filter(|cached| !cached.is_expired())
                .map(|cached| Arc::clone(&cached.tree))
        })
    }

    fn record_insert(&self, key: &CacheKey) {
        let mut order = self.order.lock();
        order.push_back(key.clone());
        while order.len() > self.max_entries {
            if let Some(oldest) = order.pop_front() {
                debug!("instance cache: evicting `{}`", oldest.source_uri);
                self.entries.remove(&oldest);
            }
        }
    }

    /// Drop `key` from the cache.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(key);
        self.order.lock().retain(|queued| queued != key);
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.order.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
