//! Page cache storage.
//!
//! An LRU map of rendered responses with a fixed TTL. Entries expire by
//! time or leave under LRU pressure; there is no per-entry invalidation.

use std::sync::RwLock;
use std::time::Instant;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;

use super::config::CacheConfig;
use super::keys::PageKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// A rendered response held by the cache.
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    stored_at: Instant,
}

impl CachedPage {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at: Instant::now(),
        }
    }
}

/// Process-wide cache of rendered feed pages.
///
/// Lifecycle: populated lazily on read, expired by TTL, wiped entirely by
/// [`PageCache::clear`]. Mutation handlers never touch it.
pub struct PageCache {
    config: CacheConfig,
    pages: RwLock<LruCache<PageKey, CachedPage>>,
}

impl PageCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = config.max_pages_non_zero();
        Self {
            config,
            pages: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fetch a fresh entry. Expired entries are dropped on the way out.
    pub fn get(&self, key: &PageKey) -> Option<CachedPage> {
        let mut pages = rw_write(&self.pages, SOURCE, "get");

        match pages.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.config.ttl => {
                counter!("brusio_page_cache_hit_total").increment(1);
                Some(entry.clone())
            }
            Some(_) => {
                pages.pop(key);
                counter!("brusio_page_cache_expired_total").increment(1);
                None
            }
            None => {
                counter!("brusio_page_cache_miss_total").increment(1);
                None
            }
        }
    }

    pub fn set(&self, key: PageKey, page: CachedPage) {
        let evicted = rw_write(&self.pages, SOURCE, "set").push(key, page);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!("brusio_page_cache_evict_total").increment(1);
        }
    }

    /// Wipe every cached page at once. Reserved for maintenance and tests.
    pub fn clear(&self) {
        rw_write(&self.pages, SOURCE, "clear").clear();
        counter!("brusio_page_cache_clear_total").increment(1);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.pages, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
