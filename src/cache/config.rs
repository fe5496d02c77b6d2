//! Page cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_TTL_SECONDS: u64 = 20;
const DEFAULT_MAX_PAGES: usize = 64;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Disabling the cache turns the middleware into a pass-through.
    pub enabled: bool,
    /// How long a cached rendering stays servable.
    pub ttl: Duration,
    /// Maximum cached pages; LRU eviction beyond this.
    pub max_pages: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl CacheConfig {
    /// The LRU capacity, clamped to at least one entry.
    pub fn max_pages_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_pages).unwrap_or(NonZeroUsize::MIN)
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: Duration::from_secs(settings.ttl_seconds),
            max_pages: settings.max_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ttl, Duration::from_secs(20));
        assert_eq!(config.max_pages, 64);
    }

    #[test]
    fn capacity_clamps_to_one() {
        let config = CacheConfig {
            max_pages: 0,
            ..Default::default()
        };
        assert_eq!(config.max_pages_non_zero().get(), 1);
    }
}
