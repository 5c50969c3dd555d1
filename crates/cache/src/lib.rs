//! Decision cache strategies for uiscout.

pub mod disabled;
pub mod in_memory;
pub mod disk;

pub use disabled::DisabledCache;
pub use in_memory::InMemoryCache;
pub use disk::DiskCache;

use std::sync::Arc;
use uiscout_config::{CacheConfig, CacheStrategy};
use uiscout_core::cache::DecisionCache;

/// Build the cache selected by the project configuration.
pub fn build_from_config(config: &CacheConfig) -> Arc<dyn DecisionCache> {
    let cache: Arc<dyn DecisionCache> = match config.strategy {
        CacheStrategy::Disabled => Arc::new(DisabledCache),
        CacheStrategy::InMemory => Arc::new(InMemoryCache::new()),
        CacheStrategy::Disk => Arc::new(DiskCache::new(&config.dir)),
    };
    tracing::debug!(strategy = cache.name(), "Decision cache ready");
    cache
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_selects_implementation() {
        let mut config = CacheConfig::default();
        assert_eq!(build_from_config(&config).name(), "in_memory");

        config.strategy = CacheStrategy::Disabled;
        assert_eq!(build_from_config(&config).name(), "disabled");

        config.strategy = CacheStrategy::Disk;
        assert_eq!(build_from_config(&config).name(), "disk");
    }
}
