//! Disabled cache: every lookup misses, nothing is stored.

use async_trait::async_trait;
use uiscout_core::cache::{CacheKey, CachedDecision, DecisionCache};

/// A cache that stores nothing.
pub struct DisabledCache;

#[async_trait]
impl DecisionCache for DisabledCache {
    fn name(&self) -> &str { "disabled" }

    async fn get(&self, _key: &CacheKey) -> Option<CachedDecision> {
        None
    }

    async fn put(&self, _key: &CacheKey, _decision: CachedDecision) {}
}
