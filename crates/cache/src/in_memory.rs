//! In-memory cache: lives as long as the process.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uiscout_core::cache::{CacheKey, CachedDecision, DecisionCache};

/// Decisions kept in a shared map. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<CacheKey, CachedDecision>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DecisionCache for InMemoryCache {
    fn name(&self) -> &str { "in_memory" }

    async fn get(&self, key: &CacheKey) -> Option<CachedDecision> {
        self.entries.read().await.get(key).cloned()
    }

    async fn put(&self, key: &CacheKey, decision: CachedDecision) {
        self.entries.write().await.insert(key.clone(), decision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uiscout_core::action::Action;
    use uiscout_core::step::Step;

    fn decision(text: &str) -> CachedDecision {
        let action = Action::ClickWithText { text: text.into() };
        CachedDecision {
            step: Step::with_action(action.clone()),
            action,
        }
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = InMemoryCache::new();
        let key = CacheKey::new("tree", "prompt");
        assert!(cache.get(&key).await.is_none());

        cache.put(&key, decision("Login")).await;
        let hit = cache.get(&key).await.unwrap();
        assert_eq!(hit.action, Action::ClickWithText { text: "Login".into() });
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn later_put_replaces_entry() {
        let cache = InMemoryCache::new();
        let key = CacheKey::new("tree", "prompt");
        cache.put(&key, decision("A")).await;
        cache.put(&key, decision("B")).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(
            cache.get(&key).await.unwrap().action,
            Action::ClickWithText { text: "B".into() }
        );
    }

    #[tokio::test]
    async fn concurrent_writers_all_land() {
        let cache = InMemoryCache::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = CacheKey::new(&format!("tree-{i}"), "prompt");
                cache.put(&key, decision(&i.to_string())).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len().await, 16);
    }
}
