//! Disk cache: one JSON file per key.
//!
//! Layout: `<root>/v<schema>/<key>.json`. Bumping the schema version moves
//! lookups to a fresh directory, so stale entries are simply never read.
//!
//! Writes go to a temporary file in the same directory and are renamed into
//! place, so a reader never sees a half-written entry. Unreadable or corrupt
//! entries count as misses.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uiscout_core::cache::{CACHE_SCHEMA_VERSION, CacheKey, CachedDecision, DecisionCache};
use uiscout_core::error::CacheError;
use uuid::Uuid;

pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// A cache rooted at `root`; the schema directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let dir = root.into().join(format!("v{CACHE_SCHEMA_VERSION}"));
        debug!(dir = %dir.display(), "Disk decision cache opened");
        Self { dir }
    }

    /// The schema-versioned directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    async fn read_entry(&self, key: &CacheKey) -> Result<Option<CachedDecision>, CacheError> {
        let path = self.entry_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CacheError::Corrupted {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn write_entry(&self, key: &CacheKey, decision: &CachedDecision) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            CacheError::Storage(format!("Failed to create cache directory: {e}"))
        })?;

        let json = serde_json::to_vec_pretty(decision)
            .map_err(|e| CacheError::Storage(format!("Failed to serialize cache entry: {e}")))?;

        let tmp = self.dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            return Err(CacheError::Storage(format!("Failed to write cache entry: {e}")));
        }
        if let Err(e) = tokio::fs::rename(&tmp, self.entry_path(key)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::Storage(format!("Failed to move cache entry into place: {e}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DecisionCache for DiskCache {
    fn name(&self) -> &str { "disk" }

    async fn get(&self, key: &CacheKey) -> Option<CachedDecision> {
        match self.read_entry(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    async fn put(&self, key: &CacheKey, decision: CachedDecision) {
        if let Err(e) = self.write_entry(key, &decision).await {
            warn!(cache_key = %key, error = %e, "Failed to persist cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uiscout_core::action::Action;
    use uiscout_core::step::Step;

    fn decision() -> CachedDecision {
        let action = Action::InputText { text: "hello".into() };
        CachedDecision {
            step: Step::with_action(action.clone()).memo(Some("type greeting".into())),
            action,
        }
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let root = tempfile::tempdir().unwrap();
        let key = CacheKey::new("tree", "prompt");

        let cache = DiskCache::new(root.path());
        assert!(cache.get(&key).await.is_none());
        cache.put(&key, decision()).await;

        let reopened = DiskCache::new(root.path());
        let hit = reopened.get(&key).await.unwrap();
        assert_eq!(hit.action, Action::InputText { text: "hello".into() });
        assert_eq!(hit.step.memo.as_deref(), Some("type greeting"));
    }

    #[tokio::test]
    async fn entries_live_under_schema_directory() {
        let root = tempfile::tempdir().unwrap();
        let key = CacheKey::new("tree", "prompt");
        let cache = DiskCache::new(root.path());
        cache.put(&key, decision()).await;

        let expected = root
            .path()
            .join(format!("v{CACHE_SCHEMA_VERSION}"))
            .join(format!("{key}.json"));
        assert!(expected.exists());

        // no temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(cache.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let root = tempfile::tempdir().unwrap();
        let key = CacheKey::new("tree", "prompt");
        let cache = DiskCache::new(root.path());
        std::fs::create_dir_all(cache.dir()).unwrap();
        std::fs::write(cache.dir().join(format!("{key}.json")), "{not json").unwrap();

        assert!(cache.get(&key).await.is_none());

        // a fresh put overwrites the corrupt file
        cache.put(&key, decision()).await;
        assert!(cache.get(&key).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_and_gets_stay_consistent() {
        let root = tempfile::tempdir().unwrap();
        let cache = Arc::new(DiskCache::new(root.path()));
        let shared = CacheKey::new("tree", "shared");

        let mut handles = Vec::new();
        for i in 0..32 {
            let cache = cache.clone();
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                let own = CacheKey::new(&format!("tree-{i}"), "prompt");
                cache.put(&shared, decision()).await;
                cache.put(&own, decision()).await;
                // concurrent writers may race on the shared key, but a read
                // is always either a whole entry or a miss
                if let Some(hit) = cache.get(&shared).await {
                    assert_eq!(hit.action, Action::InputText { text: "hello".into() });
                }
                assert!(cache.get(&own).await.is_some());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(cache.get(&shared).await.is_some());
        let names: Vec<String> = std::fs::read_dir(cache.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
        assert_eq!(names.len(), 33);
    }
}
