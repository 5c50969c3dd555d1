//! DecisionCache trait and cache keys.
//!
//! The cache maps "what the screen looked like + what we asked" to the
//! action the oracle chose, so a re-run over an unchanged UI skips the
//! oracle entirely. Strategies live in the `uiscout-cache` crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use crate::action::Action;
use crate::step::Step;

/// Bump to invalidate every previously stored decision.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Deterministic key derived from the UI tree and the prompt context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// `v{schema}-uitree-{sha256(ui_tree)}-context-{sha256(context)}`, hex encoded.
    pub fn new(ui_tree: &str, context: &str) -> Self {
        Self::with_version(CACHE_SCHEMA_VERSION, ui_tree, context)
    }

    pub fn with_version(version: u32, ui_tree: &str, context: &str) -> Self {
        Self(format!(
            "v{version}-uitree-{}-context-{}",
            sha256_hex(ui_tree),
            sha256_hex(context)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// A stored decision: the validated action plus the step it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDecision {
    pub action: Action,
    pub step: Step,
}

/// The core DecisionCache trait.
///
/// Implementations must tolerate concurrent `get`/`put` from several
/// executors. Storage problems are never fatal: a failing read is a miss
/// and a failing write is logged and dropped.
#[async_trait]
pub trait DecisionCache: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &CacheKey) -> Option<CachedDecision>;

    async fn put(&self, key: &CacheKey, decision: CachedDecision);
}
