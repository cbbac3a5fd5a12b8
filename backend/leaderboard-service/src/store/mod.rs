// ============================================
// Store Module
// ============================================
//
// Black-box ordered-set + hash primitives the ranking core is built on.
//
// Ordering contract shared by every backend:
// - Members rank by descending score
// - Equal scores rank by descending member id (lexicographic), which is
//   what Redis ZREVRANK / ZREVRANGE do natively
//
// Backends:
// - RedisStore: production, one multiplexed ConnectionManager
// - RedisClusterStore: same commands over a cluster connection (REDIS_CLUSTER=true)
// - MemoryStore: in-process, for tests and STORE_BACKEND=memory runs

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::{RedisClusterStore, RedisStore};

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait Store: Send + Sync {
    /// Set `member`'s score in `key`, replacing any previous score
    async fn upsert_score(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Add `member` only when it is not on `key` yet (ZADD NX)
    async fn insert_score_if_absent(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Zero-based position by descending score, `None` when absent
    async fn rev_rank(&self, key: &str, member: &str) -> Result<Option<u64>>;

    async fn score(&self, key: &str, member: &str) -> Result<Option<f64>>;

    /// Inclusive zero-based window over the descending ordering
    async fn rev_range_with_scores(
        &self,
        key: &str,
        start: u64,
        stop: u64,
    ) -> Result<Vec<(String, f64)>>;

    async fn cardinality(&self, key: &str) -> Result<u64>;

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<()>;

    /// Empty map when the hash does not exist
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn flush_all(&self) -> Result<()>;
}
