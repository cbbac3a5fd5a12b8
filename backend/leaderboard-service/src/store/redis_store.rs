use super::Store;
use crate::error::{AppError, Result};
use anyhow::Context;
use async_trait::async_trait;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Redis-backed store. Boards are sorted sets, profiles and task records are hashes.
///
/// Generic over the connection so a standalone server (`ConnectionManager`)
/// and a cluster (`ClusterConnection`) share one command set.
#[derive(Clone)]
pub struct RedisStore<C = ConnectionManager> {
    conn: C,
}

/// Store backed by a Redis cluster (`REDIS_CLUSTER=true`).
pub type RedisClusterStore = RedisStore<ClusterConnection>;

impl<C> RedisStore<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }
}

impl RedisStore<ConnectionManager> {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client =
            redis::Client::open(redis_url).context("failed to parse REDIS_URL connection string")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!("Redis connection manager initialized");
        Ok(Self::new(conn))
    }
}

impl RedisStore<ClusterConnection> {
    /// `redis_urls` is a comma-separated list of seed nodes.
    pub async fn connect_cluster(redis_urls: &str) -> anyhow::Result<Self> {
        let nodes = seed_nodes(redis_urls);
        if nodes.is_empty() {
            anyhow::bail!("REDIS_URL lists no cluster seed nodes");
        }

        let client = ClusterClient::new(nodes.iter().map(String::as_str))
            .context("failed to parse Redis cluster seed nodes")?;
        let conn = client
            .get_async_connection()
            .await
            .context("failed to connect to Redis cluster")?;

        info!(seed_nodes = nodes.len(), "Redis cluster connection initialized");
        Ok(Self::new(conn))
    }
}

fn seed_nodes(redis_urls: &str) -> Vec<String> {
    redis_urls
        .split(',')
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(str::to_string)
        .collect()
}

fn unavailable(op: &str, key: &str, err: redis::RedisError) -> AppError {
    warn!(op = op, key = %key, error = %err, "Redis command failed");
    AppError::from(err)
}

#[async_trait]
impl<C> Store for RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn upsert_score(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(key, member, score)
            .await
            .map_err(|e| unavailable("ZADD", key, e))?;

        debug!(key = %key, member = %member, score = score, "Score upserted");
        Ok(())
    }

    async fn insert_score_if_absent(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        let added: u64 = redis::cmd("ZADD")
            .arg(key)
            .arg("NX")
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("ZADD NX", key, e))?;

        if added > 0 {
            debug!(key = %key, member = %member, score = score, "Member enrolled");
        }
        Ok(())
    }

    async fn rev_rank(&self, key: &str, member: &str) -> Result<Option<u64>> {
        let mut conn = self.conn.clone();
        conn.zrevrank(key, member)
            .await
            .map_err(|e| unavailable("ZREVRANK", key, e))
    }

    async fn score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let mut conn = self.conn.clone();
        conn.zscore(key, member)
            .await
            .map_err(|e| unavailable("ZSCORE", key, e))
    }

    async fn rev_range_with_scores(
        &self,
        key: &str,
        start: u64,
        stop: u64,
    ) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();
        conn.zrevrange_withscores(key, start as isize, stop as isize)
            .await
            .map_err(|e| unavailable("ZREVRANGE", key, e))
    }

    async fn cardinality(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.zcard(key)
            .await
            .map_err(|e| unavailable("ZCARD", key, e))
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let _: () = conn
            .hset_multiple(key, fields)
            .await
            .map_err(|e| unavailable("HSET", key, e))?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        conn.hgetall(key)
            .await
            .map_err(|e| unavailable("HGETALL", key, e))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key)
            .await
            .map_err(|e| unavailable("EXISTS", key, e))
    }

    async fn flush_all(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHALL")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| unavailable("FLUSHALL", "*", e))?;

        info!("Redis flushed");
        Ok(())
    }
}
