use super::Store;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Keyspace {
    boards: HashMap<String, HashMap<String, f64>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// In-process store mirroring the Redis semantics the ranking core relies on.
///
/// Rankings are computed by sorting on demand, so it is meant for tests and
/// small local runs rather than large boards.
#[derive(Default)]
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `StoreUnavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(AppError::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn rank_order(a: &(String, f64), b: &(String, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0))
}

fn ordered(board: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut members: Vec<(String, f64)> = board
        .iter()
        .map(|(member, score)| (member.clone(), *score))
        .collect();
    members.sort_by(rank_order);
    members
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_score(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.check()?;
        let mut keyspace = self.keyspace.write().await;
        keyspace
            .boards
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn insert_score_if_absent(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.check()?;
        let mut keyspace = self.keyspace.write().await;
        keyspace
            .boards
            .entry(key.to_string())
            .or_default()
            .entry(member.to_string())
            .or_insert(score);
        Ok(())
    }

    async fn rev_rank(&self, key: &str, member: &str) -> Result<Option<u64>> {
        self.check()?;
        let keyspace = self.keyspace.read().await;
        let Some(board) = keyspace.boards.get(key) else {
            return Ok(None);
        };
        let Some(score) = board.get(member) else {
            return Ok(None);
        };

        let ahead = board
            .iter()
            .filter(|(m, s)| match s.total_cmp(score) {
                Ordering::Greater => true,
                Ordering::Equal => m.as_str() > member,
                Ordering::Less => false,
            })
            .count();
        Ok(Some(ahead as u64))
    }

    async fn score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.check()?;
        let keyspace = self.keyspace.read().await;
        Ok(keyspace
            .boards
            .get(key)
            .and_then(|board| board.get(member).copied()))
    }

    async fn rev_range_with_scores(
        &self,
        key: &str,
        start: u64,
        stop: u64,
    ) -> Result<Vec<(String, f64)>> {
        self.check()?;
        if start > stop {
            return Ok(Vec::new());
        }

        let keyspace = self.keyspace.read().await;
        let Some(board) = keyspace.boards.get(key) else {
            return Ok(Vec::new());
        };

        Ok(ordered(board)
            .into_iter()
            .skip(start as usize)
            .take((stop - start).saturating_add(1) as usize)
            .collect())
    }

    async fn cardinality(&self, key: &str) -> Result<u64> {
        self.check()?;
        let keyspace = self.keyspace.read().await;
        Ok(keyspace.boards.get(key).map_or(0, |b| b.len() as u64))
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        self.check()?;
        if fields.is_empty() {
            return Ok(());
        }

        let mut keyspace = self.keyspace.write().await;
        let hash = keyspace.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone());
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.check()?;
        let keyspace = self.keyspace.read().await;
        Ok(keyspace.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check()?;
        let keyspace = self.keyspace.read().await;
        Ok(keyspace.boards.contains_key(key) || keyspace.hashes.contains_key(key))
    }

    async fn flush_all(&self) -> Result<()> {
        self.check()?;
        let mut keyspace = self.keyspace.write().await;
        keyspace.boards.clear();
        keyspace.hashes.clear();
        Ok(())
    }
}
