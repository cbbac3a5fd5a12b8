// ============================================
// Ranking Store
// ============================================
//
// Semantic layer over the raw store:
// - Boards live under {prefix}{board}, profiles under {prefix}PROFILE:{id}
// - Rank and score reads are total: an unknown member is enrolled at 0
//   (a side-effecting read) and the lookup is retried once
// - Profile reads are partial: a missing record is ProfileNotFound
//
// Nothing here retries a failed store call.

use crate::error::{AppError, Result};
use crate::models::{Profile, GLOBAL_BOARD};
use crate::store::Store;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const FIELD_DISPLAY_NAME: &str = "display_name";
const FIELD_COUNTRY: &str = "country";
const FIELD_POINTS: &str = "points";
const FIELD_RANK: &str = "rank";

/// Score every lazily enrolled member starts with
pub const DEFAULT_SCORE: f64 = 0.0;

pub struct RankingStore {
    store: Arc<dyn Store>,
    key_prefix: String,
    board_keys: DashMap<String, String>,
}

impl RankingStore {
    pub fn new(store: Arc<dyn Store>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            board_keys: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn board_key(&self, board: &str) -> String {
        if let Some(key) = self.board_keys.get(board) {
            return key.clone();
        }

        let key = format!("{}{}", self.key_prefix, board);
        self.board_keys.insert(board.to_string(), key.clone());
        key
    }

    fn profile_key(&self, user_id: &str) -> String {
        format!("{}PROFILE:{}", self.key_prefix, user_id)
    }

    /// Overwrites the member's score; never accumulates.
    pub async fn add_score(&self, board: &str, member: &str, score: f64) -> Result<()> {
        self.store
            .upsert_score(&self.board_key(board), member, score)
            .await
    }

    /// Side-effecting read: returns the member's score, first enrolling it at
    /// [`DEFAULT_SCORE`] when it is not on the board. An existing score is
    /// never overwritten by the enrollment.
    pub async fn get_or_insert_default(&self, board: &str, member: &str) -> Result<f64> {
        let key = self.board_key(board);
        if let Some(score) = self.store.score(&key, member).await? {
            return Ok(score);
        }

        debug!(board = %board, member = %member, "Enrolling member at default score");
        self.store
            .insert_score_if_absent(&key, member, DEFAULT_SCORE)
            .await?;

        self.store
            .score(&key, member)
            .await?
            .ok_or_else(|| missing_after_enrollment(board, member))
    }

    /// 1-based rank by descending score. Enrolls unknown members.
    pub async fn get_rank(&self, board: &str, member: &str) -> Result<u64> {
        let key = self.board_key(board);
        if let Some(rank) = self.store.rev_rank(&key, member).await? {
            return Ok(rank + 1);
        }

        self.get_or_insert_default(board, member).await?;

        self.store
            .rev_rank(&key, member)
            .await?
            .map(|rank| rank + 1)
            .ok_or_else(|| missing_after_enrollment(board, member))
    }

    /// Enrolls unknown members.
    pub async fn get_score(&self, board: &str, member: &str) -> Result<f64> {
        self.get_or_insert_default(board, member).await
    }

    /// Inclusive zero-based window over the descending ordering. Shorter than
    /// requested near the end of the board.
    pub async fn get_page(
        &self,
        board: &str,
        start_index: u64,
        end_index: u64,
    ) -> Result<Vec<(String, f64)>> {
        self.store
            .rev_range_with_scores(&self.board_key(board), start_index, end_index)
            .await
    }

    pub async fn board_size(&self, board: &str) -> Result<u64> {
        let key = self.board_key(board);
        if !self.store.exists(&key).await? {
            return Err(AppError::BoardNotFound(board.to_string()));
        }
        self.store.cardinality(&key).await
    }

    pub async fn set_profile(&self, profile: &Profile) -> Result<()> {
        let fields = [
            (FIELD_DISPLAY_NAME, profile.display_name.clone()),
            (FIELD_COUNTRY, profile.country.clone()),
            (FIELD_POINTS, profile.points.to_string()),
            (FIELD_RANK, profile.rank.to_string()),
        ];
        self.store
            .hash_set(&self.profile_key(&profile.user_id), &fields)
            .await
    }

    /// Partial lookup: no enrollment happens here. `points` reflects the live
    /// GLOBAL score when the user is on that board.
    pub async fn get_profile(&self, user_id: &str) -> Result<Profile> {
        let record = self.store.hash_get_all(&self.profile_key(user_id)).await?;
        let mut profile = parse_profile(user_id, &record)
            .ok_or_else(|| AppError::ProfileNotFound(user_id.to_string()))?;

        if let Some(score) = self
            .store
            .score(&self.board_key(GLOBAL_BOARD), user_id)
            .await?
        {
            profile.points = score;
        }

        Ok(profile)
    }
}

fn missing_after_enrollment(board: &str, member: &str) -> AppError {
    AppError::Internal(format!(
        "member {} missing from {} after enrollment",
        member, board
    ))
}

fn parse_profile(user_id: &str, record: &HashMap<String, String>) -> Option<Profile> {
    let display_name = record.get(FIELD_DISPLAY_NAME).filter(|v| !v.is_empty())?;

    let points = match record.get(FIELD_POINTS).map(|v| v.parse::<f64>()) {
        Some(Ok(points)) => points,
        Some(Err(e)) => {
            warn!(user_id = %user_id, error = %e, "Unreadable stored points, using 0");
            0.0
        }
        None => 0.0,
    };

    Some(Profile {
        user_id: user_id.to_string(),
        display_name: display_name.clone(),
        country: record.get(FIELD_COUNTRY).cloned().unwrap_or_default(),
        points,
        rank: record
            .get(FIELD_RANK)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
    })
}
