use super::ranking_store::RankingStore;
use crate::error::{AppError, Result};
use crate::models::{Profile, GLOBAL_BOARD};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Creates profiles on behalf of the bulk generator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileCreator: Send + Sync {
    async fn create(&self, profile: Profile) -> Result<String>;
}

/// Profile collaborator: creation and lookup of users.
pub struct UserService {
    ranking: Arc<RankingStore>,
}

impl UserService {
    pub fn new(ranking: Arc<RankingStore>) -> Self {
        Self { ranking }
    }

    /// Store the profile and place its points on GLOBAL and its country board.
    /// An empty `user_id` gets a fresh UUID.
    pub async fn create_profile(&self, mut profile: Profile) -> Result<String> {
        if profile.user_id.is_empty() {
            profile.user_id = Uuid::new_v4().to_string();
        }

        self.ranking.set_profile(&profile).await?;
        self.ranking
            .add_score(GLOBAL_BOARD, &profile.user_id, profile.points)
            .await?;
        self.ranking
            .add_score(&profile.country, &profile.user_id, profile.points)
            .await?;

        debug!(
            user_id = %profile.user_id,
            country = %profile.country,
            points = profile.points,
            "Profile created"
        );
        Ok(profile.user_id)
    }

    pub async fn get_by_id(&self, user_id: &str) -> Result<Profile> {
        self.ranking.get_profile(user_id).await.map_err(|e| match e {
            AppError::ProfileNotFound(id) => AppError::UserNotFound(id),
            other => other,
        })
    }

    pub async fn get_by_id_with_rank(&self, user_id: &str, board: &str) -> Result<Profile> {
        let mut profile = self.get_by_id(user_id).await?;
        self.set_rank(&mut profile, board).await?;
        Ok(profile)
    }

    /// Recompute the rank on `board` and write it back to the stored profile.
    pub async fn set_rank(&self, profile: &mut Profile, board: &str) -> Result<()> {
        profile.rank = self.ranking.get_rank(board, &profile.user_id).await?;
        self.ranking.set_profile(profile).await?;

        debug!(
            user_id = %profile.user_id,
            board = %board,
            rank = profile.rank,
            "Rank recomputed"
        );
        Ok(())
    }

    /// Order-preserving bulk lookup; the first failure aborts the whole batch.
    pub async fn get_all_by_id(&self, user_ids: &[String]) -> Result<Vec<Profile>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        try_join_all(user_ids.iter().map(|id| self.get_by_id(id))).await
    }
}

#[async_trait]
impl ProfileCreator for UserService {
    async fn create(&self, profile: Profile) -> Result<String> {
        self.create_profile(profile).await
    }
}
