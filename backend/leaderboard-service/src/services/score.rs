use super::ranking_store::RankingStore;
use super::user::UserService;
use crate::error::{AppError, Result};
use crate::models::{ScoreSubmission, GLOBAL_BOARD};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

/// Fans a score event out to GLOBAL and the submitter's country board.
///
/// The two writes are independent; a failure between them leaves the boards
/// disagreeing until the next submission. The latest submission always wins,
/// whatever its timestamp.
pub struct ScoreService {
    users: Arc<UserService>,
    ranking: Arc<RankingStore>,
}

impl ScoreService {
    pub fn new(users: Arc<UserService>, ranking: Arc<RankingStore>) -> Self {
        Self { users, ranking }
    }

    pub async fn submit(&self, submission: &ScoreSubmission) -> Result<()> {
        submission.validate()?;
        if submission.score == 0.0 || !submission.score.is_finite() {
            return Err(AppError::Validation(format!(
                "score must be a finite non-zero number, got {}",
                submission.score
            )));
        }

        let profile = self.users.get_by_id(&submission.user_id).await?;

        self.ranking
            .add_score(GLOBAL_BOARD, &submission.user_id, submission.score)
            .await?;
        self.ranking
            .add_score(&profile.country, &submission.user_id, submission.score)
            .await?;

        info!(
            user_id = %submission.user_id,
            country = %profile.country,
            score = submission.score,
            timestamp = submission.timestamp,
            "Score submitted"
        );
        Ok(())
    }
}
