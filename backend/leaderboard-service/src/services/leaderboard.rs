use super::ranking_store::RankingStore;
use super::user::UserService;
use crate::error::{AppError, Result};
use crate::models::LeaderboardRow;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Renders ranked pages of a board.
pub struct LeaderboardService {
    users: Arc<UserService>,
    ranking: Arc<RankingStore>,
}

impl LeaderboardService {
    pub fn new(users: Arc<UserService>, ranking: Arc<RankingStore>) -> Self {
        Self { users, ranking }
    }

    /// Page `page` (1-based) of `board`, `page_size` rows at most.
    ///
    /// Each row's rank comes from a fresh rank lookup rather than its window
    /// position, so a score written concurrently with the page read can make
    /// a displayed rank disagree with the displayed order.
    pub async fn get_page(
        &self,
        board: &str,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<LeaderboardRow>> {
        if page < 1 || page_size < 1 {
            return Err(AppError::Validation(format!(
                "page and page_size must be positive (page={}, page_size={})",
                page, page_size
            )));
        }

        let start = (page - 1).saturating_mul(page_size) as u64;
        let end = page.saturating_mul(page_size).saturating_sub(1) as u64;
        let window = self.ranking.get_page(board, start, end).await?;

        let user_ids: Vec<String> = window.iter().map(|(member, _)| member.clone()).collect();
        let scores: HashMap<&str, f64> = window
            .iter()
            .map(|(member, score)| (member.as_str(), *score))
            .collect();

        let profiles = self.users.get_all_by_id(&user_ids).await?;
        let ranks = try_join_all(
            profiles
                .iter()
                .map(|profile| self.ranking.get_rank(board, &profile.user_id)),
        )
        .await?;

        let rows: Vec<LeaderboardRow> = profiles
            .into_iter()
            .zip(ranks)
            .map(|(profile, rank)| LeaderboardRow {
                rank,
                points: scores
                    .get(profile.user_id.as_str())
                    .copied()
                    .unwrap_or_default() as i64,
                display_name: profile.display_name,
                country: profile.country,
            })
            .collect();

        debug!(
            board = %board,
            page = page,
            page_size = page_size,
            rows = rows.len(),
            "Leaderboard page rendered"
        );
        Ok(rows)
    }
}
