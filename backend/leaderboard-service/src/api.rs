// ============================================
// Boundary Facade
// ============================================
//
// The operations a thin transport layer (HTTP, gRPC, CLI) binds to. Request
// normalisation and validation happen here; everything below trusts its input.

use crate::config::{GenerationConfig, LeaderboardConfig};
use crate::error::Result;
use crate::jobs::BulkGenerationCoordinator;
use crate::models::{
    LeaderboardQuery, LeaderboardRow, NewUser, Profile, ScoreSubmission, TaskStatus,
    GLOBAL_BOARD,
};
use crate::services::{LeaderboardService, RankingStore, ScoreService, UserService};
use crate::store::Store;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

pub struct LeaderboardApi {
    ranking: Arc<RankingStore>,
    users: Arc<UserService>,
    leaderboard: LeaderboardService,
    scores: ScoreService,
    coordinator: Arc<BulkGenerationCoordinator>,
    config: LeaderboardConfig,
}

impl LeaderboardApi {
    /// Wire every service on top of one store.
    pub fn new(
        store: Arc<dyn Store>,
        config: LeaderboardConfig,
        generation: &GenerationConfig,
    ) -> Self {
        let ranking = Arc::new(RankingStore::new(
            store.clone(),
            config.leaderboard_key_prefix.clone(),
        ));
        let users = Arc::new(UserService::new(ranking.clone()));
        let coordinator = Arc::new(BulkGenerationCoordinator::new(
            store,
            users.clone(),
            &config.leaderboard_key_prefix,
            generation.generation_max_concurrency,
        ));

        Self {
            leaderboard: LeaderboardService::new(users.clone(), ranking.clone()),
            scores: ScoreService::new(users.clone(), ranking.clone()),
            ranking,
            users,
            coordinator,
            config,
        }
    }

    pub fn coordinator(&self) -> &Arc<BulkGenerationCoordinator> {
        &self.coordinator
    }

    pub async fn submit_score(&self, submission: &ScoreSubmission) -> Result<()> {
        self.scores.submit(submission).await
    }

    pub async fn get_leaderboard_page(&self, query: &LeaderboardQuery) -> Result<Vec<LeaderboardRow>> {
        let (board, page, page_size) =
            query.normalize(self.config.default_page_size, self.config.max_page_size);
        self.leaderboard.get_page(&board, page, page_size).await
    }

    pub async fn start_generation(&self, users: u64, concurrency: u64) -> Result<TaskStatus> {
        self.coordinator.start(users, concurrency).await
    }

    pub async fn stop_generation(&self) -> Result<()> {
        self.coordinator.stop().await
    }

    pub async fn query_generation_status(&self) -> Result<TaskStatus> {
        self.coordinator.status().await
    }

    /// Validate, store and return the new user ranked on GLOBAL.
    pub async fn create_user(&self, new_user: NewUser) -> Result<Profile> {
        new_user.validate()?;
        let user_id = self.users.create_profile(Profile::from(new_user)).await?;
        info!(user_id = %user_id, "User created");
        self.users.get_by_id_with_rank(&user_id, GLOBAL_BOARD).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Profile> {
        self.users.get_by_id_with_rank(user_id, GLOBAL_BOARD).await
    }

    /// Wipes the whole store, boards, profiles and task record included.
    pub async fn flush_all(&self) -> Result<()> {
        warn!(prefix = %self.ranking.key_prefix(), "Flushing every key in the store");
        self.ranking.store().flush_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::TaskState;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn api() -> LeaderboardApi {
        LeaderboardApi::new(
            Arc::new(MemoryStore::new()),
            LeaderboardConfig {
                max_page_size: 5,
                ..LeaderboardConfig::default()
            },
            &GenerationConfig::default(),
        )
    }

    fn new_user(name: &str, country: &str, points: f64) -> NewUser {
        NewUser {
            user_id: String::new(),
            display_name: name.to_string(),
            country: country.to_string(),
            points,
        }
    }

    #[tokio::test]
    async fn test_create_user_returns_ranked_profile() {
        let api = api();
        api.create_user(new_user("first", "tr", 300.0)).await.unwrap();
        let second = api.create_user(new_user("second", "us", 100.0)).await.unwrap();

        assert_eq!(second.rank, 2);
        assert_eq!(second.country, "US");
        assert_eq!(api.get_user(&second.user_id).await.unwrap().rank, 2);
    }

    #[tokio::test]
    async fn test_create_user_rejects_invalid_payload() {
        let api = api();
        assert!(matches!(
            api.create_user(new_user("", "TR", 0.0)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_page_query_defaults_and_cap() {
        let api = api();
        for i in 0..8 {
            api.create_user(new_user(&format!("p{}", i), "gb", i as f64))
                .await
                .unwrap();
        }

        let capped = api
            .get_leaderboard_page(&LeaderboardQuery {
                country: Some("gb".to_string()),
                page: 1,
                page_size: 50,
            })
            .await
            .unwrap();
        assert_eq!(capped.len(), 5);

        let defaulted = api
            .get_leaderboard_page(&LeaderboardQuery::default())
            .await
            .unwrap();
        assert_eq!(defaulted.len(), 5);
        assert_eq!(defaulted[0].display_name, "p7");
    }

    #[tokio::test]
    async fn test_submit_then_read_page() {
        let api = api();
        let user = api.create_user(new_user("neo", "NZ", 1.0)).await.unwrap();
        api.submit_score(&ScoreSubmission {
            score: 4_200.9,
            user_id: user.user_id.clone(),
            timestamp: 1_700_000_000,
        })
        .await
        .unwrap();

        let page = api
            .get_leaderboard_page(&LeaderboardQuery {
                country: Some("nz".to_string()),
                ..LeaderboardQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page[0].points, 4_200);
        assert_eq!(api.get_user(&user.user_id).await.unwrap().points, 4_200.9);
    }

    #[tokio::test]
    async fn test_generation_round_trip_and_flush() {
        let api = api();
        assert_eq!(
            api.query_generation_status().await.unwrap().status,
            TaskState::Idle
        );

        api.start_generation(6, 2).await.unwrap();
        let mut status = api.query_generation_status().await.unwrap();
        for _ in 0..500 {
            if status.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = api.query_generation_status().await.unwrap();
        }
        assert_eq!(status.status, TaskState::Done);

        api.stop_generation().await.unwrap();
        assert_eq!(
            api.query_generation_status().await.unwrap().status,
            TaskState::Cancelled
        );

        api.flush_all().await.unwrap();
        assert_eq!(
            api.query_generation_status().await.unwrap().status,
            TaskState::Idle
        );
        assert!(api
            .get_leaderboard_page(&LeaderboardQuery::default())
            .await
            .unwrap()
            .is_empty());
    }
}
