pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;

pub use api::LeaderboardApi;
pub use config::Config;
pub use error::{AppError, Result};
pub use jobs::BulkGenerationCoordinator;
pub use services::{LeaderboardService, ProfileCreator, RankingStore, ScoreService, UserService};
pub use store::{MemoryStore, RedisClusterStore, RedisStore, Store};
