pub mod leaderboard;
pub mod ranking_store;
pub mod score;
pub mod user;

pub use leaderboard::LeaderboardService;
pub use ranking_store::RankingStore;
pub use score::ScoreService;
pub use user::{ProfileCreator, UserService};
