use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Name of the board every score lands on.
pub const GLOBAL_BOARD: &str = "GLOBAL";

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Stored user attributes. `points` caches the last known GLOBAL score and
/// `rank` is the last rank written back by a ranked lookup (0 = never ranked).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub country: String,
    pub points: f64,
    #[serde(default)]
    pub rank: u64,
}

impl Profile {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        country: impl Into<String>,
        points: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            country: country.into(),
            points,
            rank: 0,
        }
    }
}

/// User creation payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUser {
    /// Optional caller-chosen id; a UUID is generated when empty
    #[serde(default)]
    pub user_id: String,

    #[validate(length(min = 1, max = 64))]
    pub display_name: String,

    #[validate(length(min = 2, max = 3))]
    pub country: String,

    #[serde(default)]
    pub points: f64,
}

impl From<NewUser> for Profile {
    fn from(user: NewUser) -> Self {
        Profile::new(
            user.user_id,
            user.display_name,
            user.country.to_ascii_uppercase(),
            user.points,
        )
    }
}

/// One rendered leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub rank: u64,
    pub points: i64,
    pub display_name: String,
    pub country: String,
}

/// Incoming score event. The timestamp is required but never used for ordering.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScoreSubmission {
    pub score: f64,

    #[validate(length(min = 1))]
    pub user_id: String,

    #[validate(range(min = 1))]
    pub timestamp: i64,
}

/// Raw leaderboard query as it arrives from the boundary layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: i64,
}

impl LeaderboardQuery {
    /// Resolve defaults: non-positive page/page size fall back to page 1 and
    /// `default_page_size`, the page size is capped, and a missing country
    /// means the GLOBAL board.
    pub fn normalize(&self, default_page_size: i64, max_page_size: i64) -> (String, i64, i64) {
        let page = if self.page <= 0 { DEFAULT_PAGE } else { self.page };
        let page_size = if self.page_size <= 0 {
            default_page_size
        } else {
            self.page_size
        }
        .min(max_page_size);

        let board = match self.country.as_deref().map(str::trim) {
            Some(country) if !country.is_empty() => country.to_ascii_uppercase(),
            _ => GLOBAL_BOARD.to_string(),
        };

        (board, page, page_size)
    }
}

/// Lifecycle of the bulk generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Idle,
    Running,
    Done,
    Cancelled,
    Error,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Idle => "IDLE",
            TaskState::Running => "RUNNING",
            TaskState::Done => "DONE",
            TaskState::Cancelled => "CANCELLED",
            TaskState::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Cancelled | TaskState::Error)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IDLE" => Ok(TaskState::Idle),
            "RUNNING" => Ok(TaskState::Running),
            "DONE" => Ok(TaskState::Done),
            "CANCELLED" => Ok(TaskState::Cancelled),
            "ERROR" => Ok(TaskState::Error),
            other => Err(format!("unknown task state: {}", other)),
        }
    }
}

/// Snapshot of the generation task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: TaskState,
    pub completed_percent: f64,
    pub concurrency: u64,
    pub started_at: Option<String>,
    /// `u64::MAX` when the stored value is missing or unreadable
    pub remaining_users: u64,
}

impl TaskStatus {
    /// Sentinel for an unknown remaining count.
    pub const UNKNOWN_REMAINING: u64 = u64::MAX;

    pub fn idle() -> Self {
        Self {
            status: TaskState::Idle,
            completed_percent: 0.0,
            concurrency: 0,
            started_at: None,
            remaining_users: 0,
        }
    }

    /// True when the recorded start predates `instant`, or cannot be read.
    pub fn started_before(&self, instant: DateTime<Utc>) -> bool {
        match self
            .started_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        {
            Some(started) => started.with_timezone(&Utc) < instant,
            None => true,
        }
    }
}
