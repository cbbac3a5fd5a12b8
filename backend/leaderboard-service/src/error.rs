use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP-equivalent status for the boundary layer.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::UserNotFound(_) | AppError::ProfileNotFound(_) | AppError::BoardNotFound(_) => {
                404
            }
            AppError::StoreUnavailable(_) => 503,
            AppError::Internal(_) => 500,
        }
    }

    /// Store outages are transient; everything else is a caller or logic error.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::StoreUnavailable(_))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status_code(), 400);
        assert_eq!(AppError::UserNotFound("u".into()).status_code(), 404);
        assert_eq!(AppError::ProfileNotFound("u".into()).status_code(), 404);
        assert_eq!(AppError::StoreUnavailable("down".into()).status_code(), 503);
        assert_eq!(AppError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_validation_errors_convert() {
        use validator::Validate;

        let bad = crate::models::ScoreSubmission {
            score: 1.0,
            user_id: String::new(),
            timestamp: 0,
        };
        let err = AppError::from(bad.validate().unwrap_err());
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_only_store_errors_are_transient() {
        assert!(AppError::StoreUnavailable("down".into()).is_transient());
        assert!(!AppError::UserNotFound("u".into()).is_transient());
    }
}
