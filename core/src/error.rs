use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid transaction {id}: {reason}")]
    InvalidTransaction { id: i64, reason: String },

    #[error("Invalid alert rule {rule_id}: {reason}")]
    InvalidRule { rule_id: i64, reason: String },

    #[error("Invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
