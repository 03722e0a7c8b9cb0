use thiserror::Error;

/// Surfaced verbatim when a handle is owned, staged or held by someone else.
pub const USERNAME_TAKEN_ERROR: &str = "Username is already taken";

/// Surfaced when the claim engine runs out of candidates.
pub const AUTOCLAIM_FAILURE_MESSAGE: &str =
    "Could not find an available username. Please choose one manually.";

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("token lookup collision")]
    TokenLookupCollision,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{USERNAME_TAKEN_ERROR}")]
    UsernameTaken,

    #[error("{AUTOCLAIM_FAILURE_MESSAGE}")]
    AutoclaimFailed,

    #[error("identity provider error: {0}")]
    Provider(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for the two errors an autoclaim reports as a `conflict` outcome.
    #[must_use]
    pub fn is_claim_conflict(&self) -> bool {
        matches!(self, Self::UsernameTaken | Self::AutoclaimFailed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
