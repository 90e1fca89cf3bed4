use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Sweep scheduler already running")]
    AlreadyRunning,
}

impl Error {
    /// Transient errors are retried implicitly by the next sweep tick.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Redis(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
