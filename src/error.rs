//! Top-level error types for Lyrebird.

use crate::ChannelId;
use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Chat-platform transport errors, as classified for the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The platform rejected the request with an HTTP status.
    #[error("platform returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The requested entity does not exist (or is not visible to the bot).
    #[error("not found: {0}")]
    NotFound(String),

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Anything else the platform client reported.
    #[error("platform API error: {0}")]
    Api(String),
}

impl HostError {
    /// Whether retrying the same call can plausibly succeed. Rate limiting
    /// is paced inside the platform client, so this covers server errors
    /// and dropped connections.
    pub fn is_transient(&self) -> bool {
        match self {
            HostError::Status { status, .. } => *status >= 500 || *status == 429,
            HostError::Transport(_) => true,
            HostError::NotFound(_) | HostError::Api(_) => false,
        }
    }
}

/// Replication job errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A history page could not be retrieved. Fatal to the job: a failed
    /// fetch must never replay a truncated history.
    #[error("failed to fetch history: {0}")]
    Fetch(#[source] HostError),

    /// The destination already has a copy running into it.
    #[error("already copying into {dest} from {source}")]
    AlreadyActive { dest: ChannelId, r#source: ChannelId },

    /// The requested source is currently the destination of another copy.
    #[error("channel {0} is still being written by another copy")]
    SourceBusy(ChannelId),
}
