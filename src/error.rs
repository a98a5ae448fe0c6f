//! Crate-wide error types.
//!
//! Components classify failures by *kind* (input, not-found, conflict,
//! upstream, integrity, cancelled, internal) so a single taxonomy enum
//! carries them end to end. Adapters map library errors in via `#[from]`;
//! the orchestration layer decides what is fatal and what merely degrades
//! a collector.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Upstream API returned a non-success status with a body.
    #[error("upstream API error: status {status}: {body}")]
    Api { status: u16, body: String },

    /// Transient upstream failure (timeout, 5xx, connection reset).
    #[error("upstream transient error: {0}")]
    Upstream(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("execution error: {0}")]
    Execution(String),

    /// Root-context cancellation; logged at info, never alarmed.
    #[error("cancelled")]
    Cancelled,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures worth retrying with backoff (producers only).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Upstream(_) | Self::Connection(_) | Self::WebSocket(_) | Self::Io(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// True when the root context was cancelled; callers log at info and exit.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
