use std::time::Duration;

/// Result alias used across the core crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure categories of the weather digest core.
///
/// Pipelines react to the category, not the message: collection aborts the
/// whole tick on any error, dispatch drops only the city or user at hand.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Network failure talking to the provider, a store or the queue.
    #[error("{context}: transport error: {message}")]
    Transport { context: String, message: String },

    /// The remote side answered with a non-success status.
    #[error("{context} failed with status {status}: {body}")]
    Upstream {
        context: String,
        status: u16,
        body: String,
    },

    /// The response could not be decoded or is missing data.
    #[error("{context}: malformed response: {message}")]
    Data { context: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    /// Duplicate registration. Callers treat it as an idempotent no-op.
    #[error("already exists: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn transport(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Transport {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn data(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Data {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn upstream(context: impl Into<String>, status: u16, body: &str) -> Self {
        Error::Upstream {
            context: context.into(),
            status,
            body: truncate_body(body),
        }
    }

    pub fn timeout(context: impl Into<String>, after: Duration) -> Self {
        Error::Transport {
            context: context.into(),
            message: format!("timed out after {}ms", after.as_millis()),
        }
    }

    /// Wraps a reqwest failure, dropping the request URL so query-string
    /// credentials never end up in messages or logs.
    pub fn from_reqwest(context: impl Into<String>, err: reqwest::Error) -> Self {
        let context = context.into();
        let err = err.without_url();
        if err.is_decode() {
            Error::data(context, err)
        } else {
            Error::transport(context, err)
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<lapin::Error> for Error {
    fn from(err: lapin::Error) -> Self {
        Error::transport("amqp", err)
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        let cut: String = body.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        body.to_string()
    }
}
