// Error kinds shared by the background, page and popup contexts

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Operation attempted without the state it depends on
    /// (no detection yet, not authenticated, missing identity fields).
    #[error("{0}")]
    Precondition(String),

    /// Non-success response from the monitoring service.
    #[error("{0}")]
    Remote(String),

    /// The request to the monitoring service never completed.
    #[error("Network error: {0}")]
    Transport(String),

    /// Persistent storage read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal inconsistency. Indicates a defect, not a user mistake.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Error::Remote(msg.into())
    }

    /// Message placed in `{ok: false, error}` replies.
    ///
    /// Transport failures are reported the same way as remote rejections;
    /// the user only ever sees one sentence.
    pub fn user_message(&self) -> String {
        match self {
            Error::Precondition(msg) | Error::Remote(msg) | Error::Transport(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
