//! Errors produced while talking to the chat backend.

/// Failure of a single backend call. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (unreachable host, reset, timeout).
    #[error("{0}")]
    Transport(String),

    /// The server answered with a non-success status code.
    #[error("HTTP {0}")]
    Status(u16),

    /// The response body was not the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// Local file handling failed (speech cache).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Transport-class failures surface as a connection error to the user.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Decode(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
