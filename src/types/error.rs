use thiserror::Error;

/// novapg error types
#[derive(Error, Debug)]
pub enum NovaError {
    /// Connection failure or timeout talking to the remote API
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials rejected or token no longer accepted
    #[error("auth error: {0}")]
    Auth(String),

    /// Remote API answered with an unexpected status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Payload did not have the expected JSON shape
    #[error("data shape error: {0}")]
    DataShape(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for NovaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NovaError::Transport(format!("request timed out: {}", err))
        } else {
            NovaError::Transport(err.to_string())
        }
    }
}

/// Result type alias for novapg
pub type Result<T> = std::result::Result<T, NovaError>;
