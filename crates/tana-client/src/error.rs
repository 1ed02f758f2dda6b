use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Client-side rejection before any request is dispatched.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Non-2xx response with a decoded error envelope.
    #[error("api error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// 401 response. Handled globally at the transport boundary; the session
    /// is already cleared by the time this surfaces.
    #[error("session expired")]
    Unauthorized,

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether retrying the same call can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
