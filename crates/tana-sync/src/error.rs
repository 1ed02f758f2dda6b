use std::sync::Arc;

use thiserror::Error;

use tana_client::ApiError;

/// Failures produced by the synchronization layer.
///
/// `Clone` so a single fetch outcome can be delivered to every caller joined
/// on the same in-flight request; the transport error is shared via `Arc`.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(Arc<ApiError>),

    /// A mutation for the same entity guard is still unresolved.
    #[error("a mutation for `{0}` is already pending")]
    MutationPending(String),

    /// Drop without a preceding pick-up.
    #[error("no active drag gesture")]
    NoActiveDrag,

    /// Pick-up while another gesture is active.
    #[error("a drag gesture is already in progress")]
    DragInProgress,

    /// The in-flight fetch this caller joined was abandoned.
    #[error("fetch interrupted")]
    FetchInterrupted,

    #[error("invalid list query: {0}")]
    InvalidQuery(String),

    #[error("failed to decode cached value: {0}")]
    Decode(String),
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        SyncError::Api(Arc::new(err))
    }
}

impl SyncError {
    /// Whether this is the globally-handled session expiry. Feature code must
    /// not surface it as a per-call notice.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SyncError::Api(e) if matches!(**e, ApiError::Unauthorized))
    }

    /// Whether re-dispatching the same operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Api(e) if e.is_retryable())
    }
}
