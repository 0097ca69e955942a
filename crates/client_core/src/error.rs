use shared::error::ApiException;
use thiserror::Error;

/// Failures surfaced to the presentation layer from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("post text must not be empty")]
    EmptyPost,
    #[error(transparent)]
    Auth(#[from] ApiException),
    #[error("store write failed: {0}")]
    Store(String),
    #[error("post subscription failed: {0}")]
    Subscribe(String),
}
