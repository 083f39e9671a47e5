use thiserror::Error;

/// Errors surfaced by platform operations.
///
/// `NotFound` is a resolution, not a failure: the principal is gone and
/// the caller closes the record. `Transient` covers network, rate-limit
/// and permission hiccups; callers defer and retry on the next poll.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("principal not found")]
    NotFound,

    #[error("transient platform error: {0}")]
    Transient(String),

    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Whether this error means the principal no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound)
    }
}
