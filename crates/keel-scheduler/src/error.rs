//! Scheduler error types.

use keel_offer::OfferError;
use thiserror::Error;

/// Errors that can occur while building offer requirements.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The requirement cannot be built; the current cycle must be skipped.
    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("state store error: {0}")]
    State(#[from] keel_state::StateError),
}

impl From<OfferError> for SchedulerError {
    fn from(err: OfferError) -> Self {
        match err {
            OfferError::InvalidRequirement(msg) => SchedulerError::InvalidRequirement(msg),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
