//! Offer requirement error types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum OfferError {
    /// The requirement cannot be evaluated at all; the cycle must be skipped.
    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),
}

pub type OfferResult<T> = Result<T, OfferError>;
