//! Unified validation framework for request payloads.

pub mod rules;

pub use validator::Validate;

use crate::error::AppError;

/// Runs the payload's validation rules, mapping failures to a 400 response.
pub fn validate_payload<T: Validate>(payload: &T) -> Result<(), AppError> {
    payload.validate().map_err(AppError::from)
}
