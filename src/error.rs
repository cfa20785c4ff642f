// SPDX-License-Identifier: MPL-2.0

use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub(crate) fn missing(field: &str) -> Self {
        ServiceError::Validation(format!("missing required field: {field}"))
    }
}

/// Reject empty or whitespace-only identifiers
pub(crate) fn require<'a>(field: &str, value: &'a str) -> Result<&'a str, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::missing(field));
    }
    Ok(trimmed)
}
