// SPDX-License-Identifier: MPL-2.0

use crate::error::ServiceError;
use crate::store::StoreError;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Store(StoreError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => AppError::Validation(msg),
            ServiceError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            ServiceError::Store(StoreError::NotFound(what)) => {
                AppError::NotFound(format!("{what} not found"))
            }
            ServiceError::Store(StoreError::Conflict(msg)) => AppError::Conflict(msg),
            ServiceError::Store(other) => AppError::Store(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Store(ref err) => {
                error!(%err, "store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                AppError::from(ServiceError::missing("actor")),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(ServiceError::NotFound("Post:p1".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(ServiceError::Store(StoreError::NotFound("Profile:x".into()))),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(ServiceError::Store(StoreError::Conflict("dup".into()))),
                StatusCode::CONFLICT,
            ),
            (
                AppError::from(ServiceError::Store(StoreError::Task("boom".into()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
