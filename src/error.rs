// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Requests the run endpoints refuse. A failed run is not one of them: it is
/// answered with its report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("No verification run has completed yet")]
    NoRunYet,

    #[error("A verification run is already in progress")]
    RunInProgress,

    #[error("Service is shutting down")]
    ShuttingDown,
}

impl ApiError {
    pub fn status(self) -> StatusCode {
        match self {
            ApiError::NoRunYet => StatusCode::NOT_FOUND,
            ApiError::RunInProgress => StatusCode::CONFLICT,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
