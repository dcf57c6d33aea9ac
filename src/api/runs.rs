// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};

use crate::checker::RunReport;
use crate::error::ApiError;
use crate::state::AppState;

/// Execute one verification run and return its report.
///
/// Runs are serialized; a trigger arriving while a run is in progress is
/// rejected rather than queued.
#[utoipa::path(
    post,
    path = "/v1/runs",
    tag = "Runs",
    responses(
        (status = 200, description = "Run passed", body = RunReport),
        (status = 409, description = "A run is already in progress"),
        (status = 422, description = "Run failed; the report names the failing step", body = RunReport),
        (status = 503, description = "Service is shutting down")
    )
)]
pub async fn trigger_run(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RunReport>), ApiError> {
    if state.shutdown.is_cancelled() {
        return Err(ApiError::ShuttingDown);
    }

    let _running = state
        .run_lock
        .try_lock()
        .map_err(|_| ApiError::RunInProgress)?;

    let (status, report) = match state.checker.run(&state.shutdown).await {
        Ok(report) => (StatusCode::OK, report),
        Err(err) => (StatusCode::UNPROCESSABLE_ENTITY, *err.report),
    };

    *state.latest.write().await = Some(report.clone());

    Ok((status, Json(report)))
}

/// Get the report of the most recent run.
#[utoipa::path(
    get,
    path = "/v1/runs/latest",
    tag = "Runs",
    responses(
        (status = 200, description = "Most recent run report", body = RunReport),
        (status = 404, description = "No run has completed yet")
    )
)]
pub async fn latest_run(State(state): State<AppState>) -> Result<Json<RunReport>, ApiError> {
    state
        .latest
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or(ApiError::NoRunYet)
}
