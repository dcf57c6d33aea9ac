// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    chain::{AssetCreation, NodeIdentity},
    checker::{AssertionFailure, RunFailure, RunReport, Step, StepRecord},
    state::AppState,
};

pub mod health;
pub mod runs;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/runs", post(runs::trigger_run))
        .route("/runs/latest", get(runs::latest_run))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        runs::trigger_run,
        runs::latest_run
    ),
    components(
        schemas(
            RunReport,
            StepRecord,
            RunFailure,
            AssertionFailure,
            Step,
            NodeIdentity,
            AssetCreation,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Runs", description = "Ledger/enclave consistency verification runs")
    )
)]
struct ApiDoc;
