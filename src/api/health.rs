// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::path::Path;
use utoipa::ToSchema;

use crate::listener::ListenerState;
use crate::state::AppState;

/// Agent health with per-component results.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// "ok" when every check passes, otherwise "degraded".
    pub status: String,
    pub checks: HealthChecks,
}

/// Per-component results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub service: String,
    /// Event listener state.
    pub listener: ListenerState,
    /// Data directory availability ("ok" or "missing").
    pub data_dir: String,
}

/// Liveness probe body.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn check_data_dir(dir: &Path) -> String {
    if dir.exists() {
        "ok".to_string()
    } else {
        "missing".to_string()
    }
}

/// Returns 503 once the listener has closed or the data directory is gone.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Agent is healthy", body = ReadyResponse),
        (status = 503, description = "Agent is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let listener = state.listener_state();
    let data_dir = check_data_dir(&state.config().data_dir);

    let all_ok = listener != ListenerState::Closed && data_dir == "ok";

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            listener,
            data_dir,
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Always 200 while the process is up.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Agent is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
