// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorBody,
    identity::{HostFingerprint, IdentityHash},
    license::{GiftCardPayment, LicenseStatus},
    listener::ListenerState,
    state::AppState,
};

pub mod health;
pub mod node;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/node", get(node::node_status))
        .route("/node/payments/{intent_id}", get(node::payment))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state)
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the status API on `addr` until `shutdown` is cancelled.
pub async fn serve(
    state: AppState,
    addr: &str,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        "Status server listening (docs at /docs)"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("Status server shutting down");
        })
        .await
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        node::node_status,
        node::payment
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            node::NodeResponse,
            HostFingerprint,
            IdentityHash,
            LicenseStatus,
            GiftCardPayment,
            ListenerState,
            ErrorBody
        )
    ),
    tags(
        (name = "Health", description = "Liveness and health probes"),
        (name = "Node", description = "Node identity and license status")
    )
)]
struct ApiDoc;
