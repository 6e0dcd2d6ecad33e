// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::identity::{HostFingerprint, IdentityHash};
use crate::license::{GiftCardPayment, LicenseStatus};
use crate::listener::ListenerState;
use crate::state::AppState;

/// Node identity and license status.
#[derive(Debug, Serialize, ToSchema)]
pub struct NodeResponse {
    pub node_id: IdentityHash,
    /// Comma-joined fingerprint record the identity was derived from.
    pub record: String,
    pub fingerprint: HostFingerprint,
    pub network: String,
    pub chain_id: u64,
    /// Contract the listener is subscribed to (`0x…`).
    pub contract: String,
    pub listener: ListenerState,
    pub license: LicenseStatus,
}

#[utoipa::path(
    get,
    path = "/v1/node",
    tag = "Node",
    responses(
        (status = 200, description = "Node identity and license status", body = NodeResponse)
    )
)]
pub async fn node_status(State(state): State<AppState>) -> Json<NodeResponse> {
    let config = state.config();
    let identity = &state.identity;

    Json(NodeResponse {
        node_id: identity.identity.clone(),
        record: identity.fingerprint.to_string(),
        fingerprint: identity.fingerprint.clone(),
        network: config.network.name.to_string(),
        chain_id: config.network.chain_id,
        contract: format!("{:#x}", state.contract),
        listener: state.listener_state(),
        license: state.license.snapshot(),
    })
}

#[utoipa::path(
    get,
    path = "/v1/node/payments/{intent_id}",
    tag = "Node",
    params(
        ("intent_id" = String, Path, description = "Gift card intent identifier")
    ),
    responses(
        (status = 200, description = "Recorded payment", body = GiftCardPayment),
        (status = 404, description = "No payment seen for this intent", body = crate::error::ErrorBody)
    )
)]
pub async fn payment(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> Result<Json<GiftCardPayment>, ApiError> {
    state
        .license
        .payment(&intent_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no payment seen for intent {intent_id}")))
}
