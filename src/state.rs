// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use alloy::primitives::Address;
use tokio::sync::watch;

use crate::config::AgentConfig;
use crate::identity::NodeIdentity;
use crate::license::LicenseState;
use crate::listener::ListenerState;

#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<NodeIdentity>,
    pub license: LicenseState,
    /// Contract the listener was started on. Config reloads do not move it.
    pub contract: Address,
    pub listener: watch::Receiver<ListenerState>,
    pub config: watch::Receiver<Arc<AgentConfig>>,
}

impl AppState {
    pub fn new(
        identity: NodeIdentity,
        license: LicenseState,
        contract: Address,
        listener: watch::Receiver<ListenerState>,
        config: watch::Receiver<Arc<AgentConfig>>,
    ) -> Self {
        Self {
            identity: Arc::new(identity),
            license,
            contract,
            listener,
            config,
        }
    }

    /// Current listener state.
    pub fn listener_state(&self) -> ListenerState {
        *self.listener.borrow()
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<AgentConfig> {
        self.config.borrow().clone()
    }
}

/// State over a default fingerprint with a controllable listener state.
#[cfg(test)]
pub(crate) fn test_state(
    listener: ListenerState,
) -> (AppState, watch::Sender<ListenerState>, watch::Sender<Arc<AgentConfig>>) {
    use crate::identity::HostFingerprint;

    let identity = NodeIdentity::from_fingerprint(HostFingerprint::default());
    let license = LicenseState::new(identity.identity.clone());
    let (listener_tx, listener_rx) = watch::channel(listener);
    let config = AgentConfig::default();
    let contract = config.contract_address;
    let (config_tx, config_rx) = watch::channel(Arc::new(config));

    (
        AppState::new(identity, license, contract, listener_rx, config_rx),
        listener_tx,
        config_tx,
    )
}
