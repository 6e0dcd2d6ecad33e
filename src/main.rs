// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use node_license_agent::{
    api,
    blockchain::{DecodeError, EventDecoder, WsLogTransport, NODE_MANAGER_ABI},
    config::{AgentConfig, ConfigError, ConfigSource, ConfigWatcher, LOG_FORMAT_ENV, NODE_VAULT_KEY_ENV},
    identity::{HostFingerprint, NodeIdentity},
    license::LicenseState,
    listener::{EventSubscriptionManager, GiftCardPaymentHandler, ListenerError},
    state::AppState,
    storage::{StoragePaths, VaultError, VaultKey},
};

/// Reasons the agent exits with a failure code.
#[derive(Debug, thiserror::Error)]
enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("identity vault: {0}")]
    Vault(#[from] VaultError),

    #[error("failed to read ABI {path}: {source}")]
    AbiRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Abi(#[from] DecodeError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("status server: {0}")]
    Server(#[source] std::io::Error),

    #[error("task failed: {0}")]
    Task(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => {
            info!("Node license agent stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Node license agent failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run() -> Result<(), AgentError> {
    info!(version = env!("CARGO_PKG_VERSION"), "Node license agent starting");

    let source = ConfigSource::from_env();
    let config = source.load()?;
    info!(
        network = config.network.name,
        contract = %config.contract_address,
        ws_url = %config.ws_url,
        events = ?config.events,
        "Configuration loaded"
    );

    // Identity
    let (key, persistent_key) = vault_key()?;
    let paths = StoragePaths::new(&config.data_dir);
    let fingerprint = HostFingerprint::collect();
    NodeIdentity::reconcile(&paths, &key, persistent_key, &fingerprint)?;
    let identity = NodeIdentity::establish_from(fingerprint, &paths, &key)?;
    info!(node_id = %identity.identity, "Node identity established");

    // Listener
    let decoder = load_decoder(&config)?;
    let license = LicenseState::new(identity.identity.clone());
    let handler = Arc::new(GiftCardPaymentHandler::new(
        license.clone(),
        config.network.clone(),
    ));
    let bind_addr = config.bind_addr();
    let contract = config.contract_address;

    let (config_tx, config_rx) = watch::channel(Arc::new(config));
    let shutdown = CancellationToken::new();

    let watcher_task = tokio::spawn(ConfigWatcher::new(source, config_tx).run(shutdown.clone()));

    let manager = EventSubscriptionManager::new(
        WsLogTransport::new(config_rx.clone()),
        decoder,
        contract,
        handler,
        config_rx.clone(),
    );
    let state = AppState::new(identity, license, contract, manager.state(), config_rx);
    let mut listener_task = tokio::spawn(manager.run(shutdown.clone()));

    // Status server
    let server_shutdown = shutdown.clone();
    let mut server_task =
        tokio::spawn(async move { api::serve(state, &bind_addr, server_shutdown).await });

    let mut listener_done = None;
    let mut server_done = None;
    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        result = &mut listener_task => listener_done = Some(result),
        result = &mut server_task => server_done = Some(result),
    }
    shutdown.cancel();

    let listener_result = match listener_done {
        Some(result) => result,
        None => listener_task.await,
    };
    let server_result = match server_done {
        Some(result) => result,
        None => server_task.await,
    };
    if let Err(e) = watcher_task.await {
        warn!(error = %e, "Config watcher task failed");
    }

    listener_result.map_err(|e| AgentError::Task(e.to_string()))??;
    server_result
        .map_err(|e| AgentError::Task(e.to_string()))?
        .map_err(AgentError::Server)
}

/// Vault key from `NODE_VAULT_KEY`, or a fresh random key.
///
/// The flag is `true` when the key outlives this run.
fn vault_key() -> Result<(VaultKey, bool), VaultError> {
    match std::env::var(NODE_VAULT_KEY_ENV) {
        Ok(encoded) => Ok((VaultKey::from_hex(encoded.trim())?, true)),
        Err(_) => {
            warn!(
                "{NODE_VAULT_KEY_ENV} not set, using a random key; the sealed identity will not be readable after restart"
            );
            Ok((VaultKey::generate()?, false))
        }
    }
}

fn load_decoder(config: &AgentConfig) -> Result<EventDecoder, AgentError> {
    let Some(path) = &config.abi_path else {
        return Ok(EventDecoder::from_json(NODE_MANAGER_ABI, &config.events)?);
    };

    let json = std::fs::read_to_string(path).map_err(|source| AgentError::AbiRead {
        path: path.clone(),
        source,
    })?;
    Ok(EventDecoder::from_json(&json, &config.events)?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
