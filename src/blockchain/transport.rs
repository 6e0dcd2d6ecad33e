// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Log subscription transport.
//!
//! [`LogTransport`] is the seam between the listener and the ledger: a single
//! `subscribe_logs` call yields a [`LogSubscription`] that owns a record
//! channel, an error channel and whatever keeps the remote subscription alive.
//! Dropping or closing the handle tears the remote side down.

use std::future::Future;
use std::sync::Arc;

use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::pubsub::Subscription;
use alloy::rpc::types::{Filter, Log};
use tokio::sync::{broadcast::error::RecvError, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::abi::LogRecord;
use crate::config::AgentConfig;

/// Records buffered between the forwarding task and the listener.
const LOG_BUFFER: usize = 256;

/// Stream-level transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("subscription request failed: {0}")]
    Subscribe(String),

    #[error("subscription stream error: {0}")]
    Stream(String),

    #[error("subscription closed by remote")]
    Closed,
}

/// Source of log subscriptions.
pub trait LogTransport: Send + Sync + 'static {
    /// Open a subscription for logs matching `filter`.
    fn subscribe_logs(
        &self,
        filter: &Filter,
    ) -> impl Future<Output = Result<LogSubscription, TransportError>> + Send;
}

/// Owned handle to one live subscription.
///
/// The remote side stays open while the handle lives. [`close`](Self::close)
/// shuts it down and waits for the forwarding task; dropping the handle
/// cancels without waiting.
pub struct LogSubscription {
    pub logs: mpsc::Receiver<LogRecord>,
    pub errors: mpsc::Receiver<TransportError>,
    guard: Option<DropGuard>,
    task: Option<JoinHandle<()>>,
}

impl LogSubscription {
    /// Wrap channels whose producer stops when `closer` is cancelled.
    pub fn new(
        logs: mpsc::Receiver<LogRecord>,
        errors: mpsc::Receiver<TransportError>,
        closer: CancellationToken,
    ) -> Self {
        Self {
            logs,
            errors,
            guard: Some(closer.drop_guard()),
            task: None,
        }
    }

    /// Like [`new`](Self::new), also joining `task` on close.
    pub fn with_task(
        logs: mpsc::Receiver<LogRecord>,
        errors: mpsc::Receiver<TransportError>,
        closer: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            task: Some(task),
            ..Self::new(logs, errors, closer)
        }
    }

    /// Close the subscription and wait for its producer to exit.
    pub async fn close(mut self) {
        if let Some(guard) = self.guard.take() {
            guard.disarm().cancel();
        }
        self.logs.close();
        self.errors.close();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::warn!(error = %e, "Log forwarding task panicked");
                }
            }
        }
    }
}

// =============================================================================
// WebSocket Transport
// =============================================================================

/// Log transport over an alloy WebSocket provider.
///
/// Each subscription gets its own connection; the endpoint is read from the
/// current config snapshot at subscribe time.
pub struct WsLogTransport {
    config: watch::Receiver<Arc<AgentConfig>>,
}

impl WsLogTransport {
    pub fn new(config: watch::Receiver<Arc<AgentConfig>>) -> Self {
        Self { config }
    }
}

impl LogTransport for WsLogTransport {
    fn subscribe_logs(
        &self,
        filter: &Filter,
    ) -> impl Future<Output = Result<LogSubscription, TransportError>> + Send {
        let ws_url = self.config.borrow().ws_url.clone();
        let filter = filter.clone();

        async move {
            tracing::debug!(url = %ws_url, "Connecting log subscription");

            let provider = ProviderBuilder::new()
                .connect_ws(WsConnect::new(ws_url.as_str()))
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            let subscription = provider
                .subscribe_logs(&filter)
                .await
                .map_err(|e| TransportError::Subscribe(e.to_string()))?;

            let (log_tx, log_rx) = mpsc::channel(LOG_BUFFER);
            let (err_tx, err_rx) = mpsc::channel(1);
            let closer = CancellationToken::new();

            let task = tokio::spawn(forward_logs(
                provider,
                subscription,
                log_tx,
                err_tx,
                closer.clone(),
            ));

            Ok(LogSubscription::with_task(log_rx, err_rx, closer, task))
        }
    }
}

/// Pump subscription items into the listener's channels.
///
/// Owns the provider so the WebSocket connection lives exactly as long as the
/// subscription; both are dropped when this returns.
async fn forward_logs<P: Provider + 'static>(
    provider: P,
    mut subscription: Subscription<Log>,
    logs: mpsc::Sender<LogRecord>,
    errors: mpsc::Sender<TransportError>,
    closer: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = closer.cancelled() => break,
            item = subscription.recv() => match item {
                Ok(log) => {
                    if logs.send(LogRecord::from(log)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Log subscription lagged, records dropped");
                }
                Err(RecvError::Closed) => {
                    let _ = errors.send(TransportError::Closed).await;
                    break;
                }
            }
        }
    }

    drop(subscription);
    drop(provider);
    tracing::debug!("Log subscription closed");
}
