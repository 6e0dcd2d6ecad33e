// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Event Listener
//!
//! Long-lived task that subscribes to the node manager contract's logs,
//! decodes them and dispatches recognized events to a handler.
//!
//! ## States
//!
//! ```text
//! Idle → Subscribing → Streaming ─┬─→ Closed            (cancellation)
//!            ↑                    └─→ Reconnecting ─→ Subscribing
//!            └──── failed subscribe ──┘
//! ```
//!
//! - A record that fails to decode is logged and skipped.
//! - Handler errors and panics are caught at the dispatch boundary.
//! - Stream errors trigger a reconnect after an exponential backoff. After
//!   `max_retries` consecutive failures the listener gives up with
//!   [`ListenerError::FatalTransport`]. The counter resets once a subscription
//!   delivers a record or stays up for `stable_after`.
//! - Records are dispatched in arrival order. Nothing is replayed across a
//!   reconnect, so logs emitted while disconnected are missed.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` like the other background tasks.
//! The subscription handle is closed on every exit path.

pub mod backoff;
pub mod handler;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::Address;
use alloy::rpc::types::Filter;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

pub use backoff::ReconnectPolicy;
pub use handler::{EventHandler, GiftCardPaymentHandler, HandlerError};

use crate::blockchain::{
    DecodedEvent, EventDecoder, LogRecord, LogSubscription, LogTransport, TransportError,
};
use crate::config::AgentConfig;

/// Observable listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ListenerState {
    Idle,
    Subscribing,
    Streaming,
    Reconnecting { attempt: u32 },
    Closed,
}

/// Errors that end the listener.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    #[error("reconnect budget exhausted after {failures} consecutive failures: {last_error}")]
    FatalTransport {
        failures: u32,
        last_error: TransportError,
    },
}

/// How a streaming session ended.
enum StreamEnd {
    Cancelled,
    Failed {
        error: TransportError,
        healthy: bool,
    },
}

/// Subscribes to contract logs and dispatches decoded events.
pub struct EventSubscriptionManager<T> {
    transport: T,
    decoder: EventDecoder,
    filter: Filter,
    contract: Address,
    handler: Arc<dyn EventHandler>,
    config: watch::Receiver<Arc<AgentConfig>>,
    state: watch::Sender<ListenerState>,
}

impl<T: LogTransport> EventSubscriptionManager<T> {
    /// Create a listener for `contract`. The log filter is fixed here.
    pub fn new(
        transport: T,
        decoder: EventDecoder,
        contract: Address,
        handler: Arc<dyn EventHandler>,
        config: watch::Receiver<Arc<AgentConfig>>,
    ) -> Self {
        let filter = decoder.filter(contract);
        let (state, _) = watch::channel(ListenerState::Idle);

        Self {
            transport,
            decoder,
            filter,
            contract,
            handler,
            config,
            state,
        }
    }

    /// Receiver tracking the listener state.
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ListenerState) {
        self.state.send_replace(state);
    }

    /// Reconnect policy from the current config snapshot.
    fn policy(&self) -> ReconnectPolicy {
        self.config.borrow().reconnect.clone()
    }

    /// Run the listener until cancelled or the reconnect budget is exhausted.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(listener.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ListenerError> {
        info!(
            contract = %self.contract,
            events = ?self.decoder.events().iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            "Event listener starting"
        );

        let mut failures: u32 = 0;

        loop {
            self.set_state(ListenerState::Subscribing);

            let subscribed = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.close();
                    return Ok(());
                }
                result = self.transport.subscribe_logs(&self.filter) => result,
            };

            let error = match subscribed {
                Ok(subscription) => {
                    info!(contract = %self.contract, "Log subscription established");
                    self.set_state(ListenerState::Streaming);

                    match self.stream(subscription, &shutdown).await {
                        StreamEnd::Cancelled => {
                            self.close();
                            return Ok(());
                        }
                        StreamEnd::Failed { error, healthy } => {
                            if healthy {
                                failures = 0;
                            }
                            error
                        }
                    }
                }
                Err(error) => error,
            };

            failures += 1;
            let policy = self.policy();

            if policy.is_exhausted(failures) {
                error!(
                    failures,
                    error = %error,
                    "Log subscription failed, reconnect budget exhausted"
                );
                self.set_state(ListenerState::Closed);
                return Err(ListenerError::FatalTransport {
                    failures,
                    last_error: error,
                });
            }

            let delay = policy.delay_for(failures);
            warn!(
                attempt = failures,
                max_retries = policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Log subscription failed, reconnecting"
            );
            self.set_state(ListenerState::Reconnecting { attempt: failures });

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.close();
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Consume one subscription until it fails or shutdown is requested.
    async fn stream(
        &self,
        mut subscription: LogSubscription,
        shutdown: &CancellationToken,
    ) -> StreamEnd {
        let established = Instant::now();
        let mut delivered = false;

        // Shutdown first, then buffered records, then stream errors.
        let failure = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break None,
                record = subscription.logs.recv() => match record {
                    Some(record) => {
                        delivered = true;
                        self.process(record);
                    }
                    None => {
                        break Some(TransportError::Stream("log channel closed".to_string()));
                    }
                },
                error = subscription.errors.recv() => {
                    break Some(error.unwrap_or(TransportError::Closed));
                }
            }
        };

        subscription.close().await;

        match failure {
            Some(error) => StreamEnd::Failed {
                error,
                healthy: delivered || established.elapsed() >= self.policy().stable_after,
            },
            None => StreamEnd::Cancelled,
        }
    }

    /// Decode and dispatch one record. Never fails the subscription.
    fn process(&self, record: LogRecord) {
        match self.decoder.decode(&record) {
            Ok(Some(event)) => self.dispatch(&event),
            Ok(None) => {
                debug!(tx_hash = %record.tx_hash_hex(), "Ignoring log for unwatched event");
            }
            Err(e) => {
                warn!(
                    tx_hash = %record.tx_hash_hex(),
                    block_number = ?record.block_number,
                    error = %e,
                    "Failed to decode log record, skipping"
                );
            }
        }
    }

    fn dispatch(&self, event: &DecodedEvent) {
        let handler = &self.handler;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
            Ok(Ok(())) => {
                debug!(event = %event.name, tx_hash = %event.tx_hash_hex(), "Event dispatched");
            }
            Ok(Err(e)) => {
                warn!(
                    event = %event.name,
                    tx_hash = %event.tx_hash_hex(),
                    error = %e,
                    "Event handler failed"
                );
            }
            Err(_) => {
                error!(
                    event = %event.name,
                    tx_hash = %event.tx_hash_hex(),
                    "Event handler panicked"
                );
            }
        }
    }

    fn close(&self) {
        self.set_state(ListenerState::Closed);
        info!("Event listener shutting down");
    }
}
