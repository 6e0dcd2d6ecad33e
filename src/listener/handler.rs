// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Handlers for decoded contract events.

use alloy::dyn_abi::DynSolValue;
use chrono::Utc;

use crate::blockchain::{explorer_tx_url, DecodedEvent, NetworkConfig, GIFT_CARD_PAYED};
use crate::license::{GiftCardPayment, LicenseState, PaymentOutcome};

/// Errors reported by an [`EventHandler`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("unsupported event: {0}")]
    Unsupported(String),

    #[error("{event} is missing argument `{argument}`")]
    MissingArgument {
        event: String,
        argument: &'static str,
    },

    #[error("handler failed: {0}")]
    Failed(String),
}

/// Receives decoded events, synchronously and in arrival order.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError>;
}

/// Records `GiftCardPayed` events into the node's license state.
pub struct GiftCardPaymentHandler {
    state: LicenseState,
    network: NetworkConfig,
}

/// Position of `intentId` in `GiftCardPayed(address,uint256,string)`.
const INTENT_ARG_INDEX: usize = 2;

impl GiftCardPaymentHandler {
    pub fn new(state: LicenseState, network: NetworkConfig) -> Self {
        Self { state, network }
    }

    fn payment_from(&self, event: &DecodedEvent) -> Result<GiftCardPayment, HandlerError> {
        let missing = |argument| HandlerError::MissingArgument {
            event: event.name.clone(),
            argument,
        };

        let intent_id = match event.arg("intentId").or_else(|| event.arg_at(INTENT_ARG_INDEX)) {
            Some(DynSolValue::String(s)) => s.clone(),
            _ => return Err(missing("intentId")),
        };

        let payer = match event.arg("payer").or_else(|| event.arg_at(0)) {
            Some(DynSolValue::Address(a)) => format!("{a:#x}"),
            _ => return Err(missing("payer")),
        };

        let amount = match event.arg("amount").or_else(|| event.arg_at(1)) {
            Some(DynSolValue::Uint(v, _)) => v.to_string(),
            _ => return Err(missing("amount")),
        };

        let transaction_hash = event.tx_hash_hex();
        let explorer_url = (!transaction_hash.is_empty())
            .then(|| explorer_tx_url(&self.network, &transaction_hash));

        Ok(GiftCardPayment {
            intent_id,
            payer,
            amount,
            transaction_hash,
            block_number: event.block_number,
            explorer_url,
            observed_at: Utc::now(),
        })
    }
}

impl EventHandler for GiftCardPaymentHandler {
    fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        if event.name != GIFT_CARD_PAYED {
            return Err(HandlerError::Unsupported(event.name.clone()));
        }

        let payment = self.payment_from(event)?;
        let intent_id = payment.intent_id.clone();
        let tx_hash = payment.transaction_hash.clone();

        match self.state.record_payment(payment) {
            PaymentOutcome::Licensed => {
                tracing::info!(
                    intent_id = %intent_id,
                    tx_hash = %tx_hash,
                    "License payment received for this node"
                );
            }
            PaymentOutcome::Recorded => {
                tracing::info!(
                    intent_id = %intent_id,
                    tx_hash = %tx_hash,
                    "Gift card payment recorded"
                );
            }
            PaymentOutcome::Duplicate => {
                tracing::debug!(tx_hash = %tx_hash, "Duplicate gift card payment ignored");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::abi::tests::{decoder, gift_card_record};
    use crate::blockchain::AVAX_FUJI;
    use crate::identity::{HostFingerprint, IdentityHash};

    fn node_id() -> IdentityHash {
        IdentityHash::of(&HostFingerprint::default())
    }

    fn decoded(intent: &str, tx: u8) -> DecodedEvent {
        decoder()
            .decode(&gift_card_record(intent, 2_500, tx))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn payment_for_node_marks_license() {
        let state = LicenseState::new(node_id());
        let handler = GiftCardPaymentHandler::new(state.clone(), AVAX_FUJI);

        handler.handle(&decoded(node_id().as_str(), 1)).unwrap();

        let status = state.snapshot();
        assert!(status.licensed);
        let payment = &status.payments[0];
        assert_eq!(payment.amount, "2500");
        assert_eq!(payment.payer, "0x1111111111111111111111111111111111111111");
        assert_eq!(payment.block_number, Some(1_001));
        assert!(payment
            .explorer_url
            .as_deref()
            .unwrap()
            .starts_with("https://testnet.snowtrace.io/tx/0x0101"));
    }

    #[test]
    fn payment_for_other_intent_is_recorded() {
        let state = LicenseState::new(node_id());
        let handler = GiftCardPaymentHandler::new(state.clone(), AVAX_FUJI);

        handler.handle(&decoded("intent-1", 2)).unwrap();
        assert!(!state.is_licensed());
        assert_eq!(state.snapshot().payments[0].intent_id, "intent-1");
    }

    #[test]
    fn other_events_are_unsupported() {
        let handler = GiftCardPaymentHandler::new(LicenseState::new(node_id()), AVAX_FUJI);
        let mut event = decoded("x", 3);
        event.name = "NodeCreated".to_string();
        assert_eq!(
            handler.handle(&event),
            Err(HandlerError::Unsupported("NodeCreated".to_string()))
        );
    }

    #[test]
    fn mistyped_intent_is_reported() {
        let handler = GiftCardPaymentHandler::new(LicenseState::new(node_id()), AVAX_FUJI);
        let mut event = decoded("x", 4);
        event.args[2].value = DynSolValue::Bool(true);
        assert!(matches!(
            handler.handle(&event),
            Err(HandlerError::MissingArgument {
                argument: "intentId",
                ..
            })
        ));
    }
}
