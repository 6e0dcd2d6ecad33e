// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory license state of this node.
//!
//! Updated by the gift card payment handler from the listener task and read by
//! the status API. Payments are deduplicated by `(transaction_hash, intent_id)`
//! so a log delivered twice is only recorded once.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::identity::IdentityHash;

/// A gift card payment observed on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct GiftCardPayment {
    /// Intent the payment settles.
    pub intent_id: String,
    /// Paying account (`0x…`).
    pub payer: String,
    /// Amount in the token's smallest unit.
    pub amount: String,
    pub transaction_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Snapshot of the node's license status.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LicenseStatus {
    pub node_id: IdentityHash,
    pub licensed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licensed_at: Option<DateTime<Utc>>,
    pub payments: Vec<GiftCardPayment>,
}

/// Outcome of recording a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Payment was for this node and licensed it.
    Licensed,
    /// Payment recorded, not for this node (or already licensed).
    Recorded,
    /// Same payment seen before.
    Duplicate,
}

/// Shared, thread-safe license state.
#[derive(Debug, Clone)]
pub struct LicenseState {
    inner: Arc<RwLock<LicenseStatus>>,
}

impl LicenseState {
    pub fn new(node_id: IdentityHash) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LicenseStatus {
                node_id,
                licensed: false,
                licensed_at: None,
                payments: Vec::new(),
            })),
        }
    }

    /// Record a payment, licensing the node when the intent is its identity.
    pub fn record_payment(&self, payment: GiftCardPayment) -> PaymentOutcome {
        let mut status = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let duplicate = status.payments.iter().any(|p| {
            p.transaction_hash == payment.transaction_hash && p.intent_id == payment.intent_id
        });
        if duplicate {
            return PaymentOutcome::Duplicate;
        }

        let for_this_node = payment.intent_id == status.node_id.as_str();
        let observed_at = payment.observed_at;
        status.payments.push(payment);

        if for_this_node && !status.licensed {
            status.licensed = true;
            status.licensed_at = Some(observed_at);
            PaymentOutcome::Licensed
        } else {
            PaymentOutcome::Recorded
        }
    }

    /// Most recent payment recorded for `intent_id`.
    pub fn payment(&self, intent_id: &str) -> Option<GiftCardPayment> {
        self.snapshot()
            .payments
            .into_iter()
            .rev()
            .find(|p| p.intent_id == intent_id)
    }

    pub fn is_licensed(&self) -> bool {
        self.snapshot().licensed
    }

    /// Copy of the current status.
    pub fn snapshot(&self) -> LicenseStatus {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
