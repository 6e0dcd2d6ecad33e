// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Node License Agent - Host Identity & On-Chain License Events
//!
//! This crate derives a stable identity for the host it runs on, seals it at
//! rest, and watches the node manager contract on Avalanche for gift card
//! payments that license the node.
//!
//! ## Modules
//!
//! - `identity` - Host fingerprint and identity hash
//! - `storage` - AES-256-GCM vault for the identity artifact
//! - `blockchain` - ABI decoding and WebSocket log subscriptions
//! - `listener` - Event subscription manager with bounded reconnect
//! - `license` - In-memory license state
//! - `api` - Status HTTP API (Axum)

pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod identity;
pub mod license;
pub mod listener;
pub mod state;
pub mod storage;
