// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration module for Avalanche C-Chain.
//!
//! This module provides functionality for:
//! - Decoding node manager contract events against its ABI
//! - Streaming contract logs over a WebSocket subscription

pub mod abi;
pub mod transport;
pub mod types;

pub use abi::{DecodeError, DecodedEvent, EventArg, EventDecoder, LogRecord, NODE_MANAGER_ABI};
pub use transport::{LogSubscription, LogTransport, TransportError, WsLogTransport};
pub use types::*;
