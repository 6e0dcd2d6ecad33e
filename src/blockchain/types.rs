// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

/// Avalanche network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// WebSocket endpoint URL (log subscriptions)
    pub ws_url: &'static str,
    /// Block explorer URL
    pub explorer_url: &'static str,
}

/// Avalanche C-Chain Mainnet configuration.
pub const AVAX_MAINNET: NetworkConfig = NetworkConfig {
    name: "Avalanche C-Chain",
    chain_id: 43114,
    ws_url: "wss://api.avax.network/ext/bc/C/ws",
    explorer_url: "https://snowtrace.io",
};

/// Avalanche Fuji Testnet configuration.
pub const AVAX_FUJI: NetworkConfig = NetworkConfig {
    name: "Avalanche Fuji Testnet",
    chain_id: 43113,
    ws_url: "wss://api.avax-test.network/ext/bc/C/ws",
    explorer_url: "https://testnet.snowtrace.io",
};

/// Node manager contract deployed on Fuji.
pub const NODE_MANAGER_FUJI: &str = "0x2Fcd73952e53aAd026c378F378812E5bb069eF6E";

/// Payment event emitted when a gift card intent is paid.
pub const GIFT_CARD_PAYED: &str = "GiftCardPayed";

/// Explorer link for a transaction hash.
pub fn explorer_tx_url(network: &NetworkConfig, tx_hash: &str) -> String {
    format!("{}/tx/{}", network.explorer_url, tx_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn node_manager_address_parses() {
        assert!(NODE_MANAGER_FUJI.parse::<Address>().is_ok());
    }

    #[test]
    fn explorer_url_joins_tx_path() {
        assert_eq!(
            explorer_tx_url(&AVAX_FUJI, "0xabc"),
            "https://testnet.snowtrace.io/tx/0xabc"
        );
    }

    #[test]
    fn ws_urls_are_websocket() {
        for network in [AVAX_FUJI, AVAX_MAINNET] {
            assert!(network.ws_url.starts_with("wss://"), "{}", network.name);
        }
    }
}
