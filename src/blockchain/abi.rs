// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contract event schema and log decoding.
//!
//! The decoder is built from a JSON ABI and the names of the events the agent
//! cares about. Logs whose topic0 does not belong to one of those events are
//! ignored; logs that do match but carry an undecodable payload produce a
//! [`DecodeError`] for that record only.

use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::{Event, JsonAbi};
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::{Filter, Log};

/// Bundled ABI of the node manager contract (events only matter here).
pub const NODE_MANAGER_ABI: &str = include_str!("abi/NodeManager.json");

/// A raw log record as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub transaction_hash: Option<B256>,
    pub block_number: Option<u64>,
}

impl LogRecord {
    /// Transaction hash rendered as `0x…`, or empty when unknown.
    pub fn tx_hash_hex(&self) -> String {
        self.transaction_hash
            .map(|h| format!("{h:#x}"))
            .unwrap_or_default()
    }
}

impl From<Log> for LogRecord {
    fn from(log: Log) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            transaction_hash: log.transaction_hash,
            block_number: log.block_number,
        }
    }
}

/// A named, typed event argument.
#[derive(Debug, Clone, PartialEq)]
pub struct EventArg {
    pub name: String,
    pub value: DynSolValue,
}

/// A log record decoded against a known event signature.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub name: String,
    pub address: Address,
    pub transaction_hash: Option<B256>,
    pub block_number: Option<u64>,
    /// Arguments in declaration order (indexed and data arguments merged).
    pub args: Vec<EventArg>,
}

impl DecodedEvent {
    /// Argument by declared name.
    pub fn arg(&self, name: &str) -> Option<&DynSolValue> {
        self.args.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    /// Argument by position.
    pub fn arg_at(&self, index: usize) -> Option<&DynSolValue> {
        self.args.get(index).map(|a| &a.value)
    }

    pub fn tx_hash_hex(&self) -> String {
        self.transaction_hash
            .map(|h| format!("{h:#x}"))
            .unwrap_or_default()
    }
}

/// Errors building the schema or decoding a single record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid ABI: {0}")]
    InvalidAbi(String),

    #[error("event not found in ABI: {0}")]
    UnknownEvent(String),

    #[error("no events of interest configured")]
    NoEvents,

    #[error("failed to decode {event}: {reason}")]
    Data { event: String, reason: String },
}

/// Decodes logs for a fixed set of events.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    events: Vec<Event>,
}

impl EventDecoder {
    /// Build a decoder from a JSON ABI string.
    pub fn from_json<S: AsRef<str>>(abi_json: &str, names: &[S]) -> Result<Self, DecodeError> {
        let abi: JsonAbi =
            serde_json::from_str(abi_json).map_err(|e| DecodeError::InvalidAbi(e.to_string()))?;
        Self::new(&abi, names)
    }

    /// Build a decoder for the named events (all overloads of each name).
    pub fn new<S: AsRef<str>>(abi: &JsonAbi, names: &[S]) -> Result<Self, DecodeError> {
        if names.is_empty() {
            return Err(DecodeError::NoEvents);
        }

        let mut events = Vec::new();
        for name in names {
            let name = name.as_ref();
            let overloads = abi
                .event(name)
                .ok_or_else(|| DecodeError::UnknownEvent(name.to_string()))?;
            events.extend(overloads.iter().cloned());
        }

        Ok(Self { events })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Log filter for `address`, narrowed to the selectors of the decoder's
    /// events unless one of them is anonymous.
    pub fn filter(&self, address: Address) -> Filter {
        let filter = Filter::new().address(address);
        if self.events.iter().any(|e| e.anonymous) {
            return filter;
        }

        let selectors: Vec<B256> = self.events.iter().map(Event::selector).collect();
        filter.event_signature(selectors)
    }

    /// Decode one record.
    ///
    /// `Ok(None)` means the record belongs to an event outside the decoder's
    /// set and should be ignored.
    pub fn decode(&self, record: &LogRecord) -> Result<Option<DecodedEvent>, DecodeError> {
        let topic0 = record.topics.first();
        let mut last_error = None;

        for event in &self.events {
            if !event.anonymous && topic0 != Some(&event.selector()) {
                continue;
            }

            match event.decode_log_parts(record.topics.iter().copied(), &record.data) {
                Ok(decoded) => {
                    return Ok(Some(assemble(event, decoded, record)));
                }
                Err(e) => {
                    last_error = Some(DecodeError::Data {
                        event: event.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

fn assemble(
    event: &Event,
    decoded: alloy::dyn_abi::DecodedEvent,
    record: &LogRecord,
) -> DecodedEvent {
    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();

    let args = event
        .inputs
        .iter()
        .filter_map(|input| {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            }?;
            Some(EventArg {
                name: input.name.clone(),
                value,
            })
        })
        .collect();

    DecodedEvent {
        name: event.name.clone(),
        address: record.address,
        transaction_hash: record.transaction_hash,
        block_number: record.block_number,
        args,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blockchain::types::{GIFT_CARD_PAYED, NODE_MANAGER_FUJI};
    use alloy::primitives::U256;

    pub(crate) fn decoder() -> EventDecoder {
        EventDecoder::from_json(NODE_MANAGER_ABI, &[GIFT_CARD_PAYED]).unwrap()
    }

    pub(crate) fn contract() -> Address {
        NODE_MANAGER_FUJI.parse().unwrap()
    }

    /// A well-formed GiftCardPayed record.
    pub(crate) fn gift_card_record(intent_id: &str, amount: u64, tx: u8) -> LogRecord {
        let event = decoder().events()[0].clone();
        let data = DynSolValue::Tuple(vec![
            DynSolValue::Address(Address::repeat_byte(0x11)),
            DynSolValue::Uint(U256::from(amount), 256),
            DynSolValue::String(intent_id.to_string()),
        ])
        .abi_encode_params();

        LogRecord {
            address: contract(),
            topics: vec![event.selector()],
            data: data.into(),
            transaction_hash: Some(B256::repeat_byte(tx)),
            block_number: Some(1_000 + tx as u64),
        }
    }

    /// A record carrying the GiftCardPayed selector but an undecodable body.
    pub(crate) fn malformed_record(tx: u8) -> LogRecord {
        let event = decoder().events()[0].clone();
        LogRecord {
            address: contract(),
            topics: vec![event.selector()],
            data: Bytes::from_static(&[0xde, 0xad, 0xbe]),
            transaction_hash: Some(B256::repeat_byte(tx)),
            block_number: None,
        }
    }

    #[test]
    fn bundled_abi_contains_payment_event() {
        let decoder = decoder();
        assert_eq!(decoder.events().len(), 1);
        assert_eq!(
            decoder.events()[0].signature(),
            "GiftCardPayed(address,uint256,string)"
        );
    }

    #[test]
    fn decodes_gift_card_event_in_declaration_order() {
        let record = gift_card_record("intent-42", 5_000, 7);
        let event = decoder().decode(&record).unwrap().expect("event");

        assert_eq!(event.name, GIFT_CARD_PAYED);
        assert_eq!(event.block_number, Some(1_007));
        assert_eq!(
            event.arg("payer"),
            Some(&DynSolValue::Address(Address::repeat_byte(0x11)))
        );
        assert_eq!(
            event.arg_at(1),
            Some(&DynSolValue::Uint(U256::from(5_000u64), 256))
        );
        assert_eq!(
            event.arg("intentId"),
            Some(&DynSolValue::String("intent-42".to_string()))
        );
    }

    #[test]
    fn merges_indexed_and_body_arguments() {
        let decoder = EventDecoder::from_json(NODE_MANAGER_ABI, &["NodeCreated"]).unwrap();
        let event = decoder.events()[0].clone();
        let owner = Address::repeat_byte(0x22);

        let data = DynSolValue::Tuple(vec![
            DynSolValue::String("node-9".to_string()),
            DynSolValue::Uint(U256::from(3u8), 8),
        ])
        .abi_encode_params();

        let record = LogRecord {
            address: contract(),
            topics: vec![event.selector(), owner.into_word()],
            data: data.into(),
            transaction_hash: None,
            block_number: None,
        };

        let decoded = decoder.decode(&record).unwrap().expect("event");
        let names: Vec<_> = decoded.args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["owner", "nodeId", "tier"]);
        assert_eq!(decoded.arg("owner"), Some(&DynSolValue::Address(owner)));
    }

    #[test]
    fn unrelated_selector_is_ignored() {
        let mut record = gift_card_record("x", 1, 1);
        record.topics[0] = B256::repeat_byte(0x99);
        assert_eq!(decoder().decode(&record), Ok(None));

        record.topics.clear();
        assert_eq!(decoder().decode(&record), Ok(None));
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = decoder().decode(&malformed_record(3)).unwrap_err();
        assert!(matches!(err, DecodeError::Data { ref event, .. } if event == GIFT_CARD_PAYED));
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let err = EventDecoder::from_json(NODE_MANAGER_ABI, &["Nope"]).unwrap_err();
        assert_eq!(err, DecodeError::UnknownEvent("Nope".to_string()));

        let empty: [&str; 0] = [];
        assert_eq!(
            EventDecoder::from_json(NODE_MANAGER_ABI, &empty).unwrap_err(),
            DecodeError::NoEvents
        );
    }

    #[test]
    fn invalid_abi_is_rejected() {
        assert!(matches!(
            EventDecoder::from_json("{not json", &[GIFT_CARD_PAYED]),
            Err(DecodeError::InvalidAbi(_))
        ));
    }

    #[test]
    fn filter_targets_contract_and_selectors() {
        let decoder = decoder();
        let filter = decoder.filter(contract());

        assert!(filter.address.matches(&contract()));
        assert!(filter.topics[0].matches(&decoder.events()[0].selector()));
        assert!(!filter.topics[0].matches(&B256::repeat_byte(0x99)));
    }
}
