//! Native binary wire codec for history and memo payloads.
//!
//! The binary format handles exactly three value kinds: a history-event batch
//! (framed as a [`History`] envelope), a single history event, and a memo.
//! Other kinds are unrepresentable by construction.

use crate::types::{History, HistoryEvent, Memo};

/// Value kinds understood by the binary codec.
#[derive(Clone, Copy, Debug)]
pub enum BinaryValue<'a> {
    EventBatch(&'a [HistoryEvent]),
    Event(&'a HistoryEvent),
    Memo(&'a Memo),
}

/// Failure while encoding or decoding the binary wire format.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode: {0}")]
    Encode(String),
    #[error("decode: {0}")]
    Decode(String),
}

/// Binary encoder over the native wire format.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryEncoder;

impl BinaryEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, value: BinaryValue<'_>) -> Result<Vec<u8>, CodecError> {
        let encoded = match value {
            BinaryValue::EventBatch(events) => bincode::serialize(&History {
                events: events.to_vec(),
            }),
            BinaryValue::Event(event) => bincode::serialize(event),
            BinaryValue::Memo(memo) => bincode::serialize(memo),
        };
        encoded.map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn decode_event_batch(&self, data: &[u8]) -> Result<Vec<HistoryEvent>, CodecError> {
        let history: History =
            bincode::deserialize(data).map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(history.events)
    }

    pub fn decode_event(&self, data: &[u8]) -> Result<HistoryEvent, CodecError> {
        bincode::deserialize(data).map_err(|e| CodecError::Decode(e.to_string()))
    }

    pub fn decode_memo(&self, data: &[u8]) -> Result<Memo, CodecError> {
        bincode::deserialize(data).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
