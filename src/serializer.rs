//! Typed (de)serialization of history events and visibility memos.
//!
//! Serializers take a target encoding; deserializers read the encoding tag
//! stored on the blob. `Empty` and `Unknown` tags deserialize as JSON for
//! backward compatibility. `Gob` and any foreign tag are rejected.

use crate::codec::{BinaryEncoder, BinaryValue};
use crate::error::{Result, VisibilityError};
use crate::types::{DataBlob, EncodingType, HistoryEvent, Memo};

/// Stateless serializer shared by the persistence backends.
///
/// Safe for concurrent use from any number of threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Serializer {
    binary: BinaryEncoder,
}

impl Serializer {
    pub fn new() -> Self {
        Self {
            binary: BinaryEncoder::new(),
        }
    }

    /// Serializes a batch of history events.
    pub fn serialize_batch_events(
        &self,
        events: &[HistoryEvent],
        encoding: EncodingType,
    ) -> Result<DataBlob> {
        match encoding {
            EncodingType::ThriftRw => {
                let data = self
                    .binary
                    .encode(BinaryValue::EventBatch(events))
                    .map_err(|e| VisibilityError::Serialization(e.to_string()))?;
                Ok(DataBlob::new(data, EncodingType::ThriftRw))
            }
            EncodingType::Json | EncodingType::Empty | EncodingType::Unknown => {
                let data = serde_json::to_vec(events)
                    .map_err(|e| VisibilityError::Serialization(e.to_string()))?;
                Ok(DataBlob::new(data, EncodingType::Json))
            }
            other => Err(VisibilityError::UnknownEncoding(other.as_tag().to_string())),
        }
    }

    /// Deserializes a batch of history events; `None` yields an empty batch.
    pub fn deserialize_batch_events(&self, data: Option<&DataBlob>) -> Result<Vec<HistoryEvent>> {
        let Some(blob) = data else {
            return Ok(Vec::new());
        };
        match &blob.encoding {
            EncodingType::Json | EncodingType::Empty | EncodingType::Unknown => {
                if blob.data.is_empty() {
                    return Ok(Vec::new());
                }
                serde_json::from_slice(&blob.data)
                    .map_err(|e| deserialization_error("event batch", &blob.encoding, e))
            }
            EncodingType::ThriftRw => self
                .binary
                .decode_event_batch(&blob.data)
                .map_err(|e| deserialization_error("event batch", &blob.encoding, e)),
            other => Err(VisibilityError::UnknownEncoding(other.as_tag().to_string())),
        }
    }

    /// Serializes a single history event; `None` yields no blob.
    pub fn serialize_event(
        &self,
        event: Option<&HistoryEvent>,
        encoding: EncodingType,
    ) -> Result<Option<DataBlob>> {
        let Some(event) = event else {
            return Ok(None);
        };
        match encoding {
            EncodingType::ThriftRw => {
                let data = self
                    .binary
                    .encode(BinaryValue::Event(event))
                    .map_err(|e| VisibilityError::Serialization(e.to_string()))?;
                Ok(Some(DataBlob::new(data, EncodingType::ThriftRw)))
            }
            EncodingType::Json | EncodingType::Empty | EncodingType::Unknown => {
                let data = serde_json::to_vec(event)
                    .map_err(|e| VisibilityError::Serialization(e.to_string()))?;
                Ok(Some(DataBlob::new(data, EncodingType::Json)))
            }
            other => Err(VisibilityError::UnknownEncoding(other.as_tag().to_string())),
        }
    }

    /// Deserializes a single history event; `None` yields `None`.
    pub fn deserialize_event(&self, data: Option<&DataBlob>) -> Result<Option<HistoryEvent>> {
        let Some(blob) = data else {
            return Ok(None);
        };
        if blob.data.is_empty() {
            return Err(VisibilityError::Deserialization(
                "deserialize event: empty data".to_string(),
            ));
        }
        let event = match &blob.encoding {
            EncodingType::Json | EncodingType::Empty | EncodingType::Unknown => {
                serde_json::from_slice(&blob.data)
                    .map_err(|e| deserialization_error("event", &blob.encoding, e))?
            }
            EncodingType::ThriftRw => self
                .binary
                .decode_event(&blob.data)
                .map_err(|e| deserialization_error("event", &blob.encoding, e))?,
            other => {
                return Err(VisibilityError::UnknownEncoding(other.as_tag().to_string()));
            }
        };
        Ok(Some(event))
    }

    /// Serializes a visibility memo; `None` yields no blob.
    pub fn serialize_memo(
        &self,
        memo: Option<&Memo>,
        encoding: EncodingType,
    ) -> Result<Option<DataBlob>> {
        let Some(memo) = memo else {
            return Ok(None);
        };
        match encoding {
            EncodingType::ThriftRw => {
                let data = self
                    .binary
                    .encode(BinaryValue::Memo(memo))
                    .map_err(|e| VisibilityError::Serialization(e.to_string()))?;
                Ok(Some(DataBlob::new(data, EncodingType::ThriftRw)))
            }
            EncodingType::Json | EncodingType::Empty | EncodingType::Unknown => {
                let data = serde_json::to_vec(memo)
                    .map_err(|e| VisibilityError::Serialization(e.to_string()))?;
                Ok(Some(DataBlob::new(data, EncodingType::Json)))
            }
            other => Err(VisibilityError::UnknownEncoding(other.as_tag().to_string())),
        }
    }

    /// Deserializes a visibility memo; `None` yields `None`.
    pub fn deserialize_memo(&self, data: Option<&DataBlob>) -> Result<Option<Memo>> {
        let Some(blob) = data else {
            return Ok(None);
        };
        if blob.data.is_empty() {
            return Err(VisibilityError::Deserialization(
                "deserialize memo: empty data".to_string(),
            ));
        }
        let memo = match &blob.encoding {
            EncodingType::Json | EncodingType::Empty | EncodingType::Unknown => {
                serde_json::from_slice(&blob.data)
                    .map_err(|e| deserialization_error("memo", &blob.encoding, e))?
            }
            EncodingType::ThriftRw => self
                .binary
                .decode_memo(&blob.data)
                .map_err(|e| deserialization_error("memo", &blob.encoding, e))?,
            other => {
                return Err(VisibilityError::UnknownEncoding(other.as_tag().to_string()));
            }
        };
        Ok(Some(memo))
    }
}

fn deserialization_error(
    what: &str,
    encoding: &EncodingType,
    cause: impl std::fmt::Display,
) -> VisibilityError {
    VisibilityError::Deserialization(format!(
        "deserialize {what} encoding: \"{encoding}\", error: {cause}"
    ))
}
