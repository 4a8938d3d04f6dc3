//! Opaque page-token codecs for paginated listings.
//!
//! Tokens are JSON on the wire so that a future field can be added without
//! breaking readers of older tokens; every field carries a serde default.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisibilityError};

/// Cursor for the search-index backend.
///
/// `from` drives offset paging while the result set fits the index's max
/// result window; past that, `(sort_time, tie_breaker)` drive search-after
/// paging. Both modes can occur within one paging session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPageToken {
    /// Offset into the result set.
    pub from: i32,
    /// `start_time` for open lists, `close_time` for closed lists.
    pub sort_time: i64,
    /// `run_id` of the last item of the previous page.
    pub tie_breaker: String,
}

impl SearchPageToken {
    /// Decodes a caller-supplied token; empty input is the first page.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(data).map_err(|e| {
            VisibilityError::BadRequest(format!("unable to deserialize page token: {e}"))
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            VisibilityError::BadRequest(format!("unable to serialize page token: {e}"))
        })
    }

    /// True when the token carries a search-after position.
    pub fn has_search_after(&self) -> bool {
        self.sort_time != 0 && !self.tie_breaker.is_empty()
    }
}

/// Native paging state of the columnar backend: the sort position of the
/// last row of the previous page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysetPageState {
    /// `close_time` for closed lists, `start_time` for open lists.
    pub sort_time: i64,
    pub run_id: String,
}

impl KeysetPageState {
    /// Decodes backend paging state; empty input means no resume position.
    pub fn decode(data: &[u8]) -> Result<Option<Self>> {
        if data.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(data).map(Some).map_err(|e| {
            VisibilityError::BadRequest(format!("unable to deserialize page token: {e}"))
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            VisibilityError::BadRequest(format!("unable to serialize page token: {e}"))
        })
    }
}
