//! Pagination types for query results.
//!
//! Both index backends page through matches with an opaque continuation
//! token. The document store hands back whatever token its container
//! produced. The SQL store encodes its next offset as an [`OffsetCursor`].

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// A page of query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,

    /// Token for the next page, absent on the last page.
    pub continuation_token: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page.
    pub fn new(items: Vec<T>, continuation_token: Option<String>) -> Self {
        Self {
            items,
            continuation_token,
        }
    }

    /// Creates a final page.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    /// Creates an empty final page.
    pub fn empty() -> Self {
        Self::last(Vec::new())
    }

    /// Returns true if another page can be requested.
    pub fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }

    /// Returns true if this page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Maps the items to a different type.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            continuation_token: self.continuation_token,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// An offset-based position in a result set.
///
/// Cursors are base64-encoded JSON, opaque to callers.
///
/// # Examples
///
/// ```
/// use dicom_persistence::types::OffsetCursor;
///
/// let cursor = OffsetCursor::new(200);
/// let decoded = OffsetCursor::decode(&cursor.encode()).unwrap();
/// assert_eq!(decoded.offset(), 200);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCursor {
    /// Cursor format version.
    version: u8,

    /// Rows to skip.
    offset: u64,
}

impl OffsetCursor {
    /// Creates a cursor at the given offset.
    pub fn new(offset: u64) -> Self {
        Self { version: 1, offset }
    }

    /// Returns the offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Encodes the cursor to an opaque string.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(&json)
    }

    /// Decodes a cursor from an opaque string.
    pub fn decode(s: &str) -> Result<Self, QueryError> {
        let invalid = || QueryError::InvalidValue {
            tag: "continuation".to_string(),
            value: s.to_string(),
            message: "malformed continuation token".to_string(),
        };
        let bytes = URL_SAFE_NO_PAD.decode(s).map_err(|_| invalid())?;
        serde_json::from_slice(&bytes).map_err(|_| invalid())
    }
}
