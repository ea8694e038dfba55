//! Document container abstraction and an in-memory implementation.

use std::cmp::Ordering;

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::RegexBuilder;
use serde_json::Value;

use crate::error::{QueryError, ResourceError, StorageError, StorageResult};
use crate::types::OffsetCursor;

use super::generator::{DocumentPredicate, DocumentQuery};

/// One page of a feed read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
    /// Documents on this page.
    pub items: Vec<Value>,
    /// Token for the next page, `None` on the last one.
    pub continuation: Option<String>,
}

/// A collection of JSON documents keyed by `id`.
///
/// This is the seam between [`DocumentStore`](super::DocumentStore) and a
/// concrete document database client.
#[async_trait]
pub trait DocumentContainer: Send + Sync {
    /// Runs a query and returns at most `max_item_count` documents.
    async fn query_items(
        &self,
        query: &DocumentQuery,
        continuation: Option<&str>,
        max_item_count: u32,
    ) -> StorageResult<FeedPage>;

    /// Point read by id.
    async fn read_item(&self, id: &str) -> StorageResult<Option<Value>>;

    /// Creates a document.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(AlreadyExists)` - If the id is taken
    async fn create_item(&self, item: Value) -> StorageResult<()>;

    /// Deletes a document, returning whether it existed.
    async fn delete_item(&self, id: &str) -> StorageResult<bool>;
}

/// Container kept in process memory, in insertion order.
///
/// Predicates are evaluated the way the query text reads: case-insensitive
/// unanchored regular expressions, inclusive ranges and exact equality.
#[derive(Debug, Default)]
pub struct InMemoryContainer {
    items: RwLock<Vec<Value>>,
}

impl InMemoryContainer {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

fn item_id(item: &Value) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::String(b)) => a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?),
        (Value::String(a), Value::Number(b)) => a.parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn parameter<'a>(query: &'a DocumentQuery, name: &str) -> StorageResult<&'a Value> {
    query.parameter(name).ok_or_else(|| {
        StorageError::Query(QueryError::InvalidValue {
            tag: name.to_string(),
            value: String::new(),
            message: "parameter is not bound".to_string(),
        })
    })
}

fn matches(
    query: &DocumentQuery,
    predicate: &DocumentPredicate,
    item: &Value,
) -> StorageResult<bool> {
    match predicate {
        DocumentPredicate::Equals { path, parameter: name } => {
            let expected = parameter(query, name)?;
            Ok(path
                .resolve(item)
                .and_then(|actual| compare(actual, expected))
                == Some(Ordering::Equal))
        }
        DocumentPredicate::Between {
            path,
            minimum,
            maximum,
        } => {
            let minimum = parameter(query, minimum)?;
            let maximum = parameter(query, maximum)?;
            Ok(path.resolve(item).is_some_and(|actual| {
                matches!(compare(actual, minimum), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(actual, maximum), Some(Ordering::Less | Ordering::Equal))
            }))
        }
        DocumentPredicate::RegexMatch { path, parameter: name } => {
            let pattern = parameter(query, name)?.as_str().unwrap_or_default();
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    StorageError::Query(QueryError::InvalidValue {
                        tag: name.to_string(),
                        value: pattern.to_string(),
                        message: e.to_string(),
                    })
                })?;
            Ok(path
                .resolve(item)
                .and_then(Value::as_str)
                .is_some_and(|actual| regex.is_match(actual)))
        }
    }
}

#[async_trait]
impl DocumentContainer for InMemoryContainer {
    async fn query_items(
        &self,
        query: &DocumentQuery,
        continuation: Option<&str>,
        max_item_count: u32,
    ) -> StorageResult<FeedPage> {
        let skip = match continuation {
            Some(token) => OffsetCursor::decode(token)?.offset(),
            None => query.offset,
        };

        let items = self.items.read();
        let mut matched = Vec::new();
        for item in items.iter() {
            let mut keep = true;
            for predicate in &query.predicates {
                if !matches(query, predicate, item)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                matched.push(item);
            }
        }

        let page: Vec<Value> = matched
            .iter()
            .skip(skip as usize)
            .take(max_item_count.max(1) as usize)
            .map(|item| (*item).clone())
            .collect();
        let consumed = skip + page.len() as u64;
        let continuation = (consumed < matched.len() as u64)
            .then(|| OffsetCursor::new(consumed).encode());

        Ok(FeedPage {
            items: page,
            continuation,
        })
    }

    async fn read_item(&self, id: &str) -> StorageResult<Option<Value>> {
        Ok(self
            .items
            .read()
            .iter()
            .find(|item| item_id(item) == Some(id))
            .cloned())
    }

    async fn create_item(&self, item: Value) -> StorageResult<()> {
        let id = item_id(&item)
            .ok_or_else(|| {
                StorageError::Query(QueryError::InvalidValue {
                    tag: "id".to_string(),
                    value: item.to_string(),
                    message: "documents require a string id".to_string(),
                })
            })?
            .to_string();

        let mut items = self.items.write();
        if items.iter().any(|existing| item_id(existing) == Some(id.as_str())) {
            return Err(StorageError::Resource(ResourceError::AlreadyExists {
                kind: "document".to_string(),
                id,
            }));
        }
        items.push(item);
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> StorageResult<bool> {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|item| item_id(item) != Some(id));
        Ok(items.len() != before)
    }
}
