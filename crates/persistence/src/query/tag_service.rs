//! Resolution of the queryable tag set.

use std::sync::Arc;

use crate::core::ExtendedQueryTagStore;
use crate::error::StorageResult;

use super::cache::AsyncCache;
use super::tag::{QueryTag, core_query_tags};

/// Provides the list of tags a query may filter on.
///
/// The list is the core tags followed by the registered extended tags, the
/// latter only when extended query tags are enabled. It is loaded once and
/// cached until [`invalidate`](Self::invalidate) is called, which callers
/// must do after adding or removing extended tags.
pub struct QueryTagService {
    store: Arc<dyn ExtendedQueryTagStore>,
    enable_extended_query_tags: bool,
    cache: AsyncCache<Vec<QueryTag>>,
}

impl QueryTagService {
    /// Creates a service over a tag store.
    pub fn new(store: Arc<dyn ExtendedQueryTagStore>, enable_extended_query_tags: bool) -> Self {
        Self {
            store,
            enable_extended_query_tags,
            cache: AsyncCache::new(),
        }
    }

    /// Returns the queryable tags, loading them on first use.
    pub async fn get_query_tags(&self) -> StorageResult<Arc<Vec<QueryTag>>> {
        self.cache
            .get_or_load(|| async {
                let mut tags = core_query_tags();
                if self.enable_extended_query_tags {
                    let extended = self.store.resolve_tags().await?;
                    tracing::debug!(count = extended.len(), "Loaded extended query tags");
                    tags.extend(extended);
                }
                Ok(tags)
            })
            .await
    }

    /// Drops the cached list.
    pub fn invalidate(&self) {
        tracing::debug!("Invalidated query tag cache");
        self.cache.invalidate();
    }

    /// Releases the cache. Later calls to [`get_query_tags`](Self::get_query_tags) fail.
    pub fn close(&self) {
        self.cache.close();
    }
}

impl std::fmt::Debug for QueryTagService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryTagService")
            .field("enable_extended_query_tags", &self.enable_extended_query_tags)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
