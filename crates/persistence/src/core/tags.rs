//! Extended query tag store trait.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::query::{
    AddExtendedQueryTagEntry, ExtendedQueryTagStatus, ExtendedQueryTagStoreEntry, QueryStatus,
    QueryTag,
};

/// Registry of user-registered query tags.
///
/// Mutations do not refresh any cached tag lists. Callers that hold a
/// [`QueryTagService`](crate::query::QueryTagService) must invalidate it.
#[async_trait]
pub trait ExtendedQueryTagStore: Send + Sync {
    /// Lists registered tags ordered by key.
    async fn get_extended_query_tags(
        &self,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<ExtendedQueryTagStoreEntry>>;

    /// Registers tags in the `Adding` state and returns their entries.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(AlreadyExists)` - If a path is already registered
    async fn add_extended_query_tags(
        &self,
        entries: &[AddExtendedQueryTagEntry],
    ) -> StorageResult<Vec<ExtendedQueryTagStoreEntry>>;

    /// Moves a tag to another lifecycle state.
    async fn update_extended_query_tag_status(
        &self,
        path: &str,
        status: ExtendedQueryTagStatus,
    ) -> StorageResult<ExtendedQueryTagStoreEntry>;

    /// Enables or disables filtering on a tag.
    async fn update_extended_query_tag_query_status(
        &self,
        path: &str,
        query_status: QueryStatus,
    ) -> StorageResult<ExtendedQueryTagStoreEntry>;

    /// Removes a tag and its indexed values.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the path is not registered
    async fn delete_extended_query_tag(&self, path: &str) -> StorageResult<()>;

    /// Resolves every registered tag into a [`QueryTag`].
    ///
    /// Tags whose queries are disabled are left out.
    async fn resolve_tags(&self) -> StorageResult<Vec<QueryTag>> {
        let entries = self.get_extended_query_tags(usize::MAX, 0).await?;
        let mut tags = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.query_status == QueryStatus::Disabled {
                continue;
            }
            tags.push(QueryTag::from_extended(entry)?);
        }
        Ok(tags)
    }
}
