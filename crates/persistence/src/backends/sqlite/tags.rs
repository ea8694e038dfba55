//! Extended query tag registry and data partitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::core::ExtendedQueryTagStore;
use crate::error::{
    BackendError, QueryError, ResourceError, StorageError, StorageResult, ValidationError,
};
use crate::query::{
    AddExtendedQueryTagEntry, ExtendedQueryTagDataType, ExtendedQueryTagStatus,
    ExtendedQueryTagStoreEntry, QueryStatus, QueryTagLevel,
};
use crate::types::{PartitionEntry, PartitionKey, canonical_tag_path, parse_tag_path, parse_vr};

use super::SqliteIndexStore;
use super::query::SqlTableType;

const ENTRY_COLUMNS: &str =
    "TagKey, TagPath, TagVR, TagPrivateCreator, TagLevel, TagStatus, QueryStatus, ErrorCount";

type EntryRow = (i32, String, String, Option<String>, i32, i32, i32, i32);

fn read_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn to_entry(row: EntryRow) -> StorageResult<ExtendedQueryTagStoreEntry> {
    let (key, path, vr, private_creator, level, status, query_status, error_count) = row;
    let corrupt = |what: &str, value: i32| {
        StorageError::Backend(BackendError::SerializationError {
            message: format!("invalid {} {} for tag {}", what, value, path),
        })
    };
    Ok(ExtendedQueryTagStoreEntry {
        level: QueryTagLevel::from_i32(level).ok_or_else(|| corrupt("level", level))?,
        status: ExtendedQueryTagStatus::from_i32(status).ok_or_else(|| corrupt("status", status))?,
        query_status: if query_status == QueryStatus::Disabled as i32 {
            QueryStatus::Disabled
        } else {
            QueryStatus::Enabled
        },
        key,
        vr,
        private_creator,
        error_count,
        path,
    })
}

fn tag_not_found(path: &str) -> StorageError {
    StorageError::Resource(ResourceError::NotFound {
        kind: "extended query tag".to_string(),
        id: path.to_string(),
    })
}

/// Canonicalizes a tag path, rejecting anything that is not eight hex digits.
fn normalize_path(path: &str) -> Result<String, QueryError> {
    parse_tag_path(path)
        .map(canonical_tag_path)
        .ok_or_else(|| QueryError::UnknownQueryTag {
            tag: path.to_string(),
        })
}

fn read_entry(conn: &Connection, path: &str) -> StorageResult<ExtendedQueryTagStoreEntry> {
    let row = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM ExtendedQueryTag WHERE TagPath = ?1"),
            [path],
            read_entry_row,
        )
        .optional()?;
    row.map(to_entry).unwrap_or_else(|| Err(tag_not_found(path)))
}

#[async_trait]
impl ExtendedQueryTagStore for SqliteIndexStore {
    async fn get_extended_query_tags(
        &self,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<ExtendedQueryTagStoreEntry>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ExtendedQueryTag ORDER BY TagKey LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(
            params![
                i64::try_from(limit).unwrap_or(i64::MAX),
                i64::try_from(offset).unwrap_or(i64::MAX)
            ],
            read_entry_row,
        )?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(to_entry(row?)?);
        }
        Ok(entries)
    }

    async fn add_extended_query_tags(
        &self,
        entries: &[AddExtendedQueryTagEntry],
    ) -> StorageResult<Vec<ExtendedQueryTagStoreEntry>> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let mut paths = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = normalize_path(&entry.path)?;
            let indexable = parse_vr(&entry.vr).and_then(ExtendedQueryTagDataType::from_vr);
            if indexable.is_none() {
                return Err(QueryError::InvalidValue {
                    tag: path,
                    value: entry.vr.clone(),
                    message: "value representation cannot be indexed".to_string(),
                }
                .into());
            }

            let exists: Option<i32> = tx
                .query_row(
                    "SELECT TagKey FROM ExtendedQueryTag WHERE TagPath = ?1",
                    [&path],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() || paths.contains(&path) {
                return Err(StorageError::Resource(ResourceError::AlreadyExists {
                    kind: "extended query tag".to_string(),
                    id: path,
                }));
            }

            tx.execute(
                "INSERT INTO ExtendedQueryTag \
                 (TagPath, TagVR, TagPrivateCreator, TagLevel, TagStatus, QueryStatus, ErrorCount) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![
                    path,
                    entry.vr.to_uppercase(),
                    entry.private_creator,
                    entry.level.as_i32(),
                    ExtendedQueryTagStatus::Adding as i32,
                    QueryStatus::Enabled as i32
                ],
            )?;
            paths.push(path);
        }

        let mut added = Vec::with_capacity(paths.len());
        for path in &paths {
            added.push(read_entry(&tx, path)?);
        }
        tx.commit()?;

        tracing::info!(count = added.len(), "Added extended query tags");
        Ok(added)
    }

    async fn update_extended_query_tag_status(
        &self,
        path: &str,
        status: ExtendedQueryTagStatus,
    ) -> StorageResult<ExtendedQueryTagStoreEntry> {
        let path = normalize_path(path)?;
        let conn = self.get_connection()?;
        let updated = conn.execute(
            "UPDATE ExtendedQueryTag SET TagStatus = ?1 WHERE TagPath = ?2",
            params![status as i32, path],
        )?;
        if updated == 0 {
            return Err(tag_not_found(&path));
        }
        read_entry(&conn, &path)
    }

    async fn update_extended_query_tag_query_status(
        &self,
        path: &str,
        query_status: QueryStatus,
    ) -> StorageResult<ExtendedQueryTagStoreEntry> {
        let path = normalize_path(path)?;
        let conn = self.get_connection()?;
        let updated = conn.execute(
            "UPDATE ExtendedQueryTag SET QueryStatus = ?1 WHERE TagPath = ?2",
            params![query_status as i32, path],
        )?;
        if updated == 0 {
            return Err(tag_not_found(&path));
        }
        read_entry(&conn, &path)
    }

    async fn delete_extended_query_tag(&self, path: &str) -> StorageResult<()> {
        let path = normalize_path(path)?;
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let entry = read_entry(&tx, &path)?;
        if let Some(data_type) = parse_vr(&entry.vr).and_then(ExtendedQueryTagDataType::from_vr) {
            let table = SqlTableType::for_data_type(data_type).table_name();
            tx.execute(&format!("DELETE FROM {table} WHERE TagKey = ?1"), [entry.key])?;
        }
        tx.execute("DELETE FROM ExtendedQueryTag WHERE TagKey = ?1", [entry.key])?;
        tx.commit()?;

        tracing::info!(path = %path, "Deleted extended query tag");
        Ok(())
    }
}

impl SqliteIndexStore {
    fn require_partitions(&self) -> StorageResult<()> {
        if !self.supports_partitions() {
            return Err(ValidationError::FeatureDisabled {
                feature: "data partitions".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Lists data partitions ordered by key.
    pub async fn get_partitions(&self) -> StorageResult<Vec<PartitionEntry>> {
        self.require_partitions()?;
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT PartitionKey, PartitionName, CreatedDate FROM DataPartition \
             ORDER BY PartitionKey",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut partitions = Vec::new();
        for row in rows {
            let (key, name, created) = row?;
            partitions.push(to_partition(key, name, &created)?);
        }
        Ok(partitions)
    }

    /// Looks up a partition by name.
    pub async fn get_partition(&self, name: &str) -> StorageResult<PartitionEntry> {
        self.require_partitions()?;
        let conn = self.get_connection()?;
        let row = conn
            .query_row(
                "SELECT PartitionKey, PartitionName, CreatedDate FROM DataPartition \
                 WHERE PartitionName = ?1",
                [name],
                |row| {
                    Ok((
                        row.get::<_, i32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((key, name, created)) => to_partition(key, name, &created),
            None => Err(StorageError::Resource(ResourceError::NotFound {
                kind: "partition".to_string(),
                id: name.to_string(),
            })),
        }
    }

    /// Registers a partition under the next free key.
    pub async fn add_partition(&self, name: &str) -> StorageResult<PartitionEntry> {
        self.require_partitions()?;
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let exists: Option<i32> = tx
            .query_row(
                "SELECT PartitionKey FROM DataPartition WHERE PartitionName = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StorageError::Resource(ResourceError::AlreadyExists {
                kind: "partition".to_string(),
                id: name.to_string(),
            }));
        }

        let next: i32 = tx.query_row(
            "SELECT COALESCE(MAX(PartitionKey), 0) + 1 FROM DataPartition",
            [],
            |row| row.get(0),
        )?;
        let entry = PartitionEntry::new(PartitionKey::new(next)?, name);
        tx.execute(
            "INSERT INTO DataPartition (PartitionKey, PartitionName, CreatedDate) \
             VALUES (?1, ?2, ?3)",
            params![next, entry.name, entry.created.to_rfc3339()],
        )?;
        tx.commit()?;

        tracing::info!(partition = %entry.key, name = %entry.name, "Added data partition");
        Ok(entry)
    }
}

fn to_partition(key: i32, name: String, created: &str) -> StorageResult<PartitionEntry> {
    let created = DateTime::parse_from_rfc3339(created)
        .map_err(|e| {
            StorageError::Backend(BackendError::SerializationError {
                message: format!("Failed to parse CreatedDate: {}", e),
            })
        })?
        .with_timezone(&Utc);
    Ok(PartitionEntry {
        key: PartitionKey::new(key)?,
        name,
        created,
    })
}
