//! Instance index, listing and query operations.

use async_trait::async_trait;
use dicom::dictionary_std::tags;
use rusqlite::{OptionalExtension, Transaction, params_from_iter};

use crate::core::{IndexStore, InstanceStore, QueryStore};
use crate::error::{ResourceError, StorageError, StorageResult};
use crate::query::{
    BaseQueryExpression, ExtendedQueryTagDataType, ExtendedQueryTagStatus, QueryTag,
    QueryTagLevel,
};
use crate::types::{
    DicomDataset, OffsetCursor, Page, PartitionKey, VersionedInstanceIdentifier,
};

use super::SqliteIndexStore;
use super::functions::person_name_words;
use super::query::{SqlFragment, SqlParam, SqlQueryGenerator, SqlTableType, format_sql_date};

/// Instance rows move from Creating to Created when indexing ends.
const STATUS_CREATING: i64 = 0;
const STATUS_CREATED: i64 = 1;

/// Keys of the rows an instance is indexed under.
#[derive(Debug, Clone, Copy)]
struct IndexKeys {
    study: i64,
    series: i64,
    instance: i64,
}

impl SqliteIndexStore {
    /// Partition written to the index. Schema version 1 has a single partition.
    fn effective_partition(&self, partition_key: PartitionKey) -> PartitionKey {
        if self.supports_partitions() {
            partition_key
        } else {
            PartitionKey::DEFAULT
        }
    }

    /// Appends `AND {alias}PartitionKey = ?N` when the schema is partitioned.
    fn push_partition_filter(
        &self,
        fragment: &mut SqlFragment,
        column: &str,
        partition_key: PartitionKey,
    ) {
        if self.supports_partitions() {
            let p = fragment.add_param(SqlParam::integer(partition_key.value() as i64));
            fragment.push_str(&format!(" AND {column} = {p}"));
        }
    }

    fn list_instances(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        series_instance_uid: Option<&str>,
        sop_instance_uid: Option<&str>,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>> {
        let mut fragment = SqlFragment::new(
            "SELECT StudyInstanceUid, SeriesInstanceUid, SopInstanceUid, Watermark \
             FROM Instance WHERE Status = ",
        );
        let status = fragment.add_param(SqlParam::integer(STATUS_CREATED));
        fragment.push_str(&status);
        let study = fragment.add_param(SqlParam::string(study_instance_uid));
        fragment.push_str(&format!(" AND StudyInstanceUid = {study}"));
        if let Some(series) = series_instance_uid {
            let p = fragment.add_param(SqlParam::string(series));
            fragment.push_str(&format!(" AND SeriesInstanceUid = {p}"));
        }
        if let Some(sop) = sop_instance_uid {
            let p = fragment.add_param(SqlParam::string(sop));
            fragment.push_str(&format!(" AND SopInstanceUid = {p}"));
        }
        self.push_partition_filter(&mut fragment, "PartitionKey", partition_key);
        fragment.push_str(" ORDER BY Watermark");

        self.read_identifiers(&fragment, partition_key)
    }

    /// Runs a statement whose first four columns are the three UIDs and the
    /// watermark.
    fn read_identifiers(
        &self,
        fragment: &SqlFragment,
        partition_key: PartitionKey,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>> {
        let conn = self.get_connection()?;
        let partition_key = self.effective_partition(partition_key);

        let mut stmt = conn.prepare(&fragment.sql)?;
        let rows = stmt.query_map(params_from_iter(fragment.params.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut identifiers = Vec::new();
        for row in rows {
            let (study, series, sop, watermark) = row?;
            identifiers.push(VersionedInstanceIdentifier::new(
                study,
                series,
                sop,
                watermark,
                partition_key,
            )?);
        }
        Ok(identifiers)
    }

    fn upsert_study(
        &self,
        tx: &Transaction<'_>,
        partition_key: PartitionKey,
        dataset: &DicomDataset,
        study_instance_uid: &str,
    ) -> StorageResult<i64> {
        let patient_name = dataset.person_name(tags::PATIENT_NAME);
        let referring_physician = dataset.person_name(tags::REFERRING_PHYSICIAN_NAME);
        let attributes = vec![
            opt_string(dataset.string(tags::PATIENT_ID)),
            opt_string(patient_name),
            opt_string(patient_name.map(person_name_words).as_deref()),
            opt_string(referring_physician),
            opt_string(referring_physician.map(person_name_words).as_deref()),
            opt_date(dataset, tags::STUDY_DATE),
            opt_string(dataset.string(tags::STUDY_DESCRIPTION)),
            opt_string(dataset.string(tags::ACCESSION_NUMBER)),
            opt_date(dataset, tags::PATIENT_BIRTH_DATE),
        ];

        let mut lookup = SqlFragment::new("SELECT StudyKey FROM Study WHERE StudyInstanceUid = ?1");
        lookup.params.push(SqlParam::string(study_instance_uid));
        self.push_partition_filter(&mut lookup, "PartitionKey", partition_key);

        let existing: Option<i64> = tx
            .query_row(&lookup.sql, params_from_iter(lookup.params.iter()), |row| {
                row.get(0)
            })
            .optional()?;

        if let Some(study_key) = existing {
            let mut params = attributes;
            params.push(SqlParam::integer(study_key));
            tx.execute(
                "UPDATE Study SET PatientId = ?1, PatientName = ?2, PatientNameWords = ?3, \
                 ReferringPhysicianName = ?4, ReferringPhysicianNameWords = ?5, \
                 StudyDate = ?6, StudyDescription = ?7, AccessionNumber = ?8, \
                 PatientBirthDate = ?9 WHERE StudyKey = ?10",
                params_from_iter(params.iter()),
            )?;
            return Ok(study_key);
        }

        let mut params = vec![SqlParam::string(study_instance_uid)];
        params.extend(attributes);
        let mut columns = "StudyInstanceUid, PatientId, PatientName, PatientNameWords, \
                           ReferringPhysicianName, ReferringPhysicianNameWords, StudyDate, \
                           StudyDescription, AccessionNumber, PatientBirthDate"
            .to_string();
        if self.supports_partitions() {
            columns.push_str(", PartitionKey");
            params.push(SqlParam::integer(partition_key.value() as i64));
        }
        tx.execute(
            &format!(
                "INSERT INTO Study ({columns}) VALUES ({})",
                placeholders(params.len())
            ),
            params_from_iter(params.iter()),
        )?;
        Ok(tx.last_insert_rowid())
    }

    fn upsert_series(
        &self,
        tx: &Transaction<'_>,
        partition_key: PartitionKey,
        study_key: i64,
        dataset: &DicomDataset,
        series_instance_uid: &str,
    ) -> StorageResult<i64> {
        let attributes = vec![
            opt_string(dataset.string(tags::MODALITY)),
            opt_date(dataset, tags::PERFORMED_PROCEDURE_STEP_START_DATE),
            opt_string(dataset.string(tags::MANUFACTURER_MODEL_NAME)),
        ];

        let existing: Option<i64> = tx
            .query_row(
                "SELECT SeriesKey FROM Series WHERE StudyKey = ?1 AND SeriesInstanceUid = ?2",
                rusqlite::params![study_key, series_instance_uid],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(series_key) = existing {
            let mut params = attributes;
            params.push(SqlParam::integer(series_key));
            tx.execute(
                "UPDATE Series SET Modality = ?1, PerformedProcedureStepStartDate = ?2, \
                 ManufacturerModelName = ?3 WHERE SeriesKey = ?4",
                params_from_iter(params.iter()),
            )?;
            return Ok(series_key);
        }

        let mut params = vec![
            SqlParam::integer(study_key),
            SqlParam::string(series_instance_uid),
        ];
        params.extend(attributes);
        let mut columns = "StudyKey, SeriesInstanceUid, Modality, \
                           PerformedProcedureStepStartDate, ManufacturerModelName"
            .to_string();
        if self.supports_partitions() {
            columns.push_str(", PartitionKey");
            params.push(SqlParam::integer(partition_key.value() as i64));
        }
        tx.execute(
            &format!(
                "INSERT INTO Series ({columns}) VALUES ({})",
                placeholders(params.len())
            ),
            params_from_iter(params.iter()),
        )?;
        Ok(tx.last_insert_rowid())
    }

    /// Writes the values of extended tags present in the dataset. Study and
    /// series level values replace the previous value for the same parent.
    fn index_extended_values(
        &self,
        tx: &Transaction<'_>,
        partition_key: PartitionKey,
        keys: IndexKeys,
        watermark: i64,
        dataset: &DicomDataset,
        query_tags: &[QueryTag],
    ) -> StorageResult<()> {
        for tag in query_tags {
            let Some(entry) = tag.extended_entry() else {
                continue;
            };
            if entry.status == ExtendedQueryTagStatus::Deleting {
                continue;
            }
            let Some(data_type) = tag.data_type() else {
                continue;
            };
            let Some(values) = extended_value(dataset, tag, data_type) else {
                continue;
            };

            let series_key = (tag.level() != QueryTagLevel::Study).then_some(keys.series);
            let instance_key = (tag.level() == QueryTagLevel::Instance).then_some(keys.instance);
            let table = SqlTableType::for_data_type(data_type).table_name();

            if tag.level() != QueryTagLevel::Instance {
                tx.execute(
                    &format!(
                        "DELETE FROM {table} WHERE TagKey = ?1 AND StudyKey = ?2 \
                         AND SeriesKey IS ?3 AND InstanceKey IS ?4"
                    ),
                    rusqlite::params![entry.key, keys.study, series_key, instance_key],
                )?;
            }

            let mut columns = "TagKey, TagValue".to_string();
            let mut params = vec![SqlParam::integer(entry.key as i64), values.0];
            if let Some(words) = values.1 {
                columns.push_str(", TagValueWords");
                params.push(SqlParam::string(words));
            }
            columns.push_str(", StudyKey, SeriesKey, InstanceKey, Watermark");
            params.extend([
                SqlParam::integer(keys.study),
                series_key.map_or(SqlParam::Null, SqlParam::integer),
                instance_key.map_or(SqlParam::Null, SqlParam::integer),
                SqlParam::integer(watermark),
            ]);
            if self.supports_partitions() {
                columns.push_str(", PartitionKey");
                params.push(SqlParam::integer(partition_key.value() as i64));
            }

            tx.execute(
                &format!(
                    "INSERT INTO {table} ({columns}) VALUES ({})",
                    placeholders(params.len())
                ),
                params_from_iter(params.iter()),
            )?;
        }
        Ok(())
    }

    /// Removes the rows of one extended value table scoped by a key column.
    fn delete_extended_values(
        tx: &Transaction<'_>,
        column: &str,
        key: i64,
    ) -> StorageResult<()> {
        for data_type in [
            ExtendedQueryTagDataType::String,
            ExtendedQueryTagDataType::Long,
            ExtendedQueryTagDataType::Double,
            ExtendedQueryTagDataType::DateTime,
            ExtendedQueryTagDataType::PersonName,
        ] {
            let table = SqlTableType::for_data_type(data_type).table_name();
            tx.execute(
                &format!("DELETE FROM {table} WHERE {column} = ?1"),
                [key],
            )?;
        }
        Ok(())
    }
}

fn opt_string(value: Option<&str>) -> SqlParam {
    value.map_or(SqlParam::Null, SqlParam::string)
}

fn opt_date(dataset: &DicomDataset, tag: dicom::core::Tag) -> SqlParam {
    dataset
        .date(tag)
        .map_or(SqlParam::Null, |d| SqlParam::string(format_sql_date(d)))
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The stored value of an extended tag and, for person names, its words.
fn extended_value(
    dataset: &DicomDataset,
    tag: &QueryTag,
    data_type: ExtendedQueryTagDataType,
) -> Option<(SqlParam, Option<String>)> {
    let tag = tag.tag();
    match data_type {
        ExtendedQueryTagDataType::String => {
            dataset.string(tag).map(|v| (SqlParam::string(v), None))
        }
        ExtendedQueryTagDataType::Long => dataset.long(tag).map(|v| (SqlParam::integer(v), None)),
        ExtendedQueryTagDataType::Double => {
            dataset.double(tag).map(|v| (SqlParam::float(v), None))
        }
        ExtendedQueryTagDataType::DateTime => dataset
            .date(tag)
            .map(|d| (SqlParam::string(format_sql_date(d)), None)),
        ExtendedQueryTagDataType::PersonName => dataset
            .person_name(tag)
            .map(|v| (SqlParam::string(v), Some(person_name_words(v)))),
    }
}

#[async_trait]
impl InstanceStore for SqliteIndexStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn get_instance_identifiers_in_study(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>> {
        self.list_instances(partition_key, study_instance_uid, None, None)
    }

    async fn get_instance_identifiers_in_series(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        series_instance_uid: &str,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>> {
        self.list_instances(
            partition_key,
            study_instance_uid,
            Some(series_instance_uid),
            None,
        )
    }

    async fn get_instance_identifier(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        series_instance_uid: &str,
        sop_instance_uid: &str,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>> {
        self.list_instances(
            partition_key,
            study_instance_uid,
            Some(series_instance_uid),
            Some(sop_instance_uid),
        )
    }
}

#[async_trait]
impl QueryStore for SqliteIndexStore {
    async fn query(
        &self,
        partition_key: PartitionKey,
        expression: &BaseQueryExpression,
        continuation_token: Option<&str>,
    ) -> StorageResult<Page<VersionedInstanceIdentifier>> {
        let limit = expression.evaluated_limit(self.limits()) as u64;
        let skipped = match continuation_token {
            Some(token) => OffsetCursor::decode(token)?.offset(),
            None => 0,
        };
        let offset = expression.offset() as u64 + skipped;

        // One extra row tells whether another page exists.
        let fragment = SqlQueryGenerator::new(expression, partition_key, self.schema_version())
            .generate(limit + 1, offset)?;
        tracing::debug!(
            conditions = expression.filter_conditions().len(),
            params = fragment.params.len(),
            "Executing index query"
        );

        let mut items = self.read_identifiers(&fragment, partition_key)?;
        if items.len() as u64 > limit {
            items.truncate(limit as usize);
            let next = OffsetCursor::new(skipped + limit).encode();
            return Ok(Page::new(items, Some(next)));
        }
        Ok(Page::last(items))
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn begin_create_instance_index(
        &self,
        partition_key: PartitionKey,
        dataset: &DicomDataset,
        query_tags: &[QueryTag],
    ) -> StorageResult<i64> {
        let partition_key = self.effective_partition(partition_key);
        let id = dataset.to_versioned_identifier(0, partition_key)?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let mut lookup = SqlFragment::new(
            "SELECT COUNT(*) FROM Instance \
             WHERE StudyInstanceUid = ?1 AND SeriesInstanceUid = ?2 AND SopInstanceUid = ?3",
        );
        lookup.params.extend([
            SqlParam::string(&id.study_instance_uid),
            SqlParam::string(&id.series_instance_uid),
            SqlParam::string(&id.sop_instance_uid),
        ]);
        self.push_partition_filter(&mut lookup, "PartitionKey", partition_key);
        let existing: i64 =
            tx.query_row(&lookup.sql, params_from_iter(lookup.params.iter()), |row| {
                row.get(0)
            })?;
        if existing > 0 {
            return Err(StorageError::Resource(ResourceError::AlreadyExists {
                kind: "instance".to_string(),
                id: id.instance().to_string(),
            }));
        }

        let study = self.upsert_study(&tx, partition_key, dataset, &id.study_instance_uid)?;
        let series =
            self.upsert_series(&tx, partition_key, study, dataset, &id.series_instance_uid)?;

        // Watermarks follow the instance key sequence, which never reuses
        // values even after deletes.
        let watermark: i64 = tx.query_row(
            "SELECT COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'Instance'), 0) + 1",
            [],
            |row| row.get(0),
        )?;

        let mut columns = "InstanceKey, StudyKey, SeriesKey, StudyInstanceUid, \
                           SeriesInstanceUid, SopInstanceUid, Watermark, Status, CreatedDate"
            .to_string();
        let mut params = vec![
            SqlParam::integer(watermark),
            SqlParam::integer(study),
            SqlParam::integer(series),
            SqlParam::string(&id.study_instance_uid),
            SqlParam::string(&id.series_instance_uid),
            SqlParam::string(&id.sop_instance_uid),
            SqlParam::integer(watermark),
            SqlParam::integer(STATUS_CREATING),
            SqlParam::string(chrono::Utc::now().to_rfc3339()),
        ];
        if self.supports_partitions() {
            columns.push_str(", PartitionKey");
            params.push(SqlParam::integer(partition_key.value() as i64));
        }
        tx.execute(
            &format!(
                "INSERT INTO Instance ({columns}) VALUES ({})",
                placeholders(params.len())
            ),
            params_from_iter(params.iter()),
        )?;

        let keys = IndexKeys {
            study,
            series,
            instance: watermark,
        };
        self.index_extended_values(&tx, partition_key, keys, watermark, dataset, query_tags)?;
        tx.commit()?;

        tracing::debug!(instance = %id.instance(), watermark, "Began instance index");
        Ok(watermark)
    }

    async fn end_create_instance_index(
        &self,
        partition_key: PartitionKey,
        dataset: &DicomDataset,
        watermark: i64,
    ) -> StorageResult<()> {
        let partition_key = self.effective_partition(partition_key);
        let id = dataset.to_versioned_identifier(watermark, partition_key)?;
        let conn = self.get_connection()?;

        let updated = conn.execute(
            "UPDATE Instance SET Status = ?1 WHERE Watermark = ?2 \
             AND StudyInstanceUid = ?3 AND SeriesInstanceUid = ?4 AND SopInstanceUid = ?5",
            rusqlite::params![
                STATUS_CREATED,
                watermark,
                id.study_instance_uid,
                id.series_instance_uid,
                id.sop_instance_uid
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::Resource(ResourceError::NotFound {
                kind: "instance".to_string(),
                id: id.to_string(),
            }));
        }
        Ok(())
    }

    async fn delete_instance_index(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let mut lookup = SqlFragment::new(
            "SELECT InstanceKey, StudyKey, SeriesKey FROM Instance \
             WHERE StudyInstanceUid = ?1 AND SeriesInstanceUid = ?2 \
             AND SopInstanceUid = ?3 AND Watermark = ?4",
        );
        lookup.params.extend([
            SqlParam::string(&identifier.study_instance_uid),
            SqlParam::string(&identifier.series_instance_uid),
            SqlParam::string(&identifier.sop_instance_uid),
            SqlParam::integer(identifier.version),
        ]);
        self.push_partition_filter(
            &mut lookup,
            "PartitionKey",
            self.effective_partition(identifier.partition_key),
        );

        let keys = tx
            .query_row(&lookup.sql, params_from_iter(lookup.params.iter()), |row| {
                Ok(IndexKeys {
                    instance: row.get(0)?,
                    study: row.get(1)?,
                    series: row.get(2)?,
                })
            })
            .optional()?;
        let Some(keys) = keys else {
            tracing::debug!(instance = %identifier, "Instance index already removed");
            return Ok(());
        };

        Self::delete_extended_values(&tx, "InstanceKey", keys.instance)?;
        tx.execute("DELETE FROM Instance WHERE InstanceKey = ?1", [keys.instance])?;

        let series_left: i64 = tx.query_row(
            "SELECT COUNT(*) FROM Instance WHERE SeriesKey = ?1",
            [keys.series],
            |row| row.get(0),
        )?;
        if series_left == 0 {
            Self::delete_extended_values(&tx, "SeriesKey", keys.series)?;
            tx.execute("DELETE FROM Series WHERE SeriesKey = ?1", [keys.series])?;
        }

        let study_left: i64 = tx.query_row(
            "SELECT COUNT(*) FROM Instance WHERE StudyKey = ?1",
            [keys.study],
            |row| row.get(0),
        )?;
        if study_left == 0 {
            Self::delete_extended_values(&tx, "StudyKey", keys.study)?;
            tx.execute("DELETE FROM Study WHERE StudyKey = ?1", [keys.study])?;
        }

        tx.commit()?;
        tracing::debug!(instance = %identifier, "Deleted instance index");
        Ok(())
    }
}
