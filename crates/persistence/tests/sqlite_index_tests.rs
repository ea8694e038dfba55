//! SQLite index store integration tests.
//!
//! These tests index datasets through the public store traits and query
//! them back through the SQL generator.

mod common;

use dicom::core::VR;
use dicom::dictionary_std::tags;

use chrono::NaiveDate;
use common::*;
use dicom_persistence::backends::sqlite::SqliteIndexStore;
use dicom_persistence::config::{QueryLimits, SqliteIndexConfig};
use dicom_persistence::core::{
    ExtendedQueryTagStore, IndexStore, InstanceStore, QueryStore, resolve_instance_identifiers,
};
use dicom_persistence::error::{ResourceError, StorageError};
use dicom_persistence::query::{
    AddExtendedQueryTagEntry, BaseQueryExpression, ExtendedQueryTagStatus, QueryFilterCondition,
    QueryIncludeField, QueryParameters, QueryParser, QueryTagLevel, core_query_tags,
};
use dicom_persistence::types::PartitionKey;

const STUDY: &str = "1.2.840.1";

fn expression(limit: i32, conditions: Vec<QueryFilterCondition>) -> BaseQueryExpression {
    BaseQueryExpression::new(QueryIncludeField::Default, true, limit, 0, conditions)
}

async fn seeded_store() -> SqliteIndexStore {
    let store = sqlite_store();
    let fixtures = [
        InstanceFixture::new(STUDY, "1.2.840.1.1", "1.2.840.1.1.1")
            .with_study_date(2020, 9, 22)
            .with_patient_name("Doe^John")
            .with_modality("CT"),
        InstanceFixture::new(STUDY, "1.2.840.1.1", "1.2.840.1.1.2")
            .with_study_date(2020, 9, 22)
            .with_patient_name("Doe^John")
            .with_modality("CT"),
        InstanceFixture::new(STUDY, "1.2.840.1.2", "1.2.840.1.2.1")
            .with_study_date(2020, 9, 22)
            .with_patient_name("Doe^John")
            .with_modality("MR"),
        InstanceFixture::new("1.2.840.2", "1.2.840.2.1", "1.2.840.2.1.1")
            .with_study_date(2021, 3, 5)
            .with_patient_name("Roe^Jane")
            .with_modality("CT"),
    ];
    for fixture in &fixtures {
        index_instance(&store, PartitionKey::DEFAULT, &fixture.dataset(), &[]).await;
    }
    store
}

// ============================================================================
// Query Tests
// ============================================================================

#[tokio::test]
async fn test_date_range_query_through_parser() {
    let store = seeded_store().await;
    let parsed = QueryParser::new(core_query_tags())
        .parse(&QueryParameters {
            filters: vec![("StudyDate".into(), "20200101-20201231".into())],
            limit: 10,
            ..Default::default()
        })
        .unwrap();

    let page = store.query(PartitionKey::DEFAULT, &parsed, None).await.unwrap();
    assert_sops(
        &page.items,
        &["1.2.840.1.1.1", "1.2.840.1.1.2", "1.2.840.1.2.1"],
    );
    assert!(!page.has_more());
}

#[tokio::test]
async fn test_series_level_and_fuzzy_name_filters() {
    let store = seeded_store().await;
    let expr = expression(
        10,
        vec![
            QueryFilterCondition::StringSingleValue {
                tag: core_tag("Modality"),
                value: "CT".to_string(),
            },
            QueryFilterCondition::PersonNameFuzzy {
                tag: core_tag("PatientName"),
                value: "jo".to_string(),
            },
        ],
    );

    let page = store.query(PartitionKey::DEFAULT, &expr, None).await.unwrap();
    assert_sops(&page.items, &["1.2.840.1.1.1", "1.2.840.1.1.2"]);
}

#[tokio::test]
async fn test_limit_falls_back_to_default_and_pages() {
    let limits = QueryLimits {
        max_query_result_count: 3,
        default_query_result_count: 2,
    };
    let store = SqliteIndexStore::new(SqliteIndexConfig::default(), limits).unwrap();
    for i in 1..=5 {
        let fixture = InstanceFixture::new(STUDY, "1.2.840.1.1", &format!("1.2.840.1.1.{i}"));
        index_instance(&store, PartitionKey::DEFAULT, &fixture.dataset(), &[]).await;
    }

    // 5000 exceeds the maximum, so the default of 2 applies.
    let expr = expression(5000, Vec::new());
    let first = store.query(PartitionKey::DEFAULT, &expr, None).await.unwrap();
    assert_eq!(first.len(), 2);

    let second = store
        .query(PartitionKey::DEFAULT, &expr, first.continuation_token.as_deref())
        .await
        .unwrap();
    let third = store
        .query(PartitionKey::DEFAULT, &expr, second.continuation_token.as_deref())
        .await
        .unwrap();

    assert_sops(&second.items, &["1.2.840.1.1.3", "1.2.840.1.1.4"]);
    assert_sops(&third.items, &["1.2.840.1.1.5"]);
    assert!(!third.has_more());
}

#[tokio::test]
async fn test_filter_values_are_bound_not_interpolated() {
    let store = seeded_store().await;
    let expr = expression(
        10,
        vec![QueryFilterCondition::StringSingleValue {
            tag: core_tag("Modality"),
            value: "CT' OR '1'='1".to_string(),
        }],
    );

    let page = store.query(PartitionKey::DEFAULT, &expr, None).await.unwrap();
    assert!(page.is_empty());

    // The table is intact and still answers ordinary queries.
    let all = store
        .query(PartitionKey::DEFAULT, &expression(10, Vec::new()), None)
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_extended_tag_is_indexed_and_queryable() {
    let store = sqlite_store();
    store
        .add_extended_query_tags(&[AddExtendedQueryTagEntry {
            path: "00101010".to_string(),
            vr: "AS".to_string(),
            private_creator: None,
            level: QueryTagLevel::Study,
        }])
        .await
        .unwrap();
    store
        .update_extended_query_tag_status("00101010", ExtendedQueryTagStatus::Ready)
        .await
        .unwrap();
    let extended = store.resolve_tags().await.unwrap();
    assert_eq!(extended.len(), 1);

    for (study, age) in [("1.2.3", "042Y"), ("1.2.4", "007Y")] {
        let dataset = InstanceFixture::new(study, &format!("{study}.1"), &format!("{study}.1.1"))
            .with_string(tags::PATIENT_AGE, VR::AS, age)
            .dataset();
        index_instance(&store, PartitionKey::DEFAULT, &dataset, &extended).await;
    }

    let expr = expression(
        10,
        vec![QueryFilterCondition::StringSingleValue {
            tag: extended[0].clone(),
            value: "042Y".to_string(),
        }],
    );
    let page = store.query(PartitionKey::DEFAULT, &expr, None).await.unwrap();
    assert_sops(&page.items, &["1.2.3.1.1"]);
}

#[tokio::test]
async fn test_fuzzy_match_on_every_core_person_name() {
    let store = sqlite_store();
    let dataset = InstanceFixture::new(STUDY, "1.2.840.1.1", "1.2.840.1.1.1")
        .with_patient_name("Doe^John")
        .with_person_name(tags::REFERRING_PHYSICIAN_NAME, "Smith^Anna")
        .dataset();
    index_instance(&store, PartitionKey::DEFAULT, &dataset, &[]).await;
    let unnamed = InstanceFixture::new("1.2.840.2", "1.2.840.2.1", "1.2.840.2.1.1").dataset();
    index_instance(&store, PartitionKey::DEFAULT, &unnamed, &[]).await;

    let parser = QueryParser::new(core_query_tags());
    let person_names: Vec<_> = core_query_tags()
        .into_iter()
        .filter(|t| t.vr() == VR::PN)
        .collect();
    assert_eq!(person_names.len(), 2);

    for tag in person_names {
        let name = dataset.person_name(tag.tag()).unwrap();
        let parsed = parser
            .parse(&QueryParameters {
                filters: vec![(tag.name().to_string(), name[..3].to_lowercase())],
                fuzzy_matching: true,
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(parsed.filter_conditions()[0].kind(), "PersonNameFuzzyMatch");

        let page = store
            .query(PartitionKey::DEFAULT, &parsed, None)
            .await
            .unwrap_or_else(|e| panic!("{} fuzzy query failed: {e}", tag.name()));
        assert_sops(&page.items, &["1.2.840.1.1.1"]);
    }
}

#[tokio::test]
async fn test_extended_date_time_tag_matches_by_date() {
    let store = sqlite_store();
    store
        .add_extended_query_tags(&[AddExtendedQueryTagEntry {
            path: "0008002A".to_string(),
            vr: "DT".to_string(),
            private_creator: None,
            level: QueryTagLevel::Instance,
        }])
        .await
        .unwrap();
    store
        .update_extended_query_tag_status("0008002A", ExtendedQueryTagStatus::Ready)
        .await
        .unwrap();
    let extended = store.resolve_tags().await.unwrap();

    let acquisitions = [
        ("1.2.840.1.1.1", "20200922120000"),
        ("1.2.840.1.1.2", "20200922235959.500000+0200"),
        ("1.2.840.1.1.3", "20210101080000"),
    ];
    for (sop, acquired) in acquisitions {
        let dataset = InstanceFixture::new(STUDY, "1.2.840.1.1", sop)
            .with_string(tags::ACQUISITION_DATE_TIME, VR::DT, acquired)
            .dataset();
        index_instance(&store, PartitionKey::DEFAULT, &dataset, &extended).await;
    }

    let mut query_tags = core_query_tags();
    query_tags.extend(extended);
    let parser = QueryParser::new(query_tags);

    let parsed = parser
        .parse(&QueryParameters {
            filters: vec![("0008002A".into(), "20200922".into())],
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    let page = store.query(PartitionKey::DEFAULT, &parsed, None).await.unwrap();
    assert_sops(&page.items, &["1.2.840.1.1.1", "1.2.840.1.1.2"]);

    let parsed = parser
        .parse(&QueryParameters {
            filters: vec![("0008002A".into(), "20201001-20211231".into())],
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    let page = store.query(PartitionKey::DEFAULT, &parsed, None).await.unwrap();
    assert_sops(&page.items, &["1.2.840.1.1.3"]);
}

#[tokio::test]
async fn test_date_equality_matches_stored_format() {
    let store = seeded_store().await;
    let expr = expression(
        10,
        vec![QueryFilterCondition::DateSingleValue {
            tag: core_tag("StudyDate"),
            value: NaiveDate::from_ymd_opt(2021, 3, 5).unwrap(),
        }],
    );
    let page = store.query(PartitionKey::DEFAULT, &expr, None).await.unwrap();
    assert_sops(&page.items, &["1.2.840.2.1.1"]);
}

// ============================================================================
// Index Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_instance_is_hidden_until_indexing_ends() {
    let store = sqlite_store();
    let dataset = InstanceFixture::new(STUDY, "1.2.840.1.1", "1.2.840.1.1.1").dataset();

    let watermark = store
        .begin_create_instance_index(PartitionKey::DEFAULT, &dataset, &[])
        .await
        .unwrap();
    assert!(store
        .get_instance_identifiers_in_study(PartitionKey::DEFAULT, STUDY)
        .await
        .unwrap()
        .is_empty());

    store
        .end_create_instance_index(PartitionKey::DEFAULT, &dataset, watermark)
        .await
        .unwrap();
    let ids = store
        .get_instance_identifiers_in_study(PartitionKey::DEFAULT, STUDY)
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].version, watermark);
}

#[tokio::test]
async fn test_duplicate_instance_is_rejected() {
    let store = sqlite_store();
    let dataset = InstanceFixture::new(STUDY, "1.2.840.1.1", "1.2.840.1.1.1").dataset();
    index_instance(&store, PartitionKey::DEFAULT, &dataset, &[]).await;

    let err = store
        .begin_create_instance_index(PartitionKey::DEFAULT, &dataset, &[])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Resource(ResourceError::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn test_partitions_are_isolated() {
    let store = sqlite_store();
    let other = store.add_partition("research").await.unwrap();
    let dataset = InstanceFixture::new(STUDY, "1.2.840.1.1", "1.2.840.1.1.1").dataset();

    index_instance(&store, PartitionKey::DEFAULT, &dataset, &[]).await;
    index_instance(&store, other.key, &dataset, &[]).await;

    for partition in [PartitionKey::DEFAULT, other.key] {
        let ids = store
            .get_instance_identifiers_in_study(partition, STUDY)
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].partition_key, partition);
    }
}

#[tokio::test]
async fn test_delete_removes_index_and_is_idempotent() {
    let store = seeded_store().await;
    let ids = resolve_instance_identifiers(
        &store,
        PartitionKey::DEFAULT,
        STUDY,
        Some("1.2.840.1.2"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(ids.len(), 1);

    store.delete_instance_index(&ids[0]).await.unwrap();
    store.delete_instance_index(&ids[0]).await.unwrap();

    assert!(store
        .get_instance_identifiers_in_series(PartitionKey::DEFAULT, STUDY, "1.2.840.1.2")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        store
            .get_instance_identifiers_in_study(PartitionKey::DEFAULT, STUDY)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteIndexConfig {
        path: dir.path().join("index.db").to_string_lossy().into_owned(),
        ..Default::default()
    };
    let dataset = InstanceFixture::new(STUDY, "1.2.840.1.1", "1.2.840.1.1.1").dataset();

    {
        let store = SqliteIndexStore::new(config.clone(), QueryLimits::default()).unwrap();
        index_instance(&store, PartitionKey::DEFAULT, &dataset, &[]).await;
    }

    let reopened = SqliteIndexStore::new(config, QueryLimits::default()).unwrap();
    let ids = reopened
        .get_instance_identifier(PartitionKey::DEFAULT, STUDY, "1.2.840.1.1", "1.2.840.1.1.1")
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
}
