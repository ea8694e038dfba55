//! SQLite schema definitions and migrations.
//!
//! Version 1 holds the study, series and instance index plus the extended
//! query tag registry and its per-type value tables. Version 2 adds data
//! partitions: a `DataPartition` table and a `PartitionKey` column on every
//! index table, defaulting to the default partition.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::types::{DEFAULT_PARTITION_NAME, PartitionKey};

/// Latest schema version.
pub const SCHEMA_VERSION: i32 = 2;

const EXTENDED_VALUE_TABLES: [(&str, &str); 5] = [
    ("ExtendedQueryTagString", "TEXT"),
    ("ExtendedQueryTagLong", "INTEGER"),
    ("ExtendedQueryTagDouble", "REAL"),
    ("ExtendedQueryTagDateTime", "TEXT"),
    ("ExtendedQueryTagPersonName", "TEXT"),
];

fn migration_error(step: &str, e: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::MigrationError {
        message: format!("{}: {}", step, e),
    })
}

/// Creates or migrates the schema up to `target_version` and returns the
/// version the database is at afterwards.
///
/// Databases already past the target are left alone.
pub fn initialize_schema(conn: &Connection, target_version: i32) -> StorageResult<i32> {
    let target_version = target_version.clamp(1, SCHEMA_VERSION);
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, 1)?;
        migrate_schema(conn, 1, target_version)?;
    } else if current_version < target_version {
        migrate_schema(conn, current_version, target_version)?;
    }

    get_schema_version(conn)
}

/// Returns the schema version, 0 for an empty database.
pub fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS SchemaVersion (Version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| migration_error("Failed to create SchemaVersion table", e))?;

    let version: Option<i32> = conn
        .query_row("SELECT Version FROM SchemaVersion LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.execute("DELETE FROM SchemaVersion", [])
        .map_err(|e| migration_error("Failed to clear SchemaVersion", e))?;
    conn.execute("INSERT INTO SchemaVersion (Version) VALUES (?1)", [version])
        .map_err(|e| migration_error("Failed to set SchemaVersion", e))?;
    Ok(())
}

fn create_schema_v1(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS Study (
            StudyKey INTEGER PRIMARY KEY AUTOINCREMENT,
            StudyInstanceUid TEXT NOT NULL,
            PatientId TEXT,
            PatientName TEXT,
            PatientNameWords TEXT,
            ReferringPhysicianName TEXT,
            ReferringPhysicianNameWords TEXT,
            StudyDate TEXT,
            StudyDescription TEXT,
            AccessionNumber TEXT,
            PatientBirthDate TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS IX_Study_StudyInstanceUid
            ON Study(StudyInstanceUid);

        CREATE TABLE IF NOT EXISTS Series (
            SeriesKey INTEGER PRIMARY KEY AUTOINCREMENT,
            StudyKey INTEGER NOT NULL REFERENCES Study(StudyKey),
            SeriesInstanceUid TEXT NOT NULL,
            Modality TEXT,
            PerformedProcedureStepStartDate TEXT,
            ManufacturerModelName TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS IX_Series_StudyKey_SeriesInstanceUid
            ON Series(StudyKey, SeriesInstanceUid);

        CREATE TABLE IF NOT EXISTS Instance (
            InstanceKey INTEGER PRIMARY KEY AUTOINCREMENT,
            StudyKey INTEGER NOT NULL REFERENCES Study(StudyKey),
            SeriesKey INTEGER NOT NULL REFERENCES Series(SeriesKey),
            StudyInstanceUid TEXT NOT NULL,
            SeriesInstanceUid TEXT NOT NULL,
            SopInstanceUid TEXT NOT NULL,
            Watermark INTEGER NOT NULL,
            Status INTEGER NOT NULL,
            CreatedDate TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS IX_Instance_Watermark ON Instance(Watermark);
        CREATE INDEX IF NOT EXISTS IX_Instance_Uids
            ON Instance(StudyInstanceUid, SeriesInstanceUid, SopInstanceUid);

        CREATE TABLE IF NOT EXISTS ExtendedQueryTag (
            TagKey INTEGER PRIMARY KEY AUTOINCREMENT,
            TagPath TEXT NOT NULL UNIQUE,
            TagVR TEXT NOT NULL,
            TagPrivateCreator TEXT,
            TagLevel INTEGER NOT NULL,
            TagStatus INTEGER NOT NULL,
            QueryStatus INTEGER NOT NULL DEFAULT 1,
            ErrorCount INTEGER NOT NULL DEFAULT 0
        );",
    )
    .map_err(|e| migration_error("Failed to create index tables", e))?;

    for (table, value_type) in EXTENDED_VALUE_TABLES {
        let words = if table == "ExtendedQueryTagPersonName" {
            "TagValueWords TEXT,"
        } else {
            ""
        };
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                TagKey INTEGER NOT NULL REFERENCES ExtendedQueryTag(TagKey),
                TagValue {value_type} NOT NULL,
                {words}
                StudyKey INTEGER NOT NULL,
                SeriesKey INTEGER,
                InstanceKey INTEGER,
                Watermark INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS IX_{table}_TagKey_TagValue ON {table}(TagKey, TagValue);
            CREATE INDEX IF NOT EXISTS IX_{table}_StudyKey ON {table}(StudyKey);"
        ))
        .map_err(|e| migration_error(&format!("Failed to create {table}"), e))?;
    }

    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32, to_version: i32) -> StorageResult<()> {
    let mut version = from_version;

    while version < to_version {
        match version {
            1 => migrate_v1_to_v2(conn)?,
            _ => {
                return Err(StorageError::Backend(BackendError::MigrationError {
                    message: format!("Unknown schema version: {}", version),
                }));
            }
        }
        version += 1;
        set_schema_version(conn, version)?;
        tracing::info!(version, "Migrated sqlite index schema");
    }

    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> StorageResult<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            rusqlite::params![table, column],
            |row| row.get(0),
        )
        .map_err(|e| migration_error(&format!("Failed to inspect {table}"), e))?;
    Ok(count > 0)
}

/// Adds data partitions.
///
/// Study UIDs become unique per partition instead of globally. Version 1
/// databases created without the referring physician word column get it
/// here, populated on the next write of each study.
fn migrate_v1_to_v2(conn: &Connection) -> StorageResult<()> {
    let default_key = PartitionKey::DEFAULT.value();

    if !column_exists(conn, "Study", "ReferringPhysicianNameWords")? {
        conn.execute(
            "ALTER TABLE Study ADD COLUMN ReferringPhysicianNameWords TEXT",
            [],
        )
        .map_err(|e| migration_error("Failed to add ReferringPhysicianNameWords", e))?;
    }

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS DataPartition (
            PartitionKey INTEGER PRIMARY KEY,
            PartitionName TEXT NOT NULL UNIQUE,
            CreatedDate TEXT NOT NULL
        );
        DROP INDEX IF EXISTS IX_Study_StudyInstanceUid;
        ALTER TABLE Study ADD COLUMN PartitionKey INTEGER NOT NULL DEFAULT {default_key};
        ALTER TABLE Series ADD COLUMN PartitionKey INTEGER NOT NULL DEFAULT {default_key};
        ALTER TABLE Instance ADD COLUMN PartitionKey INTEGER NOT NULL DEFAULT {default_key};
        CREATE UNIQUE INDEX IF NOT EXISTS IX_Study_PartitionKey_StudyInstanceUid
            ON Study(PartitionKey, StudyInstanceUid);
        CREATE INDEX IF NOT EXISTS IX_Instance_PartitionKey_Uids
            ON Instance(PartitionKey, StudyInstanceUid, SeriesInstanceUid, SopInstanceUid);"
    ))
    .map_err(|e| migration_error("Failed to add partitions", e))?;

    for (table, _) in EXTENDED_VALUE_TABLES {
        conn.execute(
            &format!(
                "ALTER TABLE {table} ADD COLUMN PartitionKey INTEGER NOT NULL DEFAULT {default_key}"
            ),
            [],
        )
        .map_err(|e| migration_error(&format!("Failed to add PartitionKey to {table}"), e))?;
    }

    conn.execute(
        "INSERT OR IGNORE INTO DataPartition (PartitionKey, PartitionName, CreatedDate)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![
            default_key,
            DEFAULT_PARTITION_NAME,
            chrono::Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| migration_error("Failed to seed default partition", e))?;

    Ok(())
}
