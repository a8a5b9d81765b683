//! Record store for lead qualification results.
//!
//! [`RecordStore`] is the seam the pipeline writes through. [`LibsqlRecordStore`]
//! implements it over a local libSQL database: one `records` table, one row
//! per `(table, identity)`, fields kept as a JSON object and merged atomically
//! on update with `json_patch`.
//!
//! **Identity rules:**
//! - lookups are case-insensitive (`identity_key` is the lower-cased identity)
//! - `UNIQUE(table_name, identity_key)` rejects a second create for the same
//!   identity with [`LeadQualError::IdentityConflict`]

mod migrations;
pub mod schema;
pub mod store;
pub mod value;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use leadqual_shared::{LeadQualError, Result};
use libsql::{Connection, Database, params};
use uuid::Uuid;

pub use schema::{FieldKind, FieldSpec, StageFields, TableSchema, drafts, leads, stage_fields};
pub use store::{RecordRef, RecordStore, Table};
pub use value::{DATE_FORMAT, FieldMap, FieldValue};

fn storage_err(e: impl std::fmt::Display) -> LeadQualError {
    LeadQualError::Persistence(e.to_string())
}

/// libSQL-backed [`RecordStore`].
pub struct LibsqlRecordStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl LibsqlRecordStore {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadQualError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    LeadQualError::Persistence(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Most recently updated records of a table, newest first.
    pub async fn list_recent(&self, table: Table, limit: u32) -> Result<Vec<RecordRef>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, identity, fields_json FROM records
                 WHERE table_name = ?1 ORDER BY updated_at DESC LIMIT ?2",
                params![table.name(), limit],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_record(table, &row)?);
        }
        Ok(results)
    }

    async fn get_by_id(&self, table: Table, id: &str) -> Result<Option<RecordRef>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, identity, fields_json FROM records WHERE id = ?1 AND table_name = ?2",
                params![id, table.name()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_record(table, &row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RecordStore for LibsqlRecordStore {
    async fn find_by_identity(&self, table: Table, identity: &str) -> Result<Option<RecordRef>> {
        let key = identity.trim().to_lowercase();
        let mut rows = self
            .conn
            .query(
                "SELECT id, identity, fields_json FROM records
                 WHERE table_name = ?1 AND identity_key = ?2",
                params![table.name(), key],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_record(table, &row)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, table: Table, identity: &str, fields: FieldMap) -> Result<RecordRef> {
        let fields = table.schema().coerce(fields);
        let id = Uuid::now_v7().to_string();
        let identity = identity.trim();
        let now = Utc::now().to_rfc3339();
        let json = value::encode(&fields).to_string();

        let result = self
            .conn
            .execute(
                "INSERT INTO records (id, table_name, identity, identity_key, fields_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    table.name(),
                    identity,
                    identity.to_lowercase(),
                    json,
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await;

        match result {
            Ok(_) => {}
            Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
                return Err(LeadQualError::IdentityConflict {
                    table: table.name().to_string(),
                    identity: identity.to_string(),
                });
            }
            Err(e) => return Err(storage_err(e)),
        }

        tracing::debug!(%table, identity, fields = fields.len(), "created record");
        Ok(RecordRef {
            id,
            table,
            identity: identity.to_string(),
            fields,
        })
    }

    async fn update(&self, table: Table, record: &RecordRef, fields: FieldMap) -> Result<RecordRef> {
        let fields = table.schema().coerce(fields);
        if fields.is_empty() {
            return Ok(record.clone());
        }

        let patch = value::encode(&fields).to_string();
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE records SET fields_json = json_patch(fields_json, ?1), updated_at = ?2
                 WHERE id = ?3 AND table_name = ?4",
                params![patch, now.as_str(), record.id.as_str(), table.name()],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(LeadQualError::Persistence(format!(
                "record {} not found in {table}",
                record.id
            )));
        }

        tracing::debug!(%table, identity = %record.identity, fields = fields.len(), "updated record");
        self.get_by_id(table, &record.id).await?.ok_or_else(|| {
            LeadQualError::Persistence(format!("record {} vanished after update", record.id))
        })
    }

    async fn delete(&self, table: Table, record: &RecordRef) -> Result<()> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM records WHERE id = ?1 AND table_name = ?2",
                params![record.id.as_str(), table.name()],
            )
            .await
            .map_err(storage_err)?;

        tracing::debug!(%table, identity = %record.identity, removed, "deleted record");
        Ok(())
    }
}

fn row_to_record(table: Table, row: &libsql::Row) -> Result<RecordRef> {
    let fields_json = row.get::<String>(2).map_err(storage_err)?;
    let stored: serde_json::Value = serde_json::from_str(&fields_json).map_err(|e| {
        LeadQualError::Persistence(format!("corrupt fields_json for {table}: {e}"))
    })?;

    Ok(RecordRef {
        id: row.get::<String>(0).map_err(storage_err)?,
        table,
        identity: row.get::<String>(1).map_err(storage_err)?,
        fields: value::decode(table.schema(), &stored),
    })
}
