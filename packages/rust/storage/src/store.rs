//! The record store seam: find-by-identity, create, update, delete.

use async_trait::async_trait;
use leadqual_shared::Result;

use crate::schema::{CAMPAIGN_DRAFTS, LEADS, TableSchema};
use crate::value::{FieldMap, FieldValue};

/// Tables of the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Leads,
    CampaignDrafts,
}

impl Table {
    pub fn schema(self) -> &'static TableSchema {
        match self {
            Self::Leads => &LEADS,
            Self::CampaignDrafts => &CAMPAIGN_DRAFTS,
        }
    }

    pub fn name(self) -> &'static str {
        self.schema().name
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored record as last read or written.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRef {
    pub id: String,
    pub table: Table,
    pub identity: String,
    pub fields: FieldMap,
}

impl RecordRef {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_number)
    }
}

/// Tabular store keyed by identity. Implementations coerce every outbound
/// field through the table schema before writing.
///
/// `create` on an identity that already exists fails with
/// `LeadQualError::IdentityConflict`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Case-insensitive identity lookup.
    async fn find_by_identity(&self, table: Table, identity: &str) -> Result<Option<RecordRef>>;

    async fn create(&self, table: Table, identity: &str, fields: FieldMap) -> Result<RecordRef>;

    /// Merge `fields` into the record; fields not mentioned are left as they are.
    async fn update(&self, table: Table, record: &RecordRef, fields: FieldMap) -> Result<RecordRef>;

    /// Remove the record. Deleting a record that is already gone is not an error.
    async fn delete(&self, table: Table, record: &RecordRef) -> Result<()>;
}
