//! Database layer for ads-report-dl
//!
//! Handles SQLite persistence for mapped report entities.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`entities`] — Report entity upserts and range queries
//!
//! Entities are stored one row per natural key
//! `(account_id, report_type, dimension_key, day)`; the mapped field values
//! travel as a JSON document. Undated (structural) reports store the empty
//! string for `day` so the unique index applies uniformly.

use crate::error::DatabaseError;
use crate::mapper::DATE_FORMAT;
use crate::types::{AccountId, FieldValue, ReportEntity, ReportType};
use chrono::NaiveDate;
use sqlx::{FromRow, sqlite::SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;

mod entities;
mod migrations;

/// Report entity record as stored in SQLite
#[derive(Debug, Clone, FromRow)]
pub struct StoredEntity {
    /// Unique database ID
    pub id: i64,
    /// Account the entity belongs to
    pub account_id: AccountId,
    /// Wire name of the report type
    pub report_type: String,
    /// Joined key-column values
    pub dimension_key: String,
    /// Calendar day as `YYYY-MM-DD`, or empty for structural reports
    pub day: String,
    /// Mapped field values as a JSON document
    pub fields: String,
    /// Unix timestamp when the entity was first written
    pub created_at: i64,
    /// Unix timestamp of the last upsert that touched this row
    pub updated_at: i64,
}

impl StoredEntity {
    /// Decode the stored row back into a mapped entity
    pub fn into_entity(self) -> Result<ReportEntity, DatabaseError> {
        let report_type =
            ReportType::from_str(&self.report_type).map_err(|e| DatabaseError::CorruptEntity {
                id: self.id,
                reason: e,
            })?;
        let fields: BTreeMap<String, FieldValue> =
            serde_json::from_str(&self.fields).map_err(|e| DatabaseError::CorruptEntity {
                id: self.id,
                reason: format!("invalid field document: {e}"),
            })?;
        let day = if self.day.is_empty() {
            None
        } else {
            Some(NaiveDate::parse_from_str(&self.day, DATE_FORMAT).map_err(|e| {
                DatabaseError::CorruptEntity {
                    id: self.id,
                    reason: format!("invalid day '{}': {e}", self.day),
                }
            })?)
        };
        Ok(ReportEntity {
            account_id: self.account_id,
            report_type,
            dimension_key: self.dimension_key,
            day,
            fields,
        })
    }
}

/// The `day` column value for an entity (empty string for undated reports)
pub(crate) fn day_column(entity: &ReportEntity) -> String {
    entity
        .day
        .map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Database handle for ads-report-dl
pub struct Database {
    pool: SqlitePool,
}
