//! Report entity upserts and range queries.

use crate::error::DatabaseError;
use crate::mapper::DATE_FORMAT;
use crate::types::{AccountId, ReportEntity, ReportType};
use crate::{Error, Result};
use chrono::NaiveDate;

use super::{Database, StoredEntity, day_column};

impl Database {
    /// Upsert a batch of mapped entities in one transaction
    ///
    /// Insert-or-update keyed by the natural key
    /// `(account_id, report_type, dimension_key, day)`: re-running the same
    /// report overwrites the previous values instead of appending duplicates.
    /// Returns the number of entities written.
    pub async fn upsert_entities(&self, entities: &[ReportEntity]) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin upsert transaction: {}",
                e
            )))
        })?;

        for entity in entities {
            let fields = serde_json::to_string(&entity.fields)?;

            sqlx::query(
                r#"
                INSERT INTO report_entities (
                    account_id, report_type, dimension_key, day, fields,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(account_id, report_type, dimension_key, day)
                DO UPDATE SET
                    fields = excluded.fields,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(entity.account_id)
            .bind(entity.report_type.as_str())
            .bind(&entity.dimension_key)
            .bind(day_column(entity))
            .bind(fields)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to upsert entity: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit upsert transaction: {}",
                e
            )))
        })?;

        Ok(entities.len() as u64)
    }

    /// Query entities for one account and report type within a day range
    ///
    /// Structural (undated) entities are excluded; use
    /// [`Database::list_entities`] for those.
    pub async fn query_entities(
        &self,
        report_type: ReportType,
        account_id: AccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ReportEntity>> {
        let rows = sqlx::query_as::<_, StoredEntity>(
            r#"
            SELECT
                id, account_id, report_type, dimension_key, day, fields,
                created_at, updated_at
            FROM report_entities
            WHERE report_type = ? AND account_id = ? AND day != ''
              AND day >= ? AND day <= ?
            ORDER BY day ASC, dimension_key ASC
            "#,
        )
        .bind(report_type.as_str())
        .bind(account_id)
        .bind(from.format(DATE_FORMAT).to_string())
        .bind(to.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query entities: {}",
                e
            )))
        })?;

        rows.into_iter()
            .map(|row| row.into_entity().map_err(Error::Database))
            .collect()
    }

    /// List all entities for one account and report type, dated or not
    pub async fn list_entities(
        &self,
        report_type: ReportType,
        account_id: AccountId,
    ) -> Result<Vec<ReportEntity>> {
        let rows = sqlx::query_as::<_, StoredEntity>(
            r#"
            SELECT
                id, account_id, report_type, dimension_key, day, fields,
                created_at, updated_at
            FROM report_entities
            WHERE report_type = ? AND account_id = ?
            ORDER BY day ASC, dimension_key ASC
            "#,
        )
        .bind(report_type.as_str())
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list entities: {}",
                e
            )))
        })?;

        rows.into_iter()
            .map(|row| row.into_entity().map_err(Error::Database))
            .collect()
    }

    /// Count entities for one account and report type
    pub async fn count_entities(
        &self,
        report_type: ReportType,
        account_id: AccountId,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM report_entities WHERE report_type = ? AND account_id = ?",
        )
        .bind(report_type.as_str())
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count entities: {}",
                e
            )))
        })?;

        Ok(count)
    }

    /// Delete all entities for one account and report type
    ///
    /// Returns the number of rows removed.
    pub async fn delete_entities(
        &self,
        report_type: ReportType,
        account_id: AccountId,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM report_entities WHERE report_type = ? AND account_id = ?",
        )
        .bind(report_type.as_str())
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to delete entities: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }
}
