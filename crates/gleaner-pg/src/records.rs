//! PgRecordStore - `parts_data` テーブル
//!
//! Merge rule is the SQL form of `PersistentRecord::apply`: attempt metadata
//! (`completed_at` included) always follows the latest row, extracted payload columns go through
//! `COALESCE(EXCLUDED.col, parts_data.col)`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};

use gleaner_core::codec::{decode_optional_fields, encode_optional_fields};
use gleaner_core::domain::{
    ExtractionResult, ExtractionStatus, PersistError, PersistentRecord, WorkerIdentity,
};
use gleaner_core::ports::{FailedCursor, RecordStore, UpsertSummary};

const UPSERT: &str = r#"
    INSERT INTO parts_data (
        url, task_id, label, status, details, specs, attachment_url,
        issued_at, issued_by, completed_at, last_error, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
    ON CONFLICT (url) DO UPDATE SET
        task_id = EXCLUDED.task_id,
        label = EXCLUDED.label,
        status = EXCLUDED.status,
        details = COALESCE(EXCLUDED.details, parts_data.details),
        specs = COALESCE(EXCLUDED.specs, parts_data.specs),
        attachment_url = COALESCE(EXCLUDED.attachment_url, parts_data.attachment_url),
        issued_at = EXCLUDED.issued_at,
        issued_by = EXCLUDED.issued_by,
        completed_at = EXCLUDED.completed_at,
        last_error = EXCLUDED.last_error,
        updated_at = NOW()
    RETURNING (xmax = 0) AS was_inserted
"#;

const COLUMNS: &str = "url, task_id, label, status, details, specs, attachment_url, \
                       issued_at, issued_by, completed_at, last_error";

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> PersistError {
    error!("parts_data query failed: {}", e);
    PersistError::Backend(e.to_string())
}

fn record_from_row(row: &PgRow) -> Result<PersistentRecord, PersistError> {
    let status: String = row.try_get("status").map_err(backend)?;
    let status = ExtractionStatus::parse(&status)
        .ok_or_else(|| PersistError::Backend(format!("unknown status {status:?}")))?;
    let details: Option<Value> = row.try_get("details").map_err(backend)?;
    let specs: Option<Value> = row.try_get("specs").map_err(backend)?;
    let issued_by: String = row.try_get("issued_by").map_err(backend)?;

    Ok(PersistentRecord {
        url: row.try_get("url").map_err(backend)?,
        task_id: row.try_get("task_id").map_err(backend)?,
        label: row.try_get("label").map_err(backend)?,
        status,
        details: decode_optional_fields(details)?,
        specs: decode_optional_fields(specs)?,
        attachment_url: row.try_get("attachment_url").map_err(backend)?,
        issued_at: row.try_get("issued_at").map_err(backend)?,
        issued_by: WorkerIdentity::new(issued_by),
        completed_at: row.try_get("completed_at").map_err(backend)?,
        last_error: row.try_get("last_error").map_err(backend)?,
    })
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self, results), fields(results = results.len()))]
    async fn upsert_batch(
        &self,
        results: &[ExtractionResult],
    ) -> Result<UpsertSummary, PersistError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut summary = UpsertSummary::default();

        for result in results {
            let row = sqlx::query(UPSERT)
                .bind(&result.url)
                .bind(result.task_id)
                .bind(&result.label)
                .bind(result.status.as_str())
                .bind(encode_optional_fields(result.details.as_ref()))
                .bind(encode_optional_fields(result.specs.as_ref()))
                .bind(&result.attachment_url)
                .bind(result.issued_at)
                .bind(result.issued_by.as_str())
                .bind(result.completed_at)
                .bind(&result.error)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    error!(url = %result.url, "upsert failed: {}", e);
                    PersistError::Write {
                        url: result.url.clone(),
                        reason: e.to_string(),
                    }
                })?;

            let was_inserted: bool = row.try_get("was_inserted").map_err(backend)?;
            if was_inserted {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
        }

        // どれか 1 行でも失敗したら tx は drop されてロールバック
        tx.commit().await.map_err(backend)?;
        debug!(inserted = summary.inserted, updated = summary.updated, "batch committed");
        Ok(summary)
    }

    #[instrument(skip(self, after), fields(paged = after.is_some()))]
    async fn list_failed(
        &self,
        limit: usize,
        after: Option<&FailedCursor>,
    ) -> Result<Vec<PersistentRecord>, PersistError> {
        // (status, issued_at) の index に乗るキーセットページング
        let sql = format!(
            "SELECT {COLUMNS} FROM parts_data \
             WHERE status = 'failed' \
               AND ($1::timestamptz IS NULL OR (issued_at, url) > ($1, $2::text)) \
             ORDER BY issued_at ASC, url ASC \
             LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(after.map(|c| c.issued_at))
            .bind(after.map(|c| c.url.as_str()))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn get(&self, url: &str) -> Result<Option<PersistentRecord>, PersistError> {
        let sql = format!("SELECT {COLUMNS} FROM parts_data WHERE url = $1");
        let row = sqlx::query(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn count(&self) -> Result<usize, PersistError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM parts_data")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
