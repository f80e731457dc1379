//! PgStagingCache - `staged_results` / `failed_urls`
//!
//! staged_results は owner（ワーカー ID）ごとに分ける。failed_urls は全体で共有。
//!
//! 同じホストのワーカーは同じ owner になりうるので、`clear` は `drain_all` が
//! 読んだ最大の `seq` までしか消さない。その後に積まれた行は次の flush に回る。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::{error, instrument};

use gleaner_core::codec::{decode_result, encode_result};
use gleaner_core::domain::{ExtractionResult, StagingError, WorkerIdentity};
use gleaner_core::ports::{StageMark, StagedSet, StagingCache};

#[derive(Clone)]
pub struct PgStagingCache {
    pool: PgPool,
    owner: String,
}

impl PgStagingCache {
    pub fn new(pool: PgPool, owner: &WorkerIdentity) -> Self {
        Self {
            pool,
            owner: owner.as_str().to_string(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> StagingError {
    error!("staging query failed: {}", e);
    StagingError::Backend(e.to_string())
}

#[async_trait]
impl StagingCache for PgStagingCache {
    #[instrument(skip(self, results), fields(owner = %self.owner, results = results.len()))]
    async fn append(&self, results: &[ExtractionResult]) -> Result<(), StagingError> {
        let payloads = results
            .iter()
            .map(encode_result)
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await.map_err(backend)?;
        for payload in &payloads {
            sqlx::query("INSERT INTO staged_results (owner, payload) VALUES ($1, $2)")
                .bind(&self.owner)
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn drain_all(&self) -> Result<StagedSet, StagingError> {
        let rows = sqlx::query(
            "SELECT seq, payload FROM staged_results WHERE owner = $1 ORDER BY seq ASC",
        )
        .bind(&self.owner)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut staged = StagedSet::default();
        for row in &rows {
            let seq: i64 = row.try_get("seq").map_err(backend)?;
            let payload: Value = row.try_get("payload").map_err(backend)?;
            staged.records.push(decode_result(payload)?);
            staged.through = StageMark(seq);
        }
        Ok(staged)
    }

    #[instrument(skip(self), fields(owner = %self.owner))]
    async fn clear(&self, through: StageMark) -> Result<(), StagingError> {
        sqlx::query("DELETE FROM staged_results WHERE owner = $1 AND seq <= $2")
            .bind(&self.owner)
            .bind(through.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn len(&self) -> Result<usize, StagingError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM staged_results WHERE owner = $1")
            .bind(&self.owner)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn mark_failed(&self, urls: &[String]) -> Result<(), StagingError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for url in urls {
            sqlx::query(
                r#"
                INSERT INTO failed_urls (url, failures, last_failed_at)
                VALUES ($1, 1, NOW())
                ON CONFLICT (url) DO UPDATE SET
                    failures = failed_urls.failures + 1,
                    last_failed_at = NOW()
                "#,
            )
            .bind(url)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn failed_ids(&self) -> Result<HashSet<String>, StagingError> {
        let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM failed_urls")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(urls.into_iter().collect())
    }

    async fn failure_counts(&self, urls: &[String]) -> Result<HashMap<String, u32>, StagingError> {
        if urls.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT url, failures FROM failed_urls WHERE url = ANY($1)")
            .bind(urls)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter()
            .map(|row| {
                let url: String = row.try_get("url").map_err(backend)?;
                let failures: i32 = row.try_get("failures").map_err(backend)?;
                Ok((url, u32::try_from(failures).unwrap_or_default()))
            })
            .collect()
    }

    async fn resolve(&self, urls: &[String]) -> Result<(), StagingError> {
        if urls.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM failed_urls WHERE url = ANY($1)")
            .bind(urls)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
