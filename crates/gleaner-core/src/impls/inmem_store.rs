//! InMemoryRecordStore - テスト用の正本
//!
//! `upsert_batch` はコピーに適用してから差し替えるので、途中で失敗しても
//! 何も書かれない（PostgreSQL のトランザクションと同じ見え方）。

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ExtractionResult, ExtractionStatus, PersistError, PersistentRecord};
use crate::ports::{FailedCursor, RecordStore, UpsertSummary};

#[derive(Default)]
pub struct InMemoryRecordStore {
    rows: Mutex<BTreeMap<String, PersistentRecord>>,
    poisoned_urls: Mutex<HashSet<String>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed rows directly (bypasses upsert).
    pub async fn insert(&self, record: PersistentRecord) {
        self.rows.lock().await.insert(record.url.clone(), record);
    }

    /// Every later write touching `url` fails, simulating a rejected row.
    pub async fn fail_writes_for(&self, url: impl Into<String>) {
        self.poisoned_urls.lock().await.insert(url.into());
    }

    pub async fn heal(&self) {
        self.poisoned_urls.lock().await.clear();
    }

    pub async fn snapshot(&self) -> Vec<PersistentRecord> {
        self.rows.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn upsert_batch(
        &self,
        results: &[ExtractionResult],
    ) -> Result<UpsertSummary, PersistError> {
        let poisoned = self.poisoned_urls.lock().await.clone();
        let mut rows = self.rows.lock().await;

        let mut staged = rows.clone();
        let mut summary = UpsertSummary::default();
        for result in results {
            if poisoned.contains(&result.url) {
                return Err(PersistError::Write {
                    url: result.url.clone(),
                    reason: "simulated write failure".to_string(),
                });
            }
            match staged.get_mut(&result.url) {
                Some(existing) => {
                    existing.apply(result);
                    summary.updated += 1;
                }
                None => {
                    staged.insert(result.url.clone(), PersistentRecord::from_result(result));
                    summary.inserted += 1;
                }
            }
        }

        *rows = staged;
        Ok(summary)
    }

    async fn list_failed(
        &self,
        limit: usize,
        after: Option<&FailedCursor>,
    ) -> Result<Vec<PersistentRecord>, PersistError> {
        let rows = self.rows.lock().await;
        let mut failed: Vec<PersistentRecord> = rows
            .values()
            .filter(|r| r.status == ExtractionStatus::Failed)
            .filter(|r| after.is_none_or(|c| (&r.issued_at, &r.url) > (&c.issued_at, &c.url)))
            .cloned()
            .collect();
        failed.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.url.cmp(&b.url)));
        failed.truncate(limit);
        Ok(failed)
    }

    async fn get(&self, url: &str) -> Result<Option<PersistentRecord>, PersistError> {
        Ok(self.rows.lock().await.get(url).cloned())
    }

    async fn count(&self) -> Result<usize, PersistError> {
        Ok(self.rows.lock().await.len())
    }
}
