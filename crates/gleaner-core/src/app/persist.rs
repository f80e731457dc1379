//! PersistenceStage - ステージング → 正本への flush
//!
//! 1. `drain_all()` でステージ済みの全件を読む（まだ消さない）
//! 2. `upsert_batch()` で 1 トランザクションに書く
//! 3. コミットできたときだけ読んだ位置まで `clear()`、成功した URL を failed set から `resolve()`
//!
//! 書き込みが途中で失敗してもステージングは丸ごと残るので、次のサイクルで
//! 同じ集合をもう一度流せばよい（URL で upsert するので重複しても安全）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{error, info, instrument};

use crate::domain::PersistError;
use crate::ports::{RecordStore, StagingCache};

use super::status::FlushReport;

pub struct PersistenceStage {
    staging: Arc<dyn StagingCache>,
    store: Arc<dyn RecordStore>,
    store_timeout: Duration,
}

impl PersistenceStage {
    pub fn new(
        staging: Arc<dyn StagingCache>,
        store: Arc<dyn RecordStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            staging,
            store,
            store_timeout,
        }
    }

    /// Write the whole staged set to the permanent store, then clear it.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<FlushReport, PersistError> {
        let staged = self.staging.drain_all().await?;
        if staged.is_empty() {
            return Ok(FlushReport::default());
        }

        let summary = match timeout(self.store_timeout, self.store.upsert_batch(&staged.records)).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                error!(staged = staged.len(), error = %e, "flush failed; staged set kept");
                return Err(e);
            }
            Err(_) => {
                error!(staged = staged.len(), "flush timed out; staged set kept");
                return Err(PersistError::Timeout);
            }
        };

        // ここから先はコミット済み。失敗しても再 flush は冪等
        self.staging.clear(staged.through).await.map_err(|e| {
            error!(error = %e, "clear after committed flush failed");
            PersistError::Backend(format!("clear after commit: {e}"))
        })?;

        // URL ごとに最後の試行だけを見る
        let mut latest: HashMap<&str, bool> = HashMap::new();
        for result in &staged.records {
            latest.insert(result.url.as_str(), result.is_success());
        }
        let mut resolved: Vec<String> = latest
            .into_iter()
            .filter(|(_, ok)| *ok)
            .map(|(url, _)| url.to_string())
            .collect();
        resolved.sort();
        if !resolved.is_empty() {
            self.staging.resolve(&resolved).await.map_err(|e| {
                error!(error = %e, "resolving succeeded urls failed");
                PersistError::Backend(format!("resolve after commit: {e}"))
            })?;
        }

        let report = FlushReport {
            staged: staged.len(),
            inserted: summary.inserted,
            updated: summary.updated,
        };
        info!(
            staged = report.staged,
            inserted = report.inserted,
            updated = report.updated,
            "flushed staged results"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::domain::{
        ExtractedPage, ExtractionResult, ExtractionStatus, StagingError, Task, WorkerIdentity,
    };
    use crate::impls::{InMemoryRecordStore, InMemoryStagingCache};
    use crate::ports::{StageMark, StagedSet};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn success(id: i64, h: u32) -> ExtractionResult {
        let task = Task::new(id, format!("http://x/{id}"), "");
        ExtractionResult::success(&task, ExtractedPage::default(), at(h), WorkerIdentity::new("w"), at(h))
    }

    fn failed(id: i64, h: u32) -> ExtractionResult {
        let task = Task::new(id, format!("http://x/{id}"), "");
        ExtractionResult::failed(&task, at(h), WorkerIdentity::new("w"), "wrong page")
    }

    fn stage_fixture() -> (Arc<InMemoryStagingCache>, Arc<InMemoryRecordStore>, PersistenceStage) {
        let staging = Arc::new(InMemoryStagingCache::new());
        let store = Arc::new(InMemoryRecordStore::new());
        let stage = PersistenceStage::new(staging.clone(), store.clone(), Duration::from_secs(5));
        (staging, store, stage)
    }

    #[tokio::test]
    async fn flush_writes_everything_and_clears() {
        let (staging, store, stage) = stage_fixture();
        staging.append(&[success(1, 1), failed(2, 1)]).await.unwrap();

        let report = stage.flush().await.unwrap();

        assert_eq!(
            report,
            FlushReport {
                staged: 2,
                inserted: 2,
                updated: 0
            }
        );
        assert_eq!(staging.len().await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 2);
        let row = store.get("http://x/2").await.unwrap().unwrap();
        assert_eq!(row.status, ExtractionStatus::Failed);
    }

    #[tokio::test]
    async fn flushing_the_same_set_twice_is_idempotent() {
        let (staging, store, stage) = stage_fixture();
        let batch = [success(1, 1), failed(2, 1), success(2, 2)];

        staging.append(&batch).await.unwrap();
        stage.flush().await.unwrap();
        let once = store.snapshot().await;

        staging.append(&batch).await.unwrap();
        let report = stage.flush().await.unwrap();

        assert_eq!(report.inserted, 0);
        assert_eq!(store.snapshot().await, once);
        assert_eq!(store.count().await.unwrap(), 2);
        // 最後の試行が勝つ
        let row = store.get("http://x/2").await.unwrap().unwrap();
        assert_eq!(row.status, ExtractionStatus::Success);
    }

    #[tokio::test]
    async fn failed_write_keeps_the_full_staged_set() {
        let (staging, store, stage) = stage_fixture();
        let batch = vec![success(1, 1), success(2, 1), success(3, 1)];
        staging.append(&batch).await.unwrap();
        store.fail_writes_for("http://x/2").await;

        let err = stage.flush().await.unwrap_err();

        assert!(matches!(err, PersistError::Write { ref url, .. } if url == "http://x/2"));
        assert_eq!(staging.drain_all().await.unwrap().records, batch);
        assert_eq!(store.count().await.unwrap(), 0);

        // 次のサイクルで同じ集合がそのまま書ける
        store.heal().await;
        let report = stage.flush().await.unwrap();
        assert_eq!(report.inserted, 3);
        assert_eq!(staging.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn success_resolves_the_failed_set() {
        let (staging, _store, stage) = stage_fixture();
        staging.mark_failed(&["http://x/1".into(), "http://x/2".into()]).await.unwrap();
        staging.append(&[success(1, 2), success(2, 2), failed(2, 3)]).await.unwrap();

        stage.flush().await.unwrap();

        let failed = staging.failed_ids().await.unwrap();
        assert!(!failed.contains("http://x/1"));
        assert!(failed.contains("http://x/2"));
    }

    #[tokio::test]
    async fn later_failure_drops_completion_time_but_keeps_payload() {
        let (staging, store, stage) = stage_fixture();
        let mut page = ExtractedPage::default();
        page.details.insert("Maker".into(), "ACME".into());
        let task = Task::new(1, "http://x/1", "");
        let ok = ExtractionResult::success(&task, page, at(1), WorkerIdentity::new("w"), at(1));

        staging.append(&[ok]).await.unwrap();
        stage.flush().await.unwrap();
        staging.append(&[failed(1, 2)]).await.unwrap();
        stage.flush().await.unwrap();

        let row = store.get("http://x/1").await.unwrap().unwrap();
        assert_eq!(row.status, ExtractionStatus::Failed);
        assert_eq!(row.completed_at, None);
        assert_eq!(row.details.as_ref().unwrap()["Maker"], "ACME");
    }

    /// Staging that lets another writer append between `drain_all` and `clear`,
    /// like a second process sharing the same staged rows.
    struct InterleavedStaging {
        inner: Arc<InMemoryStagingCache>,
        late: tokio::sync::Mutex<Option<ExtractionResult>>,
    }

    #[async_trait::async_trait]
    impl StagingCache for InterleavedStaging {
        async fn append(&self, results: &[ExtractionResult]) -> Result<(), StagingError> {
            self.inner.append(results).await
        }
        async fn drain_all(&self) -> Result<StagedSet, StagingError> {
            let staged = self.inner.drain_all().await?;
            if let Some(late) = self.late.lock().await.take() {
                self.inner.append(&[late]).await?;
            }
            Ok(staged)
        }
        async fn clear(&self, through: StageMark) -> Result<(), StagingError> {
            self.inner.clear(through).await
        }
        async fn len(&self) -> Result<usize, StagingError> {
            self.inner.len().await
        }
        async fn mark_failed(&self, urls: &[String]) -> Result<(), StagingError> {
            self.inner.mark_failed(urls).await
        }
        async fn failed_ids(&self) -> Result<HashSet<String>, StagingError> {
            self.inner.failed_ids().await
        }
        async fn failure_counts(&self, urls: &[String]) -> Result<HashMap<String, u32>, StagingError> {
            self.inner.failure_counts(urls).await
        }
        async fn resolve(&self, urls: &[String]) -> Result<(), StagingError> {
            self.inner.resolve(urls).await
        }
    }

    #[tokio::test]
    async fn records_staged_during_a_flush_survive_its_clear() {
        let inner = Arc::new(InMemoryStagingCache::new());
        let staging = Arc::new(InterleavedStaging {
            inner: inner.clone(),
            late: tokio::sync::Mutex::new(Some(success(2, 1))),
        });
        let store = Arc::new(InMemoryRecordStore::new());
        let stage = PersistenceStage::new(staging.clone(), store.clone(), Duration::from_secs(5));
        staging.append(&[success(1, 1)]).await.unwrap();

        let first = stage.flush().await.unwrap();
        assert_eq!(first.staged, 1);
        assert_eq!(inner.len().await.unwrap(), 1);

        let second = stage.flush().await.unwrap();
        assert_eq!(second.staged, 1);
        assert_eq!(inner.len().await.unwrap(), 0);
        assert!(store.get("http://x/2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_staging_is_a_noop() {
        let (_staging, store, stage) = stage_fixture();
        assert!(stage.flush().await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
