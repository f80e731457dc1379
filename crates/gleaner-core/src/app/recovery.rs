//! RecoveryCoordinator - 失敗した URL を正本から集め直す
//!
//! `Done` シグナルのときだけ呼ばれる。集めたタスクは通常と同じ
//! engine → staging → persistence の流れに乗る。
//!
//! 無限リトライを避けるため、StagingCache の failed set で連続失敗回数が
//! `max_attempts` に達した URL は対象から外す（成功すれば `resolve` でリセット）。
//! 正本は `(issued_at, url)` のキーセットで `limit` 件ずつ読むので、
//! 使い切った URL がいくら溜まってもメモリは `limit` 程度で済む。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::domain::{CycleError, PersistError, PersistentRecord, Task};
use crate::ports::{FailedCursor, RecordStore, StagingCache};

pub struct RecoveryCoordinator {
    store: Arc<dyn RecordStore>,
    staging: Arc<dyn StagingCache>,
    max_attempts: u32,
    store_timeout: Duration,
}

impl RecoveryCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        staging: Arc<dyn StagingCache>,
        max_attempts: u32,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            staging,
            max_attempts,
            store_timeout,
        }
    }

    async fn page(
        &self,
        limit: usize,
        after: Option<&FailedCursor>,
    ) -> Result<Vec<PersistentRecord>, PersistError> {
        timeout(self.store_timeout, self.store.list_failed(limit, after))
            .await
            .map_err(|_| PersistError::Timeout)?
    }

    /// Up to `limit` failed rows, oldest attempt first, as tasks.
    #[instrument(skip(self))]
    pub async fn collect_failed(&self, limit: usize) -> Result<Vec<Task>, CycleError> {
        let mut tasks = Vec::with_capacity(limit);
        let mut exhausted = 0usize;
        let mut cursor: Option<FailedCursor> = None;

        while tasks.len() < limit {
            let rows = self.page(limit, cursor.as_ref()).await?;
            let Some(last) = rows.last() else {
                break;
            };
            cursor = Some(FailedCursor::after(last));

            let urls: Vec<String> = rows.iter().map(|r| r.url.clone()).collect();
            let counts = self.staging.failure_counts(&urls).await?;
            for row in &rows {
                if counts.get(&row.url).is_some_and(|n| *n >= self.max_attempts) {
                    exhausted += 1;
                } else if tasks.len() < limit {
                    tasks.push(row.to_task());
                }
            }

            if rows.len() < limit {
                break;
            }
        }

        if exhausted > 0 {
            warn!(
                exhausted,
                max_attempts = self.max_attempts,
                "skipping urls that used up their recovery attempts"
            );
        }
        info!(collected = tasks.len(), "collected failed tasks");
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExtractionResult, WorkerIdentity};
    use crate::impls::{InMemoryRecordStore, InMemoryStagingCache};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn failed_row(id: i64, h: u32) -> PersistentRecord {
        let task = Task::new(id, format!("http://x/{id}"), format!("part-{id}"));
        PersistentRecord::from_result(&ExtractionResult::failed(
            &task,
            at(h),
            WorkerIdentity::new("w"),
            "wrong page",
        ))
    }

    fn coordinator(max_attempts: u32) -> (Arc<InMemoryRecordStore>, Arc<InMemoryStagingCache>, RecoveryCoordinator) {
        let store = Arc::new(InMemoryRecordStore::new());
        let staging = Arc::new(InMemoryStagingCache::new());
        let recovery = RecoveryCoordinator::new(
            store.clone(),
            staging.clone(),
            max_attempts,
            Duration::from_secs(5),
        );
        (store, staging, recovery)
    }

    #[tokio::test]
    async fn rebuilds_tasks_oldest_first_within_limit() {
        let (store, _staging, recovery) = coordinator(5);
        store.insert(failed_row(3, 3)).await;
        store.insert(failed_row(1, 1)).await;
        store.insert(failed_row(2, 2)).await;

        let tasks = recovery.collect_failed(2).await.unwrap();

        assert_eq!(
            tasks,
            vec![
                Task::new(1, "http://x/1", "part-1"),
                Task::new(2, "http://x/2", "part-2"),
            ]
        );
    }

    #[tokio::test]
    async fn exhausted_urls_are_not_collected() {
        let (store, staging, recovery) = coordinator(2);
        store.insert(failed_row(1, 1)).await;
        store.insert(failed_row(2, 1)).await;
        staging.mark_failed(&["http://x/1".into()]).await.unwrap();
        staging.mark_failed(&["http://x/1".into(), "http://x/2".into()]).await.unwrap();

        let tasks = recovery.collect_failed(10).await.unwrap();

        assert_eq!(tasks, vec![Task::new(2, "http://x/2", "part-2")]);
    }

    #[tokio::test]
    async fn pages_past_exhausted_urls_to_fill_the_limit() {
        let (store, staging, recovery) = coordinator(1);
        for id in 1..=5 {
            store.insert(failed_row(id, id as u32)).await;
        }
        // 古い 3 件は使い切り済み
        staging
            .mark_failed(&["http://x/1".into(), "http://x/2".into(), "http://x/3".into()])
            .await
            .unwrap();

        let tasks = recovery.collect_failed(2).await.unwrap();

        assert_eq!(
            tasks,
            vec![
                Task::new(4, "http://x/4", "part-4"),
                Task::new(5, "http://x/5", "part-5"),
            ]
        );
    }

    #[tokio::test]
    async fn zero_limit_collects_nothing() {
        let (store, _staging, recovery) = coordinator(5);
        store.insert(failed_row(1, 1)).await;
        assert!(recovery.collect_failed(0).await.unwrap().is_empty());
    }
}
