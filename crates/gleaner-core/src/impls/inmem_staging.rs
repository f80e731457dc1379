//! InMemoryStagingCache - 開発用のステージング
//!
//! プロセス内だけで完結するので再起動で内容は消える。本番では
//! `gleaner-pg::PgStagingCache` を使うこと。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ExtractionResult, StagingError};
use crate::ports::{StageMark, StagedSet, StagingCache};

#[derive(Default)]
struct StagingState {
    /// Staged records with their sequence number, in append order.
    records: Vec<(i64, ExtractionResult)>,
    next_seq: i64,

    /// url -> consecutive failures
    failed: HashMap<String, u32>,
}

#[derive(Default)]
pub struct InMemoryStagingCache {
    state: Mutex<StagingState>,
    fail_appends: AtomicBool,
}

impl InMemoryStagingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `append` fail (tests only need this to be sticky).
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StagingCache for InMemoryStagingCache {
    async fn append(&self, results: &[ExtractionResult]) -> Result<(), StagingError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StagingError::Backend("append rejected".to_string()));
        }
        let mut state = self.state.lock().await;
        for result in results {
            state.next_seq += 1;
            let seq = state.next_seq;
            state.records.push((seq, result.clone()));
        }
        Ok(())
    }

    async fn drain_all(&self) -> Result<StagedSet, StagingError> {
        let state = self.state.lock().await;
        Ok(StagedSet {
            records: state.records.iter().map(|(_, r)| r.clone()).collect(),
            through: StageMark(state.records.last().map_or(0, |(seq, _)| *seq)),
        })
    }

    async fn clear(&self, through: StageMark) -> Result<(), StagingError> {
        let mut state = self.state.lock().await;
        state.records.retain(|(seq, _)| *seq > through.0);
        Ok(())
    }

    async fn len(&self) -> Result<usize, StagingError> {
        Ok(self.state.lock().await.records.len())
    }

    async fn mark_failed(&self, urls: &[String]) -> Result<(), StagingError> {
        let mut state = self.state.lock().await;
        for url in urls {
            *state.failed.entry(url.clone()).or_default() += 1;
        }
        Ok(())
    }

    async fn failed_ids(&self) -> Result<HashSet<String>, StagingError> {
        let state = self.state.lock().await;
        Ok(state.failed.keys().cloned().collect())
    }

    async fn failure_counts(&self, urls: &[String]) -> Result<HashMap<String, u32>, StagingError> {
        let state = self.state.lock().await;
        Ok(urls
            .iter()
            .filter_map(|url| state.failed.get(url).map(|n| (url.clone(), *n)))
            .collect())
    }

    async fn resolve(&self, urls: &[String]) -> Result<(), StagingError> {
        let mut state = self.state.lock().await;
        for url in urls {
            state.failed.remove(url);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, WorkerIdentity};
    use chrono::Utc;

    fn failed(id: i64) -> ExtractionResult {
        let task = Task::new(id, format!("http://x/{id}"), "");
        ExtractionResult::failed(&task, Utc::now(), WorkerIdentity::new("w"), "boom")
    }

    #[tokio::test]
    async fn append_is_ordered_and_drain_is_non_destructive() {
        let cache = InMemoryStagingCache::new();
        cache.append(&[failed(1)]).await.unwrap();
        cache.append(&[failed(2), failed(3)]).await.unwrap();

        let staged = cache.drain_all().await.unwrap();
        let ids: Vec<i64> = staged.records.iter().map(|r| r.task_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(cache.len().await.unwrap(), 3);

        cache.clear(staged.through).await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_keeps_records_appended_after_the_drain() {
        let cache = InMemoryStagingCache::new();
        cache.append(&[failed(1)]).await.unwrap();
        let staged = cache.drain_all().await.unwrap();

        cache.append(&[failed(2)]).await.unwrap();
        cache.clear(staged.through).await.unwrap();

        let left = cache.drain_all().await.unwrap();
        let ids: Vec<i64> = left.records.iter().map(|r| r.task_id).collect();
        assert_eq!(ids, vec![2]);
        assert!(left.through > staged.through);
    }

    #[tokio::test]
    async fn failed_set_counts_and_resolves() {
        let cache = InMemoryStagingCache::new();
        let a = "http://x/a".to_string();
        let b = "http://x/b".to_string();

        cache.mark_failed(&[a.clone(), b.clone()]).await.unwrap();
        cache.mark_failed(&[a.clone()]).await.unwrap();

        let counts = cache
            .failure_counts(&[a.clone(), b.clone(), "http://x/c".to_string()])
            .await
            .unwrap();
        assert_eq!(counts[&a], 2);
        assert_eq!(counts[&b], 1);
        assert_eq!(counts.len(), 2);

        cache.resolve(&[a.clone()]).await.unwrap();
        let ids = cache.failed_ids().await.unwrap();
        assert!(!ids.contains(&a));
        assert!(ids.contains(&b));
    }

    #[tokio::test]
    async fn clear_leaves_failed_set_alone() {
        let cache = InMemoryStagingCache::new();
        cache.append(&[failed(1)]).await.unwrap();
        cache.mark_failed(&["http://x/1".to_string()]).await.unwrap();

        let staged = cache.drain_all().await.unwrap();
        cache.clear(staged.through).await.unwrap();
        assert_eq!(cache.failed_ids().await.unwrap().len(), 1);
    }
}
