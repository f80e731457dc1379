//! RecordStore port - 正本（permanent store）
//!
//! 行は `url` で一意。書き込みは常に upsert で、同じバッチを何度流しても
//! 一度流したのと同じ状態になる（複数ワーカーが同じ URL を書いても最後の書き込みに収束）。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ExtractionResult, PersistError, PersistentRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Keyset position in the failed listing, ordered by `(issued_at, url)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCursor {
    pub issued_at: DateTime<Utc>,
    pub url: String,
}

impl FailedCursor {
    pub fn after(record: &PersistentRecord) -> Self {
        Self {
            issued_at: record.issued_at,
            url: record.url.clone(),
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Upsert every result by URL, in order, all-or-nothing.
    ///
    /// Merge semantics follow [`PersistentRecord::apply`].
    async fn upsert_batch(
        &self,
        results: &[ExtractionResult],
    ) -> Result<UpsertSummary, PersistError>;

    /// At most `limit` rows with `status = failed`, oldest attempt first,
    /// strictly after `after` when given.
    async fn list_failed(
        &self,
        limit: usize,
        after: Option<&FailedCursor>,
    ) -> Result<Vec<PersistentRecord>, PersistError>;

    async fn get(&self, url: &str) -> Result<Option<PersistentRecord>, PersistError>;

    async fn count(&self) -> Result<usize, PersistError>;
}
