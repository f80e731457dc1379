//! StagingCache port - 抽出と永続化の間の耐久バッファ
//!
//! 2 つのコレクションを持つ:
//! - staged records: append-only の順序付きリスト（flush 成功後にだけ clear）
//! - failed set: 失敗した URL と連続失敗回数（再起動をまたいで残る）
//!
//! 同じ staged records を複数プロセスが共有しうるので、`clear` は
//! `drain_all` が返した [`StageMark`] までしか消さない。読んだ後に追加された分は残る。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::domain::{ExtractionResult, StagingError};

/// Position of the newest record a [`StagingCache::drain_all`] returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct StageMark(pub i64);

/// What `drain_all` read, plus the mark to clear through once it is persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedSet {
    pub records: Vec<ExtractionResult>,
    pub through: StageMark,
}

impl StagedSet {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
pub trait StagingCache: Send + Sync {
    /// Append results in order. Never removes anything.
    async fn append(&self, results: &[ExtractionResult]) -> Result<(), StagingError>;

    /// Everything staged since the last clear, in staged order.
    ///
    /// Non-destructive: records stay staged until [`StagingCache::clear`].
    async fn drain_all(&self) -> Result<StagedSet, StagingError>;

    /// Drop staged records up to and including `through`. Records appended
    /// after that `drain_all` survive. Only the persistence stage calls this,
    /// and only after a fully successful flush.
    async fn clear(&self, through: StageMark) -> Result<(), StagingError>;

    async fn len(&self) -> Result<usize, StagingError>;

    /// Record one more consecutive failure for each URL.
    async fn mark_failed(&self, urls: &[String]) -> Result<(), StagingError>;

    async fn failed_ids(&self) -> Result<HashSet<String>, StagingError>;

    /// Consecutive failure counts for the given URLs. URLs not in the failed
    /// set are absent from the map.
    async fn failure_counts(&self, urls: &[String]) -> Result<HashMap<String, u32>, StagingError>;

    /// Remove URLs whose latest persisted attempt succeeded.
    async fn resolve(&self, urls: &[String]) -> Result<(), StagingError>;
}
