//! PipelineConfig - ループと各ステージに渡す設定
//!
//! プロセス全体のグローバル変数は持たない。ControlLoop の構築時に渡し、
//! そこから各コンポーネントへ必要な値だけを配る。

use std::time::Duration;

use super::backoff::BackoffPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Per-task page load limit.
    pub navigation_timeout: Duration,

    pub session_open_timeout: Duration,

    /// Limit for one permanent-store call (upsert batch, failed-row query).
    pub store_timeout: Duration,

    /// Max rows collected per recovery pass.
    pub recovery_batch_size: usize,

    /// Consecutive failures (first attempt included) after which a URL is
    /// no longer collected for recovery.
    pub max_recovery_attempts: u32,

    /// Inter-item delay during recovery passes.
    pub recovery_item_delay: Duration,

    pub backoff: BackoffPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(60),
            session_open_timeout: Duration::from_secs(60),
            store_timeout: Duration::from_secs(30),
            recovery_batch_size: 300,
            max_recovery_attempts: 5,
            recovery_item_delay: Duration::from_secs(2),
            backoff: BackoffPolicy::default(),
        }
    }
}
