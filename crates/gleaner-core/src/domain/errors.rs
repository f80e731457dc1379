//! Error taxonomy.
//!
//! 失敗は粒度ごとに型を分ける:
//! - タスク単位: `NavigateError::Page` / `ExtractError` → 結果を `failed` にしてバッチ続行
//! - セッション単位: `SessionError` → バッチ中断、次サイクルで再起動
//! - サイクル単位: `SourceError` / `PersistError` / `StagingError` → backoff
//!
//! None of these are fatal to the process. Only `ConfigError` (in the worker
//! binary) may stop startup.

use thiserror::Error;

use crate::codec::CodecError;

/// The task source could not produce a usable batch (`SourceUnavailable`).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("task source unreachable: {0}")]
    Unreachable(String),

    #[error("task source returned HTTP {0}")]
    Status(u16),

    #[error("task source timed out")]
    Timeout,

    #[error("malformed batch: {0}")]
    Malformed(String),
}

/// Navigation outcome that is not a rendered page.
#[derive(Debug, Error)]
pub enum NavigateError {
    /// This page failed; the session is still usable.
    #[error("navigation failed: {0}")]
    Page(String),

    /// The session itself is gone (browser crashed, CDP channel closed).
    #[error("rendering session lost: {0}")]
    SessionLost(String),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Page-identity marker absent: we did not land on an item page.
    #[error("wrong page")]
    WrongPage,

    #[error("markup extraction failed: {0}")]
    Markup(String),
}

/// The rendering session is unusable (`SessionFailure`).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to launch rendering session: {0}")]
    Launch(String),

    #[error("rendering session lost: {0}")]
    Lost(String),

    #[error("timed out acquiring rendering session")]
    Timeout,

    #[error("rendering session teardown failed: {0}")]
    Teardown(String),
}

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staging backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Writing to the permanent store failed; the staged set is left intact.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write record for {url}: {reason}")]
    Write { url: String, reason: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store operation timed out")]
    Timeout,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("staging cache error after flush: {0}")]
    Staging(#[from] StagingError),
}

/// Whole-call failure of the extraction engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// Anything that can end a loop cycle early.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("cycle task aborted: {0}")]
    Aborted(String),
}
