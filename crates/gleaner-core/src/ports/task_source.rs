//! TaskSource port - キュー API からバッチを取る

use async_trait::async_trait;

use crate::domain::{Batch, SourceError};

/// Fetches the next batch of tasks plus its trailing control signal.
///
/// Implementations strip the signal from the task list before returning and
/// map every transport/decoding problem to [`SourceError`]; the control loop
/// treats any error here like an `Error` signal.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_batch(&self) -> Result<Batch, SourceError>;
}
