//! ScriptedTaskSource - 決められた順にバッチ（またはエラー）を返す（テスト用）

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Batch, ControlSignal, SourceError};
use crate::ports::TaskSource;

pub struct ScriptedTaskSource {
    script: Mutex<VecDeque<Result<Batch, SourceError>>>,
}

impl ScriptedTaskSource {
    pub fn new(script: impl IntoIterator<Item = Result<Batch, SourceError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    pub async fn push(&self, next: Result<Batch, SourceError>) {
        self.script.lock().await.push_back(next);
    }
}

#[async_trait]
impl TaskSource for ScriptedTaskSource {
    /// Once the script runs out, the queue reports `Error` forever.
    async fn fetch_batch(&self) -> Result<Batch, SourceError> {
        self.script.lock().await.pop_front().unwrap_or(Ok(Batch {
            tasks: Vec::new(),
            signal: ControlSignal::Error,
        }))
    }
}
