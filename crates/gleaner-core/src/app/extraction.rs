//! ExtractionEngine - 1 セッションでバッチを順番に処理する
//!
//! # フロー
//! 1. `Renderer::open()` でセッションを 1 つ取得（timeout 付き）
//! 2. タスクごとに navigate → identity 確認 → 抽出
//! 3. 結果はできた順にすぐ StagingCache へ append（失敗は mark_failed も）
//! 4. どの経路で終わっても `close()` を await してから返す
//!
//! タスク単位の失敗（ページエラー・wrong page・抽出の panic・timeout）は
//! `failed` の結果になるだけでバッチは止まらない。セッション自体が死んだ
//! ときだけ `SessionError::Lost` で呼び出し全体が失敗する。

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::domain::{
    EngineError, ExtractedPage, ExtractionResult, NavigateError, SessionError, Task,
    WorkerIdentity,
};
use crate::ports::{Clock, MarkupExtractor, RenderSession, Renderer, StagingCache};

/// How a single task attempt went wrong.
enum TaskFailure {
    /// This task only; the session keeps going.
    Task(String),
    /// The session is gone; nothing after this task can run.
    SessionLost(String),
}

pub struct ExtractionEngine {
    renderer: Arc<dyn Renderer>,
    extractor: Arc<dyn MarkupExtractor>,
    staging: Arc<dyn StagingCache>,
    clock: Arc<dyn Clock>,
    navigation_timeout: Duration,
    session_open_timeout: Duration,
}

impl ExtractionEngine {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        extractor: Arc<dyn MarkupExtractor>,
        staging: Arc<dyn StagingCache>,
        clock: Arc<dyn Clock>,
        navigation_timeout: Duration,
        session_open_timeout: Duration,
    ) -> Self {
        Self {
            renderer,
            extractor,
            staging,
            clock,
            navigation_timeout,
            session_open_timeout,
        }
    }

    /// Scrape `tasks` in order with one rendering session.
    ///
    /// Returns one result per task. Every result is already staged when this
    /// returns, including the results produced before a session failure.
    pub async fn run(
        &self,
        tasks: &[Task],
        delay: Duration,
        identity: &WorkerIdentity,
    ) -> Result<Vec<ExtractionResult>, EngineError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let mut session = match timeout(self.session_open_timeout, self.renderer.open()).await {
            Ok(opened) => opened?,
            Err(_) => return Err(SessionError::Timeout.into()),
        };

        let span = info_span!("extraction", session_id = %session.id(), tasks = tasks.len());
        let outcome = self
            .drive(session.as_mut(), tasks, delay, identity)
            .instrument(span.clone())
            .await;

        // teardown はどの経路でも必ず通す
        let session_id = session.id();
        if let Err(e) = session.close().await {
            warn!(parent: &span, %session_id, error = %e, "session teardown failed");
        }

        if let Ok(results) = &outcome {
            let failed = results.iter().filter(|r| !r.is_success()).count();
            info!(parent: &span, scraped = results.len(), failed, "batch extracted");
        }
        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn RenderSession,
        tasks: &[Task],
        delay: Duration,
        identity: &WorkerIdentity,
    ) -> Result<Vec<ExtractionResult>, EngineError> {
        let mut results = Vec::with_capacity(tasks.len());

        for (idx, task) in tasks.iter().enumerate() {
            if idx > 0 && !delay.is_zero() {
                sleep(delay).await;
            }

            let issued_at = self.clock.now();
            let (result, lost) = match self.attempt(session, task).await {
                Ok(page) => {
                    let completed_at = self.clock.now();
                    debug!(task_id = task.id, url = %task.url, "task extracted");
                    let result = ExtractionResult::success(
                        task,
                        page,
                        issued_at,
                        identity.clone(),
                        completed_at,
                    );
                    (result, None)
                }
                Err(TaskFailure::Task(reason)) => {
                    warn!(task_id = task.id, url = %task.url, %reason, "task failed");
                    let result =
                        ExtractionResult::failed(task, issued_at, identity.clone(), reason);
                    (result, None)
                }
                Err(TaskFailure::SessionLost(reason)) => {
                    warn!(task_id = task.id, url = %task.url, %reason, "session lost mid-batch");
                    let result = ExtractionResult::failed(
                        task,
                        issued_at,
                        identity.clone(),
                        format!("rendering session lost: {reason}"),
                    );
                    (result, Some(reason))
                }
            };

            self.stage(&result).await?;
            results.push(result);

            if let Some(reason) = lost {
                return Err(SessionError::Lost(reason).into());
            }
        }

        Ok(results)
    }

    async fn attempt(
        &self,
        session: &mut dyn RenderSession,
        task: &Task,
    ) -> Result<ExtractedPage, TaskFailure> {
        let markup = match timeout(self.navigation_timeout, session.navigate(&task.url)).await {
            Ok(Ok(markup)) => markup,
            Ok(Err(NavigateError::SessionLost(reason))) => {
                return Err(TaskFailure::SessionLost(reason));
            }
            Ok(Err(e @ NavigateError::Page(_))) => return Err(TaskFailure::Task(e.to_string())),
            Err(_) => {
                return Err(TaskFailure::Task(format!(
                    "navigation timed out after {}s",
                    self.navigation_timeout.as_secs()
                )));
            }
        };

        let extractor = Arc::clone(&self.extractor);
        match catch_unwind(AssertUnwindSafe(|| extractor.extract(&markup))) {
            Ok(extracted) => extracted.map_err(|e| TaskFailure::Task(e.to_string())),
            Err(_) => Err(TaskFailure::Task("extractor panicked".to_string())),
        }
    }

    async fn stage(&self, result: &ExtractionResult) -> Result<(), EngineError> {
        self.staging.append(std::slice::from_ref(result)).await?;
        if !result.is_success() {
            self.staging.mark_failed(&[result.url.clone()]).await?;
        }
        Ok(())
    }
}
