//! ControlLoop - FETCH → DISPATCH → {SCRAPE, BACKOFF, RECOVER} → FETCH
//!
//! # 状態遷移
//! - FETCH: TaskSource からバッチ取得。失敗したら短い backoff（連続失敗で伸びる）
//! - DISPATCH: 末尾のシグナルで分岐
//!   - `Timeout(delay)` → SCRAPE（delay は今回のサイクルだけ有効）
//!   - `Error` → BACKOFF（error）
//!   - `Done` → RECOVER → BACKOFF（recovery）
//! - SCRAPE: engine → flush（タスクが空でも残りの staging は flush する）
//!
//! 各サイクルは `tokio::spawn` の中で走らせるので、`Err` も panic もここで
//! 止まり、短い backoff になるだけでプロセスは落ちない。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{Instrument, error, info, info_span, warn};

use crate::domain::{ControlSignal, CycleError, CycleId, Task, WorkerIdentity};
use crate::ports::{
    Clock, IdGenerator, MarkupExtractor, RecordStore, Renderer, StagingCache, TaskSource,
    UlidGenerator,
};

use super::backoff::BackoffPolicy;
use super::config::PipelineConfig;
use super::extraction::ExtractionEngine;
use super::persist::PersistenceStage;
use super::recovery::RecoveryCoordinator;
use super::status::{CycleReport, Phase};

/// Everything the loop talks to.
pub struct LoopPorts {
    pub source: Arc<dyn TaskSource>,
    pub renderer: Arc<dyn Renderer>,
    pub extractor: Arc<dyn MarkupExtractor>,
    pub staging: Arc<dyn StagingCache>,
    pub store: Arc<dyn RecordStore>,
    pub clock: Arc<dyn Clock>,
}

pub struct ControlLoop {
    source: Arc<dyn TaskSource>,
    engine: ExtractionEngine,
    persistence: PersistenceStage,
    recovery: RecoveryCoordinator,
    ids: UlidGenerator<Arc<dyn Clock>>,
    identity: WorkerIdentity,
    config: PipelineConfig,
    /// Consecutive `SourceUnavailable` cycles.
    source_failures: AtomicU32,
}

impl ControlLoop {
    pub fn new(ports: LoopPorts, identity: WorkerIdentity, config: PipelineConfig) -> Self {
        let engine = ExtractionEngine::new(
            ports.renderer,
            ports.extractor,
            Arc::clone(&ports.staging),
            Arc::clone(&ports.clock),
            config.navigation_timeout,
            config.session_open_timeout,
        );
        let persistence = PersistenceStage::new(
            Arc::clone(&ports.staging),
            Arc::clone(&ports.store),
            config.store_timeout,
        );
        let recovery = RecoveryCoordinator::new(
            ports.store,
            ports.staging,
            config.max_recovery_attempts,
            config.store_timeout,
        );

        Self {
            source: ports.source,
            engine,
            persistence,
            recovery,
            ids: UlidGenerator::new(ports.clock),
            identity,
            config,
            source_failures: AtomicU32::new(0),
        }
    }

    /// The state a signal leads to. Never returns `Fetch`.
    pub fn dispatch(signal: ControlSignal, backoff: &BackoffPolicy) -> Phase {
        match signal {
            ControlSignal::Timeout(delay) => Phase::Scrape { delay },
            ControlSignal::Error => Phase::Backoff(backoff.error),
            ControlSignal::Done => Phase::Recover,
        }
    }

    /// Run cycles until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// An in-flight cycle is allowed to finish so its rendering session is
    /// closed normally; only the backoff sleep is interrupted.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(identity = %self.identity, "control loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let this = Arc::clone(&self);
            let outcome = tokio::spawn(async move { this.run_cycle().await }).await;

            let delay = match outcome {
                Ok(Ok(report)) => {
                    info!(
                        cycle_id = %report.cycle_id,
                        path = %report.path(),
                        scraped = report.scraped,
                        "cycle finished"
                    );
                    report.backoff
                }
                Ok(Err(e)) => {
                    error!(error = %e, "cycle failed");
                    Some(self.config.backoff.short)
                }
                Err(join) => {
                    let e = CycleError::Aborted(join.to_string());
                    error!(error = %e, "cycle aborted");
                    Some(self.config.backoff.short)
                }
            };

            if let Some(delay) = delay {
                tokio::select! {
                    _ = sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("control loop stopped");
    }

    /// One FETCH → DISPATCH → ... pass.
    ///
    /// Source failures and recovery failures are handled here (they end in a
    /// backoff); scrape and flush failures are returned.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let cycle_id = self.ids.generate_cycle_id();
        let span = info_span!("cycle", %cycle_id);
        self.cycle(cycle_id).instrument(span).await
    }

    async fn cycle(&self, cycle_id: CycleId) -> Result<CycleReport, CycleError> {
        let mut report = CycleReport::new(cycle_id);

        let batch = match self.source.fetch_batch().await {
            Ok(batch) => {
                self.source_failures.store(0, Ordering::Relaxed);
                batch
            }
            Err(e) => {
                let failures = self.source_failures.fetch_add(1, Ordering::Relaxed) + 1;
                let delay = self.config.backoff.after_source_failure(failures);
                warn!(error = %e, failures, ?delay, "task source unavailable");
                report.enter_backoff(delay);
                return Ok(report);
            }
        };

        let next = Self::dispatch(batch.signal, &self.config.backoff);
        report.phases.push(next);

        match next {
            Phase::Scrape { delay } => {
                self.scrape_and_flush(&batch.tasks, delay, &mut report)
                    .await?;
            }
            Phase::Recover => {
                if let Err(e) = self.recover(&mut report).await {
                    error!(error = %e, "recovery pass failed");
                }
                report.enter_backoff(self.config.backoff.recovery);
            }
            Phase::Backoff(delay) => {
                info!(?delay, "queue reported an error; backing off");
                report.backoff = Some(delay);
            }
            Phase::Fetch => {}
        }

        Ok(report)
    }

    async fn scrape_and_flush(
        &self,
        tasks: &[Task],
        delay: Duration,
        report: &mut CycleReport,
    ) -> Result<(), CycleError> {
        let scraped = self.engine.run(tasks, delay, &self.identity).await;

        // エンジンが途中で失敗しても、そこまでの結果は staging にあるので流す
        let flushed = self.persistence.flush().await;

        let results = match scraped {
            Ok(results) => results,
            Err(e) => {
                match flushed {
                    Ok(f) => report.flushed = Some(report.flushed.unwrap_or_default() + f),
                    Err(flush_err) => {
                        warn!(error = %flush_err, "flush after engine failure also failed")
                    }
                }
                return Err(e.into());
            }
        };
        report.scraped += results.len();

        let f = flushed?;
        report.flushed = Some(report.flushed.unwrap_or_default() + f);
        Ok(())
    }

    async fn recover(&self, report: &mut CycleReport) -> Result<(), CycleError> {
        // 前サイクルの残りを先に書いておかないと failed の一覧が古くなる
        let leftovers = self.persistence.flush().await?;
        report.flushed = Some(leftovers);

        let tasks = self
            .recovery
            .collect_failed(self.config.recovery_batch_size)
            .await?;
        if tasks.is_empty() {
            return Ok(());
        }

        self.scrape_and_flush(&tasks, self.config.recovery_item_delay, report)
            .await
    }
}
