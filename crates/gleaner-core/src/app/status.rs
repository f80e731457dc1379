//! Status - サイクルごとの結果レポート
//!
//! ControlLoop は 1 サイクルごとに [`CycleReport`] を返す。どの状態を通ったかが
//! そのまま残るので、ログにもテストにも使える。

use std::fmt;
use std::ops::Add;
use std::time::Duration;

use crate::domain::CycleId;

/// States of the control loop.
///
/// `Fetch → {Scrape, Backoff, Recover}`; `Recover` is always followed by
/// `Backoff`. Dispatch is implied by the transition out of `Fetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetch,
    Scrape { delay: Duration },
    Recover,
    Backoff(Duration),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Fetch => f.write_str("fetch"),
            Phase::Scrape { delay } => write!(f, "scrape(delay={delay:?})"),
            Phase::Recover => f.write_str("recover"),
            Phase::Backoff(d) => write!(f, "backoff({d:?})"),
        }
    }
}

/// Outcome of one persistence flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records read from the staging cache.
    pub staged: usize,
    pub inserted: usize,
    pub updated: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.staged == 0
    }
}

impl Add for FlushReport {
    type Output = FlushReport;

    fn add(self, rhs: FlushReport) -> FlushReport {
        FlushReport {
            staged: self.staged + rhs.staged,
            inserted: self.inserted + rhs.inserted,
            updated: self.updated + rhs.updated,
        }
    }
}

/// What one loop cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle_id: CycleId,

    /// States visited, in order.
    pub phases: Vec<Phase>,

    /// Results produced by the extraction engine this cycle.
    pub scraped: usize,

    /// Set when the cycle reached the persistence stage and it succeeded.
    pub flushed: Option<FlushReport>,

    /// Sleep requested before the next fetch.
    pub backoff: Option<Duration>,
}

impl CycleReport {
    pub fn new(cycle_id: CycleId) -> Self {
        Self {
            cycle_id,
            phases: vec![Phase::Fetch],
            scraped: 0,
            flushed: None,
            backoff: None,
        }
    }

    pub(crate) fn enter_backoff(&mut self, delay: Duration) {
        self.phases.push(Phase::Backoff(delay));
        self.backoff = Some(delay);
    }

    /// Phases as a compact string for log fields.
    pub fn path(&self) -> String {
        self.phases
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
