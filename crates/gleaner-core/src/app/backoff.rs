//! Backoff policy: decides how long the control loop sleeps.

use std::time::Duration;

/// Sleep durations for each kind of cycle ending.
///
/// Consecutive `SourceUnavailable` cycles grow exponentially from `short`:
/// delay = short * multiplier^(failures - 1), capped at `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Source unreachable, or the cycle itself failed.
    pub short: Duration,

    /// Queue answered with an `Error` signal.
    pub error: Duration,

    /// After every recovery pass.
    pub recovery: Duration,

    pub multiplier: f64,

    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(5),
            error: Duration::from_secs(30),
            recovery: Duration::from_secs(100),
            multiplier: 2.0,
            max: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    /// Delay after the `failures`-th consecutive source failure (1-indexed).
    pub fn after_source_failure(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.short.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_matches_loop_timings() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.short, Duration::from_secs(5));
        assert_eq!(policy.error, Duration::from_secs(30));
        assert_eq!(policy.recovery, Duration::from_secs(100));
    }

    #[rstest]
    #[case(0, 5)]
    #[case(1, 5)]
    #[case(2, 10)]
    #[case(3, 20)]
    #[case(7, 300)]
    #[case(u32::MAX, 300)]
    fn source_failures_grow_until_capped(#[case] failures: u32, #[case] secs: u64) {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.after_source_failure(failures), Duration::from_secs(secs));
    }
}
