//! Durable record: one row per URL, upserted on every attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::{ExtractionResult, ExtractionStatus, FieldMap};
use super::task::{Task, WorkerIdentity};

/// The permanent-store analogue of [`ExtractionResult`], keyed by `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentRecord {
    pub url: String,
    pub task_id: i64,
    pub label: String,
    pub status: ExtractionStatus,
    pub details: Option<FieldMap>,
    pub specs: Option<FieldMap>,
    pub attachment_url: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub issued_by: WorkerIdentity,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PersistentRecord {
    /// First sight of a URL.
    pub fn from_result(result: &ExtractionResult) -> Self {
        Self {
            url: result.url.clone(),
            task_id: result.task_id,
            label: result.label.clone(),
            status: result.status,
            details: result.details.clone(),
            specs: result.specs.clone(),
            attachment_url: result.attachment_url.clone(),
            issued_at: result.issued_at,
            issued_by: result.issued_by.clone(),
            completed_at: result.completed_at,
            last_error: result.error.clone(),
        }
    }

    /// Update in place with a later attempt at the same URL.
    ///
    /// Status and attempt metadata (including `completed_at`) always follow the
    /// latest attempt, so a failed row never carries a completion time.
    /// Extracted payload columns only move forward when the attempt produced
    /// them. The PostgreSQL store expresses the same rule with
    /// `COALESCE(EXCLUDED.col, col)`.
    pub fn apply(&mut self, result: &ExtractionResult) {
        debug_assert_eq!(self.url, result.url);

        self.task_id = result.task_id;
        self.label = result.label.clone();
        self.status = result.status;
        self.issued_at = result.issued_at;
        self.issued_by = result.issued_by.clone();
        self.completed_at = result.completed_at;
        self.last_error = result.error.clone();

        if result.details.is_some() {
            self.details = result.details.clone();
        }
        if result.specs.is_some() {
            self.specs = result.specs.clone();
        }
        if result.attachment_url.is_some() {
            self.attachment_url = result.attachment_url.clone();
        }
    }

    /// Rebuild the task that produced this row (recovery entry point).
    pub fn to_task(&self) -> Task {
        Task::new(self.task_id, self.url.clone(), self.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExtractedPage;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn success(h: u32) -> ExtractionResult {
        let task = Task::new(2, "http://x/b", "b");
        let mut page = ExtractedPage::default();
        page.details.insert("Maker".into(), "ACME".into());
        page.attachment_url = Some("/pdf/b.pdf".into());
        ExtractionResult::success(&task, page, at(h), WorkerIdentity::new("w1"), at(h))
    }

    fn failed(h: u32) -> ExtractionResult {
        let task = Task::new(2, "http://x/b", "b");
        ExtractionResult::failed(&task, at(h), WorkerIdentity::new("w2"), "wrong page")
    }

    #[test]
    fn later_failure_keeps_extracted_payload() {
        let mut record = PersistentRecord::from_result(&success(1));
        record.apply(&failed(2));

        assert_eq!(record.status, ExtractionStatus::Failed);
        assert_eq!(record.issued_at, at(2));
        assert_eq!(record.issued_by.as_str(), "w2");
        assert_eq!(record.last_error.as_deref(), Some("wrong page"));
        assert_eq!(record.details.as_ref().unwrap()["Maker"], "ACME");
        assert_eq!(record.completed_at, None);
    }

    #[test]
    fn recovery_success_clears_error() {
        let mut record = PersistentRecord::from_result(&failed(1));
        record.apply(&success(2));

        assert_eq!(record.status, ExtractionStatus::Success);
        assert!(record.last_error.is_none());
        assert_eq!(record.completed_at, Some(at(2)));
    }

    #[test]
    fn applying_a_sequence_twice_is_idempotent() {
        let seq = [success(1), failed(2)];

        let mut once = PersistentRecord::from_result(&seq[0]);
        once.apply(&seq[1]);

        let mut twice = once.clone();
        for r in &seq {
            twice.apply(r);
        }
        assert_eq!(once, twice);
    }

    #[test]
    fn to_task_rebuilds_descriptor() {
        let record = PersistentRecord::from_result(&failed(1));
        assert_eq!(record.to_task(), Task::new(2, "http://x/b", "b"));
    }
}
