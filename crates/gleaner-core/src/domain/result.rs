//! Extraction results: one per task per attempt.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{Task, WorkerIdentity};

/// Key/value table pulled from a page ("details" or "specs").
pub type FieldMap = BTreeMap<String, String>;

/// Serialized as the persisted column values `success` / `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Success,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful extraction produced from a rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub details: FieldMap,
    pub specs: FieldMap,
    pub attachment_url: Option<String>,
}

/// Immutable outcome of one attempt at one task.
///
/// Invariants (held by the constructors):
/// - `completed_at` is set iff `status == Success`
/// - `error` is set iff `status == Failed`
/// - `details` / `specs` are `None` on failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub task_id: i64,
    pub url: String,
    pub label: String,
    pub status: ExtractionStatus,
    pub details: Option<FieldMap>,
    pub specs: Option<FieldMap>,
    pub attachment_url: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub issued_by: WorkerIdentity,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn success(
        task: &Task,
        page: ExtractedPage,
        issued_at: DateTime<Utc>,
        issued_by: WorkerIdentity,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task.id,
            url: task.url.clone(),
            label: task.label.clone(),
            status: ExtractionStatus::Success,
            details: Some(page.details),
            specs: Some(page.specs),
            attachment_url: page.attachment_url,
            issued_at,
            issued_by,
            completed_at: Some(completed_at),
            error: None,
        }
    }

    pub fn failed(
        task: &Task,
        issued_at: DateTime<Utc>,
        issued_by: WorkerIdentity,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task.id,
            url: task.url.clone(),
            label: task.label.clone(),
            status: ExtractionStatus::Failed,
            details: None,
            specs: None,
            attachment_url: None,
            issued_at,
            issued_by,
            completed_at: None,
            error: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExtractionStatus::Success
    }
}
