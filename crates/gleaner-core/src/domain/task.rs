use serde::{Deserialize, Serialize};
use std::fmt;

/// One page to visit.
///
/// The queue endpoint names the fields `ID` / `part_url` / `part_name`;
/// both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "ID")]
    pub id: i64,

    #[serde(alias = "part_url")]
    pub url: String,

    /// Human-readable part/item label.
    #[serde(alias = "part_name", default)]
    pub label: String,
}

impl Task {
    pub fn new(id: i64, url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{} {}", self.id, self.url)
    }
}

/// Identity of the worker that issued an attempt (egress IP or operator name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerIdentity(String);

impl WorkerIdentity {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_queue_field_names() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "ID": 7,
            "part_url": "http://x/a",
            "part_name": "LM317"
        }))
        .unwrap();
        assert_eq!(task, Task::new(7, "http://x/a", "LM317"));
    }

    #[test]
    fn label_is_optional() {
        let task: Task =
            serde_json::from_value(serde_json::json!({"id": 1, "url": "http://x/a"})).unwrap();
        assert_eq!(task.label, "");
    }
}
