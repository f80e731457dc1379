//! Trailing control signal of a fetched batch.

use std::time::Duration;

use serde_json::Value;

use super::errors::SourceError;
use super::task::Task;

/// How the current cycle should proceed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlSignal {
    /// Scrape the batch, sleeping `delay` between items.
    Timeout(Duration),
    /// Upstream queue is unhealthy; skip this cycle.
    Error,
    /// No new work; run a recovery pass.
    Done,
}

impl ControlSignal {
    /// Decode the trailing element of a raw batch.
    ///
    /// `{"timeout": n}` (seconds, integer or float), `{"error": _}`, `{"done": _}`.
    pub fn from_element(element: &Value) -> Result<Self, SourceError> {
        let Some(obj) = element.as_object() else {
            return Err(SourceError::Malformed(format!(
                "trailing element is not an object: {element}"
            )));
        };

        if let Some(raw) = obj.get("timeout") {
            let secs = raw.as_f64().ok_or_else(|| {
                SourceError::Malformed(format!("timeout is not a number: {raw}"))
            })?;
            let delay = Duration::try_from_secs_f64(secs)
                .map_err(|_| SourceError::Malformed(format!("invalid timeout: {secs}")))?;
            return Ok(Self::Timeout(delay));
        }
        if obj.contains_key("error") {
            return Ok(Self::Error);
        }
        if obj.contains_key("done") {
            return Ok(Self::Done);
        }

        Err(SourceError::Malformed(format!(
            "trailing element carries no control signal: {element}"
        )))
    }
}

/// A fetched batch with its signal already stripped off the task list.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub tasks: Vec<Task>,
    pub signal: ControlSignal,
}

impl Batch {
    /// Split a raw queue response into tasks + signal.
    ///
    /// The last element is always the signal. Any descriptor that fails to
    /// decode rejects the whole batch: partial batches are never scraped.
    pub fn from_raw(mut raw: Vec<Value>) -> Result<Self, SourceError> {
        let last = raw
            .pop()
            .ok_or_else(|| SourceError::Malformed("empty batch".to_string()))?;
        let signal = ControlSignal::from_element(&last)?;

        let tasks = raw
            .into_iter()
            .enumerate()
            .map(|(idx, value)| {
                serde_json::from_value::<Task>(value)
                    .map_err(|e| SourceError::Malformed(format!("descriptor #{idx}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { tasks, signal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({"timeout": 2}), ControlSignal::Timeout(Duration::from_secs(2)))]
    #[case(json!({"timeout": 0.5}), ControlSignal::Timeout(Duration::from_millis(500)))]
    #[case(json!({"error": "queue down"}), ControlSignal::Error)]
    #[case(json!({"done": true}), ControlSignal::Done)]
    fn decodes_each_variant(#[case] element: Value, #[case] expected: ControlSignal) {
        assert_eq!(ControlSignal::from_element(&element).unwrap(), expected);
    }

    #[rstest]
    #[case(json!({"timeout": -1}))]
    #[case(json!({"timeout": "soon"}))]
    #[case(json!({"id": 1, "url": "http://x/a"}))]
    #[case(json!([1, 2]))]
    fn rejects_bad_trailers(#[case] element: Value) {
        assert!(matches!(
            ControlSignal::from_element(&element),
            Err(SourceError::Malformed(_))
        ));
    }

    #[test]
    fn strips_signal_from_task_list() {
        let raw = vec![
            json!({"id": 1, "url": "http://x/a"}),
            json!({"id": 2, "url": "http://x/b"}),
            json!({"timeout": 2}),
        ];
        let batch = Batch::from_raw(raw).unwrap();
        assert_eq!(batch.tasks.len(), 2);
        assert_eq!(batch.tasks[1].url, "http://x/b");
        assert_eq!(batch.signal, ControlSignal::Timeout(Duration::from_secs(2)));
    }

    #[test]
    fn signal_only_batch_has_no_tasks() {
        let batch = Batch::from_raw(vec![json!({"done": true})]).unwrap();
        assert!(batch.tasks.is_empty());
        assert_eq!(batch.signal, ControlSignal::Done);
    }

    #[test]
    fn empty_batch_is_malformed() {
        assert!(matches!(
            Batch::from_raw(vec![]),
            Err(SourceError::Malformed(_))
        ));
    }

    #[test]
    fn one_bad_descriptor_rejects_the_batch() {
        let raw = vec![
            json!({"id": 1, "url": "http://x/a"}),
            json!({"url": "http://x/b"}),
            json!({"timeout": 1}),
        ];
        assert!(matches!(
            Batch::from_raw(raw),
            Err(SourceError::Malformed(msg)) if msg.contains("#1")
        ));
    }
}
