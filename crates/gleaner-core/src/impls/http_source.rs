//! HttpTaskSource - キュー API クライアント（本番用）

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::domain::{Batch, SourceError};
use crate::ports::TaskSource;

const URLS_PATH: &str = "/api/urls";

/// Fetches `GET {base_url}/api/urls`.
pub struct HttpTaskSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTaskSource {
    /// `base_url` is scheme + authority, e.g. `http://queue:8000`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Unreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), URLS_PATH),
        })
    }

    pub fn from_host_port(host: &str, port: u16, timeout: Duration) -> Result<Self, SourceError> {
        Self::new(&format!("http://{host}:{port}"), timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn map_transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Unreachable(e.to_string())
    }
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch_batch(&self) -> Result<Batch, SourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(map_transport_error)?;
        let raw: Vec<Value> = serde_json::from_slice(&body)
            .map_err(|e| SourceError::Malformed(format!("body is not a JSON array: {e}")))?;

        let batch = Batch::from_raw(raw)?;
        debug!(tasks = batch.tasks.len(), signal = ?batch.signal, "fetched batch");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ControlSignal;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/urls"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn fetches_and_strips_signal() {
        let server = serve(ResponseTemplate::new(200).set_body_json(json!([
            {"ID": 1, "part_url": "http://x/a", "part_name": "A"},
            {"ID": 2, "part_url": "http://x/b", "part_name": "B"},
            {"timeout": 2}
        ])))
        .await;

        let source = HttpTaskSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let batch = source.fetch_batch().await.unwrap();

        assert_eq!(batch.tasks.len(), 2);
        assert_eq!(batch.tasks[0].label, "A");
        assert_eq!(batch.signal, ControlSignal::Timeout(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let server = serve(ResponseTemplate::new(503)).await;
        let source = HttpTaskSource::new(&server.uri(), Duration::from_secs(5)).unwrap();

        assert!(matches!(
            source.fetch_batch().await,
            Err(SourceError::Status(503))
        ));
    }

    #[tokio::test]
    async fn non_array_body_is_malformed() {
        let server = serve(ResponseTemplate::new(200).set_body_json(json!({"done": true}))).await;
        let source = HttpTaskSource::new(&server.uri(), Duration::from_secs(5)).unwrap();

        assert!(matches!(
            source.fetch_batch().await,
            Err(SourceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"done": true}]))
                .set_delay(Duration::from_millis(500)),
        )
        .await;
        let source = HttpTaskSource::new(&server.uri(), Duration::from_millis(50)).unwrap();

        assert!(matches!(source.fetch_batch().await, Err(SourceError::Timeout)));
    }

    #[tokio::test]
    async fn unreachable_endpoint() {
        let source = HttpTaskSource::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            source.fetch_batch().await,
            Err(SourceError::Unreachable(_) | SourceError::Timeout)
        ));
    }
}
