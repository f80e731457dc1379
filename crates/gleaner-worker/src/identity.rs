//! ワーカー ID の解決
//!
//! `WORKER_IDENTITY` があればそれを使い、なければ外向き IP を問い合わせる
//! （ipify → ident.me の順）。どれも取れなければ起動しない。

use std::time::Duration;

use gleaner_core::domain::WorkerIdentity;
use tracing::{info, warn};

use crate::config::ConfigError;

pub const EGRESS_IP_ENDPOINTS: [&str; 2] = ["https://api.ipify.org", "https://ident.me/"];

pub async fn resolve(
    configured: Option<&str>,
    timeout: Duration,
) -> Result<WorkerIdentity, ConfigError> {
    if let Some(name) = configured {
        info!(identity = name, "using configured worker identity");
        return Ok(WorkerIdentity::new(name));
    }
    egress_ip(&EGRESS_IP_ENDPOINTS, timeout).await
}

/// First endpoint that answers 2xx with a non-empty body wins.
pub async fn egress_ip(endpoints: &[&str], timeout: Duration) -> Result<WorkerIdentity, ConfigError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Identity(e.to_string()))?;

    let mut last_error = String::from("no endpoints configured");
    for endpoint in endpoints {
        match lookup(&client, endpoint).await {
            Ok(ip) => {
                info!(identity = %ip, endpoint, "resolved egress ip");
                return Ok(WorkerIdentity::new(ip));
            }
            Err(e) => {
                warn!(endpoint, error = %e, "egress ip lookup failed");
                last_error = format!("{endpoint}: {e}");
            }
        }
    }
    Err(ConfigError::Identity(last_error))
}

async fn lookup(client: &reqwest::Client, endpoint: &str) -> Result<String, String> {
    let response = client
        .get(endpoint)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| e.to_string())?;
    let body = response.text().await.map_err(|e| e.to_string())?;
    let ip = body.trim();
    if ip.is_empty() {
        return Err("empty response".to_string());
    }
    Ok(ip.to_string())
}
