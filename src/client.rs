use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::check_consistency;
use crate::channel::ResultChannel;
use crate::config::DashboardConfig;
use crate::error::ScanError;
use crate::types::ScanReport;

pub const SCAN_PATH: &str = "scan";
pub const SCAN_FAILED_MESSAGE: &str = "Scan request failed";

#[derive(Debug, Serialize)]
struct ScanRequest<'a> {
    url: &'a str,
}

/// Error body returned by the remote service on non-success statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Read the `error` field of a failure body, or `fallback` when the body is
/// not JSON or carries no usable message. Only a non-empty string counts;
/// `{"error": 42}` gets the fallback rather than a stringified number.
pub fn remote_error_message(body: &[u8], fallback: &str) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Submits scans to the remote scanner and publishes successful reports.
#[derive(Clone)]
pub struct ScanClient {
    http: reqwest::Client,
    scan_url: String,
    channel: ResultChannel,
}

impl ScanClient {
    pub fn new(config: &DashboardConfig, http: reqwest::Client, channel: ResultChannel) -> Self {
        Self {
            http,
            scan_url: config.endpoint(SCAN_PATH),
            channel,
        }
    }

    pub fn channel(&self) -> &ResultChannel {
        &self.channel
    }

    /// Run one scan of `target_url`.
    ///
    /// Sends a single request (no retries). On success the report is
    /// published on the channel before this returns; on any failure the
    /// channel is left as it was.
    pub async fn submit_scan(&self, target_url: &str) -> Result<Arc<ScanReport>, ScanError> {
        let target = target_url.trim();
        if target.is_empty() {
            return Err(ScanError::InvalidInput);
        }

        debug!(url = target, endpoint = %self.scan_url, "submitting scan");
        let response = self
            .http
            .post(&self.scan_url)
            .json(&ScanRequest { url: target })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            // An unreadable error body still counts as a rejection.
            let body = response.bytes().await.unwrap_or_default();
            let message = remote_error_message(&body, SCAN_FAILED_MESSAGE);
            warn!(url = target, %status, %message, "scan rejected");
            return Err(ScanError::RemoteRejected(message));
        }
        let body = response.bytes().await?;

        let report = ScanReport::from_slice(&body).map_err(|e| {
            warn!(url = target, error = %e, "malformed scan report");
            ScanError::MalformedResponse(e)
        })?;
        for issue in check_consistency(&report) {
            warn!(url = target, %issue, "inconsistent scan report");
        }

        let report = self.channel.publish(report);
        info!(
            url = target,
            total = report.total_vulnerabilities,
            unique = report.unique_vulnerabilities,
            "scan completed"
        );
        Ok(report)
    }
}
