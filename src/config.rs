use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:5000";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Runtime settings injected by whoever wires the dashboard together.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Base address of the scanning/rendering service.
    pub api_base: Url,
    /// Directory exported reports are saved into.
    pub output_dir: PathBuf,
    /// Upper bound for one scan or HTML export round-trip.
    pub request_timeout: Duration,
    /// Address the local dashboard API listens on.
    pub bind: String,
}

impl DashboardConfig {
    /// Build a config, rejecting base addresses that are not http(s).
    pub fn new(api_base: &str, output_dir: PathBuf, request_timeout: Duration) -> Result<Self> {
        let api_base = Url::parse(api_base.trim())
            .with_context(|| format!("invalid API base URL: {api_base}"))?;
        if !matches!(api_base.scheme(), "http" | "https") {
            bail!("API base URL must be http or https: {api_base}");
        }
        Ok(Self {
            api_base,
            output_dir,
            request_timeout,
            bind: DEFAULT_BIND.to_string(),
        })
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// `{api_base}/{path}` regardless of a trailing slash on the base.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// HTTP client shared by the scan client and the exporter.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("scanboard-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse(DEFAULT_API_BASE).expect("default API base is a valid URL"),
            output_dir: PathBuf::from("."),
            request_timeout: Duration::from_secs(300),
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_with_single_slash() {
        let cfg = DashboardConfig::new("http://scanner:5000/api/", ".".into(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(cfg.endpoint("/scan"), "http://scanner:5000/api/scan");
        assert_eq!(cfg.endpoint("download/html"), "http://scanner:5000/api/download/html");
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(DashboardConfig::new("ftp://host", ".".into(), Duration::from_secs(1)).is_err());
        assert!(DashboardConfig::new("not a url", ".".into(), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn default_points_at_local_service() {
        let cfg = DashboardConfig::default();
        assert_eq!(cfg.endpoint("scan"), "http://127.0.0.1:5000/scan");
        assert_eq!(cfg.bind, DEFAULT_BIND);
    }
}
