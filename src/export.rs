use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ::time::OffsetDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::remote_error_message;
use crate::config::DashboardConfig;
use crate::error::ExportError;
use crate::types::ScanReport;

pub const HTML_EXPORT_PATH: &str = "download/html";
pub const HTML_FAILED_MESSAGE: &str = "Failed to generate HTML report";

/// Bytes ready to be handed to a [`FileSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// An artifact together with where the sink put it.
#[derive(Debug, Clone)]
pub struct ExportedReport {
    pub artifact: FileArtifact,
    pub location: PathBuf,
}

/// The local "save file" mechanism.
pub trait FileSink: Send + Sync {
    fn save(&self, artifact: &FileArtifact) -> io::Result<PathBuf>;
}

/// Saves artifacts into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileSink for DirectorySink {
    fn save(&self, artifact: &FileArtifact) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&artifact.filename);
        fs::write(&path, &artifact.bytes)?;
        Ok(path)
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// `scan_report_<unix_ms>.<extension>`
pub fn report_filename(extension: &str, millis: i128) -> String {
    format!("scan_report_{millis}.{extension}")
}

#[derive(Serialize)]
struct HtmlExportRequest<'a> {
    scan_data: &'a ScanReport,
}

/// Clears the pending flag on every exit path.
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Produces JSON (locally) and HTML (remotely rendered) report files.
#[derive(Clone)]
pub struct ReportExporter {
    http: reqwest::Client,
    html_url: String,
    sink: Arc<dyn FileSink>,
    html_pending: Arc<AtomicBool>,
}

impl ReportExporter {
    pub fn new(config: &DashboardConfig, http: reqwest::Client, sink: Arc<dyn FileSink>) -> Self {
        Self {
            http,
            html_url: config.endpoint(HTML_EXPORT_PATH),
            sink,
            html_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while an HTML export round-trip is in flight.
    pub fn is_html_pending(&self) -> bool {
        self.html_pending.load(Ordering::Acquire)
    }

    /// Pretty-printed JSON, saved as `scan_report_<unix_ms>.json`.
    pub fn export_json(&self, report: &ScanReport) -> Result<ExportedReport, ExportError> {
        let bytes = serde_json::to_vec_pretty(report).map_err(|e| {
            warn!(error = %e, "report failed to serialize");
            ExportError::SerializationFailed(e)
        })?;
        let artifact = FileArtifact {
            filename: report_filename("json", unix_millis()),
            content_type: "application/json".to_string(),
            bytes,
        };
        self.save(artifact)
    }

    /// Ask the remote renderer for an HTML document and save it verbatim as
    /// `scan_report_<unix_ms>.html`.
    ///
    /// Only one HTML export may be in flight; a concurrent call fails with
    /// [`ExportError::AlreadyPending`] without contacting the renderer.
    pub async fn export_html(&self, report: &ScanReport) -> Result<ExportedReport, ExportError> {
        if self
            .html_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ExportError::AlreadyPending);
        }
        let _pending = PendingGuard(&self.html_pending);

        debug!(target_url = %report.target, endpoint = %self.html_url, "requesting HTML report");
        let response = self
            .http
            .post(&self.html_url)
            .json(&HtmlExportRequest { scan_data: report })
            .send()
            .await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let message = remote_error_message(&body, HTML_FAILED_MESSAGE);
            warn!(%status, %message, "HTML export rejected");
            return Err(ExportError::RemoteRejected(message));
        }
        let body = response.bytes().await?;

        let artifact = FileArtifact {
            filename: report_filename("html", unix_millis()),
            content_type,
            bytes: body.to_vec(),
        };
        self.save(artifact)
    }

    fn save(&self, artifact: FileArtifact) -> Result<ExportedReport, ExportError> {
        let location = self.sink.save(&artifact)?;
        info!(
            file = %artifact.filename,
            bytes = artifact.bytes.len(),
            location = %location.display(),
            "report exported"
        );
        Ok(ExportedReport { artifact, location })
    }
}
