//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use scanboard_rs::channel::ResultChannel;
use scanboard_rs::client::ScanClient;
use scanboard_rs::config::DashboardConfig;
use scanboard_rs::export::{DirectorySink, ReportExporter};
use scanboard_rs::types::ScanReport;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Three unique findings (two high, one low) out of five total.
pub fn example_report_json() -> Value {
    json!({
        "target": "https://example.com",
        "total_vulnerabilities": 5,
        "unique_vulnerabilities": 3,
        "vulnerability_analysis": {
            "total_severity_counts": {"high": 3, "low": 2},
            "unique_severity_counts": {"high": 2, "low": 1},
            "unique_results": [
                {"type": "XSS", "description": "Reflected in q", "severity": "high", "affected_urls_count": 2},
                {"type": "XSS", "description": "Reflected in name", "severity": "high", "affected_urls_count": 1},
                {"type": "Info Leak", "description": "Server banner", "severity": "low", "affected_urls_count": 1}
            ]
        }
    })
}

pub fn example_report() -> ScanReport {
    scanboard_rs::types::validate(&example_report_json()).expect("fixture is valid")
}

/// A report distinguishable from the example by target and counts.
pub fn other_report_json() -> Value {
    json!({
        "target": "https://other.example",
        "total_vulnerabilities": 1,
        "unique_vulnerabilities": 1,
        "vulnerability_analysis": {
            "total_severity_counts": {"critical": 1},
            "unique_severity_counts": {"critical": 1},
            "unique_results": [
                {"type": "SQL Injection", "description": "id parameter", "severity": "critical", "affected_urls_count": 1}
            ]
        },
        "discovered_urls": ["https://other.example/", "https://other.example/item?id=1"]
    })
}

/// A report in the shape the scanning backend actually returns: capitalised
/// labels, injection and scan-error findings without a description, the
/// analysis extras and the raw `results` list.
pub fn backend_report_json() -> Value {
    let xss_search = json!({
        "type": "Reflected XSS (GET)",
        "payload": "<script>alert(1)</script>",
        "url": "https://shop.example/search?test=<script>alert(1)</script>",
        "severity": "High"
    });
    let xss_item = json!({
        "type": "Reflected XSS (GET)",
        "payload": "<script>alert(1)</script>",
        "url": "https://shop.example/item?test=<script>alert(1)</script>",
        "severity": "High"
    });
    let header = json!({
        "type": "Missing Security Header",
        "description": "X-Frame-Options header is missing",
        "url": "https://shop.example/",
        "severity": "Medium"
    });
    let scan_error = json!({
        "type": "Scan Error",
        "url": "https://shop.example/broken",
        "error": "Read timed out",
        "severity": "Low"
    });

    let mut xss_unique = xss_search.clone();
    xss_unique["affected_urls"] = json!([xss_search["url"], xss_item["url"]]);
    xss_unique["affected_urls_count"] = json!(2);
    let mut header_unique = header.clone();
    header_unique["affected_urls"] = json!(["https://shop.example/"]);
    header_unique["affected_urls_count"] = json!(1);
    let mut error_unique = scan_error.clone();
    error_unique["affected_urls"] = json!(["https://shop.example/broken"]);
    error_unique["affected_urls_count"] = json!(1);

    json!({
        "target": "https://shop.example",
        "discovered_urls": [
            "https://shop.example/",
            "https://shop.example/search",
            "https://shop.example/item",
            "https://shop.example/broken"
        ],
        "total_vulnerabilities": 4,
        "unique_vulnerabilities": 3,
        "vulnerability_analysis": {
            "total_count": 4,
            "unique_count": 3,
            "unique_results": [xss_unique, header_unique, error_unique],
            "total_severity_counts": {"High": 2, "Medium": 1, "Low": 1},
            "unique_severity_counts": {"High": 1, "Medium": 1, "Low": 1},
            "affected_urls_per_vuln": {
                "reflected xss (get)|": [xss_search["url"], xss_item["url"]],
                "missing security header|x-frame-options header is missing": ["https://shop.example/"],
                "scan error|": ["https://shop.example/broken"]
            }
        },
        "results": [xss_search, xss_item, header, scan_error]
    })
}

/// Serve one request with a 500 whose body is cut off mid-stream, then
/// close the connection. Returns the base URL.
pub async fn truncated_error_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        // Both request kinds carry a JSON object body.
        while !request.ends_with(b"}") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = socket
            .write_all(
                b"HTTP/1.1 500 Internal Server Error\r\n\
                  Content-Type: application/json\r\n\
                  Content-Length: 200\r\n\r\n{\"error\": \"par",
            )
            .await;
        let _ = socket.shutdown().await;
    });
    format!("http://{addr}")
}

pub fn test_config(api_base: &str, output_dir: &Path) -> DashboardConfig {
    DashboardConfig::new(api_base, output_dir.to_path_buf(), Duration::from_secs(10))
        .expect("valid test config")
}

pub fn test_client(config: &DashboardConfig, channel: ResultChannel) -> ScanClient {
    let http = config.http_client().expect("http client");
    ScanClient::new(config, http, channel)
}

pub fn test_exporter(config: &DashboardConfig) -> ReportExporter {
    let http = config.http_client().expect("http client");
    ReportExporter::new(
        config,
        http,
        Arc::new(DirectorySink::new(config.output_dir.clone())),
    )
}
