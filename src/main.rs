use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use scanboard_rs::aggregate::{severity_breakdown, severity_palette, SeverityFilter};
use scanboard_rs::channel::ResultChannel;
use scanboard_rs::client::ScanClient;
use scanboard_rs::config::{DashboardConfig, DEFAULT_API_BASE, DEFAULT_BIND};
use scanboard_rs::export::{DirectorySink, ReportExporter};
use scanboard_rs::server::{self, AppState};
use scanboard_rs::types::ScanReport;
use scanboard_rs::view::ResultsView;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Json,
    Html,
}

/// scanboard-rs — submit a web security scan, review findings by severity, export the report.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scanboard-rs",
    version,
    about = "Submit a web security scan, review findings by severity, export the report.",
    long_about = None
)]
struct Cli {
    /// Base URL of the scanning service (serves /scan and /download/html).
    #[arg(long = "api-base", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// URL to scan. If omitted, no scan is run.
    #[arg(long)]
    target: Option<String>,

    /// Only list findings of this severity ("all" for everything).
    #[arg(long, default_value = "all")]
    severity: String,

    /// Export the report after the scan (repeatable).
    #[arg(long, value_enum)]
    export: Vec<ExportFormat>,

    /// Directory exported reports are written to.
    #[arg(long = "output-dir", default_value = ".")]
    output_dir: PathBuf,

    /// Timeout for one scan or HTML export request, in seconds.
    #[arg(long = "timeout-secs", default_value_t = 300)]
    timeout_secs: u64,

    /// Serve the dashboard API after the optional scan, until Ctrl+C.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Address for the dashboard API.
    #[arg(long, default_value = DEFAULT_BIND)]
    bind: String,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "scanboard_rs=debug,tower_http=debug" } else { "scanboard_rs=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = DashboardConfig::new(
        &cli.api_base,
        cli.output_dir.clone(),
        Duration::from_secs(cli.timeout_secs),
    )?
    .with_bind(cli.bind.clone());

    println!("scanboard-rs configuration:");
    println!("  api_base     : {}", config.api_base);
    println!("  target       : {}", cli.target.as_deref().unwrap_or("<none>"));
    println!("  severity     : {}", cli.severity);
    println!("  output_dir   : {}", config.output_dir.display());
    println!("  timeout_secs : {}", cli.timeout_secs);
    println!("  serve_ui     : {}", cli.serve_ui);

    let http = config.http_client()?;
    let channel = ResultChannel::new();
    let client = ScanClient::new(&config, http.clone(), channel.clone());
    let exporter = ReportExporter::new(
        &config,
        http,
        Arc::new(DirectorySink::new(config.output_dir.clone())),
    );
    let view = ResultsView::attach(&channel);
    view.select(cli.severity.parse::<SeverityFilter>().unwrap_or_default());

    if let Some(target) = cli.target.as_deref() {
        println!("\nScanning {}...", target.trim());
        match client.submit_scan(target).await {
            Ok(report) => {
                print_summary(&report);
                print_findings_table(&view);
                for format in &cli.export {
                    let res = match format {
                        ExportFormat::Json => exporter.export_json(&report),
                        ExportFormat::Html => exporter.export_html(&report).await,
                    };
                    match res {
                        Ok(exported) => println!("Wrote {}", exported.location.display()),
                        Err(e) => eprintln!("Export failed: {e}"),
                    }
                }
            }
            Err(e) => eprintln!("Scan failed: {e}"),
        }
    }

    if cli.serve_ui {
        let shutdown = CancellationToken::new();
        let state = AppState::new(client, exporter);
        let bind = config.bind.clone();
        let server_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, state, server_shutdown).await {
                eprintln!("Dashboard server error: {e:#}");
            }
        });
        println!("Dashboard API at http://{}/api (Ctrl+C to stop)", config.bind);
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
        let _ = handle.await;
    }

    Ok(())
}

fn print_summary(report: &ScanReport) {
    println!("\nTarget: {}", report.target);
    println!(
        "Findings: {} total, {} unique",
        report.total_vulnerabilities, report.unique_vulnerabilities
    );
    for bucket in severity_breakdown(report) {
        println!(
            "  {:<10} unique {:>4}  total {:>4}",
            bucket.label, bucket.unique, bucket.total
        );
    }
}

fn print_findings_table(view: &ResultsView) {
    let rows = view.visible();
    let mut type_w = "type".len();
    let mut sev_w = "severity".len();
    for v in &rows {
        type_w = type_w.max(v.kind.chars().count().min(40));
        sev_w = sev_w.max(v.severity.chars().count());
    }
    let tier_w = "critical".len();
    let urls_w = "urls".len();

    println!("\nShowing {} finding(s) [severity: {}]", rows.len(), view.selected());
    println!(
        "{:<type_w$}  {:<sev_w$}  {:<tier_w$}  {:>urls_w$}  description",
        "type",
        "severity",
        "tier",
        "urls",
        type_w = type_w,
        sev_w = sev_w,
        tier_w = tier_w,
        urls_w = urls_w
    );
    println!(
        "{:-<type_w$}  {:-<sev_w$}  {:-<tier_w$}  {:-<urls_w$}  {:-<11}",
        "",
        "",
        "",
        "",
        "",
        type_w = type_w,
        sev_w = sev_w,
        tier_w = tier_w,
        urls_w = urls_w
    );
    for v in &rows {
        let kind: String = v.kind.chars().take(40).collect();
        let desc: String = v
            .description
            .as_deref()
            .unwrap_or("-")
            .replace('\n', " ")
            .chars()
            .take(80)
            .collect();
        println!(
            "{:<type_w$}  {:<sev_w$}  {:<tier_w$}  {:>urls_w$}  {}",
            kind,
            v.severity,
            severity_palette(&v.severity),
            v.affected_urls_count,
            desc,
            type_w = type_w,
            sev_w = sev_w,
            tier_w = tier_w,
            urls_w = urls_w
        );
    }
}
