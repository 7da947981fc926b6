use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::time::{format_description::well_known, OffsetDateTime};
use serde::Serialize;

use crate::aggregate::{
    severity_breakdown, severity_palette, SeverityBucket, SeverityFilter, SeverityTier,
};
use crate::channel::{ResultChannel, Subscription};
use crate::types::{ScanReport, Vulnerability};

#[derive(Debug, Default)]
struct ViewState {
    report: Option<Arc<ScanReport>>,
    selected: SeverityFilter,
    error: Option<String>,
    last_updated: Option<String>,
}

/// A display surface bound to a [`ResultChannel`].
///
/// Subscribes on [`attach`](Self::attach) and unsubscribes when dropped. A
/// view attached after a publish starts empty until the next one.
pub struct ResultsView {
    state: Arc<Mutex<ViewState>>,
    _subscription: Subscription,
}

/// One row of the findings table.
#[derive(Debug, Clone, Serialize)]
pub struct VisibleFinding {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub severity: String,
    pub tier: SeverityTier,
    pub affected_urls_count: u64,
}

impl From<&Vulnerability> for VisibleFinding {
    fn from(v: &Vulnerability) -> Self {
        Self {
            kind: v.kind.clone(),
            description: v.description.clone().unwrap_or_default(),
            severity: v.severity.clone(),
            tier: severity_palette(&v.severity),
            affected_urls_count: v.affected_urls_count,
        }
    }
}

/// Serializable picture of what the view currently shows.
#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    /// "empty" until the first report arrives, then "ready".
    pub state: &'static str,
    pub target: Option<String>,
    pub total_vulnerabilities: u64,
    pub unique_vulnerabilities: u64,
    pub selected: SeverityFilter,
    pub severities: Vec<SeverityBucket>,
    pub findings: Vec<VisibleFinding>,
    pub error: Option<String>,
    pub last_updated: Option<String>,
}

impl ResultsView {
    pub fn attach(channel: &ResultChannel) -> Self {
        let state = Arc::new(Mutex::new(ViewState::default()));
        let handler_state = Arc::clone(&state);
        let subscription = channel.subscribe(move |report| {
            let mut s = handler_state.lock().unwrap_or_else(PoisonError::into_inner);
            s.report = Some(Arc::clone(report));
            s.error = None;
            s.last_updated = Some(now_rfc3339());
        });
        Self {
            state,
            _subscription: subscription,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn report(&self) -> Option<Arc<ScanReport>> {
        self.lock().report.clone()
    }

    pub fn select(&self, filter: SeverityFilter) {
        self.lock().selected = filter;
    }

    pub fn selected(&self) -> SeverityFilter {
        self.lock().selected.clone()
    }

    /// Findings passing the selected filter, in report order.
    pub fn visible(&self) -> Vec<Vulnerability> {
        let s = self.lock();
        match s.report.as_deref() {
            Some(report) => report
                .unique_results()
                .iter()
                .filter(|v| s.selected.matches(v))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Filter tabs: unique severity labels with their counts.
    pub fn severity_tabs(&self) -> Vec<(String, u64)> {
        self.lock()
            .report
            .as_deref()
            .map(|r| {
                r.vulnerability_analysis
                    .unique_severity_counts
                    .iter()
                    .map(|(label, count)| (label.to_string(), count))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record a user-visible failure. The current report is kept.
    pub fn set_error(&self, message: impl Into<String>) {
        self.lock().error = Some(message.into());
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn last_updated(&self) -> Option<String> {
        self.lock().last_updated.clone()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let s = self.lock();
        let (state, target, total, unique, severities, findings) = match s.report.as_deref() {
            Some(r) => (
                "ready",
                Some(r.target.clone()),
                r.total_vulnerabilities,
                r.unique_vulnerabilities,
                severity_breakdown(r),
                r.unique_results()
                    .iter()
                    .filter(|v| s.selected.matches(v))
                    .map(VisibleFinding::from)
                    .collect::<Vec<_>>(),
            ),
            None => ("empty", None, 0, 0, Vec::new(), Vec::new()),
        };
        ViewSnapshot {
            state,
            target,
            total_vulnerabilities: total,
            unique_vulnerabilities: unique,
            selected: s.selected.clone(),
            severities,
            findings,
            error: s.error.clone(),
            last_updated: s.last_updated.clone(),
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
