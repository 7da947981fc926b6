//! Severity bucketing and filtering over a [`ScanReport`].
//!
//! Everything here is a pure function of the report; nothing is cached and
//! the report is only ever borrowed.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::types::{ScanReport, Vulnerability};

/// Which findings a view should show.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SeverityFilter {
    #[default]
    All,
    Only(String),
}

impl SeverityFilter {
    pub fn matches(&self, vuln: &Vulnerability) -> bool {
        match self {
            SeverityFilter::All => true,
            SeverityFilter::Only(label) => vuln.severity == *label,
        }
    }
}

impl FromStr for SeverityFilter {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "all" {
            SeverityFilter::All
        } else {
            SeverityFilter::Only(s.to_string())
        })
    }
}

impl fmt::Display for SeverityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeverityFilter::All => f.write_str("all"),
            SeverityFilter::Only(label) => f.write_str(label),
        }
    }
}

impl Serialize for SeverityFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Unique findings matching `filter`, in report order.
pub fn filter_by_severity<'a>(
    report: &'a ScanReport,
    filter: &SeverityFilter,
) -> Vec<&'a Vulnerability> {
    report
        .unique_results()
        .iter()
        .filter(|v| filter.matches(v))
        .collect()
}

/// Display tier for a severity label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl SeverityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityTier::Critical => "critical",
            SeverityTier::High => "high",
            SeverityTier::Medium => "medium",
            SeverityTier::Low => "low",
            SeverityTier::Unknown => "unknown",
        }
    }

    /// Hex color used for badges.
    pub fn color(&self) -> &'static str {
        match self {
            SeverityTier::Critical => "#dc3545",
            SeverityTier::High => "#fd7e14",
            SeverityTier::Medium => "#ffc107",
            SeverityTier::Low => "#28a745",
            SeverityTier::Unknown => "#6c757d",
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Map a label to its tier. Case-insensitive; unrecognized labels are
/// `Unknown`.
pub fn severity_palette(label: &str) -> SeverityTier {
    match label.trim().to_ascii_lowercase().as_str() {
        "critical" => SeverityTier::Critical,
        "high" => SeverityTier::High,
        "medium" => SeverityTier::Medium,
        "low" => SeverityTier::Low,
        _ => SeverityTier::Unknown,
    }
}

/// Per-label counts for summary display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeverityBucket {
    pub label: String,
    pub tier: SeverityTier,
    pub unique: u64,
    pub total: u64,
}

/// One bucket per observed label: unique-count order first, then any label
/// that only shows up in the total counts.
pub fn severity_breakdown(report: &ScanReport) -> Vec<SeverityBucket> {
    let analysis = &report.vulnerability_analysis;
    let mut buckets: Vec<SeverityBucket> = analysis
        .unique_severity_counts
        .iter()
        .map(|(label, unique)| SeverityBucket {
            label: label.to_string(),
            tier: severity_palette(label),
            unique,
            total: analysis.total_severity_counts.get(label).unwrap_or(0),
        })
        .collect();

    for (label, total) in analysis.total_severity_counts.iter() {
        if analysis.unique_severity_counts.get(label).is_none() {
            buckets.push(SeverityBucket {
                label: label.to_string(),
                tier: severity_palette(label),
                unique: 0,
                total,
            });
        }
    }
    buckets
}

/// A report whose counters disagree with its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    UniqueCountSum { sum: u64, expected: u64 },
    UniqueResultsLength { len: u64, expected: u64 },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::UniqueCountSum { sum, expected } => write!(
                f,
                "unique severity counts sum to {sum}, expected {expected}"
            ),
            Inconsistency::UniqueResultsLength { len, expected } => write!(
                f,
                "unique_results has {len} entries, expected {expected}"
            ),
        }
    }
}

/// Report (never repair) count mismatches.
pub fn check_consistency(report: &ScanReport) -> Vec<Inconsistency> {
    let mut issues = Vec::new();
    let expected = report.unique_vulnerabilities;

    let sum = report.vulnerability_analysis.unique_severity_counts.total();
    if sum != expected {
        issues.push(Inconsistency::UniqueCountSum { sum, expected });
    }
    let len = report.unique_results().len() as u64;
    if len != expected {
        issues.push(Inconsistency::UniqueResultsLength { len, expected });
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SeverityCounts, VulnerabilityAnalysis};

    fn vuln(kind: &str, severity: &str) -> Vulnerability {
        Vulnerability {
            kind: kind.to_string(),
            description: Some(format!("{kind} found")),
            severity: severity.to_string(),
            affected_urls_count: 1,
            affected_urls: None,
            details: Default::default(),
        }
    }

    fn report(vulns: Vec<Vulnerability>) -> ScanReport {
        let mut unique = SeverityCounts::new();
        for v in &vulns {
            unique.record(&v.severity);
        }
        ScanReport {
            target: "https://example.com".into(),
            total_vulnerabilities: vulns.len() as u64 + 2,
            unique_vulnerabilities: vulns.len() as u64,
            vulnerability_analysis: VulnerabilityAnalysis {
                total_severity_counts: unique.clone(),
                unique_severity_counts: unique,
                unique_results: vulns,
                extra: Default::default(),
            },
            ..ScanReport::default()
        }
    }

    #[test]
    fn all_returns_everything_in_order() {
        let r = report(vec![vuln("A", "low"), vuln("B", "high"), vuln("C", "low")]);
        let kinds: Vec<&str> = filter_by_severity(&r, &SeverityFilter::All)
            .iter()
            .map(|v| v.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["A", "B", "C"]);
    }

    #[test]
    fn only_keeps_relative_order() {
        let r = report(vec![vuln("A", "low"), vuln("B", "high"), vuln("C", "low")]);
        let kinds: Vec<&str> = filter_by_severity(&r, &"low".parse().unwrap())
            .iter()
            .map(|v| v.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["A", "C"]);
    }

    #[test]
    fn unmatched_severity_is_empty() {
        let r = report(vec![vuln("A", "low")]);
        assert!(filter_by_severity(&r, &"critical".parse().unwrap()).is_empty());
    }

    #[test]
    fn filter_is_exact_match() {
        let r = report(vec![vuln("A", "High"), vuln("B", "high")]);
        let hits = filter_by_severity(&r, &SeverityFilter::Only("high".into()));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, "B");
    }

    #[test]
    fn filter_parses_all_sentinel() {
        assert_eq!("all".parse::<SeverityFilter>().unwrap(), SeverityFilter::All);
        assert_eq!(SeverityFilter::Only("medium".into()).to_string(), "medium");
    }

    #[test]
    fn palette_degrades_to_unknown() {
        assert_eq!(severity_palette("critical"), SeverityTier::Critical);
        assert_eq!(severity_palette("High"), SeverityTier::High);
        assert_eq!(severity_palette("info"), SeverityTier::Unknown);
        assert_eq!(severity_palette(""), SeverityTier::Unknown);
        assert_eq!(SeverityTier::Unknown.color(), "#6c757d");
    }

    #[test]
    fn breakdown_appends_total_only_labels() {
        let mut r = report(vec![vuln("A", "high")]);
        r.vulnerability_analysis
            .total_severity_counts
            .insert("low", 2);
        let buckets = severity_breakdown(&r);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].label, "high");
        assert_eq!((buckets[0].unique, buckets[0].total), (1, 1));
        assert_eq!(buckets[1].label, "low");
        assert_eq!((buckets[1].unique, buckets[1].total), (0, 2));
    }

    #[test]
    fn consistent_report_has_no_issues() {
        let r = report(vec![vuln("A", "high"), vuln("B", "low")]);
        assert!(check_consistency(&r).is_empty());
    }

    #[test]
    fn mismatched_counts_are_reported_not_fixed() {
        let mut r = report(vec![vuln("A", "high")]);
        r.unique_vulnerabilities = 3;
        let issues = check_consistency(&r);
        assert_eq!(
            issues,
            vec![
                Inconsistency::UniqueCountSum { sum: 1, expected: 3 },
                Inconsistency::UniqueResultsLength { len: 1, expected: 3 },
            ]
        );
        assert_eq!(r.unique_vulnerabilities, 3);
    }
}
