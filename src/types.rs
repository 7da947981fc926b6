use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// One deduplicated finding as reported by the scanning service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Vulnerability {
    #[serde(rename = "type")]
    pub kind: String,
    /// Injection findings and scan-error entries carry no description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form label. `critical`, `high`, `medium` and `low` are the
    /// recognized tiers; anything else is kept as-is and shown as unknown.
    pub severity: String,
    pub affected_urls_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_urls: Option<Vec<String>>,
    /// Scanner-specific extras (`url`, `payload`, `evidence`, ...), passed
    /// through untouched so the HTML renderer still sees them.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Severity label -> count, in the order the scanner produced the labels.
///
/// Only observed labels have an entry; nothing is zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeverityCounts(Vec<(String, u64)>);

impl SeverityCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for `label`, or `None` if the label was never observed.
    pub fn get(&self, label: &str) -> Option<u64> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, c)| *c)
    }

    /// Set the count for `label`. An existing label keeps its position.
    pub fn insert(&mut self, label: impl Into<String>, count: u64) {
        let label = label.into();
        match self.0.iter_mut().find(|(l, _)| *l == label) {
            Some(slot) => slot.1 = count,
            None => self.0.push((label, count)),
        }
    }

    /// Increment `label` by one, appending it if unseen.
    pub fn record(&mut self, label: &str) {
        match self.0.iter_mut().find(|(l, _)| l == label) {
            Some(slot) => slot.1 += 1,
            None => self.0.push((label.to_string(), 1)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(l, c)| (l.as_str(), *c))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(l, _)| l.as_str())
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|(_, c)| *c).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for SeverityCounts {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut counts = SeverityCounts::new();
        for (label, count) in iter {
            counts.insert(label, count);
        }
        counts
    }
}

impl Serialize for SeverityCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, count) in &self.0 {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SeverityCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountsVisitor;

        impl<'de> Visitor<'de> for CountsVisitor {
            type Value = SeverityCounts;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of severity label to non-negative count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut counts = SeverityCounts::new();
                while let Some((label, count)) = access.next_entry::<String, u64>()? {
                    counts.insert(label, count);
                }
                Ok(counts)
            }
        }

        deserializer.deserialize_map(CountsVisitor)
    }
}

/// Severity statistics and the deduplicated findings list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VulnerabilityAnalysis {
    pub total_severity_counts: SeverityCounts,
    pub unique_severity_counts: SeverityCounts,
    pub unique_results: Vec<Vulnerability>,
    /// Additional statistics the scanner attaches (`total_count`,
    /// `unique_count`, `affected_urls_per_vuln`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The full result of one scan. Treated as immutable once received.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ScanReport {
    pub target: String,
    pub total_vulnerabilities: u64,
    pub unique_vulnerabilities: u64,
    pub vulnerability_analysis: VulnerabilityAnalysis,
    /// Absent and empty are kept apart so an export writes back exactly
    /// what the scanner sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_urls: Option<Vec<String>>,
    /// Raw per-page findings before deduplication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Value>>,
}

impl ScanReport {
    /// Decode a response body and validate it.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ValidationError> {
        let raw: Value = serde_json::from_slice(bytes).map_err(ValidationError::Shape)?;
        validate(&raw)
    }

    pub fn unique_results(&self) -> &[Vulnerability] {
        &self.vulnerability_analysis.unique_results
    }

    pub fn discovered_urls(&self) -> &[String] {
        self.discovered_urls.as_deref().unwrap_or_default()
    }
}

/// Structural check of a raw payload: every required field present with the
/// right type, counts non-negative, and `unique_vulnerabilities` not above
/// `total_vulnerabilities`.
pub fn validate(raw: &Value) -> Result<ScanReport, ValidationError> {
    let report = ScanReport::deserialize(raw).map_err(ValidationError::Shape)?;
    if report.unique_vulnerabilities > report.total_vulnerabilities {
        return Err(ValidationError::UniqueExceedsTotal {
            unique: report.unique_vulnerabilities,
            total: report.total_vulnerabilities,
        });
    }
    Ok(report)
}
