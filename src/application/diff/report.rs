//! Aggregate status report
//!
//! Counts how many entities report each status and renders the
//! distribution as a structured document for roaming partners.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Context identifier of a rendered status report
pub const STATUS_REPORT_CONTEXT: &str = "urn:texnouz:roaming:contexts:statusReport";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport<T: Ord> {
    counts: BTreeMap<T, usize>,
    total: usize,
}

/// One status bucket of a rendered report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusShare {
    pub count: usize,
    pub percentage: f64,
}

/// Rendered report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedReport {
    #[serde(rename = "@context")]
    pub context: String,
    pub count: usize,
    pub report: BTreeMap<String, StatusShare>,
}

impl RenderedReport {
    /// Compact JSON body as sent to roaming partners
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<T: Ord + Display> StatusReport<T> {
    pub fn from_statuses(statuses: impl IntoIterator<Item = T>) -> Self {
        let mut counts = BTreeMap::new();
        let mut total = 0;
        for status in statuses {
            *counts.entry(status).or_insert(0) += 1;
            total += 1;
        }
        Self { counts, total }
    }

    pub fn count(&self) -> usize {
        self.total
    }

    pub fn count_of(&self, status: &T) -> usize {
        self.counts.get(status).copied().unwrap_or(0)
    }

    /// `100 * count / total`, rounded to two decimals
    pub fn percentage_of(&self, status: &T) -> f64 {
        percentage(self.count_of(status), self.total)
    }

    /// Observed statuses with their counts, in status order
    pub fn counts(&self) -> &BTreeMap<T, usize> {
        &self.counts
    }

    pub fn render(&self) -> RenderedReport {
        self.render_with_context(STATUS_REPORT_CONTEXT)
    }

    /// Only observed statuses become keys; no zero-count entries.
    pub fn render_with_context(&self, context: impl Into<String>) -> RenderedReport {
        let report = self
            .counts
            .iter()
            .map(|(status, &count)| {
                (
                    status.to_string(),
                    StatusShare {
                        count,
                        percentage: percentage(count, self.total),
                    },
                )
            })
            .collect();

        RenderedReport {
            context: context.into(),
            count: self.total,
            report,
        }
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (10_000.0 * count as f64 / total as f64).round() / 100.0
}

impl<T: Ord + Display> Display for StatusReport<T> {
    /// `"<count> entities; Available: 7 (70.00), Charging: 3 (30.00)"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} entities", self.total)?;
        for (i, (status, &count)) in self.counts.iter().enumerate() {
            let sep = if i == 0 { "; " } else { ", " };
            write!(
                f,
                "{sep}{status}: {count} ({:.2})",
                percentage(count, self.total)
            )?;
        }
        Ok(())
    }
}
