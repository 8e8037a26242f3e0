//! Aggregated batch results.

use serde::Serialize;

use crate::deploy::ServiceReport;

/// Outcome counts of a multi-service rollout, folded from per-service
/// reports.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Per-service reports in plan order.
    pub reports: Vec<ServiceReport>,
    /// Started, restarted or pre-staged (degraded included).
    pub deployed: usize,
    /// Unchanged or dry-run.
    pub skipped: usize,
    /// Deployed but not healthy within the wait budget.
    pub degraded: usize,
    /// Fatal outcomes, blocked services included.
    pub failed: usize,
}

impl BatchReport {
    /// Folds per-service reports into a batch report.
    #[must_use]
    pub fn from_reports(reports: Vec<ServiceReport>) -> Self {
        let mut batch = reports.iter().fold(Self::default(), |mut acc, report| {
            if report.outcome.is_fatal() {
                acc.failed += 1;
            } else if report.outcome.is_deployed() {
                acc.deployed += 1;
                if report.outcome.is_degraded() {
                    acc.degraded += 1;
                }
            } else {
                acc.skipped += 1;
            }
            acc
        });
        batch.reports = reports;
        batch
    }

    /// Number of services attempted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    /// Returns true if no service failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Reports with a fatal outcome.
    #[must_use]
    pub fn failures(&self) -> Vec<&ServiceReport> {
        self.reports.iter().filter(|r| r.outcome.is_fatal()).collect()
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} deployed ({} degraded), {} skipped, {} failed of {}",
            self.deployed,
            self.degraded,
            self.skipped,
            self.failed,
            self.total()
        )
    }
}
