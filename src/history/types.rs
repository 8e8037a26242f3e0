//! History journal records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deploy::ServiceReport;

/// One deploy-type invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Command label, e.g. `deploy-all`.
    pub command: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Host the run executed on.
    pub host: String,
    /// Per-service results.
    pub services: Vec<ServiceRecord>,
    /// Services started, restarted or pre-staged.
    pub deployed: usize,
    /// Services with a fatal outcome.
    pub failed: usize,
}

/// One service's result within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceRecord {
    /// `category/name` identifier.
    pub service: String,
    /// Outcome label.
    pub outcome: String,
    /// Declaration fingerprint at deploy time.
    #[serde(default)]
    pub declaration_hash: Option<String>,
    /// Images that failed to pull.
    #[serde(default)]
    pub pull_failures: Vec<String>,
    /// Time spent on the service.
    pub elapsed_ms: u64,
}

impl RunRecord {
    /// Starts a record for `command`, stamped now.
    #[must_use]
    pub fn begin(command: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            command: command.into(),
            started_at: now,
            finished_at: now,
            host: current_host(),
            services: Vec::new(),
            deployed: 0,
            failed: 0,
        }
    }

    /// Completes the record with the run's service reports.
    #[must_use]
    pub fn finish(mut self, reports: &[ServiceReport]) -> Self {
        self.finished_at = Utc::now();
        self.services = reports.iter().map(ServiceRecord::from_report).collect();
        self.deployed = reports.iter().filter(|r| r.outcome.is_deployed()).count();
        self.failed = reports.iter().filter(|r| r.outcome.is_fatal()).count();
        self
    }

    /// Run duration in whole seconds.
    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

impl ServiceRecord {
    /// Records a service report.
    #[must_use]
    pub fn from_report(report: &ServiceReport) -> Self {
        Self {
            service: report.service.clone(),
            outcome: report.outcome.label().to_string(),
            declaration_hash: report.declaration_hash.clone(),
            pull_failures: report.pull_failures.clone(),
            elapsed_ms: report.elapsed_ms,
        }
    }
}

/// Returns the local host name.
fn current_host() -> String {
    hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::{DeploymentOutcome, FailureReason, HealthVerdict};

    #[test]
    fn test_finish_counts() {
        let reports = vec![
            ServiceReport::new(
                "media/plex",
                DeploymentOutcome::Restarted {
                    health: HealthVerdict::Degraded,
                },
            ),
            ServiceReport::new("media/sonarr", DeploymentOutcome::Skipped),
            ServiceReport::new(
                "media/radarr",
                DeploymentOutcome::failed(FailureReason::Validation(String::from("bad"))),
            ),
        ];

        let record = RunRecord::begin("deploy-category").finish(&reports);

        assert_eq!(record.deployed, 1);
        assert_eq!(record.failed, 1);
        assert_eq!(record.services.len(), 3);
        assert_eq!(record.services[2].outcome, "failed-validation");
        assert!(record.finished_at >= record.started_at);
        assert!(!record.host.is_empty());
    }
}
