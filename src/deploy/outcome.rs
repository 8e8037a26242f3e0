//! Per-service deployment outcomes.

use serde::{Deserialize, Serialize};

/// Health verdict at the end of post-deploy verification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    /// Every container settled healthy (or declares no check).
    Healthy,
    /// The wait budget ran out with containers still unhealthy or starting.
    Degraded,
    /// No container could be found, not even by name pattern.
    Unknown,
}

/// Why a service deployment failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Service directory or declaration missing.
    PathNotFound(String),
    /// Compose declaration failed validation.
    Validation(String),
    /// The runtime refused to bring the service up.
    Start(String),
}

/// Terminal result of one service deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeploymentOutcome {
    /// Running images already match the pulled ones.
    Skipped,
    /// Images pulled, nothing restarted.
    PulledOnly,
    /// Nothing executed.
    DryRun,
    /// No containers were running; the service was started.
    Started {
        /// Post-start health.
        health: HealthVerdict,
    },
    /// The service was stopped and started again.
    Restarted {
        /// Post-restart health.
        health: HealthVerdict,
    },
    /// Not attempted because an earlier tier failed.
    Blocked,
    /// The deployment failed.
    Failed {
        /// Failure cause.
        reason: FailureReason,
    },
}

impl HealthVerdict {
    /// Returns the verdict as a lowercase label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unknown => "unknown",
        }
    }
}

impl FailureReason {
    /// Returns the failure detail text.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::PathNotFound(d) | Self::Validation(d) | Self::Start(d) => d,
        }
    }
}

impl DeploymentOutcome {
    /// Creates a failed outcome.
    #[must_use]
    pub const fn failed(reason: FailureReason) -> Self {
        Self::Failed { reason }
    }

    /// Returns true if this outcome counts as a failure in batch reports.
    ///
    /// Health soft timeouts are never fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Blocked)
    }

    /// Returns true if the service was started, restarted or pre-staged.
    #[must_use]
    pub const fn is_deployed(&self) -> bool {
        matches!(self, Self::Started { .. } | Self::Restarted { .. } | Self::PulledOnly)
    }

    /// Returns the post-deploy health verdict, if the service was (re)started.
    #[must_use]
    pub const fn health(&self) -> Option<HealthVerdict> {
        match self {
            Self::Started { health } | Self::Restarted { health } => Some(*health),
            _ => None,
        }
    }

    /// Returns true if the service came up degraded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.health() == Some(HealthVerdict::Degraded)
    }

    /// Returns a short label for tables and the history journal.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::PulledOnly => "pulled-only",
            Self::DryRun => "dry-run",
            Self::Started { .. } => "started",
            Self::Restarted { .. } => "restarted",
            Self::Blocked => "blocked",
            Self::Failed { reason } => match reason {
                FailureReason::PathNotFound(_) => "failed-path-not-found",
                FailureReason::Validation(_) => "failed-validation",
                FailureReason::Start(_) => "failed-start",
            },
        }
    }
}

impl std::fmt::Display for DeploymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started { health } | Self::Restarted { health } => {
                write!(f, "{} ({})", self.label(), health.label())
            }
            Self::Failed { reason } => write!(f, "{}: {}", self.label(), reason.detail()),
            _ => write!(f, "{}", self.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_is_not_fatal() {
        let outcome = DeploymentOutcome::Restarted {
            health: HealthVerdict::Degraded,
        };
        assert!(!outcome.is_fatal());
        assert!(outcome.is_deployed());
        assert!(outcome.is_degraded());
    }

    #[test]
    fn test_fatal_outcomes() {
        assert!(DeploymentOutcome::Blocked.is_fatal());
        assert!(DeploymentOutcome::failed(FailureReason::Start(String::from("port in use"))).is_fatal());
        assert!(!DeploymentOutcome::Skipped.is_fatal());
        assert!(!DeploymentOutcome::Skipped.is_deployed());
    }

    #[test]
    fn test_display() {
        let outcome = DeploymentOutcome::failed(FailureReason::Validation(String::from("bad yaml")));
        assert_eq!(outcome.to_string(), "failed-validation: bad yaml");

        let outcome = DeploymentOutcome::Started {
            health: HealthVerdict::Unknown,
        };
        assert_eq!(outcome.to_string(), "started (unknown)");
    }

    #[test]
    fn test_serialize_tagged() {
        let outcome = DeploymentOutcome::failed(FailureReason::PathNotFound(String::from("media/plex")));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"]["kind"], "path_not_found");
        assert_eq!(json["reason"]["detail"], "media/plex");
    }
}
