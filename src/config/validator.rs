//! Configuration validation for the orchestrator.
//!
//! Catches inconsistent tier lists and nonsensical timing values before any
//! service is touched.

use crate::error::{ConfigError, HomestackError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{DeployConfig, HealthConfig, OrchestratorConfig, TierConfig};

/// Validator for orchestrator configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates an orchestrator configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found if validation fails.
    pub fn validate(&self, config: &OrchestratorConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if config.compose_files.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("compose_files"),
                message: String::from("At least one compose declaration name is required"),
            });
        }

        if config.environment.file_name.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("environment.file_name"),
                message: String::from("Environment file name cannot be empty"),
            });
        }

        Self::validate_tiers(&config.tiers, &mut result);
        Self::validate_health(&config.health, &mut result);
        Self::validate_deploy(&config.deploy, &mut result);

        if config.history.keep == 0 {
            result
                .warnings
                .push(String::from("history.keep is 0, deployment history is disabled"));
        }

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(HomestackError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )))
        }
    }

    /// Validates the static tier lists.
    fn validate_tiers(tiers: &TierConfig, result: &mut ValidationResult) {
        let mut seen: HashSet<&str> = HashSet::new();

        let listed = tiers
            .infrastructure
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("tiers.infrastructure[{i}]"), s))
            .chain(
                tiers
                    .core
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (format!("tiers.core[{i}]"), s)),
            );

        for (field, service) in listed {
            if !is_service_path(service) {
                result.errors.push(ValidationError {
                    field: field.clone(),
                    message: format!("'{service}' is not a category/name service path"),
                });
            }

            if !seen.insert(service.as_str()) {
                result.errors.push(ValidationError {
                    field,
                    message: format!("Service '{service}' is listed more than once"),
                });
            }
        }

        if tiers.infrastructure.is_empty() && tiers.core.is_empty() {
            result.warnings.push(String::from(
                "No infrastructure or core tier declared, every service deploys as application tier",
            ));
        }
    }

    /// Validates health polling values.
    fn validate_health(health: &HealthConfig, result: &mut ValidationResult) {
        if health.interval_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("health.interval_secs"),
                message: String::from("Health poll interval must be at least 1 second"),
            });
        } else if health.interval_secs > health.timeout_secs {
            result.errors.push(ValidationError {
                field: String::from("health.interval_secs"),
                message: format!(
                    "Health poll interval ({}s) exceeds the health timeout ({}s)",
                    health.interval_secs, health.timeout_secs
                ),
            });
        }
    }

    /// Validates deployment engine values.
    fn validate_deploy(deploy: &DeployConfig, result: &mut ValidationResult) {
        if deploy.parallelism == 0 {
            result.errors.push(ValidationError {
                field: String::from("deploy.parallelism"),
                message: String::from("Parallelism must be at least 1"),
            });
        }

        if deploy.command_timeout_secs <= deploy.stop_timeout_secs {
            result.warnings.push(format!(
                "deploy.command_timeout_secs ({}) should exceed stop_timeout_secs ({})",
                deploy.command_timeout_secs, deploy.stop_timeout_secs
            ));
        }
    }
}

/// Checks whether a string is a `category/name` service path.
fn is_service_path(value: &str) -> bool {
    let mut parts = value.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(category), Some(name), None) if is_valid_segment(category) && is_valid_segment(name)
    )
}

/// Checks whether a path segment is a usable directory name.
fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_path_shape() {
        assert!(is_service_path("networking/traefik"));
        assert!(is_service_path("media/jellyfin_2"));
        assert!(!is_service_path("traefik"));
        assert!(!is_service_path("a/b/c"));
        assert!(!is_service_path("networking/"));
        assert!(!is_service_path("../traefik"));
    }

    #[test]
    fn test_defaults_are_valid() {
        let result = ConfigValidator::new()
            .validate(&OrchestratorConfig::default())
            .unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_duplicate_tier_entry_rejected() {
        let mut config = OrchestratorConfig::default();
        config.tiers.infrastructure = vec![String::from("databases/postgres")];
        config.tiers.core = vec![String::from("databases/postgres")];

        let result = ConfigValidator::new().validate(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_interval_larger_than_timeout_rejected() {
        let mut config = OrchestratorConfig::default();
        config.health.interval_secs = 30;
        config.health.timeout_secs = 10;

        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(err.to_string().contains("exceeds the health timeout"));
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let mut config = OrchestratorConfig::default();
        config.deploy.parallelism = 0;
        assert!(ConfigValidator::new().validate(&config).is_err());
    }
}
