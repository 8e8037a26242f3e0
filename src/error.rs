//! Error types for the Homestack deployment orchestrator.
//!
//! The hierarchy mirrors the rollout lifecycle: tool configuration, runtime
//! environment resolution, service discovery, the compose/runtime adapter,
//! deployment, the history journal, and the image update checker.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Homestack orchestrator.
#[derive(Debug, Error)]
pub enum HomestackError {
    /// Tool configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Runtime environment errors (env file, container daemon).
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    /// Service discovery errors.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Compose tool or container runtime errors.
    #[error("Compose error: {0}")]
    Compose(#[from] ComposeError),

    /// Deployment errors.
    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    /// History journal errors.
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Image update checker errors.
    #[error("Update check error: {0}")]
    Update(#[from] UpdateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Tool configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Runtime environment errors. All of them abort the whole invocation.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// No shared environment file was found at any candidate location.
    #[error("No environment file found (searched: {})", format_paths(.searched))]
    NotFound {
        /// Every location that was tried, in order.
        searched: Vec<PathBuf>,
    },

    /// The environment file exists but cannot be read or parsed.
    #[error("Environment file {path} is unreadable: {message}")]
    Unreadable {
        /// Path to the environment file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The container daemon did not answer.
    #[error("Docker daemon is unreachable: {message}")]
    DaemonUnreachable {
        /// Description of the failure.
        message: String,
    },
}

/// Service discovery errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The service directory or its compose declaration is missing.
    #[error("Service path not found: {path}")]
    PathNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// A service directory holds more than one compose declaration.
    #[error("Service {path} has {count} compose declarations, expected exactly one")]
    AmbiguousDeclaration {
        /// Service directory.
        path: PathBuf,
        /// Number of declarations found.
        count: usize,
    },

    /// The path does not follow `<category>/<service>`.
    #[error("Cannot derive category/name from path: {path}")]
    InvalidLayout {
        /// Offending path.
        path: PathBuf,
    },
}

/// Compose tool and container runtime errors.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The compose declaration failed validation.
    #[error("Compose declaration for {service} is invalid: {detail}")]
    SyntaxError {
        /// Service identifier.
        service: String,
        /// Raw validator output.
        detail: String,
    },

    /// An external command exited unsuccessfully or could not be spawned.
    #[error("Command `{command}` failed (exit {code:?}): {stderr}")]
    CommandFailed {
        /// Rendered command line.
        command: String,
        /// Exit code, if the process ran.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// An external command exceeded its time budget.
    #[error("Command `{command}` timed out after {secs}s")]
    Timeout {
        /// Rendered command line.
        command: String,
        /// Budget in seconds.
        secs: u64,
    },

    /// An external command produced output that could not be parsed.
    #[error("Unexpected output from container runtime: {message}")]
    InvalidOutput {
        /// Description of the parse failure.
        message: String,
    },
}

/// Deployment errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The runtime refused to bring the service up.
    #[error("Failed to start {service}: {reason}")]
    StartFailure {
        /// Service identifier.
        service: String,
        /// Reason reported by the runtime.
        reason: String,
    },

    /// One or more services in a batch failed.
    #[error("{failed} of {total} services failed")]
    BatchFailed {
        /// Number of fatal outcomes.
        failed: usize,
        /// Number of services attempted.
        total: usize,
    },

    /// Host-wide health check found unhealthy containers.
    #[error("{unhealthy} unhealthy containers")]
    Unhealthy {
        /// Number of unhealthy containers.
        unhealthy: usize,
    },
}

/// History journal errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The journal file could not be read or written.
    #[error("History journal I/O failed: {message}")]
    Io {
        /// Description of the failure.
        message: String,
    },

    /// A journal line could not be (de)serialized.
    #[error("History journal serialization failed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },
}

/// Image update checker errors.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// A registry or release API call failed.
    #[error("Request to {url} failed: {message}")]
    Request {
        /// Requested URL.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A compose declaration could not be parsed for images.
    #[error("Cannot read images from {path}: {message}")]
    Declaration {
        /// Declaration path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for Homestack operations.
pub type Result<T> = std::result::Result<T, HomestackError>;

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl HomestackError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error must abort the whole invocation before
    /// any service is touched.
    #[must_use]
    pub const fn is_invocation_fatal(&self) -> bool {
        matches!(self, Self::Environment(_) | Self::Config(_))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ComposeError {
    /// Creates an invalid output error.
    #[must_use]
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput {
            message: message.into(),
        }
    }
}

impl HistoryError {
    /// Creates an I/O error with the given message.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl UpdateError {
    /// Creates a request error.
    #[must_use]
    pub fn request(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            url: url.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_errors_are_invocation_fatal() {
        let err = HomestackError::from(EnvironmentError::DaemonUnreachable {
            message: String::from("connection refused"),
        });
        assert!(err.is_invocation_fatal());

        let err = HomestackError::from(RegistryError::PathNotFound {
            path: PathBuf::from("services/media/plex"),
        });
        assert!(!err.is_invocation_fatal());
    }

    #[test]
    fn test_not_found_lists_searched_paths() {
        let err = EnvironmentError::NotFound {
            searched: vec![PathBuf::from("/a/.env"), PathBuf::from("/b/.env")],
        };
        assert_eq!(
            err.to_string(),
            "No environment file found (searched: /a/.env, /b/.env)"
        );
    }
}
