//! Single-service deployment.
//!
//! The [`DeploymentEngine`] takes one service through validation, pull,
//! the restart decision, graceful restart and health verification, and
//! reports a terminal [`DeploymentOutcome`].

mod engine;
mod health;
mod outcome;

pub use engine::{DeployOptions, DeployPhase, DeploymentEngine, ServiceReport};
pub use health::{ClassifiedContainer, ContainerHealth, HealthReport, HealthTally, HealthVerifier};
pub use outcome::{DeploymentOutcome, FailureReason, HealthVerdict};
