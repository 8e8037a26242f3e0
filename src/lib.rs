// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Homestack Deploy
//!
//! Tiered, health-verified rollouts for self-hosted Docker Compose services.
//!
//! ## Overview
//!
//! Services live in a `services/<category>/<name>/docker-compose.yml` tree
//! and share one environment file. Homestack:
//!
//! - Pulls images and restarts a service only when an image actually changed
//! - Waits for containers to report healthy, degrading instead of failing
//!   when they take too long
//! - Rolls out whole categories or the whole host tier by tier:
//!   infrastructure, then core, then everything else
//! - Keeps a journal of every rollout
//! - Finds newer image tags on Docker Hub
//!
//! ## Modules
//!
//! - [`config`]: Optional `homestack.yaml` parsing and validation
//! - [`environment`]: Shared environment file resolution
//! - [`registry`]: Service discovery
//! - [`compose`]: Compose tool and container runtime adapters
//! - [`deploy`]: Single-service deployment engine and health verification
//! - [`planner`]: Tiered multi-service rollouts
//! - [`history`]: Deployment history journal
//! - [`updates`]: Image update checker
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! tiers:
//!   infrastructure:
//!     - network/traefik
//!     - auth/authelia
//!   core:
//!     - data/postgres
//! health:
//!   timeout_secs: 180
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod compose;
pub mod config;
pub mod deploy;
pub mod environment;
pub mod error;
pub mod history;
pub mod planner;
pub mod registry;
pub mod updates;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use compose::{ComposeDriver, ContainerRuntime, DockerCli};
pub use config::{ConfigParser, ConfigValidator, DeclarationHasher, OrchestratorConfig};
pub use deploy::{DeployOptions, DeploymentEngine, DeploymentOutcome, HealthVerifier, ServiceReport};
pub use environment::{EnvResolver, RuntimeEnvironment};
pub use error::{HomestackError, Result};
pub use history::{HistoryStore, LocalHistoryStore, RunRecord};
pub use planner::{BatchReport, OrchestrationPlanner, RolloutPlan};
pub use registry::{ServiceDescriptor, ServiceRegistry};
pub use updates::UpdateChecker;
