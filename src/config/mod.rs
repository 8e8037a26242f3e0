//! Configuration module for the Homestack orchestrator.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing the optional `homestack.yaml`
//! - Validation of tier lists and timing values
//! - Fingerprinting compose declarations for change tracking

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    DeployConfig, EnvironmentConfig, HealthConfig, HistoryConfig, OrchestratorConfig,
    PacingConfig, TierConfig, UpdatesConfig, DEFAULT_COMPOSE_FILES,
};
pub use parser::{ConfigParser, find_config_file, load_config, DEFAULT_CONFIG_FILES};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::DeclarationHasher;
