//! Configuration parser for loading the orchestrator configuration.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, HomestackError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::OrchestratorConfig;

/// Configuration parser for loading orchestrator configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<OrchestratorConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(HomestackError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            HomestackError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// Relative `services_root` and `history.path` values are anchored at the
    /// parser's base path.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<OrchestratorConfig> {
        debug!("Parsing YAML configuration");

        // An empty document is a valid "all defaults" configuration.
        let mut config: OrchestratorConfig = if content.trim().is_empty() {
            OrchestratorConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                let location = source.map(|p| p.display().to_string());
                HomestackError::Config(ConfigError::ParseError {
                    message: format!("YAML parse error: {e}"),
                    location,
                })
            })?
        };

        if let Some(base) = &self.base_path {
            if config.services_root.is_relative() {
                config.services_root = base.join(&config.services_root);
            }
            if let Some(history) = &config.history.path
                && history.is_relative()
            {
                config.history.path = Some(base.join(history));
            }
        }

        debug!("Services root: {}", config.services_root.display());
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognized variables: `HOMESTACK_SERVICES_ROOT`,
    /// `HOMESTACK_HEALTH_TIMEOUT` and `HOMESTACK_PARALLELISM`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<OrchestratorConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides<F>(config: &mut OrchestratorConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("HOMESTACK_SERVICES_ROOT") {
            debug!("Overriding services_root from environment");
            config.services_root = PathBuf::from(root);
        }

        if let Some(timeout) = lookup("HOMESTACK_HEALTH_TIMEOUT").and_then(|v| v.parse().ok()) {
            debug!("Overriding health.timeout_secs from environment");
            config.health.timeout_secs = timeout;
        }

        if let Some(jobs) = lookup("HOMESTACK_PARALLELISM").and_then(|v| v.parse().ok()) {
            debug!("Overriding deploy.parallelism from environment");
            config.deploy.parallelism = jobs;
        }
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["homestack.yaml", "homestack.yml", ".homestack.yaml"];

/// Finds the configuration file in the given directory or its ancestors.
///
/// Returns `None` when no configuration file exists anywhere up the tree.
#[must_use]
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref().to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.is_file() {
                info!("Found configuration file: {}", config_path.display());
                return Some(config_path);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Loads the explicit configuration file, or the first one found upward from
/// `start_dir`, or the built-in defaults.
///
/// # Errors
///
/// Returns an error if an explicit path is missing or any file is invalid.
pub fn load_config(explicit: Option<&Path>, start_dir: &Path) -> Result<OrchestratorConfig> {
    let found = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(start_dir),
    };

    let Some(path) = found else {
        info!("No configuration file found, using defaults");
        let mut config = ConfigParser::new()
            .with_base_path(start_dir)
            .parse_yaml("", None)?;
        ConfigParser::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        return Ok(config);
    };

    let base = path
        .parent()
        .map_or_else(|| start_dir.to_path_buf(), Path::to_path_buf);
    ConfigParser::new().with_base_path(base).load_with_env(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
services_root: stacks
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();
        assert_eq!(config.services_root, PathBuf::from("stacks"));
        assert_eq!(config.health.timeout_secs, 120);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
services_root: services
compose_files: ["docker-compose.yml"]
environment:
  file_name: stack.env
  appdata_path: /mnt/user/appdata/lab
tiers:
  infrastructure:
    - networking/nginx-proxy-manager
    - databases/postgres
  core:
    - auth/authelia
pacing:
  infrastructure_secs: 10
health:
  interval_secs: 2
  timeout_secs: 60
deploy:
  parallelism: 2
  halt_on_tier_failure: true
updates:
  changelog_repos:
    lissy93/dashy: lissy93/dashy
"#;
        let parser = ConfigParser::new().with_base_path("/srv/lab");
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.services_root, PathBuf::from("/srv/lab/services"));
        assert_eq!(config.environment.file_name, "stack.env");
        assert_eq!(config.tiers.infrastructure.len(), 2);
        assert_eq!(config.tiers.core, vec![String::from("auth/authelia")]);
        assert_eq!(config.pacing.infrastructure_secs, 10);
        assert_eq!(config.pacing.core_secs, 3);
        assert!(config.deploy.halt_on_tier_failure);
        assert_eq!(config.updates.changelog_repos.len(), 1);
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let parser = ConfigParser::new();
        let result = parser.parse_yaml("health: [not, a, map]", None);
        assert!(matches!(
            result,
            Err(HomestackError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = OrchestratorConfig::default();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("HOMESTACK_SERVICES_ROOT", "/opt/services"),
            ("HOMESTACK_HEALTH_TIMEOUT", "45"),
            ("HOMESTACK_PARALLELISM", "not-a-number"),
        ]);

        ConfigParser::apply_env_overrides(&mut config, |k| vars.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.services_root, PathBuf::from("/opt/services"));
        assert_eq!(config.health.timeout_secs, 45);
        assert_eq!(config.deploy.parallelism, 4);
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("homestack.yaml"), "{}").unwrap();
        let nested = temp.path().join("services/media");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join("homestack.yaml"));
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.yaml");
        let result = load_config(Some(&missing), temp.path());
        assert!(matches!(
            result,
            Err(HomestackError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
