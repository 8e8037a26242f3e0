//! Shared environment file resolution.
//!
//! The same tool runs from a developer shell, a CI runner and the production
//! host, each of which keeps the shared `.env` somewhere else. Candidates are
//! tried in a fixed priority order and the first existing regular file wins.
//! Files are never merged, and there is no fallback to defaults.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::EnvironmentConfig;
use crate::error::{EnvironmentError, Result};

/// One location the resolver tries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvCandidate {
    /// Where this candidate comes from (for logs).
    pub source: String,
    /// Full path to the environment file.
    pub path: PathBuf,
}

/// The resolved shared environment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    /// Path to the environment file handed to the compose tool.
    pub env_file: PathBuf,
    /// Candidate source that matched.
    pub source: String,
    /// Number of variables the file declares.
    pub variable_count: usize,
}

/// Priority-ordered environment file resolver.
#[derive(Debug, Clone)]
pub struct EnvResolver {
    /// Candidates in priority order.
    candidates: Vec<EnvCandidate>,
}

impl EnvCandidate {
    /// Creates a new candidate.
    #[must_use]
    pub fn new(source: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
        }
    }
}

impl EnvResolver {
    /// Creates a resolver over an explicit candidate list.
    #[must_use]
    pub const fn new(candidates: Vec<EnvCandidate>) -> Self {
        Self { candidates }
    }

    /// Creates a resolver that only accepts one explicitly given file.
    #[must_use]
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self::new(vec![EnvCandidate::new("explicit", path)])
    }

    /// Builds the standard candidate chain:
    /// current directory, CI workspace mount, appdata mount, CI workspace
    /// variable, ancestor of the current directory.
    ///
    /// The variable candidate is omitted when the variable is unset or empty.
    pub fn from_config<F>(config: &EnvironmentConfig, cwd: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = &config.file_name;
        let mut candidates = vec![
            EnvCandidate::new("current directory", cwd.join(file)),
            EnvCandidate::new("workspace mount", config.workspace_mount.join(file)),
            EnvCandidate::new("appdata mount", config.appdata_path.join(file)),
        ];

        if let Some(workspace) = lookup(&config.workspace_var).filter(|v| !v.is_empty()) {
            candidates.push(EnvCandidate::new(
                format!("${}", config.workspace_var),
                Path::new(&workspace).join(file),
            ));
        }

        candidates.push(EnvCandidate::new(
            "ancestor directory",
            cwd.join(&config.ancestor).join(file),
        ));

        Self::new(candidates)
    }

    /// Returns the candidates in priority order.
    #[must_use]
    pub fn candidates(&self) -> &[EnvCandidate] {
        &self.candidates
    }

    /// Returns the first candidate that exists as a regular file.
    #[must_use]
    pub fn first_match(&self) -> Option<&EnvCandidate> {
        self.candidates.iter().find(|candidate| {
            let found = candidate.path.is_file();
            debug!(
                "Environment candidate {} ({}): {}",
                candidate.source,
                candidate.path.display(),
                if found { "found" } else { "missing" }
            );
            found
        })
    }

    /// Resolves and parses the shared environment file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no candidate exists, or `Unreadable` if the
    /// winning file cannot be parsed.
    pub fn resolve(&self) -> Result<RuntimeEnvironment> {
        let Some(candidate) = self.first_match() else {
            return Err(EnvironmentError::NotFound {
                searched: self.candidates.iter().map(|c| c.path.clone()).collect(),
            }
            .into());
        };

        let variable_count = count_variables(&candidate.path)?;

        info!(
            "Using environment file {} (from {}, {} variables)",
            candidate.path.display(),
            candidate.source,
            variable_count
        );

        Ok(RuntimeEnvironment {
            env_file: candidate.path.clone(),
            source: candidate.source.clone(),
            variable_count,
        })
    }
}

/// Parses an environment file without exporting anything into the process.
fn count_variables(path: &Path) -> Result<usize> {
    let unreadable = |message: String| EnvironmentError::Unreadable {
        path: path.to_path_buf(),
        message,
    };

    let iter = dotenvy::from_path_iter(path).map_err(|e| unreadable(e.to_string()))?;

    let mut count = 0;
    for item in iter {
        item.map_err(|e| unreadable(e.to_string()))?;
        count += 1;
    }

    Ok(count)
}
