//! Service discovery over the `<root>/<category>/<service>/` layout.
//!
//! A service is recognized structurally: a directory two levels below the
//! root that holds exactly one compose declaration. Contents are not
//! validated here, that is the compose tool's job.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{RegistryError, Result};

/// One declared deployable service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ServiceDescriptor {
    /// Service directory.
    pub path: PathBuf,
    /// Category (parent directory name).
    pub category: String,
    /// Service name (directory name).
    pub name: String,
    /// The compose declaration inside `path`.
    pub compose_file: PathBuf,
}

/// Scans the services tree.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    /// Root of the services tree.
    root: PathBuf,
    /// Recognized declaration file names.
    compose_files: Vec<String>,
}

impl ServiceDescriptor {
    /// Builds a descriptor from a service directory.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` if the directory or its declaration is missing,
    /// `AmbiguousDeclaration` if it holds several, and `InvalidLayout` if the
    /// category or name cannot be derived from the path.
    pub fn from_dir(dir: &Path, compose_files: &[String]) -> Result<Self> {
        if !dir.is_dir() {
            return Err(RegistryError::PathNotFound {
                path: dir.to_path_buf(),
            }
            .into());
        }

        let found: Vec<PathBuf> = compose_files
            .iter()
            .map(|name| dir.join(name))
            .filter(|p| p.is_file())
            .collect();

        let compose_file = match found.as_slice() {
            [] => {
                return Err(RegistryError::PathNotFound {
                    path: dir.join(compose_files.first().map_or("docker-compose.yml", String::as_str)),
                }
                .into());
            }
            [single] => single.clone(),
            many => {
                return Err(RegistryError::AmbiguousDeclaration {
                    path: dir.to_path_buf(),
                    count: many.len(),
                }
                .into());
            }
        };

        let name = dir_name(dir);
        let category = dir.parent().and_then(|p| p.file_name()).map(|n| n.to_string_lossy().into_owned());

        match (category, name) {
            (Some(category), Some(name)) if !category.is_empty() && !name.is_empty() => Ok(Self {
                path: dir.to_path_buf(),
                category,
                name,
                compose_file,
            }),
            _ => Err(RegistryError::InvalidLayout {
                path: dir.to_path_buf(),
            }
            .into()),
        }
    }

    /// Returns the `category/name` identifier.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// Returns the compose project name the runtime labels containers with.
    ///
    /// Built from both category and name so equally named services in
    /// different categories never share a project.
    #[must_use]
    pub fn project_name(&self) -> String {
        format!("{}-{}", project_component(&self.category), project_component(&self.name))
    }
}

impl std::fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

impl ServiceRegistry {
    /// Creates a registry rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, compose_files: Vec<String>) -> Self {
        Self {
            root: root.into(),
            compose_files,
        }
    }

    /// Returns the services root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discovers every service, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` if the services root does not exist.
    pub fn discover(&self) -> Result<Vec<ServiceDescriptor>> {
        if !self.root.is_dir() {
            return Err(RegistryError::PathNotFound {
                path: self.root.clone(),
            }
            .into());
        }

        let mut services = Vec::new();
        for category_dir in sorted_subdirs(&self.root)? {
            services.extend(self.scan_category(&category_dir)?);
        }

        debug!("Discovered {} services under {}", services.len(), self.root.display());
        Ok(services)
    }

    /// Discovers the services of one category, sorted by path.
    ///
    /// A missing category yields an empty list and a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the category directory cannot be read.
    pub fn discover_category(&self, category: &str) -> Result<Vec<ServiceDescriptor>> {
        let dir = self.root.join(category);
        if !dir.is_dir() {
            warn!("Category '{category}' does not exist under {}", self.root.display());
            return Ok(Vec::new());
        }
        self.scan_category(&dir)
    }

    /// Lists category names that contain at least one service.
    ///
    /// # Errors
    ///
    /// Returns an error if the services root cannot be read.
    pub fn categories(&self) -> Result<Vec<String>> {
        let mut categories: Vec<String> = self
            .discover()?
            .into_iter()
            .map(|s| s.category)
            .collect();
        categories.dedup();
        Ok(categories)
    }

    /// Resolves a service argument: a `category/name` path relative to the
    /// services root, or a path to a service directory.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` when neither form points to a service.
    pub fn resolve(&self, service: &str) -> Result<ServiceDescriptor> {
        let under_root = self.root.join(service);
        if under_root.is_dir() {
            return ServiceDescriptor::from_dir(&under_root, &self.compose_files);
        }

        let direct = PathBuf::from(service);
        if !direct.is_dir() {
            return Err(RegistryError::PathNotFound { path: under_root }.into());
        }

        ServiceDescriptor::from_dir(&direct, &self.compose_files)
    }

    /// Scans one category directory.
    fn scan_category(&self, category_dir: &Path) -> Result<Vec<ServiceDescriptor>> {
        let mut services = Vec::new();

        for service_dir in sorted_subdirs(category_dir)? {
            match ServiceDescriptor::from_dir(&service_dir, &self.compose_files) {
                Ok(descriptor) => services.push(descriptor),
                Err(crate::error::HomestackError::Registry(RegistryError::PathNotFound { .. })) => {
                    debug!("Skipping {}: no compose declaration", service_dir.display());
                }
                Err(e) => warn!("Skipping {}: {e}", service_dir.display()),
            }
        }

        Ok(services)
    }
}

/// Returns the non-hidden subdirectories of `dir`, sorted by path.
fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        if path.is_dir() && !hidden {
            dirs.push(path);
        }
    }

    dirs.sort();
    Ok(dirs)
}

/// Lowercases a path component and keeps the characters compose accepts in
/// project names.
fn project_component(value: &str) -> String {
    value
        .chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            (c.is_ascii_alphanumeric() || c == '-' || c == '_').then_some(c)
        })
        .collect()
}

/// Returns the final component of a path as a string.
fn dir_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_COMPOSE_FILES;
    use crate::error::HomestackError;
    use tempfile::TempDir;

    fn compose_names() -> Vec<String> {
        DEFAULT_COMPOSE_FILES.iter().map(|s| (*s).to_string()).collect()
    }

    fn add_service(root: &Path, id: &str) -> PathBuf {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("docker-compose.yml"), "services: {}\n").unwrap();
        dir
    }

    #[test]
    fn test_discover_sorted_by_path() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "media/sonarr");
        add_service(temp.path(), "media/jellyfin");
        add_service(temp.path(), "auth/authelia");
        std::fs::create_dir_all(temp.path().join("media/empty")).unwrap();

        let registry = ServiceRegistry::new(temp.path(), compose_names());
        let ids: Vec<String> = registry.discover().unwrap().iter().map(ServiceDescriptor::id).collect();

        assert_eq!(ids, vec!["auth/authelia", "media/jellyfin", "media/sonarr"]);
    }

    #[test]
    fn test_discover_skips_ambiguous_and_hidden() {
        let temp = TempDir::new().unwrap();
        let dir = add_service(temp.path(), "tools/dual");
        std::fs::write(dir.join("compose.yaml"), "services: {}\n").unwrap();
        add_service(temp.path(), ".archive/old");
        add_service(temp.path(), "tools/single");

        let registry = ServiceRegistry::new(temp.path(), compose_names());
        let services = registry.discover().unwrap();

        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "single");
    }

    #[test]
    fn test_discover_category_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "media/plex");

        let registry = ServiceRegistry::new(temp.path(), compose_names());
        assert!(registry.discover_category("monitoring").unwrap().is_empty());
        assert_eq!(registry.discover_category("media").unwrap().len(), 1);
    }

    #[test]
    fn test_categories_deduplicated() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "media/plex");
        add_service(temp.path(), "media/sonarr");
        add_service(temp.path(), "monitoring/uptime-kuma");

        let registry = ServiceRegistry::new(temp.path(), compose_names());
        assert_eq!(registry.categories().unwrap(), vec!["media", "monitoring"]);
    }

    #[test]
    fn test_resolve_missing_declaration() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("media/plex")).unwrap();

        let registry = ServiceRegistry::new(temp.path(), compose_names());
        assert!(matches!(
            registry.resolve("media/plex"),
            Err(HomestackError::Registry(RegistryError::PathNotFound { .. }))
        ));
        assert!(matches!(
            registry.resolve("media/nothing"),
            Err(HomestackError::Registry(RegistryError::PathNotFound { .. }))
        ));
    }

    #[test]
    fn test_resolve_by_directory_path() {
        let temp = TempDir::new().unwrap();
        let dir = add_service(temp.path(), "networking/traefik");

        let registry = ServiceRegistry::new(temp.path().join("elsewhere"), compose_names());
        let descriptor = registry.resolve(&dir.to_string_lossy()).unwrap();

        assert_eq!(descriptor.id(), "networking/traefik");
        assert_eq!(descriptor.compose_file, dir.join("docker-compose.yml"));
    }

    #[test]
    fn test_project_name_normalized() {
        let temp = TempDir::new().unwrap();
        let dir = add_service(temp.path(), "media/Uptime.Kuma");
        let descriptor = ServiceDescriptor::from_dir(&dir, &compose_names()).unwrap();
        assert_eq!(descriptor.project_name(), "media-uptimekuma");
    }

    #[test]
    fn test_same_name_in_two_categories_gets_distinct_projects() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "media/redis");
        add_service(temp.path(), "auth/redis");

        let registry = ServiceRegistry::new(temp.path(), compose_names());
        let media = registry.resolve("media/redis").unwrap();
        let auth = registry.resolve("auth/redis").unwrap();

        assert_eq!(media.project_name(), "media-redis");
        assert_eq!(auth.project_name(), "auth-redis");
        assert_ne!(media.project_name(), auth.project_name());
    }

    #[test]
    fn test_resolve_missing_reports_path_under_root() {
        let temp = TempDir::new().unwrap();
        let registry = ServiceRegistry::new(temp.path(), compose_names());

        match registry.resolve("media/ghost") {
            Err(HomestackError::Registry(RegistryError::PathNotFound { path })) => {
                assert_eq!(path, temp.path().join("media/ghost"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
