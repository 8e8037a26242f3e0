//! Newer image versions for every declared service.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::UpdatesConfig;
use crate::error::{Result, UpdateError};
use crate::registry::ServiceRegistry;

use super::client::{RegistryClient, Release};
use super::image::{ImageRef, TagScheme, Version};

/// Releases listed per update.
const MAX_RELEASE_NOTES: usize = 3;

/// Release body length kept in summaries.
const RELEASE_BODY_LIMIT: usize = 300;

/// Heredoc delimiter for multi-line CI variables.
const GITHUB_ENV_DELIMITER: &str = "HOMESTACK_EOF";

/// A newer version of one image.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImageUpdate {
    /// `category/name` of the declaring service.
    pub service: String,
    /// Compose service inside the declaration.
    pub compose_service: String,
    /// Declaration file.
    pub file: PathBuf,
    /// Image name without tag.
    pub image: String,
    /// Tag currently declared.
    pub current_tag: String,
    /// Newer tag found.
    pub new_tag: String,
    /// GitHub repository used for release notes.
    pub repo: Option<String>,
    /// Release notes between the two versions.
    pub changelog: Vec<ReleaseNote>,
}

/// A summarized GitHub release.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReleaseNote {
    /// Release tag.
    pub version: String,
    /// Release title.
    pub name: String,
    /// Release notes, truncated.
    pub body: String,
    /// Release page.
    pub url: String,
    /// Publication date, `YYYY-MM-DD`.
    pub published: String,
}

/// Scans declarations for newer image tags.
#[derive(Debug)]
pub struct UpdateChecker {
    /// Tag and release lookups.
    client: RegistryClient,
    /// Image name to GitHub `owner/repo`.
    changelog_repos: BTreeMap<String, String>,
}

impl UpdateChecker {
    /// Creates a checker with an explicit client.
    #[must_use]
    pub const fn new(client: RegistryClient, changelog_repos: BTreeMap<String, String>) -> Self {
        Self {
            client,
            changelog_repos,
        }
    }

    /// Creates a checker from the tool configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &UpdatesConfig) -> Result<Self> {
        let client = RegistryClient::new(&config.registry_url, &config.github_url)?;
        Ok(Self::new(client, config.changelog_repos.clone()))
    }

    /// Checks every discovered service.
    ///
    /// A lookup failure for one image is logged and that image skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the services root cannot be scanned.
    pub async fn scan(&self, registry: &ServiceRegistry) -> Result<Vec<ImageUpdate>> {
        let services = registry.discover()?;
        info!("Checking {} services for updates", services.len());

        let mut updates = Vec::new();
        for descriptor in services {
            let content = match tokio::fs::read_to_string(&descriptor.compose_file).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Cannot read {}: {e}", descriptor.compose_file.display());
                    continue;
                }
            };

            let images = match declared_images(&content, &descriptor.compose_file) {
                Ok(images) => images,
                Err(e) => {
                    warn!("{e}");
                    continue;
                }
            };

            for (compose_service, reference) in images {
                let Some(image) = ImageRef::parse(&reference) else {
                    debug!("{}: not tracking {reference}", descriptor.id());
                    continue;
                };

                match self.check_image(&image).await {
                    Ok(Some((new_tag, repo, changelog))) => updates.push(ImageUpdate {
                        service: descriptor.id(),
                        compose_service,
                        file: descriptor.compose_file.clone(),
                        image: image.name.clone(),
                        current_tag: image.tag.clone(),
                        new_tag,
                        repo,
                        changelog,
                    }),
                    Ok(None) => debug!("{image} is current"),
                    Err(e) => warn!("Skipping {image}: {e}"),
                }
            }
        }

        info!("Found {} updates", updates.len());
        Ok(updates)
    }

    /// Looks up a newer tag for one image, with release notes when mapped.
    async fn check_image(
        &self,
        image: &ImageRef,
    ) -> Result<Option<(String, Option<String>, Vec<ReleaseNote>)>> {
        let Some((scheme, current)) = TagScheme::classify(&image.tag) else {
            debug!("{image}: tag scheme not recognized");
            return Ok(None);
        };

        let tags = self.client.tags(&image.hub_repository()).await?;
        let Some(new_tag) = newer_tag(&tags, scheme, current) else {
            return Ok(None);
        };

        let repo = self.changelog_repos.get(&image.name).cloned();
        let changelog = match &repo {
            Some(repo) => match self.client.releases(repo).await {
                Ok(releases) => release_notes(&releases, &image.tag, &new_tag),
                Err(e) => {
                    warn!("No release notes for {repo}: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(Some((new_tag, repo, changelog)))
    }

    /// Rewrites the `image:` line of an update in place.
    ///
    /// Returns false if the declared reference could not be found.
    ///
    /// # Errors
    ///
    /// Returns an error if the declaration cannot be read or written.
    pub async fn apply(update: &ImageUpdate) -> Result<bool> {
        let content = tokio::fs::read_to_string(&update.file).await?;
        let old = format!("{}:{}", update.image, update.current_tag);
        let new = format!("{}:{}", update.image, update.new_tag);

        match rewrite_image_line(&content, &old, &new) {
            Some(rewritten) => {
                tokio::fs::write(&update.file, rewritten).await?;
                info!("{}: {old} -> {new}", update.file.display());
                Ok(true)
            }
            None => {
                warn!("{}: could not find '{old}'", update.file.display());
                Ok(false)
            }
        }
    }
}

/// Collects `(compose service, image)` pairs from a declaration.
fn declared_images(content: &str, path: &Path) -> Result<Vec<(String, String)>> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| UpdateError::Declaration {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let Some(services) = document.get("services").and_then(serde_yaml::Value::as_mapping) else {
        return Ok(Vec::new());
    };

    Ok(services
        .iter()
        .filter_map(|(name, service)| {
            let name = name.as_str()?;
            let image = service.get("image")?.as_str()?;
            Some((name.to_string(), image.to_string()))
        })
        .collect())
}

/// First tag, in the order given, with the same scheme and a strictly
/// newer version.
fn newer_tag(tags: &[String], scheme: TagScheme, current: Version) -> Option<String> {
    tags.iter()
        .find(|tag| {
            TagScheme::classify(tag).is_some_and(|(candidate_scheme, version)| {
                candidate_scheme == scheme && version > current
            })
        })
        .cloned()
}

/// Up to three releases in `(current, candidate]`.
fn release_notes(releases: &[Release], current_tag: &str, new_tag: &str) -> Vec<ReleaseNote> {
    let (Some(current), Some(target)) = (Version::parse_loose(current_tag), Version::parse_loose(new_tag))
    else {
        return Vec::new();
    };

    releases
        .iter()
        .filter(|release| {
            Version::parse_loose(&release.tag_name).is_some_and(|v| v > current && v <= target)
        })
        .take(MAX_RELEASE_NOTES)
        .map(|release| ReleaseNote {
            version: release.tag_name.clone(),
            name: release.name.clone().unwrap_or_default(),
            body: truncate(release.body.as_deref().unwrap_or_default(), RELEASE_BODY_LIMIT),
            url: release.html_url.clone(),
            published: release
                .published_at
                .as_deref()
                .map(|p| p.chars().take(10).collect())
                .unwrap_or_default(),
        })
        .collect()
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let mut cut: String = text.chars().take(limit).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    }
}

/// Replaces the reference on every `image:` line that declares `old`,
/// keeping indentation, quoting and trailing comments.
fn rewrite_image_line(content: &str, old: &str, new: &str) -> Option<String> {
    let mut replaced = false;
    let mut output = String::with_capacity(content.len());

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let is_image = trimmed
            .strip_prefix("image:")
            .map(|value| value.trim_start().trim_start_matches(['"', '\'']))
            .is_some_and(|value| {
                value
                    .strip_prefix(old)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(['"', '\'', ' ', '#', '\n', '\r']))
            });

        if is_image {
            output.push_str(&line.replacen(old, new, 1));
            replaced = true;
        } else {
            output.push_str(line);
        }
    }

    replaced.then_some(output)
}

/// Renders the markdown summary used as a pull request body.
#[must_use]
pub fn summary_markdown(updates: &[ImageUpdate]) -> String {
    let mut summary = String::from("## Updated Services\n\n");

    for update in updates {
        let _ = writeln!(
            summary,
            "### {} ({} -> {})",
            update.service, update.current_tag, update.new_tag
        );
        let _ = writeln!(summary, "**Image**: `{}`", update.image);
        if let Some(repo) = &update.repo {
            let _ = writeln!(summary, "**Repository**: [{repo}](https://github.com/{repo})");
        }
        summary.push('\n');

        if update.changelog.is_empty() {
            summary.push_str("**Changelog**: check repository releases manually\n");
        } else {
            summary.push_str("**Recent Changes**:\n");
            for note in &update.changelog {
                let _ = writeln!(summary, "- **{}** ({}): {}", note.version, note.published, note.name);
                if !note.body.is_empty() {
                    let _ = writeln!(summary, "  {}", note.body.replace('\n', "\n  "));
                }
                let _ = writeln!(summary, "  [View Release]({})", note.url);
            }
        }
        summary.push_str("\n---\n\n");
    }

    summary
}

/// Renders the CI environment block for `updates`.
#[must_use]
pub fn github_env_block(updates: &[ImageUpdate], date: &str) -> String {
    if updates.is_empty() {
        return String::from("UPDATES_FOUND=false\n");
    }

    format!(
        "UPDATES_FOUND=true\nUPDATE_DATE={date}\nUPDATE_SUMMARY<<{GITHUB_ENV_DELIMITER}\n{}\n{GITHUB_ENV_DELIMITER}\n",
        summary_markdown(updates).trim_end()
    )
}

/// Appends the CI environment block to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written.
pub async fn write_github_env(path: &Path, updates: &[ImageUpdate], date: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(github_env_block(updates, date).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_COMPOSE_FILES;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_newer_tag_same_scheme_only() {
        let (scheme, current) = TagScheme::classify("v2.27.0").unwrap();
        let found = newer_tag(&tags(&["latest", "2.30.0", "v2.26.9", "v2.28.1", "v2.29.0"]), scheme, current);
        assert_eq!(found.as_deref(), Some("v2.28.1"));

        let (scheme, current) = TagScheme::classify("16.3").unwrap();
        assert!(newer_tag(&tags(&["16.3", "16.2", "15"]), scheme, current).is_none());
    }

    #[test]
    fn test_release_notes_window() {
        let release = |tag: &str| Release {
            tag_name: tag.to_string(),
            name: Some(format!("Release {tag}")),
            body: Some("x".repeat(400)),
            html_url: format!("https://github.com/o/r/releases/{tag}"),
            published_at: Some(String::from("2026-10-01T12:00:00Z")),
        };
        let releases = vec![
            release("release-3.1.0"),
            release("release-3.0.1"),
            release("release-3.0.0"),
            release("release-2.9.0"),
            release("release-2.1.1"),
        ];

        let notes = release_notes(&releases, "release-2.1.1", "release-3.0.1");
        let versions: Vec<&str> = notes.iter().map(|n| n.version.as_str()).collect();
        assert_eq!(versions, vec!["release-3.0.1", "release-3.0.0", "release-2.9.0"]);
        assert_eq!(notes[0].body.chars().count(), 303);
        assert_eq!(notes[0].published, "2026-10-01");
    }

    #[test]
    fn test_rewrite_keeps_layout() {
        let content = "services:\n  dashy:\n    # pinned\n    image: \"lissy93/dashy:release-2.1.1\" # ui\n    restart: unless-stopped\n  other:\n    image: lissy93/dashy:release-2.1.10\n";
        let rewritten =
            rewrite_image_line(content, "lissy93/dashy:release-2.1.1", "lissy93/dashy:release-3.0.1").unwrap();

        assert!(rewritten.contains("    image: \"lissy93/dashy:release-3.0.1\" # ui\n"));
        assert!(rewritten.contains("    # pinned\n"));
        assert!(rewritten.contains("image: lissy93/dashy:release-2.1.10\n"));
        assert!(rewrite_image_line(content, "nginx:1.25", "nginx:1.27").is_none());
    }

    #[test]
    fn test_github_env_block() {
        assert_eq!(github_env_block(&[], "2026-10-19"), "UPDATES_FOUND=false\n");

        let update = ImageUpdate {
            service: String::from("tools/filebrowser"),
            compose_service: String::from("filebrowser"),
            file: PathBuf::from("services/tools/filebrowser/docker-compose.yml"),
            image: String::from("filebrowser/filebrowser"),
            current_tag: String::from("v2.27.0"),
            new_tag: String::from("v2.28.0"),
            repo: None,
            changelog: Vec::new(),
        };
        let block = github_env_block(&[update], "2026-10-19");

        assert!(block.starts_with("UPDATES_FOUND=true\nUPDATE_DATE=2026-10-19\nUPDATE_SUMMARY<<HOMESTACK_EOF\n"));
        assert!(block.contains("### tools/filebrowser (v2.27.0 -> v2.28.0)"));
        assert!(block.ends_with("\nHOMESTACK_EOF\n"));
    }

    #[tokio::test]
    async fn test_scan_and_apply() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("tools/dashy");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("docker-compose.yml"),
            "services:\n  dashy:\n    image: lissy93/dashy:release-2.1.1\n  cache:\n    image: redis:latest\n",
        )
        .unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/repositories/lissy93/dashy/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"name": "latest"}, {"name": "release-3.0.1"}, {"name": "release-3.0.0"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/lissy93/dashy/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"tag_name": "release-3.0.1", "name": "Fixes", "body": "Bug fixes", "html_url": "u1", "published_at": "2026-09-30T00:00:00Z"},
                {"tag_name": "release-3.0.0", "name": "Major", "body": null, "html_url": "u0", "published_at": null}
            ])))
            .mount(&server)
            .await;

        let client = RegistryClient::new(&server.uri(), &server.uri()).unwrap();
        let mut repos = BTreeMap::new();
        repos.insert(String::from("lissy93/dashy"), String::from("lissy93/dashy"));
        let checker = UpdateChecker::new(client, repos);

        let registry = ServiceRegistry::new(
            temp.path(),
            DEFAULT_COMPOSE_FILES.iter().map(|s| (*s).to_string()).collect(),
        );
        let updates = checker.scan(&registry).await.unwrap();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].new_tag, "release-3.0.1");
        assert_eq!(updates[0].changelog.len(), 2);

        assert!(UpdateChecker::apply(&updates[0]).await.unwrap());
        let content = std::fs::read_to_string(dir.join("docker-compose.yml")).unwrap();
        assert!(content.contains("image: lissy93/dashy:release-3.0.1\n"));
        assert!(content.contains("image: redis:latest\n"));
    }

    #[tokio::test]
    async fn test_registry_error_skips_image() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("data/postgres");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("compose.yaml"), "services:\n  db:\n    image: postgres:16.2\n").unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = RegistryClient::new(&server.uri(), &server.uri()).unwrap();
        let checker = UpdateChecker::new(client, BTreeMap::new());
        let registry = ServiceRegistry::new(
            temp.path(),
            DEFAULT_COMPOSE_FILES.iter().map(|s| (*s).to_string()).collect(),
        );

        assert!(checker.scan(&registry).await.unwrap().is_empty());
    }
}
