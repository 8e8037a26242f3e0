//! Docker Hub and GitHub release API client.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{HomestackError, Result, UpdateError};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Tags fetched per repository, most recently updated first.
const TAG_PAGE_SIZE: u32 = 50;

/// User agent sent with every request; GitHub rejects requests without one.
const USER_AGENT: &str = concat!("homestack/", env!("CARGO_PKG_VERSION"));

/// Client for tag and release lookups.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    /// HTTP client.
    client: Client,
    /// Docker Hub API base URL.
    registry_url: String,
    /// GitHub API base URL.
    github_url: String,
}

/// One published GitHub release.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Release {
    /// Release tag.
    #[serde(default)]
    pub tag_name: String,
    /// Release title.
    #[serde(default)]
    pub name: Option<String>,
    /// Release notes.
    #[serde(default)]
    pub body: Option<String>,
    /// Release page.
    #[serde(default)]
    pub html_url: String,
    /// Publication timestamp.
    #[serde(default)]
    pub published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagPage {
    #[serde(default)]
    results: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl RegistryClient {
    /// Creates a client against the given API base URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(registry_url: &str, github_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HomestackError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            registry_url: registry_url.trim_end_matches('/').to_string(),
            github_url: github_url.trim_end_matches('/').to_string(),
        })
    }

    /// Lists a repository's tags, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn tags(&self, repository: &str) -> Result<Vec<String>> {
        let url = format!("{}/v2/repositories/{repository}/tags", self.registry_url);
        debug!("Fetching tags for {repository}");

        let page: TagPage = self
            .get_json(&url, &[("page_size", TAG_PAGE_SIZE.to_string()), ("ordering", String::from("last_updated"))])
            .await?;

        Ok(page.results.into_iter().map(|t| t.name).collect())
    }

    /// Lists a GitHub repository's releases, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn releases(&self, repo: &str) -> Result<Vec<Release>> {
        let url = format!("{}/repos/{repo}/releases", self.github_url);
        debug!("Fetching releases for {repo}");
        self.get_json(&url, &[]).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        trace!("GET {url}");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| UpdateError::request(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::request(url, format!("HTTP {status}")).into());
        }

        response
            .json()
            .await
            .map_err(|e| UpdateError::request(url, format!("Invalid response: {e}")).into())
    }
}
