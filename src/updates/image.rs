//! Image references and version tag schemes.

use std::cmp::Ordering;

/// Hosts that denote Docker Hub when written explicitly.
const DOCKER_HUB_HOSTS: &[&str] = &["docker.io", "index.docker.io", "registry.hub.docker.com"];

/// A tagged image hosted on Docker Hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Image name as written, without the tag.
    pub name: String,
    /// Tag.
    pub tag: String,
}

/// Version tag conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScheme {
    /// `release-X.Y.Z`
    Release,
    /// `vX.Y.Z`
    Prefixed,
    /// `X.Y` or `X.Y.Z`
    Plain,
}

/// A numeric version parsed from a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major, minor and patch; patch is 0 when absent.
    parts: [u64; 3],
}

impl ImageRef {
    /// Parses an `image:` value.
    ///
    /// Returns `None` for references the checker does not track: untagged,
    /// `latest`, digest-pinned, or hosted on another registry.
    #[must_use]
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if reference.contains('@') {
            return None;
        }

        let (name, tag) = reference.rsplit_once(':')?;
        // A colon inside the last path segment's prefix is a registry port.
        if tag.contains('/') || tag.is_empty() || tag == "latest" {
            return None;
        }

        if let Some((host, _)) = name.split_once('/')
            && (host.contains('.') || host.contains(':') || host == "localhost")
            && !DOCKER_HUB_HOSTS.contains(&host)
        {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Docker Hub repository path, `library/` for official images.
    #[must_use]
    pub fn hub_repository(&self) -> String {
        let name = DOCKER_HUB_HOSTS
            .iter()
            .find_map(|host| self.name.strip_prefix(&format!("{host}/")))
            .unwrap_or(&self.name);

        if name.contains('/') {
            name.to_string()
        } else {
            format!("library/{name}")
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

impl TagScheme {
    /// Classifies a tag and parses its version.
    #[must_use]
    pub fn classify(tag: &str) -> Option<(Self, Version)> {
        if let Some(rest) = tag.strip_prefix("release-") {
            return Version::parse_exact(rest, 3).map(|v| (Self::Release, v));
        }
        if let Some(rest) = tag.strip_prefix('v') {
            return Version::parse_exact(rest, 3).map(|v| (Self::Prefixed, v));
        }
        Version::parse_exact(tag, 2)
            .or_else(|| Version::parse_exact(tag, 3))
            .map(|v| (Self::Plain, v))
    }
}

impl Version {
    /// Parses a loose version, stripping `release-` and `v` prefixes.
    #[must_use]
    pub fn parse_loose(tag: &str) -> Option<Self> {
        let tag = tag.strip_prefix("release-").unwrap_or(tag);
        let tag = tag.strip_prefix('v').unwrap_or(tag);
        Self::parse_exact(tag, 2).or_else(|| Self::parse_exact(tag, 3))
    }

    /// Parses exactly `count` dot-separated numeric components.
    fn parse_exact(value: &str, count: usize) -> Option<Self> {
        let components: Vec<&str> = value.split('.').collect();
        if components.len() != count {
            return None;
        }

        let mut parts = [0u64; 3];
        for (slot, component) in parts.iter_mut().zip(&components) {
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            *slot = component.parse().ok()?;
        }
        Some(Self { parts })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_untracked_references() {
        assert!(ImageRef::parse("nginx").is_none());
        assert!(ImageRef::parse("nginx:latest").is_none());
        assert!(ImageRef::parse("ghcr.io/home-assistant/home-assistant:2024.9.1").is_none());
        assert!(ImageRef::parse("registry.local:5000/tool").is_none());
        assert!(ImageRef::parse("redis@sha256:abcd").is_none());

        let image = ImageRef::parse("lissy93/dashy:release-2.1.1").unwrap();
        assert_eq!(image.name, "lissy93/dashy");
        assert_eq!(image.tag, "release-2.1.1");
    }

    #[test]
    fn test_hub_repository() {
        assert_eq!(ImageRef::parse("postgres:16.2").unwrap().hub_repository(), "library/postgres");
        assert_eq!(
            ImageRef::parse("docker.io/filebrowser/filebrowser:v2.27.0")
                .unwrap()
                .hub_repository(),
            "filebrowser/filebrowser"
        );
    }

    #[test]
    fn test_classify_schemes() {
        assert_eq!(TagScheme::classify("release-2.1.1").map(|c| c.0), Some(TagScheme::Release));
        assert_eq!(TagScheme::classify("v2.27.0").map(|c| c.0), Some(TagScheme::Prefixed));
        assert_eq!(TagScheme::classify("16.2").map(|c| c.0), Some(TagScheme::Plain));
        assert_eq!(TagScheme::classify("1.25.3").map(|c| c.0), Some(TagScheme::Plain));
        assert!(TagScheme::classify("1.25.3-alpine").is_none());
        assert!(TagScheme::classify("v2.27").is_none());
        assert!(TagScheme::classify("stable").is_none());
    }

    #[test]
    fn test_version_order_is_numeric() {
        let a = Version::parse_loose("1.9.0").unwrap();
        let b = Version::parse_loose("1.10.0").unwrap();
        assert!(b > a);
        assert_eq!(Version::parse_loose("2.1"), Version::parse_loose("2.1.0"));
    }
}
