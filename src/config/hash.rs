//! Declaration fingerprints for change tracking.
//!
//! A fingerprint is a SHA-256 over a service's relative path and the raw
//! bytes of its compose declaration. It is recorded in the history journal so
//! operators can spot declarations edited since the last rollout.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::Result;

/// Hasher for compose declarations.
#[derive(Debug, Default)]
pub struct DeclarationHasher;

impl DeclarationHasher {
    /// Creates a new declaration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a declaration's contents.
    #[must_use]
    pub fn hash_contents(&self, service_path: &str, contents: &[u8]) -> String {
        let mut hasher = Sha256::new();

        hasher.update(service_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(contents);

        hex::encode(hasher.finalize())
    }

    /// Reads a declaration file and computes its fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn hash_file(&self, service_path: &str, compose_file: &Path) -> Result<String> {
        let contents = tokio::fs::read(compose_file).await?;
        Ok(self.hash_contents(service_path, &contents))
    }

    /// Returns the first 12 characters of a fingerprint for display.
    ///
    /// Fingerprints read back from the journal may have been edited by
    /// hand, so the cut is made on a character boundary.
    #[must_use]
    pub fn short(hash: &str) -> &str {
        hash.char_indices().nth(12).map_or(hash, |(end, _)| &hash[..end])
    }
}
