//! Image update checker.
//!
//! Finds newer version tags on Docker Hub for the images pinned in compose
//! declarations, optionally rewrites the pins, and renders a summary with
//! GitHub release notes for CI.

mod checker;
mod client;
mod image;

pub use checker::{
    github_env_block, summary_markdown, write_github_env, ImageUpdate, ReleaseNote, UpdateChecker,
};
pub use client::{RegistryClient, Release};
pub use image::{ImageRef, TagScheme, Version};
