//! Runtime environment module.
//!
//! Locates the single shared environment file every deployment uses.

mod resolver;

pub use resolver::{EnvCandidate, EnvResolver, RuntimeEnvironment};
