//! Service registry module.
//!
//! Discovers declared services and their categories from the services tree.

mod discovery;

pub use discovery::{ServiceDescriptor, ServiceRegistry};
