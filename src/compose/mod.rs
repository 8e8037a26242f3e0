//! Compose tool and container runtime adapters.
//!
//! Every interaction with the container runtime goes through the
//! [`ComposeDriver`] and [`ContainerRuntime`] traits. [`DockerCli`]
//! implements both over the `docker` command line.

mod docker;
mod driver;
mod process;
mod types;

#[cfg(test)]
pub use driver::{MockComposeDriver, MockContainerRuntime};
pub use docker::DockerCli;
pub use driver::{restart, ComposeDriver, ContainerRuntime};
pub use process::{CommandOutput, CommandRunner};
pub use types::{
    ComposeProject, ContainerObservation, ContainerStats, HealthProbe, PruneReport, PullReport,
    RuntimeStatus,
};
