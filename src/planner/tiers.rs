//! Deployment tiers.

use serde::Serialize;

use crate::registry::ServiceDescriptor;

/// Tier rank. Lower ranks complete before higher ranks start.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TierRank {
    /// Networking, auth and storage the rest depends on.
    Infrastructure = 0,
    /// Shared services applications talk to.
    Core = 1,
    /// Everything else.
    Application = 2,
}

/// A service scheduled in a tier.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlannedService {
    /// `category/name` identifier.
    pub id: String,
    /// Discovered descriptor; `None` if the tier lists a service that does
    /// not exist on disk.
    pub descriptor: Option<ServiceDescriptor>,
}

/// An ordered list of services with a rank.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeploymentTier {
    /// Tier rank.
    pub rank: TierRank,
    /// Services in deployment order.
    pub services: Vec<PlannedService>,
}

impl TierRank {
    /// Returns true for the tiers deployed strictly one service at a time.
    #[must_use]
    pub const fn is_sequential(self) -> bool {
        matches!(self, Self::Infrastructure | Self::Core)
    }
}

impl std::fmt::Display for TierRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rank = match self {
            Self::Infrastructure => "infrastructure",
            Self::Core => "core",
            Self::Application => "application",
        };
        write!(f, "{rank}")
    }
}

impl PlannedService {
    /// Schedules a discovered service.
    #[must_use]
    pub fn found(descriptor: ServiceDescriptor) -> Self {
        Self {
            id: descriptor.id(),
            descriptor: Some(descriptor),
        }
    }

    /// Schedules a service listed in a tier but missing on disk.
    #[must_use]
    pub fn missing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            descriptor: None,
        }
    }
}

impl DeploymentTier {
    /// Creates an empty tier.
    #[must_use]
    pub const fn new(rank: TierRank) -> Self {
        Self {
            rank,
            services: Vec::new(),
        }
    }

    /// Returns true if the tier schedules nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Returns the number of scheduled services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_order() {
        assert!(TierRank::Infrastructure < TierRank::Core);
        assert!(TierRank::Core < TierRank::Application);
        assert!(!TierRank::Application.is_sequential());
    }
}
