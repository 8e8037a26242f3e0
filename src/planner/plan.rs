//! Rollout plans.
//!
//! A plan places every service of a scope into its tier: the configured
//! infrastructure and core lists, in their configured order, then every
//! other discovered service in path order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::TierConfig;
use crate::error::Result;
use crate::registry::ServiceRegistry;

use super::tiers::{DeploymentTier, PlannedService, TierRank};

/// What a rollout covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanScope {
    /// The infrastructure and core tiers only.
    Infrastructure,
    /// Every discovered service.
    All,
    /// The services of one category, still in tier order.
    Category(String),
}

/// An ordered, tiered rollout.
#[derive(Debug, Clone, Serialize)]
pub struct RolloutPlan {
    /// When the plan was built.
    pub created_at: DateTime<Utc>,
    /// Human-readable scope.
    pub scope: String,
    /// Tiers in rank order. Empty tiers are omitted.
    pub tiers: Vec<DeploymentTier>,
}

impl std::fmt::Display for PlanScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::All => write!(f, "all"),
            Self::Category(name) => write!(f, "category {name}"),
        }
    }
}

impl RolloutPlan {
    /// Builds the plan for `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the services root cannot be scanned.
    pub fn build(registry: &ServiceRegistry, tiers: &TierConfig, scope: &PlanScope) -> Result<Self> {
        let in_scope = |id: &str| match scope {
            PlanScope::Category(name) => id.split('/').next() == Some(name.as_str()),
            PlanScope::Infrastructure | PlanScope::All => true,
        };

        let mut plan = Self {
            created_at: Utc::now(),
            scope: scope.to_string(),
            tiers: Vec::new(),
        };

        for (rank, entries) in [
            (TierRank::Infrastructure, &tiers.infrastructure),
            (TierRank::Core, &tiers.core),
        ] {
            let mut tier = DeploymentTier::new(rank);
            for entry in entries.iter().filter(|e| in_scope(e)) {
                let planned = match registry.resolve(entry) {
                    Ok(descriptor) => PlannedService::found(descriptor),
                    Err(e) => {
                        warn!("{rank} service {entry} is not deployable: {e}");
                        PlannedService::missing(entry.as_str())
                    }
                };
                tier.services.push(planned);
            }
            plan.push(tier);
        }

        let discovered = match scope {
            PlanScope::Infrastructure => Vec::new(),
            PlanScope::All => registry.discover()?,
            PlanScope::Category(name) => registry.discover_category(name)?,
        };

        let mut application = DeploymentTier::new(TierRank::Application);
        application.services = discovered
            .into_iter()
            .filter(|d| !tiers.contains(&d.id()))
            .map(PlannedService::found)
            .collect();
        plan.push(application);

        Ok(plan)
    }

    /// Total number of scheduled services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.iter().map(DeploymentTier::len).sum()
    }

    /// Returns true if the plan schedules nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers in deployment order.
    #[must_use]
    pub fn service_ids(&self) -> Vec<&str> {
        self.tiers
            .iter()
            .flat_map(|t| t.services.iter().map(|s| s.id.as_str()))
            .collect()
    }

    /// Tier entries that do not exist on disk.
    #[must_use]
    pub fn missing(&self) -> Vec<&str> {
        self.tiers
            .iter()
            .flat_map(|t| t.services.iter())
            .filter(|s| s.descriptor.is_none())
            .map(|s| s.id.as_str())
            .collect()
    }

    fn push(&mut self, tier: DeploymentTier) {
        if !tier.is_empty() {
            self.tiers.push(tier);
        }
    }
}
