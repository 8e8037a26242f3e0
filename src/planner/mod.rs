//! Multi-service rollout planning.
//!
//! Orders services into infrastructure, core and application tiers and
//! deploys them through the single-service engine, folding per-service
//! outcomes into a batch report.

mod executor;
mod plan;
mod report;
mod tiers;

pub use executor::{BatchOptions, OrchestrationPlanner};
pub use plan::{PlanScope, RolloutPlan};
pub use report::BatchReport;
pub use tiers::{DeploymentTier, PlannedService, TierRank};
