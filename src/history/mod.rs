//! Deployment history journal.
//!
//! Every deploy-type invocation appends one [`RunRecord`]. The journal is
//! informational: failing to write it never changes an invocation's result.

mod local;
mod store;
mod types;

pub use local::LocalHistoryStore;
pub use store::HistoryStore;
pub use types::{RunRecord, ServiceRecord};
