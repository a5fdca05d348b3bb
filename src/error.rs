//! Typed planner errors
//!
//! Store and I/O plumbing returns `anyhow::Result`; these variants are the
//! planning outcomes callers match on.

use thiserror::Error;

use crate::types::ClusterId;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("distributor '{0}' not found")]
    UnknownEntity(String),

    #[error("no eligible agents for distributor {0}")]
    NoAgents(String),

    #[error("date window is empty")]
    EmptyDateWindow,

    #[error("no free (agent, date) slot for cluster {cluster_id} after {attempts} attempts")]
    AssignmentExhausted { cluster_id: ClusterId, attempts: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
