//! Distributor, agent and zone types read from the store

use serde::{Deserialize, Serialize};

use super::Coordinates;

/// The top-level entity a run plans for (a distributor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    /// Base location routes start from
    pub depot: Option<Coordinates>,
}

/// A field agent eligible to run routes for an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub territory: String,
}

/// A zone belonging to an entity with its count of plannable candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSummary {
    pub code: String,
    pub name: Option<String>,
    pub available: i64,
}

impl ZoneSummary {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.code)
    }
}
