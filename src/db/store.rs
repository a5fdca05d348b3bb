//! Store abstraction consumed by the planner
//!
//! The Postgres implementation lives in `PgStore`; tests use the in-memory
//! `MemoryStore`. Every row leaving the store is already a normalized
//! `LocationRecord`, so no planning stage ever sees table-specific columns.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use super::queries;
use crate::services::geo::BoundingBox;
use crate::types::{Agent, Coordinates, Entity, ExclusionSet, LocationRecord, RoutePlanEntry, ZoneSummary};

/// Bounding-box candidate lookup used by the geo search
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Coordinate-valid candidates inside `bbox`, restricted to `zone` when
    /// given, never returning an id contained in `exclusion`.
    async fn candidates_in_box(
        &self,
        bbox: &BoundingBox,
        zone: Option<&str>,
        exclusion: &ExclusionSet,
    ) -> Result<Vec<LocationRecord>>;
}

/// Read side of the relational store
#[async_trait]
pub trait RouteStore: CandidateSource {
    async fn resolve_entity(&self, name: &str) -> Result<Option<Entity>>;

    async fn list_entity_names(&self) -> Result<Vec<String>>;

    /// Ids already visited or committed elsewhere
    async fn list_excluded_ids(&self) -> Result<HashSet<String>>;

    /// Zones of the entity with their count of plannable candidates, largest first
    async fn list_zones(&self, entity: &Entity, exclusion: &ExclusionSet) -> Result<Vec<ZoneSummary>>;

    /// Candidates of one zone. Prospects always carry coordinates; existing
    /// customers (only when `include_existing`) may come back without them.
    async fn zone_locations(
        &self,
        entity: &Entity,
        zone: &str,
        exclusion: &ExclusionSet,
        include_existing: bool,
    ) -> Result<Vec<LocationRecord>>;

    /// Coordinates for the given location ids; ids without usable coordinates are absent
    async fn lookup_coordinates(&self, ids: &[String]) -> Result<HashMap<String, Coordinates>>;

    async fn list_agents(&self, entity: &Entity) -> Result<Vec<Agent>>;
}

/// Destination of materialized route plan rows
#[async_trait]
pub trait RouteSink: Send + Sync {
    /// Write all rows as one unit. Returns the number of rows written.
    async fn write_batch(&self, rows: &[RoutePlanEntry]) -> Result<u64>;

    fn name(&self) -> &str;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateSource for PgStore {
    async fn candidates_in_box(
        &self,
        bbox: &BoundingBox,
        zone: Option<&str>,
        exclusion: &ExclusionSet,
    ) -> Result<Vec<LocationRecord>> {
        queries::location::candidates_in_box(&self.pool, bbox, zone, &exclusion.to_vec()).await
    }
}

#[async_trait]
impl RouteStore for PgStore {
    async fn resolve_entity(&self, name: &str) -> Result<Option<Entity>> {
        queries::entity::get_entity_by_name(&self.pool, name).await
    }

    async fn list_entity_names(&self) -> Result<Vec<String>> {
        queries::entity::list_entity_names(&self.pool).await
    }

    async fn list_excluded_ids(&self) -> Result<HashSet<String>> {
        queries::location::list_visited_ids(&self.pool).await
    }

    async fn list_zones(&self, entity: &Entity, exclusion: &ExclusionSet) -> Result<Vec<ZoneSummary>> {
        queries::zone::list_zones_with_counts(&self.pool, &entity.name, &exclusion.to_vec()).await
    }

    async fn zone_locations(
        &self,
        entity: &Entity,
        zone: &str,
        exclusion: &ExclusionSet,
        include_existing: bool,
    ) -> Result<Vec<LocationRecord>> {
        // Each zone task runs on its own connection for the whole fetch
        let mut conn = self.pool.acquire().await?;
        let excluded = exclusion.to_vec();

        let mut records =
            queries::location::list_zone_prospects(&mut conn, &entity.name, zone, &excluded).await?;
        if include_existing {
            let customers =
                queries::location::list_zone_customers(&mut conn, &entity.id, zone, &excluded).await?;
            records.extend(customers);
        }
        Ok(records)
    }

    async fn lookup_coordinates(&self, ids: &[String]) -> Result<HashMap<String, Coordinates>> {
        queries::location::lookup_customer_coordinates(&self.pool, ids).await
    }

    async fn list_agents(&self, entity: &Entity) -> Result<Vec<Agent>> {
        queries::agent::list_agents_for_entity(&self.pool, &entity.id).await
    }
}

#[async_trait]
impl RouteSink for PgStore {
    async fn write_batch(&self, rows: &[RoutePlanEntry]) -> Result<u64> {
        queries::route_plan::insert_route_plan(&self.pool, rows).await
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
