//! In-memory store for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{CandidateSource, RouteStore};
use crate::services::geo::BoundingBox;
use crate::types::{Agent, Coordinates, Entity, ExclusionSet, LocationKind, LocationRecord, ZoneSummary};

#[derive(Default)]
pub struct MemoryStore {
    pub entities: Vec<Entity>,
    /// (entity id, record); existing customers are stored without coordinates
    pub locations: Vec<(String, LocationRecord)>,
    pub customer_coordinates: HashMap<String, Coordinates>,
    pub visited: HashSet<String>,
    pub agents: HashMap<String, Vec<Agent>>,
    /// Zones whose location fetch fails
    pub failing_zones: HashSet<String>,
    pub excluded_fetches: AtomicUsize,
    pub box_queries: AtomicUsize,
    pub coordinate_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_locations(mut self, entity_id: &str, records: Vec<LocationRecord>) -> Self {
        self.locations
            .extend(records.into_iter().map(|r| (entity_id.to_string(), r)));
        self
    }

    pub fn with_agents(mut self, entity_id: &str, agents: Vec<Agent>) -> Self {
        self.agents.insert(entity_id.to_string(), agents);
        self
    }

    pub fn with_visited<I: IntoIterator<Item = &'static str>>(mut self, ids: I) -> Self {
        self.visited.extend(ids.into_iter().map(String::from));
        self
    }

    fn prospects(&self) -> impl Iterator<Item = &(String, LocationRecord)> {
        self.locations
            .iter()
            .filter(|(_, r)| r.kind == LocationKind::Prospect && r.is_coordinate_valid())
    }
}

#[async_trait]
impl CandidateSource for MemoryStore {
    async fn candidates_in_box(
        &self,
        bbox: &BoundingBox,
        zone: Option<&str>,
        exclusion: &ExclusionSet,
    ) -> Result<Vec<LocationRecord>> {
        self.box_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .prospects()
            .map(|(_, r)| r)
            .filter(|r| r.coordinates.map(|c| bbox.contains(&c)).unwrap_or(false))
            .filter(|r| zone.map(|z| r.zone_code == z).unwrap_or(true))
            .filter(|r| !exclusion.contains(&r.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn resolve_entity(&self, name: &str) -> Result<Option<Entity>> {
        Ok(self.entities.iter().find(|e| e.name == name).cloned())
    }

    async fn list_entity_names(&self) -> Result<Vec<String>> {
        Ok(self.entities.iter().map(|e| e.name.clone()).collect())
    }

    async fn list_excluded_ids(&self) -> Result<HashSet<String>> {
        self.excluded_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.visited.clone())
    }

    async fn list_zones(&self, entity: &Entity, exclusion: &ExclusionSet) -> Result<Vec<ZoneSummary>> {
        let mut counts: Vec<(String, i64)> = Vec::new();
        for (_, record) in self
            .prospects()
            .filter(|(owner, r)| *owner == entity.id && !exclusion.contains(&r.id))
        {
            match counts.iter_mut().find(|(code, _)| *code == record.zone_code) {
                Some((_, n)) => *n += 1,
                None => counts.push((record.zone_code.clone(), 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(counts
            .into_iter()
            .map(|(code, available)| ZoneSummary { code, name: None, available })
            .collect())
    }

    async fn zone_locations(
        &self,
        entity: &Entity,
        zone: &str,
        exclusion: &ExclusionSet,
        include_existing: bool,
    ) -> Result<Vec<LocationRecord>> {
        if self.failing_zones.contains(zone) {
            bail!("connection reset while reading zone {}", zone);
        }
        Ok(self
            .locations
            .iter()
            .filter(|(owner, r)| *owner == entity.id && r.zone_code == zone && !exclusion.contains(&r.id))
            .filter(|(_, r)| match r.kind {
                LocationKind::Prospect => r.is_coordinate_valid(),
                LocationKind::Existing => include_existing,
            })
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn lookup_coordinates(&self, ids: &[String]) -> Result<HashMap<String, Coordinates>> {
        self.coordinate_lookups.fetch_add(1, Ordering::Relaxed);
        Ok(ids
            .iter()
            .filter_map(|id| self.customer_coordinates.get(id).map(|c| (id.clone(), *c)))
            .collect())
    }

    async fn list_agents(&self, entity: &Entity) -> Result<Vec<Agent>> {
        Ok(self.agents.get(&entity.id).cloned().unwrap_or_default())
    }
}
