//! Route planning pipeline
//!
//! Drives one distributor through every stage: zone fetch and clustering
//! (concurrently, bounded by `max_workers`), global merge of undersized
//! clusters, optional top-up, agent/date assignment, sequencing and
//! persistence. Merge and assignment only start once every zone task has
//! finished, since both need the full cluster set.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PlannerConfig;
use crate::db::{CandidateSource, RouteSink, RouteStore};
use crate::error::PlanError;
use crate::services::assignment::{AssignmentScheduler, DateWindow};
use crate::services::cache::{CoordinateCache, ExclusionCache};
use crate::services::cluster_merge::{merge_undersized, MergeOutcome};
use crate::services::clustering;
use crate::services::export::DryRunSink;
use crate::services::geo_search::{GeoSearchRequest, GeoSearchService};
use crate::services::sequencing::sequence_route;
use crate::types::{
    route_code, route_label, weekday_code, Cluster, ClusterId, Coordinates, Entity, ExclusionSet, LocationRecord,
    RouteAssignment, RoutePlanEntry, ZoneSummary,
};

/// Outcome of one distributor's run, logged as JSON
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanSummary {
    pub run_id: Uuid,
    pub entity: String,
    pub start_date: Option<NaiveDate>,
    pub zones_total: usize,
    pub zones_processed: usize,
    pub zones_failed: usize,
    pub clusters: usize,
    pub clusters_merged: usize,
    pub merge_skipped: usize,
    pub undersized_remaining: usize,
    pub topped_up_locations: usize,
    pub degraded_assignments: usize,
    pub rows_planned: usize,
    pub rows_written: u64,
    pub persist_failed: bool,
    pub travel_km: f64,
    pub duration_ms: u128,
    pub sink: String,
    pub export_path: Option<PathBuf>,
}

/// Per-distributor results of a multi-distributor run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub summaries: Vec<PlanSummary>,
    /// (distributor, error) for every distributor that aborted
    pub failures: Vec<(String, String)>,
}

/// Clustering result of one zone task
struct ZoneClusters {
    groups: Vec<Vec<LocationRecord>>,
    unlocated: Vec<LocationRecord>,
}

struct DryRunExport {
    sink: Arc<DryRunSink>,
    dir: PathBuf,
}

pub struct PipelineOrchestrator<S> {
    store: Arc<S>,
    sink: Arc<dyn RouteSink>,
    config: PlannerConfig,
    depot_override: Option<Coordinates>,
    exclusions: ExclusionCache,
    coordinates: CoordinateCache,
    export: Option<DryRunExport>,
    seed: Option<u64>,
}

impl<S: RouteStore + 'static> PipelineOrchestrator<S> {
    pub fn new(store: Arc<S>, sink: Arc<dyn RouteSink>, config: PlannerConfig) -> Self {
        Self {
            store,
            sink,
            config,
            depot_override: None,
            exclusions: ExclusionCache::new(),
            coordinates: CoordinateCache::new(),
            export: None,
            seed: None,
        }
    }

    /// Collect rows in `sink` instead of persisting, exporting a CSV per
    /// distributor into `dir`
    pub fn with_dry_run(mut self, sink: Arc<DryRunSink>, dir: impl Into<PathBuf>) -> Self {
        self.sink = sink.clone();
        self.export = Some(DryRunExport { sink, dir: dir.into() });
        self
    }

    pub fn with_depot_override(mut self, depot: Option<Coordinates>) -> Self {
        self.depot_override = depot;
        self
    }

    /// Fixed seed for agent/date sampling
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Plan each distributor in turn. A failing distributor is logged and
    /// recorded; the rest still run.
    pub async fn run_batch(&self, entities: &[String], start: NaiveDate) -> BatchReport {
        let mut report = BatchReport::default();

        for (i, name) in entities.iter().enumerate() {
            info!("[{}/{}] Distributor {}", i + 1, entities.len(), name);
            match self.run_entity(name, start).await {
                Ok(summary) => report.summaries.push(summary),
                Err(e) => {
                    error!("Planning for {} failed: {:#}", name, e);
                    report.failures.push((name.clone(), format!("{:#}", e)));
                }
            }
        }

        info!(
            "Batch finished: {} succeeded, {} failed",
            report.summaries.len(),
            report.failures.len()
        );
        report
    }

    /// Plan routes for one distributor
    pub async fn run_entity(&self, name: &str, start: NaiveDate) -> Result<PlanSummary> {
        let started = Instant::now();
        let mut summary = PlanSummary {
            run_id: Uuid::new_v4(),
            entity: name.to_string(),
            start_date: Some(start),
            sink: self.sink.name().to_string(),
            ..Default::default()
        };
        info!("Planning routes for {} from {} (run {})", name, start, summary.run_id);

        let entity = self
            .store
            .resolve_entity(name)
            .await?
            .ok_or_else(|| PlanError::UnknownEntity(name.to_string()))?;

        let depot = self.depot_override.or(entity.depot).or(self.config.default_depot);
        match depot {
            Some(d) => info!("Depot for {}: ({:.6}, {:.6})", entity.name, d.lat, d.lng),
            None => warn!("No depot for {}, routes start at their first stop", entity.name),
        }

        let exclusion = self.exclusions.get_or_load(self.store.as_ref()).await?;
        if !exclusion.is_empty() {
            debug!("{} location ids excluded for {}", exclusion.len(), entity.name);
        }

        let zones: Vec<ZoneSummary> = self
            .store
            .list_zones(&entity, &exclusion)
            .await?
            .into_iter()
            .filter(|z| z.available > 0)
            .collect();
        summary.zones_total = zones.len();
        info!("{} zones with candidates for {}", zones.len(), entity.name);

        let mut clusters = self.cluster_zones(&entity, zones, &exclusion, &mut summary).await;
        if clusters.is_empty() {
            warn!("No clusters for {}, nothing to plan", entity.name);
            summary.duration_ms = started.elapsed().as_millis();
            log_summary(&summary);
            return Ok(summary);
        }

        let merge: MergeOutcome = merge_undersized(
            &mut clusters,
            self.config.min_cluster_size,
            self.config.max_cluster_size,
        );
        summary.clusters_merged = merge.merged;
        summary.merge_skipped = merge.skipped;
        summary.undersized_remaining = merge.undersized_remaining;

        if self.config.top_up_undersized && merge.undersized_remaining > 0 {
            summary.topped_up_locations = self.top_up(&mut clusters, &exclusion).await?;
            summary.undersized_remaining = clusters
                .iter()
                .filter(|c| c.size() < self.config.min_cluster_size)
                .count();
        }
        summary.clusters = clusters.len();

        let agents = self.store.list_agents(&entity).await?;
        info!("{} eligible agents for {}", agents.len(), entity.name);

        let window = DateWindow::new(start, self.config.business_days, self.config.rest_day);
        let cluster_ids: Vec<ClusterId> = clusters.iter().map(|c| c.id).collect();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let assignment = AssignmentScheduler::new(self.config.fail_on_degraded).assign(
            &entity.name,
            &cluster_ids,
            &agents,
            &window,
            &mut rng,
        )?;
        summary.degraded_assignments = assignment.degraded;

        let (rows, travel_km) = build_rows(&entity, &clusters, &assignment.assignments, depot);
        summary.rows_planned = rows.len();
        summary.travel_km = travel_km;

        summary.rows_written = match self.sink.write_batch(&rows).await {
            Ok(n) => {
                // Later distributors of this run must not plan these again
                self.exclusions.commit(rows.iter().map(|r| r.location_id.clone()));
                n
            }
            Err(e) => {
                error!(
                    "Persisting {} rows for {} via {} failed, nothing was written: {:#}",
                    rows.len(),
                    entity.name,
                    self.sink.name(),
                    e
                );
                summary.persist_failed = true;
                0
            }
        };

        if let Some(export) = &self.export {
            let tag = summary.run_id.simple().to_string();
            let path = export
                .sink
                .export_csv(&export.dir, &entity.name, start, &tag[..8])?;
            summary.export_path = Some(path);
        }

        debug!("Coordinate cache holds {} locations", self.coordinates.len());
        summary.duration_ms = started.elapsed().as_millis();
        log_summary(&summary);
        Ok(summary)
    }

    /// Fetch and cluster every zone, at most `max_workers` at a time, then
    /// fold the results in zone order, numbering clusters globally.
    async fn cluster_zones(
        &self,
        entity: &Entity,
        zones: Vec<ZoneSummary>,
        exclusion: &ExclusionSet,
        summary: &mut PlanSummary,
    ) -> Vec<Cluster> {
        let mut results: Vec<(usize, ZoneSummary, Result<ZoneClusters>)> = stream::iter(zones.into_iter().enumerate())
            .map(|(index, zone)| async move {
                let result = self.process_zone(entity, &zone, exclusion).await;
                (index, zone, result)
            })
            .buffer_unordered(self.config.max_workers.max(1))
            .collect()
            .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut clusters: Vec<Cluster> = Vec::new();
        let mut next_id: u32 = 0;

        for (_, zone, result) in results {
            let zone_clusters = match result {
                Ok(z) => z,
                Err(e) => {
                    error!("Zone {} ({}) failed and is skipped: {:#}", zone.code, zone.label(), e);
                    summary.zones_failed += 1;
                    continue;
                }
            };
            summary.zones_processed += 1;

            if zone_clusters.groups.is_empty() {
                if !zone_clusters.unlocated.is_empty() {
                    warn!(
                        "Zone {} has only {} records without coordinates, dropping them",
                        zone.code,
                        zone_clusters.unlocated.len()
                    );
                }
                continue;
            }

            let first = clusters.len();
            for group in zone_clusters.groups {
                clusters.push(Cluster::new(ClusterId(next_id), group));
                next_id += 1;
            }
            clusters[first].unlocated.extend(zone_clusters.unlocated);

            debug!(
                "Zone {}: clusters {}..{}",
                zone.code,
                clusters[first].id,
                next_id - 1
            );
        }

        info!(
            "Clustered {} zones into {} clusters ({} zones failed)",
            summary.zones_processed,
            clusters.len(),
            summary.zones_failed
        );
        clusters
    }

    async fn process_zone(&self, entity: &Entity, zone: &ZoneSummary, exclusion: &ExclusionSet) -> Result<ZoneClusters> {
        let mut records = self
            .store
            .zone_locations(entity, &zone.code, exclusion, self.config.include_existing)
            .await
            .with_context(|| format!("fetching locations of zone {}", zone.code))?;

        if records.iter().any(|r| r.coordinates.is_none()) {
            self.coordinates.resolve(self.store.as_ref(), &mut records).await?;
        }

        let (located, unlocated): (Vec<LocationRecord>, Vec<LocationRecord>) =
            records.into_iter().partition(|r| r.is_coordinate_valid());
        debug!(
            "Zone {}: {} located, {} without coordinates",
            zone.code,
            located.len(),
            unlocated.len()
        );

        let max = self.config.max_cluster_size;
        let groups = tokio::task::spawn_blocking(move || clustering::partition(located, max))
            .await
            .with_context(|| format!("clustering zone {}", zone.code))?;

        Ok(ZoneClusters { groups, unlocated })
    }

    /// Add nearby unplanned prospects to clusters still below the minimum size.
    /// Returns the number of locations added.
    async fn top_up(&self, clusters: &mut [Cluster], exclusion: &ExclusionSet) -> Result<usize> {
        let planned: HashSet<String> = clusters
            .iter()
            .flat_map(|c| c.members.iter().chain(c.unlocated.iter()))
            .map(|r| r.id.clone())
            .collect();
        let mut taken = exclusion.extended(planned);

        let source: &dyn CandidateSource = self.store.as_ref();
        let search = GeoSearchService::new(source, self.config.max_radius_expansions);
        let mut added = 0;

        for cluster in clusters.iter_mut().filter(|c| c.size() < self.config.min_cluster_size) {
            let Some(center) = cluster.centroid() else {
                continue;
            };
            let request = GeoSearchRequest {
                center,
                radius_km: self.config.search_radius_km,
                zone: cluster.primary_zone().map(String::from),
                desired: self.config.min_cluster_size - cluster.size(),
            };

            let result = search.search(&request, &taken).await?;
            debug!(
                "Cluster {} topped up with {} prospects within {:.1} km ({} expansions)",
                cluster.id,
                result.candidates.len(),
                result.radius_km,
                result.expansions
            );
            let found = result.into_records();
            for record in &found {
                taken.insert_extra(record.id.clone());
            }
            added += found.len();
            cluster.members.extend(found);
        }

        info!("Top-up added {} prospects to undersized clusters", added);
        Ok(added)
    }
}

/// Sequence every cluster and turn the stops into route plan rows.
/// Returns the rows and the total travel distance.
fn build_rows(
    entity: &Entity,
    clusters: &[Cluster],
    assignments: &[RouteAssignment],
    depot: Option<Coordinates>,
) -> (Vec<RoutePlanEntry>, f64) {
    let mut rows = Vec::with_capacity(clusters.iter().map(|c| c.size() + c.unlocated.len()).sum());
    let mut travel_km = 0.0;

    for (cluster, assignment) in clusters.iter().zip(assignments) {
        let route = sequence_route(&cluster.members, &cluster.unlocated, depot);
        travel_km += route.travel_km;
        debug!(
            "Cluster {} -> {} on {}: {} stops, {:.2} km",
            cluster.id,
            assignment.agent_id,
            assignment.date,
            route.sequenced_count(),
            route.travel_km
        );

        let code = route_code(&assignment.territory, assignment.date);
        let label = route_label(&assignment.agent_id, assignment.date);
        let weekday = weekday_code(assignment.date);

        rows.extend(route.stops.into_iter().map(|stop| RoutePlanEntry {
            location_id: stop.record.id,
            route_date: assignment.date,
            name: stop.record.name,
            weekday,
            territory: assignment.territory.clone(),
            agent_id: assignment.agent_id.clone(),
            route_name: label.clone(),
            entity_id: entity.id.clone(),
            route_code: code.clone(),
            stop_no: stop.stop_no,
            kind: stop.record.kind,
            zone_code: stop.record.zone_code,
        }));
    }

    (rows, travel_km)
}

fn log_summary(summary: &PlanSummary) {
    match serde_json::to_string(summary) {
        Ok(json) => info!("Plan summary: {}", json),
        Err(e) => warn!("Could not serialize plan summary: {}", e),
    }
}
