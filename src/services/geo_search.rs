//! Bounding-box candidate search
//!
//! Looks for candidates around a center: first in the requested zone, then
//! in any zone inside the same box, widening the box by doubling the radius
//! while nothing at all is found. The expansion is a bounded loop, so an
//! exhausted search simply returns an empty list.

use std::cmp::Ordering;
use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info};

use crate::db::CandidateSource;
use crate::services::geo::{haversine_distance, BoundingBox};
use crate::types::{Coordinates, ExclusionSet, LocationRecord};

/// What to search for
#[derive(Debug, Clone)]
pub struct GeoSearchRequest {
    pub center: Coordinates,
    pub radius_km: f64,
    /// Preferred zone; candidates of other zones are only added as a fallback
    pub zone: Option<String>,
    pub desired: usize,
}

/// A candidate with its exact distance to the search center
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub record: LocationRecord,
    pub distance_km: f64,
}

#[derive(Debug, Clone)]
pub struct GeoSearchResult {
    /// Nearest first
    pub candidates: Vec<RankedCandidate>,
    /// Radius of the last box queried
    pub radius_km: f64,
    pub expansions: u32,
}

impl GeoSearchResult {
    pub fn into_records(self) -> Vec<LocationRecord> {
        self.candidates.into_iter().map(|c| c.record).collect()
    }
}

pub struct GeoSearchService<'a> {
    source: &'a dyn CandidateSource,
    max_expansions: u32,
}

impl<'a> GeoSearchService<'a> {
    pub fn new(source: &'a dyn CandidateSource, max_expansions: u32) -> Self {
        Self {
            source,
            max_expansions,
        }
    }

    /// The `desired` nearest candidates
    pub async fn search(&self, request: &GeoSearchRequest, exclusion: &ExclusionSet) -> Result<GeoSearchResult> {
        let mut result = self.candidate_pool(request, exclusion).await?;
        result.candidates.truncate(request.desired);

        if !result.candidates.is_empty() {
            debug!(
                "Selected {} nearest candidates ({:.2} - {:.2} km)",
                result.candidates.len(),
                result.candidates[0].distance_km,
                result.candidates[result.candidates.len() - 1].distance_km
            );
        }
        Ok(result)
    }

    /// Every candidate found before truncation, ranked nearest first.
    /// Ties keep the order the store returned them in.
    pub async fn candidate_pool(
        &self,
        request: &GeoSearchRequest,
        exclusion: &ExclusionSet,
    ) -> Result<GeoSearchResult> {
        let mut radius_km = request.radius_km;
        let mut expansions = 0;

        loop {
            let pool = self.query_box(request, radius_km, exclusion).await?;

            if !pool.is_empty() {
                return Ok(GeoSearchResult {
                    candidates: rank(&request.center, pool),
                    radius_km,
                    expansions,
                });
            }

            if expansions >= self.max_expansions {
                info!(
                    "No candidates within {:.1} km of ({:.6}, {:.6}) after {} expansions",
                    radius_km, request.center.lat, request.center.lng, expansions
                );
                return Ok(GeoSearchResult {
                    candidates: Vec::new(),
                    radius_km,
                    expansions,
                });
            }

            debug!("No candidates within {:.1} km, expanding search", radius_km);
            radius_km *= 2.0;
            expansions += 1;
        }
    }

    /// Zone-matched candidates in the box, topped up with any-zone candidates
    /// of the same box when there are fewer than desired.
    async fn query_box(
        &self,
        request: &GeoSearchRequest,
        radius_km: f64,
        exclusion: &ExclusionSet,
    ) -> Result<Vec<LocationRecord>> {
        let bbox = BoundingBox::around(&request.center, radius_km);

        let mut pool = match request.zone.as_deref() {
            Some(zone) => self.source.candidates_in_box(&bbox, Some(zone), exclusion).await?,
            None => Vec::new(),
        };

        if request.zone.is_none() || pool.len() < request.desired {
            let fallback = self.source.candidates_in_box(&bbox, None, exclusion).await?;
            if request.zone.is_some() && !fallback.is_empty() {
                debug!(
                    "Zone match gave {} candidates, adding any-zone candidates within {:.1} km",
                    pool.len(),
                    radius_km
                );
            }
            union_by_id(&mut pool, fallback);
        }

        // The store already filters, but the exclusion set is authoritative
        pool.retain(|r| !exclusion.contains(&r.id) && r.is_coordinate_valid());
        Ok(pool)
    }
}

/// Append `extra` to `pool`, skipping ids already present. First occurrence wins.
fn union_by_id(pool: &mut Vec<LocationRecord>, extra: Vec<LocationRecord>) {
    let mut seen: HashSet<String> = pool.iter().map(|r| r.id.clone()).collect();
    for record in extra {
        if seen.insert(record.id.clone()) {
            pool.push(record);
        }
    }
}

fn rank(center: &Coordinates, pool: Vec<LocationRecord>) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = pool
        .into_iter()
        .filter_map(|record| {
            let c = record.coordinates?;
            Some(RankedCandidate {
                distance_km: haversine_distance(center, &c),
                record,
            })
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| a.distance_km.partial_cmp(&b.distance_km).unwrap_or(Ordering::Equal));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering as AtomicOrdering;

    const CENTER: Coordinates = Coordinates::new(14.6, 121.0);

    /// Point `km` kilometers due north of the center
    fn north(km: f64) -> Coordinates {
        Coordinates::new(CENTER.lat + km / 111.195, CENTER.lng)
    }

    fn store_with(records: Vec<LocationRecord>) -> MemoryStore {
        MemoryStore::new().with_locations("D1", records)
    }

    fn request(radius_km: f64, zone: Option<&str>, desired: usize) -> GeoSearchRequest {
        GeoSearchRequest {
            center: CENTER,
            radius_km,
            zone: zone.map(String::from),
            desired,
        }
    }

    fn ids(result: &GeoSearchResult) -> Vec<String> {
        result.candidates.iter().map(|c| c.record.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_search_ranks_by_distance_and_truncates() {
        let store = store_with(vec![
            LocationRecord::prospect("far", north(3.0), "Z1"),
            LocationRecord::prospect("near", north(0.5), "Z1"),
            LocationRecord::prospect("mid", north(1.5), "Z1"),
        ]);
        let service = GeoSearchService::new(&store, 3);

        let result = service.search(&request(5.0, Some("Z1"), 2), &ExclusionSet::default()).await.unwrap();

        assert_eq!(ids(&result), vec!["near", "mid"]);
        assert_eq!(result.expansions, 0);
        assert!(result.candidates[0].distance_km < result.candidates[1].distance_km);
    }

    #[tokio::test]
    async fn test_search_falls_back_to_other_zones_when_short() {
        let store = store_with(vec![
            LocationRecord::prospect("same-zone", north(2.0), "Z1"),
            LocationRecord::prospect("other-zone", north(1.0), "Z2"),
            LocationRecord::prospect("other-zone-far", north(20.0), "Z2"),
        ]);
        let service = GeoSearchService::new(&store, 3);

        let result = service.search(&request(5.0, Some("Z1"), 3), &ExclusionSet::default()).await.unwrap();

        // any-zone fallback stays inside the same box
        assert_eq!(ids(&result), vec!["other-zone", "same-zone"]);
    }

    #[tokio::test]
    async fn test_search_skips_fallback_when_zone_suffices() {
        let store = store_with(vec![
            LocationRecord::prospect("z1-a", north(2.0), "Z1"),
            LocationRecord::prospect("z1-b", north(2.5), "Z1"),
            LocationRecord::prospect("z2", north(0.1), "Z2"),
        ]);
        let service = GeoSearchService::new(&store, 3);

        let result = service.search(&request(5.0, Some("Z1"), 2), &ExclusionSet::default()).await.unwrap();

        assert_eq!(ids(&result), vec!["z1-a", "z1-b"]);
        assert_eq!(store.box_queries.load(AtomicOrdering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_search_expands_radius_until_found() {
        let store = store_with(vec![LocationRecord::prospect("p", north(15.0), "Z1")]);
        let service = GeoSearchService::new(&store, 3);

        let result = service.search(&request(5.0, Some("Z1"), 5), &ExclusionSet::default()).await.unwrap();

        assert_eq!(ids(&result), vec!["p"]);
        assert_eq!(result.expansions, 2);
        assert_eq!(result.radius_km, 20.0);
    }

    #[tokio::test]
    async fn test_search_fully_excluded_zone_returns_empty_after_cap() {
        let store = store_with(vec![
            LocationRecord::prospect("a", north(0.5), "Z1"),
            LocationRecord::prospect("b", north(1.0), "Z1"),
        ]);
        let exclusion = ExclusionSet::new(["a", "b"].iter().map(|s| s.to_string()).collect());
        let service = GeoSearchService::new(&store, 3);

        let result = service.search(&request(1.0, Some("Z1"), 5), &exclusion).await.unwrap();

        assert!(result.candidates.is_empty());
        assert_eq!(result.expansions, 3);
        assert_eq!(result.radius_km, 8.0);
        // zone query + fallback query for each of the 4 radii
        assert_eq!(store.box_queries.load(AtomicOrdering::Relaxed), 8);
    }

    #[tokio::test]
    async fn test_doubled_radius_pool_is_superset() {
        let store = store_with(vec![
            LocationRecord::prospect("a", north(0.5), "Z1"),
            LocationRecord::prospect("b", north(1.8), "Z2"),
            LocationRecord::prospect("c", north(3.0), "Z1"),
            LocationRecord::prospect("d", north(3.9), "Z2"),
            LocationRecord::prospect("e", north(7.0), "Z1"),
            LocationRecord::prospect("x", north(1.0), "Z1"),
        ]);
        let exclusion = ExclusionSet::new(["x".to_string()].into_iter().collect());
        let service = GeoSearchService::new(&store, 0);

        for zone in [None, Some("Z1")] {
            for r in [1.0, 2.0, 4.0] {
                let small = service.candidate_pool(&request(r, zone, 10), &exclusion).await.unwrap();
                let large = service.candidate_pool(&request(2.0 * r, zone, 10), &exclusion).await.unwrap();

                let small_ids: HashSet<String> = ids(&small).into_iter().collect();
                let large_ids: HashSet<String> = ids(&large).into_iter().collect();
                assert!(small_ids.is_subset(&large_ids), "radius {} zone {:?}", r, zone);
                assert!(!large_ids.contains("x"));
            }
        }
    }

    #[tokio::test]
    async fn test_doubled_radius_drops_fallback_once_zone_suffices() {
        let store = store_with(vec![
            LocationRecord::prospect("z1-near", north(0.5), "Z1"),
            LocationRecord::prospect("other", north(0.8), "Z2"),
            LocationRecord::prospect("z1-mid", north(1.5), "Z1"),
        ]);
        let service = GeoSearchService::new(&store, 0);

        let small = service.candidate_pool(&request(1.0, Some("Z1"), 2), &ExclusionSet::default()).await.unwrap();
        let large = service.candidate_pool(&request(2.0, Some("Z1"), 2), &ExclusionSet::default()).await.unwrap();

        // Short at 1 km, so the other zone fills in; at 2 km the zone alone is enough
        assert_eq!(ids(&small), vec!["z1-near", "other"]);
        assert_eq!(ids(&large), vec!["z1-near", "z1-mid"]);
    }

    #[tokio::test]
    async fn test_equal_distances_keep_store_order() {
        let east = Coordinates::new(CENTER.lat, CENTER.lng + 0.01);
        let store = store_with(vec![
            LocationRecord::prospect("first", east, "Z1"),
            LocationRecord::prospect("second", east, "Z1"),
        ]);
        let service = GeoSearchService::new(&store, 0);

        let result = service.search(&request(5.0, None, 2), &ExclusionSet::default()).await.unwrap();

        assert_eq!(ids(&result), vec!["first", "second"]);
    }

    #[test]
    fn test_union_by_id_dedupes() {
        let c = Coordinates::new(10.0, 120.0);
        let mut pool = vec![LocationRecord::prospect("a", c, "Z1")];
        union_by_id(
            &mut pool,
            vec![LocationRecord::prospect("a", c, "Z2"), LocationRecord::prospect("b", c, "Z2")],
        );
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[0].zone_code, "Z1");
    }
}
