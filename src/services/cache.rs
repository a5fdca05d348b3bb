//! Run-scoped caches shared between zone tasks
//!
//! Both caches are cheap to clone (an `Arc` inside) and are handed to each
//! worker task by value. Locks guard only the map access itself and are never
//! held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::db::RouteStore;
use crate::types::{Coordinates, ExclusionSet, LocationRecord};

/// Exclusion set loaded once per run, plus the ids each distributor of the
/// run has committed so far
#[derive(Clone, Default)]
pub struct ExclusionCache {
    cell: Arc<OnceCell<ExclusionSet>>,
    committed: Arc<Mutex<HashSet<String>>>,
}

impl ExclusionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The run's exclusion set, fetching it on first use. Ids committed
    /// earlier in the run are layered on top.
    pub async fn get_or_load(&self, store: &dyn RouteStore) -> Result<ExclusionSet> {
        let set = self
            .cell
            .get_or_try_init(|| async {
                info!("Fetching excluded location ids...");
                let set = ExclusionSet::new(store.list_excluded_ids().await?);
                info!("  Excluded {} location ids", set.len());
                Ok::<_, anyhow::Error>(set)
            })
            .await?;

        let committed: Vec<String> = self.committed.lock().iter().cloned().collect();
        Ok(set.extended(committed))
    }

    /// Exclude `ids` from every later `get_or_load` of this run
    pub fn commit<I>(&self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut committed = self.committed.lock();
        let before = committed.len();
        committed.extend(ids);
        debug!(
            "Committed {} location ids ({} in this run)",
            committed.len() - before,
            committed.len()
        );
    }
}

/// Location id → coordinates, filled incrementally as zones are processed.
/// `None` records a lookup that found no usable coordinates, so the store is
/// not asked again.
#[derive(Clone, Default)]
pub struct CoordinateCache {
    entries: Arc<Mutex<HashMap<String, Option<Coordinates>>>>,
}

impl CoordinateCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<Option<Coordinates>> {
        self.entries.lock().get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Fill in missing coordinates of `records`, asking the store only for ids
    /// the cache has never seen.
    pub async fn resolve(&self, store: &dyn RouteStore, records: &mut [LocationRecord]) -> Result<()> {
        let mut uncached: Vec<String> = Vec::new();
        {
            let entries = self.entries.lock();
            for record in records.iter_mut().filter(|r| r.coordinates.is_none()) {
                match entries.get(&record.id) {
                    Some(cached) => record.coordinates = *cached,
                    None => uncached.push(record.id.clone()),
                }
            }
        }

        if uncached.is_empty() {
            return Ok(());
        }

        debug!("Looking up coordinates for {} uncached locations", uncached.len());
        let found = store.lookup_coordinates(&uncached).await?;

        {
            let mut entries = self.entries.lock();
            for id in uncached {
                let coordinates = found.get(&id).copied();
                entries.insert(id, coordinates);
            }
        }

        for record in records.iter_mut().filter(|r| r.coordinates.is_none()) {
            if let Some(c) = found.get(&record.id) {
                record.coordinates = Some(*c);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::types::LocationKind;
    use std::sync::atomic::Ordering;

    fn customer(id: &str) -> LocationRecord {
        LocationRecord {
            id: id.to_string(),
            coordinates: None,
            zone_code: "Z1".to_string(),
            kind: LocationKind::Existing,
            name: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_exclusion_cache_fetches_once() {
        let store = MemoryStore::new().with_visited(["v1", "v2"]);
        let cache = ExclusionCache::new();

        let first = cache.get_or_load(&store).await.unwrap();
        let second = cache.clone().get_or_load(&store).await.unwrap();

        assert!(first.contains("v1"));
        assert_eq!(second.len(), 2);
        assert_eq!(store.excluded_fetches.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_exclusion_cache_layers_committed_ids() {
        let store = MemoryStore::new().with_visited(["v1"]);
        let cache = ExclusionCache::new();

        let before = cache.get_or_load(&store).await.unwrap();
        cache.commit(["p1".to_string(), "p2".to_string()]);
        let after = cache.clone().get_or_load(&store).await.unwrap();

        assert!(!before.contains("p1"));
        assert!(after.contains("v1") && after.contains("p1") && after.contains("p2"));
        assert_eq!(after.len(), 3);
        assert_eq!(store.excluded_fetches.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_coordinate_cache_resolves_and_remembers_misses() {
        let mut store = MemoryStore::new();
        store
            .customer_coordinates
            .insert("c1".to_string(), Coordinates::new(14.6, 121.0));
        let cache = CoordinateCache::new();

        let mut records = vec![customer("c1"), customer("c2")];
        cache.resolve(&store, &mut records).await.unwrap();

        assert_eq!(records[0].coordinates, Some(Coordinates::new(14.6, 121.0)));
        assert!(records[1].coordinates.is_none());
        assert_eq!(cache.get("c2"), Some(None));
        assert_eq!(cache.len(), 2);

        // Second pass is answered from the cache
        let mut again = vec![customer("c1"), customer("c2")];
        cache.resolve(&store, &mut again).await.unwrap();
        assert_eq!(again[0].coordinates, Some(Coordinates::new(14.6, 121.0)));
        assert_eq!(store.coordinate_lookups.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_coordinate_cache_skips_store_when_nothing_missing() {
        let store = MemoryStore::new();
        let cache = CoordinateCache::new();
        let mut records = vec![LocationRecord::prospect("p1", Coordinates::new(10.0, 120.0), "Z1")];

        tokio_test::block_on(cache.resolve(&store, &mut records)).unwrap();

        assert_eq!(store.coordinate_lookups.load(Ordering::Relaxed), 0);
        assert_eq!(cache.len(), 0);
    }
}
