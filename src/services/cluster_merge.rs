//! Undersized-cluster merging
//!
//! Folds clusters below the minimum size into the nearest cluster (by
//! centroid) that can take all of their members without exceeding the
//! maximum. Sizes only ever grow, so a cluster with no eligible target at
//! its turn never gains one later and a single pass is enough.

use std::cmp::Ordering;

use tracing::{debug, info, warn};

use crate::services::geo::haversine_distance;
use crate::types::{size_distribution, Cluster, ClusterId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Small clusters folded into another cluster
    pub merged: usize,
    /// Small clusters left standalone for lack of an eligible target
    pub skipped: usize,
    /// Clusters still below the threshold afterwards
    pub undersized_remaining: usize,
}

/// Merge clusters smaller than `min_size` into their nearest eligible
/// neighbour, in ascending cluster id order.
pub fn merge_undersized(clusters: &mut Vec<Cluster>, min_size: usize, max_size: usize) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    let mut small: Vec<ClusterId> = clusters
        .iter()
        .filter(|c| c.size() < min_size)
        .map(|c| c.id)
        .collect();
    small.sort_unstable();

    info!(
        "Merging undersized clusters: {} of {} below {}",
        small.len(),
        clusters.len(),
        min_size
    );

    for id in small {
        // may already have been absorbed, or grown past the threshold
        let Some(source_idx) = clusters.iter().position(|c| c.id == id) else {
            continue;
        };
        if clusters[source_idx].size() >= min_size {
            continue;
        }

        match nearest_target(clusters, source_idx, max_size) {
            Some(target_idx) => {
                let source = clusters.remove(source_idx);
                let target_idx = if target_idx > source_idx { target_idx - 1 } else { target_idx };
                let target = &mut clusters[target_idx];
                debug!(
                    "Merged cluster {} ({} members) into cluster {} ({} members)",
                    source.id,
                    source.size(),
                    target.id,
                    target.size()
                );
                target.absorb(source);
                outcome.merged += 1;
            }
            None => {
                debug!(
                    "No merge target for cluster {} ({} members)",
                    clusters[source_idx].id,
                    clusters[source_idx].size()
                );
                outcome.skipped += 1;
            }
        }
    }

    outcome.undersized_remaining = clusters.iter().filter(|c| c.size() < min_size).count();

    if let Some((min, max, mean)) = size_distribution(clusters) {
        info!(
            "Cluster sizes after merge: {} clusters, min {}, max {}, mean {:.1} (merged {}, skipped {})",
            clusters.len(),
            min,
            max,
            mean,
            outcome.merged,
            outcome.skipped
        );
    }
    if outcome.undersized_remaining > 0 {
        warn!(
            "{} clusters remain below {} members",
            outcome.undersized_remaining, min_size
        );
    }

    outcome
}

/// Index of the nearest other cluster whose combined size stays within
/// `max_size`. Centroids are taken live; ties go to the lower cluster id.
fn nearest_target(clusters: &[Cluster], source_idx: usize, max_size: usize) -> Option<usize> {
    let source = &clusters[source_idx];
    let origin = source.centroid()?;

    clusters
        .iter()
        .enumerate()
        .filter(|&(i, c)| i != source_idx && c.size() + source.size() <= max_size)
        .filter_map(|(i, c)| c.centroid().map(|centroid| (i, c.id, haversine_distance(&origin, &centroid))))
        .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal).then(a.1.cmp(&b.1)))
        .map(|(i, _, _)| i)
}
