//! Size-constrained geographic clustering
//!
//! Splits a zone's locations into groups of at most `max_cluster_size`
//! members. Uses k-means over lat/lng projected to a local plane, with a
//! capacity-bounded assignment step so no group can exceed the limit.

use std::cmp::Ordering;

use tracing::debug;

use crate::defaults::MAX_KMEANS_ITERATIONS;
use crate::types::{Coordinates, LocationRecord};

type Point = [f64; 2];

/// Label every point with a group index in `0..k`, where
/// `k = ceil(n / max_cluster_size)`. Every label is used and every group
/// holds between 1 and `max_cluster_size` points.
pub fn cluster_labels(points: &[Coordinates], max_cluster_size: usize) -> Vec<usize> {
    let n = points.len();
    let max_cluster_size = max_cluster_size.max(1);

    if n == 0 {
        return Vec::new();
    }
    if n <= max_cluster_size {
        return vec![0; n];
    }

    let k = n.div_ceil(max_cluster_size);
    let projected = project(points);

    let mut centers = farthest_point_seeds(&projected, k);
    let mut labels: Option<Vec<usize>> = None;

    for iteration in 0..MAX_KMEANS_ITERATIONS {
        let mut next = assign_with_capacity(&projected, &centers, max_cluster_size);
        repair_empty(&projected, &centers, &mut next);

        let stable = labels.as_ref() == Some(&next);
        centers = recompute_centers(&projected, &next, &centers);
        labels = Some(next);

        if stable {
            debug!("k-means converged after {} iterations (k={}, n={})", iteration + 1, k, n);
            break;
        }
    }

    labels.unwrap_or_else(|| vec![0; n])
}

/// Group `records` by `labels`, preserving input order inside each group.
/// Group `i` holds the records labelled `i`; empty groups are dropped.
pub fn group_by_labels<T>(records: Vec<T>, labels: &[usize]) -> Vec<Vec<T>> {
    let k = labels.iter().copied().max().map(|m| m + 1).unwrap_or(0);
    let mut groups: Vec<Vec<T>> = (0..k).map(|_| Vec::new()).collect();
    for (record, &label) in records.into_iter().zip(labels) {
        groups[label].push(record);
    }
    groups.retain(|g| !g.is_empty());
    groups
}

/// Cluster coordinate-valid records into size-bounded groups.
/// Records without coordinates are ignored.
pub fn partition(records: Vec<LocationRecord>, max_cluster_size: usize) -> Vec<Vec<LocationRecord>> {
    let records: Vec<LocationRecord> = records.into_iter().filter(|r| r.is_coordinate_valid()).collect();
    let points: Vec<Coordinates> = records.iter().filter_map(|r| r.coordinates).collect();
    let labels = cluster_labels(&points, max_cluster_size);
    group_by_labels(records, &labels)
}

/// Equirectangular projection around the mean latitude
fn project(points: &[Coordinates]) -> Vec<Point> {
    let mean_lat = points.iter().map(|p| p.lat).sum::<f64>() / points.len() as f64;
    let scale = mean_lat.to_radians().cos();
    points.iter().map(|p| [p.lng * scale, p.lat]).collect()
}

fn dist2(a: &Point, b: &Point) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

/// First seed is the first point; each next seed is the point farthest
/// from every seed chosen so far.
fn farthest_point_seeds(points: &[Point], k: usize) -> Vec<Point> {
    let mut centers: Vec<Point> = Vec::with_capacity(k);
    centers.push(points[0]);

    for _ in 1..k {
        let mut best_idx = 0;
        let mut best_dist = -1.0;
        for (i, p) in points.iter().enumerate() {
            let min_dist = centers
                .iter()
                .map(|c| dist2(p, c))
                .fold(f64::INFINITY, f64::min);
            if min_dist > best_dist {
                best_dist = min_dist;
                best_idx = i;
            }
        }
        centers.push(points[best_idx]);
    }

    centers
}

/// Assign points to centers nearest-pair first, skipping centers that are full.
/// Ties are broken by point index, then center index.
fn assign_with_capacity(points: &[Point], centers: &[Point], capacity: usize) -> Vec<usize> {
    let mut pairs: Vec<(f64, usize, usize)> = Vec::with_capacity(points.len() * centers.len());
    for (i, p) in points.iter().enumerate() {
        for (j, c) in centers.iter().enumerate() {
            pairs.push((dist2(p, c), i, j));
        }
    }
    pairs.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    let mut counts = vec![0usize; centers.len()];
    let mut remaining = points.len();

    for (_, i, j) in pairs {
        if remaining == 0 {
            break;
        }
        if labels[i].is_some() || counts[j] >= capacity {
            continue;
        }
        labels[i] = Some(j);
        counts[j] += 1;
        remaining -= 1;
    }

    // k * capacity >= n, so every point found a center
    labels.into_iter().map(|l| l.unwrap_or(0)).collect()
}

/// Give every empty group the point nearest to its center, taken from the
/// largest group that can spare one.
fn repair_empty(points: &[Point], centers: &[Point], labels: &mut [usize]) {
    let k = centers.len();
    let mut counts = vec![0usize; k];
    for &l in labels.iter() {
        counts[l] += 1;
    }

    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let donor = (0..k)
            .filter(|&j| counts[j] > 1)
            .max_by_key(|&j| (counts[j], std::cmp::Reverse(j)));
        let Some(donor) = donor else {
            return;
        };

        let nearest = labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == donor)
            .map(|(i, _)| i)
            .min_by(|&a, &b| {
                dist2(&points[a], &centers[empty])
                    .partial_cmp(&dist2(&points[b], &centers[empty]))
                    .unwrap_or(Ordering::Equal)
            });

        if let Some(i) = nearest {
            labels[i] = empty;
            counts[donor] -= 1;
            counts[empty] += 1;
        }
    }
}

fn recompute_centers(points: &[Point], labels: &[usize], previous: &[Point]) -> Vec<Point> {
    let k = previous.len();
    let mut sums = vec![[0.0, 0.0]; k];
    let mut counts = vec![0usize; k];
    for (p, &l) in points.iter().zip(labels) {
        sums[l][0] += p[0];
        sums[l][1] += p[1];
        counts[l] += 1;
    }
    (0..k)
        .map(|j| {
            if counts[j] > 0 {
                [sums[j][0] / counts[j] as f64, sums[j][1] / counts[j] as f64]
            } else {
                previous[j]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// `n` points scattered within ~1 km of `center`
    fn blob(rng: &mut StdRng, center: Coordinates, n: usize) -> Vec<Coordinates> {
        (0..n)
            .map(|_| {
                Coordinates::new(
                    center.lat + rng.gen_range(-0.008..0.008),
                    center.lng + rng.gen_range(-0.008..0.008),
                )
            })
            .collect()
    }

    fn sizes(labels: &[usize]) -> Vec<usize> {
        let k = labels.iter().max().map(|m| m + 1).unwrap_or(0);
        let mut counts = vec![0; k];
        for &l in labels {
            counts[l] += 1;
        }
        counts
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_labels(&[], 60).is_empty());
    }

    #[test]
    fn test_small_set_is_single_cluster() {
        let mut rng = StdRng::seed_from_u64(1);
        let points = blob(&mut rng, Coordinates::new(14.6, 121.0), 60);
        assert_eq!(cluster_labels(&points, 60), vec![0; 60]);
    }

    #[test]
    fn test_separated_groups_are_found() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut points = blob(&mut rng, Coordinates::new(14.60, 121.00), 60);
        points.extend(blob(&mut rng, Coordinates::new(14.90, 121.30), 60));
        points.extend(blob(&mut rng, Coordinates::new(14.30, 121.40), 10));

        let labels = cluster_labels(&points, 60);
        let mut s = sizes(&labels);
        s.sort_unstable();

        assert_eq!(s, vec![10, 60, 60]);
        // each blob lands in one group
        assert!(labels[..60].iter().all(|&l| l == labels[0]));
        assert!(labels[60..120].iter().all(|&l| l == labels[60]));
        assert!(labels[120..].iter().all(|&l| l == labels[120]));
    }

    #[test]
    fn test_sizes_bounded_for_random_inputs() {
        let mut rng = StdRng::seed_from_u64(42);
        for n in [61, 97, 150, 233, 400] {
            for max in [1, 7, 20, 60] {
                let points: Vec<Coordinates> = (0..n)
                    .map(|_| Coordinates::new(rng.gen_range(14.0..15.0), rng.gen_range(120.5..121.5)))
                    .collect();

                let labels = cluster_labels(&points, max);
                let s = sizes(&labels);

                assert_eq!(labels.len(), n);
                assert_eq!(s.len(), n.div_ceil(max), "n={} max={}", n, max);
                assert!(s.iter().all(|&c| c >= 1 && c <= max), "n={} max={} sizes={:?}", n, max, s);
            }
        }
    }

    #[test]
    fn test_identical_points_still_split() {
        let points = vec![Coordinates::new(10.0, 120.0); 25];
        let s = sizes(&cluster_labels(&points, 10));
        assert_eq!(s.len(), 3);
        assert!(s.iter().all(|&c| (1..=10).contains(&c)));
        assert_eq!(s.iter().sum::<usize>(), 25);
    }

    #[test]
    fn test_group_by_labels_preserves_order() {
        let groups = group_by_labels(vec!["a", "b", "c", "d"], &[1, 0, 1, 0]);
        assert_eq!(groups, vec![vec!["b", "d"], vec!["a", "c"]]);
    }

    #[test]
    fn test_partition_skips_unlocated() {
        let mut records = vec![
            LocationRecord::prospect("a", Coordinates::new(10.0, 120.0), "Z"),
            LocationRecord::prospect("b", Coordinates::new(10.001, 120.0), "Z"),
        ];
        records[1].coordinates = None;

        let groups = partition(records, 60);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[0][0].id, "a");
    }
}
