//! Visiting order within a day route
//!
//! Greedy nearest-neighbour over a precomputed distance matrix. The route
//! starts at the depot when one is known (the depot gets no stop number),
//! otherwise at the first member.

use tracing::debug;

use crate::services::geo::distance_matrix;
use crate::types::{Coordinates, LocationRecord, StopNumber};

#[derive(Debug, Clone)]
pub struct SequencedStop {
    pub record: LocationRecord,
    pub stop_no: StopNumber,
}

#[derive(Debug, Clone, Default)]
pub struct SequencedRoute {
    /// Numbered stops in visiting order, followed by unsequenced records
    pub stops: Vec<SequencedStop>,
    /// Sum of traversed legs, including the depot leg; no return leg
    pub travel_km: f64,
}

impl SequencedRoute {
    pub fn sequenced_count(&self) -> usize {
        self.stops.iter().filter(|s| s.stop_no.is_sequenced()).count()
    }
}

/// Order `members` by nearest neighbour from `depot` and append `unlocated`
/// with the unsequenced stop number. Members without coordinates are treated
/// as unlocated.
pub fn sequence_route(
    members: &[LocationRecord],
    unlocated: &[LocationRecord],
    depot: Option<Coordinates>,
) -> SequencedRoute {
    let (located, mut unsequenced): (Vec<&LocationRecord>, Vec<&LocationRecord>) =
        members.iter().partition(|m| m.is_coordinate_valid());
    unsequenced.extend(unlocated.iter());

    let mut points: Vec<Coordinates> = Vec::with_capacity(located.len() + 1);
    if let Some(d) = depot {
        points.push(d);
    }
    points.extend(located.iter().filter_map(|m| m.coordinates));

    let offset = usize::from(depot.is_some());
    let (order, travel_km) = nearest_neighbor_order(&distance_matrix(&points), offset);

    let mut stops: Vec<SequencedStop> = order
        .into_iter()
        .enumerate()
        .map(|(i, idx)| SequencedStop {
            record: located[idx - offset].clone(),
            stop_no: StopNumber::Sequenced(i as u32 + 1),
        })
        .collect();

    stops.extend(unsequenced.into_iter().map(|r| SequencedStop {
        record: r.clone(),
        stop_no: StopNumber::Unsequenced,
    }));

    debug!(
        "Sequenced {} stops ({} unsequenced), {:.2} km",
        located.len(),
        stops.len() - located.len(),
        travel_km
    );

    SequencedRoute { stops, travel_km }
}

/// Visit every matrix index from `first_stop` on, starting at index 0 when a
/// depot occupies it (`first_stop == 1`) or at `first_stop` otherwise.
/// Ties go to the lowest index. Returns the order and the distance travelled.
fn nearest_neighbor_order(matrix: &[Vec<f64>], first_stop: usize) -> (Vec<usize>, f64) {
    let n = matrix.len();
    if n <= first_stop {
        return (Vec::new(), 0.0);
    }

    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n - first_stop);
    let mut travel = 0.0;

    // Index 0 is either the depot or the first member; only a member is a stop
    let mut current = 0;
    if first_stop == 0 {
        visited[0] = true;
        order.push(0);
    }

    while order.len() < n - first_stop {
        let mut best: Option<(usize, f64)> = None;
        for candidate in first_stop..n {
            if visited[candidate] {
                continue;
            }
            let d = matrix[current][candidate];
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((candidate, d));
            }
        }

        let Some((next, d)) = best else {
            break;
        };
        visited[next] = true;
        order.push(next);
        travel += d;
        current = next;
    }

    (order, travel)
}
