//! Cluster types

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Coordinates, LocationRecord};
use crate::services::geo;

/// Run-wide unique cluster identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A day-sized group of locations for one agent
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: ClusterId,
    /// Coordinate-valid members, in the order they were added
    pub members: Vec<LocationRecord>,
    /// Records of the same group that have no usable coordinates.
    /// They travel with the cluster but never count towards its size.
    pub unlocated: Vec<LocationRecord>,
}

impl Cluster {
    pub fn new(id: ClusterId, members: Vec<LocationRecord>) -> Self {
        Self {
            id,
            members,
            unlocated: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Mean lat/lng of the coordinate-valid members
    pub fn centroid(&self) -> Option<Coordinates> {
        let points: Vec<Coordinates> = self.members.iter().filter_map(|m| m.coordinates).collect();
        geo::centroid(&points)
    }

    /// Zone of the first member, used as the cluster's home zone
    pub fn primary_zone(&self) -> Option<&str> {
        self.members
            .first()
            .or_else(|| self.unlocated.first())
            .map(|m| m.zone_code.as_str())
    }

    /// Move every record of `other` into this cluster.
    pub fn absorb(&mut self, other: Cluster) {
        self.members.extend(other.members);
        self.unlocated.extend(other.unlocated);
    }
}

/// min / max / mean of cluster sizes, for log lines
pub fn size_distribution(clusters: &[Cluster]) -> Option<(usize, usize, f64)> {
    if clusters.is_empty() {
        return None;
    }
    let sizes = clusters.iter().map(Cluster::size);
    let min = sizes.clone().min().unwrap_or(0);
    let max = sizes.clone().max().unwrap_or(0);
    let mean = sizes.sum::<usize>() as f64 / clusters.len() as f64;
    Some((min, max, mean))
}
