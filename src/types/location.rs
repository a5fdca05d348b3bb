//! Location types shared by every planning stage

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Build coordinates from nullable store columns.
    ///
    /// A zero in either column is how the source tables mark "not geocoded",
    /// so it is treated the same as a missing value.
    pub fn from_raw(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 && lat.is_finite() && lng.is_finite() => {
                Some(Self { lat, lng })
            }
            _ => None,
        }
    }
}

/// Whether a location is already a customer or only a prospect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Existing,
    Prospect,
}

impl LocationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            LocationKind::Existing => "existing",
            LocationKind::Prospect => "prospect",
        }
    }
}

/// A candidate visit location, normalized from whichever source table it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: String,
    pub coordinates: Option<Coordinates>,
    pub zone_code: String,
    pub kind: LocationKind,
    pub name: String,
}

impl LocationRecord {
    #[cfg(test)]
    pub fn prospect(id: impl Into<String>, coordinates: Coordinates, zone_code: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            coordinates: Some(coordinates),
            zone_code: zone_code.into(),
            kind: LocationKind::Prospect,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// True iff both coordinates are present and non-zero.
    pub fn is_coordinate_valid(&self) -> bool {
        self.coordinates.is_some()
    }
}

/// Location ids that must never be offered as new candidates.
///
/// The base set is loaded once per run and shared read-only between zone
/// tasks. `extended` layers additional ids on top for a single stage without
/// touching the shared base.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    base: Arc<HashSet<String>>,
    extra: HashSet<String>,
}

impl ExclusionSet {
    pub fn new(ids: HashSet<String>) -> Self {
        Self {
            base: Arc::new(ids),
            extra: HashSet::new(),
        }
    }

    /// A copy sharing the same base, with `ids` excluded as well.
    pub fn extended<I>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut extra = self.extra.clone();
        extra.extend(ids);
        Self {
            base: Arc::clone(&self.base),
            extra,
        }
    }

    pub fn insert_extra(&mut self, id: impl Into<String>) {
        self.extra.insert(id.into());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.base.contains(id) || self.extra.contains(id)
    }

    pub fn len(&self) -> usize {
        self.base.len() + self.extra.iter().filter(|id| !self.base.contains(*id)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All excluded ids, for binding into store queries.
    pub fn to_vec(&self) -> Vec<String> {
        self.base
            .iter()
            .chain(self.extra.iter().filter(|id| !self.base.contains(*id)))
            .cloned()
            .collect()
    }
}
