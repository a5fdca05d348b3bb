//! Geographic calculations

use crate::types::Coordinates;

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude (and of longitude at the equator)
const KM_PER_DEGREE: f64 = 111.0;

/// Calculate Haversine distance between two points in kilometers
pub fn haversine_distance(from: &Coordinates, to: &Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lng - from.lng).to_radians();

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    // Rounding can push `a` a hair above 1.0 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Calculate distance matrix between all points
/// Returns a 2D vector where matrix[i][j] is the distance in km from point i to point j.
/// Each pair is computed once and mirrored, so the result is exactly symmetric.
pub fn distance_matrix(points: &[Coordinates]) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut matrix = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in (i + 1)..n {
            let d = haversine_distance(&points[i], &points[j]);
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
    }

    matrix
}

/// Mean lat/lng of a set of points
pub fn centroid(points: &[Coordinates]) -> Option<Coordinates> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat_sum, lng_sum) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));
    Some(Coordinates::new(lat_sum / n, lng_sum / n))
}

/// Axis-aligned lat/lng box used to pre-filter candidates before exact distances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Box spanning `radius_km` in each direction from `center`.
    /// A degree of longitude shrinks with cos(latitude).
    pub fn around(center: &Coordinates, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let cos_lat = center.lat.to_radians().cos().abs().max(1e-6);
        let lng_delta = radius_km / (KM_PER_DEGREE * cos_lat);

        Self {
            min_lat: center.lat - lat_delta,
            max_lat: center.lat + lat_delta,
            min_lng: center.lng - lng_delta,
            max_lng: center.lng + lng_delta,
        }
    }

    #[cfg(test)]
    pub fn contains(&self, point: &Coordinates) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }
}
