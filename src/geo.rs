//! Geometry and angular utilities.
//!
//! Platform-agnostic great-circle helpers plus the circular arithmetic
//! every other module goes through. All coordinates use WGS84 (lat/lon in
//! degrees); all angles are degrees, compass convention (0 = north,
//! clockwise).

use serde::{Deserialize, Serialize};

/// Earth radius in meters (WGS84 mean).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters per degree of latitude used by the local planar approximation.
const M_PER_DEG_LAT: f64 = 111_195.08;

/// Resultant vectors shorter than this carry no direction.
const MIN_RESULTANT: f64 = 1e-12;

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Bounds {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Smallest box containing all points. None for an empty slice.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut b = Bounds::new(first.latitude, first.latitude, first.longitude, first.longitude);
        for p in &points[1..] {
            b.min_lat = b.min_lat.min(p.latitude);
            b.max_lat = b.max_lat.max(p.latitude);
            b.min_lon = b.min_lon.min(p.longitude);
            b.max_lon = b.max_lon.max(p.longitude);
        }
        Some(b)
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lon
            && p.longitude <= self.max_lon
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Finite and non-inverted.
    pub fn is_valid(&self) -> bool {
        [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
    }
}

/// Haversine distance between two points in meters.
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` to `b` in degrees [0, 360).
///
/// Returns 0 when the points coincide.
pub fn bearing(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    if y.abs() < MIN_RESULTANT && x.abs() < MIN_RESULTANT {
        return 0.0;
    }
    normalize_angle(y.atan2(x).to_degrees())
}

/// Destination reached from `start` travelling `distance_m` along the
/// great circle with initial bearing `bearing_deg`.
pub fn project(start: &GeoPoint, bearing_deg: f64, distance_m: f64) -> GeoPoint {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = start.latitude.to_radians();
    let lon1 = start.longitude.to_radians();

    let sin_lat2 = lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * sin_lat2);

    // Wrap longitude into [-180, 180)
    let lon_deg = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    GeoPoint::new(lat2.to_degrees(), lon_deg)
}

/// Angle wrapped into [0, 360).
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Signed shortest rotation from `b` to `a`, in (-180, 180].
///
/// Positive means `a` lies clockwise of `b`.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let d = normalize_angle(a - b);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Sum of weighted unit vectors as `(sin, cos)` components.
fn resultant(angles: &[f64], weights: &[f64]) -> (f64, f64) {
    angles
        .iter()
        .zip(weights)
        .fold((0.0, 0.0), |(s, c), (a, w)| {
            let r = a.to_radians();
            (s + w * r.sin(), c + w * r.cos())
        })
}

/// Weighted circular mean, `atan2(Σw·sin, Σw·cos)` mapped to [0, 360).
///
/// A single input is returned unchanged (normalized). Returns None for an
/// empty input, mismatched lengths, non-positive total weight, or when the
/// weighted vectors cancel out.
pub fn circular_weighted_mean(angles: &[f64], weights: &[f64]) -> Option<f64> {
    if angles.is_empty() || angles.len() != weights.len() {
        return None;
    }
    if angles.len() == 1 {
        return Some(normalize_angle(angles[0]));
    }
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) {
        return None;
    }
    let (s, c) = resultant(angles, weights);
    if s.hypot(c) / total < MIN_RESULTANT {
        return None;
    }
    Some(normalize_angle(s.atan2(c).to_degrees()))
}

/// Unweighted circular mean.
pub fn circular_mean(angles: &[f64]) -> Option<f64> {
    let weights = vec![1.0; angles.len()];
    circular_weighted_mean(angles, &weights)
}

/// Mean resultant length in [0, 1]: 1 when all angles agree, 0 when they
/// cancel out. Used as an angular consistency measure.
pub fn mean_resultant_length(angles: &[f64], weights: &[f64]) -> f64 {
    if angles.is_empty() || angles.len() != weights.len() {
        return 0.0;
    }
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) {
        return 0.0;
    }
    let (s, c) = resultant(angles, weights);
    (s.hypot(c) / total).clamp(0.0, 1.0)
}

/// Direction from `(sin, cos)` components, in [0, 360).
pub fn angle_from_components(sin: f64, cos: f64) -> f64 {
    normalize_angle(sin.atan2(cos).to_degrees())
}

/// Local planar coordinates of `p` relative to `origin`, in meters
/// (x east, y north).
///
/// Latitude-cosine scaled equirectangular approximation, accurate for the
/// few-kilometre extent of a race area.
pub fn to_local_xy(p: &GeoPoint, origin: &GeoPoint) -> (f64, f64) {
    let m_per_deg_lon = M_PER_DEG_LAT * origin.latitude.to_radians().cos();
    (
        (p.longitude - origin.longitude) * m_per_deg_lon,
        (p.latitude - origin.latitude) * M_PER_DEG_LAT,
    )
}

/// Distance in meters from `p` to the segment running `length_m` from
/// `origin` along `bearing_deg`.
///
/// Uses the planar approximation; the distance is clamped to the segment
/// ends.
pub fn distance_to_segment(p: &GeoPoint, origin: &GeoPoint, bearing_deg: f64, length_m: f64) -> f64 {
    let (px, py) = to_local_xy(p, origin);
    let theta = bearing_deg.to_radians();
    let (dx, dy) = (theta.sin(), theta.cos());

    let t = (px * dx + py * dy).clamp(0.0, length_m.max(0.0));
    let (cx, cy) = (t * dx, t * dy);
    (px - cx).hypot(py - cy)
}
