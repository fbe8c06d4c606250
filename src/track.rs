//! GPS track samples.
//!
//! Tracks arrive from the host's ingestion layer as ordered samples with
//! strictly increasing timestamps. Helpers here validate and summarize
//! them; nothing mutates a sample once created.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::geo::{normalize_angle, GeoPoint};

/// A single time-stamped GPS sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Unix time in seconds.
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Speed over ground in knots.
    pub speed: f64,
    /// Course over ground in degrees [0, 360).
    pub bearing: f64,
}

impl TrackPoint {
    pub fn new(timestamp: f64, latitude: f64, longitude: f64, speed: f64, bearing: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            speed,
            bearing: normalize_angle(bearing),
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Finite values, plausible coordinates, non-negative speed.
    pub fn is_valid(&self) -> bool {
        self.timestamp.is_finite()
            && self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.speed.is_finite()
            && self.bearing.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.speed >= 0.0
    }
}

/// Check the input contract: valid samples with strictly increasing
/// timestamps.
pub fn validate_track(points: &[TrackPoint]) -> Result<()> {
    if let Some((i, _)) = points.iter().enumerate().find(|(_, p)| !p.is_valid()) {
        return Err(AnalysisError::InvalidTrack(format!(
            "sample {i} has invalid values"
        )));
    }
    if let Some(i) = points
        .windows(2)
        .position(|w| !(w[1].timestamp > w[0].timestamp))
    {
        return Err(AnalysisError::InvalidTrack(format!(
            "timestamps not strictly increasing at sample {}",
            i + 1
        )));
    }
    Ok(())
}

/// Elapsed time covered by the track, in seconds.
pub fn duration(points: &[TrackPoint]) -> f64 {
    match (points.first(), points.last()) {
        (Some(a), Some(b)) => (b.timestamp - a.timestamp).max(0.0),
        _ => 0.0,
    }
}

/// Sample closest in time to `timestamp`.
pub fn nearest_in_time(points: &[TrackPoint], timestamp: f64) -> Option<&TrackPoint> {
    if points.is_empty() {
        return None;
    }
    let idx = points.partition_point(|p| p.timestamp < timestamp);
    let candidates = [idx.checked_sub(1), (idx < points.len()).then_some(idx)];
    candidates
        .into_iter()
        .flatten()
        .map(|i| &points[i])
        .min_by(|a, b| {
            (a.timestamp - timestamp)
                .abs()
                .total_cmp(&(b.timestamp - timestamp).abs())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(t: f64) -> TrackPoint {
        TrackPoint::new(t, 54.0, 10.0, 5.0, 45.0)
    }

    #[test]
    fn new_normalizes_bearing() {
        assert_eq!(TrackPoint::new(0.0, 0.0, 0.0, 1.0, -90.0).bearing, 270.0);
        assert_eq!(TrackPoint::new(0.0, 0.0, 0.0, 1.0, 360.0).bearing, 0.0);
    }

    #[test]
    fn validate_accepts_increasing() {
        validate_track(&[tp(0.0), tp(1.0), tp(2.5)]).unwrap();
        validate_track(&[]).unwrap();
    }

    #[test]
    fn validate_rejects_ties() {
        let err = validate_track(&[tp(0.0), tp(1.0), tp(1.0)]).unwrap_err();
        assert!(err.to_string().contains("sample 2"), "got: {err}");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut bad = tp(1.0);
        bad.latitude = 95.0;
        assert!(validate_track(&[tp(0.0), bad]).is_err());

        let mut negative = tp(1.0);
        negative.speed = -1.0;
        assert!(validate_track(&[negative]).is_err());
    }

    #[test]
    fn duration_of_track() {
        assert_eq!(duration(&[tp(10.0), tp(20.0), tp(70.0)]), 60.0);
        assert_eq!(duration(&[]), 0.0);
    }

    #[test]
    fn nearest_in_time_picks_closest() {
        let track = [tp(0.0), tp(10.0), tp(20.0)];
        assert_eq!(nearest_in_time(&track, 12.0).unwrap().timestamp, 10.0);
        assert_eq!(nearest_in_time(&track, 16.0).unwrap().timestamp, 20.0);
        assert_eq!(nearest_in_time(&track, -5.0).unwrap().timestamp, 0.0);
        assert_eq!(nearest_in_time(&track, 99.0).unwrap().timestamp, 20.0);
        assert!(nearest_in_time(&[], 1.0).is_none());
    }
}
