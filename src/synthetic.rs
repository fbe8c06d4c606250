//! Synthetic sailing tracks with known ground truth.
//!
//! Generates deterministic tracks from a list of legs (heading, speed,
//! duration). Each heading change slows the boat for a configurable time,
//! mimicking the speed loss of a real tack or jibe. Used by tests and by
//! hosts that want a demo track.
//!
//! # Example
//!
//! ```rust
//! use sailtrack::geo::GeoPoint;
//! use sailtrack::synthetic::{Leg, TrackScenario};
//!
//! let scenario = TrackScenario {
//!     origin: GeoPoint::new(54.43, 10.19),
//!     legs: vec![Leg::new(45.0, 6.0, 60.0), Leg::new(315.0, 6.0, 60.0)],
//!     ..TrackScenario::default()
//! };
//! let track = scenario.generate();
//! assert_eq!(track.len(), 121);
//! ```

use crate::geo::{project, GeoPoint};
use crate::track::TrackPoint;

/// Meters per second in one knot.
pub const KNOTS_TO_MS: f64 = 0.514_444;

/// A straight segment sailed at constant heading.
#[derive(Debug, Clone, Copy)]
pub struct Leg {
    pub heading: f64,
    /// Steady-state speed in knots.
    pub speed: f64,
    /// Seconds spent on this leg.
    pub duration: f64,
}

impl Leg {
    pub fn new(heading: f64, speed: f64, duration: f64) -> Self {
        Self {
            heading,
            speed,
            duration,
        }
    }
}

/// Parameters for a generated track.
#[derive(Debug, Clone)]
pub struct TrackScenario {
    pub origin: GeoPoint,
    pub start_time: f64,
    /// Seconds between samples.
    pub sample_interval: f64,
    pub legs: Vec<Leg>,
    /// Speed multiplier applied right after a heading change.
    pub maneuver_speed_factor: f64,
    /// Seconds the reduced speed lasts after a heading change.
    pub maneuver_slowdown: f64,
    /// Amplitude of deterministic heading wobble, degrees.
    pub heading_wobble: f64,
}

impl Default for TrackScenario {
    fn default() -> Self {
        Self {
            origin: GeoPoint::new(54.43, 10.19),
            start_time: 1_700_000_000.0,
            sample_interval: 1.0,
            legs: Vec::new(),
            maneuver_speed_factor: 0.7,
            maneuver_slowdown: 8.0,
            heading_wobble: 0.0,
        }
    }
}

impl TrackScenario {
    /// Upwind beat: alternating close-hauled headings either side of
    /// `wind_direction`, starting on the tack that heads to the right of
    /// the wind.
    pub fn beat(wind_direction: f64, twa: f64, tacks: usize, leg_duration: f64) -> Self {
        let legs = (0..=tacks)
            .map(|i| {
                let heading = if i % 2 == 0 {
                    wind_direction + twa
                } else {
                    wind_direction - twa
                };
                Leg::new(heading, 6.0, leg_duration)
            })
            .collect();
        Self {
            legs,
            ..Self::default()
        }
    }

    /// Downwind run with jibes either side of the downwind direction.
    pub fn run(wind_direction: f64, twa: f64, jibes: usize, leg_duration: f64) -> Self {
        let legs = (0..=jibes)
            .map(|i| {
                let heading = if i % 2 == 0 {
                    wind_direction + twa
                } else {
                    wind_direction - twa
                };
                Leg::new(heading, 7.0, leg_duration)
            })
            .collect();
        Self {
            legs,
            ..Self::default()
        }
    }

    /// Generate the track. Consecutive samples are `sample_interval`
    /// seconds apart; the first sample sits at `origin`.
    pub fn generate(&self) -> Vec<TrackPoint> {
        let mut points = Vec::new();
        if self.legs.is_empty() || self.sample_interval <= 0.0 {
            return points;
        }

        let mut position = self.origin;
        let mut t = self.start_time;
        let total: f64 = self.legs.iter().map(|l| l.duration).sum();
        let steps = (total / self.sample_interval).round() as usize;

        let mut leg_idx = 0;
        let mut leg_start = 0.0;
        for step in 0..=steps {
            let elapsed = step as f64 * self.sample_interval;
            while leg_idx + 1 < self.legs.len()
                && elapsed >= leg_start + self.legs[leg_idx].duration
            {
                leg_start += self.legs[leg_idx].duration;
                leg_idx += 1;
            }
            let leg = &self.legs[leg_idx];

            let since_change = elapsed - leg_start;
            let speed = if leg_idx > 0 && since_change < self.maneuver_slowdown {
                leg.speed * self.maneuver_speed_factor
            } else {
                leg.speed
            };
            let wobble = self.heading_wobble * (step as f64 * 0.7).sin();
            let heading = leg.heading + wobble;

            if step > 0 {
                position = project(&position, heading, speed * KNOTS_TO_MS * self.sample_interval);
            }
            points.push(TrackPoint::new(
                t,
                position.latitude,
                position.longitude,
                speed,
                heading,
            ));
            t += self.sample_interval;
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{bearing, distance};

    #[test]
    fn generates_expected_sample_count() {
        let track = TrackScenario::beat(0.0, 45.0, 2, 60.0).generate();
        assert_eq!(track.len(), 181);
        assert!(track.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
    }

    #[test]
    fn positions_follow_heading() {
        let scenario = TrackScenario {
            legs: vec![Leg::new(90.0, 10.0, 100.0)],
            ..TrackScenario::default()
        };
        let track = scenario.generate();
        let first = track[0].position();
        let last = track[track.len() - 1].position();
        assert!((bearing(&first, &last) - 90.0).abs() < 0.1);
        let expected = 10.0 * KNOTS_TO_MS * 100.0;
        assert!((distance(&first, &last) - expected).abs() < 1.0);
    }

    #[test]
    fn speed_drops_after_heading_change() {
        let track = TrackScenario::beat(0.0, 45.0, 1, 30.0).generate();
        assert_eq!(track[29].speed, 6.0);
        assert!((track[30].speed - 4.2).abs() < 1e-9);
        assert_eq!(track[40].speed, 6.0);
    }

    #[test]
    fn empty_legs_give_empty_track() {
        assert!(TrackScenario::default().generate().is_empty());
    }
}
