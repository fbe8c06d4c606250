//! True wind estimation from maneuver geometry.
//!
//! A boat tacks through the wind and jibes through dead downwind, so each
//! maneuver brackets the wind direction. Two per-maneuver estimates are
//! blended 0.4/0.6:
//!
//! 1. the reverse of the leg-average heading that points away from the
//!    wind (the bisector of the unswept arc for tacks, of the swept arc for
//!    jibes);
//! 2. each leg's heading offset by the typical sailing angle toward the
//!    wind, averaged as vectors.
//!
//! Per-maneuver estimates are fused with a circular weighted mean. Recent
//! maneuvers weigh more because wind shifts over a session.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::geo::{
    angle_from_components, circular_mean, circular_weighted_mean, mean_resultant_length,
    normalize_angle, GeoPoint,
};
use crate::maneuver::{Maneuver, ManeuverType};
use crate::polar::BoatPolar;
use crate::sailing::{true_wind_angle, PointOfSail};
use crate::track::TrackPoint;

/// Weights of the two per-maneuver direction estimates.
const HEADING_ESTIMATE_WEIGHT: f64 = 0.4;
const SAILING_ANGLE_ESTIMATE_WEIGHT: f64 = 0.6;

/// Recency weight of the oldest maneuver; the newest gets 1.0.
const OLDEST_RECENCY_WEIGHT: f64 = 0.7;

/// Samples this close (seconds) to a maneuver are excluded from speed stats.
const MANEUVER_EXCLUSION_S: f64 = 15.0;

/// Typical boat speed / wind speed ratios without a polar.
const UPWIND_SPEED_RATIO: f64 = 0.55;
const REACHING_SPEED_RATIO: f64 = 0.75;
const DOWNWIND_SPEED_RATIO: f64 = 0.65;

/// Concentration of a prior estimate at confidence 1.
const PRIOR_CONCENTRATION: f64 = 2.0;

/// Origin of a wind estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindSource {
    ManeuverAnalysis,
    Direct,
    Combined,
}

/// A point estimate of the true wind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindEstimate {
    /// Direction the wind blows from, degrees [0, 360).
    pub direction: f64,
    /// Knots.
    pub speed: f64,
    pub confidence: f64,
    pub timestamp: f64,
    pub source: WindSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl WindEstimate {
    /// A directly measured or caller-supplied wind.
    pub fn direct(direction: f64, speed: f64, confidence: f64, timestamp: f64) -> Self {
        Self {
            direction: normalize_angle(direction),
            speed: speed.max(0.0),
            confidence: confidence.clamp(0.0, 1.0),
            timestamp,
            source: WindSource::Direct,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_position(mut self, position: GeoPoint) -> Self {
        self.latitude = Some(position.latitude);
        self.longitude = Some(position.longitude);
        self
    }

    pub fn position(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }
}

/// Whether the maneuver turned through dead downwind rather than the wind.
fn turns_downwind(m: &Maneuver) -> bool {
    match m.maneuver_type {
        ManeuverType::Jibe => true,
        ManeuverType::Tack => false,
        _ => {
            m.before_state.point_of_sail == PointOfSail::Downwind
                && m.after_state.point_of_sail == PointOfSail::Downwind
        }
    }
}

/// Wind direction implied by a single maneuver.
pub fn maneuver_wind_direction(m: &Maneuver, config: &AnalysisConfig) -> f64 {
    let downwind = turns_downwind(m);
    let swept_bisector = normalize_angle(m.before_bearing + m.bearing_change / 2.0);

    // Leg-average heading pointing away from the wind, reversed
    let away_heading = if downwind {
        swept_bisector
    } else {
        normalize_angle(swept_bisector + 180.0)
    };
    let from_heading = normalize_angle(away_heading + 180.0);

    let turn_sign = if m.bearing_change < 0.0 { -1.0 } else { 1.0 };
    let (before_offset, after_offset) = if downwind {
        let a = config.typical_downwind_angle;
        (-turn_sign * a, turn_sign * a)
    } else {
        let a = config.typical_close_hauled_angle;
        (turn_sign * a, -turn_sign * a)
    };
    let from_sailing_angle = circular_mean(&[
        m.before_bearing + before_offset,
        m.after_bearing + after_offset,
    ]);

    match from_sailing_angle {
        Some(d2) => circular_weighted_mean(
            &[from_heading, d2],
            &[HEADING_ESTIMATE_WEIGHT, SAILING_ANGLE_ESTIMATE_WEIGHT],
        )
        .unwrap_or(from_heading),
        None => from_heading,
    }
}

/// Trust in a maneuver's wind estimate, in [0, 1].
///
/// Highest for confident maneuvers of about 90 degrees with ~30% speed loss.
pub fn maneuver_estimate_confidence(m: &Maneuver) -> f64 {
    let speed_confidence = 1.0 - ((m.speed_ratio - 0.7).abs() / 0.5).min(1.0);
    let angle_confidence = 1.0 - ((m.bearing_change.abs() - 90.0).abs() / 45.0).min(1.0);
    (0.5 * m.maneuver_confidence + 0.2 * speed_confidence + 0.3 * angle_confidence).clamp(0.0, 1.0)
}

/// Linear ramp from 0.7 (oldest) to 1.0 (newest).
pub fn recency_weights(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..n)
            .map(|i| {
                OLDEST_RECENCY_WEIGHT + (1.0 - OLDEST_RECENCY_WEIGHT) * i as f64 / (n - 1) as f64
            })
            .collect(),
    }
}

/// Tacks when at least two exist, otherwise every maneuver; time ordered.
fn select_maneuvers(maneuvers: &[Maneuver]) -> Vec<&Maneuver> {
    let tacks: Vec<&Maneuver> = maneuvers
        .iter()
        .filter(|m| m.maneuver_type == ManeuverType::Tack)
        .collect();
    let mut selected = if tacks.len() >= 2 {
        tacks
    } else {
        maneuvers.iter().collect()
    };
    selected.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    selected
}

fn centroid(maneuvers: &[&Maneuver]) -> Option<GeoPoint> {
    if maneuvers.is_empty() {
        return None;
    }
    let n = maneuvers.len() as f64;
    let lat = maneuvers.iter().map(|m| m.latitude).sum::<f64>() / n;
    let lon = maneuvers.iter().map(|m| m.longitude).sum::<f64>() / n;
    Some(GeoPoint::new(lat, lon))
}

/// Per-maneuver observations feeding the estimators.
struct Observations {
    directions: Vec<f64>,
    confidences: Vec<f64>,
    weights: Vec<f64>,
    timestamp: f64,
    position: Option<GeoPoint>,
}

/// Estimates true wind from detected maneuvers.
#[derive(Debug, Clone)]
pub struct WindEstimator {
    config: AnalysisConfig,
    polar: Option<BoatPolar>,
}

impl WindEstimator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            config: config.clone(),
            polar: None,
        }
    }

    /// Use a boat polar to derive wind speed from boat speed.
    ///
    /// Fails with [`MalformedPolar`](crate::AnalysisError::MalformedPolar) for an inconsistent table.
    pub fn with_polar(mut self, polar: BoatPolar) -> Result<Self> {
        polar.validate()?;
        self.polar = Some(polar);
        Ok(self)
    }

    /// Estimate wind with the variant chosen by `use_bayesian`.
    ///
    /// Returns None when fewer than two usable maneuvers exist.
    pub fn estimate(
        &self,
        maneuvers: &[Maneuver],
        track: &[TrackPoint],
        prior: Option<&WindEstimate>,
    ) -> Option<WindEstimate> {
        if self.config.use_bayesian {
            self.estimate_bayesian(maneuvers, track, prior)
        } else {
            self.estimate_weighted(maneuvers, track)
        }
    }

    fn observations(&self, maneuvers: &[Maneuver], track: &[TrackPoint]) -> Option<Observations> {
        let selected = select_maneuvers(maneuvers);
        if selected.len() < 2 {
            debug!("Wind estimate skipped: {} usable maneuvers", selected.len());
            return None;
        }

        let directions: Vec<f64> = selected
            .iter()
            .map(|m| maneuver_wind_direction(m, &self.config))
            .collect();
        let confidences: Vec<f64> = selected
            .iter()
            .map(|m| maneuver_estimate_confidence(m))
            .collect();
        let weights: Vec<f64> = confidences
            .iter()
            .zip(recency_weights(selected.len()))
            .map(|(c, r)| c * r)
            .collect();

        let timestamp = track
            .last()
            .map(|p| p.timestamp)
            .or_else(|| selected.last().map(|m| m.timestamp))
            .unwrap_or(0.0);

        Some(Observations {
            directions,
            confidences,
            weights,
            timestamp,
            position: centroid(&selected),
        })
    }

    /// Confidence-and-recency weighted circular mean of per-maneuver
    /// estimates.
    pub fn estimate_weighted(
        &self,
        maneuvers: &[Maneuver],
        track: &[TrackPoint],
    ) -> Option<WindEstimate> {
        let obs = self.observations(maneuvers, track)?;
        let direction = circular_weighted_mean(&obs.directions, &obs.weights)?;

        let total: f64 = obs.weights.iter().sum();
        let mean_confidence = obs
            .confidences
            .iter()
            .zip(&obs.weights)
            .map(|(c, w)| c * w)
            .sum::<f64>()
            / total;
        let consistency = mean_resultant_length(&obs.directions, &obs.weights);
        let speed = self.estimate_wind_speed(maneuvers, track, direction);

        debug!(
            "Wind from {:.1} at {:.1} kn (confidence {:.2}, {} maneuvers)",
            direction,
            speed,
            mean_confidence * consistency,
            obs.directions.len()
        );

        let mut estimate = WindEstimate {
            direction,
            speed,
            confidence: (mean_confidence * consistency).clamp(0.0, 1.0),
            timestamp: obs.timestamp,
            source: WindSource::ManeuverAnalysis,
            latitude: None,
            longitude: None,
        };
        if let Some(p) = obs.position {
            estimate = estimate.with_position(p);
        }
        Some(estimate)
    }

    /// Sequential von Mises style update: the posterior resultant vector is
    /// the prior's vector plus each observation scaled by its weight.
    pub fn estimate_bayesian(
        &self,
        maneuvers: &[Maneuver],
        track: &[TrackPoint],
        prior: Option<&WindEstimate>,
    ) -> Option<WindEstimate> {
        let obs = self.observations(maneuvers, track)?;

        let prior_kappa = prior.map_or(0.0, |p| PRIOR_CONCENTRATION * p.confidence);
        let (mut s, mut c) = match prior {
            Some(p) => {
                let r = p.direction.to_radians();
                (prior_kappa * r.sin(), prior_kappa * r.cos())
            }
            None => (0.0, 0.0),
        };
        let mut kappa = prior_kappa;
        for (d, w) in obs.directions.iter().zip(&obs.weights) {
            let r = d.to_radians();
            s += w * r.sin();
            c += w * r.cos();
            kappa += w;
        }
        if !(kappa > 0.0) || s.hypot(c) / kappa < 1e-12 {
            return None;
        }

        let direction = angle_from_components(s, c);
        let resultant = (s.hypot(c) / kappa).clamp(0.0, 1.0);
        let certainty = kappa / (kappa + 1.0);

        let observed_speed = self.estimate_wind_speed(maneuvers, track, direction);
        let observed_kappa = kappa - prior_kappa;
        let speed = match prior {
            Some(p) if prior_kappa > 0.0 => {
                (p.speed * prior_kappa + observed_speed * observed_kappa) / kappa
            }
            _ => observed_speed,
        };

        let mut estimate = WindEstimate {
            direction,
            speed,
            confidence: (resultant * certainty).clamp(0.0, 1.0),
            timestamp: obs.timestamp,
            source: if prior.is_some() {
                WindSource::Combined
            } else {
                WindSource::ManeuverAnalysis
            },
            latitude: None,
            longitude: None,
        };
        if let Some(p) = obs.position {
            estimate = estimate.with_position(p);
        }
        Some(estimate)
    }

    /// Wind speed in knots from steady-sailing boat speeds.
    ///
    /// Samples near maneuvers are skipped. With a polar the wind speed is
    /// found by inverting it per sample (median taken); otherwise typical
    /// boat/wind speed ratios per point of sail are used. Falls back to
    /// maneuver entry speeds when the track has no usable samples.
    pub fn estimate_wind_speed(
        &self,
        maneuvers: &[Maneuver],
        track: &[TrackPoint],
        direction: f64,
    ) -> f64 {
        let steady: Vec<(f64, f64)> = track
            .iter()
            .filter(|p| {
                !maneuvers
                    .iter()
                    .any(|m| (m.timestamp - p.timestamp).abs() < MANEUVER_EXCLUSION_S)
            })
            .map(|p| (true_wind_angle(p.bearing, direction), p.speed))
            .collect();

        let samples: Vec<(f64, f64)> = if steady.is_empty() {
            maneuvers
                .iter()
                .map(|m| (true_wind_angle(m.before_bearing, direction), m.before_speed))
                .collect()
        } else {
            steady
        };
        if samples.is_empty() {
            return 0.0;
        }

        if let Some(polar) = &self.polar {
            let mut inverted: Vec<f64> = samples
                .iter()
                .filter_map(|&(twa, speed)| polar.wind_speed_for(twa, speed))
                .collect();
            if !inverted.is_empty() {
                inverted.sort_by(|a, b| a.total_cmp(b));
                let mid = inverted.len() / 2;
                return if inverted.len() % 2 == 0 {
                    (inverted[mid - 1] + inverted[mid]) / 2.0
                } else {
                    inverted[mid]
                };
            }
        }

        let mut sums = [(0.0, 0usize); 3];
        for &(twa, speed) in &samples {
            let slot = if twa <= self.config.upwind_threshold {
                0
            } else if twa >= self.config.downwind_threshold {
                2
            } else {
                1
            };
            sums[slot].0 += speed;
            sums[slot].1 += 1;
        }
        let ratios = [UPWIND_SPEED_RATIO, REACHING_SPEED_RATIO, DOWNWIND_SPEED_RATIO];
        let (weighted, count) = sums
            .iter()
            .zip(ratios)
            .filter(|((_, n), _)| *n > 0)
            .fold((0.0, 0usize), |(acc, total), ((sum, n), ratio)| {
                let mean = sum / *n as f64;
                (acc + mean / ratio * *n as f64, total + n)
            });
        if count == 0 {
            0.0
        } else {
            (weighted / count as f64).max(0.0)
        }
    }
}
