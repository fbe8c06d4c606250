//! End-to-end track analysis.
//!
//! Wind and maneuvers depend on each other: states are classified against
//! a wind guess, and the wind is estimated from the maneuvers. The loop is
//! explicit here: detect with the current guess, re-estimate, repeat until
//! the direction settles. Headings alone cannot tell a beat from a run, so
//! without a known wind several guesses are refined and scored.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::field::{interpolate_wind_field, WindField};
use crate::geo::{angle_difference, circular_mean, Bounds, GeoPoint};
use crate::maneuver::{coarse_wind_direction, Maneuver, ManeuverDetector, ManeuverType};
use crate::polar::{angle_efficiency, BoatPolar};
use crate::sailing::true_wind_angle;
use crate::strategy::{Course, StrategyAnalyzer, StrategyReport};
use crate::track::{validate_track, TrackPoint};
use crate::wind::{
    maneuver_estimate_confidence, maneuver_wind_direction, WindEstimate, WindEstimator, WindSource,
};

/// Refinement stops once the direction moves less than this, degrees.
const CONVERGENCE_DEG: f64 = 1.0;
/// Refinement rounds used by [`analyze_track`].
pub const DEFAULT_REFINE_ITERATIONS: usize = 5;

/// Offsets from the mean heading tried when no wind is known.
const SEED_OFFSETS: [f64; 4] = [0.0, 180.0, 90.0, 270.0];
const SEED_CONFIDENCE: f64 = 0.5;
/// Sailing angles this far from typical score zero in the fit.
const FIT_TOLERANCE_DEG: f64 = 30.0;
const FIT_EPSILON: f64 = 1e-9;

/// Everything derived from one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackAnalysis {
    pub maneuvers: Vec<Maneuver>,
    /// Track-wide wind estimate, if enough maneuvers were found.
    pub wind: Option<WindEstimate>,
    /// Positioned estimates from consecutive tack/jibe pairs.
    pub local_winds: Vec<WindEstimate>,
    pub strategy: StrategyReport,
}

/// Detect, estimate and repeat until the wind direction settles.
///
/// `initial` seeds the first detection and serves as prior for the
/// Bayesian estimator. Without it the track's mean heading and its
/// rotations by 90, 180 and 270 degrees are each refined and the result
/// whose tacks and jibes best match the typical sailing angles wins.
/// Returns the last successful estimate; None if none succeeded and no
/// initial estimate was given.
pub fn refine_wind(
    track: &[TrackPoint],
    config: &AnalysisConfig,
    initial: Option<&WindEstimate>,
    iterations: usize,
) -> Option<WindEstimate> {
    let detector = ManeuverDetector::new(config);
    let estimator = WindEstimator::new(config);
    match initial {
        Some(seed) => {
            refine_with(&detector, &estimator, track, Some(seed), Some(seed), iterations)
                .or_else(|| Some(seed.clone()))
        }
        None => resolve_wind(&detector, &estimator, config, track, iterations),
    }
}

/// Refinement loop. `seed` only steers the first detection and is never
/// returned by itself.
fn refine_with(
    detector: &ManeuverDetector,
    estimator: &WindEstimator,
    track: &[TrackPoint],
    seed: Option<&WindEstimate>,
    prior: Option<&WindEstimate>,
    iterations: usize,
) -> Option<WindEstimate> {
    let mut guess = seed.cloned();
    let mut estimate = None;
    for round in 0..iterations {
        let maneuvers = detector.detect(track, guess.as_ref());
        let Some(next) = estimator.estimate(&maneuvers, track, prior) else {
            debug!("Wind refinement stopped in round {round}: no estimate");
            break;
        };
        let settled = guess
            .as_ref()
            .is_some_and(|g| angle_difference(next.direction, g.direction).abs() < CONVERGENCE_DEG);
        guess = Some(next.clone());
        estimate = Some(next);
        if settled {
            debug!("Wind refinement converged after {} rounds", round + 1);
            break;
        }
    }
    estimate
}

/// Refine from the coarse heading guess and its rotations, keep the best
/// fitting result. Ties go to the earlier seed.
fn resolve_wind(
    detector: &ManeuverDetector,
    estimator: &WindEstimator,
    config: &AnalysisConfig,
    track: &[TrackPoint],
    iterations: usize,
) -> Option<WindEstimate> {
    let coarse = coarse_wind_direction(track);
    let start = track.first().map_or(0.0, |p| p.timestamp);

    let mut best: Option<(f64, WindEstimate)> = None;
    for offset in SEED_OFFSETS {
        let seed = WindEstimate::direct(coarse + offset, 0.0, SEED_CONFIDENCE, start);
        let Some(estimate) = refine_with(detector, estimator, track, Some(&seed), None, iterations)
        else {
            continue;
        };
        let maneuvers = detector.detect(track, Some(&estimate));
        let fit = sailing_angle_fit(&maneuvers, estimate.direction, config);
        debug!(
            "Seed {:.0}: wind {:.1}, fit {:.3}",
            seed.direction, estimate.direction, fit
        );
        if best.as_ref().map_or(true, |(f, _)| fit > f + FIT_EPSILON) {
            best = Some((fit, estimate));
        }
    }
    best.map(|(_, estimate)| estimate)
}

/// How well tacks and jibes match the typical close-hauled and downwind
/// angles under `wind_direction`: the sum over those maneuvers of
/// classification confidence times the mean angle efficiency of both legs.
pub fn sailing_angle_fit(
    maneuvers: &[Maneuver],
    wind_direction: f64,
    config: &AnalysisConfig,
) -> f64 {
    maneuvers
        .iter()
        .filter_map(|m| {
            let typical = match m.maneuver_type {
                ManeuverType::Tack => config.typical_close_hauled_angle,
                ManeuverType::Jibe => config.typical_downwind_angle,
                _ => return None,
            };
            let before = true_wind_angle(m.before_bearing, wind_direction);
            let after = true_wind_angle(m.after_bearing, wind_direction);
            let efficiency = (angle_efficiency(before, typical, FIT_TOLERANCE_DEG)
                + angle_efficiency(after, typical, FIT_TOLERANCE_DEG))
                / 2.0;
            Some(m.maneuver_confidence * efficiency)
        })
        .sum()
}

/// Positioned wind estimates from consecutive pairs of tacks or jibes.
///
/// Each pair yields the circular mean of the two per-maneuver directions,
/// placed midway between them at the time of the later maneuver. These
/// feed wind-shift detection and wind-field interpolation.
pub fn local_wind_estimates(
    maneuvers: &[Maneuver],
    config: &AnalysisConfig,
    wind_speed: f64,
) -> Vec<WindEstimate> {
    let usable: Vec<&Maneuver> = maneuvers.iter().filter(|m| m.is_tack_or_jibe()).collect();
    usable
        .windows(2)
        .filter_map(|pair| {
            let (a, b) = (pair[0], pair[1]);
            let direction = circular_mean(&[
                maneuver_wind_direction(a, config),
                maneuver_wind_direction(b, config),
            ])?;
            let confidence =
                (maneuver_estimate_confidence(a) + maneuver_estimate_confidence(b)) / 2.0;
            let position = GeoPoint::new(
                (a.latitude + b.latitude) / 2.0,
                (a.longitude + b.longitude) / 2.0,
            );
            Some(WindEstimate {
                direction,
                speed: wind_speed,
                confidence,
                timestamp: b.timestamp,
                source: WindSource::ManeuverAnalysis,
                latitude: Some(position.latitude),
                longitude: Some(position.longitude),
            })
        })
        .collect()
}

/// Run the full pipeline on one track.
///
/// Errors for an invalid configuration or a track violating the input
/// contract. Too little data gives empty maneuvers and no wind.
pub fn analyze_track(
    track: &[TrackPoint],
    config: &AnalysisConfig,
    polar: Option<&BoatPolar>,
    course: Option<&Course>,
) -> Result<TrackAnalysis> {
    config.validate()?;
    validate_track(track)?;

    let detector = ManeuverDetector::new(config);
    let mut estimator = WindEstimator::new(config);
    let mut analyzer = StrategyAnalyzer::new(config);
    if let Some(p) = polar {
        estimator = estimator.with_polar(p.clone())?;
        analyzer = analyzer.with_polar(p.clone())?;
    }

    let wind = resolve_wind(&detector, &estimator, config, track, DEFAULT_REFINE_ITERATIONS);
    let maneuvers = detector.detect(track, wind.as_ref());
    let wind_speed = wind.as_ref().map_or(0.0, |w| w.speed);
    let local_winds = local_wind_estimates(&maneuvers, config, wind_speed);
    let strategy = analyzer.report(track, &maneuvers, &local_winds, wind.as_ref(), course);

    info!(
        "Analyzed {} samples: {} maneuvers, wind {}, {} strategy points",
        track.len(),
        maneuvers.len(),
        wind.as_ref()
            .map_or("unknown".to_string(), |w| format!("{:.0}", w.direction)),
        strategy.points.len()
    );

    Ok(TrackAnalysis {
        maneuvers,
        wind,
        local_winds,
        strategy,
    })
}

/// JSON request for [`analyze_track_json`].
#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    track: Vec<TrackPoint>,
    #[serde(default)]
    config: AnalysisConfig,
    /// Built-in polar name.
    #[serde(default)]
    boat_type: Option<String>,
    /// Explicit polar table; wins over `boat_type`.
    #[serde(default)]
    polar: Option<BoatPolar>,
    #[serde(default)]
    course: Option<Course>,
}

/// JSON request for [`interpolate_wind_field_json`].
#[derive(Debug, Deserialize)]
struct FieldRequest {
    estimates: Vec<WindEstimate>,
    bounds: Bounds,
    resolution: usize,
}

fn analyze_request(json: &str) -> Result<String> {
    let request: AnalyzeRequest = serde_json::from_str(json)?;
    let polar = match (request.polar, request.boat_type) {
        (Some(p), _) => {
            p.validate()?;
            Some(p)
        }
        (None, Some(name)) => Some(BoatPolar::for_boat_type(&name)?),
        (None, None) => None,
    };
    let analysis = analyze_track(
        &request.track,
        &request.config,
        polar.as_ref(),
        request.course.as_ref(),
    )?;
    Ok(serde_json::to_string(&analysis)?)
}

fn field_request(json: &str) -> Result<String> {
    let request: FieldRequest = serde_json::from_str(json)?;
    let field: Option<WindField> =
        interpolate_wind_field(&request.estimates, request.bounds, request.resolution)?;
    Ok(serde_json::to_string(&field)?)
}

/// Analyze a track given as JSON: `{track, config?, boat_type?, polar?,
/// course?}`. Returns the serialized [`TrackAnalysis`].
pub fn analyze_track_json(json: &str) -> std::result::Result<String, String> {
    analyze_request(json).map_err(|e| e.to_string())
}

/// Interpolate a wind field given as JSON: `{estimates, bounds,
/// resolution}`. Returns the serialized field, or `null` without estimates.
pub fn interpolate_wind_field_json(json: &str) -> std::result::Result<String, String> {
    field_request(json).map_err(|e| e.to_string())
}
