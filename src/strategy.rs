//! Strategy points, performance metrics and recommendations.
//!
//! Maneuvers and wind estimates are turned into typed, scored strategy
//! points. Points are filtered by detection sensitivity (a point survives
//! when `confidence > 1 - sensitivity`), summarized into metrics in
//! `[0, 1]`, and explained by a fixed rule table of recommendations.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::geo::{
    angle_difference, distance, distance_to_segment, normalize_angle, to_local_xy, GeoPoint,
};
use crate::maneuver::{Maneuver, ManeuverType};
use crate::polar::{angle_efficiency, BoatPolar};
use crate::sailing::true_wind_angle;
use crate::track::{duration, nearest_in_time, TrackPoint};
use crate::wind::WindEstimate;

/// Degrees off the optimal TWA at which angle efficiency reaches zero.
const ANGLE_TOLERANCE: f64 = 30.0;
/// Metric value reported when there is nothing to score.
const NEUTRAL_SCORE: f64 = 0.5;
/// Layline accuracy at or above which approaches are called accurate.
const GOOD_LAYLINE_ACCURACY: f64 = 0.7;
const HIGH_MANEUVER_COUNT: usize = 5;

/// Kind of strategy point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    WindShift,
    Tack,
    Jibe,
    Layline,
    Start,
    Finish,
    MarkRounding,
}

impl StrategyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyType::WindShift => "wind_shift",
            StrategyType::Tack => "tack",
            StrategyType::Jibe => "jibe",
            StrategyType::Layline => "layline",
            StrategyType::Start => "start",
            StrategyType::Finish => "finish",
            StrategyType::MarkRounding => "mark_rounding",
        }
    }
}

/// A scored, typed event on the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPoint {
    pub id: String,
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub strategy_type: StrategyType,
    pub confidence: f64,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

impl StrategyPoint {
    fn new(strategy_type: StrategyType, timestamp: f64, position: GeoPoint, confidence: f64) -> Self {
        Self {
            id: String::new(),
            timestamp,
            latitude: position.latitude,
            longitude: position.longitude,
            strategy_type,
            confidence: confidence.clamp(0.0, 1.0),
            details: BTreeMap::new(),
        }
    }

    fn detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Race course geometry known to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Course {
    pub start: Option<GeoPoint>,
    pub finish: Option<GeoPoint>,
    /// Marks in rounding order.
    pub marks: Vec<GeoPoint>,
}

/// Aggregate performance scores, each in [0, 1], plus the counts they
/// were derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub overall_score: f64,
    pub maneuver_efficiency: f64,
    pub wind_shift_response: f64,
    pub layline_accuracy: f64,
    pub tack_count: usize,
    pub jibe_count: usize,
    pub wind_shift_count: usize,
    pub layline_count: usize,
    pub mark_rounding_count: usize,
    /// Track duration in seconds.
    pub duration: f64,
}

/// Filtered strategy points with metrics and recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub points: Vec<StrategyPoint>,
    pub metrics: StrategyMetrics,
    pub recommendations: Vec<String>,
}

/// Keep points with `confidence > 1 - sensitivity`.
///
/// Raising the sensitivity lowers the threshold, so the surviving set only
/// grows.
pub fn filter_by_sensitivity(points: &[StrategyPoint], sensitivity: f64) -> Vec<StrategyPoint> {
    let threshold = 1.0 - sensitivity.clamp(0.0, 1.0);
    points
        .iter()
        .filter(|p| p.confidence > threshold)
        .cloned()
        .collect()
}

/// Builds strategy points and reports.
#[derive(Debug, Clone)]
pub struct StrategyAnalyzer {
    config: AnalysisConfig,
    polar: Option<BoatPolar>,
}

impl StrategyAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            config: config.clone(),
            polar: None,
        }
    }

    /// Score maneuver angles and place laylines with this polar.
    ///
    /// Fails with [`MalformedPolar`](crate::AnalysisError::MalformedPolar) for an inconsistent table.
    pub fn with_polar(mut self, polar: BoatPolar) -> Result<Self> {
        polar.validate()?;
        self.polar = Some(polar);
        Ok(self)
    }

    /// Optimal TWA for the point of sail: from the polar when one is set and
    /// the wind speed is known, otherwise the configured typical angle.
    fn optimal_twa(&self, wind: &WindEstimate, upwind: bool) -> f64 {
        match &self.polar {
            Some(polar) if wind.speed > 0.0 => polar.find_optimal_twa(wind.speed, upwind).twa,
            _ if upwind => self.config.typical_close_hauled_angle,
            _ => self.config.typical_downwind_angle,
        }
    }

    /// One point per tack or jibe, carrying the maneuver confidence.
    ///
    /// With a wind estimate the sailed angle after the maneuver is scored
    /// against the optimum and recorded as `quality`.
    pub fn maneuver_points(
        &self,
        maneuvers: &[Maneuver],
        wind: Option<&WindEstimate>,
    ) -> Vec<StrategyPoint> {
        maneuvers
            .iter()
            .filter_map(|m| {
                let strategy_type = match m.maneuver_type {
                    ManeuverType::Tack => StrategyType::Tack,
                    ManeuverType::Jibe => StrategyType::Jibe,
                    _ => return None,
                };
                let position = GeoPoint::new(m.latitude, m.longitude);
                let mut point =
                    StrategyPoint::new(strategy_type, m.timestamp, position, m.maneuver_confidence)
                        .detail("bearing_change", json!(m.bearing_change))
                        .detail("speed_ratio", json!(m.speed_ratio))
                        .detail("before_state", json!(m.before_state.to_string()))
                        .detail("after_state", json!(m.after_state.to_string()));

                let speed_kept = m.speed_ratio.clamp(0.0, 1.0);
                let quality = match wind {
                    Some(w) => {
                        let upwind = strategy_type == StrategyType::Tack;
                        let sailed = true_wind_angle(m.after_bearing, w.direction);
                        let optimal = self.optimal_twa(w, upwind);
                        let efficiency = angle_efficiency(sailed, optimal, ANGLE_TOLERANCE);
                        point = point
                            .detail("sailed_twa", json!(sailed))
                            .detail("optimal_twa", json!(optimal))
                            .detail("angle_efficiency", json!(efficiency));
                        speed_kept * efficiency
                    }
                    None => speed_kept,
                };
                Some(point.detail("quality", json!(quality)))
            })
            .collect()
    }

    /// A point wherever consecutive estimates differ by more than
    /// `wind_shift_threshold`. Clockwise shifts are veers.
    pub fn wind_shift_points(
        &self,
        estimates: &[WindEstimate],
        track: &[TrackPoint],
    ) -> Vec<StrategyPoint> {
        let mut ordered: Vec<&WindEstimate> = estimates.iter().collect();
        ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        ordered
            .windows(2)
            .filter_map(|pair| {
                let (prev, next) = (pair[0], pair[1]);
                let shift = angle_difference(next.direction, prev.direction);
                if shift.abs() <= self.config.wind_shift_threshold {
                    return None;
                }
                let position = next
                    .position()
                    .or_else(|| nearest_in_time(track, next.timestamp).map(|p| p.position()))
                    .or_else(|| prev.position())?;
                let confidence = prev.confidence.min(next.confidence);
                Some(
                    StrategyPoint::new(StrategyType::WindShift, next.timestamp, position, confidence)
                        .detail("shift", json!(shift))
                        .detail("kind", json!(if shift > 0.0 { "veer" } else { "back" }))
                        .detail("from_direction", json!(prev.direction))
                        .detail("to_direction", json!(next.direction)),
                )
            })
            .collect()
    }

    /// Tacks and jibes made on a layline.
    ///
    /// Laylines run from each mark at `wind + 180 ± optimal_twa`. Without
    /// course marks the most upwind track position anchors tack laylines
    /// and the most downwind one anchors jibe laylines.
    pub fn layline_points(
        &self,
        track: &[TrackPoint],
        maneuvers: &[Maneuver],
        wind: &WindEstimate,
        course: Option<&Course>,
    ) -> Vec<StrategyPoint> {
        let course_marks: Vec<GeoPoint> = course.map(|c| c.marks.clone()).unwrap_or_default();
        let tolerance = self.config.layline_tolerance_m;
        let mut points = Vec::new();

        for m in maneuvers {
            let upwind = match m.maneuver_type {
                ManeuverType::Tack => true,
                ManeuverType::Jibe => false,
                _ => continue,
            };
            let marks = if course_marks.is_empty() {
                match extreme_position(track, wind.direction, upwind) {
                    Some(p) => vec![p],
                    None => continue,
                }
            } else {
                course_marks.clone()
            };

            let twa = self.optimal_twa(wind, upwind);
            let position = GeoPoint::new(m.latitude, m.longitude);

            let best = marks
                .iter()
                .enumerate()
                .flat_map(|(idx, mark)| {
                    let length = 2.0 * distance(mark, &position);
                    [1.0, -1.0].into_iter().map(move |side: f64| {
                        let bearing = normalize_angle(wind.direction + 180.0 + side * twa);
                        let d = distance_to_segment(&position, mark, bearing, length);
                        (idx, bearing, d)
                    })
                })
                .min_by(|a, b| a.2.total_cmp(&b.2));

            let Some((mark_index, layline_bearing, d)) = best else {
                continue;
            };
            if d > tolerance {
                continue;
            }
            let accuracy = 1.0 - d / tolerance;
            points.push(
                StrategyPoint::new(
                    StrategyType::Layline,
                    m.timestamp,
                    position,
                    m.maneuver_confidence * (0.5 + 0.5 * accuracy),
                )
                .detail("mark_index", json!(mark_index))
                .detail("implicit_mark", json!(course_marks.is_empty()))
                .detail("layline_bearing", json!(layline_bearing))
                .detail("distance_m", json!(d))
                .detail("optimal_twa", json!(twa))
                .detail("accuracy", json!(accuracy)),
            );
        }
        points
    }

    /// Start, finish and mark rounding points from course geometry.
    pub fn course_points(&self, track: &[TrackPoint], course: &Course) -> Vec<StrategyPoint> {
        let radius = self.config.mark_radius_m;
        let mut points = Vec::new();

        if let Some(start) = &course.start {
            if let Some(&(from, to)) = visits(track, start, radius).first() {
                points.push(self.visit_point(StrategyType::Start, track, start, from, to));
            }
        }
        for (idx, mark) in course.marks.iter().enumerate() {
            for (from, to) in visits(track, mark, radius) {
                let entry = track[from].bearing;
                let exit = track[to].bearing;
                points.push(
                    self.visit_point(StrategyType::MarkRounding, track, mark, from, to)
                        .detail("mark_index", json!(idx))
                        .detail("bearing_change", json!(angle_difference(exit, entry))),
                );
            }
        }
        if let Some(finish) = &course.finish {
            if let Some(&(from, to)) = visits(track, finish, radius).last() {
                points.push(self.visit_point(StrategyType::Finish, track, finish, from, to));
            }
        }
        points
    }

    /// Point at the closest approach to `target` within a visit.
    fn visit_point(
        &self,
        strategy_type: StrategyType,
        track: &[TrackPoint],
        target: &GeoPoint,
        from: usize,
        to: usize,
    ) -> StrategyPoint {
        let (closest, d) = track[from..=to]
            .iter()
            .map(|p| (p, distance(&p.position(), target)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((&track[from], f64::INFINITY));
        let confidence = 1.0 - 0.5 * (d / self.config.mark_radius_m).min(1.0);
        StrategyPoint::new(strategy_type, closest.timestamp, closest.position(), confidence)
            .detail("distance_m", json!(d))
            .detail("duration", json!(track[to].timestamp - track[from].timestamp))
    }

    /// All strategy points, ordered by time, with ids assigned. Unfiltered.
    pub fn collect_points(
        &self,
        track: &[TrackPoint],
        maneuvers: &[Maneuver],
        estimates: &[WindEstimate],
        wind: Option<&WindEstimate>,
        course: Option<&Course>,
    ) -> Vec<StrategyPoint> {
        let mut points = self.maneuver_points(maneuvers, wind);
        points.extend(self.wind_shift_points(estimates, track));
        if let Some(w) = wind {
            points.extend(self.layline_points(track, maneuvers, w, course));
        }
        if let Some(c) = course {
            points.extend(self.course_points(track, c));
        }

        points.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        for (i, p) in points.iter_mut().enumerate() {
            p.id = format!("{}_{}", p.strategy_type.as_str(), i + 1);
        }
        points
    }

    /// Full report: points filtered by `detection_sensitivity`, metrics and
    /// recommendations over the surviving points.
    pub fn report(
        &self,
        track: &[TrackPoint],
        maneuvers: &[Maneuver],
        estimates: &[WindEstimate],
        wind: Option<&WindEstimate>,
        course: Option<&Course>,
    ) -> StrategyReport {
        let all = self.collect_points(track, maneuvers, estimates, wind, course);
        let points = filter_by_sensitivity(&all, self.config.detection_sensitivity);
        debug!(
            "Strategy: {} of {} points above sensitivity {}",
            points.len(),
            all.len(),
            self.config.detection_sensitivity
        );
        let metrics = compute_metrics(&points, duration(track), &self.config);
        let recommendations = recommendations(&metrics);
        StrategyReport {
            points,
            metrics,
            recommendations,
        }
    }
}

/// Track position furthest toward (upwind) or away from the wind.
fn extreme_position(track: &[TrackPoint], wind_direction: f64, upwind: bool) -> Option<GeoPoint> {
    let origin = track.first()?.position();
    let rad = wind_direction.to_radians();
    let (ux, uy) = (rad.sin(), rad.cos());
    let sign = if upwind { 1.0 } else { -1.0 };
    track
        .iter()
        .map(|p| {
            let (x, y) = to_local_xy(&p.position(), &origin);
            (p.position(), sign * (x * ux + y * uy))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(p, _)| p)
}

/// Contiguous index ranges of the track within `radius` of `target`.
fn visits(track: &[TrackPoint], target: &GeoPoint, radius: f64) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut open: Option<usize> = None;
    for (i, p) in track.iter().enumerate() {
        let inside = distance(&p.position(), target) <= radius;
        match (inside, open) {
            (true, None) => open = Some(i),
            (false, Some(from)) => {
                ranges.push((from, i - 1));
                open = None;
            }
            _ => {}
        }
    }
    if let Some(from) = open {
        ranges.push((from, track.len() - 1));
    }
    ranges
}

fn count(points: &[StrategyPoint], t: StrategyType) -> usize {
    points.iter().filter(|p| p.strategy_type == t).count()
}

fn detail_f64(p: &StrategyPoint, key: &str) -> Option<f64> {
    p.details.get(key).and_then(Value::as_f64)
}

/// Aggregate scores over already filtered points.
///
/// * efficiency: mean maneuver quality, scaled down when the tack rate
///   exceeds `max_tacks_per_hour`
/// * shift response: share of wind shifts answered by a tack or jibe
///   within `shift_response_window`
/// * layline accuracy: mean closeness of layline maneuvers to the layline
///
/// Each is neutral (0.5) when there is nothing to score.
pub fn compute_metrics(
    points: &[StrategyPoint],
    track_duration: f64,
    config: &AnalysisConfig,
) -> StrategyMetrics {
    let tack_count = count(points, StrategyType::Tack);
    let jibe_count = count(points, StrategyType::Jibe);
    let wind_shift_count = count(points, StrategyType::WindShift);
    let layline_count = count(points, StrategyType::Layline);
    let mark_rounding_count = count(points, StrategyType::MarkRounding);

    let maneuvers: Vec<&StrategyPoint> = points
        .iter()
        .filter(|p| matches!(p.strategy_type, StrategyType::Tack | StrategyType::Jibe))
        .collect();

    let maneuver_efficiency = if maneuvers.is_empty() {
        NEUTRAL_SCORE
    } else {
        let mean_quality = maneuvers
            .iter()
            .map(|p| detail_f64(p, "quality").unwrap_or(p.confidence))
            .sum::<f64>()
            / maneuvers.len() as f64;
        let hours = track_duration / 3600.0;
        let penalty = if hours > 0.0 {
            let rate = tack_count as f64 / hours;
            if rate > config.max_tacks_per_hour {
                config.max_tacks_per_hour / rate
            } else {
                1.0
            }
        } else {
            1.0
        };
        (mean_quality * penalty).clamp(0.0, 1.0)
    };

    let wind_shift_response = if wind_shift_count == 0 {
        NEUTRAL_SCORE
    } else {
        let answered = points
            .iter()
            .filter(|p| p.strategy_type == StrategyType::WindShift)
            .filter(|shift| {
                maneuvers.iter().any(|m| {
                    m.timestamp > shift.timestamp
                        && m.timestamp <= shift.timestamp + config.shift_response_window
                })
            })
            .count();
        answered as f64 / wind_shift_count as f64
    };

    let layline_accuracy = if layline_count == 0 {
        NEUTRAL_SCORE
    } else {
        points
            .iter()
            .filter(|p| p.strategy_type == StrategyType::Layline)
            .map(|p| detail_f64(p, "accuracy").unwrap_or(p.confidence))
            .sum::<f64>()
            / layline_count as f64
    };

    let overall_score =
        (0.4 * maneuver_efficiency + 0.3 * wind_shift_response + 0.3 * layline_accuracy)
            .clamp(0.0, 1.0);

    StrategyMetrics {
        overall_score,
        maneuver_efficiency,
        wind_shift_response,
        layline_accuracy,
        tack_count,
        jibe_count,
        wind_shift_count,
        layline_count,
        mark_rounding_count,
        duration: track_duration,
    }
}

/// Fixed rule table over the metric counts.
pub fn recommendations(metrics: &StrategyMetrics) -> Vec<String> {
    let mut out = Vec::new();

    if metrics.tack_count > HIGH_MANEUVER_COUNT {
        out.push(format!(
            "Tack count is high ({}). Every tack costs distance; hold each tack longer unless the wind shifts.",
            metrics.tack_count
        ));
    } else if metrics.tack_count <= 1 && metrics.wind_shift_count > 0 {
        out.push(format!(
            "The wind shifted {} time(s) but you tacked {} time(s). Consider tacking more to stay on the lifted tack.",
            metrics.wind_shift_count, metrics.tack_count
        ));
    }

    if metrics.jibe_count > HIGH_MANEUVER_COUNT {
        out.push(format!(
            "Jibe count is high ({}). Sail longer downwind legs between jibes.",
            metrics.jibe_count
        ));
    }

    if metrics.layline_count > 0 {
        let pct = (metrics.layline_accuracy * 100.0).round();
        if metrics.layline_accuracy >= GOOD_LAYLINE_ACCURACY {
            out.push(format!(
                "Layline approaches were accurate ({pct}%). Keep judging the layline the same way."
            ));
        } else {
            out.push(format!(
                "Layline approaches were off ({pct}%). Tack closer to the layline to avoid overstanding the mark."
            ));
        }
    }

    if metrics.wind_shift_count > 0 && metrics.wind_shift_response < NEUTRAL_SCORE {
        out.push(format!(
            "Only {:.0}% of wind shifts were answered with a maneuver. Watch the compass for headers.",
            metrics.wind_shift_response * 100.0
        ));
    }

    if out.is_empty() {
        out.push("No strategy issues detected. Keep sailing steady.".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::project;
    use crate::maneuver::ManeuverDetector;
    use crate::synthetic::TrackScenario;

    fn point(confidence: f64) -> StrategyPoint {
        StrategyPoint::new(StrategyType::Tack, 0.0, GeoPoint::new(54.0, 10.0), confidence)
    }

    fn wind(direction: f64, t: f64) -> WindEstimate {
        WindEstimate::direct(direction, 12.0, 0.8, t)
    }

    #[test]
    fn sensitivity_filter_thresholds() {
        let points: Vec<StrategyPoint> = [0.9, 0.7, 0.5, 0.3].iter().map(|&c| point(c)).collect();
        assert_eq!(filter_by_sensitivity(&points, 0.9).len(), 4);
        assert_eq!(filter_by_sensitivity(&points, 0.2).len(), 1);
        assert_eq!(filter_by_sensitivity(&points, 0.0).len(), 0);
        assert_eq!(filter_by_sensitivity(&points, 1.0).len(), 4);
    }

    #[test]
    fn sensitivity_filter_is_monotonic() {
        let points: Vec<StrategyPoint> = (0..=20).map(|i| point(i as f64 / 20.0)).collect();
        let mut previous = 0;
        for step in 0..=10 {
            let kept = filter_by_sensitivity(&points, step as f64 / 10.0).len();
            assert!(kept >= previous, "sensitivity {step}/10 kept {kept} < {previous}");
            previous = kept;
        }
    }

    #[test]
    fn beat_produces_tack_points() {
        let config = AnalysisConfig::default();
        let track = TrackScenario::beat(0.0, 42.0, 4, 90.0).generate();
        let w = wind(0.0, 0.0);
        let maneuvers = ManeuverDetector::new(&config).detect(&track, Some(&w));
        let points = StrategyAnalyzer::new(&config).maneuver_points(&maneuvers, Some(&w));
        assert_eq!(points.len(), 4);
        for p in &points {
            assert_eq!(p.strategy_type, StrategyType::Tack);
            let sailed = detail_f64(p, "sailed_twa").unwrap();
            assert!((sailed - 42.0).abs() < 1.0, "sailed {sailed}");
            // Exactly on the typical angle
            assert!(detail_f64(p, "angle_efficiency").unwrap() > 0.95);
        }
    }

    #[test]
    fn wind_shifts_veer_and_back() {
        let config = AnalysisConfig::default();
        let origin = GeoPoint::new(54.0, 10.0);
        let estimates = vec![
            wind(0.0, 0.0).with_position(origin),
            wind(5.0, 100.0).with_position(origin),
            wind(20.0, 200.0).with_position(origin),
            wind(355.0, 300.0).with_position(origin),
        ];
        let points = StrategyAnalyzer::new(&config).wind_shift_points(&estimates, &[]);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].details["kind"], "veer");
        assert_eq!(points[0].timestamp, 200.0);
        assert_eq!(points[1].details["kind"], "back");
        assert!((detail_f64(&points[1], "shift").unwrap() + 25.0).abs() < 1e-9);
    }

    #[test]
    fn shift_without_position_uses_track() {
        let config = AnalysisConfig::default();
        let track = TrackScenario::beat(0.0, 42.0, 1, 60.0).generate();
        let estimates = vec![wind(0.0, track[0].timestamp), wind(30.0, track[10].timestamp)];
        let points = StrategyAnalyzer::new(&config).wind_shift_points(&estimates, &track);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].latitude, track[10].latitude);
    }

    #[test]
    fn tack_on_layline_to_course_mark() {
        let config = AnalysisConfig::default();
        let w = wind(0.0, 0.0);
        let mark = GeoPoint::new(54.05, 10.0);
        // 500 m down the starboard-side layline from the mark
        let at = project(&mark, 180.0 + 42.0, 500.0);
        let m = Maneuver {
            timestamp: 10.0,
            latitude: at.latitude,
            longitude: at.longitude,
            before_bearing: 318.0,
            after_bearing: 42.0,
            bearing_change: 84.0,
            before_speed: 6.0,
            after_speed: 4.5,
            speed_ratio: 0.75,
            maneuver_type: ManeuverType::Tack,
            maneuver_confidence: 0.9,
            before_state: "upwind_starboard".parse().unwrap(),
            after_state: "upwind_port".parse().unwrap(),
        };
        let course = Course {
            marks: vec![mark],
            ..Course::default()
        };
        let analyzer = StrategyAnalyzer::new(&config);
        let points = analyzer.layline_points(&[], &[m.clone()], &w, Some(&course));
        assert_eq!(points.len(), 1);
        assert!(detail_f64(&points[0], "distance_m").unwrap() < 1.0);
        assert!(points[0].confidence > 0.85);

        let off = project(&at, 90.0, 300.0);
        let far = Maneuver {
            latitude: off.latitude,
            longitude: off.longitude,
            ..m
        };
        assert!(analyzer.layline_points(&[], &[far], &w, Some(&course)).is_empty());
    }

    #[test]
    fn analyzer_rejects_ragged_polar() {
        let mut polar = BoatPolar::for_boat_type("dinghy").unwrap();
        polar.speeds.pop();
        assert!(StrategyAnalyzer::new(&AnalysisConfig::default())
            .with_polar(polar)
            .is_err());
    }

    #[test]
    fn extreme_positions_along_the_wind() {
        let track = TrackScenario::beat(0.0, 42.0, 2, 120.0).generate();
        let last = track[track.len() - 1].position();
        let first = track[0].position();

        let top = extreme_position(&track, 0.0, true).unwrap();
        assert_eq!((top.latitude, top.longitude), (last.latitude, last.longitude));
        let bottom = extreme_position(&track, 0.0, false).unwrap();
        assert_eq!((bottom.latitude, bottom.longitude), (first.latitude, first.longitude));

        // Wind from the south flips both ends
        let top = extreme_position(&track, 180.0, true).unwrap();
        assert_eq!((top.latitude, top.longitude), (first.latitude, first.longitude));
        assert!(extreme_position(&[], 0.0, true).is_none());
    }

    #[test]
    fn last_tack_lies_on_layline_to_top_of_track() {
        let config = AnalysisConfig::default();
        let track = TrackScenario::beat(0.0, 42.0, 2, 120.0).generate();
        let w = wind(0.0, 0.0);
        let maneuvers = ManeuverDetector::new(&config).detect(&track, Some(&w));
        assert_eq!(maneuvers.len(), 2);

        let points = StrategyAnalyzer::new(&config).layline_points(&track, &maneuvers, &w, None);
        assert_eq!(points.len(), 1, "got {points:#?}");
        let p = &points[0];
        assert_eq!(p.strategy_type, StrategyType::Layline);
        assert_eq!(p.details["implicit_mark"], true);
        assert_eq!(p.details["mark_index"], 0);
        assert!((p.timestamp - track[240].timestamp).abs() <= 1.0);
        assert!(detail_f64(p, "distance_m").unwrap() < 10.0);
        let bearing = detail_f64(p, "layline_bearing").unwrap();
        assert!((bearing - 222.0).abs() < 1e-6, "got {bearing}");
    }

    #[test]
    fn course_start_mark_and_finish() {
        let config = AnalysisConfig::default();
        let track = TrackScenario::beat(0.0, 42.0, 2, 120.0).generate();
        let course = Course {
            start: Some(track[0].position()),
            finish: Some(track[track.len() - 1].position()),
            marks: vec![track[track.len() / 2].position()],
        };
        let points = StrategyAnalyzer::new(&config).course_points(&track, &course);
        let types: Vec<StrategyType> = points.iter().map(|p| p.strategy_type).collect();
        assert_eq!(
            types,
            vec![StrategyType::Start, StrategyType::MarkRounding, StrategyType::Finish]
        );
        assert!(points.iter().all(|p| p.confidence > 0.99));
    }

    #[test]
    fn visits_split_on_exit() {
        let track = TrackScenario::beat(0.0, 42.0, 0, 100.0).generate();
        let target = track[0].position();
        let ranges = visits(&track, &target, 50.0);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].0, 0);
        assert!(ranges[0].1 < track.len() - 1);
    }

    #[test]
    fn metrics_are_neutral_without_data() {
        let m = compute_metrics(&[], 3600.0, &AnalysisConfig::default());
        assert_eq!(m.maneuver_efficiency, 0.5);
        assert_eq!(m.wind_shift_response, 0.5);
        assert_eq!(m.layline_accuracy, 0.5);
        assert!((m.overall_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn excessive_tacking_is_penalized() {
        let config = AnalysisConfig::default();
        let tacks: Vec<StrategyPoint> = (0..24)
            .map(|i| {
                let mut p = point(0.9).detail("quality", json!(1.0));
                p.timestamp = i as f64 * 150.0;
                p
            })
            .collect();
        let relaxed = compute_metrics(&tacks, 7200.0, &config);
        let busy = compute_metrics(&tacks, 3600.0, &config);
        assert!((relaxed.maneuver_efficiency - 1.0).abs() < 1e-12);
        assert!((busy.maneuver_efficiency - 0.5).abs() < 1e-12);
        assert_eq!(busy.tack_count, 24);
    }

    #[test]
    fn shift_response_counts_answered_shifts() {
        let config = AnalysisConfig::default();
        let origin = GeoPoint::new(54.0, 10.0);
        let shifts = [0.0, 1000.0].map(|t| StrategyPoint::new(StrategyType::WindShift, t, origin, 0.8));
        let mut tack = point(0.9);
        tack.timestamp = 60.0;
        let mut points = shifts.to_vec();
        points.push(tack);
        let m = compute_metrics(&points, 2000.0, &config);
        assert!((m.wind_shift_response - 0.5).abs() < 1e-12);
    }

    fn metrics_with(tacks: usize, jibes: usize, shifts: usize, laylines: usize) -> StrategyMetrics {
        StrategyMetrics {
            overall_score: 0.5,
            maneuver_efficiency: 0.5,
            wind_shift_response: 0.5,
            layline_accuracy: 0.8,
            tack_count: tacks,
            jibe_count: jibes,
            wind_shift_count: shifts,
            layline_count: laylines,
            mark_rounding_count: 0,
            duration: 3600.0,
        }
    }

    #[test]
    fn recommendation_rules() {
        let high = recommendations(&metrics_with(8, 0, 0, 0));
        assert_eq!(high.len(), 1);
        assert!(high[0].starts_with("Tack count is high"));

        let few = recommendations(&metrics_with(1, 0, 3, 0));
        assert!(few[0].contains("Consider tacking more"));

        let layline = recommendations(&metrics_with(3, 0, 0, 2));
        assert!(layline[0].contains("Layline approaches were accurate"));

        let jibes = recommendations(&metrics_with(2, 7, 0, 0));
        assert!(jibes[0].starts_with("Jibe count is high"));

        let steady = recommendations(&metrics_with(3, 2, 0, 0));
        assert_eq!(steady, vec!["No strategy issues detected. Keep sailing steady.".to_string()]);

        assert_eq!(
            recommendations(&metrics_with(8, 0, 2, 1)),
            recommendations(&metrics_with(8, 0, 2, 1))
        );
    }

    #[test]
    fn report_assigns_ids_in_time_order() {
        let config = AnalysisConfig::default();
        let track = TrackScenario::beat(0.0, 42.0, 3, 90.0).generate();
        let w = wind(0.0, 0.0);
        let maneuvers = ManeuverDetector::new(&config).detect(&track, Some(&w));
        let report = StrategyAnalyzer::new(&config).report(&track, &maneuvers, &[], Some(&w), None);
        assert!(report.points.windows(2).all(|p| p[0].timestamp <= p[1].timestamp));
        assert!(report.points.iter().any(|p| p.id.starts_with("tack_")));
        assert_eq!(report.metrics.tack_count, 3);
        assert!(!report.recommendations.is_empty());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["points"][0]["strategy_type"], "tack");
    }
}
