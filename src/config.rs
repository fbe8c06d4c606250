//! Analysis configuration.
//!
//! One struct enumerating every recognized option. Deserializes with
//! defaults for missing keys so hosts can pass partial JSON objects.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::sailing::{StateClassifier, TackConvention};

/// Thresholds and switches for the whole pipeline. Angles in degrees,
/// durations in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum smoothed heading change that marks a maneuver candidate.
    pub min_angle_change: f64,
    /// Lower bound of the heading change accepted as a tack.
    pub min_tack_angle: f64,
    /// Lower bound of the heading change accepted as a jibe.
    pub min_jibe_angle: f64,
    /// Upper bound of the heading change accepted as a tack or jibe.
    pub max_maneuver_angle: f64,
    /// Samples averaged on each side of a candidate boundary.
    pub smoothing_window: usize,
    /// Maneuvers closer together than this are merged into the stronger one.
    pub min_maneuver_interval: f64,
    /// Strategy-point filter: keep points with `confidence > 1 - sensitivity`.
    pub detection_sensitivity: f64,
    pub upwind_threshold: f64,
    pub downwind_threshold: f64,
    /// Assumed true wind angle when sailing close-hauled.
    pub typical_close_hauled_angle: f64,
    /// Assumed true wind angle when sailing downwind.
    pub typical_downwind_angle: f64,
    pub tack_convention: TackConvention,
    /// Use the sequential Bayesian estimator instead of the weighted mean.
    pub use_bayesian: bool,
    /// Direction change between consecutive estimates reported as a shift.
    pub wind_shift_threshold: f64,
    /// Distance from a layline within which a maneuver counts as on it.
    pub layline_tolerance_m: f64,
    /// Radius around course marks for start/finish/rounding detection.
    pub mark_radius_m: f64,
    /// Tack rate above which maneuver efficiency is penalized.
    pub max_tacks_per_hour: f64,
    /// A tack this soon after a wind shift counts as a response to it.
    pub shift_response_window: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_angle_change: 30.0,
            min_tack_angle: 60.0,
            min_jibe_angle: 60.0,
            max_maneuver_angle: 150.0,
            smoothing_window: 3,
            min_maneuver_interval: 10.0,
            detection_sensitivity: 0.5,
            upwind_threshold: 45.0,
            downwind_threshold: 135.0,
            typical_close_hauled_angle: 42.0,
            typical_downwind_angle: 150.0,
            tack_convention: TackConvention::A,
            use_bayesian: false,
            wind_shift_threshold: 10.0,
            layline_tolerance_m: 50.0,
            mark_radius_m: 100.0,
            max_tacks_per_hour: 12.0,
            shift_response_window: 180.0,
        }
    }
}

fn open_range(field: &'static str, value: f64, lo: f64, hi: f64) -> Result<()> {
    if value.is_finite() && value > lo && value < hi {
        Ok(())
    } else {
        Err(AnalysisError::config(
            field,
            format!("{value} not in ({lo}, {hi})"),
        ))
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::config(field, format!("{value} must be > 0")))
    }
}

impl AnalysisConfig {
    /// Parse a (possibly partial) JSON object and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every option against its valid range.
    pub fn validate(&self) -> Result<()> {
        open_range("min_angle_change", self.min_angle_change, 0.0, 180.0)?;
        open_range("min_tack_angle", self.min_tack_angle, 0.0, 180.0)?;
        open_range("min_jibe_angle", self.min_jibe_angle, 0.0, 180.0)?;
        if !(self.max_maneuver_angle > 0.0 && self.max_maneuver_angle <= 180.0) {
            return Err(AnalysisError::config(
                "max_maneuver_angle",
                format!("{} not in (0, 180]", self.max_maneuver_angle),
            ));
        }
        if self.min_tack_angle > self.max_maneuver_angle {
            return Err(AnalysisError::config(
                "min_tack_angle",
                "must not exceed max_maneuver_angle",
            ));
        }
        if self.min_jibe_angle > self.max_maneuver_angle {
            return Err(AnalysisError::config(
                "min_jibe_angle",
                "must not exceed max_maneuver_angle",
            ));
        }
        if self.smoothing_window == 0 {
            return Err(AnalysisError::config("smoothing_window", "must be >= 1"));
        }
        if !(self.min_maneuver_interval.is_finite() && self.min_maneuver_interval >= 0.0) {
            return Err(AnalysisError::config(
                "min_maneuver_interval",
                format!("{} must be >= 0", self.min_maneuver_interval),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection_sensitivity) {
            return Err(AnalysisError::config(
                "detection_sensitivity",
                format!("{} not in [0, 1]", self.detection_sensitivity),
            ));
        }
        if !(self.upwind_threshold > 0.0 && self.upwind_threshold <= 90.0) {
            return Err(AnalysisError::config(
                "upwind_threshold",
                format!("{} not in (0, 90]", self.upwind_threshold),
            ));
        }
        if !(self.downwind_threshold >= 90.0 && self.downwind_threshold < 180.0) {
            return Err(AnalysisError::config(
                "downwind_threshold",
                format!("{} not in [90, 180)", self.downwind_threshold),
            ));
        }
        if self.downwind_threshold <= self.upwind_threshold {
            return Err(AnalysisError::config(
                "downwind_threshold",
                "must be greater than upwind_threshold",
            ));
        }
        open_range("typical_close_hauled_angle", self.typical_close_hauled_angle, 0.0, 90.0)?;
        open_range("typical_downwind_angle", self.typical_downwind_angle, 90.0, 180.0)?;
        open_range("wind_shift_threshold", self.wind_shift_threshold, 0.0, 180.0)?;
        positive("layline_tolerance_m", self.layline_tolerance_m)?;
        positive("mark_radius_m", self.mark_radius_m)?;
        positive("max_tacks_per_hour", self.max_tacks_per_hour)?;
        positive("shift_response_window", self.shift_response_window)?;
        Ok(())
    }

    pub(crate) fn state_classifier(&self) -> StateClassifier {
        StateClassifier {
            upwind_threshold: self.upwind_threshold,
            downwind_threshold: self.downwind_threshold,
            convention: self.tack_convention,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AnalysisConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            AnalysisConfig::from_json(r#"{"detection_sensitivity": 0.8, "tack_convention": "B"}"#)
                .unwrap();
        assert_eq!(config.detection_sensitivity, 0.8);
        assert_eq!(config.tack_convention, TackConvention::B);
        assert_eq!(config.min_angle_change, 30.0);
        assert_eq!(config.smoothing_window, 3);
    }

    #[test]
    fn rejects_out_of_range_sensitivity() {
        let config = AnalysisConfig {
            detection_sensitivity: 1.5,
            ..AnalysisConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidConfig {
                field: "detection_sensitivity",
                ..
            }
        ));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let config = AnalysisConfig {
            upwind_threshold: 90.0,
            downwind_threshold: 90.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_tack_range_above_max() {
        let config = AnalysisConfig {
            min_tack_angle: 160.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nan() {
        let config = AnalysisConfig {
            typical_close_hauled_angle: f64::NAN,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(matches!(
            AnalysisConfig::from_json("not json"),
            Err(AnalysisError::Json(_))
        ));
    }
}
