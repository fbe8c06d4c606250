//! Sailing-state classification relative to the wind.
//!
//! A course is placed against the current wind estimate: the signed
//! relative angle picks the tack side, its magnitude the point of sail.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::angle_difference;

/// Side of the boat the wind comes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tack {
    Port,
    Starboard,
}

impl Tack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tack::Port => "port",
            Tack::Starboard => "starboard",
        }
    }
}

/// Upwind / reaching / downwind classification of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointOfSail {
    Upwind,
    Reaching,
    Downwind,
}

impl PointOfSail {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointOfSail::Upwind => "upwind",
            PointOfSail::Reaching => "reaching",
            PointOfSail::Downwind => "downwind",
        }
    }
}

/// Which sign of the relative angle maps to which tack.
///
/// Historical data disagrees on the mapping. Only tack alternation matters
/// for maneuver classification, so both conventions classify the same
/// maneuvers; they differ in the tack names reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TackConvention {
    /// `relative_angle >= 0` is port tack.
    #[default]
    A,
    /// `relative_angle >= 0` is starboard tack.
    B,
}

impl TackConvention {
    pub fn tack_for(&self, relative_angle: f64) -> Tack {
        let positive = relative_angle >= 0.0;
        match (self, positive) {
            (TackConvention::A, true) | (TackConvention::B, false) => Tack::Port,
            (TackConvention::A, false) | (TackConvention::B, true) => Tack::Starboard,
        }
    }
}

/// Tack side plus point of sail, serialized as e.g. `upwind_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SailingState {
    pub point_of_sail: PointOfSail,
    pub tack: Tack,
}

impl fmt::Display for SailingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.point_of_sail.as_str(), self.tack.as_str())
    }
}

impl Serialize for SailingState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SailingState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for SailingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pos, tack) = s
            .split_once('_')
            .ok_or_else(|| format!("invalid sailing state '{s}'"))?;
        let point_of_sail = match pos {
            "upwind" => PointOfSail::Upwind,
            "reaching" => PointOfSail::Reaching,
            "downwind" => PointOfSail::Downwind,
            _ => return Err(format!("invalid point of sail '{pos}'")),
        };
        let tack = match tack {
            "port" => Tack::Port,
            "starboard" => Tack::Starboard,
            _ => return Err(format!("invalid tack '{tack}'")),
        };
        Ok(SailingState {
            point_of_sail,
            tack,
        })
    }
}

/// Thresholds and convention used to classify a course.
#[derive(Debug, Clone, Copy)]
pub struct StateClassifier {
    pub upwind_threshold: f64,
    pub downwind_threshold: f64,
    pub convention: TackConvention,
}

impl StateClassifier {
    /// Sailing state of `course` under wind blowing from `wind_direction`.
    pub fn classify(&self, course: f64, wind_direction: f64) -> SailingState {
        let relative = angle_difference(course, wind_direction);
        let abs = relative.abs();

        let point_of_sail = if abs <= self.upwind_threshold {
            PointOfSail::Upwind
        } else if abs >= self.downwind_threshold {
            PointOfSail::Downwind
        } else {
            PointOfSail::Reaching
        };

        SailingState {
            point_of_sail,
            tack: self.convention.tack_for(relative),
        }
    }
}

/// True wind angle of `course` in [0, 180].
pub fn true_wind_angle(course: f64, wind_direction: f64) -> f64 {
    angle_difference(course, wind_direction).abs()
}
