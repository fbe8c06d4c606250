//! Sailing track analysis core.
//!
//! Takes time-stamped GPS samples of a sailing boat and derives maneuvers
//! (tacks, jibes, course changes), true wind estimates from maneuver
//! geometry, interpolated wind fields, and scored strategy points with
//! recommendations. Platform-agnostic; the Android host talks to it through
//! the JSON bridge in [`android_jni`].

pub mod analysis;
pub mod android_jni;
pub mod config;
pub mod error;
pub mod field;
pub mod geo;
pub mod maneuver;
pub mod polar;
pub mod sailing;
pub mod strategy;
pub mod synthetic;
pub mod track;
pub mod triangulation;
pub mod wind;

pub use analysis::{analyze_track, refine_wind, TrackAnalysis};
pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use field::{interpolate_wind_field, WindField};
pub use geo::{Bounds, GeoPoint};
pub use maneuver::{Maneuver, ManeuverDetector, ManeuverType};
pub use polar::BoatPolar;
pub use sailing::{PointOfSail, SailingState, Tack, TackConvention};
pub use strategy::{Course, StrategyAnalyzer, StrategyPoint, StrategyReport, StrategyType};
pub use track::TrackPoint;
pub use wind::{WindEstimate, WindEstimator, WindSource};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
