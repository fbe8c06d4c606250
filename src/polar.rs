//! Boat speed polars and optimal VMG.
//!
//! A polar tabulates boat speed over true wind angle (rows) and true wind
//! speed (columns). Lookups interpolate bilinearly; below the first table
//! angle the speed falls linearly to zero at head-to-wind, so the
//! zero-progress solution at TWA 0 never wins a VMG search.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::geo::angle_difference;

/// Coarse VMG search step, degrees.
const COARSE_STEP: f64 = 1.0;
/// Refinement step around the coarse optimum, degrees.
const FINE_STEP: f64 = 0.01;
/// Bisection iterations when inverting the polar for wind speed.
const INVERSION_ITERATIONS: usize = 60;

/// Boat speed table for one boat type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoatPolar {
    pub boat_type: String,
    /// True wind angles, degrees, strictly increasing within (0, 180].
    pub twa: Vec<f64>,
    /// True wind speeds, knots, strictly increasing and positive.
    pub wind_speeds: Vec<f64>,
    /// `speeds[i][j]`: boat speed in knots at `twa[i]`, `wind_speeds[j]`.
    pub speeds: Vec<Vec<f64>>,
}

/// Best true wind angle for a point of sail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimalVmg {
    pub twa: f64,
    /// Velocity made good toward (upwind) or away from (downwind) the wind.
    pub vmg: f64,
    pub boat_speed: f64,
}

fn strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[1] > w[0])
}

/// Bracketing indices and fraction for `x` on a sorted axis, clamped.
fn bracket(axis: &[f64], x: f64) -> (usize, usize, f64) {
    let last = axis.len() - 1;
    if x <= axis[0] {
        return (0, 0, 0.0);
    }
    if x >= axis[last] {
        return (last, last, 0.0);
    }
    let hi = axis.partition_point(|&a| a <= x);
    let lo = hi - 1;
    let t = (x - axis[lo]) / (axis[hi] - axis[lo]);
    (lo, hi, t)
}

const KEELBOAT_TWA: [f64; 12] = [
    32.0, 40.0, 52.0, 60.0, 75.0, 90.0, 110.0, 120.0, 135.0, 150.0, 165.0, 180.0,
];
const KEELBOAT_TWS: [f64; 7] = [6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 20.0];
const KEELBOAT_SPEEDS: [[f64; 7]; 12] = [
    [3.8, 4.7, 5.3, 5.6, 5.8, 5.9, 6.0],
    [4.5, 5.4, 5.9, 6.2, 6.4, 6.5, 6.6],
    [5.1, 6.0, 6.5, 6.8, 7.0, 7.1, 7.3],
    [5.3, 6.2, 6.7, 7.0, 7.2, 7.4, 7.6],
    [5.5, 6.4, 6.9, 7.2, 7.5, 7.7, 8.0],
    [5.5, 6.4, 7.0, 7.4, 7.7, 8.0, 8.5],
    [5.4, 6.4, 7.0, 7.6, 8.1, 8.6, 9.5],
    [5.2, 6.2, 6.9, 7.5, 8.2, 8.9, 10.2],
    [4.8, 5.8, 6.6, 7.3, 8.1, 9.0, 10.8],
    [4.1, 5.2, 6.1, 6.9, 7.7, 8.6, 10.5],
    [3.6, 4.6, 5.5, 6.3, 7.0, 7.8, 9.4],
    [3.3, 4.3, 5.1, 5.9, 6.6, 7.3, 8.6],
];

const DINGHY_TWA: [f64; 7] = [35.0, 45.0, 60.0, 90.0, 120.0, 150.0, 180.0];
const DINGHY_TWS: [f64; 4] = [5.0, 10.0, 15.0, 20.0];
const DINGHY_SPEEDS: [[f64; 4]; 7] = [
    [2.8, 4.2, 4.8, 5.0],
    [3.3, 4.8, 5.4, 5.6],
    [3.6, 5.3, 6.1, 6.5],
    [3.8, 5.8, 7.2, 8.0],
    [3.5, 5.9, 7.8, 9.2],
    [2.9, 5.0, 7.0, 8.6],
    [2.5, 4.3, 6.0, 7.4],
];

impl BoatPolar {
    /// Build and validate a polar table.
    pub fn new(
        boat_type: impl Into<String>,
        twa: Vec<f64>,
        wind_speeds: Vec<f64>,
        speeds: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let polar = Self {
            boat_type: boat_type.into(),
            twa,
            wind_speeds,
            speeds,
        };
        polar.validate()?;
        Ok(polar)
    }

    /// Parse a polar table from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let polar: BoatPolar = serde_json::from_str(json)?;
        polar.validate()?;
        Ok(polar)
    }

    /// Built-in polar for a named boat type (`keelboat`, `dinghy`).
    pub fn for_boat_type(boat_type: &str) -> Result<Self> {
        match boat_type.to_ascii_lowercase().as_str() {
            "keelboat" => Self::new(
                "keelboat",
                KEELBOAT_TWA.to_vec(),
                KEELBOAT_TWS.to_vec(),
                KEELBOAT_SPEEDS.iter().map(|r| r.to_vec()).collect(),
            ),
            "dinghy" => Self::new(
                "dinghy",
                DINGHY_TWA.to_vec(),
                DINGHY_TWS.to_vec(),
                DINGHY_SPEEDS.iter().map(|r| r.to_vec()).collect(),
            ),
            _ => Err(AnalysisError::UnknownBoatType(boat_type.to_string())),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let malformed = |msg: String| Err(AnalysisError::MalformedPolar(msg));

        if self.twa.is_empty() || self.wind_speeds.is_empty() {
            return malformed("angle and wind speed axes must not be empty".into());
        }
        if !strictly_increasing(&self.twa) || !strictly_increasing(&self.wind_speeds) {
            return malformed("axes must be strictly increasing".into());
        }
        if !self.twa.iter().all(|a| a.is_finite() && *a > 0.0 && *a <= 180.0) {
            return malformed("angles must lie in (0, 180]".into());
        }
        if !self.wind_speeds.iter().all(|w| w.is_finite() && *w > 0.0) {
            return malformed("wind speeds must be positive".into());
        }
        if self.speeds.len() != self.twa.len() {
            return malformed(format!(
                "expected {} rows, got {}",
                self.twa.len(),
                self.speeds.len()
            ));
        }
        for (i, row) in self.speeds.iter().enumerate() {
            if row.len() != self.wind_speeds.len() {
                return malformed(format!(
                    "row {i} has {} values, expected {}",
                    row.len(),
                    self.wind_speeds.len()
                ));
            }
            if !row.iter().all(|s| s.is_finite() && *s >= 0.0) {
                return malformed(format!("row {i} has negative or non-finite speeds"));
            }
        }
        Ok(())
    }

    /// Boat speed in knots at true wind angle `twa` (any sign or wrap) and
    /// wind speed `wind_speed` knots. Assumes a validated table; empty axes
    /// give zero.
    pub fn speed(&self, twa: f64, wind_speed: f64) -> f64 {
        let angle = angle_difference(twa, 0.0).abs();
        let wind_speed = wind_speed.max(0.0);

        let Some(&first_twa) = self.twa.first() else {
            return 0.0;
        };
        if angle < first_twa {
            // No-go zone: fade to zero at head-to-wind
            return self.table_speed(first_twa, wind_speed) * angle / first_twa;
        }
        self.table_speed(angle, wind_speed)
    }

    fn table_speed(&self, angle: f64, wind_speed: f64) -> f64 {
        let Some(&first_tws) = self.wind_speeds.first() else {
            return 0.0;
        };
        if wind_speed < first_tws {
            return self.bilinear(angle, first_tws) * wind_speed / first_tws;
        }
        self.bilinear(angle, wind_speed)
    }

    fn bilinear(&self, angle: f64, wind_speed: f64) -> f64 {
        let (i0, i1, ta) = bracket(&self.twa, angle);
        let (j0, j1, tw) = bracket(&self.wind_speeds, wind_speed);
        let s00 = self.speeds[i0][j0];
        let s01 = self.speeds[i0][j1];
        let s10 = self.speeds[i1][j0];
        let s11 = self.speeds[i1][j1];
        let low = s00 + (s01 - s00) * tw;
        let high = s10 + (s11 - s10) * tw;
        low + (high - low) * ta
    }

    /// Velocity made good at `twa` for the given point of sail.
    pub fn vmg(&self, twa: f64, wind_speed: f64, is_upwind: bool) -> f64 {
        let speed = self.speed(twa, wind_speed);
        let rad = twa.to_radians();
        if is_upwind {
            speed * rad.cos()
        } else {
            speed * (180.0 - twa).to_radians().cos().abs()
        }
    }

    /// Best true wind angle: searched over (0, 90] upwind and [90, 180)
    /// downwind, coarse 1 degree steps refined to 0.01 degrees.
    pub fn find_optimal_twa(&self, wind_speed: f64, is_upwind: bool) -> OptimalVmg {
        let (lo, hi) = if is_upwind {
            (COARSE_STEP, 90.0)
        } else {
            (90.0, 180.0 - COARSE_STEP)
        };

        let best_on = |from: f64, to: f64, step: f64| -> (f64, f64) {
            let steps = ((to - from) / step).round() as usize;
            (0..=steps)
                .map(|k| (from + k as f64 * step).min(to))
                .map(|a| (a, self.vmg(a, wind_speed, is_upwind)))
                .fold((from, f64::NEG_INFINITY), |best, cand| {
                    if cand.1 > best.1 {
                        cand
                    } else {
                        best
                    }
                })
        };

        let (coarse, _) = best_on(lo, hi, COARSE_STEP);
        let fine_lo = (coarse - COARSE_STEP).max(lo);
        let fine_hi = (coarse + COARSE_STEP).min(hi);
        let (twa, vmg) = best_on(fine_lo, fine_hi, FINE_STEP);

        OptimalVmg {
            twa,
            vmg,
            boat_speed: self.speed(twa, wind_speed),
        }
    }

    /// Wind speed at which the polar predicts `boat_speed` at `twa`.
    ///
    /// None when the boat speed is not positive or lies above what the
    /// table reaches at its highest wind speed.
    pub fn wind_speed_for(&self, twa: f64, boat_speed: f64) -> Option<f64> {
        if !(boat_speed > 0.0) {
            return None;
        }
        let max_ws = *self.wind_speeds.last()?;
        if self.speed(twa, max_ws) < boat_speed {
            return None;
        }
        let (mut lo, mut hi) = (0.0, max_ws);
        for _ in 0..INVERSION_ITERATIONS {
            let mid = (lo + hi) / 2.0;
            if self.speed(twa, mid) < boat_speed {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Some((lo + hi) / 2.0)
    }
}

/// Fraction in [0, 1] describing how close a sailed TWA is to the optimum;
/// zero at `tolerance` degrees off or more.
pub fn angle_efficiency(sailed_twa: f64, optimal_twa: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 {
        return 0.0;
    }
    (1.0 - (sailed_twa - optimal_twa).abs() / tolerance).clamp(0.0, 1.0)
}
