//! Gridded wind fields from point estimates.
//!
//! Directions are split into `(sin, cos)` components before interpolation
//! so the 0/360 wrap never distorts the result. The four channels
//! `(sin, cos, speed, confidence)` are interpolated independently with a
//! Delaunay-based linear scheme and the direction is re-derived per cell.
//! Cells the triangulation cannot serve (degenerate sample sets, cells
//! outside the sample hull) take their values from the nearest sample; the
//! field then reports `is_validated = false` and counts the fallback cells.
//!
//! Fields are immutable snapshots. Resampling and fusion build new fields.

use log::{debug, warn};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::geo::{angle_from_components, normalize_angle, to_local_xy, Bounds, GeoPoint};
use crate::triangulation::Triangulation;
use crate::wind::WindEstimate;

/// Samples closer than this (meters) are merged before triangulation.
const MERGE_DISTANCE_M: f64 = 1e-3;

/// How a field was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    Interpolation,
    Model,
    Combined,
}

/// Wind at one grid node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindCell {
    pub direction: f64,
    pub speed: f64,
    pub confidence: f64,
}

/// A positioned wind sample, the input of interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindSample {
    pub latitude: f64,
    pub longitude: f64,
    pub direction: f64,
    pub speed: f64,
    pub confidence: f64,
}

/// How the grid values were obtained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// Distinct sample positions used.
    pub sample_count: usize,
    /// A triangulation was built.
    pub triangulated: bool,
    /// The triangulation needed a joggle to succeed.
    pub joggled: bool,
    /// Cells filled from the nearest sample.
    pub fallback_cells: usize,
    /// Why triangulation was not possible, if it wasn't.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degenerate_reason: Option<String>,
    /// Number of fields blended into this one (0 for direct interpolation).
    pub fused_fields: usize,
}

/// Gridded wind snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindField {
    pub timestamp: f64,
    pub bounds: Bounds,
    /// Grid nodes per axis.
    pub resolution: usize,
    /// `cell_values[row][col]`: row runs south to north, col west to east.
    pub cell_values: Vec<Vec<WindCell>>,
    pub generation_method: GenerationMethod,
    pub is_validated: bool,
    pub metadata: FieldMetadata,
    /// Samples the field was interpolated from; empty for fused fields.
    #[serde(default)]
    pub samples: Vec<WindSample>,
}

/// Sample channels in local planar coordinates.
struct Channels {
    xy: Vec<[f64; 2]>,
    sin: Vec<f64>,
    cos: Vec<f64>,
    speed: Vec<f64>,
    confidence: Vec<f64>,
}

impl Channels {
    fn len(&self) -> usize {
        self.xy.len()
    }

    fn from_vectors(samples: &[(GeoPoint, f64, f64, f64, f64)], origin: &GeoPoint) -> Self {
        let mut ch = Channels {
            xy: Vec::with_capacity(samples.len()),
            sin: Vec::with_capacity(samples.len()),
            cos: Vec::with_capacity(samples.len()),
            speed: Vec::with_capacity(samples.len()),
            confidence: Vec::with_capacity(samples.len()),
        };
        let mut counts: Vec<f64> = Vec::new();

        for &(pos, sin, cos, speed, confidence) in samples {
            let (x, y) = to_local_xy(&pos, origin);
            let existing = ch
                .xy
                .iter()
                .position(|p| (p[0] - x).hypot(p[1] - y) < MERGE_DISTANCE_M);
            match existing {
                Some(i) => {
                    // Running mean of coincident samples
                    counts[i] += 1.0;
                    let k = counts[i];
                    ch.sin[i] += (sin - ch.sin[i]) / k;
                    ch.cos[i] += (cos - ch.cos[i]) / k;
                    ch.speed[i] += (speed - ch.speed[i]) / k;
                    ch.confidence[i] += (confidence - ch.confidence[i]) / k;
                }
                None => {
                    ch.xy.push([x, y]);
                    ch.sin.push(sin);
                    ch.cos.push(cos);
                    ch.speed.push(speed);
                    ch.confidence.push(confidence);
                    counts.push(1.0);
                }
            }
        }
        ch
    }
}

/// Sample index wrapper for nearest-neighbor queries.
#[derive(Debug, Clone, Copy)]
struct IndexedSample {
    idx: usize,
    x: f64,
    y: f64,
}

impl RTreeObject for IndexedSample {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for IndexedSample {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

/// Grid node positions for `bounds` at `resolution` nodes per axis.
fn grid_axis(min: f64, max: f64, resolution: usize) -> Vec<f64> {
    if resolution == 1 {
        return vec![(min + max) / 2.0];
    }
    (0..resolution)
        .map(|i| min + (max - min) * i as f64 / (resolution - 1) as f64)
        .collect()
}

fn check_grid(bounds: &Bounds, resolution: usize) -> Result<()> {
    if resolution == 0 {
        return Err(AnalysisError::config("resolution", "must be >= 1"));
    }
    if !bounds.is_valid() {
        return Err(AnalysisError::config(
            "bounds",
            format!("{bounds:?} is not a valid bounding box"),
        ));
    }
    Ok(())
}

/// Interpolate a wind field over `bounds` from point estimates.
///
/// Estimates without a position are placed at the center of `bounds`.
/// Returns `Ok(None)` when no estimates are given; errors only for an
/// invalid grid specification.
pub fn interpolate_wind_field(
    estimates: &[WindEstimate],
    bounds: Bounds,
    resolution: usize,
) -> Result<Option<WindField>> {
    check_grid(&bounds, resolution)?;
    if estimates.is_empty() {
        return Ok(None);
    }
    let center = bounds.center();
    let samples: Vec<WindSample> = estimates
        .iter()
        .map(|e| {
            let pos = e.position().unwrap_or(center);
            WindSample {
                latitude: pos.latitude,
                longitude: pos.longitude,
                direction: normalize_angle(e.direction),
                speed: e.speed.max(0.0),
                confidence: e.confidence.clamp(0.0, 1.0),
            }
        })
        .collect();
    let timestamp = estimates
        .iter()
        .map(|e| e.timestamp)
        .fold(f64::NEG_INFINITY, f64::max);

    Ok(Some(interpolate_samples(samples, bounds, resolution, timestamp)))
}

/// Core interpolation over positioned samples.
pub fn interpolate_samples(
    samples: Vec<WindSample>,
    bounds: Bounds,
    resolution: usize,
    timestamp: f64,
) -> WindField {
    let vectors: Vec<(GeoPoint, f64, f64, f64, f64)> = samples
        .iter()
        .map(|s| {
            let r = s.direction.to_radians();
            (
                GeoPoint::new(s.latitude, s.longitude),
                r.sin(),
                r.cos(),
                s.speed,
                s.confidence,
            )
        })
        .collect();

    let (cells, metadata) = grid_from_vectors(&vectors, &bounds, resolution);
    let is_validated = metadata.triangulated && metadata.fallback_cells == 0;
    WindField {
        timestamp,
        bounds,
        resolution,
        cell_values: cells,
        generation_method: GenerationMethod::Interpolation,
        is_validated,
        metadata,
        samples,
    }
}

/// Evaluate the four channels on the grid.
fn grid_from_vectors(
    vectors: &[(GeoPoint, f64, f64, f64, f64)],
    bounds: &Bounds,
    resolution: usize,
) -> (Vec<Vec<WindCell>>, FieldMetadata) {
    let origin = bounds.center();
    let ch = Channels::from_vectors(vectors, &origin);

    let mut metadata = FieldMetadata {
        sample_count: ch.len(),
        ..FieldMetadata::default()
    };

    let triangulation = if ch.len() < 3 {
        metadata.degenerate_reason = Some(format!("{} distinct sample positions", ch.len()));
        None
    } else {
        let t = Triangulation::new(&ch.xy);
        if t.is_none() {
            metadata.degenerate_reason = Some("sample positions are collinear".to_string());
        }
        t
    };
    if let Some(t) = &triangulation {
        metadata.triangulated = true;
        metadata.joggled = t.was_joggled();
    }

    let tree = RTree::bulk_load(
        ch.xy
            .iter()
            .enumerate()
            .map(|(idx, p)| IndexedSample {
                idx,
                x: p[0],
                y: p[1],
            })
            .collect(),
    );

    let lats = grid_axis(bounds.min_lat, bounds.max_lat, resolution);
    let lons = grid_axis(bounds.min_lon, bounds.max_lon, resolution);

    let eval_row = |lat: &f64| -> (Vec<WindCell>, usize) {
        let mut fallbacks = 0;
        let row = lons
            .iter()
            .map(|&lon| {
                let (x, y) = to_local_xy(&GeoPoint::new(*lat, lon), &origin);
                let located = triangulation.as_ref().and_then(|t| t.locate([x, y]));
                let (sin, cos, speed, confidence) = match located {
                    Some((v, w)) => {
                        let mix = |values: &[f64]| {
                            w[0] * values[v[0]] + w[1] * values[v[1]] + w[2] * values[v[2]]
                        };
                        (
                            mix(&ch.sin[..]),
                            mix(&ch.cos[..]),
                            mix(&ch.speed[..]),
                            mix(&ch.confidence[..]),
                        )
                    }
                    None => {
                        fallbacks += 1;
                        let i = tree.nearest_neighbor(&[x, y]).map_or(0, |s| s.idx);
                        (ch.sin[i], ch.cos[i], ch.speed[i], ch.confidence[i])
                    }
                };
                WindCell {
                    direction: angle_from_components(sin, cos),
                    speed: speed.max(0.0),
                    confidence: confidence.clamp(0.0, 1.0),
                }
            })
            .collect();
        (row, fallbacks)
    };

    #[cfg(feature = "parallel")]
    let rows: Vec<(Vec<WindCell>, usize)> = {
        use rayon::prelude::*;
        lats.par_iter().map(eval_row).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<(Vec<WindCell>, usize)> = lats.iter().map(eval_row).collect();

    metadata.fallback_cells = rows.iter().map(|(_, f)| f).sum();
    if metadata.fallback_cells > 0 {
        warn!(
            "Wind field: {} of {} cells filled by nearest sample ({})",
            metadata.fallback_cells,
            resolution * resolution,
            metadata
                .degenerate_reason
                .as_deref()
                .unwrap_or("outside sample hull")
        );
    }
    let cells = rows.into_iter().map(|(r, _)| r).collect();
    (cells, metadata)
}

impl WindField {
    fn latitudes(&self) -> Vec<f64> {
        grid_axis(self.bounds.min_lat, self.bounds.max_lat, self.resolution)
    }

    fn longitudes(&self) -> Vec<f64> {
        grid_axis(self.bounds.min_lon, self.bounds.max_lon, self.resolution)
    }

    /// Latitude of grid row `row`, None past the last row.
    pub fn row_latitude(&self, row: usize) -> Option<f64> {
        self.latitudes().get(row).copied()
    }

    /// Longitude of grid column `col`, None past the last column.
    pub fn col_longitude(&self, col: usize) -> Option<f64> {
        self.longitudes().get(col).copied()
    }

    /// Same field on a grid of `resolution` nodes per axis.
    ///
    /// Interpolated fields are re-evaluated from their samples; fused
    /// fields use their grid nodes as samples. Both paths apply the same
    /// triangulation and fallback rules.
    pub fn resample(&self, resolution: usize) -> Result<WindField> {
        check_grid(&self.bounds, resolution)?;
        if !self.samples.is_empty() {
            let mut field =
                interpolate_samples(self.samples.clone(), self.bounds, resolution, self.timestamp);
            field.generation_method = self.generation_method;
            return Ok(field);
        }

        let longitudes = self.longitudes();
        let mut vectors = Vec::with_capacity(self.resolution * self.resolution);
        for (cells, lat) in self.cell_values.iter().zip(self.latitudes()) {
            for (cell, &lon) in cells.iter().zip(&longitudes) {
                let r = cell.direction.to_radians();
                vectors.push((
                    GeoPoint::new(lat, lon),
                    r.sin(),
                    r.cos(),
                    cell.speed,
                    cell.confidence,
                ));
            }
        }
        let (cells, mut metadata) = grid_from_vectors(&vectors, &self.bounds, resolution);
        metadata.fused_fields = self.metadata.fused_fields;
        Ok(WindField {
            timestamp: self.timestamp,
            bounds: self.bounds,
            resolution,
            cell_values: cells,
            generation_method: self.generation_method,
            is_validated: self.is_validated && metadata.fallback_cells == 0,
            metadata,
            samples: Vec::new(),
        })
    }

    /// Wind at an arbitrary position inside the bounds (bilinear over the
    /// grid, direction via components). None outside the bounds.
    pub fn value_at(&self, p: &GeoPoint) -> Option<WindCell> {
        if !self.bounds.contains(p) || self.cell_values.is_empty() {
            return None;
        }
        if self.resolution == 1 {
            return Some(self.cell_values[0][0]);
        }
        let frac = |v: f64, min: f64, max: f64| -> (usize, usize, f64) {
            if max <= min {
                return (0, 0, 0.0);
            }
            let pos = (v - min) / (max - min) * (self.resolution - 1) as f64;
            let i0 = (pos.floor() as usize).min(self.resolution - 1);
            let i1 = (i0 + 1).min(self.resolution - 1);
            (i0, i1, pos - i0 as f64)
        };
        let (r0, r1, tr) = frac(p.latitude, self.bounds.min_lat, self.bounds.max_lat);
        let (c0, c1, tc) = frac(p.longitude, self.bounds.min_lon, self.bounds.max_lon);

        let corners = [
            (self.cell_values[r0][c0], (1.0 - tr) * (1.0 - tc)),
            (self.cell_values[r0][c1], (1.0 - tr) * tc),
            (self.cell_values[r1][c0], tr * (1.0 - tc)),
            (self.cell_values[r1][c1], tr * tc),
        ];
        Some(blend_cells(corners.iter().copied()))
    }
}

/// Weighted channel-wise blend of cells.
fn blend_cells(cells: impl Iterator<Item = (WindCell, f64)>) -> WindCell {
    let (mut s, mut c, mut sp, mut cf, mut total) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (cell, w) in cells {
        let r = cell.direction.to_radians();
        s += w * r.sin();
        c += w * r.cos();
        sp += w * cell.speed;
        cf += w * cell.confidence;
        total += w;
    }
    if total <= 0.0 {
        return WindCell {
            direction: 0.0,
            speed: 0.0,
            confidence: 0.0,
        };
    }
    WindCell {
        direction: angle_from_components(s, c),
        speed: (sp / total).max(0.0),
        confidence: (cf / total).clamp(0.0, 1.0),
    }
}

fn same_grid(a: &WindField, b: &WindField) -> bool {
    const EPS: f64 = 1e-12;
    a.resolution == b.resolution
        && (a.bounds.min_lat - b.bounds.min_lat).abs() < EPS
        && (a.bounds.max_lat - b.bounds.max_lat).abs() < EPS
        && (a.bounds.min_lon - b.bounds.min_lon).abs() < EPS
        && (a.bounds.max_lon - b.bounds.max_lon).abs() < EPS
}

/// Blend fields sharing bounds and resolution with the given weights.
pub fn fuse_weighted(fields: &[(&WindField, f64)]) -> Result<WindField> {
    let Some((first, _)) = fields.first() else {
        return Err(AnalysisError::IncompatibleFields("no fields to fuse".into()));
    };
    if let Some((other, _)) = fields.iter().find(|(f, _)| !same_grid(first, f)) {
        return Err(AnalysisError::IncompatibleFields(format!(
            "grid {}x{} {:?} does not match {}x{} {:?}",
            other.resolution,
            other.resolution,
            other.bounds,
            first.resolution,
            first.resolution,
            first.bounds
        )));
    }
    if fields.iter().any(|(_, w)| !(w.is_finite() && *w >= 0.0)) {
        return Err(AnalysisError::config("weights", "must be finite and >= 0"));
    }
    let total: f64 = fields.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return Err(AnalysisError::config("weights", "must not all be zero"));
    }

    let n = first.resolution;
    let cell_values = (0..n)
        .map(|r| {
            (0..n)
                .map(|c| blend_cells(fields.iter().map(|(f, w)| (f.cell_values[r][c], *w))))
                .collect()
        })
        .collect();

    let timestamp = fields
        .iter()
        .map(|(f, _)| f.timestamp)
        .fold(f64::NEG_INFINITY, f64::max);
    let contributing: Vec<&WindField> = fields
        .iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(f, _)| *f)
        .collect();

    let metadata = FieldMetadata {
        sample_count: contributing.iter().map(|f| f.metadata.sample_count).sum(),
        triangulated: contributing.iter().all(|f| f.metadata.triangulated),
        joggled: contributing.iter().any(|f| f.metadata.joggled),
        fallback_cells: contributing.iter().map(|f| f.metadata.fallback_cells).sum(),
        degenerate_reason: contributing
            .iter()
            .find_map(|f| f.metadata.degenerate_reason.clone()),
        fused_fields: fields.len(),
    };
    debug!("Fused {} wind fields", fields.len());

    Ok(WindField {
        timestamp,
        bounds: first.bounds,
        resolution: n,
        cell_values,
        generation_method: GenerationMethod::Combined,
        is_validated: contributing.iter().all(|f| f.is_validated),
        metadata,
        samples: Vec::new(),
    })
}

/// Blend two fields with caller-supplied weights.
pub fn fuse(a: &WindField, b: &WindField, weight_a: f64, weight_b: f64) -> Result<WindField> {
    fuse_weighted(&[(a, weight_a), (b, weight_b)])
}

/// Exponential decay weight: 1 at age 0, 0.5 at one half-life.
/// Negative ages (fields newer than the reference) count as age 0.
pub fn decay_weight(age: f64, half_life: f64) -> f64 {
    if half_life.is_nan() || half_life <= 0.0 {
        return if age <= 0.0 { 1.0 } else { 0.0 };
    }
    0.5f64.powf(age.max(0.0) / half_life)
}

/// Fuse snapshots with weights decaying by age relative to `reference_time`.
pub fn fuse_many(
    fields: &[WindField],
    reference_time: f64,
    half_life: f64,
) -> Result<Option<WindField>> {
    if fields.is_empty() {
        return Ok(None);
    }
    let weighted: Vec<(&WindField, f64)> = fields
        .iter()
        .map(|f| (f, decay_weight(reference_time - f.timestamp, half_life)))
        .collect();
    fuse_weighted(&weighted).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::angle_difference;

    fn bounds() -> Bounds {
        Bounds::new(54.40, 54.42, 10.18, 10.22)
    }

    fn est(lat: f64, lon: f64, dir: f64, speed: f64) -> WindEstimate {
        WindEstimate::direct(dir, speed, 0.8, 100.0).with_position(GeoPoint::new(lat, lon))
    }

    fn corners(dir: f64, speed: f64) -> Vec<WindEstimate> {
        let b = bounds();
        vec![
            est(b.min_lat, b.min_lon, dir, speed),
            est(b.min_lat, b.max_lon, dir, speed),
            est(b.max_lat, b.min_lon, dir, speed),
            est(b.max_lat, b.max_lon, dir, speed),
        ]
    }

    #[test]
    fn uniform_wind_stays_uniform() {
        let field = interpolate_wind_field(&corners(350.0, 12.0), bounds(), 5)
            .unwrap()
            .unwrap();
        assert!(field.is_validated);
        assert_eq!(field.metadata.fallback_cells, 0);
        assert_eq!(field.cell_values.len(), 5);
        for row in &field.cell_values {
            assert_eq!(row.len(), 5);
            for cell in row {
                assert!(angle_difference(cell.direction, 350.0).abs() < 1e-6);
                assert!((cell.speed - 12.0).abs() < 1e-9);
                assert!((cell.confidence - 0.8).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn grid_node_coordinates() {
        let field = interpolate_wind_field(&corners(0.0, 10.0), bounds(), 5)
            .unwrap()
            .unwrap();
        assert_eq!(field.row_latitude(0), Some(54.40));
        assert!((field.row_latitude(4).unwrap() - 54.42).abs() < 1e-12);
        assert!((field.col_longitude(2).unwrap() - 10.20).abs() < 1e-12);
        assert_eq!(field.row_latitude(5), None);
        assert_eq!(field.col_longitude(usize::MAX), None);
    }

    #[test]
    fn interpolation_does_not_break_at_north() {
        let b = bounds();
        let estimates = vec![
            est(b.min_lat, b.min_lon, 350.0, 10.0),
            est(b.min_lat, b.max_lon, 10.0, 10.0),
            est(b.max_lat, b.min_lon, 350.0, 10.0),
            est(b.max_lat, b.max_lon, 10.0, 10.0),
        ];
        let field = interpolate_wind_field(&estimates, b, 3).unwrap().unwrap();
        let mid = field.cell_values[1][1];
        // A raw average of 350 and 10 would give 180
        assert!(angle_difference(mid.direction, 0.0).abs() < 1e-6, "got {}", mid.direction);
        assert!(field.cell_values[1][0].direction > 300.0);
        assert!(field.cell_values[1][2].direction < 60.0);
    }

    #[test]
    fn collinear_samples_fall_back_to_nearest() {
        let b = bounds();
        // Along one meridian
        let estimates: Vec<WindEstimate> = [54.401, 54.41, 54.419]
            .iter()
            .enumerate()
            .map(|(i, lat)| est(*lat, 10.20, 10.0 * i as f64, 8.0 + i as f64))
            .collect();
        let field = interpolate_wind_field(&estimates, b, 4).unwrap().unwrap();
        assert!(!field.is_validated);
        assert!(!field.metadata.triangulated);
        assert_eq!(field.metadata.fallback_cells, 16);
        assert!(field.metadata.degenerate_reason.is_some());
        // South-west corner takes the first sample
        assert!((field.cell_values[0][0].speed - 8.0).abs() < 1e-9);
    }

    #[test]
    fn single_estimate_fills_grid() {
        let e = WindEstimate::direct(200.0, 9.0, 0.6, 5.0);
        let field = interpolate_wind_field(&[e], bounds(), 3).unwrap().unwrap();
        assert!(!field.is_validated);
        assert_eq!(field.metadata.sample_count, 1);
        assert!(field
            .cell_values
            .iter()
            .flatten()
            .all(|c| (c.direction - 200.0).abs() < 1e-9 && c.speed == 9.0));
        assert_eq!(field.timestamp, 5.0);
    }

    #[test]
    fn coincident_estimates_are_merged() {
        let b = bounds();
        let mut estimates = corners(90.0, 10.0);
        estimates.push(est(b.min_lat, b.min_lon, 90.0, 14.0));
        let field = interpolate_wind_field(&estimates, b, 3).unwrap().unwrap();
        assert_eq!(field.metadata.sample_count, 4);
        assert!(field.is_validated);
        assert!((field.cell_values[0][0].speed - 12.0).abs() < 1e-9);
    }

    #[test]
    fn cells_outside_hull_use_nearest() {
        let b = bounds();
        let c = b.center();
        let estimates = vec![
            est(c.latitude, c.longitude - 0.005, 90.0, 10.0),
            est(c.latitude - 0.003, c.longitude + 0.005, 90.0, 10.0),
            est(c.latitude + 0.003, c.longitude + 0.005, 90.0, 10.0),
        ];
        let field = interpolate_wind_field(&estimates, b, 5).unwrap().unwrap();
        assert!(field.metadata.triangulated);
        assert!(field.metadata.fallback_cells > 0);
        assert!(!field.is_validated);
    }

    #[test]
    fn empty_and_invalid_inputs() {
        assert!(interpolate_wind_field(&[], bounds(), 4).unwrap().is_none());
        assert!(interpolate_wind_field(&corners(0.0, 1.0), bounds(), 0).is_err());
        let inverted = Bounds::new(1.0, 0.0, 0.0, 1.0);
        assert!(interpolate_wind_field(&corners(0.0, 1.0), inverted, 4).is_err());
    }

    #[test]
    fn resample_keeps_field() {
        let b = bounds();
        let estimates = vec![
            est(b.min_lat, b.min_lon, 0.0, 8.0),
            est(b.min_lat, b.max_lon, 20.0, 10.0),
            est(b.max_lat, b.min_lon, 40.0, 12.0),
            est(b.max_lat, b.max_lon, 60.0, 14.0),
        ];
        let coarse = interpolate_wind_field(&estimates, b, 3).unwrap().unwrap();
        let fine = coarse.resample(5).unwrap();
        assert_eq!(fine.resolution, 5);
        assert_eq!(fine.is_validated, coarse.is_validated);
        // Shared nodes agree: coarse node k maps to fine node 2k
        for r in 0..3 {
            for c in 0..3 {
                let a = coarse.cell_values[r][c];
                let f = fine.cell_values[2 * r][2 * c];
                assert!(angle_difference(a.direction, f.direction).abs() < 1e-9);
                assert!((a.speed - f.speed).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn fuse_blends_channels() {
        let a = interpolate_wind_field(&corners(350.0, 10.0), bounds(), 3)
            .unwrap()
            .unwrap();
        let b = interpolate_wind_field(&corners(30.0, 20.0), bounds(), 3)
            .unwrap()
            .unwrap();
        let fused = fuse(&a, &b, 1.0, 1.0).unwrap();
        assert_eq!(fused.generation_method, GenerationMethod::Combined);
        assert_eq!(fused.metadata.fused_fields, 2);
        assert!(fused.samples.is_empty());
        let cell = fused.cell_values[1][1];
        assert!(angle_difference(cell.direction, 10.0).abs() < 1e-6, "got {}", cell.direction);
        assert!((cell.speed - 15.0).abs() < 1e-9);

        let resampled = fused.resample(5).unwrap();
        assert_eq!(resampled.generation_method, GenerationMethod::Combined);
        assert!((resampled.cell_values[2][2].speed - 15.0).abs() < 1e-9);
    }

    #[test]
    fn fuse_rejects_mismatched_grids() {
        let a = interpolate_wind_field(&corners(0.0, 10.0), bounds(), 3).unwrap().unwrap();
        let b = interpolate_wind_field(&corners(0.0, 10.0), bounds(), 4).unwrap().unwrap();
        assert!(matches!(fuse(&a, &b, 1.0, 1.0), Err(AnalysisError::IncompatibleFields(_))));
        assert!(fuse(&a, &a, 0.0, 0.0).is_err());
        assert!(fuse(&a, &a, -1.0, 1.0).is_err());
    }

    #[test]
    fn decay_weights() {
        assert_eq!(decay_weight(0.0, 600.0), 1.0);
        assert!((decay_weight(600.0, 600.0) - 0.5).abs() < 1e-12);
        assert!((decay_weight(1200.0, 600.0) - 0.25).abs() < 1e-12);
        assert_eq!(decay_weight(-50.0, 600.0), 1.0);
    }

    #[test]
    fn time_decayed_fusion_favors_recent() {
        let mut old = interpolate_wind_field(&corners(0.0, 10.0), bounds(), 3)
            .unwrap()
            .unwrap();
        old.timestamp = 0.0;
        let mut recent = interpolate_wind_field(&corners(40.0, 10.0), bounds(), 3)
            .unwrap()
            .unwrap();
        recent.timestamp = 1200.0;
        let fused = fuse_many(&[old, recent], 1200.0, 600.0)
            .unwrap()
            .unwrap();
        let d = fused.cell_values[0][0].direction;
        assert!(d > 20.0 && d < 40.0, "got {d}");
        assert_eq!(fused.timestamp, 1200.0);
        assert!(fuse_many(&[], 0.0, 600.0).unwrap().is_none());
    }

    #[test]
    fn value_at_inside_and_outside() {
        let field = interpolate_wind_field(&corners(90.0, 10.0), bounds(), 4)
            .unwrap()
            .unwrap();
        let v = field.value_at(&bounds().center()).unwrap();
        assert!((v.direction - 90.0).abs() < 1e-6);
        assert!((v.speed - 10.0).abs() < 1e-9);
        assert!(field.value_at(&GeoPoint::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn serializes_to_json() {
        let field = interpolate_wind_field(&corners(90.0, 10.0), bounds(), 2)
            .unwrap()
            .unwrap();
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["generation_method"], "interpolation");
        assert_eq!(json["is_validated"], true);
        assert_eq!(json["cell_values"].as_array().unwrap().len(), 2);
    }
}
