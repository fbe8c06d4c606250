//! Delaunay triangulation and barycentric interpolation.
//!
//! Bowyer-Watson over points normalized to the unit square. Degenerate
//! inputs (fewer than three points, collinear sets) are detected up front
//! and reported as `None`. When the triangles fail to tile the convex hull
//! the points are joggled by a tiny deterministic offset and triangulated
//! once more; a second failure is also reported as `None`. The work is
//! therefore bounded on every input.

use log::debug;

/// Minimum width of the point set relative to its extent.
const MIN_THICKNESS: f64 = 1e-6;
/// Joggle magnitude relative to the unit square.
const JOGGLE: f64 = 1e-7;
/// Relative tolerance when comparing tiled area with hull area.
const AREA_TOLERANCE: f64 = 1e-6;
/// Barycentric slack for points on triangle edges.
const EDGE_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct Triangle {
    v: [usize; 3],
    cx: f64,
    cy: f64,
    r2: f64,
}

impl Triangle {
    fn new(v: [usize; 3], pts: &[[f64; 2]]) -> Self {
        let [a, b, c] = [pts[v[0]], pts[v[1]], pts[v[2]]];
        let d = 2.0 * (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1]));
        if d.abs() < 1e-18 {
            // Collinear: treat the circumcircle as unbounded so it is replaced
            return Self {
                v,
                cx: (a[0] + b[0] + c[0]) / 3.0,
                cy: (a[1] + b[1] + c[1]) / 3.0,
                r2: f64::INFINITY,
            };
        }
        let a2 = a[0] * a[0] + a[1] * a[1];
        let b2 = b[0] * b[0] + b[1] * b[1];
        let c2 = c[0] * c[0] + c[1] * c[1];
        let cx = (a2 * (b[1] - c[1]) + b2 * (c[1] - a[1]) + c2 * (a[1] - b[1])) / d;
        let cy = (a2 * (c[0] - b[0]) + b2 * (a[0] - c[0]) + c2 * (b[0] - a[0])) / d;
        let r2 = (a[0] - cx).powi(2) + (a[1] - cy).powi(2);
        Self { v, cx, cy, r2 }
    }

    fn circumcircle_contains(&self, p: [f64; 2]) -> bool {
        (p[0] - self.cx).powi(2) + (p[1] - self.cy).powi(2) < self.r2
    }
}

/// Triangulated point set ready for linear interpolation.
#[derive(Debug, Clone)]
pub struct Triangulation {
    /// Points in the caller's coordinates.
    points: Vec<[f64; 2]>,
    triangles: Vec<[usize; 3]>,
    joggled: bool,
}

impl Triangulation {
    /// Triangulate `points`. None when the set is degenerate.
    pub fn new(points: &[[f64; 2]]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let normalized = normalize(points)?;
        if thickness(&normalized) < MIN_THICKNESS {
            debug!("Triangulation skipped: {} collinear points", points.len());
            return None;
        }

        let hull = hull_area(&normalized);
        if let Some(triangles) = bowyer_watson(&normalized).filter(|t| tiles(t, &normalized, hull)) {
            return Some(Self {
                points: points.to_vec(),
                triangles,
                joggled: false,
            });
        }

        let joggled = joggle(&normalized);
        let hull = hull_area(&joggled);
        let triangles = bowyer_watson(&joggled).filter(|t| tiles(t, &joggled, hull))?;
        debug!("Triangulation succeeded after joggle");
        Some(Self {
            points: points.to_vec(),
            triangles,
            joggled: true,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn was_joggled(&self) -> bool {
        self.joggled
    }

    /// Vertex indices and barycentric weights of the triangle containing
    /// `q`, or None outside the convex hull.
    pub fn locate(&self, q: [f64; 2]) -> Option<([usize; 3], [f64; 3])> {
        self.triangles.iter().find_map(|t| {
            let w = barycentric(q, self.points[t[0]], self.points[t[1]], self.points[t[2]])?;
            w.iter().all(|&x| x >= -EDGE_EPS).then_some((*t, w))
        })
    }

    /// Linearly interpolate `values` (one per input point) at `q`.
    pub fn interpolate(&self, q: [f64; 2], values: &[f64]) -> Option<f64> {
        let (t, w) = self.locate(q)?;
        Some(w[0] * values[t[0]] + w[1] * values[t[1]] + w[2] * values[t[2]])
    }
}

fn barycentric(q: [f64; 2], a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Option<[f64; 3]> {
    let det = (b[1] - c[1]) * (a[0] - c[0]) + (c[0] - b[0]) * (a[1] - c[1]);
    if det.abs() < f64::EPSILON * (a[0].abs() + a[1].abs() + 1.0) {
        return None;
    }
    let l1 = ((b[1] - c[1]) * (q[0] - c[0]) + (c[0] - b[0]) * (q[1] - c[1])) / det;
    let l2 = ((c[1] - a[1]) * (q[0] - c[0]) + (a[0] - c[0]) * (q[1] - c[1])) / det;
    Some([l1, l2, 1.0 - l1 - l2])
}

/// Map points into the unit square. None if all points coincide.
fn normalize(points: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p[0]);
        min_y = min_y.min(p[1]);
        max_x = max_x.max(p[0]);
        max_y = max_y.max(p[1]);
    }
    let extent = (max_x - min_x).max(max_y - min_y);
    if !(extent > 0.0) || !extent.is_finite() {
        return None;
    }
    Some(
        points
            .iter()
            .map(|p| [(p[0] - min_x) / extent, (p[1] - min_y) / extent])
            .collect(),
    )
}

/// Largest distance from the line through the two most separated points
/// (relative to the unit extent). Zero for collinear sets.
fn thickness(points: &[[f64; 2]]) -> f64 {
    let a = points[0];
    let b = points
        .iter()
        .copied()
        .max_by(|p, q| dist2(*p, a).total_cmp(&dist2(*q, a)))
        .unwrap_or(a);
    let len = dist2(a, b).sqrt();
    if len == 0.0 {
        return 0.0;
    }
    points
        .iter()
        .map(|p| ((b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])).abs() / len)
        .fold(0.0, f64::max)
}

fn dist2(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

/// One monotone chain of the convex hull, last point dropped.
fn half_hull<'a>(pts: impl Iterator<Item = &'a [f64; 2]>) -> Vec<[f64; 2]> {
    let mut chain: Vec<[f64; 2]> = Vec::new();
    for &p in pts {
        while chain.len() >= 2 && cross(chain[chain.len() - 2], chain[chain.len() - 1], p) <= 0.0 {
            chain.pop();
        }
        chain.push(p);
    }
    chain.pop();
    chain
}

/// Convex hull area (monotone chain).
fn hull_area(points: &[[f64; 2]]) -> f64 {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    pts.dedup();
    if pts.len() < 3 {
        return 0.0;
    }

    let mut hull = half_hull(pts.iter());
    hull.extend(half_hull(pts.iter().rev()));

    let n = hull.len();
    (0..n)
        .map(|i| {
            let (p, q) = (hull[i], hull[(i + 1) % n]);
            p[0] * q[1] - q[0] * p[1]
        })
        .sum::<f64>()
        .abs()
        / 2.0
}

fn triangle_area(t: &[usize; 3], pts: &[[f64; 2]]) -> f64 {
    cross(pts[t[0]], pts[t[1]], pts[t[2]]).abs() / 2.0
}

/// Whether the triangles cover the hull exactly.
fn tiles(triangles: &[[usize; 3]], pts: &[[f64; 2]], hull: f64) -> bool {
    if triangles.is_empty() || hull <= 0.0 {
        return false;
    }
    let area: f64 = triangles.iter().map(|t| triangle_area(t, pts)).sum();
    (area - hull).abs() <= AREA_TOLERANCE * hull.max(1e-12)
}

/// Deterministic sub-resolution perturbation.
fn joggle(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let k = i as f64 + 1.0;
            let dx = (k * 12.9898).sin() * 43_758.545_3;
            let dy = (k * 78.233).sin() * 43_758.545_3;
            [
                p[0] + JOGGLE * (dx - dx.floor() - 0.5),
                p[1] + JOGGLE * (dy - dy.floor() - 0.5),
            ]
        })
        .collect()
}

/// Bowyer-Watson on points inside the unit square.
fn bowyer_watson(points: &[[f64; 2]]) -> Option<Vec<[usize; 3]>> {
    let n = points.len();
    let mut pts = points.to_vec();
    pts.push([-19.5, -10.0]);
    pts.push([20.5, -10.0]);
    pts.push([0.5, 30.0]);

    let mut triangles = vec![Triangle::new([n, n + 1, n + 2], &pts)];

    for i in 0..n {
        let p = pts[i];
        let (bad, good): (Vec<Triangle>, Vec<Triangle>) =
            triangles.into_iter().partition(|t| t.circumcircle_contains(p));
        triangles = good;
        if bad.is_empty() {
            // Point on an existing circumcircle boundary of every triangle
            return None;
        }

        // Boundary edges are those owned by exactly one bad triangle
        let mut edges: Vec<[usize; 2]> = Vec::with_capacity(bad.len() * 3);
        for t in &bad {
            for e in [[t.v[0], t.v[1]], [t.v[1], t.v[2]], [t.v[2], t.v[0]]] {
                let key = if e[0] < e[1] { e } else { [e[1], e[0]] };
                if let Some(pos) = edges.iter().position(|x| *x == key) {
                    edges.swap_remove(pos);
                } else {
                    edges.push(key);
                }
            }
        }
        // Edges shared by two bad triangles appear twice and cancel above
        triangles.extend(edges.into_iter().map(|e| Triangle::new([e[0], e[1], i], &pts)));
    }

    Some(
        triangles
            .into_iter()
            .filter(|t| t.v.iter().all(|&v| v < n))
            .map(|t| t.v)
            .collect(),
    )
}
