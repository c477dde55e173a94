//! Planar polygons.
//!
//! Pressure zones arrive as closed polygons in image space and are tested
//! against vertex parameter coordinates in mesh space. Both uses go through
//! [`Polygon`]: a closed ring of 2D points where the last point connects back
//! to the first.

use nalgebra::{Point2, Vector2};

/// Distance under which a point counts as lying on a polygon edge.
pub const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// A closed planar polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    points: Vec<Point2<f64>>,
}

impl Polygon {
    /// Create a polygon from its ring of points.
    ///
    /// A trailing point equal to the first is dropped, since the ring is
    /// closed implicitly.
    pub fn new(mut points: Vec<Point2<f64>>) -> Self {
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        Self { points }
    }

    /// Build from a flat `[x0, y0, x1, y1, ...]` coordinate list.
    ///
    /// Returns `None` if the list has odd length.
    pub fn from_flat(coords: &[f64]) -> Option<Self> {
        if coords.len() % 2 != 0 {
            return None;
        }
        Some(Self::new(
            coords.chunks_exact(2).map(|c| Point2::new(c[0], c[1])).collect(),
        ))
    }

    /// The ring of points.
    #[inline]
    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    /// Number of points in the ring.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the ring is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of pairwise distinct points.
    pub fn distinct_points(&self) -> usize {
        let mut seen: Vec<Point2<f64>> = Vec::with_capacity(self.points.len());
        for p in &self.points {
            if !seen.contains(p) {
                seen.push(*p);
            }
        }
        seen.len()
    }

    /// Iterate over the edges as `(start, end)` pairs, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (Point2<f64>, Point2<f64>)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Signed area (shoelace formula); positive for counter-clockwise rings.
    pub fn signed_area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        0.5 * self
            .edges()
            .map(|(a, b)| a.x * b.y - b.x * a.y)
            .sum::<f64>()
    }

    /// Unsigned area.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Area centroid, falling back to the vertex mean for degenerate rings.
    pub fn centroid(&self) -> Point2<f64> {
        if self.points.is_empty() {
            return Point2::origin();
        }

        let a = self.signed_area();
        if a.abs() < 1e-12 {
            let sum = self.points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords);
            return Point2::from(sum / self.points.len() as f64);
        }

        let mut c = Vector2::zeros();
        for (p, q) in self.edges() {
            let cross = p.x * q.y - q.x * p.y;
            c += (p.coords + q.coords) * cross;
        }
        Point2::from(c / (6.0 * a))
    }

    /// Axis-aligned bounding box, `None` for an empty ring.
    pub fn bounding_box(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold((first, first), |(min, max), p| {
            (
                Point2::new(min.x.min(p.x), min.y.min(p.y)),
                Point2::new(max.x.max(p.x), max.y.max(p.y)),
            )
        }))
    }

    /// Apply a point transform to every vertex.
    pub fn map<F: Fn(&Point2<f64>) -> Point2<f64>>(&self, f: F) -> Self {
        Self {
            points: self.points.iter().map(f).collect(),
        }
    }

    /// Distance from `p` to the nearest polygon edge.
    pub fn boundary_distance(&self, p: &Point2<f64>) -> f64 {
        self.edges()
            .map(|(a, b)| point_to_segment_dist(p, &a, &b))
            .fold(f64::INFINITY, f64::min)
    }

    /// Whether `p` lies inside the polygon or on its boundary.
    ///
    /// Uses the even-odd rule, so it is only meaningful for simple polygons.
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        if self.points.len() < 3 {
            return false;
        }
        if self.boundary_distance(p) <= BOUNDARY_TOLERANCE {
            return true;
        }

        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > p.y) != (b.y > p.y) {
                let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Distance from `p` to the polygon region: zero inside or on the boundary.
    pub fn distance(&self, p: &Point2<f64>) -> f64 {
        if self.contains(p) {
            0.0
        } else {
            self.boundary_distance(p)
        }
    }

    /// Whether no two edges cross, touch or overlap other than adjacent
    /// edges meeting at their shared vertex.
    pub fn is_simple(&self) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }

        for i in 0..n {
            let (a, b) = (self.points[i], self.points[(i + 1) % n]);
            if a == b {
                return false;
            }

            // Adjacent edge doubling back over this one.
            let c = self.points[(i + 2) % n];
            if orientation(&a, &b, &c) == 0.0 && (a - b).dot(&(c - b)) > 0.0 {
                return false;
            }

            for j in (i + 2)..n {
                if i == 0 && j == n - 1 {
                    continue;
                }
                let (c, d) = (self.points[j], self.points[(j + 1) % n]);
                if segments_intersect(&a, &b, &c, &d) {
                    return false;
                }
            }
        }
        true
    }
}

/// Twice the signed area of triangle `abc`.
fn orientation(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: &Point2<f64>, b: &Point2<f64>, p: &Point2<f64>) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Closed-segment intersection test, touching included.
fn segments_intersect(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>, d: &Point2<f64>) -> bool {
    let d1 = orientation(c, d, a);
    let d2 = orientation(c, d, b);
    let d3 = orientation(a, b, c);
    let d4 = orientation(a, b, d);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(c, d, a))
        || (d2 == 0.0 && on_segment(c, d, b))
        || (d3 == 0.0 && on_segment(a, b, c))
        || (d4 == 0.0 && on_segment(a, b, d))
}

/// Distance from `p` to the closed segment `ab`.
pub fn point_to_segment_dist(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < 1e-20 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}
