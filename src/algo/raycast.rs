//! Ray casting against a mesh.
//!
//! A [`FaceBvh`] is a bounding-volume hierarchy over the triangles of a mesh,
//! split at the median centroid along the longest axis. The deformer casts a
//! ray from each vertex along its displacement direction to find how far the
//! vertex can travel before it reaches the opposite surface of the solid.

use nalgebra::{Point3, Vector3};

use crate::mesh::{FaceId, HalfEdgeMesh};

/// Slack on bounding boxes and barycentric coordinates.
const EPSILON: f64 = 1e-9;

/// Closest intersection of a ray with the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance along the (unit) ray direction.
    pub distance: f64,
    /// The face hit.
    pub face: FaceId,
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn from_triangle(tri: &[Point3<f64>; 3]) -> Self {
        let mut aabb = Self {
            min: tri[0],
            max: tri[0],
        };
        for p in &tri[1..] {
            aabb = aabb.union(&Self { min: *p, max: *p });
        }
        aabb
    }

    fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    fn expand(&self, epsilon: f64) -> Self {
        let pad = Vector3::repeat(epsilon);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    /// Entry distance of a ray into the box (slab test), if it enters at all.
    fn entry(&self, origin: &Point3<f64>, dir_inv: &Vector3<f64>) -> Option<f64> {
        let mut t_min = f64::NEG_INFINITY;
        let mut t_max = f64::INFINITY;
        for axis in 0..3 {
            let t1 = (self.min[axis] - origin[axis]) * dir_inv[axis];
            let t2 = (self.max[axis] - origin[axis]) * dir_inv[axis];
            // NaN when the origin lies on a slab plane of an axis-parallel ray.
            let (near, far) = if t1.is_nan() || t2.is_nan() {
                (f64::NEG_INFINITY, f64::INFINITY)
            } else {
                (t1.min(t2), t1.max(t2))
            };
            t_min = t_min.max(near);
            t_max = t_max.min(far);
        }

        (t_max >= t_min && t_max >= 0.0).then_some(t_min.max(0.0))
    }
}

#[derive(Debug)]
enum BvhNode {
    Leaf {
        aabb: Aabb,
        face: usize,
    },
    Internal {
        aabb: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn build(triangles: &[[Point3<f64>; 3]], faces: &mut [usize]) -> Option<Self> {
        match faces {
            [] => None,
            [face] => Some(Self::Leaf {
                aabb: Aabb::from_triangle(&triangles[*face]).expand(EPSILON),
                face: *face,
            }),
            _ => {
                let aabb = faces
                    .iter()
                    .map(|&f| Aabb::from_triangle(&triangles[f]))
                    .reduce(|a, b| a.union(&b))?
                    .expand(EPSILON);

                let extent = aabb.max - aabb.min;
                let axis = extent.imax();
                let centroid = |f: usize| {
                    let [a, b, c] = triangles[f];
                    (a[axis] + b[axis] + c[axis]) / 3.0
                };
                faces.sort_by(|&a, &b| centroid(a).total_cmp(&centroid(b)));

                let (left, right) = faces.split_at_mut(faces.len() / 2);
                match (Self::build(triangles, left), Self::build(triangles, right)) {
                    (Some(l), Some(r)) => Some(Self::Internal {
                        aabb,
                        left: Box::new(l),
                        right: Box::new(r),
                    }),
                    (Some(n), None) | (None, Some(n)) => Some(n),
                    (None, None) => None,
                }
            }
        }
    }

    fn aabb(&self) -> &Aabb {
        match self {
            Self::Leaf { aabb, .. } | Self::Internal { aabb, .. } => aabb,
        }
    }
}

/// Möller–Trumbore ray-triangle intersection; distance along `direction`.
#[allow(clippy::many_single_char_names)]
fn ray_triangle(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    tri: &[Point3<f64>; 3],
) -> Option<f64> {
    let edge1 = tri[1] - tri[0];
    let edge2 = tri[2] - tri[0];

    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);
    if a.abs() < 1e-15 {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - tri[0];
    let u = f * s.dot(&h);
    if !(-EPSILON..=1.0 + EPSILON).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < -EPSILON || u + v > 1.0 + EPSILON {
        return None;
    }

    let t = f * edge2.dot(&q);
    (t > EPSILON).then_some(t)
}

/// Bounding-volume hierarchy over the faces of a mesh.
#[derive(Debug)]
pub struct FaceBvh {
    root: Option<BvhNode>,
    triangles: Vec<[Point3<f64>; 3]>,
}

impl FaceBvh {
    /// Build over the faces of `mesh` at the given vertex positions.
    pub fn build(mesh: &HalfEdgeMesh, positions: &[Point3<f64>]) -> Self {
        let triangles: Vec<[Point3<f64>; 3]> = mesh
            .face_ids()
            .map(|f| mesh.face_triangle(f).map(|v| positions[v.index()]))
            .collect();
        let mut faces: Vec<usize> = (0..triangles.len()).collect();
        let root = BvhNode::build(&triangles, &mut faces);
        Self { root, triangles }
    }

    /// Closest hit within `max_distance` of a ray with unit `direction`,
    /// ignoring the faces in `skip`.
    pub fn cast(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        max_distance: f64,
        skip: &[FaceId],
    ) -> Option<RayHit> {
        let dir_inv = direction.map(|d| 1.0 / d);
        let ray = Ray {
            origin,
            direction,
            dir_inv: &dir_inv,
            skip,
        };
        let root = self.root.as_ref()?;
        self.trace(root, &ray, max_distance)
    }

    fn trace(&self, node: &BvhNode, ray: &Ray<'_>, max_distance: f64) -> Option<RayHit> {
        let t_near = node.aabb().entry(ray.origin, ray.dir_inv)?;
        if t_near > max_distance {
            return None;
        }

        match node {
            BvhNode::Leaf { face, .. } => {
                let id = FaceId::new(*face);
                if ray.skip.contains(&id) {
                    return None;
                }
                ray_triangle(ray.origin, ray.direction, &self.triangles[*face])
                    .filter(|&t| t <= max_distance)
                    .map(|distance| RayHit { distance, face: id })
            }
            BvhNode::Internal { left, right, .. } => {
                let hit_left = self.trace(left, ray, max_distance);
                let limit = hit_left.map_or(max_distance, |h| h.distance);
                match (hit_left, self.trace(right, ray, limit)) {
                    (Some(l), Some(r)) if r.distance < l.distance => Some(r),
                    (Some(l), _) => Some(l),
                    (None, r) => r,
                }
            }
        }
    }
}

struct Ray<'a> {
    origin: &'a Point3<f64>,
    direction: &'a Vector3<f64>,
    dir_inv: &'a Vector3<f64>,
    skip: &'a [FaceId],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::{create_slab, create_tetrahedron, top_vertex};
    use crate::mesh::VertexId;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ray_triangle_hit_and_miss() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let down = Vector3::new(0.0, 0.0, -1.0);

        let t = ray_triangle(&Point3::new(0.25, 0.25, 2.0), &down, &tri).unwrap();
        assert_abs_diff_eq!(t, 2.0, epsilon = 1e-12);

        assert!(ray_triangle(&Point3::new(0.8, 0.8, 2.0), &down, &tri).is_none());
        // Behind the origin.
        assert!(ray_triangle(&Point3::new(0.25, 0.25, -1.0), &down, &tri).is_none());
    }

    #[test]
    fn test_ray_through_shared_vertex_hits() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let t = ray_triangle(&Point3::new(0.0, 0.0, 1.0), &Vector3::new(0.0, 0.0, -1.0), &tri);
        assert_eq!(t, Some(1.0));
    }

    #[test]
    fn test_cast_through_slab() {
        let mesh = create_slab(6, 6, 6.0, 6.0, 2.0);
        let bvh = FaceBvh::build(&mesh, &mesh.positions());

        let v = VertexId::new(top_vertex(6, 3, 3));
        let skip: Vec<FaceId> = mesh.vertex_faces(v).collect();
        let down = Vector3::new(0.0, 0.0, -1.0);

        let hit = bvh.cast(&mesh.position(v), &down, 10.0, &skip).unwrap();
        assert_abs_diff_eq!(hit.distance, 2.0, epsilon = 1e-12);
        assert!(mesh.face_normal(hit.face).z < 0.0);

        // Out of reach, and pointing away from the solid.
        assert!(bvh.cast(&mesh.position(v), &down, 1.5, &skip).is_none());
        assert!(bvh.cast(&mesh.position(v), &-down, 10.0, &skip).is_none());
    }

    #[test]
    fn test_cast_returns_closest_hit() {
        let mesh = create_tetrahedron();
        let bvh = FaceBvh::build(&mesh, &mesh.positions());
        let origin = Point3::new(0.5, 0.4, 5.0);
        let hit = bvh.cast(&origin, &Vector3::new(0.0, 0.0, -1.0), 100.0, &[]).unwrap();
        assert!(hit.distance > 4.0 && hit.distance < 5.0);
    }
}
