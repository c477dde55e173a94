//! Mesh deformation: embossing pressure-zone corrections.
//!
//! Every eligible vertex collects one contribution per profile whose region
//! it lies in or near, the [`ConflictPolicy`] reduces them to a single signed
//! displacement, and the vertex moves that far along the area-weighted normal
//! of the base mesh. Displacements are resolved for all vertices before any
//! position is written, so the result does not depend on vertex order.
//!
//! Connectivity is never touched: the output mesh is the base mesh with a new
//! position array. Two limits keep the solid printable. A ray cast along the
//! displacement direction stops every vertex `min_thickness` short of the
//! opposite surface, and an inversion guard walks back any displacement that
//! would flip or collapse an adjacent triangle.
//!
//! # Algorithm
//!
//! 1. Validate the base mesh is closed and manifold.
//! 2. Per vertex (in parallel): contribution = `magnitude * falloff(d / radius)`
//!    for every region within reach, where `d` is the parameter distance to
//!    the region (0 inside); resolve conflicts.
//! 3. Thickness limit (in parallel): cast from the base position along the
//!    displacement direction and shorten the displacement to the hit distance
//!    minus `min_thickness`.
//! 4. Displace along base normals.
//! 5. Guard shrink passes: for every vertex touching a flipped or collapsed
//!    triangle, bisect its displacement down to the largest safe fraction.
//!    Repeat until no triangle is inverted.
//! 6. Guard growth passes: extend every shortened displacement back toward
//!    its limit as far as its triangles allow, until nothing grows.

use nalgebra::{Point2, Point3, Vector3};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::mesh::{validate_closed_manifold, FaceId, HalfEdgeMesh, VertexId};
use crate::warning::GeometryWarning;

use super::mapping::SurfaceMapping;
use super::policy::{ConflictPolicy, Contribution, DeformationProfile};
use super::raycast::FaceBvh;
use super::Progress;

/// Displacements smaller than this are treated as zero (mm).
const DISPLACEMENT_EPSILON: f64 = 1e-12;

/// A growth pass only counts when some vertex gained more than this (mm).
const GROWTH_EPSILON: f64 = 1e-6;

/// Options for [`deform`].
#[derive(Debug, Clone)]
pub struct DeformOptions {
    /// How overlapping contributions combine.
    pub conflict: ConflictPolicy,

    /// A triangle counts as collapsed when its area drops below this fraction
    /// of its base area.
    pub min_area_ratio: f64,

    /// Material kept between a displaced vertex and the opposite surface of
    /// the solid (mm).
    pub min_thickness: f64,

    /// Bisection steps per clamped vertex.
    pub bisection_steps: usize,

    /// Guard passes that bisect before falling back to removing the
    /// displacement of offending vertices outright. Also bounds the growth
    /// passes.
    pub max_guard_passes: usize,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for DeformOptions {
    fn default() -> Self {
        Self {
            conflict: ConflictPolicy::MaxMagnitude,
            min_area_ratio: 1e-3,
            min_thickness: 0.5,
            bisection_steps: 20,
            max_guard_passes: 16,
            parallel: true,
        }
    }
}

impl DeformOptions {
    /// Set the conflict policy.
    pub fn with_conflict(mut self, conflict: ConflictPolicy) -> Self {
        self.conflict = conflict;
        self
    }

    /// Set the collapse threshold.
    pub fn with_min_area_ratio(mut self, ratio: f64) -> Self {
        self.min_area_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Set the material kept above the opposite surface.
    pub fn with_min_thickness(mut self, min_thickness: f64) -> Self {
        self.min_thickness = min_thickness.max(0.0);
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Summary of a deformation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeformStats {
    /// Vertices that moved.
    pub vertices_displaced: usize,
    /// Largest absolute displacement (mm).
    pub max_displacement: f64,
    /// Mean absolute displacement over displaced vertices (mm).
    pub mean_displacement: f64,
    /// Vertices under each zone, in zone order.
    pub zone_vertices: Vec<usize>,
    /// Vertices whose displacement was reduced.
    pub clamped: usize,
    /// Guard shrink and growth passes run.
    pub guard_passes: usize,
}

/// Result of [`deform`].
#[derive(Debug, Clone)]
pub struct DeformOutput {
    /// The deformed mesh; same connectivity as the input.
    pub mesh: HalfEdgeMesh,
    /// Applied signed displacement per vertex (mm).
    pub displacements: Vec<f64>,
    /// Zone whose pad each displaced vertex belongs to.
    pub owners: Vec<Option<usize>>,
    /// Vertices whose displacement was reduced.
    pub warnings: Vec<GeometryWarning>,
    /// Summary numbers.
    pub stats: DeformStats,
}

/// Requested displacement of every vertex and the zone that decided it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    /// Signed displacement per vertex (mm).
    pub displacements: Vec<f64>,
    /// Deciding zone per vertex; `None` where no zone reaches.
    pub owners: Vec<Option<usize>>,
}

/// Deform a mesh by the given profiles.
///
/// `profiles[i]` must correspond to `mapping.regions[i]`. The base mesh is
/// not modified.
///
/// # Errors
///
/// Returns [`Error::MeshIntegrity`] if the mesh is not closed and manifold,
/// and [`Error::InvalidParameter`] if the mapping or profiles do not match
/// the mesh.
pub fn deform(
    mesh: &HalfEdgeMesh,
    mapping: &SurfaceMapping,
    profiles: &[DeformationProfile],
    options: &DeformOptions,
) -> Result<DeformOutput> {
    deform_with_progress(mesh, mapping, profiles, options, &Progress::none())
}

/// [`deform`] with progress reporting.
pub fn deform_with_progress(
    mesh: &HalfEdgeMesh,
    mapping: &SurfaceMapping,
    profiles: &[DeformationProfile],
    options: &DeformOptions,
    progress: &Progress,
) -> Result<DeformOutput> {
    validate_closed_manifold(mesh)?;

    if mapping.uv.len() != mesh.num_vertices() || mapping.eligible.len() != mesh.num_vertices() {
        return Err(Error::invalid_param(
            "mapping",
            mapping.uv.len(),
            "mapping was computed for a different mesh",
        ));
    }
    if profiles.len() != mapping.regions.len() {
        return Err(Error::invalid_param(
            "profiles",
            profiles.len(),
            "need exactly one profile per mapped region",
        ));
    }

    progress.report(0, 4, "Resolving displacements");
    let normals = vertex_normals(mesh, options.parallel);
    let resolved = resolve_displacements(mapping, profiles, options);
    let requested = resolved.displacements;

    progress.report(1, 4, "Limiting to sole thickness");
    let base = mesh.positions();
    let targets = thickness_limits(
        mesh,
        &base,
        &normals,
        &requested,
        options.min_thickness,
        options.parallel,
    );

    progress.report(2, 4, "Checking for inverted triangles");
    let mut applied = targets.clone();
    let mut positions: Vec<Point3<f64>> = base
        .iter()
        .zip(normals.iter())
        .zip(applied.iter())
        .map(|((p, n), &d)| p + n * d)
        .collect();
    let guard = InversionGuard::new(mesh, &base, &normals, options);
    let guard_passes = guard.run(&mut positions, &mut applied, &targets);

    let warnings: Vec<GeometryWarning> = requested
        .iter()
        .zip(applied.iter())
        .enumerate()
        .filter(|(_, (r, a))| (*r - *a).abs() > DISPLACEMENT_EPSILON)
        .map(|(i, (&requested, &applied))| GeometryWarning {
            vertex: VertexId::new(i),
            requested,
            applied,
        })
        .collect();
    for w in &warnings {
        log::warn!("{}", w);
    }

    let owners: Vec<Option<usize>> = resolved
        .owners
        .into_iter()
        .zip(applied.iter())
        .map(|(owner, d)| owner.filter(|_| d.abs() > DISPLACEMENT_EPSILON))
        .collect();

    let stats = compute_stats(mapping, &applied, warnings.len(), guard_passes);
    log::debug!(
        "displaced {} vertices, max {:.3} mm, mean {:.3} mm, {} clamped",
        stats.vertices_displaced,
        stats.max_displacement,
        stats.mean_displacement,
        stats.clamped
    );
    progress.report(4, 4, "Deformation complete");

    Ok(DeformOutput {
        mesh: mesh.with_positions(&positions),
        displacements: applied,
        owners,
        warnings,
        stats,
    })
}

fn vertex_normals(mesh: &HalfEdgeMesh, parallel: bool) -> Vec<Vector3<f64>> {
    if parallel {
        (0..mesh.num_vertices())
            .into_par_iter()
            .map(|i| mesh.vertex_normal(VertexId::new(i)))
            .collect()
    } else {
        mesh.vertex_ids().map(|v| mesh.vertex_normal(v)).collect()
    }
}

/// Resolve the requested displacement of every vertex.
///
/// Vertices inside a region contribute at full strength and carry their
/// depth into the zone; vertices outside decay with their distance to it.
pub fn resolve_displacements(
    mapping: &SurfaceMapping,
    profiles: &[DeformationProfile],
    options: &DeformOptions,
) -> Resolved {
    // Parameter-space boxes outside which a region cannot reach.
    let reach: Vec<Option<(Point2<f64>, Point2<f64>)>> = mapping
        .regions
        .iter()
        .zip(profiles)
        .map(|(region, profile)| {
            if region.is_empty() || profile.magnitude == 0.0 {
                return None;
            }
            let r = profile.falloff_radius.max(0.0);
            region.polygon.bounding_box().map(|(min, max)| {
                (
                    Point2::new(min.x - r, min.y - r),
                    Point2::new(max.x + r, max.y + r),
                )
            })
        })
        .collect();

    let resolve_one = |i: usize| -> (f64, Option<usize>) {
        if !mapping.eligible[i] {
            return (0.0, None);
        }
        let v = VertexId::new(i);
        let p = mapping.uv.get(v);

        let contributions: Vec<Contribution> = mapping
            .regions
            .iter()
            .zip(profiles)
            .zip(reach.iter())
            .filter_map(|((region, profile), reach)| {
                let (min, max) = (*reach)?;
                if p.x < min.x || p.x > max.x || p.y < min.y || p.y > max.y {
                    return None;
                }
                match region.vertex(v) {
                    Some(inside) => profile.contribution(0.0, inside.depth),
                    None => {
                        let distance = region.distance(&p);
                        profile.contribution(distance, -distance)
                    }
                }
            })
            .collect();

        (
            options.conflict.resolve(&contributions),
            options.conflict.owner(&contributions),
        )
    };

    let n = mapping.eligible.len();
    let (displacements, owners): (Vec<f64>, Vec<Option<usize>>) = if options.parallel {
        (0..n).into_par_iter().map(resolve_one).unzip()
    } else {
        (0..n).map(resolve_one).unzip()
    };
    Resolved {
        displacements,
        owners,
    }
}

/// Shorten each displacement so the vertex stays `min_thickness` clear of
/// the surface it would otherwise run into.
///
/// A ray is cast from the base position along the displacement direction
/// against the base mesh, skipping the faces around the vertex itself. With
/// no hit within reach the displacement is kept.
pub fn thickness_limits(
    mesh: &HalfEdgeMesh,
    base: &[Point3<f64>],
    normals: &[Vector3<f64>],
    requested: &[f64],
    min_thickness: f64,
    parallel: bool,
) -> Vec<f64> {
    if requested.iter().all(|d| d.abs() <= DISPLACEMENT_EPSILON) {
        return requested.to_vec();
    }
    let bvh = FaceBvh::build(mesh, base);

    let limit_one = |i: usize| -> f64 {
        let d = requested[i];
        if d.abs() <= DISPLACEMENT_EPSILON || normals[i].norm_squared() == 0.0 {
            return d;
        }
        let v = VertexId::new(i);
        let direction = normals[i] * d.signum();
        let skip: Vec<FaceId> = mesh.vertex_faces(v).collect();

        match bvh.cast(&base[i], &direction, d.abs() + min_thickness, &skip) {
            Some(hit) => d.signum() * d.abs().min((hit.distance - min_thickness).max(0.0)),
            None => d,
        }
    };

    let limits: Vec<f64> = if parallel {
        (0..requested.len()).into_par_iter().map(limit_one).collect()
    } else {
        (0..requested.len()).map(limit_one).collect()
    };

    let shortened = limits
        .iter()
        .zip(requested)
        .filter(|(l, r)| (*l - *r).abs() > DISPLACEMENT_EPSILON)
        .count();
    if shortened > 0 {
        log::debug!("thickness limit shortened {} displacements", shortened);
    }
    limits
}

/// Per-face reference data for detecting inverted triangles.
struct InversionGuard<'a> {
    mesh: &'a HalfEdgeMesh,
    base: &'a [Point3<f64>],
    normals: &'a [Vector3<f64>],
    face_normals: Vec<Vector3<f64>>,
    face_areas: Vec<f64>,
    options: &'a DeformOptions,
}

impl<'a> InversionGuard<'a> {
    fn new(
        mesh: &'a HalfEdgeMesh,
        base: &'a [Point3<f64>],
        normals: &'a [Vector3<f64>],
        options: &'a DeformOptions,
    ) -> Self {
        let (face_normals, face_areas): (Vec<Vector3<f64>>, Vec<f64>) = mesh
            .face_ids()
            .map(|f| {
                let cross = triangle_cross(mesh, base, f);
                let area = 0.5 * cross.norm();
                (cross.try_normalize(1e-300).unwrap_or_else(Vector3::zeros), area)
            })
            .unzip();

        Self {
            mesh,
            base,
            normals,
            face_normals,
            face_areas,
            options,
        }
    }

    /// Whether a face keeps its orientation and enough area.
    fn face_ok(&self, positions: &[Point3<f64>], f: FaceId) -> bool {
        let base_area = self.face_areas[f.index()];
        if base_area <= 1e-15 {
            return true;
        }
        let cross = triangle_cross(self.mesh, positions, f);
        0.5 * cross.norm() > base_area * self.options.min_area_ratio
            && cross.dot(&self.face_normals[f.index()]) > 0.0
    }

    fn vertex_ok(&self, positions: &[Point3<f64>], v: VertexId) -> bool {
        self.mesh.vertex_faces(v).all(|f| self.face_ok(positions, f))
    }

    /// Moved vertices of every bad face, deduplicated and sorted.
    fn offending_vertices(&self, positions: &[Point3<f64>], applied: &[f64]) -> Vec<VertexId> {
        let mut flagged = vec![false; positions.len()];
        for f in self.mesh.face_ids() {
            if !self.face_ok(positions, f) {
                for v in self.mesh.face_triangle(f) {
                    if applied[v.index()].abs() > DISPLACEMENT_EPSILON {
                        flagged[v.index()] = true;
                    }
                }
            }
        }
        flagged
            .iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(|(i, _)| VertexId::new(i))
            .collect()
    }

    fn place(&self, positions: &mut [Point3<f64>], v: VertexId, displacement: f64) {
        let i = v.index();
        positions[i] = self.base[i] + self.normals[i] * displacement;
    }

    /// Furthest point from `safe` toward `target` that keeps the faces of `v`
    /// valid, found by bisection. `safe` must itself be valid.
    fn bisect(&self, positions: &mut [Point3<f64>], v: VertexId, safe: f64, target: f64) -> f64 {
        let (mut lo, mut hi) = (0.0, 1.0);
        for _ in 0..self.options.bisection_steps {
            let mid = 0.5 * (lo + hi);
            self.place(positions, v, safe + (target - safe) * mid);
            if self.vertex_ok(positions, v) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        safe + (target - safe) * lo
    }

    /// Largest fraction of `current` that keeps the faces of `v` valid with
    /// its neighbours where they are now; 0 when even the base position is
    /// blocked.
    fn shrink(&self, positions: &mut [Point3<f64>], v: VertexId, current: f64) -> f64 {
        self.place(positions, v, 0.0);
        if !self.vertex_ok(positions, v) {
            return 0.0;
        }
        self.bisect(positions, v, 0.0, current)
    }

    /// Move `v` from its valid displacement `from` as far toward `to` as its
    /// faces allow.
    fn extend(&self, positions: &mut [Point3<f64>], v: VertexId, from: f64, to: f64) -> f64 {
        self.place(positions, v, to);
        if self.vertex_ok(positions, v) {
            return to;
        }
        self.bisect(positions, v, from, to)
    }

    /// Clamp displacements until no face is inverted, then grow them back
    /// toward `targets` while every face stays valid. Returns the number of
    /// passes that changed something.
    fn run(&self, positions: &mut [Point3<f64>], applied: &mut [f64], targets: &[f64]) -> usize {
        let mut passes = 0;
        loop {
            let offending = self.offending_vertices(positions, applied);
            if offending.is_empty() {
                break;
            }
            passes += 1;

            let bisecting = passes <= self.options.max_guard_passes;
            log::debug!(
                "inversion guard pass {}: {} vertices ({})",
                passes,
                offending.len(),
                if bisecting { "bisecting" } else { "resetting" }
            );

            for v in offending {
                let i = v.index();
                let safe = if bisecting {
                    self.shrink(positions, v, applied[i])
                } else {
                    0.0
                };
                applied[i] = if safe.abs() > DISPLACEMENT_EPSILON { safe } else { 0.0 };
                self.place(positions, v, applied[i]);
            }
        }
        if passes == 0 {
            return 0;
        }

        // Shrinking one vertex can free room for a neighbour clamped earlier.
        for pass in 1..=self.options.max_guard_passes {
            let mut grown = 0;
            for i in 0..applied.len() {
                if (targets[i] - applied[i]).abs() <= DISPLACEMENT_EPSILON {
                    continue;
                }
                let v = VertexId::new(i);
                let reached = self.extend(positions, v, applied[i], targets[i]);
                if (reached - applied[i]).abs() > GROWTH_EPSILON {
                    grown += 1;
                }
                applied[i] = reached;
                self.place(positions, v, reached);
            }
            if grown == 0 {
                break;
            }
            passes += 1;
            log::debug!("inversion guard growth pass {}: {} vertices", pass, grown);
        }
        passes
    }
}

fn triangle_cross(mesh: &HalfEdgeMesh, positions: &[Point3<f64>], f: FaceId) -> Vector3<f64> {
    let [v0, v1, v2] = mesh.face_triangle(f);
    let (p0, p1, p2) = (positions[v0.index()], positions[v1.index()], positions[v2.index()]);
    (p1 - p0).cross(&(p2 - p0))
}

fn compute_stats(
    mapping: &SurfaceMapping,
    applied: &[f64],
    clamped: usize,
    guard_passes: usize,
) -> DeformStats {
    let moved: Vec<f64> = applied
        .iter()
        .map(|d| d.abs())
        .filter(|&d| d > DISPLACEMENT_EPSILON)
        .collect();

    DeformStats {
        vertices_displaced: moved.len(),
        max_displacement: moved.iter().cloned().fold(0.0, f64::max),
        mean_displacement: if moved.is_empty() {
            0.0
        } else {
            moved.iter().sum::<f64>() / moved.len() as f64
        },
        zone_vertices: mapping.regions.iter().map(|r| r.len()).collect(),
        clamped,
        guard_passes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::mapping::{map_zones, MapOptions};
    use crate::algo::parameterize::Projection;
    use crate::algo::policy::FalloffShape;
    use crate::annotation::PressureZone;
    use crate::mesh::build_from_triangles;
    use crate::mesh::fixtures::{create_slab, slab_arrays, top_vertex};
    use crate::polygon::Polygon;
    use approx::assert_abs_diff_eq;

    fn identity(size: f64) -> Projection {
        Projection {
            image_width: size,
            image_height: size,
            origin: [0.0, 0.0],
            scale: [1.0, 1.0],
            flip_y: false,
        }
    }

    fn zone(points: &[(f64, f64)]) -> PressureZone {
        let polygon = Polygon::new(points.iter().map(|&(x, y)| Point2::new(x, y)).collect());
        PressureZone {
            id: 0,
            category: "heel".to_string(),
            area: polygon.area(),
            polygon,
            intensity: None,
        }
    }

    fn profile(zone: usize, magnitude: f64, falloff_radius: f64) -> DeformationProfile {
        DeformationProfile {
            zone,
            category: "heel".to_string(),
            magnitude,
            falloff_radius,
            shape: FalloffShape::Cosine,
            priority: 0,
        }
    }

    fn run(
        mesh: &HalfEdgeMesh,
        zones: &[PressureZone],
        profiles: &[DeformationProfile],
        size: f64,
    ) -> DeformOutput {
        let mapping = map_zones(mesh, zones, &identity(size), &MapOptions::default());
        deform(mesh, &mapping, profiles, &DeformOptions::default()).unwrap()
    }

    fn no_inverted_faces(before: &HalfEdgeMesh, after: &HalfEdgeMesh) -> bool {
        before.face_ids().all(|f| {
            before.face_normal(f).dot(&after.face_normal(f)) > 0.0 && after.face_area(f) > 0.0
        })
    }

    #[test]
    fn test_heel_scenario() {
        // 40 x 40 mm slab on a 1 mm grid; triangular heel well inside it.
        let n = 40;
        let mesh = create_slab(n, n, 40.0, 40.0, 5.0);
        let zones = vec![zone(&[(12.0, 12.0), (28.0, 12.0), (20.0, 26.0)])];
        let out = run(&mesh, &zones, &[profile(0, 2.0, 5.0)], 40.0);

        let mapping = map_zones(&mesh, &zones, &identity(40.0), &MapOptions::default());
        let region = &mapping.regions[0];
        assert!(!region.is_empty());

        // Interior raised by exactly 2 mm.
        for rv in &region.vertices {
            let before = mesh.position(rv.vertex);
            let after = out.mesh.position(rv.vertex);
            assert_abs_diff_eq!(after.z - before.z, 2.0, epsilon = 1e-9);
            assert_abs_diff_eq!(after.x, before.x, epsilon = 1e-9);
            assert_abs_diff_eq!(after.y, before.y, epsilon = 1e-9);
            assert_eq!(out.owners[rv.vertex.index()], Some(0));
        }

        // Decays with distance and vanishes at the margin.
        let polygon = &region.polygon;
        for v in mesh.vertex_ids().filter(|&v| mapping.is_eligible(v)) {
            let p = mesh.position(v);
            let d = polygon.distance(&Point2::new(p.x, p.y));
            let dz = out.mesh.position(v).z - p.z;
            if d >= 5.0 {
                assert_eq!(dz, 0.0);
            } else if d > 0.0 {
                assert!(dz > 0.0 && dz < 2.0, "d = {}, dz = {}", d, dz);
                let expected = 2.0 * FalloffShape::Cosine.weight(d / 5.0);
                assert_abs_diff_eq!(dz, expected, epsilon = 1e-9);
            }
        }

        assert!(out.warnings.is_empty());
        assert!(no_inverted_faces(&mesh, &out.mesh));
        assert_eq!(out.stats.max_displacement, 2.0);
        assert_eq!(out.stats.zone_vertices, vec![region.len()]);
        assert_eq!(out.stats.guard_passes, 0);
    }

    #[test]
    fn test_bottom_surface_untouched() {
        let mesh = create_slab(10, 10, 10.0, 10.0, 2.0);
        let zones = vec![zone(&[(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)])];
        let out = run(&mesh, &zones, &[profile(0, 1.0, 2.0)], 10.0);

        let layer = 121;
        for i in layer..mesh.num_vertices() {
            let v = VertexId::new(i);
            assert_eq!(mesh.position(v), out.mesh.position(v));
        }
    }

    #[test]
    fn test_topology_preserved() {
        let mesh = create_slab(10, 10, 10.0, 10.0, 2.0);
        let zones = vec![zone(&[(2.0, 2.0), (8.0, 2.0), (5.0, 8.0)])];
        let out = run(&mesh, &zones, &[profile(0, -1.0, 2.0)], 10.0);

        assert_eq!(out.mesh.num_vertices(), mesh.num_vertices());
        assert_eq!(out.mesh.num_faces(), mesh.num_faces());
        for f in mesh.face_ids() {
            assert_eq!(mesh.face_triangle(f), out.mesh.face_triangle(f));
        }
        validate_closed_manifold(&out.mesh).unwrap();
    }

    #[test]
    fn test_overlap_takes_max_not_sum() {
        let mesh = create_slab(10, 10, 10.0, 10.0, 3.0);
        let zones = vec![
            zone(&[(2.0, 2.0), (6.0, 2.0), (6.0, 6.0), (2.0, 6.0)]),
            zone(&[(4.0, 4.0), (8.0, 4.0), (8.0, 8.0), (4.0, 8.0)]),
        ];
        let profiles = [profile(0, 1.0, 0.0), profile(1, 1.5, 0.0)];
        let out = run(&mesh, &zones, &profiles, 10.0);

        let overlap = VertexId::new(top_vertex(10, 5, 5));
        let only_first = VertexId::new(top_vertex(10, 3, 3));
        assert!((out.displacements[overlap.index()] - 1.5).abs() < 1e-12);
        assert!((out.displacements[only_first.index()] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_idempotent() {
        let mesh = create_slab(12, 12, 12.0, 12.0, 2.0);
        let zones = vec![
            zone(&[(2.0, 2.0), (9.0, 3.0), (5.0, 9.0)]),
            zone(&[(6.0, 6.0), (11.0, 6.0), (11.0, 11.0)]),
        ];
        let profiles = [profile(0, 1.0, 2.0), profile(1, -0.5, 1.0)];

        let a = run(&mesh, &zones, &profiles, 12.0);
        let b = run(&mesh, &zones, &profiles, 12.0);
        assert_eq!(a.mesh.positions(), b.mesh.positions());
        assert_eq!(a.displacements, b.displacements);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mesh = create_slab(12, 12, 12.0, 12.0, 2.0);
        let zones = vec![zone(&[(2.0, 2.0), (9.0, 3.0), (5.0, 9.0)])];
        let mapping = map_zones(&mesh, &zones, &identity(12.0), &MapOptions::default());
        let profiles = [profile(0, 1.0, 3.0)];

        let par = deform(&mesh, &mapping, &profiles, &DeformOptions::default()).unwrap();
        let sequential = DeformOptions::default().sequential();
        let seq = deform(&mesh, &mapping, &profiles, &sequential).unwrap();
        assert_eq!(par.displacements, seq.displacements);
    }

    #[test]
    fn test_empty_region_contributes_nothing() {
        let mesh = create_slab(4, 4, 4.0, 4.0, 1.0);
        let zones = vec![zone(&[(10.0, 10.0), (12.0, 10.0), (11.0, 12.0)])];
        let out = run(&mesh, &zones, &[profile(0, 2.0, 50.0)], 20.0);
        assert_eq!(out.stats.vertices_displaced, 0);
        assert_eq!(out.mesh.positions(), mesh.positions());
    }

    #[test]
    fn test_deep_recess_stops_short_of_bottom() {
        // Recessing the whole top of a 1 mm slab by 5 mm would push it
        // through the bottom without a single triangle flipping.
        let mesh = create_slab(6, 6, 6.0, 6.0, 1.0);
        let zones = vec![zone(&[(-1.0, -1.0), (7.0, -1.0), (7.0, 7.0), (-1.0, 7.0)])];
        let out = run(&mesh, &zones, &[profile(0, -5.0, 0.0)], 6.0);
        let min_thickness = DeformOptions::default().min_thickness;

        // Interior vertices move straight down and keep the skin.
        assert_abs_diff_eq!(
            out.displacements[top_vertex(6, 3, 3)],
            -(1.0 - min_thickness),
            epsilon = 1e-9
        );

        let layer = 49;
        for i in 0..layer {
            let p = out.mesh.position(VertexId::new(i));
            assert!(p.z > 0.0, "top vertex {} at z = {}", i, p.z);
            assert!(out.displacements[i] < 0.0, "top vertex {} lost its recess", i);
        }
        assert!(out.mesh.signed_volume() > 0.0);
        validate_closed_manifold(&out.mesh).unwrap();
        assert!(no_inverted_faces(&mesh, &out.mesh));

        assert_eq!(out.warnings.len(), layer);
        assert_eq!(out.stats.clamped, layer);
        for w in &out.warnings {
            assert_eq!(w.requested, -5.0);
            assert!(w.applied > w.requested && w.applied < 0.0, "{}", w);
        }
    }

    #[test]
    fn test_raise_is_not_limited_by_thickness() {
        let mesh = create_slab(6, 6, 6.0, 6.0, 1.0);
        let zones = vec![zone(&[(2.0, 2.0), (4.0, 2.0), (4.0, 4.0), (2.0, 4.0)])];
        let out = run(&mesh, &zones, &[profile(0, 5.0, 0.0)], 6.0);
        assert_eq!(out.displacements[top_vertex(6, 3, 3)], 5.0);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_clamped_vertices_keep_largest_safe_displacement() {
        // On a tall slab the rim normals point mostly sideways, so a deep
        // recess drags the rim across the interior and the guard must clamp.
        let mesh = create_slab(6, 6, 6.0, 6.0, 10.0);
        let zones = vec![zone(&[(-1.0, -1.0), (7.0, -1.0), (7.0, 7.0), (-1.0, 7.0)])];
        let profiles = [profile(0, -5.0, 0.0)];
        let mapping = map_zones(&mesh, &zones, &identity(6.0), &MapOptions::default());
        let options = DeformOptions::default().sequential();
        let out = deform(&mesh, &mapping, &profiles, &options).unwrap();

        assert!(!out.warnings.is_empty());
        assert!(out.stats.guard_passes > 0);
        assert!(no_inverted_faces(&mesh, &out.mesh));
        assert_eq!(out.displacements[top_vertex(6, 3, 3)], -5.0);

        let base = mesh.positions();
        let normals = vertex_normals(&mesh, false);
        let requested = resolve_displacements(&mapping, &profiles, &options).displacements;
        let limits =
            thickness_limits(&mesh, &base, &normals, &requested, options.min_thickness, false);
        let guard = InversionGuard::new(&mesh, &base, &normals, &options);

        let mut positions = out.mesh.positions();
        for w in &out.warnings {
            let v = w.vertex;
            let (applied, limit) = (w.applied, limits[v.index()]);
            for k in 1..=100 {
                let d = applied + (limit - applied) * k as f64 / 100.0;
                if d.abs() <= applied.abs() + 1e-2 {
                    continue;
                }
                guard.place(&mut positions, v, d);
                assert!(
                    !guard.vertex_ok(&positions, v),
                    "vertex {} applied {:.3} but {:.3} is safe",
                    v.index(),
                    applied,
                    d
                );
            }
            guard.place(&mut positions, v, applied);
        }
    }

    #[test]
    fn test_guard_grows_back_vertex_zeroed_by_neighbour() {
        // Rim vertices bisected while their neighbours still overshoot can
        // end at zero; growth passes must bring them back.
        let mesh = create_slab(6, 6, 6.0, 6.0, 10.0);
        let options = DeformOptions::default().sequential();
        let base = mesh.positions();
        let normals = vertex_normals(&mesh, false);
        let guard = InversionGuard::new(&mesh, &base, &normals, &options);

        let mut targets = vec![0.0; mesh.num_vertices()];
        for i in 0..=6 {
            targets[top_vertex(6, i, 0)] = -5.0;
            targets[top_vertex(6, i, 1)] = -5.0;
        }
        let mut applied = targets.clone();
        let mut positions: Vec<Point3<f64>> = base
            .iter()
            .zip(normals.iter())
            .zip(applied.iter())
            .map(|((p, n), &d)| p + n * d)
            .collect();

        let passes = guard.run(&mut positions, &mut applied, &targets);
        assert!(passes > 0);
        assert!(mesh.face_ids().all(|f| guard.face_ok(&positions, f)));
        for i in 0..=6 {
            let rim = top_vertex(6, i, 0);
            assert!(applied[rim] < -0.1, "rim vertex {} left at {:.3}", i, applied[rim]);
        }
    }

    #[test]
    fn test_open_mesh_rejected() {
        let (vertices, mut faces) = slab_arrays(2, 2, 2.0, 2.0, 1.0);
        faces.pop();
        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        let mapping = map_zones(&mesh, &[], &identity(2.0), &MapOptions::default());
        let err = deform(&mesh, &mapping, &[], &DeformOptions::default()).unwrap_err();
        assert!(err.is_mesh_integrity());
    }

    #[test]
    fn test_mismatched_profiles_rejected() {
        let mesh = create_slab(2, 2, 2.0, 2.0, 1.0);
        let zones = vec![zone(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)])];
        let mapping = map_zones(&mesh, &zones, &identity(2.0), &MapOptions::default());
        let err = deform(&mesh, &mapping, &[], &DeformOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }
}
