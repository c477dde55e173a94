//! Surface mapping: pressure zones onto mesh vertices.
//!
//! Each zone polygon is carried from image pixels into parameter space with a
//! [`Projection`] and tested against the planar coordinate of every eligible
//! vertex. Eligible means the vertex faces up: the top of an insole and its
//! underside share XY coordinates, and only the top carries the foot.
//!
//! # Example
//!
//! ```no_run
//! use insole::algo::mapping::{map_zones, MapOptions};
//! use insole::algo::parameterize::Projection;
//! use insole::annotation::{load_zones, AnnotationRecord, LoadOptions};
//!
//! let record = AnnotationRecord::from_file("Left_reflexology_zones.json").unwrap();
//! let zone_set = load_zones(&record, &LoadOptions::new(["heel"])).unwrap();
//! let mesh = insole::io::load("Shoe_Sole_UK_8_Left.stl").unwrap();
//! let (width, height) = (zone_set.image_width, zone_set.image_height);
//! let projection = Projection::fit_to_mesh(&mesh, width, height, [0.0, 0.0]).unwrap();
//!
//! let mapping = map_zones(&mesh, &zone_set.zones, &projection, &MapOptions::default());
//! for region in &mapping.regions {
//!     println!("{}: {} vertices", region.category, region.len());
//! }
//! ```

use nalgebra::Point2;
use rayon::prelude::*;

use crate::annotation::PressureZone;
use crate::mesh::{HalfEdgeMesh, VertexId};
use crate::polygon::Polygon;
use crate::warning::Warning;

use super::parameterize::{planar_projection, Projection, UVMap};

/// Options for zone mapping.
#[derive(Debug, Clone)]
pub struct MapOptions {
    /// A vertex is eligible when its normal's Z component exceeds this.
    pub min_facing: f64,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            min_facing: 0.0,
            parallel: true,
        }
    }
}

impl MapOptions {
    /// Set the facing threshold.
    pub fn with_min_facing(mut self, min_facing: f64) -> Self {
        self.min_facing = min_facing;
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

/// A vertex inside a region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionVertex {
    /// The vertex.
    pub vertex: VertexId,
    /// Its parameter-space coordinate.
    pub param: Point2<f64>,
    /// Distance from the coordinate to the polygon boundary (mm).
    pub depth: f64,
}

/// A pressure zone resolved onto the mesh.
#[derive(Debug, Clone)]
pub struct SurfaceRegion {
    /// Zone index in load order.
    pub zone: usize,
    /// Zone category.
    pub category: String,
    /// The zone polygon in parameter space.
    pub polygon: Polygon,
    /// Parameter-space centroid of the polygon.
    pub centroid: Point2<f64>,
    /// Vertices under the zone, sorted by id.
    pub vertices: Vec<RegionVertex>,
    /// Parameter-space area of the polygon (mm²).
    pub area: f64,
    /// Surface area represented by the region's vertices, projected onto
    /// the parameter plane (mm²).
    pub sampled_area: f64,
}

impl SurfaceRegion {
    /// Number of vertices in the region.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the zone covers no vertex.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Whether a vertex lies under the zone.
    pub fn contains(&self, v: VertexId) -> bool {
        self.vertex(v).is_some()
    }

    /// The region entry of a vertex, if it lies under the zone.
    pub fn vertex(&self, v: VertexId) -> Option<&RegionVertex> {
        self.vertices
            .binary_search_by_key(&v.index(), |rv| rv.vertex.index())
            .ok()
            .map(|i| &self.vertices[i])
    }

    /// Parameter-space distance from `p` to the region; 0 inside.
    pub fn distance(&self, p: &Point2<f64>) -> f64 {
        self.polygon.distance(p)
    }

    /// How well the mesh samples the zone: sampled area over polygon area.
    ///
    /// Close to 1 when the mesh is fine compared to the zone, well below 1
    /// when the zone falls between vertices. Vertices on the boundary count
    /// in full, so a coarse mesh can also overshoot.
    pub fn coverage(&self) -> f64 {
        if self.area > 0.0 {
            self.sampled_area / self.area
        } else {
            0.0
        }
    }
}

/// Everything the deformer needs from the mapping stage.
#[derive(Debug, Clone)]
pub struct SurfaceMapping {
    /// Planar coordinate of every vertex.
    pub uv: UVMap,
    /// Foot-support flag per vertex.
    pub eligible: Vec<bool>,
    /// One region per zone, in zone order.
    pub regions: Vec<SurfaceRegion>,
    /// Empty-region warnings.
    pub warnings: Vec<Warning>,
}

impl SurfaceMapping {
    /// Whether a vertex is on the foot-support surface.
    #[inline]
    pub fn is_eligible(&self, v: VertexId) -> bool {
        self.eligible[v.index()]
    }

    /// Number of eligible vertices.
    pub fn num_eligible(&self) -> usize {
        self.eligible.iter().filter(|&&e| e).count()
    }
}

/// Flag vertices whose normal points up by more than `min_facing`.
pub fn eligible_vertices(mesh: &HalfEdgeMesh, min_facing: f64) -> Vec<bool> {
    mesh.vertex_ids()
        .map(|v| mesh.vertex_normal(v).z > min_facing)
        .collect()
}

/// Share of the projected surface area around each vertex: a third of the
/// parameter-plane area of every incident face.
pub fn vertex_areas(mesh: &HalfEdgeMesh, uv: &UVMap) -> Vec<f64> {
    let mut areas = vec![0.0; mesh.num_vertices()];
    for f in mesh.face_ids() {
        let [a, b, c] = mesh.face_triangle(f).map(|v| uv.get(v));
        let area = 0.5 * ((b - a).perp(&(c - a))).abs();
        for v in mesh.face_triangle(f) {
            areas[v.index()] += area / 3.0;
        }
    }
    areas
}

/// Resolve one zone onto the mesh.
pub fn map_zone(
    index: usize,
    zone: &PressureZone,
    uv: &UVMap,
    eligible: &[bool],
    vertex_areas: &[f64],
    projection: &Projection,
) -> SurfaceRegion {
    let polygon = projection.polygon_to_parameter(&zone.polygon);
    let centroid = polygon.centroid();

    let vertices = match polygon.bounding_box() {
        Some((min, max)) => uv
            .iter()
            .filter(|(v, _)| eligible[v.index()])
            .filter(|(_, p)| p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y)
            .filter(|(_, p)| polygon.contains(p))
            .map(|(vertex, param)| RegionVertex {
                vertex,
                param,
                depth: polygon.boundary_distance(&param),
            })
            .collect(),
        None => Vec::new(),
    };

    let area = polygon.area();
    let sampled_area = vertices.iter().map(|rv| vertex_areas[rv.vertex.index()]).sum();

    SurfaceRegion {
        zone: index,
        category: zone.category.clone(),
        polygon,
        centroid,
        vertices,
        area,
        sampled_area,
    }
}

/// Map every zone onto the mesh.
///
/// Zones are independent; with `parallel` they are mapped concurrently. The
/// region order always matches the zone order.
pub fn map_zones(
    mesh: &HalfEdgeMesh,
    zones: &[PressureZone],
    projection: &Projection,
    options: &MapOptions,
) -> SurfaceMapping {
    let uv = planar_projection(mesh);
    let eligible = eligible_vertices(mesh, options.min_facing);
    let areas = vertex_areas(mesh, &uv);

    let map_one =
        |(i, zone): (usize, &PressureZone)| map_zone(i, zone, &uv, &eligible, &areas, projection);
    let regions: Vec<SurfaceRegion> = if options.parallel {
        zones.par_iter().enumerate().map(map_one).collect()
    } else {
        zones.iter().enumerate().map(map_one).collect()
    };

    let mut warnings = Vec::new();
    for region in &regions {
        if region.is_empty() {
            let warning = Warning::EmptyRegion {
                zone: region.zone,
                category: region.category.clone(),
            };
            log::warn!("{}", warning);
            warnings.push(warning);
        } else {
            log::debug!(
                "zone {} ({}): {} vertices, coverage {:.2}",
                region.zone,
                region.category,
                region.len(),
                region.coverage()
            );
        }
    }

    SurfaceMapping {
        uv,
        eligible,
        regions,
        warnings,
    }
}
