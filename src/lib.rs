//! # insole
//!
//! Emboss foot-pressure corrections onto 3D insole meshes.
//!
//! Pressure zones are drawn as polygons over a top-down scan of the foot and
//! exported as COCO annotations. `insole` carries those polygons onto the
//! support surface of an insole mesh, raises or recesses the surface under
//! each zone according to a per-category policy, and writes the result as a
//! watertight STL ready for slicing.
//!
//! ## Pipeline
//!
//! 1. [`annotation`]: validate the COCO record and extract [`PressureZone`]s
//! 2. [`algo::parameterize`] / [`algo::mapping`]: project zones onto vertices
//! 3. [`algo::policy`]: turn zone categories into deformation profiles
//! 4. [`algo::deform`]: displace vertices along their normals
//! 5. [`io`]: export STL or PLY
//!
//! [`pipeline`] strings the stages together; left and right feet run in
//! parallel and fail independently.
//!
//! ## Quick Start
//!
//! ```no_run
//! use insole::prelude::*;
//!
//! let config = CorrectionConfig::from_file("config/reflexology_zones.json").unwrap();
//! let mesh = insole::io::load("Shoe_Sole_UK_8_Left.stl").unwrap();
//! let record = AnnotationRecord::from_file("Left_reflexology_zones.json").unwrap();
//!
//! let output = process_foot(&mesh, &record, &[], &config, &PipelineOptions::default()).unwrap();
//! for w in &output.warnings {
//!     eprintln!("warning: {}", w);
//! }
//! insole::io::save(&output.mesh, "sole_with_pads_left.stl").unwrap();
//! insole::io::save_with_colors(&output.mesh, &output.colors, "sole_with_pads_left.ply").unwrap();
//! ```
//!
//! ## Building Meshes Programmatically
//!
//! ```
//! use insole::prelude::*;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
//!
//! let mesh = build_from_triangles(&vertices, &faces).unwrap();
//! assert!(validate_closed_manifold(&mesh).is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod annotation;
pub mod config;
pub mod error;
pub mod io;
pub mod mesh;
pub mod pipeline;
pub mod polygon;
pub mod warning;

pub use annotation::PressureZone;
pub use error::{Error, Result};
pub use warning::{GeometryWarning, Warning};

/// Prelude module for convenient imports.
///
/// ```
/// use insole::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::deform::{deform, DeformOptions, DeformOutput};
    pub use crate::algo::mapping::{map_zones, MapOptions, SurfaceRegion};
    pub use crate::algo::parameterize::Projection;
    pub use crate::algo::policy::{
        CategoryPolicy, ConflictPolicy, DeformationProfile, Direction, FalloffShape,
    };
    pub use crate::annotation::{load_zones, AnnotationRecord, LoadOptions, PressureZone};
    pub use crate::config::CorrectionConfig;
    pub use crate::error::{Error, MeshIntegrityError, Result, SchemaError};
    pub use crate::mesh::{
        build_from_triangles, validate_closed_manifold, FaceId, HalfEdgeMesh, VertexId,
    };
    pub use crate::pipeline::{process_foot, run_feet, FootJob, FootReport, PipelineOptions};
    pub use crate::warning::{GeometryWarning, Warning};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::Point3;

    #[test]
    fn test_prelude_builds_closed_mesh() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];

        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        assert_eq!(mesh.num_halfedges(), 12);
        assert!(mesh.is_closed());
        assert!(mesh.signed_volume() > 0.0);
        validate_closed_manifold(&mesh).unwrap();
    }
}
