//! Non-fatal conditions reported while processing a foot.
//!
//! Warnings never stop the pipeline. Each one is logged at `warn` level when
//! it is produced and collected into the foot's report.

use std::fmt;

use crate::mesh::VertexId;

/// A vertex whose displacement was reduced, either to keep adjacent triangles
/// from inverting or to stop it short of the opposite surface of the solid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryWarning {
    /// The clamped vertex.
    pub vertex: VertexId,
    /// Displacement the profiles asked for (mm).
    pub requested: f64,
    /// Displacement actually applied (mm).
    pub applied: f64,
}

/// A non-fatal condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A zone covers no eligible vertex of the mesh.
    EmptyRegion {
        /// Zone index in load order.
        zone: usize,
        /// Zone category.
        category: String,
    },

    /// A displacement was clamped by the thickness limit or the inversion
    /// guard.
    Geometry(GeometryWarning),

    /// A zone magnitude fell outside the configured displacement range.
    MagnitudeClamped {
        /// Zone index in load order.
        zone: usize,
        /// Zone category.
        category: String,
        /// Signed magnitude before clamping (mm).
        requested: f64,
        /// Signed magnitude after clamping (mm).
        applied: f64,
    },

    /// A selected zone name does not occur in the annotation record.
    UnknownSelection {
        /// The requested name.
        name: String,
    },
}

impl From<GeometryWarning> for Warning {
    fn from(w: GeometryWarning) -> Self {
        Warning::Geometry(w)
    }
}

impl fmt::Display for GeometryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vertex {} displacement clamped from {:.3} mm to {:.3} mm to keep the sole valid",
            self.vertex.index(),
            self.requested,
            self.applied
        )
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::EmptyRegion { zone, category } => {
                write!(f, "zone {} ({}) covers no surface vertex", zone, category)
            }
            Warning::Geometry(w) => w.fmt(f),
            Warning::MagnitudeClamped {
                zone,
                category,
                requested,
                applied,
            } => write!(
                f,
                "zone {} ({}) magnitude {:.3} mm clamped to {:.3} mm",
                zone, category, requested, applied
            ),
            Warning::UnknownSelection { name } => {
                write!(f, "selected zone '{}' is not in the annotation record", name)
            }
        }
    }
}
