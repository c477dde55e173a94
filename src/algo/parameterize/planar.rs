//! Top-down planar parameterization and the pixel-to-parameter transform.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mesh::HalfEdgeMesh;
use crate::polygon::Polygon;

use super::UVMap;

/// Parameterize a mesh by orthographic projection onto the XY plane.
///
/// Each vertex gets `(x, y)` of its position. The top and bottom surface of a
/// closed insole share coordinates; callers separate them by normal direction.
pub fn planar_projection(mesh: &HalfEdgeMesh) -> UVMap {
    UVMap::new(
        mesh.vertex_ids()
            .map(|v| {
                let p = mesh.position(v);
                Point2::new(p.x, p.y)
            })
            .collect(),
    )
}

fn default_flip_y() -> bool {
    true
}

/// Affine map from annotation image pixels to mesh parameter space.
///
/// ```text
/// u = origin.x + px * scale.x
/// v = origin.y + (image_height - py) * scale.y    (flip_y)
/// v = origin.y + py * scale.y                      (!flip_y)
/// ```
///
/// Image rows grow downwards while mesh Y grows towards the toes, hence the
/// flip by default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Annotation image width in pixels.
    pub image_width: f64,
    /// Annotation image height in pixels.
    pub image_height: f64,
    /// Parameter-space position of pixel `(0, image_height)` (or `(0, 0)` without flip).
    pub origin: [f64; 2],
    /// Millimetres per pixel along each axis.
    pub scale: [f64; 2],
    /// Flip the image Y axis.
    #[serde(default = "default_flip_y")]
    pub flip_y: bool,
}

impl Projection {
    /// Stretch the image over a parameter-space bounding box.
    ///
    /// `scale = extent / image size` and `origin = min + offset`.
    pub fn fit_to_bounds(
        min: Point2<f64>,
        max: Point2<f64>,
        image_width: f64,
        image_height: f64,
        offset: [f64; 2],
    ) -> Result<Self> {
        let projection = Self {
            image_width,
            image_height,
            origin: [min.x + offset[0], min.y + offset[1]],
            scale: [(max.x - min.x) / image_width, (max.y - min.y) / image_height],
            flip_y: true,
        };
        projection.validate()?;
        Ok(projection)
    }

    /// [`fit_to_bounds`](Self::fit_to_bounds) over the XY extent of a mesh.
    pub fn fit_to_mesh(
        mesh: &HalfEdgeMesh,
        image_width: f64,
        image_height: f64,
        offset: [f64; 2],
    ) -> Result<Self> {
        let (min, max) = mesh.bounding_box().ok_or_else(|| {
            Error::invalid_param("mesh", "empty", "cannot fit a projection to an empty mesh")
        })?;
        Self::fit_to_bounds(
            Point2::new(min.x, min.y),
            Point2::new(max.x, max.y),
            image_width,
            image_height,
            offset,
        )
    }

    /// Check that the transform is finite and invertible.
    pub fn validate(&self) -> Result<()> {
        if !(self.image_width.is_finite() && self.image_width > 0.0) {
            return Err(Error::invalid_param(
                "projection.image_width",
                self.image_width,
                "must be positive",
            ));
        }
        if !(self.image_height.is_finite() && self.image_height > 0.0) {
            return Err(Error::invalid_param(
                "projection.image_height",
                self.image_height,
                "must be positive",
            ));
        }
        if !self.origin.iter().all(|o| o.is_finite()) {
            return Err(Error::invalid_param(
                "projection.origin",
                format!("{:?}", self.origin),
                "must be finite",
            ));
        }
        if !self.scale.iter().all(|s| s.is_finite() && *s != 0.0) {
            return Err(Error::invalid_param(
                "projection.scale",
                format!("{:?}", self.scale),
                "must be finite and non-zero",
            ));
        }
        Ok(())
    }

    /// Map a pixel coordinate into parameter space.
    pub fn to_parameter(&self, px: &Point2<f64>) -> Point2<f64> {
        let row = if self.flip_y { self.image_height - px.y } else { px.y };
        Point2::new(
            self.origin[0] + px.x * self.scale[0],
            self.origin[1] + row * self.scale[1],
        )
    }

    /// Map every point of an image-space polygon into parameter space.
    pub fn polygon_to_parameter(&self, polygon: &Polygon) -> Polygon {
        polygon.map(|p| self.to_parameter(p))
    }
}
