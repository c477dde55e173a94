//! Per-vertex parameter coordinates.
//!
//! This module provides the [`UVMap`] type for storing the 2D coordinate each
//! mesh vertex has in the annotation frame.

use nalgebra::Point2;

use crate::mesh::VertexId;

/// 2D parameter coordinates for mesh vertices.
///
/// Index `i` holds the coordinate of vertex `i`. Coordinates are in mesh
/// units (millimetres), not normalized to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct UVMap {
    coords: Vec<Point2<f64>>,
}

impl UVMap {
    /// Create a map from coordinates indexed by vertex id.
    pub fn new(coords: Vec<Point2<f64>>) -> Self {
        Self { coords }
    }

    /// Coordinate of a vertex.
    #[inline]
    pub fn get(&self, v: VertexId) -> Point2<f64> {
        self.coords[v.index()]
    }

    /// Number of coordinates.
    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Iterate over all coordinates with their vertex ids.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, Point2<f64>)> + '_ {
        self.coords
            .iter()
            .enumerate()
            .map(|(i, &uv)| (VertexId::new(i), uv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uv_map_basic() {
        let uv_map = UVMap::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.5, 1.0),
        ]);

        assert_eq!(uv_map.len(), 3);
        assert!(!uv_map.is_empty());
        assert_eq!(uv_map.get(VertexId::new(2)), Point2::new(0.5, 1.0));
        assert_eq!(uv_map.iter().count(), 3);
    }
}
