//! Core mesh data structures.
//!
//! The base insole surface is held in a [`HalfEdgeMesh`]: a vertex arena
//! addressed by [`VertexId`] plus half-edge connectivity for O(1) one-ring
//! queries. Vertex normals and triangle adjacency, which the deformer needs
//! for every displaced vertex, come straight from that connectivity.
//!
//! ```
//! use insole::mesh::{build_from_triangles, validate_closed_manifold};
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

mod builder;
mod halfedge;
mod index;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::{build_from_triangles, to_face_vertex, validate_closed_manifold};
pub use halfedge::{Face, HalfEdge, HalfEdgeMesh, Vertex, VertexHalfEdgeIter};
pub use index::{FaceId, HalfEdgeId, VertexId};
