//! Mesh construction and integrity validation.
//!
//! [`build_from_triangles`] turns a face-vertex list (the shape every file
//! format hands us) into a [`HalfEdgeMesh`]. It rejects input the half-edge
//! structure cannot represent: edges with more than two faces and edges
//! whose two faces disagree on winding. Open surfaces are still accepted so
//! callers can inspect them; [`validate_closed_manifold`] is the stricter
//! check the deformer runs before touching any geometry.

use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::{Face, HalfEdge, HalfEdgeMesh};
use super::index::{FaceId, HalfEdgeId, VertexId};
use crate::error::{MeshIntegrityError, Result};

/// Build a half-edge mesh from vertices and triangle faces.
///
/// # Example
/// ```
/// use insole::mesh::build_from_triangles;
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let mesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
/// assert_eq!(mesh.num_faces(), 1);
/// assert!(!mesh.is_closed());
/// ```
pub fn build_from_triangles(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<HalfEdgeMesh> {
    if faces.is_empty() {
        return Err(MeshIntegrityError::EmptyMesh.into());
    }

    for (fi, face) in faces.iter().enumerate() {
        if let Some(&vi) = face.iter().find(|&&vi| vi >= vertices.len()) {
            return Err(MeshIntegrityError::InvalidVertexIndex { face: fi, vertex: vi }.into());
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(MeshIntegrityError::DegenerateFace { face: fi }.into());
        }
    }

    check_edge_incidence(faces)?;

    let mut mesh = HalfEdgeMesh::with_capacity(vertices.len(), faces.len());
    let vertex_ids: Vec<VertexId> = vertices.iter().map(|&p| mesh.add_vertex(p)).collect();

    // Directed edge (from, to) -> half-edge running along it.
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId> = HashMap::with_capacity(faces.len() * 3);

    for (fi, face) in faces.iter().enumerate() {
        let base = mesh.num_halfedges();
        let face_id = FaceId::new(fi);
        mesh.faces.push(Face {
            halfedge: HalfEdgeId::new(base),
        });

        for k in 0..3 {
            let he = HalfEdgeId::new(base + k);
            mesh.halfedges.push(HalfEdge {
                origin: vertex_ids[face[k]],
                twin: HalfEdgeId::invalid(),
                next: HalfEdgeId::new(base + (k + 1) % 3),
                prev: HalfEdgeId::new(base + (k + 2) % 3),
                face: face_id,
            });
            mesh.vertex_mut(vertex_ids[face[k]]).halfedge = he;
            edge_map.insert((face[k], face[(k + 1) % 3]), he);
        }
    }

    // Twins. Unmatched edges get a face-less boundary half-edge.
    let mut directed: Vec<((usize, usize), HalfEdgeId)> =
        edge_map.iter().map(|(&k, &v)| (k, v)).collect();
    directed.sort_unstable_by_key(|&(_, he)| he);
    for ((v0, v1), he) in directed {
        if let Some(&twin) = edge_map.get(&(v1, v0)) {
            mesh.halfedge_mut(he).twin = twin;
        } else {
            let boundary = HalfEdgeId::new(mesh.num_halfedges());
            mesh.halfedges.push(HalfEdge {
                origin: vertex_ids[v1],
                twin: he,
                ..HalfEdge::default()
            });
            mesh.halfedge_mut(he).twin = boundary;
        }
    }

    link_boundary_loops(&mut mesh);
    Ok(mesh)
}

/// Reject edges shared by more than two faces or traversed twice in the
/// same direction.
fn check_edge_incidence(faces: &[[usize; 3]]) -> Result<()> {
    // Undirected edge -> (face count, direction of first use).
    let mut incidence: HashMap<(usize, usize), (usize, bool)> =
        HashMap::with_capacity(faces.len() * 3);

    for face in faces {
        for k in 0..3 {
            let (a, b) = (face[k], face[(k + 1) % 3]);
            let key = (a.min(b), a.max(b));
            let forward = a < b;
            let entry = incidence.entry(key).or_insert((0, forward));
            entry.0 += 1;
            if entry.0 > 2 {
                return Err(MeshIntegrityError::NonManifoldEdge { v0: key.0, v1: key.1 }.into());
            }
            if entry.0 == 2 && entry.1 == forward {
                return Err(MeshIntegrityError::InconsistentOrientation {
                    v0: key.0,
                    v1: key.1,
                }
                .into());
            }
        }
    }

    Ok(())
}

/// Chain boundary half-edges into loops and make boundary vertices point at
/// an outgoing boundary half-edge, so one-ring walks start at the gap.
fn link_boundary_loops(mesh: &mut HalfEdgeMesh) {
    let boundary: Vec<HalfEdgeId> = mesh
        .halfedge_ids()
        .filter(|&he| mesh.is_boundary_halfedge(he))
        .collect();

    let outgoing: HashMap<VertexId, HalfEdgeId> =
        boundary.iter().map(|&he| (mesh.origin(he), he)).collect();

    for &he in &boundary {
        let dest = mesh.dest(he);
        if let Some(&next) = outgoing.get(&dest) {
            mesh.halfedge_mut(he).next = next;
            mesh.halfedge_mut(next).prev = he;
        }
    }

    for (&v, &he) in &outgoing {
        mesh.vertex_mut(v).halfedge = he;
    }
}

/// Check that a mesh is a closed 2-manifold: no boundary edges, every vertex
/// used by at least one face, and the faces around each vertex forming a
/// single fan.
///
/// Edge-level problems (more than two faces, inconsistent winding) are
/// already rejected by [`build_from_triangles`].
pub fn validate_closed_manifold(mesh: &HalfEdgeMesh) -> Result<()> {
    if mesh.num_faces() == 0 {
        return Err(MeshIntegrityError::EmptyMesh.into());
    }

    if let Some(he) = mesh.halfedge_ids().find(|&he| mesh.is_boundary_halfedge(he)) {
        return Err(MeshIntegrityError::BoundaryEdge {
            v0: mesh.origin(he).index(),
            v1: mesh.dest(he).index(),
        }
        .into());
    }

    let mut incident = vec![0usize; mesh.num_vertices()];
    for f in mesh.face_ids() {
        for v in mesh.face_triangle(f) {
            incident[v.index()] += 1;
        }
    }

    for v in mesh.vertex_ids() {
        let expected = incident[v.index()];
        if expected == 0 {
            return Err(MeshIntegrityError::IsolatedVertex { vertex: v.index() }.into());
        }
        // A bow-tie vertex only reaches the faces of one of its fans.
        if mesh.vertex_faces(v).count() != expected {
            return Err(MeshIntegrityError::NonManifoldVertex { vertex: v.index() }.into());
        }
    }

    Ok(())
}

/// Convert a half-edge mesh back to a face-vertex representation.
pub fn to_face_vertex(mesh: &HalfEdgeMesh) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let vertices = mesh.positions();
    let faces = mesh
        .face_ids()
        .map(|f| {
            let [v0, v1, v2] = mesh.face_triangle(f);
            [v0.index(), v1.index(), v2.index()]
        })
        .collect();

    (vertices, faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mesh::fixtures::{create_slab, create_tetrahedron};

    fn integrity(result: Result<HalfEdgeMesh>) -> MeshIntegrityError {
        match result {
            Err(Error::MeshIntegrity(e)) => e,
            other => panic!("expected integrity error, got {:?}", other.map(|m| m.num_faces())),
        }
    }

    #[test]
    fn test_tetrahedron_is_closed() {
        let mesh = create_tetrahedron();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 4);
        assert_eq!(mesh.num_halfedges(), 12);
        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        validate_closed_manifold(&mesh).unwrap();
        assert!(mesh.signed_volume() > 0.0);
    }

    #[test]
    fn test_slab_is_closed() {
        let mesh = create_slab(4, 3, 8.0, 6.0, 2.0);
        assert!(mesh.is_valid());
        validate_closed_manifold(&mesh).unwrap();
        assert!((mesh.signed_volume() - 8.0 * 6.0 * 2.0).abs() < 1e-9);
        for v in mesh.vertex_ids() {
            assert!(mesh.vertex_normal(v).norm() > 0.99);
        }
    }

    #[test]
    fn test_open_mesh_builds_but_fails_validation() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
        ];
        let mesh = build_from_triangles(&vertices, &[[0, 1, 2], [1, 0, 3]]).unwrap();
        // 6 interior half-edges + 4 boundary half-edges
        assert_eq!(mesh.num_halfedges(), 10);
        assert!(mesh.is_valid());

        let err = integrity(validate_closed_manifold(&mesh).map(|_| mesh));
        assert!(matches!(err, MeshIntegrityError::BoundaryEdge { .. }));
    }

    #[test]
    fn test_non_manifold_edge() {
        // Three triangles hinged on edge (0, 1).
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
            Point3::new(0.5, 0.0, 1.0),
        ];
        let faces = vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]];
        let err = integrity(build_from_triangles(&vertices, &faces));
        assert!(matches!(err, MeshIntegrityError::NonManifoldEdge { v0: 0, v1: 1 }));
    }

    #[test]
    fn test_inconsistent_winding() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
        ];
        let err = integrity(build_from_triangles(&vertices, &[[0, 1, 2], [0, 1, 3]]));
        assert!(matches!(err, MeshIntegrityError::InconsistentOrientation { .. }));
    }

    #[test]
    fn test_bowtie_vertex() {
        // Two tetrahedra sharing only vertex 0.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, -1.0),
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 1, 3],
            [1, 2, 3],
            [2, 0, 3],
            [0, 5, 4],
            [0, 4, 6],
            [4, 5, 6],
            [5, 0, 6],
        ];
        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        let err = integrity(validate_closed_manifold(&mesh).map(|_| mesh));
        assert!(matches!(err, MeshIntegrityError::NonManifoldVertex { vertex: 0 }));
    }

    #[test]
    fn test_isolated_vertex() {
        let tet = create_tetrahedron();
        let (mut vertices, faces) = to_face_vertex(&tet);
        vertices.push(Point3::new(5.0, 5.0, 5.0));
        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        let err = integrity(validate_closed_manifold(&mesh).map(|_| mesh));
        assert!(matches!(err, MeshIntegrityError::IsolatedVertex { vertex: 4 }));
    }

    #[test]
    fn test_invalid_and_degenerate_faces() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let err = integrity(build_from_triangles(&vertices, &[[0, 1, 3]]));
        assert!(matches!(err, MeshIntegrityError::InvalidVertexIndex { face: 0, vertex: 3 }));

        let err = integrity(build_from_triangles(&vertices, &[[0, 0, 2]]));
        assert!(matches!(err, MeshIntegrityError::DegenerateFace { face: 0 }));

        let err = integrity(build_from_triangles(&vertices, &[]));
        assert!(matches!(err, MeshIntegrityError::EmptyMesh));
    }

    #[test]
    fn test_roundtrip() {
        let mesh = create_slab(2, 2, 4.0, 4.0, 1.0);
        let (vertices, faces) = to_face_vertex(&mesh);
        let rebuilt = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(rebuilt.num_vertices(), mesh.num_vertices());
        assert_eq!(rebuilt.num_faces(), mesh.num_faces());
        for f in mesh.face_ids() {
            assert_eq!(rebuilt.face_triangle(f), mesh.face_triangle(f));
        }
    }
}
