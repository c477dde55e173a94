//! Closed test meshes shared by unit tests across the crate.

use nalgebra::Point3;

use super::{build_from_triangles, HalfEdgeMesh};

/// Regular tetrahedron-ish closed mesh with outward winding.
pub(crate) fn create_tetrahedron() -> HalfEdgeMesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.5, 1.0, 0.0),
        Point3::new(0.5, 0.5, 1.0),
    ];
    let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Face-vertex lists for a closed box whose top (z = `thickness`) and bottom
/// (z = 0) are `nx` x `ny` triangulated grids spanning `width` x `depth`.
pub(crate) fn slab_arrays(
    nx: usize,
    ny: usize,
    width: f64,
    depth: f64,
    thickness: f64,
) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let dx = width / nx as f64;
    let dy = depth / ny as f64;
    let layer = (nx + 1) * (ny + 1);
    let idx = |i: usize, j: usize| j * (nx + 1) + i;

    let mut vertices = Vec::with_capacity(2 * layer);
    for z in [thickness, 0.0] {
        for j in 0..=ny {
            for i in 0..=nx {
                vertices.push(Point3::new(i as f64 * dx, j as f64 * dy, z));
            }
        }
    }

    let mut faces = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            let (v00, v10, v01, v11) = (idx(i, j), idx(i + 1, j), idx(i, j + 1), idx(i + 1, j + 1));
            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
            faces.push([layer + v00, layer + v11, layer + v10]);
            faces.push([layer + v00, layer + v01, layer + v11]);
        }
    }

    // Counter-clockwise ring around the grid border, seen from above.
    let mut ring = Vec::new();
    ring.extend((0..nx).map(|i| idx(i, 0)));
    ring.extend((0..ny).map(|j| idx(nx, j)));
    ring.extend((1..=nx).rev().map(|i| idx(i, ny)));
    ring.extend((1..=ny).rev().map(|j| idx(0, j)));

    for k in 0..ring.len() {
        let (ta, tb) = (ring[k], ring[(k + 1) % ring.len()]);
        let (ba, bb) = (layer + ta, layer + tb);
        faces.push([ba, bb, tb]);
        faces.push([ba, tb, ta]);
    }

    (vertices, faces)
}

/// Closed box mesh; see [`slab_arrays`].
pub(crate) fn create_slab(
    nx: usize,
    ny: usize,
    width: f64,
    depth: f64,
    thickness: f64,
) -> HalfEdgeMesh {
    let (vertices, faces) = slab_arrays(nx, ny, width, depth, thickness);
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Index of the top-surface vertex at grid position (`i`, `j`).
pub(crate) fn top_vertex(nx: usize, i: usize, j: usize) -> usize {
    j * (nx + 1) + i
}
