//! STL (stereolithography) format support.
//!
//! STL is what slicers consume, so it is the default export format. Files
//! are written as binary STL with one facet normal per triangle computed
//! from the current (deformed) positions.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::mesh::{build_from_triangles, to_face_vertex, HalfEdgeMesh};

/// Load a mesh from an STL file (binary or ASCII).
///
/// `stl_io` merges coincident corners into shared vertices; triangles that
/// collapse after merging are dropped.
pub fn load<P: AsRef<Path>>(path: P) -> Result<HalfEdgeMesh> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);

    let stl = stl_io::read_stl(&mut reader).map_err(|e| Error::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let vertices: Vec<Point3<f64>> = stl
        .vertices
        .iter()
        .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect();

    let faces: Vec<[usize; 3]> = stl
        .faces
        .iter()
        .map(|tri| tri.vertices)
        .filter(|[i0, i1, i2]| i0 != i1 && i1 != i2 && i0 != i2)
        .collect();

    let dropped = stl.faces.len() - faces.len();
    if dropped > 0 {
        log::warn!("{}: dropped {} degenerate triangles", path.display(), dropped);
    }

    if faces.is_empty() {
        return Err(Error::LoadError {
            path: path.to_path_buf(),
            message: "STL file contains no valid triangles".to_string(),
        });
    }

    build_from_triangles(&vertices, &faces)
}

/// Save a mesh to a binary STL file.
pub fn save<P: AsRef<Path>>(mesh: &HalfEdgeMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);

    let (vertices, faces) = to_face_vertex(mesh);

    let triangles: Vec<stl_io::Triangle> = faces
        .iter()
        .map(|f| {
            let [p0, p1, p2] = [vertices[f[0]], vertices[f[1]], vertices[f[2]]];
            let n = (p1 - p0)
                .cross(&(p2 - p0))
                .try_normalize(1e-300)
                .unwrap_or_else(nalgebra::Vector3::zeros);

            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [to_stl_vertex(&p0), to_stl_vertex(&p1), to_stl_vertex(&p2)],
            }
        })
        .collect();

    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| Error::SaveError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    writer.flush()?;

    Ok(())
}

fn to_stl_vertex(p: &Point3<f64>) -> stl_io::Vertex {
    stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::create_slab;
    use crate::mesh::validate_closed_manifold;
    use approx::assert_relative_eq;

    #[test]
    fn test_roundtrip_preserves_topology_and_positions() {
        let mesh = create_slab(5, 4, 10.0, 8.0, 3.0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slab.stl");

        save(&mesh, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.num_vertices(), mesh.num_vertices());
        assert_eq!(loaded.num_faces(), mesh.num_faces());
        validate_closed_manifold(&loaded).unwrap();

        // stl_io may reorder shared vertices; compare through triangles.
        for f in mesh.face_ids() {
            let original = mesh.face_positions(f);
            let reloaded = loaded.face_positions(f);
            for (a, b) in original.iter().zip(reloaded.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path().join("nope.stl")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_load_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.stl");
        std::fs::write(&path, b"solid nothing here\nthis is not an stl\n").unwrap();
        assert!(load(&path).is_err());
    }
}
