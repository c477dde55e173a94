//! PLY (Stanford polygon) format support.
//!
//! PLY output is offered alongside STL for viewers that prefer shared-vertex
//! files. Polygon faces on load are fan-triangulated.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};

use crate::error::{Error, Result};
use crate::mesh::{build_from_triangles, to_face_vertex, HalfEdgeMesh};

/// Load a mesh from a PLY file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<HalfEdgeMesh> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let load_error = |message: &str| Error::LoadError {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| load_error(&e.to_string()))?;

    let vertex_element = ply
        .payload
        .get("vertex")
        .ok_or_else(|| load_error("PLY file has no vertex element"))?;

    let vertices = vertex_element
        .iter()
        .map(|vertex| {
            let coord = |name| get_float_property(vertex, name);
            match (coord("x"), coord("y"), coord("z")) {
                (Some(x), Some(y), Some(z)) => Ok(Point3::new(x, y, z)),
                _ => Err(load_error("vertex missing a coordinate")),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let face_element = ply
        .payload
        .get("face")
        .ok_or_else(|| load_error("PLY file has no face element"))?;

    let mut faces: Vec<[usize; 3]> = Vec::with_capacity(face_element.len());
    for face in face_element {
        let indices = get_list_property(face, "vertex_indices")
            .or_else(|| get_list_property(face, "vertex_index"))
            .ok_or_else(|| load_error("face missing vertex_indices property"))?;

        if indices.len() < 3 {
            return Err(load_error("face has fewer than 3 vertices"));
        }
        for i in 1..indices.len() - 1 {
            faces.push([indices[0], indices[i], indices[i + 1]]);
        }
    }

    build_from_triangles(&vertices, &faces)
}

fn get_float_property(element: &DefaultElement, name: &str) -> Option<f64> {
    match element.get(name)? {
        Property::Float(v) => Some(*v as f64),
        Property::Double(v) => Some(*v),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        Property::Short(v) => Some(*v as f64),
        Property::UShort(v) => Some(*v as f64),
        _ => None,
    }
}

fn get_list_property(element: &DefaultElement, name: &str) -> Option<Vec<usize>> {
    match element.get(name)? {
        Property::ListInt(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUInt(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListShort(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUShort(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUChar(v) => Some(v.iter().map(|&x| x as usize).collect()),
        _ => None,
    }
}

/// Save a mesh to an ASCII PLY file.
///
/// Coordinates are written as doubles so a PLY export loses no precision.
pub fn save<P: AsRef<Path>>(mesh: &HalfEdgeMesh, path: P) -> Result<()> {
    write_ply(mesh, None, path.as_ref())
}

/// Save a mesh with one RGB colour per vertex.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] unless there is exactly one colour per
/// vertex; nothing is written in that case.
pub fn save_colored<P: AsRef<Path>>(
    mesh: &HalfEdgeMesh,
    colors: &[[u8; 3]],
    path: P,
) -> Result<()> {
    if colors.len() != mesh.num_vertices() {
        return Err(Error::invalid_param(
            "colors",
            colors.len(),
            "need exactly one colour per vertex",
        ));
    }
    write_ply(mesh, Some(colors), path.as_ref())
}

fn write_ply(mesh: &HalfEdgeMesh, colors: Option<&[[u8; 3]]>, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    let (vertices, faces) = to_face_vertex(mesh);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "comment Generated by insole")?;
    writeln!(writer, "element vertex {}", vertices.len())?;
    writeln!(writer, "property double x")?;
    writeln!(writer, "property double y")?;
    writeln!(writer, "property double z")?;
    if colors.is_some() {
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
    }
    writeln!(writer, "element face {}", faces.len())?;
    writeln!(writer, "property list uchar int vertex_indices")?;
    writeln!(writer, "end_header")?;

    for (i, v) in vertices.iter().enumerate() {
        match colors {
            Some(colors) => {
                let [r, g, b] = colors[i];
                writeln!(writer, "{} {} {} {} {} {}", v.x, v.y, v.z, r, g, b)?;
            }
            None => writeln!(writer, "{} {} {}", v.x, v.y, v.z)?,
        }
    }
    for f in &faces {
        writeln!(writer, "3 {} {} {}", f[0], f[1], f[2])?;
    }

    writer.flush()?;
    Ok(())
}
