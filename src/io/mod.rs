//! Mesh file I/O.
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | STL | `.stl` | ✓ | ✓ | Binary and ASCII on load, binary on save |
//! | PLY | `.ply` | ✓ | ✓ | ASCII on save, optional per-vertex RGB |
//!
//! Saving never changes geometry or connectivity. If writing fails part-way
//! the partial file is removed, so a failed export leaves nothing behind.
//!
//! ```no_run
//! use insole::io::{load, save};
//!
//! let mesh = load("Shoe_Sole_UK_8_Left.stl").unwrap();
//! save(&mesh, "sole_with_pads_left.stl").unwrap();
//! ```

pub mod ply;
pub mod stl;

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::mesh::HalfEdgeMesh;

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// STL (stereolithography) format.
    Stl,
    /// PLY (Stanford polygon) format.
    Ply,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "stl" => Some(Format::Stl),
            "ply" => Some(Format::Ply),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }
}

fn detect(path: &Path) -> Result<Format> {
    Format::from_path(path).ok_or_else(|| Error::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })
}

/// Load a mesh, choosing the format from the file extension.
pub fn load<P: AsRef<Path>>(path: P) -> Result<HalfEdgeMesh> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Stl => stl::load(path),
        Format::Ply => ply::load(path),
    }
}

/// Save a mesh, choosing the format from the file extension.
pub fn save<P: AsRef<Path>>(mesh: &HalfEdgeMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    let result = match detect(path)? {
        Format::Stl => stl::save(mesh, path),
        Format::Ply => ply::save(mesh, path),
    };
    clean_up_failed(path, result)
}

/// Save a mesh with per-vertex colours. STL has no colour channel, so an
/// STL path gets the plain geometry.
pub fn save_with_colors<P: AsRef<Path>>(
    mesh: &HalfEdgeMesh,
    colors: &[[u8; 3]],
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let result = match detect(path)? {
        Format::Stl => {
            log::debug!("{}: STL carries no colour; writing geometry only", path.display());
            stl::save(mesh, path)
        }
        Format::Ply => ply::save_colored(mesh, colors, path),
    };
    clean_up_failed(path, result)
}

fn clean_up_failed(path: &Path, result: Result<()>) -> Result<()> {
    if result.is_err() && path.is_file() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("could not remove partial output {}: {}", path.display(), e);
        }
    }
    result
}
