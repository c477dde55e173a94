//! Error types for insole.
//!
//! Structural failures are split by the stage that detects them:
//! [`SchemaError`] for annotation records and [`MeshIntegrityError`] for base
//! meshes. Both abort processing of the affected foot only. Non-fatal
//! conditions are not errors; see [`crate::Warning`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building an insole.
#[derive(Error, Debug)]
pub enum Error {
    /// The annotation record is malformed or uses an unrecognized category.
    #[error("annotation schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The base mesh is not a closed 2-manifold triangle mesh.
    #[error("mesh integrity error: {0}")]
    MeshIntegrity(#[from] MeshIntegrityError),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error loading a file.
    #[error("failed to load {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving a file.
    #[error("failed to save {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported mesh file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl Error {
    /// Create an invalid parameter error.
    pub fn invalid_param<N: Into<String>, T: std::fmt::Display>(
        name: N,
        value: T,
        reason: &'static str,
    ) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason,
        }
    }

    /// Returns `true` if this error was raised by annotation validation.
    pub fn is_schema(&self) -> bool {
        matches!(self, Error::Schema(_))
    }

    /// Returns `true` if this error was raised by mesh validation.
    pub fn is_mesh_integrity(&self) -> bool {
        matches!(self, Error::MeshIntegrity(_))
    }
}

/// Annotation record validation failures.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The record is not valid COCO JSON.
    #[error("malformed annotation record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The record has no image entry, so pixel coordinates have no frame.
    #[error("annotation record has no image entry")]
    MissingImage,

    /// The image entry has a zero or negative size.
    #[error("image has invalid size {width}x{height}")]
    InvalidImageSize {
        /// Image width in pixels.
        width: f64,
        /// Image height in pixels.
        height: f64,
    },

    /// A segmentation list has an odd number of coordinates.
    #[error("annotation {annotation}: segmentation has odd coordinate count {count}")]
    OddCoordinateCount {
        /// Annotation id.
        annotation: u64,
        /// Number of coordinates found.
        count: usize,
    },

    /// A coordinate is NaN or infinite.
    #[error("annotation {annotation}: polygon has a non-finite coordinate")]
    NonFiniteCoordinate {
        /// Annotation id.
        annotation: u64,
    },

    /// A polygon has fewer than three distinct points.
    #[error("annotation {annotation}: polygon has {points} distinct points, need at least 3")]
    TooFewPoints {
        /// Annotation id.
        annotation: u64,
        /// Number of distinct points.
        points: usize,
    },

    /// A polygon crosses, touches or doubles back over itself.
    #[error("annotation {annotation}: polygon is self-intersecting")]
    SelfIntersecting {
        /// Annotation id.
        annotation: u64,
    },

    /// An annotation references a category id the record does not declare.
    #[error("annotation {annotation}: unknown category id {category_id}")]
    UnknownCategoryId {
        /// Annotation id.
        annotation: u64,
        /// The referenced category id.
        category_id: u64,
    },

    /// A category is not part of the correction vocabulary.
    #[error("annotation {annotation}: unrecognized category '{name}'")]
    UnrecognizedCategory {
        /// Annotation id.
        annotation: u64,
        /// The category name.
        name: String,
    },

    /// An intensity attribute is negative or not finite.
    #[error("annotation {annotation}: invalid intensity {value}")]
    InvalidIntensity {
        /// Annotation id.
        annotation: u64,
        /// The offending value.
        value: f64,
    },

    /// A zone selection was given but none of it matched the record.
    #[error("none of the selected zones matched known categories: {}", selected.join(", "))]
    NoSelectedZones {
        /// The requested zone names.
        selected: Vec<String>,
    },
}

/// Base mesh validation failures.
#[derive(Error, Debug)]
pub enum MeshIntegrityError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has duplicate vertex indices.
    #[error("face {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// An edge has more than two incident faces.
    #[error("edge ({v0}, {v1}) has more than two incident faces")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// Two faces traverse a shared edge in the same direction.
    #[error("edge ({v0}, {v1}) is shared by faces with inconsistent winding")]
    InconsistentOrientation {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// An edge has only one incident face, so the surface is open.
    #[error("edge ({v0}, {v1}) lies on a boundary; mesh is not closed")]
    BoundaryEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// The faces around a vertex form more than one fan.
    #[error("vertex {vertex} is non-manifold")]
    NonManifoldVertex {
        /// The vertex index.
        vertex: usize,
    },

    /// A vertex is not referenced by any face.
    #[error("vertex {vertex} is not referenced by any face")]
    IsolatedVertex {
        /// The vertex index.
        vertex: usize,
    },
}
