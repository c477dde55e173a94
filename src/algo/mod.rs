//! Pressure-zone correction algorithms.
//!
//! The stages run in this order for each foot:
//!
//! - **Parameterization** ([`parameterize`]): planar coordinates for every
//!   vertex and the pixel-to-mesh [`Projection`](parameterize::Projection)
//! - **Mapping** ([`mapping`]): zone polygons to vertex regions
//! - **Policy** ([`policy`]): zone categories to deformation profiles
//! - **Deformation** ([`deform`]): profiles applied to the mesh, limited by
//!   the sole thickness ([`raycast`]) and an inversion guard

pub mod deform;
pub mod mapping;
pub mod parameterize;
pub mod policy;
mod progress;
pub mod raycast;

pub use progress::Progress;
