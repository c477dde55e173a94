//! Surface parameterization.
//!
//! Pressure zones are drawn on a top-down image of the foot, so the insole
//! surface is parameterized the same way: every vertex gets its XY position as
//! a 2D coordinate ([`planar_projection`]), and a [`Projection`] carries
//! pixel coordinates into that frame.
//!
//! # Example
//!
//! ```no_run
//! use insole::algo::parameterize::{planar_projection, Projection};
//! use nalgebra::Point2;
//!
//! let mesh = insole::io::load("Shoe_Sole_UK_8_Left.stl").unwrap();
//! let uv = planar_projection(&mesh);
//! let projection = Projection::fit_to_mesh(&mesh, 512.0, 1024.0, [0.0, 0.0]).unwrap();
//!
//! let heel = projection.to_parameter(&Point2::new(256.0, 900.0));
//! println!("heel centre at {:?}, {} vertices", heel, uv.len());
//! ```

mod planar;
mod uv;

pub use planar::{planar_projection, Projection};
pub use uv::UVMap;
