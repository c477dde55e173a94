//! Index types for mesh elements.
//!
//! Vertices, half-edges and faces live in flat arenas inside
//! [`HalfEdgeMesh`](super::HalfEdgeMesh) and are addressed by these typed
//! wrappers. Ids are stable for the lifetime of a mesh: deformation only ever
//! produces new positions for the same ids, never new ids.

use std::fmt::{self, Debug};

/// Sentinel raw value for an unset id.
const INVALID: u32 = u32::MAX;

/// A type-safe vertex index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VertexId(u32);

/// A type-safe half-edge index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct HalfEdgeId(u32);

/// A type-safe face index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FaceId(u32);

macro_rules! impl_index_type {
    ($name:ident, $display:literal) => {
        impl $name {
            /// Create an index from a raw arena position.
            #[inline]
            pub fn new(index: usize) -> Self {
                debug_assert!(index < INVALID as usize, "index {} out of range", index);
                Self(index as u32)
            }

            /// Create an unset index.
            #[inline]
            pub fn invalid() -> Self {
                Self(INVALID)
            }

            /// Position of the element in its arena.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Whether this index refers to an element.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0 != INVALID
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $display, self.0)
                } else {
                    write!(f, "{}(INVALID)", $display)
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }
    };
}

impl_index_type!(VertexId, "V");
impl_index_type!(HalfEdgeId, "HE");
impl_index_type!(FaceId, "F");
