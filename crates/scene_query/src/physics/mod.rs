//! Shape geometry and exact collision tests

pub mod collision;

pub use collision::{Aabb, Geometry, QueryVolume, TriangleMesh};
