//! Narrow-phase geometry for scene queries
//!
//! Shapes are stored in local space and placed with a [`Pose`] only when a
//! query runs. The broad phase (see [`crate::spatial`]) hands candidate
//! shapes to the exact tests in this module.
//!
//! # Module Organization
//!
//! - [`bounds`] - Axis-aligned boxes
//! - [`primitives`] - Spheres, capsules, oriented boxes, planes, triangles
//! - [`intersection`] - Ray/box SAT kernels, plane culling, box overlap tests
//! - [`distance`] - Closest-point queries between primitives
//! - [`mesh`] - Indexed triangle meshes with their own AABB tree
//! - [`ray_collider`] - Configurable ray queries against meshes
//! - [`shape`] - Local-space shape geometry
//! - [`raycast`], [`overlap`], [`sweep`] - Exact query tests per geometry
//!
//! [`Pose`]: crate::foundation::math::Pose

pub mod bounds;
pub mod distance;
pub mod intersection;
pub mod mesh;
pub mod overlap;
pub mod primitives;
pub mod ray_collider;
pub mod raycast;
pub mod shape;
pub mod sweep;

pub use bounds::Aabb;
pub use mesh::{MeshIndices, TriangleMesh};
pub use overlap::{overlap_geometry, QueryVolume};
pub use primitives::{Capsule, Obb, Plane, Sphere, Triangle};
pub use ray_collider::{CollisionFace, MeshRayCollider};
pub use raycast::{raycast_geometry, GeometryHit, RaycastOptions};
pub use shape::Geometry;
pub use sweep::{sweep_geometry, SweepContact, SweepOptions};
