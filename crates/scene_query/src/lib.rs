//! # Scene Query
//!
//! Broad-phase pruning and scene queries for rigid-body scenes.
//!
//! ## Features
//!
//! - **Pruners**: flat list, static and dynamic AABB trees, loose octree and quadtree
//! - **Queries**: raycast (any, closest, all), sweep, overlap and frustum cull
//! - **Filtering**: word masks, client ownership and pre/post filter callbacks
//! - **Batching**: recorded queries executed together with filter shaders
//! - **Sweep caches**: reusable broad-phase candidate sets
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_query::prelude::*;
//!
//! fn main() -> Result<(), SceneQueryError> {
//!     let mut scene = SceneQueryManager::new(SceneQueryConfig::default())?;
//!     let crate_box = ShapeDesc::new(Geometry::cuboid(Vec3::repeat(0.5)), Pose::from_position(Vec3::new(5.0, 0.0, 0.0)));
//!     let handle = scene.add_shape(crate_box)?;
//!
//!     let hit = scene.raycast_single(&Vec3::zeros(), &Vec3::x(), 100.0, &QueryFilterData::default(), None)?;
//!     assert_eq!(hit.map(|h| h.shape), Some(handle));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod error;
pub mod foundation;
pub mod physics;
pub mod query;
pub mod spatial;

pub use error::{Result, SceneQueryError};

/// Common imports for scene query users
pub mod prelude {
    pub use crate::{
        config::{Config, PruningStructure, SceneQueryConfig},
        error::SceneQueryError,
        foundation::math::{Pose, Quat, Vec3},
        physics::collision::{Aabb, Capsule, Geometry, Obb, Plane, QueryVolume, Sphere, TriangleMesh},
        query::{
            BatchQuery, BatchQueryDesc, FilterData, HitBuffer, HitType, QueryFilter, QueryFilterData,
            QueryFilterFlags, QueryHit, QueryMode, SceneQueryManager, ShapeDesc, ShapeHandle, SweepDesc,
        },
    };
}
