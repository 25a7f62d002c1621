//! Scene queries over pruned shapes
//!
//! [`SceneQueryManager`] is the entry point. It owns the static and
//! dynamic pruners, registers [`SceneShape`]s with them and answers
//! raycast, sweep, overlap and cull queries. Results are filtered in two
//! phases (see [`filtering`]) and classified as blocking or touching hits.
//!
//! # Module Organization
//!
//! - [`scene_shape`]: shape records, handles and registration parameters
//! - [`filtering`]: filter data, flags, callbacks and batch shaders
//! - [`hits`]: hit records and hit buffers
//! - [`manager`]: registration, pose updates, cull and statistics
//! - [`raycast`], [`overlap`], [`sweep`]: the query entry points
//! - [`sweep_cache`]: broad-phase caches for repeated sweeps
//! - [`batch`]: recorded queries executed together

pub mod batch;
mod buffers;
pub mod filtering;
pub mod hits;
pub mod manager;
pub mod overlap;
pub mod raycast;
pub mod scene_shape;
pub mod sweep;
pub mod sweep_cache;

pub use batch::{BatchQuery, BatchQueryDesc, BatchResult, BatchResults};
pub use filtering::{
    FilterData, HitType, PostFilterShader, PreFilterShader, QueryFilter, QueryFilterData, QueryFilterFlags,
};
pub use hits::{HitBuffer, HitFlags, OverlapHit, QueryHit, QueryMode, QueryStatus};
pub use manager::{SceneQueryManager, SceneQueryStats, MAX_CULL_PLANES};
pub use scene_shape::{ClientId, SceneShape, ShapeDesc, ShapeHandle};
pub use sweep::SweepDesc;
pub use sweep_cache::{CacheState, ObjectCache, SweepCacheKey};
