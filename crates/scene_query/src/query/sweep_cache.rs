//! Broad-phase candidate cache for repeated sweeps
//!
//! A cache remembers which shapes overlap a volume around a sweep. As
//! long as later sweeps stay inside that volume and neither pruner
//! changed, the remembered candidates stand in for a fresh broad-phase
//! query. Candidates are a superset of what an uncached query would
//! find; the exact sweep test drops the extras.

use slotmap::new_key_type;

use crate::foundation::math::Vec3;
use crate::physics::collision::bounds::Aabb;
use crate::physics::collision::overlap::{overlap_geometry, QueryVolume};
use crate::physics::collision::primitives::Obb;
use crate::spatial::pruner::{Pruner, Signature};
use crate::spatial::pruning_pool::{PoolIndex, Prunable};
use super::scene_shape::SceneShape;

new_key_type! {
    /// Key of a sweep cache owned by a scene query manager
    pub struct SweepCacheKey;
}

/// What a cache lookup found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheState {
    /// Candidates reused as they were
    Valid,
    /// Static pruner changed; everything was recomputed
    StaticStale,
    /// Only the dynamic candidates were recomputed
    DynamicStale,
    /// The query left the cached volume; a new volume was built
    VolumeExceeded,
}

/// Pruner version a candidate list was built against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PrunerStamp {
    pub(crate) signature: Signature,
    /// Counts pose updates, which leave signatures alone
    pub(crate) motion: u32,
}

impl PrunerStamp {
    pub(crate) fn invalid() -> Self {
        Self { signature: Signature::invalid(), motion: 0 }
    }
}

/// Cached broad-phase candidates for a region
#[derive(Debug, Clone)]
pub struct ObjectCache {
    volume: Option<Aabb>,
    explicit: bool,
    dimensions: Vec3,
    static_stamp: PrunerStamp,
    dynamic_stamp: PrunerStamp,
    static_candidates: Vec<PoolIndex>,
    dynamic_candidates: Vec<PoolIndex>,
    last_state: Option<CacheState>,
}

impl ObjectCache {
    /// Empty cache whose implicit volumes reach `dimensions` past each query
    pub(crate) fn new(dimensions: Vec3) -> Self {
        Self {
            volume: None,
            explicit: false,
            dimensions: dimensions.abs(),
            static_stamp: PrunerStamp::invalid(),
            dynamic_stamp: PrunerStamp::invalid(),
            static_candidates: Vec::new(),
            dynamic_candidates: Vec::new(),
            last_state: None,
        }
    }

    /// Pin the cached region; queries leaving it skip the cache
    pub(crate) fn set_volume(&mut self, volume: Aabb) {
        self.volume = Some(volume);
        self.explicit = true;
        self.static_stamp = PrunerStamp::invalid();
        self.dynamic_stamp = PrunerStamp::invalid();
    }

    /// Region the candidates cover
    pub fn volume(&self) -> Option<&Aabb> {
        self.volume.as_ref()
    }

    /// Whether the region was set by the caller
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Outcome of the most recent lookup
    pub fn last_state(&self) -> Option<CacheState> {
        self.last_state
    }

    /// Number of cached candidates across both pruners
    pub fn candidate_count(&self) -> usize {
        self.static_candidates.len() + self.dynamic_candidates.len()
    }

    pub(crate) fn static_candidates(&self) -> &[PoolIndex] {
        &self.static_candidates
    }

    pub(crate) fn dynamic_candidates(&self) -> &[PoolIndex] {
        &self.dynamic_candidates
    }

    /// Classify a lookup for `query` without touching the cache
    pub(crate) fn state(&self, query: &Aabb, static_stamp: PrunerStamp, dynamic_stamp: PrunerStamp) -> CacheState {
        match &self.volume {
            Some(volume) if volume.contains(query) => {
                if static_stamp != self.static_stamp {
                    CacheState::StaticStale
                } else if dynamic_stamp != self.dynamic_stamp {
                    CacheState::DynamicStale
                } else {
                    CacheState::Valid
                }
            }
            _ => CacheState::VolumeExceeded,
        }
    }

    /// Bring the candidates up to date for `query`
    ///
    /// Returns `None` when an explicit volume does not contain the query;
    /// the caller then runs an uncached broad phase.
    pub(crate) fn refresh(
        &mut self,
        query: &Aabb,
        static_pruner: &mut dyn Pruner<SceneShape>,
        static_stamp: PrunerStamp,
        dynamic_pruner: &mut dyn Pruner<SceneShape>,
        dynamic_stamp: PrunerStamp,
    ) -> Option<CacheState> {
        let state = self.state(query, static_stamp, dynamic_stamp);
        match state {
            CacheState::Valid => {}
            CacheState::DynamicStale => {
                let volume = self.volume?;
                collect_candidates(dynamic_pruner, &volume, &mut self.dynamic_candidates);
                self.dynamic_stamp = dynamic_stamp;
            }
            CacheState::StaticStale | CacheState::VolumeExceeded => {
                if state == CacheState::VolumeExceeded {
                    if self.explicit {
                        self.last_state = None;
                        return None;
                    }
                    self.volume = Some(query.inflated(&self.dimensions));
                }
                let volume = self.volume?;
                collect_candidates(static_pruner, &volume, &mut self.static_candidates);
                collect_candidates(dynamic_pruner, &volume, &mut self.dynamic_candidates);
                self.static_stamp = static_stamp;
                self.dynamic_stamp = dynamic_stamp;
                log::trace!(
                    "Sweep cache rebuilt ({state:?}): {} static, {} dynamic candidates",
                    self.static_candidates.len(),
                    self.dynamic_candidates.len()
                );
            }
        }
        self.last_state = Some(state);
        Some(state)
    }
}

/// Shapes of `pruner` whose exact geometry touches `volume`
fn collect_candidates(pruner: &mut dyn Pruner<SceneShape>, volume: &Aabb, out: &mut Vec<PoolIndex>) {
    out.clear();
    pruner.overlap_aabb(volume, &mut |batch: &[&Prunable<SceneShape>]| {
        out.extend(batch.iter().map(|object| object.handle()));
        true
    });
    let exact = QueryVolume::Box(Obb::from_aabb(volume));
    let pool = pruner.pool();
    out.retain(|&index| {
        pool.get(index)
            .is_some_and(|object| overlap_geometry(&exact, object.payload.geometry(), object.payload.pose()))
    });
}
