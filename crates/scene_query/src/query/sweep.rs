//! Sweep queries
//!
//! A sweep moves a query volume along a unit direction and reports the
//! shapes it would hit. The broad phase is an overlap query with the box
//! enclosing the whole motion, or the candidates of a sweep cache; the
//! exact test runs per candidate with the usual shrinking distance.

use crate::error::{Result, SceneQueryError};
use crate::foundation::math::{utils, Vec3};
use crate::physics::collision::overlap::QueryVolume;
use crate::physics::collision::primitives::Obb;
use crate::physics::collision::sweep::{sweep_geometry, SweepOptions};
use crate::spatial::pruner::StabStatus;
use crate::spatial::pruning_pool::{PoolIndex, PruningPool};
use super::buffers::acquire_query_buffers;
use super::filtering::{FilterContext, HitType, QueryFilter, QueryFilterData, QueryFilterFlags};
use super::hits::{HitBuffer, HitCollector, QueryHit, QueryMode};
use super::manager::SceneQueryManager;
use super::overlap::gather_candidates;
use super::scene_shape::{SceneShape, ShapeHandle};
use super::sweep_cache::SweepCacheKey;

/// A volume moving along a direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepDesc {
    /// Volume at the start of the motion
    pub volume: QueryVolume,
    /// Unit direction of motion
    pub dir: Vec3,
    /// Travel distance
    pub distance: f32,
    /// Shape hit by the previous sweep, tested first
    pub last_hit: Option<ShapeHandle>,
    /// Candidate cache to use for the broad phase
    pub cache: Option<SweepCacheKey>,
}

impl SweepDesc {
    /// Sweep without hints
    pub fn new(volume: QueryVolume, dir: Vec3, distance: f32) -> Self {
        Self { volume, dir, distance, last_hit: None, cache: None }
    }

    /// Test `shape` before anything else
    pub fn with_last_hit(mut self, shape: ShapeHandle) -> Self {
        self.last_hit = Some(shape);
        self
    }

    /// Take broad-phase candidates from a sweep cache
    pub fn with_cache(mut self, cache: SweepCacheKey) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Oriented box enclosing the volume over the whole motion
    pub fn swept_bounds(&self) -> Obb {
        let basis = utils::basis_from_direction(&self.dir);
        let axis = |i: usize| basis.column(i).into_owned();
        let (center, mut extents) = match &self.volume {
            QueryVolume::Sphere(sphere) => (sphere.center, Vec3::repeat(sphere.radius)),
            QueryVolume::Box(obb) => {
                let extent = |i: usize| (0..3).map(|j| axis(i).dot(&obb.axis(j)).abs() * obb.extents[j]).sum::<f32>();
                (obb.center, Vec3::new(extent(0), extent(1), extent(2)))
            }
            QueryVolume::Capsule(capsule) => {
                let half = (capsule.p1 - capsule.p0) * 0.5;
                let extent = |i: usize| axis(i).dot(&half).abs() + capsule.radius;
                (capsule.p0 + half, Vec3::new(extent(0), extent(1), extent(2)))
            }
        };
        let half_travel = self.distance * 0.5;
        extents.x += half_travel;
        Obb::new(center + self.dir * half_travel, extents, basis)
    }
}

/// Exact sweep against one pooled shape
fn sweep_candidate(
    pool: &PruningPool<SceneShape>,
    index: PoolIndex,
    desc: &SweepDesc,
    ctx: &mut FilterContext<'_, '_>,
    collector: &mut HitCollector<'_>,
) -> StabStatus {
    let Some(object) = pool.get(index) else { return StabStatus::Continue };
    let shape = &object.payload;
    let (pre, flags) = ctx.pre_filter(shape);
    if pre == HitType::None {
        return StabStatus::Continue;
    }
    let options = SweepOptions { double_sided: flags.contains(QueryFilterFlags::BACKFACE) };
    let Some(contact) =
        sweep_geometry(&desc.volume, &desc.dir, collector.max_dist, shape.geometry(), shape.pose(), &options)
    else {
        return StabStatus::Continue;
    };
    let mut hit = QueryHit::from_sweep(shape.handle(), &contact, pre);
    hit.hit_type = ctx.post_filter(shape, &hit, pre);
    collector.offer(hit)
}

impl SceneQueryManager {
    /// First blocking hit found by the sweep, not necessarily the closest
    pub fn sweep_any(
        &mut self,
        desc: &SweepDesc,
        filter_data: &QueryFilterData,
        filter: Option<&mut dyn QueryFilter>,
    ) -> Result<Option<QueryHit>> {
        let mut hits = HitBuffer::new();
        let mut ctx = FilterContext::new(filter_data, filter, false);
        self.sweep_with(desc, QueryMode::Any, &mut ctx, &mut hits)?;
        Ok(hits.block().copied())
    }

    /// Closest blocking hit of the sweep
    pub fn sweep_single(
        &mut self,
        desc: &SweepDesc,
        filter_data: &QueryFilterData,
        filter: Option<&mut dyn QueryFilter>,
    ) -> Result<Option<QueryHit>> {
        let mut hits = HitBuffer::new();
        let mut ctx = FilterContext::new(filter_data, filter, false);
        self.sweep_with(desc, QueryMode::Single, &mut ctx, &mut hits)?;
        Ok(hits.block().copied())
    }

    /// Closest blocking hit plus every touching hit in front of it
    ///
    /// `hits` is cleared first.
    pub fn sweep_multiple(
        &mut self,
        desc: &SweepDesc,
        filter_data: &QueryFilterData,
        filter: Option<&mut dyn QueryFilter>,
        hits: &mut HitBuffer,
    ) -> Result<usize> {
        let mut ctx = FilterContext::new(filter_data, filter, false);
        self.sweep_with(desc, QueryMode::Multiple, &mut ctx, hits)?;
        Ok(hits.len())
    }

    /// Refresh a cache for `desc`; false when the caller must run the broad phase itself
    fn refresh_sweep_cache(&mut self, key: SweepCacheKey, desc: &SweepDesc) -> bool {
        let query = desc.swept_bounds().aabb();
        let static_stamp = self.stamp(false);
        let dynamic_stamp = self.stamp(true);
        let Some(cache) = self.caches.get_mut(key) else {
            log::warn!("sweep: unknown sweep cache {key:?}");
            return false;
        };
        cache
            .refresh(&query, self.static_pruner.as_mut(), static_stamp, self.dynamic_pruner.as_mut(), dynamic_stamp)
            .is_some()
    }

    pub(crate) fn sweep_with(
        &mut self,
        desc: &SweepDesc,
        mode: QueryMode,
        ctx: &mut FilterContext<'_, '_>,
        hits: &mut HitBuffer,
    ) -> Result<()> {
        hits.clear();
        if !utils::is_unit(&desc.dir) {
            log::warn!("sweep: direction {:?} is not normalized", desc.dir);
            return Err(SceneQueryError::InvalidRayDirection(desc.dir.magnitude_squared()));
        }
        if desc.distance < 0.0 {
            return Ok(());
        }
        self.prepare_query();

        let pruner_flags = [(false, QueryFilterFlags::STATIC), (true, QueryFilterFlags::DYNAMIC)];
        let mut collector = HitCollector::new(mode, desc.distance, hits);
        let mut stopped = false;

        let last_hit = desc.last_hit.and_then(|handle| self.shape_location(handle));
        if let Some((dynamic, index)) = last_hit {
            let flag = if dynamic { QueryFilterFlags::DYNAMIC } else { QueryFilterFlags::STATIC };
            if ctx.data.flags.contains(flag) {
                stopped = sweep_candidate(self.pruner(dynamic).pool(), index, desc, ctx, &mut collector) == StabStatus::Stop;
            }
        }

        let cached = match desc.cache {
            Some(key) if !stopped => self.refresh_sweep_cache(key, desc),
            _ => false,
        };

        let mut buffers = acquire_query_buffers();
        for (dynamic, flag) in pruner_flags {
            if stopped {
                break;
            }
            if !ctx.data.flags.contains(flag) {
                continue;
            }
            let candidates = &mut buffers.candidates;
            match desc.cache.and_then(|key| self.caches.get(key)).filter(|_| cached) {
                Some(cache) => {
                    candidates.clear();
                    candidates.extend_from_slice(if dynamic { cache.dynamic_candidates() } else { cache.static_candidates() });
                }
                None => gather_candidates(self.pruner_mut(dynamic), &QueryVolume::Box(desc.swept_bounds()), candidates),
            }
            let pool = self.pruner(dynamic).pool();
            for &index in candidates.iter() {
                if last_hit == Some((dynamic, index)) {
                    continue;
                }
                if sweep_candidate(pool, index, desc, ctx, &mut collector) == StabStatus::Stop {
                    stopped = true;
                    break;
                }
            }
        }
        collector.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PruningStructure;
    use crate::foundation::math::{Pose, Quat};
    use crate::physics::collision::bounds::Aabb;
    use crate::physics::collision::primitives::{Capsule, Sphere};
    use crate::query::filtering::FilterData;
    use crate::query::hits::HitFlags;
    use crate::query::manager::tests::{cube_at, manager};
    use crate::query::sweep_cache::CacheState;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_4;

    struct TouchAll;

    impl QueryFilter for TouchAll {
        fn pre_filter(&mut self, _query: &FilterData, _shape: &SceneShape, _flags: &mut QueryFilterFlags) -> HitType {
            HitType::Touch
        }
    }

    fn row_of_cubes() -> (SceneQueryManager, Vec<ShapeHandle>) {
        let mut sq = manager(PruningStructure::StaticAabbTree, PruningStructure::DynamicAabbTree);
        let handles = (0..6u64)
            .map(|i| {
                let desc = cube_at(i as f32 * 4.0 + 4.0, 0.0, 0.0).with_user_data(i);
                sq.add_shape(if i % 2 == 0 { desc } else { desc.dynamic() }).unwrap()
            })
            .collect();
        (sq, handles)
    }

    fn ball(x: f32) -> QueryVolume {
        QueryVolume::Sphere(Sphere::new(Vec3::new(x, 0.0, 0.0), 0.5))
    }

    #[test]
    fn test_swept_bounds_enclose_motion() {
        let desc = SweepDesc::new(ball(0.0), Vec3::x(), 10.0);
        let bounds = desc.swept_bounds().aabb();
        assert_relative_eq!(bounds.min, Vec3::new(-0.5, -0.5, -0.5), epsilon = 1e-5);
        assert_relative_eq!(bounds.max, Vec3::new(10.5, 0.5, 0.5), epsilon = 1e-5);

        let capsule = QueryVolume::Capsule(Capsule::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0), 0.5));
        let bounds = SweepDesc::new(capsule, Vec3::z(), 4.0).swept_bounds().aabb();
        assert_relative_eq!(bounds.min, Vec3::new(-0.5, -1.5, -0.5), epsilon = 1e-5);
        assert_relative_eq!(bounds.max, Vec3::new(0.5, 1.5, 4.5), epsilon = 1e-5);
    }

    #[test]
    fn test_single_sphere_sweep() {
        let (mut sq, handles) = row_of_cubes();
        let desc = SweepDesc::new(ball(0.0), Vec3::x(), 50.0);
        let hit = sq.sweep_single(&desc, &QueryFilterData::default(), None).unwrap().unwrap();
        assert_eq!(hit.shape, handles[0]);
        assert_relative_eq!(hit.distance, 3.0, epsilon = 1e-3);
        assert_relative_eq!(hit.normal, -Vec3::x(), epsilon = 1e-3);

        // A stale hint does not change the answer
        let hinted = desc.with_last_hit(handles[3]);
        let hit = sq.sweep_single(&hinted, &QueryFilterData::default(), None).unwrap().unwrap();
        assert_eq!(hit.shape, handles[0]);
    }

    #[test]
    fn test_last_hit_is_still_reported() {
        let (mut sq, handles) = row_of_cubes();
        let desc = SweepDesc::new(ball(0.0), Vec3::x(), 50.0).with_last_hit(handles[0]);
        let hit = sq.sweep_any(&desc, &QueryFilterData::default(), None).unwrap().unwrap();
        assert_eq!(hit.shape, handles[0]);
    }

    #[test]
    fn test_multiple_and_initial_overlap() {
        let (mut sq, _) = row_of_cubes();
        let data = QueryFilterData::new(FilterData::default(), QueryFilterFlags::default() | QueryFilterFlags::PREFILTER);
        let mut hits = HitBuffer::new();
        let mut filter = TouchAll;
        let desc = SweepDesc::new(ball(0.0), Vec3::x(), 50.0);
        assert_eq!(sq.sweep_multiple(&desc, &data, Some(&mut filter), &mut hits).unwrap(), 6);

        let inside = SweepDesc::new(ball(4.0), Vec3::x(), 1.0);
        let hit = sq.sweep_single(&inside, &QueryFilterData::default(), None).unwrap().unwrap();
        assert_eq!(hit.distance, 0.0);
        assert!(hit.flags.contains(HitFlags::INITIAL_OVERLAP));
    }

    #[test]
    fn test_box_sweep_turned() {
        let (mut sq, handles) = row_of_cubes();
        let turned = Obb::from_pose(
            &Pose::new(Vec3::new(0.0, 0.0, 0.0), Quat::from_axis_angle(&Vec3::y_axis(), FRAC_PI_4)),
            Vec3::repeat(0.5),
        );
        let desc = SweepDesc::new(QueryVolume::Box(turned), Vec3::x(), 50.0);
        let hit = sq.sweep_single(&desc, &QueryFilterData::default(), None).unwrap().unwrap();
        assert_eq!(hit.shape, handles[0]);
        assert_relative_eq!(hit.distance, 3.5 - 0.5 * std::f32::consts::SQRT_2, epsilon = 1e-3);
    }

    #[test]
    fn test_sweep_cache_matches_uncached_and_tracks_changes() {
        let (mut sq, handles) = row_of_cubes();
        let cache = sq.create_sweep_cache(Vec3::repeat(10.0));
        let data = QueryFilterData::default();
        let plain = SweepDesc::new(ball(0.0), Vec3::x(), 20.0);
        let cached = plain.with_cache(cache);

        let expected = sq.sweep_single(&plain, &data, None).unwrap();
        assert_eq!(sq.sweep_single(&cached, &data, None).unwrap(), expected);
        assert_eq!(sq.sweep_cache(cache).and_then(|c| c.last_state()), Some(CacheState::VolumeExceeded));
        assert_eq!(sq.sweep_single(&cached, &data, None).unwrap(), expected);
        assert_eq!(sq.sweep_cache(cache).and_then(|c| c.last_state()), Some(CacheState::Valid));

        // A dynamic cube moves into the path
        sq.update_shape(handles[1], Pose::from_position(Vec3::new(2.0, 0.0, 0.0)));
        let hit = sq.sweep_single(&cached, &data, None).unwrap().unwrap();
        assert_eq!(sq.sweep_cache(cache).and_then(|c| c.last_state()), Some(CacheState::DynamicStale));
        assert_eq!(hit.shape, handles[1]);
        assert_relative_eq!(hit.distance, 1.0, epsilon = 1e-3);

        let blocker = sq.add_shape(cube_at(1.5, 0.0, 0.0)).unwrap();
        let hit = sq.sweep_single(&cached, &data, None).unwrap().unwrap();
        assert_eq!(sq.sweep_cache(cache).and_then(|c| c.last_state()), Some(CacheState::StaticStale));
        assert_eq!(hit.shape, blocker);

        assert!(sq.release_sweep_cache(cache));
        assert!(!sq.release_sweep_cache(cache));
        // Released caches fall back to the uncached path
        assert_eq!(sq.sweep_single(&cached, &data, None).unwrap().map(|h| h.shape), Some(blocker));
    }

    #[test]
    fn test_explicit_cache_volume_bypass() {
        let (mut sq, handles) = row_of_cubes();
        let cache = sq.create_sweep_cache(Vec3::zeros());
        assert!(sq.set_sweep_cache_volume(cache, Aabb::new(Vec3::repeat(-2.0), Vec3::repeat(2.0))));
        let desc = SweepDesc::new(ball(0.0), Vec3::x(), 20.0).with_cache(cache);
        let hit = sq.sweep_single(&desc, &QueryFilterData::default(), None).unwrap().unwrap();
        assert_eq!(hit.shape, handles[0]);
        assert_eq!(sq.sweep_cache(cache).and_then(|c| c.last_state()), None);
        assert!(sq.sweep_cache(cache).is_some_and(|c| c.is_explicit()));
    }

    #[test]
    fn test_non_unit_direction_is_rejected() {
        let (mut sq, _) = row_of_cubes();
        let desc = SweepDesc::new(ball(0.0), Vec3::new(0.0, 0.0, 0.5), 1.0);
        assert!(sq.sweep_single(&desc, &QueryFilterData::default(), None).is_err());
    }
}
