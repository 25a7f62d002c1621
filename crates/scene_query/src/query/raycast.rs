//! Raycast queries

use crate::error::{Result, SceneQueryError};
use crate::foundation::math::{utils, Vec3};
use crate::physics::collision::raycast::{raycast_geometry, RaycastOptions};
use crate::spatial::pruner::StabStatus;
use crate::spatial::pruning_pool::Prunable;
use super::buffers::acquire_query_buffers;
use super::filtering::{FilterContext, HitType, QueryFilter, QueryFilterData, QueryFilterFlags};
use super::hits::{HitBuffer, HitCollector, QueryHit, QueryMode};
use super::manager::SceneQueryManager;
use super::scene_shape::SceneShape;

impl SceneQueryManager {
    /// First blocking hit found along the ray, not necessarily the closest
    pub fn raycast_any(
        &mut self,
        origin: &Vec3,
        dir: &Vec3,
        max_dist: f32,
        filter_data: &QueryFilterData,
        filter: Option<&mut dyn QueryFilter>,
    ) -> Result<Option<QueryHit>> {
        let mut hits = HitBuffer::new();
        let mut ctx = FilterContext::new(filter_data, filter, false);
        self.raycast_with(origin, dir, max_dist, QueryMode::Any, &mut ctx, &mut hits)?;
        Ok(hits.block().copied())
    }

    /// Closest blocking hit along the ray
    pub fn raycast_single(
        &mut self,
        origin: &Vec3,
        dir: &Vec3,
        max_dist: f32,
        filter_data: &QueryFilterData,
        filter: Option<&mut dyn QueryFilter>,
    ) -> Result<Option<QueryHit>> {
        let mut hits = HitBuffer::new();
        let mut ctx = FilterContext::new(filter_data, filter, false);
        self.raycast_with(origin, dir, max_dist, QueryMode::Single, &mut ctx, &mut hits)?;
        Ok(hits.block().copied())
    }

    /// Closest blocking hit plus every touching hit in front of it
    ///
    /// `hits` is cleared first. Returns the number of hits stored; check
    /// [`HitBuffer::overflowed`] for truncation.
    pub fn raycast_multiple(
        &mut self,
        origin: &Vec3,
        dir: &Vec3,
        max_dist: f32,
        filter_data: &QueryFilterData,
        filter: Option<&mut dyn QueryFilter>,
        hits: &mut HitBuffer,
    ) -> Result<usize> {
        let mut ctx = FilterContext::new(filter_data, filter, false);
        self.raycast_with(origin, dir, max_dist, QueryMode::Multiple, &mut ctx, hits)?;
        Ok(hits.len())
    }

    pub(crate) fn raycast_with(
        &mut self,
        origin: &Vec3,
        dir: &Vec3,
        max_dist: f32,
        mode: QueryMode,
        ctx: &mut FilterContext<'_, '_>,
        hits: &mut HitBuffer,
    ) -> Result<()> {
        hits.clear();
        if !utils::is_unit(dir) {
            log::warn!("raycast: direction {dir:?} is not normalized");
            return Err(SceneQueryError::InvalidRayDirection(dir.magnitude_squared()));
        }
        if max_dist < 0.0 {
            return Ok(());
        }
        self.prepare_query();

        let mut buffers = acquire_query_buffers();
        let mut collector = HitCollector::new(mode, max_dist, hits);
        for (dynamic, flag) in [(false, QueryFilterFlags::STATIC), (true, QueryFilterFlags::DYNAMIC)] {
            if !ctx.data.flags.contains(flag) {
                continue;
            }
            let mut limit = collector.max_dist;
            let status = self.pruner_mut(dynamic).stab(origin, dir, &mut limit, &mut |object: &Prunable<SceneShape>, max: &mut f32| {
                let shape = &object.payload;
                let (pre, flags) = ctx.pre_filter(shape);
                if pre == HitType::None {
                    return StabStatus::Continue;
                }
                let options = RaycastOptions {
                    double_sided: flags.contains(QueryFilterFlags::BACKFACE),
                    mesh_multiple: mode == QueryMode::Multiple && flags.contains(QueryFilterFlags::MESH_MULTIPLE),
                    ..RaycastOptions::default()
                };
                let found = &mut buffers.geometry_hits;
                found.clear();
                raycast_geometry(shape.geometry(), shape.pose(), origin, dir, *max, &options, found);

                let mut status = StabStatus::Continue;
                for geometry_hit in found.iter() {
                    let mut hit = QueryHit::from_ray(shape.handle(), geometry_hit, pre);
                    hit.hit_type = ctx.post_filter(shape, &hit, pre);
                    match collector.offer(hit) {
                        StabStatus::Stop => return StabStatus::Stop,
                        StabStatus::UpdateMaxDist => {
                            *max = collector.max_dist;
                            status = StabStatus::UpdateMaxDist;
                        }
                        StabStatus::Continue => {}
                    }
                }
                status
            });
            if status == StabStatus::Stop {
                break;
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
    use crate::foundation::math::Pose;
    use crate::physics::collision::mesh::tests::quad;
    use crate::physics::collision::shape::Geometry;
    use crate::query::filtering::FilterData;
    use crate::query::hits::HitFlags;
    use crate::query::manager::tests::{cube_at, manager};
    use crate::query::scene_shape::ShapeDesc;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    /// Marks everything touching
    struct TouchAll;

    impl QueryFilter for TouchAll {
        fn pre_filter(&mut self, _query: &FilterData, _shape: &SceneShape, _flags: &mut QueryFilterFlags) -> HitType {
            HitType::Touch
        }
    }

    /// Odd user data blocks, even user data touches
    struct ByUserData;

    impl QueryFilter for ByUserData {
        fn pre_filter(&mut self, _query: &FilterData, shape: &SceneShape, _flags: &mut QueryFilterFlags) -> HitType {
            if shape.user_data() % 2 == 1 {
                HitType::Block
            } else {
                HitType::Touch
            }
        }
    }

    fn prefiltered() -> QueryFilterData {
        QueryFilterData::new(FilterData::default(), QueryFilterFlags::default() | QueryFilterFlags::PREFILTER)
    }

    fn row_of_cubes() -> SceneQueryManager {
        let mut sq = manager(PruningStructure::StaticAabbTree, PruningStructure::DynamicAabbTree);
        for i in 0..6u64 {
            let desc = cube_at(i as f32 * 4.0 + 4.0, 0.0, 0.0).with_user_data(i);
            sq.add_shape(if i % 2 == 0 { desc } else { desc.dynamic() }).unwrap();
        }
        sq
    }

    #[test]
    fn test_single_finds_closest_across_pruners() {
        let mut sq = row_of_cubes();
        let hit = sq
            .raycast_single(&Vec3::zeros(), &Vec3::x(), 100.0, &QueryFilterData::default(), None)
            .unwrap()
            .unwrap();
        assert_relative_eq!(hit.distance, 3.5, epsilon = 1e-5);
        assert_eq!(sq.shape(hit.shape).map(SceneShape::user_data), Some(0));
        assert!(hit.flags.contains(HitFlags::DISTANCE | HitFlags::POSITION | HitFlags::NORMAL));
        assert_relative_eq!(hit.normal, -Vec3::x(), epsilon = 1e-5);

        // Reversed, the closest is the last dynamic cube
        let back = sq
            .raycast_single(&Vec3::new(40.0, 0.0, 0.0), &-Vec3::x(), 100.0, &QueryFilterData::default(), None)
            .unwrap()
            .unwrap();
        assert_eq!(sq.shape(back.shape).map(SceneShape::user_data), Some(5));
    }

    #[test]
    fn test_any_and_max_distance() {
        let mut sq = row_of_cubes();
        let data = QueryFilterData::default();
        assert!(sq.raycast_any(&Vec3::zeros(), &Vec3::x(), 100.0, &data, None).unwrap().is_some());
        assert!(sq.raycast_any(&Vec3::zeros(), &Vec3::x(), 3.0, &data, None).unwrap().is_none());
        assert!(sq.raycast_single(&Vec3::zeros(), &Vec3::y(), 100.0, &data, None).unwrap().is_none());
    }

    #[test]
    fn test_static_and_dynamic_flags_select_pruners() {
        let mut sq = row_of_cubes();
        let dynamic_only = QueryFilterData::new(FilterData::default(), QueryFilterFlags::DYNAMIC);
        let hit = sq.raycast_single(&Vec3::zeros(), &Vec3::x(), 100.0, &dynamic_only, None).unwrap().unwrap();
        assert_eq!(sq.shape(hit.shape).map(SceneShape::user_data), Some(1));
    }

    #[test]
    fn test_multiple_keeps_touches_before_block() {
        let mut sq = row_of_cubes();
        let mut hits = HitBuffer::new();
        let mut filter = ByUserData;
        let n = sq
            .raycast_multiple(&Vec3::zeros(), &Vec3::x(), 100.0, &prefiltered(), Some(&mut filter), &mut hits)
            .unwrap();
        // Cube 0 touches, cube 1 blocks, everything behind is cut
        assert_eq!(n, 2);
        assert_eq!(hits.touches().len(), 1);
        assert_eq!(hits.block().and_then(|b| sq.shape(b.shape)).map(SceneShape::user_data), Some(1));

        let mut filter = TouchAll;
        sq.raycast_multiple(&Vec3::zeros(), &Vec3::x(), 100.0, &prefiltered(), Some(&mut filter), &mut hits).unwrap();
        assert_eq!(hits.touches().len(), 6);
        assert!(hits.block().is_none());
    }

    #[test]
    fn test_single_is_no_farther_than_any_touch() {
        let mut sq = row_of_cubes();
        let single = sq
            .raycast_single(&Vec3::zeros(), &Vec3::x(), 100.0, &QueryFilterData::default(), None)
            .unwrap()
            .unwrap();
        let mut hits = HitBuffer::new();
        let mut filter = TouchAll;
        sq.raycast_multiple(&Vec3::zeros(), &Vec3::x(), 100.0, &prefiltered(), Some(&mut filter), &mut hits).unwrap();
        assert!(hits.touches().iter().all(|t| single.distance <= t.distance));
    }

    #[test]
    fn test_fixed_buffer_overflow() {
        let mut sq = row_of_cubes();
        let mut hits = HitBuffer::with_limit(3);
        let mut filter = TouchAll;
        let n = sq
            .raycast_multiple(&Vec3::zeros(), &Vec3::x(), 100.0, &prefiltered(), Some(&mut filter), &mut hits)
            .unwrap();
        assert_eq!(n, 3);
        assert!(hits.overflowed());
    }

    struct DropOdd;

    impl QueryFilter for DropOdd {
        fn post_filter(&mut self, _query: &FilterData, shape: &SceneShape, _hit: &QueryHit) -> HitType {
            if shape.user_data() % 2 == 1 {
                HitType::None
            } else {
                HitType::Block
            }
        }
    }

    #[test]
    fn test_post_filter_can_drop_hits() {
        let mut sq = row_of_cubes();
        let data = QueryFilterData::new(FilterData::default(), QueryFilterFlags::default() | QueryFilterFlags::POSTFILTER);
        let mut filter = DropOdd;
        let hit = sq
            .raycast_single(&Vec3::new(6.0, 0.0, 0.0), &Vec3::x(), 100.0, &data, Some(&mut filter))
            .unwrap()
            .unwrap();
        assert_eq!(sq.shape(hit.shape).map(SceneShape::user_data), Some(2));
    }

    #[test]
    fn test_non_unit_direction_is_rejected() {
        let mut sq = row_of_cubes();
        let result = sq.raycast_single(&Vec3::zeros(), &Vec3::new(2.0, 0.0, 0.0), 10.0, &QueryFilterData::default(), None);
        assert!(matches!(result, Err(SceneQueryError::InvalidRayDirection(_))));
    }

    #[test]
    fn test_moved_shape_is_hit_at_new_pose() {
        let mut sq = row_of_cubes();
        let handle = sq.add_shape(cube_at(0.0, 50.0, 0.0).dynamic()).unwrap();
        let data = QueryFilterData::default();
        assert!(sq.raycast_single(&Vec3::zeros(), &Vec3::y(), 100.0, &data, None).unwrap().is_some());
        sq.update_shape(handle, Pose::from_position(Vec3::new(0.0, 0.0, 50.0)));
        assert!(sq.raycast_single(&Vec3::zeros(), &Vec3::y(), 100.0, &data, None).unwrap().is_none());
        let hit = sq.raycast_single(&Vec3::zeros(), &Vec3::z(), 100.0, &data, None).unwrap().unwrap();
        assert_eq!(hit.shape, handle);
        assert_relative_eq!(hit.distance, 49.5, epsilon = 1e-4);
    }

    #[test]
    fn test_mesh_backface_and_multiple_flags() {
        let mut sq = manager(PruningStructure::StaticAabbTree, PruningStructure::DynamicAabbTree);
        let mesh = Arc::new(quad());
        sq.add_shape(ShapeDesc::new(Geometry::mesh(mesh.clone()), Pose::from_position(Vec3::new(0.0, 1.0, 0.0))))
            .unwrap();
        sq.add_shape(ShapeDesc::new(Geometry::mesh(mesh), Pose::from_position(Vec3::new(0.0, 2.0, 0.0)))).unwrap();

        // From above, front faces
        let down = -Vec3::y();
        let origin = Vec3::new(0.3, 5.0, 0.1);
        let hit = sq.raycast_single(&origin, &down, 10.0, &QueryFilterData::default(), None).unwrap().unwrap();
        assert_relative_eq!(hit.distance, 3.0, epsilon = 1e-4);
        assert!(hit.face_index.is_some());
        assert!(hit.flags.contains(HitFlags::UV | HitFlags::FACE_INDEX));

        // From below, back faces are culled unless asked for
        let up = Vec3::y();
        let below = Vec3::new(0.3, -5.0, 0.1);
        assert!(sq.raycast_single(&below, &up, 10.0, &QueryFilterData::default(), None).unwrap().is_none());
        let backface = QueryFilterData::new(FilterData::default(), QueryFilterFlags::default() | QueryFilterFlags::BACKFACE);
        let hit = sq.raycast_single(&below, &up, 10.0, &backface, None).unwrap().unwrap();
        assert_relative_eq!(hit.distance, 6.0, epsilon = 1e-4);
    }

    /// Broad phase must never change which shapes a ray sees
    #[test]
    fn test_octree_matches_brute_force() {
        let world = crate::physics::collision::bounds::Aabb::new(Vec3::zeros(), Vec3::repeat(1000.0));
        let octree_config = crate::config::SceneQueryConfig {
            static_structure: PruningStructure::Octree,
            max_bounds: Some(world),
            subdivision_level: 5,
            ..Default::default()
        };
        let brute_config = crate::config::SceneQueryConfig {
            static_structure: PruningStructure::None,
            ..Default::default()
        };
        let mut octree = SceneQueryManager::new(octree_config).unwrap();
        let mut brute = SceneQueryManager::new(brute_config).unwrap();

        let mut rng = StdRng::seed_from_u64(0x5eed);
        for i in 0..1000u64 {
            let half = Vec3::new(rng.gen_range(1.0..20.0), rng.gen_range(1.0..20.0), rng.gen_range(1.0..20.0));
            let center = Vec3::new(rng.gen_range(20.0..980.0), rng.gen_range(20.0..980.0), rng.gen_range(20.0..980.0));
            let desc = ShapeDesc::new(Geometry::cuboid(half), Pose::from_position(center)).with_user_data(i);
            octree.add_shape(desc.clone()).unwrap();
            brute.add_shape(desc).unwrap();
        }

        let data = prefiltered();
        let mut total = 0;
        for _ in 0..100 {
            let origin = Vec3::new(rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0));
            let dir = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0f32..1.0))
                .try_normalize(1e-3)
                .unwrap_or_else(Vec3::x);
            let max_dist = rng.gen_range(100.0..1500.0);

            let collect = |sq: &mut SceneQueryManager| {
                let mut hits = HitBuffer::new();
                let mut filter = TouchAll;
                sq.raycast_multiple(&origin, &dir, max_dist, &data, Some(&mut filter), &mut hits).unwrap();
                let mut ids: Vec<u64> = hits.iter().filter_map(|h| sq.shape(h.shape)).map(SceneShape::user_data).collect();
                ids.sort_unstable();
                ids
            };
            let a = collect(&mut octree);
            let b = collect(&mut brute);
            assert_eq!(a, b);
            total += a.len();
        }
        assert!(total > 0);
    }
}
