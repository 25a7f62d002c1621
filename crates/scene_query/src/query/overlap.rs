//! Overlap queries

use crate::foundation::math::Mat3;
use crate::physics::collision::bounds::Aabb;
use crate::physics::collision::overlap::{overlap_geometry, QueryVolume};
use crate::physics::collision::primitives::Obb;
use crate::spatial::pruner::Pruner;
use crate::spatial::pruning_pool::{PoolIndex, Prunable};
use super::buffers::acquire_query_buffers;
use super::filtering::{FilterContext, HitType, QueryFilter, QueryFilterData, QueryFilterFlags};
use super::hits::{OverlapHit, QueryHit, QueryStatus};
use super::manager::SceneQueryManager;
use super::scene_shape::SceneShape;

/// Pool indices of every object whose bounds touch `volume`
pub(crate) fn gather_candidates(pruner: &mut dyn Pruner<SceneShape>, volume: &QueryVolume, out: &mut Vec<PoolIndex>) {
    out.clear();
    let mut push = |batch: &[&Prunable<SceneShape>]| {
        out.extend(batch.iter().map(|object| object.handle()));
        true
    };
    match volume {
        QueryVolume::Sphere(sphere) => pruner.overlap_sphere(sphere, &mut push),
        QueryVolume::Box(obb) if obb.rotation == Mat3::identity() => pruner.overlap_aabb(&obb.aabb(), &mut push),
        QueryVolume::Box(obb) => pruner.overlap_obb(obb, &mut push),
        QueryVolume::Capsule(capsule) => pruner.overlap_capsule(capsule, &mut push),
    };
}

impl SceneQueryManager {
    /// Shapes overlapping `volume`, appended to `out`
    ///
    /// Returns the number of hits added. Once `max_shapes` hits are stored
    /// the query stops, and the status is [`QueryStatus::Overflow`] if a
    /// further shape was refused.
    pub fn overlap_multiple(
        &mut self,
        volume: &QueryVolume,
        filter_data: &QueryFilterData,
        filter: Option<&mut dyn QueryFilter>,
        max_shapes: usize,
        out: &mut Vec<OverlapHit>,
    ) -> (usize, QueryStatus) {
        let mut ctx = FilterContext::new(filter_data, filter, false);
        let (count, overflow) = self.overlap_with(volume, &mut ctx, max_shapes, false, out);
        if overflow {
            log::debug!("overlap_multiple: more than {max_shapes} shapes overlap, result truncated");
            (count, QueryStatus::Overflow)
        } else {
            (count, QueryStatus::Complete)
        }
    }

    /// Any one shape overlapping `volume`
    pub fn overlap_any(
        &mut self,
        volume: &QueryVolume,
        filter_data: &QueryFilterData,
        filter: Option<&mut dyn QueryFilter>,
    ) -> Option<OverlapHit> {
        let mut ctx = FilterContext::new(filter_data, filter, false);
        let mut out = Vec::with_capacity(1);
        self.overlap_with(volume, &mut ctx, 1, true, &mut out);
        out.pop()
    }

    /// Shapes overlapping an axis-aligned box; see [`Self::overlap_multiple`]
    pub fn overlap_aabb(
        &mut self,
        aabb: &Aabb,
        filter_data: &QueryFilterData,
        filter: Option<&mut dyn QueryFilter>,
        max_shapes: usize,
        out: &mut Vec<OverlapHit>,
    ) -> (usize, QueryStatus) {
        self.overlap_multiple(&QueryVolume::Box(Obb::from_aabb(aabb)), filter_data, filter, max_shapes, out)
    }

    /// Returns the number of hits appended and whether more were refused
    pub(crate) fn overlap_with(
        &mut self,
        volume: &QueryVolume,
        ctx: &mut FilterContext<'_, '_>,
        max_shapes: usize,
        stop_at_first: bool,
        out: &mut Vec<OverlapHit>,
    ) -> (usize, bool) {
        self.prepare_query();
        let mut buffers = acquire_query_buffers();
        let start = out.len();
        let mut overflow = false;

        'pruners: for (dynamic, flag) in [(false, QueryFilterFlags::STATIC), (true, QueryFilterFlags::DYNAMIC)] {
            if !ctx.data.flags.contains(flag) {
                continue;
            }
            gather_candidates(self.pruner_mut(dynamic), volume, &mut buffers.candidates);
            let pool = self.pruner(dynamic).pool();
            for &index in &buffers.candidates {
                let Some(object) = pool.get(index) else { continue };
                let shape = &object.payload;
                let (pre, _) = ctx.pre_filter(shape);
                if pre == HitType::None || !overlap_geometry(volume, shape.geometry(), shape.pose()) {
                    continue;
                }
                let hit_type = ctx.post_filter(shape, &QueryHit::from_overlap(shape.handle(), pre), pre);
                if hit_type == HitType::None {
                    continue;
                }
                if out.len() - start >= max_shapes {
                    overflow = true;
                    break 'pruners;
                }
                out.push(OverlapHit { shape: shape.handle(), hit_type });
                if stop_at_first {
                    break 'pruners;
                }
            }
        }
        (out.len() - start, overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PruningStructure;
    use crate::foundation::math::{Pose, Quat, Vec3};
    use crate::physics::collision::primitives::{Capsule, Sphere};
    use crate::query::filtering::FilterData;
    use crate::query::manager::tests::{cube_at, manager};
    use crate::query::scene_shape::ShapeHandle;
    use std::f32::consts::FRAC_PI_4;

    fn grid(sq: &mut SceneQueryManager) -> Vec<ShapeHandle> {
        let mut handles = Vec::new();
        for x in 0..5 {
            for z in 0..5 {
                let desc = cube_at(x as f32 * 2.0, 0.0, z as f32 * 2.0).with_user_data((x * 5 + z) as u64);
                let desc = if (x + z) % 2 == 0 { desc } else { desc.dynamic() };
                handles.push(sq.add_shape(desc).unwrap());
            }
        }
        handles
    }

    fn sorted(mut hits: Vec<OverlapHit>) -> Vec<ShapeHandle> {
        let mut handles: Vec<ShapeHandle> = hits.drain(..).map(|h| h.shape).collect();
        handles.sort();
        handles
    }

    #[test]
    fn test_sphere_overlap_uses_exact_geometry() {
        let mut sq = manager(PruningStructure::StaticAabbTree, PruningStructure::DynamicAabbTree);
        let handles = grid(&mut sq);
        // Reaches the neighbours' faces but not the diagonal cubes' corners
        let volume = QueryVolume::Sphere(Sphere::new(Vec3::new(4.0, 0.0, 4.0), 1.6));
        let mut out = Vec::new();
        let (n, status) = sq.overlap_multiple(&volume, &QueryFilterData::default(), None, 64, &mut out);
        assert_eq!((n, status), (5, QueryStatus::Complete));
        let mut expected = vec![handles[12], handles[7], handles[17], handles[11], handles[13]];
        expected.sort();
        assert_eq!(sorted(out), expected);
    }

    #[test]
    fn test_structures_agree() {
        let volumes = [
            QueryVolume::Sphere(Sphere::new(Vec3::new(3.0, 0.0, 3.0), 2.5)),
            QueryVolume::Box(Obb::from_pose(
                &Pose::new(Vec3::new(5.0, 0.0, 5.0), Quat::from_axis_angle(&Vec3::y_axis(), FRAC_PI_4)),
                Vec3::new(3.0, 1.0, 0.5),
            )),
            QueryVolume::Capsule(Capsule::new(Vec3::new(0.0, 0.0, 8.0), Vec3::new(8.0, 0.0, 0.0), 0.75)),
        ];
        let structures = [
            PruningStructure::None,
            PruningStructure::StaticAabbTree,
            PruningStructure::DynamicAabbTree,
            PruningStructure::Octree,
            PruningStructure::Quadtree,
        ];
        for volume in &volumes {
            let mut reference = None;
            for &structure in &structures {
                let mut sq = manager(structure, structure);
                grid(&mut sq);
                let mut out = Vec::new();
                sq.overlap_multiple(volume, &QueryFilterData::default(), None, 64, &mut out);
                let mut ids: Vec<u64> = out.iter().filter_map(|h| sq.shape(h.shape)).map(|s| s.user_data()).collect();
                ids.sort_unstable();
                assert!(!ids.is_empty());
                match &reference {
                    None => reference = Some(ids),
                    Some(expected) => assert_eq!(&ids, expected, "{structure:?}"),
                }
            }
        }
    }

    #[test]
    fn test_max_shapes_and_any() {
        let mut sq = manager(PruningStructure::StaticAabbTree, PruningStructure::DynamicAabbTree);
        grid(&mut sq);
        let everything = Aabb::new(Vec3::repeat(-10.0), Vec3::repeat(20.0));
        let mut out = Vec::new();
        assert_eq!(sq.overlap_aabb(&everything, &QueryFilterData::default(), None, 64, &mut out), (25, QueryStatus::Complete));
        out.clear();
        assert_eq!(sq.overlap_aabb(&everything, &QueryFilterData::default(), None, 7, &mut out), (7, QueryStatus::Overflow));
        assert_eq!(out.len(), 7);
        assert!(sq
            .overlap_any(&QueryVolume::Box(Obb::from_aabb(&everything)), &QueryFilterData::default(), None)
            .is_some());
        let empty = QueryVolume::Sphere(Sphere::new(Vec3::new(100.0, 0.0, 0.0), 1.0));
        assert!(sq.overlap_any(&empty, &QueryFilterData::default(), None).is_none());
    }

    #[test]
    fn test_word_mask_and_pruner_flags() {
        let mut sq = manager(PruningStructure::StaticAabbTree, PruningStructure::DynamicAabbTree);
        sq.add_shape(cube_at(0.0, 0.0, 0.0).with_filter_data(FilterData::new(0, 4, 0, 0))).unwrap();
        sq.add_shape(cube_at(0.5, 0.0, 0.0).with_filter_data(FilterData::new(0, 8, 0, 0))).unwrap();
        sq.add_shape(cube_at(0.0, 0.5, 0.0).dynamic().with_filter_data(FilterData::new(0, 4, 0, 0))).unwrap();
        let volume = QueryVolume::Sphere(Sphere::new(Vec3::zeros(), 1.0));
        let mut out = Vec::new();

        let words = QueryFilterData::new(FilterData::new(0, 4, 0, 0), QueryFilterFlags::default());
        assert_eq!(sq.overlap_multiple(&volume, &words, None, 8, &mut out).0, 2);
        out.clear();
        let static_only = QueryFilterData::new(FilterData::new(0, 4, 0, 0), QueryFilterFlags::STATIC);
        assert_eq!(sq.overlap_multiple(&volume, &static_only, None, 8, &mut out).0, 1);
        out.clear();
        assert_eq!(sq.overlap_multiple(&volume, &QueryFilterData::default(), None, 8, &mut out).0, 3);
    }

    #[test]
    fn test_truncated_result_differs_from_exactly_full() {
        let everything = Aabb::new(Vec3::repeat(-10.0), Vec3::repeat(20.0));
        let data = QueryFilterData::default();

        let mut crowded = manager(PruningStructure::StaticAabbTree, PruningStructure::DynamicAabbTree);
        grid(&mut crowded);
        let mut out = Vec::new();
        let truncated = crowded.overlap_aabb(&everything, &data, None, 7, &mut out);

        let mut sparse = manager(PruningStructure::StaticAabbTree, PruningStructure::DynamicAabbTree);
        for i in 0..7 {
            sparse.add_shape(cube_at(i as f32 * 2.0, 0.0, 0.0)).unwrap();
        }
        let mut out = Vec::new();
        let exact = sparse.overlap_aabb(&everything, &data, None, 7, &mut out);

        assert_eq!(truncated, (7, QueryStatus::Overflow));
        assert_eq!(exact, (7, QueryStatus::Complete));
    }
}
