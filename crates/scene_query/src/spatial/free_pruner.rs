//! Brute-force pruner
//!
//! No acceleration structure: every query scans the whole pool. Useful
//! for small populations, for objects that do not fit a bounded world,
//! and as the reference the other pruners are tested against.

use crate::foundation::collections::Handle;
use crate::foundation::math::Vec3;
use crate::physics::collision::bounds::Aabb;
use crate::physics::collision::intersection::{full_plane_mask, planes_aabb_overlap, BoxVolume, RayAabbTester};
use crate::physics::collision::primitives::{Capsule, Obb, Plane, Sphere};
use super::pruner::{CullCallback, OverlapBatcher, OverlapCallback, Pruner, Signature, StabCallback, StabStatus};
use super::pruning_pool::{PoolIndex, PruningPool, WorldBounds};

/// Linear-scan pruner
#[derive(Debug)]
pub struct FreePruner<T> {
    pool: PruningPool<T>,
    signature: Signature,
}

impl<T: WorldBounds> FreePruner<T> {
    /// Create an empty pruner identified by `structure`
    pub fn new(structure: Handle) -> Self {
        Self::with_capacity(structure, 0)
    }

    /// Create a pruner with room for `capacity` objects
    pub fn with_capacity(structure: Handle, capacity: usize) -> Self {
        Self {
            pool: PruningPool::with_capacity(capacity),
            signature: Signature::new(structure),
        }
    }

    fn overlap_volume<V: BoxVolume>(&mut self, volume: &V, cb: &mut OverlapCallback<'_, T>) -> bool {
        self.pool.refresh_aabbs();
        let bounds = volume.bounds();
        let boxes = self.pool.world_boxes();
        let mut batcher = OverlapBatcher::new(&self.pool, cb);
        for (i, aabb) in boxes.iter().enumerate() {
            // Bounds reject before the exact volume test
            if !bounds.intersects(aabb) || !volume.overlaps_box(&aabb.center(), &aabb.extents()) {
                continue;
            }
            if !batcher.push(i as PoolIndex) {
                return false;
            }
        }
        batcher.flush()
    }
}

impl<T: WorldBounds + Send + Sync> Pruner<T> for FreePruner<T> {
    fn add_object(&mut self, payload: T, dynamic: bool) -> Option<PoolIndex> {
        let index = self.pool.add_object(payload, dynamic)?;
        self.signature.bump();
        Some(index)
    }

    fn remove_object(&mut self, index: PoolIndex) -> Option<T> {
        let payload = self.pool.remove_object(index, |_| {})?;
        self.signature.bump();
        Some(payload)
    }

    fn update_object(&mut self, index: PoolIndex) {
        self.pool.invalidate_aabb(index);
    }

    fn pool(&self) -> &PruningPool<T> {
        &self.pool
    }

    fn payload_mut(&mut self, index: PoolIndex) -> Option<&mut T> {
        self.pool.payload_mut(index)
    }

    fn signature(&self) -> Signature {
        self.signature
    }

    fn eager_update(&mut self) {
        self.pool.refresh_aabbs();
    }

    fn cull(&mut self, planes: &[Plane], cb: &mut CullCallback<'_, T>) -> bool {
        self.pool.refresh_aabbs();
        let mask = full_plane_mask(planes.len());
        for (object, aabb) in self.pool.objects().iter().zip(self.pool.world_boxes()) {
            if planes_aabb_overlap(&aabb.center(), &aabb.extents(), planes, mask).is_some() && !cb(object) {
                return false;
            }
        }
        true
    }

    fn stab(&mut self, origin: &Vec3, dir: &Vec3, max_dist: &mut f32, cb: &mut StabCallback<'_, T>) -> StabStatus {
        self.pool.refresh_aabbs();
        let mut tester = RayAabbTester::new(origin, dir, *max_dist);
        for (object, aabb) in self.pool.objects().iter().zip(self.pool.world_boxes()) {
            if !tester.overlaps(&aabb.center(), &aabb.extents()) {
                continue;
            }
            match cb(object, max_dist) {
                StabStatus::Stop => return StabStatus::Stop,
                StabStatus::UpdateMaxDist => tester = RayAabbTester::new(origin, dir, *max_dist),
                StabStatus::Continue => {}
            }
        }
        StabStatus::Continue
    }

    fn overlap_sphere(&mut self, sphere: &Sphere, cb: &mut OverlapCallback<'_, T>) -> bool {
        self.overlap_volume(sphere, cb)
    }

    fn overlap_aabb(&mut self, aabb: &Aabb, cb: &mut OverlapCallback<'_, T>) -> bool {
        self.overlap_volume(aabb, cb)
    }

    fn overlap_obb(&mut self, obb: &Obb, cb: &mut OverlapCallback<'_, T>) -> bool {
        self.overlap_volume(obb, cb)
    }

    fn overlap_capsule(&mut self, capsule: &Capsule, cb: &mut OverlapCallback<'_, T>) -> bool {
        self.overlap_volume(capsule, cb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::test_support::{collect_overlap, TestBox};

    fn line_of_boxes(n: u32) -> FreePruner<TestBox> {
        let mut pruner = FreePruner::new(0);
        for i in 0..n {
            pruner.add_object(TestBox::cube(i, Vec3::new(i as f32 * 4.0, 0.0, 0.0), 1.0), false);
        }
        pruner
    }

    #[test]
    fn test_add_remove_bumps_signature() {
        let mut pruner = line_of_boxes(3);
        let sig = pruner.signature();
        assert_eq!(sig.timestamp, 3);
        let removed = pruner.remove_object(0).unwrap();
        assert_eq!(removed.id, 0);
        assert_ne!(pruner.signature(), sig);
        assert_eq!(pruner.len(), 2);
        // Moving an object is not a structural change
        let sig = pruner.signature();
        pruner.update_object(0);
        assert_eq!(pruner.signature(), sig);
    }

    #[test]
    fn test_overlap_sphere() {
        let mut pruner = line_of_boxes(10);
        let ids = collect_overlap(&mut pruner, |p, cb| p.overlap_sphere(&Sphere::new(Vec3::new(8.0, 0.0, 0.0), 4.5), cb));
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_stab_shrinks() {
        let mut pruner = line_of_boxes(10);
        let origin = Vec3::new(-10.0, 0.0, 0.0);
        let mut max_dist = f32::MAX;
        let mut seen = Vec::new();
        pruner.stab(&origin, &Vec3::x(), &mut max_dist, &mut |object, dist| {
            seen.push(object.payload.id);
            match object.payload.aabb.intersect_ray(&origin, &Vec3::x(), *dist) {
                Some(t) if t < *dist => {
                    *dist = t;
                    StabStatus::UpdateMaxDist
                }
                _ => StabStatus::Continue,
            }
        });
        // First box shrinks the segment so the rest are rejected
        assert_eq!(seen, vec![0]);
        assert!((max_dist - 9.0).abs() < 1e-5);
    }

    #[test]
    fn test_moved_object_seen_after_update() {
        let mut pruner = line_of_boxes(3);
        pruner.payload_mut(2).unwrap().aabb = Aabb::from_center_extents(Vec3::new(100.0, 0.0, 0.0), Vec3::repeat(1.0));
        pruner.update_object(2);
        let ids = collect_overlap(&mut pruner, |p, cb| p.overlap_aabb(&Aabb::from_center_extents(Vec3::new(100.0, 0.0, 0.0), Vec3::repeat(2.0)), cb));
        assert_eq!(ids, vec![2]);
    }
}
