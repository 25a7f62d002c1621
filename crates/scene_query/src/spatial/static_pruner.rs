//! Bulk-built AABB tree pruner for rarely changing objects
//!
//! Any structural or bounds change throws the tree away; the next query
//! (or an explicit [`Pruner::eager_update`]) rebuilds it from scratch.

use crate::foundation::collections::Handle;
use crate::foundation::math::Vec3;
use crate::physics::collision::bounds::Aabb;
use crate::physics::collision::intersection::{full_plane_mask, BoxVolume};
use crate::physics::collision::primitives::{Capsule, Obb, Plane, Sphere};
use super::aabb_tree::AabbTree;
use super::pruner::{CullCallback, OverlapBatcher, OverlapCallback, Pruner, Signature, StabCallback, StabStatus};
use super::pruning_pool::{PoolIndex, PruningPool, WorldBounds};

/// Pruner backed by a lazily rebuilt AABB tree
#[derive(Debug)]
pub struct StaticPruner<T> {
    pool: PruningPool<T>,
    tree: Option<AabbTree>,
    signature: Signature,
}

impl<T: WorldBounds> StaticPruner<T> {
    /// Create an empty pruner identified by `structure`
    pub fn new(structure: Handle) -> Self {
        Self::with_capacity(structure, 0)
    }

    /// Create a pruner with room for `capacity` objects
    pub fn with_capacity(structure: Handle, capacity: usize) -> Self {
        Self {
            pool: PruningPool::with_capacity(capacity),
            tree: None,
            signature: Signature::new(structure),
        }
    }

    /// Whether a tree is currently built
    pub fn has_tree(&self) -> bool {
        self.tree.is_some()
    }

    fn build_tree(&mut self) {
        self.pool.refresh_aabbs();
        if self.tree.is_none() {
            log::debug!("StaticPruner: building tree over {} objects", self.pool.len());
            self.tree = Some(AabbTree::build(self.pool.world_boxes()));
        }
    }

    fn overlap_volume<V: BoxVolume>(&mut self, volume: &V, cb: &mut OverlapCallback<'_, T>) -> bool {
        self.build_tree();
        let Some(tree) = &self.tree else { return true };
        let mut batcher = OverlapBatcher::new(&self.pool, cb);
        if !tree.overlap(volume, &mut |prim| batcher.push(prim as PoolIndex)) {
            return false;
        }
        batcher.flush()
    }
}

impl<T: WorldBounds + Send + Sync> Pruner<T> for StaticPruner<T> {
    fn add_object(&mut self, payload: T, dynamic: bool) -> Option<PoolIndex> {
        let index = self.pool.add_object(payload, dynamic)?;
        self.tree = None;
        self.signature.bump();
        Some(index)
    }

    fn remove_object(&mut self, index: PoolIndex) -> Option<T> {
        let payload = self.pool.remove_object(index, |_| {})?;
        self.tree = None;
        self.signature.bump();
        Some(payload)
    }

    fn update_object(&mut self, index: PoolIndex) {
        self.pool.invalidate_aabb(index);
        self.tree = None;
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
        self.build_tree();
    }

    fn cull(&mut self, planes: &[Plane], cb: &mut CullCallback<'_, T>) -> bool {
        self.build_tree();
        let Some(tree) = &self.tree else { return true };
        let pool = &self.pool;
        tree.cull(planes, full_plane_mask(planes.len()), &mut |prim| {
            pool.get(prim as PoolIndex).map_or(true, |object| cb(object))
        })
    }

    fn stab(&mut self, origin: &Vec3, dir: &Vec3, max_dist: &mut f32, cb: &mut StabCallback<'_, T>) -> StabStatus {
        self.build_tree();
        let Some(tree) = &self.tree else { return StabStatus::Continue };
        let pool = &self.pool;
        tree.stab(origin, dir, max_dist, &mut |prim, dist| match pool.get(prim as PoolIndex) {
            Some(object) => cb(object, dist),
            None => StabStatus::Continue,
        })
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
