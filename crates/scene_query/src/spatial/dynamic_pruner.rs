//! AABB tree pruner for moving objects
//!
//! Moving objects only mark the tree for a refit. New objects go to a
//! side list that is scanned linearly until the next rebuild. Rebuilds
//! run progressively: a snapshot of the boxes is split a slice at a time
//! on every [`DynamicPruner::build_step`], and pool swaps that happen in
//! the meantime are replayed on the new tree before it replaces the old
//! one.

use crate::foundation::collections::Handle;
use crate::foundation::math::Vec3;
use crate::physics::collision::bounds::Aabb;
use crate::physics::collision::intersection::{full_plane_mask, planes_aabb_overlap, BoxVolume, RayAabbTester};
use crate::physics::collision::primitives::{Capsule, Obb, Plane, Sphere};
use super::aabb_tree::{AabbTree, AabbTreeBuilder, INVALID_PRIMITIVE};
use super::pruner::{CullCallback, OverlapBatcher, OverlapCallback, Pruner, Signature, StabCallback, StabStatus};
use super::pruning_pool::{PoolIndex, PoolSwap, PruningPool, WorldBounds};

/// Rebuild-rate hint used when none (or an invalid one) is given
pub const DEFAULT_REBUILD_RATE_HINT: u32 = 100;

const INVALID_NODE: u32 = INVALID_PRIMITIVE;

/// Progress of the background rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// No rebuild running
    NotStarted,
    /// Next step snapshots the boxes
    Init,
    /// Splitting nodes a slice at a time
    InProgress,
    /// Next step swaps the new tree in
    Finished,
}

#[derive(Debug)]
struct ProgressiveBuild {
    builder: AabbTreeBuilder,
    /// Pool swaps since the snapshot, replayed on the new tree
    swaps: Vec<PoolSwap>,
}

/// Refitted, progressively rebuilt AABB tree pruner
#[derive(Debug)]
pub struct DynamicPruner<T> {
    pool: PruningPool<T>,
    signature: Signature,
    tree: Option<AabbTree>,
    /// Pool index -> leaf node
    mapping: Vec<u32>,
    /// Objects not in the current tree
    added: Vec<PoolIndex>,
    needs_refit: bool,
    needs_new_tree: bool,
    stage: BuildStage,
    build: Option<ProgressiveBuild>,
    rebuild_rate: usize,
}

impl<T: WorldBounds> DynamicPruner<T> {
    /// Create an empty pruner identified by `structure`
    pub fn new(structure: Handle) -> Self {
        Self::with_rebuild_rate(structure, 0, DEFAULT_REBUILD_RATE_HINT)
    }

    /// Create a pruner that completes a rebuild in about `hint - 3` steps
    ///
    /// Hints of 3 or less fall back to the default.
    pub fn with_rebuild_rate(structure: Handle, capacity: usize, hint: u32) -> Self {
        let hint = if hint > 3 {
            hint
        } else {
            log::warn!("DynamicPruner: rebuild rate hint {} must be > 3, using {}", hint, DEFAULT_REBUILD_RATE_HINT);
            DEFAULT_REBUILD_RATE_HINT
        };
        Self {
            pool: PruningPool::with_capacity(capacity),
            signature: Signature::new(structure),
            tree: None,
            mapping: Vec::with_capacity(capacity),
            added: Vec::new(),
            needs_refit: false,
            needs_new_tree: false,
            stage: BuildStage::NotStarted,
            build: None,
            rebuild_rate: (hint - 3) as usize,
        }
    }

    /// Current stage of the background rebuild
    pub fn build_stage(&self) -> BuildStage {
        self.stage
    }

    /// Objects waiting to enter the tree
    pub fn nb_added_objects(&self) -> usize {
        self.added.len()
    }

    /// Advance the background rebuild by one slice
    ///
    /// Returns `true` when no rebuild is pending any more.
    pub fn build_step(&mut self) -> bool {
        match self.stage {
            BuildStage::NotStarted => {
                if !self.needs_new_tree {
                    return true;
                }
                self.stage = BuildStage::Init;
                false
            }
            BuildStage::Init => {
                self.pool.refresh_aabbs();
                log::debug!("DynamicPruner: starting rebuild over {} objects", self.pool.len());
                self.build = Some(ProgressiveBuild {
                    builder: AabbTreeBuilder::new(self.pool.world_boxes()),
                    swaps: Vec::new(),
                });
                self.needs_new_tree = false;
                self.stage = BuildStage::InProgress;
                false
            }
            BuildStage::InProgress => {
                if let Some(build) = &mut self.build {
                    let limit = 1 + build.builder.total_work() / self.rebuild_rate;
                    if build.builder.step(limit) {
                        self.stage = BuildStage::Finished;
                    }
                } else {
                    self.stage = BuildStage::NotStarted;
                }
                false
            }
            BuildStage::Finished => {
                if let Some(build) = self.build.take() {
                    self.install(build);
                }
                self.stage = BuildStage::NotStarted;
                true
            }
        }
    }

    fn install(&mut self, build: ProgressiveBuild) {
        let snapshot_len = build.builder.nb_primitives();
        let mut tree = build.builder.finish();
        let mut map = tree.leaf_map(snapshot_len);

        for swap in build.swaps {
            match swap {
                PoolSwap::Removed(i) => {
                    if let Some(node) = map.get_mut(i as usize) {
                        if *node != INVALID_NODE {
                            tree.invalidate_leaf(*node);
                            *node = INVALID_NODE;
                        }
                    }
                }
                PoolSwap::Moved { from, to } => {
                    let node = map.get(from as usize).copied().unwrap_or(INVALID_NODE);
                    if map.len() <= to as usize {
                        map.resize(to as usize + 1, INVALID_NODE);
                    }
                    map[to as usize] = node;
                    if let Some(slot) = map.get_mut(from as usize) {
                        *slot = INVALID_NODE;
                    }
                    if node != INVALID_NODE {
                        tree.set_leaf_primitive(node, u32::from(to));
                    }
                }
            }
        }

        map.resize(self.pool.len(), INVALID_NODE);
        self.added = (0..self.pool.len())
            .filter(|&i| map[i] == INVALID_NODE)
            .map(|i| i as PoolIndex)
            .collect();
        log::debug!(
            "DynamicPruner: installed new tree, {} objects still pending",
            self.added.len()
        );
        self.tree = Some(tree);
        self.mapping = map;
        self.needs_refit = true;
        self.needs_new_tree = !self.added.is_empty();
    }

    fn on_swap(
        tree: &mut Option<AabbTree>,
        mapping: &mut [u32],
        added: &mut Vec<PoolIndex>,
        build: &mut Option<ProgressiveBuild>,
        swap: PoolSwap,
    ) {
        if let Some(build) = build {
            build.swaps.push(swap);
        }
        match swap {
            PoolSwap::Removed(i) => {
                let node = mapping[i as usize];
                if node == INVALID_NODE {
                    if let Some(pos) = added.iter().position(|&a| a == i) {
                        added.swap_remove(pos);
                    }
                } else {
                    if let Some(tree) = tree {
                        tree.invalidate_leaf(node);
                    }
                    mapping[i as usize] = INVALID_NODE;
                }
            }
            PoolSwap::Moved { from, to } => {
                let node = mapping[from as usize];
                mapping[to as usize] = node;
                mapping[from as usize] = INVALID_NODE;
                if node == INVALID_NODE {
                    if let Some(pos) = added.iter().position(|&a| a == from) {
                        added[pos] = to;
                    }
                } else if let Some(tree) = tree {
                    tree.set_leaf_primitive(node, u32::from(to));
                }
            }
        }
    }

    /// Bring boxes and tree bounds up to date before a query
    fn prepare(&mut self) {
        self.pool.refresh_aabbs();
        if self.needs_refit {
            if let Some(tree) = &mut self.tree {
                tree.refit(self.pool.world_boxes());
            }
            self.needs_refit = false;
        }
    }

    fn overlap_volume<V: BoxVolume>(&mut self, volume: &V, cb: &mut OverlapCallback<'_, T>) -> bool {
        self.prepare();
        let mut batcher = OverlapBatcher::new(&self.pool, cb);
        if let Some(tree) = &self.tree {
            if !tree.overlap(volume, &mut |prim| batcher.push(prim as PoolIndex)) {
                return false;
            }
        }
        let boxes = self.pool.world_boxes();
        for &index in &self.added {
            let aabb = &boxes[index as usize];
            if volume.overlaps_box(&aabb.center(), &aabb.extents()) && !batcher.push(index) {
                return false;
            }
        }
        batcher.flush()
    }
}

impl<T: WorldBounds + Send + Sync> Pruner<T> for DynamicPruner<T> {
    fn add_object(&mut self, payload: T, dynamic: bool) -> Option<PoolIndex> {
        let index = self.pool.add_object(payload, dynamic)?;
        self.mapping.push(INVALID_NODE);
        self.added.push(index);
        self.needs_new_tree = true;
        self.signature.bump();
        Some(index)
    }

    fn remove_object(&mut self, index: PoolIndex) -> Option<T> {
        let Self { pool, tree, mapping, added, build, .. } = self;
        let payload = pool.remove_object(index, |swap| Self::on_swap(tree, mapping, added, build, swap))?;
        self.mapping.truncate(self.pool.len());
        self.needs_new_tree = true;
        self.signature.bump();
        Some(payload)
    }

    fn update_object(&mut self, index: PoolIndex) {
        self.pool.invalidate_aabb(index);
        self.needs_refit = true;
        self.needs_new_tree = true;
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
        while !self.build_step() {}
        self.prepare();
    }

    fn cull(&mut self, planes: &[Plane], cb: &mut CullCallback<'_, T>) -> bool {
        self.prepare();
        let mask = full_plane_mask(planes.len());
        let pool = &self.pool;
        if let Some(tree) = &self.tree {
            let completed = tree.cull(planes, mask, &mut |prim| {
                pool.get(prim as PoolIndex).map_or(true, |object| cb(object))
            });
            if !completed {
                return false;
            }
        }
        for &index in &self.added {
            let aabb = &pool.world_boxes()[index as usize];
            if planes_aabb_overlap(&aabb.center(), &aabb.extents(), planes, mask).is_some() {
                if let Some(object) = pool.get(index) {
                    if !cb(object) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn stab(&mut self, origin: &Vec3, dir: &Vec3, max_dist: &mut f32, cb: &mut StabCallback<'_, T>) -> StabStatus {
        self.prepare();
        let pool = &self.pool;
        if let Some(tree) = &self.tree {
            let status = tree.stab(origin, dir, max_dist, &mut |prim, dist| match pool.get(prim as PoolIndex) {
                Some(object) => cb(object, dist),
                None => StabStatus::Continue,
            });
            if status == StabStatus::Stop {
                return StabStatus::Stop;
            }
        }
        let mut tester = RayAabbTester::new(origin, dir, *max_dist);
        for &index in &self.added {
            let aabb = &pool.world_boxes()[index as usize];
            if !tester.overlaps(&aabb.center(), &aabb.extents()) {
                continue;
            }
            let Some(object) = pool.get(index) else { continue };
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

    fn build_step(&mut self) -> bool {
        DynamicPruner::build_step(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::free_pruner::FreePruner;
    use crate::spatial::test_support::{collect_overlap, random_boxes, TestBox};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn everything() -> Aabb {
        Aabb::new(Vec3::repeat(-1000.0), Vec3::repeat(1000.0))
    }

    #[test]
    fn test_added_objects_visible_before_rebuild() {
        let mut pruner = DynamicPruner::new(0);
        for b in random_boxes(10, 1) {
            pruner.add_object(b, true);
        }
        assert_eq!(pruner.nb_added_objects(), 10);
        let ids = collect_overlap(&mut pruner, |p, cb| p.overlap_aabb(&everything(), cb));
        assert_eq!(ids.len(), 10);
        pruner.eager_update();
        assert_eq!(pruner.nb_added_objects(), 0);
        assert_eq!(pruner.build_stage(), BuildStage::NotStarted);
        let ids = collect_overlap(&mut pruner, |p, cb| p.overlap_aabb(&everything(), cb));
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn test_progressive_stages() {
        let mut pruner = DynamicPruner::with_rebuild_rate(0, 0, 13);
        for b in random_boxes(100, 2) {
            pruner.add_object(b, true);
        }
        assert!(!pruner.build_step());
        assert_eq!(pruner.build_stage(), BuildStage::Init);
        assert!(!pruner.build_step());
        assert_eq!(pruner.build_stage(), BuildStage::InProgress);
        let mut steps = 0;
        while pruner.build_stage() == BuildStage::InProgress {
            pruner.build_step();
            steps += 1;
        }
        assert!(steps > 1);
        assert_eq!(pruner.build_stage(), BuildStage::Finished);
        assert!(pruner.build_step());
        assert_eq!(pruner.nb_added_objects(), 0);
    }

    #[test]
    fn test_removal_during_rebuild_is_replayed() {
        let mut pruner = DynamicPruner::with_rebuild_rate(0, 0, 8);
        for b in random_boxes(40, 3) {
            pruner.add_object(b, true);
        }
        pruner.build_step();
        pruner.build_step();
        assert_eq!(pruner.build_stage(), BuildStage::InProgress);

        let removed = pruner.remove_object(5).unwrap();
        pruner.add_object(TestBox::cube(999, Vec3::new(1.0, 2.0, 3.0), 0.5), true);
        while !pruner.build_step() {}

        let ids = collect_overlap(&mut pruner, |p, cb| p.overlap_aabb(&everything(), cb));
        assert_eq!(ids.len(), 40);
        assert!(!ids.contains(&removed.id));
        assert!(ids.contains(&999));
        // The late addition was not in the snapshot
        assert_eq!(pruner.nb_added_objects(), 1);
    }

    #[test]
    fn test_random_churn_matches_free_pruner() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut dynamic = DynamicPruner::with_rebuild_rate(0, 0, 10);
        let mut free = FreePruner::new(1);
        let mut next_id = 0u32;

        for round in 0..400 {
            let op = rng.gen_range(0..10);
            if op < 4 || free.is_empty() {
                let c = Vec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0));
                let b = TestBox::cube(next_id, c, rng.gen_range(0.5..3.0));
                next_id += 1;
                assert_eq!(dynamic.add_object(b.clone(), true), free.add_object(b, true));
            } else if op < 6 {
                let index = rng.gen_range(0..free.len()) as PoolIndex;
                assert_eq!(dynamic.remove_object(index), free.remove_object(index));
            } else {
                let index = rng.gen_range(0..free.len()) as PoolIndex;
                let offset = Vec3::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), 0.0);
                for pruner in [&mut dynamic as &mut dyn Pruner<TestBox>, &mut free] {
                    let payload = pruner.payload_mut(index).unwrap();
                    payload.aabb = Aabb::from_center_extents(payload.aabb.center() + offset, payload.aabb.extents());
                    pruner.update_object(index);
                }
            }
            dynamic.build_step();

            if round % 10 == 0 {
                let sphere = Sphere::new(Vec3::new(rng.gen_range(-30.0..30.0), 0.0, 0.0), 25.0);
                assert_eq!(
                    collect_overlap(&mut dynamic, |p, cb| p.overlap_sphere(&sphere, cb)),
                    collect_overlap(&mut free, |p, cb| p.overlap_sphere(&sphere, cb)),
                );
            }
        }
    }

    #[test]
    fn test_invalid_rate_hint_falls_back() {
        let pruner: DynamicPruner<TestBox> = DynamicPruner::with_rebuild_rate(0, 0, 2);
        assert_eq!(pruner.rebuild_rate, (DEFAULT_REBUILD_RATE_HINT - 3) as usize);
    }
}
