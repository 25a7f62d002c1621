//! Broad-phase spatial structures
//!
//! Objects live in a [`PruningPool`]; a [`Pruner`] layers an
//! acceleration structure over the pool and answers cull, stab and
//! overlap queries with box-level precision.

pub mod aabb_tree;
pub mod dynamic_pruner;
pub mod free_pruner;
pub mod octree;
pub mod pruner;
pub mod pruning_pool;
pub mod static_pruner;

pub use aabb_tree::{AabbTree, AabbTreeBuilder, AabbTreeNode};
pub use dynamic_pruner::{BuildStage, DynamicPruner};
pub use free_pruner::FreePruner;
pub use octree::{CellLayout, LooseTreePruner, OctreeLayout, OctreePruner, QuadtreeLayout, QuadtreePruner};
pub use pruner::{
    CullCallback, OverlapCallback, Pruner, Signature, SignatureRegistry, StabCallback, StabStatus,
    OVERLAP_BATCH_SIZE,
};
pub use pruning_pool::{PoolIndex, PoolSwap, Prunable, PrunableFlags, PruningPool, WorldBounds, INVALID_POOL_INDEX};

#[cfg(test)]
pub(crate) mod test_support {
    use super::pruner::{OverlapCallback, Pruner, StabStatus};
    use super::pruning_pool::{Prunable, WorldBounds};
    use crate::foundation::math::Vec3;
    use crate::physics::collision::bounds::Aabb;
    use crate::physics::collision::primitives::Plane;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Box payload tagged with a stable id
    #[derive(Debug, Clone, PartialEq)]
    pub struct TestBox {
        pub id: u32,
        pub aabb: Aabb,
    }

    impl TestBox {
        pub fn cube(id: u32, center: Vec3, half: f32) -> Self {
            Self { id, aabb: Aabb::from_center_extents(center, Vec3::repeat(half)) }
        }
    }

    impl WorldBounds for TestBox {
        fn compute_world_aabb(&self) -> Aabb {
            self.aabb
        }
    }

    pub fn random_boxes(n: usize, seed: u64) -> Vec<TestBox> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n as u32)
            .map(|id| {
                let c = Vec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0));
                TestBox::cube(id, c, rng.gen_range(0.5..3.0))
            })
            .collect()
    }

    /// Run an overlap query and return the sorted ids it reported
    pub fn collect_overlap<P: Pruner<TestBox> + ?Sized>(
        pruner: &mut P,
        query: impl FnOnce(&mut P, &mut OverlapCallback<'_, TestBox>) -> bool,
    ) -> Vec<u32> {
        let mut ids = Vec::new();
        let mut cb = |chunk: &[&Prunable<TestBox>]| {
            ids.extend(chunk.iter().map(|p| p.payload.id));
            true
        };
        query(pruner, &mut cb);
        ids.sort_unstable();
        ids
    }

    pub fn collect_cull<P: Pruner<TestBox> + ?Sized>(pruner: &mut P, planes: &[Plane]) -> Vec<u32> {
        let mut ids = Vec::new();
        pruner.cull(planes, &mut |p: &Prunable<TestBox>| {
            ids.push(p.payload.id);
            true
        });
        ids.sort_unstable();
        ids
    }

    /// Ids whose boxes a segment touches
    pub fn collect_stab<P: Pruner<TestBox> + ?Sized>(pruner: &mut P, origin: &Vec3, dir: &Vec3, max_dist: f32) -> Vec<u32> {
        let mut ids = Vec::new();
        let mut dist = max_dist;
        pruner.stab(origin, dir, &mut dist, &mut |p: &Prunable<TestBox>, _: &mut f32| {
            ids.push(p.payload.id);
            StabStatus::Continue
        });
        ids.sort_unstable();
        ids
    }
}
