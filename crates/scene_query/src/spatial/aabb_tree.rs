//! Binary AABB tree
//!
//! Built top-down over a set of primitive boxes with one primitive per
//! leaf. The same tree backs the static pruner, the dynamic pruner and
//! the triangle-mesh collider. Construction can be run to completion in
//! one go or sliced into budgeted steps through [`AabbTreeBuilder`].

use crate::foundation::math::Vec3;
use crate::physics::collision::bounds::Aabb;
use crate::physics::collision::intersection::{planes_aabb_overlap, BoxVolume, RayAabbTester};
use crate::physics::collision::primitives::Plane;
use super::pruner::StabStatus;

/// Primitive index marking a leaf whose object has been removed
pub const INVALID_PRIMITIVE: u32 = u32::MAX;

/// Single node in the tree hierarchy
#[derive(Debug, Clone, Copy)]
pub struct AabbTreeNode {
    /// Bounds of everything below this node
    pub bounds: Aabb,
    /// Leaf: primitive index. Internal: first child; the second follows it
    data: u32,
    leaf: bool,
}

impl AabbTreeNode {
    fn placeholder() -> Self {
        Self {
            bounds: Aabb::empty(),
            data: INVALID_PRIMITIVE,
            leaf: true,
        }
    }

    /// Check if this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    /// Primitive stored in a leaf, `None` for internal or invalidated leaves
    pub fn primitive(&self) -> Option<u32> {
        (self.leaf && self.data != INVALID_PRIMITIVE).then_some(self.data)
    }

    /// Children of an internal node
    pub fn children(&self) -> Option<(usize, usize)> {
        (!self.leaf).then(|| (self.data as usize, self.data as usize + 1))
    }
}

/// Binary AABB tree with one primitive per leaf
#[derive(Debug, Clone, Default)]
pub struct AabbTree {
    nodes: Vec<AabbTreeNode>,
}

impl AabbTree {
    /// Build a complete tree over `boxes`
    pub fn build(boxes: &[Aabb]) -> Self {
        let mut builder = AabbTreeBuilder::new(boxes);
        builder.step(usize::MAX);
        builder.finish()
    }

    /// Whether the tree has no node
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, root first; children always follow their parent
    pub fn nodes(&self) -> &[AabbTreeNode] {
        &self.nodes
    }

    /// Bounds of the root, if any
    pub fn root_bounds(&self) -> Option<Aabb> {
        self.nodes.first().map(|n| n.bounds)
    }

    /// Map from primitive index to the leaf holding it
    pub fn leaf_map(&self, nb_primitives: usize) -> Vec<u32> {
        let mut map = vec![INVALID_PRIMITIVE; nb_primitives];
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(prim) = node.primitive() {
                if let Some(slot) = map.get_mut(prim as usize) {
                    *slot = i as u32;
                }
            }
        }
        map
    }

    /// Point a leaf at another primitive
    pub fn set_leaf_primitive(&mut self, node: u32, primitive: u32) {
        if let Some(n) = self.nodes.get_mut(node as usize) {
            debug_assert!(n.leaf);
            n.data = primitive;
        }
    }

    /// Detach a leaf from its primitive; it is skipped until the next rebuild
    pub fn invalidate_leaf(&mut self, node: u32) {
        if let Some(n) = self.nodes.get_mut(node as usize) {
            debug_assert!(n.leaf);
            n.data = INVALID_PRIMITIVE;
            n.bounds = Aabb::empty();
        }
    }

    /// Recompute every node's bounds from the current primitive boxes
    pub fn refit(&mut self, boxes: &[Aabb]) {
        for i in (0..self.nodes.len()).rev() {
            let node = self.nodes[i];
            self.nodes[i].bounds = match node.children() {
                Some((a, b)) => self.nodes[a].bounds.union(&self.nodes[b].bounds),
                None => node
                    .primitive()
                    .and_then(|p| boxes.get(p as usize).copied())
                    .unwrap_or_else(Aabb::empty),
            };
        }
    }

    /// Report every primitive below `root`
    fn dump(&self, root: usize, cb: &mut impl FnMut(u32) -> bool) -> bool {
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            match node.children() {
                Some((a, b)) => {
                    stack.push(b);
                    stack.push(a);
                }
                None => {
                    if let Some(prim) = node.primitive() {
                        if !cb(prim) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Report primitives whose box touches `volume`
    ///
    /// Subtrees fully inside the volume are reported without further
    /// tests. Returns `false` if the callback aborted.
    pub fn overlap<V: BoxVolume + ?Sized>(&self, volume: &V, cb: &mut impl FnMut(u32) -> bool) -> bool {
        if self.nodes.is_empty() {
            return true;
        }
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bounds.is_valid() {
                continue;
            }
            let center = node.bounds.center();
            let extents = node.bounds.extents();
            if !volume.overlaps_box(&center, &extents) {
                continue;
            }
            match node.children() {
                Some((a, b)) => {
                    if volume.contains_box(&center, &extents) {
                        if !self.dump(index, cb) {
                            return false;
                        }
                    } else {
                        stack.push(b);
                        stack.push(a);
                    }
                }
                None => {
                    if let Some(prim) = node.primitive() {
                        if !cb(prim) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Report primitives not fully outside the plane set
    ///
    /// Returns `false` if the callback aborted.
    pub fn cull(&self, planes: &[Plane], mask: u32, cb: &mut impl FnMut(u32) -> bool) -> bool {
        if self.nodes.is_empty() {
            return true;
        }
        let mut stack = vec![(0usize, mask)];
        while let Some((index, in_mask)) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bounds.is_valid() {
                continue;
            }
            let Some(out_mask) = planes_aabb_overlap(&node.bounds.center(), &node.bounds.extents(), planes, in_mask) else {
                continue;
            };
            if out_mask == 0 {
                if !self.dump(index, cb) {
                    return false;
                }
                continue;
            }
            match node.children() {
                Some((a, b)) => {
                    stack.push((b, out_mask));
                    stack.push((a, out_mask));
                }
                None => {
                    if let Some(prim) = node.primitive() {
                        if !cb(prim) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Walk leaves touched by a ray or segment, nearest child first
    ///
    /// `max_dist` may be shrunk by the callback through
    /// [`StabStatus::UpdateMaxDist`]; the remaining traversal then uses the
    /// shorter segment.
    pub fn stab(
        &self,
        origin: &Vec3,
        dir: &Vec3,
        max_dist: &mut f32,
        cb: &mut impl FnMut(u32, &mut f32) -> StabStatus,
    ) -> StabStatus {
        if self.nodes.is_empty() {
            return StabStatus::Continue;
        }
        let mut tester = RayAabbTester::new(origin, dir, *max_dist);
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bounds.is_valid() || !tester.overlaps(&node.bounds.center(), &node.bounds.extents()) {
                continue;
            }
            match node.children() {
                Some((a, b)) => {
                    // Visit the child nearer along the ray first
                    let delta = self.nodes[b].bounds.center() - self.nodes[a].bounds.center();
                    if delta.dot(dir) > 0.0 {
                        stack.push(b);
                        stack.push(a);
                    } else {
                        stack.push(a);
                        stack.push(b);
                    }
                }
                None => {
                    let Some(prim) = node.primitive() else { continue };
                    match cb(prim, max_dist) {
                        StabStatus::Stop => return StabStatus::Stop,
                        StabStatus::UpdateMaxDist => {
                            tester = RayAabbTester::new(origin, dir, *max_dist);
                        }
                        StabStatus::Continue => {}
                    }
                }
            }
        }
        StabStatus::Continue
    }
}

/// Incremental top-down tree construction
///
/// Works on a snapshot of the primitive boxes taken at creation, so the
/// live boxes may keep changing while a build is in flight.
#[derive(Debug, Clone)]
pub struct AabbTreeBuilder {
    boxes: Vec<Aabb>,
    centers: Vec<Vec3>,
    indices: Vec<u32>,
    nodes: Vec<AabbTreeNode>,
    /// Pending (node, start, end) ranges of `indices`
    pending: Vec<(usize, usize, usize)>,
    total_work: usize,
    done_work: usize,
}

impl AabbTreeBuilder {
    /// Snapshot `boxes` and prepare the root
    pub fn new(boxes: &[Aabb]) -> Self {
        let n = boxes.len();
        let mut builder = Self {
            boxes: boxes.to_vec(),
            centers: boxes.iter().map(Aabb::center).collect(),
            indices: (0..n as u32).collect(),
            nodes: Vec::with_capacity(n.saturating_mul(2)),
            pending: Vec::new(),
            total_work: n * (usize::BITS - n.leading_zeros()) as usize,
            done_work: 0,
        };
        if n > 0 {
            builder.nodes.push(AabbTreeNode::placeholder());
            builder.pending.push((0, 0, n));
        }
        builder
    }

    /// Estimated work units for the whole build
    pub fn total_work(&self) -> usize {
        self.total_work
    }

    /// Work units spent so far
    pub fn done_work(&self) -> usize {
        self.done_work
    }

    /// Whether nothing is left to split
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of primitives in the snapshot
    pub fn nb_primitives(&self) -> usize {
        self.boxes.len()
    }

    /// Process pending nodes until `budget` work units are spent
    ///
    /// Returns `true` once the build is complete.
    pub fn step(&mut self, budget: usize) -> bool {
        let mut spent = 0usize;
        while spent < budget {
            let Some((node, start, end)) = self.pending.pop() else { break };
            spent = spent.saturating_add(end - start);
            self.split(node, start, end);
        }
        self.done_work = self.done_work.saturating_add(spent);
        self.is_finished()
    }

    fn split(&mut self, node: usize, start: usize, end: usize) {
        let mut bounds = Aabb::empty();
        for &i in &self.indices[start..end] {
            bounds.include(&self.boxes[i as usize]);
        }
        self.nodes[node].bounds = bounds;

        if end - start == 1 {
            self.nodes[node].data = self.indices[start];
            self.nodes[node].leaf = true;
            return;
        }

        // Split at the geometric center of the node along its largest axis
        let axis = bounds.largest_axis();
        let split_value = bounds.center()[axis];
        let slice = &mut self.indices[start..end];
        let mut mid = 0usize;
        for k in 0..slice.len() {
            if self.centers[slice[k] as usize][axis] < split_value {
                slice.swap(k, mid);
                mid += 1;
            }
        }
        if mid == 0 || mid == slice.len() {
            // Degenerate split: fall back to the median
            mid = slice.len() / 2;
            let centers = &self.centers;
            slice.select_nth_unstable_by(mid, |a, b| {
                centers[*a as usize][axis].total_cmp(&centers[*b as usize][axis])
            });
        }

        let first_child = self.nodes.len();
        self.nodes.push(AabbTreeNode::placeholder());
        self.nodes.push(AabbTreeNode::placeholder());
        self.nodes[node].data = first_child as u32;
        self.nodes[node].leaf = false;
        self.pending.push((first_child + 1, start + mid, end));
        self.pending.push((first_child, start, start + mid));
    }

    /// Take the finished tree
    pub fn finish(self) -> AabbTree {
        debug_assert!(self.pending.is_empty());
        AabbTree { nodes: self.nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collision::primitives::Sphere;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_boxes(n: usize, seed: u64) -> Vec<Aabb> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let c = Vec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0));
                let e = Vec3::new(rng.gen_range(0.1..3.0), rng.gen_range(0.1..3.0), rng.gen_range(0.1..3.0));
                Aabb::from_center_extents(c, e)
            })
            .collect()
    }

    #[test]
    fn test_tree_build_covers_every_primitive() {
        let boxes = random_boxes(100, 1);
        let tree = AabbTree::build(&boxes);
        assert_eq!(tree.nodes().len(), 199);
        let map = tree.leaf_map(boxes.len());
        assert!(map.iter().all(|&n| n != INVALID_PRIMITIVE));
        let root = tree.root_bounds().unwrap();
        assert!(boxes.iter().all(|b| root.contains(b)));
    }

    #[test]
    fn test_identical_boxes_use_median_split() {
        let boxes = vec![Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0)); 9];
        let tree = AabbTree::build(&boxes);
        assert_eq!(tree.nodes().len(), 17);
    }

    #[test]
    fn test_overlap_matches_brute_force() {
        let boxes = random_boxes(200, 2);
        let tree = AabbTree::build(&boxes);
        let sphere = Sphere::new(Vec3::new(5.0, -3.0, 10.0), 20.0);
        let mut found = Vec::new();
        tree.overlap(&sphere, &mut |p| {
            found.push(p);
            true
        });
        found.sort_unstable();
        let expected: Vec<u32> = (0..boxes.len() as u32)
            .filter(|&i| sphere.overlaps_box(&boxes[i as usize].center(), &boxes[i as usize].extents()))
            .collect();
        // Whole-subtree dumps may only report boxes that are inside anyway
        assert_eq!(found, expected);
    }

    #[test]
    fn test_stab_closest_first_and_shrink() {
        let boxes: Vec<Aabb> = (0..10)
            .map(|i| Aabb::from_center_extents(Vec3::new(i as f32 * 10.0, 0.0, 0.0), Vec3::repeat(1.0)))
            .collect();
        let tree = AabbTree::build(&boxes);
        let mut max_dist = f32::MAX;
        let mut visited = Vec::new();
        tree.stab(&Vec3::new(-5.0, 0.0, 0.0), &Vec3::x(), &mut max_dist, &mut |p, dist| {
            visited.push(p);
            let hit = boxes[p as usize].intersect_ray(&Vec3::new(-5.0, 0.0, 0.0), &Vec3::x(), *dist);
            match hit {
                Some(t) if t < *dist => {
                    *dist = t;
                    StabStatus::UpdateMaxDist
                }
                _ => StabStatus::Continue,
            }
        });
        assert_eq!(visited, vec![0]);
        assert!((max_dist - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_progressive_build_matches_full_build() {
        let boxes = random_boxes(64, 3);
        let mut builder = AabbTreeBuilder::new(&boxes);
        let mut steps = 0;
        while !builder.step(16) {
            steps += 1;
        }
        assert!(steps > 1);
        let tree = builder.finish();
        assert_eq!(tree.nodes().len(), AabbTree::build(&boxes).nodes().len());
    }

    #[test]
    fn test_refit_after_move_and_invalidate() {
        let mut boxes = random_boxes(20, 4);
        let mut tree = AabbTree::build(&boxes);
        boxes[3] = Aabb::from_center_extents(Vec3::new(500.0, 0.0, 0.0), Vec3::repeat(1.0));
        let map = tree.leaf_map(boxes.len());
        tree.invalidate_leaf(map[7]);
        tree.refit(&boxes);
        assert!(tree.root_bounds().unwrap().contains(&boxes[3]));

        let mut found = Vec::new();
        let everything = Aabb::new(Vec3::repeat(-1000.0), Vec3::repeat(1000.0));
        tree.overlap(&everything, &mut |p| {
            found.push(p);
            true
        });
        assert_eq!(found.len(), 19);
        assert!(!found.contains(&7));
    }
}
