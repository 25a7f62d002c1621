//! Linear loose octree and quadtree pruners
//!
//! Cells live in one flat array addressed by Morton index, level by
//! level, so parent and child lookups are bit shifts:
//!
//! ```text
//! child  = (parent << SHIFT) + 1 + child_number
//! parent = (child - 1) >> SHIFT
//! ```
//!
//! Each cell box is loose: twice the size of the regular subdivision.
//! An object whose radius fits half the regular cell size is therefore
//! contained by the loose box of the cell holding its center, and its
//! insertion depth follows from the radius alone. Small moves inside the
//! loose box need no relinking.
//!
//! The quadtree partitions the two axes perpendicular to the up axis.
//! Along the up axis every cell spans the range covered so far by the
//! inserted objects.

use std::fmt;
use std::marker::PhantomData;

use crate::foundation::collections::Handle;
use crate::foundation::math::Vec3;
use crate::physics::collision::bounds::Aabb;
use crate::physics::collision::intersection::{full_plane_mask, planes_aabb_overlap, BoxVolume, RayAabbTester};
use crate::physics::collision::primitives::{Capsule, Obb, Plane, Sphere};
use super::pruner::{CullCallback, OverlapBatcher, OverlapCallback, Pruner, Signature, StabCallback, StabStatus};
use super::pruning_pool::{PoolIndex, PoolSwap, PruningPool, WorldBounds};

const NONE: u32 = u32::MAX;
const MIN_WORLD_EXTENT: f32 = 1.0e-3;

/// Dimensionality of a loose tree
pub trait CellLayout: fmt::Debug + Send + Sync + 'static {
    /// Number of partitioned axes
    const DIMENSIONS: u32;
    /// Deepest recommended subdivision level
    const MAX_LEVEL: u32;
    /// Name used in log messages
    const NAME: &'static str;

    /// Partitioned axes first, then the unpartitioned ones
    fn axes(up_axis: usize) -> [usize; 3];

    /// Children per cell
    fn nb_children() -> u32 {
        1 << Self::DIMENSIONS
    }
}

/// Eight children per cell over X, Y and Z
#[derive(Debug, Clone, Copy)]
pub struct OctreeLayout;

impl CellLayout for OctreeLayout {
    const DIMENSIONS: u32 = 3;
    const MAX_LEVEL: u32 = 5;
    const NAME: &'static str = "Octree";

    fn axes(_up_axis: usize) -> [usize; 3] {
        [0, 1, 2]
    }
}

/// Four children per cell over the ground plane
#[derive(Debug, Clone, Copy)]
pub struct QuadtreeLayout;

impl CellLayout for QuadtreeLayout {
    const DIMENSIONS: u32 = 2;
    const MAX_LEVEL: u32 = 7;
    const NAME: &'static str = "Quadtree";

    fn axes(up_axis: usize) -> [usize; 3] {
        match up_axis {
            0 => [1, 2, 0],
            2 => [0, 1, 2],
            _ => [0, 2, 1],
        }
    }
}

/// Loose octree pruner
pub type OctreePruner<T> = LooseTreePruner<T, OctreeLayout>;

/// Loose quadtree pruner
pub type QuadtreePruner<T> = LooseTreePruner<T, QuadtreeLayout>;

/// Index of the first cell at `level`
fn level_offset<L: CellLayout>(level: u32) -> u32 {
    let c = L::nb_children();
    (c.pow(level) - 1) / (c - 1)
}

/// Interleave per-axis grid coordinates into a Morton index
fn morton_encode<L: CellLayout>(coords: &[u32; 3], level: u32) -> u32 {
    let dims = L::DIMENSIONS;
    let mut index = 0;
    for bit in 0..level {
        for d in 0..dims {
            index |= ((coords[d as usize] >> bit) & 1) << (bit * dims + d);
        }
    }
    index
}

fn morton_decode<L: CellLayout>(index: u32, level: u32) -> [u32; 3] {
    let dims = L::DIMENSIONS;
    let mut coords = [0u32; 3];
    for bit in 0..level {
        for d in 0..dims {
            coords[d as usize] |= ((index >> (bit * dims + d)) & 1) << bit;
        }
    }
    coords
}

fn parent_cell<L: CellLayout>(cell: u32) -> u32 {
    (cell - 1) >> L::DIMENSIONS
}

fn first_child<L: CellLayout>(cell: u32) -> u32 {
    (cell << L::DIMENSIONS) + 1
}

/// Flat loose tree with per-cell linked lists over pool indices
struct LooseTree<L> {
    world_box: Aabb,
    world_min: Vec3,
    world_size: f32,
    max_depth: u32,
    nb_cells: u32,
    axes: [usize; 3],
    up_min: f32,
    up_max: f32,
    /// Objects in the cell and all its descendants
    counts: Vec<u32>,
    heads: Vec<u32>,
    owner: Vec<u32>,
    prev: Vec<u32>,
    next: Vec<u32>,
    _layout: PhantomData<L>,
}

impl<L> fmt::Debug for LooseTree<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LooseTree")
            .field("world_box", &self.world_box)
            .field("world_size", &self.world_size)
            .field("max_depth", &self.max_depth)
            .field("nb_cells", &self.nb_cells)
            .field("nb_objects", &self.counts.first().copied().unwrap_or(0))
            .finish()
    }
}

impl<L: CellLayout> LooseTree<L> {
    fn new(world_box: Aabb, max_depth: u32, up_axis: usize) -> Self {
        let axes = L::axes(up_axis);
        let center = world_box.center();
        let extents = world_box.extents();
        let half = (0..L::DIMENSIONS as usize)
            .map(|d| extents[axes[d]])
            .fold(MIN_WORLD_EXTENT, f32::max);
        let nb_cells = level_offset::<L>(max_depth + 1);
        let up = axes[2];
        Self {
            world_box,
            world_min: center - Vec3::repeat(half),
            world_size: half * 2.0,
            max_depth,
            nb_cells,
            axes,
            up_min: world_box.min[up],
            up_max: world_box.max[up],
            counts: vec![0; nb_cells as usize],
            heads: vec![NONE; nb_cells as usize],
            owner: Vec::new(),
            prev: Vec::new(),
            next: Vec::new(),
            _layout: PhantomData,
        }
    }

    fn nb_objects(&self) -> u32 {
        self.counts[0]
    }

    fn cell_level(&self, cell: u32) -> u32 {
        let mut level = 0;
        while level < self.max_depth && level_offset::<L>(level + 1) <= cell {
            level += 1;
        }
        level
    }

    /// Loose box of a cell
    fn cell_box(&self, cell: u32) -> Aabb {
        let level = self.cell_level(cell);
        let coords = morton_decode::<L>(cell - level_offset::<L>(level), level);
        let size = self.world_size / (1u32 << level) as f32;
        let mut center = Vec3::zeros();
        let mut extents = Vec3::zeros();
        let dims = L::DIMENSIONS as usize;
        for d in 0..dims {
            let a = self.axes[d];
            center[a] = self.world_min[a] + (coords[d] as f32 + 0.5) * size;
            extents[a] = size;
        }
        for &a in &self.axes[dims..] {
            center[a] = 0.5 * (self.up_min + self.up_max);
            extents[a] = 0.5 * (self.up_max - self.up_min);
        }
        Aabb::from_center_extents(center, extents)
    }

    fn depth_for_radius(&self, radius: f32) -> u32 {
        if radius <= 0.0 {
            return self.max_depth;
        }
        let level = (self.world_size / (2.0 * radius)).log2().floor();
        if level <= 0.0 {
            0
        } else {
            (level as u32).min(self.max_depth)
        }
    }

    fn fits(&self, cell: u32, aabb: &Aabb) -> bool {
        self.cell_box(cell).contains(aabb)
    }

    fn owner_of(&self, index: u32) -> Option<u32> {
        self.owner.get(index as usize).copied().filter(|&cell| cell != NONE)
    }

    /// Link an object into its tightest cell; `false` if it does not fit the world
    fn insert(&mut self, index: u32, aabb: &Aabb) -> bool {
        let dims = L::DIMENSIONS as usize;
        let center = aabb.center();
        let extents = aabb.extents();
        let radius = (0..dims).map(|d| extents[self.axes[d]]).fold(0.0, f32::max);

        if !(radius <= self.world_size * 0.5) {
            log::warn!("{}: object {} is too big for the world box, skipping it", L::NAME, index);
            return false;
        }
        let inside = (0..dims).all(|d| {
            let a = self.axes[d];
            center[a] >= self.world_box.min[a] && center[a] <= self.world_box.max[a]
        });
        if !inside {
            log::warn!("{}: object {} is outside the world box, skipping it", L::NAME, index);
            return false;
        }

        for &a in &self.axes[dims..] {
            self.up_min = self.up_min.min(aabb.min[a]);
            self.up_max = self.up_max.max(aabb.max[a]);
        }

        let depth = self.depth_for_radius(radius);
        let stride = 1u32 << depth;
        let coeff = stride as f32 / self.world_size;
        let mut coords = [0u32; 3];
        for d in 0..dims {
            let a = self.axes[d];
            coords[d] = (((center[a] - self.world_min[a]) * coeff) as u32).min(stride - 1);
        }
        let mut cell = level_offset::<L>(depth) + morton_encode::<L>(&coords, depth);

        // A child may still contain the whole object
        let child = first_child::<L>(cell);
        if child < self.nb_cells {
            if let Some(better) = (child..child + L::nb_children()).find(|&c| self.fits(c, aabb)) {
                cell = better;
            }
        }
        // Rounding at cell borders
        while cell != 0 && !self.fits(cell, aabb) {
            cell = parent_cell::<L>(cell);
        }

        self.link(index, cell);
        true
    }

    fn link(&mut self, index: u32, cell: u32) {
        let slot = index as usize;
        if self.owner.len() <= slot {
            self.owner.resize(slot + 1, NONE);
            self.prev.resize(slot + 1, NONE);
            self.next.resize(slot + 1, NONE);
        }
        let head = self.heads[cell as usize];
        self.owner[slot] = cell;
        self.prev[slot] = NONE;
        self.next[slot] = head;
        if head != NONE {
            self.prev[head as usize] = index;
        }
        self.heads[cell as usize] = index;

        let mut current = cell;
        loop {
            self.counts[current as usize] += 1;
            if current == 0 {
                break;
            }
            current = parent_cell::<L>(current);
        }
    }

    fn unlink(&mut self, index: u32) -> bool {
        let Some(cell) = self.owner_of(index) else { return false };
        let slot = index as usize;
        let (prev, next) = (self.prev[slot], self.next[slot]);
        if prev == NONE {
            self.heads[cell as usize] = next;
        } else {
            self.next[prev as usize] = next;
        }
        if next != NONE {
            self.prev[next as usize] = prev;
        }
        self.owner[slot] = NONE;
        self.prev[slot] = NONE;
        self.next[slot] = NONE;

        let mut current = cell;
        loop {
            self.counts[current as usize] -= 1;
            if current == 0 {
                break;
            }
            current = parent_cell::<L>(current);
        }
        true
    }

    /// Follow an object that changed pool index
    fn relocate(&mut self, from: u32, to: u32) {
        let Some(cell) = self.owner_of(from) else { return };
        let (src, dst) = (from as usize, to as usize);
        if self.owner.len() <= dst {
            self.owner.resize(dst + 1, NONE);
            self.prev.resize(dst + 1, NONE);
            self.next.resize(dst + 1, NONE);
        }
        let (prev, next) = (self.prev[src], self.next[src]);
        self.owner[dst] = cell;
        self.prev[dst] = prev;
        self.next[dst] = next;
        if prev == NONE {
            self.heads[cell as usize] = to;
        } else {
            self.next[prev as usize] = to;
        }
        if next != NONE {
            self.prev[next as usize] = to;
        }
        self.owner[src] = NONE;
        self.prev[src] = NONE;
        self.next[src] = NONE;
    }

    fn truncate(&mut self, len: usize) {
        self.owner.truncate(len);
        self.prev.truncate(len);
        self.next.truncate(len);
    }

    fn objects_in(&self, cell: u32) -> impl Iterator<Item = u32> + '_ {
        let head = self.heads[cell as usize];
        std::iter::successors((head != NONE).then_some(head), move |&o| {
            let next = self.next[o as usize];
            (next != NONE).then_some(next)
        })
    }

    fn children(&self, cell: u32) -> std::ops::Range<u32> {
        let child = first_child::<L>(cell);
        if child < self.nb_cells {
            child..child + L::nb_children()
        } else {
            0..0
        }
    }

    /// Report every object of a subtree
    fn dump(&self, root: u32, cb: &mut impl FnMut(u32) -> bool) -> bool {
        let mut stack = vec![root];
        while let Some(cell) = stack.pop() {
            if self.counts[cell as usize] == 0 {
                continue;
            }
            for object in self.objects_in(cell) {
                if !cb(object) {
                    return false;
                }
            }
            stack.extend(self.children(cell));
        }
        true
    }

    fn overlap<V: BoxVolume + ?Sized>(&self, volume: &V, boxes: &[Aabb], cb: &mut impl FnMut(u32) -> bool) -> bool {
        let mut stack = vec![0u32];
        while let Some(cell) = stack.pop() {
            if self.counts[cell as usize] == 0 {
                continue;
            }
            let bounds = self.cell_box(cell);
            let (center, extents) = (bounds.center(), bounds.extents());
            if !volume.overlaps_box(&center, &extents) {
                continue;
            }
            if volume.contains_box(&center, &extents) {
                if !self.dump(cell, cb) {
                    return false;
                }
                continue;
            }
            for object in self.objects_in(cell) {
                let aabb = &boxes[object as usize];
                if volume.overlaps_box(&aabb.center(), &aabb.extents()) && !cb(object) {
                    return false;
                }
            }
            stack.extend(self.children(cell));
        }
        true
    }

    fn cull(&self, planes: &[Plane], mask: u32, boxes: &[Aabb], cb: &mut impl FnMut(u32) -> bool) -> bool {
        let mut stack = vec![(0u32, mask)];
        while let Some((cell, in_mask)) = stack.pop() {
            if self.counts[cell as usize] == 0 {
                continue;
            }
            let bounds = self.cell_box(cell);
            let Some(out_mask) = planes_aabb_overlap(&bounds.center(), &bounds.extents(), planes, in_mask) else {
                continue;
            };
            if out_mask == 0 {
                if !self.dump(cell, cb) {
                    return false;
                }
                continue;
            }
            for object in self.objects_in(cell) {
                let aabb = &boxes[object as usize];
                if planes_aabb_overlap(&aabb.center(), &aabb.extents(), planes, out_mask).is_some() && !cb(object) {
                    return false;
                }
            }
            stack.extend(self.children(cell).map(|child| (child, out_mask)));
        }
        true
    }

    fn stab(
        &self,
        origin: &Vec3,
        dir: &Vec3,
        max_dist: &mut f32,
        boxes: &[Aabb],
        cb: &mut impl FnMut(u32, &mut f32) -> StabStatus,
    ) -> StabStatus {
        // Child number bits flipped so the first child is the nearest
        let mut flip = 0u32;
        for d in 0..L::DIMENSIONS {
            if dir[self.axes[d as usize]] < 0.0 {
                flip |= 1 << d;
            }
        }
        let mut tester = RayAabbTester::new(origin, dir, *max_dist);
        let mut stack = vec![0u32];
        while let Some(cell) = stack.pop() {
            if self.counts[cell as usize] == 0 {
                continue;
            }
            if !tester.overlaps_aabb(&self.cell_box(cell)) {
                continue;
            }
            for object in self.objects_in(cell) {
                if !tester.overlaps_aabb(&boxes[object as usize]) {
                    continue;
                }
                match cb(object, max_dist) {
                    StabStatus::Stop => return StabStatus::Stop,
                    StabStatus::UpdateMaxDist => tester = RayAabbTester::new(origin, dir, *max_dist),
                    StabStatus::Continue => {}
                }
            }
            let children = self.children(cell);
            if !children.is_empty() {
                let first = children.start;
                for number in (0..L::nb_children()).rev() {
                    stack.push(first + (number ^ flip));
                }
            }
        }
        StabStatus::Continue
    }
}

/// Pruner backed by a lazily built loose tree
///
/// Objects that do not fit the world box are kept in an overflow list
/// and scanned linearly.
#[derive(Debug)]
pub struct LooseTreePruner<T, L> {
    pool: PruningPool<T>,
    signature: Signature,
    tree: Option<LooseTree<L>>,
    overflow: Vec<PoolIndex>,
    needs_rebuild: bool,
    expected_world: Option<Aabb>,
    subdivision_level: u32,
    up_axis: usize,
}

impl<T: WorldBounds, L: CellLayout> LooseTreePruner<T, L> {
    /// Create an empty pruner identified by `structure`
    ///
    /// Without `world_bounds` the world box is the union of the object
    /// boxes at build time. `subdivision_level` is clamped to the layout's
    /// maximum. `up_axis` only matters for the quadtree.
    pub fn new(structure: Handle, world_bounds: Option<Aabb>, subdivision_level: u32, up_axis: usize) -> Self {
        let subdivision_level = if subdivision_level > L::MAX_LEVEL {
            log::warn!(
                "{}: subdivision level {} is too high, clamping to {}",
                L::NAME,
                subdivision_level,
                L::MAX_LEVEL
            );
            L::MAX_LEVEL
        } else {
            subdivision_level
        };
        Self {
            pool: PruningPool::new(),
            signature: Signature::new(structure),
            tree: None,
            overflow: Vec::new(),
            needs_rebuild: false,
            expected_world: world_bounds.filter(Aabb::is_valid),
            subdivision_level,
            up_axis: up_axis.min(2),
        }
    }

    /// Effective subdivision level
    pub fn subdivision_level(&self) -> u32 {
        self.subdivision_level
    }

    /// Whether the tree is currently built
    pub fn has_tree(&self) -> bool {
        self.tree.is_some()
    }

    /// Objects kept outside the tree
    pub fn nb_overflow_objects(&self) -> usize {
        self.overflow.len()
    }

    /// Number of cells of the built tree
    pub fn nb_cells(&self) -> usize {
        self.tree.as_ref().map_or(0, |tree| tree.nb_cells as usize)
    }

    /// Loose box of the cell holding an object
    pub fn owner_cell_bounds(&self, index: PoolIndex) -> Option<Aabb> {
        let tree = self.tree.as_ref()?;
        tree.owner_of(u32::from(index)).map(|cell| tree.cell_box(cell))
    }

    fn build(&mut self) {
        self.pool.refresh_aabbs();
        self.tree = None;
        self.overflow.clear();
        self.needs_rebuild = false;
        if self.pool.is_empty() {
            return;
        }
        let world = match self.expected_world {
            Some(world) => world,
            None => self.pool.world_boxes().iter().fold(Aabb::empty(), |acc, b| acc.union(b)),
        };
        let mut tree = LooseTree::<L>::new(world, self.subdivision_level, self.up_axis);
        for (i, aabb) in self.pool.world_boxes().iter().enumerate() {
            if !tree.insert(i as u32, aabb) {
                self.overflow.push(i as PoolIndex);
            }
        }
        log::debug!(
            "{}: built over {} objects, {} cells, {} overflowing",
            L::NAME,
            tree.nb_objects(),
            tree.nb_cells,
            self.overflow.len()
        );
        self.tree = Some(tree);
    }

    fn prepare(&mut self) {
        if (self.tree.is_none() || self.needs_rebuild) && !self.pool.is_empty() {
            self.build();
        }
        self.pool.refresh_aabbs();
    }

    /// Place an object in the tree or the overflow list
    fn place(&mut self, index: PoolIndex, aabb: &Aabb) {
        let Some(tree) = &mut self.tree else { return };
        if !tree.insert(u32::from(index), aabb) {
            self.overflow.push(index);
            // A derived world box can grow to cover it
            if self.expected_world.is_none() {
                self.needs_rebuild = true;
            }
        }
    }

    fn on_swap(tree: &mut Option<LooseTree<L>>, overflow: &mut Vec<PoolIndex>, swap: PoolSwap) {
        match swap {
            PoolSwap::Removed(i) => {
                let in_tree = tree.as_mut().map_or(false, |tree| tree.unlink(u32::from(i)));
                if !in_tree {
                    overflow.retain(|&o| o != i);
                }
            }
            PoolSwap::Moved { from, to } => {
                if let Some(tree) = tree {
                    tree.relocate(u32::from(from), u32::from(to));
                }
                for o in overflow.iter_mut().filter(|o| **o == from) {
                    *o = to;
                }
            }
        }
    }

    fn overlap_volume<V: BoxVolume>(&mut self, volume: &V, cb: &mut OverlapCallback<'_, T>) -> bool {
        self.prepare();
        let boxes = self.pool.world_boxes();
        let mut batcher = OverlapBatcher::new(&self.pool, cb);
        if let Some(tree) = &self.tree {
            if !tree.overlap(volume, boxes, &mut |object| batcher.push(object as PoolIndex)) {
                return false;
            }
        }
        for &index in &self.overflow {
            let aabb = &boxes[index as usize];
            if volume.overlaps_box(&aabb.center(), &aabb.extents()) && !batcher.push(index) {
                return false;
            }
        }
        batcher.flush()
    }
}

impl<T: WorldBounds + Send + Sync, L: CellLayout> Pruner<T> for LooseTreePruner<T, L> {
    fn add_object(&mut self, payload: T, dynamic: bool) -> Option<PoolIndex> {
        let index = self.pool.add_object(payload, dynamic)?;
        if self.tree.is_some() {
            if let Some(aabb) = self.pool.world_aabb(index) {
                self.place(index, &aabb);
            }
        }
        self.signature.bump();
        Some(index)
    }

    fn remove_object(&mut self, index: PoolIndex) -> Option<T> {
        let Self { pool, tree, overflow, .. } = self;
        let payload = pool.remove_object(index, |swap| Self::on_swap(tree, overflow, swap))?;
        if let Some(tree) = &mut self.tree {
            tree.truncate(self.pool.len());
        }
        if self.pool.is_empty() {
            self.tree = None;
            self.overflow.clear();
        }
        self.signature.bump();
        Some(payload)
    }

    fn update_object(&mut self, index: PoolIndex) {
        self.pool.invalidate_aabb(index);
        if self.tree.is_none() {
            return;
        }
        let Some(aabb) = self.pool.world_aabb(index) else { return };
        let key = u32::from(index);
        if let Some(tree) = &mut self.tree {
            match tree.owner_of(key) {
                // Still inside its loose cell
                Some(cell) if tree.fits(cell, &aabb) => return,
                Some(_) => {
                    tree.unlink(key);
                }
                None => self.overflow.retain(|&o| o != index),
            }
        }
        self.place(index, &aabb);
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
        self.prepare();
    }

    fn cull(&mut self, planes: &[Plane], cb: &mut CullCallback<'_, T>) -> bool {
        self.prepare();
        let mask = full_plane_mask(planes.len());
        let pool = &self.pool;
        let boxes = pool.world_boxes();
        if let Some(tree) = &self.tree {
            let completed = tree.cull(planes, mask, boxes, &mut |object| {
                pool.get(object as PoolIndex).map_or(true, |prunable| cb(prunable))
            });
            if !completed {
                return false;
            }
        }
        for &index in &self.overflow {
            let aabb = &boxes[index as usize];
            if planes_aabb_overlap(&aabb.center(), &aabb.extents(), planes, mask).is_some() {
                if let Some(prunable) = pool.get(index) {
                    if !cb(prunable) {
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
        let boxes = pool.world_boxes();
        if let Some(tree) = &self.tree {
            let status = tree.stab(origin, dir, max_dist, boxes, &mut |object, dist| {
                match pool.get(object as PoolIndex) {
                    Some(prunable) => cb(prunable, dist),
                    None => StabStatus::Continue,
                }
            });
            if status == StabStatus::Stop {
                return StabStatus::Stop;
            }
        }
        let mut tester = RayAabbTester::new(origin, dir, *max_dist);
        for &index in &self.overflow {
            if !tester.overlaps_aabb(&boxes[index as usize]) {
                continue;
            }
            let Some(prunable) = pool.get(index) else { continue };
            match cb(prunable, max_dist) {
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
