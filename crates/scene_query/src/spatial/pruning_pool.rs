//! Dense pool of prunable objects with cached world bounds
//!
//! Every pruner stores its objects in a [`PruningPool`]. Objects occupy
//! slots `[0, len())` without holes: removal moves the last object into
//! the freed slot and reports the move through a [`PoolSwap`] callback so
//! that index-keyed side tables can follow. World boxes are cached and
//! recomputed lazily, only when read after being invalidated.

use bitflags::bitflags;

use crate::physics::collision::bounds::Aabb;

/// Index of an object inside its pool
pub type PoolIndex = u16;

/// Index value of an object not registered with any pool
pub const INVALID_POOL_INDEX: PoolIndex = 0xffff;

/// Hard limit on objects per pool
pub const MAX_POOL_OBJECTS: usize = 0xffff;

const INITIAL_CAPACITY: usize = 4;

bitflags! {
    /// State bits carried by every prunable object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PrunableFlags: u8 {
        /// Object moves and lives in the dynamic pruner
        const DYNAMIC = 1 << 0;
        /// Cached world box is up to date
        const VALID_AABB = 1 << 1;
        /// Pose changed since the last flush
        const SQ_DIRTY = 1 << 2;
    }
}

/// Something that can report its world-space bounds
pub trait WorldBounds {
    /// Compute the current world-space box
    fn compute_world_aabb(&self) -> Aabb;
}

/// Record placed under spatial acceleration
#[derive(Debug, Clone)]
pub struct Prunable<T> {
    /// User data (for the scene query manager: the shape record)
    pub payload: T,
    handle: PoolIndex,
    flags: PrunableFlags,
}

impl<T> Prunable<T> {
    /// Slot of this object in its pool
    pub fn handle(&self) -> PoolIndex {
        self.handle
    }

    /// Current flags
    pub fn flags(&self) -> PrunableFlags {
        self.flags
    }

    /// Whether the object is registered as moving
    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(PrunableFlags::DYNAMIC)
    }

    /// Whether the object is waiting for a flush
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PrunableFlags::SQ_DIRTY)
    }
}

/// Swap notifications emitted while removing from a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSwap {
    /// The object at this slot left the pool
    Removed(PoolIndex),
    /// The object at `from` (previously last) now lives at `to`
    Moved {
        /// Old slot, now beyond the live range
        from: PoolIndex,
        /// New slot
        to: PoolIndex,
    },
}

/// Dense object array plus a parallel world-box cache
#[derive(Debug, Clone)]
pub struct PruningPool<T> {
    objects: Vec<Prunable<T>>,
    world_boxes: Vec<Aabb>,
}

impl<T> Default for PruningPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PruningPool<T> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            world_boxes: Vec::new(),
        }
    }

    /// Create a pool with room for `capacity` objects
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_POOL_OBJECTS);
        Self {
            objects: Vec::with_capacity(capacity),
            world_boxes: Vec::with_capacity(capacity),
        }
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Live objects; slot `i` holds the object whose handle is `i`
    pub fn objects(&self) -> &[Prunable<T>] {
        &self.objects
    }

    /// Object at `index`
    pub fn get(&self, index: PoolIndex) -> Option<&Prunable<T>> {
        self.objects.get(index as usize)
    }

    /// Payload at `index`, mutably
    pub fn payload_mut(&mut self, index: PoolIndex) -> Option<&mut T> {
        self.objects.get_mut(index as usize).map(|o| &mut o.payload)
    }

    /// Cached boxes; only meaningful for objects with a valid AABB flag
    pub fn world_boxes(&self) -> &[Aabb] {
        &self.world_boxes
    }

    /// Cached box of one object without recomputation
    pub fn cached_world_aabb(&self, index: PoolIndex) -> Option<&Aabb> {
        self.world_boxes.get(index as usize)
    }

    /// Append an object; its box is computed on first read
    ///
    /// Returns `None` when the pool is full or cannot grow.
    pub fn add_object(&mut self, payload: T, dynamic: bool) -> Option<PoolIndex> {
        let index = self.objects.len();
        if index >= MAX_POOL_OBJECTS {
            log::error!("PruningPool: cannot hold more than {} objects", MAX_POOL_OBJECTS);
            return None;
        }
        if index == self.objects.capacity() && !self.grow() {
            return None;
        }

        let mut flags = PrunableFlags::empty();
        flags.set(PrunableFlags::DYNAMIC, dynamic);
        self.objects.push(Prunable {
            payload,
            handle: index as PoolIndex,
            flags,
        });
        self.world_boxes.push(Aabb::empty());
        Some(index as PoolIndex)
    }

    fn grow(&mut self) -> bool {
        let current = self.objects.capacity();
        let new_capacity = if current == 0 { INITIAL_CAPACITY } else { (current * 2).min(MAX_POOL_OBJECTS) };
        let extra = new_capacity - self.objects.len();
        if self.objects.try_reserve_exact(extra).is_err() || self.world_boxes.try_reserve_exact(extra).is_err() {
            log::error!("PruningPool: out of memory growing to {} objects", new_capacity);
            return false;
        }
        true
    }

    /// Remove the object at `index`, moving the last object into its slot
    ///
    /// `on_swap` sees `Removed(index)` first, then `Moved` if another
    /// object had to be relocated. Out-of-range indices are ignored.
    pub fn remove_object(&mut self, index: PoolIndex, mut on_swap: impl FnMut(PoolSwap)) -> Option<T> {
        let slot = index as usize;
        if slot >= self.objects.len() {
            return None;
        }
        on_swap(PoolSwap::Removed(index));

        let last = self.objects.len() - 1;
        let mut removed = self.objects.swap_remove(slot);
        self.world_boxes.swap_remove(slot);
        if slot != last {
            self.objects[slot].handle = index;
            on_swap(PoolSwap::Moved {
                from: last as PoolIndex,
                to: index,
            });
        }
        removed.handle = INVALID_POOL_INDEX;
        Some(removed.payload)
    }

    /// Mark an object's box stale after its pose changed
    pub fn invalidate_aabb(&mut self, index: PoolIndex) {
        if let Some(object) = self.objects.get_mut(index as usize) {
            object.flags.remove(PrunableFlags::VALID_AABB);
            object.flags.insert(PrunableFlags::SQ_DIRTY);
        }
    }

    /// Indices of objects waiting for a flush
    pub fn dirty_objects(&self) -> impl Iterator<Item = PoolIndex> + '_ {
        self.objects.iter().filter(|o| o.is_dirty()).map(|o| o.handle)
    }
}

impl<T: WorldBounds> PruningPool<T> {
    /// Cached world box, recomputed first if it is stale
    pub fn world_aabb(&mut self, index: PoolIndex) -> Option<Aabb> {
        let slot = index as usize;
        let object = self.objects.get_mut(slot)?;
        if !object.flags.contains(PrunableFlags::VALID_AABB) {
            self.world_boxes[slot] = object.payload.compute_world_aabb();
            object.flags.insert(PrunableFlags::VALID_AABB);
        }
        Some(self.world_boxes[slot])
    }

    /// Recompute every stale box and clear dirty bits
    ///
    /// Returns the number of boxes recomputed.
    pub fn refresh_aabbs(&mut self) -> usize {
        let mut count = 0;
        for (object, aabb) in self.objects.iter_mut().zip(self.world_boxes.iter_mut()) {
            if !object.flags.contains(PrunableFlags::VALID_AABB) {
                *aabb = object.payload.compute_world_aabb();
                object.flags.insert(PrunableFlags::VALID_AABB);
                count += 1;
            }
            object.flags.remove(PrunableFlags::SQ_DIRTY);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[derive(Debug, Clone, PartialEq)]
    struct Ball {
        id: u32,
        center: Vec3,
        radius: f32,
    }

    impl WorldBounds for Ball {
        fn compute_world_aabb(&self) -> Aabb {
            Aabb::from_center_extents(self.center, Vec3::repeat(self.radius))
        }
    }

    fn ball(id: u32, x: f32) -> Ball {
        Ball { id, center: Vec3::new(x, 0.0, 0.0), radius: 1.0 }
    }

    #[test]
    fn test_add_assigns_dense_indices() {
        let mut pool = PruningPool::new();
        for i in 0..10 {
            assert_eq!(pool.add_object(ball(i, i as f32), false), Some(i as PoolIndex));
        }
        assert_eq!(pool.len(), 10);
        assert!(pool.objects().iter().enumerate().all(|(i, o)| o.handle() as usize == i));
    }

    #[test]
    fn test_remove_swaps_last_and_reports() {
        let mut pool = PruningPool::new();
        for i in 0..4 {
            pool.add_object(ball(i, 0.0), false);
        }
        let mut events = Vec::new();
        let removed = pool.remove_object(1, |e| events.push(e)).unwrap();
        assert_eq!(removed.id, 1);
        assert_eq!(events, vec![PoolSwap::Removed(1), PoolSwap::Moved { from: 3, to: 1 }]);
        assert_eq!(pool.get(1).unwrap().payload.id, 3);
        assert_eq!(pool.get(1).unwrap().handle(), 1);

        // Removing the last object moves nothing
        events.clear();
        pool.remove_object(2, |e| events.push(e));
        assert_eq!(events, vec![PoolSwap::Removed(2)]);
        assert!(pool.remove_object(9, |_| panic!("no event for bad index")).is_none());
    }

    #[test]
    fn test_lazy_aabb_matches_eager_recompute() {
        let mut pool = PruningPool::new();
        let mut rng = StdRng::seed_from_u64(11);
        for i in 0..32 {
            pool.add_object(ball(i, rng.gen_range(-10.0..10.0)), true);
        }
        pool.refresh_aabbs();
        for step in 0..200 {
            let index = rng.gen_range(0..pool.len()) as PoolIndex;
            pool.payload_mut(index).unwrap().center.y = step as f32;
            pool.invalidate_aabb(index);
            assert!(pool.get(index).unwrap().is_dirty());
            let lazy = pool.world_aabb(index).unwrap();
            let eager = pool.get(index).unwrap().payload.compute_world_aabb();
            assert_eq!(lazy, eager);
        }
        pool.refresh_aabbs();
        assert_eq!(pool.dirty_objects().count(), 0);
        for (object, aabb) in pool.objects().iter().zip(pool.world_boxes()) {
            assert_eq!(*aabb, object.payload.compute_world_aabb());
        }
    }

    #[test]
    fn test_pool_stays_dense_under_random_churn() {
        let mut pool = PruningPool::new();
        let mut rng = StdRng::seed_from_u64(5);
        let mut next_id = 0;
        for _ in 0..1000 {
            if pool.is_empty() || rng.gen_bool(0.55) {
                pool.add_object(ball(next_id, 0.0), false);
                next_id += 1;
            } else {
                let index = rng.gen_range(0..pool.len()) as PoolIndex;
                pool.remove_object(index, |_| {});
            }
            assert_eq!(pool.world_boxes().len(), pool.len());
            assert!(pool.objects().iter().enumerate().all(|(i, o)| o.handle() as usize == i));
        }
    }

    #[test]
    fn test_pool_capacity_limit() {
        let mut pool = PruningPool::new();
        for i in 0..MAX_POOL_OBJECTS {
            assert!(pool.add_object(i, false).is_some());
        }
        assert!(pool.add_object(0, false).is_none());
    }

    impl WorldBounds for usize {
        fn compute_world_aabb(&self) -> Aabb {
            Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(*self as f32))
        }
    }
}
