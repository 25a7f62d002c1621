//! Abstract pruner interface for broad-phase scene queries
//!
//! A pruner is an acceleration structure layered over a
//! [`PruningPool`]. Every variant answers the same four kinds of
//! question (cull by planes, stab by ray or segment, volume overlap) so
//! the query layer can swap structures without changing.

use crate::foundation::collections::{Handle, HandleManager, INVALID_HANDLE};
use crate::foundation::math::Vec3;
use crate::physics::collision::bounds::Aabb;
use crate::physics::collision::primitives::{Capsule, Obb, Plane, Sphere};
use super::pruning_pool::{PoolIndex, Prunable, PruningPool, WorldBounds};

/// Objects handed to overlap callbacks per call
pub const OVERLAP_BATCH_SIZE: usize = 32;

/// Control flow returned by stab callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabStatus {
    /// Keep walking with the same max distance
    Continue,
    /// Abort the whole query
    Stop,
    /// The callback shrank the max distance; clip the rest of the walk
    UpdateMaxDist,
}

/// Structural identity and version of a pruner
///
/// Any add or remove bumps the timestamp. Equal signatures mean no object
/// entered or left the pruner in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Handle from the owning [`SignatureRegistry`]
    pub structure: Handle,
    /// Bumped on every structural change
    pub timestamp: u32,
}

impl Signature {
    /// Fresh signature for a registered structure
    pub fn new(structure: Handle) -> Self {
        Self { structure, timestamp: 0 }
    }

    /// Signature that matches no live pruner
    pub fn invalid() -> Self {
        Self { structure: INVALID_HANDLE, timestamp: 0 }
    }

    /// Record a structural change
    pub fn bump(&mut self) {
        self.timestamp = self.timestamp.wrapping_add(1);
    }
}

/// Issues structure handles for pruner signatures
///
/// Owned by whoever owns the pruners; every handle must be released
/// before the registry goes away.
#[derive(Debug, Default)]
pub struct SignatureRegistry {
    handles: HandleManager<()>,
}

impl SignatureRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a structure handle
    pub fn register(&mut self) -> Handle {
        self.handles.add(()).unwrap_or(INVALID_HANDLE)
    }

    /// Release a structure handle; stale handles are ignored
    pub fn release(&mut self, handle: Handle) {
        self.handles.remove(handle);
    }

    /// Whether `handle` is still registered
    pub fn is_registered(&self, handle: Handle) -> bool {
        self.handles.is_valid(handle)
    }

    /// Number of live structure handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether every handle has been released
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Callback receiving overlap results in chunks of up to
/// [`OVERLAP_BATCH_SIZE`]; return `false` to stop
pub type OverlapCallback<'a, T> = dyn FnMut(&[&Prunable<T>]) -> bool + 'a;

/// Callback receiving stab candidates; may shrink the max distance
pub type StabCallback<'a, T> = dyn FnMut(&Prunable<T>, &mut f32) -> StabStatus + 'a;

/// Callback receiving culled objects; return `false` to stop
pub type CullCallback<'a, T> = dyn FnMut(&Prunable<T>) -> bool + 'a;

/// Abstract interface for broad-phase acceleration structures
///
/// Queries take `&mut self` because they settle lazy state first (stale
/// boxes, pending rebuilds) before walking the structure.
pub trait Pruner<T: WorldBounds>: Send + Sync {
    /// Register an object; returns its pool index
    fn add_object(&mut self, payload: T, dynamic: bool) -> Option<PoolIndex>;

    /// Unregister an object and hand back its payload
    fn remove_object(&mut self, index: PoolIndex) -> Option<T>;

    /// Notify that an object's world box changed
    fn update_object(&mut self, index: PoolIndex);

    /// Underlying object storage
    fn pool(&self) -> &PruningPool<T>;

    /// Payload of an object, mutably; bounds changes need [`Pruner::update_object`]
    fn payload_mut(&mut self, index: PoolIndex) -> Option<&mut T>;

    /// Current structural signature
    fn signature(&self) -> Signature;

    /// Settle every lazy update now instead of at the next query
    fn eager_update(&mut self);

    /// Advance amortized background work by one slice
    ///
    /// Returns `true` when nothing is pending. Structures without
    /// background work are always done.
    fn build_step(&mut self) -> bool {
        true
    }

    /// Report objects not fully outside the planes (at most 32 are used)
    fn cull(&mut self, planes: &[Plane], cb: &mut CullCallback<'_, T>) -> bool;

    /// Walk objects whose boxes the ray or segment touches
    fn stab(&mut self, origin: &Vec3, dir: &Vec3, max_dist: &mut f32, cb: &mut StabCallback<'_, T>) -> StabStatus;

    /// Report objects whose boxes touch the sphere
    fn overlap_sphere(&mut self, sphere: &Sphere, cb: &mut OverlapCallback<'_, T>) -> bool;

    /// Report objects whose boxes touch the box
    fn overlap_aabb(&mut self, aabb: &Aabb, cb: &mut OverlapCallback<'_, T>) -> bool;

    /// Report objects whose boxes touch the oriented box
    fn overlap_obb(&mut self, obb: &Obb, cb: &mut OverlapCallback<'_, T>) -> bool;

    /// Report objects whose boxes touch the capsule
    fn overlap_capsule(&mut self, capsule: &Capsule, cb: &mut OverlapCallback<'_, T>) -> bool;

    /// Number of registered objects
    fn len(&self) -> usize {
        self.pool().len()
    }

    /// Whether no object is registered
    fn is_empty(&self) -> bool {
        self.pool().is_empty()
    }
}

/// Collects overlap results into fixed-size chunks
pub(crate) struct OverlapBatcher<'p, 'c, 'f, T> {
    pool: &'p PruningPool<T>,
    batch: Vec<&'p Prunable<T>>,
    cb: &'c mut OverlapCallback<'f, T>,
}

impl<'p, 'c, 'f, T> OverlapBatcher<'p, 'c, 'f, T> {
    pub(crate) fn new(pool: &'p PruningPool<T>, cb: &'c mut OverlapCallback<'f, T>) -> Self {
        Self {
            pool,
            batch: Vec::with_capacity(OVERLAP_BATCH_SIZE),
            cb,
        }
    }

    /// Queue one object; flushes when the chunk is full
    pub(crate) fn push(&mut self, index: PoolIndex) -> bool {
        if let Some(object) = self.pool.get(index) {
            self.batch.push(object);
        }
        if self.batch.len() == OVERLAP_BATCH_SIZE {
            return self.flush();
        }
        true
    }

    /// Deliver whatever is queued
    pub(crate) fn flush(&mut self) -> bool {
        if self.batch.is_empty() {
            return true;
        }
        let keep_going = (self.cb)(&self.batch);
        self.batch.clear();
        keep_going
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::test_support::TestBox;

    #[test]
    fn test_signature_registry_round_trip() {
        let mut registry = SignatureRegistry::new();
        let a = registry.register();
        let b = registry.register();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        registry.release(a);
        assert!(!registry.is_registered(a));
        registry.release(a);
        registry.release(b);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_signature_equality_tracks_changes() {
        let mut sig = Signature::new(3);
        let before = sig;
        assert_eq!(before, sig);
        sig.bump();
        assert_ne!(before, sig);
        assert_ne!(Signature::invalid(), Signature::new(0));
    }

    #[test]
    fn test_batcher_chunks_results() {
        let mut pool = PruningPool::new();
        for i in 0..70u32 {
            pool.add_object(TestBox::cube(i, Vec3::zeros(), 1.0), false);
        }
        let mut chunk_sizes = Vec::new();
        let mut cb = |chunk: &[&Prunable<TestBox>]| {
            chunk_sizes.push(chunk.len());
            true
        };
        let mut batcher = OverlapBatcher::new(&pool, &mut cb);
        for i in 0..70 {
            assert!(batcher.push(i));
        }
        assert!(batcher.flush());
        drop(batcher);
        assert_eq!(chunk_sizes, vec![32, 32, 6]);
    }
}
