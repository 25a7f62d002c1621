//! Scene query manager
//!
//! Owns one static and one dynamic pruner and turns raycast, sweep,
//! overlap and cull requests into pruner walks plus exact geometry tests.
//! Shapes are addressed by [`ShapeHandle`]s; the manager maps them to
//! pool indices and follows the pools as they compact.
//!
//! Pose updates are deferred: [`SceneQueryManager::update_shape`] only
//! records the new pose, and the owning pruner hears about it on the next
//! query, [`SceneQueryManager::flush_updates`] or
//! [`SceneQueryManager::eager_update`].

use slotmap::SlotMap;

use crate::config::{PruningStructure, SceneQueryConfig};
use crate::error::{Result, SceneQueryError};
use crate::foundation::collections::Handle;
use crate::foundation::math::{Pose, Vec3};
use crate::physics::collision::bounds::Aabb;
use crate::physics::collision::primitives::Plane;
use crate::spatial::dynamic_pruner::DynamicPruner;
use crate::spatial::free_pruner::FreePruner;
use crate::spatial::octree::{OctreePruner, QuadtreePruner};
use crate::spatial::pruner::{Pruner, Signature, SignatureRegistry};
use crate::spatial::pruning_pool::{PoolIndex, Prunable, MAX_POOL_OBJECTS};
use crate::spatial::static_pruner::StaticPruner;
use super::filtering::{FilterContext, QueryFilterData, QueryFilterFlags};
use super::scene_shape::{SceneShape, ShapeDesc, ShapeHandle};
use super::sweep_cache::{ObjectCache, PrunerStamp, SweepCacheKey};

/// Most planes a cull query accepts
pub const MAX_CULL_PLANES: usize = 32;

#[derive(Debug, Clone, Copy)]
struct ShapeSlot {
    dynamic: bool,
    index: PoolIndex,
    pending: bool,
}

/// Counters describing the manager's contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneQueryStats {
    /// Shapes in the static pruner
    pub nb_static_shapes: usize,
    /// Shapes in the dynamic pruner
    pub nb_dynamic_shapes: usize,
    /// Current static pruner signature
    pub static_signature: Signature,
    /// Current dynamic pruner signature
    pub dynamic_signature: Signature,
    /// Live sweep caches
    pub nb_sweep_caches: usize,
    /// Pose updates not yet handed to the pruners
    pub nb_pending_updates: usize,
}

/// Front end of the scene query system
pub struct SceneQueryManager {
    config: SceneQueryConfig,
    registry: SignatureRegistry,
    pub(crate) static_pruner: Box<dyn Pruner<SceneShape>>,
    pub(crate) dynamic_pruner: Box<dyn Pruner<SceneShape>>,
    shapes: SlotMap<ShapeHandle, ShapeSlot>,
    pending_updates: Vec<ShapeHandle>,
    /// Flushed pose updates per pruner, static first
    motion: [u32; 2],
    pub(crate) caches: SlotMap<SweepCacheKey, ObjectCache>,
}

impl SceneQueryManager {
    /// Manager with the pruners `config` asks for
    pub fn new(config: SceneQueryConfig) -> Result<Self> {
        config.validate()?;
        let mut registry = SignatureRegistry::new();
        let static_pruner = make_pruner(config.static_structure, registry.register(), config.max_nb_static_shapes, &config);
        let dynamic_pruner =
            make_pruner(config.dynamic_structure, registry.register(), config.max_nb_dynamic_shapes, &config);
        log::debug!(
            "SceneQueryManager: static {:?}, dynamic {:?}",
            config.static_structure,
            config.dynamic_structure
        );
        Ok(Self {
            config,
            registry,
            static_pruner,
            dynamic_pruner,
            shapes: SlotMap::with_key(),
            pending_updates: Vec::new(),
            motion: [0; 2],
            caches: SlotMap::with_key(),
        })
    }

    /// Settings the manager was built with
    pub fn config(&self) -> &SceneQueryConfig {
        &self.config
    }

    pub(crate) fn pruner(&self, dynamic: bool) -> &dyn Pruner<SceneShape> {
        if dynamic {
            self.dynamic_pruner.as_ref()
        } else {
            self.static_pruner.as_ref()
        }
    }

    pub(crate) fn pruner_mut(&mut self, dynamic: bool) -> &mut dyn Pruner<SceneShape> {
        if dynamic {
            self.dynamic_pruner.as_mut()
        } else {
            self.static_pruner.as_mut()
        }
    }

    /// Register a shape with the pruner matching its mobility
    pub fn add_shape(&mut self, desc: ShapeDesc) -> Result<ShapeHandle> {
        let dynamic = desc.dynamic;
        if self.pruner(dynamic).len() >= MAX_POOL_OBJECTS {
            log::error!("add_shape: {} pool is full", if dynamic { "dynamic" } else { "static" });
            return Err(SceneQueryError::CapacityExceeded(MAX_POOL_OBJECTS));
        }
        let handle = self.shapes.insert(ShapeSlot { dynamic, index: 0, pending: false });
        match self.pruner_mut(dynamic).add_object(SceneShape::new(handle, desc), dynamic) {
            Some(index) => {
                self.shapes[handle].index = index;
                Ok(handle)
            }
            None => {
                self.shapes.remove(handle);
                Err(SceneQueryError::CapacityExceeded(MAX_POOL_OBJECTS))
            }
        }
    }

    /// Register several shapes; stops at the first failure
    pub fn add_shapes(&mut self, descs: impl IntoIterator<Item = ShapeDesc>) -> Result<Vec<ShapeHandle>> {
        let descs = descs.into_iter();
        let mut handles = Vec::with_capacity(descs.size_hint().0);
        for desc in descs {
            handles.push(self.add_shape(desc)?);
        }
        Ok(handles)
    }

    /// Unregister a shape and hand back its description
    ///
    /// Stale handles return `None`.
    pub fn take_shape(&mut self, handle: ShapeHandle) -> Option<ShapeDesc> {
        let slot = self.shapes.remove(handle)?;
        let pruner = self.pruner_mut(slot.dynamic);
        let removed = pruner.remove_object(slot.index);
        // The last object now fills the hole
        let moved = pruner.pool().get(slot.index).map(|object| object.payload.handle());
        if let Some(moved) = moved {
            if let Some(moved_slot) = self.shapes.get_mut(moved) {
                moved_slot.index = slot.index;
            }
        }
        if removed.is_none() {
            log::error!("take_shape: shape missing from its pool at index {}", slot.index);
        }
        removed.map(SceneShape::into_desc)
    }

    /// Unregister a shape; stale handles are ignored
    pub fn remove_shape(&mut self, handle: ShapeHandle) -> bool {
        self.take_shape(handle).is_some()
    }

    /// Unregister several shapes, returning how many were live
    pub fn remove_shapes(&mut self, handles: &[ShapeHandle]) -> usize {
        handles.iter().filter(|&&handle| self.remove_shape(handle)).count()
    }

    /// Whether `handle` names a registered shape
    pub fn contains(&self, handle: ShapeHandle) -> bool {
        self.shapes.contains_key(handle)
    }

    /// Registered shape behind `handle`
    pub fn shape(&self, handle: ShapeHandle) -> Option<&SceneShape> {
        let slot = self.shapes.get(handle)?;
        self.pruner(slot.dynamic).pool().get(slot.index).map(|object| &object.payload)
    }

    /// Which pruner holds a shape and where
    pub(crate) fn shape_location(&self, handle: ShapeHandle) -> Option<(bool, PoolIndex)> {
        self.shapes.get(handle).map(|slot| (slot.dynamic, slot.index))
    }

    /// Current world bounds of a shape
    pub fn shape_bounds(&self, handle: ShapeHandle) -> Option<Aabb> {
        self.shape(handle).map(|shape| shape.geometry().world_aabb(shape.pose()))
    }

    /// Move a shape; the pruner is told on the next flush
    pub fn update_shape(&mut self, handle: ShapeHandle, pose: Pose) -> bool {
        let Some(slot) = self.shapes.get_mut(handle) else { return false };
        let (dynamic, index) = (slot.dynamic, slot.index);
        if !slot.pending {
            slot.pending = true;
            self.pending_updates.push(handle);
        }
        match self.pruner_mut(dynamic).payload_mut(index) {
            Some(shape) => {
                shape.set_pose(pose);
                true
            }
            None => false,
        }
    }

    /// Hand pending pose updates to the pruners
    ///
    /// Returns the number of shapes updated.
    pub fn flush_updates(&mut self) -> usize {
        if self.pending_updates.is_empty() {
            return 0;
        }
        let pending = std::mem::take(&mut self.pending_updates);
        let mut flushed = 0;
        for &handle in &pending {
            let Some(slot) = self.shapes.get_mut(handle) else { continue };
            slot.pending = false;
            let (dynamic, index) = (slot.dynamic, slot.index);
            self.pruner_mut(dynamic).update_object(index);
            self.motion[usize::from(dynamic)] = self.motion[usize::from(dynamic)].wrapping_add(1);
            flushed += 1;
        }
        self.pending_updates = pending;
        self.pending_updates.clear();
        log::trace!("Flushed {flushed} pose updates");
        flushed
    }

    /// Pay for pending updates and tree rebuilds now instead of at query time
    pub fn eager_update(&mut self) {
        self.flush_updates();
        self.static_pruner.eager_update();
        self.dynamic_pruner.eager_update();
    }

    /// Advance a progressive dynamic tree rebuild by one step
    ///
    /// Returns `true` once no rebuild is in flight.
    pub fn build_step(&mut self) -> bool {
        self.dynamic_pruner.build_step()
    }

    /// Bring the pruners up to date before a query
    pub(crate) fn prepare_query(&mut self) {
        self.flush_updates();
        self.dynamic_pruner.build_step();
    }

    pub(crate) fn stamp(&self, dynamic: bool) -> PrunerStamp {
        PrunerStamp { signature: self.pruner(dynamic).signature(), motion: self.motion[usize::from(dynamic)] }
    }

    /// Current counters
    pub fn stats(&self) -> SceneQueryStats {
        SceneQueryStats {
            nb_static_shapes: self.static_pruner.len(),
            nb_dynamic_shapes: self.dynamic_pruner.len(),
            static_signature: self.static_pruner.signature(),
            dynamic_signature: self.dynamic_pruner.signature(),
            nb_sweep_caches: self.caches.len(),
            nb_pending_updates: self.pending_updates.len(),
        }
    }

    /// Shapes in the static pruner
    pub fn nb_static_shapes(&self) -> usize {
        self.static_pruner.len()
    }

    /// Shapes in the dynamic pruner
    pub fn nb_dynamic_shapes(&self) -> usize {
        self.dynamic_pruner.len()
    }

    /// Create a sweep cache whose volumes reach `dimensions` past each sweep
    pub fn create_sweep_cache(&mut self, dimensions: Vec3) -> SweepCacheKey {
        self.caches.insert(ObjectCache::new(dimensions))
    }

    /// Drop a sweep cache; stale keys are ignored
    pub fn release_sweep_cache(&mut self, key: SweepCacheKey) -> bool {
        self.caches.remove(key).is_some()
    }

    /// Pin a cache to `volume`; sweeps leaving it bypass the cache
    pub fn set_sweep_cache_volume(&mut self, key: SweepCacheKey, volume: Aabb) -> bool {
        match self.caches.get_mut(key) {
            Some(cache) => {
                cache.set_volume(volume);
                true
            }
            None => false,
        }
    }

    /// Inspect a sweep cache
    pub fn sweep_cache(&self, key: SweepCacheKey) -> Option<&ObjectCache> {
        self.caches.get(key)
    }

    /// Shapes whose bounds reach inside every one of `planes`
    ///
    /// Only client visibility and the word mask filter the result.
    pub fn cull(&mut self, planes: &[Plane], filter_data: &QueryFilterData, out: &mut Vec<ShapeHandle>) -> Result<usize> {
        if planes.len() > MAX_CULL_PLANES {
            log::warn!("cull: {} planes given, at most {MAX_CULL_PLANES} supported", planes.len());
            return Err(SceneQueryError::TooManyPlanes(planes.len()));
        }
        self.prepare_query();
        let ctx = FilterContext::new(filter_data, None, false);
        let start = out.len();
        for (dynamic, flag) in [(false, QueryFilterFlags::STATIC), (true, QueryFilterFlags::DYNAMIC)] {
            if !filter_data.flags.contains(flag) {
                continue;
            }
            self.pruner_mut(dynamic).cull(planes, &mut |object: &Prunable<SceneShape>| {
                if ctx.coarse_accepts(&object.payload) {
                    out.push(object.payload.handle());
                }
                true
            });
        }
        Ok(out.len() - start)
    }
}

impl Drop for SceneQueryManager {
    fn drop(&mut self) {
        self.registry.release(self.static_pruner.signature().structure);
        self.registry.release(self.dynamic_pruner.signature().structure);
        if !self.registry.is_empty() {
            log::error!("SceneQueryManager dropped with {} structure handles registered", self.registry.len());
            debug_assert!(self.registry.is_empty(), "structure handles leaked");
        }
    }
}

/// Pruner implementing `structure`
fn make_pruner(
    structure: PruningStructure,
    handle: Handle,
    capacity: usize,
    config: &SceneQueryConfig,
) -> Box<dyn Pruner<SceneShape>> {
    match structure {
        PruningStructure::None => Box::new(FreePruner::with_capacity(handle, capacity)),
        PruningStructure::StaticAabbTree => Box::new(StaticPruner::with_capacity(handle, capacity)),
        PruningStructure::DynamicAabbTree => Box::new(DynamicPruner::with_rebuild_rate(
            handle,
            capacity,
            config.dynamic_tree_rebuild_rate_hint,
        )),
        PruningStructure::Octree => {
            Box::new(OctreePruner::new(handle, config.max_bounds, config.subdivision_level, config.up_axis))
        }
        PruningStructure::Quadtree => {
            Box::new(QuadtreePruner::new(handle, config.max_bounds, config.subdivision_level, config.up_axis))
        }
    }
}
