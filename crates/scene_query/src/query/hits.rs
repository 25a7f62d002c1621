//! Query results

use bitflags::bitflags;

use crate::foundation::math::Vec3;
use crate::physics::collision::raycast::GeometryHit;
use crate::physics::collision::sweep::SweepContact;
use crate::spatial::pruner::StabStatus;
use super::filtering::HitType;
use super::scene_shape::ShapeHandle;

bitflags! {
    /// Which fields of a [`QueryHit`] carry data
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HitFlags: u16 {
        /// `distance` is set
        const DISTANCE = 1 << 0;
        /// `position` is set
        const POSITION = 1 << 1;
        /// `normal` is set
        const NORMAL = 1 << 2;
        /// `u` and `v` are set
        const UV = 1 << 3;
        /// `face_index` is set
        const FACE_INDEX = 1 << 4;
        /// A sweep started out touching the shape
        const INITIAL_OVERLAP = 1 << 5;
    }
}

/// One raycast or sweep hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryHit {
    /// Shape that was hit
    pub shape: ShapeHandle,
    /// Triangle index for mesh hits
    pub face_index: Option<u32>,
    /// Valid fields
    pub flags: HitFlags,
    /// Distance along the ray or sweep
    pub distance: f32,
    /// World-space contact point
    pub position: Vec3,
    /// World-space normal facing the query
    pub normal: Vec3,
    /// Barycentric coordinate of mesh ray hits
    pub u: f32,
    /// Barycentric coordinate of mesh ray hits
    pub v: f32,
    /// Classification after filtering
    pub hit_type: HitType,
}

impl QueryHit {
    pub(crate) fn from_ray(shape: ShapeHandle, hit: &GeometryHit, hit_type: HitType) -> Self {
        let mut flags = HitFlags::DISTANCE | HitFlags::POSITION | HitFlags::NORMAL;
        if hit.face_index.is_some() {
            flags |= HitFlags::FACE_INDEX | HitFlags::UV;
        }
        Self {
            shape,
            face_index: hit.face_index,
            flags,
            distance: hit.distance,
            position: hit.position,
            normal: hit.normal,
            u: hit.u,
            v: hit.v,
            hit_type,
        }
    }

    pub(crate) fn from_sweep(shape: ShapeHandle, contact: &SweepContact, hit_type: HitType) -> Self {
        let mut flags = HitFlags::DISTANCE | HitFlags::POSITION | HitFlags::NORMAL;
        if contact.face_index.is_some() {
            flags |= HitFlags::FACE_INDEX;
        }
        if contact.initial_overlap {
            flags |= HitFlags::INITIAL_OVERLAP;
        }
        Self {
            shape,
            face_index: contact.face_index,
            flags,
            distance: contact.distance,
            position: contact.position,
            normal: contact.normal,
            u: 0.0,
            v: 0.0,
            hit_type,
        }
    }

    /// Hit record for overlap post-filters, which carry no contact data
    pub(crate) fn from_overlap(shape: ShapeHandle, hit_type: HitType) -> Self {
        Self {
            shape,
            face_index: None,
            flags: HitFlags::empty(),
            distance: 0.0,
            position: Vec3::zeros(),
            normal: Vec3::zeros(),
            u: 0.0,
            v: 0.0,
            hit_type,
        }
    }

    /// Whether this hit bounds the query
    pub fn is_blocking(&self) -> bool {
        self.hit_type == HitType::Block
    }
}

/// One overlap result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapHit {
    /// Overlapping shape
    pub shape: ShapeHandle,
    /// Classification after filtering
    pub hit_type: HitType,
}

/// Outcome of a query that writes into bounded storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Every hit was stored
    Complete,
    /// Storage ran out; results are truncated (or dropped in batches)
    Overflow,
    /// The query input was rejected
    Invalid,
}

/// How many hits a raycast or sweep reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryMode {
    /// Stop at the first blocking hit, whatever its distance
    Any,
    /// Closest blocking hit
    Single,
    /// Closest blocking hit plus every touching hit in front of it
    Multiple,
}

/// Touching hits plus at most one blocking hit
///
/// Growable buffers double when full; fixed buffers stop accepting hits
/// and record the overflow instead.
#[derive(Debug, Clone, Default)]
pub struct HitBuffer {
    touches: Vec<QueryHit>,
    block: Option<QueryHit>,
    limit: Option<usize>,
    overflow: bool,
}

impl HitBuffer {
    /// Buffer that grows as needed
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer that never holds more than `limit` hits in total
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit), ..Self::default() }
    }

    /// Touching hits closer than the blocking hit
    pub fn touches(&self) -> &[QueryHit] {
        &self.touches
    }

    /// Closest blocking hit
    pub fn block(&self) -> Option<&QueryHit> {
        self.block.as_ref()
    }

    /// Touching hits followed by the blocking hit
    pub fn iter(&self) -> impl Iterator<Item = &QueryHit> {
        self.touches.iter().chain(self.block.iter())
    }

    /// Total number of hits
    pub fn len(&self) -> usize {
        self.touches.len() + usize::from(self.block.is_some())
    }

    /// Whether no hit was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether hits were lost for lack of room
    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    /// Drop every hit and the overflow mark
    pub fn clear(&mut self) {
        self.touches.clear();
        self.block = None;
        self.overflow = false;
    }

    pub(crate) fn push_touch(&mut self, hit: QueryHit) -> bool {
        if let Some(limit) = self.limit {
            // Leave room for a blocking hit
            if self.len() >= limit {
                self.overflow = true;
                return false;
            }
        } else if self.touches.len() == self.touches.capacity() {
            let extra = self.touches.len().max(4);
            if self.touches.try_reserve(extra).is_err() {
                log::error!("HitBuffer: out of memory growing past {} hits", self.touches.len());
                self.overflow = true;
                return false;
            }
        }
        self.touches.push(hit);
        true
    }

    pub(crate) fn set_block(&mut self, hit: QueryHit) -> bool {
        if self.block.is_none() {
            if let Some(limit) = self.limit {
                if self.len() >= limit {
                    self.overflow = true;
                    return false;
                }
            }
        }
        self.block = Some(hit);
        true
    }

    /// Drop touching hits beyond the blocking hit
    pub(crate) fn finish(&mut self) {
        if let Some(block) = &self.block {
            let limit = block.distance;
            self.touches.retain(|t| t.distance <= limit);
        }
    }
}

/// Applies the block/touch protocol to hits as the exact tests find them
pub(crate) struct HitCollector<'b> {
    pub(crate) mode: QueryMode,
    pub(crate) max_dist: f32,
    pub(crate) buffer: &'b mut HitBuffer,
}

impl<'b> HitCollector<'b> {
    pub(crate) fn new(mode: QueryMode, max_dist: f32, buffer: &'b mut HitBuffer) -> Self {
        Self { mode, max_dist, buffer }
    }

    /// Record `hit` and tell the walk how to proceed
    pub(crate) fn offer(&mut self, hit: QueryHit) -> StabStatus {
        if hit.distance > self.max_dist {
            return StabStatus::Continue;
        }
        match hit.hit_type {
            HitType::None => StabStatus::Continue,
            HitType::Touch => {
                if self.mode != QueryMode::Multiple {
                    return StabStatus::Continue;
                }
                if self.buffer.push_touch(hit) {
                    StabStatus::Continue
                } else {
                    StabStatus::Stop
                }
            }
            HitType::Block => {
                if !self.buffer.set_block(hit) {
                    return StabStatus::Stop;
                }
                if self.mode == QueryMode::Any {
                    return StabStatus::Stop;
                }
                self.max_dist = hit.distance;
                StabStatus::UpdateMaxDist
            }
        }
    }

    pub(crate) fn finish(self) {
        self.buffer.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn hit(shape: ShapeHandle, distance: f32, hit_type: HitType) -> QueryHit {
        QueryHit {
            shape,
            face_index: None,
            flags: HitFlags::DISTANCE,
            distance,
            position: Vec3::zeros(),
            normal: Vec3::y(),
            u: 0.0,
            v: 0.0,
            hit_type,
        }
    }

    #[test]
    fn test_growable_buffer_keeps_hits_in_front_of_block() {
        let mut keys = SlotMap::<ShapeHandle, ()>::with_key();
        let shape = keys.insert(());
        let mut buffer = HitBuffer::new();
        for d in [1.0, 5.0, 2.0, 9.0, 3.0, 7.0] {
            assert!(buffer.push_touch(hit(shape, d, HitType::Touch)));
        }
        assert!(buffer.set_block(hit(shape, 4.0, HitType::Block)));
        buffer.finish();
        let mut distances: Vec<f32> = buffer.touches().iter().map(|h| h.distance).collect();
        distances.sort_by(f32::total_cmp);
        assert_eq!(distances, vec![1.0, 2.0, 3.0]);
        assert_eq!(buffer.len(), 4);
        assert!(buffer.iter().last().unwrap().is_blocking());
        assert!(!buffer.overflowed());
    }

    #[test]
    fn test_fixed_buffer_overflows() {
        let mut keys = SlotMap::<ShapeHandle, ()>::with_key();
        let shape = keys.insert(());
        let mut buffer = HitBuffer::with_limit(2);
        assert!(buffer.push_touch(hit(shape, 1.0, HitType::Touch)));
        assert!(buffer.push_touch(hit(shape, 2.0, HitType::Touch)));
        assert!(!buffer.push_touch(hit(shape, 3.0, HitType::Touch)));
        assert!(!buffer.set_block(hit(shape, 4.0, HitType::Block)));
        assert!(buffer.overflowed());
        buffer.clear();
        assert!(buffer.is_empty() && !buffer.overflowed());
    }

    #[test]
    fn test_collector_shrinks_max_dist_on_block() {
        let mut keys = SlotMap::<ShapeHandle, ()>::with_key();
        let shape = keys.insert(());
        let mut buffer = HitBuffer::new();
        let mut collector = HitCollector::new(QueryMode::Single, 10.0, &mut buffer);
        assert_eq!(collector.offer(hit(shape, 6.0, HitType::Block)), StabStatus::UpdateMaxDist);
        assert_eq!(collector.offer(hit(shape, 8.0, HitType::Block)), StabStatus::Continue);
        assert_eq!(collector.offer(hit(shape, 3.0, HitType::Touch)), StabStatus::Continue);
        assert_eq!(collector.offer(hit(shape, 4.0, HitType::Block)), StabStatus::UpdateMaxDist);
        assert_eq!(collector.max_dist, 4.0);
        collector.finish();
        assert!(buffer.touches().is_empty());
        assert_eq!(buffer.block().map(|b| b.distance), Some(4.0));
    }

    #[test]
    fn test_collector_any_stops_at_first_block() {
        let mut keys = SlotMap::<ShapeHandle, ()>::with_key();
        let shape = keys.insert(());
        let mut buffer = HitBuffer::new();
        let mut collector = HitCollector::new(QueryMode::Any, 10.0, &mut buffer);
        assert_eq!(collector.offer(hit(shape, 1.0, HitType::Touch)), StabStatus::Continue);
        assert_eq!(collector.offer(hit(shape, 9.0, HitType::Block)), StabStatus::Stop);
        assert_eq!(buffer.len(), 1);
    }
}
