//! Per-thread scratch storage for queries
//!
//! Queries pull their temporary vectors from a thread-local pool instead
//! of allocating. A query nested inside another (a sweep cache rebuild
//! running inside a sweep, say) gets its own set; the outer set is not
//! handed out again until its guard drops.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::physics::collision::raycast::GeometryHit;
use crate::spatial::pruning_pool::PoolIndex;

/// Sets kept around per thread once released
const MAX_POOLED_SETS: usize = 4;

/// Scratch vectors used by one query
#[derive(Debug, Default)]
pub(crate) struct QueryBuffers {
    /// Broad-phase candidates from a single pruner
    pub(crate) candidates: Vec<PoolIndex>,
    /// Exact hits on the shape being tested
    pub(crate) geometry_hits: Vec<GeometryHit>,
}

impl QueryBuffers {
    fn clear(&mut self) {
        self.candidates.clear();
        self.geometry_hits.clear();
    }
}

#[derive(Default)]
struct BufferPool {
    free: Vec<QueryBuffers>,
    active: usize,
}

thread_local! {
    static BUFFER_POOL: RefCell<BufferPool> = RefCell::new(BufferPool::default());
}

/// Scoped access to a set of query buffers
///
/// Tied to the acquiring thread.
pub(crate) struct QueryBuffersGuard {
    buffers: QueryBuffers,
    _not_send: PhantomData<*const ()>,
}

/// Take a buffer set from this thread's pool
pub(crate) fn acquire_query_buffers() -> QueryBuffersGuard {
    let buffers = BUFFER_POOL.with(|pool| {
        let mut pool = pool.borrow_mut();
        pool.active += 1;
        pool.free.pop().unwrap_or_default()
    });
    QueryBuffersGuard { buffers, _not_send: PhantomData }
}

/// Number of guards alive on this thread
#[cfg(test)]
pub(crate) fn active_query_buffers() -> usize {
    BUFFER_POOL.with(|pool| pool.borrow().active)
}

impl Deref for QueryBuffersGuard {
    type Target = QueryBuffers;

    fn deref(&self) -> &QueryBuffers {
        &self.buffers
    }
}

impl DerefMut for QueryBuffersGuard {
    fn deref_mut(&mut self) -> &mut QueryBuffers {
        &mut self.buffers
    }
}

impl Drop for QueryBuffersGuard {
    fn drop(&mut self) {
        let mut buffers = std::mem::take(&mut self.buffers);
        buffers.clear();
        // The pool is gone during thread teardown
        let _ = BUFFER_POOL.try_with(|pool| {
            let mut pool = pool.borrow_mut();
            pool.active = pool.active.saturating_sub(1);
            if pool.free.len() < MAX_POOLED_SETS {
                pool.free.push(buffers);
            }
        });
    }
}
