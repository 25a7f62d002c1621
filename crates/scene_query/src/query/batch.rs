//! Batched queries
//!
//! A [`BatchQuery`] records raycasts, overlaps and sweeps and runs them
//! together. Filtering inside a batch goes through shader functions that
//! share one constant block, and the word-mask pre-test is skipped. Hits
//! go to fixed per-kind storage: a query that does not fit in what is
//! left reports no hits and [`QueryStatus::Overflow`].

use crate::foundation::math::Vec3;
use crate::physics::collision::overlap::QueryVolume;
use super::filtering::{FilterContext, PostFilterShader, PreFilterShader, QueryFilterData, ShaderFilter};
use super::hits::{HitBuffer, OverlapHit, QueryHit, QueryMode, QueryStatus};
use super::manager::SceneQueryManager;
use super::sweep::SweepDesc;

/// Filtering and storage shared by every query of a batch
#[derive(Clone)]
pub struct BatchQueryDesc {
    /// Runs on candidates of queries that set `PREFILTER`
    pub pre_filter: Option<PreFilterShader>,
    /// Runs on hits of queries that set `POSTFILTER`
    pub post_filter: Option<PostFilterShader>,
    /// Bytes handed to both shaders
    pub constant_block: Vec<u8>,
    /// Raycast hits stored across the batch
    pub max_raycast_hits: usize,
    /// Overlap hits stored across the batch
    pub max_overlap_hits: usize,
    /// Sweep hits stored across the batch
    pub max_sweep_hits: usize,
}

impl std::fmt::Debug for BatchQueryDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueryDesc")
            .field("pre_filter", &self.pre_filter.is_some())
            .field("post_filter", &self.post_filter.is_some())
            .field("constant_block", &self.constant_block.len())
            .field("max_raycast_hits", &self.max_raycast_hits)
            .field("max_overlap_hits", &self.max_overlap_hits)
            .field("max_sweep_hits", &self.max_sweep_hits)
            .finish()
    }
}

impl Default for BatchQueryDesc {
    fn default() -> Self {
        Self {
            pre_filter: None,
            post_filter: None,
            constant_block: Vec::new(),
            max_raycast_hits: 256,
            max_overlap_hits: 256,
            max_sweep_hits: 256,
        }
    }
}

#[derive(Debug, Clone)]
struct RaycastRequest {
    origin: Vec3,
    dir: Vec3,
    max_dist: f32,
    mode: QueryMode,
    filter_data: QueryFilterData,
    user_data: u64,
}

#[derive(Debug, Clone)]
struct OverlapRequest {
    volume: QueryVolume,
    any: bool,
    filter_data: QueryFilterData,
    user_data: u64,
}

#[derive(Debug, Clone)]
struct SweepRequest {
    desc: SweepDesc,
    mode: QueryMode,
    filter_data: QueryFilterData,
    user_data: u64,
}

/// Recorded queries waiting for [`BatchQuery::execute`]
#[derive(Debug, Clone, Default)]
pub struct BatchQuery {
    desc: BatchQueryDesc,
    raycasts: Vec<RaycastRequest>,
    overlaps: Vec<OverlapRequest>,
    sweeps: Vec<SweepRequest>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    user_data: u64,
    status: QueryStatus,
    start: usize,
    len: usize,
}

/// Outcome of one batched query
#[derive(Debug, Clone, Copy)]
pub struct BatchResult<'a, H> {
    /// Value given when the query was recorded
    pub user_data: u64,
    /// Whether the hits are complete
    pub status: QueryStatus,
    /// Hits of this query
    pub hits: &'a [H],
}

/// Everything a batch produced, in recording order per kind
#[derive(Debug, Clone, Default)]
pub struct BatchResults {
    raycasts: Vec<Entry>,
    overlaps: Vec<Entry>,
    sweeps: Vec<Entry>,
    raycast_hits: Vec<QueryHit>,
    overlap_hits: Vec<OverlapHit>,
    sweep_hits: Vec<QueryHit>,
}

fn results<'a, H>(entries: &'a [Entry], hits: &'a [H]) -> impl Iterator<Item = BatchResult<'a, H>> + 'a {
    entries.iter().map(move |entry| BatchResult {
        user_data: entry.user_data,
        status: entry.status,
        hits: &hits[entry.start..entry.start + entry.len],
    })
}

impl BatchResults {
    /// Raycast outcomes
    pub fn raycasts(&self) -> impl Iterator<Item = BatchResult<'_, QueryHit>> {
        results(&self.raycasts, &self.raycast_hits)
    }

    /// Overlap outcomes
    pub fn overlaps(&self) -> impl Iterator<Item = BatchResult<'_, OverlapHit>> {
        results(&self.overlaps, &self.overlap_hits)
    }

    /// Sweep outcomes
    pub fn sweeps(&self) -> impl Iterator<Item = BatchResult<'_, QueryHit>> {
        results(&self.sweeps, &self.sweep_hits)
    }
}

/// Stores `hits` when `status` allows it and records the entry
fn store<H: Copy>(
    entries: &mut Vec<Entry>,
    storage: &mut Vec<H>,
    user_data: u64,
    status: QueryStatus,
    hits: impl IntoIterator<Item = H>,
) {
    let start = storage.len();
    if status == QueryStatus::Complete {
        storage.extend(hits);
    }
    entries.push(Entry { user_data, status, start, len: storage.len() - start });
}

impl BatchQuery {
    /// Empty batch
    pub fn new(desc: BatchQueryDesc) -> Self {
        Self { desc, raycasts: Vec::new(), overlaps: Vec::new(), sweeps: Vec::new() }
    }

    /// Shared filtering and storage settings
    pub fn desc(&self) -> &BatchQueryDesc {
        &self.desc
    }

    /// Number of queries waiting
    pub fn len(&self) -> usize {
        self.raycasts.len() + self.overlaps.len() + self.sweeps.len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a raycast
    pub fn raycast(
        &mut self,
        origin: Vec3,
        dir: Vec3,
        max_dist: f32,
        mode: QueryMode,
        filter_data: QueryFilterData,
        user_data: u64,
    ) {
        self.raycasts.push(RaycastRequest { origin, dir, max_dist, mode, filter_data, user_data });
    }

    /// Record an overlap; `any` stops at the first shape found
    pub fn overlap(&mut self, volume: QueryVolume, any: bool, filter_data: QueryFilterData, user_data: u64) {
        self.overlaps.push(OverlapRequest { volume, any, filter_data, user_data });
    }

    /// Record a sweep
    pub fn sweep(&mut self, desc: SweepDesc, mode: QueryMode, filter_data: QueryFilterData, user_data: u64) {
        self.sweeps.push(SweepRequest { desc, mode, filter_data, user_data });
    }

    /// Run every recorded query and clear the batch
    pub fn execute(&mut self, manager: &mut SceneQueryManager) -> BatchResults {
        let Self { desc, raycasts, overlaps, sweeps } = self;
        let mut shader = ShaderFilter {
            pre: desc.pre_filter,
            post: desc.post_filter,
            constant_block: &desc.constant_block,
        };
        let mut out = BatchResults::default();

        for request in raycasts.drain(..) {
            let mut hits = HitBuffer::with_limit(desc.max_raycast_hits.saturating_sub(out.raycast_hits.len()));
            let mut ctx = FilterContext::new(&request.filter_data, Some(&mut shader), true);
            let status = match manager.raycast_with(
                &request.origin,
                &request.dir,
                request.max_dist,
                request.mode,
                &mut ctx,
                &mut hits,
            ) {
                Err(_) => QueryStatus::Invalid,
                Ok(()) if hits.overflowed() => QueryStatus::Overflow,
                Ok(()) => QueryStatus::Complete,
            };
            store(&mut out.raycasts, &mut out.raycast_hits, request.user_data, status, hits.iter().copied());
        }

        let mut found = Vec::new();
        for request in overlaps.drain(..) {
            found.clear();
            let remaining = desc.max_overlap_hits.saturating_sub(out.overlap_hits.len());
            let mut ctx = FilterContext::new(&request.filter_data, Some(&mut shader), true);
            let (_, overflow) = manager.overlap_with(&request.volume, &mut ctx, remaining, request.any, &mut found);
            let status = if overflow { QueryStatus::Overflow } else { QueryStatus::Complete };
            store(&mut out.overlaps, &mut out.overlap_hits, request.user_data, status, found.iter().copied());
        }

        for request in sweeps.drain(..) {
            let mut hits = HitBuffer::with_limit(desc.max_sweep_hits.saturating_sub(out.sweep_hits.len()));
            let mut ctx = FilterContext::new(&request.filter_data, Some(&mut shader), true);
            let status = match manager.sweep_with(&request.desc, request.mode, &mut ctx, &mut hits) {
                Err(_) => QueryStatus::Invalid,
                Ok(()) if hits.overflowed() => QueryStatus::Overflow,
                Ok(()) => QueryStatus::Complete,
            };
            store(&mut out.sweeps, &mut out.sweep_hits, request.user_data, status, hits.iter().copied());
        }

        log::trace!(
            "Batch executed: {} raycasts, {} overlaps, {} sweeps",
            out.raycasts.len(),
            out.overlaps.len(),
            out.sweeps.len()
        );
        out
    }
}
