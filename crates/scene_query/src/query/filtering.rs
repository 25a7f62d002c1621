//! Query filtering
//!
//! Each candidate shape goes through two optional phases. The pre-filter
//! runs before the exact geometry test and sees only filter data; the
//! post-filter runs on a found hit. Both return a [`HitType`]: `Block`
//! hits bound or end the query, `Touch` hits are collected without
//! stopping it and `None` drops the candidate.
//!
//! Non-batched queries first apply a word-mask test: a query with
//! non-zero filter data only sees shapes sharing at least one bit in one
//! of the four words. Batched queries rely on their filter shaders alone.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::hits::QueryHit;
use super::scene_shape::{ClientId, SceneShape, DEFAULT_CLIENT};

/// Four words of user filter bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterData {
    /// Word 0
    pub word0: u32,
    /// Word 1
    pub word1: u32,
    /// Word 2
    pub word2: u32,
    /// Word 3
    pub word3: u32,
}

impl FilterData {
    /// Filter data from four words
    pub fn new(word0: u32, word1: u32, word2: u32, word3: u32) -> Self {
        Self { word0, word1, word2, word3 }
    }

    /// Whether every word is zero
    pub fn is_zero(&self) -> bool {
        self.word0 | self.word1 | self.word2 | self.word3 == 0
    }

    /// Word-mask test of query data against shape data
    ///
    /// Zero query data accepts everything.
    pub fn accepts(&self, shape: &FilterData) -> bool {
        self.is_zero()
            || (self.word0 & shape.word0) | (self.word1 & shape.word1) | (self.word2 & shape.word2) | (self.word3 & shape.word3)
                != 0
    }
}

bitflags! {
    /// Per-query switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueryFilterFlags: u16 {
        /// Test shapes in the static pruner
        const STATIC = 1 << 0;
        /// Test shapes in the dynamic pruner
        const DYNAMIC = 1 << 1;
        /// Run the pre-filter callback
        const PREFILTER = 1 << 2;
        /// Run the post-filter callback
        const POSTFILTER = 1 << 3;
        /// Report back faces of meshes
        const BACKFACE = 1 << 4;
        /// Report every mesh triangle hit by multiple-hit raycasts
        const MESH_MULTIPLE = 1 << 5;
    }
}

impl Default for QueryFilterFlags {
    fn default() -> Self {
        Self::STATIC | Self::DYNAMIC
    }
}

/// Flags a pre-filter is allowed to change
pub const PREFILTER_EDITABLE_FLAGS: QueryFilterFlags = QueryFilterFlags::BACKFACE.union(QueryFilterFlags::MESH_MULTIPLE);

/// Classification of a candidate or hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitType {
    /// Ignore the candidate
    None,
    /// Record the hit and keep searching
    Touch,
    /// Record the hit and bound the search
    Block,
}

/// Filtering parameters of one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryFilterData {
    /// Words tested against shape filter data
    pub data: FilterData,
    /// Query switches
    pub flags: QueryFilterFlags,
    /// Client issuing the query
    pub client: ClientId,
    /// Also see shapes of other clients that report to foreign clients
    pub accept_foreign_shapes: bool,
}

impl Default for QueryFilterData {
    fn default() -> Self {
        Self {
            data: FilterData::default(),
            flags: QueryFilterFlags::default(),
            client: DEFAULT_CLIENT,
            accept_foreign_shapes: false,
        }
    }
}

impl QueryFilterData {
    /// Query filtering with the given words
    pub fn new(data: FilterData, flags: QueryFilterFlags) -> Self {
        Self { data, flags, ..Default::default() }
    }

    /// Issue the query as `client`
    pub fn with_client(mut self, client: ClientId, accept_foreign_shapes: bool) -> Self {
        self.client = client;
        self.accept_foreign_shapes = accept_foreign_shapes;
        self
    }

    /// Client visibility of `shape`
    pub fn sees_client_of(&self, shape: &SceneShape) -> bool {
        shape.client() == self.client || (self.accept_foreign_shapes && shape.reports_to_foreign_clients())
    }
}

/// User filter callbacks
///
/// Both methods default to accepting every candidate as blocking.
pub trait QueryFilter {
    /// Classify a candidate before its exact test
    ///
    /// Changes to `flags` outside [`PREFILTER_EDITABLE_FLAGS`] are ignored.
    fn pre_filter(&mut self, query: &FilterData, shape: &SceneShape, flags: &mut QueryFilterFlags) -> HitType {
        let _ = (query, shape, flags);
        HitType::Block
    }

    /// Reclassify a hit found by the exact test
    ///
    /// The returned type replaces the pre-filter type outright, so a
    /// `Touch` may come back as `Block` as well as `None`.
    fn post_filter(&mut self, query: &FilterData, shape: &SceneShape, hit: &QueryHit) -> HitType {
        let _ = (query, shape, hit);
        HitType::Block
    }
}

/// Batch pre-filter: (query data, shape data, constant block, flags) -> hit type
pub type PreFilterShader = fn(&FilterData, &FilterData, &[u8], &mut QueryFilterFlags) -> HitType;

/// Batch post-filter: (query data, shape data, constant block, hit) -> hit type
pub type PostFilterShader = fn(&FilterData, &FilterData, &[u8], &QueryHit) -> HitType;

/// Filter built from batch shaders and their shared constant block
#[derive(Clone, Copy)]
pub struct ShaderFilter<'a> {
    /// Runs when a query sets [`QueryFilterFlags::PREFILTER`]
    pub pre: Option<PreFilterShader>,
    /// Runs when a query sets [`QueryFilterFlags::POSTFILTER`]
    pub post: Option<PostFilterShader>,
    /// Bytes handed to both shaders
    pub constant_block: &'a [u8],
}

impl QueryFilter for ShaderFilter<'_> {
    fn pre_filter(&mut self, query: &FilterData, shape: &SceneShape, flags: &mut QueryFilterFlags) -> HitType {
        self.pre.map_or(HitType::Block, |pre| pre(query, shape.filter_data(), self.constant_block, flags))
    }

    fn post_filter(&mut self, query: &FilterData, shape: &SceneShape, hit: &QueryHit) -> HitType {
        self.post.map_or(HitType::Block, |post| post(query, shape.filter_data(), self.constant_block, hit))
    }
}

/// Filtering state threaded through one query
pub(crate) struct FilterContext<'q, 'f> {
    pub(crate) data: &'q QueryFilterData,
    pub(crate) filter: Option<&'f mut dyn QueryFilter>,
    pub(crate) batched: bool,
}

impl<'q, 'f> FilterContext<'q, 'f> {
    pub(crate) fn new(data: &'q QueryFilterData, filter: Option<&'f mut dyn QueryFilter>, batched: bool) -> Self {
        Self { data, filter, batched }
    }

    /// Checks that need no callback: client visibility and, outside batches, the word mask
    pub(crate) fn coarse_accepts(&self, shape: &SceneShape) -> bool {
        self.data.sees_client_of(shape) && (self.batched || self.data.data.accepts(shape.filter_data()))
    }

    /// Full pre-filter phase; returns the hit type and the flags to test with
    pub(crate) fn pre_filter(&mut self, shape: &SceneShape) -> (HitType, QueryFilterFlags) {
        let flags = self.data.flags;
        if !self.coarse_accepts(shape) {
            return (HitType::None, flags);
        }
        if !flags.contains(QueryFilterFlags::PREFILTER) {
            return (HitType::Block, flags);
        }
        let Some(filter) = self.filter.as_deref_mut() else {
            return (HitType::Block, flags);
        };
        let mut edited = flags;
        let hit_type = filter.pre_filter(&self.data.data, shape, &mut edited);
        let flags = (flags - PREFILTER_EDITABLE_FLAGS) | (edited & PREFILTER_EDITABLE_FLAGS);
        (hit_type, flags)
    }

    /// Post-filter phase for a hit whose pre-filter type was `hit_type`
    ///
    /// The callback's answer wins over `hit_type`.
    pub(crate) fn post_filter(&mut self, shape: &SceneShape, hit: &QueryHit, hit_type: HitType) -> HitType {
        if !self.data.flags.contains(QueryFilterFlags::POSTFILTER) {
            return hit_type;
        }
        match self.filter.as_deref_mut() {
            Some(filter) => filter.post_filter(&self.data.data, shape, hit),
            None => hit_type,
        }
    }
}
