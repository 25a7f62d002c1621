//! Shapes registered with the scene query manager

use slotmap::new_key_type;

use crate::foundation::math::Pose;
use crate::physics::collision::bounds::Aabb;
use crate::physics::collision::shape::Geometry;
use crate::spatial::pruning_pool::WorldBounds;
use super::filtering::FilterData;

new_key_type! {
    /// Stable key of a shape registered with a scene query manager
    ///
    /// Keys stay valid while other shapes come and go; a removed shape's
    /// key never resolves again.
    pub struct ShapeHandle;
}

/// Identifier of the client that owns a shape or issues a query
pub type ClientId = u8;

/// Client every shape and query belongs to unless told otherwise
pub const DEFAULT_CLIENT: ClientId = 0;

/// Registration parameters for a shape
#[derive(Debug, Clone)]
pub struct ShapeDesc {
    /// Local-space geometry
    pub geometry: Geometry,
    /// World placement
    pub pose: Pose,
    /// Moving shapes go to the dynamic pruner
    pub dynamic: bool,
    /// Words tested against query filter data
    pub filter_data: FilterData,
    /// Owning client
    pub client: ClientId,
    /// Visible to queries issued by other clients that accept them
    pub report_to_foreign_clients: bool,
    /// Opaque caller value handed back with hits
    pub user_data: u64,
}

impl ShapeDesc {
    /// Static shape with default filtering
    pub fn new(geometry: Geometry, pose: Pose) -> Self {
        Self {
            geometry,
            pose,
            dynamic: false,
            filter_data: FilterData::default(),
            client: DEFAULT_CLIENT,
            report_to_foreign_clients: true,
            user_data: 0,
        }
    }

    /// Register with the dynamic pruner
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Set the filter words
    pub fn with_filter_data(mut self, filter_data: FilterData) -> Self {
        self.filter_data = filter_data;
        self
    }

    /// Set the owning client and its foreign visibility
    pub fn with_client(mut self, client: ClientId, report_to_foreign_clients: bool) -> Self {
        self.client = client;
        self.report_to_foreign_clients = report_to_foreign_clients;
        self
    }

    /// Attach a caller value
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// A shape as stored in a pruning pool
#[derive(Debug, Clone)]
pub struct SceneShape {
    handle: ShapeHandle,
    desc: ShapeDesc,
}

impl SceneShape {
    pub(crate) fn new(handle: ShapeHandle, desc: ShapeDesc) -> Self {
        Self { handle, desc }
    }

    /// Manager key of the shape
    pub fn handle(&self) -> ShapeHandle {
        self.handle
    }

    /// Local-space geometry
    pub fn geometry(&self) -> &Geometry {
        &self.desc.geometry
    }

    /// Current world placement
    pub fn pose(&self) -> &Pose {
        &self.desc.pose
    }

    /// Filter words
    pub fn filter_data(&self) -> &FilterData {
        &self.desc.filter_data
    }

    /// Whether the shape lives in the dynamic pruner
    pub fn is_dynamic(&self) -> bool {
        self.desc.dynamic
    }

    /// Owning client
    pub fn client(&self) -> ClientId {
        self.desc.client
    }

    /// Visible to foreign clients that accept them
    pub fn reports_to_foreign_clients(&self) -> bool {
        self.desc.report_to_foreign_clients
    }

    /// Caller value
    pub fn user_data(&self) -> u64 {
        self.desc.user_data
    }

    pub(crate) fn set_pose(&mut self, pose: Pose) {
        self.desc.pose = pose;
    }

    pub(crate) fn into_desc(self) -> ShapeDesc {
        self.desc
    }
}

impl WorldBounds for SceneShape {
    fn compute_world_aabb(&self) -> Aabb {
        self.desc.geometry.world_aabb(&self.desc.pose)
    }
}
