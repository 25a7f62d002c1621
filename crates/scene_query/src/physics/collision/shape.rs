//! Shape geometry registered with the scene query system
//!
//! Geometry is stored in local space; a [`Pose`] places it in the world
//! at query time.

use std::sync::Arc;

use crate::foundation::math::{Pose, Vec3};
use super::bounds::Aabb;
use super::mesh::TriangleMesh;
use super::primitives::{Capsule, Obb, Sphere};

/// Local-space geometry of a shape
#[derive(Debug, Clone)]
pub enum Geometry {
    /// Sphere centered on the pose
    Sphere {
        /// Sphere radius
        radius: f32,
    },
    /// Box centered on the pose
    Box {
        /// Half extents along the local axes
        half_extents: Vec3,
    },
    /// Capsule whose segment runs along the local X axis
    Capsule {
        /// Capsule radius
        radius: f32,
        /// Half length of the inner segment
        half_height: f32,
    },
    /// Shared triangle mesh
    TriangleMesh(Arc<TriangleMesh>),
}

impl Geometry {
    /// Sphere geometry
    pub fn sphere(radius: f32) -> Self {
        Self::Sphere { radius }
    }

    /// Box geometry
    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::Box { half_extents }
    }

    /// Capsule geometry
    pub fn capsule(radius: f32, half_height: f32) -> Self {
        Self::Capsule { radius, half_height }
    }

    /// Mesh geometry
    pub fn mesh(mesh: Arc<TriangleMesh>) -> Self {
        Self::TriangleMesh(mesh)
    }

    /// World-space bounds at `pose`
    pub fn world_aabb(&self, pose: &Pose) -> Aabb {
        match self {
            Geometry::Sphere { radius } => Sphere::new(pose.position, *radius).aabb(),
            Geometry::Box { half_extents } => Obb::from_pose(pose, *half_extents).aabb(),
            Geometry::Capsule { radius, half_height } => Capsule::from_pose(pose, *half_height, *radius).aabb(),
            Geometry::TriangleMesh(mesh) => {
                let local = mesh.local_bounds();
                if !local.is_valid() {
                    return Aabb::from_center_extents(pose.position, Vec3::zeros());
                }
                Aabb::from_oriented(
                    pose.transform_point(&local.center()),
                    local.extents(),
                    &pose.rotation_matrix(),
                )
            }
        }
    }

    /// Whether this is a triangle mesh
    pub fn is_mesh(&self) -> bool {
        matches!(self, Geometry::TriangleMesh(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Quat;
    use crate::physics::collision::mesh::tests::quad;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_world_aabb_follows_pose() {
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_axis_angle(&Vec3::z_axis(), FRAC_PI_2));
        let aabb = Geometry::capsule(0.5, 2.0).world_aabb(&pose);
        // Local X maps to world Y
        assert_relative_eq!(aabb.extents(), Vec3::new(0.5, 2.5, 0.5), epsilon = 1e-5);
        assert_relative_eq!(aabb.center(), pose.position, epsilon = 1e-5);

        let aabb = Geometry::cuboid(Vec3::new(3.0, 1.0, 1.0)).world_aabb(&pose);
        assert_relative_eq!(aabb.extents(), Vec3::new(1.0, 3.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_mesh_bounds() {
        let mesh = Geometry::mesh(Arc::new(quad()));
        assert!(mesh.is_mesh());
        let aabb = mesh.world_aabb(&Pose::from_position(Vec3::new(0.0, 5.0, 0.0)));
        assert_relative_eq!(aabb.min, Vec3::new(-1.0, 5.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(aabb.max, Vec3::new(1.0, 5.0, 1.0), epsilon = 1e-5);
        assert!(!Geometry::sphere(1.0).is_mesh());
    }
}
