//! Exact overlap tests between query volumes and shape geometry

use crate::foundation::math::{Pose, Vec3};
use super::bounds::Aabb;
use super::distance::{point_obb_sq, point_segment_sq, point_triangle_sq, segment_obb_sq, segment_segment_sq, segment_triangle_sq};
use super::intersection::{obb_obb_overlap, triangle_obb_overlap, BoxVolume};
use super::mesh::TriangleMesh;
use super::primitives::{Capsule, Obb, Sphere, Triangle};
use super::shape::Geometry;

/// World-space volume used by overlap and sweep queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryVolume {
    /// Sphere volume
    Sphere(Sphere),
    /// Oriented box volume
    Box(Obb),
    /// Capsule volume
    Capsule(Capsule),
}

impl QueryVolume {
    /// Bounds of the volume
    pub fn aabb(&self) -> Aabb {
        match self {
            QueryVolume::Sphere(sphere) => sphere.aabb(),
            QueryVolume::Box(obb) => obb.aabb(),
            QueryVolume::Capsule(capsule) => capsule.aabb(),
        }
    }

    /// The same volume expressed in the frame of `pose`
    pub fn to_local(&self, pose: &Pose) -> QueryVolume {
        match self {
            QueryVolume::Sphere(sphere) => {
                QueryVolume::Sphere(Sphere::new(pose.inverse_transform_point(&sphere.center), sphere.radius))
            }
            QueryVolume::Box(obb) => QueryVolume::Box(Obb::new(
                pose.inverse_transform_point(&obb.center),
                obb.extents,
                pose.rotation_matrix().transpose() * obb.rotation,
            )),
            QueryVolume::Capsule(capsule) => QueryVolume::Capsule(Capsule::new(
                pose.inverse_transform_point(&capsule.p0),
                pose.inverse_transform_point(&capsule.p1),
                capsule.radius,
            )),
        }
    }

    /// The same volume moved by `offset`
    pub fn translated(&self, offset: &Vec3) -> QueryVolume {
        match self {
            QueryVolume::Sphere(sphere) => QueryVolume::Sphere(Sphere::new(sphere.center + offset, sphere.radius)),
            QueryVolume::Box(obb) => QueryVolume::Box(Obb::new(obb.center + offset, obb.extents, obb.rotation)),
            QueryVolume::Capsule(capsule) => {
                QueryVolume::Capsule(Capsule::new(capsule.p0 + offset, capsule.p1 + offset, capsule.radius))
            }
        }
    }

    /// Whether the volume touches a single triangle
    pub fn overlaps_triangle(&self, triangle: &Triangle) -> bool {
        match self {
            QueryVolume::Sphere(sphere) => point_triangle_sq(&sphere.center, triangle).0 <= sphere.radius * sphere.radius,
            QueryVolume::Box(obb) => triangle_obb_overlap(triangle, obb),
            QueryVolume::Capsule(capsule) => {
                segment_triangle_sq(&capsule.p0, &capsule.p1, triangle).0 <= capsule.radius * capsule.radius
            }
        }
    }
}

impl BoxVolume for QueryVolume {
    fn overlaps_box(&self, center: &Vec3, extents: &Vec3) -> bool {
        match self {
            QueryVolume::Sphere(sphere) => sphere.overlaps_box(center, extents),
            QueryVolume::Box(obb) => obb.overlaps_box(center, extents),
            QueryVolume::Capsule(capsule) => capsule.overlaps_box(center, extents),
        }
    }

    fn contains_box(&self, center: &Vec3, extents: &Vec3) -> bool {
        match self {
            QueryVolume::Sphere(sphere) => sphere.contains_box(center, extents),
            QueryVolume::Box(obb) => obb.contains_box(center, extents),
            QueryVolume::Capsule(capsule) => capsule.contains_box(center, extents),
        }
    }

    fn bounds(&self) -> Aabb {
        self.aabb()
    }
}

/// Triangles of `mesh` touched by a local-space volume
///
/// Calls `cb` with each triangle index until it returns `false`.
pub fn mesh_overlap_triangles(local: &QueryVolume, mesh: &TriangleMesh, cb: &mut impl FnMut(u32) -> bool) -> bool {
    mesh.tree().overlap(local, &mut |prim| {
        if local.overlaps_triangle(&mesh.local_triangle(prim as usize)) {
            cb(prim)
        } else {
            true
        }
    })
}

/// Whether `volume` touches `geometry` placed at `pose`
pub fn overlap_geometry(volume: &QueryVolume, geometry: &Geometry, pose: &Pose) -> bool {
    match (volume, geometry) {
        (_, Geometry::TriangleMesh(mesh)) => {
            let local = volume.to_local(pose);
            // The walk is aborted on the first touching triangle
            !mesh_overlap_triangles(&local, mesh, &mut |_| false)
        }
        (QueryVolume::Sphere(sphere), Geometry::Sphere { radius }) => {
            let reach = sphere.radius + radius;
            (sphere.center - pose.position).magnitude_squared() <= reach * reach
        }
        (QueryVolume::Sphere(sphere), Geometry::Box { half_extents }) => {
            point_obb_sq(&sphere.center, &Obb::from_pose(pose, *half_extents)).0 <= sphere.radius * sphere.radius
        }
        (QueryVolume::Sphere(sphere), Geometry::Capsule { radius, half_height }) => {
            let capsule = Capsule::from_pose(pose, *half_height, *radius);
            let reach = sphere.radius + radius;
            point_segment_sq(&sphere.center, &capsule.p0, &capsule.p1).0 <= reach * reach
        }
        (QueryVolume::Box(obb), Geometry::Sphere { radius }) => point_obb_sq(&pose.position, obb).0 <= radius * radius,
        (QueryVolume::Box(obb), Geometry::Box { half_extents }) => obb_obb_overlap(obb, &Obb::from_pose(pose, *half_extents)),
        (QueryVolume::Box(obb), Geometry::Capsule { radius, half_height }) => {
            let capsule = Capsule::from_pose(pose, *half_height, *radius);
            segment_obb_sq(&capsule.p0, &capsule.p1, obb).0 <= radius * radius
        }
        (QueryVolume::Capsule(capsule), Geometry::Sphere { radius }) => {
            let reach = capsule.radius + radius;
            point_segment_sq(&pose.position, &capsule.p0, &capsule.p1).0 <= reach * reach
        }
        (QueryVolume::Capsule(capsule), Geometry::Box { half_extents }) => {
            segment_obb_sq(&capsule.p0, &capsule.p1, &Obb::from_pose(pose, *half_extents)).0
                <= capsule.radius * capsule.radius
        }
        (QueryVolume::Capsule(capsule), Geometry::Capsule { radius, half_height }) => {
            let other = Capsule::from_pose(pose, *half_height, *radius);
            let reach = capsule.radius + radius;
            segment_segment_sq(&capsule.p0, &capsule.p1, &other.p0, &other.p1).0 <= reach * reach
        }
    }
}
