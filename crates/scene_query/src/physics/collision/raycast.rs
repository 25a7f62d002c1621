//! Exact ray tests against shape geometry

use crate::foundation::math::{Pose, Vec3};
use super::distance::point_segment_sq;
use super::primitives::{Capsule, Obb, Sphere};
use super::ray_collider::MeshRayCollider;
use super::shape::Geometry;

/// Options for mesh raycasts
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RaycastOptions {
    /// Report back-facing triangles too
    pub double_sided: bool,
    /// Report every triangle along the ray instead of the nearest
    pub mesh_multiple: bool,
    /// Barycentric slack for triangle edges
    pub geom_epsilon: f32,
}

/// A ray contact on a shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryHit {
    /// Distance along the ray
    pub distance: f32,
    /// World-space contact point
    pub position: Vec3,
    /// World-space surface normal, facing the ray origin
    pub normal: Vec3,
    /// Triangle index for mesh hits
    pub face_index: Option<u32>,
    /// Barycentric coordinate toward the second vertex
    pub u: f32,
    /// Barycentric coordinate toward the third vertex
    pub v: f32,
}

impl GeometryHit {
    fn solid(distance: f32, position: Vec3, normal: Vec3) -> Self {
        Self { distance, position, normal, face_index: None, u: 0.0, v: 0.0 }
    }
}

/// First crossing of a ray with a capsule
///
/// A ray starting inside reports distance 0.
pub fn ray_capsule(origin: &Vec3, dir: &Vec3, capsule: &Capsule) -> Option<(f32, Vec3, Vec3)> {
    let r_sq = capsule.radius * capsule.radius;
    if point_segment_sq(origin, &capsule.p0, &capsule.p1).0 <= r_sq {
        return Some((0.0, *origin, -dir));
    }

    let ba = capsule.p1 - capsule.p0;
    let oa = origin - capsule.p0;
    let baba = ba.dot(&ba);
    let bard = ba.dot(dir);
    let baoa = ba.dot(&oa);

    let mut best: Option<(f32, Vec3, Vec3)> = None;

    // Cylinder body, clipped to the segment
    let a = baba - bard * bard;
    if a > 1.0e-12 && baba > 0.0 {
        let b = baba * dir.dot(&oa) - baoa * bard;
        let c = baba * oa.dot(&oa) - baoa * baoa - r_sq * baba;
        let h = b * b - a * c;
        if h >= 0.0 {
            let t = (-b - h.sqrt()) / a;
            let y = baoa + t * bard;
            if t >= 0.0 && y > 0.0 && y < baba {
                let p = origin + dir * t;
                let axis_point = capsule.p0 + ba * (y / baba);
                best = Some((t, p, (p - axis_point).normalize()));
            }
        }
    }

    for cap in [capsule.p0, capsule.p1] {
        if let Some(hit) = Sphere::new(cap, capsule.radius).intersect_ray(origin, dir) {
            if best.map_or(true, |(t, _, _)| hit.0 < t) {
                best = Some(hit);
            }
        }
    }
    best
}

/// Cast a ray against `geometry` placed at `pose`
///
/// Appends hits within `max_dist` and returns how many were added. Only
/// meshes with [`RaycastOptions::mesh_multiple`] report more than one.
pub fn raycast_geometry(
    geometry: &Geometry,
    pose: &Pose,
    origin: &Vec3,
    dir: &Vec3,
    max_dist: f32,
    options: &RaycastOptions,
    hits: &mut Vec<GeometryHit>,
) -> usize {
    let solid = match geometry {
        Geometry::Sphere { radius } => Sphere::new(pose.position, *radius).intersect_ray(origin, dir),
        Geometry::Box { half_extents } => Obb::from_pose(pose, *half_extents).intersect_ray(origin, dir, max_dist),
        Geometry::Capsule { radius, half_height } => {
            ray_capsule(origin, dir, &Capsule::from_pose(pose, *half_height, *radius))
        }
        Geometry::TriangleMesh(mesh) => {
            let local_origin = pose.inverse_transform_point(origin);
            let local_dir = pose.inverse_transform_vector(dir);
            let collider = MeshRayCollider::new()
                .with_culling(!options.double_sided)
                .with_closest_hit(!options.mesh_multiple)
                .with_max_dist(max_dist)
                .with_geom_epsilon(options.geom_epsilon);
            let mut faces = Vec::new();
            if !collider.collide(&local_origin, &local_dir, mesh, &mut faces) {
                return 0;
            }
            for face in &faces {
                let triangle = mesh.local_triangle(face.face_id as usize);
                let mut normal = pose.transform_vector(&triangle.normal());
                if normal.dot(dir) > 0.0 {
                    normal = -normal;
                }
                hits.push(GeometryHit {
                    distance: face.distance,
                    position: origin + dir * face.distance,
                    normal,
                    face_index: Some(face.face_id),
                    u: face.u,
                    v: face.v,
                });
            }
            return faces.len();
        }
    };

    match solid {
        Some((distance, position, normal)) if distance <= max_dist => {
            hits.push(GeometryHit::solid(distance, position, normal));
            1
        }
        _ => 0,
    }
}
