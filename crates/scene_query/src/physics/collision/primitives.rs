//! Primitive collision shapes and intersection algorithms
//!
//! Provides basic geometric primitives (spheres, capsules, oriented boxes,
//! planes, triangles) in world space, plus the Möller–Trumbore
//! ray/triangle kernel used by the mesh collider.

use crate::foundation::math::{constants::EPSILON, Mat3, Pose, Vec3};
use super::bounds::Aabb;

/// A sphere in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// The center position of the sphere in world space
    pub center: Vec3,
    /// The radius of the sphere
    pub radius: f32,
}

impl Sphere {
    /// Creates a new sphere with the given center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if this sphere intersects with another
    pub fn intersects(&self, other: &Sphere) -> bool {
        let distance_squared = (self.center - other.center).magnitude_squared();
        let radius_sum = self.radius + other.radius;
        distance_squared <= radius_sum * radius_sum
    }

    /// Bounds of the sphere
    pub fn aabb(&self) -> Aabb {
        Aabb::from_center_extents(self.center, Vec3::repeat(self.radius))
    }

    /// Test ray intersection with this sphere
    ///
    /// Returns (distance, hit_point, normal) for the first crossing in
    /// front of the origin. A ray starting inside reports distance 0.
    pub fn intersect_ray(&self, origin: &Vec3, dir: &Vec3) -> Option<(f32, Vec3, Vec3)> {
        let oc = origin - self.center;
        let c = oc.dot(&oc) - self.radius * self.radius;
        if c <= 0.0 {
            return Some((0.0, *origin, -dir));
        }

        // Solve |origin + t*dir - center|^2 = radius^2 with |dir| = 1
        let b = oc.dot(dir);
        if b > 0.0 {
            return None;
        }
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let t = -b - discriminant.sqrt();
        let hit_point = origin + dir * t;
        let normal = (hit_point - self.center) / self.radius;
        Some((t, hit_point, normal))
    }
}

/// A capsule: the set of points within `radius` of the segment `p0..p1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    /// First segment end point
    pub p0: Vec3,
    /// Second segment end point
    pub p1: Vec3,
    /// Capsule radius
    pub radius: f32,
}

impl Capsule {
    /// Creates a new capsule from its segment and radius
    pub fn new(p0: Vec3, p1: Vec3, radius: f32) -> Self {
        Self { p0, p1, radius }
    }

    /// Capsule whose segment runs along the local X axis of `pose`
    pub fn from_pose(pose: &Pose, half_height: f32, radius: f32) -> Self {
        let axis = pose.transform_vector(&Vec3::new(half_height, 0.0, 0.0));
        Self {
            p0: pose.position - axis,
            p1: pose.position + axis,
            radius,
        }
    }

    /// Bounds of the capsule
    pub fn aabb(&self) -> Aabb {
        let mut aabb = Aabb::new(self.p0, self.p0);
        aabb.include_point(&self.p1);
        aabb.inflated(&Vec3::repeat(self.radius))
    }
}

/// An oriented box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    /// Box center in world space
    pub center: Vec3,
    /// Half extents along the local axes
    pub extents: Vec3,
    /// Local axes as matrix columns
    pub rotation: Mat3,
}

impl Obb {
    /// Creates a new oriented box
    pub fn new(center: Vec3, extents: Vec3, rotation: Mat3) -> Self {
        Self { center, extents, rotation }
    }

    /// Oriented box placed by a pose
    pub fn from_pose(pose: &Pose, extents: Vec3) -> Self {
        Self {
            center: pose.position,
            extents,
            rotation: pose.rotation_matrix(),
        }
    }

    /// Axis-aligned box viewed as an oriented box
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self {
            center: aabb.center(),
            extents: aabb.extents(),
            rotation: Mat3::identity(),
        }
    }

    /// Local axis `i` in world space
    pub fn axis(&self, i: usize) -> Vec3 {
        self.rotation.column(i).into_owned()
    }

    /// Bounds of the box
    pub fn aabb(&self) -> Aabb {
        Aabb::from_oriented(self.center, self.extents, &self.rotation)
    }

    /// World point into the box frame
    pub fn to_local(&self, p: &Vec3) -> Vec3 {
        self.rotation.transpose() * (p - self.center)
    }

    /// Whether `other` lies entirely inside this box
    pub fn contains_obb(&self, other: &Obb) -> bool {
        // Project the other box into our frame and compare its local bounds
        let rel_rot = self.rotation.transpose() * other.rotation;
        let center = self.to_local(&other.center);
        let reach = rel_rot.abs() * other.extents;
        (0..3).all(|i| center[i].abs() + reach[i] <= self.extents[i])
    }

    /// Test ray intersection with this box
    ///
    /// Returns (distance, hit_point, normal). A ray starting inside reports
    /// distance 0.
    pub fn intersect_ray(&self, origin: &Vec3, dir: &Vec3, max_dist: f32) -> Option<(f32, Vec3, Vec3)> {
        let local_origin = self.to_local(origin);
        let local_dir = self.rotation.transpose() * dir;

        let mut tmin = -f32::MAX;
        let mut tmax = f32::MAX;
        let mut hit_axis = 0;
        let mut hit_sign = 0.0f32;
        for axis in 0..3 {
            if local_dir[axis].abs() < 1.0e-12 {
                if local_origin[axis].abs() > self.extents[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / local_dir[axis];
            let t1 = (-self.extents[axis] - local_origin[axis]) * inv;
            let t2 = (self.extents[axis] - local_origin[axis]) * inv;
            let (near, far, sign) = if t1 < t2 { (t1, t2, -1.0) } else { (t2, t1, 1.0) };
            if near > tmin {
                tmin = near;
                hit_axis = axis;
                hit_sign = sign;
            }
            tmax = tmax.min(far);
            if tmin > tmax {
                return None;
            }
        }

        if tmax < 0.0 {
            return None;
        }
        if tmin <= 0.0 {
            return Some((0.0, *origin, -dir));
        }
        if tmin > max_dist {
            return None;
        }
        let mut local_normal = Vec3::zeros();
        local_normal[hit_axis] = hit_sign;
        Some((tmin, origin + dir * tmin, self.rotation * local_normal))
    }
}

/// Plane defined by normal and distance from origin
///
/// Points with a positive signed distance are *outside* the plane; a
/// culling volume is the intersection of the negative half-spaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (should be normalized)
    pub normal: Vec3,
    /// Distance term: `normal · p + distance = 0` on the plane
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Result of a ray/triangle test: distance and barycentric coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Distance along the ray
    pub distance: f32,
    /// Barycentric weight of the second vertex
    pub u: f32,
    /// Barycentric weight of the third vertex
    pub v: f32,
}

/// A triangle for collision detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// First vertex
    pub v0: Vec3,
    /// Second vertex
    pub v1: Vec3,
    /// Third vertex
    pub v2: Vec3,
}

impl Triangle {
    /// Creates a new triangle
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Calculates the normal of the triangle (right-hand rule)
    pub fn normal(&self) -> Vec3 {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;
        edge1.cross(&edge2).normalize()
    }

    /// Calculates the centroid (center point) of the triangle
    pub fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    /// Point from barycentric coordinates
    pub fn point_at(&self, u: f32, v: f32) -> Vec3 {
        self.v0 * (1.0 - u - v) + self.v1 * u + self.v2 * v
    }

    /// Bounds of the triangle
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points([&self.v0, &self.v1, &self.v2])
    }

    /// Vertices as an array
    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v0, self.v1, self.v2]
    }

    /// Möller-Trumbore ray-triangle intersection, one-sided
    ///
    /// Back faces and edge-on triangles never hit. The barycentric bounds
    /// are compared against the unnormalized determinant, relaxed by
    /// `geom_epsilon`, and the division only happens once all of them pass.
    pub fn intersect_ray_culling(&self, origin: &Vec3, dir: &Vec3, geom_epsilon: f32) -> Option<TriangleHit> {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let pvec = dir.cross(&edge2);
        let det = edge1.dot(&pvec);
        if det < EPSILON {
            return None;
        }

        let tvec = origin - self.v0;
        let u = tvec.dot(&pvec);
        let eps_det = geom_epsilon * det;
        if u < -eps_det || u > det + eps_det {
            return None;
        }

        let qvec = tvec.cross(&edge1);
        let v = dir.dot(&qvec);
        if v < -eps_det || u + v > det + eps_det {
            return None;
        }

        let t = edge2.dot(&qvec);
        if t <= EPSILON {
            return None;
        }

        let inv_det = 1.0 / det;
        Some(TriangleHit {
            distance: t * inv_det,
            u: u * inv_det,
            v: v * inv_det,
        })
    }

    /// Möller-Trumbore ray-triangle intersection, two-sided
    pub fn intersect_ray(&self, origin: &Vec3, dir: &Vec3, geom_epsilon: f32) -> Option<TriangleHit> {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let pvec = dir.cross(&edge2);
        let det = edge1.dot(&pvec);
        if det.abs() < EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let tvec = origin - self.v0;
        let u = tvec.dot(&pvec) * inv_det;
        if u < -geom_epsilon || u > 1.0 + geom_epsilon {
            return None;
        }

        let qvec = tvec.cross(&edge1);
        let v = dir.dot(&qvec) * inv_det;
        if v < -geom_epsilon || u + v > 1.0 + geom_epsilon {
            return None;
        }

        let t = edge2.dot(&qvec) * inv_det;
        if t <= EPSILON {
            return None;
        }
        Some(TriangleHit { distance: t, u, v })
    }

    /// Get the closest point on the triangle to a given point
    pub fn closest_point(&self, point: &Vec3) -> Vec3 {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;
        let v0_to_point = point - self.v0;

        let d1 = edge1.dot(&v0_to_point);
        let d2 = edge2.dot(&v0_to_point);

        // Vertex region outside v0
        if d1 <= 0.0 && d2 <= 0.0 {
            return self.v0;
        }

        // Vertex region outside v1
        let v1_to_point = point - self.v1;
        let d3 = edge1.dot(&v1_to_point);
        let d4 = edge2.dot(&v1_to_point);
        if d3 >= 0.0 && d4 <= d3 {
            return self.v1;
        }

        // Vertex region outside v2
        let v2_to_point = point - self.v2;
        let d5 = edge1.dot(&v2_to_point);
        let d6 = edge2.dot(&v2_to_point);
        if d6 >= 0.0 && d5 <= d6 {
            return self.v2;
        }

        // Edge regions
        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v_val = d1 / (d1 - d3);
            return self.v0 + edge1 * v_val;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return self.v0 + edge2 * w;
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return self.v1 + (self.v2 - self.v1) * w;
        }

        // Inside the face
        let denom = 1.0 / (va + vb + vc);
        let v_val = vb * denom;
        let w = vc * denom;
        self.v0 + edge1 * v_val + edge2 * w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn unit_triangle() -> Triangle {
        Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn test_triangle_culling_rejects_back_face() {
        let tri = unit_triangle();
        let front = tri.intersect_ray_culling(&Vec3::new(0.2, 0.2, 1.0), &-Vec3::z(), 0.0);
        let back = tri.intersect_ray_culling(&Vec3::new(0.2, 0.2, -1.0), &Vec3::z(), 0.0);
        assert!(front.is_some());
        assert!(back.is_none());
        assert!(tri.intersect_ray(&Vec3::new(0.2, 0.2, -1.0), &Vec3::z(), 0.0).is_some());
    }

    #[test]
    fn test_triangle_behind_origin_misses() {
        let tri = unit_triangle();
        assert!(tri.intersect_ray(&Vec3::new(0.2, 0.2, -1.0), &-Vec3::z(), 0.0).is_none());
        assert!(tri.intersect_ray_culling(&Vec3::new(0.2, 0.2, -1.0), &-Vec3::z(), 0.0).is_none());
    }

    #[test]
    fn test_geometry_epsilon_relaxes_edges() {
        let tri = unit_triangle();
        let origin = Vec3::new(-0.001, 0.5, 1.0);
        assert!(tri.intersect_ray(&origin, &-Vec3::z(), 0.0).is_none());
        assert!(tri.intersect_ray(&origin, &-Vec3::z(), 0.01).is_some());
        assert!(tri.intersect_ray_culling(&origin, &-Vec3::z(), 0.01).is_some());
    }

    #[test]
    fn test_sphere_ray() {
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, 10.0), 2.0);
        let (t, p, n) = sphere.intersect_ray(&Vec3::zeros(), &Vec3::z()).unwrap();
        assert_relative_eq!(t, 8.0, epsilon = 1e-5);
        assert_relative_eq!(p, Vec3::new(0.0, 0.0, 8.0), epsilon = 1e-5);
        assert_relative_eq!(n, -Vec3::z(), epsilon = 1e-5);
        assert!(sphere.intersect_ray(&Vec3::zeros(), &-Vec3::z()).is_none());
    }

    #[test]
    fn test_obb_ray_normal() {
        let obb = Obb::new(Vec3::new(5.0, 0.0, 0.0), Vec3::repeat(1.0), Mat3::identity());
        let (t, _, n) = obb.intersect_ray(&Vec3::zeros(), &Vec3::x(), f32::MAX).unwrap();
        assert_relative_eq!(t, 4.0, epsilon = 1e-5);
        assert_relative_eq!(n, -Vec3::x(), epsilon = 1e-5);
        assert!(obb.intersect_ray(&Vec3::zeros(), &Vec3::x(), 3.0).is_none());
    }

    #[test]
    fn test_obb_contains_obb() {
        let outer = Obb::new(Vec3::zeros(), Vec3::repeat(5.0), Mat3::identity());
        let inner = Obb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::repeat(1.0), Mat3::identity());
        assert!(outer.contains_obb(&inner));
        assert!(!inner.contains_obb(&outer));
    }

    proptest! {
        #[test]
        fn prop_triangle_barycentric_round_trip(
            u in 0.05f32..0.9,
            v_frac in 0.05f32..0.9,
            ox in -5.0f32..5.0, oy in -5.0f32..5.0, oz in 1.0f32..5.0,
        ) {
            let tri = Triangle::new(
                Vec3::new(-1.0, -1.0, 0.3),
                Vec3::new(2.0, -0.5, -0.2),
                Vec3::new(0.0, 2.0, 0.1),
            );
            let v = (1.0 - u) * v_frac * 0.95;
            let target = tri.point_at(u, v);
            let origin = target + Vec3::new(ox, oy, oz);
            let dir = (target - origin).normalize();
            let expected = (target - origin).magnitude();

            let hit = tri.intersect_ray(&origin, &dir, 0.0);
            prop_assert!(hit.is_some());
            let hit = hit.unwrap();
            prop_assert!(hit.distance > 0.0);
            prop_assert!((hit.u - u).abs() < 1e-3);
            prop_assert!((hit.v - v).abs() < 1e-3);
            prop_assert!((hit.distance - expected).abs() < 1e-3 * expected.max(1.0));

            // Origin moved past the triangle: nothing in front any more
            let past = target + dir * 0.5;
            prop_assert!(tri.intersect_ray(&past, &dir, 0.0).is_none());
        }
    }
}
