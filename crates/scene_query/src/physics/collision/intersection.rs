//! Boolean overlap kernels used by the broad phase
//!
//! Separating-axis tests for ray/segment against boxes, plane masks
//! for culling, box/box and triangle/box SAT, and the [`BoxVolume`]
//! trait that lets every pruner run the same overlap traversal for
//! spheres, boxes, oriented boxes and capsules.

use crate::foundation::math::{constants::MAX, utils, Mat3, Vec3};
use super::bounds::Aabb;
use super::distance::{point_aabb_sq, point_segment_sq, segment_aabb_sq};
use super::primitives::{Capsule, Obb, Plane, Sphere, Triangle};

/// Precomputed ray or segment for repeated box tests
///
/// An unbounded `max_dist` selects the ray form; a finite one selects
/// the segment form, expressed around the segment midpoint.
#[derive(Debug, Clone, Copy)]
pub struct RayAabbTester {
    /// Ray origin, or segment midpoint
    origin: Vec3,
    /// Ray direction, or half segment
    dir: Vec3,
    /// Absolute value of `dir`
    fdir: Vec3,
    is_segment: bool,
}

impl RayAabbTester {
    /// Choose the ray or segment form depending on `max_dist`
    pub fn new(origin: &Vec3, dir: &Vec3, max_dist: f32) -> Self {
        if max_dist >= MAX {
            Self::ray(origin, dir)
        } else {
            Self::segment(origin, dir, max_dist)
        }
    }

    /// Half-infinite ray
    pub fn ray(origin: &Vec3, dir: &Vec3) -> Self {
        Self {
            origin: *origin,
            dir: *dir,
            fdir: utils::abs(dir),
            is_segment: false,
        }
    }

    /// Segment from `origin` to `origin + dir * max_dist`
    pub fn segment(origin: &Vec3, dir: &Vec3, max_dist: f32) -> Self {
        let half = dir * (max_dist * 0.5);
        Self {
            origin: origin + half,
            dir: half,
            fdir: utils::abs(&half),
            is_segment: true,
        }
    }

    /// Whether this tester uses the bounded form
    pub fn is_segment(&self) -> bool {
        self.is_segment
    }

    /// Separating-axis test against a box given by center and extents
    pub fn overlaps(&self, center: &Vec3, extents: &Vec3) -> bool {
        let d = self.origin - center;

        if self.is_segment {
            if d.x.abs() > extents.x + self.fdir.x
                || d.y.abs() > extents.y + self.fdir.y
                || d.z.abs() > extents.z + self.fdir.z
            {
                return false;
            }
        } else if (d.x.abs() > extents.x && d.x * self.dir.x >= 0.0)
            || (d.y.abs() > extents.y && d.y * self.dir.y >= 0.0)
            || (d.z.abs() > extents.z && d.z * self.dir.z >= 0.0)
        {
            return false;
        }

        let dir = &self.dir;
        let fdir = &self.fdir;
        let f = dir.y * d.z - dir.z * d.y;
        if f.abs() > extents.y * fdir.z + extents.z * fdir.y {
            return false;
        }
        let f = dir.z * d.x - dir.x * d.z;
        if f.abs() > extents.x * fdir.z + extents.z * fdir.x {
            return false;
        }
        let f = dir.x * d.y - dir.y * d.x;
        if f.abs() > extents.x * fdir.y + extents.y * fdir.x {
            return false;
        }
        true
    }

    /// Convenience wrapper over [`RayAabbTester::overlaps`]
    pub fn overlaps_aabb(&self, aabb: &Aabb) -> bool {
        self.overlaps(&aabb.center(), &aabb.extents())
    }
}

/// Ray-vs-box test (unbounded)
pub fn ray_aabb(origin: &Vec3, dir: &Vec3, center: &Vec3, extents: &Vec3) -> bool {
    RayAabbTester::ray(origin, dir).overlaps(center, extents)
}

/// Segment-vs-box test for `origin .. origin + dir * max_dist`
pub fn segment_aabb(origin: &Vec3, dir: &Vec3, max_dist: f32, center: &Vec3, extents: &Vec3) -> bool {
    RayAabbTester::segment(origin, dir, max_dist).overlaps(center, extents)
}

/// Classify a box against the planes selected by `in_mask`
///
/// Returns `None` when the box is entirely outside one plane, otherwise
/// the mask of planes the box still straddles. A zero mask means the box
/// is fully inside every selected plane.
pub fn planes_aabb_overlap(center: &Vec3, extents: &Vec3, planes: &[Plane], in_mask: u32) -> Option<u32> {
    let mut out_mask = 0u32;
    for (i, plane) in planes.iter().enumerate().take(32) {
        let bit = 1u32 << i;
        if in_mask & bit == 0 {
            continue;
        }
        let np = extents.dot(&utils::abs(&plane.normal));
        let mp = center.dot(&plane.normal) + plane.distance;
        if np < mp {
            return None;
        }
        if -np < mp {
            out_mask |= bit;
        }
    }
    Some(out_mask)
}

/// Mask selecting every plane of a set
pub fn full_plane_mask(nb_planes: usize) -> u32 {
    if nb_planes >= 32 {
        u32::MAX
    } else {
        (1u32 << nb_planes) - 1
    }
}

/// Separating-axis test between two oriented boxes (15 axes)
pub fn obb_obb_overlap(a: &Obb, b: &Obb) -> bool {
    const PARALLEL_EPS: f32 = 1.0e-6;
    // Rotation and translation of b expressed in a's frame
    let r: Mat3 = a.rotation.transpose() * b.rotation;
    let t = a.rotation.transpose() * (b.center - a.center);
    let abs_r = r.abs().add_scalar(PARALLEL_EPS);
    let ea = &a.extents;
    let eb = &b.extents;

    for i in 0..3 {
        let ra = ea[i];
        let rb = eb[0] * abs_r[(i, 0)] + eb[1] * abs_r[(i, 1)] + eb[2] * abs_r[(i, 2)];
        if t[i].abs() > ra + rb {
            return false;
        }
    }
    for j in 0..3 {
        let ra = ea[0] * abs_r[(0, j)] + ea[1] * abs_r[(1, j)] + ea[2] * abs_r[(2, j)];
        let rb = eb[j];
        let proj = t[0] * r[(0, j)] + t[1] * r[(1, j)] + t[2] * r[(2, j)];
        if proj.abs() > ra + rb {
            return false;
        }
    }
    for i in 0..3 {
        let i1 = (i + 1) % 3;
        let i2 = (i + 2) % 3;
        for j in 0..3 {
            let j1 = (j + 1) % 3;
            let j2 = (j + 2) % 3;
            let ra = ea[i1] * abs_r[(i2, j)] + ea[i2] * abs_r[(i1, j)];
            let rb = eb[j1] * abs_r[(i, j2)] + eb[j2] * abs_r[(i, j1)];
            let proj = t[i2] * r[(i1, j)] - t[i1] * r[(i2, j)];
            if proj.abs() > ra + rb {
                return false;
            }
        }
    }
    true
}

/// Triangle-vs-box test with the box centered at the origin (13 axes)
pub fn triangle_box_overlap_local(tri: &Triangle, extents: &Vec3) -> bool {
    let v = tri.vertices();
    let edges = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];

    // Box face normals
    for axis in 0..3 {
        let min = v[0][axis].min(v[1][axis]).min(v[2][axis]);
        let max = v[0][axis].max(v[1][axis]).max(v[2][axis]);
        if min > extents[axis] || max < -extents[axis] {
            return false;
        }
    }

    // Triangle normal
    let normal = edges[0].cross(&edges[1]);
    let d = normal.dot(&v[0]);
    let r = extents.dot(&utils::abs(&normal));
    if d.abs() > r {
        return false;
    }

    // Edge cross products
    for edge in &edges {
        for axis in 0..3 {
            let mut unit = Vec3::zeros();
            unit[axis] = 1.0;
            let l = unit.cross(edge);
            if l.magnitude_squared() < 1.0e-12 {
                continue;
            }
            let p0 = l.dot(&v[0]);
            let p1 = l.dot(&v[1]);
            let p2 = l.dot(&v[2]);
            let min = p0.min(p1).min(p2);
            let max = p0.max(p1).max(p2);
            let r = extents.dot(&utils::abs(&l));
            if min > r || max < -r {
                return false;
            }
        }
    }
    true
}

/// Triangle-vs-oriented-box test
pub fn triangle_obb_overlap(tri: &Triangle, obb: &Obb) -> bool {
    let local = Triangle::new(obb.to_local(&tri.v0), obb.to_local(&tri.v1), obb.to_local(&tri.v2));
    triangle_box_overlap_local(&local, &obb.extents)
}

/// A query volume that can be tested against broad-phase boxes
///
/// `contains_box` may be conservative (return `false` when unsure); it
/// only enables whole-subtree reporting.
pub trait BoxVolume {
    /// Whether the volume touches the box
    fn overlaps_box(&self, center: &Vec3, extents: &Vec3) -> bool;

    /// Whether the box lies entirely inside the volume
    fn contains_box(&self, center: &Vec3, extents: &Vec3) -> bool;

    /// Bounds of the volume
    fn bounds(&self) -> Aabb;
}

impl BoxVolume for Aabb {
    fn overlaps_box(&self, center: &Vec3, extents: &Vec3) -> bool {
        self.intersects(&Aabb::from_center_extents(*center, *extents))
    }

    fn contains_box(&self, center: &Vec3, extents: &Vec3) -> bool {
        self.contains(&Aabb::from_center_extents(*center, *extents))
    }

    fn bounds(&self) -> Aabb {
        *self
    }
}

impl BoxVolume for Sphere {
    fn overlaps_box(&self, center: &Vec3, extents: &Vec3) -> bool {
        let aabb = Aabb::from_center_extents(*center, *extents);
        point_aabb_sq(&self.center, &aabb).0 <= self.radius * self.radius
    }

    fn contains_box(&self, center: &Vec3, extents: &Vec3) -> bool {
        // Farthest corner from the sphere center
        let far = utils::abs(&(center - self.center)) + extents;
        far.magnitude_squared() <= self.radius * self.radius
    }

    fn bounds(&self) -> Aabb {
        self.aabb()
    }
}

impl BoxVolume for Obb {
    fn overlaps_box(&self, center: &Vec3, extents: &Vec3) -> bool {
        obb_obb_overlap(&Obb::new(*center, *extents, Mat3::identity()), self)
    }

    fn contains_box(&self, _center: &Vec3, _extents: &Vec3) -> bool {
        false
    }

    fn bounds(&self) -> Aabb {
        self.aabb()
    }
}

impl BoxVolume for Capsule {
    fn overlaps_box(&self, center: &Vec3, extents: &Vec3) -> bool {
        let aabb = Aabb::from_center_extents(*center, *extents);
        // Cheap reject on inflated bounds first
        if !self.aabb().intersects(&aabb) {
            return false;
        }
        segment_aabb_sq(&self.p0, &self.p1, &aabb) <= self.radius * self.radius
    }

    fn contains_box(&self, center: &Vec3, extents: &Vec3) -> bool {
        let r_sq = self.radius * self.radius;
        (0..8).all(|corner| {
            let sign = Vec3::new(
                if corner & 1 == 0 { -1.0 } else { 1.0 },
                if corner & 2 == 0 { -1.0 } else { 1.0 },
                if corner & 4 == 0 { -1.0 } else { 1.0 },
            );
            let p = center + extents.component_mul(&sign);
            point_segment_sq(&p, &self.p0, &self.p1).0 <= r_sq
        })
    }

    fn bounds(&self) -> Aabb {
        self.aabb()
    }
}
