//! Closest-point and distance queries between convex primitives
//!
//! All functions return *squared* distances. Segment/box distances are
//! minimised with a golden-section search, which is exact up to float
//! noise because distance to a convex set is convex along a segment.

use crate::foundation::math::Vec3;
use super::bounds::Aabb;
use super::primitives::{Obb, Triangle};

const GOLDEN_ITERATIONS: usize = 48;

/// Squared distance from `p` to segment `a..b` and the segment parameter
pub fn point_segment_sq(p: &Vec3, a: &Vec3, b: &Vec3) -> (f32, f32) {
    let ab = b - a;
    let len_sq = ab.magnitude_squared();
    let t = if len_sq > 0.0 {
        ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    ((a + ab * t - p).magnitude_squared(), t)
}

/// Squared distance between segments `p0..p1` and `q0..q1`
///
/// Returns (distance², s, t) with the closest points at `p0 + s*(p1-p0)`
/// and `q0 + t*(q1-q0)`.
pub fn segment_segment_sq(p0: &Vec3, p1: &Vec3, q0: &Vec3, q1: &Vec3) -> (f32, f32, f32) {
    const EPS: f32 = 1.0e-12;
    let d1 = p1 - p0;
    let d2 = q1 - q0;
    let r = p0 - q0;
    let a = d1.magnitude_squared();
    let e = d2.magnitude_squared();
    let f = d2.dot(&r);

    let (s, t);
    if a <= EPS && e <= EPS {
        return ((p0 - q0).magnitude_squared(), 0.0, 0.0);
    }
    if a <= EPS {
        s = 0.0;
        t = (f / e).clamp(0.0, 1.0);
    } else {
        let c = d1.dot(&r);
        if e <= EPS {
            t = 0.0;
            s = (-c / a).clamp(0.0, 1.0);
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s_val = if denom > EPS {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t_val = (b * s_val + f) / e;
            if t_val < 0.0 {
                t_val = 0.0;
                s_val = (-c / a).clamp(0.0, 1.0);
            } else if t_val > 1.0 {
                t_val = 1.0;
                s_val = ((b - c) / a).clamp(0.0, 1.0);
            }
            s = s_val;
            t = t_val;
        }
    }
    let cp = p0 + d1 * s;
    let cq = q0 + d2 * t;
    ((cp - cq).magnitude_squared(), s, t)
}

/// Squared distance from `p` to an axis-aligned box and the closest point
pub fn point_aabb_sq(p: &Vec3, aabb: &Aabb) -> (f32, Vec3) {
    let closest = p.sup(&aabb.min).inf(&aabb.max);
    ((closest - p).magnitude_squared(), closest)
}

/// Squared distance from `p` to an oriented box and the closest point
pub fn point_obb_sq(p: &Vec3, obb: &Obb) -> (f32, Vec3) {
    let local = obb.to_local(p);
    let clamped = local.sup(&-obb.extents).inf(&obb.extents);
    let closest = obb.center + obb.rotation * clamped;
    ((closest - p).magnitude_squared(), closest)
}

/// Minimise a convex function of `t` over `[0, 1]`
pub fn golden_section_min(mut f: impl FnMut(f32) -> f32) -> (f32, f32) {
    const INV_PHI: f32 = 0.618_034;
    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    let mut x1 = hi - INV_PHI * (hi - lo);
    let mut x2 = lo + INV_PHI * (hi - lo);
    let mut f1 = f(x1);
    let mut f2 = f(x2);
    for _ in 0..GOLDEN_ITERATIONS {
        if f1 <= f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - INV_PHI * (hi - lo);
            f1 = f(x1);
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + INV_PHI * (hi - lo);
            f2 = f(x2);
        }
    }
    // End points are candidates too when the minimum sits on the boundary
    let mut best = if f1 <= f2 { (x1, f1) } else { (x2, f2) };
    for t in [0.0, 1.0] {
        let v = f(t);
        if v < best.1 {
            best = (t, v);
        }
    }
    best
}

/// Squared distance from segment `a..b` to an oriented box
///
/// Returns (distance², t, closest point on box).
pub fn segment_obb_sq(a: &Vec3, b: &Vec3, obb: &Obb) -> (f32, f32, Vec3) {
    let ab = b - a;
    let (t, d) = golden_section_min(|t| point_obb_sq(&(a + ab * t), obb).0);
    let (_, closest) = point_obb_sq(&(a + ab * t), obb);
    (d, t, closest)
}

/// Squared distance from segment `a..b` to an axis-aligned box
pub fn segment_aabb_sq(a: &Vec3, b: &Vec3, aabb: &Aabb) -> f32 {
    let ab = b - a;
    golden_section_min(|t| point_aabb_sq(&(a + ab * t), aabb).0).1
}

/// Squared distance from `p` to a triangle and the closest point
pub fn point_triangle_sq(p: &Vec3, tri: &Triangle) -> (f32, Vec3) {
    let closest = tri.closest_point(p);
    ((closest - p).magnitude_squared(), closest)
}

/// Squared distance between segment `a..b` and a triangle
///
/// Returns (distance², point on segment, point on triangle).
pub fn segment_triangle_sq(a: &Vec3, b: &Vec3, tri: &Triangle) -> (f32, Vec3, Vec3) {
    // A segment piercing the face is at distance zero
    let ab = b - a;
    let len = ab.magnitude();
    if len > 0.0 {
        let dir = ab / len;
        if let Some(hit) = tri.intersect_ray(a, &dir, 0.0) {
            if hit.distance <= len {
                let p = a + dir * hit.distance;
                return (0.0, p, p);
            }
        }
        // Starting exactly on the face is not reported by the ray test
    }

    let mut best = {
        let (d, q) = point_triangle_sq(a, tri);
        (d, *a, q)
    };
    let (d, q) = point_triangle_sq(b, tri);
    if d < best.0 {
        best = (d, *b, q);
    }
    let verts = tri.vertices();
    for i in 0..3 {
        let e0 = verts[i];
        let e1 = verts[(i + 1) % 3];
        let (d, s, t) = segment_segment_sq(a, b, &e0, &e1);
        if d < best.0 {
            best = (d, a + ab * s, e0 + (e1 - e0) * t);
        }
    }
    best
}
