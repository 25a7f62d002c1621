//! Linear sweeps of query volumes against shape geometry
//!
//! Rounded volumes (spheres and capsules) use conservative advancement on
//! the distance between their inner cores and the target. Boxes against
//! boxes and triangles use a continuous separating-axis test, which is
//! exact for pure translation. A box swept against a rounded shape is
//! solved the other way round: the shape's core moves backwards against
//! the stationary box.

use crate::foundation::math::{Pose, Vec3};
use super::distance::{point_obb_sq, point_segment_sq, point_triangle_sq, segment_obb_sq, segment_segment_sq, segment_triangle_sq};
use super::mesh::TriangleMesh;
use super::overlap::QueryVolume;
use super::primitives::{Capsule, Obb, Triangle};
use super::shape::Geometry;

/// Gap below which conservative advancement reports contact
const CONTACT_TOLERANCE: f32 = 1.0e-4;

/// Upper bound on conservative advancement steps
const MAX_ADVANCE_STEPS: usize = 64;

/// Axes shorter than this are skipped by the separating-axis sweep
const DEGENERATE_AXIS_SQ: f32 = 1.0e-10;

/// Options for sweeps against meshes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOptions {
    /// Report triangles whose front face points along the sweep too
    pub double_sided: bool,
}

/// First contact of a swept volume with a shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepContact {
    /// Travel distance at first contact
    pub distance: f32,
    /// World-space contact point
    pub position: Vec3,
    /// World-space contact normal, pointing from the shape toward the volume
    pub normal: Vec3,
    /// Triangle index for mesh contacts
    pub face_index: Option<u32>,
    /// The volume already touched the shape before moving
    pub initial_overlap: bool,
}

impl SweepContact {
    fn initial(position: Vec3, dir: &Vec3) -> Self {
        Self {
            distance: 0.0,
            position,
            normal: -dir,
            face_index: None,
            initial_overlap: true,
        }
    }
}

/// Inner skeleton of a rounded shape
#[derive(Debug, Clone, Copy)]
enum Core {
    Point(Vec3),
    Segment(Vec3, Vec3),
}

impl Core {
    fn translated(self, offset: &Vec3) -> Self {
        match self {
            Core::Point(p) => Core::Point(p + offset),
            Core::Segment(a, b) => Core::Segment(a + offset, b + offset),
        }
    }
}

/// Convex target of conservative advancement
#[derive(Debug, Clone, Copy)]
enum Target {
    Core(Core),
    Box(Obb),
    Triangle(Triangle),
}

/// Squared distance between a core and a target with the closest points
fn closest_points(core: Core, target: &Target) -> (f32, Vec3, Vec3) {
    match (core, target) {
        (Core::Point(p), Target::Core(Core::Point(q))) => ((p - q).magnitude_squared(), p, *q),
        (Core::Point(p), Target::Core(Core::Segment(a, b))) => {
            let (d, t) = point_segment_sq(&p, a, b);
            (d, p, a + (b - a) * t)
        }
        (Core::Segment(a, b), Target::Core(Core::Point(q))) => {
            let (d, t) = point_segment_sq(q, &a, &b);
            (d, a + (b - a) * t, *q)
        }
        (Core::Segment(a, b), Target::Core(Core::Segment(c, e))) => {
            let (d, s, t) = segment_segment_sq(&a, &b, c, e);
            (d, a + (b - a) * s, c + (e - c) * t)
        }
        (Core::Point(p), Target::Box(obb)) => {
            let (d, q) = point_obb_sq(&p, obb);
            (d, p, q)
        }
        (Core::Segment(a, b), Target::Box(obb)) => {
            let (d, t, q) = segment_obb_sq(&a, &b, obb);
            (d, a + (b - a) * t, q)
        }
        (Core::Point(p), Target::Triangle(tri)) => {
            let (d, q) = point_triangle_sq(&p, tri);
            (d, p, q)
        }
        (Core::Segment(a, b), Target::Triangle(tri)) => segment_triangle_sq(&a, &b, tri),
    }
}

/// Conservative advancement of a rounded core toward a convex target
///
/// `radius` is the sum of both roundings; the reported position sits on
/// the target's rounded surface.
fn advance(core: Core, radius: f32, target: &Target, target_radius: f32, dir: &Vec3, max_dist: f32) -> Option<SweepContact> {
    let mut t = 0.0f32;
    for _ in 0..MAX_ADVANCE_STEPS {
        let (d_sq, p, q) = closest_points(core.translated(&(dir * t)), target);
        let delta = p - q;
        let gap = d_sq.sqrt() - radius;

        if gap <= CONTACT_TOLERANCE {
            let len = delta.magnitude();
            let normal = if len > CONTACT_TOLERANCE { delta / len } else { -dir };
            if t == 0.0 && gap < 0.0 {
                return Some(SweepContact::initial(q + normal * target_radius, dir));
            }
            return Some(SweepContact {
                distance: t,
                position: q + normal * target_radius,
                normal,
                face_index: None,
                initial_overlap: false,
            });
        }

        // Distance between convex sets is convex in the translation
        if delta.dot(dir) >= 0.0 {
            return None;
        }
        t += gap;
        if t > max_dist {
            return None;
        }
    }
    None
}

/// Projection of a convex set onto an axis
#[derive(Debug, Clone, Copy)]
struct Interval {
    center: f32,
    radius: f32,
}

fn project_obb(obb: &Obb, axis: &Vec3) -> Interval {
    Interval {
        center: axis.dot(&obb.center),
        radius: (0..3).map(|i| obb.extents[i] * axis.dot(&obb.axis(i)).abs()).sum(),
    }
}

fn project_triangle(tri: &Triangle, axis: &Vec3) -> Interval {
    let [a, b, c] = tri.vertices().map(|v| axis.dot(&v));
    let lo = a.min(b).min(c);
    let hi = a.max(b).max(c);
    Interval { center: (lo + hi) * 0.5, radius: (hi - lo) * 0.5 }
}

/// Continuous separating-axis test for a moving convex set
///
/// Returns the entry time, the normal of the last axis to close and
/// whether every axis already overlapped at the start.
fn sat_sweep(
    axes: &[Vec3],
    moving: impl Fn(&Vec3) -> Interval,
    fixed: impl Fn(&Vec3) -> Interval,
    dir: &Vec3,
    max_dist: f32,
) -> Option<(f32, Vec3, bool)> {
    let mut enter = 0.0f32;
    let mut exit = max_dist;
    let mut normal = -dir;
    let mut separated = false;

    for raw in axes {
        let len_sq = raw.magnitude_squared();
        if len_sq < DEGENERATE_AXIS_SQ {
            continue;
        }
        let axis = raw / len_sq.sqrt();
        let m = moving(&axis);
        let f = fixed(&axis);
        let offset = m.center - f.center;
        let reach = m.radius + f.radius;
        let speed = axis.dot(dir);

        let (t0, t1) = if offset.abs() <= reach {
            let t1 = if speed > 0.0 {
                (reach - offset) / speed
            } else if speed < 0.0 {
                (-reach - offset) / speed
            } else {
                f32::INFINITY
            };
            (0.0, t1)
        } else if offset > reach {
            if speed >= 0.0 {
                return None;
            }
            ((offset - reach) / -speed, (offset + reach) / -speed)
        } else {
            if speed <= 0.0 {
                return None;
            }
            ((-reach - offset) / speed, (reach - offset) / speed)
        };

        if t0 > 0.0 {
            separated = true;
        }
        if t0 > enter {
            enter = t0;
            normal = if offset > 0.0 { axis } else { -axis };
        }
        exit = exit.min(t1);
        if enter > exit {
            return None;
        }
    }
    Some((enter, normal, !separated))
}

fn sweep_box_box(moving: &Obb, dir: &Vec3, max_dist: f32, fixed: &Obb) -> Option<SweepContact> {
    let mut axes = Vec::with_capacity(15);
    for i in 0..3 {
        axes.push(moving.axis(i));
        axes.push(fixed.axis(i));
    }
    for i in 0..3 {
        for j in 0..3 {
            axes.push(moving.axis(i).cross(&fixed.axis(j)));
        }
    }
    let (t, normal, initial) = sat_sweep(&axes, |a| project_obb(moving, a), |a| project_obb(fixed, a), dir, max_dist)?;
    let position = point_obb_sq(&(moving.center + dir * t), fixed).1;
    if initial {
        return Some(SweepContact::initial(position, dir));
    }
    Some(SweepContact { distance: t, position, normal, face_index: None, initial_overlap: false })
}

fn sweep_box_triangle(moving: &Obb, dir: &Vec3, max_dist: f32, tri: &Triangle) -> Option<SweepContact> {
    let edges = [tri.v1 - tri.v0, tri.v2 - tri.v1, tri.v0 - tri.v2];
    let mut axes = Vec::with_capacity(13);
    axes.push(edges[0].cross(&edges[1]));
    for i in 0..3 {
        let box_axis = moving.axis(i);
        axes.push(box_axis);
        for edge in &edges {
            axes.push(box_axis.cross(edge));
        }
    }
    let (t, normal, initial) = sat_sweep(&axes, |a| project_obb(moving, a), |a| project_triangle(tri, a), dir, max_dist)?;
    let position = tri.closest_point(&(moving.center + dir * t));
    if initial {
        return Some(SweepContact::initial(position, dir));
    }
    Some(SweepContact { distance: t, position, normal, face_index: None, initial_overlap: false })
}

/// Rounded core and radius of a sphere or capsule volume
fn volume_core(volume: &QueryVolume) -> Option<(Core, f32)> {
    match volume {
        QueryVolume::Sphere(sphere) => Some((Core::Point(sphere.center), sphere.radius)),
        QueryVolume::Capsule(capsule) => Some((Core::Segment(capsule.p0, capsule.p1), capsule.radius)),
        QueryVolume::Box(_) => None,
    }
}

/// Sweep a local-space volume against one triangle
fn sweep_triangle(volume: &QueryVolume, dir: &Vec3, max_dist: f32, tri: &Triangle) -> Option<SweepContact> {
    match volume {
        QueryVolume::Box(obb) => sweep_box_triangle(obb, dir, max_dist, tri),
        _ => {
            let (core, radius) = volume_core(volume)?;
            advance(core, radius, &Target::Triangle(*tri), 0.0, dir, max_dist)
        }
    }
}

fn sweep_mesh(
    volume: &QueryVolume,
    dir: &Vec3,
    max_dist: f32,
    mesh: &TriangleMesh,
    pose: &Pose,
    options: &SweepOptions,
) -> Option<SweepContact> {
    let local = volume.to_local(pose);
    let local_dir = pose.inverse_transform_vector(dir);
    let swept = local.aabb().union(&local.translated(&(local_dir * max_dist)).aabb());

    let mut candidates = Vec::new();
    mesh.tree().overlap(&swept, &mut |prim| {
        candidates.push(prim);
        true
    });

    let mut best: Option<SweepContact> = None;
    for prim in candidates {
        let tri = mesh.local_triangle(prim as usize);
        if !options.double_sided && tri.normal().dot(&local_dir) > 0.0 {
            continue;
        }
        let limit = best.map_or(max_dist, |b| b.distance);
        let Some(mut contact) = sweep_triangle(&local, &local_dir, limit, &tri) else { continue };
        if best.map_or(true, |b| contact.distance < b.distance) {
            contact.face_index = Some(prim);
            best = Some(contact);
            if contact.initial_overlap {
                break;
            }
        }
    }

    best.map(|contact| SweepContact {
        position: pose.transform_point(&contact.position),
        normal: if contact.initial_overlap { -dir } else { pose.transform_vector(&contact.normal) },
        ..contact
    })
}

/// Sweep `volume` along unit `dir` for up to `max_dist` against `geometry` at `pose`
///
/// Returns the first contact, or `None` if the volume never touches the
/// shape along the way. A volume that starts touching the shape reports
/// distance 0 with [`SweepContact::initial_overlap`] set.
pub fn sweep_geometry(
    volume: &QueryVolume,
    dir: &Vec3,
    max_dist: f32,
    geometry: &Geometry,
    pose: &Pose,
    options: &SweepOptions,
) -> Option<SweepContact> {
    let (target, target_radius) = match geometry {
        Geometry::TriangleMesh(mesh) => return sweep_mesh(volume, dir, max_dist, mesh, pose, options),
        Geometry::Box { half_extents } => {
            let obb = Obb::from_pose(pose, *half_extents);
            if let QueryVolume::Box(moving) = volume {
                return sweep_box_box(moving, dir, max_dist, &obb);
            }
            (Target::Box(obb), 0.0)
        }
        Geometry::Sphere { radius } => (Target::Core(Core::Point(pose.position)), *radius),
        Geometry::Capsule { radius, half_height } => {
            let capsule = Capsule::from_pose(pose, *half_height, *radius);
            (Target::Core(Core::Segment(capsule.p0, capsule.p1)), *radius)
        }
    };

    match volume {
        QueryVolume::Box(moving) => {
            let Target::Core(core) = target else { return None };
            // The shape's core travels backwards against the still box
            let back = -dir;
            let contact = advance(core, target_radius, &Target::Box(*moving), 0.0, &back, max_dist)?;
            if contact.initial_overlap {
                return Some(SweepContact::initial(contact.position, dir));
            }
            Some(SweepContact {
                position: contact.position + dir * contact.distance,
                normal: -contact.normal,
                ..contact
            })
        }
        _ => {
            let (core, radius) = volume_core(volume)?;
            advance(core, radius + target_radius, &target, target_radius, dir, max_dist)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat3, Quat};
    use crate::physics::collision::mesh::tests::quad;
    use crate::physics::collision::primitives::Sphere;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_4;
    use std::sync::Arc;

    fn at(x: f32, y: f32, z: f32) -> Pose {
        Pose::from_position(Vec3::new(x, y, z))
    }

    fn sweep(volume: &QueryVolume, dir: Vec3, max_dist: f32, geometry: &Geometry, pose: &Pose) -> Option<SweepContact> {
        sweep_geometry(volume, &dir, max_dist, geometry, pose, &SweepOptions::default())
    }

    fn unit_box(center: Vec3) -> QueryVolume {
        QueryVolume::Box(Obb::new(center, Vec3::repeat(1.0), Mat3::identity()))
    }

    #[test]
    fn test_sphere_head_on() {
        let ball = QueryVolume::Sphere(Sphere::new(Vec3::zeros(), 1.0));
        let hit = sweep(&ball, Vec3::x(), 100.0, &Geometry::sphere(1.0), &at(10.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(hit.distance, 8.0, epsilon = 1e-3);
        assert_relative_eq!(hit.normal, -Vec3::x(), epsilon = 1e-3);
        assert_relative_eq!(hit.position, Vec3::new(9.0, 0.0, 0.0), epsilon = 1e-3);
        assert!(!hit.initial_overlap);

        assert!(sweep(&ball, Vec3::x(), 5.0, &Geometry::sphere(1.0), &at(10.0, 0.0, 0.0)).is_none());
        assert!(sweep(&ball, Vec3::x(), 100.0, &Geometry::sphere(1.0), &at(10.0, 3.0, 0.0)).is_none());
        assert!(sweep(&ball, -Vec3::x(), 100.0, &Geometry::sphere(1.0), &at(10.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_initial_overlap_reports_zero() {
        let ball = QueryVolume::Sphere(Sphere::new(Vec3::zeros(), 1.0));
        let hit = sweep(&ball, Vec3::x(), 10.0, &Geometry::cuboid(Vec3::repeat(1.0)), &at(1.5, 0.0, 0.0)).unwrap();
        assert!(hit.initial_overlap);
        assert_eq!(hit.distance, 0.0);
        assert_relative_eq!(hit.normal, -Vec3::x());

        let hit = sweep(&unit_box(Vec3::zeros()), Vec3::y(), 10.0, &Geometry::cuboid(Vec3::repeat(1.0)), &at(1.5, 0.0, 0.0)).unwrap();
        assert!(hit.initial_overlap);
    }

    #[test]
    fn test_capsule_against_box() {
        let capsule = QueryVolume::Capsule(Capsule::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0), 0.5));
        let hit = sweep(&capsule, Vec3::x(), 100.0, &Geometry::cuboid(Vec3::repeat(1.0)), &at(5.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(hit.distance, 3.5, epsilon = 1e-3);
        assert_relative_eq!(hit.normal, -Vec3::x(), epsilon = 1e-2);
    }

    #[test]
    fn test_box_against_box() {
        let volume = unit_box(Vec3::zeros());
        let hit = sweep(&volume, Vec3::x(), 100.0, &Geometry::cuboid(Vec3::repeat(1.0)), &at(5.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(hit.distance, 3.0, epsilon = 1e-5);
        assert_relative_eq!(hit.normal, -Vec3::x(), epsilon = 1e-5);

        // A corner of the turned box points back at the sweep
        let turned = Pose::new(Vec3::new(5.0, 0.0, 0.0), Quat::from_axis_angle(&Vec3::z_axis(), FRAC_PI_4));
        let hit = sweep(&volume, Vec3::x(), 100.0, &Geometry::cuboid(Vec3::repeat(1.0)), &turned).unwrap();
        assert_relative_eq!(hit.distance, 4.0 - 2.0f32.sqrt(), epsilon = 1e-4);

        assert!(sweep(&volume, Vec3::x(), 100.0, &Geometry::cuboid(Vec3::repeat(1.0)), &at(5.0, 2.5, 0.0)).is_none());
    }

    #[test]
    fn test_box_against_sphere() {
        let volume = unit_box(Vec3::zeros());
        let hit = sweep(&volume, Vec3::x(), 100.0, &Geometry::sphere(1.0), &at(5.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(hit.distance, 3.0, epsilon = 1e-3);
        assert_relative_eq!(hit.normal, -Vec3::x(), epsilon = 1e-3);
        assert_relative_eq!(hit.position, Vec3::new(4.0, 0.0, 0.0), epsilon = 1e-3);

        let hit = sweep(&volume, Vec3::x(), 100.0, &Geometry::capsule(0.5, 2.0), &at(5.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(hit.distance, 1.5, epsilon = 1e-3);
    }

    #[test]
    fn test_mesh_sweeps_respect_faces() {
        let mesh = Geometry::mesh(Arc::new(quad()));
        let pose = Pose::identity();
        let ball = QueryVolume::Sphere(Sphere::new(Vec3::new(0.2, 3.0, 0.3), 0.5));
        let hit = sweep(&ball, -Vec3::y(), 10.0, &mesh, &pose).unwrap();
        assert_relative_eq!(hit.distance, 2.5, epsilon = 1e-3);
        assert_relative_eq!(hit.normal, Vec3::y(), epsilon = 1e-2);
        assert!(hit.face_index.is_some());

        // Approaching the back face
        let below = QueryVolume::Sphere(Sphere::new(Vec3::new(0.2, -3.0, 0.3), 0.5));
        assert!(sweep(&below, Vec3::y(), 10.0, &mesh, &pose).is_none());
        let options = SweepOptions { double_sided: true };
        let hit = sweep_geometry(&below, &Vec3::y(), 10.0, &mesh, &pose, &options).unwrap();
        assert_relative_eq!(hit.distance, 2.5, epsilon = 1e-3);

        let slab = QueryVolume::Box(Obb::new(Vec3::new(0.0, 3.0, 0.0), Vec3::repeat(0.5), Mat3::identity()));
        let hit = sweep(&slab, -Vec3::y(), 10.0, &mesh, &at(0.0, 0.5, 0.0)).unwrap();
        assert_relative_eq!(hit.distance, 2.0, epsilon = 1e-5);
        assert_relative_eq!(hit.normal, Vec3::y(), epsilon = 1e-5);
    }
}
