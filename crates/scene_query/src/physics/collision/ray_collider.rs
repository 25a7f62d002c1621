//! Ray and segment queries against triangle meshes

use crate::foundation::math::Vec3;
use crate::spatial::pruner::StabStatus;
use super::mesh::TriangleMesh;

/// A triangle hit by a mesh ray query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionFace {
    /// Triangle index in the mesh
    pub face_id: u32,
    /// Distance along the ray
    pub distance: f32,
    /// Barycentric coordinate toward the second vertex
    pub u: f32,
    /// Barycentric coordinate toward the third vertex
    pub v: f32,
}

/// Configurable mesh raycaster
///
/// Queries run in mesh local space. With `closest_hit` only the nearest
/// face is reported; otherwise every face along the ray is, unordered.
#[derive(Debug, Clone, Copy)]
pub struct MeshRayCollider {
    culling: bool,
    closest_hit: bool,
    stop_at_first_contact: bool,
    max_dist: f32,
    geom_epsilon: f32,
}

impl Default for MeshRayCollider {
    fn default() -> Self {
        Self {
            culling: true,
            closest_hit: true,
            stop_at_first_contact: false,
            max_dist: f32::MAX,
            geom_epsilon: 0.0,
        }
    }
}

impl MeshRayCollider {
    /// Closest-hit, back-face culling raycaster with infinite range
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore triangles facing away from the ray
    pub fn with_culling(mut self, culling: bool) -> Self {
        self.culling = culling;
        self
    }

    /// Report only the nearest face
    pub fn with_closest_hit(mut self, closest_hit: bool) -> Self {
        self.closest_hit = closest_hit;
        self
    }

    /// Stop at the first face found, nearest or not
    pub fn with_stop_at_first_contact(mut self, stop: bool) -> Self {
        self.stop_at_first_contact = stop;
        self
    }

    /// Turn the ray into a segment of this length
    pub fn with_max_dist(mut self, max_dist: f32) -> Self {
        self.max_dist = max_dist;
        self
    }

    /// Relax the barycentric bounds to close seams
    pub fn with_geom_epsilon(mut self, geom_epsilon: f32) -> Self {
        self.geom_epsilon = geom_epsilon;
        self
    }

    /// Cast against `mesh`, appending hit faces to `faces`
    ///
    /// Returns `true` if at least one face was hit.
    pub fn collide(&self, origin: &Vec3, dir: &Vec3, mesh: &TriangleMesh, faces: &mut Vec<CollisionFace>) -> bool {
        let start = faces.len();
        let mut closest: Option<CollisionFace> = None;
        let mut max_dist = self.max_dist;

        mesh.tree().stab(origin, dir, &mut max_dist, &mut |prim, max_dist| {
            let triangle = mesh.local_triangle(prim as usize);
            let hit = if self.culling {
                triangle.intersect_ray_culling(origin, dir, self.geom_epsilon)
            } else {
                triangle.intersect_ray(origin, dir, self.geom_epsilon)
            };
            let Some(hit) = hit else { return StabStatus::Continue };
            if hit.distance > *max_dist {
                return StabStatus::Continue;
            }
            let face = CollisionFace { face_id: prim, distance: hit.distance, u: hit.u, v: hit.v };

            if self.stop_at_first_contact {
                closest = Some(face);
                return StabStatus::Stop;
            }
            if self.closest_hit {
                closest = Some(face);
                *max_dist = hit.distance;
                StabStatus::UpdateMaxDist
            } else {
                faces.push(face);
                StabStatus::Continue
            }
        });

        if let Some(face) = closest {
            faces.push(face);
        }
        faces.len() > start
    }
}
