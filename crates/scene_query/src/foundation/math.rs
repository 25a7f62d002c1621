//! Math utilities and types
//!
//! Provides the vector, matrix and rigid pose types shared by the
//! collision kernels, the pruners and the query layer.

pub use nalgebra::{
    Vector3,
    Matrix3,
    Quaternion,
    Unit,
};

use serde::{Deserialize, Serialize};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Rigid transform: rotation followed by translation
///
/// Poses never carry scale; shape scale is baked into the geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position in world space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
        }
    }
}

impl Pose {
    /// Create a new identity pose
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a pose with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a pose with position and rotation
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Rotation as a 3x3 matrix (columns are the local axes in world space)
    pub fn rotation_matrix(&self) -> Mat3 {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Apply this pose to a point
    pub fn transform_point(&self, point: &Vec3) -> Vec3 {
        self.rotation * point + self.position
    }

    /// Apply only the rotation of this pose to a vector
    pub fn transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.rotation * vector
    }

    /// Bring a world-space point into this pose's local frame
    pub fn inverse_transform_point(&self, point: &Vec3) -> Vec3 {
        self.rotation.inverse_transform_vector(&(point - self.position))
    }

    /// Bring a world-space vector into this pose's local frame
    pub fn inverse_transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.rotation.inverse_transform_vector(vector)
    }

    /// Combine this pose with another (`self * other`)
    pub fn combine(&self, other: &Pose) -> Pose {
        Pose {
            position: self.position + self.rotation * other.position,
            rotation: self.rotation * other.rotation,
        }
    }

    /// Get the inverse pose
    pub fn inverse(&self) -> Pose {
        let inv_rotation = self.rotation.inverse();
        Pose {
            position: inv_rotation * (-self.position),
            rotation: inv_rotation,
        }
    }
}

/// Math constants
pub mod constants {
    /// Uniform tolerance for determinant and distance rejects
    pub const EPSILON: f32 = 1.0e-6;

    /// Largest finite value, used for unbounded rays
    pub const MAX: f32 = f32::MAX;

    /// Tolerance on the squared length of a unit direction
    pub const UNIT_TOLERANCE: f32 = 1.0e-4;
}

/// Math utility functions
pub mod utils {
    use super::*;

    /// Component-wise absolute value
    pub fn abs(v: &Vec3) -> Vec3 {
        v.map(f32::abs)
    }

    /// Largest component of a vector
    pub fn max_component(v: &Vec3) -> f32 {
        v.x.max(v.y).max(v.z)
    }

    /// Whether a direction is unit length within [`constants::UNIT_TOLERANCE`]
    pub fn is_unit(v: &Vec3) -> bool {
        (v.magnitude_squared() - 1.0).abs() < constants::UNIT_TOLERANCE
    }

    /// Build an orthonormal basis whose first column is `dir`
    ///
    /// `dir` must be unit length.
    pub fn basis_from_direction(dir: &Vec3) -> Mat3 {
        let helper = if dir.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
        let y = dir.cross(&helper).normalize();
        let z = dir.cross(&y);
        Mat3::from_columns(&[*dir, y, z])
    }

    /// Rotation quaternion from an orthonormal basis
    pub fn quat_from_basis(basis: &Mat3) -> Quat {
        Quat::from_rotation_matrix(&nalgebra::Rotation3::from_matrix_unchecked(*basis))
    }
}
