//! Object transforms for scene nodes

use crate::point::*;
use nalgebra::{Isometry3, Matrix4, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// Translation, rotation and scale of a scene node, composed as T * R * S.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeTransform {
    pub translation: Vector3f,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3f,
}

impl NodeTransform {
    /// Create an identity transformation
    pub fn identity() -> Self {
        Self {
            translation: Vector3f::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3f::new(1.0, 1.0, 1.0),
        }
    }

    /// Create a pure translation
    pub fn from_translation(translation: Vector3f) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Move the node by `delta` in world space
    pub fn translate_by(&mut self, delta: Vector3f) {
        self.translation += delta;
    }

    /// Rotate the node by `rotation` around its own origin
    pub fn rotate_by(&mut self, rotation: UnitQuaternion<f32>) {
        self.rotation = rotation * self.rotation;
    }

    /// Multiply the current scale component-wise
    pub fn scale_by(&mut self, factor: Vector3f) {
        self.scale.component_mul_assign(&factor);
    }

    /// Homogeneous matrix for this transform
    pub fn to_matrix(&self) -> Matrix4<f32> {
        let isometry = Isometry3::from_parts(Translation3::from(self.translation), self.rotation);
        isometry.to_homogeneous() * Matrix4::new_nonuniform_scaling(&self.scale)
    }

    /// Apply the transformation to a point
    pub fn transform_point(&self, point: &Point3f) -> Point3f {
        let scaled = Point3f::from(point.coords.component_mul(&self.scale));
        self.rotation * scaled + self.translation
    }

    /// Check if this is approximately the identity transformation
    pub fn is_identity(&self, epsilon: f32) -> bool {
        (self.to_matrix() - Matrix4::identity()).norm() < epsilon
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::identity()
    }
}
