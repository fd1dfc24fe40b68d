//! Camera and light placement.
//!
//! The camera is a look-at camera supplied from outside the core as a plain
//! transform. Only the view-projection matrix and the eye position reach the GPU.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Look-at perspective camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraConfig {
    /// Eye position in world space.
    pub position: Vec3,
    /// Look-at target.
    pub target: Vec3,
    /// Up vector. Defaults to Y-up.
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 2.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: 70.0,
            near: 0.01,
            far: 10.0,
        }
    }
}

impl CameraConfig {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Projection for the given aspect ratio. Degenerate ratios fall back to square.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
    }

    /// Compute the combined view-projection matrix.
    pub fn view_projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Compute the forward direction vector.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }
}

/// Single point light used by the capture and composite shaders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LightConfig {
    pub position: Vec3,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(5.0, 2.0, 2.0),
        }
    }
}
