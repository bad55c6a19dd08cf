//! Camera with a double-precision world position.
//!
//! Rendering happens relative to the camera: the render origin is the camera
//! position, so the view matrix only carries the rotation and everything else
//! is translated by `-world_position` before being cast to f32.

use glam::{DMat4, DQuat, DVec3, Mat4};

/// A camera placed in planet-scale world space.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Position in world space.
    pub world_position: DVec3,
    /// Rotation as a unit quaternion.
    pub rotation: DQuat,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width / height.
    pub aspect_ratio: f32,
    /// Near clip plane distance (always positive).
    pub near: f64,
    /// Far clip plane distance (always positive, > near).
    pub far: f64,
}

impl Camera {
    /// Camera at `world_position` looking down -Z.
    pub fn at(world_position: DVec3) -> Self {
        Self {
            world_position,
            ..Self::default()
        }
    }

    /// Offset of `point` from the render origin.
    pub fn relative(&self, point: DVec3) -> DVec3 {
        point - self.world_position
    }

    /// View matrix in camera-relative space (rotation only).
    pub fn view_matrix(&self) -> Mat4 {
        DMat4::from_quat(self.rotation.inverse()).as_mat4()
    }

    /// Perspective projection with reverse-Z.
    pub fn projection_matrix(&self) -> Mat4 {
        // Reverse-Z: far passed as near and near as far.
        Mat4::perspective_rh(
            self.fov_y,
            self.aspect_ratio,
            self.far as f32,
            self.near as f32,
        )
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> DVec3 {
        self.rotation * DVec3::NEG_Z
    }

    /// Update the aspect ratio.
    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.aspect_ratio = width / height;
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            world_position: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 1.0e7,
        }
    }
}
