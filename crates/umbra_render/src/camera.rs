//! Camera - view and projection source for a frame
//!
//! Projections use GL clip conventions (right handed, depth in `[-1, 1]`).

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Projection parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub aspect: f32,
    pub near_plane: f32,
    pub far_plane: f32,
    pub orthographic: bool,
    /// Orthographic view plane as `[x, y, width, height]`
    pub view_rect: [f32; 4],
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov: 45.0,
            aspect: 1.33,
            near_plane: 0.1,
            far_plane: 100.0,
            orthographic: false,
            view_rect: [0.0, 0.0, 1.0, 1.0],
        }
    }
}

/// Positioned camera
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    settings: CameraSettings,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            settings: CameraSettings::default(),
        }
    }
}

impl Camera {
    /// Perspective camera for a target of `width` x `height`
    pub fn perspective(fov: f32, width: f32, height: f32, near_plane: f32, far_plane: f32) -> Self {
        let mut camera = Self::default();
        camera.settings.fov = fov;
        camera.settings.near_plane = near_plane;
        camera.settings.far_plane = far_plane;
        camera.set_aspect(width, height);
        camera
    }

    /// Orthographic camera over `view_rect`
    pub fn orthographic(view_rect: [f32; 4], near_plane: f32, far_plane: f32) -> Self {
        let mut camera = Self::default();
        camera.settings.orthographic = true;
        camera.settings.view_rect = view_rect;
        camera.settings.near_plane = near_plane;
        camera.settings.far_plane = far_plane;
        camera
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut CameraSettings {
        &mut self.settings
    }

    pub fn is_orthographic(&self) -> bool {
        self.settings.orthographic
    }

    /// Point the camera at `target`
    pub fn look_at(&mut self, target: Vec3) {
        let dir = target - self.position;
        if dir.length_squared() > f32::EPSILON {
            self.forward = dir.normalize();
        }
    }

    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.settings.aspect = width / height;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward.normalize_or_zero(), self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let s = &self.settings;
        if s.orthographic {
            let [x, y, w, h] = s.view_rect;
            // y grows downward on the view plane
            return Mat4::orthographic_rh_gl(x, x + w, y + h, y, s.near_plane, s.far_plane);
        }
        Mat4::perspective_rh_gl(s.fov.to_radians(), s.aspect, s.near_plane, s.far_plane)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Track a new target size
    pub fn resize(&mut self, width: f32, height: f32) {
        if self.settings.orthographic {
            self.settings.view_rect = [0.0, 0.0, width, height];
        }
        self.set_aspect(width, height);
    }
}
