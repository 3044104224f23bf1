//! Light-space projections
//!
//! All matrices are `projection * view` with GL clip conventions.

use glam::{Mat4, Vec3};

use crate::device::CubeFace;
use crate::light::{normalize_direction, Light, FALLBACK_DIRECTION};

/// Near plane of every shadow frustum
pub const SHADOW_NEAR_PLANE: f32 = 0.1;

/// Lower bound of the directional shadow half-extent
pub const MIN_DIRECTIONAL_RANGE: f32 = 10.0;

/// Upper bound of the camera-derived directional range
pub const MAX_DIRECTIONAL_DEFAULT_RANGE: f32 = 200.0;

/// Spot frustum FOV limits in degrees
pub const MIN_SPOT_FOV: f32 = 10.0;
pub const MAX_SPOT_FOV: f32 = 170.0;

const DEFAULT_SPOT_ANGLE: f32 = 45.0;
const DEFAULT_RANGE: f32 = 10.0;

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// +Y, or +Z when `direction` is close to vertical
fn up_for(direction: Vec3) -> Vec3 {
    if direction.dot(Vec3::Y).abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Half-extent and offset distance of a directional shadow frustum
pub fn directional_range(light: &Light, camera_far: f32) -> f32 {
    // f32::min ignores NaN
    let default_range = camera_far.min(MAX_DIRECTIONAL_DEFAULT_RANGE);
    light
        .shadow_distance()
        .unwrap_or(default_range)
        .max(MIN_DIRECTIONAL_RANGE)
}

/// Orthographic light-space matrix centered on the camera
pub fn directional_matrix(light: &Light, camera_position: Vec3, camera_far: f32) -> Mat4 {
    let range = directional_range(light, camera_far);
    let dir = normalize_direction(light.direction).unwrap_or(FALLBACK_DIRECTION);
    let eye = camera_position - dir * range;

    let view = Mat4::look_at_rh(eye, camera_position, up_for(dir));
    let proj = Mat4::orthographic_rh_gl(-range, range, -range, range, SHADOW_NEAR_PLANE, range * 2.0);
    proj * view
}

/// Far plane for spot and point shadows
pub fn local_far_plane(light: &Light) -> f32 {
    light
        .shadow_distance()
        .unwrap_or_else(|| finite_or(light.range, DEFAULT_RANGE))
        .max(1.0)
}

/// Full cone angle of the spot frustum, in degrees
pub fn spot_fov(light: &Light) -> f32 {
    (finite_or(light.spot_angle, DEFAULT_SPOT_ANGLE) * 2.0).clamp(MIN_SPOT_FOV, MAX_SPOT_FOV)
}

/// Perspective light-space matrix looking down the spot direction
pub fn spot_matrix(light: &Light) -> Mat4 {
    let proj = Mat4::perspective_rh_gl(
        spot_fov(light).to_radians(),
        1.0,
        SHADOW_NEAR_PLANE,
        local_far_plane(light),
    );
    let dir = normalize_direction(light.direction).unwrap_or(FALLBACK_DIRECTION);
    let view = Mat4::look_at_rh(light.position, light.position + dir, up_for(dir));
    proj * view
}

/// One 90 degree light-space matrix per cube face, in `CubeFace::ALL` order
pub fn point_face_matrices(position: Vec3, far_plane: f32) -> [Mat4; 6] {
    let proj = Mat4::perspective_rh_gl(90f32.to_radians(), 1.0, SHADOW_NEAR_PLANE, far_plane);
    CubeFace::ALL.map(|face| proj * Mat4::look_at_rh(position, position + face.direction(), face.up()))
}

/// `matrix`, or identity with an error log if it has non-finite entries
pub fn finite_or_identity(matrix: Mat4, light_index: usize, light: &Light) -> Mat4 {
    if matrix.is_finite() {
        return matrix;
    }
    log::error!(
        "light-space matrix is not finite, using identity: light={} type={:?} dir={:?} range={} shadow_range={} spot_angle={}",
        light_index,
        light.kind,
        light.direction,
        light.range,
        light.shadow_range,
        light.spot_angle
    );
    Mat4::IDENTITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn clip_depth(matrix: Mat4, point: Vec3) -> f32 {
        let clip = matrix * point.extend(1.0);
        clip.z / clip.w
    }

    #[test]
    fn test_directional_range() {
        let light = Light::directional(Vec3::NEG_Y).with_shadow_range(0.0);
        assert_eq!(directional_range(&light, 50.0), 50.0);
        assert_eq!(directional_range(&light, 1000.0), MAX_DIRECTIONAL_DEFAULT_RANGE);
        assert_eq!(directional_range(&light, 2.0), MIN_DIRECTIONAL_RANGE);

        let light = light.with_shadow_range(75.0);
        assert_eq!(directional_range(&light, 50.0), 75.0);
    }

    #[test]
    fn test_directional_centers_camera() {
        let light = Light::directional(Vec3::new(-1.0, -1.0, 0.0)).with_shadow_range(20.0);
        let camera = Vec3::new(3.0, 1.0, -2.0);
        let matrix = directional_matrix(&light, camera, 100.0);
        let clip = matrix * Vec4::new(camera.x, camera.y, camera.z, 1.0);
        assert!(clip.x.abs() < 1e-4);
        assert!(clip.y.abs() < 1e-4);
        // camera sits `range` in front of the eye, at the middle of [0.1, 2 * range]
        assert!(clip.z.abs() < 0.05);
    }

    #[test]
    fn test_vertical_directional_is_finite() {
        let light = Light::directional(Vec3::NEG_Y);
        assert!(directional_matrix(&light, Vec3::ZERO, 100.0).is_finite());
        let nan = Light {
            direction: Vec3::splat(f32::NAN),
            ..Light::directional(Vec3::NEG_Y)
        };
        assert!(directional_matrix(&nan, Vec3::ZERO, 100.0).is_finite());
    }

    #[test]
    fn test_spot_fov_clamped() {
        let mut light = Light::spot(Vec3::ZERO, Vec3::NEG_Z, 2.0);
        assert_eq!(spot_fov(&light), MIN_SPOT_FOV);
        light.spot_angle = 120.0;
        assert_eq!(spot_fov(&light), MAX_SPOT_FOV);
        light.spot_angle = 30.0;
        assert_eq!(spot_fov(&light), 60.0);
        light.spot_angle = f32::NAN;
        assert_eq!(spot_fov(&light), 90.0);
    }

    #[test]
    fn test_local_far_plane() {
        let light = Light::spot(Vec3::ZERO, Vec3::NEG_Z, 30.0).with_shadow_range(0.0).with_range(0.25);
        assert_eq!(local_far_plane(&light), 1.0);
        let light = light.with_range(30.0);
        assert_eq!(local_far_plane(&light), 30.0);
        let light = light.with_shadow_range(60.0);
        assert_eq!(local_far_plane(&light), 60.0);
    }

    #[test]
    fn test_spot_matrix_looks_down_direction() {
        let light = Light::spot(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 30.0).with_shadow_range(20.0);
        let matrix = spot_matrix(&light);
        let near = clip_depth(matrix, Vec3::new(0.0, 4.0, 0.0));
        let far = clip_depth(matrix, Vec3::new(0.0, -10.0, 0.0));
        assert!(near < far);
        assert!(far <= 1.0);
    }

    #[test]
    fn test_point_faces() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let matrices = point_face_matrices(position, 25.0);
        for (face, matrix) in CubeFace::ALL.iter().zip(matrices.iter()) {
            let ahead = position + face.direction() * 5.0;
            let clip = *matrix * ahead.extend(1.0);
            assert!(clip.w > 0.0, "{face:?} does not look down its axis");
            assert!((clip.x / clip.w).abs() < 1e-4);
            assert!((clip.y / clip.w).abs() < 1e-4);
        }
    }

    #[test]
    fn test_finite_or_identity() {
        let light = Light::default();
        let bad = Mat4::from_cols_array(&[f32::NAN; 16]);
        assert_eq!(finite_or_identity(bad, 0, &light), Mat4::IDENTITY);
        let good = Mat4::from_translation(Vec3::X);
        assert_eq!(finite_or_identity(good, 0, &light), good);
    }
}
