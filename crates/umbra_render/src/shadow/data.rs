//! Per-light shadow allocation results

use glam::{Mat4, Vec4};
use serde::{Deserialize, Serialize};

use crate::light::{Light, ShadowType};

/// Light-space matrix slots per light; only the first is populated
pub const MAX_CASCADES: usize = 4;

/// Shadow state for one light, rebuilt every frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadowLightData {
    /// Index into the 2D or cube pool, -1 when the light has no map
    pub shadow_map_index: i32,
    pub shadow_type: ShadowType,
    pub strength: f32,
    pub bias: f32,
    pub normal_bias: f32,
    pub cascade_count: u32,
    pub cascade_splits: Vec4,
    pub light_matrices: [Mat4; MAX_CASCADES],
}

impl Default for ShadowLightData {
    fn default() -> Self {
        Self {
            shadow_map_index: -1,
            shadow_type: ShadowType::Standard,
            strength: 1.0,
            bias: 0.0025,
            normal_bias: 0.005,
            cascade_count: 0,
            cascade_splits: Vec4::ZERO,
            light_matrices: [Mat4::IDENTITY; MAX_CASCADES],
        }
    }
}

impl ShadowLightData {
    /// Unallocated data carrying the light's own shadow settings
    pub fn for_light(light: &Light) -> Self {
        Self {
            shadow_type: light.shadow_type,
            strength: light.shadow_strength,
            bias: light.shadow_bias,
            normal_bias: light.shadow_normal_bias,
            ..Default::default()
        }
    }

    /// Record a single-cascade allocation
    pub fn allocate(&mut self, map_index: usize, matrix: Mat4, split: f32) {
        self.shadow_map_index = map_index as i32;
        self.cascade_count = 1;
        self.cascade_splits = Vec4::splat(split);
        self.light_matrices[0] = matrix;
    }

    pub fn has_shadow_map(&self) -> bool {
        self.shadow_map_index >= 0
    }

    /// Every matrix, bias and the strength are finite
    pub fn is_finite(&self) -> bool {
        self.strength.is_finite()
            && self.bias.is_finite()
            && self.normal_bias.is_finite()
            && self.light_matrices.iter().all(Mat4::is_finite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unallocated() {
        let data = ShadowLightData::default();
        assert_eq!(data.shadow_map_index, -1);
        assert!(!data.has_shadow_map());
        assert!(data.is_finite());
    }

    #[test]
    fn test_allocate_single_cascade() {
        let mut data = ShadowLightData::for_light(&Light::default());
        data.allocate(2, Mat4::from_scale(glam::Vec3::splat(2.0)), 50.0);
        assert_eq!(data.shadow_map_index, 2);
        assert_eq!(data.cascade_count, 1);
        assert_eq!(data.cascade_splits, Vec4::splat(50.0));
        assert_eq!(data.light_matrices[1], Mat4::IDENTITY);
        assert_eq!(data.shadow_type, ShadowType::Smooth);
    }

    #[test]
    fn test_non_finite_bias() {
        let mut light = Light::default();
        light.shadow_normal_bias = f32::INFINITY;
        assert!(!ShadowLightData::for_light(&light).is_finite());
    }

    #[test]
    fn test_non_finite_strength() {
        let mut light = Light::default();
        light.shadow_strength = f32::NAN;
        assert!(!ShadowLightData::for_light(&light).is_finite());
    }
}
