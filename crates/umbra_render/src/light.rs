//! Scene lights and the per-frame light list

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Maximum number of lights packed into the light block
pub const MAX_LIGHTS: usize = 16;

/// Light kind; the discriminant is the value shaders see
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum LightType {
    #[default]
    Point = 0,
    Directional = 1,
    Spot = 2,
}

impl LightType {
    pub fn as_f32(self) -> f32 {
        self as u32 as f32
    }

    /// Uses a 2D shadow map (as opposed to a cubemap)
    pub fn uses_2d_shadow_map(self) -> bool {
        matches!(self, Self::Directional | Self::Spot)
    }
}

/// Shadow filtering quality; the discriminant is the value shaders see
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ShadowType {
    Hard = 0,
    Standard = 1,
    #[default]
    Smooth = 2,
}

impl ShadowType {
    pub fn as_f32(self) -> f32 {
        self as u32 as f32
    }
}

/// A dynamic light
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Light {
    #[serde(rename = "type")]
    pub kind: LightType,
    pub position: Vec3,
    /// Used by directional and spot lights
    pub direction: Vec3,
    pub color: Vec4,
    pub intensity: f32,
    /// Attenuation distance for point and spot lights
    pub range: f32,
    /// 1 = linear, 2 = quadratic, 3 = cubic
    pub falloff: f32,
    /// Spot half-angle in degrees
    pub spot_angle: f32,
    /// Shadow far plane; `<= 0` falls back to the light range
    pub shadow_range: f32,
    pub casts_shadows: bool,
    pub shadow_type: ShadowType,
    pub shadow_bias: f32,
    pub shadow_normal_bias: f32,
    pub shadow_strength: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightType::Point,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            color: Vec4::ONE,
            intensity: 1.0,
            range: 20.0,
            falloff: 2.0,
            spot_angle: 45.0,
            shadow_range: 200.0,
            casts_shadows: false,
            shadow_type: ShadowType::Smooth,
            shadow_bias: 0.001,
            shadow_normal_bias: 0.002,
            shadow_strength: 1.0,
        }
    }
}

impl Light {
    /// Shadow-casting point light
    pub fn point(position: Vec3) -> Self {
        Self {
            kind: LightType::Point,
            position,
            range: 10.0,
            falloff: 1.0,
            casts_shadows: true,
            ..Default::default()
        }
    }

    /// Shadow-casting directional light
    pub fn directional(direction: Vec3) -> Self {
        Self {
            kind: LightType::Directional,
            direction: direction.normalize_or_zero(),
            casts_shadows: true,
            ..Default::default()
        }
    }

    /// Shadow-casting spot light
    pub fn spot(position: Vec3, direction: Vec3, spot_angle: f32) -> Self {
        Self {
            kind: LightType::Spot,
            position,
            direction: direction.normalize_or_zero(),
            range: 10.0,
            falloff: 1.0,
            spot_angle,
            casts_shadows: true,
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_range(mut self, range: f32) -> Self {
        self.range = range;
        self
    }

    /// Falloff exponent, clamped to `[0.1, 3]`
    pub fn with_falloff(mut self, falloff: f32) -> Self {
        self.falloff = falloff.clamp(0.1, 3.0);
        self
    }

    pub fn with_shadows(mut self, casts_shadows: bool) -> Self {
        self.casts_shadows = casts_shadows;
        self
    }

    pub fn with_shadow_range(mut self, shadow_range: f32) -> Self {
        self.shadow_range = shadow_range;
        self
    }

    /// Configured shadow distance: `shadow_range`, or `range` when `shadow_range`
    /// is not finite. `None` when the result is not positive.
    pub fn shadow_distance(&self) -> Option<f32> {
        let distance = if self.shadow_range.is_finite() {
            self.shadow_range
        } else {
            self.range
        };
        (distance > 0.0).then_some(distance)
    }
}

/// Direction used when a light's direction is unusable
pub const FALLBACK_DIRECTION: Vec3 = Vec3::NEG_Y;

/// Unit direction, or `None` if `direction` is non-finite or near zero length
pub fn normalize_direction(direction: Vec3) -> Option<Vec3> {
    if !direction.is_finite() {
        return None;
    }
    let length = direction.length();
    (length > 1e-6).then(|| direction / length)
}

/// Bounded, caller-owned collection of scene lights
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LightList {
    lights: Vec<Light>,
}

impl LightList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a light; returns its index, or `None` once `MAX_LIGHTS` are held
    pub fn add(&mut self, light: Light) -> Option<usize> {
        if self.lights.len() >= MAX_LIGHTS {
            log::debug!("light list full, dropping light of type {:?}", light.kind);
            return None;
        }
        self.lights.push(light);
        Some(self.lights.len() - 1)
    }

    pub fn remove(&mut self, index: usize) -> Option<Light> {
        (index < self.lights.len()).then(|| self.lights.remove(index))
    }

    pub fn clear(&mut self) {
        self.lights.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Light> {
        self.lights.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Light> {
        self.lights.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn as_slice(&self) -> &[Light] {
        &self.lights
    }

    pub fn iter(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter()
    }
}

impl FromIterator<Light> for LightList {
    fn from_iter<I: IntoIterator<Item = Light>>(iter: I) -> Self {
        let mut list = Self::new();
        for light in iter {
            if list.add(light).is_none() {
                break;
            }
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_defaults() {
        let light = Light::default();
        assert_eq!(light.kind, LightType::Point);
        assert_eq!(light.direction, Vec3::NEG_Y);
        assert!(!light.casts_shadows);
        assert_eq!(light.shadow_type, ShadowType::Smooth);
        assert_eq!(light.range, 20.0);
    }

    #[test]
    fn test_factories_cast_shadows() {
        assert!(Light::point(Vec3::ZERO).casts_shadows);
        let dir = Light::directional(Vec3::new(0.0, -2.0, 0.0));
        assert!(dir.casts_shadows);
        assert!((dir.direction.length() - 1.0).abs() < 1e-6);
        let spot = Light::spot(Vec3::ONE, Vec3::NEG_Z, 30.0).with_falloff(9.0);
        assert_eq!(spot.falloff, 3.0);
        assert_eq!(spot.spot_angle, 30.0);
    }

    #[test]
    fn test_shadow_distance() {
        let light = Light::default().with_range(12.0).with_shadow_range(0.0);
        assert_eq!(light.shadow_distance(), None);
        let light = light.with_shadow_range(f32::NAN);
        assert_eq!(light.shadow_distance(), Some(12.0));
        let light = light.with_shadow_range(40.0);
        assert_eq!(light.shadow_distance(), Some(40.0));
    }

    #[test]
    fn test_normalize_direction() {
        assert_eq!(normalize_direction(Vec3::new(0.0, 0.0, -3.0)), Some(Vec3::NEG_Z));
        assert_eq!(normalize_direction(Vec3::splat(f32::NAN)), None);
        assert_eq!(normalize_direction(Vec3::ZERO), None);
    }

    #[test]
    fn test_light_list_bounded() {
        let mut list = LightList::new();
        for i in 0..MAX_LIGHTS {
            assert_eq!(list.add(Light::default()), Some(i));
        }
        assert_eq!(list.add(Light::default()), None);
        assert_eq!(list.len(), MAX_LIGHTS);

        assert!(list.remove(0).is_some());
        assert!(list.remove(MAX_LIGHTS).is_none());
        assert_eq!(list.len(), MAX_LIGHTS - 1);
    }

    #[test]
    fn test_light_list_from_iter_truncates() {
        let list: LightList = (0..20).map(|_| Light::default()).collect();
        assert_eq!(list.len(), MAX_LIGHTS);
    }

    #[test]
    fn test_light_type_values() {
        assert_eq!(LightType::Spot.as_f32(), 2.0);
        assert_eq!(ShadowType::Hard.as_f32(), 0.0);
    }
}
