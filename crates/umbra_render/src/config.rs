//! Render configuration
//!
//! Shadow and screen settings with serde support so the runtime can load them
//! from a boot file.

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};
use crate::post::EffectKind;

/// Shadow map resolution bounds
pub const MIN_SHADOW_RESOLUTION: u32 = 64;
pub const MAX_SHADOW_RESOLUTION: u32 = 8192;

/// Global shadow configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Enable shadows globally
    pub enabled: bool,

    /// Shadow map size for directional lights
    pub directional_resolution: u32,

    /// Shadow map size for spot lights
    pub spot_resolution: u32,

    /// Cubemap face size for point lights
    pub point_resolution: u32,

    /// Log every allocation decision at debug level
    pub debug_logging: bool,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directional_resolution: 4096,
            spot_resolution: 2048,
            point_resolution: 1024,
            debug_logging: false,
        }
    }
}

impl ShadowConfig {
    /// Create a high-quality shadow configuration
    pub fn high_quality() -> Self {
        Self {
            directional_resolution: 8192,
            spot_resolution: 4096,
            point_resolution: 2048,
            ..Default::default()
        }
    }

    /// Create a low-quality shadow configuration for performance
    pub fn low_quality() -> Self {
        Self {
            directional_resolution: 2048,
            spot_resolution: 1024,
            point_resolution: 512,
            ..Default::default()
        }
    }

    /// Create a configuration with shadows disabled
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Validate configuration, rejecting resolutions outside the supported range
    pub fn validate(&self) -> RenderResult<()> {
        for (name, value) in [
            ("directional_resolution", self.directional_resolution),
            ("spot_resolution", self.spot_resolution),
            ("point_resolution", self.point_resolution),
        ] {
            if !(MIN_SHADOW_RESOLUTION..=MAX_SHADOW_RESOLUTION).contains(&value) {
                return Err(RenderError::Config(format!(
                    "shadows.{name} = {value} is outside {MIN_SHADOW_RESOLUTION}..={MAX_SHADOW_RESOLUTION}"
                )));
            }
        }
        Ok(())
    }
}

/// Offscreen chain and presentation settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// RGBA clear color for the draw buffer and window
    pub clear_color: [f32; 4],

    /// Post-processing stack, applied in order
    pub effects: Vec<EffectKind>,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            effects: Vec::new(),
        }
    }
}

/// Top-level render configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub shadows: ShadowConfig,
    pub screen: ScreenConfig,
}

impl RenderConfig {
    pub fn validate(&self) -> RenderResult<()> {
        self.shadows.validate()?;
        if self.screen.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(RenderError::Config(
                "screen.clear_color must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolutions() {
        let config = ShadowConfig::default();
        assert_eq!(config.directional_resolution, 4096);
        assert_eq!(config.spot_resolution, 2048);
        assert_eq!(config.point_resolution, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert!(!ShadowConfig::disabled().enabled);
        assert!(ShadowConfig::high_quality().validate().is_ok());
        assert!(ShadowConfig::low_quality().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_tiny_maps() {
        let config = ShadowConfig {
            spot_resolution: 8,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RenderError::Config(_))));
    }

    #[test]
    fn test_render_config_rejects_nan_clear() {
        let mut config = RenderConfig::default();
        config.screen.clear_color[1] = f32::NAN;
        assert!(config.validate().is_err());
    }
}
