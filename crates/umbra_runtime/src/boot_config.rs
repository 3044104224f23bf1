//! Boot Configuration
//!
//! Everything the frame loop needs before the first frame: output size, frame
//! count, log level, the render configuration and the light rig.
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables: `UMBRA_FRAMES`, `UMBRA_WIDTH`, `UMBRA_HEIGHT`,
//!    `UMBRA_SHADOWS`, `UMBRA_LOG`
//! 2. Config file: `$UMBRA_CONFIG`, or `umbra.toml` in the working directory
//! 3. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! frames = 120
//! log_level = "debug"
//! report = true
//!
//! [window]
//! width = 1280
//! height = 720
//!
//! [render.shadows]
//! enabled = true
//! directional_resolution = 2048
//!
//! [render.screen]
//! clear_color = [0.05, 0.05, 0.08, 1.0]
//! effects = ["grayscale"]
//!
//! [[lights]]
//! type = "directional"
//! direction = [-0.4, -1.0, -0.3]
//! casts_shadows = true
//! ```

use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use umbra_render::{Light, RenderConfig, ShadowDebugMode};

use crate::error::{RuntimeError, RuntimeResult};

const DEFAULT_CONFIG_PATH: &str = "umbra.toml";

/// Output surface size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Complete boot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    pub window: WindowConfig,
    /// Frames to render before exiting
    pub frames: u32,
    /// env_logger filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Print a JSON frame report on exit
    pub report: bool,
    /// Move the first point light every frame
    pub animate: bool,
    pub shadow_debug: ShadowDebugMode,
    pub render: RenderConfig,
    pub lights: Vec<Light>,
    /// File the config was read from
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            frames: 60,
            log_level: "info".to_string(),
            report: false,
            animate: true,
            shadow_debug: ShadowDebugMode::Off,
            render: RenderConfig::default(),
            lights: default_lights(),
            config_path: None,
        }
    }
}

/// Key light, a shadowed spot and two point lights
pub fn default_lights() -> Vec<Light> {
    vec![
        Light::directional(Vec3::new(-0.4, -1.0, -0.3)).with_intensity(1.2),
        Light::spot(Vec3::new(3.0, 6.0, 2.0), Vec3::new(-0.4, -1.0, -0.3), 30.0)
            .with_range(20.0)
            .with_shadow_range(25.0),
        Light::point(Vec3::new(-3.0, 2.5, 1.0)).with_range(12.0).with_shadow_range(12.0),
        Light::point(Vec3::new(2.0, 1.5, -3.0))
            .with_color(glam::Vec4::new(1.0, 0.6, 0.3, 1.0))
            .with_shadows(false),
    ]
}

impl BootConfig {
    /// Load from the config file (if any) and apply environment overrides
    pub fn load() -> RuntimeResult<Self> {
        let path = std::env::var("UMBRA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            let mut config = Self::load_from_file(&path)?;
            config.config_path = Some(path);
            config
        } else {
            Self::default()
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn load_from_file(path: &Path) -> RuntimeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content, &path.display().to_string())
    }

    pub fn from_toml(content: &str, origin: &str) -> RuntimeResult<Self> {
        toml::from_str(content).map_err(|source| RuntimeError::ConfigParse {
            path: origin.to_string(),
            source,
        })
    }

    /// Apply `UMBRA_*` overrides read through `var`
    pub fn apply_env_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> RuntimeResult<()> {
        if let Some(frames) = var("UMBRA_FRAMES") {
            self.frames = parse_env("UMBRA_FRAMES", &frames)?;
        }
        if let Some(width) = var("UMBRA_WIDTH") {
            self.window.width = parse_env("UMBRA_WIDTH", &width)?;
        }
        if let Some(height) = var("UMBRA_HEIGHT") {
            self.window.height = parse_env("UMBRA_HEIGHT", &height)?;
        }
        if let Some(shadows) = var("UMBRA_SHADOWS") {
            self.render.shadows.enabled = match shadows.to_lowercase().as_str() {
                "1" | "true" | "on" => true,
                "0" | "false" | "off" => false,
                _ => {
                    return Err(RuntimeError::InvalidEnv {
                        name: "UMBRA_SHADOWS",
                        value: shadows,
                    })
                }
            };
        }
        if let Some(level) = var("UMBRA_LOG") {
            if !level.is_empty() {
                self.log_level = level;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(RuntimeError::InvalidEnv {
                name: "window",
                value: format!("{}x{}", self.window.width, self.window.height),
            });
        }
        self.render.validate()?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> RuntimeResult<T> {
    value.trim().parse().map_err(|_| RuntimeError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}
