//! Shadow Mapping
//!
//! A fixed pool of depth render targets shared by every shadow-casting light.
//!
//! # Architecture
//!
//! - **Map**: one depth-only framebuffer plus its 2D or cube depth texture
//! - **Projection**: per light-type light-space matrices
//! - **Data**: per-light allocation result consumed by the light block
//! - **Renderer**: per-frame pool allocation, the depth pass and sampler binding
//!
//! # Usage
//!
//! ```ignore
//! use umbra_render::shadow::*;
//!
//! let mut shadows = ShadowRenderer::new(ShadowConfig::default());
//!
//! // Once per frame, before any geometry
//! shadows.begin_frame(device, Some(&camera), lights.as_slice());
//!
//! // Per model
//! shadows.render_shadows(device, &mesh, model_matrix, &material);
//!
//! // From a lit material's bind()
//! shadows.bind_shadow_samplers(device, program);
//! ```
//!
//! Pools hold at most [`MAX_SHADOW_MAPS_2D`] 2D maps (directional and spot
//! lights) and [`MAX_SHADOW_MAPS_CUBE`] cubemaps (point lights). Slots go to
//! lights first come first served in light-array order; lights past the pool
//! capacity render unshadowed.

pub mod data;
pub mod map;
pub mod projection;
mod programs;
pub mod renderer;

pub use data::{ShadowLightData, MAX_CASCADES};
pub use map::{ShadowMap2D, ShadowMapCube};
pub use programs::{DEPTH_PROGRAM_LABEL, DEPTH_VIEW_PROGRAM_LABEL, DISTANCE_PROGRAM_LABEL};
pub use renderer::{ShadowDebugMode, ShadowPass, ShadowRenderer, ShadowSlot2D, ShadowSlotCube};

pub use crate::config::ShadowConfig;

/// Capacity of the 2D shadow map pool
pub const MAX_SHADOW_MAPS_2D: usize = 4;

/// Capacity of the cubemap shadow pool
pub const MAX_SHADOW_MAPS_CUBE: usize = 2;

/// First texture unit of `u_shadowMaps2D`
pub const SHADOW_2D_TEXTURE_UNIT: u32 = 8;

/// First texture unit of `u_shadowMapsCube`
pub const SHADOW_CUBE_TEXTURE_UNIT: u32 = 12;

/// Sampler array uniform for 2D shadow maps
pub const SHADOW_MAPS_2D_UNIFORM: &str = "u_shadowMaps2D";

/// Sampler array uniform for cube shadow maps
pub const SHADOW_MAPS_CUBE_UNIFORM: &str = "u_shadowMapsCube";

/// Debug view selector uniform
pub const DEBUG_SHADOWS_UNIFORM: &str = "u_debugShadows";
