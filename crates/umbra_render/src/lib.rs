//! # umbra_render - Shadowed Forward Render Core
//!
//! Backend-agnostic render pipeline core with:
//! - Pooled shadow maps for directional, spot and point lights
//! - A fixed-layout light uniform block with change detection
//! - Triple-buffered offscreen targets
//! - Ping-pong post-processing composition
//!
//! ## Architecture
//!
//! All GPU work goes through the [`GraphicsDevice`] trait. Per frame:
//!
//! 1. **Screen::bind**: the draw buffer becomes the target and the
//!    [`ShadowRenderer`] hands shadow slots to lights
//! 2. **Depth pass**: every model is drawn into each live shadow map
//! 3. **Lit pass**: materials upload the [`LightBlock`] and bind shadow samplers
//! 4. **Screen::unbind**: effects run, roles rotate, the result is presented
//!
//! ## Example
//!
//! ```ignore
//! use umbra_render::prelude::*;
//!
//! let mut device = HeadlessDevice::new(1280, 720);
//! let mut core = RenderCore::new(ShadowConfig::default());
//! let mut screen = Screen::new(&mut device, 1280, 720);
//! screen.set_camera(Camera::perspective(60.0, 1280.0, 720.0, 0.1, 100.0));
//!
//! let mut lights = LightList::new();
//! lights.add(Light::directional(Vec3::new(-0.3, -1.0, -0.2)));
//!
//! {
//!     let mut frame = core.frame(&mut device, &lights);
//!     screen.bind(&mut frame, true);
//!     frame.render_shadows(&mesh, model, &material);
//!     frame.draw(&mesh, &material);
//! }
//! screen.unbind(&mut device);
//! screen.draw_to_window(&mut device, (1280, 720), true);
//! ```

pub mod camera;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod light;
pub mod light_block;
pub mod material;
pub mod post;
pub mod screen;
pub mod shadow;
pub mod uploader;

pub use camera::{Camera, CameraSettings};
pub use config::{RenderConfig, ScreenConfig};
pub use context::{FrameContext, RenderCore};
pub use device::{
    BlendMode, ClearFlags, CubeFace, DeviceLimits, GraphicsDevice, ProgramDesc, TextureHandle,
    UniformValue, Viewport,
};
pub use error::{RenderError, RenderResult};
pub use framebuffer::{BufferRole, FrameBuffer, FrameBufferChain, TrippleBuffer};
pub use light::{Light, LightList, LightType, ShadowType, MAX_LIGHTS};
pub use light_block::{LightBlock, LightRecord, LIGHT_BLOCK_BINDING};
pub use material::{Material, Mesh};
pub use post::{EffectKind, FullscreenQuad, GrayscaleEffect, PostProcessingEffect};
pub use screen::Screen;
pub use shadow::{
    ShadowConfig, ShadowDebugMode, ShadowLightData, ShadowPass, ShadowRenderer, MAX_SHADOW_MAPS_2D,
    MAX_SHADOW_MAPS_CUBE,
};
pub use uploader::{LightUniformUploader, UploadOutcome, UploadStats};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::camera::Camera;
    pub use crate::config::{RenderConfig, ShadowConfig};
    pub use crate::context::{FrameContext, RenderCore};
    pub use crate::device::headless::HeadlessDevice;
    pub use crate::device::{GraphicsDevice, ProgramHandle, UniformValue};
    pub use crate::light::{Light, LightList};
    pub use crate::material::{Material, Mesh};
    pub use crate::screen::Screen;
    pub use glam::{Mat4, Vec3, Vec4};
}
