//! Per-frame render context
//!
//! [`RenderCore`] owns the long-lived lighting state. [`FrameContext`] borrows
//! it together with the device and the frame's lights and is handed to
//! [`Screen::bind`](crate::screen::Screen::bind) and to every material.

use glam::Mat4;

use crate::config::ShadowConfig;
use crate::device::{GraphicsDevice, ProgramHandle};
use crate::light::LightList;
use crate::material::{Material, Mesh};
use crate::shadow::ShadowRenderer;
use crate::uploader::{LightUniformUploader, UploadOutcome};

/// Everything a frame needs, borrowed for the frame's duration
pub struct FrameContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub lights: &'a LightList,
    pub shadows: &'a mut ShadowRenderer,
    pub lighting: &'a mut LightUniformUploader,
    pub frame: u64,
}

impl<'a> FrameContext<'a> {
    /// Upload the light block and bind shadow samplers for a lit program
    pub fn apply_lighting(&mut self, program: ProgramHandle) -> UploadOutcome {
        let outcome = self.lighting.upload_lights(
            &mut *self.device,
            program,
            self.lights.as_slice(),
            &*self.shadows,
            self.frame,
        );
        self.shadows.bind_shadow_samplers(&mut *self.device, program);
        outcome
    }

    /// Depth pass for one model
    pub fn render_shadows(&mut self, mesh: &dyn Mesh, model: Mat4, material: &dyn Material) {
        self.shadows
            .render_shadows(&mut *self.device, mesh, model, material);
    }

    /// Bind `material` and draw `mesh` into whatever target is bound
    pub fn draw(&mut self, mesh: &dyn Mesh, material: &dyn Material) {
        material.bind(self);
        mesh.draw(&mut *self.device);
    }
}

/// Lighting state that outlives a frame
pub struct RenderCore {
    pub shadows: ShadowRenderer,
    pub lighting: LightUniformUploader,
    frame: u64,
}

impl RenderCore {
    pub fn new(config: ShadowConfig) -> Self {
        Self {
            shadows: ShadowRenderer::new(config),
            lighting: LightUniformUploader::new(),
            frame: 0,
        }
    }

    /// Start the next frame
    pub fn frame<'a>(
        &'a mut self,
        device: &'a mut dyn GraphicsDevice,
        lights: &'a LightList,
    ) -> FrameContext<'a> {
        self.frame += 1;
        FrameContext {
            device,
            lights,
            shadows: &mut self.shadows,
            lighting: &mut self.lighting,
            frame: self.frame,
        }
    }

    /// Frames started so far
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.shadows.release(device);
        self.lighting.release(device);
    }
}
