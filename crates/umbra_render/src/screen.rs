//! Screen
//!
//! Owns the triple buffer the 3D pass renders into, runs the post-processing
//! stack and presents the display buffer.
//!
//! Per frame:
//!
//! ```text
//! bind()    -> draw buffer bound, shadows allocated for the camera
//! <draw>
//! unbind()  -> effects ping-pong draw <-> edit, final image lands in edit,
//!              roles rotate (display <- edit, edit <- draw, draw <- display)
//! draw_to_window() / draw_to_view() read the display buffer only
//! ```

use glam::Vec4;

use crate::camera::Camera;
use crate::config::ScreenConfig;
use crate::context::FrameContext;
use crate::device::{
    create_program_logged, BlendMode, ClearFlags, GraphicsDevice, ProgramHandle, TextureHandle,
    Viewport,
};
use crate::framebuffer::{BufferRole, FrameBuffer, TrippleBuffer};
use crate::post::{draw_textured_quad, FullscreenQuad, PostProcessingEffect, SCREEN_PROGRAM};

pub struct Screen {
    width: u32,
    height: u32,
    buffers: TrippleBuffer,
    quad: FullscreenQuad,
    screen_program: Option<ProgramHandle>,
    effects: Vec<Box<dyn PostProcessingEffect>>,
    camera: Option<Camera>,
    clear_color: Vec4,
    bound: bool,
    frames: u64,
}

impl Screen {
    pub fn new(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            buffers: TrippleBuffer::create(device, width, height),
            quad: FullscreenQuad::new(device),
            screen_program: create_program_logged(device, &SCREEN_PROGRAM),
            effects: Vec::new(),
            camera: None,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            bound: false,
            frames: 0,
        }
    }

    /// Screen with the configured clear color and effect stack
    pub fn from_config(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        config: &ScreenConfig,
    ) -> Self {
        let mut screen = Self::new(device, width, height);
        screen.clear_color = Vec4::from_array(config.clear_color);
        for kind in &config.effects {
            let effect = kind.create(device);
            screen.add_effect(effect);
        }
        screen
    }

    /// Make the draw buffer the render target for the 3D pass.
    ///
    /// Does nothing while already bound. Shadow maps are allocated for the
    /// screen's camera; without a camera shadows are off for the frame.
    pub fn bind(&mut self, frame: &mut FrameContext<'_>, clear: bool) {
        if self.bound {
            return;
        }
        let device = &mut *frame.device;
        let draw = self.buffers.draw();
        draw.bind(device);

        device.set_color_write(true);
        device.set_depth_write(true);
        if clear {
            device.clear(ClearFlags::ALL, self.clear_color);
        }
        device.set_depth_test(true);
        self.bound = true;

        frame
            .shadows
            .begin_frame(&mut *frame.device, self.camera.as_ref(), frame.lights.as_slice());
    }

    /// Return to the default framebuffer and compose the frame
    pub fn unbind(&mut self, device: &mut dyn GraphicsDevice) {
        if !self.bound {
            return;
        }
        device.bind_framebuffer(None);
        device.set_depth_test(false);
        self.bound = false;

        self.process_render_pipeline(device);
    }

    /// Run every effect, leave the result in the edit buffer and rotate
    /// the buffer roles
    pub fn process_render_pipeline(&mut self, device: &mut dyn GraphicsDevice) {
        let depth = self.buffers.draw().depth_texture();
        let mut source = BufferRole::Draw;
        let mut target = BufferRole::Edit;

        for effect in &mut self.effects {
            let Some(input) = self.buffers.get(source).texture() else {
                log::error!("effect {} skipped: {:?} buffer has no color", effect.name(), source);
                continue;
            };
            effect.apply(device, input, depth, self.buffers.get(target), &self.quad);
            std::mem::swap(&mut source, &mut target);
        }

        // the display promotion always reads the edit role
        if source != BufferRole::Edit {
            self.blit(device, self.buffers.get(source), self.buffers.edit());
        }
        device.bind_framebuffer(None);

        self.buffers.swap_buffers();
        self.frames += 1;
    }

    fn blit(&self, device: &mut dyn GraphicsDevice, from: &FrameBuffer, to: &FrameBuffer) {
        to.bind(device);
        device.clear(ClearFlags::ALL, Vec4::ZERO);
        device.set_depth_test(false);
        device.set_blend(None);

        if let (Some(program), Some(input)) = (self.screen_program, from.texture()) {
            draw_textured_quad(device, program, input, &self.quad);
        }
        to.unbind(device);
    }

    /// Present the display buffer over the whole window
    pub fn draw_to_window(&self, device: &mut dyn GraphicsDevice, surface: (u32, u32), clear: bool) {
        self.draw_to_view(device, surface, clear, None);
    }

    /// Present the display buffer into `view` (whole surface when `None`),
    /// alpha blended over what is already there
    pub fn draw_to_view(
        &self,
        device: &mut dyn GraphicsDevice,
        surface: (u32, u32),
        clear: bool,
        view: Option<Viewport>,
    ) {
        device.bind_framebuffer(None);
        device.set_viewport(Viewport::from_size(surface.0, surface.1));
        if clear {
            device.clear(ClearFlags::COLOR, self.clear_color);
        }
        if let Some(view) = view {
            device.set_viewport(view);
        }

        device.set_depth_test(false);
        device.set_cull_face(false);
        device.set_blend(Some(BlendMode::Alpha));

        if let (Some(program), Some(texture)) = (self.screen_program, self.display_texture()) {
            draw_textured_quad(device, program, texture, &self.quad);
        }
    }

    /// Resize every buffer and the camera's aspect
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::warn!("ignoring screen resize to {width}x{height}");
            return;
        }
        self.buffers.resize_buffers(device, width, height);
        self.width = width;
        self.height = height;
        if let Some(camera) = &mut self.camera {
            camera.resize(width as f32, height as f32);
        }
    }

    /// Color texture currently presented
    pub fn display_texture(&self) -> Option<TextureHandle> {
        self.buffers.display().texture()
    }

    pub fn buffers(&self) -> &TrippleBuffer {
        &self.buffers
    }

    pub fn add_effect(&mut self, effect: Box<dyn PostProcessingEffect>) {
        log::debug!("screen effect added: {}", effect.name());
        self.effects.push(effect);
    }

    /// Drop the effect stack without releasing GPU resources
    pub fn clear_effects(&mut self) {
        self.effects.clear();
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = Some(camera);
    }

    pub fn take_camera(&mut self) -> Option<Camera> {
        self.camera.take()
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.camera.as_mut()
    }

    pub fn clear_color(&self) -> Vec4 {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Vec4) {
        self.clear_color = color;
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frames composed so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn release(mut self, device: &mut dyn GraphicsDevice) {
        for mut effect in self.effects.drain(..) {
            effect.release(device);
        }
        if let Some(program) = self.screen_program.take() {
            device.destroy_program(program);
        }
        self.quad.release(device);
        self.buffers.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RenderCore;
    use crate::config::ShadowConfig;
    use crate::device::headless::HeadlessDevice;
    use crate::light::LightList;

    fn screen(device: &mut HeadlessDevice) -> Screen {
        Screen::new(device, 32, 24)
    }

    #[test]
    fn test_bind_is_idempotent() {
        let mut device = HeadlessDevice::new(32, 24);
        let mut screen = screen(&mut device);
        let mut core = RenderCore::new(ShadowConfig::default());
        let lights = LightList::new();

        {
            let mut frame = core.frame(&mut device, &lights);
            screen.bind(&mut frame, true);
            let binds = frame.shadows.frame();
            screen.bind(&mut frame, true);
            assert_eq!(frame.shadows.frame(), binds);
        }
        assert!(screen.is_bound());
        assert_eq!(device.bound_framebuffer(), Some(screen.buffers().draw().handle()));
        assert!(device.depth_test_enabled());

        screen.unbind(&mut device);
        assert!(!screen.is_bound());
        assert_eq!(device.bound_framebuffer(), None);
        assert_eq!(screen.frames(), 1);

        // unbind while unbound is a no-op
        screen.unbind(&mut device);
        assert_eq!(screen.frames(), 1);
    }

    #[test]
    fn test_zero_effects_blits_into_edit() {
        let mut device = HeadlessDevice::new(32, 24);
        let mut screen = screen(&mut device);
        let draw = screen.buffers().draw().texture();
        let edit = screen.buffers().edit().texture();
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        screen.buffers().draw().clear(&mut device, red);

        screen.process_render_pipeline(&mut device);

        // edit was promoted to display and holds the frame
        assert_eq!(screen.display_texture(), edit);
        assert_eq!(device.texture_color(edit.unwrap()), Some(red));
        assert_eq!(screen.buffers().edit().texture(), draw);
    }

    #[test]
    fn test_even_effect_count_needs_final_blit() {
        let mut device = HeadlessDevice::new(32, 24);
        let mut screen = screen(&mut device);
        screen.add_effect(crate::post::EffectKind::Grayscale.create(&mut device));
        screen.add_effect(crate::post::EffectKind::Grayscale.create(&mut device));
        let color = Vec4::new(0.2, 0.6, 0.4, 1.0);
        screen.buffers().draw().clear(&mut device, color);

        device.clear_draw_log();
        screen.process_render_pipeline(&mut device);

        let labels: Vec<_> = device.draw_log().iter().map(|r| r.program_label).collect();
        assert_eq!(
            labels,
            vec![
                crate::post::GRAYSCALE_PROGRAM_LABEL,
                crate::post::GRAYSCALE_PROGRAM_LABEL,
                crate::post::SCREEN_PROGRAM_LABEL
            ]
        );
        let result = device.texture_color(screen.display_texture().unwrap()).unwrap();
        let luma = color.truncate().dot(crate::post::LUMA_WEIGHTS);
        assert!((result.x - luma).abs() < 1e-6);
    }

    #[test]
    fn test_draw_to_window_reads_display() {
        let mut device = HeadlessDevice::new(32, 24);
        let mut screen = screen(&mut device);
        let blue = Vec4::new(0.0, 0.0, 1.0, 1.0);
        screen.buffers().draw().clear(&mut device, blue);
        screen.process_render_pipeline(&mut device);

        // new draw content must not reach the window until composed
        screen.buffers().draw().clear(&mut device, Vec4::ONE);
        screen.draw_to_window(&mut device, (64, 48), true);

        assert_eq!(device.window_color(), blue);
        assert_eq!(device.viewport(), Viewport::from_size(64, 48));
        assert_eq!(device.blend(), Some(BlendMode::Alpha));
        assert_eq!(device.bound_texture(0), screen.display_texture());
    }

    #[test]
    fn test_draw_to_view_sets_view_rect() {
        let mut device = HeadlessDevice::new(32, 24);
        let screen = screen(&mut device);
        let view = Viewport::new(10, 5, 16, 12);
        screen.draw_to_view(&mut device, (64, 48), false, Some(view));
        assert_eq!(device.viewport(), view);
        assert_eq!(device.stats().clears, 0);
    }

    #[test]
    fn test_resize_updates_buffers_and_camera() {
        let mut device = HeadlessDevice::new(32, 24);
        let mut screen = screen(&mut device);
        screen.set_camera(Camera::perspective(60.0, 32.0, 24.0, 0.1, 100.0));
        screen.resize(&mut device, 100, 50);

        assert_eq!((screen.width(), screen.height()), (100, 50));
        for role in [BufferRole::Display, BufferRole::Edit, BufferRole::Draw] {
            let texture = screen.buffers().get(role).texture().unwrap();
            assert_eq!(device.texture_size(texture), Some((100, 50)));
        }
        assert_eq!(screen.camera().unwrap().settings().aspect, 2.0);

        screen.resize(&mut device, 0, 50);
        assert_eq!(screen.width(), 100);
    }

    #[test]
    fn test_from_config() {
        let mut device = HeadlessDevice::new(32, 24);
        let config = ScreenConfig {
            clear_color: [0.1, 0.2, 0.3, 1.0],
            effects: vec![crate::post::EffectKind::Grayscale],
        };
        let screen = Screen::from_config(&mut device, 32, 24, &config);
        assert_eq!(screen.effect_count(), 1);
        assert_eq!(screen.clear_color(), Vec4::new(0.1, 0.2, 0.3, 1.0));

        let before = device.texture_count();
        screen.release(&mut device);
        assert_eq!(device.texture_count(), before - 6);
    }
}
