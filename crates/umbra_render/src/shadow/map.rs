//! Shadow map render targets
//!
//! A map owns one depth-only framebuffer and the depth texture attached to it.
//! A map whose framebuffer fails completeness validation reports size 0 and is
//! never bound; the renderer treats it as "no slot".

use glam::Vec4;

use crate::device::{
    Attachment, ClearFlags, CubeFace, FramebufferHandle, GraphicsDevice, TextureDesc,
    TextureHandle, Viewport,
};

/// 2D depth map for directional and spot lights
#[derive(Debug)]
pub struct ShadowMap2D {
    framebuffer: FramebufferHandle,
    depth: TextureHandle,
    size: u32,
}

impl ShadowMap2D {
    pub fn new(device: &mut dyn GraphicsDevice, size: u32) -> Self {
        let depth = device.create_texture(&TextureDesc::depth("shadow.map2d", size, size));
        let framebuffer = device.create_framebuffer("shadow.map2d");
        device.attach_texture(framebuffer, Attachment::Depth, depth, None);

        let mut map = Self {
            framebuffer,
            depth,
            size,
        };
        map.validate(device);
        map
    }

    fn validate(&mut self, device: &mut dyn GraphicsDevice) {
        if let Err(err) = device.check_framebuffer(self.framebuffer) {
            log::error!("2D shadow map ({0}x{0}) disabled: {err}", self.size);
            self.size = 0;
        }
    }

    /// Reallocate depth storage if `size` differs from the current size
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, size: u32) {
        if size == self.size {
            return;
        }
        device.resize_texture(self.depth, size, size);
        device.attach_texture(self.framebuffer, Attachment::Depth, self.depth, None);
        self.size = size;
        self.validate(device);
    }

    /// Bind as render target with a full-map viewport
    pub fn bind(&self, device: &mut dyn GraphicsDevice) {
        device.bind_framebuffer(Some(self.framebuffer));
        device.set_viewport(Viewport::from_size(self.size, self.size));
    }

    /// Bind and reset depth to the far plane
    pub fn clear(&self, device: &mut dyn GraphicsDevice) {
        self.bind(device);
        device.clear(ClearFlags::DEPTH, Vec4::ZERO);
    }

    pub fn is_valid(&self) -> bool {
        self.size > 0
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn depth_texture(&self) -> TextureHandle {
        self.depth
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_texture(self.depth);
    }
}

/// Depth cubemap for point lights, rendered one face at a time
#[derive(Debug)]
pub struct ShadowMapCube {
    framebuffer: FramebufferHandle,
    depth: TextureHandle,
    size: u32,
}

impl ShadowMapCube {
    pub fn new(device: &mut dyn GraphicsDevice, size: u32) -> Self {
        let depth = device.create_texture(&TextureDesc::depth_cube("shadow.cube", size));
        let framebuffer = device.create_framebuffer("shadow.cube");
        device.attach_texture(framebuffer, Attachment::Depth, depth, Some(CubeFace::PositiveX));

        let mut map = Self {
            framebuffer,
            depth,
            size,
        };
        map.validate(device);
        map
    }

    fn validate(&mut self, device: &mut dyn GraphicsDevice) {
        if let Err(err) = device.check_framebuffer(self.framebuffer) {
            log::error!("cube shadow map ({0}x{0}) disabled: {err}", self.size);
            self.size = 0;
        }
    }

    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, size: u32) {
        if size == self.size {
            return;
        }
        device.resize_texture(self.depth, size, size);
        device.attach_texture(
            self.framebuffer,
            Attachment::Depth,
            self.depth,
            Some(CubeFace::PositiveX),
        );
        self.size = size;
        self.validate(device);
    }

    /// Attach `face` as the depth target and bind it
    pub fn bind_face(&self, device: &mut dyn GraphicsDevice, face: CubeFace) {
        device.attach_texture(self.framebuffer, Attachment::Depth, self.depth, Some(face));
        device.bind_framebuffer(Some(self.framebuffer));
        device.set_viewport(Viewport::from_size(self.size, self.size));
    }

    /// Reset all six faces to the far plane
    pub fn clear(&self, device: &mut dyn GraphicsDevice) {
        for face in CubeFace::ALL {
            self.bind_face(device, face);
            device.clear(ClearFlags::DEPTH, Vec4::ZERO);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.size > 0
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn depth_texture(&self) -> TextureHandle {
        self.depth
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_texture(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::headless::HeadlessDevice;

    #[test]
    fn test_map_2d_valid() {
        let mut device = HeadlessDevice::new(64, 64);
        let map = ShadowMap2D::new(&mut device, 512);
        assert!(map.is_valid());
        assert_eq!(map.size(), 512);

        map.bind(&mut device);
        assert_eq!(device.bound_framebuffer(), Some(map.framebuffer()));
        assert_eq!(device.viewport(), Viewport::from_size(512, 512));
    }

    #[test]
    fn test_incomplete_map_degrades_to_zero_size() {
        let mut device = HeadlessDevice::new(64, 64);
        device.set_framebuffer_failure(true);
        let map = ShadowMap2D::new(&mut device, 512);
        assert!(!map.is_valid());
        assert_eq!(map.size(), 0);

        let cube = ShadowMapCube::new(&mut device, 256);
        assert!(!cube.is_valid());
    }

    #[test]
    fn test_resize_keeps_texture() {
        let mut device = HeadlessDevice::new(64, 64);
        let mut map = ShadowMap2D::new(&mut device, 512);
        let texture = map.depth_texture();
        let created = device.stats().textures_created;

        map.resize(&mut device, 1024);
        assert_eq!(map.depth_texture(), texture);
        assert_eq!(device.texture_size(texture), Some((1024, 1024)));
        assert_eq!(device.stats().textures_created, created);
    }

    #[test]
    fn test_cube_clear_resets_every_face() {
        let mut device = HeadlessDevice::new(64, 64);
        let cube = ShadowMapCube::new(&mut device, 128);
        device.reset_stats();
        cube.clear(&mut device);
        assert_eq!(device.stats().clears, 6);
        for face in CubeFace::ALL {
            assert_eq!(device.texture_depth(cube.depth_texture(), Some(face)), Some(1.0));
        }
    }

    #[test]
    fn test_release() {
        let mut device = HeadlessDevice::new(64, 64);
        let map = ShadowMap2D::new(&mut device, 64);
        let before = device.texture_count();
        map.release(&mut device);
        assert_eq!(device.texture_count(), before - 1);
    }
}
