//! Offscreen render targets and the rotating triple buffer

use glam::Vec4;

use crate::device::{
    Attachment, ClearFlags, FramebufferHandle, GraphicsDevice, TextureDesc, TextureHandle,
    Viewport,
};
use crate::error::RenderResult;

const COLOR_LABEL: &str = "framebuffer.color";
const DEPTH_LABEL: &str = "framebuffer.depth";

/// Framebuffer owning a depth texture and an optional color texture
#[derive(Debug)]
pub struct FrameBuffer {
    framebuffer: FramebufferHandle,
    depth: TextureHandle,
    color: Option<TextureHandle>,
    width: u32,
    height: u32,
}

impl FrameBuffer {
    /// Depth-only framebuffer; attach a color texture before drawing color
    pub fn new(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Self {
        let framebuffer = device.create_framebuffer("framebuffer");
        let depth = device.create_texture(&TextureDesc::depth(DEPTH_LABEL, width, height));
        device.attach_texture(framebuffer, Attachment::Depth, depth, None);
        Self {
            framebuffer,
            depth,
            color: None,
            width,
            height,
        }
    }

    /// Framebuffer with a freshly created color texture attached
    pub fn with_color(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Self {
        let mut fb = Self::new(device, width, height);
        let color = device.create_texture(&TextureDesc::color(COLOR_LABEL, width, height));
        // incompleteness is logged by attach_texture
        let _ = fb.attach_texture(device, color);
        fb
    }

    /// Attach `texture` as the color target; the framebuffer takes ownership.
    /// A replaced color texture is destroyed.
    pub fn attach_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        texture: TextureHandle,
    ) -> RenderResult<()> {
        device.attach_texture(self.framebuffer, Attachment::Color, texture, None);
        if let Some(old) = self.color.replace(texture) {
            if old != texture {
                device.destroy_texture(old);
            }
        }
        self.validate(device)
    }

    /// Completeness check, logged at error level on failure
    pub fn validate(&self, device: &dyn GraphicsDevice) -> RenderResult<()> {
        let result = device.check_framebuffer(self.framebuffer);
        if let Err(err) = &result {
            log::error!("{err}");
        }
        result
    }

    /// Bind with a full-target viewport
    pub fn bind(&self, device: &mut dyn GraphicsDevice) {
        device.bind_framebuffer(Some(self.framebuffer));
        device.set_viewport(Viewport::from_size(self.width, self.height));
    }

    /// Return to the default framebuffer
    pub fn unbind(&self, device: &mut dyn GraphicsDevice) {
        device.bind_framebuffer(None);
    }

    /// Bind and clear color and depth
    pub fn clear(&self, device: &mut dyn GraphicsDevice, color: Vec4) {
        self.bind(device);
        device.clear(ClearFlags::ALL, color);
    }

    /// Resize depth storage in place and replace the color texture with a
    /// fresh one of the new size
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        device.resize_texture(self.depth, width, height);
        device.attach_texture(self.framebuffer, Attachment::Depth, self.depth, None);

        if self.color.is_some() {
            let color = device.create_texture(&TextureDesc::color(COLOR_LABEL, width, height));
            let _ = self.attach_texture(device, color);
        } else {
            let _ = self.validate(device);
        }
    }

    pub fn handle(&self) -> FramebufferHandle {
        self.framebuffer
    }

    /// Attached color texture
    pub fn texture(&self) -> Option<TextureHandle> {
        self.color
    }

    pub fn depth_texture(&self) -> TextureHandle {
        self.depth
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_texture(self.depth);
        if let Some(color) = self.color {
            device.destroy_texture(color);
        }
    }
}

/// Fixed-length sequence of render targets
#[derive(Debug)]
pub struct FrameBufferChain<T = FrameBuffer> {
    buffers: Vec<T>,
}

impl<T> FrameBufferChain<T> {
    pub fn new(buffers: Vec<T>) -> Self {
        Self { buffers }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.buffers.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.buffers.get_mut(index)
    }

    /// Replace the buffer at `index`, returning the previous one.
    /// Out of range hands `buffer` back as the error.
    pub fn set(&mut self, index: usize, buffer: T) -> Result<T, T> {
        match self.buffers.get_mut(index) {
            Some(slot) => Ok(std::mem::replace(slot, buffer)),
            None => Err(buffer),
        }
    }

    /// Shift every buffer `mid` positions toward the front
    pub fn rotate(&mut self, mid: usize) {
        if !self.buffers.is_empty() {
            let mid = mid % self.buffers.len();
            self.buffers.rotate_left(mid);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffers.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.buffers
    }
}

impl FrameBufferChain<FrameBuffer> {
    pub fn resize_buffers(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) {
        for buffer in &mut self.buffers {
            buffer.resize(device, width, height);
        }
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        for buffer in self.buffers {
            buffer.release(device);
        }
    }
}

/// Role of a buffer within a [`TrippleBuffer`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Front: what is presented
    Display,
    /// Middle: post-processing scratch, promoted to display on swap
    Edit,
    /// Back: the 3D pass renders here
    Draw,
}

impl BufferRole {
    fn index(self) -> usize {
        match self {
            BufferRole::Display => 0,
            BufferRole::Edit => 1,
            BufferRole::Draw => 2,
        }
    }
}

/// Three render targets in display / edit / draw roles
#[derive(Debug)]
pub struct TrippleBuffer<T = FrameBuffer> {
    chain: FrameBufferChain<T>,
}

impl<T> TrippleBuffer<T> {
    pub fn new(display: T, edit: T, draw: T) -> Self {
        Self {
            chain: FrameBufferChain::new(vec![display, edit, draw]),
        }
    }

    pub fn get(&self, role: BufferRole) -> &T {
        &self.chain.buffers[role.index()]
    }

    pub fn display(&self) -> &T {
        self.get(BufferRole::Display)
    }

    pub fn edit(&self) -> &T {
        self.get(BufferRole::Edit)
    }

    pub fn draw(&self) -> &T {
        self.get(BufferRole::Draw)
    }

    /// display <- edit, edit <- draw, draw <- display
    pub fn swap_buffers(&mut self) {
        self.chain.rotate(1);
    }

    pub fn chain(&self) -> &FrameBufferChain<T> {
        &self.chain
    }
}

impl TrippleBuffer<FrameBuffer> {
    /// Three color + depth targets of the given size
    pub fn create(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Self {
        Self::new(
            FrameBuffer::with_color(device, width, height),
            FrameBuffer::with_color(device, width, height),
            FrameBuffer::with_color(device, width, height),
        )
    }

    pub fn resize_buffers(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) {
        self.chain.resize_buffers(device, width, height);
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        self.chain.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::headless::HeadlessDevice;

    #[test]
    fn test_swap_rotates_roles() {
        let mut buffers = TrippleBuffer::new("a", "b", "c");
        buffers.swap_buffers();
        assert_eq!(*buffers.display(), "b");
        assert_eq!(*buffers.edit(), "c");
        assert_eq!(*buffers.draw(), "a");

        buffers.swap_buffers();
        buffers.swap_buffers();
        assert_eq!(*buffers.display(), "a");
    }

    #[test]
    fn test_chain_bounds() {
        let mut chain = FrameBufferChain::new(vec![1, 2, 3]);
        assert_eq!(chain.get(3), None);
        assert_eq!(chain.set(1, 20), Ok(2));
        assert_eq!(chain.set(5, 50), Err(50));
        assert_eq!(chain.get(1), Some(&20));

        chain.rotate(4);
        assert_eq!(chain.into_vec(), vec![20, 3, 1]);
    }

    #[test]
    fn test_with_color_is_complete() {
        let mut device = HeadlessDevice::new(64, 64);
        let fb = FrameBuffer::with_color(&mut device, 32, 16);
        assert!(fb.texture().is_some());
        assert!(fb.validate(&device).is_ok());

        fb.clear(&mut device, Vec4::new(0.2, 0.4, 0.6, 1.0));
        assert_eq!(device.viewport(), Viewport::from_size(32, 16));
        assert_eq!(device.texture_color(fb.texture().unwrap()), Some(Vec4::new(0.2, 0.4, 0.6, 1.0)));
    }

    #[test]
    fn test_attach_mismatched_texture_reports_error() {
        let mut device = HeadlessDevice::new(64, 64);
        let mut fb = FrameBuffer::new(&mut device, 32, 32);
        let wrong = device.create_texture(&TextureDesc::color("wrong", 8, 8));
        assert!(fb.attach_texture(&mut device, wrong).is_err());
    }

    #[test]
    fn test_resize_replaces_color() {
        let mut device = HeadlessDevice::new(64, 64);
        let mut fb = FrameBuffer::with_color(&mut device, 32, 32);
        let old = fb.texture().unwrap();

        fb.resize(&mut device, 64, 48);
        let new = fb.texture().unwrap();
        assert_ne!(old, new);
        assert_eq!(device.texture_size(old), None);
        assert_eq!(device.texture_size(new), Some((64, 48)));
        assert_eq!(device.texture_size(fb.depth_texture()), Some((64, 48)));
        assert!(fb.validate(&device).is_ok());
    }
}
