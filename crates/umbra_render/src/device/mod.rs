//! Graphics device abstraction
//!
//! Every GPU operation the render core performs goes through [`GraphicsDevice`].
//! The trait mirrors a stateful immediate-mode API: one bound framebuffer, one
//! viewport, one current program and a set of texture units. Resources are
//! referenced by small copyable handles; actual storage lives in the backend.
//!
//! The trait is object safe and the core always takes `&mut dyn GraphicsDevice`,
//! so meshes, materials and post-processing effects can be written without
//! knowing which backend drives them.
//!
//! [`headless::HeadlessDevice`] is the reference backend used by the runtime
//! and the test suite.

pub mod headless;

use core::ops::BitOr;

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::error::RenderResult;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// Raw backend id
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

gpu_handle!(
    /// Handle to a 2D or cube texture
    TextureHandle
);
gpu_handle!(
    /// Handle to an offscreen framebuffer
    FramebufferHandle
);
gpu_handle!(
    /// Handle to a linked shader program
    ProgramHandle
);
gpu_handle!(
    /// Handle to a uniform buffer
    BufferHandle
);
gpu_handle!(
    /// Handle to uploaded indexed geometry
    GeometryHandle
);

/// Texture dimensionality
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureKind {
    D2,
    Cube,
}

/// Texture storage format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    Rgba8,
    Depth32Float,
}

impl TextureFormat {
    /// Check if this is a depth format
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    /// Bytes per texel
    pub fn bytes_per_pixel(&self) -> u32 {
        4
    }
}

/// Texture creation descriptor
#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub kind: TextureKind,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
}

impl TextureDesc {
    /// RGBA color target
    pub fn color(label: &'static str, width: u32, height: u32) -> Self {
        Self {
            label,
            kind: TextureKind::D2,
            format: TextureFormat::Rgba8,
            width,
            height,
        }
    }

    /// 2D depth target
    pub fn depth(label: &'static str, width: u32, height: u32) -> Self {
        Self {
            label,
            kind: TextureKind::D2,
            format: TextureFormat::Depth32Float,
            width,
            height,
        }
    }

    /// Square depth cubemap
    pub fn depth_cube(label: &'static str, size: u32) -> Self {
        Self {
            label,
            kind: TextureKind::Cube,
            format: TextureFormat::Depth32Float,
            width: size,
            height: size,
        }
    }
}

/// One face of a cubemap, in the conventional +X, -X, +Y, -Y, +Z, -Z order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Face index in `0..6`
    pub fn index(self) -> usize {
        self as usize
    }

    /// Direction the face looks down from the cube center
    pub fn direction(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Up vector used when rendering this face
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }
}

/// Framebuffer attachment point
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color,
    Depth,
}

/// Pixel rectangle in framebuffer coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Viewport covering a whole target of the given size
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// Buffers affected by a clear
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ClearFlags(u8);

impl ClearFlags {
    pub const NONE: Self = Self(0);
    pub const COLOR: Self = Self(1 << 0);
    pub const DEPTH: Self = Self(1 << 1);
    pub const ALL: Self = Self(0b11);

    /// Check if all bits of `other` are set
    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for ClearFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Fixed-function blending
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    /// `src * a + dst * (1 - a)`
    Alpha,
}

/// Value assigned to a named program uniform
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

/// Shader program sources
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramDesc {
    pub label: &'static str,
    pub vertex: &'static str,
    pub fragment: &'static str,
}

/// Indexed triangle geometry
#[derive(Clone, Copy, Debug)]
pub struct GeometryDesc<'a> {
    pub positions: &'a [[f32; 3]],
    pub tex_coords: &'a [[f32; 2]],
    pub indices: &'a [u32],
}

/// Backend capability limits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimits {
    pub max_texture_size: u32,
    pub max_cube_texture_size: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_size: 8192,
            max_cube_texture_size: 8192,
        }
    }
}

/// Stateful graphics backend
pub trait GraphicsDevice {
    /// Backend capability limits
    fn limits(&self) -> DeviceLimits;

    // Textures

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureHandle;

    /// Reallocate storage at a new size; contents become undefined
    fn resize_texture(&mut self, texture: TextureHandle, width: u32, height: u32);

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)>;

    // Framebuffers

    fn create_framebuffer(&mut self, label: &'static str) -> FramebufferHandle;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Attach a texture, or a single face of a cubemap, to a framebuffer
    fn attach_texture(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: Attachment,
        texture: TextureHandle,
        face: Option<CubeFace>,
    );

    /// Completeness validation
    fn check_framebuffer(&self, framebuffer: FramebufferHandle) -> RenderResult<()>;

    /// Bind a framebuffer; `None` is the default window framebuffer
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    fn bound_framebuffer(&self) -> Option<FramebufferHandle>;

    fn set_viewport(&mut self, viewport: Viewport);

    fn viewport(&self) -> Viewport;

    /// Clear the bound framebuffer; depth clears to 1.0
    fn clear(&mut self, flags: ClearFlags, color: Vec4);

    // Raster state

    fn set_depth_test(&mut self, enabled: bool);

    fn set_depth_write(&mut self, enabled: bool);

    fn set_color_write(&mut self, enabled: bool);

    fn set_cull_face(&mut self, enabled: bool);

    fn cull_face_enabled(&self) -> bool;

    fn set_blend(&mut self, mode: Option<BlendMode>);

    // Programs

    /// Compile and link; the error carries the driver log
    fn create_program(&mut self, desc: &ProgramDesc) -> RenderResult<ProgramHandle>;

    fn destroy_program(&mut self, program: ProgramHandle);

    fn use_program(&mut self, program: ProgramHandle);

    /// Check if the program declares a uniform with this name
    fn has_uniform(&self, program: ProgramHandle, name: &str) -> bool;

    /// Set a uniform; unknown names are ignored
    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: UniformValue);

    /// Resolve a uniform block by name
    fn uniform_block_index(&self, program: ProgramHandle, name: &str) -> Option<u32>;

    fn bind_uniform_block(&mut self, program: ProgramHandle, block_index: u32, binding: u32);

    /// Point each element of a sampler array at consecutive texture units.
    /// Returns false if the program does not declare the array.
    fn set_sampler_array(&mut self, program: ProgramHandle, name: &str, units: &[u32]) -> bool;

    // Buffers

    fn create_uniform_buffer(&mut self, size: usize) -> BufferHandle;

    fn write_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]);

    fn bind_buffer_base(&mut self, binding: u32, buffer: BufferHandle);

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // Texture units

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>);

    // Geometry

    fn create_geometry(&mut self, desc: &GeometryDesc<'_>) -> GeometryHandle;

    fn destroy_geometry(&mut self, geometry: GeometryHandle);

    /// Draw with the current program, target and raster state
    fn draw(&mut self, geometry: GeometryHandle);
}

/// Build a program, logging the driver log on failure
pub fn create_program_logged(
    device: &mut dyn GraphicsDevice,
    desc: &ProgramDesc,
) -> Option<ProgramHandle> {
    match device.create_program(desc) {
        Ok(program) => Some(program),
        Err(err) => {
            log::error!("{err}");
            None
        }
    }
}

/// Framebuffer binding and viewport captured from a device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundTarget {
    pub framebuffer: Option<FramebufferHandle>,
    pub viewport: Viewport,
}

impl BoundTarget {
    /// Capture the device's current target
    pub fn capture(device: &dyn GraphicsDevice) -> Self {
        Self {
            framebuffer: device.bound_framebuffer(),
            viewport: device.viewport(),
        }
    }

    /// Rebind the captured target
    pub fn restore(self, device: &mut dyn GraphicsDevice) {
        device.bind_framebuffer(self.framebuffer);
        device.set_viewport(self.viewport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_flags() {
        let flags = ClearFlags::COLOR | ClearFlags::DEPTH;
        assert!(flags.contains(ClearFlags::COLOR));
        assert!(flags.contains(ClearFlags::DEPTH));
        assert_eq!(flags, ClearFlags::ALL);
        assert!(!ClearFlags::DEPTH.contains(ClearFlags::COLOR));
    }

    #[test]
    fn test_cube_face_basis() {
        for face in CubeFace::ALL {
            assert!(face.direction().dot(face.up()).abs() < 1e-6);
        }
        assert_eq!(CubeFace::NegativeZ.index(), 5);
    }
}
