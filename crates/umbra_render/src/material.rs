//! Material and mesh contracts consumed by the render core

use crate::context::FrameContext;
use crate::device::{GeometryHandle, GraphicsDevice};

/// Something that can issue its own draw call
pub trait Mesh {
    fn draw(&self, device: &mut dyn GraphicsDevice);
}

impl Mesh for GeometryHandle {
    fn draw(&self, device: &mut dyn GraphicsDevice) {
        device.draw(*self);
    }
}

/// Surface description bound before a mesh is drawn
pub trait Material {
    /// Upload the material's own uniforms. Lit materials also call
    /// [`FrameContext::apply_lighting`] with their program.
    fn bind(&self, frame: &mut FrameContext<'_>);

    /// Participates in the shadow depth pass
    fn casts_shadows(&self) -> bool {
        true
    }

    /// Samples shadow maps when lit. The core never reads this; lit
    /// materials forward it to their own shaders.
    fn receives_shadows(&self) -> bool {
        true
    }
}
