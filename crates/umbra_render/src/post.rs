//! Post-processing
//!
//! Effects read one color texture (plus the frame's depth) and write a single
//! output framebuffer by drawing a full-screen quad. [`Screen`](crate::screen::Screen)
//! chains them in ping-pong fashion.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::device::{
    create_program_logged, ClearFlags, GeometryDesc, GeometryHandle, GraphicsDevice,
    ProgramDesc, ProgramHandle, TextureHandle, UniformValue,
};
use crate::framebuffer::FrameBuffer;
use crate::material::Mesh;

pub const SCREEN_PROGRAM_LABEL: &str = "umbra.screen";
pub const GRAYSCALE_PROGRAM_LABEL: &str = "umbra.post.grayscale";

/// Sampler uniform read by full-screen programs
pub const SCREEN_TEXTURE_UNIFORM: &str = "screenTexture";

/// Rec. 709 luma coefficients
pub const LUMA_WEIGHTS: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);

/// Vertex stage shared by every full-screen program
pub const QUAD_VERTEX_SRC: &str = r#"
#version 330 core
layout (location = 0) in vec3 aPos;
layout (location = 1) in vec2 aTexCoords;

out vec2 v_texCoords;

void main() {
    v_texCoords = aTexCoords;
    gl_Position = vec4(aPos, 1.0);
}
"#;

const SCREEN_FRAG_SRC: &str = r#"
#version 330 core
in vec2 v_texCoords;
out vec4 FragColor;

uniform sampler2D screenTexture;

void main() {
    FragColor = texture(screenTexture, v_texCoords);
}
"#;

const GRAYSCALE_FRAG_SRC: &str = r#"
#version 330 core
in vec2 v_texCoords;
out vec4 FragColor;

uniform sampler2D screenTexture;

void main() {
    vec4 color = texture(screenTexture, v_texCoords);
    float luma = dot(color.rgb, vec3(0.2126, 0.7152, 0.0722));
    FragColor = vec4(vec3(luma), color.a);
}
"#;

pub(crate) const SCREEN_PROGRAM: ProgramDesc = ProgramDesc {
    label: SCREEN_PROGRAM_LABEL,
    vertex: QUAD_VERTEX_SRC,
    fragment: SCREEN_FRAG_SRC,
};

const GRAYSCALE_PROGRAM: ProgramDesc = ProgramDesc {
    label: GRAYSCALE_PROGRAM_LABEL,
    vertex: QUAD_VERTEX_SRC,
    fragment: GRAYSCALE_FRAG_SRC,
};

/// Two triangles covering clip space
#[derive(Debug)]
pub struct FullscreenQuad {
    geometry: GeometryHandle,
}

impl FullscreenQuad {
    pub fn new(device: &mut dyn GraphicsDevice) -> Self {
        let geometry = device.create_geometry(&GeometryDesc {
            positions: &[
                [-1.0, -1.0, 0.0],
                [1.0, -1.0, 0.0],
                [1.0, 1.0, 0.0],
                [-1.0, 1.0, 0.0],
            ],
            tex_coords: &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            indices: &[0, 1, 2, 2, 3, 0],
        });
        Self { geometry }
    }

    pub fn geometry(&self) -> GeometryHandle {
        self.geometry
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.destroy_geometry(self.geometry);
    }
}

impl Mesh for FullscreenQuad {
    fn draw(&self, device: &mut dyn GraphicsDevice) {
        device.draw(self.geometry);
    }
}

/// Draw `input` through `program` into whatever target is bound
pub fn draw_textured_quad(
    device: &mut dyn GraphicsDevice,
    program: ProgramHandle,
    input: TextureHandle,
    quad: &FullscreenQuad,
) {
    device.use_program(program);
    device.bind_texture(0, Some(input));
    device.set_uniform(program, SCREEN_TEXTURE_UNIFORM, UniformValue::Int(0));
    quad.draw(device);
}

/// One stage of the post-processing stack
pub trait PostProcessingEffect {
    fn name(&self) -> &str;

    /// Render `input` into `output`. `input_depth` is the depth of the frame's
    /// 3D pass. Only `output` may be bound, cleared or drawn into.
    fn apply(
        &mut self,
        device: &mut dyn GraphicsDevice,
        input: TextureHandle,
        input_depth: TextureHandle,
        output: &FrameBuffer,
        quad: &FullscreenQuad,
    );

    /// Free GPU resources owned by the effect
    fn release(&mut self, _device: &mut dyn GraphicsDevice) {}
}

/// Replaces color with its luma
pub struct GrayscaleEffect {
    program: Option<ProgramHandle>,
    warned: bool,
}

impl GrayscaleEffect {
    pub fn new(device: &mut dyn GraphicsDevice) -> Self {
        Self {
            program: create_program_logged(device, &GRAYSCALE_PROGRAM),
            warned: false,
        }
    }
}

impl PostProcessingEffect for GrayscaleEffect {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn apply(
        &mut self,
        device: &mut dyn GraphicsDevice,
        input: TextureHandle,
        _input_depth: TextureHandle,
        output: &FrameBuffer,
        quad: &FullscreenQuad,
    ) {
        output.bind(device);
        device.set_depth_test(false);
        device.set_blend(None);
        device.clear(ClearFlags::COLOR, Vec4::ZERO);

        match self.program {
            Some(program) => draw_textured_quad(device, program, input, quad),
            None if !self.warned => {
                log::warn!("grayscale effect has no program, output left cleared");
                self.warned = true;
            }
            None => {}
        }
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(program) = self.program.take() {
            device.destroy_program(program);
        }
    }
}

/// Effects selectable from configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Grayscale,
}

impl EffectKind {
    pub fn create(self, device: &mut dyn GraphicsDevice) -> Box<dyn PostProcessingEffect> {
        match self {
            EffectKind::Grayscale => Box::new(GrayscaleEffect::new(device)),
        }
    }
}
