//! Headless reference backend
//!
//! `HeadlessDevice` implements [`GraphicsDevice`] without a GPU. Each texture
//! holds a single flat color and one depth value per face, which is enough to
//! follow an image through the shadow pass, the main pass and the
//! post-processing chain. Programs are "executed" by fragment kernels looked up
//! by program label; the core's own programs have built-in kernels and callers
//! can register more with [`HeadlessDevice::register_kernel`].
//!
//! The device also counts draws, buffer writes, clears and framebuffer binds
//! and keeps a draw log, which makes it the write-counting mock for tests.

use std::collections::HashMap;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::{
    Attachment, BlendMode, BufferHandle, ClearFlags, CubeFace, DeviceLimits, FramebufferHandle,
    GeometryDesc, GeometryHandle, GraphicsDevice, ProgramDesc, ProgramHandle, TextureDesc,
    TextureFormat, TextureHandle, TextureKind, UniformValue, Viewport,
};
use crate::error::{RenderError, RenderResult};
use crate::post::{GRAYSCALE_PROGRAM_LABEL, SCREEN_PROGRAM_LABEL};
use crate::shadow::{DEPTH_PROGRAM_LABEL, DEPTH_VIEW_PROGRAM_LABEL, DISTANCE_PROGRAM_LABEL};

/// Depth written by kernels that don't compute one
pub const DEFAULT_FRAGMENT_DEPTH: f32 = 0.5;

/// Draw log entries kept by default; older entries are dropped in bulk
pub const DEFAULT_DRAW_LOG_CAPACITY: usize = 4096;

/// What a kernel sees for one draw
pub struct KernelInput<'a> {
    /// Sample from the texture bound to unit 0
    pub texel: Texel,
    /// Uniform values set on the current program
    pub uniforms: &'a HashMap<String, UniformValue>,
}

impl KernelInput<'_> {
    pub fn vec4(&self, name: &str) -> Option<Vec4> {
        match self.uniforms.get(name) {
            Some(UniformValue::Vec4(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn vec3(&self, name: &str) -> Option<Vec3> {
        match self.uniforms.get(name) {
            Some(UniformValue::Vec3(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.uniforms.get(name) {
            Some(UniformValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn mat4(&self, name: &str) -> Option<glam::Mat4> {
        match self.uniforms.get(name) {
            Some(UniformValue::Mat4(v)) => Some(*v),
            _ => None,
        }
    }
}

/// One texture sample
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Texel {
    pub color: Vec4,
    pub depth: f32,
}

impl Default for Texel {
    fn default() -> Self {
        Self {
            color: Vec4::ZERO,
            depth: 1.0,
        }
    }
}

/// Kernel output; `None` leaves the attachment untouched
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Fragment {
    pub color: Option<Vec4>,
    pub depth: Option<f32>,
}

/// Flat fragment program
pub type Kernel = fn(&KernelInput<'_>) -> Fragment;

/// Counters for device activity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub draw_calls: u64,
    pub buffer_writes: u64,
    pub bytes_written: u64,
    pub clears: u64,
    pub framebuffer_binds: u64,
    pub programs_created: u64,
    pub textures_created: u64,
}

/// Entry in the draw log
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub program: Option<ProgramHandle>,
    pub program_label: &'static str,
    pub framebuffer: Option<FramebufferHandle>,
    pub face: Option<CubeFace>,
    pub viewport: Viewport,
}

struct HeadlessTexture {
    label: &'static str,
    kind: TextureKind,
    format: TextureFormat,
    width: u32,
    height: u32,
    color: Vec4,
    depth: [f32; 6],
}

impl HeadlessTexture {
    fn texel(&self) -> Texel {
        Texel {
            color: self.color,
            depth: self.depth[0],
        }
    }

    fn face_slot(&self, face: Option<CubeFace>) -> usize {
        match (self.kind, face) {
            (TextureKind::Cube, Some(face)) => face.index(),
            _ => 0,
        }
    }
}

#[derive(Default)]
struct HeadlessFramebuffer {
    label: &'static str,
    color: Option<TextureHandle>,
    depth: Option<(TextureHandle, Option<CubeFace>)>,
}

struct HeadlessProgram {
    label: &'static str,
    uniforms: Vec<String>,
    blocks: Vec<String>,
    values: HashMap<String, UniformValue>,
    block_bindings: HashMap<u32, u32>,
    sampler_arrays: HashMap<String, Vec<u32>>,
}

/// GPU-less [`GraphicsDevice`]
pub struct HeadlessDevice {
    limits: DeviceLimits,
    next_id: u32,
    textures: HashMap<TextureHandle, HeadlessTexture>,
    framebuffers: HashMap<FramebufferHandle, HeadlessFramebuffer>,
    programs: HashMap<ProgramHandle, HeadlessProgram>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    geometries: HashMap<GeometryHandle, usize>,
    kernels: HashMap<&'static str, Kernel>,

    bound_framebuffer: Option<FramebufferHandle>,
    viewport: Viewport,
    current_program: Option<ProgramHandle>,
    texture_units: HashMap<u32, TextureHandle>,
    buffer_bindings: HashMap<u32, BufferHandle>,
    depth_test: bool,
    depth_write: bool,
    color_write: bool,
    cull_face: bool,
    blend: Option<BlendMode>,

    window_color: Vec4,
    fail_framebuffers: bool,
    stats: DeviceStats,
    draw_log: Vec<DrawRecord>,
    draw_log_capacity: usize,
}

impl HeadlessDevice {
    /// Create a device presenting to a window of the given size
    pub fn new(window_width: u32, window_height: u32) -> Self {
        let mut device = Self {
            limits: DeviceLimits::default(),
            next_id: 1,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            geometries: HashMap::new(),
            kernels: HashMap::new(),
            bound_framebuffer: None,
            viewport: Viewport::from_size(window_width, window_height),
            current_program: None,
            texture_units: HashMap::new(),
            buffer_bindings: HashMap::new(),
            depth_test: false,
            depth_write: true,
            color_write: true,
            cull_face: true,
            blend: None,
            window_color: Vec4::ZERO,
            fail_framebuffers: false,
            stats: DeviceStats::default(),
            draw_log: Vec::new(),
            draw_log_capacity: DEFAULT_DRAW_LOG_CAPACITY,
        };
        device.register_builtin_kernels();
        device
    }

    /// Override capability limits
    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Bound the draw log; 0 turns recording off
    pub fn with_draw_log_capacity(mut self, capacity: usize) -> Self {
        self.draw_log_capacity = capacity;
        self.draw_log.truncate(capacity);
        self
    }

    fn register_builtin_kernels(&mut self) {
        self.register_kernel(SCREEN_PROGRAM_LABEL, blit_kernel);
        self.register_kernel(GRAYSCALE_PROGRAM_LABEL, grayscale_kernel);
        self.register_kernel(DEPTH_PROGRAM_LABEL, shadow_depth_kernel);
        self.register_kernel(DISTANCE_PROGRAM_LABEL, shadow_distance_kernel);
        self.register_kernel(DEPTH_VIEW_PROGRAM_LABEL, depth_view_kernel);
    }

    /// Execute programs with this label through `kernel`
    pub fn register_kernel(&mut self, label: &'static str, kernel: Kernel) {
        self.kernels.insert(label, kernel);
    }

    /// Make every completeness check fail
    pub fn set_framebuffer_failure(&mut self, fail: bool) {
        self.fail_framebuffers = fail;
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = DeviceStats::default();
    }

    /// Most recent draws, oldest first
    pub fn draw_log(&self) -> &[DrawRecord] {
        &self.draw_log
    }

    pub fn clear_draw_log(&mut self) {
        self.draw_log.clear();
    }

    /// Color last written to the default framebuffer
    pub fn window_color(&self) -> Vec4 {
        self.window_color
    }

    pub fn texture_color(&self, texture: TextureHandle) -> Option<Vec4> {
        self.textures.get(&texture).map(|t| t.color)
    }

    pub fn texture_depth(&self, texture: TextureHandle, face: Option<CubeFace>) -> Option<f32> {
        self.textures
            .get(&texture)
            .map(|t| t.depth[t.face_slot(face)])
    }

    pub fn texture_label(&self, texture: TextureHandle) -> Option<&'static str> {
        self.textures.get(&texture).map(|t| t.label)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn framebuffer_label(&self, framebuffer: FramebufferHandle) -> Option<&'static str> {
        self.framebuffers.get(&framebuffer).map(|f| f.label)
    }

    pub fn bound_texture(&self, unit: u32) -> Option<TextureHandle> {
        self.texture_units.get(&unit).copied()
    }

    pub fn buffer_binding(&self, binding: u32) -> Option<BufferHandle> {
        self.buffer_bindings.get(&binding).copied()
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        self.programs
            .get(&program)
            .and_then(|p| p.values.get(name).copied())
    }

    pub fn sampler_units(&self, program: ProgramHandle, name: &str) -> Option<&[u32]> {
        self.programs
            .get(&program)
            .and_then(|p| p.sampler_arrays.get(name))
            .map(Vec::as_slice)
    }

    pub fn block_binding(&self, program: ProgramHandle, block_index: u32) -> Option<u32> {
        self.programs
            .get(&program)
            .and_then(|p| p.block_bindings.get(&block_index).copied())
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    pub fn depth_test_enabled(&self) -> bool {
        self.depth_test
    }

    pub fn depth_write_enabled(&self) -> bool {
        self.depth_write
    }

    pub fn color_write_enabled(&self) -> bool {
        self.color_write
    }

    pub fn blend(&self) -> Option<BlendMode> {
        self.blend
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn incomplete(&self, framebuffer: FramebufferHandle, reason: &str) -> RenderError {
        RenderError::IncompleteFramebuffer {
            label: self
                .framebuffer_label(framebuffer)
                .unwrap_or("<unknown>")
                .to_string(),
            reason: reason.to_string(),
        }
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureHandle {
        let handle = TextureHandle(self.allocate_id());
        self.textures.insert(
            handle,
            HeadlessTexture {
                label: desc.label,
                kind: desc.kind,
                format: desc.format,
                width: desc.width,
                height: desc.height,
                color: Vec4::ZERO,
                depth: [1.0; 6],
            },
        );
        self.stats.textures_created += 1;
        handle
    }

    fn resize_texture(&mut self, texture: TextureHandle, width: u32, height: u32) {
        match self.textures.get_mut(&texture) {
            Some(tex) => {
                tex.width = width;
                tex.height = height;
                tex.color = Vec4::ZERO;
                tex.depth = [1.0; 6];
            }
            None => log::warn!("resize of unknown texture {}", texture.raw()),
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.texture_units.retain(|_, bound| *bound != texture);
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    fn create_framebuffer(&mut self, label: &'static str) -> FramebufferHandle {
        let handle = FramebufferHandle(self.allocate_id());
        self.framebuffers.insert(
            handle,
            HeadlessFramebuffer {
                label,
                ..Default::default()
            },
        );
        handle
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: Attachment,
        texture: TextureHandle,
        face: Option<CubeFace>,
    ) {
        let Some(fbo) = self.framebuffers.get_mut(&framebuffer) else {
            log::warn!("attach to unknown framebuffer {}", framebuffer.raw());
            return;
        };
        match attachment {
            Attachment::Color => fbo.color = Some(texture),
            Attachment::Depth => fbo.depth = Some((texture, face)),
        }
    }

    fn check_framebuffer(&self, framebuffer: FramebufferHandle) -> RenderResult<()> {
        let fbo = self
            .framebuffers
            .get(&framebuffer)
            .ok_or(RenderError::UnknownResource {
                kind: "framebuffer",
                id: framebuffer.raw(),
            })?;

        if self.fail_framebuffers {
            return Err(self.incomplete(framebuffer, "driver rejected attachment combination"));
        }

        let color = match fbo.color {
            Some(handle) => Some(
                self.textures
                    .get(&handle)
                    .ok_or_else(|| self.incomplete(framebuffer, "color attachment missing"))?,
            ),
            None => None,
        };
        let depth = match fbo.depth {
            Some((handle, _)) => Some(
                self.textures
                    .get(&handle)
                    .ok_or_else(|| self.incomplete(framebuffer, "depth attachment missing"))?,
            ),
            None => None,
        };

        match (color, depth) {
            (None, None) => Err(self.incomplete(framebuffer, "no attachments")),
            (Some(c), _) if c.format.is_depth() => {
                Err(self.incomplete(framebuffer, "depth format on color attachment"))
            }
            (_, Some(d)) if !d.format.is_depth() => {
                Err(self.incomplete(framebuffer, "color format on depth attachment"))
            }
            (Some(c), Some(d)) if (c.width, c.height) != (d.width, d.height) => {
                Err(self.incomplete(framebuffer, "attachment size mismatch"))
            }
            (_, Some(d)) if d.width == 0 || d.height == 0 => {
                Err(self.incomplete(framebuffer, "zero-sized attachment"))
            }
            _ => Ok(()),
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.bound_framebuffer = framebuffer;
        self.stats.framebuffer_binds += 1;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn clear(&mut self, flags: ClearFlags, color: Vec4) {
        self.stats.clears += 1;
        let Some(framebuffer) = self.bound_framebuffer else {
            if flags.contains(ClearFlags::COLOR) {
                self.window_color = color;
            }
            return;
        };
        let Some(fbo) = self.framebuffers.get(&framebuffer) else {
            return;
        };
        let (color_target, depth_target) = (fbo.color, fbo.depth);

        if flags.contains(ClearFlags::COLOR) {
            if let Some(tex) = color_target.and_then(|h| self.textures.get_mut(&h)) {
                tex.color = color;
            }
        }
        if flags.contains(ClearFlags::DEPTH) {
            if let Some((handle, face)) = depth_target {
                if let Some(tex) = self.textures.get_mut(&handle) {
                    let slot = tex.face_slot(face);
                    tex.depth[slot] = 1.0;
                }
            }
        }
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.depth_write = enabled;
    }

    fn set_color_write(&mut self, enabled: bool) {
        self.color_write = enabled;
    }

    fn set_cull_face(&mut self, enabled: bool) {
        self.cull_face = enabled;
    }

    fn cull_face_enabled(&self) -> bool {
        self.cull_face
    }

    fn set_blend(&mut self, mode: Option<BlendMode>) {
        self.blend = mode;
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> RenderResult<ProgramHandle> {
        for (stage, source) in [("vertex", desc.vertex), ("fragment", desc.fragment)] {
            if !source.contains("void main") {
                return Err(RenderError::ShaderCompile {
                    label: desc.label.to_string(),
                    log: format!("{stage} stage: ERROR: 0:1: 'main' : function not defined"),
                });
            }
        }

        let mut uniforms = Vec::new();
        let mut blocks = Vec::new();
        reflect_uniforms(desc.vertex, &mut uniforms, &mut blocks);
        reflect_uniforms(desc.fragment, &mut uniforms, &mut blocks);

        let handle = ProgramHandle(self.allocate_id());
        self.programs.insert(
            handle,
            HeadlessProgram {
                label: desc.label,
                uniforms,
                blocks,
                values: HashMap::new(),
                block_bindings: HashMap::new(),
                sampler_arrays: HashMap::new(),
            },
        );
        self.stats.programs_created += 1;
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
    }

    fn has_uniform(&self, program: ProgramHandle, name: &str) -> bool {
        self.programs
            .get(&program)
            .is_some_and(|p| p.uniforms.iter().any(|u| u == name))
    }

    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: UniformValue) {
        if let Some(p) = self.programs.get_mut(&program) {
            if p.uniforms.iter().any(|u| u == name) {
                p.values.insert(name.to_string(), value);
            }
        }
    }

    fn uniform_block_index(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs
            .get(&program)?
            .blocks
            .iter()
            .position(|b| b == name)
            .map(|index| index as u32)
    }

    fn bind_uniform_block(&mut self, program: ProgramHandle, block_index: u32, binding: u32) {
        if let Some(p) = self.programs.get_mut(&program) {
            p.block_bindings.insert(block_index, binding);
        }
    }

    fn set_sampler_array(&mut self, program: ProgramHandle, name: &str, units: &[u32]) -> bool {
        let Some(p) = self.programs.get_mut(&program) else {
            return false;
        };
        if !p.uniforms.iter().any(|u| u == name) {
            return false;
        }
        p.sampler_arrays.insert(name.to_string(), units.to_vec());
        true
    }

    fn create_uniform_buffer(&mut self, size: usize) -> BufferHandle {
        let handle = BufferHandle(self.allocate_id());
        self.buffers.insert(handle, vec![0; size]);
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) {
        let Some(storage) = self.buffers.get_mut(&buffer) else {
            log::warn!("write to unknown buffer {}", buffer.raw());
            return;
        };
        let end = offset + data.len();
        if end > storage.len() {
            log::error!(
                "buffer write out of range: buffer={} end={} size={}",
                buffer.raw(),
                end,
                storage.len()
            );
            return;
        }
        storage[offset..end].copy_from_slice(data);
        self.stats.buffer_writes += 1;
        self.stats.bytes_written += data.len() as u64;
    }

    fn bind_buffer_base(&mut self, binding: u32, buffer: BufferHandle) {
        self.buffer_bindings.insert(binding, buffer);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        self.buffer_bindings.retain(|_, bound| *bound != buffer);
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        match texture {
            Some(texture) => {
                self.texture_units.insert(unit, texture);
            }
            None => {
                self.texture_units.remove(&unit);
            }
        }
    }

    fn create_geometry(&mut self, desc: &GeometryDesc<'_>) -> GeometryHandle {
        let handle = GeometryHandle(self.allocate_id());
        self.geometries.insert(handle, desc.indices.len());
        handle
    }

    fn destroy_geometry(&mut self, geometry: GeometryHandle) {
        self.geometries.remove(&geometry);
    }

    fn draw(&mut self, geometry: GeometryHandle) {
        if !self.geometries.contains_key(&geometry) {
            log::warn!("draw of unknown geometry {}", geometry.raw());
            return;
        }
        self.stats.draw_calls += 1;

        let texel = self
            .texture_units
            .get(&0)
            .and_then(|handle| self.textures.get(handle))
            .map(HeadlessTexture::texel)
            .unwrap_or_default();

        let program = self.current_program.and_then(|p| self.programs.get(&p));
        let label = program.map_or("", |p| p.label);
        let kernel = self.kernels.get(label).copied().unwrap_or(default_kernel);
        let empty = HashMap::new();
        let fragment = kernel(&KernelInput {
            texel,
            uniforms: program.map_or(&empty, |p| &p.values),
        });

        let (color_target, depth_target) = match self.bound_framebuffer {
            Some(fb) => match self.framebuffers.get(&fb) {
                Some(fbo) => (fbo.color, fbo.depth),
                None => (None, None),
            },
            None => (None, None),
        };

        if self.color_write {
            if let Some(color) = fragment.color {
                match (self.bound_framebuffer, color_target) {
                    (None, _) => self.window_color = color,
                    (Some(_), Some(handle)) => {
                        if let Some(tex) = self.textures.get_mut(&handle) {
                            tex.color = color;
                        }
                    }
                    (Some(_), None) => {}
                }
            }
        }
        if self.depth_write {
            if let (Some(depth), Some((handle, face))) = (fragment.depth, depth_target) {
                if let Some(tex) = self.textures.get_mut(&handle) {
                    let slot = tex.face_slot(face);
                    // depth test keeps the nearest fragment
                    if !self.depth_test || depth <= tex.depth[slot] {
                        tex.depth[slot] = depth;
                    }
                }
            }
        }

        self.record_draw(DrawRecord {
            program: self.current_program,
            program_label: label,
            framebuffer: self.bound_framebuffer,
            face: depth_target.and_then(|(_, face)| face),
            viewport: self.viewport,
        });
    }
}

impl HeadlessDevice {
    fn record_draw(&mut self, record: DrawRecord) {
        let capacity = self.draw_log_capacity;
        if capacity == 0 {
            return;
        }
        if self.draw_log.len() >= capacity {
            let keep = capacity / 2;
            self.draw_log.drain(..self.draw_log.len() - keep);
        }
        self.draw_log.push(record);
    }
}

/// Collect `uniform` declarations from GLSL source
fn reflect_uniforms(source: &str, uniforms: &mut Vec<String>, blocks: &mut Vec<String>) {
    for line in source.lines() {
        let line = line.trim();
        if line.starts_with("//") {
            continue;
        }
        let Some(pos) = line.find("uniform ") else {
            continue;
        };
        let mut tokens = line[pos + "uniform ".len()..]
            .split_whitespace()
            .skip_while(|t| matches!(*t, "highp" | "mediump" | "lowp"));
        let Some(first) = tokens.next() else {
            continue;
        };
        match tokens.next() {
            None | Some("{") => {
                let name = first.trim_end_matches('{');
                if !blocks.iter().any(|b| b == name) {
                    blocks.push(name.to_string());
                }
            }
            Some(declarator) => {
                let name = declarator
                    .split(|c: char| c == '[' || c == ';')
                    .next()
                    .unwrap_or(declarator);
                if !uniforms.iter().any(|u| u == name) {
                    uniforms.push(name.to_string());
                }
            }
        }
    }
}

fn default_kernel(input: &KernelInput<'_>) -> Fragment {
    Fragment {
        color: Some(input.vec4("u_color").unwrap_or(input.texel.color)),
        depth: Some(DEFAULT_FRAGMENT_DEPTH),
    }
}

fn blit_kernel(input: &KernelInput<'_>) -> Fragment {
    Fragment {
        color: Some(input.texel.color),
        depth: None,
    }
}

fn grayscale_kernel(input: &KernelInput<'_>) -> Fragment {
    let c = input.texel.color;
    let luma = c.truncate().dot(crate::post::LUMA_WEIGHTS);
    Fragment {
        color: Some(Vec4::new(luma, luma, luma, c.w)),
        depth: None,
    }
}

/// Depth of the model origin in light clip space
fn shadow_depth_kernel(input: &KernelInput<'_>) -> Fragment {
    let model = input.mat4("u_model").unwrap_or_default();
    let light = input.mat4("u_lightMatrix").unwrap_or_default();
    let clip = light * model * Vec4::W;
    let depth = if clip.w.abs() > f32::EPSILON {
        (clip.z / clip.w) * 0.5 + 0.5
    } else {
        DEFAULT_FRAGMENT_DEPTH
    };
    Fragment {
        color: None,
        depth: Some(depth.clamp(0.0, 1.0)),
    }
}

/// Linear distance of the model origin from the light
fn shadow_distance_kernel(input: &KernelInput<'_>) -> Fragment {
    let model = input.mat4("u_model").unwrap_or_default();
    let light_pos = input.vec3("u_lightPos").unwrap_or_default();
    let far = input.float("u_farPlane").unwrap_or(1.0).max(f32::EPSILON);
    let distance = model.w_axis.truncate().distance(light_pos);
    Fragment {
        color: None,
        depth: Some((distance / far).clamp(0.0, 1.0)),
    }
}

fn depth_view_kernel(input: &KernelInput<'_>) -> Fragment {
    let d = input.texel.depth;
    Fragment {
        color: Some(Vec4::new(d, d, d, 1.0)),
        depth: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLID_VS: &str = "void main() { gl_Position = vec4(0.0); }";
    const SOLID_FS: &str = "uniform vec4 u_color;\nlayout(std140) uniform LightBlock {\n vec4 header;\n};\nuniform sampler2D u_maps[4];\nvoid main() {}";

    fn quad(device: &mut HeadlessDevice) -> GeometryHandle {
        device.create_geometry(&GeometryDesc {
            positions: &[[0.0; 3]; 3],
            tex_coords: &[[0.0; 2]; 3],
            indices: &[0, 1, 2],
        })
    }

    #[test]
    fn test_reflection() {
        let mut uniforms = Vec::new();
        let mut blocks = Vec::new();
        reflect_uniforms(SOLID_FS, &mut uniforms, &mut blocks);
        assert_eq!(uniforms, vec!["u_color".to_string(), "u_maps".to_string()]);
        assert_eq!(blocks, vec!["LightBlock".to_string()]);
    }

    #[test]
    fn test_compile_failure_carries_log() {
        let mut device = HeadlessDevice::new(4, 4);
        let result = device.create_program(&ProgramDesc {
            label: "broken",
            vertex: SOLID_VS,
            fragment: "out vec4 color;",
        });
        match result {
            Err(RenderError::ShaderCompile { label, log }) => {
                assert_eq!(label, "broken");
                assert!(log.contains("fragment"));
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_draw_writes_bound_color_target() {
        let mut device = HeadlessDevice::new(4, 4);
        let program = device
            .create_program(&ProgramDesc {
                label: "solid",
                vertex: SOLID_VS,
                fragment: SOLID_FS,
            })
            .unwrap();
        let color = device.create_texture(&TextureDesc::color("c", 4, 4));
        let depth = device.create_texture(&TextureDesc::depth("d", 4, 4));
        let fb = device.create_framebuffer("fb");
        device.attach_texture(fb, Attachment::Color, color, None);
        device.attach_texture(fb, Attachment::Depth, depth, None);
        assert!(device.check_framebuffer(fb).is_ok());

        let geometry = quad(&mut device);
        device.bind_framebuffer(Some(fb));
        device.use_program(program);
        device.set_uniform(program, "u_color", UniformValue::Vec4(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        device.draw(geometry);

        assert_eq!(device.texture_color(color), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        assert_eq!(device.texture_depth(depth, None), Some(DEFAULT_FRAGMENT_DEPTH));
        assert_eq!(device.stats().draw_calls, 1);
        assert_eq!(device.draw_log()[0].framebuffer, Some(fb));
    }

    #[test]
    fn test_framebuffer_size_mismatch_is_incomplete() {
        let mut device = HeadlessDevice::new(4, 4);
        let color = device.create_texture(&TextureDesc::color("c", 8, 8));
        let depth = device.create_texture(&TextureDesc::depth("d", 4, 4));
        let fb = device.create_framebuffer("fb");
        device.attach_texture(fb, Attachment::Depth, depth, None);
        assert!(device.check_framebuffer(fb).is_ok());
        device.attach_texture(fb, Attachment::Color, color, None);
        assert!(matches!(
            device.check_framebuffer(fb),
            Err(RenderError::IncompleteFramebuffer { .. })
        ));
    }

    #[test]
    fn test_forced_framebuffer_failure() {
        let mut device = HeadlessDevice::new(4, 4);
        let depth = device.create_texture(&TextureDesc::depth("d", 4, 4));
        let fb = device.create_framebuffer("fb");
        device.attach_texture(fb, Attachment::Depth, depth, None);
        device.set_framebuffer_failure(true);
        assert!(device.check_framebuffer(fb).is_err());
    }

    #[test]
    fn test_buffer_writes_counted() {
        let mut device = HeadlessDevice::new(4, 4);
        let buffer = device.create_uniform_buffer(16);
        device.write_buffer(buffer, 0, &[1; 16]);
        device.write_buffer(buffer, 8, &[2; 16]);
        assert_eq!(device.stats().buffer_writes, 1);
        assert_eq!(device.buffer_contents(buffer).unwrap()[0], 1);
    }

    #[test]
    fn test_draw_log_is_bounded() {
        let mut device = HeadlessDevice::new(4, 4).with_draw_log_capacity(8);
        let geometry = quad(&mut device);
        let fb = device.create_framebuffer("fb");
        for i in 0..20 {
            device.bind_framebuffer(if i == 19 { Some(fb) } else { None });
            device.draw(geometry);
        }
        assert!(device.draw_log().len() <= 8);
        assert_eq!(device.draw_log().last().unwrap().framebuffer, Some(fb));
        assert_eq!(device.stats().draw_calls, 20);

        let mut silent = HeadlessDevice::new(4, 4).with_draw_log_capacity(0);
        let geometry = quad(&mut silent);
        silent.draw(geometry);
        assert!(silent.draw_log().is_empty());
        assert_eq!(silent.stats().draw_calls, 1);
    }

    #[test]
    fn test_cube_face_depth_is_per_face() {
        let mut device = HeadlessDevice::new(4, 4);
        let cube = device.create_texture(&TextureDesc::depth_cube("cube", 4));
        let fb = device.create_framebuffer("fb");
        let geometry = quad(&mut device);
        device.attach_texture(fb, Attachment::Depth, cube, Some(CubeFace::NegativeY));
        device.bind_framebuffer(Some(fb));
        device.draw(geometry);

        assert_eq!(device.texture_depth(cube, Some(CubeFace::NegativeY)), Some(DEFAULT_FRAGMENT_DEPTH));
        assert_eq!(device.texture_depth(cube, Some(CubeFace::PositiveX)), Some(1.0));
    }
}
