//! Shadow renderer
//!
//! Owns the shadow map pools and, once per frame, hands slots to the lights
//! that cast shadows. The depth pass then renders every model into each live
//! slot.

use std::cell::Cell;
use std::collections::HashSet;

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::data::ShadowLightData;
use super::map::{ShadowMap2D, ShadowMapCube};
use super::programs::{DEPTH_PROGRAM, DEPTH_VIEW_PROGRAM, DISTANCE_PROGRAM};
use super::projection::{
    directional_matrix, directional_range, finite_or_identity, local_far_plane,
    point_face_matrices, spot_matrix,
};
use super::{
    ShadowConfig, DEBUG_SHADOWS_UNIFORM, MAX_SHADOW_MAPS_2D, MAX_SHADOW_MAPS_CUBE,
    SHADOW_2D_TEXTURE_UNIT, SHADOW_CUBE_TEXTURE_UNIT, SHADOW_MAPS_2D_UNIFORM,
    SHADOW_MAPS_CUBE_UNIFORM,
};
use crate::camera::Camera;
use crate::device::{
    create_program_logged, Attachment, BoundTarget, ClearFlags, CubeFace, FramebufferHandle,
    GraphicsDevice, ProgramHandle, TextureDesc, TextureHandle, UniformValue, Viewport,
};
use crate::light::{Light, LightType, MAX_LIGHTS};
use crate::material::{Material, Mesh};
use crate::post::FullscreenQuad;

/// Whether a depth pass is in progress
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShadowPass {
    #[default]
    Idle,
    Rendering,
}

/// Shadow visualisation mode, uploaded as `u_debugShadows`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowDebugMode {
    #[default]
    Off = 0,
    /// Raw shadow map depth
    Maps = 1,
    /// Cascade index tint
    Cascades = 2,
    /// Final shadow factor
    Factor = 3,
}

impl ShadowDebugMode {
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::Maps,
            Self::Maps => Self::Cascades,
            Self::Cascades => Self::Factor,
            Self::Factor => Self::Off,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// One entry of the 2D pool
#[derive(Debug)]
pub struct ShadowSlot2D {
    map: ShadowMap2D,
    light_index: Option<usize>,
    light_matrix: Mat4,
    failed: bool,
}

impl ShadowSlot2D {
    pub fn map(&self) -> &ShadowMap2D {
        &self.map
    }

    /// Light using this slot this frame
    pub fn light_index(&self) -> Option<usize> {
        self.light_index
    }

    pub fn light_matrix(&self) -> Mat4 {
        self.light_matrix
    }

    pub fn is_live(&self) -> bool {
        self.light_index.is_some()
    }
}

/// One entry of the cube pool
#[derive(Debug)]
pub struct ShadowSlotCube {
    map: ShadowMapCube,
    light_index: Option<usize>,
    face_matrices: [Mat4; 6],
    light_position: Vec3,
    far_plane: f32,
    failed: bool,
}

impl ShadowSlotCube {
    pub fn map(&self) -> &ShadowMapCube {
        &self.map
    }

    pub fn light_index(&self) -> Option<usize> {
        self.light_index
    }

    /// Light-space matrices in `CubeFace::ALL` order
    pub fn face_matrices(&self) -> &[Mat4; 6] {
        &self.face_matrices
    }

    pub fn light_position(&self) -> Vec3 {
        self.light_position
    }

    pub fn far_plane(&self) -> f32 {
        self.far_plane
    }

    pub fn is_live(&self) -> bool {
        self.light_index.is_some()
    }
}

/// Color copy of a 2D map for debug display
struct DepthView {
    framebuffer: FramebufferHandle,
    color: TextureHandle,
    size: u32,
    quad: FullscreenQuad,
    program: Option<ProgramHandle>,
}

/// Shadow map pool allocator and depth pass
pub struct ShadowRenderer {
    config: ShadowConfig,
    enabled: bool,
    frame: u64,
    light_data: [ShadowLightData; MAX_LIGHTS],
    slots_2d: Vec<ShadowSlot2D>,
    slots_cube: Vec<ShadowSlotCube>,
    programs_built: bool,
    depth_program: Option<ProgramHandle>,
    distance_program: Option<ProgramHandle>,
    fallback_2d: Option<TextureHandle>,
    fallback_cube: Option<TextureHandle>,
    sampler_programs: HashSet<ProgramHandle>,
    debug_mode: ShadowDebugMode,
    depth_view: Option<DepthView>,
    pass: Cell<ShadowPass>,
}

impl ShadowRenderer {
    pub fn new(config: ShadowConfig) -> Self {
        Self {
            config,
            enabled: false,
            frame: 0,
            light_data: [ShadowLightData::default(); MAX_LIGHTS],
            slots_2d: Vec::with_capacity(MAX_SHADOW_MAPS_2D),
            slots_cube: Vec::with_capacity(MAX_SHADOW_MAPS_CUBE),
            programs_built: false,
            depth_program: None,
            distance_program: None,
            fallback_2d: None,
            fallback_cube: None,
            sampler_programs: HashSet::new(),
            debug_mode: ShadowDebugMode::Off,
            depth_view: None,
            pass: Cell::new(ShadowPass::Idle),
        }
    }

    /// Allocate shadow slots for this frame and clear every live map.
    ///
    /// Shadows are disabled for the frame when there is no camera, the camera
    /// is orthographic or the config turns them off. The caller's framebuffer
    /// and viewport are restored before returning.
    pub fn begin_frame(
        &mut self,
        device: &mut dyn GraphicsDevice,
        camera: Option<&Camera>,
        lights: &[Light],
    ) {
        self.frame += 1;
        self.light_data = [ShadowLightData::default(); MAX_LIGHTS];
        for slot in &mut self.slots_2d {
            slot.light_index = None;
        }
        for slot in &mut self.slots_cube {
            slot.light_index = None;
        }

        let camera = match camera {
            Some(camera) if self.config.enabled && !camera.is_orthographic() => camera,
            _ => {
                self.enabled = false;
                return;
            }
        };
        self.enabled = true;
        self.ensure_programs(device);

        let saved = BoundTarget::capture(device);
        let limits = device.limits();
        let camera_far = camera.settings().far_plane;

        for (index, light) in lights.iter().take(MAX_LIGHTS).enumerate() {
            let mut data = ShadowLightData::for_light(light);
            if light.casts_shadows {
                match light.kind {
                    LightType::Directional | LightType::Spot => {
                        let resolution = if light.kind == LightType::Directional {
                            self.config.directional_resolution
                        } else {
                            self.config.spot_resolution
                        };
                        let size = resolution.min(limits.max_texture_size);
                        if let Some(slot_index) = self.claim_2d(device, size, index) {
                            let (matrix, split) = if light.kind == LightType::Directional {
                                (
                                    directional_matrix(light, camera.position, camera_far),
                                    directional_range(light, camera_far),
                                )
                            } else {
                                (spot_matrix(light), local_far_plane(light))
                            };
                            let matrix = finite_or_identity(matrix, index, light);
                            self.slots_2d[slot_index].light_matrix = matrix;
                            data.allocate(slot_index, matrix, split);
                        }
                    }
                    LightType::Point => {
                        let size = self.config.point_resolution.min(limits.max_cube_texture_size);
                        if let Some(slot_index) = self.claim_cube(device, size, index) {
                            let far_plane = local_far_plane(light);
                            let faces = point_face_matrices(light.position, far_plane)
                                .map(|m| finite_or_identity(m, index, light));
                            let slot = &mut self.slots_cube[slot_index];
                            slot.face_matrices = faces;
                            slot.light_position = light.position;
                            slot.far_plane = far_plane;
                            data.allocate(slot_index, Mat4::IDENTITY, far_plane);
                        }
                    }
                }

                if self.config.debug_logging {
                    log::debug!(
                        "shadow allocation: frame={} light={} type={:?} map_index={}",
                        self.frame,
                        index,
                        light.kind,
                        data.shadow_map_index
                    );
                }
            }
            self.light_data[index] = data;
        }

        for slot in self.slots_2d.iter().filter(|s| s.is_live()) {
            slot.map.clear(device);
        }
        for slot in self.slots_cube.iter().filter(|s| s.is_live()) {
            slot.map.clear(device);
        }

        saved.restore(device);
    }

    /// First usable 2D slot not yet taken this frame, created on demand
    fn claim_2d(
        &mut self,
        device: &mut dyn GraphicsDevice,
        size: u32,
        light_index: usize,
    ) -> Option<usize> {
        for index in 0..MAX_SHADOW_MAPS_2D {
            if index == self.slots_2d.len() {
                let map = ShadowMap2D::new(device, size);
                let failed = !map.is_valid();
                self.slots_2d.push(ShadowSlot2D {
                    map,
                    light_index: None,
                    light_matrix: Mat4::IDENTITY,
                    failed,
                });
            }
            let slot = &mut self.slots_2d[index];
            if slot.failed || slot.is_live() {
                continue;
            }
            slot.map.resize(device, size);
            if !slot.map.is_valid() {
                slot.failed = true;
                continue;
            }
            slot.light_index = Some(light_index);
            return Some(index);
        }
        None
    }

    fn claim_cube(
        &mut self,
        device: &mut dyn GraphicsDevice,
        size: u32,
        light_index: usize,
    ) -> Option<usize> {
        for index in 0..MAX_SHADOW_MAPS_CUBE {
            if index == self.slots_cube.len() {
                let map = ShadowMapCube::new(device, size);
                let failed = !map.is_valid();
                self.slots_cube.push(ShadowSlotCube {
                    map,
                    light_index: None,
                    face_matrices: [Mat4::IDENTITY; 6],
                    light_position: Vec3::ZERO,
                    far_plane: 1.0,
                    failed,
                });
            }
            let slot = &mut self.slots_cube[index];
            if slot.failed || slot.is_live() {
                continue;
            }
            slot.map.resize(device, size);
            if !slot.map.is_valid() {
                slot.failed = true;
                continue;
            }
            slot.light_index = Some(light_index);
            return Some(index);
        }
        None
    }

    fn ensure_programs(&mut self, device: &mut dyn GraphicsDevice) {
        if self.programs_built {
            return;
        }
        self.programs_built = true;
        self.depth_program = create_program_logged(device, &DEPTH_PROGRAM);
        self.distance_program = create_program_logged(device, &DISTANCE_PROGRAM);
    }

    /// Render one model into every live shadow map.
    ///
    /// Does nothing when shadows are off for the frame, when the material
    /// does not cast shadows, or when called from inside a running depth pass.
    pub fn render_shadows(
        &self,
        device: &mut dyn GraphicsDevice,
        mesh: &dyn Mesh,
        model: Mat4,
        material: &dyn Material,
    ) {
        if !self.enabled || !material.casts_shadows() {
            return;
        }
        if self.pass.get() == ShadowPass::Rendering {
            log::trace!("nested shadow pass ignored: frame={}", self.frame);
            return;
        }
        if self.active_2d_count() == 0 && self.active_cube_count() == 0 {
            return;
        }
        self.pass.set(ShadowPass::Rendering);

        let saved = BoundTarget::capture(device);
        let cull = device.cull_face_enabled();
        device.set_cull_face(false);
        device.set_depth_test(true);
        device.set_depth_write(true);

        if let Some(program) = self.depth_program {
            device.use_program(program);
            device.set_uniform(program, "u_model", UniformValue::Mat4(model));
            for slot in self.slots_2d.iter().filter(|s| s.is_live()) {
                slot.map.bind(device);
                device.set_uniform(program, "u_lightMatrix", UniformValue::Mat4(slot.light_matrix));
                mesh.draw(device);
            }
        }

        if let Some(program) = self.distance_program {
            device.use_program(program);
            device.set_uniform(program, "u_model", UniformValue::Mat4(model));
            for slot in self.slots_cube.iter().filter(|s| s.is_live()) {
                device.set_uniform(program, "u_lightPos", UniformValue::Vec3(slot.light_position));
                device.set_uniform(program, "u_farPlane", UniformValue::Float(slot.far_plane));
                for (face, matrix) in CubeFace::ALL.into_iter().zip(slot.face_matrices) {
                    slot.map.bind_face(device, face);
                    device.set_uniform(program, "u_lightMatrix", UniformValue::Mat4(matrix));
                    mesh.draw(device);
                }
            }
        }

        device.set_cull_face(cull);
        saved.restore(device);
        self.pass.set(ShadowPass::Idle);
    }

    /// Point the program's shadow sampler arrays at the fixed shadow units and
    /// bind this frame's maps there. Unused units get a 1x1 fallback map.
    pub fn bind_shadow_samplers(&mut self, device: &mut dyn GraphicsDevice, program: ProgramHandle) {
        self.ensure_fallback_textures(device);

        if self.sampler_programs.insert(program) {
            let units_2d: [u32; MAX_SHADOW_MAPS_2D] =
                std::array::from_fn(|i| SHADOW_2D_TEXTURE_UNIT + i as u32);
            let units_cube: [u32; MAX_SHADOW_MAPS_CUBE] =
                std::array::from_fn(|i| SHADOW_CUBE_TEXTURE_UNIT + i as u32);
            let has_2d = device.set_sampler_array(program, SHADOW_MAPS_2D_UNIFORM, &units_2d);
            let has_cube = device.set_sampler_array(program, SHADOW_MAPS_CUBE_UNIFORM, &units_cube);
            if !has_2d && !has_cube {
                log::debug!("program {} declares no shadow samplers", program.raw());
            }
        }

        for i in 0..MAX_SHADOW_MAPS_2D {
            let texture = self
                .slots_2d
                .get(i)
                .filter(|s| s.is_live())
                .map(|s| s.map.depth_texture())
                .or(self.fallback_2d);
            device.bind_texture(SHADOW_2D_TEXTURE_UNIT + i as u32, texture);
        }
        for i in 0..MAX_SHADOW_MAPS_CUBE {
            let texture = self
                .slots_cube
                .get(i)
                .filter(|s| s.is_live())
                .map(|s| s.map.depth_texture())
                .or(self.fallback_cube);
            device.bind_texture(SHADOW_CUBE_TEXTURE_UNIT + i as u32, texture);
        }

        if device.has_uniform(program, DEBUG_SHADOWS_UNIFORM) {
            device.set_uniform(
                program,
                DEBUG_SHADOWS_UNIFORM,
                UniformValue::Int(self.debug_mode.as_i32()),
            );
        }
    }

    fn ensure_fallback_textures(&mut self, device: &mut dyn GraphicsDevice) {
        if self.fallback_2d.is_none() {
            self.fallback_2d = Some(device.create_texture(&TextureDesc::depth("shadow.fallback2d", 1, 1)));
        }
        if self.fallback_cube.is_none() {
            self.fallback_cube = Some(device.create_texture(&TextureDesc::depth_cube("shadow.fallback_cube", 1)));
        }
    }

    /// Copy the first live 2D map into a color texture for display.
    ///
    /// Debug only. Restores the caller's framebuffer and viewport but leaves
    /// depth testing off.
    pub fn depth_buffer(&mut self, device: &mut dyn GraphicsDevice) -> Option<TextureHandle> {
        let slot = self.slots_2d.iter().find(|s| s.is_live())?;
        let (source, size) = (slot.map.depth_texture(), slot.map.size());

        let view = self.depth_view.get_or_insert_with(|| DepthView {
            framebuffer: device.create_framebuffer("shadow.depth_view"),
            color: device.create_texture(&TextureDesc::color("shadow.depth_view", size, size)),
            size: 0,
            quad: FullscreenQuad::new(device),
            program: create_program_logged(device, &DEPTH_VIEW_PROGRAM),
        });
        if view.size != size {
            device.resize_texture(view.color, size, size);
            device.attach_texture(view.framebuffer, Attachment::Color, view.color, None);
            if let Err(err) = device.check_framebuffer(view.framebuffer) {
                log::error!("{err}");
                return None;
            }
            view.size = size;
        }
        let program = view.program?;

        let saved = BoundTarget::capture(device);
        device.bind_framebuffer(Some(view.framebuffer));
        device.set_viewport(Viewport::from_size(size, size));
        device.set_depth_test(false);
        device.clear(ClearFlags::COLOR, Vec4::ZERO);
        device.use_program(program);
        device.bind_texture(0, Some(source));
        device.set_uniform(program, "u_depthMap", UniformValue::Int(0));
        view.quad.draw(device);
        device.bind_texture(0, None);
        saved.restore(device);

        Some(view.color)
    }

    /// Shadow data for a light this frame; "no shadow" when out of range
    pub fn shadow_data_for_light(&self, index: usize) -> ShadowLightData {
        self.light_data.get(index).copied().unwrap_or_default()
    }

    /// Shadow data for every light slot this frame
    pub fn shadow_data(&self) -> &[ShadowLightData] {
        &self.light_data
    }

    /// Shadows are active for the current frame
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn shadows on or off from the next `begin_frame`
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Replace the config; map sizes follow on the next allocation
    pub fn set_config(&mut self, config: ShadowConfig) {
        self.config = config;
    }

    pub fn set_debug_logging(&mut self, enabled: bool) {
        self.config.debug_logging = enabled;
    }

    pub fn debug_mode(&self) -> ShadowDebugMode {
        self.debug_mode
    }

    pub fn set_debug_mode(&mut self, mode: ShadowDebugMode) {
        self.debug_mode = mode;
    }

    pub fn cycle_debug_mode(&mut self) -> ShadowDebugMode {
        self.debug_mode = self.debug_mode.next();
        log::info!("shadow debug mode: {:?}", self.debug_mode);
        self.debug_mode
    }

    pub fn pass_state(&self) -> ShadowPass {
        self.pass.get()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn slots_2d(&self) -> &[ShadowSlot2D] {
        &self.slots_2d
    }

    pub fn slots_cube(&self) -> &[ShadowSlotCube] {
        &self.slots_cube
    }

    pub fn active_2d_count(&self) -> usize {
        self.slots_2d.iter().filter(|s| s.is_live()).count()
    }

    pub fn active_cube_count(&self) -> usize {
        self.slots_cube.iter().filter(|s| s.is_live()).count()
    }

    /// Free every GPU resource; the renderer can be reused afterwards
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for slot in self.slots_2d.drain(..) {
            slot.map.release(device);
        }
        for slot in self.slots_cube.drain(..) {
            slot.map.release(device);
        }
        for program in [self.depth_program.take(), self.distance_program.take()]
            .into_iter()
            .flatten()
        {
            device.destroy_program(program);
        }
        for texture in [self.fallback_2d.take(), self.fallback_cube.take()]
            .into_iter()
            .flatten()
        {
            device.destroy_texture(texture);
        }
        if let Some(view) = self.depth_view.take() {
            device.destroy_framebuffer(view.framebuffer);
            device.destroy_texture(view.color);
            view.quad.release(device);
            if let Some(program) = view.program {
                device.destroy_program(program);
            }
        }
        self.programs_built = false;
        self.sampler_programs.clear();
        self.light_data = [ShadowLightData::default(); MAX_LIGHTS];
        self.enabled = false;
    }
}
