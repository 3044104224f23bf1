//! Light uniform uploader
//!
//! Packs the frame's lights and their shadow allocation into a [`LightBlock`]
//! and uploads it to the uniform buffer at [`LIGHT_BLOCK_BINDING`]. The block
//! is rebuilt from scratch on every call; the GPU write is skipped when the
//! bytes match the previous upload.

use std::collections::HashMap;

use glam::{Vec3, Vec4};
use serde::Serialize;

use crate::device::{BufferHandle, GraphicsDevice, ProgramHandle};
use crate::light::{normalize_direction, Light, FALLBACK_DIRECTION, MAX_LIGHTS};
use crate::light_block::{LightBlock, LightRecord, LIGHT_BLOCK_BINDING, LIGHT_BLOCK_NAME};
use crate::shadow::{ShadowLightData, ShadowRenderer};

const FALLBACK_COLOR: Vec4 = Vec4::ONE;
const FALLBACK_INTENSITY: f32 = 1.0;
const FALLBACK_RANGE: f32 = 10.0;
const FALLBACK_FALLOFF: f32 = 2.0;
const FALLBACK_SPOT_ANGLE: f32 = 45.0;

/// Result of one upload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum UploadOutcome {
    /// The buffer was written
    Written,
    /// Identical to the previous upload; no GPU write issued
    Unchanged,
}

/// Running upload counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UploadStats {
    pub uploads: u64,
    pub writes: u64,
    pub skipped: u64,
    pub sanitize_warnings: u64,
}

/// A light whose values were replaced before packing
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SanitizeWarning {
    pub frame: u64,
    pub light_index: usize,
    /// Names of the replaced fields
    pub fields: Vec<&'static str>,
    pub raw: Light,
    pub sanitized: Light,
}

/// Packs lights into the `LightBlock` uniform buffer
#[derive(Debug, Default)]
pub struct LightUniformUploader {
    buffer: Option<BufferHandle>,
    last_block: Option<Box<LightBlock>>,
    /// Program -> declares the light block
    programs: HashMap<ProgramHandle, bool>,
    stats: UploadStats,
    warnings: Vec<SanitizeWarning>,
}

impl LightUniformUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the block for `lights` and upload it if it changed.
    ///
    /// Lights past `MAX_LIGHTS` are ignored. Non-finite light values are
    /// replaced with neutral defaults and reported with one warning per light.
    pub fn upload_lights(
        &mut self,
        device: &mut dyn GraphicsDevice,
        program: ProgramHandle,
        lights: &[Light],
        shadows: &ShadowRenderer,
        frame: u64,
    ) -> UploadOutcome {
        self.stats.uploads += 1;
        self.bind_block(device, program);

        let block = self.build_block(lights, shadows, frame);

        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => {
                let buffer = device.create_uniform_buffer(LightBlock::SIZE);
                self.buffer = Some(buffer);
                buffer
            }
        };
        device.bind_buffer_base(LIGHT_BLOCK_BINDING, buffer);

        if self
            .last_block
            .as_deref()
            .is_some_and(|last| last.as_bytes() == block.as_bytes())
        {
            self.stats.skipped += 1;
            return UploadOutcome::Unchanged;
        }

        device.write_buffer(buffer, 0, block.as_bytes());
        self.stats.writes += 1;
        self.last_block = Some(block);
        UploadOutcome::Written
    }

    fn bind_block(&mut self, device: &mut dyn GraphicsDevice, program: ProgramHandle) {
        if self.programs.contains_key(&program) {
            return;
        }
        let declared = match device.uniform_block_index(program, LIGHT_BLOCK_NAME) {
            Some(index) => {
                device.bind_uniform_block(program, index, LIGHT_BLOCK_BINDING);
                true
            }
            None => {
                log::warn!(
                    "program {} does not declare uniform block {}",
                    program.raw(),
                    LIGHT_BLOCK_NAME
                );
                false
            }
        };
        self.programs.insert(program, declared);
    }

    fn build_block(
        &mut self,
        lights: &[Light],
        shadows: &ShadowRenderer,
        frame: u64,
    ) -> Box<LightBlock> {
        self.warnings.clear();
        let mut block = Box::<LightBlock>::default();
        let count = lights.len().min(MAX_LIGHTS);
        block.header[0] = count as f32;

        for (index, raw) in lights.iter().take(MAX_LIGHTS).enumerate() {
            let (light, mut fields) = sanitize(raw);

            let mut data = shadows.shadow_data_for_light(index);
            if !data.is_finite() {
                data = ShadowLightData {
                    strength: 0.0,
                    ..Default::default()
                };
                fields.push("shadow");
            }

            if !fields.is_empty() {
                log::warn!(
                    "light sanitized: frame={} light={} fields={:?} raw={:?} sanitized={:?}",
                    frame,
                    index,
                    fields,
                    raw,
                    light
                );
                self.stats.sanitize_warnings += 1;
                self.warnings.push(SanitizeWarning {
                    frame,
                    light_index: index,
                    fields,
                    raw: *raw,
                    sanitized: light,
                });
            }

            block.lights[index] = pack_record(&light, &data);
        }
        block
    }

    /// Block of the last write, if any
    pub fn last_block(&self) -> Option<&LightBlock> {
        self.last_block.as_deref()
    }

    /// Warnings raised by the most recent upload
    pub fn last_upload_warnings(&self) -> &[SanitizeWarning] {
        &self.warnings
    }

    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    /// Force the next upload to write
    pub fn invalidate(&mut self) {
        self.last_block = None;
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(buffer) = self.buffer.take() {
            device.destroy_buffer(buffer);
        }
        self.last_block = None;
        self.programs.clear();
    }
}

/// Copy of `light` with every non-finite value replaced, plus the names of
/// the replaced fields
fn sanitize(light: &Light) -> (Light, Vec<&'static str>) {
    let mut fields = Vec::new();
    let mut out = *light;

    if !out.position.is_finite() {
        out.position = Vec3::ZERO;
        fields.push("position");
    }
    match normalize_direction(out.direction) {
        Some(direction) => out.direction = direction,
        None => {
            out.direction = FALLBACK_DIRECTION;
            fields.push("direction");
        }
    }
    if !out.color.is_finite() {
        out.color = FALLBACK_COLOR;
        fields.push("color");
    }

    let scalars: [(&'static str, &mut f32, f32); 4] = [
        ("intensity", &mut out.intensity, FALLBACK_INTENSITY),
        ("range", &mut out.range, FALLBACK_RANGE),
        ("falloff", &mut out.falloff, FALLBACK_FALLOFF),
        ("spot_angle", &mut out.spot_angle, FALLBACK_SPOT_ANGLE),
    ];
    for (name, value, fallback) in scalars {
        if !value.is_finite() {
            *value = fallback;
            fields.push(name);
        }
    }

    (out, fields)
}

fn pack_record(light: &Light, data: &ShadowLightData) -> LightRecord {
    let p = light.position;
    let d = light.direction;
    LightRecord {
        meta: [
            light.kind.as_f32(),
            data.shadow_type.as_f32(),
            data.shadow_map_index as f32,
            data.strength,
        ],
        position: [p.x, p.y, p.z, 1.0],
        direction: [d.x, d.y, d.z, 0.0],
        color: light.color.to_array(),
        params: [light.intensity, light.range, light.falloff, light.spot_angle],
        shadow: [data.bias, data.normal_bias, data.cascade_count as f32, 0.0],
        cascade_splits: data.cascade_splits.to_array(),
        light_matrices: data.light_matrices.map(|m| m.to_cols_array()),
    }
}
