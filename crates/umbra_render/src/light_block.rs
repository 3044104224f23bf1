//! GPU light block layout
//!
//! std140-compatible mirror of the `LightBlock` uniform block:
//!
//! ```glsl
//! struct LightRecord {
//!     vec4 meta;          // type, shadowType, shadowMapIndex, shadowStrength
//!     vec4 position;
//!     vec4 direction;
//!     vec4 color;
//!     vec4 params;        // intensity, range, falloff, spotAngle
//!     vec4 shadow;        // bias, normalBias, cascadeCount, unused
//!     vec4 cascadeSplits;
//!     mat4 lightMatrices[4];
//! };
//!
//! layout(std140) uniform LightBlock {
//!     vec4 header;        // x = active light count
//!     LightRecord lights[16];
//! };
//! ```
//!
//! Every field is a multiple of 16 bytes, so the Rust layout matches std140
//! without padding members.

use serde::{Deserialize, Serialize};

use crate::light::MAX_LIGHTS;
use crate::shadow::MAX_CASCADES;

/// Uniform block name in shader source
pub const LIGHT_BLOCK_NAME: &str = "LightBlock";

/// Binding point the light buffer is attached to
pub const LIGHT_BLOCK_BINDING: u32 = 0;

/// One light as seen by the shader
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightRecord {
    /// type, shadow type, shadow map index, shadow strength
    pub meta: [f32; 4],
    /// xyz = world position
    pub position: [f32; 4],
    /// xyz = unit direction
    pub direction: [f32; 4],
    pub color: [f32; 4],
    /// intensity, range, falloff, spot angle (degrees)
    pub params: [f32; 4],
    /// bias, normal bias, cascade count, unused
    pub shadow: [f32; 4],
    pub cascade_splits: [f32; 4],
    /// Column-major light-space matrices, one per cascade
    pub light_matrices: [[f32; 16]; MAX_CASCADES],
}

impl LightRecord {
    pub const SIZE: usize = core::mem::size_of::<Self>();
}

/// Whole uniform block; fixed size regardless of the active light count
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightBlock {
    /// x = active light count
    pub header: [f32; 4],
    pub lights: [LightRecord; MAX_LIGHTS],
}

impl LightBlock {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Number of records the shader should read
    pub fn light_count(&self) -> usize {
        self.header[0] as usize
    }

    pub fn active(&self) -> &[LightRecord] {
        &self.lights[..self.light_count().min(MAX_LIGHTS)]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_layout() {
        assert_eq!(LightRecord::SIZE % 16, 0);
        assert_eq!(LightRecord::SIZE, 7 * 16 + MAX_CASCADES * 64);
        assert_eq!(LightBlock::SIZE, 16 + MAX_LIGHTS * LightRecord::SIZE);
    }

    #[test]
    fn test_active_slice_follows_header() {
        let mut block = LightBlock::default();
        assert!(block.active().is_empty());
        block.header[0] = 3.0;
        assert_eq!(block.active().len(), 3);
        assert_eq!(block.as_bytes().len(), LightBlock::SIZE);
    }
}
