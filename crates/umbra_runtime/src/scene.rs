//! Demo scene: a ground slab with a ring of cubes under a lit material

use glam::{Mat4, Quat, Vec3, Vec4};
use umbra_render::device::{GeometryDesc, GeometryHandle, ProgramDesc};
use umbra_render::prelude::*;
use umbra_render::{LightType, RenderError};

pub const LIT_PROGRAM_LABEL: &str = "umbra.demo.lit";

const RECEIVE_SHADOWS_UNIFORM: &str = "u_receiveShadows";

const LIT_VS: &str = r#"#version 330 core
layout (location = 0) in vec3 aPos;
uniform mat4 u_model;
uniform mat4 u_viewProjection;
out vec3 v_worldPos;
void main() {
    vec4 world = u_model * vec4(aPos, 1.0);
    v_worldPos = world.xyz;
    gl_Position = u_viewProjection * world;
}
"#;

const LIT_FS: &str = r#"#version 330 core
in vec3 v_worldPos;
out vec4 FragColor;
uniform vec4 u_color;
uniform int u_debugShadows;
uniform int u_receiveShadows;
uniform sampler2D u_shadowMaps2D[4];
uniform samplerCube u_shadowMapsCube[2];

struct LightRecord {
    vec4 meta;
    vec4 position;
    vec4 direction;
    vec4 color;
    vec4 params;
    vec4 shadow;
    vec4 cascadeSplits;
    mat4 lightMatrices[4];
};

layout(std140) uniform LightBlock {
    vec4 header;
    LightRecord lights[16];
};

void main() {
    vec3 lit = vec3(0.0);
    int count = int(header.x);
    for (int i = 0; i < count; ++i) {
        lit += lights[i].color.rgb * lights[i].params.x;
    }
    FragColor = vec4(u_color.rgb * max(lit, vec3(0.05)), u_color.a);
}
"#;

/// Flat-colored material that reads the light block and shadow maps
#[derive(Clone, Copy, Debug)]
pub struct LitMaterial {
    pub program: ProgramHandle,
    pub color: Vec4,
    pub model: Mat4,
    pub view_projection: Mat4,
    pub receive_shadows: bool,
}

impl Material for LitMaterial {
    fn bind(&self, frame: &mut FrameContext<'_>) {
        frame.device.use_program(self.program);
        frame
            .device
            .set_uniform(self.program, "u_color", UniformValue::Vec4(self.color));
        frame
            .device
            .set_uniform(self.program, "u_model", UniformValue::Mat4(self.model));
        frame.device.set_uniform(
            self.program,
            "u_viewProjection",
            UniformValue::Mat4(self.view_projection),
        );
        if frame.device.has_uniform(self.program, RECEIVE_SHADOWS_UNIFORM) {
            frame.device.set_uniform(
                self.program,
                RECEIVE_SHADOWS_UNIFORM,
                UniformValue::Int(i32::from(self.receives_shadows())),
            );
        }
        frame.apply_lighting(self.program);
    }

    fn receives_shadows(&self) -> bool {
        self.receive_shadows
    }
}

/// One placed object
#[derive(Clone, Copy, Debug)]
pub struct SceneObject {
    pub model: Mat4,
    pub color: Vec4,
    pub receive_shadows: bool,
}

pub struct DemoScene {
    pub cube: GeometryHandle,
    pub program: ProgramHandle,
    pub objects: Vec<SceneObject>,
    orbit_light: Option<usize>,
}

impl DemoScene {
    pub fn new(device: &mut dyn GraphicsDevice, lights: &LightList) -> Result<Self, RenderError> {
        let program = device.create_program(&ProgramDesc {
            label: LIT_PROGRAM_LABEL,
            vertex: LIT_VS,
            fragment: LIT_FS,
        })?;

        let (positions, indices) = cube_geometry();
        let tex_coords = vec![[0.0, 0.0]; positions.len()];
        let cube = device.create_geometry(&GeometryDesc {
            positions: &positions,
            tex_coords: &tex_coords,
            indices: &indices,
        });

        let mut objects = vec![SceneObject {
            model: Mat4::from_scale_rotation_translation(
                Vec3::new(20.0, 0.2, 20.0),
                Quat::IDENTITY,
                Vec3::new(0.0, -0.1, 0.0),
            ),
            color: Vec4::new(0.6, 0.6, 0.55, 1.0),
            receive_shadows: true,
        }];
        for i in 0..6 {
            let angle = i as f32 / 6.0 * std::f32::consts::TAU;
            objects.push(SceneObject {
                model: Mat4::from_rotation_translation(
                    Quat::from_rotation_y(angle),
                    Vec3::new(angle.cos() * 4.0, 0.5, angle.sin() * 4.0),
                ),
                color: Vec4::new(0.3 + 0.1 * i as f32, 0.4, 0.8 - 0.1 * i as f32, 1.0),
                // every other cube ignores shadows
                receive_shadows: i % 2 == 0,
            });
        }

        let orbit_light = lights.iter().position(|light| light.kind == LightType::Point);

        Ok(Self {
            cube,
            program,
            objects,
            orbit_light,
        })
    }

    /// Move the first point light around the ring
    pub fn animate(&self, lights: &mut LightList, frame: u64) {
        let Some(index) = self.orbit_light else {
            return;
        };
        if let Some(light) = lights.get_mut(index) {
            let angle = frame as f32 * 0.05;
            light.position = Vec3::new(angle.cos() * 3.0, light.position.y, angle.sin() * 3.0);
        }
    }

    pub fn material(&self, object: &SceneObject, view_projection: Mat4) -> LitMaterial {
        LitMaterial {
            program: self.program,
            color: object.color,
            model: object.model,
            view_projection,
            receive_shadows: object.receive_shadows,
        }
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.destroy_geometry(self.cube);
        device.destroy_program(self.program);
    }
}

/// Unit cube centered on the origin
fn cube_geometry() -> (Vec<[f32; 3]>, Vec<u32>) {
    let positions = (0..8)
        .map(|i| {
            [
                if i & 1 == 0 { -0.5 } else { 0.5 },
                if i & 2 == 0 { -0.5 } else { 0.5 },
                if i & 4 == 0 { -0.5 } else { 0.5 },
            ]
        })
        .collect();
    let indices = vec![
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ];
    (positions, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_config::default_lights;

    #[test]
    fn test_scene_builds_on_headless() {
        let mut device = HeadlessDevice::new(32, 32);
        let lights: LightList = default_lights().into_iter().collect();
        let scene = DemoScene::new(&mut device, &lights).unwrap();
        assert_eq!(scene.objects.len(), 7);
        assert_eq!(scene.orbit_light, Some(2));
    }

    #[test]
    fn test_animate_moves_point_light() {
        let mut device = HeadlessDevice::new(32, 32);
        let mut lights: LightList = default_lights().into_iter().collect();
        let scene = DemoScene::new(&mut device, &lights).unwrap();
        let before = lights.get(2).unwrap().position;
        scene.animate(&mut lights, 10);
        let after = lights.get(2).unwrap().position;
        assert_ne!(before, after);
        assert_eq!(before.y, after.y);
        assert_eq!(lights.get(0).unwrap().direction, default_lights()[0].direction);
    }

    #[test]
    fn test_material_uploads_receive_shadows() {
        let mut device = HeadlessDevice::new(32, 32);
        let lights: LightList = default_lights().into_iter().collect();
        let scene = DemoScene::new(&mut device, &lights).unwrap();
        let mut core = RenderCore::new(ShadowConfig::low_quality());

        for (object, expected) in [(&scene.objects[0], 1), (&scene.objects[2], 0)] {
            let material = scene.material(object, Mat4::IDENTITY);
            let mut frame = core.frame(&mut device, &lights);
            material.bind(&mut frame);
            drop(frame);
            assert_eq!(
                device.uniform(scene.program, RECEIVE_SHADOWS_UNIFORM),
                Some(UniformValue::Int(expected))
            );
        }
    }

    #[test]
    fn test_cube_indices_in_range() {
        let (positions, indices) = cube_geometry();
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < positions.len()));
    }
}
