//! Pipeline tests for umbra_render
//!
//! These drive whole frames through the headless device: shadow allocation,
//! light upload, post-processing and presentation.

use std::cell::Cell;

use umbra_render::device::headless::HeadlessDevice;
use umbra_render::device::{GeometryHandle, ProgramDesc, ProgramHandle};
use umbra_render::post::{EffectKind, FullscreenQuad, LUMA_WEIGHTS};
use umbra_render::prelude::*;
use umbra_render::shadow::DEPTH_PROGRAM_LABEL;
use umbra_render::{LightBlock, ShadowRenderer, MAX_SHADOW_MAPS_2D, MAX_SHADOW_MAPS_CUBE};

const SOLID_VS: &str = "layout (location = 0) in vec3 aPos;\nuniform mat4 u_model;\nvoid main() { gl_Position = u_model * vec4(aPos, 1.0); }";
const SOLID_FS: &str = r#"
uniform vec4 u_color;
layout(std140) uniform LightBlock {
    vec4 header;
};
uniform sampler2D u_shadowMaps2D[4];
uniform samplerCube u_shadowMapsCube[2];
void main() {}
"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Flat-colored lit material
struct Solid {
    program: ProgramHandle,
    color: Vec4,
}

impl Material for Solid {
    fn bind(&self, frame: &mut FrameContext<'_>) {
        frame.device.use_program(self.program);
        frame
            .device
            .set_uniform(self.program, "u_color", UniformValue::Vec4(self.color));
        frame.apply_lighting(self.program);
    }
}

fn solid_program(device: &mut HeadlessDevice) -> ProgramHandle {
    device
        .create_program(&ProgramDesc {
            label: "test.solid",
            vertex: SOLID_VS,
            fragment: SOLID_FS,
        })
        .unwrap()
}

fn camera() -> Camera {
    let mut camera = Camera::perspective(60.0, 64.0, 48.0, 0.1, 100.0);
    camera.position = Vec3::new(0.0, 3.0, 10.0);
    camera.look_at(Vec3::ZERO);
    camera
}

struct Fixture {
    device: HeadlessDevice,
    core: RenderCore,
    screen: Screen,
    quad: FullscreenQuad,
    program: ProgramHandle,
}

fn fixture() -> Fixture {
    init_logging();
    let mut device = HeadlessDevice::new(64, 48);
    let mut screen = Screen::new(&mut device, 64, 48);
    screen.set_camera(camera());
    let quad = FullscreenQuad::new(&mut device);
    let program = solid_program(&mut device);
    Fixture {
        device,
        core: RenderCore::new(ShadowConfig::low_quality()),
        screen,
        quad,
        program,
    }
}

impl Fixture {
    /// One full frame drawing the quad in `color`
    fn frame(&mut self, lights: &LightList, color: Vec4) {
        let material = Solid {
            program: self.program,
            color,
        };
        {
            let mut frame = self.core.frame(&mut self.device, lights);
            self.screen.bind(&mut frame, true);
            frame.render_shadows(&self.quad, Mat4::IDENTITY, &material);
            frame.draw(&self.quad, &material);
        }
        self.screen.unbind(&mut self.device);
    }
}

/// Shadow slots never exceed the pool sizes and follow light order
#[test]
fn pipeline_shadow_pools_are_capped() {
    let mut fx = fixture();
    let mut lights = LightList::new();
    for i in 0..6 {
        lights.add(Light::directional(Vec3::new(i as f32 * 0.1, -1.0, 0.0)));
    }
    for i in 0..4 {
        lights.add(Light::point(Vec3::new(i as f32, 2.0, 0.0)));
    }

    fx.frame(&lights, Vec4::ONE);

    let shadows = &fx.core.shadows;
    let indices: Vec<i32> = (0..lights.len())
        .map(|i| shadows.shadow_data_for_light(i).shadow_map_index)
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 3, -1, -1, 0, 1, -1, -1]);
    assert_eq!(shadows.active_2d_count(), MAX_SHADOW_MAPS_2D);
    assert_eq!(shadows.active_cube_count(), MAX_SHADOW_MAPS_CUBE);
}

/// Unchanged lights across frames produce no buffer writes
#[test]
fn pipeline_unchanged_lights_are_not_rewritten() {
    let mut fx = fixture();
    let mut lights = LightList::new();
    lights.add(Light::directional(Vec3::new(-0.3, -1.0, -0.2)));
    lights.add(Light::point(Vec3::new(1.0, 2.0, 1.0)));

    fx.frame(&lights, Vec4::ONE);
    assert_eq!(fx.core.lighting.stats().writes, 1);

    fx.device.reset_stats();
    fx.frame(&lights, Vec4::ONE);
    assert_eq!(fx.device.stats().buffer_writes, 0);
    assert_eq!(fx.core.lighting.stats().skipped, 1);

    lights.get_mut(1).unwrap().intensity = 3.0;
    fx.frame(&lights, Vec4::ONE);
    assert_eq!(fx.device.stats().buffer_writes, 1);
}

/// A NaN direction uploads as straight down with one warning per upload
#[test]
fn pipeline_nan_direction_is_sanitized() {
    let mut fx = fixture();
    let mut light = Light::directional(Vec3::NEG_Y).with_shadows(false);
    light.direction = Vec3::splat(f32::NAN);
    let mut lights = LightList::new();
    lights.add(light);

    fx.frame(&lights, Vec4::ONE);

    let buffer = fx.core.lighting.buffer().unwrap();
    let block: LightBlock = bytemuck::pod_read_unaligned(fx.device.buffer_contents(buffer).unwrap());
    assert_eq!(block.lights[0].direction, [0.0, -1.0, 0.0, 0.0]);
    assert_eq!(fx.core.lighting.last_upload_warnings().len(), 1);
    assert_eq!(fx.core.lighting.stats().sanitize_warnings, 1);
}

/// Display shows the frame just composed; its texture was last frame's draw target
#[test]
fn pipeline_display_latency() {
    let mut fx = fixture();
    let lights = LightList::new();
    let colors = [
        Vec4::new(1.0, 0.0, 0.0, 1.0),
        Vec4::new(0.0, 1.0, 0.0, 1.0),
        Vec4::new(0.0, 0.0, 1.0, 1.0),
        Vec4::new(1.0, 1.0, 0.0, 1.0),
        Vec4::new(0.0, 1.0, 1.0, 1.0),
    ];

    let mut draw_targets = Vec::new();
    for color in colors {
        draw_targets.push(fx.screen.buffers().draw().texture());
        fx.frame(&lights, color);

        let display = fx.screen.display_texture();
        assert_eq!(fx.device.texture_color(display.unwrap()), Some(color));
        if draw_targets.len() >= 2 {
            assert_eq!(display, draw_targets[draw_targets.len() - 2]);
        }

        fx.screen.draw_to_window(&mut fx.device, (64, 48), true);
        assert_eq!(fx.device.window_color(), color);
    }
    assert_eq!(fx.screen.frames(), colors.len() as u64);
}

/// Grayscale output equals the luma of the 3D draw
#[test]
fn pipeline_grayscale_luma() {
    let mut fx = fixture();
    fx.screen.add_effect(EffectKind::Grayscale.create(&mut fx.device));
    let lights = LightList::new();
    let color = Vec4::new(0.9, 0.4, 0.2, 1.0);

    fx.frame(&lights, color);

    let shown = fx.device.texture_color(fx.screen.display_texture().unwrap()).unwrap();
    let luma = color.truncate().dot(LUMA_WEIGHTS);
    assert!((shown.x - luma).abs() < 1e-6);
    assert_eq!((shown.y, shown.z), (shown.x, shown.x));
}

/// Mesh whose draw re-enters the depth pass
struct ReentrantMesh<'a> {
    geometry: GeometryHandle,
    shadows: &'a ShadowRenderer,
    material: &'a Solid,
    nested_calls: Cell<u32>,
}

impl Mesh for ReentrantMesh<'_> {
    fn draw(&self, device: &mut dyn GraphicsDevice) {
        self.nested_calls.set(self.nested_calls.get() + 1);
        self.shadows
            .render_shadows(device, self, Mat4::IDENTITY, self.material);
        device.draw(self.geometry);
    }
}

/// A depth pass started from inside a depth pass draws nothing
#[test]
fn pipeline_shadow_pass_is_not_reentrant() {
    let mut fx = fixture();
    let mut lights = LightList::new();
    lights.add(Light::directional(Vec3::NEG_Y));
    fx.core
        .shadows
        .begin_frame(&mut fx.device, Some(&camera()), lights.as_slice());

    let material = Solid {
        program: fx.program,
        color: Vec4::ONE,
    };
    let mesh = ReentrantMesh {
        geometry: fx.quad.geometry(),
        shadows: &fx.core.shadows,
        material: &material,
        nested_calls: Cell::new(0),
    };

    fx.device.reset_stats();
    fx.device.clear_draw_log();
    fx.core
        .shadows
        .render_shadows(&mut fx.device, &mesh, Mat4::IDENTITY, &material);

    assert_eq!(mesh.nested_calls.get(), 1);
    assert_eq!(fx.device.stats().draw_calls, 1);
    assert_eq!(fx.device.draw_log()[0].program_label, DEPTH_PROGRAM_LABEL);
    // one bind into the slot, one restore
    assert_eq!(fx.device.stats().framebuffer_binds, 2);
    assert_eq!(fx.core.shadows.pass_state(), umbra_render::ShadowPass::Idle);
}

/// Shadow maps hold this frame's depth and are sampled from the fixed units
#[test]
fn pipeline_shadow_maps_reach_lit_programs() {
    let mut fx = fixture();
    let mut lights = LightList::new();
    lights.add(Light::spot(Vec3::new(0.0, 6.0, 0.0), Vec3::NEG_Y, 35.0).with_shadow_range(30.0));

    fx.frame(&lights, Vec4::ONE);

    let slot = &fx.core.shadows.slots_2d()[0];
    let depth = fx.device.texture_depth(slot.map().depth_texture(), None).unwrap();
    assert!(depth < 1.0);
    assert_eq!(fx.device.bound_texture(8), Some(slot.map().depth_texture()));
    assert_eq!(fx.device.sampler_units(fx.program, "u_shadowMaps2D"), Some(&[8, 9, 10, 11][..]));
}
