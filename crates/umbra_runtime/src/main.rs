//! Umbra Runtime
//!
//! Drives the render core headlessly: loads the boot config, builds the demo
//! scene and renders a fixed number of frames through shadows, lighting,
//! post-processing and presentation.
//!
//! ```text
//! UMBRA_FRAMES=120 UMBRA_LOG=debug umbra
//! ```

mod boot_config;
mod error;
mod scene;

use serde::Serialize;
use umbra_render::device::headless::DeviceStats;
use umbra_render::prelude::*;
use umbra_render::UploadStats;

use boot_config::BootConfig;
use error::RuntimeResult;
use scene::DemoScene;

/// Summary printed with `report = true`
#[derive(Debug, Serialize)]
struct FrameReport {
    frames: u64,
    width: u32,
    height: u32,
    shadows_enabled: bool,
    active_2d_maps: usize,
    active_cube_maps: usize,
    lighting: UploadStats,
    device: DeviceStats,
}

fn main() {
    let config = BootConfig::load();

    let filter = match &config {
        Ok(config) => config.log_level.clone(),
        Err(_) => "info".to_string(),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let result = config.and_then(run);
    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(config: BootConfig) -> RuntimeResult<()> {
    log::info!("Umbra Runtime v{}", env!("CARGO_PKG_VERSION"));
    match &config.config_path {
        Some(path) => log::info!("Loaded config from {}", path.display()),
        None => log::info!("No config file found, using defaults"),
    }

    let (width, height) = (config.window.width, config.window.height);
    // nothing reads the draw log here
    let mut device = HeadlessDevice::new(width, height).with_draw_log_capacity(0);
    let mut core = RenderCore::new(config.render.shadows.clone());
    core.shadows.set_debug_mode(config.shadow_debug);

    let mut screen = Screen::from_config(&mut device, width, height, &config.render.screen);
    let mut camera = Camera::perspective(60.0, width as f32, height as f32, 0.1, 100.0);
    camera.position = Vec3::new(0.0, 6.0, 12.0);
    camera.look_at(Vec3::ZERO);
    screen.set_camera(camera);

    let mut lights: LightList = config.lights.iter().copied().collect();
    if lights.len() < config.lights.len() {
        log::warn!(
            "{} lights configured, only the first {} are used",
            config.lights.len(),
            lights.len()
        );
    }

    let scene = DemoScene::new(&mut device, &lights)?;
    log::info!(
        "Rendering {} frames at {}x{} with {} lights and {} effects",
        config.frames,
        width,
        height,
        lights.len(),
        screen.effect_count()
    );

    for n in 0..u64::from(config.frames) {
        if config.animate {
            scene.animate(&mut lights, n);
        }
        let view_projection = screen
            .camera()
            .map(Camera::view_projection)
            .unwrap_or(Mat4::IDENTITY);

        {
            let mut frame = core.frame(&mut device, &lights);
            screen.bind(&mut frame, true);
            for object in &scene.objects {
                let material = scene.material(object, view_projection);
                frame.render_shadows(&scene.cube, object.model, &material);
            }
            for object in &scene.objects {
                let material = scene.material(object, view_projection);
                frame.draw(&scene.cube, &material);
            }
        }
        screen.unbind(&mut device);
        screen.draw_to_window(&mut device, (width, height), true);

        log::trace!(
            "Frame {}: {} 2D maps, {} cube maps",
            core.frame_count(),
            core.shadows.active_2d_count(),
            core.shadows.active_cube_count()
        );
    }

    let stats = core.lighting.stats();
    log::info!(
        "Done: {} frames, {} light uploads ({} written, {} unchanged), {} draw calls",
        screen.frames(),
        stats.uploads,
        stats.writes,
        stats.skipped,
        device.stats().draw_calls
    );

    if config.report {
        let report = FrameReport {
            frames: screen.frames(),
            width,
            height,
            shadows_enabled: core.shadows.is_enabled(),
            active_2d_maps: core.shadows.active_2d_count(),
            active_cube_maps: core.shadows.active_cube_count(),
            lighting: stats,
            device: device.stats(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    scene.release(&mut device);
    core.release(&mut device);
    screen.release(&mut device);
    Ok(())
}
