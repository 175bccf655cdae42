use std::env;
use std::fmt;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Mat4;
use log::info;
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::platform::run_on_demand::EventLoopExtRunOnDemand;
use winit::window::WindowBuilder;

use marionette_viewer::{
    rigged_column, shade_fragment, skin_mesh, swing_pose, validate_palette_binding,
    validate_projection, CameraParams, FragmentSample, LightParams, MaterialParams, PassGraph,
    PoseModel, Renderer, Scene, ShadowSchedule, SkinnedMesh, UniformBlockBuilder,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let xml = fs::read_to_string(&options.path)
        .with_context(|| format!("failed to read scene {}", options.path))?;
    let scene = Scene::from_xml(&xml).context("failed to parse scene XML")?;

    println!(
        "Loaded scene with {} objects ({} lights)",
        scene.objects.len(),
        scene.lights().len()
    );
    for object in &scene.objects {
        println!(" - {} ({})", object.name, object.object_type);
    }

    let mesh = rigged_column(8);
    let pose = PoseModel::new(mesh.bone_span());

    // The binder rejects broken configurations before any draw is issued;
    // the pipeline core itself only clamps.
    validate_palette_binding(&mesh, pose.bone_count()).context("mesh does not fit the palette")?;
    let camera = camera_from_scene(&scene, 16.0 / 9.0);
    validate_projection(camera.projection).context("camera projection is unusable")?;

    if options.summary_only {
        run_headless(&scene, &mesh, &pose)
    } else {
        match run_interactive(&scene, &mesh, &pose, options.frames) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                    );
                    run_headless(&scene, &mesh, &pose)
                } else {
                    Err(err)
                }
            }
        }
    }
}

/// One deterministic CPU frame: pose, uniforms, pass schedule and a shaded
/// fragment sample, printed for CI and display-less machines.
fn run_headless(scene: &Scene, mesh: &SkinnedMesh, pose: &PoseModel) -> Result<()> {
    let camera = camera_from_scene(scene, 16.0 / 9.0);
    let lights = lights_from_scene(scene);
    let lit = lights.iter().any(Option::is_some);

    let mut builder = UniformBlockBuilder::new(camera.view, camera.projection);
    if let Some(light) = &lights[0] {
        builder = builder.primary_light(light.view(), light.projection());
    }
    if let Some(light) = &lights[1] {
        builder = builder.secondary_light(light.view(), light.projection());
    }
    let model = figure_transform(scene);
    let block = builder.build(model);

    let graph = PassGraph::character_pipeline();
    let order: Vec<&str> = graph.order().iter().map(|pass| pass.name()).collect();
    println!("Pass schedule: {}", order.join(" -> "));

    let mut schedule = ShadowSchedule::new(lit);
    schedule.begin();
    if lit {
        schedule.finish_primary();
        schedule.finish_secondary();
    }
    println!(
        "Shadow stage: Ready (sampling {})",
        if schedule.can_sample() { "on" } else { "off" }
    );

    let palette = pose.snapshot();
    let posed = skin_mesh(&mesh.vertices, &palette);
    println!("Posed {} vertices across {} bones", posed.len(), palette.len());

    let (posed_position, posed_normal) = posed[0];
    let clip = block.projection_matrix() * block.model_view_matrix() * posed_position.extend(1.0);
    let sample = FragmentSample {
        clip_position: clip,
        posed_position,
        world_normal: block.normal_matrix() * posed_normal,
        tex_coord: mesh.vertices[0].tex_coord(),
    };
    let out = shade_fragment(
        &block,
        &sample,
        &MaterialParams::default(),
        &schedule,
        None,
        None,
    );
    println!(
        "Fragment sample: depth={:.3} light={:.2}",
        out.depth(),
        out.light_factor()
    );
    Ok(())
}

fn run_interactive(
    scene: &Scene,
    mesh: &SkinnedMesh,
    pose: &PoseModel,
    frames: Option<u64>,
) -> Result<()> {
    let mut event_loop =
        EventLoop::new().map_err(|err| WindowInitError::from_error("event loop", err))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Marionette Viewer")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let lights = lights_from_scene(scene);
    let renderer = block_on(Renderer::new(
        Arc::clone(&window),
        mesh,
        pose.bone_count(),
        lights.clone(),
        MaterialParams::default(),
    ))?;

    let mut app = AppState {
        renderer,
        scene: scene.clone(),
        pose: pose.clone(),
        lights,
        started: Instant::now(),
        frames_rendered: 0,
        frame_limit: frames,
        last_error: None,
    };

    event_loop.run_on_demand(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        if let Err(err) = app.process_event(&event, elwt) {
            app.last_error = Some(err);
            elwt.exit();
        }
    })?;

    info!("rendered {} frames", app.frames_rendered);
    if let Some(err) = app.last_error {
        return Err(err);
    }
    Ok(())
}

struct AppState {
    renderer: Renderer,
    scene: Scene,
    pose: PoseModel,
    lights: [Option<LightParams>; 2],
    started: Instant,
    frames_rendered: u64,
    frame_limit: Option<u64>,
    last_error: Option<anyhow::Error>,
}

impl AppState {
    fn process_event(
        &mut self,
        event: &Event<()>,
        elwt: &EventLoopWindowTarget<()>,
    ) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        elwt.exit();
                    }
                    WindowEvent::Resized(size) => {
                        self.renderer.resize(*size);
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.logical_key == Key::Named(NamedKey::Escape) {
                            elwt.exit();
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        self.draw_frame(elwt)?;
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                self.renderer.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn draw_frame(&mut self, elwt: &EventLoopWindowTarget<()>) -> Result<()> {
        let time = self.started.elapsed().as_secs_f32();
        self.pose
            .replace_palette(swing_pose(self.pose.bone_count(), time));
        let palette = self.pose.snapshot();

        let camera = camera_from_scene(&self.scene, self.aspect());
        let mut builder = UniformBlockBuilder::new(camera.view, camera.projection);
        if let Some(light) = &self.lights[0] {
            builder = builder.primary_light(light.view(), light.projection());
        }
        if let Some(light) = &self.lights[1] {
            builder = builder.secondary_light(light.view(), light.projection());
        }
        let block = builder.build(figure_transform(&self.scene));

        let slot = self.renderer.upload_frame(&palette, block);
        let mut schedule = ShadowSchedule::new(builder.has_light());
        if let Err(err) = self.renderer.render(slot, &mut schedule) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = self.renderer.window().inner_size();
                    self.renderer.resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    info!("Surface timeout; retrying next frame");
                }
            }
            return Ok(());
        }

        self.frames_rendered += 1;
        if let Some(limit) = self.frame_limit {
            if self.frames_rendered >= limit {
                elwt.exit();
            }
        }
        Ok(())
    }

    fn aspect(&self) -> f32 {
        let size = self.renderer.window().inner_size();
        if size.height == 0 {
            1.0
        } else {
            size.width as f32 / size.height as f32
        }
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn camera_from_scene(scene: &Scene, aspect: f32) -> CameraParams {
    let (position, target, fov) = scene
        .camera()
        .map(|camera| (camera.position, camera.target, camera.fov))
        .unwrap_or((glam::Vec3::new(0.0, 2.0, 6.0), glam::Vec3::new(0.0, 1.0, 0.0), 60.0));

    let view = Mat4::look_at_rh(position, target, glam::Vec3::Y);
    let projection = Mat4::perspective_rh(fov.to_radians(), aspect.max(0.01), 0.1, 100.0);
    CameraParams {
        view,
        projection,
        position,
    }
}

/// Lights in authoring order; the first two become the primary and
/// secondary shadow casters.
fn lights_from_scene(scene: &Scene) -> [Option<LightParams>; 2] {
    let lights = scene.lights();
    let to_params = |index: usize| {
        lights.get(index).map(|light| LightParams {
            position: light.position,
            target: light.target,
            extent: light.extent,
            near: light.near,
            far: light.far,
            resolution: light.resolution,
            color: light.color,
            intensity: light.intensity.max(0.1),
        })
    };
    [to_params(0), to_params(1)]
}

fn figure_transform(scene: &Scene) -> Mat4 {
    scene
        .figure()
        .map(|figure| figure.world_transform())
        .unwrap_or(Mat4::IDENTITY)
}

struct CliOptions {
    path: String,
    summary_only: bool,
    frames: Option<u64>,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: marionette-viewer <scene.xml> [--summary-only] [--frames N]"
            ));
        };
        let mut summary_only = false;
        let mut frames = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                "--frames" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--frames expects a count"))?;
                    frames = Some(value.parse::<u64>().context("--frames expects a number")?);
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --summary-only or --frames"
                    ));
                }
            }
        }
        Ok(Self {
            path,
            summary_only,
            frames,
        })
    }
}
