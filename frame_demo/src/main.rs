//! Headless frame demo
//!
//! Drives the render pipeline for a fixed number of ticks: a lit scene of
//! meshes under a skybox, a sprite, a particle effect and a UI overlay,
//! compiled on the task pool and executed by a headless backend on its own
//! thread.
//!
//! Usage: `frame_demo [config.toml|config.ron] [frames]`

use render_pipeline::prelude::*;
use render_pipeline::render::RenderCommandReceiver;
use render_pipeline::resources::{PolygonType, SpriteVertex, StaticVertex};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use thiserror::Error;

const DEFAULT_FRAMES: u32 = 120;
const TICK: f32 = 1.0 / 60.0;
const RESOLUTION: (u32, u32) = (1280, 720);

#[derive(Error, Debug)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task pool error: {0}")]
    Tasks(#[from] render_pipeline::tasks::TaskError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Invalid frame count: {0}")]
    FrameCount(String),

    #[error("Backend thread panicked")]
    BackendPanicked,
}

fn cube_mesh() -> DynamicMesh {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::x(), Vec3::y(), Vec3::z()),
        (-Vec3::x(), Vec3::z(), Vec3::y()),
        (Vec3::y(), Vec3::z(), Vec3::x()),
        (-Vec3::y(), Vec3::x(), Vec3::z()),
        (Vec3::z(), Vec3::x(), Vec3::y()),
        (-Vec3::z(), Vec3::y(), Vec3::x()),
    ];

    for (normal, u, v) in faces {
        #[allow(clippy::cast_possible_truncation)]
        let base = vertices.len() as u16;
        for (du, dv) in [(-0.5_f32, -0.5_f32), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let position = normal * 0.5 + u * du + v * dv;
            vertices.push(StaticVertex {
                position: position.into(),
                normal: normal.into(),
                uv: [du + 0.5, dv + 0.5],
            });
        }
        indices.extend([0, 1, 2, 0, 2, 3].map(|index| base + index));
    }

    DynamicMesh::from_vertices(PolygonType::TriangleList, &vertices, &indices)
}

fn sprite_mesh(colour: [u8; 4]) -> DynamicMesh {
    let corners = [
        ([-0.5, -0.5], [0.0, 1.0]),
        ([0.5, -0.5], [1.0, 1.0]),
        ([0.5, 0.5], [1.0, 0.0]),
        ([-0.5, 0.5], [0.0, 0.0]),
    ];
    let vertices: Vec<SpriteVertex> = corners
        .iter()
        .map(|&([x, y], uv)| SpriteVertex {
            position: [x, y, 0.0],
            uv,
            colour,
        })
        .collect();
    DynamicMesh::from_vertices(PolygonType::TriangleList, &vertices, &[0, 1, 2, 0, 2, 3])
}

fn load_config() -> Result<PipelineConfig, DemoError> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading pipeline configuration from {path}");
            Ok(PipelineConfig::load_from_file(Path::new(&path))?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn frame_count() -> Result<u32, DemoError> {
    std::env::args().nth(2).map_or(Ok(DEFAULT_FRAMES), |arg| {
        arg.parse().map_err(|_| DemoError::FrameCount(arg))
    })
}

fn spawn_backend(receiver: RenderCommandReceiver) -> thread::JoinHandle<render_pipeline::render::BackendStats> {
    thread::spawn(move || {
        let mut backend = HeadlessBackend::new();
        while receiver.execute_next(&mut backend) {}
        backend.stats()
    })
}

#[allow(clippy::cast_precision_loss)]
fn run() -> Result<(), DemoError> {
    let config = load_config()?;
    let frames = frame_count()?;

    let pool = ThreadPool::new(config.worker_threads)?;
    let managers = Arc::new(ResourceManagers::new(&config.resource_pools));
    let (sender, receiver) = command_queue::channel(config.command_queue_capacity);
    let backend_thread = spawn_backend(receiver);
    let mut renderer = Renderer::new(&config, Arc::clone(&managers), sender);

    let cube = cube_mesh();
    let cube_handle: RenderMesh = managers.meshes.create(
        cube.desc(),
        MeshData {
            vertices: cube.vertex_bytes().to_vec(),
            indices: cube.index_bytes().to_vec(),
        },
    );
    let shader: RenderShader = managers.shaders.create(
        render_pipeline::resources::ShaderDesc::new("lit"),
        render_pipeline::resources::ShaderData::new("void main() {}", "void main() {}"),
    );

    let sprite = Arc::new(sprite_mesh([255, 200, 80, 255]));
    let badge = Arc::new(sprite_mesh([255, 255, 255, 255]));

    let mut effect = ParticleEffect::new(Arc::new(ParticleEffectDesc {
        max_particles: 256,
        emission_rate: 60.0,
        ..ParticleEffectDesc::default()
    }));
    effect.set_world(Mat4::new_translation(&Vec3::new(0.0, -2.0, 0.0)));
    effect.play();

    let projection = Mat4::new_perspective(
        RESOLUTION.0 as f32 / RESOLUTION.1 as f32,
        std::f32::consts::FRAC_PI_4,
        0.1,
        200.0,
    );
    let camera = RenderCamera::look_at(
        Point3::new(0.0, 4.0, 20.0),
        Point3::origin(),
        Vec3::y(),
        projection,
    );
    let lit = PassCapabilities::OPAQUE | PassCapabilities::LIT | PassCapabilities::CASTS_SHADOWS;

    log::info!("Rendering {frames} frames on {} workers", pool.worker_count());
    for tick in 0..frames {
        let time = tick as f32 * TICK;
        effect.update(&pool, TICK);

        let mut snapshot = RenderSnapshot::new(camera.clone(), RESOLUTION);
        snapshot.set_clear_colour(Colour::new(0.02, 0.02, 0.05, 1.0));
        snapshot.add_directional_light(DirectionalLight::new(Vec3::repeat(0.8), Vec3::new(-0.3, -1.0, -0.2)));
        snapshot.add_point_light(PointLight::new(
            Vec3::new(1.0, 0.4, 0.2),
            Vec3::new(3.0 * time.cos(), 1.0, 3.0 * time.sin()),
            Vec3::new(1.0, 0.2, 0.05),
        ));

        for index in 0..16u8 {
            let angle = f32::from(index) / 16.0 * std::f32::consts::TAU + time;
            let world = Mat4::new_translation(&Vec3::new(6.0 * angle.cos(), 0.0, 6.0 * angle.sin()));
            snapshot.add_render_object(RenderObject::mesh(
                cube_handle.id(),
                cube.bounding_sphere(),
                MaterialId(u32::from(index % 3)),
                world,
                lit,
            ));
        }

        snapshot.add_render_object(
            RenderObject::mesh(
                cube_handle.id(),
                cube.bounding_sphere(),
                MaterialId(30),
                Mat4::new_scaling(100.0),
                PassCapabilities::OPAQUE,
            )
            .with_layer(RenderLayer::Skybox),
        );
        snapshot.add_render_object(RenderObject::sprite(
            Arc::clone(&sprite),
            MaterialId(10),
            Mat4::new_translation(&Vec3::new(0.0, 3.0, 0.0)),
            PassCapabilities::TRANSPARENT,
        ));
        if let Some(particles) = effect.render_object(&camera, MaterialId(11), PassCapabilities::TRANSPARENT) {
            snapshot.add_render_object(particles);
        }
        snapshot.add_render_object(
            RenderObject::sprite(
                Arc::clone(&badge),
                MaterialId(20),
                Mat4::new_translation(&Vec3::new(64.0, 64.0, 0.0)).prepend_scaling(32.0),
                PassCapabilities::TRANSPARENT,
            )
            .with_layer(RenderLayer::Ui),
        );

        renderer.render_snapshot(&pool, snapshot)?;
    }

    effect.stop();
    managers.meshes.destroy(cube_handle);
    managers.shaders.destroy(shader);
    // One more frame so the unloads reach the backend
    renderer.render_snapshot(&pool, RenderSnapshot::new(camera, RESOLUTION))?;
    drop(renderer);

    let stats = backend_thread.join().map_err(|_| DemoError::BackendPanicked)?;
    log::info!(
        "Backend executed {} draws over {} targets; {} loads, {} unloads, {} dynamic vertices",
        stats.draws,
        stats.targets,
        stats.loads,
        stats.unloads,
        stats.dynamic_vertices
    );
    Ok(())
}

fn main() {
    render_pipeline::foundation::logging::init();

    if let Err(error) = run() {
        log::error!("{error}");
        std::process::exit(1);
    }
}
