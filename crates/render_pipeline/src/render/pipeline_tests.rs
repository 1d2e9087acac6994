//! End-to-end tests: snapshot in, command stream out, executed on a
//! headless backend.

use super::command_queue;
use super::*;
use crate::core::config::PipelineConfig;
use crate::foundation::math::{Mat4, Point3, Sphere, Vec3};
use crate::resources::{MeshData, MeshDesc, RenderMesh, ResourceManagers, ResourceState};
use crate::tasks::{Task, TaskContext, ThreadPool};
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Delays every child task by a random amount so completion order varies
struct Jitter<'a>(&'a dyn TaskContext);

impl TaskContext for Jitter<'_> {
    fn process_child_tasks(&self, tasks: Vec<Task>) {
        let mut rng = rand::thread_rng();
        let tasks = tasks
            .into_iter()
            .map(|task| {
                let delay = Duration::from_micros(rng.gen_range(0..400));
                let task: Task = Box::new(move |ctx: &dyn TaskContext| {
                    thread::sleep(delay);
                    task(&Jitter(ctx));
                });
                task
            })
            .collect();
        self.0.process_child_tasks(tasks);
    }

    fn spawn(&self, task: Task) {
        self.0.spawn(task);
    }
}

fn camera() -> RenderCamera {
    let projection = nalgebra::Perspective3::new(1.0, 1.2, 0.1, 500.0).to_homogeneous();
    RenderCamera::look_at(Point3::new(0.0, 0.0, 30.0), Point3::origin(), Vec3::y(), projection)
}

fn config() -> PipelineConfig {
    PipelineConfig::new().with_worker_threads(3)
}

struct Scene {
    managers: Arc<ResourceManagers>,
    mesh: Option<RenderMesh>,
}

impl Scene {
    fn new() -> Self {
        let managers = Arc::new(ResourceManagers::new(&config().resource_pools));
        let mesh = managers.meshes.create(MeshDesc::default(), MeshData::default());
        Self {
            managers,
            mesh: Some(mesh),
        }
    }

    fn mesh(&self) -> &RenderMesh {
        self.mesh.as_ref().unwrap()
    }

    fn object(&self, position: Vec3, material: u32, caps: PassCapabilities) -> RenderObject {
        RenderObject::mesh(
            self.mesh().id(),
            Sphere::new(Vec3::zeros(), 0.5),
            MaterialId(material),
            Mat4::new_translation(&position),
            caps,
        )
    }
}

fn lit() -> PassCapabilities {
    PassCapabilities::OPAQUE | PassCapabilities::LIT
}

fn lit_frame(scene: &Scene) -> RenderFrame {
    let mut rng = rand::thread_rng();
    let mut frame = RenderFrame::new(camera(), (640, 480));
    for index in 0..40u32 {
        let position = Vec3::new(
            rng.gen_range(-5.0..5.0),
            rng.gen_range(-5.0..5.0),
            rng.gen_range(-10.0..10.0),
        );
        let caps = if index % 3 == 0 {
            PassCapabilities::TRANSPARENT
        } else {
            lit()
        };
        frame.objects.push(scene.object(position, index % 4, caps));
    }
    frame.directional_lights.push(DirectionalLight::new(Vec3::repeat(1.0), -Vec3::y()));
    frame.directional_lights.push(DirectionalLight::new(Vec3::repeat(0.5), Vec3::x()));
    for x in [-4.0, 0.0, 4.0] {
        frame.point_lights.push(PointLight::new(
            Vec3::repeat(1.0),
            Vec3::new(x, 0.0, 0.0),
            Vec3::new(1.0, 0.5, 0.5),
        ));
    }
    frame
}

#[test]
fn test_pass_layout_does_not_depend_on_task_timing() {
    let scene = Scene::new();
    let frame = Arc::new(lit_frame(&scene));
    let pool = ThreadPool::new(4).unwrap();
    let compiler = RenderPassCompiler::new(true);

    let reference = compiler.compile_light_render_passes(&pool, &frame);
    assert_eq!(reference.passes.len(), 2 + 2 + 3);

    for _ in 0..16 {
        let group = compiler.compile_light_render_passes(&Jitter(&pool), &frame);
        assert_eq!(group, reference);
    }

    assert!(matches!(reference.passes[0].light, PassLight::Ambient(_)));
    for (pass, light) in reference.passes[1..3].iter().zip(&frame.directional_lights) {
        assert_eq!(pass.light, PassLight::Directional(light.clone()));
    }
    for (pass, light) in reference.passes[3..6].iter().zip(&frame.point_lights) {
        assert_eq!(pass.light, PassLight::Point(*light));
    }
    assert!(matches!(reference.passes[6].light, PassLight::Ambient(_)));
}

#[test]
fn test_opaque_front_to_back_transparent_back_to_front() {
    let scene = Scene::new();
    let pool = ThreadPool::new(2).unwrap();

    for _ in 0..8 {
        let frame = Arc::new(lit_frame(&scene));
        let group = RenderPassCompiler::new(false).compile_light_render_passes(&Jitter(&pool), &frame);
        let (transparent, opaque) = group.passes.split_last().unwrap();

        for pass in opaque {
            assert!(pass.objects.windows(2).all(|pair| pair[0].depth <= pair[1].depth));
        }
        assert!(transparent.objects.windows(2).all(|pair| pair[0].depth >= pair[1].depth));
    }
}

#[test]
fn test_only_opaque_objects_fill_base_pass() {
    let scene = Scene::new();
    let mut frame = RenderFrame::new(camera(), (640, 480));
    for index in 0..12u8 {
        frame.objects.push(scene.object(
            Vec3::new(0.0, 0.0, f32::from(index) - 6.0),
            0,
            PassCapabilities::OPAQUE,
        ));
    }

    let pool = ThreadPool::new(2).unwrap();
    let group = RenderPassCompiler::new(true).compile_light_render_passes(&pool, &Arc::new(frame));

    assert_eq!(group.passes.len(), 2);
    assert_eq!(group.passes[0].objects.len(), 12);
    assert!(group.passes[1].is_empty());
}

#[test]
fn test_created_mesh_loads_in_next_buffer_exactly_once() {
    let scene = Scene::new();
    let (sender, _receiver) = command_queue::channel(4);
    let mut renderer = Renderer::new(&config(), Arc::clone(&scene.managers), sender);
    let pool = ThreadPool::new(2).unwrap();

    let first = renderer.compile_snapshot(&pool, RenderSnapshot::new(camera(), (64, 64)));
    let loads: Vec<_> = first
        .iter()
        .filter_map(|command| match command {
            RenderCommand::LoadMesh(load) => Some(load.id()),
            _ => None,
        })
        .collect();
    assert_eq!(loads, vec![scene.mesh().id()]);

    let second = renderer.compile_snapshot(&pool, RenderSnapshot::new(camera(), (64, 64)));
    assert!(second.iter().all(|command| !command.is_resource_command()));
    assert_eq!(renderer.frame_index(), 2);
}

#[test]
fn test_unload_executes_once_and_releases_slot() {
    let mut scene = Scene::new();
    let (sender, _receiver) = command_queue::channel(4);
    let mut renderer = Renderer::new(&config(), Arc::clone(&scene.managers), sender);
    let pool = ThreadPool::new(2).unwrap();
    let mut backend = HeadlessBackend::new();

    let mesh = scene.mesh.take().unwrap();
    let id = mesh.id();

    let mut snapshot = RenderSnapshot::new(camera(), (64, 64));
    snapshot.add_render_object(RenderObject::mesh(
        id,
        Sphere::new(Vec3::zeros(), 1.0),
        MaterialId(0),
        Mat4::identity(),
        PassCapabilities::OPAQUE,
    ));
    renderer.compile_snapshot(&pool, snapshot).execute(&mut backend);
    assert_eq!(scene.managers.meshes.state(id), ResourceState::Loaded);

    scene.managers.meshes.destroy(mesh);
    assert!(!scene.managers.meshes.is_valid(id));

    let buffer = renderer.compile_snapshot(&pool, RenderSnapshot::new(camera(), (64, 64)));
    assert_eq!(scene.managers.meshes.live_count(), 1);
    buffer.execute(&mut backend);

    assert_eq!(backend.count(RenderCommandKind::UnloadMesh), 1);
    assert_eq!(scene.managers.meshes.live_count(), 0);
    assert_eq!(scene.managers.meshes.view().state(id), None);

    renderer
        .compile_snapshot(&pool, RenderSnapshot::new(camera(), (64, 64)))
        .execute(&mut backend);
    assert_eq!(backend.count(RenderCommandKind::UnloadMesh), 1);
}

#[test]
#[should_panic(expected = "used after destroy")]
fn test_destroyed_handle_asserts_on_access() {
    let mut scene = Scene::new();
    let mesh = scene.mesh.take().unwrap();
    let id = mesh.id();
    scene.managers.meshes.destroy(mesh);
    let _ = scene.managers.meshes.backend_data(id);
}

#[test]
fn test_failed_mesh_is_not_drawn_in_later_frames() {
    let scene = Scene::new();
    let (sender, _receiver) = command_queue::channel(4);
    let mut renderer = Renderer::new(&config(), Arc::clone(&scene.managers), sender);
    let pool = ThreadPool::new(2).unwrap();
    let mut backend = HeadlessBackend::new();
    backend.set_fail_mesh_loads(true);

    let snapshot = || {
        let mut snapshot = RenderSnapshot::new(camera(), (64, 64));
        snapshot.add_render_object(scene.object(Vec3::zeros(), 0, PassCapabilities::OPAQUE));
        snapshot
    };

    renderer.compile_snapshot(&pool, snapshot()).execute(&mut backend);
    assert_eq!(scene.managers.meshes.state(scene.mesh().id()), ResourceState::Failed);
    backend.clear_executed();

    renderer.compile_snapshot(&pool, snapshot()).execute(&mut backend);
    assert_eq!(backend.count(RenderCommandKind::RenderInstance), 0);
    assert_eq!(backend.count(RenderCommandKind::Begin), 1);
}

#[test]
fn test_backend_thread_executes_queued_frames_in_order() {
    crate::foundation::logging::init_for_tests();
    let scene = Scene::new();
    let (sender, receiver) = command_queue::channel(1);
    let mut renderer = Renderer::new(&config(), Arc::clone(&scene.managers), sender);
    let pool = ThreadPool::new(2).unwrap();

    let backend_thread = thread::spawn(move || {
        let mut backend = HeadlessBackend::new();
        let mut frames = Vec::new();
        while let Some(buffer) = receiver.pop() {
            frames.push(buffer.frame_index());
            buffer.execute(&mut backend);
        }
        (frames, backend.stats())
    });

    for _ in 0..10 {
        let mut snapshot = RenderSnapshot::new(camera(), (64, 64));
        snapshot.add_render_object(scene.object(Vec3::zeros(), 0, lit()));
        renderer.render_snapshot(&pool, snapshot).unwrap();
    }
    drop(renderer);

    let (frames, stats) = backend_thread.join().unwrap();
    assert_eq!(frames, (0..10).collect::<Vec<_>>());
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.targets, 10);
    assert_eq!(stats.draws, 10);
    assert_eq!(scene.managers.meshes.state(scene.mesh().id()), ResourceState::Loaded);
}

#[test]
fn test_recycled_buffers_render_the_same_frames() {
    let scene = Scene::new();
    let (sender, receiver) = command_queue::channel(1);
    let mut renderer = Renderer::new(&config(), Arc::clone(&scene.managers), sender);
    let pool = ThreadPool::new(2).unwrap();

    let backend_thread = thread::spawn(move || {
        let mut backend = HeadlessBackend::new();
        while receiver.execute_next(&mut backend) {}
        backend.stats()
    });

    for _ in 0..20 {
        let mut snapshot = RenderSnapshot::new(camera(), (64, 64));
        snapshot.add_render_object(scene.object(Vec3::zeros(), 0, lit()));
        snapshot.add_render_object(scene.object(Vec3::new(1.0, 0.0, 0.0), 1, lit()));
        renderer.render_snapshot(&pool, snapshot).unwrap();
    }
    drop(renderer);

    let stats = backend_thread.join().unwrap();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.targets, 20);
    assert_eq!(stats.draws, 40);
}
