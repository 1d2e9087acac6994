//! # Render Command Compiler
//!
//! Translates target render pass groups into a [`RenderCommandBuffer`].
//!
//! ## Buffer Layout
//!
//! ```text
//! [pre-render]                         loads, only if any
//! per target:
//!   [Begin | BeginWithTarget]
//!   per camera group with objects:
//!     [ApplyCamera]
//!     [pass]...                        one list per non-empty pass
//!   [End]
//! [post-render]                        unloads, only if any
//! ```
//!
//! Every non-empty pass is compiled in its own child task into a
//! pre-assigned slot, so the list order never depends on task timing.
//!
//! ## Redundant State
//!
//! Within a pass, material, mesh and animation bindings are only emitted
//! when they change. The batcher is flushed before any binding change it
//! could otherwise draw across.

use super::batcher::SmallMeshBatcher;
use super::commands::{RenderCommand, RenderCommandBuffer, RenderCommandList};
use super::frame::{RenderFrame, RenderTarget};
use super::pass::{RenderPass, TargetRenderPassGroup};
use super::render_object::{MaterialId, RenderObjectKind, SkinnedAnimation};
use crate::core::config::BatchConfig;
use crate::resources::{Mesh, MeshId, ResourceView};
use crate::tasks::{join_all, TaskContext};
use std::sync::Arc;

/// Bindings currently in effect while compiling a pass
#[derive(Default)]
struct BoundState<'a> {
    material: Option<MaterialId>,
    mesh: Option<MeshId>,
    animation: Option<&'a Arc<SkinnedAnimation>>,
}

/// Compiles pass groups into backend command lists
#[derive(Clone)]
pub struct RenderCommandCompiler {
    batching: BatchConfig,
    meshes: ResourceView<Mesh>,
}

impl RenderCommandCompiler {
    /// Create a compiler that checks mesh states through `meshes`
    pub const fn new(batching: BatchConfig, meshes: ResourceView<Mesh>) -> Self {
        Self { batching, meshes }
    }

    /// Build the command buffer for one snapshot
    ///
    /// `buffer` supplies the frame index and any spare lists to compile
    /// into. `pre_render` and `post_render` hold the resource commands
    /// drained for this snapshot.
    pub fn compile(
        &self,
        ctx: &dyn TaskContext,
        mut buffer: RenderCommandBuffer,
        targets: Vec<TargetRenderPassGroup>,
        pre_render: RenderCommandList,
        post_render: RenderCommandList,
    ) -> RenderCommandBuffer {
        let targets: Vec<Arc<TargetRenderPassGroup>> = targets.into_iter().map(Arc::new).collect();

        let mut jobs = Vec::new();
        for target in &targets {
            for (group_index, group) in target.camera_groups.iter().enumerate() {
                for (pass_index, pass) in group.passes.iter().enumerate() {
                    if pass.is_empty() {
                        continue;
                    }
                    let compiler = self.clone();
                    let target = Arc::clone(target);
                    let list = buffer.take_list();
                    jobs.push(move |_: &dyn TaskContext| {
                        let pass = &target.camera_groups[group_index].passes[pass_index];
                        compiler.compile_pass_into(&target.frame, pass, list)
                    });
                }
            }
        }

        let mut pass_lists = join_all(ctx, jobs).into_iter();
        let frame_index = buffer.frame_index();
        buffer.push_list(pre_render);

        for target in &targets {
            let begin = match target.target {
                RenderTarget::Screen => RenderCommand::Begin {
                    resolution: target.resolution,
                    clear_colour: target.clear_colour,
                },
                RenderTarget::Texture(texture) => RenderCommand::BeginWithTarget {
                    target: texture,
                    resolution: target.resolution,
                    clear_colour: target.clear_colour,
                },
            };
            let mut list = buffer.take_list();
            list.push(begin);
            buffer.push_list(list);

            for group in &target.camera_groups {
                if group.object_count() == 0 {
                    continue;
                }
                let mut list = buffer.take_list();
                list.push(RenderCommand::apply_camera(&group.camera));
                buffer.push_list(list);
                for _ in group.passes.iter().filter(|pass| !pass.is_empty()) {
                    if let Some(list) = pass_lists.next() {
                        buffer.push_list(list);
                    }
                }
            }

            let mut list = buffer.take_list();
            list.push(RenderCommand::End);
            buffer.push_list(list);
        }

        buffer.push_list(post_render);
        log::trace!(
            "Compiled frame {frame_index}: {} lists, {} commands",
            buffer.lists().len(),
            buffer.command_count()
        );
        buffer
    }

    /// Compile one pass into a self-contained command list
    pub fn compile_pass(&self, frame: &RenderFrame, pass: &RenderPass) -> RenderCommandList {
        self.compile_pass_into(frame, pass, RenderCommandList::new())
    }

    /// Like [`Self::compile_pass`], appending to a list supplied by the caller
    pub fn compile_pass_into(
        &self,
        frame: &RenderFrame,
        pass: &RenderPass,
        mut list: RenderCommandList,
    ) -> RenderCommandList {
        let mut batcher = SmallMeshBatcher::new(self.batching);
        let mut bound = BoundState::default();

        list.push(RenderCommand::ApplyLight(pass.light.clone()));

        for entry in &pass.objects {
            let object = &frame.objects[entry.object];

            if let Some(mesh) = object.kind().mesh_id() {
                if !self.meshes.is_drawable(mesh) {
                    log::warn!("Skipping object {} drawing unusable {mesh:?}", entry.object);
                    continue;
                }
            }

            if bound.material != Some(object.material()) {
                batcher.flush(&mut list);
                list.push(RenderCommand::ApplyMaterial(object.material()));
                bound.material = Some(object.material());
            }

            match object.kind() {
                RenderObjectKind::Mesh { mesh } => {
                    batcher.flush(&mut list);
                    bind_mesh(&mut list, &mut bound, *mesh);
                    list.push(RenderCommand::RenderInstance {
                        world: *object.world(),
                    });
                }
                RenderObjectKind::AnimatedMesh { mesh, animation } => {
                    batcher.flush(&mut list);
                    bind_mesh(&mut list, &mut bound, *mesh);
                    if !bound.animation.is_some_and(|current| Arc::ptr_eq(current, animation)) {
                        list.push(RenderCommand::ApplySkinnedAnimation(Arc::clone(animation)));
                        bound.animation = Some(animation);
                    }
                    list.push(RenderCommand::RenderInstance {
                        world: *object.world(),
                    });
                }
                RenderObjectKind::Sprite { mesh } | RenderObjectKind::Particles { mesh } => {
                    // Dynamic draws replace whatever geometry was bound
                    bound.mesh = None;
                    if batcher.can_batch(object) {
                        batcher.batch(object, &mut list);
                    } else {
                        batcher.flush(&mut list);
                        list.push(RenderCommand::RenderDynamicMesh {
                            mesh: Arc::clone(mesh),
                            world: *object.world(),
                        });
                    }
                }
            }
        }

        batcher.flush(&mut list);
        list
    }
}

fn bind_mesh(list: &mut RenderCommandList, bound: &mut BoundState<'_>, mesh: MeshId) {
    if bound.mesh != Some(mesh) {
        list.push(RenderCommand::ApplyMesh(mesh));
        bound.mesh = Some(mesh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Sphere, Vec3};
    use crate::render::commands::RenderCommandKind;
    use crate::render::frame::{AmbientLight, RenderCamera};
    use crate::render::pass::{CameraRenderPassGroup, PassLight, RenderPassObject};
    use crate::render::render_object::{PassCapabilities, RenderObject};
    use crate::render::RenderError;
    use crate::resources::{
        DynamicMesh, MeshData, MeshDesc, PolygonType, ResourceManager, SpriteVertex,
    };
    use crate::tasks::ThreadPool;

    fn kinds(list: &RenderCommandList) -> Vec<RenderCommandKind> {
        list.commands().iter().map(RenderCommand::kind).collect()
    }

    fn pass_over(frame: &RenderFrame) -> RenderPass {
        RenderPass {
            light: PassLight::Ambient(AmbientLight::default()),
            objects: (0..frame.objects.len())
                .map(|object| RenderPassObject {
                    object,
                    depth: 0.0,
                    material: frame.objects[object].material(),
                })
                .collect(),
        }
    }

    fn sprite(material: u32) -> RenderObject {
        let quad = [SpriteVertex {
            position: [0.0; 3],
            uv: [0.0; 2],
            colour: [255; 4],
        }; 4];
        let mesh = DynamicMesh::from_vertices(PolygonType::TriangleList, &quad, &[0, 1, 2, 0, 2, 3]);
        RenderObject::sprite(Arc::new(mesh), MaterialId(material), Mat4::identity(), PassCapabilities::TRANSPARENT)
    }

    #[test]
    fn test_redundant_bindings_are_skipped() {
        let meshes: ResourceManager<Mesh> = ResourceManager::new(2);
        let mesh = meshes.create(MeshDesc::default(), MeshData::default());
        let bounds = Sphere::new(Vec3::zeros(), 1.0);
        let caps = PassCapabilities::OPAQUE;

        let mut frame = RenderFrame::new(RenderCamera::default(), (8, 8));
        frame.objects.push(RenderObject::mesh(mesh.id(), bounds, MaterialId(1), Mat4::identity(), caps));
        frame.objects.push(RenderObject::mesh(mesh.id(), bounds, MaterialId(1), Mat4::identity(), caps));
        frame.objects.push(RenderObject::mesh(mesh.id(), bounds, MaterialId(2), Mat4::identity(), caps));

        let compiler = RenderCommandCompiler::new(BatchConfig::default(), meshes.view());
        let list = compiler.compile_pass(&frame, &pass_over(&frame));

        assert_eq!(
            kinds(&list),
            vec![
                RenderCommandKind::ApplyLight,
                RenderCommandKind::ApplyMaterial,
                RenderCommandKind::ApplyMesh,
                RenderCommandKind::RenderInstance,
                RenderCommandKind::RenderInstance,
                RenderCommandKind::ApplyMaterial,
                RenderCommandKind::RenderInstance,
            ]
        );

        meshes.destroy(mesh);
    }

    #[test]
    fn test_sprites_share_one_draw_until_material_changes() {
        let meshes: ResourceManager<Mesh> = ResourceManager::new(1);
        let mut frame = RenderFrame::new(RenderCamera::default(), (8, 8));
        frame.objects.push(sprite(1));
        frame.objects.push(sprite(1));
        frame.objects.push(sprite(1));
        frame.objects.push(sprite(2));

        let compiler = RenderCommandCompiler::new(BatchConfig::default(), meshes.view());
        let list = compiler.compile_pass(&frame, &pass_over(&frame));

        assert_eq!(
            kinds(&list),
            vec![
                RenderCommandKind::ApplyLight,
                RenderCommandKind::ApplyMaterial,
                RenderCommandKind::RenderDynamicMesh,
                RenderCommandKind::ApplyMaterial,
                RenderCommandKind::RenderDynamicMesh,
            ]
        );
        match &list.commands()[2] {
            RenderCommand::RenderDynamicMesh { mesh, .. } => assert_eq!(mesh.vertex_count(), 12),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_failed_mesh_is_skipped() {
        let meshes: ResourceManager<Mesh> = ResourceManager::new(2);
        let good = meshes.create(MeshDesc::default(), MeshData::default());
        let bad = meshes.create(MeshDesc::default(), MeshData::default());
        let (loads, _) = meshes.take_pending();
        loads[0].complete(Ok(1));
        loads[1].complete(Err(RenderError::ResourceCreationFailed("test".into())));

        let bounds = Sphere::new(Vec3::zeros(), 1.0);
        let mut frame = RenderFrame::new(RenderCamera::default(), (8, 8));
        frame.objects.push(RenderObject::mesh(bad.id(), bounds, MaterialId(0), Mat4::identity(), PassCapabilities::OPAQUE));
        frame.objects.push(RenderObject::mesh(good.id(), bounds, MaterialId(0), Mat4::identity(), PassCapabilities::OPAQUE));

        let compiler = RenderCommandCompiler::new(BatchConfig::default(), meshes.view());
        let list = compiler.compile_pass(&frame, &pass_over(&frame));

        let bound: Vec<_> = list
            .commands()
            .iter()
            .filter_map(|command| match command {
                RenderCommand::ApplyMesh(mesh) => Some(*mesh),
                _ => None,
            })
            .collect();
        assert_eq!(bound, vec![good.id()]);
        assert_eq!(kinds(&list).iter().filter(|&&k| k == RenderCommandKind::RenderInstance).count(), 1);

        meshes.destroy(good);
        meshes.destroy(bad);
    }

    #[test]
    fn test_buffer_layout() {
        let meshes: ResourceManager<Mesh> = ResourceManager::new(2);
        let mesh = meshes.create(MeshDesc::default(), MeshData::default());
        let (loads, _) = meshes.take_pending();
        let mut pre = RenderCommandList::new();
        pre.extend(loads.into_iter().map(RenderCommand::LoadMesh));

        let mut frame = RenderFrame::new(RenderCamera::default(), (8, 8));
        frame.objects.push(RenderObject::mesh(
            mesh.id(),
            Sphere::new(Vec3::zeros(), 1.0),
            MaterialId(0),
            Mat4::identity(),
            PassCapabilities::OPAQUE,
        ));
        let frame = Arc::new(frame);
        let scene = CameraRenderPassGroup {
            camera: frame.camera.clone(),
            passes: vec![
                pass_over(&frame),
                RenderPass {
                    light: PassLight::Ambient(AmbientLight::default()),
                    objects: Vec::new(),
                },
            ],
        };
        let empty_ui = CameraRenderPassGroup {
            camera: frame.camera.clone(),
            passes: vec![RenderPass {
                light: PassLight::None,
                objects: Vec::new(),
            }],
        };
        let target = TargetRenderPassGroup {
            frame: Arc::clone(&frame),
            target: RenderTarget::Screen,
            resolution: (8, 8),
            clear_colour: frame.clear_colour,
            camera_groups: vec![scene, empty_ui],
        };

        let pool = ThreadPool::new(2).unwrap();
        let compiler = RenderCommandCompiler::new(BatchConfig::default(), meshes.view());
        let buffer = compiler.compile(
            &pool,
            RenderCommandBuffer::new(3),
            vec![target],
            pre,
            RenderCommandList::new(),
        );

        let heads: Vec<_> = buffer.lists().iter().map(|list| list.commands()[0].kind()).collect();
        assert_eq!(
            heads,
            vec![
                RenderCommandKind::LoadMesh,
                RenderCommandKind::Begin,
                RenderCommandKind::ApplyCamera,
                RenderCommandKind::ApplyLight,
                RenderCommandKind::End,
            ]
        );
        assert_eq!(buffer.frame_index(), 3);

        meshes.destroy(mesh);
    }
}
