//! # Render Pass Compiler
//!
//! Builds the sorted passes for a frame using parallel child tasks.
//!
//! ## Architecture
//!
//! The main camera group always holds `2 + directional + point` passes in
//! the order `[base, directional..., point..., transparent]`. Every pass gets
//! its output slot before any task is spawned, and each task writes only its
//! own slot, so the result does not depend on which task finishes first.
//! Passes with nothing to draw are still produced.
//!
//! Per target the frame compiles to:
//!
//! - one shadow map target per directional light with a shadow map
//! - the main target, holding the lit scene group, the skybox group and then
//!   the UI group

use super::frame::{DirectionalLight, RenderCamera, RenderFrame, RenderTarget, ShadowMapDesc};
use super::pass::{
    sort_opaque, sort_transparent, CameraRenderPassGroup, PassLight, RenderPass,
    TargetRenderPassGroup,
};
use super::render_object::RenderLayer;
use super::visibility::{collect_pass_objects, visible_objects};
use crate::foundation::math::{Colour, Mat4};
use crate::tasks::{join_all, TaskContext};
use std::sync::Arc;

/// Depth range of the UI camera
const UI_DEPTH_RANGE: f32 = 1000.0;

#[derive(Debug, Clone, Copy)]
enum LightPassSlot {
    Base,
    Directional(usize),
    Point(usize),
    Transparent,
}

#[derive(Debug, Clone, Copy)]
enum GroupSlot {
    ShadowMap(usize),
    Scene,
    Skybox,
    Ui,
}

/// Compiles frames into target render pass groups
#[derive(Debug, Clone, Copy)]
pub struct RenderPassCompiler {
    frustum_culling: bool,
}

impl RenderPassCompiler {
    /// Create a compiler, optionally culling objects outside the camera frustum
    pub const fn new(frustum_culling: bool) -> Self {
        Self { frustum_culling }
    }

    /// Compile the lit passes of the frame's main camera
    ///
    /// Only standard-layer objects take part. Directional passes take lit
    /// opaque objects; point passes additionally require the object's bounds
    /// to reach into the light's range of influence.
    pub fn compile_light_render_passes(
        &self,
        ctx: &dyn TaskContext,
        frame: &Arc<RenderFrame>,
    ) -> CameraRenderPassGroup {
        let visible: Arc<[usize]> =
            visible_objects(frame, &frame.camera, RenderLayer::Standard, self.frustum_culling).into();

        let slots = std::iter::once(LightPassSlot::Base)
            .chain((0..frame.directional_lights.len()).map(LightPassSlot::Directional))
            .chain((0..frame.point_lights.len()).map(LightPassSlot::Point))
            .chain(std::iter::once(LightPassSlot::Transparent));

        let jobs: Vec<_> = slots
            .map(|slot| {
                let frame = Arc::clone(frame);
                let visible = Arc::clone(&visible);
                move |_: &dyn TaskContext| build_light_pass(&frame, &visible, slot)
            })
            .collect();

        let passes = join_all(ctx, jobs);
        debug_assert_eq!(passes.len(), frame.light_pass_count());

        CameraRenderPassGroup {
            camera: frame.camera.clone(),
            passes,
        }
    }

    /// Compile the shadow map camera group for one directional light
    pub fn compile_shadow_map_group(
        &self,
        frame: &RenderFrame,
        shadow: &ShadowMapDesc,
    ) -> CameraRenderPassGroup {
        let camera = &shadow.light_camera;
        let visible = visible_objects(frame, camera, RenderLayer::Standard, self.frustum_culling);
        let mut objects = collect_pass_objects(frame, camera, &visible, |object| {
            object.capabilities().is_shadow_caster()
        });
        sort_opaque(&mut objects);

        CameraRenderPassGroup {
            camera: camera.clone(),
            passes: vec![RenderPass {
                light: PassLight::None,
                objects,
            }],
        }
    }

    /// Compile the skybox layer into a single unlit pass
    ///
    /// The camera keeps the main camera's orientation and projection but sits
    /// at the origin, so the sky never moves relative to the viewer.
    pub fn compile_skybox_group(&self, frame: &RenderFrame) -> CameraRenderPassGroup {
        let camera = frame.camera.rotation_only();
        let visible = visible_objects(frame, &camera, RenderLayer::Skybox, self.frustum_culling);
        let mut objects = collect_pass_objects(frame, &camera, &visible, |_| true);
        sort_opaque(&mut objects);

        CameraRenderPassGroup {
            camera,
            passes: vec![RenderPass {
                light: PassLight::None,
                objects,
            }],
        }
    }

    /// Compile the UI layer into a single unlit pass ordered by priority
    ///
    /// The UI camera is orthographic over the frame resolution. Equal
    /// priorities keep frame order.
    pub fn compile_ui_group(&self, frame: &RenderFrame) -> CameraRenderPassGroup {
        let (width, height) = frame.resolution;
        #[allow(clippy::cast_precision_loss)]
        let camera = RenderCamera::orthographic(
            Mat4::identity(),
            width as f32,
            height as f32,
            -UI_DEPTH_RANGE,
            UI_DEPTH_RANGE,
        );

        let visible = visible_objects(frame, &camera, RenderLayer::Ui, self.frustum_culling);
        let mut objects = collect_pass_objects(frame, &camera, &visible, |_| true);
        objects.sort_by_key(|entry| frame.objects[entry.object].priority());

        CameraRenderPassGroup {
            camera,
            passes: vec![RenderPass {
                light: PassLight::None,
                objects,
            }],
        }
    }

    /// Compile every target of a frame
    ///
    /// Shadow map targets come first, in directional light order, followed by
    /// the main target with its scene, skybox and UI camera groups.
    pub fn compile_target_render_pass_groups(
        &self,
        ctx: &dyn TaskContext,
        frame: &Arc<RenderFrame>,
    ) -> Vec<TargetRenderPassGroup> {
        let shadow_lights: Vec<usize> = frame
            .directional_lights
            .iter()
            .enumerate()
            .filter(|(_, light)| light.shadow.is_some())
            .map(|(index, _)| index)
            .collect();

        let jobs: Vec<_> = shadow_lights
            .iter()
            .map(|&index| GroupSlot::ShadowMap(index))
            .chain([GroupSlot::Scene, GroupSlot::Skybox, GroupSlot::Ui])
            .map(|slot| {
                let compiler = *self;
                let frame = Arc::clone(frame);
                move |ctx: &dyn TaskContext| compiler.compile_group(ctx, &frame, slot)
            })
            .collect();

        let mut camera_groups = join_all(ctx, jobs);
        let main_groups = camera_groups.split_off(shadow_lights.len());

        let mut targets: Vec<TargetRenderPassGroup> = shadow_lights
            .iter()
            .zip(camera_groups)
            .filter_map(|(&index, group)| {
                let shadow = frame.directional_lights[index].shadow.as_ref()?;
                Some(TargetRenderPassGroup {
                    frame: Arc::clone(frame),
                    target: RenderTarget::Texture(shadow.target),
                    resolution: shadow.resolution,
                    clear_colour: Colour::repeat(1.0),
                    camera_groups: vec![group],
                })
            })
            .collect();

        targets.push(TargetRenderPassGroup {
            frame: Arc::clone(frame),
            target: frame.target,
            resolution: frame.resolution,
            clear_colour: frame.clear_colour,
            camera_groups: main_groups,
        });

        targets
    }

    /// Compile several frames at once, keeping frame order in the output
    pub fn compile_frames(
        &self,
        ctx: &dyn TaskContext,
        frames: &[Arc<RenderFrame>],
    ) -> Vec<TargetRenderPassGroup> {
        let jobs: Vec<_> = frames
            .iter()
            .map(|frame| {
                let compiler = *self;
                let frame = Arc::clone(frame);
                move |ctx: &dyn TaskContext| compiler.compile_target_render_pass_groups(ctx, &frame)
            })
            .collect();

        join_all(ctx, jobs).into_iter().flatten().collect()
    }

    fn compile_group(
        &self,
        ctx: &dyn TaskContext,
        frame: &Arc<RenderFrame>,
        slot: GroupSlot,
    ) -> CameraRenderPassGroup {
        match slot {
            GroupSlot::ShadowMap(index) => {
                match frame.directional_lights.get(index).and_then(|light| light.shadow.as_ref()) {
                    Some(shadow) => self.compile_shadow_map_group(frame, shadow),
                    None => CameraRenderPassGroup {
                        camera: frame.camera.clone(),
                        passes: Vec::new(),
                    },
                }
            }
            GroupSlot::Scene => self.compile_light_render_passes(ctx, frame),
            GroupSlot::Skybox => self.compile_skybox_group(frame),
            GroupSlot::Ui => self.compile_ui_group(frame),
        }
    }
}

fn build_light_pass(frame: &RenderFrame, visible: &[usize], slot: LightPassSlot) -> RenderPass {
    let camera = &frame.camera;

    match slot {
        LightPassSlot::Base => {
            let mut objects = collect_pass_objects(frame, camera, visible, |object| {
                object.capabilities().is_opaque()
            });
            sort_opaque(&mut objects);
            RenderPass {
                light: PassLight::Ambient(frame.ambient_light),
                objects,
            }
        }
        LightPassSlot::Directional(index) => {
            let light: &DirectionalLight = &frame.directional_lights[index];
            let mut objects = collect_pass_objects(frame, camera, visible, |object| {
                object.capabilities().is_lit_opaque()
            });
            sort_opaque(&mut objects);
            RenderPass {
                light: PassLight::Directional(light.clone()),
                objects,
            }
        }
        LightPassSlot::Point(index) => {
            let light = frame.point_lights[index];
            let influence = light.influence_sphere();
            let mut objects = collect_pass_objects(frame, camera, visible, |object| {
                object.capabilities().is_lit_opaque() && object.world_bounds().intersects(&influence)
            });
            sort_opaque(&mut objects);
            RenderPass {
                light: PassLight::Point(light),
                objects,
            }
        }
        LightPassSlot::Transparent => {
            let mut objects = collect_pass_objects(frame, camera, visible, |object| {
                object.capabilities().is_transparent()
            });
            sort_transparent(&mut objects);
            RenderPass {
                light: PassLight::Ambient(frame.ambient_light),
                objects,
            }
        }
    }
}
