//! # Render Passes
//!
//! Output of the pass compiler. Passes reference objects by index into
//! their frame, carry the sort key computed for that pass, and are
//! immutable once built.
//!
//! ## Sort Order
//!
//! - **Opaque**: ascending camera-space depth (front to back) for early
//!   depth rejection
//! - **Transparent**: descending camera-space depth (back to front) for
//!   correct blending
//!
//! Ties fall back to the material id so that equal-depth objects group by
//! render state.

use super::frame::{AmbientLight, DirectionalLight, PointLight, RenderCamera, RenderFrame, RenderTarget};
use super::render_object::MaterialId;
use crate::foundation::math::Colour;
use std::cmp::Ordering;
use std::sync::Arc;

/// Light applied while drawing a pass
#[derive(Debug, Clone, PartialEq)]
pub enum PassLight {
    /// Unlit, e.g. shadow map and UI passes
    None,
    /// Ambient term, used by the base and transparent passes
    Ambient(AmbientLight),
    /// One directional light
    Directional(DirectionalLight),
    /// One point light
    Point(PointLight),
}

/// An object scheduled for one pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassObject {
    /// Index into [`RenderFrame::objects`]
    pub object: usize,
    /// Camera-space depth of the object's bounding sphere centre
    pub depth: f32,
    /// Material, used to break depth ties
    pub material: MaterialId,
}

/// Sorted objects for one camera and light combination
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    /// Light applied for the whole pass
    pub light: PassLight,
    /// Objects in draw order
    pub objects: Vec<RenderPassObject>,
}

impl RenderPass {
    /// Whether the pass has anything to draw
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Passes drawn with one camera
#[derive(Debug, Clone, PartialEq)]
pub struct CameraRenderPassGroup {
    /// Camera applied before the passes
    pub camera: RenderCamera,
    /// Passes in draw order
    pub passes: Vec<RenderPass>,
}

impl CameraRenderPassGroup {
    /// Total objects over all passes
    pub fn object_count(&self) -> usize {
        self.passes.iter().map(|pass| pass.objects.len()).sum()
    }
}

/// Camera groups drawn into one render target
#[derive(Debug, Clone)]
pub struct TargetRenderPassGroup {
    /// Frame whose objects the passes index into
    pub frame: Arc<RenderFrame>,
    /// Target to bind
    pub target: RenderTarget,
    /// Target size in pixels
    pub resolution: (u32, u32),
    /// Clear colour for the target
    pub clear_colour: Colour,
    /// Camera groups in draw order
    pub camera_groups: Vec<CameraRenderPassGroup>,
}

fn by_depth_then_material(a: &RenderPassObject, b: &RenderPassObject) -> Ordering {
    a.depth.total_cmp(&b.depth).then(a.material.cmp(&b.material))
}

/// Sort front to back
pub fn sort_opaque(objects: &mut [RenderPassObject]) {
    objects.sort_by(by_depth_then_material);
}

/// Sort back to front
pub fn sort_transparent(objects: &mut [RenderPassObject]) {
    objects.sort_by(|a, b| b.depth.total_cmp(&a.depth).then(a.material.cmp(&b.material)));
}
