//! Frame under construction on the game thread

use super::commands::RenderCommandList;
use super::frame::{
    AmbientLight, DirectionalLight, PointLight, RenderCamera, RenderFrame, RenderTarget,
};
use super::render_object::RenderObject;
use crate::foundation::math::Colour;

/// Everything the game thread hands over for one tick
///
/// Holds the mutable frame plus the resource commands drained from the
/// managers. Handing the snapshot to the renderer freezes the frame.
#[derive(Debug)]
pub struct RenderSnapshot {
    frame: RenderFrame,
    pre_render: RenderCommandList,
    post_render: RenderCommandList,
}

impl RenderSnapshot {
    /// Start a snapshot for `camera` rendering to the screen
    pub fn new(camera: RenderCamera, resolution: (u32, u32)) -> Self {
        Self {
            frame: RenderFrame::new(camera, resolution),
            pre_render: RenderCommandList::new(),
            post_render: RenderCommandList::new(),
        }
    }

    /// Render the main passes into `target` instead of the screen
    pub fn set_target(&mut self, target: RenderTarget) {
        self.frame.target = target;
    }

    /// Colour the main target is cleared to
    pub fn set_clear_colour(&mut self, colour: Colour) {
        self.frame.clear_colour = colour;
    }

    /// Replace the ambient light
    pub fn set_ambient_light(&mut self, light: AmbientLight) {
        self.frame.ambient_light = light;
    }

    /// Add a directional light; lights keep insertion order
    pub fn add_directional_light(&mut self, light: DirectionalLight) {
        self.frame.directional_lights.push(light);
    }

    /// Add a point light; lights keep insertion order
    pub fn add_point_light(&mut self, light: PointLight) {
        self.frame.point_lights.push(light);
    }

    /// Add an object to draw
    pub fn add_render_object(&mut self, object: RenderObject) {
        self.frame.objects.push(object);
    }

    /// Frame built so far
    pub const fn frame(&self) -> &RenderFrame {
        &self.frame
    }

    /// Commands executed before any target of this snapshot
    pub fn pre_render_commands_mut(&mut self) -> &mut RenderCommandList {
        &mut self.pre_render
    }

    /// Commands executed after every target of this snapshot
    pub fn post_render_commands_mut(&mut self) -> &mut RenderCommandList {
        &mut self.post_render
    }

    /// Split into the frame and the pre/post command lists
    pub fn into_parts(self) -> (RenderFrame, RenderCommandList, RenderCommandList) {
        (self.frame, self.pre_render, self.post_render)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::new(RenderCamera::default(), (64, 64))
    }
}
