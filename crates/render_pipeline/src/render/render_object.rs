//! # Render Objects
//!
//! One renderable item per frame. The set of object kinds is closed; the
//! pass compiler only filters and sorts, so kinds carry data rather than
//! behaviour. Which passes an object takes part in is decided by its
//! capability bits.

use crate::foundation::math::{Mat4, Sphere};
use crate::resources::{DynamicMesh, MeshId};
use bitflags::bitflags;
use std::sync::Arc;

/// Identifier of a material owned by the material system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MaterialId(pub u32);

bitflags! {
    /// Passes an object may be drawn in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PassCapabilities: u8 {
        /// Drawn in the base and light passes
        const OPAQUE = 1 << 0;
        /// Drawn back-to-front in the transparent pass
        const TRANSPARENT = 1 << 1;
        /// Receives per-light passes
        const LIT = 1 << 2;
        /// Drawn into shadow maps
        const CASTS_SHADOWS = 1 << 3;
    }
}

impl PassCapabilities {
    /// Opaque and not also flagged transparent
    pub const fn is_opaque(self) -> bool {
        self.contains(Self::OPAQUE) && !self.contains(Self::TRANSPARENT)
    }

    /// Flagged transparent; transparency wins over opacity
    pub const fn is_transparent(self) -> bool {
        self.contains(Self::TRANSPARENT)
    }

    /// Opaque and lit, i.e. takes part in per-light passes
    pub const fn is_lit_opaque(self) -> bool {
        self.is_opaque() && self.contains(Self::LIT)
    }

    /// Opaque shadow caster
    pub const fn is_shadow_caster(self) -> bool {
        self.is_opaque() && self.contains(Self::CASTS_SHADOWS)
    }
}

/// Render layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderLayer {
    /// World geometry, lit and depth sorted
    #[default]
    Standard,
    /// Background drawn around the camera, ignoring its position
    Skybox,
    /// Screen-space overlay, drawn last and ordered by priority
    Ui,
}

/// Joint palette for a skinned mesh
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkinnedAnimation {
    /// Joint matrices in model space
    pub joint_matrices: Vec<Mat4>,
}

/// What an object draws
#[derive(Debug, Clone)]
pub enum RenderObjectKind {
    /// GPU mesh handle
    Mesh {
        /// Mesh to draw
        mesh: MeshId,
    },
    /// GPU mesh deformed by a joint palette
    AnimatedMesh {
        /// Mesh to draw
        mesh: MeshId,
        /// Current pose
        animation: Arc<SkinnedAnimation>,
    },
    /// CPU-resident sprite geometry
    Sprite {
        /// Local-space geometry
        mesh: Arc<DynamicMesh>,
    },
    /// CPU-resident particle geometry
    Particles {
        /// Geometry, usually already in world space
        mesh: Arc<DynamicMesh>,
    },
}

impl RenderObjectKind {
    /// Dynamic mesh carried by sprite and particle objects
    pub fn dynamic_mesh(&self) -> Option<&Arc<DynamicMesh>> {
        match self {
            Self::Sprite { mesh } | Self::Particles { mesh } => Some(mesh),
            Self::Mesh { .. } | Self::AnimatedMesh { .. } => None,
        }
    }

    /// GPU mesh referenced by mesh objects
    pub const fn mesh_id(&self) -> Option<MeshId> {
        match self {
            Self::Mesh { mesh } | Self::AnimatedMesh { mesh, .. } => Some(*mesh),
            Self::Sprite { .. } | Self::Particles { .. } => None,
        }
    }
}

/// A renderable item in a [`crate::render::RenderFrame`]
///
/// Never mutated once added to a frame. Meshes and materials are referenced,
/// not owned, so many objects can share them.
#[derive(Debug, Clone)]
pub struct RenderObject {
    kind: RenderObjectKind,
    material: MaterialId,
    world: Mat4,
    local_bounds: Sphere,
    capabilities: PassCapabilities,
    layer: RenderLayer,
    priority: u32,
}

impl RenderObject {
    /// Create an object on the standard layer
    pub fn new(
        kind: RenderObjectKind,
        material: MaterialId,
        world: Mat4,
        local_bounds: Sphere,
        capabilities: PassCapabilities,
    ) -> Self {
        Self {
            kind,
            material,
            world,
            local_bounds,
            capabilities,
            layer: RenderLayer::Standard,
            priority: 0,
        }
    }

    /// Object drawing a GPU mesh
    pub fn mesh(
        mesh: MeshId,
        local_bounds: Sphere,
        material: MaterialId,
        world: Mat4,
        capabilities: PassCapabilities,
    ) -> Self {
        Self::new(RenderObjectKind::Mesh { mesh }, material, world, local_bounds, capabilities)
    }

    /// Object drawing a CPU-resident sprite mesh
    pub fn sprite(
        mesh: Arc<DynamicMesh>,
        material: MaterialId,
        world: Mat4,
        capabilities: PassCapabilities,
    ) -> Self {
        let bounds = mesh.bounding_sphere();
        Self::new(RenderObjectKind::Sprite { mesh }, material, world, bounds, capabilities)
    }

    /// Move the object to another layer
    #[must_use]
    pub fn with_layer(mut self, layer: RenderLayer) -> Self {
        self.layer = layer;
        self
    }

    /// Set the draw priority used on the UI layer; lower draws first
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// What the object draws
    pub const fn kind(&self) -> &RenderObjectKind {
        &self.kind
    }

    /// Material
    pub const fn material(&self) -> MaterialId {
        self.material
    }

    /// Local-to-world transform
    pub const fn world(&self) -> &Mat4 {
        &self.world
    }

    /// Local-space bounding sphere
    pub const fn local_bounds(&self) -> Sphere {
        self.local_bounds
    }

    /// Bounding sphere in world space
    pub fn world_bounds(&self) -> Sphere {
        self.local_bounds.transformed(&self.world)
    }

    /// Pass capability bits
    pub const fn capabilities(&self) -> PassCapabilities {
        self.capabilities
    }

    /// Render layer
    pub const fn layer(&self) -> RenderLayer {
        self.layer
    }

    /// UI draw priority
    pub const fn priority(&self) -> u32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_wins_over_opacity() {
        let both = PassCapabilities::OPAQUE | PassCapabilities::TRANSPARENT | PassCapabilities::LIT;
        assert!(!both.is_opaque());
        assert!(!both.is_lit_opaque());
        assert!(both.is_transparent());
    }

    #[test]
    fn test_lit_and_shadow_queries() {
        let caps = PassCapabilities::OPAQUE | PassCapabilities::LIT | PassCapabilities::CASTS_SHADOWS;
        assert!(caps.is_lit_opaque());
        assert!(caps.is_shadow_caster());
        assert!(!PassCapabilities::OPAQUE.is_lit_opaque());
    }
}
