//! Camera-facing quads built from committed particle data

use super::concurrent_data::{ConcurrentParticleData, ParticleDrawData};
use crate::foundation::math::{Colour, Mat4, Vec3};
use crate::render::frame::RenderCamera;
use crate::render::render_object::{
    MaterialId, PassCapabilities, RenderObject, RenderObjectKind,
};
use crate::resources::{DynamicMesh, PolygonType, SpriteVertex};
use std::sync::Arc;

/// Most particles one billboard mesh can address with 16-bit indices
pub const MAX_BILLBOARD_PARTICLES: usize = (u16::MAX as usize + 1) / 4;

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn colour_bytes(colour: &Colour) -> [u8; 4] {
    colour.map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8).into()
}

/// Build one quad per active particle, facing `camera`
///
/// Returns `None` when nothing is active. Particles past
/// [`MAX_BILLBOARD_PARTICLES`] are dropped with a warning.
pub fn build_billboards(particles: &[ParticleDrawData], camera: &RenderCamera) -> Option<DynamicMesh> {
    let world = camera.world();
    let right: Vec3 = world.fixed_view::<3, 1>(0, 0).into_owned();
    let up: Vec3 = world.fixed_view::<3, 1>(0, 1).into_owned();

    let active: Vec<&ParticleDrawData> = particles.iter().filter(|particle| particle.is_active).collect();
    if active.is_empty() {
        return None;
    }
    if active.len() > MAX_BILLBOARD_PARTICLES {
        log::warn!(
            "Dropping {} particles beyond the billboard limit",
            active.len() - MAX_BILLBOARD_PARTICLES
        );
    }

    let count = active.len().min(MAX_BILLBOARD_PARTICLES);
    let mut vertices = Vec::with_capacity(count * 4);
    let mut indices = Vec::with_capacity(count * 6);

    for particle in active.into_iter().take(count) {
        let (sin, cos) = particle.rotation.sin_cos();
        let axis_x = (right * cos + up * sin) * (particle.scale.x * 0.5);
        let axis_y = (up * cos - right * sin) * (particle.scale.y * 0.5);
        let colour = colour_bytes(&particle.colour);

        #[allow(clippy::cast_possible_truncation)]
        let base = vertices.len() as u16;
        let corners = [
            (particle.position - axis_x - axis_y, [0.0, 1.0]),
            (particle.position + axis_x - axis_y, [1.0, 1.0]),
            (particle.position + axis_x + axis_y, [1.0, 0.0]),
            (particle.position - axis_x + axis_y, [0.0, 0.0]),
        ];
        for (position, uv) in corners {
            vertices.push(SpriteVertex {
                position: position.into(),
                uv,
                colour,
            });
        }
        indices.extend(QUAD_INDICES.iter().map(|index| base + index));
    }

    Some(DynamicMesh::from_vertices(PolygonType::TriangleList, &vertices, &indices))
}

/// Render object drawing the committed state of `data`
///
/// The mesh is already in world space, so the object uses an identity
/// transform and the committed bounding sphere. Quads are rebuilt from every
/// active particle each time, so the newly activated indices carry no extra
/// state here; they are taken so the pending list is emptied once per draw.
pub fn particle_render_object(
    data: &ConcurrentParticleData,
    camera: &RenderCamera,
    material: MaterialId,
    capabilities: PassCapabilities,
) -> Option<RenderObject> {
    let mut guard = data.lock();
    let new_particles = guard.take_new_indices().len();
    let mesh = build_billboards(guard.particles(), camera);
    let bounds = guard.bounding_sphere();
    data.unlock(guard);

    if new_particles > 0 {
        log::trace!("{new_particles} particles activated since the last draw");
    }
    let mesh = mesh?;

    Some(RenderObject::new(
        RenderObjectKind::Particles { mesh: Arc::new(mesh) },
        material,
        Mat4::identity(),
        bounds,
        capabilities,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Aabb, Vec2};
    use crate::resources::VertexFormat;
    use approx::assert_relative_eq;

    fn particle(position: Vec3, is_active: bool) -> ParticleDrawData {
        ParticleDrawData {
            position,
            scale: Vec2::new(2.0, 4.0),
            is_active,
            ..ParticleDrawData::default()
        }
    }

    #[test]
    fn test_one_quad_per_active_particle() {
        let particles = [
            particle(Vec3::zeros(), true),
            particle(Vec3::x(), false),
            particle(Vec3::new(5.0, 0.0, 0.0), true),
        ];
        let mesh = build_billboards(&particles, &RenderCamera::default()).unwrap();

        assert_eq!(mesh.vertex_format(), VertexFormat::Sprite);
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.indices().collect::<Vec<_>>(), vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);

        // Identity camera: right is +X, up is +Y
        assert_relative_eq!(mesh.position(0), Vec3::new(-1.0, -2.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(mesh.position(2), Vec3::new(1.0, 2.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(mesh.position(4), Vec3::new(4.0, -2.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_no_active_particles_builds_nothing() {
        let particles = [particle(Vec3::zeros(), false)];
        assert!(build_billboards(&particles, &RenderCamera::default()).is_none());

        let data = ConcurrentParticleData::new(4);
        let object = particle_render_object(
            &data,
            &RenderCamera::default(),
            MaterialId(0),
            PassCapabilities::TRANSPARENT,
        );
        assert!(object.is_none());
    }

    #[test]
    fn test_render_object_uses_committed_bounds() {
        let data = ConcurrentParticleData::new(2);
        let particles = [particle(Vec3::new(0.0, 3.0, 0.0), true), particle(Vec3::zeros(), false)];
        let mut aabb = Aabb::empty();
        aabb.grow(&Vec3::new(0.0, 3.0, 0.0));
        assert!(data.start_update());
        data.commit_particle_data(&particles, &[0], aabb, aabb.bounding_sphere());

        let object = particle_render_object(
            &data,
            &RenderCamera::default(),
            MaterialId(7),
            PassCapabilities::TRANSPARENT,
        )
        .unwrap();

        assert_eq!(object.material(), MaterialId(7));
        assert_relative_eq!(object.world_bounds().centre, Vec3::new(0.0, 3.0, 0.0));
        assert!(matches!(object.kind(), RenderObjectKind::Particles { .. }));

        let mut guard = data.lock();
        assert!(guard.take_new_indices().is_empty());
        data.unlock(guard);
    }
}
