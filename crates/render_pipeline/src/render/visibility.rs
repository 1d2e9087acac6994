//! Visibility and per-pass object selection

use super::frame::{RenderCamera, RenderFrame};
use super::pass::RenderPassObject;
use super::render_object::{RenderLayer, RenderObject};

/// Indices of the frame's objects on `layer` that `camera` can see
///
/// With culling disabled every object on the layer is returned. Indices are
/// in frame order.
pub fn visible_objects(
    frame: &RenderFrame,
    camera: &RenderCamera,
    layer: RenderLayer,
    frustum_culling: bool,
) -> Vec<usize> {
    let frustum = frustum_culling.then(|| camera.frustum());

    frame
        .objects
        .iter()
        .enumerate()
        .filter(|(_, object)| object.layer() == layer)
        .filter(|(_, object)| {
            frustum
                .as_ref()
                .map_or(true, |frustum| frustum.intersects_sphere(&object.world_bounds()))
        })
        .map(|(index, _)| index)
        .collect()
}

/// Build unsorted pass entries for the visible objects accepted by `filter`
pub fn collect_pass_objects<F>(
    frame: &RenderFrame,
    camera: &RenderCamera,
    visible: &[usize],
    filter: F,
) -> Vec<RenderPassObject>
where
    F: Fn(&RenderObject) -> bool,
{
    visible
        .iter()
        .filter_map(|&index| {
            let object = &frame.objects[index];
            filter(object).then(|| RenderPassObject {
                object: index,
                depth: camera.depth_of(&object.world_bounds().centre),
                material: object.material(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Point3, Sphere, Vec3};
    use crate::render::render_object::{MaterialId, PassCapabilities};
    use crate::resources::{Mesh, MeshData, MeshDesc, ResourceManager};

    fn camera() -> RenderCamera {
        let projection = nalgebra::Perspective3::new(1.0, 1.0, 0.1, 100.0).to_homogeneous();
        RenderCamera::look_at(Point3::new(0.0, 0.0, 10.0), Point3::origin(), Vec3::y(), projection)
    }

    #[test]
    fn test_culling_drops_objects_behind_camera() {
        let meshes: ResourceManager<Mesh> = ResourceManager::new(1);
        let mesh = meshes.create(MeshDesc::default(), MeshData::default());
        let bounds = Sphere::new(Vec3::zeros(), 1.0);
        let caps = PassCapabilities::OPAQUE;

        let mut frame = RenderFrame::new(camera(), (100, 100));
        frame.objects.push(RenderObject::mesh(mesh.id(), bounds, MaterialId(0), Mat4::identity(), caps));
        frame.objects.push(RenderObject::mesh(
            mesh.id(),
            bounds,
            MaterialId(0),
            Mat4::new_translation(&Vec3::new(0.0, 0.0, 50.0)),
            caps,
        ));
        frame.objects.push(
            RenderObject::mesh(mesh.id(), bounds, MaterialId(0), Mat4::identity(), caps)
                .with_layer(RenderLayer::Ui),
        );

        assert_eq!(visible_objects(&frame, &frame.camera, RenderLayer::Standard, true), vec![0]);
        assert_eq!(visible_objects(&frame, &frame.camera, RenderLayer::Standard, false), vec![0, 1]);
        assert_eq!(visible_objects(&frame, &frame.camera, RenderLayer::Ui, false), vec![2]);

        meshes.destroy(mesh);
    }
}
