//! Frame snapshot types: camera, lights, target and the frozen frame
//!
//! A [`RenderFrame`] is built once per tick through
//! [`crate::render::RenderSnapshot`], then shared behind an `Arc` with every
//! compiler task. Nothing in it changes after that point.

use super::render_object::RenderObject;
use crate::foundation::math::{
    translation_of, Colour, Frustum, Mat4, Point3, Sphere, Vec3,
};
use crate::resources::TextureId;

/// Light intensity below which a point light no longer contributes
const POINT_LIGHT_MIN_INTENSITY: f32 = 1.0 / 256.0;

/// Camera description for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCamera {
    world: Mat4,
    view: Mat4,
    projection: Mat4,
}

impl RenderCamera {
    /// Camera from its world transform and projection
    ///
    /// A non-invertible world matrix falls back to an identity view.
    pub fn new(world: Mat4, projection: Mat4) -> Self {
        let view = world.try_inverse().unwrap_or_else(Mat4::identity);
        Self {
            world,
            view,
            projection,
        }
    }

    /// Right-handed perspective camera looking down its local -Z
    pub fn perspective(world: Mat4, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let projection = nalgebra::Perspective3::new(aspect, fov_y, near, far).to_homogeneous();
        Self::new(world, projection)
    }

    /// Orthographic camera covering `[0, width] x [0, height]`
    pub fn orthographic(world: Mat4, width: f32, height: f32, near: f32, far: f32) -> Self {
        let projection =
            nalgebra::Orthographic3::new(0.0, width, 0.0, height, near, far).to_homogeneous();
        Self::new(world, projection)
    }

    /// Camera placed at `eye` looking at `target`
    pub fn look_at(eye: Point3, target: Point3, up: Vec3, projection: Mat4) -> Self {
        let view = Mat4::look_at_rh(&eye, &target, &up);
        let world = view.try_inverse().unwrap_or_else(Mat4::identity);
        Self {
            world,
            view,
            projection,
        }
    }

    /// Camera-to-world transform
    pub const fn world(&self) -> &Mat4 {
        &self.world
    }

    /// World-to-camera transform
    pub const fn view(&self) -> &Mat4 {
        &self.view
    }

    /// Projection matrix
    pub const fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// Combined view-projection matrix
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Camera position in world space
    pub fn position(&self) -> Vec3 {
        translation_of(&self.world)
    }

    /// View frustum in world space
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// Same orientation and projection, placed at the world origin
    pub fn rotation_only(&self) -> Self {
        let mut world = self.world;
        world.fixed_view_mut::<3, 1>(0, 3).fill(0.0);
        Self::new(world, self.projection)
    }

    /// Camera-space depth of a world point; larger is further away
    pub fn depth_of(&self, point: &Vec3) -> f32 {
        -self.view.transform_point(&Point3::from(*point)).z
    }
}

impl Default for RenderCamera {
    fn default() -> Self {
        Self::new(Mat4::identity(), Mat4::identity())
    }
}

/// Uniform light applied by the base pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    /// Colour and intensity
    pub colour: Vec3,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            colour: Vec3::zeros(),
        }
    }
}

/// Shadow map rendered for a directional light
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowMapDesc {
    /// Depth texture the shadow casters are rendered into
    pub target: TextureId,
    /// Size of the shadow map in pixels
    pub resolution: (u32, u32),
    /// Light-space camera used to render the map
    pub light_camera: RenderCamera,
    /// Depth bias applied when sampling the map
    pub tolerance: f32,
}

/// Infinitely distant light
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    /// Colour and intensity
    pub colour: Vec3,
    /// Direction the light travels in, normalised
    pub direction: Vec3,
    /// Shadow map, if this light casts shadows
    pub shadow: Option<ShadowMapDesc>,
}

impl DirectionalLight {
    /// Light without shadows
    pub fn new(colour: Vec3, direction: Vec3) -> Self {
        Self {
            colour,
            direction: direction.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::z()),
            shadow: None,
        }
    }

    /// Attach a shadow map
    #[must_use]
    pub fn with_shadow(mut self, shadow: ShadowMapDesc) -> Self {
        self.shadow = Some(shadow);
        self
    }
}

/// Light radiating from a point with distance attenuation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// Colour and intensity
    pub colour: Vec3,
    /// World position
    pub position: Vec3,
    /// Constant, linear and quadratic attenuation terms
    pub attenuation: Vec3,
    /// Distance beyond which the light has no visible effect
    pub range_of_influence: f32,
}

impl PointLight {
    /// Point light whose range is derived from its attenuation
    pub fn new(colour: Vec3, position: Vec3, attenuation: Vec3) -> Self {
        Self {
            colour,
            position,
            attenuation,
            range_of_influence: Self::range_for_attenuation(&attenuation),
        }
    }

    /// Distance at which `1 / (c + l*d + q*d^2)` drops below the minimum intensity
    pub fn range_for_attenuation(attenuation: &Vec3) -> f32 {
        let (constant, linear, quadratic) = (attenuation.x, attenuation.y, attenuation.z);
        let threshold = 1.0 / POINT_LIGHT_MIN_INTENSITY;

        if quadratic > 0.0 {
            let discriminant = linear.mul_add(linear, -4.0 * quadratic * (constant - threshold));
            ((-linear + discriminant.max(0.0).sqrt()) / (2.0 * quadratic)).max(0.0)
        } else if linear > 0.0 {
            ((threshold - constant) / linear).max(0.0)
        } else {
            f32::INFINITY
        }
    }

    /// Sphere of influence in world space
    pub const fn influence_sphere(&self) -> Sphere {
        Sphere::new(self.position, self.range_of_influence)
    }
}

/// Where a frame or target group is rendered to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// The default framebuffer
    Screen,
    /// An offscreen texture created as a render target
    Texture(TextureId),
}

/// Immutable snapshot of everything needed to render one tick
#[derive(Debug, Clone)]
pub struct RenderFrame {
    /// Where the main passes are rendered
    pub target: RenderTarget,
    /// Target size in pixels
    pub resolution: (u32, u32),
    /// Colour the main target is cleared to
    pub clear_colour: Colour,
    /// Main camera
    pub camera: RenderCamera,
    /// Ambient term for the base pass
    pub ambient_light: AmbientLight,
    /// Directional lights, one pass each, in this order
    pub directional_lights: Vec<DirectionalLight>,
    /// Point lights, one pass each, in this order
    pub point_lights: Vec<PointLight>,
    /// Everything to draw, in no particular order
    pub objects: Vec<RenderObject>,
}

impl RenderFrame {
    /// Empty frame rendering to the screen
    pub fn new(camera: RenderCamera, resolution: (u32, u32)) -> Self {
        Self {
            target: RenderTarget::Screen,
            resolution,
            clear_colour: Colour::new(0.0, 0.0, 0.0, 1.0),
            camera,
            ambient_light: AmbientLight::default(),
            directional_lights: Vec::new(),
            point_lights: Vec::new(),
            objects: Vec::new(),
        }
    }

    /// Number of light passes the main camera group will contain
    pub fn light_pass_count(&self) -> usize {
        2 + self.directional_lights.len() + self.point_lights.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_depth_increases_away_from_camera() {
        let camera = RenderCamera::look_at(
            Point3::new(0.0, 0.0, 10.0),
            Point3::origin(),
            Vec3::y(),
            Mat4::identity(),
        );
        assert_relative_eq!(camera.position(), Vec3::new(0.0, 0.0, 10.0), epsilon = 1e-5);
        assert_relative_eq!(camera.depth_of(&Vec3::zeros()), 10.0, epsilon = 1e-5);
        assert!(camera.depth_of(&Vec3::new(0.0, 0.0, -5.0)) > camera.depth_of(&Vec3::zeros()));
    }

    #[test]
    fn test_point_light_range_from_attenuation() {
        // Quadratic only: 1 / d^2 = 1/256 at d = 16
        let range = PointLight::range_for_attenuation(&Vec3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(range, 16.0, epsilon = 1e-4);

        let linear = PointLight::range_for_attenuation(&Vec3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(linear, 255.0, epsilon = 1e-3);

        assert!(PointLight::range_for_attenuation(&Vec3::new(1.0, 0.0, 0.0)).is_infinite());
    }

    #[test]
    fn test_light_pass_count() {
        let mut frame = RenderFrame::new(RenderCamera::default(), (640, 480));
        assert_eq!(frame.light_pass_count(), 2);
        frame.directional_lights.push(DirectionalLight::new(Vec3::repeat(1.0), -Vec3::y()));
        frame.point_lights.push(PointLight::new(Vec3::repeat(1.0), Vec3::zeros(), Vec3::new(1.0, 0.0, 1.0)));
        assert_eq!(frame.light_pass_count(), 4);
    }
}
