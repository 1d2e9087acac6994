//! Math utilities and types
//!
//! Provides the nalgebra aliases used throughout the pipeline plus the
//! bounding shapes needed for culling and light influence tests.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Linear RGBA colour
pub type Colour = Vec4;

/// Extract the translation column of an affine matrix
pub fn translation_of(matrix: &Mat4) -> Vec3 {
    Vec3::new(matrix.m14, matrix.m24, matrix.m34)
}

/// Largest axis scale of an affine matrix
///
/// Used to scale bounding sphere radii when moving them to world space.
pub fn max_axis_scale(matrix: &Mat4) -> f32 {
    let x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
    let y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
    let z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
    x.max(y).max(z)
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Centre of the sphere
    pub centre: Vec3,
    /// Radius of the sphere
    pub radius: f32,
}

impl Sphere {
    /// Create a new sphere
    pub const fn new(centre: Vec3, radius: f32) -> Self {
        Self { centre, radius }
    }

    /// Transform a local-space sphere into the space described by `matrix`
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let centre = matrix.transform_point(&Point3::from(self.centre));
        Self {
            centre: centre.coords,
            radius: self.radius * max_axis_scale(matrix),
        }
    }

    /// Whether the two spheres overlap or touch
    pub fn intersects(&self, other: &Self) -> bool {
        let reach = self.radius + other.radius;
        (self.centre - other.centre).magnitude_squared() <= reach * reach
    }

    /// Whether `other` lies entirely inside this sphere
    pub fn contains(&self, other: &Self) -> bool {
        (self.centre - other.centre).magnitude() + other.radius <= self.radius
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(Vec3::zeros(), 0.0)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that any `grow` call will replace
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::MAX),
            max: Vec3::repeat(f32::MIN),
        }
    }

    /// Whether nothing has been added to the box yet
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow the box to include a point
    pub fn grow(&mut self, point: &Vec3) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Grow the box to include a cube of half extent `half_size` around `point`
    pub fn grow_by(&mut self, point: &Vec3, half_size: f32) {
        let extent = Vec3::repeat(half_size);
        self.grow(&(point - extent));
        self.grow(&(point + extent));
    }

    /// Centre of the box
    pub fn centre(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Smallest sphere enclosing the box. Empty boxes give a zero sphere.
    pub fn bounding_sphere(&self) -> Sphere {
        if self.is_empty() {
            return Sphere::default();
        }
        Sphere::new(self.centre(), (self.max - self.min).magnitude() * 0.5)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

/// View frustum as six inward-facing planes `(normal, distance)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract the frustum planes from a view-projection matrix
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let row = |i: usize| view_projection.row(i).transpose();
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2].map(|plane| {
            let length = plane.xyz().magnitude();
            if length > f32::EPSILON {
                plane / length
            } else {
                plane
            }
        });
        Self { planes }
    }

    /// Whether any part of the sphere is inside the frustum
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.xyz().dot(&sphere.centre) + plane.w >= -sphere.radius)
    }
}
