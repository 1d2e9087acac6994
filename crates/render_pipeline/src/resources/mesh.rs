//! Mesh resources, vertex layouts and CPU-resident dynamic meshes
//!
//! Vertex data travels as raw bytes in one of a small closed set of
//! layouts. Every layout starts with a three-float position so that the
//! batcher can move vertices into world space without knowing the rest of
//! the layout.

use super::{Handle, Resource, ResourceId};
use crate::foundation::math::{Aabb, Sphere, Vec3};
use std::fmt;

/// Mesh resource marker
#[derive(Debug)]
pub enum Mesh {}

impl Resource for Mesh {
    type Desc = MeshDesc;
    type Data = MeshData;
    const NAME: &'static str = "mesh";
}

/// Reference to a GPU mesh
pub type MeshId = ResourceId<Mesh>;

/// Owning mesh handle
pub type RenderMesh = Handle<Mesh>;

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonType {
    /// Independent triangles
    #[default]
    TriangleList,
    /// Triangle strip; cannot be concatenated with another strip
    TriangleStrip,
    /// Independent line segments
    LineList,
}

impl PolygonType {
    /// Whether meshes of this topology can share one index buffer
    pub const fn is_batchable(self) -> bool {
        matches!(self, Self::TriangleList | Self::LineList)
    }
}

/// Index element size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit indices
    #[default]
    U16,
    /// 32-bit indices
    U32,
}

impl IndexFormat {
    /// Size of one index in bytes
    pub const fn size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Whether the batcher accepts this index size
    pub const fn is_batchable(self) -> bool {
        matches!(self, Self::U16)
    }
}

/// Closed set of vertex layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexFormat {
    /// Position, normal, texture coordinates
    #[default]
    StaticMesh,
    /// Static layout plus joint indices and weights
    AnimatedMesh,
    /// Position, texture coordinates, packed colour
    Sprite,
    /// Position and packed colour, used for debug geometry
    PositionColour,
}

impl VertexFormat {
    /// Bytes per vertex
    pub const fn stride(self) -> usize {
        match self {
            Self::StaticMesh => 32,
            Self::AnimatedMesh => 64,
            Self::Sprite => 24,
            Self::PositionColour => 16,
        }
    }

    /// Byte offset of the normal, if the layout has one
    pub const fn normal_offset(self) -> Option<usize> {
        match self {
            Self::StaticMesh | Self::AnimatedMesh => Some(12),
            Self::Sprite | Self::PositionColour => None,
        }
    }

    /// Whether vertices in this layout can be pre-transformed into a batch
    ///
    /// Skinned vertices are deformed on the GPU, so they are excluded.
    pub const fn is_batchable(self) -> bool {
        !matches!(self, Self::AnimatedMesh)
    }
}

/// Read a three-float attribute at `offset`
pub(crate) fn read_vec3(bytes: &[u8], offset: usize) -> Vec3 {
    let [x, y, z] = bytemuck::pod_read_unaligned::<[f32; 3]>(&bytes[offset..offset + 12]);
    Vec3::new(x, y, z)
}

/// Overwrite a three-float attribute at `offset`
pub(crate) fn write_vec3(bytes: &mut [u8], offset: usize, value: &Vec3) {
    let floats = [value.x, value.y, value.z];
    bytes[offset..offset + 12].copy_from_slice(bytemuck::bytes_of(&floats));
}

/// Vertex type that knows its layout
pub trait Vertex {
    /// Layout this vertex encodes to
    const FORMAT: VertexFormat;

    /// Position of the vertex
    fn position(&self) -> Vec3;

    /// Append the encoded vertex to `out`
    fn write_to(&self, out: &mut Vec<u8>);
}

/// Vertex for [`VertexFormat::StaticMesh`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StaticVertex {
    /// Position
    pub position: [f32; 3],
    /// Normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex for StaticVertex {
    const FORMAT: VertexFormat = VertexFormat::StaticMesh;

    fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(bytemuck::cast_slice(&self.position));
        out.extend_from_slice(bytemuck::cast_slice(&self.normal));
        out.extend_from_slice(bytemuck::cast_slice(&self.uv));
    }
}

/// Vertex for [`VertexFormat::AnimatedMesh`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SkinnedVertex {
    /// Position
    pub position: [f32; 3],
    /// Normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
    /// Joint indices, stored as floats
    pub joints: [f32; 4],
    /// Joint weights
    pub weights: [f32; 4],
}

impl Vertex for SkinnedVertex {
    const FORMAT: VertexFormat = VertexFormat::AnimatedMesh;

    fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(bytemuck::cast_slice(&self.position));
        out.extend_from_slice(bytemuck::cast_slice(&self.normal));
        out.extend_from_slice(bytemuck::cast_slice(&self.uv));
        out.extend_from_slice(bytemuck::cast_slice(&self.joints));
        out.extend_from_slice(bytemuck::cast_slice(&self.weights));
    }
}

/// Vertex for [`VertexFormat::Sprite`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpriteVertex {
    /// Position
    pub position: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
    /// RGBA colour, one byte per channel
    pub colour: [u8; 4],
}

impl Vertex for SpriteVertex {
    const FORMAT: VertexFormat = VertexFormat::Sprite;

    fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(bytemuck::cast_slice(&self.position));
        out.extend_from_slice(bytemuck::cast_slice(&self.uv));
        out.extend_from_slice(&self.colour);
    }
}

/// Vertex for [`VertexFormat::PositionColour`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColourVertex {
    /// Position
    pub position: [f32; 3],
    /// RGBA colour, one byte per channel
    pub colour: [u8; 4],
}

impl Vertex for ColourVertex {
    const FORMAT: VertexFormat = VertexFormat::PositionColour;

    fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(bytemuck::cast_slice(&self.position));
        out.extend_from_slice(&self.colour);
    }
}

/// Immutable description of a GPU mesh
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeshDesc {
    /// Topology
    pub polygon_type: PolygonType,
    /// Vertex layout
    pub vertex_format: VertexFormat,
    /// Index size
    pub index_format: IndexFormat,
    /// Number of vertices
    pub vertex_count: usize,
    /// Number of indices
    pub index_count: usize,
    /// Local-space bounds
    pub bounding_sphere: Sphere,
}

/// Vertex and index bytes uploaded by a mesh load
#[derive(Clone, Default)]
pub struct MeshData {
    /// Encoded vertices
    pub vertices: Vec<u8>,
    /// Encoded indices
    pub indices: Vec<u8>,
}

impl fmt::Debug for MeshData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshData")
            .field("vertex_bytes", &self.vertices.len())
            .field("index_bytes", &self.indices.len())
            .finish()
    }
}

/// CPU-resident mesh rebuilt by the game side, e.g. sprites and particles
///
/// Dynamic meshes never become GPU handles; they are either copied into a
/// batch or uploaded by the backend as part of the draw command.
#[derive(Clone, PartialEq)]
pub struct DynamicMesh {
    polygon_type: PolygonType,
    vertex_format: VertexFormat,
    index_format: IndexFormat,
    vertices: Vec<u8>,
    indices: Vec<u8>,
    bounding_sphere: Sphere,
}

impl DynamicMesh {
    /// Wrap already encoded vertex and index bytes
    ///
    /// # Panics
    ///
    /// Panics if the byte lengths are not whole vertices and indices.
    pub fn from_bytes(
        polygon_type: PolygonType,
        vertex_format: VertexFormat,
        index_format: IndexFormat,
        vertices: Vec<u8>,
        indices: Vec<u8>,
        bounding_sphere: Sphere,
    ) -> Self {
        assert_eq!(vertices.len() % vertex_format.stride(), 0, "partial vertex in mesh data");
        assert_eq!(indices.len() % index_format.size(), 0, "partial index in mesh data");
        Self {
            polygon_type,
            vertex_format,
            index_format,
            vertices,
            indices,
            bounding_sphere,
        }
    }

    /// Encode typed vertices with 16-bit indices; bounds are computed
    pub fn from_vertices<V: Vertex>(polygon_type: PolygonType, vertices: &[V], indices: &[u16]) -> Self {
        let mut bytes = Vec::with_capacity(vertices.len() * V::FORMAT.stride());
        let mut bounds = Aabb::empty();
        for vertex in vertices {
            vertex.write_to(&mut bytes);
            bounds.grow(&vertex.position());
        }

        Self::from_bytes(
            polygon_type,
            V::FORMAT,
            IndexFormat::U16,
            bytes,
            bytemuck::cast_slice(indices).to_vec(),
            bounds.bounding_sphere(),
        )
    }

    /// Topology
    pub const fn polygon_type(&self) -> PolygonType {
        self.polygon_type
    }

    /// Vertex layout
    pub const fn vertex_format(&self) -> VertexFormat {
        self.vertex_format
    }

    /// Index size
    pub const fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    /// Encoded vertices
    pub fn vertex_bytes(&self) -> &[u8] {
        &self.vertices
    }

    /// Encoded indices
    pub fn index_bytes(&self) -> &[u8] {
        &self.indices
    }

    /// Local-space bounds
    pub const fn bounding_sphere(&self) -> Sphere {
        self.bounding_sphere
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / self.vertex_format.stride()
    }

    /// Number of indices
    pub fn index_count(&self) -> usize {
        self.indices.len() / self.index_format.size()
    }

    /// Decode the indices as 32-bit values regardless of storage size
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        let size = self.index_format.size();
        self.indices.chunks_exact(size).map(move |chunk| match size {
            2 => u32::from(u16::from_ne_bytes([chunk[0], chunk[1]])),
            _ => u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        })
    }

    /// Position of vertex `index`
    pub fn position(&self, index: usize) -> Vec3 {
        read_vec3(&self.vertices, index * self.vertex_format.stride())
    }

    /// Description matching this mesh, e.g. for uploading it as a handle
    pub fn desc(&self) -> MeshDesc {
        MeshDesc {
            polygon_type: self.polygon_type,
            vertex_format: self.vertex_format,
            index_format: self.index_format,
            vertex_count: self.vertex_count(),
            index_count: self.index_count(),
            bounding_sphere: self.bounding_sphere,
        }
    }
}

impl fmt::Debug for DynamicMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicMesh")
            .field("polygon_type", &self.polygon_type)
            .field("vertex_format", &self.vertex_format)
            .field("vertices", &self.vertex_count())
            .field("indices", &self.index_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vertex_strides_match_encoders() {
        let mut out = Vec::new();
        StaticVertex::default().write_to(&mut out);
        assert_eq!(out.len(), VertexFormat::StaticMesh.stride());

        out.clear();
        SkinnedVertex::default().write_to(&mut out);
        assert_eq!(out.len(), VertexFormat::AnimatedMesh.stride());

        out.clear();
        SpriteVertex::default().write_to(&mut out);
        assert_eq!(out.len(), VertexFormat::Sprite.stride());

        out.clear();
        ColourVertex::default().write_to(&mut out);
        assert_eq!(out.len(), VertexFormat::PositionColour.stride());
    }

    #[test]
    fn test_from_vertices_counts_and_bounds() {
        let vertices = [
            SpriteVertex { position: [-1.0, 0.0, 0.0], ..Default::default() },
            SpriteVertex { position: [1.0, 0.0, 0.0], ..Default::default() },
            SpriteVertex { position: [0.0, 1.0, 0.0], ..Default::default() },
        ];
        let mesh = DynamicMesh::from_vertices(PolygonType::TriangleList, &vertices, &[0, 1, 2]);

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.index_count(), 3);
        assert_eq!(mesh.indices().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_relative_eq!(mesh.position(2), Vec3::new(0.0, 1.0, 0.0));
        assert!(mesh.bounding_sphere().radius >= 1.0);
    }

    #[test]
    fn test_batchable_sets() {
        assert!(!VertexFormat::AnimatedMesh.is_batchable());
        assert!(VertexFormat::Sprite.is_batchable());
        assert!(!IndexFormat::U32.is_batchable());
        assert!(!PolygonType::TriangleStrip.is_batchable());
    }
}
