//! # Small Mesh Batcher
//!
//! Merges many small dynamic meshes (sprites, particles, debug geometry)
//! into one shared vertex/index buffer so they go out as a single draw.
//!
//! ## Architecture
//!
//! - Vertices are moved into world space while they are copied, since one
//!   batch mixes many transforms
//! - Indices are offset by the running vertex count of the batch
//! - A change of polygon type, vertex format or index format, or running out
//!   of room, flushes the current batch first
//!
//! A flush emits the batch with whatever render state is currently bound,
//! so callers must flush before changing material or any other state the
//! draw command does not carry.

use super::commands::{RenderCommand, RenderCommandList};
use super::render_object::RenderObject;
use crate::core::config::{BatchConfig, MAX_BATCH_VERTEX_CAPACITY};
use crate::foundation::math::{Aabb, Mat4, Point3};
use crate::resources::mesh::{read_vec3, write_vec3};
use crate::resources::{DynamicMesh, IndexFormat, PolygonType, VertexFormat};
use std::sync::Arc;

/// Layout shared by everything in the active batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BatchFormat {
    polygon_type: PolygonType,
    vertex_format: VertexFormat,
    index_format: IndexFormat,
}

impl BatchFormat {
    fn of(mesh: &DynamicMesh) -> Self {
        Self {
            polygon_type: mesh.polygon_type(),
            vertex_format: mesh.vertex_format(),
            index_format: mesh.index_format(),
        }
    }
}

/// Statistics for batch rendering performance monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Objects copied into batches
    pub objects_batched: usize,
    /// Draw commands emitted
    pub flushes: usize,
    /// Flushes forced by a polygon type or format change
    pub format_flushes: usize,
    /// Flushes forced by running out of buffer space
    pub capacity_flushes: usize,
}

impl BatchStats {
    /// Calculate average objects per emitted batch
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_objects_per_batch(&self) -> f32 {
        if self.flushes == 0 {
            0.0
        } else {
            self.objects_batched as f32 / self.flushes as f32
        }
    }
}

/// Accumulates small dynamic meshes into shared buffers
#[derive(Debug)]
pub struct SmallMeshBatcher {
    config: BatchConfig,
    format: Option<BatchFormat>,
    vertices: Vec<u8>,
    indices: Vec<u16>,
    vertex_count: usize,
    bounds: Aabb,
    stats: BatchStats,
}

impl SmallMeshBatcher {
    /// Create a batcher with the given limits
    ///
    /// # Panics
    ///
    /// Panics if the vertex capacity cannot be addressed with 16-bit indices.
    pub fn new(config: BatchConfig) -> Self {
        assert!(
            config.vertex_capacity <= MAX_BATCH_VERTEX_CAPACITY,
            "batch vertex capacity {} exceeds 16-bit index range",
            config.vertex_capacity
        );
        Self {
            config,
            format: None,
            vertices: Vec::new(),
            indices: Vec::with_capacity(config.index_capacity),
            vertex_count: 0,
            bounds: Aabb::empty(),
            stats: BatchStats::default(),
        }
    }

    /// Whether `object` may be passed to [`Self::batch`]
    ///
    /// True only for dynamic meshes with a batchable topology, vertex format
    /// and index format, fewer vertices than the small-mesh threshold, and
    /// few enough indices to fit an empty batch.
    pub fn can_batch(&self, object: &RenderObject) -> bool {
        object
            .kind()
            .dynamic_mesh()
            .is_some_and(|mesh| self.can_batch_mesh(mesh))
    }

    fn can_batch_mesh(&self, mesh: &DynamicMesh) -> bool {
        mesh.polygon_type().is_batchable()
            && mesh.vertex_format().is_batchable()
            && mesh.index_format().is_batchable()
            && mesh.vertex_count() < self.config.small_mesh_vertex_threshold
            && mesh.vertex_count() <= self.config.vertex_capacity
            && mesh.index_count() <= self.config.index_capacity
    }

    /// Add an object to the current batch, flushing first if needed
    ///
    /// # Panics
    ///
    /// Panics if [`Self::can_batch`] is false for the object.
    pub fn batch(&mut self, object: &RenderObject, list: &mut RenderCommandList) {
        let mesh = match object.kind().dynamic_mesh() {
            Some(mesh) if self.can_batch_mesh(mesh) => mesh,
            _ => panic!("object cannot be batched: {:?}", object.kind()),
        };

        let format = BatchFormat::of(mesh);
        if self.format.is_some_and(|active| active != format) {
            self.stats.format_flushes += 1;
            self.flush(list);
        } else if self.vertex_count + mesh.vertex_count() > self.config.vertex_capacity
            || self.indices.len() + mesh.index_count() > self.config.index_capacity
        {
            self.stats.capacity_flushes += 1;
            self.flush(list);
        }
        self.format = Some(format);

        self.append(mesh, object.world());
        self.stats.objects_batched += 1;
    }

    fn append(&mut self, mesh: &DynamicMesh, world: &Mat4) {
        let stride = mesh.vertex_format().stride();
        let normal_offset = mesh.vertex_format().normal_offset();
        let start = self.vertices.len();
        self.vertices.extend_from_slice(mesh.vertex_bytes());

        // Inverse-transpose keeps normals perpendicular under non-uniform scale
        let linear = world.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = linear.try_inverse().map_or(linear, |inverse| inverse.transpose());

        for vertex in self.vertices[start..].chunks_exact_mut(stride) {
            let local = read_vec3(vertex, 0);
            let position = world.transform_point(&Point3::from(local)).coords;
            write_vec3(vertex, 0, &position);
            self.bounds.grow(&position);

            if let Some(offset) = normal_offset {
                let normal = normal_matrix * read_vec3(vertex, offset);
                let normal = normal.try_normalize(f32::EPSILON).unwrap_or(normal);
                write_vec3(vertex, offset, &normal);
            }
        }

        // Capacity is capped to the u16 range, so the offset index fits
        let base = self.vertex_count;
        #[allow(clippy::cast_possible_truncation)]
        self.indices.extend(mesh.indices().map(|index| (base + index as usize) as u16));
        self.vertex_count += mesh.vertex_count();
    }

    /// Emit the accumulated batch as one draw command and reset
    ///
    /// Does nothing when the batch is empty.
    pub fn flush(&mut self, list: &mut RenderCommandList) {
        let Some(format) = self.format.take() else {
            return;
        };
        if self.vertex_count == 0 {
            return;
        }

        let mesh = DynamicMesh::from_bytes(
            format.polygon_type,
            format.vertex_format,
            IndexFormat::U16,
            std::mem::take(&mut self.vertices),
            bytemuck::cast_slice(&self.indices).to_vec(),
            self.bounds.bounding_sphere(),
        );
        log::trace!("Flushing batch of {} vertices", mesh.vertex_count());

        list.push(RenderCommand::RenderDynamicMesh {
            mesh: Arc::new(mesh),
            world: Mat4::identity(),
        });

        self.indices.clear();
        self.vertex_count = 0;
        self.bounds = Aabb::empty();
        self.stats.flushes += 1;
    }

    /// Whether anything is waiting to be flushed
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    /// Counters since creation
    pub const fn stats(&self) -> BatchStats {
        self.stats
    }
}
