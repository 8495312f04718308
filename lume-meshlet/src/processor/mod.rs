pub mod bounds;
pub mod hierarchy;
pub mod index_table;
pub mod partitioner;

use crate::data::{BakedMesh, IndexBuffer, IndexElement, MeshletData};
use crate::error::MeshletError;
use crate::{Meshlet, MeshletBounds};
use bytemuck::{Pod, Zeroable};
use hierarchy::{HierarchyConfig, build_hierarchy};
use partitioner::AdjacencyPartitioner;
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Instant;

/// Indexed triangle mesh fed to the processor. Attribute streams other than
/// positions may be empty.
#[derive(Clone, Debug, Default)]
pub struct SourceMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tangents: Vec<[f32; 4]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl SourceMesh {
    /// Builds a mesh from flat float streams as loaders such as tobj hand them out.
    pub fn from_flat(positions: &[f32], normals: &[f32], uvs: &[f32], indices: &[u32]) -> Self {
        Self {
            positions: positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect(),
            normals: normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect(),
            tangents: Vec::new(),
            uvs: uvs.chunks_exact(2).map(|t| [t[0], t[1]]).collect(),
            indices: indices.to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub max_vertices: usize,
    pub max_triangles: usize,
    pub cone_weight: f32,
    /// Missing keys fall back to the processor's hierarchy defaults, not the builder's.
    #[serde(default = "processor_hierarchy", deserialize_with = "hierarchy_over_defaults")]
    pub hierarchy: HierarchyConfig,
    /// Cluster level addressed by the index table, meshlet ids when unset.
    pub target_depth: Option<usize>,
    /// Bake 32-bit indices even when 16 bits would do.
    pub force_32bit_indices: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_vertices: 64,
            max_triangles: 128,
            cone_weight: 0.25,
            hierarchy: processor_hierarchy(),
            target_depth: None,
            force_32bit_indices: false,
        }
    }
}

fn processor_hierarchy() -> HierarchyConfig {
    HierarchyConfig {
        min_root_count: 256,
        ..Default::default()
    }
}

fn hierarchy_over_defaults<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HierarchyConfig, D::Error> {
    #[derive(Deserialize)]
    struct Partial {
        partition_size: Option<usize>,
        min_root_count: Option<usize>,
        min_relative_reduction: Option<f32>,
        min_absolute_reduction: Option<usize>,
        reduction_check_threshold: Option<usize>,
    }

    let partial = Partial::deserialize(deserializer)?;
    let defaults = processor_hierarchy();
    Ok(HierarchyConfig {
        partition_size: partial.partition_size.unwrap_or(defaults.partition_size),
        min_root_count: partial.min_root_count.unwrap_or(defaults.min_root_count),
        min_relative_reduction: partial.min_relative_reduction.unwrap_or(defaults.min_relative_reduction),
        min_absolute_reduction: partial.min_absolute_reduction.unwrap_or(defaults.min_absolute_reduction),
        reduction_check_threshold: partial.reduction_check_threshold.unwrap_or(defaults.reduction_check_threshold),
    })
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<(), MeshletError> {
        if self.max_vertices < 3 || self.max_vertices > 255 {
            return Err(MeshletError::InvalidConfig("max_vertices must be within 3..=255"));
        }
        if self.max_triangles == 0 || self.max_triangles > 512 || self.max_triangles % 4 != 0 {
            return Err(MeshletError::InvalidConfig(
                "max_triangles must be a multiple of 4 within 4..=512",
            ));
        }
        if self.hierarchy.partition_size < 2 {
            return Err(MeshletError::InvalidConfig("partition_size must be at least 2"));
        }
        Ok(())
    }
}

/// Interleaved vertex used for welding; every attribute takes part in the comparison.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
struct WeldVertex {
    position: [f32; 3],
    normal: [f32; 3],
    tangent: [f32; 4],
    uv: [f32; 2],
}

/// Runs the full preprocessing pipeline: weld, split into meshlets, fit
/// bounds, build the cluster tree, generate the index table and bake a
/// plain index buffer in final meshlet order.
pub fn process_mesh(source: &SourceMesh, config: &ProcessorConfig) -> Result<MeshletData, MeshletError> {
    config.validate()?;
    let start = Instant::now();

    let vertex_count = source.positions.len();
    let index_count = source.indices.len() / 3 * 3;
    if index_count == 0 || vertex_count == 0 {
        return Err(MeshletError::EmptyMesh);
    }
    let source_indices = &source.indices[..index_count];
    if let Some(&index) = source_indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(MeshletError::IndexOutOfRange { index, vertex_count });
    }

    let vertices: Vec<WeldVertex> = (0..vertex_count)
        .map(|i| WeldVertex {
            position: source.positions[i],
            normal: source.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
            tangent: source.tangents.get(i).copied().unwrap_or([1.0, 0.0, 0.0, 1.0]),
            uv: source.uvs.get(i).copied().unwrap_or([0.0, 0.0]),
        })
        .collect();
    let (unique_count, remap) = meshopt::generate_vertex_remap(&vertices, Some(source_indices));
    let indices = meshopt::remap_index_buffer(Some(source_indices), index_count, &remap);
    let vertices = meshopt::remap_vertex_buffer(&vertices, unique_count, &remap);
    log::debug!("welded {} vertices into {}", vertex_count, unique_count);

    let adapter = meshopt::VertexDataAdapter::new(
        bytemuck::cast_slice(&vertices),
        std::mem::size_of::<WeldVertex>(),
        0,
    )?;
    let built = meshopt::build_meshlets(
        &indices,
        &adapter,
        config.max_vertices,
        config.max_triangles,
        config.cone_weight,
    );
    if built.is_empty() {
        return Err(MeshletError::NoMeshlets);
    }

    let mut bounds: Vec<MeshletBounds> = (0..built.len())
        .into_par_iter()
        .map(|i| meshopt::compute_meshlet_bounds(built.get(i), &adapter).into())
        .collect();

    let meshopt::Meshlets {
        meshlets,
        vertices: mut meshlet_vertices,
        triangles: mut meshlet_triangles,
    } = built;
    let mut meshlets: Vec<Meshlet> = meshlets.into_iter().map(Meshlet::from).collect();
    log::info!(
        "built {} meshlets from {} triangles in {:.2?}",
        meshlets.len(),
        index_count / 3,
        start.elapsed()
    );

    let hierarchy = build_hierarchy(
        &mut meshlets,
        &mut meshlet_vertices,
        &mut meshlet_triangles,
        &mut bounds,
        unique_count,
        &AdjacencyPartitioner,
        &config.hierarchy,
    );

    let (index_table, table_format) = index_table::build_index_table(&meshlets, &hierarchy, config.target_depth);

    let wide = config.force_32bit_indices || unique_count >= u16::MAX as usize;
    let baked_indices = if wide {
        IndexBuffer::Wide(combined_indices(&meshlets, &meshlet_vertices, &meshlet_triangles))
    } else {
        IndexBuffer::Narrow(combined_indices(&meshlets, &meshlet_vertices, &meshlet_triangles))
    };
    let baked = BakedMesh {
        positions: vertices.iter().map(|v| v.position).collect(),
        normals: vertices.iter().map(|v| v.normal).collect(),
        tangents: vertices.iter().map(|v| v.tangent).collect(),
        uvs: vertices.iter().map(|v| v.uv).collect(),
        indices: baked_indices,
    };

    log::info!(
        "processed mesh in {:.2?}: {} meshlets, {} cluster levels, {:?} index table, {:?} baked indices",
        start.elapsed(),
        meshlets.len(),
        hierarchy.depth(),
        table_format,
        baked.indices.width()
    );

    Ok(MeshletData {
        baked,
        meshlets,
        meshlet_vertices,
        meshlet_triangles,
        index_table,
        table_format,
        bounds,
        cluster_nodes: hierarchy.nodes,
        hierarchy: hierarchy.levels,
    })
}

/// Expands the meshlet pools into one global triangle list.
pub fn combined_indices<I: IndexElement>(meshlets: &[Meshlet], meshlet_vertices: &[u32], meshlet_triangles: &[u8]) -> Vec<I> {
    let total: usize = meshlets.iter().map(|m| m.triangle_count as usize * 3).sum();
    let mut out = Vec::with_capacity(total);
    for m in meshlets {
        let vo = m.vertex_offset as usize;
        let to = m.triangle_offset as usize;
        for &local in &meshlet_triangles[to..to + m.triangle_count as usize * 3] {
            out.push(I::from_u32(meshlet_vertices[vo + local as usize]));
        }
    }
    out
}
