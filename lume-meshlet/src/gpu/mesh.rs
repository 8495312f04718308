use super::kernels::{mesh_binding, storage};
use crate::data::{IndexTableFormat, IndexWidth, MeshletData};
use crate::error::MeshletError;
use crate::{ClusterNode, HierarchyLevelInfo, Meshlet, MeshletBounds};
use lume_core::LumeResult;
use lume_core::device::*;

pub(crate) fn create_storage<D: Device>(device: &D, size: u64, extra: BufferUsage) -> LumeResult<D::Buffer> {
    device.create_buffer(BufferDescriptor {
        // zero-sized bindings are not allowed
        size: size.max(4).next_multiple_of(4),
        usage: BufferUsage::STORAGE | extra,
        mapped_at_creation: false,
    })
}

fn upload<D: Device>(device: &D, bytes: &[u8]) -> LumeResult<D::Buffer> {
    let buffer = device.create_buffer(BufferDescriptor {
        size: (bytes.len() as u64).max(4).next_multiple_of(4),
        usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
        mapped_at_creation: true,
    })?;
    if !bytes.is_empty() {
        buffer.write_data(0, bytes)?;
    }
    Ok(buffer)
}

/// Device-resident copy of one meshlet mesh plus the output index buffer the
/// compaction pass writes into.
pub struct MeshletMeshGpu<D: Device> {
    pub meshlet_buffer: D::Buffer,
    pub bounds_buffer: D::Buffer,
    pub cluster_node_buffer: D::Buffer,
    pub meshlet_vertex_buffer: D::Buffer,
    pub meshlet_triangle_buffer: D::Buffer,
    pub index_table_buffer: D::Buffer,
    pub triangle_base_buffer: D::Buffer,
    /// Compacted triangle list, sized for every meshlet triangle.
    pub index_buffer: D::Buffer,

    pub bind_group_layout: D::BindGroupLayout,
    pub bind_group: D::BindGroup,

    pub meshlet_count: u32,
    pub triangle_count: u32,
    pub levels: Vec<HierarchyLevelInfo>,
    pub table_format: IndexTableFormat,
    pub index_width: IndexWidth,
    pub hierarchy_enabled: bool,
}

impl<D: Device> MeshletMeshGpu<D> {
    pub fn new(device: &D, data: &MeshletData) -> Result<Self, MeshletError> {
        if data.meshlets.is_empty() || data.meshlets.len() != data.bounds.len() {
            return Err(MeshletError::NoMeshlets);
        }
        if let Some(bad) = data.first_invalid_meshlet() {
            return Err(MeshletError::MeshletOutOfRange(bad));
        }

        let mut triangle_base = Vec::with_capacity(data.meshlets.len());
        let mut running = 0u32;
        for (i, m) in data.meshlets.iter().enumerate() {
            triangle_base.push(running);
            running = running
                .checked_add(m.triangle_count)
                .ok_or(MeshletError::MeshletOutOfRange(i))?;
        }
        let triangle_count = running;

        let index_width = if data.baked.indices.is_empty() {
            let max_vertex = data.meshlet_vertices.iter().copied().max().unwrap_or(0);
            if max_vertex as usize + 1 >= u16::MAX as usize { IndexWidth::Wide } else { IndexWidth::Narrow }
        } else {
            data.baked.indices.width()
        };

        let meshlet_buffer = upload(device, bytemuck::cast_slice::<Meshlet, u8>(&data.meshlets))?;
        let bounds_buffer = upload(device, bytemuck::cast_slice::<MeshletBounds, u8>(&data.bounds))?;
        let cluster_node_buffer = upload(device, bytemuck::cast_slice::<ClusterNode, u8>(&data.cluster_nodes))?;
        let meshlet_vertex_buffer = upload(device, bytemuck::cast_slice(&data.meshlet_vertices))?;
        let meshlet_triangle_buffer = upload(device, &data.meshlet_triangles)?;
        let index_table_buffer = upload(device, &data.index_table)?;
        let triangle_base_buffer = upload(device, bytemuck::cast_slice(&triangle_base))?;
        let index_buffer = create_storage(
            device,
            triangle_count as u64 * 3 * index_width.bytes() as u64,
            BufferUsage::INDEX | BufferUsage::COPY_SRC,
        )?;

        let bind_group_layout = device.create_bind_group_layout(BindGroupLayoutDescriptor {
            entries: vec![
                storage(mesh_binding::MESHLETS, true),
                storage(mesh_binding::BOUNDS, true),
                storage(mesh_binding::CLUSTER_NODES, true),
                storage(mesh_binding::MESHLET_VERTICES, true),
                storage(mesh_binding::MESHLET_TRIANGLES, true),
                storage(mesh_binding::INDEX_TABLE, true),
                storage(mesh_binding::TRIANGLE_BASE, true),
            ],
        })?;
        let bind_group = device.create_bind_group(BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: vec![
                BindGroupEntry { binding: mesh_binding::MESHLETS, resource: BindingResource::Buffer(&meshlet_buffer) },
                BindGroupEntry { binding: mesh_binding::BOUNDS, resource: BindingResource::Buffer(&bounds_buffer) },
                BindGroupEntry {
                    binding: mesh_binding::CLUSTER_NODES,
                    resource: BindingResource::Buffer(&cluster_node_buffer),
                },
                BindGroupEntry {
                    binding: mesh_binding::MESHLET_VERTICES,
                    resource: BindingResource::Buffer(&meshlet_vertex_buffer),
                },
                BindGroupEntry {
                    binding: mesh_binding::MESHLET_TRIANGLES,
                    resource: BindingResource::Buffer(&meshlet_triangle_buffer),
                },
                BindGroupEntry {
                    binding: mesh_binding::INDEX_TABLE,
                    resource: BindingResource::Buffer(&index_table_buffer),
                },
                BindGroupEntry {
                    binding: mesh_binding::TRIANGLE_BASE,
                    resource: BindingResource::Buffer(&triangle_base_buffer),
                },
            ],
        })?;

        let hierarchy_enabled = data.has_hierarchy();
        log::debug!(
            "uploaded {} meshlets, {} triangles, {} cluster levels, {:?} indices",
            data.meshlets.len(),
            triangle_count,
            data.hierarchy.len(),
            index_width
        );

        Ok(Self {
            meshlet_buffer,
            bounds_buffer,
            cluster_node_buffer,
            meshlet_vertex_buffer,
            meshlet_triangle_buffer,
            index_table_buffer,
            triangle_base_buffer,
            index_buffer,
            bind_group_layout,
            bind_group,
            meshlet_count: data.meshlets.len() as u32,
            triangle_count,
            levels: data.hierarchy.clone(),
            table_format: data.table_format,
            index_width,
            hierarchy_enabled,
        })
    }

    /// Deepest cluster level, zero in flat mode.
    pub fn max_depth(&self) -> u32 {
        if self.hierarchy_enabled { self.levels.len() as u32 - 1 } else { 0 }
    }

    /// Largest number of candidates either ping-pong list has to hold.
    pub fn candidate_capacity(&self) -> u32 {
        let widest_level = self.levels.iter().map(|l| l.count.max(0) as u32).max().unwrap_or(0);
        self.meshlet_count.max(widest_level)
    }
}
