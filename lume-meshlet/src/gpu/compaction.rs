use super::culling::{CullingPass, require_kernel};
use super::kernels::*;
use super::mesh::{MeshletMeshGpu, create_storage};
use crate::data::IndexWidth;
use crate::error::MeshletError;
use lume_core::device::*;

/// Expands the visible meshlets into one indexed draw.
///
/// Writes the mesh's output index buffer, a per-triangle id buffer holding the
/// index-table entry of each emitted triangle, and indexed draw arguments
/// whose index count is the final value of the shared index counter.
pub struct CompactionPass<D: Device> {
    pub pipeline: D::ComputePipeline,
    pub pipeline_layout: D::PipelineLayout,
    pub output_layout: D::BindGroupLayout,
    pub output_group: D::BindGroup,

    pub uniform_buffer: D::Buffer,
    pub triangle_id_buffer: D::Buffer,
    pub index_counter_buffer: D::Buffer,
    /// `DrawIndexedArgs`, usable as an indirect draw buffer.
    pub draw_args_buffer: D::Buffer,
    pub dispatch_args_buffer: D::Buffer,

    pub index_width: IndexWidth,
}

impl<D: Device> CompactionPass<D> {
    pub fn new(device: &D, mesh: &MeshletMeshGpu<D>, culling: &CullingPass<D>) -> Result<Self, MeshletError> {
        let entry_point = match mesh.index_width {
            IndexWidth::Narrow => COMPACTION_U16,
            IndexWidth::Wide => COMPACTION_U32,
        };
        require_kernel(device, entry_point)?;

        let output_layout = device.create_bind_group_layout(BindGroupLayoutDescriptor {
            entries: vec![
                uniform(output_binding::UNIFORMS),
                storage(output_binding::VISIBLE_MESHLETS, true),
                storage(output_binding::INDICES, false),
                storage(output_binding::TRIANGLE_IDS, false),
                storage(output_binding::INDEX_COUNTER, false),
            ],
        })?;
        let pipeline_layout = device.create_pipeline_layout(PipelineLayoutDescriptor {
            bind_group_layouts: &[&mesh.bind_group_layout, &output_layout],
        })?;
        let pipeline = device.create_compute_pipeline(ComputePipelineDescriptor {
            entry_point,
            layout: &pipeline_layout,
        })?;

        let uniforms = CompactionUniforms {
            table_width: mesh.table_format.width() as u32,
            meshlet_count: mesh.meshlet_count,
            _pad: [0; 2],
        };
        let uniform_buffer = device.create_buffer(BufferDescriptor {
            size: std::mem::size_of::<CompactionUniforms>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            mapped_at_creation: true,
        })?;
        uniform_buffer.write_data(0, bytemuck::bytes_of(&uniforms))?;

        let triangle_id_buffer = create_storage(device, mesh.triangle_count as u64 * 4, BufferUsage::COPY_SRC)?;
        let index_counter_buffer = create_storage(device, 4, BufferUsage::COPY_SRC | BufferUsage::COPY_DST)?;
        let draw_args_buffer = create_storage(
            device,
            std::mem::size_of::<DrawIndexedArgs>() as u64,
            BufferUsage::INDIRECT | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
        )?;
        let dispatch_args_buffer = create_storage(
            device,
            std::mem::size_of::<DispatchArgs>() as u64,
            BufferUsage::INDIRECT | BufferUsage::COPY_DST,
        )?;

        let output_group = device.create_bind_group(BindGroupDescriptor {
            layout: &output_layout,
            entries: vec![
                BindGroupEntry { binding: output_binding::UNIFORMS, resource: BindingResource::Buffer(&uniform_buffer) },
                BindGroupEntry {
                    binding: output_binding::VISIBLE_MESHLETS,
                    resource: BindingResource::Buffer(&culling.visible_meshlet_buffer),
                },
                BindGroupEntry { binding: output_binding::INDICES, resource: BindingResource::Buffer(&mesh.index_buffer) },
                BindGroupEntry {
                    binding: output_binding::TRIANGLE_IDS,
                    resource: BindingResource::Buffer(&triangle_id_buffer),
                },
                BindGroupEntry {
                    binding: output_binding::INDEX_COUNTER,
                    resource: BindingResource::Buffer(&index_counter_buffer),
                },
            ],
        })?;

        Ok(Self {
            pipeline,
            pipeline_layout,
            output_layout,
            output_group,
            uniform_buffer,
            triangle_id_buffer,
            index_counter_buffer,
            draw_args_buffer,
            dispatch_args_buffer,
            index_width: mesh.index_width,
        })
    }

    /// Records compaction after `culling` has been recorded into the same
    /// command buffer.
    pub fn record(&self, cmd: &mut D::CommandBuffer, mesh: &MeshletMeshGpu<D>, culling: &CullingPass<D>) {
        cmd.fill_buffer(&self.index_counter_buffer, 0, 4, 0);
        cmd.update_buffer(&self.draw_args_buffer, 0, bytemuck::bytes_of(&DrawIndexedArgs::EMPTY));
        cmd.update_buffer(&self.dispatch_args_buffer, 0, bytemuck::bytes_of(&DispatchArgs::linear(0)));
        // one workgroup per visible meshlet
        cmd.copy_buffer_to_buffer(&culling.visible_counter_buffer, 0, &self.dispatch_args_buffer, 0, 4);
        cmd.compute_barrier();

        cmd.bind_compute_pipeline(&self.pipeline);
        cmd.bind_bind_group(MESH_GROUP, &mesh.bind_group);
        cmd.bind_bind_group(OUTPUT_GROUP, &self.output_group);
        cmd.dispatch_indirect(&self.dispatch_args_buffer, 0);
        cmd.compute_barrier();

        cmd.copy_buffer_to_buffer(&self.index_counter_buffer, 0, &self.draw_args_buffer, 0, 4);
    }
}
