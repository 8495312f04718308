use super::frustum::{ClipDepth, extract_planes, object_scale};
use super::kernels::*;
use super::mesh::{MeshletMeshGpu, create_storage};
use crate::error::MeshletError;
use glam::Mat4;
use lume_core::LumeError;
use lume_core::device::*;

/// Camera and object transform for one culling run.
#[derive(Copy, Clone, Debug)]
pub struct CullView {
    pub view_projection: Mat4,
    pub object_to_world: Mat4,
    pub clip_depth: ClipDepth,
}

impl CullView {
    pub fn new(view_projection: Mat4) -> Self {
        Self {
            view_projection,
            object_to_world: Mat4::IDENTITY,
            clip_depth: ClipDepth::default(),
        }
    }

    pub fn with_object(mut self, object_to_world: Mat4) -> Self {
        self.object_to_world = object_to_world;
        self
    }
}

pub(crate) fn require_kernel<D: Device>(device: &D, entry_point: &str) -> Result<(), MeshletError> {
    if device.supports_kernel(entry_point) {
        Ok(())
    } else {
        log::error!("compute kernel {} is not available on this device", entry_point);
        Err(LumeError::UnsupportedKernel(entry_point.to_string()).into())
    }
}

/// Hierarchical frustum culling of one meshlet mesh.
///
/// Each depth culls the candidates left by the previous one and appends the
/// children of surviving nodes to the other ping-pong list. Survivor counts
/// never leave the device: `prepare_cluster` turns them into the indirect
/// arguments of the next dispatch.
pub struct CullingPass<D: Device> {
    pub cull_cluster: D::ComputePipeline,
    pub prepare_cluster: D::ComputePipeline,
    pub cull_meshlet: D::ComputePipeline,
    pub pipeline_layout: D::PipelineLayout,
    pub frame_layout: D::BindGroupLayout,
    pub ping_pong_layout: D::BindGroupLayout,

    pub uniform_buffer: D::Buffer,
    pub depth_buffer: D::Buffer,
    /// Survivor count per depth.
    pub cluster_counter_buffer: D::Buffer,
    pub dispatch_args_buffer: D::Buffer,
    pub candidates: [D::Buffer; 2],
    pub visible_meshlet_buffer: D::Buffer,
    pub visible_counter_buffer: D::Buffer,

    pub frame_group: D::BindGroup,
    /// `[0]` reads B and writes A, `[1]` reads A and writes B.
    pub ping_pong: [D::BindGroup; 2],

    root_first: u32,
    root_count: u32,
    max_depth: u32,
    meshlet_count: u32,
    hierarchy_enabled: bool,
    cluster_group_size: u32,
    meshlet_group_size: u32,
}

impl<D: Device> CullingPass<D> {
    pub fn new(device: &D, mesh: &MeshletMeshGpu<D>) -> Result<Self, MeshletError> {
        for entry in [CULL_CLUSTER, PREPARE_CLUSTER, CULL_MESHLET] {
            require_kernel(device, entry)?;
        }

        let frame_layout = device.create_bind_group_layout(BindGroupLayoutDescriptor {
            entries: vec![
                uniform(frame_binding::UNIFORMS),
                storage(frame_binding::DEPTH, false),
                storage(frame_binding::CLUSTER_COUNTERS, false),
                storage(frame_binding::DISPATCH_ARGS, false),
                storage(frame_binding::VISIBLE_MESHLETS, false),
                storage(frame_binding::VISIBLE_COUNTER, false),
            ],
        })?;
        let ping_pong_layout = device.create_bind_group_layout(BindGroupLayoutDescriptor {
            entries: vec![storage(ping_pong_binding::READ, true), storage(ping_pong_binding::WRITE, false)],
        })?;
        let pipeline_layout = device.create_pipeline_layout(PipelineLayoutDescriptor {
            bind_group_layouts: &[&mesh.bind_group_layout, &frame_layout, &ping_pong_layout],
        })?;

        let pipeline = |entry_point: &str| {
            device.create_compute_pipeline(ComputePipelineDescriptor {
                entry_point,
                layout: &pipeline_layout,
            })
        };
        let cull_cluster = pipeline(CULL_CLUSTER)?;
        let prepare_cluster = pipeline(PREPARE_CLUSTER)?;
        let cull_meshlet = pipeline(CULL_MESHLET)?;

        let uniform_buffer = device.create_buffer(BufferDescriptor {
            size: std::mem::size_of::<CullUniforms>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;
        let depth_buffer = create_storage(device, 4, BufferUsage::COPY_DST)?;
        let cluster_counter_buffer = create_storage(device, mesh.levels.len() as u64 * 4, BufferUsage::COPY_DST)?;
        let dispatch_args_buffer = create_storage(
            device,
            std::mem::size_of::<DispatchArgs>() as u64,
            BufferUsage::INDIRECT | BufferUsage::COPY_DST,
        )?;
        let capacity = mesh.candidate_capacity() as u64 * 4;
        let candidates = [
            create_storage(device, capacity, BufferUsage::COPY_SRC)?,
            create_storage(device, capacity, BufferUsage::COPY_SRC)?,
        ];
        let visible_meshlet_buffer = create_storage(device, mesh.meshlet_count as u64 * 4, BufferUsage::COPY_SRC)?;
        let visible_counter_buffer = create_storage(device, 4, BufferUsage::COPY_SRC | BufferUsage::COPY_DST)?;

        let frame_group = device.create_bind_group(BindGroupDescriptor {
            layout: &frame_layout,
            entries: vec![
                BindGroupEntry { binding: frame_binding::UNIFORMS, resource: BindingResource::Buffer(&uniform_buffer) },
                BindGroupEntry { binding: frame_binding::DEPTH, resource: BindingResource::Buffer(&depth_buffer) },
                BindGroupEntry {
                    binding: frame_binding::CLUSTER_COUNTERS,
                    resource: BindingResource::Buffer(&cluster_counter_buffer),
                },
                BindGroupEntry {
                    binding: frame_binding::DISPATCH_ARGS,
                    resource: BindingResource::Buffer(&dispatch_args_buffer),
                },
                BindGroupEntry {
                    binding: frame_binding::VISIBLE_MESHLETS,
                    resource: BindingResource::Buffer(&visible_meshlet_buffer),
                },
                BindGroupEntry {
                    binding: frame_binding::VISIBLE_COUNTER,
                    resource: BindingResource::Buffer(&visible_counter_buffer),
                },
            ],
        })?;
        let ping_pong_group = |read: &D::Buffer, write: &D::Buffer| {
            device.create_bind_group(BindGroupDescriptor {
                layout: &ping_pong_layout,
                entries: vec![
                    BindGroupEntry { binding: ping_pong_binding::READ, resource: BindingResource::Buffer(read) },
                    BindGroupEntry { binding: ping_pong_binding::WRITE, resource: BindingResource::Buffer(write) },
                ],
            })
        };
        let ping_pong = [
            ping_pong_group(&candidates[1], &candidates[0])?,
            ping_pong_group(&candidates[0], &candidates[1])?,
        ];

        let (root_first, root_count) = mesh
            .levels
            .first()
            .map(|l| (l.first_index as u32, l.count as u32))
            .unwrap_or((0, 0));
        let cluster_group_size = cull_cluster.workgroup_size()[0].max(1);
        let meshlet_group_size = cull_meshlet.workgroup_size()[0].max(1);

        Ok(Self {
            cull_cluster,
            prepare_cluster,
            cull_meshlet,
            pipeline_layout,
            frame_layout,
            ping_pong_layout,
            uniform_buffer,
            depth_buffer,
            cluster_counter_buffer,
            dispatch_args_buffer,
            candidates,
            visible_meshlet_buffer,
            visible_counter_buffer,
            frame_group,
            ping_pong,
            root_first,
            root_count,
            max_depth: mesh.max_depth(),
            meshlet_count: mesh.meshlet_count,
            hierarchy_enabled: mesh.hierarchy_enabled,
            cluster_group_size,
            meshlet_group_size,
        })
    }

    pub fn uniforms(&self, view: &CullView) -> CullUniforms {
        CullUniforms {
            planes: extract_planes(view.view_projection, view.clip_depth).map(|p| p.to_array()),
            object_to_world: view.object_to_world.to_cols_array_2d(),
            root_first: self.root_first,
            root_count: self.root_count,
            max_depth: self.max_depth,
            meshlet_count: self.meshlet_count,
            object_scale: object_scale(view.object_to_world),
            hierarchy_enabled: self.hierarchy_enabled as u32,
            cluster_group_size: self.cluster_group_size,
            meshlet_group_size: self.meshlet_group_size,
        }
    }

    /// Records one frame of culling. Every counter is reset here, so the
    /// same pass can be recorded again for the next frame.
    pub fn record(&self, cmd: &mut D::CommandBuffer, mesh: &MeshletMeshGpu<D>, view: &CullView) {
        cmd.update_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms(view)));
        cmd.fill_buffer(&self.depth_buffer, 0, 4, 0);
        cmd.fill_buffer(&self.cluster_counter_buffer, 0, self.cluster_counter_buffer.size(), 0);
        cmd.fill_buffer(&self.visible_counter_buffer, 0, 4, 0);
        let seed = if self.hierarchy_enabled {
            self.root_count.div_ceil(self.cluster_group_size)
        } else {
            self.meshlet_count.div_ceil(self.meshlet_group_size)
        };
        cmd.update_buffer(&self.dispatch_args_buffer, 0, bytemuck::bytes_of(&DispatchArgs::linear(seed)));
        cmd.compute_barrier();

        cmd.bind_bind_group(MESH_GROUP, &mesh.bind_group);
        cmd.bind_bind_group(FRAME_GROUP, &self.frame_group);

        let mut final_list = 0;
        if self.hierarchy_enabled {
            for depth in 0..=self.max_depth as usize {
                cmd.bind_compute_pipeline(&self.cull_cluster);
                cmd.bind_bind_group(PING_PONG_GROUP, &self.ping_pong[depth % 2]);
                cmd.dispatch_indirect(&self.dispatch_args_buffer, 0);
                cmd.compute_barrier();

                cmd.bind_compute_pipeline(&self.prepare_cluster);
                cmd.dispatch(1, 1, 1);
                cmd.compute_barrier();
            }
            // the list written last is the read side of the other group
            final_list = (self.max_depth as usize + 1) % 2;
        }

        cmd.bind_compute_pipeline(&self.cull_meshlet);
        cmd.bind_bind_group(PING_PONG_GROUP, &self.ping_pong[final_list]);
        cmd.dispatch_indirect(&self.dispatch_args_buffer, 0);
        cmd.compute_barrier();
    }
}
