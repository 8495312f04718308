use crate::kernel::{Invocation, Kernel};
use crate::{SoftBuffer, SoftCommandBuffer, SoftCommandPool};
use lume_core::device::*;
use lume_core::{LumeError, LumeResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct SoftDevice {
    kernels: Arc<RwLock<HashMap<String, Kernel>>>,
}

impl SoftDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the kernel behind `entry_point`.
    pub fn register_kernel<F>(&self, entry_point: &str, workgroup_size: [u32; 3], func: F)
    where
        F: Fn(&Invocation<'_>) -> LumeResult<()> + Send + Sync + 'static,
    {
        log::debug!("soft: registered kernel {} {:?}", entry_point, workgroup_size);
        self.kernels.write().insert(
            entry_point.to_string(),
            Kernel {
                workgroup_size,
                func: Arc::new(func),
            },
        );
    }
}

pub struct SoftPipelineLayout {
    pub group_count: usize,
}

#[derive(Clone)]
pub struct SoftComputePipeline {
    pub entry_point: String,
    pub(crate) kernel: Kernel,
}

#[derive(Clone)]
pub struct SoftBindGroupLayout {
    entries: Arc<HashMap<u32, BindingType>>,
}

#[derive(Clone)]
pub struct SoftBindGroup {
    buffers: Arc<HashMap<u32, SoftBuffer>>,
}

impl SoftBindGroup {
    pub(crate) fn buffer(&self, binding: u32) -> Option<&SoftBuffer> {
        self.buffers.get(&binding)
    }
}

impl PipelineLayout for SoftPipelineLayout {}
impl BindGroupLayout for SoftBindGroupLayout {}
impl BindGroup for SoftBindGroup {}

impl ComputePipeline for SoftComputePipeline {
    fn workgroup_size(&self) -> [u32; 3] {
        self.kernel.workgroup_size
    }
}

impl Device for SoftDevice {
    type Buffer = SoftBuffer;
    type PipelineLayout = SoftPipelineLayout;
    type ComputePipeline = SoftComputePipeline;
    type CommandPool = SoftCommandPool;
    type CommandBuffer = SoftCommandBuffer;
    type BindGroupLayout = SoftBindGroupLayout;
    type BindGroup = SoftBindGroup;

    fn wait_idle(&self) -> LumeResult<()> {
        // Submission is synchronous.
        Ok(())
    }

    fn supports_kernel(&self, entry_point: &str) -> bool {
        self.kernels.read().contains_key(entry_point)
    }

    fn create_command_pool(&self) -> LumeResult<Self::CommandPool> {
        Ok(SoftCommandPool)
    }

    fn create_buffer(&self, descriptor: BufferDescriptor) -> LumeResult<Self::Buffer> {
        SoftBuffer::new(descriptor.size, descriptor.usage)
    }

    fn create_bind_group_layout(&self, descriptor: BindGroupLayoutDescriptor) -> LumeResult<Self::BindGroupLayout> {
        let mut entries = HashMap::with_capacity(descriptor.entries.len());
        for entry in descriptor.entries {
            if entries.insert(entry.binding, entry.ty).is_some() {
                return Err(LumeError::ResourceCreationFailed(format!(
                    "binding {} declared twice in bind group layout",
                    entry.binding
                )));
            }
        }
        Ok(SoftBindGroupLayout {
            entries: Arc::new(entries),
        })
    }

    fn create_bind_group(&self, descriptor: BindGroupDescriptor<Self>) -> LumeResult<Self::BindGroup> {
        let mut buffers = HashMap::with_capacity(descriptor.entries.len());
        for entry in descriptor.entries {
            let ty = descriptor.layout.entries.get(&entry.binding).ok_or_else(|| {
                LumeError::ResourceCreationFailed(format!("binding {} is not in the layout", entry.binding))
            })?;
            let BindingResource::Buffer(buffer) = entry.resource;
            let required = match ty {
                BindingType::UniformBuffer => BufferUsage::UNIFORM,
                BindingType::StorageBuffer { .. } => BufferUsage::STORAGE,
            };
            if !buffer.usage.contains(required) {
                return Err(LumeError::ResourceCreationFailed(format!(
                    "buffer at binding {} lacks usage {:?}",
                    entry.binding, required
                )));
            }
            buffers.insert(entry.binding, buffer.clone());
        }
        Ok(SoftBindGroup {
            buffers: Arc::new(buffers),
        })
    }

    fn create_pipeline_layout(&self, descriptor: PipelineLayoutDescriptor<Self>) -> LumeResult<Self::PipelineLayout> {
        Ok(SoftPipelineLayout {
            group_count: descriptor.bind_group_layouts.len(),
        })
    }

    fn create_compute_pipeline(&self, descriptor: ComputePipelineDescriptor<Self>) -> LumeResult<Self::ComputePipeline> {
        let kernel = self
            .kernels
            .read()
            .get(descriptor.entry_point)
            .cloned()
            .ok_or_else(|| LumeError::UnsupportedKernel(descriptor.entry_point.to_string()))?;
        Ok(SoftComputePipeline {
            entry_point: descriptor.entry_point.to_string(),
            kernel,
        })
    }

    fn submit(&self, command_buffers: &[&Self::CommandBuffer]) -> LumeResult<()> {
        for command_buffer in command_buffers {
            command_buffer.execute()?;
        }
        Ok(())
    }
}
