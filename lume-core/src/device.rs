pub trait Device: Sized + Clone {
    type Buffer: Buffer;
    type PipelineLayout: PipelineLayout;
    type ComputePipeline: ComputePipeline;
    type CommandPool: CommandPool<CommandBuffer = Self::CommandBuffer>;
    type CommandBuffer: CommandBuffer<Device = Self>;
    type BindGroupLayout: BindGroupLayout;
    type BindGroup: BindGroup;

    /// Wait for the device to be idle.
    fn wait_idle(&self) -> crate::LumeResult<()>;

    /// Whether a compute kernel with this entry point can run on the device.
    fn supports_kernel(&self, entry_point: &str) -> bool;

    fn create_command_pool(&self) -> crate::LumeResult<Self::CommandPool>;
    fn create_buffer(&self, descriptor: BufferDescriptor) -> crate::LumeResult<Self::Buffer>;
    fn create_bind_group_layout(&self, descriptor: BindGroupLayoutDescriptor) -> crate::LumeResult<Self::BindGroupLayout>;
    fn create_bind_group(&self, descriptor: BindGroupDescriptor<Self>) -> crate::LumeResult<Self::BindGroup>;
    fn create_pipeline_layout(&self, descriptor: PipelineLayoutDescriptor<Self>) -> crate::LumeResult<Self::PipelineLayout>;
    fn create_compute_pipeline(&self, descriptor: ComputePipelineDescriptor<Self>) -> crate::LumeResult<Self::ComputePipeline>;

    /// Submit command buffers to the compute queue. Commands run in submission order.
    fn submit(&self, command_buffers: &[&Self::CommandBuffer]) -> crate::LumeResult<()>;
}

pub trait CommandPool {
    type Device: Device;
    type CommandBuffer: CommandBuffer<Device = Self::Device>;
    fn allocate_command_buffer(&self) -> crate::LumeResult<Self::CommandBuffer>;
}

pub trait CommandBuffer {
    type Device: Device;
    fn reset(&mut self) -> crate::LumeResult<()>;
    fn begin(&mut self) -> crate::LumeResult<()>;
    fn end(&mut self) -> crate::LumeResult<()>;

    fn bind_compute_pipeline(&mut self, pipeline: &<Self::Device as Device>::ComputePipeline);
    fn bind_bind_group(&mut self, index: u32, bind_group: &<Self::Device as Device>::BindGroup);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    /// Dispatch with the workgroup counts read from `buffer` (three u32) when the command executes.
    fn dispatch_indirect(&mut self, buffer: &<Self::Device as Device>::Buffer, offset: u64);

    /// Fill `size` bytes with a repeated u32 value.
    fn fill_buffer(&mut self, buffer: &<Self::Device as Device>::Buffer, offset: u64, size: u64, value: u32);
    /// Inline buffer update, ordered with the other recorded commands.
    fn update_buffer(&mut self, buffer: &<Self::Device as Device>::Buffer, offset: u64, data: &[u8]);
    fn copy_buffer_to_buffer(
        &mut self,
        source: &<Self::Device as Device>::Buffer,
        source_offset: u64,
        destination: &<Self::Device as Device>::Buffer,
        destination_offset: u64,
        size: u64,
    );
    fn compute_barrier(&mut self);
}

pub trait PipelineLayout {}
pub trait ComputePipeline: Send + Sync {
    /// Threads per workgroup declared by the kernel.
    fn workgroup_size(&self) -> [u32; 3];
}
pub trait Buffer {
    fn size(&self) -> u64;
    fn write_data(&self, offset: u64, data: &[u8]) -> crate::LumeResult<()>;
    fn read_data(&self, offset: u64, data: &mut [u8]) -> crate::LumeResult<()>;
}
pub trait BindGroupLayout {}
pub trait BindGroup {}

pub struct BufferDescriptor {
    pub size: u64,
    pub usage: BufferUsage,
    pub mapped_at_creation: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BufferUsage(pub u32);

impl BufferUsage {
    pub const VERTEX: Self = Self(1 << 0);
    pub const INDEX: Self = Self(1 << 1);
    pub const UNIFORM: Self = Self(1 << 2);
    pub const STORAGE: Self = Self(1 << 3);
    pub const COPY_SRC: Self = Self(1 << 4);
    pub const COPY_DST: Self = Self(1 << 5);
    pub const INDIRECT: Self = Self(1 << 6);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

pub struct BindGroupLayoutDescriptor {
    pub entries: Vec<BindGroupLayoutEntry>,
}

pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStage,
    pub ty: BindingType,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ShaderStage(pub u32);

impl ShaderStage {
    pub const COMPUTE: Self = Self(1 << 2);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingType {
    UniformBuffer,
    StorageBuffer { read_only: bool },
}

pub struct BindGroupDescriptor<'a, D: Device> {
    pub layout: &'a D::BindGroupLayout,
    pub entries: Vec<BindGroupEntry<'a, D>>,
}

pub struct BindGroupEntry<'a, D: Device> {
    pub binding: u32,
    pub resource: BindingResource<'a, D>,
}

pub enum BindingResource<'a, D: Device> {
    Buffer(&'a D::Buffer),
}

pub struct PipelineLayoutDescriptor<'a, D: Device> {
    pub bind_group_layouts: &'a [&'a D::BindGroupLayout],
}

pub struct ComputePipelineDescriptor<'a, D: Device> {
    pub entry_point: &'a str,
    pub layout: &'a D::PipelineLayout,
}
