//! Kernel entry points, bind slots and the uniform/argument records shared
//! between the passes and the kernels.

use bytemuck::{Pod, Zeroable};
use lume_core::device::{BindGroupLayoutEntry, BindingType, ShaderStage};

pub const CULL_CLUSTER: &str = "cull_cluster";
pub const PREPARE_CLUSTER: &str = "prepare_cluster";
pub const CULL_MESHLET: &str = "cull_meshlet";
pub const COMPACTION_U16: &str = "compaction_u16";
pub const COMPACTION_U32: &str = "compaction_u32";

pub const MESH_GROUP: u32 = 0;
/// Culling: per-frame counters and lists.
pub const FRAME_GROUP: u32 = 1;
pub const PING_PONG_GROUP: u32 = 2;
/// Compaction: its own uniforms, inputs from culling and outputs.
pub const OUTPUT_GROUP: u32 = 1;

pub mod mesh_binding {
    pub const MESHLETS: u32 = 0;
    pub const BOUNDS: u32 = 1;
    pub const CLUSTER_NODES: u32 = 2;
    pub const MESHLET_VERTICES: u32 = 3;
    pub const MESHLET_TRIANGLES: u32 = 4;
    pub const INDEX_TABLE: u32 = 5;
    /// First index-table entry of each meshlet.
    pub const TRIANGLE_BASE: u32 = 6;
}

pub mod frame_binding {
    pub const UNIFORMS: u32 = 0;
    pub const DEPTH: u32 = 1;
    pub const CLUSTER_COUNTERS: u32 = 2;
    pub const DISPATCH_ARGS: u32 = 3;
    pub const VISIBLE_MESHLETS: u32 = 4;
    pub const VISIBLE_COUNTER: u32 = 5;
}

pub mod ping_pong_binding {
    pub const READ: u32 = 0;
    pub const WRITE: u32 = 1;
}

pub mod output_binding {
    pub const UNIFORMS: u32 = 0;
    pub const VISIBLE_MESHLETS: u32 = 1;
    pub const INDICES: u32 = 2;
    pub const TRIANGLE_IDS: u32 = 3;
    pub const INDEX_COUNTER: u32 = 4;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CullUniforms {
    /// left, right, bottom, top, near, far; xyz normal, w distance
    pub planes: [[f32; 4]; 6],
    pub object_to_world: [[f32; 4]; 4],
    pub root_first: u32,
    pub root_count: u32,
    pub max_depth: u32,
    pub meshlet_count: u32,
    pub object_scale: f32,
    pub hierarchy_enabled: u32,
    pub cluster_group_size: u32,
    pub meshlet_group_size: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CompactionUniforms {
    /// Index table width in bytes.
    pub table_width: u32,
    pub meshlet_count: u32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchArgs {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl DispatchArgs {
    pub fn linear(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl DrawIndexedArgs {
    pub const EMPTY: Self = Self {
        index_count: 0,
        instance_count: 1,
        first_index: 0,
        base_vertex: 0,
        first_instance: 0,
    };
}

pub(crate) fn storage(binding: u32, read_only: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStage::COMPUTE,
        ty: BindingType::StorageBuffer { read_only },
    }
}

pub(crate) fn uniform(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStage::COMPUTE,
        ty: BindingType::UniformBuffer,
    }
}
