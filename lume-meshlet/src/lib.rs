use bytemuck::{Pod, Zeroable};

pub mod asset;
pub mod data;
pub mod error;
pub mod gpu;
pub mod processor;

pub use asset::{load_from_file, save_to_file};
pub use data::{BakedMesh, IndexBuffer, IndexElement, IndexTableFormat, IndexWidth, MeshletData};
pub use error::{CodecError, MeshletError};
pub use processor::hierarchy::{ClusterHierarchy, HierarchyConfig, build_hierarchy};
pub use processor::{ProcessorConfig, SourceMesh, process_mesh};

/// Offsets and counts into the shared meshlet vertex and triangle pools.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Meshlet {
    pub vertex_offset: u32,
    pub triangle_offset: u32,
    pub vertex_count: u32,
    pub triangle_count: u32,
}

impl From<meshopt::ffi::meshopt_Meshlet> for Meshlet {
    fn from(m: meshopt::ffi::meshopt_Meshlet) -> Self {
        Self {
            vertex_offset: m.vertex_offset,
            triangle_offset: m.triangle_offset,
            vertex_count: m.vertex_count,
            triangle_count: m.triangle_count,
        }
    }
}

/// Bounding sphere and normal cone of one meshlet (48 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshletBounds {
    pub center: [f32; 3],
    pub radius: f32,
    pub cone_apex: [f32; 3],
    pub cone_axis: [f32; 3],
    pub cone_cutoff: f32,
    pub cone_axis_s8: [i8; 3],
    pub cone_cutoff_s8: i8,
}

impl From<meshopt::Bounds> for MeshletBounds {
    fn from(b: meshopt::Bounds) -> Self {
        Self {
            center: b.center,
            radius: b.radius,
            cone_apex: b.cone_apex,
            cone_axis: b.cone_axis,
            cone_cutoff: b.cone_cutoff,
            cone_axis_s8: b.cone_axis_s8,
            cone_cutoff_s8: b.cone_cutoff_s8,
        }
    }
}

/// Flattened cluster tree node.
///
/// On the leaf-cluster level `first_index..first_index + count` is a meshlet
/// range, on every other level it is a range of child nodes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ClusterNode {
    pub center: [f32; 3],
    pub radius: f32,
    pub first_index: u32,
    pub count: u32,
}

/// Node range of one tree depth, root first.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct HierarchyLevelInfo {
    pub first_index: i32,
    pub count: i32,
}
