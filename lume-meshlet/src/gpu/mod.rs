//! Per-frame hierarchical culling and index compaction on a `lume-core` device.

pub mod compaction;
pub mod culling;
pub mod frustum;
pub mod kernels;
pub mod mesh;
#[cfg(feature = "soft")]
pub mod reference;

pub use compaction::CompactionPass;
pub use culling::{CullView, CullingPass};
pub use frustum::ClipDepth;
pub use mesh::MeshletMeshGpu;
