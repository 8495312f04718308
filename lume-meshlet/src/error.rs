/// Failure while reading a meshlet container.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("invalid magic number: expected {expected:#X}, got {found:#X}")]
    BadMagic { expected: u32, found: u32 },

    #[error("unsupported file version {0}")]
    UnsupportedVersion(u32),

    #[error("file truncated: needed {needed} bytes, have {available}")]
    Truncated { needed: u64, available: u64 },

    #[error("block {id} range {offset}+{size} lies outside the file")]
    BlockOutOfRange { id: u32, offset: u64, size: u64 },

    #[error("block {id} has stride {found}, expected {expected}")]
    StrideMismatch { id: u32, expected: u32, found: u32 },

    #[error("block {id} has unknown format code {code}")]
    UnknownFormat { id: u32, code: u32 },

    #[error("container holds no usable meshlet data")]
    InvalidData,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MeshletError {
    #[error("mesh has no triangles")]
    EmptyMesh,

    #[error("index {index} is outside the vertex range ({vertex_count} vertices)")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("meshlet generation produced no meshlets")]
    NoMeshlets,

    #[error("meshlet {0} addresses data outside the meshlet pools")]
    MeshletOutOfRange(usize),

    #[error("invalid processor configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Meshopt(#[from] meshopt::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("device error: {0}")]
    Device(#[from] lume_core::LumeError),
}
