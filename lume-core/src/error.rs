use std::fmt;

#[derive(Debug)]
pub enum LumeError {
    DeviceCreationFailed(String),
    ResourceCreationFailed(String),
    PipelineCreationFailed(String),
    /// The device cannot run the named compute kernel.
    UnsupportedKernel(String),
    InvalidBinding { group: u32, binding: u32 },
    OutOfBounds { offset: u64, len: u64, size: u64 },
    SubmissionFailed(String),
    BackendError(String),
    OutOfMemory,
    Generic(&'static str),
}

impl fmt::Display for LumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LumeError::DeviceCreationFailed(msg) => write!(f, "Device Creation Failed: {}", msg),
            LumeError::ResourceCreationFailed(msg) => write!(f, "Resource Creation Failed: {}", msg),
            LumeError::PipelineCreationFailed(msg) => write!(f, "Pipeline Creation Failed: {}", msg),
            LumeError::UnsupportedKernel(name) => write!(f, "Kernel Not Supported: {}", name),
            LumeError::InvalidBinding { group, binding } => {
                write!(f, "Nothing Bound At Group {} Binding {}", group, binding)
            }
            LumeError::OutOfBounds { offset, len, size } => {
                write!(f, "Buffer Access Out Of Bounds: {}..{} (size {})", offset, offset + len, size)
            }
            LumeError::SubmissionFailed(msg) => write!(f, "Submission Failed: {}", msg),
            LumeError::BackendError(msg) => write!(f, "Backend Error: {}", msg),
            LumeError::OutOfMemory => write!(f, "Out of Memory"),
            LumeError::Generic(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for LumeError {}

pub type LumeResult<T> = Result<T, LumeError>;
