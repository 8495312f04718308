//! CPU backend for the `lume-core` compute traits.
//!
//! Kernels are plain Rust closures registered by entry-point name. Every
//! invocation of a dispatch runs sequentially, so atomics are ordinary
//! read-modify-write operations on the bound buffer.

mod buffer;
mod command;
mod device;
mod kernel;

pub use buffer::SoftBuffer;
pub use command::{SoftCommandBuffer, SoftCommandPool};
pub use device::{SoftBindGroup, SoftBindGroupLayout, SoftComputePipeline, SoftDevice, SoftPipelineLayout};
pub use kernel::{Invocation, Kernel, Slot};
