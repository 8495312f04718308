pub mod error;
pub mod device;

pub use error::{LumeError, LumeResult};
pub use device::Device;
