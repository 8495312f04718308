use crate::{SoftBindGroup, SoftBuffer};
use bytemuck::Pod;
use lume_core::{LumeError, LumeResult};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) type KernelFn = dyn Fn(&Invocation<'_>) -> LumeResult<()> + Send + Sync;

#[derive(Clone)]
pub struct Kernel {
    pub workgroup_size: [u32; 3],
    pub(crate) func: Arc<KernelFn>,
}

/// A (bind group index, binding) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    pub group: u32,
    pub binding: u32,
}

impl Slot {
    pub const fn new(group: u32, binding: u32) -> Self {
        Self { group, binding }
    }
}

/// One kernel thread.
pub struct Invocation<'a> {
    pub global_id: [u32; 3],
    pub local_id: [u32; 3],
    pub workgroup_id: [u32; 3],
    pub workgroup_size: [u32; 3],
    pub num_workgroups: [u32; 3],
    pub(crate) groups: &'a HashMap<u32, SoftBindGroup>,
}

impl Invocation<'_> {
    fn buffer(&self, slot: Slot) -> LumeResult<&SoftBuffer> {
        self.groups
            .get(&slot.group)
            .and_then(|group| group.buffer(slot.binding))
            .ok_or(LumeError::InvalidBinding { group: slot.group, binding: slot.binding })
    }

    /// Reads element `index` of a buffer viewed as `[T]`.
    pub fn read<T: Pod>(&self, slot: Slot, index: usize) -> LumeResult<T> {
        self.buffer(slot)?.read_element(index)
    }

    pub fn write<T: Pod>(&self, slot: Slot, index: usize, value: T) -> LumeResult<()> {
        self.buffer(slot)?.write_element(index, value)
    }

    /// Atomic add on a u32 element, returning the previous value.
    pub fn atomic_add(&self, slot: Slot, index: usize, value: u32) -> LumeResult<u32> {
        self.buffer(slot)?.atomic_add(index, value)
    }

    /// Number of whole `T` elements in the bound buffer.
    pub fn len<T: Pod>(&self, slot: Slot) -> LumeResult<usize> {
        Ok(self.buffer(slot)?.element_count::<T>())
    }
}
