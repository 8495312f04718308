use bytemuck::Pod;
use lume_core::device::BufferUsage;
use lume_core::{LumeError, LumeResult};
use parking_lot::RwLock;
use std::ops::Range;
use std::sync::Arc;

#[derive(Clone)]
pub struct SoftBuffer {
    data: Arc<RwLock<Vec<u8>>>,
    pub usage: BufferUsage,
}

impl SoftBuffer {
    pub(crate) fn new(size: u64, usage: BufferUsage) -> LumeResult<Self> {
        let size = usize::try_from(size).map_err(|_| LumeError::OutOfMemory)?;
        Ok(Self {
            data: Arc::new(RwLock::new(vec![0; size])),
            usage,
        })
    }

    fn range(&self, len: usize, offset: u64, count: u64) -> LumeResult<Range<usize>> {
        let end = offset.checked_add(count);
        match end {
            Some(end) if end <= len as u64 => Ok(offset as usize..end as usize),
            _ => Err(LumeError::OutOfBounds { offset, len: count, size: len as u64 }),
        }
    }

    pub(crate) fn read_element<T: Pod>(&self, index: usize) -> LumeResult<T> {
        let stride = std::mem::size_of::<T>() as u64;
        let data = self.data.read();
        let range = self.range(data.len(), index as u64 * stride, stride)?;
        Ok(bytemuck::pod_read_unaligned(&data[range]))
    }

    pub(crate) fn write_element<T: Pod>(&self, index: usize, value: T) -> LumeResult<()> {
        let stride = std::mem::size_of::<T>() as u64;
        let mut data = self.data.write();
        let range = self.range(data.len(), index as u64 * stride, stride)?;
        data[range].copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    /// Returns the value before the addition.
    pub(crate) fn atomic_add(&self, index: usize, value: u32) -> LumeResult<u32> {
        let mut data = self.data.write();
        let range = self.range(data.len(), index as u64 * 4, 4)?;
        let previous: u32 = bytemuck::pod_read_unaligned(&data[range.clone()]);
        data[range].copy_from_slice(&previous.wrapping_add(value).to_le_bytes());
        Ok(previous)
    }

    pub(crate) fn element_count<T: Pod>(&self) -> usize {
        self.data.read().len() / std::mem::size_of::<T>().max(1)
    }

    pub(crate) fn fill(&self, offset: u64, size: u64, value: u32) -> LumeResult<()> {
        let mut data = self.data.write();
        let range = self.range(data.len(), offset, size)?;
        let pattern = value.to_le_bytes();
        for (i, byte) in data[range].iter_mut().enumerate() {
            *byte = pattern[i % 4];
        }
        Ok(())
    }

    pub(crate) fn copy_from(&self, source: &SoftBuffer, source_offset: u64, destination_offset: u64, size: u64) -> LumeResult<()> {
        if Arc::ptr_eq(&self.data, &source.data) {
            let mut data = self.data.write();
            let src = self.range(data.len(), source_offset, size)?;
            let dst = self.range(data.len(), destination_offset, size)?;
            data.copy_within(src, dst.start);
            return Ok(());
        }
        let src_data = source.data.read();
        let mut dst_data = self.data.write();
        let src = self.range(src_data.len(), source_offset, size)?;
        let dst = self.range(dst_data.len(), destination_offset, size)?;
        dst_data[dst].copy_from_slice(&src_data[src]);
        Ok(())
    }
}

impl lume_core::device::Buffer for SoftBuffer {
    fn size(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn write_data(&self, offset: u64, data: &[u8]) -> LumeResult<()> {
        let mut dst = self.data.write();
        let range = self.range(dst.len(), offset, data.len() as u64)?;
        dst[range].copy_from_slice(data);
        Ok(())
    }

    fn read_data(&self, offset: u64, data: &mut [u8]) -> LumeResult<()> {
        let src = self.data.read();
        let range = self.range(src.len(), offset, data.len() as u64)?;
        data.copy_from_slice(&src[range]);
        Ok(())
    }
}
