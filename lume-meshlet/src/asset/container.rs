use crate::error::CodecError;
use bytemuck::{Pod, Zeroable};

pub const MAGIC: u32 = 0x4D45_5348;
pub const VERSION: u32 = 1;

pub const HEADER_SIZE: usize = std::mem::size_of::<FileHeader>();
pub const DESCRIPTOR_SIZE: usize = std::mem::size_of::<BlockDescriptor>();

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    /// Header plus descriptor table, in bytes.
    pub header_size: u32,
    pub total_file_size: u64,
    pub block_count: u32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct BlockDescriptor {
    pub id: u32,
    /// Absolute file offset of the payload.
    pub offset: u64,
    pub size: u64,
    pub count: u32,
    pub stride: u32,
    pub meta1: u32,
    pub meta2: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlockId {
    BakedVertices = 1,
    BakedNormals = 2,
    BakedTangents = 3,
    BakedUvs = 4,
    BakedIndices = 5,
    Meshlets = 10,
    MeshletVertices = 11,
    MeshletTriangles = 12,
    MeshletIndexTable = 13,
    MeshletBounds = 14,
    ClusterNodes = 20,
    HierarchyInfo = 21,
}

impl BlockId {
    pub fn from_u32(id: u32) -> Option<Self> {
        Some(match id {
            1 => Self::BakedVertices,
            2 => Self::BakedNormals,
            3 => Self::BakedTangents,
            4 => Self::BakedUvs,
            5 => Self::BakedIndices,
            10 => Self::Meshlets,
            11 => Self::MeshletVertices,
            12 => Self::MeshletTriangles,
            13 => Self::MeshletIndexTable,
            14 => Self::MeshletBounds,
            20 => Self::ClusterNodes,
            21 => Self::HierarchyInfo,
            _ => return None,
        })
    }
}

fn padded(len: usize) -> usize {
    len.next_multiple_of(4)
}

/// Accumulates block payloads and produces the final container bytes.
#[derive(Default)]
pub struct BlockWriter {
    payload: Vec<u8>,
    blocks: Vec<BlockDescriptor>,
}

impl BlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded size always includes the 4-byte padding.
    fn push(&mut self, id: BlockId, bytes: &[u8], count: u32, stride: u32, meta1: u32) {
        self.blocks.push(BlockDescriptor {
            id: id as u32,
            // relative until finish() knows the header size
            offset: self.payload.len() as u64,
            size: padded(bytes.len()) as u64,
            count,
            stride,
            meta1,
            meta2: 0,
        });
        self.payload.extend_from_slice(bytes);
        self.payload.resize(padded(self.payload.len()), 0);
    }

    /// Typed array block. An empty array records stride 0.
    pub fn write_pod<T: Pod>(&mut self, id: BlockId, items: &[T], meta1: u32) {
        let bytes: &[u8] = bytemuck::cast_slice(items);
        let stride = if items.is_empty() { 0 } else { std::mem::size_of::<T>() as u32 };
        self.push(id, bytes, items.len() as u32, stride, meta1);
    }

    /// Untyped block with caller-supplied count and stride.
    pub fn write_raw(&mut self, id: BlockId, bytes: &[u8], count: u32, stride: u32, meta1: u32) {
        self.push(id, bytes, count, stride, meta1);
    }

    pub fn finish(self) -> Vec<u8> {
        let header_size = HEADER_SIZE + DESCRIPTOR_SIZE * self.blocks.len();
        let total = header_size + self.payload.len();
        let header = FileHeader {
            magic: MAGIC,
            version: VERSION,
            header_size: header_size as u32,
            total_file_size: total as u64,
            block_count: self.blocks.len() as u32,
        };

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(bytemuck::bytes_of(&header));
        for mut block in self.blocks {
            block.offset += header_size as u64;
            out.extend_from_slice(bytemuck::bytes_of(&block));
        }
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Parsed header and descriptor table over borrowed container bytes.
pub struct BlockTable<'a> {
    pub header: FileHeader,
    pub blocks: Vec<BlockDescriptor>,
    bytes: &'a [u8],
}

impl<'a> BlockTable<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let available = bytes.len() as u64;
        let head = bytes.get(..HEADER_SIZE).ok_or(CodecError::Truncated {
            needed: HEADER_SIZE as u64,
            available,
        })?;
        let header: FileHeader = bytemuck::pod_read_unaligned(head);

        let magic = header.magic;
        if magic != MAGIC {
            return Err(CodecError::BadMagic { expected: MAGIC, found: magic });
        }
        let version = header.version;
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let block_count = header.block_count as usize;
        let table_end = HEADER_SIZE + DESCRIPTOR_SIZE * block_count;
        let table = bytes.get(HEADER_SIZE..table_end).ok_or(CodecError::Truncated {
            needed: table_end as u64,
            available,
        })?;
        let total = header.total_file_size;
        if total > available {
            return Err(CodecError::Truncated { needed: total, available });
        }
        if total < available {
            log::warn!("{} trailing bytes after container end", available - total);
        }

        let blocks: Vec<BlockDescriptor> = table
            .chunks_exact(DESCRIPTOR_SIZE)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        for block in &blocks {
            let (id, offset, size) = (block.id, block.offset, block.size);
            if offset.checked_add(size).is_none_or(|end| end > total) {
                return Err(CodecError::BlockOutOfRange { id, offset, size });
            }
            log::debug!(
                "block {:?} ({}): offset {} size {} count {} stride {}",
                BlockId::from_u32(id),
                id,
                offset,
                size,
                { block.count },
                { block.stride }
            );
        }

        Ok(Self { header, blocks, bytes })
    }

    pub fn find(&self, id: BlockId) -> Option<&BlockDescriptor> {
        self.blocks.iter().find(|b| b.id == id as u32)
    }

    /// Whole recorded range of a block, padding included.
    pub fn block_bytes(&self, block: &BlockDescriptor) -> &'a [u8] {
        let (offset, size) = (block.offset as usize, block.size as usize);
        self.bytes.get(offset..offset + size).unwrap_or(&[])
    }

    fn payload(&self, block: &BlockDescriptor, len: u64) -> Result<&'a [u8], CodecError> {
        let (id, offset, size) = (block.id, block.offset, block.size);
        if len > size {
            return Err(CodecError::BlockOutOfRange { id, offset, size: len });
        }
        self.bytes
            .get(offset as usize..(offset + len) as usize)
            .ok_or(CodecError::BlockOutOfRange { id, offset, size: len })
    }

    /// Reads a typed array block. Missing blocks read as empty.
    pub fn read_pod<T: Pod>(&self, id: BlockId) -> Result<Vec<T>, CodecError> {
        let Some(block) = self.find(id) else {
            return Ok(Vec::new());
        };
        let expected = std::mem::size_of::<T>() as u32;
        let (count, stride) = (block.count, block.stride);
        if count == 0 {
            return Ok(Vec::new());
        }
        if stride != expected {
            return Err(CodecError::StrideMismatch {
                id: id as u32,
                expected,
                found: stride,
            });
        }
        let bytes = self.payload(block, count as u64 * stride as u64)?;
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }

    /// Reads `count * stride` bytes of a block. Missing blocks read as empty.
    pub fn read_raw(&self, id: BlockId) -> Result<&'a [u8], CodecError> {
        match self.find(id) {
            Some(block) => self.payload(block, block.count as u64 * block.stride as u64),
            None => Ok(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes() {
        assert_eq!(HEADER_SIZE, 24);
        assert_eq!(DESCRIPTOR_SIZE, 36);
    }

    #[test]
    fn offsets_are_absolute_and_aligned() {
        let mut writer = BlockWriter::new();
        writer.write_raw(BlockId::MeshletTriangles, &[1, 2, 3, 4, 5], 5, 1, 0);
        writer.write_pod(BlockId::MeshletVertices, &[7u32, 8], 0);
        writer.write_pod::<u32>(BlockId::Meshlets, &[], 0);
        let bytes = writer.finish();

        let table = BlockTable::parse(&bytes).unwrap();
        let header_size = table.header.header_size as u64;
        assert_eq!(header_size, 24 + 36 * 3);
        assert_eq!({ table.header.total_file_size }, bytes.len() as u64);

        let tris = table.find(BlockId::MeshletTriangles).unwrap();
        assert_eq!({ tris.offset }, header_size);
        assert_eq!({ tris.size }, 8);

        let verts = table.find(BlockId::MeshletVertices).unwrap();
        assert_eq!({ verts.offset }, header_size + 8);
        assert_eq!({ verts.size }, 8);
        assert_eq!(table.read_pod::<u32>(BlockId::MeshletVertices).unwrap(), vec![7, 8]);

        let empty = table.find(BlockId::Meshlets).unwrap();
        assert_eq!(({ empty.size }, { empty.count }, { empty.stride }), (0, 0, 0));
        assert_eq!({ empty.offset }, bytes.len() as u64);

        assert_eq!(table.read_raw(BlockId::MeshletTriangles).unwrap(), &[1, 2, 3, 4, 5]);
        assert!(table.read_raw(BlockId::ClusterNodes).unwrap().is_empty());
    }

    #[test]
    fn unaligned_triangles_match_reference_layout() {
        let mut writer = BlockWriter::new();
        writer.write_raw(BlockId::MeshletTriangles, &[1, 2, 3, 4, 5], 5, 1, 0);
        writer.write_pod::<u32>(BlockId::Meshlets, &[], 0);
        let bytes = writer.finish();

        let mut expected = Vec::new();
        expected.extend_from_slice(&MAGIC.to_le_bytes());
        expected.extend_from_slice(&VERSION.to_le_bytes());
        expected.extend_from_slice(&96u32.to_le_bytes());
        expected.extend_from_slice(&104u64.to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        // triangles: id, offset, padded size, count, stride, meta1, meta2
        expected.extend_from_slice(&12u32.to_le_bytes());
        expected.extend_from_slice(&96u64.to_le_bytes());
        expected.extend_from_slice(&8u64.to_le_bytes());
        for v in [5u32, 1, 0, 0] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        // empty meshlets
        expected.extend_from_slice(&10u32.to_le_bytes());
        expected.extend_from_slice(&104u64.to_le_bytes());
        expected.extend_from_slice(&0u64.to_le_bytes());
        for v in [0u32, 0, 0, 0] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        expected.extend_from_slice(&[1, 2, 3, 4, 5, 0, 0, 0]);

        assert_eq!(bytes, expected);
    }

    #[test]
    fn stride_mismatch_is_an_error() {
        let mut writer = BlockWriter::new();
        writer.write_pod(BlockId::MeshletVertices, &[1u16, 2], 0);
        let bytes = writer.finish();
        let table = BlockTable::parse(&bytes).unwrap();
        assert!(matches!(
            table.read_pod::<u32>(BlockId::MeshletVertices),
            Err(CodecError::StrideMismatch { expected: 4, found: 2, .. })
        ));
    }

    #[test]
    fn block_past_the_end_is_rejected() {
        let mut writer = BlockWriter::new();
        writer.write_pod(BlockId::MeshletVertices, &[1u32, 2, 3], 0);
        let mut bytes = writer.finish();
        // grow the recorded size of the only block
        let size_at = HEADER_SIZE + 12;
        bytes[size_at..size_at + 8].copy_from_slice(&1000u64.to_le_bytes());
        assert!(matches!(BlockTable::parse(&bytes), Err(CodecError::BlockOutOfRange { id: 11, .. })));
    }

    #[test]
    fn truncated_descriptor_table() {
        let bytes = BlockWriter::new().finish();
        let mut broken = bytes.clone();
        broken[20..24].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(BlockTable::parse(&broken), Err(CodecError::Truncated { .. })));
        assert!(matches!(BlockTable::parse(&bytes[..10]), Err(CodecError::Truncated { .. })));
    }
}
