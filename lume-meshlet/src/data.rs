use crate::{ClusterNode, HierarchyLevelInfo, Meshlet, MeshletBounds};
use bytemuck::Pod;

/// Byte width of the per-triangle meshlet index table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum IndexTableFormat {
    #[default]
    U8 = 1,
    U16 = 2,
    U32 = 4,
}

impl IndexTableFormat {
    /// Smallest width able to address `count` distinct ids.
    pub fn for_count(count: usize) -> Self {
        if count <= u8::MAX as usize {
            Self::U8
        } else if count <= u16::MAX as usize {
            Self::U16
        } else {
            Self::U32
        }
    }

    pub fn from_width(width: u32) -> Option<Self> {
        match width {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            _ => None,
        }
    }

    pub fn width(self) -> usize {
        self as usize
    }

    /// Reads entry `index` from a packed little-endian table.
    pub fn read(self, table: &[u8], index: usize) -> Option<u32> {
        let start = index * self.width();
        let bytes = table.get(start..start + self.width())?;
        Some(match self {
            Self::U8 => bytes[0] as u32,
            Self::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
            Self::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        })
    }
}

/// Width of the render index buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexWidth {
    Narrow,
    Wide,
}

impl IndexWidth {
    pub fn bytes(self) -> usize {
        match self {
            Self::Narrow => 2,
            Self::Wide => 4,
        }
    }

    /// Format code stored in the container's baked index block.
    pub fn format_code(self) -> u32 {
        match self {
            Self::Narrow => 0,
            Self::Wide => 1,
        }
    }

    pub fn from_format_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Narrow),
            1 => Some(Self::Wide),
            _ => None,
        }
    }
}

/// Element type of an index buffer.
pub trait IndexElement: Pod + Copy + Send + Sync + 'static {
    const WIDTH: IndexWidth;
    fn from_u32(value: u32) -> Self;
    fn to_u32(self) -> u32;
}

impl IndexElement for u16 {
    const WIDTH: IndexWidth = IndexWidth::Narrow;
    fn from_u32(value: u32) -> Self {
        value as u16
    }
    fn to_u32(self) -> u32 {
        self as u32
    }
}

impl IndexElement for u32 {
    const WIDTH: IndexWidth = IndexWidth::Wide;
    fn from_u32(value: u32) -> Self {
        value
    }
    fn to_u32(self) -> u32 {
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IndexBuffer {
    Narrow(Vec<u16>),
    Wide(Vec<u32>),
}

impl Default for IndexBuffer {
    fn default() -> Self {
        Self::Narrow(Vec::new())
    }
}

impl IndexBuffer {
    pub fn width(&self) -> IndexWidth {
        match self {
            Self::Narrow(_) => IndexWidth::Narrow,
            Self::Wide(_) => IndexWidth::Wide,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Narrow(v) => v.len(),
            Self::Wide(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Narrow(v) => bytemuck::cast_slice(v),
            Self::Wide(v) => bytemuck::cast_slice(v),
        }
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        match self {
            Self::Narrow(v) => v.get(index).map(|i| *i as u32),
            Self::Wide(v) => v.get(index).copied(),
        }
    }
}

/// Plain triangle mesh expanded from the meshlets, for non-meshlet render paths.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BakedMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tangents: Vec<[f32; 4]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: IndexBuffer,
}

impl BakedMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

/// Everything that ends up in a meshlet container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshletData {
    pub baked: BakedMesh,
    pub meshlets: Vec<Meshlet>,
    pub meshlet_vertices: Vec<u32>,
    pub meshlet_triangles: Vec<u8>,
    pub index_table: Vec<u8>,
    pub table_format: IndexTableFormat,
    pub bounds: Vec<MeshletBounds>,
    pub cluster_nodes: Vec<ClusterNode>,
    pub hierarchy: Vec<HierarchyLevelInfo>,
}

impl MeshletData {
    pub fn has_hierarchy(&self) -> bool {
        !self.cluster_nodes.is_empty() && !self.hierarchy.is_empty()
    }

    /// Non-empty, one bounds entry per meshlet, and every meshlet inside the pools.
    pub fn is_valid(&self) -> bool {
        !self.meshlets.is_empty() && self.meshlets.len() == self.bounds.len() && self.first_invalid_meshlet().is_none()
    }

    /// First meshlet whose ranges leave the vertex or triangle pool, or whose
    /// local indices exceed its vertex count.
    pub fn first_invalid_meshlet(&self) -> Option<usize> {
        let mut triangles = 0u32;
        for (i, m) in self.meshlets.iter().enumerate() {
            let Some((_, local)) = self.meshlet_slices(i) else {
                return Some(i);
            };
            if local.iter().any(|&v| v as u32 >= m.vertex_count) {
                return Some(i);
            }
            let Some(total) = triangles.checked_add(m.triangle_count) else {
                return Some(i);
            };
            triangles = total;
        }
        None
    }

    pub fn triangle_count(&self) -> usize {
        self.meshlets.iter().map(|m| m.triangle_count as usize).sum()
    }

    /// Global vertex indices and local triangle bytes of meshlet `index`.
    pub fn meshlet_slices(&self, index: usize) -> Option<(&[u32], &[u8])> {
        let m = self.meshlets.get(index)?;
        let vertex_end = m.vertex_offset.checked_add(m.vertex_count)?;
        let triangle_end = m.triangle_count.checked_mul(3)?.checked_add(m.triangle_offset)?;
        let vertices = self
            .meshlet_vertices
            .get(m.vertex_offset as usize..vertex_end as usize)?;
        let triangles = self
            .meshlet_triangles
            .get(m.triangle_offset as usize..triangle_end as usize)?;
        Some((vertices, triangles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single() -> MeshletData {
        MeshletData {
            meshlets: vec![Meshlet {
                vertex_offset: 0,
                triangle_offset: 0,
                vertex_count: 3,
                triangle_count: 1,
            }],
            meshlet_vertices: vec![4, 5, 6],
            meshlet_triangles: vec![0, 1, 2, 0],
            bounds: vec![MeshletBounds::default()],
            ..Default::default()
        }
    }

    #[test]
    fn ranges_inside_the_pools_are_valid() {
        let data = single();
        assert!(data.is_valid());
        assert_eq!(data.meshlet_slices(0), Some((&[4u32, 5, 6][..], &[0u8, 1, 2][..])));
    }

    #[test]
    fn overflowing_offsets_are_rejected() {
        let mut data = single();
        data.meshlets[0].vertex_offset = u32::MAX;
        assert_eq!(data.meshlet_slices(0), None);
        assert_eq!(data.first_invalid_meshlet(), Some(0));

        let mut data = single();
        data.meshlets[0].triangle_count = u32::MAX / 2;
        assert_eq!(data.meshlet_slices(0), None);
        assert!(!data.is_valid());
    }

    #[test]
    fn local_index_past_vertex_count_is_rejected() {
        let mut data = single();
        data.meshlet_triangles[2] = 3;
        assert_eq!(data.first_invalid_meshlet(), Some(0));
    }
}
