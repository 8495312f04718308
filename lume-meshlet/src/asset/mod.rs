pub mod container;

use crate::data::{BakedMesh, IndexBuffer, IndexTableFormat, IndexWidth, MeshletData};
use crate::error::CodecError;
use crate::{ClusterNode, HierarchyLevelInfo, Meshlet, MeshletBounds};
use container::{BlockId, BlockTable, BlockWriter};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serializes meshlet data into container bytes.
pub fn encode(data: &MeshletData) -> Vec<u8> {
    let mut writer = BlockWriter::new();

    let baked = &data.baked;
    if baked.vertex_count() > 0 {
        writer.write_pod(BlockId::BakedVertices, &baked.positions, 0);
        if !baked.normals.is_empty() {
            writer.write_pod(BlockId::BakedNormals, &baked.normals, 0);
        }
        if !baked.tangents.is_empty() {
            writer.write_pod(BlockId::BakedTangents, &baked.tangents, 0);
        }
        if !baked.uvs.is_empty() {
            writer.write_pod(BlockId::BakedUvs, &baked.uvs, 0);
        }
        match &baked.indices {
            IndexBuffer::Narrow(v) if !v.is_empty() => {
                writer.write_pod(BlockId::BakedIndices, v, IndexWidth::Narrow.format_code())
            }
            IndexBuffer::Wide(v) if !v.is_empty() => writer.write_pod(BlockId::BakedIndices, v, IndexWidth::Wide.format_code()),
            _ => {}
        }
    }

    writer.write_pod(BlockId::Meshlets, &data.meshlets, 0);
    writer.write_pod(BlockId::MeshletVertices, &data.meshlet_vertices, 0);
    writer.write_raw(
        BlockId::MeshletTriangles,
        &data.meshlet_triangles,
        data.meshlet_triangles.len() as u32,
        1,
        0,
    );
    let width = data.table_format.width() as u32;
    let table_stride = if data.index_table.is_empty() { 0 } else { width };
    writer.write_raw(
        BlockId::MeshletIndexTable,
        &data.index_table,
        data.index_table.len() as u32 / width,
        table_stride,
        width,
    );
    writer.write_pod(BlockId::MeshletBounds, &data.bounds, 0);

    if data.has_hierarchy() {
        writer.write_pod(BlockId::ClusterNodes, &data.cluster_nodes, 0);
        let mut info = Vec::with_capacity(4 + data.hierarchy.len() * 8);
        info.extend_from_slice(&(data.hierarchy.len() as i32).to_le_bytes());
        info.extend_from_slice(bytemuck::cast_slice(&data.hierarchy));
        writer.write_raw(BlockId::HierarchyInfo, &info, data.hierarchy.len() as u32, 8, 0);
    }

    writer.finish()
}

/// Parses container bytes. Fails without partial data on any malformed block.
pub fn decode(bytes: &[u8]) -> Result<MeshletData, CodecError> {
    let table = BlockTable::parse(bytes)?;

    let indices = match table.find(BlockId::BakedIndices) {
        None => IndexBuffer::default(),
        Some(block) => {
            let code = block.meta1;
            match IndexWidth::from_format_code(code) {
                Some(IndexWidth::Narrow) => IndexBuffer::Narrow(table.read_pod(BlockId::BakedIndices)?),
                Some(IndexWidth::Wide) => IndexBuffer::Wide(table.read_pod(BlockId::BakedIndices)?),
                None => {
                    return Err(CodecError::UnknownFormat {
                        id: BlockId::BakedIndices as u32,
                        code,
                    });
                }
            }
        }
    };
    let baked = BakedMesh {
        positions: table.read_pod(BlockId::BakedVertices)?,
        normals: table.read_pod(BlockId::BakedNormals)?,
        tangents: table.read_pod(BlockId::BakedTangents)?,
        uvs: table.read_pod(BlockId::BakedUvs)?,
        indices,
    };

    let meshlets: Vec<Meshlet> = table.read_pod(BlockId::Meshlets)?;
    let meshlet_vertices: Vec<u32> = table.read_pod(BlockId::MeshletVertices)?;
    let meshlet_triangles = table.read_raw(BlockId::MeshletTriangles)?.to_vec();
    let bounds: Vec<MeshletBounds> = table.read_pod(BlockId::MeshletBounds)?;

    let (index_table, table_format) = match table.find(BlockId::MeshletIndexTable) {
        None => (Vec::new(), IndexTableFormat::default()),
        Some(block) => {
            let code = block.meta1;
            let format = IndexTableFormat::from_width(code).ok_or(CodecError::UnknownFormat {
                id: BlockId::MeshletIndexTable as u32,
                code,
            })?;
            let mut raw = table.read_raw(BlockId::MeshletIndexTable)?.to_vec();
            // older writers stored the table as whole u32 words, drop the tail
            let triangles: usize = meshlets.iter().map(|m| m.triangle_count as usize).sum();
            raw.truncate(triangles * format.width());
            (raw, format)
        }
    };

    let mut cluster_nodes: Vec<ClusterNode> = Vec::new();
    let mut hierarchy: Vec<HierarchyLevelInfo> = Vec::new();
    if table.find(BlockId::ClusterNodes).is_some() && table.find(BlockId::HierarchyInfo).is_some() {
        cluster_nodes = table.read_pod(BlockId::ClusterNodes)?;
        hierarchy = read_hierarchy_info(&table)?;
        if cluster_nodes.is_empty() || hierarchy.is_empty() {
            cluster_nodes.clear();
            hierarchy.clear();
        }
    }

    let data = MeshletData {
        baked,
        meshlets,
        meshlet_vertices,
        meshlet_triangles,
        index_table,
        table_format,
        bounds,
        cluster_nodes,
        hierarchy,
    };
    if !data.is_valid() {
        return Err(CodecError::InvalidData);
    }
    log::debug!(
        "decoded {} meshlets, {} cluster nodes over {} levels",
        data.meshlets.len(),
        data.cluster_nodes.len(),
        data.hierarchy.len()
    );
    Ok(data)
}

fn read_hierarchy_info(table: &BlockTable<'_>) -> Result<Vec<HierarchyLevelInfo>, CodecError> {
    let Some(block) = table.find(BlockId::HierarchyInfo) else {
        return Ok(Vec::new());
    };
    let stride = block.stride;
    if stride != 8 {
        return Err(CodecError::StrideMismatch {
            id: BlockId::HierarchyInfo as u32,
            expected: 8,
            found: stride,
        });
    }
    let (id, offset, size) = (block.id, block.offset, block.size);
    let payload = table.block_bytes(block);
    let Some(count) = payload.get(..4) else {
        return Ok(Vec::new());
    };
    let count = i32::from_le_bytes([count[0], count[1], count[2], count[3]]).max(0) as usize;
    let pairs = payload
        .get(4..4 + count * 8)
        .ok_or(CodecError::BlockOutOfRange { id, offset, size })?;
    Ok(bytemuck::pod_collect_to_vec(pairs))
}

/// Writes a container file through a buffered writer.
pub fn save_to_file<P: AsRef<Path>>(data: &MeshletData, path: P) -> Result<(), CodecError> {
    let bytes = encode(data);
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    log::info!("wrote {} bytes to {:?}", bytes.len(), path.as_ref());
    Ok(())
}

/// Memory-maps and decodes a container file.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<MeshletData, CodecError> {
    let file = File::open(path.as_ref())?;
    // SAFETY: the map is read-only and dropped before returning; decode copies everything out.
    let mmap = unsafe { Mmap::map(&file)? };
    decode(&mmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{ProcessorConfig, SourceMesh, process_mesh};

    fn sample() -> MeshletData {
        MeshletData {
            baked: BakedMesh {
                positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                normals: vec![[0.0, 0.0, 1.0]; 3],
                tangents: Vec::new(),
                uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
                indices: IndexBuffer::Narrow(vec![0, 1, 2]),
            },
            meshlets: vec![Meshlet {
                vertex_offset: 0,
                triangle_offset: 0,
                vertex_count: 3,
                triangle_count: 1,
            }],
            meshlet_vertices: vec![0, 1, 2],
            meshlet_triangles: vec![0, 1, 2],
            index_table: vec![0],
            table_format: IndexTableFormat::U8,
            bounds: vec![MeshletBounds {
                center: [0.3, 0.3, 0.0],
                radius: 0.75,
                ..Default::default()
            }],
            cluster_nodes: Vec::new(),
            hierarchy: Vec::new(),
        }
    }

    #[test]
    fn flat_data_round_trips() {
        let data = sample();
        let bytes = encode(&data);
        assert_eq!(decode(&bytes).unwrap(), data);

        let table = BlockTable::parse(&bytes).unwrap();
        assert!(table.find(BlockId::BakedTangents).is_none());
        assert!(table.find(BlockId::ClusterNodes).is_none());
        assert!(table.find(BlockId::HierarchyInfo).is_none());
        let tris = table.find(BlockId::MeshletTriangles).unwrap();
        assert_eq!(({ tris.count }, { tris.stride }, { tris.size }), (3, 1, 4));
    }

    #[test]
    fn processed_mesh_round_trips() {
        let mut mesh = SourceMesh::default();
        for z in 0..=40u32 {
            for x in 0..=40u32 {
                mesh.positions.push([x as f32, (x * z) as f32 * 0.01, z as f32]);
            }
        }
        for z in 0..40u32 {
            for x in 0..40u32 {
                let i = z * 41 + x;
                mesh.indices.extend([i, i + 41, i + 1, i + 1, i + 41, i + 42]);
            }
        }
        let mut config = ProcessorConfig::default();
        config.hierarchy.min_root_count = 4;
        config.hierarchy.min_absolute_reduction = 1;
        config.force_32bit_indices = true;
        let data = process_mesh(&mesh, &config).unwrap();
        assert!(data.has_hierarchy());

        let bytes = encode(&data);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, data);

        let table = BlockTable::parse(&bytes).unwrap();
        let info = table.find(BlockId::HierarchyInfo).unwrap();
        assert_eq!(({ info.count }, { info.stride }), (data.hierarchy.len() as u32, 8));
        assert_eq!({ table.find(BlockId::BakedIndices).unwrap().meta1 }, 1);
    }

    #[test]
    fn index_table_stride_is_the_table_width() {
        let mut data = sample();
        data.table_format = IndexTableFormat::U16;
        data.index_table = 256u16.to_le_bytes().to_vec();
        let bytes = encode(&data);

        let table = BlockTable::parse(&bytes).unwrap();
        let block = table.find(BlockId::MeshletIndexTable).unwrap();
        assert_eq!(({ block.count }, { block.stride }, { block.meta1 }, { block.size }), (1, 2, 2, 4));
        assert_eq!(decode(&bytes).unwrap(), data);
    }

    #[test]
    fn bad_magic_and_version() {
        let mut bytes = encode(&sample());
        bytes[0] ^= 0xFF;
        assert!(matches!(decode(&bytes), Err(CodecError::BadMagic { expected: 0x4D45_5348, .. })));

        let mut bytes = encode(&sample());
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(CodecError::UnsupportedVersion(2))));
    }

    #[test]
    fn empty_meshlets_are_invalid() {
        let bytes = encode(&MeshletData::default());
        assert!(matches!(decode(&bytes), Err(CodecError::InvalidData)));

        // core blocks are still present, just empty
        let table = BlockTable::parse(&bytes).unwrap();
        assert_eq!(table.blocks.len(), 5);
        assert!(table.blocks.iter().all(|b| b.size == 0 && b.count == 0));
    }

    #[test]
    fn meshlet_outside_the_pools_is_rejected() {
        let mut data = sample();
        data.meshlets[0].vertex_offset = u32::MAX - 1;
        assert!(matches!(decode(&encode(&data)), Err(CodecError::InvalidData)));
    }

    #[test]
    fn word_padded_index_table_is_accepted() {
        let data = sample();
        let mut writer = BlockWriter::new();
        writer.write_pod(BlockId::Meshlets, &data.meshlets, 0);
        writer.write_pod(BlockId::MeshletVertices, &data.meshlet_vertices, 0);
        writer.write_raw(BlockId::MeshletTriangles, &data.meshlet_triangles, 3, 1, 0);
        writer.write_pod(BlockId::MeshletIndexTable, &[0u32], 1);
        writer.write_pod(BlockId::MeshletBounds, &data.bounds, 0);
        let decoded = decode(&writer.finish()).unwrap();
        assert_eq!(decoded.index_table, vec![0]);
        assert_eq!(decoded.table_format, IndexTableFormat::U8);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.mlt");
        save_to_file(&sample(), &path).unwrap();
        assert_eq!(load_from_file(&path).unwrap(), sample());
        assert!(matches!(load_from_file(dir.path().join("missing.mlt")), Err(CodecError::Io(_))));
    }
}
