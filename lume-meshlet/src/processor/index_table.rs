use super::hierarchy::ClusterHierarchy;
use crate::Meshlet;
use crate::data::IndexTableFormat;

/// Maps every meshlet to the relative index of its ancestor on cluster level
/// `target_depth`. Returns `None` when that level does not exist.
pub fn generate_cluster_map(hierarchy: &ClusterHierarchy, target_depth: usize, meshlet_count: usize) -> Option<Vec<u32>> {
    let level = hierarchy.levels.get(target_depth)?;
    let leaf_depth = hierarchy.depth() - 1;
    let mut map = vec![0u32; meshlet_count];

    let mut stack = Vec::new();
    for i in 0..level.count.max(0) as u32 {
        stack.push((level.first_index as u32 + i, target_depth));
        while let Some((node_idx, depth)) = stack.pop() {
            let Some(node) = hierarchy.nodes.get(node_idx as usize) else {
                log::warn!("cluster node {} out of range", node_idx);
                continue;
            };
            let range = node.first_index..node.first_index + node.count;
            if depth == leaf_depth {
                for meshlet in range {
                    if let Some(slot) = map.get_mut(meshlet as usize) {
                        *slot = i;
                    }
                }
            } else {
                stack.extend(range.map(|child| (child, depth + 1)));
            }
        }
    }
    Some(map)
}

/// Builds the per-triangle index table in final meshlet order.
///
/// Entries are meshlet ids, or with a valid `target_depth` the relative
/// cluster index on that level. The width is picked from the addressed count.
pub fn build_index_table(
    meshlets: &[Meshlet],
    hierarchy: &ClusterHierarchy,
    target_depth: Option<usize>,
) -> (Vec<u8>, IndexTableFormat) {
    let cluster_map = target_depth.and_then(|d| {
        let map = generate_cluster_map(hierarchy, d, meshlets.len());
        if map.is_none() {
            log::warn!("target depth {} outside {} cluster levels, using meshlet ids", d, hierarchy.depth());
        }
        map.map(|m| (m, hierarchy.levels[d].count as usize))
    });

    let addressed = cluster_map.as_ref().map_or(meshlets.len(), |(_, count)| *count);
    let format = IndexTableFormat::for_count(addressed);
    let triangle_count: usize = meshlets.iter().map(|m| m.triangle_count as usize).sum();

    let mut table = Vec::with_capacity(triangle_count * format.width());
    for (id, meshlet) in meshlets.iter().enumerate() {
        let entry = match &cluster_map {
            Some((map, _)) => map[id],
            None => id as u32,
        };
        let bytes = entry.to_le_bytes();
        for _ in 0..meshlet.triangle_count {
            table.extend_from_slice(&bytes[..format.width()]);
        }
    }
    (table, format)
}
