use super::hierarchy::{ClusterPartitioner, Partition};
use std::collections::VecDeque;

/// CSR neighbour lists between clusters that share a vertex.
pub struct Adjacency {
    pub offsets: Vec<u32>,
    pub neighbors: Vec<u32>,
}

impl Adjacency {
    pub fn get_neighbors(&self, cluster_idx: u32) -> &[u32] {
        let start = self.offsets[cluster_idx as usize] as usize;
        let end = self.offsets[cluster_idx as usize + 1] as usize;
        &self.neighbors[start..end]
    }

    pub fn cluster_count(&self) -> usize {
        self.offsets.len() - 1
    }
}

/// Builds cluster adjacency from concatenated per-cluster index sets.
///
/// Indices at or above `vertex_count` are ignored.
pub fn build_adjacency(cluster_indices: &[u32], cluster_index_counts: &[u32], vertex_count: usize) -> Adjacency {
    let num_clusters = cluster_index_counts.len();

    // (vertex, cluster) pairs
    let mut entries = Vec::with_capacity(cluster_indices.len());
    let mut cursor = 0usize;
    for (cluster, &count) in cluster_index_counts.iter().enumerate() {
        let end = cursor + count as usize;
        let indices = cluster_indices.get(cursor..end).unwrap_or(&[]);
        entries.extend(
            indices
                .iter()
                .filter(|&&v| (v as usize) < vertex_count)
                .map(|&v| (v, cluster as u32)),
        );
        cursor = end;
    }
    entries.sort_unstable();
    entries.dedup();

    // Link only consecutive clusters around each vertex (C1-C2, C2-C3, ...).
    // That keeps the graph connected with M-1 edges per vertex instead of M(M-1).
    let mut raw_adj = Vec::with_capacity(entries.len());
    for run in entries.chunk_by(|a, b| a.0 == b.0) {
        for pair in run.windows(2) {
            let (c1, c2) = (pair[0].1, pair[1].1);
            raw_adj.push((c1.min(c2), c1.max(c2)));
        }
    }
    raw_adj.sort_unstable();
    raw_adj.dedup();

    let mut offsets = vec![0u32; num_clusters + 1];
    for &(c1, c2) in &raw_adj {
        offsets[c1 as usize + 1] += 1;
        offsets[c2 as usize + 1] += 1;
    }
    for i in 0..num_clusters {
        offsets[i + 1] += offsets[i];
    }

    let mut cursor = offsets.clone();
    let mut neighbors = vec![0u32; raw_adj.len() * 2];
    for (c1, c2) in raw_adj {
        neighbors[cursor[c1 as usize] as usize] = c2;
        cursor[c1 as usize] += 1;
        neighbors[cursor[c2 as usize] as usize] = c1;
        cursor[c2 as usize] += 1;
    }

    Adjacency { offsets, neighbors }
}

/// Greedy breadth-first grouping of connected clusters, at most
/// `target_group_size` per group. Every cluster lands in exactly one group.
pub fn partition_clusters(adj: &Adjacency, target_group_size: usize) -> Vec<Vec<u32>> {
    let num_clusters = adj.cluster_count();
    let target_group_size = target_group_size.max(1);

    let mut visited = vec![0u64; num_clusters.div_ceil(64)];
    let is_visited = |v: &[u64], i: usize| (v[i / 64] & (1 << (i % 64))) != 0;
    let set_visited = |v: &mut [u64], i: usize| v[i / 64] |= 1 << (i % 64);
    let clear_visited = |v: &mut [u64], i: usize| v[i / 64] &= !(1 << (i % 64));

    let mut groups = Vec::new();
    let mut queue = VecDeque::with_capacity(target_group_size * 2);

    for start in 0..num_clusters {
        if is_visited(&visited, start) {
            continue;
        }

        let mut group = Vec::with_capacity(target_group_size);
        queue.clear();
        queue.push_back(start as u32);
        set_visited(&mut visited, start);

        while let Some(idx) = queue.pop_front() {
            group.push(idx);
            if group.len() >= target_group_size {
                break;
            }
            for &neighbor in adj.get_neighbors(idx) {
                if !is_visited(&visited, neighbor as usize) {
                    set_visited(&mut visited, neighbor as usize);
                    queue.push_back(neighbor);
                }
            }
        }

        // Clusters still queued when the group filled up stay available.
        for idx in queue.drain(..) {
            clear_visited(&mut visited, idx as usize);
        }

        groups.push(group);
    }
    groups
}

/// Vertex-sharing partitioner used by the mesh processor.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdjacencyPartitioner;

impl ClusterPartitioner for AdjacencyPartitioner {
    fn partition(
        &self,
        cluster_indices: &[u32],
        cluster_index_counts: &[u32],
        vertex_count: usize,
        target_partition_size: usize,
    ) -> Partition {
        let adj = build_adjacency(cluster_indices, cluster_index_counts, vertex_count);
        let groups = partition_clusters(&adj, target_partition_size);

        let mut ids = vec![0u32; cluster_index_counts.len()];
        for (pid, group) in groups.iter().enumerate() {
            for &cluster in group {
                ids[cluster as usize] = pid as u32;
            }
        }
        Partition { ids, count: groups.len() }
    }
}
