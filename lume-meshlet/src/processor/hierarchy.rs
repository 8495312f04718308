use super::bounds::merge_spheres;
use crate::{ClusterNode, HierarchyLevelInfo, Meshlet, MeshletBounds};
use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound on stored levels, counting the meshlet level itself.
pub const MAX_DEPTH: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Children per parent the partitioner aims for.
    pub partition_size: usize,
    /// Levels are built while the top has more nodes than this.
    pub min_root_count: usize,
    pub min_relative_reduction: f32,
    pub min_absolute_reduction: usize,
    /// Above this node count the relative reduction test applies, below it the absolute one.
    pub reduction_check_threshold: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            partition_size: 4,
            min_root_count: 32,
            min_relative_reduction: 0.2,
            min_absolute_reduction: 32,
            reduction_check_threshold: 128,
        }
    }
}

/// Partition id per input cluster plus the number of distinct partitions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub ids: Vec<u32>,
    pub count: usize,
}

/// Groups clusters that share vertices.
///
/// `cluster_indices` is the concatenation of every cluster's global vertex
/// indices, `cluster_index_counts[i]` the length of cluster `i`'s run.
pub trait ClusterPartitioner {
    fn partition(
        &self,
        cluster_indices: &[u32],
        cluster_index_counts: &[u32],
        vertex_count: usize,
        target_partition_size: usize,
    ) -> Partition;
}

/// Breadth-first flattened cluster tree.
///
/// `levels[0]` is the root level, the last entry the leaf clusters whose
/// ranges address meshlets. Empty when the mesh is rendered flat.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterHierarchy {
    pub nodes: Vec<ClusterNode>,
    pub levels: Vec<HierarchyLevelInfo>,
}

impl ClusterHierarchy {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of cluster levels above the meshlets.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Slice of nodes on cluster level `depth` (0 is the root).
    pub fn level_nodes(&self, depth: usize) -> &[ClusterNode] {
        self.levels
            .get(depth)
            .and_then(|l| self.nodes.get(l.first_index as usize..(l.first_index + l.count) as usize))
            .unwrap_or(&[])
    }
}

#[derive(Clone, Copy, Debug)]
struct BuildNode {
    center: Vec3,
    radius: f32,
    /// Meshlet id on level 0, first child position in the level below otherwise.
    first: u32,
    count: u32,
}

/// Builds the cluster tree and reorders the meshlet buffers so that every
/// leaf cluster covers a contiguous meshlet range.
///
/// Returns an empty hierarchy, leaving the buffers untouched, when fewer than
/// `min_root_count` meshlets exist or no level survives the reduction test.
pub fn build_hierarchy<P: ClusterPartitioner + ?Sized>(
    meshlets: &mut Vec<Meshlet>,
    meshlet_vertices: &mut Vec<u32>,
    meshlet_triangles: &mut Vec<u8>,
    bounds: &mut Vec<MeshletBounds>,
    vertex_count: usize,
    partitioner: &P,
    config: &HierarchyConfig,
) -> ClusterHierarchy {
    let meshlet_count = meshlets.len();
    if meshlet_count < config.min_root_count {
        log::info!(
            "{} meshlets below root minimum {}, no hierarchy created",
            meshlet_count,
            config.min_root_count
        );
        return ClusterHierarchy::default();
    }
    if bounds.len() != meshlet_count {
        log::warn!("{} bounds for {} meshlets, no hierarchy created", bounds.len(), meshlet_count);
        return ClusterHierarchy::default();
    }

    let leaves: Vec<BuildNode> = bounds
        .iter()
        .enumerate()
        .map(|(i, b)| BuildNode {
            center: Vec3::from(b.center),
            radius: b.radius,
            first: i as u32,
            count: 0,
        })
        .collect();
    let (vertex_pool, triangle_pool): (&[u32], &[u8]) = (meshlet_vertices, meshlet_triangles);
    let mut index_sets: Vec<Vec<u32>> = meshlets
        .par_iter()
        .map(|m| meshlet_indices(m, vertex_pool, triangle_pool))
        .collect();
    let mut levels = vec![leaves];

    while levels[levels.len() - 1].len() > config.min_root_count && levels.len() < MAX_DEPTH {
        let top = levels.len() - 1;
        let current_count = levels[top].len();

        let counts: Vec<u32> = index_sets.iter().map(|s| s.len() as u32).collect();
        let flat = index_sets.concat();
        let partition = partitioner.partition(&flat, &counts, vertex_count, config.partition_size);
        if partition.ids.len() != current_count {
            log::warn!(
                "partitioner returned {} ids for {} clusters, stopping",
                partition.ids.len(),
                current_count
            );
            break;
        }
        if should_stop(current_count, partition.count, config) {
            log::debug!(
                "level {}: {} -> {} clusters is not enough reduction, stopping",
                top + 1,
                current_count,
                partition.count
            );
            break;
        }

        // buckets in order of first appearance
        let mut bucket_of: HashMap<u32, usize> = HashMap::with_capacity(partition.count);
        let mut buckets: Vec<Vec<usize>> = Vec::with_capacity(partition.count);
        for (i, &pid) in partition.ids.iter().enumerate() {
            let b = *bucket_of.entry(pid).or_insert_with(|| {
                buckets.push(Vec::new());
                buckets.len() - 1
            });
            buckets[b].push(i);
        }

        // children of one parent become a contiguous run in their level
        let order: Vec<usize> = buckets.iter().flatten().copied().collect();
        let reordered: Vec<BuildNode> = order.iter().map(|&i| levels[top][i]).collect();
        levels[top] = reordered;
        index_sets = order.iter().map(|&i| std::mem::take(&mut index_sets[i])).collect();

        let mut starts = Vec::with_capacity(buckets.len());
        let mut running = 0usize;
        for bucket in &buckets {
            starts.push(running);
            running += bucket.len();
        }

        let children = &levels[top];
        let (parents, parent_sets): (Vec<BuildNode>, Vec<Vec<u32>>) = buckets
            .par_iter()
            .zip(starts.par_iter())
            .map(|(bucket, &start)| {
                let range = start..start + bucket.len();
                let spheres: Vec<(Vec3, f32)> = children[range.clone()].iter().map(|c| (c.center, c.radius)).collect();
                let (center, radius) = merge_spheres(&spheres);
                let node = BuildNode {
                    center,
                    radius,
                    first: start as u32,
                    count: bucket.len() as u32,
                };
                (node, index_sets[range].concat())
            })
            .unzip();

        log::debug!("level {}: {} -> {} clusters", top + 1, current_count, parents.len());
        levels.push(parents);
        index_sets = parent_sets;
    }
    drop(index_sets);

    if levels.len() < 2 {
        log::info!("no cluster level passed the reduction test, no hierarchy created");
        return ClusterHierarchy::default();
    }

    // meshlet ids follow leaf clusters in creation order, before the layout pass
    let new_order: Vec<u32> = levels[0].iter().map(|n| n.first).collect();
    reorder_meshlets(meshlets, meshlet_vertices, meshlet_triangles, bounds, &new_order);

    lay_out_breadth_first(&mut levels);

    let hierarchy = flatten(&levels);
    log::info!(
        "cluster hierarchy: {} nodes over {} levels, {} meshlets",
        hierarchy.nodes.len(),
        hierarchy.levels.len(),
        meshlet_count
    );
    hierarchy
}

fn should_stop(current: usize, partitions: usize, config: &HierarchyConfig) -> bool {
    let reduction = current.saturating_sub(partitions);
    if current > config.reduction_check_threshold {
        (reduction as f32 / current as f32) < config.min_relative_reduction
    } else {
        reduction < config.min_absolute_reduction
    }
}

fn meshlet_indices(m: &Meshlet, vertices: &[u32], triangles: &[u8]) -> Vec<u32> {
    let vo = m.vertex_offset as usize;
    let to = m.triangle_offset as usize;
    triangles[to..to + m.triangle_count as usize * 3]
        .iter()
        .map(|&local| vertices[vo + local as usize])
        .collect()
}

/// Reorders every cluster level below the root in the order its parents
/// reference it, then rewrites parent ranges. Level order ends up equal to
/// breadth-first order. The meshlet level keeps its positions.
fn lay_out_breadth_first(levels: &mut [Vec<BuildNode>]) {
    for k in (2..levels.len()).rev() {
        let (lower, upper) = levels.split_at_mut(k);
        let children = &mut lower[k - 1];
        let mut reordered = Vec::with_capacity(children.len());
        for parent in upper[0].iter_mut() {
            let start = reordered.len() as u32;
            let range = parent.first as usize..(parent.first + parent.count) as usize;
            reordered.extend_from_slice(&children[range]);
            parent.first = start;
        }
        *children = reordered;
    }
}

fn flatten(levels: &[Vec<BuildNode>]) -> ClusterHierarchy {
    let mut offsets = vec![0usize; levels.len()];
    let mut running = 0usize;
    for k in (1..levels.len()).rev() {
        offsets[k] = running;
        running += levels[k].len();
    }

    let mut nodes = Vec::with_capacity(running);
    let mut infos = Vec::with_capacity(levels.len() - 1);
    for k in (1..levels.len()).rev() {
        infos.push(HierarchyLevelInfo {
            first_index: offsets[k] as i32,
            count: levels[k].len() as i32,
        });
        for n in &levels[k] {
            // leaf clusters keep meshlet ids, which equal level-0 positions
            let first_index = if k == 1 { n.first } else { (offsets[k - 1] + n.first as usize) as u32 };
            nodes.push(ClusterNode {
                center: n.center.to_array(),
                radius: n.radius,
                first_index,
                count: n.count,
            });
        }
    }

    ClusterHierarchy { nodes, levels: infos }
}

/// Rebuilds the meshlet pools in `new_order` (old ids, new position order).
/// Each meshlet's triangle run starts 4-byte aligned.
fn reorder_meshlets(
    meshlets: &mut Vec<Meshlet>,
    meshlet_vertices: &mut Vec<u32>,
    meshlet_triangles: &mut Vec<u8>,
    bounds: &mut Vec<MeshletBounds>,
    new_order: &[u32],
) {
    let mut new_meshlets = Vec::with_capacity(meshlets.len());
    let mut new_vertices = Vec::with_capacity(meshlet_vertices.len());
    let mut new_triangles = Vec::with_capacity(meshlet_triangles.len() + meshlets.len() * 3);
    let mut new_bounds = Vec::with_capacity(bounds.len());

    for &old in new_order {
        let m = meshlets[old as usize];
        let vo = m.vertex_offset as usize;
        let to = m.triangle_offset as usize;

        let vertex_offset = new_vertices.len() as u32;
        new_vertices.extend_from_slice(&meshlet_vertices[vo..vo + m.vertex_count as usize]);

        let triangle_offset = new_triangles.len() as u32;
        new_triangles.extend_from_slice(&meshlet_triangles[to..to + m.triangle_count as usize * 3]);
        new_triangles.resize(new_triangles.len().next_multiple_of(4), 0);

        new_meshlets.push(Meshlet {
            vertex_offset,
            triangle_offset,
            ..m
        });
        new_bounds.push(bounds[old as usize]);
    }

    *meshlets = new_meshlets;
    *meshlet_vertices = new_vertices;
    *meshlet_triangles = new_triangles;
    *bounds = new_bounds;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{BTreeSet, VecDeque};

    /// One triangle per meshlet on private vertices 3i..3i+3, sphere at x = i.
    fn strip(n: usize) -> (Vec<Meshlet>, Vec<u32>, Vec<u8>, Vec<MeshletBounds>) {
        let meshlets = (0..n as u32)
            .map(|i| Meshlet {
                vertex_offset: i * 3,
                triangle_offset: i * 4,
                vertex_count: 3,
                triangle_count: 1,
            })
            .collect();
        let vertices = (0..n as u32 * 3).collect();
        let triangles = (0..n).flat_map(|_| [0u8, 1, 2, 0]).collect();
        let bounds = (0..n)
            .map(|i| MeshletBounds {
                center: [i as f32, 0.0, 0.0],
                radius: 0.5,
                ..Default::default()
            })
            .collect();
        (meshlets, vertices, triangles, bounds)
    }

    /// Hands out a fixed partition count per call, grouping clusters contiguously.
    struct Scripted {
        counts: RefCell<VecDeque<usize>>,
    }

    impl Scripted {
        fn new(counts: &[usize]) -> Self {
            Self {
                counts: RefCell::new(counts.iter().copied().collect()),
            }
        }
    }

    impl ClusterPartitioner for Scripted {
        fn partition(&self, _: &[u32], counts: &[u32], _: usize, _: usize) -> Partition {
            let n = counts.len();
            let target = self.counts.borrow_mut().pop_front().unwrap_or(n);
            let ids = (0..n).map(|i| (i * target / n) as u32).collect();
            Partition { ids, count: target }
        }
    }

    /// Groups clusters by a hash of their smallest vertex index.
    struct Hashed;

    impl ClusterPartitioner for Hashed {
        fn partition(&self, indices: &[u32], counts: &[u32], _: usize, target: usize) -> Partition {
            let buckets = (counts.len() / target).max(1) as u32;
            let mut cursor = 0;
            let ids: Vec<u32> = counts
                .iter()
                .map(|&c| {
                    let min = indices[cursor..cursor + c as usize].iter().min().copied().unwrap_or(0);
                    cursor += c as usize;
                    (min.wrapping_mul(2654435761) >> 7) % buckets
                })
                .collect();
            let count = ids.iter().collect::<BTreeSet<_>>().len();
            Partition { ids, count }
        }
    }

    #[test]
    fn insufficient_second_reduction_keeps_one_level() {
        let (mut m, mut v, mut t, mut b) = strip(1000);
        let expected = (m.clone(), v.clone(), t.clone(), b.clone());
        let h = build_hierarchy(&mut m, &mut v, &mut t, &mut b, 3000, &Scripted::new(&[300, 290]), &HierarchyConfig::default());

        assert_eq!(h.levels, vec![HierarchyLevelInfo { first_index: 0, count: 300 }]);
        assert_eq!(h.nodes.len(), 300);

        let mut next = 0;
        for node in &h.nodes {
            assert_eq!(node.first_index, next);
            next += node.count;
        }
        assert_eq!(next, 1000);

        // contiguous grouping leaves the order, and padded input leaves the pools, as they were
        assert_eq!((m, v, t, b), expected);
    }

    #[test]
    fn too_few_meshlets_stays_flat() {
        let (mut m, mut v, mut t, mut b) = strip(20);
        let expected = (m.clone(), v.clone(), t.clone(), b.clone());
        let h = build_hierarchy(&mut m, &mut v, &mut t, &mut b, 60, &Scripted::new(&[5]), &HierarchyConfig::default());
        assert!(h.is_empty());
        assert!(h.nodes.is_empty());
        assert_eq!((m, v, t, b), expected);
    }

    #[test]
    fn first_level_rejected_stays_flat() {
        let (mut m, mut v, mut t, mut b) = strip(100);
        let h = build_hierarchy(&mut m, &mut v, &mut t, &mut b, 300, &Scripted::new(&[90]), &HierarchyConfig::default());
        assert!(h.is_empty());
    }

    #[test]
    fn depth_is_capped() {
        let config = HierarchyConfig {
            min_root_count: 1,
            min_absolute_reduction: 1,
            ..Default::default()
        };
        let (mut m, mut v, mut t, mut b) = strip(4096);
        let script = Scripted::new(&[2048, 1024, 512, 256, 128, 64, 32, 16, 8, 4, 2]);
        let h = build_hierarchy(&mut m, &mut v, &mut t, &mut b, 4096 * 3, &script, &config);
        assert_eq!(h.depth(), MAX_DEPTH - 1);
        assert_eq!(h.levels[0].count, 8);
    }

    #[test]
    fn multi_level_tree_is_breadth_first() {
        let n = 600;
        let config = HierarchyConfig {
            min_root_count: 8,
            min_absolute_reduction: 4,
            ..Default::default()
        };
        let (mut m, mut v, mut t, mut b) = strip(n);

        // level-0 partition ids by original meshlet, recomputed the way Hashed does it
        let counts = vec![3u32; n];
        let flat: Vec<u32> = (0..n as u32 * 3).collect();
        let leaf_groups = Hashed.partition(&flat, &counts, n * 3, 4).ids;

        let h = build_hierarchy(&mut m, &mut v, &mut t, &mut b, n * 3, &Hashed, &config);
        assert!(h.depth() >= 2, "expected several levels, got {}", h.depth());

        // levels tile the node array, root first
        let mut next = 0;
        for level in &h.levels {
            assert_eq!(level.first_index, next);
            next += level.count;
        }
        assert_eq!(next as usize, h.nodes.len());
        assert!(h.levels[0].count as usize <= config.min_root_count || h.depth() == MAX_DEPTH - 1);

        // inner nodes point forward to children, whose spheres they contain
        for depth in 0..h.depth() - 1 {
            let level = h.levels[depth];
            for i in level.first_index..level.first_index + level.count {
                let node = h.nodes[i as usize];
                assert!(node.first_index > i as u32);
                for child in &h.nodes[node.first_index as usize..(node.first_index + node.count) as usize] {
                    let d = Vec3::from(node.center).distance(Vec3::from(child.center));
                    assert!(d + child.radius <= node.radius * 1.0001 + 1e-4);
                }
            }
        }

        // meshlets moved together with their pools and bounds
        let mut original_ids = Vec::with_capacity(n);
        for (pos, meshlet) in m.iter().enumerate() {
            let k = v[meshlet.vertex_offset as usize] / 3;
            assert_eq!(b[pos].center[0], k as f32);
            assert_eq!(meshlet.triangle_offset % 4, 0);
            original_ids.push(k);
        }
        assert_eq!(original_ids.iter().collect::<BTreeSet<_>>().len(), n);

        // leaf clusters tile the meshlets and hold exactly one original group each
        let mut ranges = Vec::new();
        for leaf in h.level_nodes(h.depth() - 1) {
            let range = leaf.first_index as usize..(leaf.first_index + leaf.count) as usize;
            let group = leaf_groups[original_ids[range.start] as usize];
            assert!(original_ids[range.clone()].iter().all(|&k| leaf_groups[k as usize] == group));
            assert_eq!(leaf_groups.iter().filter(|&&g| g == group).count(), range.len());
            ranges.push(range);
        }
        ranges.sort_by_key(|r| r.start);
        let mut next = 0;
        for range in ranges {
            assert_eq!(range.start, next);
            next = range.end;
        }
        assert_eq!(next, n);
    }

    #[test]
    fn meshlets_follow_leaf_creation_order() {
        let n = 600;
        let config = HierarchyConfig {
            min_root_count: 8,
            min_absolute_reduction: 4,
            ..Default::default()
        };
        let (mut m, mut v, mut t, mut b) = strip(n);
        let counts = vec![3u32; n];
        let flat: Vec<u32> = (0..n as u32 * 3).collect();
        let leaf_groups = Hashed.partition(&flat, &counts, n * 3, 4).ids;

        // groups in order of first appearance, members in original order
        let mut group_order: Vec<u32> = Vec::new();
        for &g in &leaf_groups {
            if !group_order.contains(&g) {
                group_order.push(g);
            }
        }
        let expected: Vec<u32> = group_order
            .iter()
            .flat_map(|&g| { let leaf_groups = &leaf_groups; (0..n as u32).filter(move |&k| leaf_groups[k as usize] == g) })
            .collect();

        let h = build_hierarchy(&mut m, &mut v, &mut t, &mut b, n * 3, &Hashed, &config);
        assert!(h.depth() >= 2);
        let order: Vec<u32> = m.iter().map(|meshlet| v[meshlet.vertex_offset as usize] / 3).collect();
        assert_eq!(order, expected);
    }
}
