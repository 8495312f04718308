//! CPU versions of the culling and compaction kernels for [`lume_soft`].

use super::frustum::sphere_visible;
use super::kernels::*;
use crate::data::IndexElement;
use crate::{ClusterNode, Meshlet, MeshletBounds};
use glam::{Mat4, Vec3, Vec4};
use lume_core::LumeResult;
use lume_soft::{Invocation, Slot, SoftDevice};

const GROUP_SIZE: u32 = 64;

const MESHLETS: Slot = Slot::new(MESH_GROUP, mesh_binding::MESHLETS);
const BOUNDS: Slot = Slot::new(MESH_GROUP, mesh_binding::BOUNDS);
const CLUSTER_NODES: Slot = Slot::new(MESH_GROUP, mesh_binding::CLUSTER_NODES);
const MESHLET_VERTICES: Slot = Slot::new(MESH_GROUP, mesh_binding::MESHLET_VERTICES);
const MESHLET_TRIANGLES: Slot = Slot::new(MESH_GROUP, mesh_binding::MESHLET_TRIANGLES);
const INDEX_TABLE: Slot = Slot::new(MESH_GROUP, mesh_binding::INDEX_TABLE);
const TRIANGLE_BASE: Slot = Slot::new(MESH_GROUP, mesh_binding::TRIANGLE_BASE);

const CULL_UNIFORMS: Slot = Slot::new(FRAME_GROUP, frame_binding::UNIFORMS);
const DEPTH: Slot = Slot::new(FRAME_GROUP, frame_binding::DEPTH);
const CLUSTER_COUNTERS: Slot = Slot::new(FRAME_GROUP, frame_binding::CLUSTER_COUNTERS);
const DISPATCH_ARGS: Slot = Slot::new(FRAME_GROUP, frame_binding::DISPATCH_ARGS);
const VISIBLE_MESHLETS: Slot = Slot::new(FRAME_GROUP, frame_binding::VISIBLE_MESHLETS);
const VISIBLE_COUNTER: Slot = Slot::new(FRAME_GROUP, frame_binding::VISIBLE_COUNTER);

const READ: Slot = Slot::new(PING_PONG_GROUP, ping_pong_binding::READ);
const WRITE: Slot = Slot::new(PING_PONG_GROUP, ping_pong_binding::WRITE);

const OUT_UNIFORMS: Slot = Slot::new(OUTPUT_GROUP, output_binding::UNIFORMS);
const OUT_VISIBLE: Slot = Slot::new(OUTPUT_GROUP, output_binding::VISIBLE_MESHLETS);
const OUT_INDICES: Slot = Slot::new(OUTPUT_GROUP, output_binding::INDICES);
const OUT_TRIANGLE_IDS: Slot = Slot::new(OUTPUT_GROUP, output_binding::TRIANGLE_IDS);
const OUT_INDEX_COUNTER: Slot = Slot::new(OUTPUT_GROUP, output_binding::INDEX_COUNTER);

/// Registers all five kernel entry points on `device`.
pub fn register_kernels(device: &SoftDevice) {
    device.register_kernel(CULL_CLUSTER, [GROUP_SIZE, 1, 1], cull_cluster);
    device.register_kernel(PREPARE_CLUSTER, [1, 1, 1], prepare_cluster);
    device.register_kernel(CULL_MESHLET, [GROUP_SIZE, 1, 1], cull_meshlet);
    device.register_kernel(COMPACTION_U16, [GROUP_SIZE, 1, 1], compaction::<u16>);
    device.register_kernel(COMPACTION_U32, [GROUP_SIZE, 1, 1], compaction::<u32>);
}

fn visible(u: &CullUniforms, center: [f32; 3], radius: f32) -> bool {
    let planes = u.planes.map(Vec4::from_array);
    let object_to_world = Mat4::from_cols_array_2d(&u.object_to_world);
    sphere_visible(&planes, object_to_world, u.object_scale, Vec3::from(center), radius)
}

fn cull_cluster(inv: &Invocation<'_>) -> LumeResult<()> {
    let u: CullUniforms = inv.read(CULL_UNIFORMS, 0)?;
    let depth: u32 = inv.read(DEPTH, 0)?;
    let thread = inv.global_id[0];

    let node_index = if depth == 0 {
        if thread >= u.root_count {
            return Ok(());
        }
        u.root_first + thread
    } else {
        let candidates: u32 = inv.read(CLUSTER_COUNTERS, depth as usize - 1)?;
        if thread >= candidates {
            return Ok(());
        }
        inv.read(READ, thread as usize)?
    };

    let node: ClusterNode = inv.read(CLUSTER_NODES, node_index as usize)?;
    if !visible(&u, node.center, node.radius) {
        return Ok(());
    }
    let base = inv.atomic_add(CLUSTER_COUNTERS, depth as usize, node.count)?;
    for i in 0..node.count {
        inv.write(WRITE, (base + i) as usize, node.first_index + i)?;
    }
    Ok(())
}

fn prepare_cluster(inv: &Invocation<'_>) -> LumeResult<()> {
    let u: CullUniforms = inv.read(CULL_UNIFORMS, 0)?;
    let depth: u32 = inv.read(DEPTH, 0)?;
    let survivors: u32 = inv.read(CLUSTER_COUNTERS, depth as usize)?;
    // after the leaf clusters the survivors are meshlets
    let group = if depth >= u.max_depth { u.meshlet_group_size } else { u.cluster_group_size };
    inv.write(DISPATCH_ARGS, 0, DispatchArgs::linear(survivors.div_ceil(group.max(1))))?;
    inv.write(DEPTH, 0, depth + 1)
}

fn cull_meshlet(inv: &Invocation<'_>) -> LumeResult<()> {
    let u: CullUniforms = inv.read(CULL_UNIFORMS, 0)?;
    let thread = inv.global_id[0];

    let meshlet = if u.hierarchy_enabled != 0 {
        let candidates: u32 = inv.read(CLUSTER_COUNTERS, u.max_depth as usize)?;
        if thread >= candidates {
            return Ok(());
        }
        inv.read(READ, thread as usize)?
    } else {
        if thread >= u.meshlet_count {
            return Ok(());
        }
        thread
    };

    let bounds: MeshletBounds = inv.read(BOUNDS, meshlet as usize)?;
    if !visible(&u, bounds.center, bounds.radius) {
        return Ok(());
    }
    let slot = inv.atomic_add(VISIBLE_COUNTER, 0, 1)?;
    inv.write(VISIBLE_MESHLETS, slot as usize, meshlet)
}

fn table_entry(inv: &Invocation<'_>, width: u32, entry: u32) -> LumeResult<u32> {
    let mut value = 0u32;
    for b in 0..width {
        let byte: u8 = inv.read(INDEX_TABLE, (entry * width + b) as usize)?;
        value |= (byte as u32) << (8 * b);
    }
    Ok(value)
}

/// One workgroup per visible meshlet, threads striding over its triangles.
fn compaction<I: IndexElement>(inv: &Invocation<'_>) -> LumeResult<()> {
    let u: CompactionUniforms = inv.read(OUT_UNIFORMS, 0)?;
    let meshlet_id: u32 = inv.read(OUT_VISIBLE, inv.workgroup_id[0] as usize)?;
    let meshlet: Meshlet = inv.read(MESHLETS, meshlet_id as usize)?;
    let table_base: u32 = inv.read(TRIANGLE_BASE, meshlet_id as usize)?;

    let mut t = inv.local_id[0];
    while t < meshlet.triangle_count {
        let base = inv.atomic_add(OUT_INDEX_COUNTER, 0, 3)?;
        for k in 0..3 {
            let local: u8 = inv.read(MESHLET_TRIANGLES, (meshlet.triangle_offset + t * 3 + k) as usize)?;
            let vertex: u32 = inv.read(MESHLET_VERTICES, (meshlet.vertex_offset + local as u32) as usize)?;
            inv.write(OUT_INDICES, (base + k) as usize, I::from_u32(vertex))?;
        }
        let id = table_entry(inv, u.table_width, table_base + t)?;
        inv.write(OUT_TRIANGLE_IDS, (base / 3) as usize, id)?;
        t += inv.workgroup_size[0];
    }
    Ok(())
}
