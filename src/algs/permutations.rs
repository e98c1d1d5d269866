//! Per-cell entity orientation bitmasks.
//!
//! Orientation is read off global vertex indices, so neighbouring cells on
//! different ranks agree on it.
//!
//! * 2D cells: bit `e` is set when edge `e` is reflected.
//! * 3D cells: face `f` uses bits `3f` (reflection) and `3f+1..=3f+2`
//!   (rotations bringing the lowest vertex first); edge `e` uses bit
//!   `3 * num_faces + e`.

use crate::mesh_error::MeshError;
use crate::topology::topology::Topology;

/// Edge is reflected when its first reference vertex has the larger global index.
fn edge_reflected(gv: &[i64], edge: &[usize]) -> bool {
    gv[edge[0]] > gv[edge[1]]
}

/// `(rotations, reflected)` of a triangle or quadrilateral face.
fn face_orientation(gv: &[i64], face: &[usize]) -> (u32, bool) {
    // Vertex positions of the face taken in cyclic order.
    let cycle: &[usize] = if face.len() == 4 { &[0, 1, 3, 2] } else { &[0, 1, 2] };
    let n = cycle.len();
    let rots = (0..n)
        .min_by_key(|&k| gv[face[cycle[k]]])
        .unwrap_or(0);
    let pre = gv[face[cycle[(rots + 1) % n]]];
    let post = gv[face[cycle[(rots + n - 1) % n]]];
    (rots as u32, pre > post)
}

/// Orientation bitmask of every local cell of `topology`.
pub fn compute_entity_permutations(topology: &Topology) -> Result<Vec<u32>, MeshError> {
    let tdim = topology.dim();
    let cell_type = topology.cell_type();
    let cells = topology.try_connectivity(tdim, 0)?;
    let vertex_map = topology.try_index_map(0)?;
    if tdim < 2 {
        return Ok(vec![0; cells.num_nodes()]);
    }

    let edges = cell_type.entity_vertices(1);
    let faces: &[&[usize]] = if tdim == 3 { cell_type.entity_vertices(2) } else { &[] };
    let edge_shift = 3 * faces.len() as u32;

    let mut out = Vec::with_capacity(cells.num_nodes());
    for verts in cells.iter() {
        let gv = vertex_map.local_to_global_list(verts)?;
        let mut bits = 0u32;
        for (f, face) in faces.iter().enumerate() {
            let (rots, refl) = face_orientation(&gv, face);
            bits |= (refl as u32) << (3 * f);
            bits |= rots << (3 * f + 1);
        }
        for (e, edge) in edges.iter().enumerate() {
            if edge_reflected(&gv, edge) {
                bits |= 1 << (edge_shift + e as u32);
            }
        }
        out.push(bits);
    }
    Ok(out)
}
