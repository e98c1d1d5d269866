//! Build the distributed [`Topology`] from redistributed, reordered cells.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::{agree, exclusive_scan};
use crate::data::AdjacencyList;
use crate::mesh::GhostMode;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;
use crate::topology::index_map::IndexMap;
use crate::topology::ownership::{request_from_owners, resolve_owners};
use crate::topology::topology::Topology;
use hashbrown::HashMap;

/// Collective topology construction.
///
/// `cells` holds vertex-only connectivity (input vertex ids), owned cells
/// first and `ghost_owners.len()` ghost cells last; `original_cell_index`
/// gives the input index of each row. With [`GhostMode::None`] the ghost
/// rows are dropped.
///
/// Vertex ownership: the lowest rank holding the vertex in an owned cell.
/// Local vertices are numbered owned first, then ghosts, each in order of
/// first appearance over the cells. Uses tags `tag` to `tag.next(10)`.
pub fn create_topology<C: Communicator>(
    comm: &C,
    tag: CommTag,
    cells: &AdjacencyList<i64>,
    original_cell_index: &[i64],
    ghost_owners: &[i32],
    cell_type: CellType,
    ghost_mode: GhostMode,
) -> Result<Topology, MeshError> {
    let me = comm.rank();
    let tdim = cell_type.dim();
    agree(comm, tag.next(10), check_cells(cells, original_cell_index, ghost_owners, cell_type))?;
    let num_owned = cells.num_nodes() - ghost_owners.len();
    let (cells, original_cell_index, ghost_owners) = match ghost_mode {
        GhostMode::None => (
            cells.truncated(num_owned),
            &original_cell_index[..num_owned],
            &ghost_owners[..0],
        ),
        _ => (cells.clone(), original_cell_index, ghost_owners),
    };

    // Cell index map: ghost global indices come from the owners.
    let (cell_offset, _) = exclusive_scan(comm, tag, num_owned)?;
    let new_cell_index: HashMap<i64, i64> = original_cell_index[..num_owned]
        .iter()
        .enumerate()
        .map(|(i, &orig)| (orig, (cell_offset + i) as i64))
        .collect();
    let ghost_owner_ranks: Vec<usize> = ghost_owners.iter().map(|&o| o as usize).collect();
    let ghost_cells = request_from_owners(
        comm,
        tag.next(1),
        &original_cell_index[num_owned..],
        1,
        &ghost_owner_ranks,
        1,
        |key| new_cell_index.get(&key[0]).map(|&g| vec![g]),
    )?;
    let cell_map = IndexMap::new(
        comm,
        tag.next(3),
        num_owned,
        ghost_cells,
        ghost_owners.to_vec(),
    )?;

    // Local vertices in first-appearance order, flagged by owned-cell use.
    let mut first_seen: HashMap<i64, usize> = HashMap::new();
    let mut vertices: Vec<i64> = Vec::new();
    let mut in_owned: Vec<bool> = Vec::new();
    for (c, row) in cells.iter().enumerate() {
        for &v in row {
            let k = *first_seen.entry(v).or_insert_with(|| {
                vertices.push(v);
                in_owned.push(false);
                vertices.len() - 1
            });
            in_owned[k] |= c < num_owned;
        }
    }
    let owners = resolve_owners(comm, tag.next(4), &vertices, 1, &in_owned)?;

    let mut local_of: HashMap<i64, i32> = HashMap::with_capacity(vertices.len());
    let mut original_vertex_index = Vec::with_capacity(vertices.len());
    for (&v, &o) in vertices.iter().zip(&owners) {
        if o == me {
            local_of.insert(v, original_vertex_index.len() as i32);
            original_vertex_index.push(v);
        }
    }
    let num_owned_vertices = original_vertex_index.len();
    let mut ghost_vertex_owners = Vec::new();
    for (&v, &o) in vertices.iter().zip(&owners) {
        if o != me {
            local_of.insert(v, original_vertex_index.len() as i32);
            original_vertex_index.push(v);
            ghost_vertex_owners.push(o);
        }
    }

    let (vertex_offset, _) = exclusive_scan(comm, tag.next(6), num_owned_vertices)?;
    let new_vertex_index: HashMap<i64, i64> = original_vertex_index[..num_owned_vertices]
        .iter()
        .enumerate()
        .map(|(i, &v)| (v, (vertex_offset + i) as i64))
        .collect();
    let ghost_vertices = request_from_owners(
        comm,
        tag.next(7),
        &original_vertex_index[num_owned_vertices..],
        1,
        &ghost_vertex_owners,
        1,
        |key| new_vertex_index.get(&key[0]).map(|&g| vec![g]),
    )?;
    let vertex_map = IndexMap::new(
        comm,
        tag.next(9),
        num_owned_vertices,
        ghost_vertices,
        ghost_vertex_owners.iter().map(|&o| o as i32).collect(),
    )?;

    let cell_vertex = cells.try_map(|v| {
        local_of.get(v).copied().ok_or(MeshError::OwnershipResolution {
            rank: me,
            key: vec![*v],
        })
    })?;

    log::debug!(
        "[rank {me}] topology: {num_owned} owned + {} ghost cells, {num_owned_vertices} owned + {} ghost vertices",
        cell_map.num_ghosts(),
        vertex_map.num_ghosts()
    );

    let num_vertices = vertex_map.local_size_with_ghosts();
    let num_cells = cell_map.local_size_with_ghosts();
    let mut topology = Topology::new(cell_type);
    topology.set_index_map(0, vertex_map)?;
    topology.set_connectivity(0, 0, AdjacencyList::identity(num_vertices))?;
    topology.set_connectivity(tdim, 0, cell_vertex)?;
    if tdim > 0 {
        topology.set_index_map(tdim, cell_map)?;
        topology.set_connectivity(tdim, tdim, AdjacencyList::identity(num_cells))?;
    }
    topology.set_original_cell_index(original_cell_index.to_vec());
    topology.set_original_vertex_index(original_vertex_index);
    Ok(topology)
}

fn check_cells(
    cells: &AdjacencyList<i64>,
    original_cell_index: &[i64],
    ghost_owners: &[i32],
    cell_type: CellType,
) -> Result<(), MeshError> {
    if original_cell_index.len() != cells.num_nodes() || ghost_owners.len() > cells.num_nodes() {
        return Err(MeshError::InvalidIndexMap(format!(
            "{} cells, {} original indices, {} ghost owners",
            cells.num_nodes(),
            original_cell_index.len(),
            ghost_owners.len()
        )));
    }
    let nv = cell_type.num_vertices();
    if let Some((cell, row)) = cells.iter().enumerate().find(|(_, r)| r.len() != nv) {
        return Err(MeshError::CellNodeCountMismatch {
            cell,
            expected: nv,
            found: row.len(),
        });
    }
    Ok(())
}
