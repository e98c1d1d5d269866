//! Distributed numbering of intermediate entities (edges, faces) and
//! derived connectivities.
//!
//! Entities are deduplicated locally by their sorted vertex set. Ownership
//! goes through the postmaster of the entity's lowest global vertex, with
//! claims from owned cells preferred; owned entities are numbered first and
//! ghost entities receive their global index from the owner.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::exclusive_scan;
use crate::data::AdjacencyList;
use crate::mesh_error::MeshError;
use crate::topology::index_map::IndexMap;
use crate::topology::ownership::{request_from_owners, resolve_owners};
use crate::topology::topology::Topology;
use hashbrown::HashMap;

/// Entities of one dimension, in local numbering.
#[derive(Clone, Debug)]
pub struct ComputedEntities {
    /// Cell -> entity, in reference sub-entity order.
    pub cell_entity: AdjacencyList<i32>,
    /// Entity -> local vertices, in the reference order of the first cell
    /// that produced the entity.
    pub entity_vertex: AdjacencyList<i32>,
    pub index_map: IndexMap,
}

/// Collective. Returns `None` for `dim == 0`, `dim == tdim`, or when the
/// entities already exist. Uses tags `tag` to `tag.next(5)`.
pub fn compute_entities<C: Communicator>(
    comm: &C,
    tag: CommTag,
    topology: &Topology,
    dim: usize,
) -> Result<Option<ComputedEntities>, MeshError> {
    let tdim = topology.dim();
    if dim > tdim {
        return Err(MeshError::InvalidDimension { dim, tdim });
    }
    if dim == 0 || dim == tdim || (topology.index_map(dim).is_some() && topology.connectivity(dim, 0).is_some()) {
        return Ok(None);
    }
    let me = comm.rank();
    let cell_type = topology.cell_type();
    let cells = topology.try_connectivity(tdim, 0)?;
    let vertex_map = topology.try_index_map(0)?;
    let num_owned_cells = topology.try_index_map(tdim)?.size_local();
    let ref_entities = cell_type.entity_vertices(dim);
    let width = cell_type.entity_type(dim)?.num_vertices();

    // Local dedup by sorted local vertices.
    let mut lookup: HashMap<Vec<i32>, i32> = HashMap::new();
    let mut entity_rows: Vec<Vec<i32>> = Vec::new();
    let mut in_owned: Vec<bool> = Vec::new();
    let mut cell_entity = Vec::with_capacity(cells.num_nodes() * ref_entities.len());
    for (c, verts) in cells.iter().enumerate() {
        for ent in ref_entities {
            let row: Vec<i32> = ent.iter().map(|&v| verts[v]).collect();
            let mut key = row.clone();
            key.sort_unstable();
            let e = *lookup.entry(key).or_insert_with(|| {
                entity_rows.push(row);
                in_owned.push(false);
                (entity_rows.len() - 1) as i32
            });
            in_owned[e as usize] |= c < num_owned_cells;
            cell_entity.push(e);
        }
    }

    // Global keys: sorted global vertex indices.
    let mut keys = Vec::with_capacity(entity_rows.len() * width);
    for row in &entity_rows {
        let mut k = vertex_map.local_to_global_list(row)?;
        k.sort_unstable();
        keys.extend(k);
    }
    let owners = resolve_owners(comm, tag, &keys, width, &in_owned)?;

    // Owned entities first, then ghosts, both in first-appearance order.
    let n = entity_rows.len();
    let mut new_index = vec![0i32; n];
    let mut order = Vec::with_capacity(n);
    for pass_owned in [true, false] {
        for e in 0..n {
            if (owners[e] == me) == pass_owned {
                new_index[e] = order.len() as i32;
                order.push(e);
            }
        }
    }
    let num_owned = order.iter().filter(|&&e| owners[e] == me).count();
    let (offset, _) = exclusive_scan(comm, tag.next(2), num_owned)?;

    let owned_global: HashMap<&[i64], i64> = order[..num_owned]
        .iter()
        .enumerate()
        .map(|(i, &e)| (&keys[e * width..(e + 1) * width], (offset + i) as i64))
        .collect();
    let mut ghost_keys = Vec::new();
    let mut ghost_owners = Vec::new();
    for &e in &order[num_owned..] {
        ghost_keys.extend_from_slice(&keys[e * width..(e + 1) * width]);
        ghost_owners.push(owners[e]);
    }
    let ghosts = request_from_owners(
        comm,
        tag.next(3),
        &ghost_keys,
        width,
        &ghost_owners,
        1,
        |key| owned_global.get(key).map(|&g| vec![g]),
    )?;
    let index_map = IndexMap::new(
        comm,
        tag.next(5),
        num_owned,
        ghosts,
        ghost_owners.iter().map(|&o| o as i32).collect(),
    )?;

    log::debug!(
        "[rank {me}] entities of dim {dim}: {num_owned} owned, {} ghosts",
        index_map.num_ghosts()
    );
    let cell_entity = AdjacencyList::uniform(
        cell_entity.into_iter().map(|e| new_index[e as usize]).collect(),
        ref_entities.len(),
    )?;
    let entity_vertex = AdjacencyList::from_rows(order.iter().map(|&e| entity_rows[e].iter().copied()));
    Ok(Some(ComputedEntities {
        cell_entity,
        entity_vertex,
        index_map,
    }))
}

/// Collective: make `connectivity(d0, d1)` available on `topology`.
///
/// * `(d, d)` identity,
/// * `(d, 0)` and `(tdim, d)` from entity computation,
/// * `d0 < d1` by transposing `(d1, d0)`,
/// * `d0 > d1 > 0` through the reference sub-entities of each `d0` entity.
pub fn create_connectivity<C: Communicator>(
    comm: &C,
    tag: CommTag,
    topology: &mut Topology,
    d0: usize,
    d1: usize,
) -> Result<(), MeshError> {
    if topology.connectivity(d0, d1).is_some() {
        return Ok(());
    }
    let tdim = topology.dim();
    // Distinct tag families per dimension.
    topology.create_entities(comm, tag.next(8 * d0 as u16), d0)?;
    topology.create_entities(comm, tag.next(8 * d1 as u16), d1)?;
    if topology.connectivity(d0, d1).is_some() {
        return Ok(());
    }

    let conn = if d0 == d1 {
        let n = topology
            .num_entities(d0)
            .ok_or(MeshError::MissingIndexMap(d0))?;
        AdjacencyList::identity(n)
    } else if d0 < d1 {
        create_connectivity(comm, tag, topology, d1, d0)?;
        let n0 = topology
            .num_entities(d0)
            .ok_or(MeshError::MissingIndexMap(d0))?;
        topology.try_connectivity(d1, d0)?.transpose(n0)
    } else {
        // tdim > d0 > d1 > 0: look sub-entities up by sorted vertices.
        debug_assert!(d0 < tdim && d1 > 0);
        let shape = topology.cell_type().entity_type(d0)?;
        let sub = shape.entity_vertices(d1);
        let e1_vertices = topology.try_connectivity(d1, 0)?;
        let lookup: HashMap<Vec<i32>, i32> = e1_vertices
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut key = row.to_vec();
                key.sort_unstable();
                (key, i as i32)
            })
            .collect();
        let e0_vertices = topology.try_connectivity(d0, 0)?;
        let mut rows = Vec::with_capacity(e0_vertices.num_nodes());
        for verts in e0_vertices.iter() {
            let row = sub
                .iter()
                .map(|ent| {
                    let mut key: Vec<i32> = ent.iter().map(|&v| verts[v]).collect();
                    key.sort_unstable();
                    lookup.get(&key).copied().ok_or(MeshError::MissingConnectivity {
                        from: d0,
                        to: d1,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
        AdjacencyList::from_rows(rows)
    };
    topology.set_connectivity(d0, d1, conn)
}
