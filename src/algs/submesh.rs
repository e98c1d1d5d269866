//! Sub-topology induced by a set of entities of one dimension.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::agree;
use crate::data::AdjacencyList;
use crate::mesh_error::MeshError;
use crate::topology::index_map::{IndexMap, SubMap};
use crate::topology::topology::Topology;
use hashbrown::HashMap;

/// Result of [`create_submesh`].
#[derive(Clone, Debug)]
pub struct SubMesh {
    /// Topology whose cells are the selected entities.
    pub topology: Topology,
    /// Sub vertex -> parent vertex (local indices).
    pub vertex_map: Vec<i32>,
    /// Sub cell -> parent entity (local indices).
    pub entity_map: Vec<i32>,
}

/// Collective: extract the entities `entities` (local indices of dimension
/// `dim`) of `topology` as a new topology.
///
/// The result carries `index_map(0)`, `index_map(dim)`, `connectivity(dim, 0)`
/// and `connectivity(0, 0)`. Geometry is not carried over. Missing
/// `connectivity(dim, 0)` is computed on `topology` first. A bad dimension or
/// entity on any rank fails every rank.
pub fn create_submesh<C: Communicator>(
    comm: &C,
    tag: CommTag,
    topology: &mut Topology,
    dim: usize,
    entities: &[i32],
) -> Result<SubMesh, MeshError> {
    let tdim = topology.dim();
    let dim_ok = if dim > tdim {
        Err(MeshError::InvalidDimension { dim, tdim })
    } else {
        Ok(())
    };
    agree(comm, tag.next(30), dim_ok)?;
    topology.create_connectivity(comm, tag, dim, 0)?;
    let topology = &*topology;

    let (entity_index_map, entity_vertex) =
        agree(comm, tag.next(30), check_selection(topology, dim, entities))?;

    // (a) unique, sorted vertices of the selection
    let mut vertices: Vec<i32> = entities
        .iter()
        .flat_map(|&e| entity_vertex.links(e as usize).iter().copied())
        .collect();
    vertices.sort_unstable();
    vertices.dedup();

    // (b) vertex submap
    let vertex_sub: SubMap = topology
        .try_index_map(0)?
        .create_submap(comm, tag.next(32), &vertices)?;

    // (c) entity submap
    let entity_sub: SubMap = if dim == 0 {
        vertex_sub.clone()
    } else {
        entity_index_map.create_submap(comm, tag.next(40), entities)?
    };

    // (d) entity -> vertex in sub numbering
    let sub_vertex_of: HashMap<i32, i32> = vertex_sub
        .parent_indices
        .iter()
        .enumerate()
        .map(|(sub, &parent)| (parent, sub as i32))
        .collect();
    let rows = entity_sub
        .parent_indices
        .iter()
        .map(|&e| {
            entity_vertex
                .links(e as usize)
                .iter()
                .map(|v| {
                    sub_vertex_of.get(v).copied().ok_or(MeshError::EntityOutOfRange {
                        dim: 0,
                        entity: *v as i64,
                        size: vertices.len(),
                    })
                })
                .collect::<Result<Vec<i32>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let sub_type = topology.cell_type().entity_type(dim)?;
    let num_sub_vertices = vertex_sub.index_map.local_size_with_ghosts();
    let num_sub_cells = entity_sub.index_map.local_size_with_ghosts();
    let mut sub = Topology::new(sub_type);
    sub.set_connectivity(0, 0, AdjacencyList::identity(num_sub_vertices))?;
    if dim > 0 {
        sub.set_connectivity(dim, 0, AdjacencyList::from_rows(rows))?;
        sub.set_connectivity(dim, dim, AdjacencyList::identity(num_sub_cells))?;
        sub.set_index_map(dim, entity_sub.index_map)?;
    }
    sub.set_index_map(0, vertex_sub.index_map)?;

    let parent_vertices = topology.original_vertex_index();
    if !parent_vertices.is_empty() {
        sub.set_original_vertex_index(
            vertex_sub
                .parent_indices
                .iter()
                .map(|&v| parent_vertices[v as usize])
                .collect(),
        );
    }
    if dim == tdim && !topology.original_cell_index().is_empty() {
        let parent_cells = topology.original_cell_index();
        sub.set_original_cell_index(
            entity_sub
                .parent_indices
                .iter()
                .map(|&c| parent_cells[c as usize])
                .collect(),
        );
    }

    log::debug!(
        "[rank {}] submesh of dim {dim}: {num_sub_cells} entities, {num_sub_vertices} vertices",
        comm.rank()
    );
    Ok(SubMesh {
        topology: sub,
        vertex_map: vertex_sub.parent_indices,
        entity_map: entity_sub.parent_indices,
    })
}

fn check_selection<'t>(
    topology: &'t Topology,
    dim: usize,
    entities: &[i32],
) -> Result<(&'t IndexMap, &'t AdjacencyList<i32>), MeshError> {
    let index_map = topology.try_index_map(dim)?;
    let num_entities = index_map.local_size_with_ghosts();
    if let Some(&bad) = entities.iter().find(|&&e| e < 0 || e as usize >= num_entities) {
        return Err(MeshError::EntityOutOfRange {
            dim,
            entity: bad as i64,
            size: num_entities,
        });
    }
    Ok((index_map, topology.try_connectivity(dim, 0)?))
}
