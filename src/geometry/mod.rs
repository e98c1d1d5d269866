//! Mesh geometry: node coordinates and the cell -> node map.
//!
//! Vertex nodes share the local numbering of the topology's vertices, so
//! for a degree-1 element the dofmap equals `connectivity(tdim, 0)`. Other
//! nodes follow in order of first appearance over the cells.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::{agree, all_to_all, gather_counts};
use crate::data::AdjacencyList;
use crate::discretization::CoordinateElement;
use crate::mesh_error::MeshError;
use crate::topology::topology::Topology;
use bytemuck::Pod;
use hashbrown::HashMap;
use num_traits::Float;

#[derive(Clone, Debug, PartialEq)]
pub struct Geometry<T> {
    gdim: usize,
    x: Vec<T>,
    dofmap: AdjacencyList<i32>,
    input_global_indices: Vec<i64>,
    element: CoordinateElement,
}

impl<T: Float> Geometry<T> {
    /// Geometric dimension.
    pub fn gdim(&self) -> usize {
        self.gdim
    }

    /// Row-major coordinates, `gdim` values per local node.
    pub fn x(&self) -> &[T] {
        &self.x
    }

    /// Coordinates of local node `i`.
    pub fn node(&self, i: usize) -> &[T] {
        &self.x[i * self.gdim..(i + 1) * self.gdim]
    }

    pub fn num_nodes(&self) -> usize {
        self.input_global_indices.len()
    }

    /// Cell -> local node indices.
    pub fn dofmap(&self) -> &AdjacencyList<i32> {
        &self.dofmap
    }

    /// Input node id of every local node.
    pub fn input_global_indices(&self) -> &[i64] {
        &self.input_global_indices
    }

    pub fn element(&self) -> &CoordinateElement {
        &self.element
    }
}

/// Collective geometry construction.
///
/// `cell_nodes` are the full node lists of the topology's local cells (owned
/// and ghost, in topology order). `x` is this rank's block of the global
/// coordinate array: rank `r` holds rows `[offset_r, offset_r + n_r)` in
/// rank order. Input errors on any rank fail every rank before coordinates
/// are exchanged. Uses tags `tag` to `tag.next(3)`.
pub fn create_geometry<C, T>(
    comm: &C,
    tag: CommTag,
    topology: &Topology,
    element: &CoordinateElement,
    cell_nodes: &AdjacencyList<i64>,
    x: &[T],
    gdim: usize,
) -> Result<Geometry<T>, MeshError>
where
    C: Communicator,
    T: Pod + Float,
{
    let me = comm.rank();
    let size = comm.size();
    let local = local_nodes(topology, element, cell_nodes, x.len(), gdim);

    // Fetch the needed rows from the ranks holding them.
    let rows_per_rank = gather_counts(comm, tag, x.len() / gdim.max(1))?;
    let mut starts = Vec::with_capacity(size + 1);
    starts.push(0u64);
    for &n in &rows_per_rank {
        starts.push(starts[starts.len() - 1] + n as u64);
    }
    let total = starts[size];
    let planned = local.and_then(|(dofmap, input_global_indices)| {
        let mut requests = vec![Vec::<i64>::new(); size];
        let mut request_slot: Vec<Vec<usize>> = vec![Vec::new(); size];
        for (local, &node) in input_global_indices.iter().enumerate() {
            if node < 0 || node as u64 >= total {
                return Err(MeshError::NodeOutOfRange { node, total });
            }
            // Last rank whose block starts at or before `node`.
            let owner = starts.partition_point(|&s| s <= node as u64) - 1;
            requests[owner].push(node);
            request_slot[owner].push(local);
        }
        Ok((dofmap, input_global_indices, requests, request_slot))
    });
    let (dofmap, input_global_indices, requests, request_slot) = agree(comm, tag.next(3), planned)?;
    let incoming = all_to_all(comm, tag.next(1), &requests)?;
    let my_start = starts[me];
    let replies: Vec<Vec<T>> = incoming
        .iter()
        .map(|ids| {
            ids.iter()
                .flat_map(|&g| {
                    let row = (g as u64 - my_start) as usize;
                    x[row * gdim..(row + 1) * gdim].iter().copied()
                })
                .collect()
        })
        .collect();
    let answers = all_to_all(comm, tag.next(2), &replies)?;

    let mut coords = vec![T::zero(); input_global_indices.len() * gdim];
    for (owner, values) in answers.iter().enumerate() {
        if values.len() != request_slot[owner].len() * gdim {
            return Err(MeshError::comm(
                owner,
                format!("expected {} coordinates, got {}", request_slot[owner].len() * gdim, values.len()),
            ));
        }
        for (&local, row) in request_slot[owner].iter().zip(values.chunks_exact(gdim)) {
            coords[local * gdim..(local + 1) * gdim].copy_from_slice(row);
        }
    }
    log::debug!(
        "[rank {me}] geometry: {} nodes, {} fetched from other ranks",
        input_global_indices.len(),
        request_slot
            .iter()
            .enumerate()
            .filter(|(r, _)| *r != me)
            .map(|(_, s)| s.len())
            .sum::<usize>()
    );

    Ok(Geometry {
        gdim,
        x: coords,
        dofmap,
        input_global_indices,
        element: element.clone(),
    })
}

/// Local checks and node numbering: the dofmap plus the input id of every
/// local node, vertex nodes first.
fn local_nodes(
    topology: &Topology,
    element: &CoordinateElement,
    cell_nodes: &AdjacencyList<i64>,
    x_len: usize,
    gdim: usize,
) -> Result<(AdjacencyList<i32>, Vec<i64>), MeshError> {
    if gdim == 0 || x_len % gdim != 0 {
        return Err(MeshError::InvalidCoordinates { len: x_len, gdim });
    }
    let tdim = topology.dim();
    let num_cells = topology.try_index_map(tdim)?.local_size_with_ghosts();
    if cell_nodes.num_nodes() != num_cells {
        return Err(MeshError::GeometryTopologyMismatch {
            geometry: cell_nodes.num_nodes(),
            topology: num_cells,
        });
    }
    let layout = element.dof_layout();
    let cell_vertex = topology.try_connectivity(tdim, 0)?;

    // Vertex nodes take the topology's vertex numbering.
    let mut local_of: HashMap<i64, i32> = HashMap::new();
    let mut input_global_indices: Vec<i64> = topology.original_vertex_index().to_vec();
    for (v, &id) in input_global_indices.iter().enumerate() {
        local_of.insert(id, v as i32);
    }
    let positions = layout.vertex_positions();
    for (c, nodes) in cell_nodes.iter().enumerate() {
        if nodes.len() != layout.num_dofs() {
            return Err(MeshError::CellNodeCountMismatch {
                cell: c,
                expected: layout.num_dofs(),
                found: nodes.len(),
            });
        }
        for (i, &p) in positions.iter().enumerate() {
            if local_of.get(&nodes[p]) != Some(&cell_vertex.links(c)[i]) {
                return Err(MeshError::GeometryTopologyMismatch {
                    geometry: c,
                    topology: num_cells,
                });
            }
        }
    }
    for nodes in cell_nodes.iter() {
        for &n in nodes {
            local_of.entry(n).or_insert_with(|| {
                input_global_indices.push(n);
                (input_global_indices.len() - 1) as i32
            });
        }
    }
    let dofmap = cell_nodes.try_map(|n| {
        local_of
            .get(n)
            .copied()
            .ok_or(MeshError::NodeOutOfRange { node: *n, total: 0 })
    })?;
    Ok((dofmap, input_global_indices))
}
