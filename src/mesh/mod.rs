//! Distributed mesh construction.
//!
//! [`create_mesh`] runs the whole pipeline on every rank:
//!
//! 1. extract vertex-only cells from the node lists,
//! 2. partition (always asking for facet ghosts; trimmed later),
//! 3. send cells to their owner and ghost ranks,
//! 4. build the dual graph of the owned cells and reorder them,
//! 5. build the topology (index maps, cell -> vertex connectivity),
//!    then any entities the coordinate element needs,
//! 6. build the geometry on the kept cells.
//!
//! All ranks must call it together. A failure on one rank is shared at the
//! next stage boundary, so every rank returns an error instead of waiting on
//! the failed one.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::distribute::{DistributedCells, distribute, validate_destinations};
use crate::algs::dual_graph::build_local_dual_graph;
use crate::algs::exchange::agree;
use crate::algs::extract::extract_topology;
use crate::algs::partition::{CellPartitioner, GraphPartitioner, RcmBands};
use crate::algs::rcm::{CellReordering, ReverseCuthillMcKee, validate_permutation};
use crate::algs::reorder::reorder_list;
use crate::algs::submesh::{SubMesh, create_submesh};
use crate::data::AdjacencyList;
use crate::discretization::{CoordinateElement, ElementDofLayout};
use crate::geometry::{Geometry, create_geometry};
use crate::mesh_error::MeshError;
use crate::topology::builder::create_topology;
use crate::topology::cell_type::CellType;
use crate::topology::topology::Topology;
use bytemuck::Pod;
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// How much neighbour data each rank keeps as ghosts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GhostMode {
    /// No ghost cells.
    None,
    /// Cells sharing a facet with an owned cell.
    #[default]
    SharedFacet,
    /// Cells sharing a vertex with an owned cell. Not supported.
    SharedVertex,
}

/// Settings of a [`create_mesh_with_config`] run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub ghost_mode: GhostMode,
    /// Pseudo-peripheral search passes of the default cell reordering.
    pub reorder_passes: usize,
    /// First message tag used by the pipeline's collectives.
    pub tag: CommTag,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            ghost_mode: GhostMode::SharedFacet,
            reorder_passes: 2,
            tag: CommTag::new(0x1000),
        }
    }
}

/// Topology plus geometry on one rank, bound to its process group.
#[derive(Debug)]
pub struct Mesh<'a, C, T> {
    comm: &'a C,
    tag: CommTag,
    topology: Topology,
    geometry: Geometry<T>,
}

impl<'a, C: Communicator, T: Float> Mesh<'a, C, T> {
    pub fn comm(&self) -> &'a C {
        self.comm
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn geometry(&self) -> &Geometry<T> {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut Geometry<T> {
        &mut self.geometry
    }

    /// Collective: entities of dimension `dim` (see [`Topology::create_entities`]).
    pub fn create_entities(&mut self, dim: usize) -> Result<bool, MeshError> {
        self.topology
            .create_entities(self.comm, self.tag.next(16 + 8 * dim as u16), dim)
    }

    /// Collective: connectivity `d0 -> d1`.
    pub fn create_connectivity(&mut self, d0: usize, d1: usize) -> Result<(), MeshError> {
        self.topology
            .create_connectivity(self.comm, self.tag.next(16), d0, d1)
    }

    /// Collective: sub-topology of the given local entities of dimension `dim`.
    pub fn sub(&mut self, dim: usize, entities: &[i32]) -> Result<SubMesh, MeshError> {
        create_submesh(self.comm, self.tag.next(16), &mut self.topology, dim, entities)
    }
}

/// [`create_mesh_with_config`] with the default partitioner and reordering.
pub fn create_mesh<'a, C, T>(
    comm: &'a C,
    cells: &AdjacencyList<i64>,
    element: &CoordinateElement,
    x: &[T],
    gdim: usize,
    ghost_mode: GhostMode,
) -> Result<Mesh<'a, C, T>, MeshError>
where
    C: Communicator,
    T: Pod + Float,
{
    create_mesh_with_partitioner(
        comm,
        cells,
        element,
        x,
        gdim,
        ghost_mode,
        &GraphPartitioner::<RcmBands>::default(),
    )
}

/// [`create_mesh_with_config`] with a caller-supplied partitioner.
pub fn create_mesh_with_partitioner<'a, C, T, P>(
    comm: &'a C,
    cells: &AdjacencyList<i64>,
    element: &CoordinateElement,
    x: &[T],
    gdim: usize,
    ghost_mode: GhostMode,
    partitioner: &P,
) -> Result<Mesh<'a, C, T>, MeshError>
where
    C: Communicator,
    T: Pod + Float,
    P: CellPartitioner<C>,
{
    let config = MeshConfig {
        ghost_mode,
        ..MeshConfig::default()
    };
    let reorderer = ReverseCuthillMcKee {
        num_passes: config.reorder_passes,
    };
    create_mesh_with_config(comm, cells, element, x, gdim, &config, partitioner, &reorderer)
}

/// Collective mesh construction.
///
/// `cells` are this rank's input cells as full node lists (input node ids),
/// laid out as `element` expects. `x` is this rank's block of the global
/// coordinate array (`gdim` values per node, blocks in rank order).
#[allow(clippy::too_many_arguments)]
pub fn create_mesh_with_config<'a, C, T, P, R>(
    comm: &'a C,
    cells: &AdjacencyList<i64>,
    element: &CoordinateElement,
    x: &[T],
    gdim: usize,
    config: &MeshConfig,
    partitioner: &P,
    reorderer: &R,
) -> Result<Mesh<'a, C, T>, MeshError>
where
    C: Communicator,
    T: Pod + Float,
    P: CellPartitioner<C>,
    R: CellReordering,
{
    let me = comm.rank();
    let ghost_mode = config.ghost_mode;
    if ghost_mode == GhostMode::SharedVertex {
        return Err(MeshError::UnsupportedGhostMode(ghost_mode));
    }
    let tag = config.tag;
    let check = tag.next(56);
    let cell_type = element.cell_shape();
    let tdim = cell_type.dim();
    let layout = element.dof_layout();

    // Partition on vertex-only cells; facet ghosts are a superset of what
    // any supported mode needs.
    let topo_cells = agree(comm, check, extract_topology(cell_type, layout, cells))?;
    let dest = partitioner
        .partition(comm, comm.size(), tdim, &topo_cells, GhostMode::SharedFacet)
        .and_then(|dest| {
            validate_destinations(&dest, cells.num_nodes(), comm.size())?;
            Ok(dest)
        });
    let dest = agree(comm, check, dest)?;

    let received = agree(comm, check, distribute(comm, tag, cells, &dest))?;
    let num_owned = received.num_owned();
    let ordered = agree(
        comm,
        check,
        reorder_owned(&received, cell_type, layout, reorderer),
    )?;
    log::debug!(
        "[rank {me}] reordered {num_owned} owned cells ({} dual graph edges)",
        ordered.dual_edges
    );

    let topology = create_topology(
        comm,
        tag.next(2),
        &ordered.topo_cells,
        &ordered.original_index,
        &received.ghost_owners,
        cell_type,
        ghost_mode,
    );
    let mut topology = agree(comm, check, topology)?;
    for dim in 1..tdim {
        if layout.num_entity_dofs(dim) > 0 {
            let created = topology.create_entities(comm, tag.next(16 + 8 * dim as u16), dim);
            agree(comm, check, created)?;
        }
    }
    let permuted = if element.needs_dof_permutations() {
        topology.create_entity_permutations()
    } else {
        Ok(())
    };
    let num_cells = permuted
        .and_then(|()| Ok(topology.try_index_map(tdim)?.local_size_with_ghosts()));
    let num_cells = agree(comm, check, num_cells)?;

    let cell_nodes = ordered.cell_nodes.truncated(num_cells);
    let geometry = create_geometry(comm, tag.next(48), &topology, element, &cell_nodes, x, gdim);
    let geometry = agree(comm, check, geometry)?;

    log::info!(
        "[rank {me}] mesh ready: {} owned + {} ghost cells, {} nodes",
        num_owned,
        num_cells - num_owned.min(num_cells),
        geometry.num_nodes()
    );
    Ok(Mesh {
        comm,
        tag,
        topology,
        geometry,
    })
}

/// Owned cells of one rank after reordering; ghosts keep their place.
struct OrderedCells {
    cell_nodes: AdjacencyList<i64>,
    topo_cells: AdjacencyList<i64>,
    original_index: Vec<i64>,
    dual_edges: usize,
}

fn reorder_owned<R: CellReordering>(
    received: &DistributedCells,
    cell_type: CellType,
    layout: &ElementDofLayout,
    reorderer: &R,
) -> Result<OrderedCells, MeshError> {
    let num_owned = received.num_owned();
    let topo_cells = extract_topology(cell_type, layout, &received.cells)?;
    let owned = topo_cells.truncated(num_owned);
    let dual = build_local_dual_graph(owned.array(), owned.offsets(), cell_type)?;
    let perm = reorderer.reorder(&dual.graph)?;
    validate_permutation(&perm, num_owned)?;
    let mut original_index = received.original_index.clone();
    for (old, &new) in perm.iter().enumerate() {
        original_index[new as usize] = received.original_index[old];
    }
    Ok(OrderedCells {
        cell_nodes: reorder_list(&received.cells, &perm)?,
        topo_cells: reorder_list(&topo_cells, &perm)?,
        original_index,
        dual_edges: dual.graph.array().len() / 2,
    })
}
