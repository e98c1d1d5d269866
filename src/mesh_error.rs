//! MeshError: unified error type for parmesh public APIs
//!
//! Every construction step returns `Result<_, MeshError>`. Nothing in the
//! pipeline retries; an error aborts the whole `create_mesh` call.

use crate::discretization::coordinate_element::ElementFamily;
use crate::mesh::GhostMode;
use crate::topology::cell_type::CellType;
use thiserror::Error;

/// Unified error type for mesh construction.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The requested ghost mode is not available for this operation.
    #[error("Ghost mode {0:?} is not supported")]
    UnsupportedGhostMode(GhostMode),
    /// No element layout exists for this cell type/degree.
    #[error("Unsupported element: {family:?} of degree {degree} on {cell_type:?}")]
    UnsupportedElement {
        family: ElementFamily,
        cell_type: CellType,
        degree: usize,
    },
    /// The cell type cannot be inferred or is not handled by this routine.
    #[error("Unsupported cell type {cell_type:?} for {context}")]
    UnsupportedCellType {
        cell_type: CellType,
        context: &'static str,
    },
    /// Dof layout is inconsistent (missing/duplicate dofs, wrong shape).
    #[error("Malformed dof layout: {0}")]
    MalformedDofLayout(String),
    /// A cell lists a different number of nodes than the element expects.
    #[error("Cell {cell} has {found} nodes, expected {expected}")]
    CellNodeCountMismatch {
        cell: usize,
        expected: usize,
        found: usize,
    },
    /// Offsets/array pair violates the adjacency-list invariant.
    #[error("Invalid adjacency list: {0}")]
    InvalidAdjacencyList(String),
    /// More than two cells share one facet.
    #[error("Topology error: facet {vertices:?} is shared by {count} cells (non-manifold)")]
    NonManifoldFacet { vertices: Vec<i64>, count: usize },
    /// A cell repeats a vertex, so one of its facets collapses.
    #[error("Topology error: cell {cell} has a degenerate facet {vertices:?}")]
    DegenerateCell { cell: usize, vertices: Vec<i64> },
    /// Partitioner returned a destination outside the process group.
    #[error("Cell {cell}: destination rank {rank} is outside the process group of size {size}")]
    InvalidDestination { cell: usize, rank: i64, size: usize },
    /// Partitioner contract violation or internal failure.
    #[error("Partitioner error: {0}")]
    Partition(String),
    /// A reordering is not a bijection on the owned cells.
    #[error("Invalid permutation: {0}")]
    InvalidPermutation(String),
    /// Point-to-point or collective exchange failed.
    #[error("Communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// An owner could not answer a request for a key it should own.
    #[error("Ownership resolution failed on rank {rank} for key {key:?}")]
    OwnershipResolution { rank: usize, key: Vec<i64> },
    /// Index map construction received inconsistent ghost data.
    #[error("Invalid index map: {0}")]
    InvalidIndexMap(String),
    /// Local entity index is out of range for its dimension.
    #[error("Entity {entity} of dimension {dim} is out of range (size {size})")]
    EntityOutOfRange { dim: usize, entity: i64, size: usize },
    /// Connectivity `from -> to` has not been computed.
    #[error("Connectivity ({from}, {to}) has not been computed")]
    MissingConnectivity { from: usize, to: usize },
    /// Index map for `dim` has not been computed.
    #[error("Index map for dimension {0} has not been computed")]
    MissingIndexMap(usize),
    /// Requested a dimension larger than the topological dimension.
    #[error("Dimension {dim} exceeds topological dimension {tdim}")]
    InvalidDimension { dim: usize, tdim: usize },
    /// Coordinate array is not a whole number of `gdim` rows.
    #[error("Coordinate array of length {len} is not divisible by gdim = {gdim}")]
    InvalidCoordinates { len: usize, gdim: usize },
    /// A cell references a node id that no rank supplied.
    #[error("Node {node} is out of range (global node count {total})")]
    NodeOutOfRange { node: i64, total: u64 },
    /// Geometry node data does not cover the topology's cells.
    #[error("Geometry has {geometry} cells, topology has {topology}")]
    GeometryTopologyMismatch { geometry: usize, topology: usize },
    /// METIS failure.
    #[cfg(feature = "metis-support")]
    #[error("METIS error: {0}")]
    Metis(String),
}

impl MeshError {
    /// Shorthand for a [`MeshError::CommError`] carrying a message.
    pub fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        MeshError::CommError {
            neighbor,
            source: msg.into().into(),
        }
    }
}
