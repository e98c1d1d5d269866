#![cfg_attr(docsrs, feature(doc_cfg))]
//! # parmesh
//!
//! parmesh builds distributed unstructured meshes for PDE codes. Every rank
//! contributes a slice of the input cells and coordinates; the library
//! partitions the cells, ships them to their owners (plus ghost copies),
//! reorders them for locality and assembles a [`Topology`](topology::Topology)
//! with owned/ghost [`IndexMap`](topology::IndexMap)s and a matching
//! [`Geometry`](geometry::Geometry).
//!
//! ## Features
//! - Simplex and tensor-product cells in 1D, 2D and 3D
//! - Lagrange coordinate elements of any degree
//! - Pluggable partitioners and cell reorderings (closures or trait objects)
//! - Pluggable communication backends (serial, threads, MPI)
//! - On-demand edges, faces and connectivities between any two dimensions
//! - Sub-topologies of selected entities
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! parmesh = "0.1"
//! # Optional features:
//! # features = ["mpi-support", "rayon", "metis-support"]
//! ```
//!
//! All construction functions are collective: every rank of the
//! communicator must call them in the same order.

pub mod algs;
pub mod data;
pub mod discretization;
pub mod geometry;
pub mod mesh;
pub mod mesh_error;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, RayonComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::partition::{CellPartitioner, GraphPartition, GraphPartitioner, RcmBands};
    #[cfg(feature = "metis-support")]
    pub use crate::algs::partition::MetisKway;
    pub use crate::algs::rcm::{CellReordering, IdentityReordering, ReverseCuthillMcKee};
    pub use crate::algs::submesh::SubMesh;
    pub use crate::data::AdjacencyList;
    pub use crate::discretization::{CoordinateElement, ElementDofLayout, ElementFamily};
    pub use crate::geometry::Geometry;
    pub use crate::mesh::{
        GhostMode, Mesh, MeshConfig, create_mesh, create_mesh_with_config,
        create_mesh_with_partitioner,
    };
    pub use crate::mesh_error::MeshError;
    pub use crate::topology::{CellType, IndexMap, Topology};
}
