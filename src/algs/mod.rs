//! Distributed algorithms of the mesh pipeline.

pub mod communicator;
pub mod distribute;
pub mod dual_graph;
pub mod entities;
pub mod exchange;
pub mod extract;
pub mod partition;
pub mod permutations;
pub mod rcm;
pub mod reorder;
pub mod submesh;
pub mod wire;

pub use distribute::distribute;
pub use dual_graph::{build_dual_graph, build_local_dual_graph};
pub use extract::extract_topology;
pub use reorder::reorder_list;
pub use submesh::create_submesh;
