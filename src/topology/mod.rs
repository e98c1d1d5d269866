//! Mesh topology: cell shapes, distributed index maps and entity
//! connectivity.
//!
//! - [`cell_type`] reference cells and their sub-entity orderings,
//! - [`index_map`] owned/ghost numbering of one entity dimension,
//! - [`ownership`] postmaster ownership agreement,
//! - [`builder`] construction of a [`Topology`] from distributed cells.

pub mod builder;
pub mod cell_type;
pub mod index_map;
pub mod ownership;
#[allow(clippy::module_inception)]
pub mod topology;

pub use builder::create_topology;
pub use cell_type::CellType;
pub use index_map::IndexMap;
pub use topology::Topology;
