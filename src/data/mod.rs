//! Data containers shared by the pipeline.

pub mod adjacency_list;

pub use adjacency_list::AdjacencyList;
