//! Finite-element descriptors consumed by the mesh pipeline.

pub mod coordinate_element;

pub use coordinate_element::{CoordinateElement, ElementDofLayout, ElementFamily};
