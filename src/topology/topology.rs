//! Distributed mesh topology: index maps and connectivity per dimension.
//!
//! A `Topology` of dimension `tdim` holds, for every `d` in `0..=tdim`, an
//! optional [`IndexMap`] and a `(tdim + 1) x (tdim + 1)` table of optional
//! connectivities `d0 -> d1` in local indices. `None` means "not computed
//! yet"; [`Topology::create_entities`] and [`Topology::create_connectivity`]
//! fill entries on demand.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::entities::{compute_entities, create_connectivity};
use crate::algs::permutations::compute_entity_permutations;
use crate::data::AdjacencyList;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;
use crate::topology::index_map::IndexMap;

#[derive(Clone, Debug)]
pub struct Topology {
    cell_type: CellType,
    index_maps: Vec<Option<IndexMap>>,
    connectivity: Vec<Vec<Option<AdjacencyList<i32>>>>,
    original_cell_index: Vec<i64>,
    original_vertex_index: Vec<i64>,
    cell_permutations: Option<Vec<u32>>,
}

impl Topology {
    /// Empty topology for cells of `cell_type`.
    pub fn new(cell_type: CellType) -> Self {
        let n = cell_type.dim() + 1;
        Self {
            cell_type,
            index_maps: vec![None; n],
            connectivity: vec![vec![None; n]; n],
            original_cell_index: Vec::new(),
            original_vertex_index: Vec::new(),
            cell_permutations: None,
        }
    }

    /// Topological dimension.
    pub fn dim(&self) -> usize {
        self.cell_type.dim()
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    fn check_dim(&self, dim: usize) -> Result<(), MeshError> {
        if dim > self.dim() {
            return Err(MeshError::InvalidDimension {
                dim,
                tdim: self.dim(),
            });
        }
        Ok(())
    }

    pub fn index_map(&self, dim: usize) -> Option<&IndexMap> {
        self.index_maps.get(dim)?.as_ref()
    }

    /// Index map of `dim`, or [`MeshError::MissingIndexMap`].
    pub fn try_index_map(&self, dim: usize) -> Result<&IndexMap, MeshError> {
        self.check_dim(dim)?;
        self.index_map(dim).ok_or(MeshError::MissingIndexMap(dim))
    }

    pub fn set_index_map(&mut self, dim: usize, map: IndexMap) -> Result<(), MeshError> {
        self.check_dim(dim)?;
        self.index_maps[dim] = Some(map);
        Ok(())
    }

    pub fn connectivity(&self, d0: usize, d1: usize) -> Option<&AdjacencyList<i32>> {
        self.connectivity.get(d0)?.get(d1)?.as_ref()
    }

    /// Connectivity `d0 -> d1`, or [`MeshError::MissingConnectivity`].
    pub fn try_connectivity(&self, d0: usize, d1: usize) -> Result<&AdjacencyList<i32>, MeshError> {
        self.check_dim(d0)?;
        self.check_dim(d1)?;
        self.connectivity(d0, d1)
            .ok_or(MeshError::MissingConnectivity { from: d0, to: d1 })
    }

    pub fn set_connectivity(
        &mut self,
        d0: usize,
        d1: usize,
        conn: AdjacencyList<i32>,
    ) -> Result<(), MeshError> {
        self.check_dim(d0)?;
        self.check_dim(d1)?;
        self.connectivity[d0][d1] = Some(conn);
        Ok(())
    }

    /// Input global index of every local cell (owned, then ghosts).
    pub fn original_cell_index(&self) -> &[i64] {
        &self.original_cell_index
    }

    pub fn set_original_cell_index(&mut self, index: Vec<i64>) {
        self.original_cell_index = index;
    }

    /// Input id of every local vertex.
    pub fn original_vertex_index(&self) -> &[i64] {
        &self.original_vertex_index
    }

    pub fn set_original_vertex_index(&mut self, index: Vec<i64>) {
        self.original_vertex_index = index;
    }

    /// Per-cell entity permutation bitmasks, if computed.
    pub fn cell_permutations(&self) -> Option<&[u32]> {
        self.cell_permutations.as_deref()
    }

    /// Number of local entities (owned + ghosts) of dimension `dim`, if the
    /// index map exists.
    pub fn num_entities(&self, dim: usize) -> Option<usize> {
        self.index_map(dim).map(IndexMap::local_size_with_ghosts)
    }

    /// Collective: compute and attach entities of dimension `dim`
    /// (`index_map(dim)`, `connectivity(dim, 0)`, `connectivity(tdim, dim)`).
    /// Returns `false` when they already exist.
    pub fn create_entities<C: Communicator>(
        &mut self,
        comm: &C,
        tag: CommTag,
        dim: usize,
    ) -> Result<bool, MeshError> {
        self.check_dim(dim)?;
        let Some(computed) = compute_entities(comm, tag, self, dim)? else {
            return Ok(false);
        };
        let tdim = self.dim();
        self.set_connectivity(tdim, dim, computed.cell_entity)?;
        self.set_connectivity(dim, 0, computed.entity_vertex)?;
        self.set_index_map(dim, computed.index_map)?;
        Ok(true)
    }

    /// Collective: compute connectivity `d0 -> d1` (and whatever it needs).
    pub fn create_connectivity<C: Communicator>(
        &mut self,
        comm: &C,
        tag: CommTag,
        d0: usize,
        d1: usize,
    ) -> Result<(), MeshError> {
        self.check_dim(d0)?;
        self.check_dim(d1)?;
        create_connectivity(comm, tag, self, d0, d1)
    }

    /// Compute the per-cell entity permutation bitmasks.
    pub fn create_entity_permutations(&mut self) -> Result<(), MeshError> {
        if self.cell_permutations.is_none() {
            self.cell_permutations = Some(compute_entity_permutations(self)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_is_none_not_error() {
        let t = Topology::new(CellType::Triangle);
        assert_eq!(t.dim(), 2);
        assert!(t.connectivity(2, 0).is_none());
        assert!(t.index_map(1).is_none());
        assert!(matches!(
            t.try_connectivity(2, 1),
            Err(MeshError::MissingConnectivity { from: 2, to: 1 })
        ));
        assert!(matches!(
            t.try_index_map(3),
            Err(MeshError::InvalidDimension { dim: 3, tdim: 2 })
        ));
    }

    #[test]
    fn set_and_get() {
        let mut t = Topology::new(CellType::Segment);
        t.set_index_map(0, IndexMap::local(3)).unwrap();
        t.set_connectivity(1, 0, AdjacencyList::uniform(vec![0, 1, 1, 2], 2).unwrap())
            .unwrap();
        assert_eq!(t.num_entities(0), Some(3));
        assert_eq!(t.connectivity(1, 0).unwrap().links(1), &[1, 2]);
        assert!(t.set_connectivity(2, 0, AdjacencyList::default()).is_err());
    }
}
