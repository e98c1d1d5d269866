//! Cell partitioning: destinations (owner first, then ghost ranks) for every
//! local cell.
//!
//! [`CellPartitioner`] is the calling contract; closures with the same shape
//! implement it. [`GraphPartitioner`] is the default: it builds the
//! distributed dual graph, gathers it on every rank, and runs a
//! deterministic [`GraphPartition`] strategy identically everywhere.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::dual_graph::build_dual_graph;
use crate::algs::exchange::{all_gather, gather_counts};
use crate::algs::rcm::rcm_order;
use crate::data::AdjacencyList;
use crate::mesh::GhostMode;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;

/// Destinations of the local cells: row `i` lists the owner of cell `i`
/// first, then any ranks receiving it as a ghost.
pub trait CellPartitioner<C: Communicator> {
    fn partition(
        &self,
        comm: &C,
        n_parts: usize,
        tdim: usize,
        cells: &AdjacencyList<i64>,
        ghost_mode: GhostMode,
    ) -> Result<AdjacencyList<i32>, MeshError>;
}

impl<C, F> CellPartitioner<C> for F
where
    C: Communicator,
    F: Fn(&C, usize, usize, &AdjacencyList<i64>, GhostMode) -> Result<AdjacencyList<i32>, MeshError>,
{
    fn partition(
        &self,
        comm: &C,
        n_parts: usize,
        tdim: usize,
        cells: &AdjacencyList<i64>,
        ghost_mode: GhostMode,
    ) -> Result<AdjacencyList<i32>, MeshError> {
        self(comm, n_parts, tdim, cells, ghost_mode)
    }
}

/// Strategy assigning a part to every node of a global graph. Must be a
/// deterministic function of its inputs.
pub trait GraphPartition {
    fn partition_graph(&self, graph: &AdjacencyList<i64>, n_parts: usize) -> Result<Vec<i32>, MeshError>;
}

/// Global RCM order cut into `n_parts` contiguous bands of equal size.
#[derive(Clone, Copy, Debug, Default)]
pub struct RcmBands;

impl GraphPartition for RcmBands {
    fn partition_graph(&self, graph: &AdjacencyList<i64>, n_parts: usize) -> Result<Vec<i32>, MeshError> {
        let n = graph.num_nodes();
        let mut parts = vec![0i32; n];
        if n_parts <= 1 || n == 0 {
            return Ok(parts);
        }
        for (pos, node) in rcm_order(graph, 2).into_iter().enumerate() {
            parts[node] = (pos * n_parts / n) as i32;
        }
        Ok(parts)
    }
}

/// METIS k-way partitioning of the gathered graph.
#[cfg(feature = "metis-support")]
#[derive(Clone, Copy, Debug, Default)]
pub struct MetisKway;

#[cfg(feature = "metis-support")]
impl GraphPartition for MetisKway {
    fn partition_graph(&self, graph: &AdjacencyList<i64>, n_parts: usize) -> Result<Vec<i32>, MeshError> {
        let n = graph.num_nodes();
        let mut part = vec![0 as metis::Idx; n];
        if n_parts <= 1 || n == 0 {
            return Ok(part.into_iter().map(|p| p as i32).collect());
        }
        let xadj: Vec<metis::Idx> = graph.offsets().iter().map(|&o| o as metis::Idx).collect();
        let adjncy: Vec<metis::Idx> = graph.array().iter().map(|&v| v as metis::Idx).collect();
        metis::Graph::new(1, n_parts as metis::Idx, &xadj, &adjncy)
            .map_err(|e| MeshError::Metis(format!("{e:?}")))?
            .part_kway(&mut part)
            .map_err(|e| MeshError::Metis(format!("{e:?}")))?;
        Ok(part.into_iter().map(|p| p as i32).collect())
    }
}

/// Default partitioner over the distributed dual graph.
///
/// The dual graph is built distributed, then all-gathered in full on every
/// rank so that `strategy` can run on the global graph. Memory per rank
/// therefore grows with the global mesh, not with the local share; for large
/// meshes supply a [`CellPartitioner`] backed by a distributed partitioner.
///
/// Uses tags `tag` to `tag.next(8)`.
#[derive(Clone, Copy, Debug)]
pub struct GraphPartitioner<P> {
    pub strategy: P,
    pub tag: CommTag,
}

impl<P> GraphPartitioner<P> {
    pub fn new(strategy: P) -> Self {
        Self {
            strategy,
            tag: CommTag::new(0x0500),
        }
    }

    pub fn with_tag(mut self, tag: CommTag) -> Self {
        self.tag = tag;
        self
    }
}

impl Default for GraphPartitioner<RcmBands> {
    fn default() -> Self {
        Self::new(RcmBands)
    }
}

impl<C, P> CellPartitioner<C> for GraphPartitioner<P>
where
    C: Communicator,
    P: GraphPartition,
{
    fn partition(
        &self,
        comm: &C,
        n_parts: usize,
        tdim: usize,
        cells: &AdjacencyList<i64>,
        ghost_mode: GhostMode,
    ) -> Result<AdjacencyList<i32>, MeshError> {
        if ghost_mode == GhostMode::SharedVertex {
            return Err(MeshError::UnsupportedGhostMode(ghost_mode));
        }
        let tag = self.tag;

        // Ranks without cells learn the vertex count from the others.
        let local_nv = if cells.num_nodes() > 0 { cells.num_links(0) } else { 0 };
        let nv = gather_counts(comm, tag, local_nv)?
            .into_iter()
            .max()
            .unwrap_or(0);
        let cell_type = CellType::from_num_vertices(tdim, nv).ok_or_else(|| {
            MeshError::Partition(format!("no {tdim}D cell type with {nv} vertices"))
        })?;

        let counts = gather_counts(comm, tag.next(1), cells.num_nodes())?;
        let offset: usize = counts[..comm.rank()].iter().sum();
        let dual = build_dual_graph(comm, tag.next(2), cells, cell_type)?;

        // Gather the global graph: row lengths, then neighbours.
        let lengths: Vec<i64> = dual.iter().map(|r| r.len() as i64).collect();
        let all_lengths = all_gather(comm, tag.next(7), &lengths)?;
        let all_links = all_gather(comm, tag.next(8), dual.array())?;
        let mut offsets = vec![0usize];
        for &len in all_lengths.iter().flatten() {
            offsets.push(offsets[offsets.len() - 1] + len as usize);
        }
        let global = AdjacencyList::new(all_links.concat(), offsets)?;

        let parts = self.strategy.partition_graph(&global, n_parts)?;
        if parts.len() != global.num_nodes() {
            return Err(MeshError::Partition(format!(
                "strategy returned {} parts for {} cells",
                parts.len(),
                global.num_nodes()
            )));
        }

        let mut rows = Vec::with_capacity(cells.num_nodes());
        for (i, nbrs) in dual.iter().enumerate() {
            let owner = parts[offset + i];
            let mut row = vec![owner];
            if ghost_mode == GhostMode::SharedFacet {
                let mut ghosts: Vec<i32> = nbrs
                    .iter()
                    .map(|&g| parts[g as usize])
                    .filter(|&p| p != owner)
                    .collect();
                ghosts.sort_unstable();
                ghosts.dedup();
                row.extend(ghosts);
            }
            rows.push(row);
        }
        log::debug!(
            "[rank {}] partitioned {} local cells of {} into {n_parts} parts",
            comm.rank(),
            cells.num_nodes(),
            global.num_nodes()
        );
        Ok(AdjacencyList::from_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn bands_are_balanced() {
        let g = AdjacencyList::from_rows((0..8i64).map(|i| {
            [i - 1, i + 1].into_iter().filter(|&j| (0..8).contains(&j)).collect::<Vec<_>>()
        }));
        let parts = RcmBands.partition_graph(&g, 2).unwrap();
        assert_eq!(parts.iter().filter(|&&p| p == 0).count(), 4);
        assert_eq!(parts.iter().filter(|&&p| p == 1).count(), 4);
    }

    #[test]
    fn serial_partition_owns_everything() {
        let cells = AdjacencyList::uniform(vec![0i64, 1, 2, 1, 3, 2], 3).unwrap();
        let dest = GraphPartitioner::new(RcmBands)
            .partition(&NoComm, 1, 2, &cells, GhostMode::SharedFacet)
            .unwrap();
        assert_eq!(dest.array(), &[0, 0]);
    }

    #[test]
    fn shared_vertex_is_unsupported() {
        let cells = AdjacencyList::uniform(vec![0i64, 1, 2], 3).unwrap();
        assert!(matches!(
            GraphPartitioner::new(RcmBands).partition(&NoComm, 1, 2, &cells, GhostMode::SharedVertex),
            Err(MeshError::UnsupportedGhostMode(GhostMode::SharedVertex))
        ));
    }
}
