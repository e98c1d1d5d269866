//! Redistribute cells to the ranks the partitioner chose.
//!
//! Every cell travels as one `i64` record `[global index, owner, n, nodes...]`
//! to each of its destinations in a single `all_to_all`.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::{all_to_all, exclusive_scan};
use crate::data::AdjacencyList;
use crate::mesh_error::MeshError;

/// Cells received by this rank: owned cells first (grouped by source rank,
/// ascending), then ghosts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributedCells {
    /// Full node list of every received cell.
    pub cells: AdjacencyList<i64>,
    /// Rank that supplied each cell.
    pub src_ranks: Vec<i32>,
    /// Input global index of each cell.
    pub original_index: Vec<i64>,
    /// Owner of each ghost cell, aligned with the ghost rows.
    pub ghost_owners: Vec<i32>,
}

impl DistributedCells {
    pub fn num_owned(&self) -> usize {
        self.cells.num_nodes() - self.ghost_owners.len()
    }

    pub fn num_ghosts(&self) -> usize {
        self.ghost_owners.len()
    }
}

/// Check a partitioner result against the local cells and the group size.
pub fn validate_destinations(
    destinations: &AdjacencyList<i32>,
    num_cells: usize,
    size: usize,
) -> Result<(), MeshError> {
    if destinations.num_nodes() != num_cells {
        return Err(MeshError::Partition(format!(
            "{} destination rows for {num_cells} cells",
            destinations.num_nodes()
        )));
    }
    for (cell, dest) in destinations.iter().enumerate() {
        if dest.is_empty() {
            return Err(MeshError::Partition(format!("cell {cell} has no destination")));
        }
        if let Some(&rank) = dest.iter().find(|&&r| r < 0 || r as usize >= size) {
            return Err(MeshError::InvalidDestination {
                cell,
                rank: rank as i64,
                size,
            });
        }
    }
    Ok(())
}

/// Send every local cell to all of its destinations; the first destination
/// is the owner. Local cell `i` has global index `offset + i`, the offset
/// coming from an exclusive scan. Uses tags `tag` and `tag.next(1)`.
pub fn distribute<C: Communicator>(
    comm: &C,
    tag: CommTag,
    cells: &AdjacencyList<i64>,
    destinations: &AdjacencyList<i32>,
) -> Result<DistributedCells, MeshError> {
    let me = comm.rank();
    let size = comm.size();
    validate_destinations(destinations, cells.num_nodes(), size)?;
    let (offset, _) = exclusive_scan(comm, tag, cells.num_nodes())?;

    let mut send = vec![Vec::<i64>::new(); size];
    let mut targets = Vec::new();
    for (i, (nodes, dest)) in cells.iter().zip(destinations.iter()).enumerate() {
        let owner = dest[0];
        targets.clear();
        for &r in dest {
            if !targets.contains(&r) {
                targets.push(r);
            }
        }
        for &r in &targets {
            let buf = &mut send[r as usize];
            buf.push((offset + i) as i64);
            buf.push(owner as i64);
            buf.push(nodes.len() as i64);
            buf.extend_from_slice(nodes);
        }
    }
    let recv = all_to_all(comm, tag.next(1), &send)?;

    let mut owned_rows: Vec<&[i64]> = Vec::new();
    let mut owned_src = Vec::new();
    let mut owned_index = Vec::new();
    let mut ghost_rows: Vec<&[i64]> = Vec::new();
    let mut ghost_src = Vec::new();
    let mut ghost_index = Vec::new();
    let mut ghost_owners = Vec::new();
    for (src, data) in recv.iter().enumerate() {
        let mut pos = 0usize;
        while pos < data.len() {
            if pos + 3 > data.len() {
                return Err(MeshError::comm(src, "truncated cell record header"));
            }
            let (gidx, owner, n) = (data[pos], data[pos + 1], data[pos + 2] as usize);
            let end = pos + 3 + n;
            let nodes = data
                .get(pos + 3..end)
                .ok_or_else(|| MeshError::comm(src, "truncated cell record"))?;
            if owner as usize == me {
                owned_rows.push(nodes);
                owned_src.push(src as i32);
                owned_index.push(gidx);
            } else {
                ghost_rows.push(nodes);
                ghost_src.push(src as i32);
                ghost_index.push(gidx);
                ghost_owners.push(owner as i32);
            }
            pos = end;
        }
    }
    log::debug!(
        "[rank {me}] distribute: received {} owned and {} ghost cells",
        owned_rows.len(),
        ghost_rows.len()
    );

    let cells = AdjacencyList::from_rows(
        owned_rows
            .into_iter()
            .chain(ghost_rows)
            .map(|row| row.iter().copied()),
    );
    owned_src.extend(ghost_src);
    owned_index.extend(ghost_index);
    Ok(DistributedCells {
        cells,
        src_ranks: owned_src,
        original_index: owned_index,
        ghost_owners,
    })
}
