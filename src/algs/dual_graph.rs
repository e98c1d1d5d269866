//! Facet-sharing dual graph of a set of cells.
//
// Each cell is a graph node; an undirected edge joins two cells that share a
// full facet (a (tdim-1)-entity of the cell type). Facets are bucketed by
// their sorted vertex tuple:
//
// * bucket of 1  -> boundary facet, or a facet matched on another rank
// * bucket of 2  -> one edge
// * bucket of >2 -> non-manifold input, rejected
//
// Across ranks every facet key reaches its postmaster, locally matched ones
// counting twice, so a third cell on another rank is still caught.
//
// The graph is symmetric and self-free; neighbour lists are sorted.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::{agree, all_gather, all_to_all, exclusive_scan};
use crate::data::AdjacencyList;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;
use crate::topology::ownership::postmaster_rank;
use hashbrown::HashMap;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Dual graph over local cells plus the facets that found no partner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalDualGraph {
    pub graph: AdjacencyList<i32>,
    /// `(sorted facet vertices, local cell)` for facets seen by one cell only.
    pub unmatched: Vec<(Vec<i64>, i32)>,
    /// Sorted facet keys shared by two local cells.
    pub shared: Vec<Vec<i64>>,
    /// Vertices per facet, the width of every facet key.
    pub vertices_per_facet: usize,
}

type FacetKey = (Vec<i64>, i32);

fn cell_facet_keys(
    cell: usize,
    vertices: &[i64],
    facets: &[&[usize]],
) -> Result<Vec<FacetKey>, MeshError> {
    facets
        .iter()
        .map(|f| {
            let mut key: Vec<i64> = f.iter().map(|&v| vertices[v]).collect();
            key.sort_unstable();
            if key.windows(2).any(|w| w[0] == w[1]) {
                return Err(MeshError::DegenerateCell {
                    cell,
                    vertices: vertices.to_vec(),
                });
            }
            Ok((key, cell as i32))
        })
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn facet_keys(rows: &[&[i64]], facets: &[&[usize]]) -> Result<Vec<FacetKey>, MeshError> {
    let mut keys = Vec::with_capacity(rows.len() * facets.len());
    for (cell, vertices) in rows.iter().enumerate() {
        keys.extend(cell_facet_keys(cell, vertices, facets)?);
    }
    Ok(keys)
}

#[cfg(feature = "rayon")]
fn facet_keys(rows: &[&[i64]], facets: &[&[usize]]) -> Result<Vec<FacetKey>, MeshError> {
    let per_cell: Vec<Vec<FacetKey>> = rows
        .par_iter()
        .enumerate()
        .map(|(cell, vertices)| cell_facet_keys(cell, vertices, facets))
        .collect::<Result<_, _>>()?;
    Ok(per_cell.into_iter().flatten().collect())
}

/// Dual graph of the cells described by `cell_vertices`/`offsets`
/// (normally the owned prefix of the local cells).
pub fn build_local_dual_graph(
    cell_vertices: &[i64],
    offsets: &[usize],
    cell_type: CellType,
) -> Result<LocalDualGraph, MeshError> {
    let tdim = cell_type.dim();
    if tdim == 0 {
        return Err(MeshError::UnsupportedCellType {
            cell_type,
            context: "dual graph construction",
        });
    }
    if offsets.first() != Some(&0) || offsets.last() != Some(&cell_vertices.len()) {
        return Err(MeshError::InvalidAdjacencyList(format!(
            "offsets do not span {} cell vertices",
            cell_vertices.len()
        )));
    }
    let nv = cell_type.num_vertices();
    let mut rows = Vec::with_capacity(offsets.len() - 1);
    for (cell, w) in offsets.windows(2).enumerate() {
        if w[1] < w[0] || w[1] - w[0] != nv {
            return Err(MeshError::CellNodeCountMismatch {
                cell,
                expected: nv,
                found: w[1].saturating_sub(w[0]),
            });
        }
        rows.push(&cell_vertices[w[0]..w[1]]);
    }

    let facets = cell_type.entity_vertices(tdim - 1);
    let vertices_per_facet = cell_type.facet_type()?.num_vertices();
    let keys = facet_keys(&rows, facets)?;

    let mut buckets: HashMap<&[i64], Vec<i32>> = HashMap::with_capacity(keys.len());
    for (key, cell) in &keys {
        buckets.entry(key.as_slice()).or_default().push(*cell);
    }

    let mut neighbours: Vec<Vec<i32>> = vec![Vec::new(); rows.len()];
    let mut unmatched = Vec::new();
    let mut shared = Vec::new();
    for (key, cells) in &buckets {
        match cells.as_slice() {
            [c] => unmatched.push((key.to_vec(), *c)),
            [a, b] => {
                if a != b {
                    neighbours[*a as usize].push(*b);
                    neighbours[*b as usize].push(*a);
                }
                shared.push(key.to_vec());
            }
            _ => {
                return Err(MeshError::NonManifoldFacet {
                    vertices: key.to_vec(),
                    count: cells.len(),
                });
            }
        }
    }
    for row in &mut neighbours {
        row.sort_unstable();
        row.dedup();
    }
    unmatched.sort_unstable_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));
    shared.sort_unstable();

    Ok(LocalDualGraph {
        graph: AdjacencyList::from_rows(neighbours),
        unmatched,
        shared,
        vertices_per_facet,
    })
}

/// Record value standing for a facet already matched by two local cells.
const LOCAL_PAIR: i64 = -1;

/// Collective dual graph over all ranks' cells, in global cell numbering
/// (local cell `i` is `offset + i`, offset from an exclusive scan).
///
/// Every facet key is sent to the postmaster of its lowest vertex: unmatched
/// ones with their global cell, locally matched ones as a pair. The postmaster
/// counts cells per facet across ranks and pairs the unmatched ones. A
/// non-manifold facet is reported as [`MeshError::NonManifoldFacet`] on every
/// rank; a local failure on any rank fails all of them. Uses tags `tag` to
/// `tag.next(4)`.
pub fn build_dual_graph<C: Communicator>(
    comm: &C,
    tag: CommTag,
    cells: &AdjacencyList<i64>,
    cell_type: CellType,
) -> Result<AdjacencyList<i64>, MeshError> {
    let me = comm.rank();
    let size = comm.size();
    let local = agree(
        comm,
        tag.next(3),
        build_local_dual_graph(cells.array(), cells.offsets(), cell_type),
    )?;
    let (offset, _total) = exclusive_scan(comm, tag, cells.num_nodes())?;
    let offset = offset as i64;
    let width = local.vertices_per_facet;

    let mut send = vec![Vec::<i64>::new(); size];
    for (key, cell) in &local.unmatched {
        let dest = postmaster_rank(key, size);
        send[dest].extend_from_slice(key);
        send[dest].push(offset + *cell as i64);
    }
    for key in &local.shared {
        let dest = postmaster_rank(key, size);
        send[dest].extend_from_slice(key);
        send[dest].push(LOCAL_PAIR);
    }
    let recv = all_to_all(comm, tag.next(1), &send)?;

    // Postmaster: count cells per facet, pair unmatched facets across ranks.
    let record = width + 1;
    let mut buckets: HashMap<&[i64], Vec<(usize, i64)>> = HashMap::new();
    for (src, data) in recv.iter().enumerate() {
        for rec in data.chunks_exact(record) {
            buckets
                .entry(&rec[..width])
                .or_default()
                .push((src, rec[width]));
        }
    }
    let mut replies = vec![Vec::<i64>::new(); size];
    let mut worst: Option<(&[i64], usize)> = None;
    for (key, claims) in &buckets {
        let count: usize = claims
            .iter()
            .map(|&(_, c)| if c == LOCAL_PAIR { 2 } else { 1 })
            .sum();
        match (count, claims.as_slice()) {
            (1, _) | (2, [_]) => {}
            (2, [(ra, ca), (rb, cb)]) => {
                replies[*ra].extend([*ca, *cb]);
                replies[*rb].extend([*cb, *ca]);
            }
            _ => {
                if worst.is_none_or(|(k, _)| *key < k) {
                    worst = Some((*key, count));
                }
            }
        }
    }
    let answers = all_to_all(comm, tag.next(2), &replies)?;

    // Every rank learns the lowest rank's non-manifold facet, if any.
    let report: Vec<i64> = worst
        .map(|(key, count)| std::iter::once(count as i64).chain(key.iter().copied()).collect())
        .unwrap_or_default();
    let reports = all_gather(comm, tag.next(4), &report)?;
    if let Some(rec) = reports.iter().find(|r| !r.is_empty()) {
        return Err(MeshError::NonManifoldFacet {
            vertices: rec[1..].to_vec(),
            count: rec[0] as usize,
        });
    }

    let mut rows: Vec<Vec<i64>> = local
        .graph
        .iter()
        .map(|nbrs| nbrs.iter().map(|&j| offset + j as i64).collect())
        .collect();
    let mut remote_edges = 0usize;
    for pair in answers.iter().flat_map(|a| a.chunks_exact(2)) {
        let local_cell = (pair[0] - offset) as usize;
        if local_cell >= rows.len() {
            return Err(MeshError::comm(
                me,
                format!("dual graph reply for foreign cell {}", pair[0]),
            ));
        }
        rows[local_cell].push(pair[1]);
        remote_edges += 1;
    }
    for row in &mut rows {
        row.sort_unstable();
        row.dedup();
    }
    log::debug!(
        "[rank {me}] dual graph: {} cells, {} cross-rank edges",
        rows.len(),
        remote_edges
    );
    Ok(AdjacencyList::from_rows(rows))
}
