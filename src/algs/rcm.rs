//! Reverse Cuthill-McKee (RCM) reordering of a cell graph.
//!
//! Per connected component: pick a low-degree start, refine it towards a
//! pseudo-peripheral vertex with a few BFS passes, then number the component
//! level by level, ordering each new level by (parent label, degree, index).
//! The concatenated order is reversed at the end.

use crate::data::AdjacencyList;
use crate::mesh_error::MeshError;
use num_traits::ToPrimitive;

/// Relabelling of the owned cells: `perm[old] = new`, a bijection on
/// `[0, graph.num_nodes())`.
pub trait CellReordering {
    fn reorder(&self, graph: &AdjacencyList<i32>) -> Result<Vec<i32>, MeshError>;
}

impl<F> CellReordering for F
where
    F: Fn(&AdjacencyList<i32>) -> Result<Vec<i32>, MeshError>,
{
    fn reorder(&self, graph: &AdjacencyList<i32>) -> Result<Vec<i32>, MeshError> {
        self(graph)
    }
}

/// RCM with at most `num_passes` pseudo-peripheral refinement passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReverseCuthillMcKee {
    pub num_passes: usize,
}

impl Default for ReverseCuthillMcKee {
    fn default() -> Self {
        Self { num_passes: 2 }
    }
}

impl CellReordering for ReverseCuthillMcKee {
    fn reorder(&self, graph: &AdjacencyList<i32>) -> Result<Vec<i32>, MeshError> {
        Ok(compute_reordering(graph, self.num_passes))
    }
}

/// Keeps the input order.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityReordering;

impl CellReordering for IdentityReordering {
    fn reorder(&self, graph: &AdjacencyList<i32>) -> Result<Vec<i32>, MeshError> {
        Ok((0..graph.num_nodes() as i32).collect())
    }
}

/// RCM permutation `perm[old] = new` of `graph`.
pub fn compute_reordering(graph: &AdjacencyList<i32>, num_passes: usize) -> Vec<i32> {
    let order = rcm_order(graph, num_passes);
    let mut perm = vec![0i32; order.len()];
    for (new, &old) in order.iter().enumerate() {
        perm[old] = new as i32;
    }
    perm
}

/// Check that `perm` is a bijection on `[0, n)`.
pub fn validate_permutation(perm: &[i32], n: usize) -> Result<(), MeshError> {
    if perm.len() != n {
        return Err(MeshError::InvalidPermutation(format!(
            "length {} for {n} cells",
            perm.len()
        )));
    }
    let mut seen = vec![false; n];
    for (old, &new) in perm.iter().enumerate() {
        match usize::try_from(new).ok().and_then(|k| seen.get_mut(k)) {
            Some(slot) if !*slot => *slot = true,
            _ => {
                return Err(MeshError::InvalidPermutation(format!(
                    "cell {old} maps to {new}, which is out of range or repeated"
                )));
            }
        }
    }
    Ok(())
}

fn neighbours<T: ToPrimitive>(graph: &AdjacencyList<T>, v: usize, n: usize) -> impl Iterator<Item = usize> + '_ {
    graph
        .links(v)
        .iter()
        .filter_map(ToPrimitive::to_usize)
        .filter(move |&u| u < n && u != v)
}

/// BFS level structure from `root` over vertices not yet `numbered`.
fn level_structure<T: ToPrimitive>(
    graph: &AdjacencyList<T>,
    root: usize,
    numbered: &[bool],
    seen: &mut [bool],
) -> Vec<Vec<usize>> {
    let n = graph.num_nodes();
    let mut levels = vec![vec![root]];
    let mut touched = vec![root];
    seen[root] = true;
    loop {
        let mut next = Vec::new();
        if let Some(last) = levels.last() {
            for &u in last {
                for w in neighbours(graph, u, n) {
                    if !seen[w] && !numbered[w] {
                        seen[w] = true;
                        next.push(w);
                    }
                }
            }
        }
        if next.is_empty() {
            break;
        }
        touched.extend_from_slice(&next);
        levels.push(next);
    }
    for v in touched {
        seen[v] = false;
    }
    levels
}

/// RCM visiting order (new position -> old index) of any graph whose
/// neighbour lists hold node indices.
pub(crate) fn rcm_order<T: ToPrimitive>(graph: &AdjacencyList<T>, num_passes: usize) -> Vec<usize> {
    let n = graph.num_nodes();
    let degree: Vec<usize> = (0..n).map(|v| neighbours(graph, v, n).count()).collect();
    let mut numbered = vec![false; n];
    let mut seen = vec![false; n];
    let mut order = Vec::with_capacity(n);

    // Components are started from their lowest-degree vertex.
    let mut starts: Vec<usize> = (0..n).collect();
    starts.sort_by_key(|&v| (degree[v], v));

    for start in starts {
        if numbered[start] {
            continue;
        }
        let mut root = start;
        let mut depth = 0usize;
        for _ in 0..num_passes {
            let levels = level_structure(graph, root, &numbered, &mut seen);
            if levels.len() <= depth {
                break;
            }
            depth = levels.len();
            let Some(candidate) = levels
                .last()
                .and_then(|l| l.iter().copied().min_by_key(|&v| (degree[v], v)))
            else {
                break;
            };
            if candidate == root {
                break;
            }
            root = candidate;
        }

        // Cuthill-McKee: parents are visited in label order, so appending
        // each parent's children sorted by (degree, index) orders the next
        // level by (parent label, degree, index).
        let first = order.len();
        numbered[root] = true;
        order.push(root);
        let mut head = first;
        while head < order.len() {
            let u = order[head];
            head += 1;
            let mut children: Vec<usize> = neighbours(graph, u, n).filter(|&w| !numbered[w]).collect();
            children.sort_unstable_by_key(|&w| (degree[w], w));
            children.dedup();
            for w in children {
                numbered[w] = true;
                order.push(w);
            }
        }
    }
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> AdjacencyList<i32> {
        AdjacencyList::from_rows((0..n as i32).map(|i| {
            let mut row = Vec::new();
            if i > 0 {
                row.push(i - 1);
            }
            if (i as usize) + 1 < n {
                row.push(i + 1);
            }
            row
        }))
    }

    #[test]
    fn line_graph_keeps_bandwidth_one() {
        let g = line(6);
        let perm = compute_reordering(&g, 2);
        validate_permutation(&perm, 6).unwrap();
        for i in 0..5 {
            assert_eq!((perm[i] - perm[i + 1]).abs(), 1);
        }
    }

    #[test]
    fn empty_graph() {
        let g = AdjacencyList::<i32>::default();
        assert!(compute_reordering(&g, 2).is_empty());
    }

    #[test]
    fn disconnected_components_are_all_numbered() {
        let g = AdjacencyList::from_rows(vec![vec![1], vec![0], vec![], vec![4], vec![3]]);
        let perm = compute_reordering(&g, 3);
        validate_permutation(&perm, 5).unwrap();
    }

    #[test]
    fn star_graph() {
        let mut rows = vec![vec![1, 2, 3, 4]];
        rows.extend((1..5).map(|_| vec![0]));
        let perm = compute_reordering(&AdjacencyList::from_rows(rows), 2);
        validate_permutation(&perm, 5).unwrap();
    }

    #[test]
    fn bad_permutations_are_rejected() {
        assert!(validate_permutation(&[0, 0], 2).is_err());
        assert!(validate_permutation(&[0, 2], 2).is_err());
        assert!(validate_permutation(&[0], 2).is_err());
        assert!(validate_permutation(&[1, 0], 2).is_ok());
    }

    #[test]
    fn closures_are_reorderings() {
        let reverse = |g: &AdjacencyList<i32>| -> Result<Vec<i32>, MeshError> {
            let n = g.num_nodes() as i32;
            Ok((0..n).rev().collect())
        };
        assert_eq!(reverse.reorder(&line(3)).unwrap(), vec![2, 1, 0]);
    }
}
