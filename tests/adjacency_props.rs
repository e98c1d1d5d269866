mod util;
use util::*;

use parmesh::algs::rcm::{compute_reordering, validate_permutation};
use parmesh::algs::reorder::reorder_list;
use parmesh::data::AdjacencyList;
use proptest::prelude::*;

fn ragged(max_rows: usize, max_target: i32) -> impl Strategy<Value = Vec<Vec<i32>>> {
    prop::collection::vec(prop::collection::vec(0..max_target, 0..5), 0..max_rows)
}

/// Random undirected simple graph on `n` nodes as symmetric rows.
fn symmetric_graph(max_nodes: usize) -> impl Strategy<Value = AdjacencyList<i32>> {
    (1..max_nodes).prop_flat_map(|n| {
        prop::collection::vec((0..n, 0..n), 0..3 * n).prop_map(move |edges| {
            let mut rows = vec![Vec::new(); n];
            for (a, b) in edges {
                if a != b {
                    rows[a].push(b as i32);
                    rows[b].push(a as i32);
                }
            }
            for row in &mut rows {
                row.sort_unstable();
                row.dedup();
            }
            AdjacencyList::from_rows(rows)
        })
    })
}

proptest! {
    #[test]
    fn double_transpose_sorts_rows(rows in ragged(12, 8)) {
        let list = AdjacencyList::from_rows(rows.clone());
        let back = list.transpose(8).transpose(rows.len());
        let sorted: Vec<Vec<i32>> = rows
            .into_iter()
            .map(|mut r| { r.sort_unstable(); r })
            .collect();
        prop_assert_eq!(back, AdjacencyList::from_rows(sorted));
    }

    #[test]
    fn rcm_is_a_permutation(graph in symmetric_graph(30)) {
        let perm = compute_reordering(&graph, 2);
        prop_assert!(validate_permutation(&perm, graph.num_nodes()).is_ok());
    }

    #[test]
    fn reorder_then_invert_restores(rows in ragged(10, 50), ghosts in ragged(3, 50), seed in any::<u64>()) {
        use rand::{SeedableRng, seq::SliceRandom};
        let num_owned = rows.len();
        let list = AdjacencyList::from_rows(rows.into_iter().chain(ghosts));
        let mut perm: Vec<i32> = (0..num_owned as i32).collect();
        perm.shuffle(&mut rand::rngs::StdRng::seed_from_u64(seed));
        let mut inverse = vec![0i32; num_owned];
        for (old, &new) in perm.iter().enumerate() {
            inverse[new as usize] = old as i32;
        }
        let moved = reorder_list(&list, &perm).unwrap();
        for (old, &new) in perm.iter().enumerate() {
            prop_assert_eq!(moved.links(new as usize), list.links(old));
        }
        prop_assert_eq!(reorder_list(&moved, &inverse).unwrap(), list);
    }
}

#[test]
fn rcm_path_bandwidth_is_one() {
    // Path 0-1-...-7 with labels scrambled.
    let labels = [5usize, 2, 7, 0, 3, 6, 1, 4];
    let mut rows = vec![Vec::new(); 8];
    for w in labels.windows(2) {
        rows[w[0]].push(w[1] as i32);
        rows[w[1]].push(w[0] as i32);
    }
    let graph = AdjacencyList::from_rows(rows);
    let perm = compute_reordering(&graph, 2);
    let mut order = vec![0usize; 8];
    for (old, &new) in perm.iter().enumerate() {
        order[new as usize] = old;
    }
    let edges: Vec<(usize, usize)> = labels.windows(2).map(|w| (w[0], w[1])).collect();
    assert_eq!(bandwidth(&order, &edges), 1);
}

#[test]
fn invalid_permutations_are_rejected() {
    assert!(validate_permutation(&[0, 0], 2).is_err());
    assert!(validate_permutation(&[0, 2], 2).is_err());
    assert!(validate_permutation(&[1, 0, 2], 2).is_err());
    assert!(validate_permutation(&[-1, 0], 2).is_err());
    assert!(validate_permutation(&[1, 0], 2).is_ok());
}
