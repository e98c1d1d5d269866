mod util;
use util::*;

use parmesh::algs::distribute::distribute;
use parmesh::algs::dual_graph::build_dual_graph;
use parmesh::prelude::*;
use serial_test::serial;

#[test]
#[serial]
fn dual_graph_across_two_ranks() {
    let rows = run_ranks(2, |comm| {
        let r = comm.rank();
        let cells = cells_of(&SQUARE_CELLS[2 * r..2 * r + 2]);
        let g = build_dual_graph(&comm, CommTag::new(0x40), &cells, CellType::Triangle).unwrap();
        g.iter().map(|row| row.to_vec()).collect::<Vec<_>>()
    });
    let all: Vec<Vec<i64>> = rows.into_iter().flatten().collect();
    assert_eq!(all, vec![vec![1, 3], vec![0], vec![3], vec![0, 2]]);
}

#[test]
#[serial]
fn dual_graph_matches_serial() {
    let (cells, _) = triangle_grid(3);
    let serial = build_dual_graph(&NoComm, CommTag::new(0x40), &cells_of(&cells), CellType::Triangle)
        .unwrap();
    let parallel: Vec<Vec<i64>> = run_ranks(3, |comm| {
        let mine = cells_of(&cells[block(cells.len(), comm.rank(), 3)]);
        let g = build_dual_graph(&comm, CommTag::new(0x40), &mine, CellType::Triangle).unwrap();
        g.iter().map(|row| row.to_vec()).collect::<Vec<_>>()
    })
    .into_iter()
    .flatten()
    .collect();
    let serial: Vec<Vec<i64>> = serial.iter().map(|row| row.to_vec()).collect();
    assert_eq!(parallel, serial);
    for (i, row) in serial.iter().enumerate() {
        for &j in row {
            assert_ne!(j, i as i64);
            assert!(serial[j as usize].contains(&(i as i64)), "edge {i}-{j} is one-sided");
        }
    }
}

/// Every rank reports the same facet (0, 1) with three cells.
fn assert_non_manifold_everywhere(results: &[Result<AdjacencyList<i64>, MeshError>]) {
    for (rank, res) in results.iter().enumerate() {
        match res {
            Err(MeshError::NonManifoldFacet { vertices, count }) => {
                assert_eq!(vertices, &vec![0, 1], "rank {rank}");
                assert_eq!(*count, 3, "rank {rank}");
            }
            other => panic!("rank {rank}: expected NonManifoldFacet, got {other:?}"),
        }
    }
}

#[test]
#[serial]
fn non_manifold_facet_split_two_and_one() {
    let results = run_ranks(2, |comm| {
        let cells = if comm.rank() == 0 {
            cells_of(&[[0, 1, 2], [0, 1, 3]])
        } else {
            cells_of(&[[0, 1, 4]])
        };
        build_dual_graph(&comm, CommTag::new(0x40), &cells, CellType::Triangle)
    });
    assert_non_manifold_everywhere(&results);
}

#[test]
#[serial]
fn non_manifold_facet_one_cell_per_rank() {
    let tris = [[0, 1, 2], [0, 1, 3], [0, 1, 4]];
    let results = run_ranks(3, |comm| {
        let cells = cells_of(&tris[comm.rank()..comm.rank() + 1]);
        build_dual_graph(&comm, CommTag::new(0x40), &cells, CellType::Triangle)
    });
    assert_non_manifold_everywhere(&results);
}

#[test]
#[serial]
fn local_failure_reaches_every_rank() {
    let results = run_ranks(2, |comm| {
        let cells = if comm.rank() == 0 {
            cells_of(&[[0, 1, 2]])
        } else {
            cells_of(&[[3, 3, 4]])
        };
        build_dual_graph(&comm, CommTag::new(0x40), &cells, CellType::Triangle)
    });
    assert!(matches!(results[1], Err(MeshError::DegenerateCell { cell: 0, .. })));
    assert!(matches!(results[0], Err(MeshError::CommError { neighbor: 1, .. })));
}

#[test]
#[serial]
fn distribute_owned_then_ghosts() {
    let out = run_ranks(2, |comm| {
        let r = comm.rank();
        let cells = cells_of(&SQUARE_CELLS[2 * r..2 * r + 2]);
        let dest = if r == 0 {
            AdjacencyList::from_rows([vec![1], vec![0, 1]])
        } else {
            AdjacencyList::from_rows([vec![0], vec![1]])
        };
        distribute(&comm, CommTag::new(0x50), &cells, &dest).unwrap()
    });

    assert_eq!(out[0].original_index, vec![1, 2]);
    assert_eq!(out[0].src_ranks, vec![0, 1]);
    assert_eq!(out[0].num_ghosts(), 0);
    assert_eq!(out[0].cells, cells_of(&[SQUARE_CELLS[1], SQUARE_CELLS[2]]));

    assert_eq!(out[1].original_index, vec![0, 3, 1]);
    assert_eq!(out[1].src_ranks, vec![0, 1, 0]);
    assert_eq!(out[1].ghost_owners, vec![0]);
    assert_eq!(out[1].num_owned(), 2);
    assert_eq!(
        out[1].cells,
        cells_of(&[SQUARE_CELLS[0], SQUARE_CELLS[3], SQUARE_CELLS[1]])
    );
}

#[test]
#[serial]
fn every_cell_owned_exactly_once() {
    let (cells, _) = triangle_grid(3);
    let n = cells.len();
    let out = run_ranks(3, |comm| {
        let range = block(n, comm.rank(), 3);
        let mine = cells_of(&cells[range.clone()]);
        // Round-robin owners, ghost copy on the next rank.
        let dest = AdjacencyList::from_rows(
            range.map(|g| vec![(g % 3) as i32, ((g + 1) % 3) as i32]),
        );
        distribute(&comm, CommTag::new(0x50), &mine, &dest).unwrap()
    });
    let mut owned: Vec<i64> = Vec::new();
    let mut ghosts: Vec<i64> = Vec::new();
    for (rank, d) in out.iter().enumerate() {
        let k = d.num_owned();
        owned.extend_from_slice(&d.original_index[..k]);
        ghosts.extend_from_slice(&d.original_index[k..]);
        for (row, &g) in d.original_index.iter().enumerate() {
            assert_eq!(d.cells.links(row), &cells[g as usize]);
            if row < k {
                assert_eq!(g as usize % 3, rank);
            }
        }
    }
    let all: Vec<i64> = (0..n as i64).collect();
    assert_permutation(&owned, &all);
    assert_permutation(&ghosts, &all);
}
