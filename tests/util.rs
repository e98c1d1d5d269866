#![allow(dead_code)]
use parmesh::algs::communicator::RayonComm;
use parmesh::data::AdjacencyList;

/// Run `f` once per rank of a fresh `size`-rank thread world and collect
/// the results in rank order.
pub fn run_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(RayonComm) -> R + Sync,
{
    let world = RayonComm::world(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = world
            .into_iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(comm))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Unit square cut into a 2x1 grid of quads, each split into two triangles:
///
/// ```text
/// 3---4---5
/// | \ | / |
/// 0---1---2
/// ```
pub const SQUARE_X: [f64; 12] = [
    0.0, 0.0, 1.0, 0.0, 2.0, 0.0, //
    0.0, 1.0, 1.0, 1.0, 2.0, 1.0,
];

pub const SQUARE_CELLS: [[i64; 3]; 4] = [[0, 1, 4], [0, 4, 3], [1, 2, 5], [1, 5, 4]];

pub fn cells_of(rows: &[[i64; 3]]) -> AdjacencyList<i64> {
    AdjacencyList::from_rows(rows.iter().map(|r| r.iter().copied()))
}

/// Structured `n x n` triangle mesh of the unit square: vertex `j*(n+1)+i`
/// sits at `(i/n, j/n)`.
pub fn triangle_grid(n: usize) -> (Vec<[i64; 3]>, Vec<f64>) {
    let nv = n + 1;
    let mut x = Vec::with_capacity(nv * nv * 2);
    for j in 0..nv {
        for i in 0..nv {
            x.push(i as f64 / n as f64);
            x.push(j as f64 / n as f64);
        }
    }
    let mut cells = Vec::with_capacity(2 * n * n);
    for j in 0..n {
        for i in 0..n {
            let v0 = (j * nv + i) as i64;
            let v1 = v0 + 1;
            let v2 = v0 + nv as i64;
            let v3 = v2 + 1;
            cells.push([v0, v1, v3]);
            cells.push([v0, v3, v2]);
        }
    }
    (cells, x)
}

/// Contiguous block of `0..n` given to `rank` out of `size`.
pub fn block(n: usize, rank: usize, size: usize) -> std::ops::Range<usize> {
    (rank * n / size)..((rank + 1) * n / size)
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}

/// Bandwidth of an ordering over an undirected graph given by its edges;
/// `order[k]` is the node placed at position `k`.
pub fn bandwidth(order: &[usize], edges: &[(usize, usize)]) -> usize {
    let mut pos = vec![0usize; order.len()];
    for (i, &v) in order.iter().enumerate() {
        pos[v] = i;
    }
    edges
        .iter()
        .map(|&(u, v)| pos[u].abs_diff(pos[v]))
        .max()
        .unwrap_or(0)
}
