//! Apply a cell permutation to the owned prefix of a ragged list.

use crate::data::AdjacencyList;
use crate::mesh_error::MeshError;

/// Reorder the first `perm.len()` rows of `list` so that row `i` moves to
/// `perm[i]`. Rows past the owned prefix (ghosts) keep their position,
/// length and content.
pub fn reorder_list<T: Copy + Default>(
    list: &AdjacencyList<T>,
    perm: &[i32],
) -> Result<AdjacencyList<T>, MeshError> {
    let num_owned = perm.len();
    let n = list.num_nodes();
    if num_owned > n {
        return Err(MeshError::InvalidPermutation(format!(
            "{num_owned} owned rows requested, list has {n}"
        )));
    }
    crate::algs::rcm::validate_permutation(perm, num_owned)?;

    // New offsets: permuted owned lengths, then ghost lengths unchanged.
    let mut lengths = vec![0usize; n];
    for (old, &new) in perm.iter().enumerate() {
        lengths[new as usize] = list.num_links(old);
    }
    for (row, len) in lengths.iter_mut().enumerate().skip(num_owned) {
        *len = list.num_links(row);
    }
    let mut offsets = Vec::with_capacity(n + 1);
    offsets.push(0usize);
    for len in &lengths {
        offsets.push(offsets[offsets.len() - 1] + len);
    }

    let mut array = vec![T::default(); list.array().len()];
    for (old, &new) in perm.iter().enumerate() {
        let new = new as usize;
        array[offsets[new]..offsets[new + 1]].copy_from_slice(list.links(old));
    }
    let ghost_start = list.offsets()[num_owned];
    array[offsets[num_owned]..].copy_from_slice(&list.array()[ghost_start..]);

    AdjacencyList::new(array, offsets)
}
