//! Per-dimension ownership ledger.
//!
//! Local indices `[0, size_local)` are owned and map to the contiguous global
//! range `local_range()`. Local indices `[size_local, size_local + num_ghosts)`
//! are ghosts, each with its global index and owning rank.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::{agree, exclusive_scan};
use crate::mesh_error::MeshError;
use crate::topology::ownership::{request_from_owners, resolve_owners};
use hashbrown::HashMap;
use std::ops::Range;

#[derive(Clone, Debug)]
pub struct IndexMap {
    rank: usize,
    offset: i64,
    size_local: usize,
    size_global: i64,
    ghosts: Vec<i64>,
    owners: Vec<i32>,
    ghost_lookup: HashMap<i64, i32>,
}

impl PartialEq for IndexMap {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank
            && self.offset == other.offset
            && self.size_local == other.size_local
            && self.size_global == other.size_global
            && self.ghosts == other.ghosts
            && self.owners == other.owners
    }
}

/// Result of [`IndexMap::create_submap`].
#[derive(Clone, Debug)]
pub struct SubMap {
    pub index_map: IndexMap,
    /// Sub local index -> parent local index.
    pub parent_indices: Vec<i32>,
}

impl IndexMap {
    /// Collective constructor. The global offset of the owned range is the
    /// exclusive scan of `size_local` over ranks.
    pub fn new<C: Communicator>(
        comm: &C,
        tag: CommTag,
        size_local: usize,
        ghosts: Vec<i64>,
        owners: Vec<i32>,
    ) -> Result<Self, MeshError> {
        let (offset, total) = exclusive_scan(comm, tag, size_local)?;
        Self::from_parts(
            comm.rank(),
            offset as i64,
            size_local,
            total as i64,
            ghosts,
            owners,
        )
    }

    /// Build from already known parts, checking the ghost invariants.
    pub fn from_parts(
        rank: usize,
        offset: i64,
        size_local: usize,
        size_global: i64,
        ghosts: Vec<i64>,
        owners: Vec<i32>,
    ) -> Result<Self, MeshError> {
        if ghosts.len() != owners.len() {
            return Err(MeshError::InvalidIndexMap(format!(
                "{} ghosts but {} owners",
                ghosts.len(),
                owners.len()
            )));
        }
        if offset < 0 || offset + size_local as i64 > size_global {
            return Err(MeshError::InvalidIndexMap(format!(
                "owned range [{offset}, {}) exceeds global size {size_global}",
                offset + size_local as i64
            )));
        }
        let range = offset..offset + size_local as i64;
        let mut ghost_lookup = HashMap::with_capacity(ghosts.len());
        for (i, (&g, &o)) in ghosts.iter().zip(&owners).enumerate() {
            if o < 0 || o as usize == rank {
                return Err(MeshError::InvalidIndexMap(format!(
                    "ghost {g} has owner {o} on rank {rank}"
                )));
            }
            if range.contains(&g) || g < 0 || g >= size_global {
                return Err(MeshError::InvalidIndexMap(format!(
                    "ghost {g} lies in the owned range or outside [0, {size_global})"
                )));
            }
            if ghost_lookup.insert(g, (size_local + i) as i32).is_some() {
                return Err(MeshError::InvalidIndexMap(format!("duplicate ghost {g}")));
            }
        }
        Ok(Self {
            rank,
            offset,
            size_local,
            size_global,
            ghosts,
            owners,
            ghost_lookup,
        })
    }

    /// Serial map: everything owned, no ghosts.
    pub fn local(size: usize) -> Self {
        Self {
            rank: 0,
            offset: 0,
            size_local: size,
            size_global: size as i64,
            ghosts: Vec::new(),
            owners: Vec::new(),
            ghost_lookup: HashMap::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size_local(&self) -> usize {
        self.size_local
    }

    pub fn num_ghosts(&self) -> usize {
        self.ghosts.len()
    }

    /// `size_local + num_ghosts`.
    pub fn local_size_with_ghosts(&self) -> usize {
        self.size_local + self.ghosts.len()
    }

    pub fn size_global(&self) -> i64 {
        self.size_global
    }

    /// Global indices owned by this rank.
    pub fn local_range(&self) -> Range<i64> {
        self.offset..self.offset + self.size_local as i64
    }

    pub fn ghosts(&self) -> &[i64] {
        &self.ghosts
    }

    pub fn owners(&self) -> &[i32] {
        &self.owners
    }

    pub fn is_owned(&self, local: i32) -> bool {
        local >= 0 && (local as usize) < self.size_local
    }

    /// Owning rank of a local index.
    pub fn owner(&self, local: i32) -> Option<usize> {
        if self.is_owned(local) {
            Some(self.rank)
        } else {
            self.owners
                .get((local as usize).checked_sub(self.size_local)?)
                .map(|&o| o as usize)
        }
    }

    pub fn local_to_global(&self, local: i32) -> Result<i64, MeshError> {
        if local < 0 {
            return Err(MeshError::InvalidIndexMap(format!(
                "negative local index {local}"
            )));
        }
        let l = local as usize;
        if l < self.size_local {
            Ok(self.offset + l as i64)
        } else {
            self.ghosts
                .get(l - self.size_local)
                .copied()
                .ok_or_else(|| {
                    MeshError::InvalidIndexMap(format!(
                        "local index {local} out of range {}",
                        self.local_size_with_ghosts()
                    ))
                })
        }
    }

    pub fn local_to_global_list(&self, locals: &[i32]) -> Result<Vec<i64>, MeshError> {
        locals.iter().map(|&l| self.local_to_global(l)).collect()
    }

    /// Local index of a global index, if it is owned or ghosted here.
    pub fn global_to_local(&self, global: i64) -> Option<i32> {
        if self.local_range().contains(&global) {
            Some((global - self.offset) as i32)
        } else {
            self.ghost_lookup.get(&global).copied()
        }
    }

    fn selected_globals(&self, selected: &[i32]) -> Result<Vec<i64>, MeshError> {
        let total = self.local_size_with_ghosts() as i32;
        if let Some(&bad) = selected.iter().find(|&&l| l < 0 || l >= total) {
            return Err(MeshError::InvalidIndexMap(format!(
                "selected index {bad} outside [0, {total})"
            )));
        }
        self.local_to_global_list(selected)
    }

    /// Collective: derive the index map of the selected local `indices`.
    ///
    /// Selected owned indices keep this rank as owner. A selected ghost stays
    /// with its owner when the owner also selected it; otherwise ownership
    /// moves to the lowest rank that selected it. Owned sub indices are
    /// numbered contiguously (parent order, original owned first), ghosts
    /// follow in parent order. An invalid selection on any rank fails every
    /// rank. Uses tags `tag` to `tag.next(5)`.
    pub fn create_submap<C: Communicator>(
        &self,
        comm: &C,
        tag: CommTag,
        indices: &[i32],
    ) -> Result<SubMap, MeshError> {
        let me = comm.rank();
        let mut selected = indices.to_vec();
        selected.sort_unstable();
        selected.dedup();
        let parent_globals = agree(comm, tag.next(5), self.selected_globals(&selected))?;
        let preferred: Vec<bool> = selected.iter().map(|&l| self.is_owned(l)).collect();
        let new_owners = resolve_owners(comm, tag, &parent_globals, 1, &preferred)?;

        // Owned: original owned first, then transferred ghosts.
        let mut parent_indices: Vec<i32> = Vec::with_capacity(selected.len());
        let mut owned_globals: Vec<i64> = Vec::new();
        for pass_owned in [true, false] {
            for (k, &l) in selected.iter().enumerate() {
                if new_owners[k] == me && self.is_owned(l) == pass_owned {
                    parent_indices.push(l);
                    owned_globals.push(parent_globals[k]);
                }
            }
        }
        let size_local = parent_indices.len();
        let (offset, size_global) = exclusive_scan(comm, tag.next(2), size_local)?;

        let sub_of_parent: HashMap<i64, i64> = owned_globals
            .iter()
            .enumerate()
            .map(|(i, &g)| (g, (offset + i) as i64))
            .collect();

        let mut ghost_keys = Vec::new();
        let mut ghost_owners = Vec::new();
        for (k, &l) in selected.iter().enumerate() {
            if new_owners[k] != me {
                parent_indices.push(l);
                ghost_keys.push(parent_globals[k]);
                ghost_owners.push(new_owners[k]);
            }
        }
        let ghosts = request_from_owners(
            comm,
            tag.next(3),
            &ghost_keys,
            1,
            &ghost_owners,
            1,
            |key| sub_of_parent.get(&key[0]).map(|&g| vec![g]),
        )?;

        log::debug!(
            "[rank {me}] submap: {size_local} owned, {} ghosts of {size_global}",
            ghosts.len()
        );
        let index_map = IndexMap::from_parts(
            me,
            offset as i64,
            size_local,
            size_global as i64,
            ghosts,
            ghost_owners.into_iter().map(|o| o as i32).collect(),
        )?;
        Ok(SubMap {
            index_map,
            parent_indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn ghost_invariants_are_checked() {
        assert!(IndexMap::from_parts(0, 0, 2, 4, vec![3], vec![0]).is_err());
        assert!(IndexMap::from_parts(0, 0, 2, 4, vec![1], vec![1]).is_err());
        assert!(IndexMap::from_parts(0, 0, 2, 4, vec![3, 3], vec![1, 1]).is_err());
        assert!(IndexMap::from_parts(0, 0, 2, 4, vec![3], vec![1]).is_ok());
    }

    #[test]
    fn local_global_lookup() {
        let map = IndexMap::from_parts(1, 10, 3, 20, vec![2, 15], vec![0, 2]).unwrap();
        assert_eq!(map.local_range(), 10..13);
        assert_eq!(map.local_to_global(1).unwrap(), 11);
        assert_eq!(map.local_to_global(4).unwrap(), 15);
        assert_eq!(map.global_to_local(2), Some(3));
        assert_eq!(map.global_to_local(12), Some(2));
        assert_eq!(map.global_to_local(19), None);
        assert_eq!(map.owner(3), Some(0));
        assert_eq!(map.owner(0), Some(1));
        assert!(map.local_to_global(5).is_err());
    }

    #[test]
    fn serial_submap_is_compact() {
        let map = IndexMap::new(&NoComm, CommTag::new(0x10), 6, vec![], vec![]).unwrap();
        let sub = map.create_submap(&NoComm, CommTag::new(0x20), &[4, 1, 4, 2]).unwrap();
        assert_eq!(sub.parent_indices, vec![1, 2, 4]);
        assert_eq!(sub.index_map.size_local(), 3);
        assert_eq!(sub.index_map.num_ghosts(), 0);
        assert_eq!(sub.index_map.size_global(), 3);
    }
}
