//! Ragged (CSR) arrays.
//!
//! [`AdjacencyList`] is the storage used for every cell/entity connectivity in
//! the crate: a flat `array` plus `offsets` such that row `i` is
//! `array[offsets[i]..offsets[i + 1]]`.
//!
//! Invariant: `offsets[0] == 0`, `offsets` is non-decreasing,
//! `offsets.len() == num_nodes + 1` and `offsets[num_nodes] == array.len()`.

use crate::mesh_error::MeshError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Immutable ragged array of `T`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdjacencyList<T> {
    array: Vec<T>,
    offsets: Vec<usize>,
}

impl<T> Default for AdjacencyList<T> {
    fn default() -> Self {
        Self {
            array: Vec::new(),
            offsets: vec![0],
        }
    }
}

impl<T> AdjacencyList<T> {
    /// Build from a flat array and offsets, checking the CSR invariant.
    pub fn new(array: Vec<T>, offsets: Vec<usize>) -> Result<Self, MeshError> {
        match offsets.first() {
            None => {
                return Err(MeshError::InvalidAdjacencyList(
                    "offsets must contain at least one entry".into(),
                ));
            }
            Some(&first) if first != 0 => {
                return Err(MeshError::InvalidAdjacencyList(format!(
                    "offsets[0] must be 0, got {first}"
                )));
            }
            _ => {}
        }
        if let Some((i, (a, b))) = offsets
            .iter()
            .tuple_windows()
            .enumerate()
            .find(|(_, (a, b))| b < a)
        {
            return Err(MeshError::InvalidAdjacencyList(format!(
                "offsets decrease at node {i}: {a} > {b}"
            )));
        }
        let last = offsets[offsets.len() - 1];
        if last != array.len() {
            return Err(MeshError::InvalidAdjacencyList(format!(
                "last offset {last} does not match array length {}",
                array.len()
            )));
        }
        Ok(Self { array, offsets })
    }

    /// Build a list where every row has exactly `degree` entries.
    pub fn uniform(array: Vec<T>, degree: usize) -> Result<Self, MeshError> {
        if degree == 0 {
            return if array.is_empty() {
                Ok(Self::default())
            } else {
                Err(MeshError::InvalidAdjacencyList(
                    "degree 0 with a non-empty array".into(),
                ))
            };
        }
        if array.len() % degree != 0 {
            return Err(MeshError::InvalidAdjacencyList(format!(
                "array length {} is not a multiple of degree {degree}",
                array.len()
            )));
        }
        let n = array.len() / degree;
        let offsets = (0..=n).map(|i| i * degree).collect();
        Ok(Self { array, offsets })
    }

    /// Build from an iterator of rows.
    pub fn from_rows<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = T>,
    {
        let mut array = Vec::new();
        let mut offsets = vec![0];
        for row in rows {
            array.extend(row);
            offsets.push(array.len());
        }
        Self { array, offsets }
    }

    /// Number of rows.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of entries in row `node`.
    #[inline]
    pub fn num_links(&self, node: usize) -> usize {
        self.offsets[node + 1] - self.offsets[node]
    }

    /// Row `node`.
    #[inline]
    pub fn links(&self, node: usize) -> &[T] {
        &self.array[self.offsets[node]..self.offsets[node + 1]]
    }

    /// Mutable row `node`. Row lengths cannot change.
    #[inline]
    pub fn links_mut(&mut self, node: usize) -> &mut [T] {
        &mut self.array[self.offsets[node]..self.offsets[node + 1]]
    }

    pub fn array(&self) -> &[T] {
        &self.array
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Iterate over rows in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[T]> + '_ {
        (0..self.num_nodes()).map(move |i| self.links(i))
    }

    /// Apply `f` to every entry, keeping the row structure.
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> AdjacencyList<U> {
        AdjacencyList {
            array: self.array.iter().map(f).collect(),
            offsets: self.offsets.clone(),
        }
    }

    /// Fallible variant of [`AdjacencyList::map`].
    pub fn try_map<U, E>(&self, f: impl FnMut(&T) -> Result<U, E>) -> Result<AdjacencyList<U>, E> {
        Ok(AdjacencyList {
            array: self.array.iter().map(f).collect::<Result<_, _>>()?,
            offsets: self.offsets.clone(),
        })
    }

    /// Consume into `(array, offsets)`.
    pub fn into_parts(self) -> (Vec<T>, Vec<usize>) {
        (self.array, self.offsets)
    }
}

impl<T: Clone> AdjacencyList<T> {
    /// Copy of the first `n` rows (all rows if `n >= num_nodes`).
    pub fn truncated(&self, n: usize) -> Self {
        let n = n.min(self.num_nodes());
        let offsets = self.offsets[..=n].to_vec();
        let array = self.array[..offsets[n]].to_vec();
        Self { array, offsets }
    }
}

impl AdjacencyList<i32> {
    /// Identity connectivity `i -> [i]` over `n` entities.
    pub fn identity(n: usize) -> Self {
        Self {
            array: (0..n as i32).collect(),
            offsets: (0..=n).collect(),
        }
    }

    /// Transpose a connectivity `a -> b` into `b -> a`, with `num_targets`
    /// rows. Rows of the result are sorted ascending.
    pub fn transpose(&self, num_targets: usize) -> Self {
        let mut counts = vec![0usize; num_targets + 1];
        for &b in &self.array {
            counts[b as usize + 1] += 1;
        }
        for i in 0..num_targets {
            counts[i + 1] += counts[i];
        }
        let offsets = counts.clone();
        let mut pos = counts;
        let mut array = vec![0i32; self.array.len()];
        for a in 0..self.num_nodes() {
            for &b in self.links(a) {
                array[pos[b as usize]] = a as i32;
                pos[b as usize] += 1;
            }
        }
        Self { array, offsets }
    }
}
