//! Fixed, little-endian wire records for the exchange paths.

use bytemuck::{Pod, Zeroable};
use static_assertions::assert_eq_size;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Decode a received byte buffer into `n` values of `T`.
///
/// Received buffers carry no alignment guarantee, so the bytes are copied
/// into a properly aligned vector.
pub fn decode_vec<T: Pod>(bytes: &[u8], n: usize) -> Result<Vec<T>, String> {
    expect_exact_len(bytes.len(), n * std::mem::size_of::<T>())?;
    let mut out = vec![T::zeroed(); n];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Item count header sent ahead of every payload.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

assert_eq_size!(WireCount, u64);
