//! Collective exchanges built on the point-to-point [`Communicator`].
//!
//! Every collective runs in two stages, like section completion does:
//! 1. exchange item counts with each peer ([`WireCount`] headers on `tag.base()`),
//! 2. exchange the payloads themselves on `tag.offset(1)`.
//!
//! All send handles are drained before returning, even on error. All ranks
//! must call the same collectives in the same order.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut, decode_vec};
use crate::mesh_error::MeshError;
use bytemuck::Pod;

/// Personalized all-to-all: `send[p]` goes to rank `p`; the result holds at
/// index `p` what rank `p` sent to the caller. The caller's own slot is
/// copied locally.
pub fn all_to_all<T, C>(comm: &C, tag: CommTag, send: &[Vec<T>]) -> Result<Vec<Vec<T>>, MeshError>
where
    T: Pod,
    C: Communicator,
{
    let size = comm.size();
    let me = comm.rank();
    if send.len() != size {
        return Err(MeshError::comm(
            me,
            format!("all_to_all expects {size} send buffers, got {}", send.len()),
        ));
    }
    let mut recv: Vec<Vec<T>> = vec![Vec::new(); size];
    recv[me] = send[me].clone();
    if size == 1 {
        return Ok(recv);
    }

    let counts = exchange_counts(comm, tag, send)?;

    // Stage 2: payloads. Zero-length messages are skipped on both sides.
    let elem = std::mem::size_of::<T>();
    let mut recv_data = Vec::with_capacity(size - 1);
    for (peer, &n) in counts.iter().enumerate() {
        if peer != me && n > 0 {
            let mut buf = vec![0u8; n * elem];
            let h = comm.irecv(peer, tag.offset(1), &mut buf);
            recv_data.push((peer, n, h));
        }
    }
    let mut pending_sends = Vec::with_capacity(size - 1);
    for (peer, items) in send.iter().enumerate() {
        if peer != me && !items.is_empty() {
            pending_sends.push(comm.isend(peer, tag.offset(1), cast_slice(items)));
        }
    }

    let mut maybe_err = None;
    for (peer, n, h) in recv_data {
        match h.wait() {
            Some(bytes) if maybe_err.is_none() => match decode_vec::<T>(&bytes, n) {
                Ok(values) => recv[peer] = values,
                Err(msg) => maybe_err = Some(MeshError::comm(peer, msg)),
            },
            None if maybe_err.is_none() => {
                maybe_err = Some(MeshError::comm(
                    peer,
                    format!("failed to receive payload from rank {peer}"),
                ));
            }
            _ => {} // already have an error; just drain
        }
    }
    for s in pending_sends {
        let _ = s.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(recv),
    }
}

/// Stage 1: tell every peer how many items it will receive from us.
fn exchange_counts<T, C>(comm: &C, tag: CommTag, send: &[Vec<T>]) -> Result<Vec<usize>, MeshError>
where
    C: Communicator,
{
    let me = comm.rank();
    let size = comm.size();

    let mut recv_size = Vec::with_capacity(size - 1);
    for peer in (0..size).filter(|&p| p != me) {
        let mut cnt = WireCount::new(0);
        let h = comm.irecv(
            peer,
            tag.base(),
            cast_slice_mut(std::slice::from_mut(&mut cnt)),
        );
        recv_size.push((peer, h));
    }

    let mut pending_sends = Vec::with_capacity(size - 1);
    for peer in (0..size).filter(|&p| p != me) {
        let count = WireCount::new(send[peer].len());
        pending_sends.push(comm.isend(
            peer,
            tag.base(),
            cast_slice(std::slice::from_ref(&count)),
        ));
    }

    let mut counts = vec![0usize; size];
    counts[me] = send[me].len();
    let mut maybe_err = None;
    for (peer, h) in recv_size {
        match h.wait() {
            Some(data) if maybe_err.is_none() => match decode_vec::<WireCount>(&data, 1) {
                Ok(cnt) => counts[peer] = cnt[0].get(),
                Err(msg) => {
                    maybe_err = Some(MeshError::comm(
                        peer,
                        format!("bad size header: {msg}"),
                    ))
                }
            },
            None if maybe_err.is_none() => {
                maybe_err = Some(MeshError::comm(
                    peer,
                    format!("failed to receive size from rank {peer}"),
                ));
            }
            _ => {}
        }
    }

    for s in pending_sends {
        let _ = s.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(counts),
    }
}

/// Every rank receives every rank's `local` slice, indexed by rank.
pub fn all_gather<T, C>(comm: &C, tag: CommTag, local: &[T]) -> Result<Vec<Vec<T>>, MeshError>
where
    T: Pod,
    C: Communicator,
{
    let send = vec![local.to_vec(); comm.size()];
    all_to_all(comm, tag, &send)
}

/// Exclusive prefix sum of `n` over ranks. Returns `(offset, total)`.
pub fn exclusive_scan<C: Communicator>(
    comm: &C,
    tag: CommTag,
    n: usize,
) -> Result<(usize, usize), MeshError> {
    let counts = all_gather(comm, tag, &[n as u64])?;
    let me = comm.rank();
    let mut offset = 0usize;
    let mut total = 0usize;
    for (rank, c) in counts.iter().enumerate() {
        let c = c.first().copied().unwrap_or(0) as usize;
        if rank < me {
            offset += c;
        }
        total += c;
    }
    Ok((offset, total))
}

/// All ranks' values of `n`, indexed by rank.
pub fn gather_counts<C: Communicator>(
    comm: &C,
    tag: CommTag,
    n: usize,
) -> Result<Vec<usize>, MeshError> {
    Ok(all_gather(comm, tag, &[n as u64])?
        .into_iter()
        .map(|c| c.first().copied().unwrap_or(0) as usize)
        .collect())
}

/// Collective status check: every rank learns whether any rank failed.
///
/// A local error is returned unchanged. Ranks that succeeded locally get a
/// [`MeshError::CommError`] naming the lowest failed rank, so no peer is left
/// waiting in a later collective.
pub fn agree<T, C: Communicator>(
    comm: &C,
    tag: CommTag,
    local: Result<T, MeshError>,
) -> Result<T, MeshError> {
    let flags = match all_gather(comm, tag, &[local.is_err() as u8]) {
        Ok(flags) => flags,
        Err(err) => return local.and(Err(err)),
    };
    let value = local?;
    match flags.iter().position(|f| f.first() == Some(&1)) {
        Some(rank) => Err(MeshError::comm(
            rank,
            format!("rank {rank} failed; abandoning collective"),
        )),
        None => Ok(value),
    }
}
