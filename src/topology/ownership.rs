//! Deterministic ownership resolution for distributed indices.
//!
//! A global key (a vertex id, or the sorted global vertices of an entity) may
//! be seen by several ranks. Each of them sends a claim to the key's
//! *postmaster* rank (`key[0] mod size`), which picks the owner with
//! [`resolve_owner`] and replies to every claimant. The rule is a pure
//! function of the claims, so every rank agrees on the winner.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::all_to_all;
use crate::mesh_error::MeshError;
use hashbrown::HashMap;

/// One rank's claim on a global key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct OwnershipClaim {
    pub rank: usize,
    /// The claimant holds the key in something it owns (an owned cell, or an
    /// owned parent index). Preferred claims win over plain ones.
    pub preferred: bool,
}

/// Owner of a key: the lowest preferred rank, else the lowest rank overall.
/// `None` only for an empty claim list.
pub fn resolve_owner(claims: &[OwnershipClaim]) -> Option<usize> {
    claims
        .iter()
        .filter(|c| c.preferred)
        .map(|c| c.rank)
        .min()
        .or_else(|| claims.iter().map(|c| c.rank).min())
}

/// Rank collecting claims for `key`.
#[inline]
pub fn postmaster_rank(key: &[i64], size: usize) -> usize {
    key.first()
        .map(|&k| k.rem_euclid(size as i64) as usize)
        .unwrap_or(0)
}

fn check_keys(keys: &[i64], width: usize, rank: usize) -> Result<usize, MeshError> {
    if width == 0 || keys.len() % width != 0 {
        return Err(MeshError::OwnershipResolution {
            rank,
            key: keys.iter().take(width.max(1)).copied().collect(),
        });
    }
    Ok(keys.len() / width)
}

const REPLY_OK: i64 = 0;
const REPLY_FAILED: i64 = 1;

type RequestPlan = (usize, Vec<Vec<i64>>, Vec<Vec<usize>>);

/// A failed plan still takes part in the exchange, with nothing to send.
fn split_plan(
    plan: Result<RequestPlan, MeshError>,
    size: usize,
) -> (usize, Vec<Vec<i64>>, Vec<Vec<usize>>, Option<MeshError>) {
    match plan {
        Ok((n, send, sent_order)) => (n, send, sent_order, None),
        Err(err) => (0, vec![Vec::new(); size], vec![Vec::new(); size], Some(err)),
    }
}

/// Reply stage shared by the ownership collectives. Every reply buffer leads
/// with a status word; a rank with a pending `failure` sends only
/// [`REPLY_FAILED`]. Returns the replies with the status word stripped, or an
/// error on every rank if any rank failed.
fn exchange_replies<C: Communicator>(
    comm: &C,
    tag: CommTag,
    mut replies: Vec<Vec<i64>>,
    failure: Option<MeshError>,
) -> Result<Vec<Vec<i64>>, MeshError> {
    if failure.is_some() {
        replies = vec![vec![REPLY_FAILED]; replies.len()];
    }
    let answers = all_to_all(comm, tag, &replies)?;
    if let Some(err) = failure {
        return Err(err);
    }
    if let Some(rank) = answers.iter().position(|a| a.first() != Some(&REPLY_OK)) {
        return Err(MeshError::comm(
            rank,
            format!("rank {rank} could not complete the ownership exchange"),
        ));
    }
    Ok(answers.into_iter().map(|mut a| a.split_off(1)).collect())
}

/// Collective owner resolution.
///
/// `keys` holds `keys.len() / width` keys of `width` entries each;
/// `preferred[i]` flags key `i`. Returns the owner of every key. Uses tags
/// `tag` and `tag.next(1)`. Bad arguments on one rank fail every rank.
pub fn resolve_owners<C: Communicator>(
    comm: &C,
    tag: CommTag,
    keys: &[i64],
    width: usize,
    preferred: &[bool],
) -> Result<Vec<usize>, MeshError> {
    let size = comm.size();
    let me = comm.rank();
    let plan = check_keys(keys, width, me).and_then(|n| {
        if preferred.len() != n {
            return Err(MeshError::OwnershipResolution {
                rank: me,
                key: Vec::new(),
            });
        }
        // Claims: [key..., flag] per record, bucketed by postmaster.
        let mut send = vec![Vec::<i64>::new(); size];
        let mut sent_order: Vec<Vec<usize>> = vec![Vec::new(); size];
        for (i, key) in keys.chunks_exact(width).enumerate() {
            let dest = postmaster_rank(key, size);
            send[dest].extend_from_slice(key);
            send[dest].push(preferred[i] as i64);
            sent_order[dest].push(i);
        }
        Ok((n, send, sent_order))
    });
    let (n, send, sent_order, mut failure) = split_plan(plan, size);
    let recv = all_to_all(comm, tag, &send)?;

    let record = width + 1;
    let mut claims: HashMap<&[i64], Vec<OwnershipClaim>> = HashMap::new();
    for (src, data) in recv.iter().enumerate() {
        for rec in data.chunks_exact(record) {
            claims.entry(&rec[..width]).or_default().push(OwnershipClaim {
                rank: src,
                preferred: rec[width] != 0,
            });
        }
    }

    let mut replies = vec![vec![REPLY_OK]; size];
    'claims: for (src, data) in recv.iter().enumerate() {
        for rec in data.chunks_exact(record) {
            let key = &rec[..width];
            match claims.get(key).and_then(|c| resolve_owner(c)) {
                Some(owner) => replies[src].push(owner as i64),
                None => {
                    failure.get_or_insert(MeshError::OwnershipResolution {
                        rank: me,
                        key: key.to_vec(),
                    });
                    break 'claims;
                }
            }
        }
    }
    log::trace!(
        "[rank {me}] postmaster resolved {} distinct keys",
        claims.len()
    );
    let answers = exchange_replies(comm, tag.next(1), replies, failure)?;

    let mut owners = vec![usize::MAX; n];
    for (postmaster, answer) in answers.iter().enumerate() {
        if answer.len() != sent_order[postmaster].len() {
            return Err(MeshError::comm(
                postmaster,
                format!(
                    "expected {} ownership replies, got {}",
                    sent_order[postmaster].len(),
                    answer.len()
                ),
            ));
        }
        for (&i, &owner) in sent_order[postmaster].iter().zip(answer) {
            owners[i] = owner as usize;
        }
    }
    Ok(owners)
}


/// Collective request/reply: key `i` is sent to `owners[i]`, which answers
/// with `respond(key)`, exactly `reply_width` values. Returns the replies
/// flattened in key order. Uses tags `tag` and `tag.next(1)`.
///
/// An owner that cannot answer still sends its replies, then every rank
/// returns an error.
pub fn request_from_owners<C, F>(
    comm: &C,
    tag: CommTag,
    keys: &[i64],
    width: usize,
    owners: &[usize],
    reply_width: usize,
    mut respond: F,
) -> Result<Vec<i64>, MeshError>
where
    C: Communicator,
    F: FnMut(&[i64]) -> Option<Vec<i64>>,
{
    let size = comm.size();
    let me = comm.rank();
    let plan = check_keys(keys, width, me).and_then(|n| {
        if owners.len() != n {
            return Err(MeshError::OwnershipResolution {
                rank: me,
                key: Vec::new(),
            });
        }
        let mut send = vec![Vec::<i64>::new(); size];
        let mut sent_order: Vec<Vec<usize>> = vec![Vec::new(); size];
        for (i, key) in keys.chunks_exact(width).enumerate() {
            let dest = owners[i];
            if dest >= size {
                return Err(MeshError::InvalidDestination {
                    cell: i,
                    rank: dest as i64,
                    size,
                });
            }
            send[dest].extend_from_slice(key);
            sent_order[dest].push(i);
        }
        Ok((n, send, sent_order))
    });
    let (n, send, sent_order, mut failure) = split_plan(plan, size);
    let requests = all_to_all(comm, tag, &send)?;

    let mut replies = vec![vec![REPLY_OK]; size];
    'requests: for (src, data) in requests.iter().enumerate() {
        if failure.is_some() {
            break;
        }
        for key in data.chunks_exact(width) {
            match respond(key) {
                Some(values) if values.len() == reply_width => replies[src].extend(values),
                _ => {
                    failure.get_or_insert(MeshError::OwnershipResolution {
                        rank: me,
                        key: key.to_vec(),
                    });
                    break 'requests;
                }
            }
        }
    }
    let answers = exchange_replies(comm, tag.next(1), replies, failure)?;

    let mut out = vec![0i64; n * reply_width];
    for (owner, answer) in answers.iter().enumerate() {
        if answer.len() != sent_order[owner].len() * reply_width {
            return Err(MeshError::comm(
                owner,
                format!("short reply: {} values", answer.len()),
            ));
        }
        for (&i, values) in sent_order[owner].iter().zip(answer.chunks_exact(reply_width.max(1))) {
            out[i * reply_width..(i + 1) * reply_width].copy_from_slice(&values[..reply_width]);
        }
    }
    Ok(out)
}
