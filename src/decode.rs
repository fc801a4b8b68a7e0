//! Chunk-streaming mask decoding.
//!
//! A mask for object hash `h` is the per-pixel sum of every coverage value
//! whose paired rank pixel carries `h`:
//!
//! ```text
//! mask[i] = Σ_k cov_k[i] · [rank_k[i] == h]
//! ```
//!
//! The decoders here stream one chunk of one rank/coverage pair at a time,
//! so the working set stays bounded by the chunk size no matter how large
//! the image is.  Scratch buffers are allocated once per decode call and
//! reused across every chunk.
//!
//! # Rank comparison
//! Ranks are compared by bit pattern (`f32::to_bits`), not float equality.
//! Both sides originate from `uint32_to_float32` reinterpretation, so the
//! two are equivalent for hashes the producer munged into valid floats —
//! and bit comparison stays well-defined for the u32 values whose float
//! form would be NaN.
//!
//! # Parallelism
//! The per-pixel loop over a chunk runs on rayon.  Each output index is
//! written by exactly one worker, so the loop needs no synchronization;
//! accumulation across rank/coverage pairs is sequenced by the outer loop.

use crate::channel::CompressedChannel;
use crate::error::Result;
use rayon::prelude::*;
use std::collections::HashSet;

/// One rank/coverage channel pair.
pub(crate) type Level<'a> = (&'a CompressedChannel, &'a CompressedChannel);

// ── Pixel kernel ─────────────────────────────────────────────────────────────

/// Accumulate one chunk of one level into `out` for a single target hash.
/// Returns true when at least one rank pixel matched.
fn accumulate(out: &mut [f32], ranks: &[f32], covs: &[f32], hash: u32) -> bool {
    out.par_iter_mut()
        .zip(ranks.par_iter())
        .zip(covs.par_iter())
        .map(|((dst, &rank), &cov)| {
            if rank.to_bits() == hash {
                *dst += cov;
                true
            } else {
                false
            }
        })
        .reduce(|| false, |a, b| a || b)
}

// ── Flat decode ──────────────────────────────────────────────────────────────

/// Decode masks for `targets` into flat `width * height` buffers.
///
/// Returns the masks (one per target, in target order) and a per-target
/// flag recording whether the hash was observed in any rank channel.
/// Levels are iterated outermost so the rank/coverage scratch pair is the
/// only temporary state.
pub(crate) fn decode_flat(levels: &[Level<'_>], targets: &[u32]) -> Result<(Vec<Vec<f32>>, Vec<bool>)> {
    let Some((first_rank, _)) = levels.first() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let total = first_rank.width() * first_rank.height();
    let chunk_elems = first_rank.chunk_elems();

    let mut masks = vec![vec![0f32; total]; targets.len()];
    let mut observed = vec![false; targets.len()];
    let mut rank_buf = vec![0f32; chunk_elems.min(total)];
    let mut cov_buf = vec![0f32; chunk_elems.min(total)];

    for (rank_ch, cov_ch) in levels {
        for c in 0..rank_ch.num_chunks() {
            let n = rank_ch.get_chunk(&mut rank_buf, c)?;
            cov_ch.get_chunk(&mut cov_buf, c)?;
            let base = c * chunk_elems;

            for (t, &hash) in targets.iter().enumerate() {
                let hit = accumulate(
                    &mut masks[t][base..base + n],
                    &rank_buf[..n],
                    &cov_buf[..n],
                    hash,
                );
                observed[t] |= hit;
            }
        }
    }

    Ok((masks, observed))
}

// ── Compressed decode ────────────────────────────────────────────────────────

/// Decode masks for `targets` into compressed channels sharing the inputs'
/// geometry and compression parameters.
///
/// Chunks are iterated outermost: each output chunk is decompressed once,
/// accumulated across every level, then recompressed once — one output
/// compress/decompress round-trip per chunk per batch instead of one per
/// level.
pub(crate) fn decode_compressed(
    levels: &[Level<'_>],
    targets: &[u32],
) -> Result<(Vec<CompressedChannel>, Vec<bool>)> {
    let Some((first_rank, _)) = levels.first() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let opts = first_rank.options();
    let (w, h) = (first_rank.width(), first_rank.height());
    let total = w * h;
    let chunk_elems = first_rank.chunk_elems();

    let mut outs = targets
        .iter()
        .map(|_| CompressedChannel::zeros(w, h, &opts))
        .collect::<Result<Vec<_>>>()?;
    let mut observed = vec![false; targets.len()];

    let buf_len = chunk_elems.min(total);
    let mut out_bufs = vec![vec![0f32; buf_len]; targets.len()];
    let mut rank_buf = vec![0f32; buf_len];
    let mut cov_buf = vec![0f32; buf_len];

    for c in 0..first_rank.num_chunks() {
        let mut n = 0usize;
        for (t, out) in outs.iter().enumerate() {
            n = out.get_chunk(&mut out_bufs[t], c)?;
        }

        for (rank_ch, cov_ch) in levels {
            rank_ch.get_chunk(&mut rank_buf, c)?;
            cov_ch.get_chunk(&mut cov_buf, c)?;

            for (t, &hash) in targets.iter().enumerate() {
                let hit = accumulate(&mut out_bufs[t][..n], &rank_buf[..n], &cov_buf[..n], hash);
                observed[t] |= hit;
            }
        }

        for (t, out) in outs.iter_mut().enumerate() {
            out.set_chunk(&out_bufs[t], c)?;
        }
    }

    Ok((outs, observed))
}

// ── Observed-hash scan ───────────────────────────────────────────────────────

/// Collect every distinct hash appearing in the rank channels, in first
/// observation order.  The zero sentinel — "no object in this rank slot" —
/// is discarded; it is padding, not an id.
pub(crate) fn observed_hashes(levels: &[Level<'_>]) -> Result<Vec<u32>> {
    let Some((first_rank, _)) = levels.first() else {
        return Ok(Vec::new());
    };
    let total = first_rank.width() * first_rank.height();
    let mut buf = vec![0f32; first_rank.chunk_elems().min(total)];

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for (rank_ch, _) in levels {
        for c in 0..rank_ch.num_chunks() {
            let n = rank_ch.get_chunk(&mut buf, c)?;
            for v in &buf[..n] {
                let bits = v.to_bits();
                if bits != 0 && seen.insert(bits) {
                    order.push(bits);
                }
            }
        }
    }
    Ok(order)
}
