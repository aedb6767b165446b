//! Hilbert-curve ordering for multi-dimensional particle clouds.
//!
//! Low-discrepancy resampling needs a canonical 1-D order over the particle
//! set; in one dimension that is a plain sort, and in higher dimensions this
//! module orders particles along a discretized Hilbert space-filling curve,
//! which keeps nearby states at nearby curve positions. The ordering is
//! deterministic and stable (ties broken by original index), which the
//! sequential quasi-Monte Carlo mode relies on for reproducibility.
//!
//! The index codec is the Gray-code "travel" construction of the Hilbert
//! walk (transpose-bits packing of per-axis chunks), after the Hilbert walk
//! coordinate codec by Steve Witham.

use crate::error::{SmcError, SmcResult};
use nalgebra::DVector;

/// Sort N points along the Hilbert curve.
///
/// Points are standardized per coordinate, squashed into `(0,1)^d` with a
/// logistic map, quantized onto a `2^(62/d)`-cell integer grid, and ordered
/// by their Hilbert index. One dimension reduces to a stable argsort. For
/// d > 31 the per-axis resolution degenerates to zero bits and the order
/// falls back to the stable by-index tie-break.
///
/// # Arguments
/// * `points` - N points in R^d (all of the same dimension d >= 1).
///
/// # Returns
/// * The permutation `order` such that `points[order[0]]` has the smallest
///   Hilbert index, or `DimensionMismatch` if the points disagree on d.
pub fn hilbert_sort(points: &[DVector<f64>]) -> SmcResult<Vec<usize>> {
    if points.is_empty() {
        return Ok(Vec::new());
    }
    let d = points[0].len();
    if d == 0 {
        return Err(SmcError::DimensionMismatch(
            "points must have at least one coordinate".to_string(),
        ));
    }
    if let Some(p) = points.iter().find(|p| p.len() != d) {
        return Err(SmcError::DimensionMismatch(format!(
            "expected points of dimension {}, found {}",
            d,
            p.len()
        )));
    }
    let mut order: Vec<usize> = (0..points.len()).collect();
    if d == 1 {
        order.sort_by(|&a, &b| points[a][0].total_cmp(&points[b][0]).then(a.cmp(&b)));
        return Ok(order);
    }

    let n = points.len() as f64;
    let mut mean = vec![0.0f64; d];
    for p in points {
        for k in 0..d {
            mean[k] += p[k] / n;
        }
    }
    let mut std = vec![0.0f64; d];
    for p in points {
        for k in 0..d {
            std[k] += (p[k] - mean[k]).powi(2) / n;
        }
    }
    for s in std.iter_mut() {
        *s = s.sqrt();
    }

    let nbits = (62 / d) as u32;
    let scale = (1u64 << nbits) as f64;
    let max_cell = (1u64 << nbits) - 1;
    let mut coords = vec![0u64; d];
    let mut keys: Vec<u64> = Vec::with_capacity(points.len());
    for p in points {
        for k in 0..d {
            // constant coordinates standardize to 0 and squash to 0.5
            let z = if std[k] > 0.0 {
                (p[k] - mean[k]) / std[k]
            } else {
                0.0
            };
            coords[k] = ((invlogit(z) * scale) as u64).min(max_cell);
        }
        keys.push(hilbert_index(&coords, nbits));
    }
    order.sort_by(|&a, &b| keys[a].cmp(&keys[b]).then(a.cmp(&b)));
    Ok(order)
}

#[inline]
fn invlogit(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Hilbert index of one grid point.
///
/// `coords` holds d cell coordinates, each in `0..2^nbits`; the result is
/// the position of that cell along the order-`nbits` Hilbert walk, packed
/// into `nbits * d` bits. A fixed chunk count keeps indices of different
/// points mutually comparable.
fn hilbert_index(coords: &[u64], nbits: u32) -> u64 {
    if nbits == 0 {
        return 0;
    }
    let d = coords.len();
    let mask = (1u64 << d) - 1;
    let chunks = transpose_bits(coords, nbits as usize);
    let (mut start, mut end) = initial_start_end(nbits as usize, d);
    let mut index = 0u64;
    for &chunk in &chunks {
        let i = gray_decode_travel(start, end, mask, chunk);
        index = (index << d) | i;
        (start, end) = child_start_end(start, end, mask, i);
    }
    index
}

/// Orient the largest cube so the walk starts at the origin and its first
/// step travels along the x axis, regardless of d and the chunk count.
fn initial_start_end(n_chunks: usize, d: usize) -> (u64, u64) {
    let shift = (-(n_chunks as i64) - 1).rem_euclid(d as i64) as u32;
    (0, 1u64 << shift)
}

/// Bit-matrix transpose: d source ints of `n_dests` bits each become
/// `n_dests` ints of d bits each. Earlier sources land in higher bits.
fn transpose_bits(srcs: &[u64], n_dests: usize) -> Vec<u64> {
    let mut srcs = srcs.to_vec();
    let mut dests = vec![0u64; n_dests];
    for j in (0..n_dests).rev() {
        let mut dest = 0u64;
        for src in srcs.iter_mut() {
            dest = (dest << 1) | (*src & 1);
            *src >>= 1;
        }
        dests[j] = dest;
    }
    dests
}

#[inline]
fn gray_encode(n: u64) -> u64 {
    n ^ (n >> 1)
}

fn gray_decode(mut n: u64) -> u64 {
    let mut sh = 1u32;
    loop {
        let div = n >> sh;
        n ^= div;
        if div <= 1 {
            return n;
        }
        sh <<= 1;
    }
}

/// Gray encode between arbitrary `start`/`end` corners: rotate the canonical
/// code so the travelled bit matches `start ^ end`, then xor with `start`.
fn gray_encode_travel(start: u64, end: u64, mask: u64, i: u64) -> u64 {
    let travel_bit = start ^ end;
    let modulus = mask + 1;
    let g = gray_encode(i) * (travel_bit << 1);
    ((g | (g / modulus)) & mask) ^ start
}

fn gray_decode_travel(start: u64, end: u64, mask: u64, g: u64) -> u64 {
    let travel_bit = start ^ end;
    let modulus = mask + 1;
    let rg = (g ^ start) * (modulus / (travel_bit << 1));
    gray_decode((rg | (rg / modulus)) & mask)
}

/// Corners the child cube travels between while the parent walk sits at
/// step `i`.
fn child_start_end(parent_start: u64, parent_end: u64, mask: u64, i: u64) -> (u64, u64) {
    let start_i = i.saturating_sub(1) & !1u64;
    let end_i = ((i + 1) | 1).min(mask);
    let child_start = gray_encode_travel(parent_start, parent_end, mask, start_i);
    let child_end = gray_encode_travel(parent_start, parent_end, mask, end_i);
    (child_start, child_end)
}
