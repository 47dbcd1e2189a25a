//! Greedy peak matching scores.
//!
//! 1. Collect every (query, library) peak pair whose m/z agree within the
//!    tolerance, optionally after shifting library peaks by the precursor
//!    m/z difference (modified cosine).
//! 2. Order pairs by descending weight product, then smaller m/z error, then
//!    query index, then library index.
//! 3. Walk the pairs, accepting a pair when neither peak is used yet.
//!
//! The score is the sum of accepted products over the product of both
//! spectra's weight norms. Peak weight is `mz^mz_power * intensity^intensity_power`.
use std::cmp::Ordering;

use spectrum::Peak;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakMatch {
    /// Cosine score in [0, 1].
    pub score: f64,
    /// Number of accepted peak pairs.
    pub matches: usize,
}

impl PeakMatch {
    const NONE: PeakMatch = PeakMatch {
        score: 0.0,
        matches: 0,
    };
}

#[derive(Debug, Clone, Copy)]
struct PeakPair {
    query: usize,
    library: usize,
    product: f64,
    error: f64,
}

fn compare_pairs(a: &PeakPair, b: &PeakPair) -> Ordering {
    b.product
        .total_cmp(&a.product)
        .then_with(|| a.error.total_cmp(&b.error))
        .then_with(|| a.query.cmp(&b.query))
        .then_with(|| a.library.cmp(&b.library))
}

fn weights(peaks: &[Peak], mz_power: f64, intensity_power: f64) -> Vec<f64> {
    peaks
        .iter()
        .map(|p| p.mz.powf(mz_power) * p.intensity.powf(intensity_power))
        .collect()
}

/// Pairs with `|q.mz - (l.mz + shift)| <= tolerance`. Both slices are m/z ascending.
fn collect_pairs(
    query: &[Peak],
    library: &[Peak],
    shift: f64,
    tolerance: f64,
    query_weights: &[f64],
    library_weights: &[f64],
    out: &mut Vec<PeakPair>,
) {
    for (qi, q) in query.iter().enumerate() {
        let low = q.mz - shift - tolerance;
        let start = library.partition_point(|l| l.mz < low);
        for (li, l) in library.iter().enumerate().skip(start) {
            let error = (q.mz - (l.mz + shift)).abs();
            if l.mz + shift > q.mz + tolerance {
                break;
            }
            if error <= tolerance {
                out.push(PeakPair {
                    query: qi,
                    library: li,
                    product: query_weights[qi] * library_weights[li],
                    error,
                });
            }
        }
    }
}

fn greedy_score(
    query: &[Peak],
    library: &[Peak],
    shifts: &[f64],
    tolerance: f64,
    mz_power: f64,
    intensity_power: f64,
) -> PeakMatch {
    if query.is_empty() || library.is_empty() {
        return PeakMatch::NONE;
    }
    let qw = weights(query, mz_power, intensity_power);
    let lw = weights(library, mz_power, intensity_power);
    let norm = qw.iter().map(|w| w * w).sum::<f64>().sqrt() * lw.iter().map(|w| w * w).sum::<f64>().sqrt();
    if norm == 0.0 {
        return PeakMatch::NONE;
    }

    let mut pairs = Vec::new();
    for &shift in shifts {
        collect_pairs(query, library, shift, tolerance, &qw, &lw, &mut pairs);
    }
    pairs.sort_by(compare_pairs);

    let mut query_used = vec![false; query.len()];
    let mut library_used = vec![false; library.len()];
    let mut total = 0.0;
    let mut matches = 0;
    for pair in pairs {
        if query_used[pair.query] || library_used[pair.library] {
            continue;
        }
        query_used[pair.query] = true;
        library_used[pair.library] = true;
        total += pair.product;
        matches += 1;
    }

    PeakMatch {
        score: (total / norm).clamp(0.0, 1.0),
        matches,
    }
}

pub fn cosine_greedy(
    query: &[Peak],
    library: &[Peak],
    tolerance: f64,
    mz_power: f64,
    intensity_power: f64,
) -> PeakMatch {
    greedy_score(query, library, &[0.0], tolerance, mz_power, intensity_power)
}

/// Cosine that also matches peaks shifted by `query_precursor - library_precursor`.
pub fn modified_cosine(
    query: &[Peak],
    library: &[Peak],
    precursor_shift: f64,
    tolerance: f64,
    mz_power: f64,
    intensity_power: f64,
) -> PeakMatch {
    if precursor_shift.abs() <= f64::EPSILON {
        return cosine_greedy(query, library, tolerance, mz_power, intensity_power);
    }
    greedy_score(
        query,
        library,
        &[0.0, precursor_shift],
        tolerance,
        mz_power,
        intensity_power,
    )
}
