//! Pure log-probability transforms for constrained beam-search decoding.
//!
//! All functions operate in-place on `f32` slices and have no external
//! dependencies: they are pure mathematical transforms.
//!
//! ## Typical per-step pipeline
//!
//! ```
//! use treebeam_logits::*;
//!
//! let mut log_probs = vec![-0.5f32, -1.0, -2.0, -0.1];
//! let legal: Vec<u32> = vec![0, 1, 3];
//!
//! apply_vocabulary_mask(&mut log_probs, &legal);
//! log_softmax_in_place(&mut log_probs);
//! let best = select_top_k(&log_probs, 2);
//! assert_eq!(best[0].0, 3);
//! ```

use std::cmp::Ordering;

/// Restrict a row of log-probabilities to an allowed set of token ids.
///
/// Every entry whose index is not in `allowed` is set to
/// `f32::NEG_INFINITY`, so a subsequent [`log_softmax_in_place`] distributes
/// all probability mass over the allowed tokens only.  Allowed ids outside
/// the slice bounds are ignored.
///
/// # Examples
///
/// ```
/// use treebeam_logits::apply_vocabulary_mask;
///
/// let mut row = vec![0.1f32, 0.2, 0.3, 0.4];
/// apply_vocabulary_mask(&mut row, &[1, 3]);
/// assert!(row[0].is_infinite() && row[0] < 0.0);
/// assert!((row[1] - 0.2).abs() < 1e-6);
/// assert!(row[2].is_infinite() && row[2] < 0.0);
/// assert!((row[3] - 0.4).abs() < 1e-6);
/// ```
pub fn apply_vocabulary_mask(logits: &mut [f32], allowed: &[u32]) {
    let mut keep = vec![false; logits.len()];
    for &id in allowed {
        let idx = id as usize;
        if idx < keep.len() {
            keep[idx] = true;
        }
    }
    for (l, keep) in logits.iter_mut().zip(keep) {
        if !keep {
            *l = f32::NEG_INFINITY;
        }
    }
}

/// Renormalize a row of log-probabilities in-place via log-softmax.
///
/// Uses the numerically-stable "subtract max" form.  `f32::NEG_INFINITY`
/// entries (from [`apply_vocabulary_mask`]) keep zero probability mass and
/// stay `NEG_INFINITY`.  A row with no finite entry is left unchanged: no
/// distribution exists over an empty support, and every candidate drawn
/// from such a row is non-finite.
///
/// # Examples
///
/// ```
/// use treebeam_logits::log_softmax_in_place;
///
/// let mut row = vec![1.0f32, 2.0, 3.0];
/// log_softmax_in_place(&mut row);
/// let total: f32 = row.iter().map(|l| l.exp()).sum();
/// assert!((total - 1.0).abs() < 1e-5);
/// // Higher logit → higher log-probability, all ≤ 0.
/// assert!(row[2] > row[1] && row[1] > row[0]);
/// assert!(row[2] <= 0.0);
/// ```
pub fn log_softmax_in_place(logits: &mut [f32]) {
    if logits.is_empty() {
        return;
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return;
    }
    let mut sum = 0.0f32;
    for &l in logits.iter() {
        if l != f32::NEG_INFINITY {
            sum += (l - max).exp();
        }
    }
    let log_sum = sum.ln();
    for l in logits.iter_mut() {
        if *l != f32::NEG_INFINITY {
            *l = *l - max - log_sum;
        }
    }
}

/// Indices and values of the `k` largest entries, best first.
///
/// Uses O(n) selection (`select_nth_unstable_by`) to find the top `k`, then
/// sorts only those.  `k` is clamped to the slice length.  Non-finite values
/// compare as equal to everything, so the relative order of NaN entries is
/// unspecified; callers scanning the result must stop at the first
/// non-finite score.
///
/// # Examples
///
/// ```
/// use treebeam_logits::select_top_k;
///
/// let scores = vec![0.1f32, 0.9, 0.3, 0.7];
/// let top = select_top_k(&scores, 2);
/// assert_eq!(top.len(), 2);
/// assert_eq!(top[0].0, 1);
/// assert_eq!(top[1].0, 3);
/// ```
pub fn select_top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    if k < indexed.len() {
        indexed.select_nth_unstable_by(k - 1, |a, b| f32_descending(a.1, b.1));
        indexed.truncate(k);
    }
    indexed.sort_unstable_by(|a, b| f32_descending(a.1, b.1));
    indexed
}

// --- helpers ---------------------------------------------------------------

#[inline]
fn f32_descending(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

// ---------------------------------------------------------------------------
