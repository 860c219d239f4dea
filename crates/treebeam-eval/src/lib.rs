//! Evaluation-side consumer for persisted beam-search predictions.
//!
//! A prediction run writes one JSON record per input example: the ground
//! truth plus every decoded hypothesis with its raw score and length.  This
//! crate re-ranks those hypotheses with the same length normalization the
//! decoder exposes, keeps the top k, and reports how close the best of them
//! comes to the target by edit similarity.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use treebeam_search::LengthNorm;

/// One decoded hypothesis as persisted by a prediction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextHypothesis {
    pub text: String,
    pub score: f64,
    pub length: usize,
}

/// One evaluated example: ground truth plus all decoded hypotheses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub target: String,
    pub hypotheses: Vec<TextHypothesis>,
}

/// Aggregated edit-similarity results for one predictions file at one k.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub path: String,
    pub top_k: usize,
    pub len_norm_base: f64,
    pub len_norm_pow: f64,
    pub examples: usize,
    pub mean_similarity: f64,
    pub std_similarity: f64,
}

/// Ranks persisted hypotheses by length-normalized score.
#[derive(Debug, Clone, Copy)]
pub struct Reranker {
    norm: LengthNorm,
}

impl Reranker {
    pub fn new(norm: LengthNorm) -> Self {
        Self { norm }
    }

    /// The `k` best hypotheses of one prediction, best first.
    pub fn top_k<'a>(&self, prediction: &'a Prediction, k: usize) -> Vec<&'a TextHypothesis> {
        let mut ranked: Vec<&TextHypothesis> = prediction.hypotheses.iter().collect();
        ranked.sort_by(|a, b| {
            let sa = self.norm.normalized(a.score, a.length);
            let sb = self.norm.normalized(b.score, b.length);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(k);
        ranked
    }
}

/// Percentage edit similarity between two strings, spaces ignored.
///
/// `100` means identical (after space removal), `0` means every character
/// must change.  Two empty strings count as identical.
///
/// # Examples
///
/// ```
/// use treebeam_eval::edit_similarity;
///
/// assert_eq!(edit_similarity("foo(bar)", "foo( bar )"), 100.0);
/// assert!(edit_similarity("foo(bar)", "foo(baz)") < 100.0);
/// ```
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().filter(|&c| c != ' ').collect();
    let b: Vec<char> = b.chars().filter(|&c| c != ' ').collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 100.0;
    }
    let dist = edit_distance(&a, &b);
    (1.0 - dist as f64 / longest as f64) * 100.0
}

/// Levenshtein distance over chars.
#[allow(clippy::needless_range_loop)]
fn edit_distance(a: &[char], b: &[char]) -> usize {
    let (m, n) = (a.len(), b.len());
    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for i in 0..=m {
        dp[i][0] = i;
    }
    for j in 0..=n {
        dp[0][j] = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1).min(dp[i][j - 1] + 1).min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[m][n]
}

/// Load one JSONL predictions file, one record per non-empty line.
///
/// # Errors
///
/// I/O failures and malformed records are fatal; the error names the file
/// and line.
pub fn read_predictions(path: &Path) -> Result<Vec<Prediction>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open predictions file {}", path.display()))?;
    let mut predictions = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line =
            line.with_context(|| format!("failed to read {}:{}", path.display(), line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let prediction: Prediction = serde_json::from_str(&line).with_context(|| {
            format!("invalid prediction record at {}:{}", path.display(), line_no + 1)
        })?;
        predictions.push(prediction);
    }
    Ok(predictions)
}

/// Evaluate one predictions file at every requested k.
///
/// For each example, the score is the best edit similarity among its top-k
/// re-ranked hypotheses; the report aggregates mean and standard deviation
/// over examples.  Examples with no hypotheses are skipped.
pub fn evaluate_file(path: &Path, ks: &[usize], norm: LengthNorm) -> Result<Vec<EvalReport>> {
    let predictions = read_predictions(path)?;
    let reranker = Reranker::new(norm);

    let mut reports = Vec::with_capacity(ks.len());
    for &k in ks {
        let scores: Vec<f64> = predictions
            .par_iter()
            .filter_map(|prediction| {
                reranker
                    .top_k(prediction, k)
                    .into_iter()
                    .map(|hyp| edit_similarity(&hyp.text, &prediction.target))
                    .reduce(f64::max)
            })
            .collect();
        let (mean, std) = mean_std(&scores);
        info!(
            path = %path.display(),
            top_k = k,
            examples = scores.len(),
            mean_similarity = mean,
            std_similarity = std,
            "edit similarity"
        );
        reports.push(EvalReport {
            path: path.display().to_string(),
            top_k: k,
            len_norm_base: norm.base,
            len_norm_pow: norm.pow,
            examples: scores.len(),
            mean_similarity: mean,
            std_similarity: std,
        });
    }
    Ok(reports)
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
