//! Candidate sequences and length-normalized ranking.

/// One candidate token sequence with its structural state and score.
///
/// The token sequence is append-only and the structural state is exclusively
/// owned: branching always goes through a fork of the parent's state, never
/// through sharing.
#[derive(Debug, Clone)]
pub struct Hypothesis<C> {
    token_ids: Vec<u32>,
    constraint: C,
    raw_score: f32,
    terminated: bool,
}

impl<C> Hypothesis<C> {
    /// The empty hypothesis a session starts from.
    pub(crate) fn root(constraint: C) -> Self {
        Self { token_ids: Vec::new(), constraint, raw_score: 0.0, terminated: false }
    }

    /// Extend this hypothesis by one token into a new record.
    pub(crate) fn child(&self, token_id: u32, raw_score: f32, constraint: C, terminated: bool) -> Self {
        let mut token_ids = Vec::with_capacity(self.token_ids.len() + 1);
        token_ids.extend_from_slice(&self.token_ids);
        token_ids.push(token_id);
        Self { token_ids, constraint, raw_score, terminated }
    }

    /// Generated token ids, oldest first.
    pub fn token_ids(&self) -> &[u32] {
        &self.token_ids
    }

    /// Number of generated tokens.
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    /// True for the freshly-seeded root hypothesis only.
    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }

    /// Most recently generated token, if any.
    pub fn last_token(&self) -> Option<u32> {
        self.token_ids.last().copied()
    }

    /// Cumulative log-probability of the sequence (unnormalized).
    pub fn raw_score(&self) -> f32 {
        self.raw_score
    }

    /// Whether the structural constraint reported completion.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The structural state owned by this hypothesis.
    pub fn constraint(&self) -> &C {
        &self.constraint
    }

    /// Score for ranking against hypotheses of other lengths.
    ///
    /// Only meaningful over a fixed hypothesis set; beam pruning itself is
    /// driven by [`raw_score`](Hypothesis::raw_score).
    pub fn normalized_score(&self, norm: &LengthNorm) -> f64 {
        norm.normalized(f64::from(self.raw_score), self.token_ids.len())
    }
}

/// Length normalization for ranking sequences of different lengths.
///
/// Divides a cumulative log-probability by
/// `((base + length) / (base + 1)) ^ pow` before exponentiating, so longer
/// sequences are not crowded out purely for accumulating more negative
/// terms.
///
/// # Examples
///
/// ```
/// use treebeam_search::LengthNorm;
///
/// let norm = LengthNorm::default();
/// // A length-1 sequence is never rescaled: the factor is exactly 1.
/// assert!((norm.normalized(-0.5, 1) - (-0.5f64).exp()).abs() < 1e-12);
/// // For a fixed negative score, longer reads as better.
/// assert!(norm.normalized(-2.0, 8) > norm.normalized(-2.0, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthNorm {
    pub base: f64,
    pub pow: f64,
}

impl Default for LengthNorm {
    fn default() -> Self {
        Self { base: 5.0, pow: 0.7 }
    }
}

impl LengthNorm {
    pub fn new(base: f64, pow: f64) -> Self {
        Self { base, pow }
    }

    /// The divisor applied to a raw score at the given sequence length.
    pub fn factor(&self, length: usize) -> f64 {
        ((self.base + length as f64) / (self.base + 1.0)).powf(self.pow)
    }

    /// `exp(raw_score / factor(length))`, monotonic in `raw_score` for a
    /// fixed length.
    pub fn normalized(&self, raw_score: f64, length: usize) -> f64 {
        (raw_score / self.factor(length)).exp()
    }
}
