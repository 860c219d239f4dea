//! Beam state and the per-step search algorithm.

use thiserror::Error;
use tracing::{debug, warn};

use treebeam_logits::{apply_vocabulary_mask, log_softmax_in_place, select_top_k};

use crate::constraint::{Advance, StructuralConstraint};
use crate::hypothesis::Hypothesis;

/// Errors raised by [`BeamSearch`] for caller contract violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BeamError {
    #[error("vocab_size {vocab_size} and beam_size {beam_size} must both be positive")]
    InvalidConfig { vocab_size: usize, beam_size: usize },

    #[error(
        "scores shape mismatch: expected {rows} rows x {cols} columns, \
         got {actual} values"
    )]
    ShapeMismatch { rows: usize, cols: usize, actual: usize },

    #[error("no predictions yet: the beam has not taken a step")]
    NoPredictions,
}

/// Result of a successful [`BeamSearch::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The beam advanced by one token.
    ///
    /// `sort_mask[j]` is the previous-beam row that new row `j` descends
    /// from; the caller must gather any per-hypothesis state of its own by
    /// this mask before scoring the next step.
    Advanced {
        sort_mask: Vec<usize>,
        diagnostic: Option<StepDiagnostic>,
    },
    /// No continuing candidate existed; the beam is empty and the session
    /// is over.  Further `step` calls keep returning `Exhausted`.
    Exhausted,
}

/// Non-fatal conditions surfaced alongside an advanced step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDiagnostic {
    /// Fewer continuing candidates than `beam_size` were available.  Normal
    /// near the natural end of generation; the beam proceeds at the reduced
    /// width.
    BeamUnderfilled { produced: usize, requested: usize },
}

/// Tree-constrained beam search over a fixed vocabulary.
///
/// One instance decodes one input context.  Seed it with the structural
/// state of an empty sequence, then call [`step`](BeamSearch::step) with a
/// `(active_beam_size × vocab_size)` row-major matrix of next-token
/// log-probabilities until it reports [`StepOutcome::Exhausted`] or an
/// external length budget runs out.  Finished sequences accumulate in
/// [`terminated_hypotheses`](BeamSearch::terminated_hypotheses) and are
/// never pruned here; final top-k selection over them belongs to the
/// consumer.
#[derive(Debug)]
pub struct BeamSearch<C> {
    vocab_size: usize,
    beam_size: usize,
    active: Vec<Hypothesis<C>>,
    terminated: Vec<Hypothesis<C>>,
    steps_taken: usize,
}

impl<C: StructuralConstraint> BeamSearch<C> {
    /// Create a session with a single empty hypothesis owning `initial`.
    ///
    /// The first [`step`](BeamSearch::step) therefore expects a
    /// `1 × vocab_size` matrix.
    ///
    /// # Errors
    ///
    /// [`BeamError::InvalidConfig`] if either size is zero.
    pub fn new(vocab_size: usize, beam_size: usize, initial: C) -> Result<Self, BeamError> {
        if vocab_size == 0 || beam_size == 0 {
            return Err(BeamError::InvalidConfig { vocab_size, beam_size });
        }
        Ok(Self {
            vocab_size,
            beam_size,
            active: vec![Hypothesis::root(initial)],
            terminated: Vec::new(),
            steps_taken: 0,
        })
    }

    /// Advance the beam by one token.
    ///
    /// `log_probs` holds one row per active hypothesis, in the same order as
    /// [`active_hypotheses`](BeamSearch::active_hypotheses), and is
    /// clobbered in place (masked, renormalized, and offset by each row's
    /// cumulative score).
    ///
    /// # Errors
    ///
    /// [`BeamError::ShapeMismatch`] if `log_probs` is not exactly
    /// `active_beam_size × vocab_size` values; nothing is consumed in that
    /// case.
    pub fn step(&mut self, log_probs: &mut [f32]) -> Result<StepOutcome, BeamError> {
        if self.active.is_empty() {
            return Ok(StepOutcome::Exhausted);
        }
        let rows = self.active.len();
        let cols = self.vocab_size;
        if log_probs.len() != rows * cols {
            return Err(BeamError::ShapeMismatch { rows, cols, actual: log_probs.len() });
        }

        // Mask each row to its hypothesis's legal tokens, then renormalize
        // over the legal set only, then lift to absolute cumulative scores.
        for (row, hyp) in self.active.iter().enumerate() {
            let slice = &mut log_probs[row * cols..(row + 1) * cols];
            let legal = hyp.constraint().legal_next_tokens();
            apply_vocabulary_mask(slice, &legal);
            log_softmax_in_place(slice);
            let offset = hyp.raw_score();
            for v in slice.iter_mut() {
                *v += offset;
            }
        }

        // Over-select: completions consume a candidate but no beam slot, so
        // reserve headroom for the worst case the constraints report.
        let margin = self
            .active
            .iter()
            .map(|h| h.constraint().terminal_candidates_per_step())
            .max()
            .unwrap_or(1);
        let candidates = select_top_k(log_probs, (1 + margin) * self.beam_size);

        let mut continuing: Vec<Hypothesis<C>> = Vec::with_capacity(self.beam_size);
        let mut sort_mask: Vec<usize> = Vec::with_capacity(self.beam_size);
        for (flat, score) in candidates {
            // Candidates arrive best-first: the first non-finite score means
            // only NaN or masked-out entries remain, and neither may ever be
            // dispatched.
            if !score.is_finite() {
                break;
            }
            let row = flat / cols;
            let token_id = (flat % cols) as u32;
            let mut fork = match self.active[row].constraint().try_fork() {
                Ok(fork) => fork,
                Err(err) => {
                    debug!(row, token_id, %err, "constraint fork failed; candidate dropped");
                    continue;
                }
            };
            match fork.advance(token_id) {
                Ok(Advance::Completed) => {
                    self.terminated.push(self.active[row].child(token_id, score, fork, true));
                }
                Ok(Advance::Continuing) => {
                    continuing.push(self.active[row].child(token_id, score, fork, false));
                    sort_mask.push(row);
                    if continuing.len() == self.beam_size {
                        break;
                    }
                }
                Err(err) => {
                    debug!(row, token_id, %err, "constraint advance failed; candidate dropped");
                }
            }
        }

        if continuing.is_empty() {
            self.active.clear();
            return Ok(StepOutcome::Exhausted);
        }
        let diagnostic = if continuing.len() < self.beam_size {
            warn!(
                produced = continuing.len(),
                requested = self.beam_size,
                "not enough continuing hypotheses to fill the beam"
            );
            Some(StepDiagnostic::BeamUnderfilled {
                produced: continuing.len(),
                requested: self.beam_size,
            })
        } else {
            None
        };

        // Commit: the record structs already carry their gathered history
        // and freshly-forked constraints; rejected forks drop here.
        self.active = continuing;
        self.steps_taken += 1;
        debug_assert!(self.active.iter().all(|h| h.len() == self.steps_taken));
        debug_assert!(sort_mask.iter().all(|&parent| parent < rows));

        Ok(StepOutcome::Advanced { sort_mask, diagnostic })
    }

    /// Active (non-terminated) hypotheses, row-aligned with the next
    /// expected score matrix.
    pub fn active_hypotheses(&self) -> &[Hypothesis<C>] {
        &self.active
    }

    /// Every hypothesis that completed so far, in completion order.
    pub fn terminated_hypotheses(&self) -> &[Hypothesis<C>] {
        &self.terminated
    }

    /// Last token of every active hypothesis, for batching the next scorer
    /// call.
    ///
    /// # Errors
    ///
    /// [`BeamError::NoPredictions`] before the first step.
    pub fn last_predictions(&self) -> Result<Vec<u32>, BeamError> {
        if self.steps_taken == 0 {
            return Err(BeamError::NoPredictions);
        }
        Ok(self.active.iter().filter_map(Hypothesis::last_token).collect())
    }

    /// Number of rows the next `step` call expects (1 before the first
    /// step, 0 once exhausted).
    pub fn active_beam_size(&self) -> usize {
        self.active.len()
    }

    /// True once no active hypothesis remains.
    pub fn is_exhausted(&self) -> bool {
        self.active.is_empty()
    }

    /// Steps successfully committed so far; every active hypothesis holds
    /// exactly this many tokens.
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn beam_size(&self) -> usize {
        self.beam_size
    }
}
