//! Session loop wiring a scorer to the beam.
//!
//! The decoder and the model advance in lock step: the scorer produces one
//! log-probability row per active hypothesis, the beam consumes them, and
//! the resulting sort mask re-aligns whatever per-hypothesis state the
//! scorer keeps (recurrent caches, attention state) before the next round.
//! [`decode`] runs that loop so callers cannot get the ordering wrong.

use anyhow::{Context, Result};
use tracing::debug;

use crate::beam::{BeamSearch, StepDiagnostic, StepOutcome};
use crate::constraint::StructuralConstraint;

/// A next-token distribution producer with per-hypothesis internal state.
pub trait Scorer {
    /// Produce the log-probability matrix for the current beam:
    /// `rows × vocab_size` values, row-major, row `i` conditioned on active
    /// hypothesis `i`.
    ///
    /// `last_tokens` holds the most recent token of each active hypothesis,
    /// or `None` on the very first step, when the sole hypothesis is still
    /// empty.
    fn score_step(&mut self, last_tokens: Option<&[u32]>, rows: usize) -> Result<Vec<f32>>;

    /// Re-align per-hypothesis state with the surviving beam: after this
    /// call, state row `j` must equal pre-call state row `sort_mask[j]`.
    fn reorder(&mut self, sort_mask: &[usize]) -> Result<()>;
}

/// What a finished (or budget-capped) decoding session did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Steps the beam committed.
    pub steps: usize,
    /// Terminated hypotheses accumulated over the whole session.
    pub terminated: usize,
    /// Steps that advanced with fewer than `beam_size` rows.
    pub underfilled_steps: usize,
}

/// Drive a whole decoding session: score, step, re-order, repeat.
///
/// Stops when the beam exhausts or after `max_steps` committed steps.  The
/// scorer's [`reorder`](Scorer::reorder) is always applied before its next
/// [`score_step`](Scorer::score_step), which is the decoder's one
/// hard caller-side requirement.
///
/// # Errors
///
/// Propagates scorer failures and beam contract violations (e.g. a scorer
/// returning a wrongly-shaped matrix).
pub fn decode<C, S>(beam: &mut BeamSearch<C>, scorer: &mut S, max_steps: usize) -> Result<DecodeSummary>
where
    C: StructuralConstraint,
    S: Scorer,
{
    let mut summary = DecodeSummary::default();
    for _ in 0..max_steps {
        if beam.is_exhausted() {
            break;
        }
        let rows = beam.active_beam_size();
        let last_tokens = if beam.steps_taken() == 0 { None } else { Some(beam.last_predictions()?) };
        let mut scores = scorer
            .score_step(last_tokens.as_deref(), rows)
            .context("scorer failed to produce a step matrix")?;
        match beam.step(&mut scores)? {
            StepOutcome::Advanced { sort_mask, diagnostic } => {
                summary.steps += 1;
                if let Some(StepDiagnostic::BeamUnderfilled { produced, requested }) = diagnostic {
                    debug!(produced, requested, "continuing at reduced beam width");
                    summary.underfilled_steps += 1;
                }
                scorer
                    .reorder(&sort_mask)
                    .context("scorer failed to re-order its per-hypothesis state")?;
            }
            StepOutcome::Exhausted => break,
        }
    }
    summary.terminated = beam.terminated_hypotheses().len();
    Ok(summary)
}
