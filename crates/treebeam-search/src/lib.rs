//! Tree-constrained beam-search decoding.
//!
//! The decoder grows a bounded set of candidate token sequences
//! ([`Hypothesis`]) one token per [`BeamSearch::step`], restricting each
//! hypothesis to the tokens its [`StructuralConstraint`] currently allows
//! and renormalizing the model's log-probabilities over that legal set.
//! Candidates whose constraint reports completion accumulate in a
//! terminated pool; the rest refill the beam.  Every step returns a sort
//! mask the caller must apply to any per-hypothesis state of its own (for
//! example a recurrent cache) before scoring the next step; [`Scorer`] and
//! [`decode`] package that contract into a ready-made session loop.
//!
//! Ranking across finished hypotheses of different lengths uses
//! [`LengthNorm`], a length-normalized transform of the cumulative
//! log-probability.

pub mod beam;
pub mod constraint;
pub mod hypothesis;
pub mod session;

pub use beam::{BeamError, BeamSearch, StepDiagnostic, StepOutcome};
pub use constraint::{Advance, StructuralConstraint};
pub use hypothesis::{Hypothesis, LengthNorm};
pub use session::{decode, DecodeSummary, Scorer};
