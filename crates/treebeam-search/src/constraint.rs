//! Contract between the decoder and an external incremental tree builder.
//!
//! The decoder never inspects structural state; it only asks which tokens
//! are legal next, applies a chosen token, and duplicates state when a
//! hypothesis branches.

use anyhow::Result;

/// Outcome of applying one token to a structural state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The token was applied and the sequence can keep growing.
    Continuing,
    /// The token finished the sequence.
    Completed,
}

/// Incremental structural state restricting what a hypothesis may emit next.
///
/// Every surviving branch of the beam owns its own instance; [`try_fork`]
/// must therefore be cheap (structural sharing, copy-on-write) since it runs
/// for every selected candidate on every step.
///
/// # Examples
///
/// A constraint that accepts any token and completes on token `0`:
///
/// ```
/// use anyhow::Result;
/// use treebeam_search::{Advance, StructuralConstraint};
///
/// #[derive(Clone)]
/// struct UntilZero {
///     vocab_size: u32,
/// }
///
/// impl StructuralConstraint for UntilZero {
///     fn legal_next_tokens(&self) -> Vec<u32> {
///         (0..self.vocab_size).collect()
///     }
///
///     fn advance(&mut self, token_id: u32) -> Result<Advance> {
///         Ok(if token_id == 0 { Advance::Completed } else { Advance::Continuing })
///     }
///
///     fn try_fork(&self) -> Result<Self> {
///         Ok(self.clone())
///     }
/// }
///
/// let mut state = UntilZero { vocab_size: 4 };
/// assert_eq!(state.legal_next_tokens().len(), 4);
/// assert!(matches!(state.advance(3), Ok(Advance::Continuing)));
/// assert!(matches!(state.advance(0), Ok(Advance::Completed)));
/// ```
///
/// [`try_fork`]: StructuralConstraint::try_fork
pub trait StructuralConstraint: Sized {
    /// Token ids that are legal as the next token from this state.
    fn legal_next_tokens(&self) -> Vec<u32>;

    /// Apply `token_id`, mutating this state.
    ///
    /// # Errors
    ///
    /// An error excludes the candidate carrying this state from the current
    /// step; it does not abort the step.
    fn advance(&mut self, token_id: u32) -> Result<Advance>;

    /// Duplicate this state so a branch can advance independently.
    ///
    /// # Errors
    ///
    /// Same containment as [`advance`](StructuralConstraint::advance): a
    /// failed fork drops that candidate only.
    fn try_fork(&self) -> Result<Self>;

    /// Upper bound on how many selected candidates can complete in a single
    /// step from this state.
    ///
    /// The decoder over-selects `(1 + bound) × beam_size` candidates so that
    /// completions, which consume no beam slot, still leave enough
    /// continuing candidates to refill the beam.  Too small a bound
    /// under-fills the beam near completions; too large wastes selection
    /// work.
    fn terminal_candidates_per_step(&self) -> usize {
        1
    }
}
