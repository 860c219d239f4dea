//! Toy structural constraints for exercising the beam search in tests.
//!
//! None of these model a real grammar; they exist to pin down decoder
//! behavior: unconstrained vocabularies with designated terminal tokens,
//! scripted per-depth legal sets, and fork failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use treebeam_search::{Advance, StructuralConstraint};

/// Every token is always legal; a chosen set of token ids completes the
/// sequence whenever one is emitted.
#[derive(Debug, Clone)]
pub struct OpenGrammar {
    vocab_size: u32,
    terminal_ids: Vec<u32>,
}

impl OpenGrammar {
    pub fn new(vocab_size: u32) -> Self {
        Self { vocab_size, terminal_ids: Vec::new() }
    }

    /// Mark the given token ids as always-terminal.
    pub fn with_terminals(mut self, ids: &[u32]) -> Self {
        self.terminal_ids = ids.to_vec();
        self
    }
}

impl StructuralConstraint for OpenGrammar {
    fn legal_next_tokens(&self) -> Vec<u32> {
        (0..self.vocab_size).collect()
    }

    fn advance(&mut self, token_id: u32) -> Result<Advance> {
        if token_id >= self.vocab_size {
            bail!("token {token_id} outside vocabulary of size {}", self.vocab_size);
        }
        Ok(if self.terminal_ids.contains(&token_id) {
            Advance::Completed
        } else {
            Advance::Continuing
        })
    }

    fn try_fork(&self) -> Result<Self> {
        Ok(self.clone())
    }

    fn terminal_candidates_per_step(&self) -> usize {
        // Any of the terminal ids can show up among the selected candidates
        // in the same step.
        self.terminal_ids.len().max(1)
    }
}

/// A fixed legal token set per depth; consuming the last scripted depth
/// completes the sequence.
#[derive(Debug, Clone)]
pub struct ScriptedGrammar {
    steps: Vec<Vec<u32>>,
    depth: usize,
}

impl ScriptedGrammar {
    pub fn new(steps: Vec<Vec<u32>>) -> Self {
        Self { steps, depth: 0 }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl StructuralConstraint for ScriptedGrammar {
    fn legal_next_tokens(&self) -> Vec<u32> {
        self.steps.get(self.depth).cloned().unwrap_or_default()
    }

    fn advance(&mut self, token_id: u32) -> Result<Advance> {
        let Some(legal) = self.steps.get(self.depth) else {
            bail!("advanced past the scripted depth {}", self.depth);
        };
        if !legal.contains(&token_id) {
            bail!("token {token_id} is not legal at depth {}", self.depth);
        }
        self.depth += 1;
        Ok(if self.depth == self.steps.len() { Advance::Completed } else { Advance::Continuing })
    }

    fn try_fork(&self) -> Result<Self> {
        Ok(self.clone())
    }
}

/// Wrapper whose `try_fork` starts failing once a shared budget is spent.
///
/// The budget is shared across every fork of the same session, mirroring a
/// resource pool running dry mid-step.
#[derive(Debug, Clone)]
pub struct BrittleFork<C> {
    inner: C,
    budget: Arc<AtomicUsize>,
}

impl<C> BrittleFork<C> {
    pub fn new(inner: C, fork_budget: usize) -> Self {
        Self { inner, budget: Arc::new(AtomicUsize::new(fork_budget)) }
    }

    pub fn forks_left(&self) -> usize {
        self.budget.load(Ordering::SeqCst)
    }
}

impl<C: StructuralConstraint> StructuralConstraint for BrittleFork<C> {
    fn legal_next_tokens(&self) -> Vec<u32> {
        self.inner.legal_next_tokens()
    }

    fn advance(&mut self, token_id: u32) -> Result<Advance> {
        self.inner.advance(token_id)
    }

    fn try_fork(&self) -> Result<Self> {
        if self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            bail!("fork budget exhausted");
        }
        Ok(Self { inner: self.inner.try_fork()?, budget: Arc::clone(&self.budget) })
    }

    fn terminal_candidates_per_step(&self) -> usize {
        self.inner.terminal_candidates_per_step()
    }
}
