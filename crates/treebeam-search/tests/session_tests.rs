//! Driving whole sessions through the `Scorer` contract.

use anyhow::{bail, ensure, Result};
use treebeam_search::{decode, BeamSearch, Scorer};
use treebeam_test_grammars::{OpenGrammar, ScriptedGrammar};

/// Scorer that mirrors the beam's per-hypothesis history the way a model
/// would mirror a recurrent cache: extended from `last_tokens`, gathered on
/// every `reorder`.
struct MirrorScorer {
    vocab_size: usize,
    histories: Vec<Vec<u32>>,
    score_calls: usize,
    reorder_calls: usize,
}

impl MirrorScorer {
    fn new(vocab_size: usize) -> Self {
        Self { vocab_size, histories: vec![Vec::new()], score_calls: 0, reorder_calls: 0 }
    }
}

impl Scorer for MirrorScorer {
    fn score_step(&mut self, last_tokens: Option<&[u32]>, rows: usize) -> Result<Vec<f32>> {
        self.score_calls += 1;
        match last_tokens {
            None => ensure!(rows == 1, "first step must be a batch of one"),
            Some(last) => {
                ensure!(last.len() == rows, "row misalignment");
                ensure!(self.histories.len() == rows, "reorder was skipped");
                for (history, &token) in self.histories.iter_mut().zip(last) {
                    history.push(token);
                }
            }
        }
        let matrix: Vec<f32> = (0..rows * self.vocab_size)
            .map(|i| {
                let (row, tok) = (i / self.vocab_size, i % self.vocab_size);
                -0.25 * ((tok + row + self.score_calls) % self.vocab_size) as f32 - 0.05
            })
            .collect();
        Ok(matrix)
    }

    fn reorder(&mut self, sort_mask: &[usize]) -> Result<()> {
        self.reorder_calls += 1;
        self.histories = sort_mask.iter().map(|&parent| self.histories[parent].clone()).collect();
        Ok(())
    }
}

#[test]
fn decode_runs_to_the_step_budget_and_keeps_the_scorer_aligned() {
    let mut beam = BeamSearch::new(5, 3, OpenGrammar::new(5)).unwrap();
    let mut scorer = MirrorScorer::new(5);

    let summary = decode(&mut beam, &mut scorer, 6).unwrap();

    assert_eq!(summary.steps, 6);
    assert_eq!(summary.terminated, 0);
    assert_eq!(scorer.reorder_calls, 6);
    assert_eq!(scorer.score_calls, 6);

    // The mirrored state trails the beam by exactly the final token, which
    // would arrive with the next score call.
    for (history, hyp) in scorer.histories.iter().zip(beam.active_hypotheses()) {
        assert_eq!(history.as_slice(), &hyp.token_ids()[..hyp.len() - 1]);
    }
}

#[test]
fn decode_stops_when_the_script_completes() {
    let script = vec![vec![0, 1], vec![0, 1], vec![0, 1]];
    let mut beam = BeamSearch::new(3, 2, ScriptedGrammar::new(script)).unwrap();
    let mut scorer = MirrorScorer::new(3);

    let summary = decode(&mut beam, &mut scorer, 100).unwrap();

    // Depth 3 completes every surviving candidate, so only two steps commit.
    assert_eq!(summary.steps, 2);
    assert!(beam.is_exhausted());
    assert!(summary.terminated > 0);
    assert_eq!(summary.terminated, beam.terminated_hypotheses().len());
    for hyp in beam.terminated_hypotheses() {
        assert_eq!(hyp.len(), 3);
        assert!(hyp.is_terminated());
    }
}

#[test]
fn decode_counts_underfilled_steps() {
    let script = vec![vec![0], vec![0, 1, 2], vec![0, 1, 2]];
    let mut beam = BeamSearch::new(3, 3, ScriptedGrammar::new(script)).unwrap();
    let mut scorer = MirrorScorer::new(3);

    let summary = decode(&mut beam, &mut scorer, 2).unwrap();

    assert_eq!(summary.steps, 2);
    assert_eq!(summary.underfilled_steps, 1);
}

#[test]
fn scorer_failure_aborts_the_session() {
    struct FailingScorer {
        calls: usize,
    }
    impl Scorer for FailingScorer {
        fn score_step(&mut self, _last: Option<&[u32]>, rows: usize) -> Result<Vec<f32>> {
            self.calls += 1;
            if self.calls > 1 {
                bail!("model backend went away");
            }
            Ok(vec![-0.5; rows * 4])
        }
        fn reorder(&mut self, _sort_mask: &[usize]) -> Result<()> {
            Ok(())
        }
    }

    let mut beam = BeamSearch::new(4, 2, OpenGrammar::new(4)).unwrap();
    let mut scorer = FailingScorer { calls: 0 };
    let err = decode(&mut beam, &mut scorer, 10).unwrap_err();
    assert!(err.to_string().contains("step matrix"));
    // The first step still committed before the failure.
    assert_eq!(beam.steps_taken(), 1);
}

#[test]
fn misshapen_scorer_output_surfaces_the_beam_contract_error() {
    struct WrongShape;
    impl Scorer for WrongShape {
        fn score_step(&mut self, _last: Option<&[u32]>, _rows: usize) -> Result<Vec<f32>> {
            Ok(vec![-0.5; 3])
        }
        fn reorder(&mut self, _sort_mask: &[usize]) -> Result<()> {
            Ok(())
        }
    }

    let mut beam = BeamSearch::new(4, 2, OpenGrammar::new(4)).unwrap();
    let err = decode(&mut beam, &mut WrongShape, 10).unwrap_err();
    assert!(err.to_string().contains("shape mismatch"));
}
